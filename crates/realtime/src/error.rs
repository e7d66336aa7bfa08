use thiserror::Error;

/// エラー型
#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Subscription error: {0}")]
    SubscriptionError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),
}

impl RealtimeError {
    pub fn subscription(message: impl Into<String>) -> Self {
        Self::SubscriptionError(message.into())
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::ConnectionError(message.into())
    }
}
