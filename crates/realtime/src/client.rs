use crate::channel::{ChangeStream, DatabaseChanges};
use crate::error::RealtimeError;
use crate::message::{ChangeEvent, ChannelEvent, RealtimeMessage};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, Stream, StreamExt};
use log::{debug, info, trace, warn};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 接続状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// RealtimeClient設定オプション
#[derive(Debug, Clone)]
pub struct RealtimeClientOptions {
    /// ミリ秒
    pub heartbeat_interval: u64,
    /// ミリ秒
    pub join_timeout: u64,
    pub buffer_size: usize,
}

impl Default for RealtimeClientOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: 30000,
            join_timeout: 10000,
            buffer_size: 64,
        }
    }
}

/// Realtimeクライアント本体
#[derive(Clone)]
pub struct RealtimeClient {
    url: String,
    key: String,
    options: RealtimeClientOptions,
    next_ref: Arc<AtomicU32>,
    state: Arc<RwLock<ConnectionState>>,
    access_token: Arc<RwLock<Option<String>>>,
}

impl RealtimeClient {
    /// デフォルトオプションで新しいクライアントを作成
    pub fn new(url: &str, key: &str) -> Self {
        Self::new_with_options(url, key, RealtimeClientOptions::default())
    }

    /// カスタムオプションで新しいクライアントを作成
    pub fn new_with_options(url: &str, key: &str, options: RealtimeClientOptions) -> Self {
        Self {
            url: url.to_string(),
            key: key.to_string(),
            options,
            next_ref: Arc::new(AtomicU32::new(1)),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            access_token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn options(&self) -> &RealtimeClientOptions {
        &self.options
    }

    /// 認証トークンを設定 (次回の subscribe から有効)
    pub async fn set_auth(&self, token: Option<String>) {
        info!("Setting auth token (is_some: {})", token.is_some());
        *self.access_token.write().await = token;
    }

    pub async fn access_token(&self) -> Option<String> {
        self.access_token.read().await.clone()
    }

    /// 現在の接続状態を取得
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Opens a socket, joins the table's channel and returns its change stream.
    ///
    /// Resolves only after the server acknowledged the join.
    pub async fn subscribe(&self, changes: DatabaseChanges) -> Result<ChangeStream, RealtimeError> {
        let token = self.access_token().await;
        let ws_url = self.websocket_url(token.as_deref())?;
        let topic = changes.topic();

        info!("Connecting to realtime endpoint for {}", topic);
        set_state(&self.state, ConnectionState::Connecting).await;

        let ws_stream = match connect_async(ws_url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                set_state(&self.state, ConnectionState::Disconnected).await;
                return Err(RealtimeError::connection(format!(
                    "WebSocket connection failed: {}",
                    e
                )));
            }
        };
        let (mut write, mut read) = ws_stream.split();

        let join_ref = self.next_ref();
        let mut payload = changes.join_payload();
        if let Some(token) = &token {
            payload["access_token"] = json!(token);
        }
        let join = json!({
            "topic": topic,
            "event": ChannelEvent::PhoenixJoin,
            "payload": payload,
            "ref": join_ref,
            "join_ref": join_ref
        });
        debug!("Sending join for {} (ref {})", topic, join_ref);

        let joined = match write.send(Message::Text(join.to_string())).await {
            Ok(()) => {
                let wait = Duration::from_millis(self.options.join_timeout);
                match timeout(wait, await_join(&mut read, &topic, &join_ref)).await {
                    Ok(result) => result,
                    Err(_) => Err(RealtimeError::subscription(format!(
                        "join for {} timed out",
                        topic
                    ))),
                }
            }
            Err(e) => Err(e.into()),
        };
        if let Err(e) = joined {
            warn!("Join for {} failed: {}", topic, e);
            set_state(&self.state, ConnectionState::Disconnected).await;
            return Err(e);
        }

        info!("Joined {}", topic);
        set_state(&self.state, ConnectionState::Connected).await;

        let (tx, rx) = mpsc::channel(self.options.buffer_size.max(1));
        let task = tokio::spawn(run_channel(
            write,
            read,
            topic.clone(),
            tx,
            Duration::from_millis(self.options.heartbeat_interval.max(1)),
            self.next_ref.clone(),
            self.state.clone(),
        ));

        Ok(ChangeStream::new(topic, rx, task))
    }

    /// 次のメッセージ参照番号を生成
    fn next_ref(&self) -> String {
        self.next_ref.fetch_add(1, Ordering::SeqCst).to_string()
    }

    pub(crate) fn websocket_url(&self, token: Option<&str>) -> Result<Url, RealtimeError> {
        let mut url = Url::parse(&self.url)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            s => {
                return Err(RealtimeError::connection(format!(
                    "Unsupported URL scheme: {}",
                    s
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| RealtimeError::connection("Cannot switch URL scheme"))?;

        if !url.path().ends_with("/websocket") {
            let path = format!("{}/realtime/v1/websocket", url.path().trim_end_matches('/'));
            url.set_path(&path);
        }

        url.set_query(None);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("apikey", &self.key);
            query.append_pair("vsn", "1.0.0");
            if let Some(token) = token {
                query.append_pair("token", token);
            }
        }
        Ok(url)
    }
}

async fn set_state(state: &RwLock<ConnectionState>, next: ConnectionState) {
    let mut current = state.write().await;
    if *current != next {
        trace!("Connection state {:?} -> {:?}", *current, next);
        *current = next;
    }
}

async fn await_join<S>(read: &mut S, topic: &str, join_ref: &str) -> Result<(), RealtimeError>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => {
                let msg = match serde_json::from_str::<RealtimeMessage>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!("Unparseable message while joining: {}", e);
                        continue;
                    }
                };
                if msg.topic != topic {
                    continue;
                }
                match msg.event {
                    ChannelEvent::PhoenixReply if msg.message_ref.as_str() == Some(join_ref) => {
                        return match msg.reply_status() {
                            Some("ok") => Ok(()),
                            _ => Err(RealtimeError::subscription(format!(
                                "join for {} rejected: {}",
                                topic, msg.payload
                            ))),
                        };
                    }
                    ChannelEvent::PhoenixError | ChannelEvent::PhoenixClose => {
                        return Err(RealtimeError::subscription(format!(
                            "channel {} closed while joining",
                            topic
                        )));
                    }
                    _ => {}
                }
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(RealtimeError::connection("socket closed before join"));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

async fn run_channel(
    mut write: SplitSink<WsStream, Message>,
    mut read: SplitStream<WsStream>,
    topic: String,
    tx: mpsc::Sender<Result<ChangeEvent, RealtimeError>>,
    heartbeat_period: Duration,
    next_ref: Arc<AtomicU32>,
    state: Arc<RwLock<ConnectionState>>,
) {
    let mut heartbeat = interval_at(Instant::now() + heartbeat_period, heartbeat_period);

    let failure = loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let msg = match serde_json::from_str::<RealtimeMessage>(&text) {
                        Ok(msg) => msg,
                        Err(e) => {
                            warn!("Failed to parse realtime message: {}. Raw: {}", e, text);
                            continue;
                        }
                    };
                    if msg.topic != topic {
                        trace!("Ignoring message for topic {}", msg.topic);
                        continue;
                    }
                    match msg.event {
                        ChannelEvent::PostgresChanges
                        | ChannelEvent::Insert
                        | ChannelEvent::Update
                        | ChannelEvent::Delete => match ChangeEvent::from_payload(&msg.payload) {
                            Some(change) => {
                                debug!("{:?} on {}", change.kind, topic);
                                if tx.send(Ok(change)).await.is_err() {
                                    debug!("Change stream for {} dropped", topic);
                                    break None;
                                }
                            }
                            None => debug!("Ignoring change payload without a row event"),
                        },
                        ChannelEvent::PhoenixError => {
                            break Some(RealtimeError::subscription(format!("channel {} errored", topic)));
                        }
                        ChannelEvent::PhoenixClose => {
                            break Some(RealtimeError::subscription(format!("channel {} closed by server", topic)));
                        }
                        ChannelEvent::PhoenixReply if msg.reply_status() == Some("error") => {
                            break Some(RealtimeError::subscription(format!(
                                "channel {} error reply: {}",
                                topic, msg.payload
                            )));
                        }
                        other => trace!("Ignoring {} on {}", other, topic),
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    break Some(RealtimeError::connection(format!("socket closed: {:?}", frame)));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(e.into()),
                None => break Some(RealtimeError::connection("socket closed")),
            },
            _ = heartbeat.tick() => {
                let heartbeat_msg = json!({
                    "topic": "phoenix",
                    "event": ChannelEvent::Heartbeat,
                    "payload": {},
                    "ref": next_ref.fetch_add(1, Ordering::SeqCst).to_string()
                });
                trace!("Sending heartbeat");
                if let Err(e) = write.send(Message::Text(heartbeat_msg.to_string())).await {
                    break Some(e.into());
                }
            }
        }
    };

    set_state(&state, ConnectionState::Disconnected).await;
    if let Some(err) = failure {
        warn!("Realtime channel {} ended: {}", topic, err);
        let _ = tx.send(Err(err)).await;
    }
    let _ = write.close().await;
}
