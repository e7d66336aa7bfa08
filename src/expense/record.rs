//! Persisted record shape shared by the remote and local stores

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{Category, Expense, ExpenseDraft, PaymentMethod, RecordOrigin};

const LOCAL_ORIGIN: &str = "local";

/// JSON 互換の保存形式
///
/// Reads are tolerant: ids may be numbers, amounts may be strings, the
/// payment method may sit under the older `type` key and time values may be
/// RFC 3339 strings, epoch milliseconds or `{seconds, nanoseconds}` objects.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseRecord {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_title")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: f64,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "lenient_string", skip_serializing)]
    pub legacy_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl ExpenseRecord {
    /// Builds the persisted form. Both time fields carry the same value.
    pub fn from_expense(expense: &Expense) -> Self {
        let time = expense
            .created_at
            .map(|t| Value::String(t.to_rfc3339_opts(SecondsFormat::Millis, true)));
        Self {
            id: Some(expense.id.clone()).filter(|id| !id.is_empty()),
            title: expense.title.clone(),
            amount: expense.amount,
            payment_method: Some(expense.payment_method.as_str().to_string()),
            legacy_type: None,
            category: Some(expense.category.as_str().to_string()),
            user_id: Some(expense.user_id.clone()),
            created_at: time.clone(),
            timestamp: time,
            origin: expense.is_local().then(|| LOCAL_ORIGIN.to_string()),
        }
    }

    /// Canonical time: `createdAt`, then `timestamp`.
    pub fn canonical_time(&self) -> Option<DateTime<Utc>> {
        self.created_at
            .as_ref()
            .and_then(parse_instant)
            .or_else(|| self.timestamp.as_ref().and_then(parse_instant))
    }

    /// Normalises the record; `None` when it has no id.
    pub fn into_expense(self, anonymous_user_id: &str) -> Option<Expense> {
        let id = self.id.clone().filter(|id| !id.trim().is_empty())?;
        let created_at = self.canonical_time();

        let raw_method = self.payment_method.as_deref().or(self.legacy_type.as_deref());
        let payment_method = match raw_method {
            None => PaymentMethod::Cash,
            Some(raw) => PaymentMethod::parse(raw).unwrap_or_else(|| {
                warn!("Expense {} has unknown payment method '{}', using Cash", id, raw);
                PaymentMethod::Cash
            }),
        };

        let origin = match self.origin.as_deref() {
            Some(o) if o.eq_ignore_ascii_case(LOCAL_ORIGIN) => RecordOrigin::Local,
            _ => RecordOrigin::Remote,
        };

        Some(Expense {
            id,
            title: self.title,
            amount: self.amount,
            payment_method,
            category: Category::parse_or_other(self.category.as_deref()),
            user_id: self
                .user_id
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| anonymous_user_id.to_string()),
            created_at,
            origin,
        })
    }
}

/// Normalises a batch, dropping records without an id.
pub fn normalize_records(records: Vec<ExpenseRecord>, anonymous_user_id: &str) -> Vec<Expense> {
    let total = records.len();
    let expenses: Vec<Expense> = records
        .into_iter()
        .filter_map(|r| r.into_expense(anonymous_user_id))
        .collect();
    if expenses.len() < total {
        warn!("Skipped {} expense record(s) without an id", total - expenses.len());
    }
    expenses
}

/// Reads a stored time value.
pub fn parse_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_time_str(s.trim()),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            Utc.timestamp_opt(seconds, u32::try_from(nanos).ok()?).single()
        }
        _ => None,
    }
}

fn parse_time_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    // PostgreSQL text form, e.g. "2024-03-10 10:00:00+00"
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(t) = DateTime::parse_from_str(s, fmt) {
            return Some(t.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(t.and_utc());
        }
    }
    s.parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_title<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_string(deserializer)?.unwrap_or_default())
}

// Unparseable amounts read as 0 rather than rejecting the whole record.
fn lenient_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let amount = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => ExpenseDraft::parse_amount(&s),
        _ => None,
    };
    Ok(amount.filter(|a| a.is_finite()).unwrap_or(0.0))
}
