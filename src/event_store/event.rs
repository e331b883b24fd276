//! Event normalization from raw tracking payloads to the typed `Event`
//!
//! Tracking clients post a loose JSON bag under `event_data`. It is parsed
//! once, at ingestion, into the `EventPayload` variant that matches the
//! `event_type` tag, so the aggregator never probes for fields at runtime.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PAGE_VIEW: &str = "page_view";
pub const CLICK: &str = "click";
pub const CONVERSION: &str = "conversion";
pub const SESSION_END: &str = "session_end";
pub const TRAFFIC_SOURCE: &str = "traffic_source";
pub const FUNNEL_STEP: &str = "funnel_step";
pub const FORM_ABANDONMENT: &str = "form_abandonment";
pub const CTA_CLICK: &str = "cta_click";
pub const USER_TYPE: &str = "user_type";
pub const PERFORMANCE: &str = "performance";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingField(&'static str),
    InvalidTimestamp(String),
    InvalidEventData(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MissingField(field) => write!(f, "missing required field: {}", field),
            ValidationError::InvalidTimestamp(raw) => write!(f, "invalid timestamp: {}", raw),
            ValidationError::InvalidEventData(msg) => write!(f, "invalid event_data: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(rename = "userAgent", alias = "user_agent", skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Click {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Conversion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionEnd {
    /// Session length in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interactions: Option<f64>,
    #[serde(deserialize_with = "null_as_false")]
    pub bounced: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunnelStep {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormAbandonment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CtaClick {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserType {
    #[serde(deserialize_with = "null_as_false")]
    pub returning: bool,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Performance {
    /// Seconds until the load event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_time: Option<f64>,
    /// Seconds until DOMContentLoaded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dom_content_loaded: Option<f64>,
}

/// Flags sent as an explicit `null` read as unset.
fn null_as_false<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Type-dependent attributes of an event, keyed by its `event_type` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    PageView(PageView),
    Click(Click),
    Conversion(Conversion),
    SessionEnd(SessionEnd),
    TrafficSource(TrafficSource),
    FunnelStep(FunnelStep),
    FormAbandonment(FormAbandonment),
    CtaClick(CtaClick),
    UserType(UserType),
    Performance(Performance),
    /// Event types outside the known set keep their raw attributes
    Other {
        event_type: String,
        data: Map<String, Value>,
    },
}

impl EventPayload {
    /// Build the payload variant for `event_type` from its attribute bag.
    ///
    /// `data` must be a JSON object or null (treated as empty).
    pub fn from_parts(event_type: &str, data: Value) -> Result<Self, ValidationError> {
        let data = match data {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(ValidationError::InvalidEventData(format!(
                    "expected an object, got {}",
                    json_kind(&other)
                )))
            }
        };

        let payload = match event_type {
            PAGE_VIEW => EventPayload::PageView(parse(data)?),
            CLICK => EventPayload::Click(parse(data)?),
            CONVERSION => EventPayload::Conversion(parse(data)?),
            SESSION_END => EventPayload::SessionEnd(parse(data)?),
            TRAFFIC_SOURCE => EventPayload::TrafficSource(parse(data)?),
            FUNNEL_STEP => EventPayload::FunnelStep(parse(data)?),
            FORM_ABANDONMENT => EventPayload::FormAbandonment(parse(data)?),
            CTA_CLICK => EventPayload::CtaClick(parse(data)?),
            USER_TYPE => EventPayload::UserType(parse(data)?),
            PERFORMANCE => EventPayload::Performance(parse(data)?),
            other => EventPayload::Other {
                event_type: other.to_string(),
                data,
            },
        };

        Ok(payload)
    }

    pub fn event_type(&self) -> &str {
        match self {
            EventPayload::PageView(_) => PAGE_VIEW,
            EventPayload::Click(_) => CLICK,
            EventPayload::Conversion(_) => CONVERSION,
            EventPayload::SessionEnd(_) => SESSION_END,
            EventPayload::TrafficSource(_) => TRAFFIC_SOURCE,
            EventPayload::FunnelStep(_) => FUNNEL_STEP,
            EventPayload::FormAbandonment(_) => FORM_ABANDONMENT,
            EventPayload::CtaClick(_) => CTA_CLICK,
            EventPayload::UserType(_) => USER_TYPE,
            EventPayload::Performance(_) => PERFORMANCE,
            EventPayload::Other { event_type, .. } => event_type,
        }
    }

    /// Attribute bag as stored in the `event_data` column.
    pub fn to_data(&self) -> Result<Value, serde_json::Error> {
        match self {
            EventPayload::PageView(p) => serde_json::to_value(p),
            EventPayload::Click(p) => serde_json::to_value(p),
            EventPayload::Conversion(p) => serde_json::to_value(p),
            EventPayload::SessionEnd(p) => serde_json::to_value(p),
            EventPayload::TrafficSource(p) => serde_json::to_value(p),
            EventPayload::FunnelStep(p) => serde_json::to_value(p),
            EventPayload::FormAbandonment(p) => serde_json::to_value(p),
            EventPayload::CtaClick(p) => serde_json::to_value(p),
            EventPayload::UserType(p) => serde_json::to_value(p),
            EventPayload::Performance(p) => serde_json::to_value(p),
            EventPayload::Other { data, .. } => Ok(Value::Object(data.clone())),
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(data: Map<String, Value>) -> Result<T, ValidationError> {
    serde_json::from_value(Value::Object(data)).map_err(|e| ValidationError::InvalidEventData(e.to_string()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// One recorded user-interaction fact. Immutable once stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub user_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn event_type(&self) -> &str {
        self.payload.event_type()
    }
}

/// Tracking payload exactly as posted by clients; every field may be absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackRequest {
    pub event_type: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub event_data: Value,
}

impl TryFrom<TrackRequest> for Event {
    type Error = ValidationError;

    fn try_from(req: TrackRequest) -> Result<Self, Self::Error> {
        let event_type = required(req.event_type, "event_type")?;
        let user_id = required(req.user_id, "user_id")?;
        let session_id = required(req.session_id, "session_id")?;
        let timestamp = match req.timestamp {
            None | Some(Value::Null) => return Err(ValidationError::MissingField("timestamp")),
            Some(raw) => parse_timestamp(&raw)?,
        };
        let payload = EventPayload::from_parts(&event_type, req.event_data)?;

        Ok(Event {
            user_id,
            session_id,
            timestamp,
            payload,
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ValidationError::MissingField(field)),
    }
}

/// Parse a client timestamp: RFC 3339 text, a bare `YYYY-MM-DD` date
/// (midnight UTC) or epoch milliseconds (number or digit string).
pub fn parse_timestamp(raw: &Value) -> Result<DateTime<Utc>, ValidationError> {
    let invalid = || ValidationError::InvalidTimestamp(raw.to_string());

    match raw {
        Value::Number(n) => {
            let millis = n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
                .ok_or_else(invalid)?;
            Utc.timestamp_millis_opt(millis).single().ok_or_else(invalid)
        }
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Err(ValidationError::MissingField("timestamp"));
            }
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Ok(ts.with_timezone(&Utc));
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
                return Ok(Utc.from_utc_datetime(&midnight));
            }
            if let Ok(millis) = s.parse::<i64>() {
                return Utc.timestamp_millis_opt(millis).single().ok_or_else(invalid);
            }
            Err(invalid())
        }
        _ => Err(invalid()),
    }
}
