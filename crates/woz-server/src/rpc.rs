use serde::{Deserialize, Serialize};

/// Client→server protocol frame.
///
/// `id` is the optional acknowledgement handle: when present on a
/// `send_message` frame, the client receives an [`Ack`] for it.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub id: Option<serde_json::Value>,
}

/// Acknowledgement for a frame that carried an id: `{ id, ok, error? }`.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub id: serde_json::Value,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub fn ok(id: serde_json::Value) -> Self {
        Self {
            id,
            ok: true,
            error: None,
        }
    }

    pub fn err(id: serde_json::Value, error: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// Extract an optional string param.
pub fn optional_str<'a>(params: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

/// Extract a string param that must be present and non-empty.
pub fn non_empty_str<'a>(params: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    optional_str(params, key).filter(|s| !s.is_empty())
}
