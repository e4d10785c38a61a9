//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `4000`; `0` auto-assigns).
    pub port: u16,
    /// Per-client outbound queue bound.
    pub max_send_queue: usize,
    /// Transport-level payload cap, applied to WebSocket messages and
    /// HTTP bodies alike. Sized for inline base64 image attachments.
    pub max_payload_bytes: usize,
    /// Allowed CORS origin; `None` allows any origin.
    pub cors_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 4000,
            max_send_queue: 256,
            max_payload_bytes: 25 * 1024 * 1024, // 25 MB
            cors_origin: None,
        }
    }
}
