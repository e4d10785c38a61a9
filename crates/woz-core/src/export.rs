//! CSV export of a session transcript for research analysis.
//!
//! Pure functions over a `Session` snapshot; the caller is responsible for
//! handing in a consistent snapshot.

use chrono::TimeZone;
use chrono_tz::America::Los_Angeles;

use crate::session::Session;

const HEADER: &str = "timestamp,role,message,tone,imageName,notes";

/// Quote-wrap a field when it contains a comma, quote, or line break;
/// internal quotes are doubled.
fn escape_csv(value: &str) -> String {
    let needs_quotes = value.contains([',', '"', '\n', '\r']);
    let escaped = value.replace('"', "\"\"");
    if needs_quotes {
        format!("\"{escaped}\"")
    } else {
        escaped
    }
}

/// Render a ms-epoch timestamp in Pacific time, 24-hour clock.
pub fn format_timestamp_pacific(ms: i64) -> String {
    Los_Angeles
        .timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.format("%Y/%m/%d, %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Flatten a session into CSV: one row per transcript message.
pub fn session_to_csv(session: &Session) -> String {
    let mut lines = Vec::with_capacity(session.transcript.len() + 1);
    lines.push(HEADER.to_string());

    for m in &session.transcript {
        let ts = escape_csv(&format_timestamp_pacific(m.timestamp));
        let role = m.role.to_string();
        let msg = escape_csv(&m.message);
        let tone = escape_csv(m.tone.as_deref().unwrap_or(""));
        let image_name = escape_csv(m.image_name.as_deref().unwrap_or(""));
        let notes = escape_csv(m.notes.as_deref().unwrap_or(""));
        lines.push(format!("{ts},{role},{msg},{tone},{image_name},{notes}"));
    }

    lines.join("\n")
}
