/// Typed errors for relay protocol operations.
///
/// Absence of a session is never an error: referencing an unknown id
/// creates an empty one, so there is no `NotFound` variant.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// A required identifying field was missing or malformed.
    #[error("{0}")]
    InvalidRequest(String),
    /// Neither non-empty text nor a valid image attachment was supplied.
    #[error("Empty message")]
    EmptyMessage,
}

impl RelayError {
    pub fn missing(fields: &str) -> Self {
        Self::InvalidRequest(format!("Missing {fields}"))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::EmptyMessage => "empty_message",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_message_display_matches_ack_text() {
        assert_eq!(RelayError::EmptyMessage.to_string(), "Empty message");
    }

    #[test]
    fn missing_fields_display() {
        let err = RelayError::missing("sessionId or role");
        assert_eq!(err.to_string(), "Missing sessionId or role");
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(RelayError::EmptyMessage.error_kind(), "empty_message");
        assert_eq!(
            RelayError::InvalidRequest("x".into()).error_kind(),
            "invalid_request"
        );
    }
}
