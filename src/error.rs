//! Error types for roomzin-client.

use thiserror::Error;

/// Server status codes the router treats as transient and retries.
pub const TRANSIENT_STATUS_CODES: [&str; 2] = ["503", "429"];

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum RoomzinError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error during cluster discovery probes.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error decoding a discovery endpoint body.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Protocol error (bad magic, truncated frame, field overrun, trailing bytes).
    ///
    /// Always fatal to the connection that observed it.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A value codec rejected its input (packed date, identifier, ...).
    #[error("decode error: {0}")]
    Decode(String),

    /// A request payload or configuration failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// The login handshake was rejected or produced an unexpected reply.
    #[error("login failed: {0}")]
    Login(String),

    /// Cluster topology could not be resolved, or no viable transport exists.
    #[error("cluster error: {0}")]
    Topology(String),

    /// The server answered with an `ERROR` status.
    ///
    /// `code` follows the wire convention `CODE:message`; when the message
    /// carries no code prefix, the whole message doubles as the code.
    #[error("server error {code}: {message}")]
    Server { code: String, message: String },

    /// No response arrived within the configured window.
    #[error("request timed out")]
    Timeout,

    /// The connection carrying the request was lost.
    #[error("connection closed")]
    ConnectionClosed,

    /// The handler was shut down while the request was pending.
    #[error("handler closed")]
    HandlerClosed,
}

impl RoomzinError {
    /// Build a `Server` error from a raw server message.
    ///
    /// Splits on the first `:` into code and message, matching the
    /// `CODE:message` convention used by the cache server.
    pub fn from_server_message(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((code, message)) => RoomzinError::Server {
                code: code.to_string(),
                message: message.to_string(),
            },
            None => RoomzinError::Server {
                code: raw.to_string(),
                message: raw.to_string(),
            },
        }
    }

    /// True for server statuses the router may retry (`503`, `429`).
    pub fn is_transient(&self) -> bool {
        match self {
            RoomzinError::Server { code, .. } => TRANSIENT_STATUS_CODES.contains(&code.as_str()),
            _ => false,
        }
    }
}

/// Result type alias using RoomzinError.
pub type Result<T> = std::result::Result<T, RoomzinError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_server_message_with_code() {
        let err = RoomzinError::from_server_message("NOT_FOUND:no such property");
        match err {
            RoomzinError::Server { code, message } => {
                assert_eq!(code, "NOT_FOUND");
                assert_eq!(message, "no such property");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_server_message_without_code() {
        let err = RoomzinError::from_server_message("503");
        match &err {
            RoomzinError::Server { code, message } => {
                assert_eq!(code, "503");
                assert_eq!(message, "503");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        assert!(RoomzinError::from_server_message("429:slow down").is_transient());
        assert!(!RoomzinError::from_server_message("405:gone").is_transient());
        assert!(!RoomzinError::Timeout.is_transient());
    }
}
