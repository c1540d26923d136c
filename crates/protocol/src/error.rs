//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering malformed client requests.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Failed to deserialize data.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The RPC call name is not one of the known calls.
    #[error("unknown rpc call: {0}")]
    UnknownCall(String),

    /// The RPC call needs an argument that the request did not carry.
    #[error("rpc call {call} is missing argument {index}")]
    MissingArgument {
        /// The call being dispatched.
        call: &'static str,
        /// Zero-based position of the missing argument.
        index: usize,
    },
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Deserialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_call_display() {
        let err = ProtocolError::UnknownCall("chmod".to_string());
        assert_eq!(err.to_string(), "unknown rpc call: chmod");
    }

    #[test]
    fn test_missing_argument_display() {
        let err = ProtocolError::MissingArgument { call: "mv", index: 1 };
        assert_eq!(err.to_string(), "rpc call mv is missing argument 1");
    }

    #[test]
    fn test_from_json_syntax_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ProtocolError = json_err.into();
        assert!(matches!(err, ProtocolError::Deserialization(_)));
    }
}
