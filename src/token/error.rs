//! Decode error taxonomy for session tokens.

use thiserror::Error;

/// Reasons a scanned text is not a usable session token.
///
/// Every variant is a malformed-token classification from the client's
/// point of view; expiry is not an error here (it is a property checked
/// separately, because an expired token still decodes).
#[derive(Debug, Clone, Error)]
pub enum TokenError {
    /// The text does not have the three `.`-separated segments
    #[error("malformed token: expected 3 segments, got {count}")]
    SegmentCount { count: usize },

    /// The payload segment is not valid base64url
    #[error("malformed token: payload is not base64url: {message}")]
    Transport { message: String },

    /// The payload decoded but is missing required keys, carries unknown
    /// keys, or has a value of the wrong type
    #[error("malformed token: {message}")]
    Payload { message: String },

    /// A required field decoded but fails its shape check
    #[error("malformed token: field `{name}` {message}")]
    Field { name: &'static str, message: String },
}
