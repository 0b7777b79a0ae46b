//! Error taxonomy for attendance service calls.

use thiserror::Error;

/// Failure classifications for ledger operations.
///
/// The service answers with a specific, distinguishable classification for
/// every rejected submission; each one maps to a materially different
/// user action (re-scan, contact the teacher, nothing at all when already
/// recorded), so the variants stay separate instead of collapsing into a
/// generic failure.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// No connectivity, or the request itself failed in transport
    #[error("connection error: {message}")]
    Network { message: String },

    /// The configured base URL does not parse
    #[error("invalid service URL: {message}")]
    BadUrl { message: String },

    /// The service answered with a success status but an unreadable body
    #[error("unexpected response: {message}")]
    UnexpectedResponse { message: String },

    /// 400: the submission was malformed
    #[error("{message}")]
    MalformedSubmission { message: String },

    /// 403: the student is not enrolled in the token's course
    #[error("{message}")]
    NotEnrolled { message: String },

    /// 409: an attendance record already exists for this student and
    /// session; the ledger keeps at most one
    #[error("{message}")]
    AlreadyRegistered { message: String },

    /// 500: server fault
    #[error("internal server error")]
    ServerFault,

    /// Any status outside the documented contract
    #[error("unexpected status {status}: {message}")]
    Unclassified { status: u16, message: String },
}

impl LedgerError {
    /// True when the service itself rejected the call (as opposed to the
    /// transport failing before an answer existed).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::MalformedSubmission { .. }
                | LedgerError::NotEnrolled { .. }
                | LedgerError::AlreadyRegistered { .. }
                | LedgerError::ServerFault
                | LedgerError::Unclassified { .. }
        )
    }

    /// True for the duplicate-check-in case, which the UI treats as
    /// "already recorded" rather than a failure to act on.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, LedgerError::AlreadyRegistered { .. })
    }

    /// True when the failure never reached the service.
    pub fn is_transport(&self) -> bool {
        matches!(self, LedgerError::Network { .. })
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        LedgerError::Network {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for LedgerError {
    fn from(err: url::ParseError) -> Self {
        LedgerError::BadUrl {
            message: err.to_string(),
        }
    }
}
