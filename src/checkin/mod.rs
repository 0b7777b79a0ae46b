//! Student-side check-in orchestration.
//!
//! One attempt is one scan cycle: scan → decode and advisory expiry check
//! → location fix → explicit confirmation → one submission → terminal
//! result. The attempt is modeled as an immutable state machine: every
//! event consumes the current value and returns its successor, and an
//! event that does not apply to the current state is an identity
//! transition. That one rule is what drops stale async results (a late
//! location fix after a restart lands on a fresh `Scanning` value and is
//! ignored) and what makes confirming again while a submission is in
//! flight a no-op.
//!
//! Nothing here is persisted; discarding the value discards the attempt.

mod flow;

pub use flow::{CheckInFlow, FixedLocationProvider, LocationError, LocationProvider};

use crate::geo::GeoPoint;
use crate::ledger::{CheckInResponse, LedgerError};
use crate::token::{SessionToken, TokenError};
use std::fmt;
use tracing::debug;

/// Discriminant of the attempt's state, for display and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckInState {
    Scanning,
    Validating,
    AcquiringLocation,
    Confirmation,
    Submitting,
    Success,
    Error,
}

impl fmt::Display for CheckInState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckInState::Scanning => "scanning",
            CheckInState::Validating => "validating",
            CheckInState::AcquiringLocation => "acquiring-location",
            CheckInState::Confirmation => "confirmation",
            CheckInState::Submitting => "submitting",
            CheckInState::Success => "success",
            CheckInState::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Why an attempt ended in the error state.
///
/// Each cause renders to a distinct message; each asks the student for a
/// different next step (re-scan, fix permissions, check connectivity, or
/// nothing at all when attendance is already recorded).
#[derive(Debug, Clone)]
pub enum FailureReason {
    /// The scanned text is not a session token
    InvalidCode(TokenError),
    /// The token's validity window has already passed
    ExpiredCode,
    /// The platform could not produce a location fix
    LocationUnavailable(LocationError),
    /// The service rejected the submission, or the transport failed
    Submission(LedgerError),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::InvalidCode(_) => write!(f, "invalid code"),
            FailureReason::ExpiredCode => write!(f, "code expired"),
            FailureReason::LocationUnavailable(e) => {
                write!(f, "could not obtain location: {}", e)
            }
            FailureReason::Submission(e) => write!(f, "{}", e),
        }
    }
}

/// One scan cycle's state, with exactly the data valid in that state.
///
/// Created when the check-in flow opens, discarded on restart or exit.
#[derive(Debug, Clone)]
pub enum CheckInAttempt {
    /// Waiting for a scan result
    Scanning,
    /// Raw text captured, not yet decoded
    Validating { raw: String },
    /// Token decoded and unexpired; waiting on the platform for a fix
    AcquiringLocation { token: SessionToken },
    /// Everything gathered; waiting for the student's explicit go-ahead
    Confirmation {
        token: SessionToken,
        location: GeoPoint,
    },
    /// The single submission is in flight
    Submitting {
        token: SessionToken,
        location: GeoPoint,
    },
    /// The service created a record
    Success {
        token: SessionToken,
        outcome: CheckInResponse,
    },
    /// Terminal failure; recovery is an explicit restart
    Error { reason: FailureReason },
}

impl CheckInAttempt {
    pub fn new() -> Self {
        CheckInAttempt::Scanning
    }

    pub fn state(&self) -> CheckInState {
        match self {
            CheckInAttempt::Scanning => CheckInState::Scanning,
            CheckInAttempt::Validating { .. } => CheckInState::Validating,
            CheckInAttempt::AcquiringLocation { .. } => CheckInState::AcquiringLocation,
            CheckInAttempt::Confirmation { .. } => CheckInState::Confirmation,
            CheckInAttempt::Submitting { .. } => CheckInState::Submitting,
            CheckInAttempt::Success { .. } => CheckInState::Success,
            CheckInAttempt::Error { .. } => CheckInState::Error,
        }
    }

    /// A scan delivered raw text.
    pub fn scan_received(self, raw: &str) -> Self {
        match self {
            CheckInAttempt::Scanning => CheckInAttempt::Validating {
                raw: raw.to_string(),
            },
            other => other.ignoring("scan result"),
        }
    }

    /// Decodes the held text and runs the advisory expiry check.
    ///
    /// `now` is unix seconds. The service re-checks expiry with its own
    /// clock at submission and that answer decides; this pass only fails
    /// fast before spending a location fetch, and expiry is not checked
    /// again between the location fix and the submission.
    pub fn validate(self, now: i64) -> Self {
        match self {
            CheckInAttempt::Validating { raw } => match SessionToken::decode(&raw) {
                Ok(token) if token.is_expired(now) => CheckInAttempt::Error {
                    reason: FailureReason::ExpiredCode,
                },
                Ok(token) => CheckInAttempt::AcquiringLocation { token },
                Err(e) => CheckInAttempt::Error {
                    reason: FailureReason::InvalidCode(e),
                },
            },
            other => other.ignoring("validate"),
        }
    }

    /// The platform produced a fix.
    pub fn location_acquired(self, location: GeoPoint) -> Self {
        match self {
            CheckInAttempt::AcquiringLocation { token } => {
                CheckInAttempt::Confirmation { token, location }
            }
            other => other.ignoring("location fix"),
        }
    }

    /// The platform could not produce a fix. Never retried automatically.
    pub fn location_failed(self, error: LocationError) -> Self {
        match self {
            CheckInAttempt::AcquiringLocation { .. } => CheckInAttempt::Error {
                reason: FailureReason::LocationUnavailable(error),
            },
            other => other.ignoring("location failure"),
        }
    }

    /// Explicit user confirmation.
    ///
    /// A no-op in every other state, in particular while a submission is
    /// already in flight; that keeps submissions strictly one-at-a-time
    /// per attempt.
    pub fn confirmed(self) -> Self {
        match self {
            CheckInAttempt::Confirmation { token, location } => {
                CheckInAttempt::Submitting { token, location }
            }
            other => other.ignoring("confirm"),
        }
    }

    /// The single in-flight submission resolved.
    pub fn submission_resolved(self, result: Result<CheckInResponse, LedgerError>) -> Self {
        match self {
            CheckInAttempt::Submitting { token, .. } => match result {
                Ok(outcome) => CheckInAttempt::Success { token, outcome },
                Err(e) => CheckInAttempt::Error {
                    reason: FailureReason::Submission(e),
                },
            },
            other => other.ignoring("submission result"),
        }
    }

    /// Full reset. Nothing from the prior attempt carries over.
    pub fn restart(self) -> Self {
        CheckInAttempt::Scanning
    }

    /// The decoded token, once one exists.
    pub fn token(&self) -> Option<&SessionToken> {
        match self {
            CheckInAttempt::AcquiringLocation { token }
            | CheckInAttempt::Confirmation { token, .. }
            | CheckInAttempt::Submitting { token, .. }
            | CheckInAttempt::Success { token, .. } => Some(token),
            _ => None,
        }
    }

    /// The exact text to submit, once known.
    pub fn raw_token_text(&self) -> Option<&str> {
        match self {
            CheckInAttempt::Validating { raw } => Some(raw),
            other => other.token().map(SessionToken::raw_text),
        }
    }

    /// The captured fix, once one exists.
    pub fn location(&self) -> Option<GeoPoint> {
        match self {
            CheckInAttempt::Confirmation { location, .. }
            | CheckInAttempt::Submitting { location, .. } => Some(*location),
            _ => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&FailureReason> {
        match self {
            CheckInAttempt::Error { reason } => Some(reason),
            _ => None,
        }
    }

    /// The created record, on success.
    pub fn outcome(&self) -> Option<&CheckInResponse> {
        match self {
            CheckInAttempt::Success { outcome, .. } => Some(outcome),
            _ => None,
        }
    }

    fn ignoring(self, event: &str) -> Self {
        debug!(
            state = %self.state(),
            event,
            "Dropping event that does not apply to the current state"
        );
        self
    }
}

impl Default for CheckInAttempt {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::AttendanceRecord;
    use crate::token::TokenClaims;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use chrono::NaiveDate;

    const NOW: i64 = 1_800_000_000;

    fn signed_token(exp: i64) -> String {
        let claims = TokenClaims {
            materia_id: 5,
            horario_id: 9,
            docente_id: 2,
            materia_nombre: "Algebra".to_string(),
            dia_semana: "lunes".to_string(),
            hora_inicio: "08:00".to_string(),
            hora_fin: "10:00".to_string(),
            fecha: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            exp,
        };
        claims.encode_with(
            &URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
            &URL_SAFE_NO_PAD.encode(b"sig"),
        )
    }

    fn sample_outcome() -> CheckInResponse {
        CheckInResponse {
            message: "Asistencia registrada".to_string(),
            asistencia: AttendanceRecord {
                id: 31,
                estudiante_id: 7,
                materia_id: 5,
                fecha: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
                hora_registro: "2025-03-10T08:12:30.000Z".to_string(),
                ubicacion_lat: -17.3935,
                ubicacion_lng: -66.157,
                distancia_metros: 12.4,
            },
        }
    }

    fn here() -> GeoPoint {
        GeoPoint::new(-17.3935, -66.157)
    }

    #[test]
    fn test_valid_scan_reaches_location_acquisition() {
        let attempt = CheckInAttempt::new()
            .scan_received(&signed_token(NOW + 3_600))
            .validate(NOW);
        assert_eq!(attempt.state(), CheckInState::AcquiringLocation);
        assert!(attempt.token().is_some());
    }

    #[test]
    fn test_expired_token_fails_before_location() {
        let attempt = CheckInAttempt::new()
            .scan_received(&signed_token(NOW - 3_600))
            .validate(NOW);
        assert_eq!(attempt.state(), CheckInState::Error);
        assert!(matches!(
            attempt.failure_reason(),
            Some(FailureReason::ExpiredCode)
        ));
        assert_eq!(attempt.failure_reason().unwrap().to_string(), "code expired");
    }

    #[test]
    fn test_malformed_scan_fails_before_location() {
        let attempt = CheckInAttempt::new()
            .scan_received("onlyonepart")
            .validate(NOW);
        assert_eq!(attempt.state(), CheckInState::Error);
        assert!(matches!(
            attempt.failure_reason(),
            Some(FailureReason::InvalidCode(_))
        ));
        assert_eq!(attempt.failure_reason().unwrap().to_string(), "invalid code");
    }

    #[test]
    fn test_happy_path_to_success() {
        let attempt = CheckInAttempt::new()
            .scan_received(&signed_token(NOW + 3_600))
            .validate(NOW)
            .location_acquired(here())
            .confirmed()
            .submission_resolved(Ok(sample_outcome()));
        assert_eq!(attempt.state(), CheckInState::Success);
        assert_eq!(attempt.outcome().unwrap().asistencia.id, 31);
    }

    #[test]
    fn test_duplicate_rejection_is_an_error_state_not_a_fault() {
        let attempt = CheckInAttempt::new()
            .scan_received(&signed_token(NOW + 3_600))
            .validate(NOW)
            .location_acquired(here())
            .confirmed()
            .submission_resolved(Err(LedgerError::AlreadyRegistered {
                message: "already registered today".to_string(),
            }));
        assert_eq!(attempt.state(), CheckInState::Error);
        assert_eq!(
            attempt.failure_reason().unwrap().to_string(),
            "already registered today"
        );
    }

    #[test]
    fn test_location_failure_is_terminal() {
        let attempt = CheckInAttempt::new()
            .scan_received(&signed_token(NOW + 3_600))
            .validate(NOW)
            .location_failed(LocationError::NoFix);
        assert_eq!(attempt.state(), CheckInState::Error);
        let message = attempt.failure_reason().unwrap().to_string();
        assert!(message.starts_with("could not obtain location"), "{message}");
    }

    #[test]
    fn test_confirm_while_submitting_is_a_noop() {
        let submitting = CheckInAttempt::new()
            .scan_received(&signed_token(NOW + 3_600))
            .validate(NOW)
            .location_acquired(here())
            .confirmed();
        assert_eq!(submitting.state(), CheckInState::Submitting);

        let still_submitting = submitting.confirmed();
        assert_eq!(still_submitting.state(), CheckInState::Submitting);
    }

    #[test]
    fn test_stale_location_fix_after_restart_is_dropped() {
        let attempt = CheckInAttempt::new()
            .scan_received(&signed_token(NOW + 3_600))
            .validate(NOW)
            .restart()
            // Arrives late, from the cancelled acquisition
            .location_acquired(here());
        assert_eq!(attempt.state(), CheckInState::Scanning);
        assert!(attempt.location().is_none());
    }

    #[test]
    fn test_restart_clears_everything_from_any_state() {
        let confirmed = CheckInAttempt::new()
            .scan_received(&signed_token(NOW + 3_600))
            .validate(NOW)
            .location_acquired(here());
        assert!(confirmed.token().is_some());
        assert!(confirmed.location().is_some());

        let reset = confirmed.restart();
        assert_eq!(reset.state(), CheckInState::Scanning);
        assert!(reset.token().is_none());
        assert!(reset.location().is_none());
        assert!(reset.failure_reason().is_none());
        assert!(reset.raw_token_text().is_none());

        // A fresh scan is unaffected by the discarded attempt
        let next = reset
            .scan_received(&signed_token(NOW + 7_200))
            .validate(NOW);
        assert_eq!(next.state(), CheckInState::AcquiringLocation);
    }

    #[test]
    fn test_failure_messages_are_distinct_per_cause() {
        let reasons = [
            FailureReason::InvalidCode(TokenError::SegmentCount { count: 1 }),
            FailureReason::ExpiredCode,
            FailureReason::LocationUnavailable(LocationError::PermissionDenied),
            FailureReason::Submission(LedgerError::NotEnrolled {
                message: "you are not enrolled in this course".to_string(),
            }),
            FailureReason::Submission(LedgerError::AlreadyRegistered {
                message: "already registered today".to_string(),
            }),
            FailureReason::Submission(LedgerError::Network {
                message: "connection refused".to_string(),
            }),
        ];
        let messages: Vec<String> = reasons.iter().map(|r| r.to_string()).collect();
        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_raw_text_is_preserved_verbatim_for_submission() {
        let raw = signed_token(NOW + 3_600);
        let attempt = CheckInAttempt::new().scan_received(&raw).validate(NOW);
        assert_eq!(attempt.raw_token_text(), Some(raw.as_str()));
    }
}
