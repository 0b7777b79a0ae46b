//! Client core for a QR-based, geofenced class attendance service.
//!
//! Students scan a class session QR code and submit a check-in together
//! with their device location; teachers mint time-boxed session tokens
//! and render them as QR codes. The attendance service is the single
//! source of truth for every acceptance decision (token signature and
//! expiry, enrollment, the geofence, and the at-most-one-record-per-
//! student-per-session invariant). This crate owns the client-side
//! pipeline around that contract:
//!
//! - [`token`]: the session token codec (decode, advisory expiry,
//!   fingerprints; signature kept opaque on the client),
//! - [`geo`]: the advisory geofence evaluator,
//! - [`issuer`]: teacher-side session minting and QR rendering,
//! - [`checkin`]: the student-side check-in state machine and its async
//!   driver,
//! - [`ledger`]: the HTTP client for the service itself.

pub mod checkin;
pub mod config;
pub mod geo;
pub mod issuer;
pub mod ledger;
pub mod token;

pub use checkin::{CheckInAttempt, CheckInFlow, CheckInState, FailureReason};
pub use config::ClientConfig;
pub use geo::GeoPoint;
pub use issuer::{IssuedSession, SessionIssuer};
pub use ledger::{LedgerClient, LedgerError};
pub use token::{SessionToken, TokenClaims, TokenError};
