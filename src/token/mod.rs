//! Session token codec.
//!
//! A session token is a compact three-segment signed credential
//! (`header.payload.signature`) identifying one class occurrence: a
//! `{course, schedule slot, session date}` tuple with an absolute expiry
//! instant. The client decodes the payload into typed claims and keeps the
//! header and signature segments opaque; verification happens on the
//! service side at submission time, over TLS. Verifying offline would
//! require distributing the issuer's public key to clients, which this
//! system does not do. The token is a bearer credential inside a narrow
//! time/space/identity envelope, not a general auth mechanism.
//!
//! Expiry is the only deactivation mechanism: minting a new token for the
//! same tuple never invalidates previously issued ones.

mod error;

pub use error::TokenError;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

/// Tokens are always `header.payload.signature`.
const SEGMENT_COUNT: usize = 3;

static HHMM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]$").unwrap());

fn default_course_name() -> String {
    "Clase".to_string()
}

/// Typed claims carried in the payload segment.
///
/// Field names are exactly the wire keys the service signs. Everything
/// except `materia_nombre` (display-only, defaulted) is required, and
/// unknown keys are rejected outright rather than silently ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenClaims {
    /// Course identifier
    pub materia_id: i64,
    /// Schedule slot identifier
    pub horario_id: i64,
    /// Issuing teacher identifier
    pub docente_id: i64,
    /// Course display name; informational only, not trust-bearing
    #[serde(default = "default_course_name")]
    pub materia_nombre: String,
    /// Weekday label, copied from the schedule at issue time
    pub dia_semana: String,
    /// Slot start, "HH:MM"
    pub hora_inicio: String,
    /// Slot end, "HH:MM"
    pub hora_fin: String,
    /// Calendar date this token is valid for
    pub fecha: NaiveDate,
    /// Absolute expiry, unix seconds. Hard boundary, no grace period.
    pub exp: i64,
}

impl TokenClaims {
    /// Shape checks that serde's schema pass cannot express.
    fn check_fields(&self) -> Result<(), TokenError> {
        if !HHMM_REGEX.is_match(&self.hora_inicio) {
            return Err(TokenError::Field {
                name: "hora_inicio",
                message: format!("is not HH:MM: {:?}", self.hora_inicio),
            });
        }
        if !HHMM_REGEX.is_match(&self.hora_fin) {
            return Err(TokenError::Field {
                name: "hora_fin",
                message: format!("is not HH:MM: {:?}", self.hora_fin),
            });
        }
        if self.dia_semana.is_empty() {
            return Err(TokenError::Field {
                name: "dia_semana",
                message: "is empty".to_string(),
            });
        }
        Ok(())
    }

    /// Mirror of [`SessionToken::decode`]: serializes the claims, encodes
    /// them as base64url, and joins them with already-encoded header and
    /// signature segments.
    ///
    /// The client never signs anything itself; the signature segment
    /// always comes from the issuing service. This exists for the service
    /// contract documentation and for building tokens in tests.
    pub fn encode_with(&self, header_segment: &str, signature_segment: &str) -> String {
        let payload = serde_json::to_vec(self).expect("token claims serialize to JSON");
        format!(
            "{}.{}.{}",
            header_segment,
            URL_SAFE_NO_PAD.encode(payload),
            signature_segment
        )
    }
}

/// A decoded session token, with the original text preserved verbatim.
///
/// The raw text, not the decoded claims, is what gets submitted to the
/// service, so the signature travels intact.
#[derive(Debug, Clone)]
pub struct SessionToken {
    claims: TokenClaims,
    header: String,
    signature: String,
    raw: String,
}

impl SessionToken {
    /// Decodes the three-segment text into typed claims.
    ///
    /// Fails with a [`TokenError`] when the segment count is not 3, the
    /// payload is not base64url JSON, a required key is missing or of the
    /// wrong type, an unknown key is present, or a field fails its shape
    /// check. The header and signature segments are retained opaquely; no
    /// verification is attempted here.
    pub fn decode(raw: &str) -> Result<Self, TokenError> {
        let segments: Vec<&str> = raw.split('.').collect();
        if segments.len() != SEGMENT_COUNT {
            return Err(TokenError::SegmentCount {
                count: segments.len(),
            });
        }

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(segments[1])
            .map_err(|e| TokenError::Transport {
                message: e.to_string(),
            })?;

        let claims: TokenClaims =
            serde_json::from_slice(&payload_bytes).map_err(|e| TokenError::Payload {
                message: e.to_string(),
            })?;
        claims.check_fields()?;

        Ok(Self {
            claims,
            header: segments[0].to_string(),
            signature: segments[2].to_string(),
            raw: raw.to_string(),
        })
    }

    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    /// The exact text that was scanned; submit this, never a re-encoding.
    pub fn raw_text(&self) -> &str {
        &self.raw
    }

    /// The header segment, opaque to the client.
    pub fn header_segment(&self) -> &str {
        &self.header
    }

    /// The signature segment, opaque to the client.
    pub fn signature_segment(&self) -> &str {
        &self.signature
    }

    /// Advisory expiry check: `now >= exp`, equality counts as expired.
    ///
    /// This exists to fail fast before spending a location fetch; the
    /// service re-checks expiry with its own clock at submission and that
    /// answer is the authoritative one.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.claims.exp
    }

    /// Absolute expiry instant, unix seconds.
    pub fn expires_at(&self) -> i64 {
        self.claims.exp
    }

    pub fn fingerprint(&self) -> TokenFingerprint {
        TokenFingerprint::of(&self.raw)
    }
}

/// A short hash of a token's raw text, safe to log and use as a map key.
///
/// Raw tokens are bearer credentials and never appear in log output; this
/// stands in for them everywhere.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct TokenFingerprint(String);

impl TokenFingerprint {
    pub fn of(raw: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(raw.as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TokenFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only the first 8 chars; enough to correlate log lines
        write!(f, "{}...", &self.0[..8.min(self.0.len())])
    }
}

/// Helper module for hex encoding (avoiding an extra dependency).
mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}
