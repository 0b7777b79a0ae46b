//! Teacher-side session issuing and QR rendering.
//!
//! The issuer asks the service for a signed token bound to
//! `{course, schedule slot, teacher, date}` and renders it for display.
//! Rendering is a pure text → image step; all authorization (active
//! course, slot ownership) lives on the service side.

mod cache;

pub use cache::{IssuedSessionCache, SessionSlot};

use crate::ledger::{IssueSessionRequest, LedgerClient, LedgerError};
use crate::token::{SessionToken, TokenError};
use chrono::NaiveDate;
use qrcode::render::{svg, unicode};
use qrcode::QrCode;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors surfaced while minting or rendering a session code.
///
/// None of these retry; the teacher re-triggers generation explicitly.
#[derive(Debug, Error)]
pub enum IssueError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The service answered with a token this client cannot decode
    #[error("service returned an unreadable token: {0}")]
    BadToken(#[from] TokenError),

    /// The service answered with a token that is already past its expiry
    #[error("service returned an already-expired token")]
    AlreadyExpired,

    #[error("QR rendering failed: {message}")]
    Render { message: String },
}

/// A minted session ready for display.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    token: SessionToken,
}

impl IssuedSession {
    /// Wraps an already decoded token for display.
    pub fn new(token: SessionToken) -> Self {
        Self { token }
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    /// The text a scanner will read back.
    pub fn raw_text(&self) -> &str {
        self.token.raw_text()
    }

    /// Expiry instant, unix seconds.
    pub fn expires_at(&self) -> i64 {
        self.token.expires_at()
    }

    /// Renders the token as an SVG QR image.
    pub fn to_svg(&self) -> Result<String, IssueError> {
        let code = QrCode::new(self.raw_text().as_bytes()).map_err(|e| IssueError::Render {
            message: e.to_string(),
        })?;
        Ok(code
            .render::<svg::Color>()
            .min_dimensions(256, 256)
            .dark_color(svg::Color("#000000"))
            .light_color(svg::Color("#ffffff"))
            .build())
    }

    /// Renders the token as unicode half-blocks for terminal display.
    pub fn to_terminal_string(&self) -> Result<String, IssueError> {
        let code = QrCode::new(self.raw_text().as_bytes()).map_err(|e| IssueError::Render {
            message: e.to_string(),
        })?;
        // Colors inverted so the code reads on dark terminals
        Ok(code
            .render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Light)
            .light_color(unicode::Dense1x2::Dark)
            .build())
    }
}

/// Mints session tokens for a teacher, reusing live ones per slot.
pub struct SessionIssuer {
    ledger: Arc<LedgerClient>,
    cache: IssuedSessionCache,
}

impl SessionIssuer {
    pub fn new(ledger: Arc<LedgerClient>) -> Self {
        Self {
            ledger,
            cache: IssuedSessionCache::new(),
        }
    }

    /// Returns a live session for the slot, minting a new token only when
    /// no previously issued one is still valid.
    ///
    /// A fresh mint never invalidates earlier tokens for the same slot;
    /// they all simply run out at their own expiry.
    pub async fn issue(
        &self,
        course_id: i64,
        schedule_id: i64,
        teacher_id: i64,
        date: NaiveDate,
    ) -> Result<IssuedSession, IssueError> {
        let now = chrono::Utc::now().timestamp();
        let slot = SessionSlot {
            course_id,
            schedule_id,
            date,
        };

        if let Some(session) = self.cache.get(&slot, now) {
            info!(
                course_id,
                schedule_id,
                date = %date,
                token = %session.token().fingerprint(),
                "Reusing live session token"
            );
            return Ok(session);
        }

        let response = self
            .ledger
            .issue_session(&IssueSessionRequest {
                materia_id: course_id,
                horario_id: schedule_id,
                docente_id: teacher_id,
                fecha: date,
            })
            .await?;

        let token = SessionToken::decode(&response.qr_token)?;
        if token.is_expired(now) {
            warn!(
                course_id,
                schedule_id,
                expires_at = token.expires_at(),
                "Service returned an already-expired token"
            );
            return Err(IssueError::AlreadyExpired);
        }

        let session = IssuedSession::new(token);
        info!(
            course_id,
            schedule_id,
            date = %date,
            token = %session.token().fingerprint(),
            expires_at = session.expires_at(),
            "Issued session token"
        );
        self.cache.insert(slot, session.clone());
        Ok(session)
    }

    pub fn cache(&self) -> &IssuedSessionCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenClaims;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    fn sample_session() -> IssuedSession {
        let claims = TokenClaims {
            materia_id: 5,
            horario_id: 9,
            docente_id: 2,
            materia_nombre: "Algebra".to_string(),
            dia_semana: "lunes".to_string(),
            hora_inicio: "08:00".to_string(),
            hora_fin: "10:00".to_string(),
            fecha: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            exp: 1_900_000_000,
        };
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let signature = URL_SAFE_NO_PAD.encode(b"sig");
        let raw = claims.encode_with(&header, &signature);
        IssuedSession::new(SessionToken::decode(&raw).unwrap())
    }

    #[test]
    fn test_svg_rendering() {
        let svg = sample_session().to_svg().unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("</svg>"));
    }

    #[test]
    fn test_terminal_rendering() {
        let rendered = sample_session().to_terminal_string().unwrap();
        assert!(!rendered.is_empty());
        assert!(rendered.lines().count() > 10);
    }

    #[test]
    fn test_expiry_passthrough() {
        let session = sample_session();
        assert_eq!(session.expires_at(), 1_900_000_000);
        assert!(!session.token().is_expired(1_899_999_999));
    }
}
