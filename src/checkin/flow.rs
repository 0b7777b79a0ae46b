//! Async driver for the check-in flow.
//!
//! Composes the steps strictly sequentially: no location fetch before the
//! token is known to decode and be unexpired, no submission before an
//! explicit confirmation, never more than one in-flight operation.
//! Dropping a step's future cancels the underlying operation; results
//! that would arrive after a restart are dropped by the state machine's
//! identity-transition rule.

use super::{CheckInAttempt, CheckInState};
use crate::geo::{self, GeoPoint};
use crate::ledger::{AttendanceLedger, CheckInRequest};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failures from the platform location capability.
#[derive(Debug, Clone, Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("no location fix available")]
    NoFix,

    #[error("location provider failure: {0}")]
    Provider(String),
}

/// The platform location capability seam.
///
/// One fix per call, no caching, no automatic retries; a failed fetch is
/// terminal for the attempt.
pub trait LocationProvider {
    fn current_location(&self) -> impl Future<Output = Result<GeoPoint, LocationError>> + Send;
}

/// Provider that always answers with fixed coordinates. For the CLI and
/// for tests.
#[derive(Debug, Clone)]
pub struct FixedLocationProvider(pub GeoPoint);

impl LocationProvider for FixedLocationProvider {
    async fn current_location(&self) -> Result<GeoPoint, LocationError> {
        Ok(self.0)
    }
}

/// Drives one student's scan → validate → locate → confirm → submit
/// cycle against a ledger.
///
/// The flow owns its attempt exclusively; it is never shared across
/// tasks, so at most one asynchronous operation exists at a time.
pub struct CheckInFlow<G, L> {
    ledger: Arc<G>,
    locator: L,
    student_id: i64,
    attempt: CheckInAttempt,
}

impl<G: AttendanceLedger, L: LocationProvider> CheckInFlow<G, L> {
    pub fn new(ledger: Arc<G>, locator: L, student_id: i64) -> Self {
        Self {
            ledger,
            locator,
            student_id,
            attempt: CheckInAttempt::new(),
        }
    }

    pub fn attempt(&self) -> &CheckInAttempt {
        &self.attempt
    }

    pub fn state(&self) -> CheckInState {
        self.attempt.state()
    }

    /// Feeds a scan result through decode, the advisory expiry check, and
    /// the location fetch. Stops at `Confirmation`, or at `Error` without
    /// ever touching the platform location capability when the code is
    /// bad or stale.
    pub async fn on_scan(&mut self, raw: &str) -> &CheckInAttempt {
        self.apply(|attempt| attempt.scan_received(raw));
        self.apply(|attempt| attempt.validate(chrono::Utc::now().timestamp()));

        if self.state() == CheckInState::AcquiringLocation {
            match self.locator.current_location().await {
                Ok(location) => {
                    info!(lat = location.lat, lng = location.lng, "Location acquired");
                    self.apply(|attempt| attempt.location_acquired(location));
                }
                Err(e) => {
                    warn!(error = %e, "Location acquisition failed");
                    self.apply(|attempt| attempt.location_failed(e));
                }
            }
        }

        &self.attempt
    }

    /// The student's explicit go-ahead: issues exactly one submission.
    ///
    /// Confirming when nothing awaits confirmation (including while a
    /// submission is already in flight) changes nothing.
    pub async fn confirm(&mut self) -> &CheckInAttempt {
        self.apply(CheckInAttempt::confirmed);

        let pending = match &self.attempt {
            CheckInAttempt::Submitting { token, location } => {
                Some((token.raw_text().to_string(), *location))
            }
            _ => None,
        };

        if let Some((qr_token, location)) = pending {
            let request = CheckInRequest {
                qr_token,
                estudiante_id: self.student_id,
                ubicacion_lat: location.lat,
                ubicacion_lng: location.lng,
            };
            let result = self.ledger.submit(&request).await;
            self.apply(|attempt| attempt.submission_resolved(result));
        }

        &self.attempt
    }

    /// Advisory proximity hint against a reference point.
    ///
    /// `None` until a fix exists. Purely informational; the service owns
    /// the authoritative geofence and this answer never gates the flow.
    pub fn proximity_hint(&self, reference: GeoPoint, radius_meters: f64) -> Option<bool> {
        self.attempt
            .location()
            .map(|device| geo::within_radius(device, reference, radius_meters))
    }

    /// Abandons the attempt and returns to scanning. Nothing carries
    /// over, and anything still in flight resolves into a value that
    /// ignores it.
    pub fn restart(&mut self) {
        self.apply(CheckInAttempt::restart);
    }

    fn apply(&mut self, event: impl FnOnce(CheckInAttempt) -> CheckInAttempt) {
        let current = std::mem::take(&mut self.attempt);
        let from = current.state();
        self.attempt = event(current);
        let to = self.attempt.state();
        if from != to {
            debug!(%from, %to, "Check-in transition");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{
        AttendanceRecord, CheckInResponse, LedgerError,
    };
    use crate::token::TokenClaims;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

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

    fn live_token() -> String {
        signed_token(chrono::Utc::now().timestamp() + 3_600)
    }

    fn sample_response() -> CheckInResponse {
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

    /// Ledger double: answers with a canned result, counts submissions,
    /// and remembers the last request.
    struct StubLedger {
        result: Mutex<Option<Result<CheckInResponse, LedgerError>>>,
        submissions: AtomicUsize,
        last_token: Mutex<Option<String>>,
    }

    impl StubLedger {
        fn answering(result: Result<CheckInResponse, LedgerError>) -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Some(result)),
                submissions: AtomicUsize::new(0),
                last_token: Mutex::new(None),
            })
        }
    }

    impl AttendanceLedger for StubLedger {
        async fn submit(
            &self,
            request: &CheckInRequest,
        ) -> Result<CheckInResponse, LedgerError> {
            self.submissions.fetch_add(1, Ordering::SeqCst);
            *self.last_token.lock().unwrap() = Some(request.qr_token.clone());
            self.result
                .lock()
                .unwrap()
                .take()
                .expect("ledger called more than once")
        }
    }

    /// Locator double with a canned answer and a call counter.
    struct StubLocator {
        fix: Result<GeoPoint, LocationError>,
        calls: Arc<AtomicUsize>,
    }

    impl LocationProvider for StubLocator {
        async fn current_location(&self) -> Result<GeoPoint, LocationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.fix.clone()
        }
    }

    #[tokio::test]
    async fn test_full_happy_path() {
        let ledger = StubLedger::answering(Ok(sample_response()));
        let mut flow = CheckInFlow::new(
            ledger.clone(),
            FixedLocationProvider(here()),
            7,
        );

        let raw = live_token();
        flow.on_scan(&raw).await;
        assert_eq!(flow.state(), CheckInState::Confirmation);

        flow.confirm().await;
        assert_eq!(flow.state(), CheckInState::Success);
        assert_eq!(ledger.submissions.load(Ordering::SeqCst), 1);
        // The scanned text went out verbatim, signature intact
        assert_eq!(ledger.last_token.lock().unwrap().as_deref(), Some(raw.as_str()));
    }

    #[tokio::test]
    async fn test_malformed_code_never_requests_location() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ledger = StubLedger::answering(Ok(sample_response()));
        let mut flow = CheckInFlow::new(
            ledger,
            StubLocator {
                fix: Ok(here()),
                calls: calls.clone(),
            },
            7,
        );

        flow.on_scan("onlyonepart").await;
        assert_eq!(flow.state(), CheckInState::Error);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_code_never_requests_location() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ledger = StubLedger::answering(Ok(sample_response()));
        let mut flow = CheckInFlow::new(
            ledger,
            StubLocator {
                fix: Ok(here()),
                calls: calls.clone(),
            },
            7,
        );

        flow.on_scan(&signed_token(chrono::Utc::now().timestamp() - 3_600))
            .await;
        assert_eq!(flow.state(), CheckInState::Error);
        assert_eq!(
            flow.attempt().failure_reason().unwrap().to_string(),
            "code expired"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_location_failure_never_submits() {
        let ledger = StubLedger::answering(Ok(sample_response()));
        let mut flow = CheckInFlow::new(
            ledger.clone(),
            StubLocator {
                fix: Err(LocationError::Provider("GPS disabled".to_string())),
                calls: Arc::new(AtomicUsize::new(0)),
            },
            7,
        );

        flow.on_scan(&live_token()).await;
        assert_eq!(flow.state(), CheckInState::Error);

        // Confirming from the error state is a no-op; nothing is sent
        flow.confirm().await;
        assert_eq!(flow.state(), CheckInState::Error);
        assert_eq!(ledger.submissions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_rejection_surfaces_as_error() {
        let ledger = StubLedger::answering(Err(LedgerError::AlreadyRegistered {
            message: "already registered today".to_string(),
        }));
        let mut flow = CheckInFlow::new(ledger, FixedLocationProvider(here()), 7);

        flow.on_scan(&live_token()).await;
        flow.confirm().await;

        assert_eq!(flow.state(), CheckInState::Error);
        let reason = flow.attempt().failure_reason().unwrap();
        assert_eq!(reason.to_string(), "already registered today");
    }

    #[tokio::test]
    async fn test_restart_discards_attempt_state() {
        let ledger = StubLedger::answering(Ok(sample_response()));
        let mut flow = CheckInFlow::new(ledger, FixedLocationProvider(here()), 7);

        flow.on_scan(&live_token()).await;
        assert_eq!(flow.state(), CheckInState::Confirmation);

        flow.restart();
        assert_eq!(flow.state(), CheckInState::Scanning);
        assert!(flow.attempt().token().is_none());
        assert!(flow.attempt().location().is_none());
    }

    #[tokio::test]
    async fn test_proximity_hint_is_advisory_only() {
        let ledger = StubLedger::answering(Ok(sample_response()));
        let mut flow = CheckInFlow::new(ledger.clone(), FixedLocationProvider(here()), 7);

        // No fix yet, no hint
        assert!(flow.proximity_hint(here(), 100.0).is_none());

        flow.on_scan(&live_token()).await;
        assert_eq!(flow.proximity_hint(here(), 100.0), Some(true));

        let far_away = GeoPoint::new(-16.5, -68.15);
        assert_eq!(flow.proximity_hint(far_away, 100.0), Some(false));

        // A negative hint does not block submission
        flow.confirm().await;
        assert_eq!(flow.state(), CheckInState::Success);
    }
}
