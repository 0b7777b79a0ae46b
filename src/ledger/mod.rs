//! HTTP client for the attendance ledger service.
//!
//! The ledger is the single source of truth for every acceptance
//! decision. On a check-in it verifies, in order: the token's signature
//! and expiry (its own clock), the student's enrollment in the token's
//! course, that the reported location lies within the course's registered
//! geofence (returning the computed distance), and that no record already
//! exists for `{student, course, session date}`: at most one attendance
//! record per student per session. Only then does it atomically create
//! the record. Nothing on the client side replicates or pre-empts those
//! checks; this module just transports submissions and surfaces the
//! service's classification unchanged.
//!
//! Every call here is one-shot: no retries, no polling. A failure is
//! reported and recovery is always a fresh user action.

mod error;
mod types;

pub use error::LedgerError;
pub use types::*;

use crate::config::ClientConfig;
use crate::token::TokenFingerprint;
use rand::Rng;
use reqwest::{Client, RequestBuilder, StatusCode};
use std::future::Future;
use tracing::{error, info, warn};
use url::Url;

/// Paths under the service base URL.
const CHECK_IN_PATH: &str = "/attendance/asistencia";
const ISSUE_PATH: &str = "/attendance/qr";
const STUDENT_HISTORY_PATH: &str = "/attendance/asistencia/estudiante";
const COURSE_ATTENDANCE_PATH: &str = "/attendance/asistencia/materia";

/// The ledger seam as the check-in flow consumes it.
///
/// One submission per call, classified errors per the service contract.
/// Exists so the flow can be exercised against a double without a live
/// service.
pub trait AttendanceLedger {
    fn submit(
        &self,
        request: &CheckInRequest,
    ) -> impl Future<Output = Result<CheckInResponse, LedgerError>> + Send;
}

/// Client for the attendance service.
pub struct LedgerClient {
    client: Client,
    config: ClientConfig,
}

impl LedgerClient {
    /// Creates a client, failing fast on an unparseable base URL.
    pub fn new(config: ClientConfig) -> Result<Self, LedgerError> {
        Url::parse(&config.base_url)?;

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LedgerError::Network {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    pub fn with_defaults() -> Result<Self, LedgerError> {
        Self::new(ClientConfig::default())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Submits one check-in.
    ///
    /// Exactly one request goes out; the caller decides whether to try
    /// again, always as a new user-initiated attempt.
    pub async fn submit_check_in(
        &self,
        request: &CheckInRequest,
    ) -> Result<CheckInResponse, LedgerError> {
        let correlation_id = generate_correlation_id();
        let token = TokenFingerprint::of(&request.qr_token);
        info!(
            correlation_id = %correlation_id,
            token = %token,
            estudiante_id = request.estudiante_id,
            "Submitting attendance check-in"
        );

        let response = self.post(CHECK_IN_PATH).json(request).send().await?;
        let status = response.status();

        match status {
            StatusCode::CREATED => {
                let body: CheckInResponse =
                    response
                        .json()
                        .await
                        .map_err(|e| LedgerError::UnexpectedResponse {
                            message: format!("201 body did not parse: {}", e),
                        })?;
                info!(
                    correlation_id = %correlation_id,
                    record_id = body.asistencia.id,
                    distance_m = body.asistencia.distancia_metros,
                    "Check-in registered"
                );
                Ok(body)
            }
            StatusCode::BAD_REQUEST => {
                let message = rejection_message(response)
                    .await
                    .unwrap_or_else(|| "invalid submission".to_string());
                warn!(correlation_id = %correlation_id, %message, "Check-in rejected as malformed");
                Err(LedgerError::MalformedSubmission { message })
            }
            StatusCode::FORBIDDEN => {
                let message = rejection_message(response)
                    .await
                    .unwrap_or_else(|| "you are not enrolled in this course".to_string());
                warn!(correlation_id = %correlation_id, %message, "Check-in rejected: not enrolled");
                Err(LedgerError::NotEnrolled { message })
            }
            StatusCode::CONFLICT => {
                let message = rejection_message(response)
                    .await
                    .unwrap_or_else(|| "already registered today".to_string());
                info!(correlation_id = %correlation_id, %message, "Check-in rejected as duplicate");
                Err(LedgerError::AlreadyRegistered { message })
            }
            StatusCode::INTERNAL_SERVER_ERROR => {
                error!(correlation_id = %correlation_id, "Service fault during check-in");
                Err(LedgerError::ServerFault)
            }
            status => {
                let message = rejection_message(response).await.unwrap_or_default();
                warn!(
                    correlation_id = %correlation_id,
                    status = status.as_u16(),
                    %message,
                    "Check-in answered with unclassified status"
                );
                Err(LedgerError::Unclassified {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    /// Requests a newly signed session token for a class occurrence.
    ///
    /// The service enforces that the schedule slot belongs to an active
    /// course owned by the requesting teacher; the client only supplies
    /// identifiers.
    pub async fn issue_session(
        &self,
        request: &IssueSessionRequest,
    ) -> Result<IssueSessionResponse, LedgerError> {
        let correlation_id = generate_correlation_id();
        info!(
            correlation_id = %correlation_id,
            materia_id = request.materia_id,
            horario_id = request.horario_id,
            fecha = %request.fecha,
            "Requesting session token"
        );

        let response = self.post(ISSUE_PATH).json(request).send().await?;
        let status = response.status();

        if status == StatusCode::CREATED || status == StatusCode::OK {
            let body: IssueSessionResponse =
                response
                    .json()
                    .await
                    .map_err(|e| LedgerError::UnexpectedResponse {
                        message: format!("mint body did not parse: {}", e),
                    })?;
            info!(
                correlation_id = %correlation_id,
                token = %TokenFingerprint::of(&body.qr_token),
                "Session token issued"
            );
            Ok(body)
        } else {
            let failure = classify_failure(response).await;
            warn!(correlation_id = %correlation_id, error = %failure, "Session mint rejected");
            Err(failure)
        }
    }

    /// A student's own attendance history.
    pub async fn student_history(
        &self,
        estudiante_id: i64,
    ) -> Result<Vec<StudentAttendanceEntry>, LedgerError> {
        let response = self
            .get(STUDENT_HISTORY_PATH)
            .json(&StudentHistoryRequest { estudiante_id })
            .send()
            .await?;

        if response.status() == StatusCode::OK {
            let body: StudentHistoryResponse =
                response
                    .json()
                    .await
                    .map_err(|e| LedgerError::UnexpectedResponse {
                        message: format!("history body did not parse: {}", e),
                    })?;
            Ok(body.asistencias)
        } else {
            Err(classify_failure(response).await)
        }
    }

    /// The attendance roll for one course, with joined student identity.
    pub async fn course_attendance(
        &self,
        materia_id: i64,
    ) -> Result<Vec<CourseAttendanceEntry>, LedgerError> {
        let response = self
            .get(COURSE_ATTENDANCE_PATH)
            .json(&CourseAttendanceRequest { materia_id })
            .send()
            .await?;

        if response.status() == StatusCode::OK {
            let body: CourseAttendanceResponse =
                response
                    .json()
                    .await
                    .map_err(|e| LedgerError::UnexpectedResponse {
                        message: format!("roll body did not parse: {}", e),
                    })?;
            Ok(body.asistencias)
        } else {
            Err(classify_failure(response).await)
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.authorized(self.client.post(self.endpoint(path)))
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorized(self.client.get(self.endpoint(path)))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

impl AttendanceLedger for LedgerClient {
    async fn submit(&self, request: &CheckInRequest) -> Result<CheckInResponse, LedgerError> {
        self.submit_check_in(request).await
    }
}

/// Extracts the service's `{"error": ...}` text, if any.
async fn rejection_message(response: reqwest::Response) -> Option<String> {
    response.json::<ErrorBody>().await.ok().map(|body| body.error)
}

/// Shared classification for the non-submission endpoints, which only
/// distinguish malformed/fault/other.
async fn classify_failure(response: reqwest::Response) -> LedgerError {
    let status = response.status();
    match status {
        StatusCode::BAD_REQUEST => {
            let message = rejection_message(response)
                .await
                .unwrap_or_else(|| "invalid request".to_string());
            LedgerError::MalformedSubmission { message }
        }
        StatusCode::INTERNAL_SERVER_ERROR => LedgerError::ServerFault,
        status => {
            let message = rejection_message(response).await.unwrap_or_default();
            LedgerError::Unclassified {
                status: status.as_u16(),
                message,
            }
        }
    }
}

/// Generates a unique correlation ID for request tracing.
fn generate_correlation_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    let random: u32 = rand::thread_rng().gen();
    format!("{:x}-{:08x}", timestamp & 0xFFFF_FFFF, random)
}
