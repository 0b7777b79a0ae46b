//! Wire types for the attendance service API.
//!
//! Field names are the service's wire keys, verbatim.

use crate::geo::GeoPoint;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Check-in submission (student → service).
#[derive(Debug, Clone, Serialize)]
pub struct CheckInRequest {
    /// The scanned token text, verbatim; the signature must travel intact
    pub qr_token: String,
    pub estudiante_id: i64,
    pub ubicacion_lat: f64,
    pub ubicacion_lng: f64,
}

/// Body of a 201 Created answer to a check-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInResponse {
    pub message: String,
    pub asistencia: AttendanceRecord,
}

/// An attendance record. Owned by the service; the client never
/// constructs one, it only reads them back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub estudiante_id: i64,
    pub materia_id: i64,
    pub fecha: NaiveDate,
    /// Registration instant as the service formats it (RFC 3339)
    pub hora_registro: String,
    pub ubicacion_lat: f64,
    pub ubicacion_lng: f64,
    /// Distance from the course's registered coordinates, computed
    /// server-side
    pub distancia_metros: f64,
}

/// Error body the service attaches to rejection statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Session mint request (teacher → service).
#[derive(Debug, Clone, Serialize)]
pub struct IssueSessionRequest {
    pub materia_id: i64,
    pub horario_id: i64,
    pub docente_id: i64,
    pub fecha: NaiveDate,
}

/// Body of a successful session mint.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueSessionResponse {
    /// The signed three-segment token, ready to render as a QR code
    pub qr_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct StudentHistoryRequest {
    pub estudiante_id: i64,
}

/// One row of a student's own attendance history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentAttendanceEntry {
    pub id: i64,
    pub materia_id: i64,
    pub materia_nombre: String,
    pub fecha: NaiveDate,
    pub hora_registro: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StudentHistoryResponse {
    pub asistencias: Vec<StudentAttendanceEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CourseAttendanceRequest {
    pub materia_id: i64,
}

/// One row of a course roll. Student identity fields are joined in by the
/// service; coordinates arrive as decimal strings on this endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseAttendanceEntry {
    pub id: i64,
    pub estudiante_id: i64,
    pub materia_id: i64,
    pub fecha: NaiveDate,
    pub hora_registro: String,
    pub ubicacion_lat: String,
    pub ubicacion_lng: String,
    pub nombre: String,
    pub apellido: String,
    pub email: String,
    pub carrera: String,
}

impl CourseAttendanceEntry {
    /// Lenient coordinate conversion; `None` when either decimal string
    /// does not parse.
    pub fn location(&self) -> Option<GeoPoint> {
        let lat = self.ubicacion_lat.parse().ok()?;
        let lng = self.ubicacion_lng.parse().ok()?;
        Some(GeoPoint::new(lat, lng))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CourseAttendanceResponse {
    pub asistencias: Vec<CourseAttendanceEntry>,
}
