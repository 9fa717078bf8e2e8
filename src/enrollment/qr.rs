use crate::error::AppError;
use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const ENROLL_ACTION: &str = "enroll";

/// What a tablet reads from the classroom QR code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub action: String,
    pub institution_id: String,
    pub classroom_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_id: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl QrPayload {
    pub fn new(
        institution_id: impl Into<String>,
        classroom_id: impl Into<String>,
        enrollment_id: Option<String>,
        issued_at: OffsetDateTime,
    ) -> Self {
        QrPayload {
            action: ENROLL_ACTION.to_string(),
            institution_id: institution_id.into(),
            classroom_id: classroom_id.into(),
            enrollment_id,
            timestamp: (issued_at.unix_timestamp_nanos() / 1_000_000) as i64,
        }
    }

    pub fn encode(&self) -> Result<String, AppError> {
        serde_json::to_string(self)
            .map_err(|err| AppError::Internal(format!("could not encode QR payload: {err}")))
    }

    pub fn decode(encoded: &str) -> Result<Self, AppError> {
        let payload: QrPayload = serde_json::from_str(encoded)
            .map_err(|err| AppError::Validation(format!("unreadable QR payload: {err}")))?;
        if payload.action != ENROLL_ACTION {
            return Err(AppError::Validation(format!(
                "unsupported QR action {:?}",
                payload.action
            )));
        }
        Ok(payload)
    }
}

/// A random marker distinguishing one displayed code from the next.
pub fn session_marker() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 16)
}

/// A rendered enrollment code for one classroom.
#[derive(Clone, Debug, Serialize)]
pub struct EnrollmentQr {
    pub payload: QrPayload,
    /// The exact string embedded in the code.
    pub encoded: String,
    pub svg: String,
}

impl EnrollmentQr {
    /// Builds a fresh code, stamped now and carrying a new session marker.
    pub fn generate(
        institution_id: &str,
        classroom_id: &str,
        size: u32,
    ) -> Result<EnrollmentQr, AppError> {
        let payload = QrPayload::new(
            institution_id,
            classroom_id,
            Some(session_marker()),
            OffsetDateTime::now_utc(),
        );
        let encoded = payload.encode()?;
        let svg = render_svg(&encoded, size)?;
        Ok(EnrollmentQr {
            payload,
            encoded,
            svg,
        })
    }
}

/// Renders `data` with high error correction so a partly obscured screen still scans.
pub fn render_svg(data: &str, size: u32) -> Result<String, AppError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::H)
        .map_err(|err| AppError::Internal(format!("could not build QR code: {err}")))?;
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(size, size)
        .quiet_zone(true)
        .build())
}
