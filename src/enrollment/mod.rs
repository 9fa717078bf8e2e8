//! Device enrollment: a tablet scans the classroom QR code and files a pending
//! enrollment, an admin listening on that classroom is prompted, and confirming
//! turns the pending record into a student.

mod confirm;
mod listener;
mod qr;
mod registry;

pub use confirm::ConfirmEnrollment;
pub use listener::{EnrollmentListener, ListenerEvent, Notification};
pub use qr::{EnrollmentQr, QrPayload, session_marker};
pub use registry::{ListenerEvents, ListenerHandle, ListenerRegistry};

use crate::database::{PendingEnrollmentRow, pending_enrollments};
use crate::documents::{DeviceInfo, PendingEnrollment};
use crate::error::{AppError, Operation};
use crate::session::InstitutionContext;
use crate::store::{Collection, Store, WatchScope, WriteBatch, WriteOp};
use diesel::prelude::*;
use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// The classroom an admin is enrolling devices into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnrollmentScope {
    pub institution_id: String,
    pub classroom_id: String,
}

impl EnrollmentScope {
    pub fn new(institution_id: impl Into<String>, classroom_id: impl Into<String>) -> Self {
        EnrollmentScope {
            institution_id: institution_id.into(),
            classroom_id: classroom_id.into(),
        }
    }

    /// Both identifiers are required before anything is watched.
    pub fn is_complete(&self) -> bool {
        !self.institution_id.is_empty() && !self.classroom_id.is_empty()
    }

    pub fn watch_scope(&self) -> WatchScope {
        WatchScope::classroom(
            Collection::PendingEnrollments,
            &self.institution_id,
            &self.classroom_id,
        )
    }
}

/// What a tablet sends after scanning the enrollment QR code.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPendingEnrollment {
    pub institution_id: String,
    pub classroom_id: String,
    pub device_info: DeviceInfo,
}

impl Store {
    /// Pending enrollments of one classroom, most recent first.
    pub fn pending_enrollments(
        &self,
        scope: &EnrollmentScope,
    ) -> Result<Vec<PendingEnrollment>, AppError> {
        self.with_connection(|conn| {
            let rows = pending_enrollments::table
                .filter(pending_enrollments::institution_id.eq(&scope.institution_id))
                .filter(pending_enrollments::classroom_id.eq(&scope.classroom_id))
                .order((
                    pending_enrollments::created_at.desc(),
                    pending_enrollments::id.desc(),
                ))
                .select(PendingEnrollmentRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(PendingEnrollment::from).collect())
        })
    }

    pub fn pending_enrollment(
        &self,
        ctx: &InstitutionContext,
        enrollment_id: &str,
    ) -> Result<PendingEnrollment, AppError> {
        let row = self.with_connection(|conn| {
            Ok(pending_enrollments::table
                .find(enrollment_id)
                .select(PendingEnrollmentRow::as_select())
                .first(conn)
                .optional()?)
        })?;

        match row {
            None => Err(AppError::NotFound(format!(
                "pending enrollment {enrollment_id}"
            ))),
            Some(row) if row.institution_id != ctx.institution_id() => Err(self.observe(
                AppError::permission(format!("pending_enrollments/{enrollment_id}"), Operation::Read),
            )),
            Some(row) => Ok(row.into()),
        }
    }

    /// Files a pending enrollment on behalf of a device.
    ///
    /// The creation time is assigned here, never taken from the device.
    pub fn register_pending_enrollment(
        &self,
        request: NewPendingEnrollment,
    ) -> Result<PendingEnrollment, AppError> {
        let mac_address = request.device_info.mac_address.trim();
        if mac_address.is_empty() {
            return Err(AppError::Validation("deviceInfo.macAddress is required".into()));
        }
        if request.institution_id.is_empty() || request.classroom_id.is_empty() {
            return Err(AppError::Validation(
                "institutionId and classroomId are required".into(),
            ));
        }

        let ctx = InstitutionContext::new(&request.institution_id);
        self.classroom(&ctx, &request.classroom_id)?;

        let pending = PendingEnrollment {
            id: Uuid::new_v4().simple().to_string(),
            institution_id: request.institution_id,
            classroom_id: request.classroom_id,
            device_info: DeviceInfo {
                mac_address: mac_address.to_string(),
                model: request.device_info.model.trim().to_string(),
            },
            created_at: OffsetDateTime::now_utc(),
        };

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::CreatePending(pending.clone()));
        self.commit(batch)?;

        tracing::info!(
            enrollment = %pending.id,
            institution = %pending.institution_id,
            classroom = %pending.classroom_id,
            device = %pending.device_info.mac_address,
            "device requested enrollment"
        );
        Ok(pending)
    }
}
