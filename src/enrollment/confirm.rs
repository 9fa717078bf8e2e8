use crate::config::DuplicateDevicePolicy;
use crate::documents::{PendingEnrollment, Student};
use crate::error::{AppError, Operation};
use crate::session::InstitutionContext;
use crate::store::{Store, WriteBatch, WriteOp};
use time::OffsetDateTime;

/// An admin's answer to a pending enrollment prompt.
#[derive(Clone, Debug)]
pub struct ConfirmEnrollment {
    pub enrollment_id: String,
    pub pending: PendingEnrollment,
    pub student_name: String,
}

impl Store {
    /// Turns a pending enrollment into a student record.
    ///
    /// The student is written and the pending record deleted in one batch, so
    /// a failure leaves the pending record in place and creates nothing. The
    /// student takes the enrollment id as its own. Nothing is retried.
    pub fn confirm_enrollment(
        &self,
        ctx: &InstitutionContext,
        request: ConfirmEnrollment,
        policy: DuplicateDevicePolicy,
    ) -> Result<Student, AppError> {
        let ConfirmEnrollment {
            enrollment_id,
            pending,
            student_name,
        } = request;

        let student_name = student_name.trim();
        if enrollment_id.is_empty() {
            return Err(AppError::Validation("enrollment id is required".into()));
        }
        if student_name.is_empty() {
            return Err(AppError::Validation("student name is required".into()));
        }
        if ctx.institution_id().is_empty() {
            return Err(AppError::MissingContext("no institution was specified".into()));
        }
        if pending.classroom_id.is_empty() || pending.device_info.mac_address.is_empty() {
            return Err(AppError::Validation(
                "pending enrollment is missing its classroom or device".into(),
            ));
        }
        if pending.institution_id != ctx.institution_id() {
            return Err(self.observe(AppError::permission(
                ctx.path(&format!("students/{enrollment_id}")),
                Operation::Write,
            )));
        }

        let student = Student {
            id: enrollment_id.clone(),
            institution_id: ctx.institution_id().to_string(),
            classroom_id: pending.classroom_id,
            student_name: student_name.to_string(),
            model: pending.device_info.model,
            mac_address: pending.device_info.mac_address,
            // Assigned inside the batch.
            device_number: String::new(),
            enrolled_at: OffsetDateTime::now_utc(),
            activity_logs: Vec::new(),
        };

        let mut batch = WriteBatch::new();
        batch
            .push(WriteOp::ClaimDevice {
                institution_id: student.institution_id.clone(),
                mac_address: student.mac_address.clone(),
                student_id: student.id.clone(),
                policy,
            })
            .push(WriteOp::SetStudent(student.to_row()))
            .push(WriteOp::DeletePending {
                id: enrollment_id,
                institution_id: student.institution_id.clone(),
            });
        self.commit(batch)?;

        let student = self.student(ctx, &student.id)?;
        tracing::info!(
            student = %student.id,
            institution = %student.institution_id,
            classroom = %student.classroom_id,
            device = %student.mac_address,
            number = %student.device_number,
            "confirmed enrollment"
        );
        Ok(student)
    }
}
