use super::feed::{ChangeNotice, Collection};
use crate::config::DuplicateDevicePolicy;
use crate::database::{
    NewActivityLog, PendingEnrollmentRow, StudentRow, activity_logs, pending_enrollments,
    students,
};
use crate::documents::{ActivityLog, PendingEnrollment};
use crate::error::{AppError, Operation};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

/// A single write within a [`WriteBatch`].
#[derive(Clone, Debug)]
pub enum WriteOp {
    CreatePending(PendingEnrollment),
    /// Fails if the record is missing or belongs to another institution.
    DeletePending { id: String, institution_id: String },
    /// Creates or overwrites a student record. A new student gets the next
    /// device number of its classroom; an overwritten one keeps its own.
    SetStudent(StudentRow),
    /// Resolves other students of the institution holding the same device.
    ClaimDevice {
        institution_id: String,
        mac_address: String,
        student_id: String,
        policy: DuplicateDevicePolicy,
    },
    RenameStudent {
        id: String,
        institution_id: String,
        name: String,
    },
    /// Fails if the student is missing or belongs to another institution.
    AppendActivity {
        student_id: String,
        institution_id: String,
        log: ActivityLog,
    },
}

/// An ordered set of writes applied as one indivisible unit.
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Applies every op in order. The caller owns the surrounding transaction.
    pub(super) fn apply(self, conn: &mut SqliteConnection) -> Result<Vec<ChangeNotice>, AppError> {
        let mut notices = Vec::with_capacity(self.ops.len());
        for op in self.ops {
            op.apply(conn, &mut notices)?;
        }
        Ok(notices)
    }
}

fn load_student(conn: &mut SqliteConnection, id: &str) -> Result<StudentRow, AppError> {
    students::table
        .find(id)
        .select(StudentRow::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("student {id}")))
}

/// The number an incoming student's device takes in its classroom.
fn device_number_for(conn: &mut SqliteConnection, row: &StudentRow) -> Result<String, AppError> {
    let existing = students::table
        .find(row.id.as_str())
        .select(students::device_number)
        .first::<String>(conn)
        .optional()?;
    if let Some(number) = existing.filter(|number| !number.is_empty()) {
        return Ok(number);
    }

    let taken = students::table
        .filter(students::classroom_id.eq(row.classroom_id.as_str()))
        .filter(students::id.ne(row.id.as_str()))
        .select(students::device_number)
        .load::<String>(conn)?;
    // Gaps left by removed students are not refilled.
    let highest = taken
        .iter()
        .filter_map(|number| number.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    Ok(format!("{:02}", highest + 1))
}

fn remove_student(conn: &mut SqliteConnection, id: &str) -> Result<(), AppError> {
    diesel::delete(activity_logs::table.filter(activity_logs::student_id.eq(id))).execute(conn)?;
    diesel::delete(students::table.find(id)).execute(conn)?;
    Ok(())
}

impl WriteOp {
    fn apply(
        self,
        conn: &mut SqliteConnection,
        notices: &mut Vec<ChangeNotice>,
    ) -> Result<(), AppError> {
        match self {
            WriteOp::CreatePending(pending) => {
                let row = PendingEnrollmentRow {
                    id: pending.id,
                    institution_id: pending.institution_id,
                    classroom_id: pending.classroom_id,
                    mac_address: pending.device_info.mac_address,
                    model: pending.device_info.model,
                    created_at: pending.created_at,
                };
                diesel::insert_into(pending_enrollments::table)
                    .values(&row)
                    .execute(conn)?;
                notices.push(ChangeNotice::new(
                    Collection::PendingEnrollments,
                    row.institution_id,
                    row.classroom_id,
                    row.id,
                ));
            }
            WriteOp::DeletePending { id, institution_id } => {
                let row = pending_enrollments::table
                    .find(id.as_str())
                    .select(PendingEnrollmentRow::as_select())
                    .first(conn)
                    .optional()?
                    .ok_or_else(|| AppError::NotFound(format!("pending enrollment {id}")))?;
                if row.institution_id != institution_id {
                    return Err(AppError::permission(
                        format!("pending_enrollments/{id}"),
                        Operation::Write,
                    ));
                }

                diesel::delete(pending_enrollments::table.find(id.as_str())).execute(conn)?;
                notices.push(ChangeNotice::new(
                    Collection::PendingEnrollments,
                    row.institution_id,
                    row.classroom_id,
                    row.id,
                ));
            }
            WriteOp::SetStudent(mut row) => {
                row.device_number = device_number_for(conn, &row)?;
                diesel::replace_into(students::table)
                    .values(&row)
                    .execute(conn)?;
                notices.push(ChangeNotice::new(
                    Collection::Students,
                    row.institution_id,
                    row.classroom_id,
                    row.id,
                ));
            }
            WriteOp::ClaimDevice {
                institution_id,
                mac_address,
                student_id,
                policy,
            } => {
                let holders = students::table
                    .filter(students::institution_id.eq(institution_id.as_str()))
                    .filter(students::mac_address.eq(mac_address.as_str()))
                    .filter(students::id.ne(student_id.as_str()))
                    .select(StudentRow::as_select())
                    .load(conn)?;

                if policy == DuplicateDevicePolicy::Reject {
                    if let Some(holder) = holders.first() {
                        return Err(AppError::Conflict(format!(
                            "device {mac_address} is already enrolled to {}",
                            holder.student_name
                        )));
                    }
                }

                for holder in holders {
                    tracing::info!(
                        student = %holder.id,
                        device = %mac_address,
                        "replacing previous enrollment of device"
                    );
                    remove_student(conn, &holder.id)?;
                    notices.push(ChangeNotice::new(
                        Collection::Students,
                        holder.institution_id,
                        holder.classroom_id,
                        holder.id,
                    ));
                }
            }
            WriteOp::RenameStudent {
                id,
                institution_id,
                name,
            } => {
                let row = load_student(conn, &id)?;
                if row.institution_id != institution_id {
                    return Err(AppError::permission(
                        format!("institutions/{institution_id}/students/{id}"),
                        Operation::Write,
                    ));
                }

                diesel::update(students::table.find(id.as_str()))
                    .set(students::student_name.eq(name))
                    .execute(conn)?;
                notices.push(ChangeNotice::new(
                    Collection::Students,
                    row.institution_id,
                    row.classroom_id,
                    row.id,
                ));
            }
            WriteOp::AppendActivity {
                student_id,
                institution_id,
                log,
            } => {
                let row = load_student(conn, &student_id)?;
                if row.institution_id != institution_id {
                    return Err(AppError::permission(
                        format!("institutions/{institution_id}/students/{student_id}/activity"),
                        Operation::Write,
                    ));
                }
                let entry = NewActivityLog {
                    student_id,
                    url: log.url,
                    occurred_at: log.timestamp,
                    duration_secs: log.duration_secs,
                };
                diesel::insert_into(activity_logs::table)
                    .values(&entry)
                    .execute(conn)?;
                notices.push(ChangeNotice::new(
                    Collection::Students,
                    row.institution_id,
                    row.classroom_id,
                    row.id,
                ));
            }
        }
        Ok(())
    }
}
