//! Canonical document shapes served to admins and devices.
//!
//! Every student/device record uses one field set regardless of which client wrote it.

use crate::database::{
    ActivityLogRow, ClassroomRow, InstitutionRow, MessageRow, PendingEnrollmentRow, StudentRow,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Institution {
    pub id: String,
    pub name: String,
    pub address: String,
    pub logo_url: String,
    pub filter_mode: String,
    pub suspended: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<InstitutionRow> for Institution {
    fn from(row: InstitutionRow) -> Self {
        Institution {
            id: row.id,
            name: row.name,
            address: row.address,
            logo_url: row.logo_url,
            filter_mode: row.filter_mode,
            suspended: row.suspended,
            created_at: row.created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classroom {
    pub id: String,
    pub institution_id: String,
    pub grade: String,
    pub section: String,
    pub capacity: Option<i32>,
    pub display_name: String,
    pub published: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<ClassroomRow> for Classroom {
    fn from(row: ClassroomRow) -> Self {
        Classroom {
            id: row.id,
            institution_id: row.institution_id,
            grade: row.grade,
            section: row.section,
            capacity: row.capacity,
            display_name: row.display_name,
            published: row.published,
            created_at: row.created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub mac_address: String,
    pub model: String,
}

/// A device waiting for an admin to assign it to a student.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEnrollment {
    pub id: String,
    pub institution_id: String,
    pub classroom_id: String,
    pub device_info: DeviceInfo,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<PendingEnrollmentRow> for PendingEnrollment {
    fn from(row: PendingEnrollmentRow) -> Self {
        PendingEnrollment {
            id: row.id,
            institution_id: row.institution_id,
            classroom_id: row.classroom_id,
            device_info: DeviceInfo {
                mac_address: row.mac_address,
                model: row.model,
            },
            created_at: row.created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default)]
    pub duration_secs: i64,
}

impl From<ActivityLogRow> for ActivityLog {
    fn from(row: ActivityLogRow) -> Self {
        ActivityLog {
            url: row.url,
            timestamp: row.occurred_at,
            duration_secs: row.duration_secs,
        }
    }
}

/// The durable record linking a hardware device to a named student.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub institution_id: String,
    pub classroom_id: String,
    pub student_name: String,
    pub model: String,
    pub mac_address: String,
    /// Zero-padded position of the device within its classroom, e.g. `"07"`.
    pub device_number: String,
    #[serde(with = "time::serde::rfc3339")]
    pub enrolled_at: OffsetDateTime,
    pub activity_logs: Vec<ActivityLog>,
}

impl Student {
    pub fn from_row(row: StudentRow, activity_logs: Vec<ActivityLog>) -> Self {
        Student {
            id: row.id,
            institution_id: row.institution_id,
            classroom_id: row.classroom_id,
            student_name: row.student_name,
            model: row.model,
            mac_address: row.mac_address,
            device_number: row.device_number,
            enrolled_at: row.enrolled_at,
            activity_logs,
        }
    }

    pub fn to_row(&self) -> StudentRow {
        StudentRow {
            id: self.id.clone(),
            institution_id: self.institution_id.clone(),
            classroom_id: self.classroom_id.clone(),
            student_name: self.student_name.clone(),
            model: self.model.clone(),
            mac_address: self.mac_address.clone(),
            device_number: self.device_number.clone(),
            enrolled_at: self.enrolled_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub institution_id: String,
    pub student_id: String,
    pub sender_id: String,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
    pub read_confirmation: bool,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            institution_id: row.institution_id,
            student_id: row.student_id,
            sender_id: row.sender_id,
            body: row.body,
            sent_at: row.sent_at,
            read_confirmation: row.read_confirmation,
        }
    }
}
