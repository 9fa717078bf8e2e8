use super::schema::{
    activity_logs, admins, classrooms, filter_configs, institutions, messages,
    pending_enrollments, students,
};
use diesel::prelude::*;
use time::OffsetDateTime;

#[derive(Clone, Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = institutions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct InstitutionRow {
    pub id: String,
    pub name: String,
    pub address: String,
    pub logo_url: String,
    pub filter_mode: String,
    pub suspended: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = classrooms)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ClassroomRow {
    pub id: String,
    pub institution_id: String,
    pub grade: String,
    pub section: String,
    pub capacity: Option<i32>,
    pub display_name: String,
    pub published: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = pending_enrollments)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PendingEnrollmentRow {
    pub id: String,
    pub institution_id: String,
    pub classroom_id: String,
    pub mac_address: String,
    pub model: String,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = students)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct StudentRow {
    pub id: String,
    pub institution_id: String,
    pub classroom_id: String,
    pub student_name: String,
    pub model: String,
    pub mac_address: String,
    pub device_number: String,
    pub enrolled_at: OffsetDateTime,
}

#[derive(Clone, Debug, Queryable, Selectable)]
#[diesel(table_name = activity_logs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ActivityLogRow {
    pub id: i32,
    pub student_id: String,
    pub url: String,
    pub occurred_at: OffsetDateTime,
    pub duration_secs: i64,
}

#[derive(Clone, Debug, Insertable)]
#[diesel(table_name = activity_logs)]
pub struct NewActivityLog {
    pub student_id: String,
    pub url: String,
    pub occurred_at: OffsetDateTime,
    pub duration_secs: i64,
}

#[derive(Clone, Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = filter_configs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct FilterConfigRow {
    pub institution_id: String,
    /// JSON array of normalized hosts.
    pub blacklist: String,
    pub updated_at: OffsetDateTime,
    pub updated_by: String,
}

#[derive(Clone, Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = messages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MessageRow {
    pub id: String,
    pub institution_id: String,
    pub student_id: String,
    pub sender_id: String,
    pub body: String,
    pub sent_at: OffsetDateTime,
    pub read_confirmation: bool,
}

#[derive(Clone, Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = admins)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AdminRow {
    pub uid: String,
    pub institution_id: String,
}
