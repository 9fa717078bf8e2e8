use diesel::{connection::SimpleConnection, sqlite::SqliteConnection};

// Mirrors schema.rs.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS institutions (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    address TEXT NOT NULL DEFAULT '',
    logo_url TEXT NOT NULL DEFAULT '',
    filter_mode TEXT NOT NULL DEFAULT 'blacklist',
    suspended BOOLEAN NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS classrooms (
    id TEXT PRIMARY KEY NOT NULL,
    institution_id TEXT NOT NULL,
    grade TEXT NOT NULL,
    section TEXT NOT NULL,
    capacity INTEGER,
    display_name TEXT NOT NULL,
    published BOOLEAN NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS classrooms_by_institution ON classrooms (institution_id);

CREATE TABLE IF NOT EXISTS pending_enrollments (
    id TEXT PRIMARY KEY NOT NULL,
    institution_id TEXT NOT NULL,
    classroom_id TEXT NOT NULL,
    mac_address TEXT NOT NULL,
    model TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS pending_by_scope
    ON pending_enrollments (institution_id, classroom_id, created_at);

CREATE TABLE IF NOT EXISTS students (
    id TEXT PRIMARY KEY NOT NULL,
    institution_id TEXT NOT NULL,
    classroom_id TEXT NOT NULL,
    student_name TEXT NOT NULL,
    model TEXT NOT NULL,
    mac_address TEXT NOT NULL,
    device_number TEXT NOT NULL DEFAULT '',
    enrolled_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS students_by_scope ON students (institution_id, classroom_id);
CREATE INDEX IF NOT EXISTS students_by_device ON students (institution_id, mac_address);

CREATE TABLE IF NOT EXISTS activity_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    student_id TEXT NOT NULL,
    url TEXT NOT NULL,
    occurred_at TEXT NOT NULL,
    duration_secs BIGINT NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS activity_by_student ON activity_logs (student_id);

CREATE TABLE IF NOT EXISTS filter_configs (
    institution_id TEXT PRIMARY KEY NOT NULL,
    blacklist TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    updated_by TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY NOT NULL,
    institution_id TEXT NOT NULL,
    student_id TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    body TEXT NOT NULL,
    sent_at TEXT NOT NULL,
    read_confirmation BOOLEAN NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS messages_by_student ON messages (institution_id, student_id);

CREATE TABLE IF NOT EXISTS admins (
    uid TEXT PRIMARY KEY NOT NULL,
    institution_id TEXT NOT NULL
);
";

/// Creates any missing tables. Safe to run on every startup.
pub fn run(conn: &mut SqliteConnection) -> diesel::QueryResult<()> {
    conn.batch_execute(SCHEMA)
}
