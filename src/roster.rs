//! Students per classroom, with the day's infractions counted from their activity logs.

use crate::database::{ActivityLogRow, StudentRow, activity_logs, students};
use crate::documents::{ActivityLog, Student};
use crate::error::{AppError, Operation};
use crate::session::InstitutionContext;
use crate::store::{Collection, Store, WatchScope, WriteBatch, WriteOp};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;
use std::collections::HashMap;
use time::{Date, OffsetDateTime, UtcOffset};

const MIN_STUDENT_NAME: usize = 3;
// One entry never covers more than a day.
const MAX_ACTIVITY_SECS: i64 = 86_400;

/// Converts a viewer's offset from UTC, in minutes, as browsers report it.
pub fn utc_offset(minutes: i32) -> Result<UtcOffset, AppError> {
    UtcOffset::from_whole_seconds(minutes.saturating_mul(60))
        .map_err(|_| AppError::Validation(format!("invalid UTC offset of {minutes} minutes")))
}

/// The calendar day it currently is for a viewer at `offset`.
pub fn today(offset: UtcOffset) -> Date {
    OffsetDateTime::now_utc().to_offset(offset).date()
}

fn falls_on(log: &ActivityLog, day: Date, offset: UtcOffset) -> bool {
    log.timestamp.to_offset(offset).date() == day
}

/// How many entries fall on `day` as seen from `offset`.
pub fn infractions_on(logs: &[ActivityLog], day: Date, offset: UtcOffset) -> usize {
    logs.iter().filter(|log| falls_on(log, day, offset)).count()
}

/// The entries of `day`, most recent first.
pub fn infraction_log_on(logs: &[ActivityLog], day: Date, offset: UtcOffset) -> Vec<ActivityLog> {
    let mut entries: Vec<_> = logs
        .iter()
        .filter(|log| falls_on(log, day, offset))
        .cloned()
        .collect();
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    entries
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    #[serde(flatten)]
    pub student: Student,
    pub infractions_today: usize,
}

impl RosterEntry {
    pub fn new(student: Student, day: Date, offset: UtcOffset) -> Self {
        let infractions_today = infractions_on(&student.activity_logs, day, offset);
        RosterEntry {
            student,
            infractions_today,
        }
    }
}

/// Attaches every student's activity log, oldest entry first.
fn with_activity(
    conn: &mut SqliteConnection,
    rows: Vec<StudentRow>,
) -> Result<Vec<Student>, AppError> {
    let ids: Vec<&str> = rows.iter().map(|row| row.id.as_str()).collect();
    let logs = activity_logs::table
        .filter(activity_logs::student_id.eq_any(ids))
        .order((activity_logs::occurred_at.asc(), activity_logs::id.asc()))
        .select(ActivityLogRow::as_select())
        .load(conn)?;

    let mut by_student: HashMap<String, Vec<ActivityLog>> = HashMap::new();
    for log in logs {
        by_student
            .entry(log.student_id.clone())
            .or_default()
            .push(log.into());
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let logs = by_student.remove(&row.id).unwrap_or_default();
            Student::from_row(row, logs)
        })
        .collect())
}

impl Store {
    /// Students of one classroom, by name.
    pub fn students(
        &self,
        ctx: &InstitutionContext,
        classroom_id: &str,
    ) -> Result<Vec<Student>, AppError> {
        self.with_connection(|conn| {
            let rows = students::table
                .filter(students::institution_id.eq(ctx.institution_id()))
                .filter(students::classroom_id.eq(classroom_id))
                .order((students::student_name.asc(), students::id.asc()))
                .select(StudentRow::as_select())
                .load(conn)?;
            with_activity(conn, rows)
        })
    }

    /// Every student of the institution, across classrooms.
    pub fn institution_students(&self, ctx: &InstitutionContext) -> Result<Vec<Student>, AppError> {
        self.with_connection(|conn| {
            let rows = students::table
                .filter(students::institution_id.eq(ctx.institution_id()))
                .order((students::student_name.asc(), students::id.asc()))
                .select(StudentRow::as_select())
                .load(conn)?;
            with_activity(conn, rows)
        })
    }

    pub fn student(&self, ctx: &InstitutionContext, student_id: &str) -> Result<Student, AppError> {
        let found = self.with_connection(|conn| {
            let row = students::table
                .find(student_id)
                .select(StudentRow::as_select())
                .first(conn)
                .optional()?;
            match row {
                Some(row) if row.institution_id == ctx.institution_id() => {
                    Ok(with_activity(conn, vec![row])?.pop())
                }
                Some(_) => Err(AppError::permission(
                    ctx.path(&format!("students/{student_id}")),
                    Operation::Read,
                )),
                None => Ok(None),
            }
        });

        match found.map_err(|err| self.observe(err))? {
            Some(student) => Ok(student),
            None => Err(AppError::NotFound(format!("student {student_id}"))),
        }
    }

    pub fn roster(
        &self,
        ctx: &InstitutionContext,
        classroom_id: &str,
        day: Date,
        offset: UtcOffset,
    ) -> Result<Vec<RosterEntry>, AppError> {
        self.classroom(ctx, classroom_id)?;
        Ok(self
            .students(ctx, classroom_id)?
            .into_iter()
            .map(|student| RosterEntry::new(student, day, offset))
            .collect())
    }

    /// Renames a student on its own, outside any enrollment batch.
    pub fn rename_student(
        &self,
        ctx: &InstitutionContext,
        student_id: &str,
        name: &str,
    ) -> Result<Student, AppError> {
        let name = name.trim();
        if name.chars().count() < MIN_STUDENT_NAME {
            return Err(AppError::Validation(format!(
                "student name must have at least {MIN_STUDENT_NAME} characters"
            )));
        }

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::RenameStudent {
            id: student_id.to_string(),
            institution_id: ctx.institution_id().to_string(),
            name: name.to_string(),
        });
        self.commit(batch)?;

        tracing::info!(student = %student_id, "renamed student");
        self.student(ctx, student_id)
    }

    /// Records one visit reported by a student's device.
    pub fn append_activity(
        &self,
        ctx: &InstitutionContext,
        student_id: &str,
        log: ActivityLog,
    ) -> Result<(), AppError> {
        if log.url.trim().is_empty() {
            return Err(AppError::Validation("url is required".into()));
        }
        if !(0..=MAX_ACTIVITY_SECS).contains(&log.duration_secs) {
            return Err(AppError::Validation(format!(
                "duration must be between 0 and {MAX_ACTIVITY_SECS} seconds"
            )));
        }

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::AppendActivity {
            student_id: student_id.to_string(),
            institution_id: ctx.institution_id().to_string(),
            log: ActivityLog {
                url: log.url.trim().to_string(),
                // Stored in UTC so entries order by instant.
                timestamp: log.timestamp.to_offset(UtcOffset::UTC),
                duration_secs: log.duration_secs,
            },
        });
        self.commit(batch)
    }
}

/// Notices that should refresh a classroom's roster.
pub fn roster_scope(ctx: &InstitutionContext, classroom_id: &str) -> WatchScope {
    WatchScope::classroom(Collection::Students, ctx.institution_id(), classroom_id)
}
