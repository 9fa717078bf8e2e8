use crate::database::{ClassroomRow, InstitutionRow, classrooms, institutions};
use crate::documents::{Classroom, Institution};
use crate::error::{AppError, Operation};
use crate::session::InstitutionContext;
use crate::store::Store;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Uuid;

const MIN_INSTITUTION_NAME: usize = 3;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInstitution {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClassroom {
    pub grade: String,
    pub section: String,
    #[serde(default)]
    pub capacity: Option<i32>,
}

/// An institution as listed to the super admin.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstitutionSummary {
    #[serde(flatten)]
    pub institution: Institution,
    pub classroom_count: usize,
}

pub fn classroom_display_name(grade: &str, section: &str) -> String {
    format!("{grade} - Section {section}")
}

impl Store {
    pub fn create_institution(&self, request: NewInstitution) -> Result<Institution, AppError> {
        let name = request.name.trim();
        if name.chars().count() < MIN_INSTITUTION_NAME {
            return Err(AppError::Validation(format!(
                "institution name must have at least {MIN_INSTITUTION_NAME} characters"
            )));
        }

        let row = InstitutionRow {
            id: Uuid::new_v4().simple().to_string(),
            name: name.to_string(),
            address: request.address.unwrap_or_default().trim().to_string(),
            logo_url: String::new(),
            filter_mode: "blacklist".to_string(),
            suspended: false,
            created_at: OffsetDateTime::now_utc(),
        };
        self.with_connection(|conn| {
            diesel::insert_into(institutions::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })?;

        tracing::info!(institution = %row.id, name = %row.name, "created institution");
        Ok(row.into())
    }

    pub fn list_institutions(&self) -> Result<Vec<InstitutionSummary>, AppError> {
        self.with_connection(|conn| {
            let rows = institutions::table
                .order(institutions::name.asc())
                .select(InstitutionRow::as_select())
                .load(conn)?;
            let owners: Vec<String> = classrooms::table
                .select(classrooms::institution_id)
                .load(conn)?;

            let mut counts: HashMap<String, usize> = HashMap::new();
            for owner in owners {
                *counts.entry(owner).or_default() += 1;
            }

            Ok(rows
                .into_iter()
                .map(|row| InstitutionSummary {
                    classroom_count: counts.get(&row.id).copied().unwrap_or(0),
                    institution: row.into(),
                })
                .collect())
        })
    }

    pub fn institution(&self, ctx: &InstitutionContext) -> Result<Institution, AppError> {
        self.with_connection(|conn| {
            institutions::table
                .find(ctx.institution_id())
                .select(InstitutionRow::as_select())
                .first(conn)
                .optional()?
                .map(Institution::from)
                .ok_or_else(|| AppError::NotFound(format!("institution {}", ctx.institution_id())))
        })
    }

    pub fn set_institution_suspended(
        &self,
        institution_id: &str,
        suspended: bool,
    ) -> Result<Institution, AppError> {
        let updated = self.with_connection(|conn| {
            Ok(diesel::update(institutions::table.find(institution_id))
                .set(institutions::suspended.eq(suspended))
                .execute(conn)?)
        })?;
        if updated == 0 {
            return Err(AppError::NotFound(format!("institution {institution_id}")));
        }

        tracing::info!(institution = %institution_id, suspended, "changed institution status");
        self.institution(&InstitutionContext::new(institution_id))
    }

    pub fn create_classroom(
        &self,
        ctx: &InstitutionContext,
        request: NewClassroom,
    ) -> Result<Classroom, AppError> {
        let grade = request.grade.trim();
        let section = request.section.trim();
        if grade.is_empty() {
            return Err(AppError::Validation("grade is required".into()));
        }
        if section.is_empty() {
            return Err(AppError::Validation("section is required".into()));
        }
        if request.capacity.is_some_and(|capacity| capacity < 1) {
            return Err(AppError::Validation("capacity must be at least 1".into()));
        }
        self.institution(ctx)?;

        let row = ClassroomRow {
            id: Uuid::new_v4().simple().to_string(),
            institution_id: ctx.institution_id().to_string(),
            grade: grade.to_string(),
            section: section.to_string(),
            capacity: request.capacity,
            display_name: classroom_display_name(grade, section),
            published: true,
            created_at: OffsetDateTime::now_utc(),
        };
        self.with_connection(|conn| {
            diesel::insert_into(classrooms::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })?;

        tracing::info!(institution = %row.institution_id, classroom = %row.id, "created classroom");
        Ok(row.into())
    }

    pub fn classrooms(&self, ctx: &InstitutionContext) -> Result<Vec<Classroom>, AppError> {
        self.with_connection(|conn| {
            let rows = classrooms::table
                .filter(classrooms::institution_id.eq(ctx.institution_id()))
                .order(classrooms::display_name.asc())
                .select(ClassroomRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(Classroom::from).collect())
        })
    }

    /// Loads a classroom, which must belong to the context's institution.
    pub fn classroom(
        &self,
        ctx: &InstitutionContext,
        classroom_id: &str,
    ) -> Result<Classroom, AppError> {
        let row = self.with_connection(|conn| {
            Ok(classrooms::table
                .find(classroom_id)
                .select(ClassroomRow::as_select())
                .first(conn)
                .optional()?)
        })?;

        match row {
            None => Err(AppError::NotFound(format!("classroom {classroom_id}"))),
            Some(row) if row.institution_id != ctx.institution_id() => Err(self.observe(
                AppError::permission(ctx.path(&format!("classrooms/{classroom_id}")), Operation::Read),
            )),
            Some(row) => Ok(row.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::temp_store;

    fn institution(store: &Store, name: &str) -> InstitutionContext {
        let created = store
            .create_institution(NewInstitution {
                name: name.into(),
                address: None,
            })
            .expect("institution");
        InstitutionContext::new(created.id)
    }

    #[test]
    fn institution_defaults() {
        let (store, _dir) = temp_store();
        let ctx = institution(&store, "  Escuela 12 ");
        let created = store.institution(&ctx).expect("load");

        assert_eq!(created.name, "Escuela 12");
        assert_eq!(created.filter_mode, "blacklist");
        assert!(!created.suspended);
    }

    #[test]
    fn short_institution_names_are_rejected() {
        let (store, _dir) = temp_store();
        let err = store
            .create_institution(NewInstitution {
                name: " ab ".into(),
                address: None,
            })
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn listing_counts_classrooms() {
        let (store, _dir) = temp_store();
        let first = institution(&store, "Alpha School");
        institution(&store, "Beta School");
        for section in ["A", "B"] {
            store
                .create_classroom(
                    &first,
                    NewClassroom {
                        grade: "1st".into(),
                        section: section.into(),
                        capacity: None,
                    },
                )
                .expect("classroom");
        }

        let listed = store.list_institutions().expect("list");
        let counts: Vec<_> = listed
            .iter()
            .map(|summary| (summary.institution.name.as_str(), summary.classroom_count))
            .collect();
        assert_eq!(counts, [("Alpha School", 2), ("Beta School", 0)]);
    }

    #[test]
    fn classroom_gets_a_display_name() {
        let (store, _dir) = temp_store();
        let ctx = institution(&store, "Escuela 12");
        let classroom = store
            .create_classroom(
                &ctx,
                NewClassroom {
                    grade: "3rd Grade".into(),
                    section: "B".into(),
                    capacity: Some(30),
                },
            )
            .expect("classroom");

        assert_eq!(classroom.display_name, "3rd Grade - Section B");
        assert_eq!(store.classrooms(&ctx).expect("list"), vec![classroom]);
    }

    #[test]
    fn classroom_requires_grade_and_section() {
        let (store, _dir) = temp_store();
        let ctx = institution(&store, "Escuela 12");
        let err = store
            .create_classroom(
                &ctx,
                NewClassroom {
                    grade: " ".into(),
                    section: "A".into(),
                    capacity: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn classroom_of_another_institution_is_refused() {
        let (store, _dir) = temp_store();
        let owner = institution(&store, "Alpha School");
        let other = institution(&store, "Beta School");
        let classroom = store
            .create_classroom(
                &owner,
                NewClassroom {
                    grade: "1st".into(),
                    section: "A".into(),
                    capacity: None,
                },
            )
            .expect("classroom");

        let err = store.classroom(&other, &classroom.id).unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));
    }
}
