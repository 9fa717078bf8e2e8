//! Who is calling, and which institution they act for.
//!
//! The identity provider sits in front of this service and forwards the
//! authenticated user id. The institution is resolved once per request from that
//! identity and then handed explicitly to every store operation.

use crate::app_state::AppState;
use crate::database::{AdminRow, InstitutionRow, admins, institutions};
use crate::error::{AppError, Operation};
use crate::store::Store;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use diesel::prelude::*;
use serde::Serialize;

/// Header carrying the authenticated user id.
pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Role {
    SuperAdmin,
    Admin {
        #[serde(rename = "institutionId")]
        institution_id: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Session {
    pub uid: String,
    pub role: Role,
}

/// The institution an operation is scoped to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstitutionContext {
    institution_id: String,
}

impl InstitutionContext {
    pub fn new(institution_id: impl Into<String>) -> Self {
        InstitutionContext {
            institution_id: institution_id.into(),
        }
    }

    pub fn institution_id(&self) -> &str {
        &self.institution_id
    }

    /// Document path prefix used in permission errors.
    pub fn path(&self, rest: &str) -> String {
        format!("institutions/{}/{rest}", self.institution_id)
    }
}

impl Session {
    pub fn resolve(store: &Store, super_admin_uid: &str, uid: &str) -> Result<Session, AppError> {
        if uid.is_empty() {
            return Err(AppError::MissingContext("not signed in".into()));
        }
        if uid == super_admin_uid {
            return Ok(Session {
                uid: uid.to_string(),
                role: Role::SuperAdmin,
            });
        }

        match store.admin_institution(uid)? {
            Some(institution_id) => Ok(Session {
                uid: uid.to_string(),
                role: Role::Admin { institution_id },
            }),
            None => Err(AppError::MissingContext(
                "your admin account is not associated with any institution".into(),
            )),
        }
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }

    pub fn require_super_admin(&self, path: &str, operation: Operation) -> Result<(), AppError> {
        if self.is_super_admin() {
            Ok(())
        } else {
            Err(AppError::permission(path, operation))
        }
    }

    /// Resolves the institution to act for, without consulting the store.
    ///
    /// A super admin must always name one. An admin may only name their own.
    pub fn institution(&self, requested: Option<&str>) -> Result<InstitutionContext, AppError> {
        let requested = requested.filter(|id| !id.is_empty());
        match (&self.role, requested) {
            (Role::SuperAdmin, Some(id)) => Ok(InstitutionContext::new(id)),
            (Role::SuperAdmin, None) => {
                Err(AppError::MissingContext("no institution was specified".into()))
            }
            (Role::Admin { institution_id }, None) => Ok(InstitutionContext::new(institution_id)),
            (Role::Admin { institution_id }, Some(id)) if id == institution_id => {
                Ok(InstitutionContext::new(id))
            }
            (Role::Admin { .. }, Some(id)) => {
                Err(AppError::permission(format!("institutions/{id}"), Operation::Read))
            }
        }
    }
}

impl Store {
    pub fn admin_institution(&self, uid: &str) -> Result<Option<String>, AppError> {
        self.with_connection(|conn| {
            Ok(admins::table
                .find(uid)
                .select(AdminRow::as_select())
                .first(conn)
                .optional()?
                .map(|admin| admin.institution_id))
        })
    }

    /// Associates an admin identity with an institution, replacing any previous one.
    pub fn assign_admin(&self, ctx: &InstitutionContext, uid: &str) -> Result<(), AppError> {
        if uid.trim().is_empty() {
            return Err(AppError::Validation("admin uid is required".into()));
        }
        self.institution(ctx)?;

        let row = AdminRow {
            uid: uid.trim().to_string(),
            institution_id: ctx.institution_id().to_string(),
        };
        self.with_connection(|conn| {
            diesel::replace_into(admins::table).values(&row).execute(conn)?;
            Ok(())
        })
    }

    /// Checks the session may act for `requested` right now.
    ///
    /// The institution must exist; admins of a suspended institution are refused.
    pub fn institution_context(
        &self,
        session: &Session,
        requested: Option<&str>,
    ) -> Result<InstitutionContext, AppError> {
        let ctx = session
            .institution(requested)
            .map_err(|err| self.observe(err))?;

        let institution = self.with_connection(|conn| {
            Ok(institutions::table
                .find(ctx.institution_id())
                .select(InstitutionRow::as_select())
                .first(conn)
                .optional()?)
        })?;

        match institution {
            None => Err(AppError::NotFound(format!(
                "institution {}",
                ctx.institution_id()
            ))),
            Some(institution) if institution.suspended && !session.is_super_admin() => {
                Err(self.observe(AppError::permission(
                    format!("institutions/{}", institution.id),
                    Operation::Read,
                )))
            }
            Some(_) => Ok(ctx),
        }
    }
}

impl FromRequestParts<AppState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let uid = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_string())
            .unwrap_or_default();
        let super_admin_uid = state.config.service.super_admin_uid.clone();

        state
            .store
            .run(move |store| Session::resolve(store, &super_admin_uid, &uid))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::institutions::NewInstitution;
    use crate::store::testing::temp_store;

    fn admin(institution_id: &str) -> Session {
        Session {
            uid: "ms-rivera".into(),
            role: Role::Admin {
                institution_id: institution_id.into(),
            },
        }
    }

    fn super_admin() -> Session {
        Session {
            uid: "root".into(),
            role: Role::SuperAdmin,
        }
    }

    #[test]
    fn admin_defaults_to_own_institution() {
        let ctx = admin("I1").institution(None).expect("context");
        assert_eq!(ctx.institution_id(), "I1");
    }

    #[test]
    fn admin_cannot_name_another_institution() {
        let err = admin("I1").institution(Some("I2")).unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(p) if p.path == "institutions/I2"));
    }

    #[test]
    fn super_admin_must_name_an_institution() {
        assert!(matches!(
            super_admin().institution(None),
            Err(AppError::MissingContext(_))
        ));
        assert_eq!(
            super_admin()
                .institution(Some("I9"))
                .expect("context")
                .institution_id(),
            "I9"
        );
    }

    #[test]
    fn resolve_looks_up_assigned_admins() {
        let (store, _dir) = temp_store();
        let institution = store
            .create_institution(NewInstitution {
                name: "Escuela 12".into(),
                address: None,
            })
            .expect("institution");
        store
            .assign_admin(&InstitutionContext::new(&institution.id), "ms-rivera")
            .expect("assign");

        let session = Session::resolve(&store, "root", "ms-rivera").expect("session");
        assert_eq!(
            session.role,
            Role::Admin {
                institution_id: institution.id
            }
        );
        assert!(Session::resolve(&store, "root", "root").expect("root").is_super_admin());
        assert!(matches!(
            Session::resolve(&store, "root", "stranger"),
            Err(AppError::MissingContext(_))
        ));
    }

    #[test]
    fn suspended_institution_refuses_its_admins() {
        let (store, _dir) = temp_store();
        let institution = store
            .create_institution(NewInstitution {
                name: "Escuela 12".into(),
                address: None,
            })
            .expect("institution");
        store
            .set_institution_suspended(&institution.id, true)
            .expect("suspend");

        let err = store
            .institution_context(&admin(&institution.id), None)
            .unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));
        assert!(
            store
                .institution_context(&super_admin(), Some(&institution.id))
                .is_ok()
        );
    }
}
