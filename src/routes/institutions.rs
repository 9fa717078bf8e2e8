use super::institution_context;
use crate::app_state::AppState;
use crate::documents::{Classroom, Institution};
use crate::error::{AppError, Operation};
use crate::institutions::{InstitutionSummary, NewClassroom, NewInstitution};
use crate::session::{InstitutionContext, Role, Session};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    uid: String,
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    institution_id: Option<String>,
}

pub async fn current_session(session: Session) -> Json<SessionInfo> {
    let institution_id = match &session.role {
        Role::Admin { institution_id } => Some(institution_id.clone()),
        Role::SuperAdmin => None,
    };
    Json(SessionInfo {
        uid: session.uid,
        role: session.role,
        institution_id,
    })
}

pub async fn list_institutions(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<InstitutionSummary>>, AppError> {
    session
        .require_super_admin("institutions", Operation::Read)
        .map_err(|err| state.store.errors().observe(err))?;
    let institutions = state.store.run(|store| store.list_institutions()).await?;
    Ok(Json(institutions))
}

pub async fn create_institution(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<NewInstitution>,
) -> Result<(StatusCode, Json<Institution>), AppError> {
    session
        .require_super_admin("institutions", Operation::Write)
        .map_err(|err| state.store.errors().observe(err))?;
    let institution = state
        .store
        .run(move |store| store.create_institution(request))
        .await?;
    Ok((StatusCode::CREATED, Json(institution)))
}

pub async fn get_institution(
    State(state): State<AppState>,
    session: Session,
    Path(iid): Path<String>,
) -> Result<Json<Institution>, AppError> {
    let ctx = institution_context(&state, session, iid).await?;
    let institution = state.store.run(move |store| store.institution(&ctx)).await?;
    Ok(Json(institution))
}

#[derive(Deserialize)]
pub struct SuspensionRequest {
    suspended: bool,
}

pub async fn set_suspension(
    State(state): State<AppState>,
    session: Session,
    Path(iid): Path<String>,
    Json(request): Json<SuspensionRequest>,
) -> Result<Json<Institution>, AppError> {
    session
        .require_super_admin(&format!("institutions/{iid}"), Operation::Write)
        .map_err(|err| state.store.errors().observe(err))?;
    let institution = state
        .store
        .run(move |store| store.set_institution_suspended(&iid, request.suspended))
        .await?;
    Ok(Json(institution))
}

pub async fn assign_admin(
    State(state): State<AppState>,
    session: Session,
    Path((iid, uid)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    session
        .require_super_admin(&format!("institutions/{iid}/admins/{uid}"), Operation::Write)
        .map_err(|err| state.store.errors().observe(err))?;
    state
        .store
        .run(move |store| store.assign_admin(&InstitutionContext::new(iid), &uid))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_classrooms(
    State(state): State<AppState>,
    session: Session,
    Path(iid): Path<String>,
) -> Result<Json<Vec<Classroom>>, AppError> {
    let ctx = institution_context(&state, session, iid).await?;
    let classrooms = state.store.run(move |store| store.classrooms(&ctx)).await?;
    Ok(Json(classrooms))
}

pub async fn create_classroom(
    State(state): State<AppState>,
    session: Session,
    Path(iid): Path<String>,
    Json(request): Json<NewClassroom>,
) -> Result<(StatusCode, Json<Classroom>), AppError> {
    let ctx = institution_context(&state, session, iid).await?;
    let classroom = state
        .store
        .run(move |store| store.create_classroom(&ctx, request))
        .await?;
    Ok((StatusCode::CREATED, Json(classroom)))
}

pub async fn get_classroom(
    State(state): State<AppState>,
    session: Session,
    Path((iid, cid)): Path<(String, String)>,
) -> Result<Json<Classroom>, AppError> {
    let ctx = institution_context(&state, session, iid).await?;
    let classroom = state
        .store
        .run(move |store| store.classroom(&ctx, &cid))
        .await?;
    Ok(Json(classroom))
}
