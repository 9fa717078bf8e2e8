//! Endpoints called by tablets rather than admins.
//!
//! Devices name the institution they belong to and every record is checked against it;
//! admin sessions are not required here.

use crate::app_state::AppState;
use crate::documents::{ActivityLog, Message, PendingEnrollment};
use crate::enrollment::NewPendingEnrollment;
use crate::error::AppError;
use crate::session::InstitutionContext;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;

pub async fn request_enrollment(
    State(state): State<AppState>,
    Json(request): Json<NewPendingEnrollment>,
) -> Result<(StatusCode, Json<PendingEnrollment>), AppError> {
    let pending = state
        .store
        .run(move |store| store.register_pending_enrollment(request))
        .await?;
    Ok((StatusCode::CREATED, Json(pending)))
}

pub async fn report_activity(
    State(state): State<AppState>,
    Path((iid, sid)): Path<(String, String)>,
    Json(log): Json<ActivityLog>,
) -> Result<StatusCode, AppError> {
    state
        .store
        .run(move |store| store.append_activity(&InstitutionContext::new(iid), &sid, log))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct Blacklist {
    blacklist: Vec<String>,
}

pub async fn get_blacklist(
    State(state): State<AppState>,
    Path(iid): Path<String>,
) -> Result<Json<Blacklist>, AppError> {
    let config = state
        .store
        .run(move |store| store.filter_config(&InstitutionContext::new(iid)))
        .await?;
    Ok(Json(Blacklist {
        blacklist: config.blacklist,
    }))
}

pub async fn confirm_read(
    State(state): State<AppState>,
    Path((iid, mid)): Path<(String, String)>,
) -> Result<Json<Message>, AppError> {
    let message = state
        .store
        .run(move |store| store.mark_message_read(&InstitutionContext::new(iid), &mid))
        .await?;
    Ok(Json(message))
}
