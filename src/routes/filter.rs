use super::institution_context;
use crate::app_state::AppState;
use crate::error::AppError;
use crate::filters::FilterConfig;
use crate::session::Session;
use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;

pub async fn get_filter(
    State(state): State<AppState>,
    session: Session,
    Path(iid): Path<String>,
) -> Result<Json<FilterConfig>, AppError> {
    let ctx = institution_context(&state, session, iid).await?;
    let config = state.store.run(move |store| store.filter_config(&ctx)).await?;
    Ok(Json(config))
}

#[derive(Deserialize)]
pub struct SaveFilterRequest {
    blacklist: Vec<String>,
}

/// Replaces the institution's blacklist with the submitted entries.
pub async fn save_filter(
    State(state): State<AppState>,
    session: Session,
    Path(iid): Path<String>,
    Json(request): Json<SaveFilterRequest>,
) -> Result<Json<FilterConfig>, AppError> {
    let updated_by = session.uid.clone();
    let ctx = institution_context(&state, session, iid).await?;
    let config = state
        .store
        .run(move |store| {
            store.save_filter_config(&ctx, request.blacklist.as_slice(), &updated_by)
        })
        .await?;
    Ok(Json(config))
}
