use super::{ViewerQuery, institution_context};
use crate::app_state::AppState;
use crate::error::AppError;
use crate::reports::UsageReport;
use crate::roster::today;
use crate::session::Session;
use axum::{
    Json,
    extract::{Path, Query, State},
};

pub async fn usage_report(
    State(state): State<AppState>,
    session: Session,
    Path(iid): Path<String>,
    Query(viewer): Query<ViewerQuery>,
) -> Result<Json<UsageReport>, AppError> {
    let offset = viewer.offset(&state)?;
    let ctx = institution_context(&state, session, iid).await?;
    let report = state
        .store
        .run(move |store| store.usage_report(&ctx, today(offset), offset))
        .await?;
    Ok(Json(report))
}
