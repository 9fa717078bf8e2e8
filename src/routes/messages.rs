use super::institution_context;
use crate::app_state::AppState;
use crate::documents::Message;
use crate::error::AppError;
use crate::messaging::NewMessage;
use crate::session::Session;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;

pub async fn send_message(
    State(state): State<AppState>,
    session: Session,
    Path(iid): Path<String>,
    Json(request): Json<NewMessage>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let sender_id = session.uid.clone();
    let ctx = institution_context(&state, session, iid).await?;
    let moderator = Arc::clone(&state.moderator);
    let message = state
        .store
        .run(move |store| store.send_message(&ctx, &sender_id, request, moderator.as_ref()))
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn student_messages(
    State(state): State<AppState>,
    session: Session,
    Path((iid, sid)): Path<(String, String)>,
) -> Result<Json<Vec<Message>>, AppError> {
    let ctx = institution_context(&state, session, iid).await?;
    let messages = state
        .store
        .run(move |store| store.messages_for(&ctx, &sid))
        .await?;
    Ok(Json(messages))
}
