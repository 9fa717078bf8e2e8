use super::institution_context;
use crate::app_state::AppState;
use crate::documents::{PendingEnrollment, Student};
use crate::enrollment::{
    ConfirmEnrollment, EnrollmentQr, EnrollmentScope, ListenerEvent, ListenerHandle,
};
use crate::error::AppError;
use crate::session::Session;
use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use serde::{Deserialize, Serialize};
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

async fn classroom_qr(
    state: &AppState,
    session: Session,
    iid: String,
    cid: String,
) -> Result<EnrollmentQr, AppError> {
    let ctx = institution_context(state, session, iid).await?;
    let size = state.config.enrollment.qr_size;
    state
        .store
        .run(move |store| {
            store.classroom(&ctx, &cid)?;
            EnrollmentQr::generate(ctx.institution_id(), &cid, size)
        })
        .await
}

/// A fresh enrollment code for the classroom, with the payload it encodes.
pub async fn enrollment_qr(
    State(state): State<AppState>,
    session: Session,
    Path((iid, cid)): Path<(String, String)>,
) -> Result<Json<EnrollmentQr>, AppError> {
    Ok(Json(classroom_qr(&state, session, iid, cid).await?))
}

pub async fn enrollment_qr_svg(
    State(state): State<AppState>,
    session: Session,
    Path((iid, cid)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let qr = classroom_qr(&state, session, iid, cid).await?;
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], qr.svg).into_response())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerOpened {
    listener_id: Uuid,
    institution_id: String,
    classroom_id: String,
}

pub async fn open_listener(
    State(state): State<AppState>,
    session: Session,
    Path((iid, cid)): Path<(String, String)>,
) -> Result<(StatusCode, Json<ListenerOpened>), AppError> {
    let ctx = institution_context(&state, session, iid).await?;
    let classroom = state
        .store
        .run(move |store| store.classroom(&ctx, &cid))
        .await?;

    let scope = EnrollmentScope::new(classroom.institution_id, classroom.id);
    let handle = state.listeners.open(&state.store, scope.clone());
    Ok((
        StatusCode::CREATED,
        Json(ListenerOpened {
            listener_id: handle.id,
            institution_id: scope.institution_id,
            classroom_id: scope.classroom_id,
        }),
    ))
}

/// Looks up a listener the session is allowed to drive.
async fn owned_listener(
    state: &AppState,
    session: Session,
    lid: Uuid,
) -> Result<ListenerHandle, AppError> {
    let handle = state.listeners.get(lid)?;
    let institution_id = handle.listener.scope().institution_id.clone();
    institution_context(state, session, institution_id).await?;
    Ok(handle)
}

fn to_event(event: ListenerEvent) -> Result<Event, axum::Error> {
    let name = match &event {
        ListenerEvent::DeviceDetected(_) => "deviceDetected",
        ListenerEvent::PromptOpened(_) => "promptOpened",
    };
    Event::default().event(name).json_data(event)
}

/// Streams listener events until the client disconnects, then detaches the listener.
pub async fn listener_events(
    State(state): State<AppState>,
    session: Session,
    Path(lid): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    owned_listener(&state, session, lid).await?;
    // Ending the stream closes the listener session.
    let stream = state.listeners.take_events(lid)?.map(to_event);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Serialize)]
pub struct PromptState {
    prompt: Option<PendingEnrollment>,
}

/// Closes the dialog without confirming. The record stays pending.
pub async fn dismiss_prompt(
    State(state): State<AppState>,
    session: Session,
    Path(lid): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let handle = owned_listener(&state, session, lid).await?;
    if let Some(dismissed) = handle.listener.close_dialog() {
        tracing::debug!(listener = %lid, enrollment = %dismissed.id, "prompt dismissed");
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn refresh_listener(
    State(state): State<AppState>,
    session: Session,
    Path(lid): Path<Uuid>,
) -> Result<Json<PromptState>, AppError> {
    let handle = owned_listener(&state, session, lid).await?;
    handle.listener.refresh(&state.store).await?;
    Ok(Json(PromptState {
        prompt: handle.listener.prompt(),
    }))
}

pub async fn close_listener(
    State(state): State<AppState>,
    session: Session,
    Path(lid): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    owned_listener(&state, session, lid).await?;
    state.listeners.close(lid)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    student_name: String,
    #[serde(default)]
    listener_id: Option<Uuid>,
}

pub async fn confirm_enrollment(
    State(state): State<AppState>,
    session: Session,
    Path((iid, eid)): Path<(String, String)>,
    Json(request): Json<ConfirmRequest>,
) -> Result<(StatusCode, Json<Student>), AppError> {
    let ctx = institution_context(&state, session, iid).await?;
    let policy = state.config.enrollment.duplicate_device_policy;
    let student_name = request.student_name;

    let student = state
        .store
        .run(move |store| {
            let pending = store.pending_enrollment(&ctx, &eid)?;
            store.confirm_enrollment(
                &ctx,
                ConfirmEnrollment {
                    enrollment_id: eid,
                    pending,
                    student_name,
                },
                policy,
            )
        })
        .await?;

    // The dialog only closes once the batch went through; a failure leaves it open for retry.
    if let Some(lid) = request.listener_id {
        match state.listeners.get(lid) {
            Ok(handle) if handle.listener.scope().institution_id == student.institution_id => {
                if !handle.listener.close_dialog_for(&student.id) {
                    tracing::debug!(listener = %lid, "dialog is showing another record");
                }
            }
            Ok(_) => tracing::warn!(listener = %lid, "listener belongs to another institution"),
            Err(_) => tracing::debug!(listener = %lid, "listener already closed"),
        }
    }
    Ok((StatusCode::CREATED, Json(student)))
}
