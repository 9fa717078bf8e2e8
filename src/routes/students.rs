use super::{ViewerQuery, institution_context};
use crate::app_state::AppState;
use crate::documents::{ActivityLog, Student};
use crate::error::AppError;
use crate::roster::{RosterEntry, infraction_log_on, roster_scope, today};
use crate::session::Session;
use axum::{
    Json,
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};

pub async fn classroom_roster(
    State(state): State<AppState>,
    session: Session,
    Path((iid, cid)): Path<(String, String)>,
    Query(viewer): Query<ViewerQuery>,
) -> Result<Json<Vec<RosterEntry>>, AppError> {
    let offset = viewer.offset(&state)?;
    let ctx = institution_context(&state, session, iid).await?;
    let roster = state
        .store
        .run(move |store| store.roster(&ctx, &cid, today(offset), offset))
        .await?;
    Ok(Json(roster))
}

/// Streams the classroom roster, re-sent whenever one of its students changes.
pub async fn roster_stream(
    State(state): State<AppState>,
    session: Session,
    Path((iid, cid)): Path<(String, String)>,
    Query(viewer): Query<ViewerQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let offset = viewer.offset(&state)?;
    let ctx = institution_context(&state, session, iid).await?;
    let checked = ctx.clone();
    let classroom_id = cid.clone();
    state
        .store
        .run(move |store| store.classroom(&checked, &classroom_id))
        .await?;

    let (sender, receiver) = mpsc::unbounded_channel();
    let scope = roster_scope(&ctx, &cid);
    let subscription = state.store.watch(
        scope,
        move |store| store.students(&ctx, &cid),
        move |result| {
            let _ = sender.send(result);
        },
    );

    let stream = UnboundedReceiverStream::new(receiver).map(move |result| {
        // Held here so the watch ends when the client goes away.
        let _watching = &subscription;
        match result {
            Ok(snapshot) => {
                let day = today(offset);
                let roster: Vec<RosterEntry> = snapshot
                    .documents
                    .into_iter()
                    .map(|student| RosterEntry::new(student, day, offset))
                    .collect();
                Event::default().event("roster").json_data(roster)
            }
            Err(err) => Ok(Event::default().event("error").data(err.to_string())),
        }
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn get_student(
    State(state): State<AppState>,
    session: Session,
    Path((iid, sid)): Path<(String, String)>,
) -> Result<Json<Student>, AppError> {
    let ctx = institution_context(&state, session, iid).await?;
    let student = state.store.run(move |store| store.student(&ctx, &sid)).await?;
    Ok(Json(student))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    student_name: String,
}

pub async fn rename_student(
    State(state): State<AppState>,
    session: Session,
    Path((iid, sid)): Path<(String, String)>,
    Json(request): Json<RenameRequest>,
) -> Result<Json<Student>, AppError> {
    let ctx = institution_context(&state, session, iid).await?;
    let student = state
        .store
        .run(move |store| store.rename_student(&ctx, &sid, &request.student_name))
        .await?;
    Ok(Json(student))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfractionLog {
    student_id: String,
    student_name: String,
    entries: Vec<ActivityLog>,
}

/// Today's infractions of one student, most recent first.
pub async fn infraction_log(
    State(state): State<AppState>,
    session: Session,
    Path((iid, sid)): Path<(String, String)>,
    Query(viewer): Query<ViewerQuery>,
) -> Result<Json<InfractionLog>, AppError> {
    let offset = viewer.offset(&state)?;
    let ctx = institution_context(&state, session, iid).await?;
    let student = state.store.run(move |store| store.student(&ctx, &sid)).await?;

    let entries = infraction_log_on(&student.activity_logs, today(offset), offset);
    Ok(Json(InfractionLog {
        student_id: student.id,
        student_name: student.student_name,
        entries,
    }))
}
