use crate::app_state::AppState;
use crate::error::AppError;
use crate::roster::utc_offset;
use crate::session::{InstitutionContext, Session};
use axum::Router;
use axum::routing::{delete, get, post, put};
use serde::Deserialize;
use time::UtcOffset;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

mod device;
mod enroll;
mod filter;
mod institutions;
mod messages;
mod reports;
mod students;

pub fn create_routes(state: AppState) -> Router {
    let admin = Router::new()
        .route("/session", get(institutions::current_session))
        .route(
            "/institutions",
            get(institutions::list_institutions).post(institutions::create_institution),
        )
        .route("/institutions/{iid}", get(institutions::get_institution))
        .route(
            "/institutions/{iid}/suspension",
            put(institutions::set_suspension),
        )
        .route(
            "/institutions/{iid}/admins/{uid}",
            put(institutions::assign_admin),
        )
        .route(
            "/institutions/{iid}/classrooms",
            get(institutions::list_classrooms).post(institutions::create_classroom),
        )
        .route(
            "/institutions/{iid}/classrooms/{cid}",
            get(institutions::get_classroom),
        )
        .route(
            "/institutions/{iid}/classrooms/{cid}/enrollment-qr",
            get(enroll::enrollment_qr),
        )
        .route(
            "/institutions/{iid}/classrooms/{cid}/enrollment-qr.svg",
            get(enroll::enrollment_qr_svg),
        )
        .route(
            "/institutions/{iid}/classrooms/{cid}/listeners",
            post(enroll::open_listener),
        )
        .route("/listeners/{lid}", delete(enroll::close_listener))
        .route("/listeners/{lid}/events", get(enroll::listener_events))
        .route("/listeners/{lid}/dismiss", post(enroll::dismiss_prompt))
        .route("/listeners/{lid}/refresh", post(enroll::refresh_listener))
        .route(
            "/institutions/{iid}/enrollments/{eid}/confirm",
            post(enroll::confirm_enrollment),
        )
        .route(
            "/institutions/{iid}/classrooms/{cid}/students",
            get(students::classroom_roster),
        )
        .route(
            "/institutions/{iid}/classrooms/{cid}/students/stream",
            get(students::roster_stream),
        )
        .route(
            "/institutions/{iid}/students/{sid}",
            get(students::get_student).patch(students::rename_student),
        )
        .route(
            "/institutions/{iid}/students/{sid}/infractions",
            get(students::infraction_log),
        )
        .route(
            "/institutions/{iid}/students/{sid}/messages",
            get(messages::student_messages),
        )
        .route(
            "/institutions/{iid}/filter",
            get(filter::get_filter).put(filter::save_filter),
        )
        .route("/institutions/{iid}/messages", post(messages::send_message))
        .route("/institutions/{iid}/reports", get(reports::usage_report));

    // Tablets and the on-device agent.
    let device = Router::new()
        .route("/enrollments", post(device::request_enrollment))
        .route(
            "/institutions/{iid}/students/{sid}/activity",
            post(device::report_activity),
        )
        .route("/institutions/{iid}/filter", get(device::get_blacklist))
        .route(
            "/institutions/{iid}/messages/{mid}/read",
            post(device::confirm_read),
        );

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/api", admin)
        .nest("/api/device", device)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Checks the session may act for `institution_id` and returns its context.
pub(crate) async fn institution_context(
    state: &AppState,
    session: Session,
    institution_id: String,
) -> Result<InstitutionContext, AppError> {
    state
        .store
        .run(move |store| store.institution_context(&session, Some(&institution_id)))
        .await
}

/// Query parameters for views that depend on the viewer's calendar day.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ViewerQuery {
    pub utc_offset_minutes: Option<i32>,
}

impl ViewerQuery {
    pub fn offset(&self, state: &AppState) -> Result<UtcOffset, AppError> {
        utc_offset(
            self.utc_offset_minutes
                .unwrap_or(state.config.service.default_utc_offset_minutes),
        )
    }
}
