use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use school_mdm::app_state::AppState;
use school_mdm::config::Config;
use school_mdm::routes::create_routes;
use school_mdm::session::USER_HEADER;
use serde_json::{Value, json};
use tempfile::TempDir;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tower::ServiceExt;

const SUPER_ADMIN: &str = "root";

struct TestApp {
    router: Router,
    _dir: TempDir,
}

impl TestApp {
    fn new() -> Self {
        Self::with_settings("")
    }

    fn with_settings(extra: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let database_path = dir.path().join("school.sqlite3");
        let config = Config::from_toml_str(&format!(
            "[service]\norganization_name = \"Escuela 12\"\nsuper_admin_uid = \"{SUPER_ADMIN}\"\n\
             [storage]\ndatabase_path = \"{}\"\n{extra}",
            database_path.display()
        ))
        .expect("config parses");
        let state = AppState::with_config(config).expect("state");

        TestApp {
            router: create_routes(state),
            _dir: dir,
        }
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            request = request.header(USER_HEADER, user);
        }
        let body = match body {
            Some(body) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request.body(body).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }

    /// Creates an institution with an admin and one classroom.
    async fn school(&self, name: &str, admin: &str) -> (String, String) {
        let (status, institution) = self
            .call(
                Method::POST,
                "/api/institutions",
                Some(SUPER_ADMIN),
                Some(json!({ "name": name })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{institution}");
        let iid = institution["id"].as_str().expect("id").to_string();

        let (status, _) = self
            .call(
                Method::PUT,
                &format!("/api/institutions/{iid}/admins/{admin}"),
                Some(SUPER_ADMIN),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, classroom) = self
            .call(
                Method::POST,
                &format!("/api/institutions/{iid}/classrooms"),
                Some(admin),
                Some(json!({ "grade": "5th", "section": "A" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{classroom}");
        let cid = classroom["id"].as_str().expect("id").to_string();
        (iid, cid)
    }

    async fn device_enrolls(&self, iid: &str, cid: &str, mac_address: &str) -> String {
        let (status, pending) = self
            .call(
                Method::POST,
                "/api/device/enrollments",
                None,
                Some(json!({
                    "institutionId": iid,
                    "classroomId": cid,
                    "deviceInfo": { "macAddress": mac_address, "model": "Tab A8" },
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{pending}");
        pending["id"].as_str().expect("id").to_string()
    }
}

#[tokio::test]
async fn enrollment_flow_end_to_end() {
    let app = TestApp::new();
    let (iid, cid) = app.school("Escuela 12", "ms-rivera").await;

    let (status, qr) = app
        .call(
            Method::GET,
            &format!("/api/institutions/{iid}/classrooms/{cid}/enrollment-qr"),
            Some("ms-rivera"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(qr["payload"]["institutionId"], iid.as_str());
    assert_eq!(qr["payload"]["classroomId"], cid.as_str());
    assert!(qr["svg"].as_str().expect("svg").contains("<svg"));

    let eid = app.device_enrolls(&iid, &cid, "AA:BB:CC:01").await;
    let confirm_uri = format!("/api/institutions/{iid}/enrollments/{eid}/confirm");
    let (status, student) = app
        .call(
            Method::POST,
            &confirm_uri,
            Some("ms-rivera"),
            Some(json!({ "studentName": "Ana Pérez" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{student}");
    assert_eq!(student["id"], eid.as_str());
    assert_eq!(student["macAddress"], "AA:BB:CC:01");

    let (status, _) = app
        .call(
            Method::POST,
            &confirm_uri,
            Some("ms-rivera"),
            Some(json!({ "studentName": "Someone Else" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let now = OffsetDateTime::now_utc().format(&Rfc3339).expect("timestamp");
    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/device/institutions/{iid}/students/{eid}/activity"),
            None,
            Some(json!({ "url": "https://games.example/", "timestamp": now, "durationSecs": 90 })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (other, _) = app.school("Beta School", "beta-admin").await;
    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/device/institutions/{other}/students/{eid}/activity"),
            None,
            Some(json!({ "url": "https://games.example/", "timestamp": now, "durationSecs": 90 })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, roster) = app
        .call(
            Method::GET,
            &format!("/api/institutions/{iid}/classrooms/{cid}/students?utcOffsetMinutes=0"),
            Some("ms-rivera"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let roster = roster.as_array().expect("roster");
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0]["studentName"], "Ana Pérez");
    assert_eq!(roster[0]["deviceNumber"], "01");
    assert_eq!(roster[0]["infractionsToday"], 1);
}

#[tokio::test]
async fn listener_prompts_and_closes_on_confirmation() {
    let app = TestApp::new();
    let (iid, cid) = app.school("Escuela 12", "ms-rivera").await;

    let (status, opened) = app
        .call(
            Method::POST,
            &format!("/api/institutions/{iid}/classrooms/{cid}/listeners"),
            Some("ms-rivera"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let lid = opened["listenerId"].as_str().expect("listener id").to_string();

    let eid = app.device_enrolls(&iid, &cid, "AA:BB:CC:01").await;
    let (status, prompt) = app
        .call(
            Method::POST,
            &format!("/api/listeners/{lid}/refresh"),
            Some("ms-rivera"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(prompt["prompt"]["id"], eid.as_str());

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/institutions/{iid}/enrollments/{eid}/confirm"),
            Some("ms-rivera"),
            Some(json!({ "studentName": "Ana", "listenerId": lid })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, prompt) = app
        .call(
            Method::POST,
            &format!("/api/listeners/{lid}/refresh"),
            Some("ms-rivera"),
            None,
        )
        .await;
    assert_eq!(prompt["prompt"], Value::Null);

    // Another institution's admin cannot drive this listener.
    app.school("Beta School", "intruder").await;
    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/api/listeners/{lid}"),
            Some("intruder"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/api/listeners/{lid}"),
            Some("ms-rivera"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/listeners/{lid}/dismiss"),
            Some("ms-rivera"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admins_stay_inside_their_institution() {
    let app = TestApp::new();
    let (iid, cid) = app.school("Alpha School", "alpha-admin").await;
    app.school("Beta School", "beta-admin").await;

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/institutions/{iid}/classrooms/{cid}/students"),
            Some("beta-admin"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "permission_denied");

    let (status, body) = app
        .call(Method::GET, "/api/institutions", Some("alpha-admin"), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
}

#[tokio::test]
async fn unknown_identities_are_sent_to_the_unauthorized_page() {
    let app = TestApp::new();

    let (status, body) = app.call(Method::GET, "/api/session", None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "missing_context");
    assert_eq!(body["redirect"], "/dashboard/unauthorized");

    let (status, body) = app
        .call(Method::GET, "/api/session", Some(SUPER_ADMIN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"]["kind"], "superAdmin");
}

#[tokio::test]
async fn suspended_institutions_lock_out_their_admins() {
    let app = TestApp::new();
    let (iid, _) = app.school("Escuela 12", "ms-rivera").await;

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/api/institutions/{iid}/suspension"),
            Some(SUPER_ADMIN),
            Some(json!({ "suspended": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(
            Method::GET,
            &format!("/api/institutions/{iid}/classrooms"),
            Some("ms-rivera"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn blacklist_is_normalized_and_served_to_devices() {
    let app = TestApp::new();
    let (iid, _) = app.school("Escuela 12", "ms-rivera").await;

    let (status, saved) = app
        .call(
            Method::PUT,
            &format!("/api/institutions/{iid}/filter"),
            Some("ms-rivera"),
            Some(json!({ "blacklist": ["HTTPS://Games.example/", "games.example", "social.example"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{saved}");
    assert_eq!(saved["updatedBy"], "ms-rivera");

    let (status, served) = app
        .call(
            Method::GET,
            &format!("/api/device/institutions/{iid}/filter"),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(served["blacklist"], json!(["games.example", "social.example"]));

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/api/institutions/{iid}/filter"),
            Some("ms-rivera"),
            Some(json!({ "blacklist": ["https://"] })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn moderated_messages_reach_students() {
    let app = TestApp::with_settings("[moderation]\nblocked_terms = [\"idiot\"]\n");
    let (iid, cid) = app.school("Escuela 12", "ms-rivera").await;
    let eid = app.device_enrolls(&iid, &cid, "AA:BB:CC:01").await;
    app.call(
        Method::POST,
        &format!("/api/institutions/{iid}/enrollments/{eid}/confirm"),
        Some("ms-rivera"),
        Some(json!({ "studentName": "Ana" })),
    )
    .await;

    let messages_uri = format!("/api/institutions/{iid}/messages");
    let (status, body) = app
        .call(
            Method::POST,
            &messages_uri,
            Some("ms-rivera"),
            Some(json!({ "studentId": eid, "body": "Don't be an idiot" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "moderation_rejected");

    let (status, sent) = app
        .call(
            Method::POST,
            &messages_uri,
            Some("ms-rivera"),
            Some(json!({ "studentId": eid, "body": "Bring your notebook tomorrow" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let mid = sent["id"].as_str().expect("id");

    // A device of another institution cannot acknowledge it.
    let (other, _) = app.school("Beta School", "beta-admin").await;
    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/device/institutions/{other}/messages/{mid}/read"),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, read) = app
        .call(
            Method::POST,
            &format!("/api/device/institutions/{iid}/messages/{mid}/read"),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["readConfirmation"], true);

    let (_, listed) = app
        .call(
            Method::GET,
            &format!("/api/institutions/{iid}/students/{eid}/messages"),
            Some("ms-rivera"),
            None,
        )
        .await;
    assert_eq!(listed.as_array().expect("messages").len(), 1);
}

#[tokio::test]
async fn report_summarizes_the_week() {
    let app = TestApp::new();
    let (iid, cid) = app.school("Escuela 12", "ms-rivera").await;
    let eid = app.device_enrolls(&iid, &cid, "AA:BB:CC:01").await;
    app.call(
        Method::POST,
        &format!("/api/institutions/{iid}/enrollments/{eid}/confirm"),
        Some("ms-rivera"),
        Some(json!({ "studentName": "Ana" })),
    )
    .await;

    let now = OffsetDateTime::now_utc().format(&Rfc3339).expect("timestamp");
    for (url, secs) in [("video.example/a", 600), ("video.example/b", 300), ("games.example", 120)] {
        let (status, _) = app
            .call(
                Method::POST,
                &format!("/api/device/institutions/{iid}/students/{eid}/activity"),
                None,
                Some(json!({ "url": url, "timestamp": now, "durationSecs": secs })),
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let (status, report) = app
        .call(
            Method::GET,
            &format!("/api/institutions/{iid}/reports?utcOffsetMinutes=0"),
            Some("ms-rivera"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["studentCount"], 1);
    assert_eq!(
        report["usageBySite"],
        json!([
            { "site": "video.example", "minutes": 15 },
            { "site": "games.example", "minutes": 2 },
        ])
    );
    let days = report["dailyInfractions"].as_array().expect("days");
    assert_eq!(days.len(), 7);
    assert_eq!(days[6]["infractions"], 3);
}
