//! Booking, assignment and visibility through the HTTP dispatcher

mod common;

use chrono::{Duration, Utc};
use hyper::{Method, StatusCode};
use serde_json::json;

use common::TestApp;

fn tomorrow() -> String {
    (Utc::now() + Duration::days(1)).format("%Y-%m-%d").to_string()
}

#[tokio::test]
async fn test_booking_assigns_first_active_counselor() {
    let app = TestApp::new();
    let (_, root) = app.super_admin().await;
    let company = app.company(&root, "acme.co.kr").await;
    let counselor = app.account(&root, "kim@counsel.kr", "counselor", None).await;
    app.account(&root, "lee@acme.co.kr", "employee", Some(&company)).await;

    let employee = app.login("lee@acme.co.kr").await;
    let booked = app
        .post(
            "/counseling-sessions",
            &employee,
            json!({
                "topic": "stress",
                "deliveryMethod": "faceToFace",
                "appointmentDate": tomorrow()
            }),
        )
        .await;
    assert_eq!(booked.status, StatusCode::CREATED, "{}", booked.body);
    assert_eq!(booked.data()["assignmentStatus"], "assigned");
    assert_eq!(booked.data()["counselor"], counselor.as_str());
    assert_eq!(booked.data()["status"], "scheduled");
    assert_eq!(booked.data()["company"], company.as_str());
    // the client view never carries the counselor's rate
    assert!(booked.data().get("counselorRate").is_none());

    let id = booked.data()["id"].as_str().unwrap().to_string();
    let as_admin = app.get(&format!("/counseling-sessions/{id}"), &root).await;
    assert_eq!(as_admin.status, StatusCode::OK);
    assert_eq!(as_admin.data()["counselorRate"], 50000);

    let kim = app.login("kim@counsel.kr").await;
    let as_counselor = app.get(&format!("/counseling-sessions/{id}"), &kim).await;
    assert_eq!(as_counselor.data()["counselorRate"], 50000);
    assert_eq!(as_counselor.data()["topic"], "stress");
}

#[tokio::test]
async fn test_booking_without_counselor_stays_pending() {
    let app = TestApp::new();
    let (_, root) = app.super_admin().await;
    let company = app.company(&root, "acme.co.kr").await;
    app.account(&root, "lee@acme.co.kr", "employee", Some(&company)).await;
    let employee = app.login("lee@acme.co.kr").await;

    let booked = app
        .post(
            "/counseling-sessions",
            &employee,
            json!({ "topic": "sleep", "deliveryMethod": "chat", "appointmentDate": tomorrow() }),
        )
        .await;
    assert_eq!(booked.status, StatusCode::CREATED);
    assert_eq!(booked.data()["assignmentStatus"], "pending");
    assert!(booked.data()["counselor"].is_null());

    let counselor = app.seed_counselor("park@counsel.kr").await;
    let id = booked.data()["id"].as_str().unwrap();
    let assigned = app
        .put(
            &format!("/counseling-sessions/{id}/assign"),
            &root,
            json!({ "counselorId": counselor }),
        )
        .await;
    assert_eq!(assigned.status, StatusCode::OK, "{}", assigned.body);
    assert_eq!(assigned.data()["assignmentStatus"], "assigned");
    assert_eq!(assigned.data()["counselorRate"], 50000);
}

#[tokio::test]
async fn test_assigned_counselor_confirms_booking() {
    let app = TestApp::new();
    let (_, root) = app.super_admin().await;
    let company = app.company(&root, "acme.co.kr").await;
    app.seed_counselor("kim@counsel.kr").await;
    app.account(&root, "lee@acme.co.kr", "employee", Some(&company)).await;

    let lee = app.login("lee@acme.co.kr").await;
    let booked = app
        .post(
            "/counseling-sessions",
            &lee,
            json!({ "topic": "stress", "deliveryMethod": "chat", "appointmentDate": tomorrow() }),
        )
        .await;
    let id = booked.data()["id"].as_str().unwrap().to_string();
    let uri = format!("/counseling-sessions/{id}/confirm");

    let refused = app.put(&uri, &lee, json!({})).await;
    assert_eq!(refused.status, StatusCode::FORBIDDEN);

    let kim = app.login("kim@counsel.kr").await;
    let confirmed = app.put(&uri, &kim, json!({})).await;
    assert_eq!(confirmed.status, StatusCode::OK, "{}", confirmed.body);
    assert_eq!(confirmed.data()["assignmentStatus"], "confirmed");

    let again = app.put(&uri, &kim, json!({})).await;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_booking_rejects_bad_input() {
    let app = TestApp::new();
    let (_, root) = app.super_admin().await;
    let company = app.company(&root, "acme.co.kr").await;
    app.account(&root, "lee@acme.co.kr", "employee", Some(&company)).await;
    let employee = app.login("lee@acme.co.kr").await;

    let reply = app
        .post(
            "/counseling-sessions",
            &employee,
            json!({ "topic": "", "deliveryMethod": "telepathy", "appointmentDate": "2001-01-01" }),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["success"], false);
    let fields: Vec<&str> = reply.body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"topic"));
    assert!(fields.contains(&"deliveryMethod"));
    assert!(fields.contains(&"appointmentDate"));
}

#[tokio::test]
async fn test_company_side_sees_redacted_topic() {
    let app = TestApp::new();
    let (_, root) = app.super_admin().await;
    let company = app.company(&root, "acme.co.kr").await;
    app.seed_counselor("kim@counsel.kr").await;
    app.account(&root, "lee@acme.co.kr", "employee", Some(&company)).await;
    app.account(&root, "boss@acme.co.kr", "manager", Some(&company)).await;

    let employee = app.login("lee@acme.co.kr").await;
    let booked = app
        .post(
            "/counseling-sessions",
            &employee,
            json!({
                "topic": "conflict with my manager",
                "deliveryMethod": "phoneVideo",
                "appointmentDate": tomorrow(),
                "notes": "private"
            }),
        )
        .await;
    let id = booked.data()["id"].as_str().unwrap().to_string();

    let manager = app.login("boss@acme.co.kr").await;
    let seen = app.get(&format!("/counseling-sessions/{id}"), &manager).await;
    assert_eq!(seen.status, StatusCode::OK);
    assert_ne!(seen.data()["topic"], "conflict with my manager");
    assert!(seen.data().get("notes").is_none());
    assert!(seen.data().get("counselorRate").is_none());

    let listed = app.get("/counseling-sessions", &manager).await;
    assert_eq!(listed.data().as_array().unwrap().len(), 1);

    let hr = app.login("hr@acme.co.kr").await;
    let seen = app.get(&format!("/counseling-sessions/{id}"), &hr).await;
    assert_ne!(seen.data()["topic"], "conflict with my manager");
}

#[tokio::test]
async fn test_session_outside_scope_is_forbidden() {
    let app = TestApp::new();
    let (_, root) = app.super_admin().await;
    let company = app.company(&root, "acme.co.kr").await;
    app.seed_counselor("kim@counsel.kr").await;
    app.account(&root, "lee@acme.co.kr", "employee", Some(&company)).await;
    app.account(&root, "choi@acme.co.kr", "employee", Some(&company)).await;

    let lee = app.login("lee@acme.co.kr").await;
    let booked = app
        .post(
            "/counseling-sessions",
            &lee,
            json!({ "topic": "grief", "deliveryMethod": "chat", "appointmentDate": tomorrow() }),
        )
        .await;
    let id = booked.data()["id"].as_str().unwrap().to_string();

    let choi = app.login("choi@acme.co.kr").await;
    let reply = app.get(&format!("/counseling-sessions/{id}"), &choi).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert!(app.get("/counseling-sessions", &choi).await.data().as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_completion_counts_usage_and_opens_rating() {
    let app = TestApp::new();
    let (_, root) = app.super_admin().await;
    let company = app.company(&root, "acme.co.kr").await;
    app.seed_counselor("kim@counsel.kr").await;
    app.account(&root, "lee@acme.co.kr", "employee", Some(&company)).await;

    let lee = app.login("lee@acme.co.kr").await;
    let kim = app.login("kim@counsel.kr").await;
    let booked = app
        .post(
            "/counseling-sessions",
            &lee,
            json!({ "topic": "burnout", "deliveryMethod": "faceToFace", "appointmentDate": tomorrow() }),
        )
        .await;
    let id = booked.data()["id"].as_str().unwrap().to_string();

    // rating before completion is refused
    let early = app
        .put(&format!("/counseling-sessions/{id}/rating"), &lee, json!({ "score": 5 }))
        .await;
    assert_eq!(early.status, StatusCode::BAD_REQUEST);

    // an employee may only cancel
    let refused = app
        .put(&format!("/counseling-sessions/{id}/status"), &lee, json!({ "status": "completed" }))
        .await;
    assert_eq!(refused.status, StatusCode::FORBIDDEN);

    let done = app
        .put(&format!("/counseling-sessions/{id}/status"), &kim, json!({ "status": "completed" }))
        .await;
    assert_eq!(done.status, StatusCode::OK, "{}", done.body);
    assert_eq!(done.data()["status"], "completed");

    let me = app.get("/auth/me", &lee).await;
    assert_eq!(me.data()["annualCounselingUsage"]["used"], 1);

    let rated = app
        .put(
            &format!("/counseling-sessions/{id}/rating"),
            &lee,
            json!({ "score": 4, "comment": "helpful" }),
        )
        .await;
    assert_eq!(rated.status, StatusCode::OK, "{}", rated.body);
    assert_eq!(rated.data()["rating"]["score"], 4);

    let again = app
        .put(&format!("/counseling-sessions/{id}/rating"), &lee, json!({ "score": 1 }))
        .await;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);

    // terminal states do not move
    let reopen = app
        .put(&format!("/counseling-sessions/{id}/status"), &root, json!({ "status": "scheduled" }))
        .await;
    assert_eq!(reopen.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unauthenticated_and_wrong_role() {
    let app = TestApp::new();
    let (_, root) = app.super_admin().await;
    app.seed_counselor("kim@counsel.kr").await;

    let anonymous = app.send(Method::GET, "/counseling-sessions", None, None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.body["success"], false);

    let garbage = app.send(Method::GET, "/auth/me", Some("not-a-token"), None).await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);

    let kim = app.login("kim@counsel.kr").await;
    let booking = app
        .post(
            "/counseling-sessions",
            &kim,
            json!({ "topic": "x", "deliveryMethod": "chat", "appointmentDate": tomorrow() }),
        )
        .await;
    assert_eq!(booking.status, StatusCode::FORBIDDEN);

    let dashboard = app.get("/super-admin/stats", &kim).await;
    assert_eq!(dashboard.status, StatusCode::FORBIDDEN);

    let ok = app.get("/super-admin/stats", &root).await;
    assert_eq!(ok.status, StatusCode::OK);
}

#[tokio::test]
async fn test_center_delete_releases_counselors() {
    let app = TestApp::new();
    let (_, root) = app.super_admin().await;
    let kim = app.seed_counselor("kim@counsel.kr").await;
    let park = app.seed_counselor("park@counsel.kr").await;

    let center = app
        .post("/counseling-centers", &root, json!({ "name": "Mapo Center", "maxCounselors": 5 }))
        .await;
    assert_eq!(center.status, StatusCode::CREATED, "{}", center.body);
    let center_id = center.data()["id"].as_str().unwrap().to_string();

    for counselor in [&kim, &park] {
        let added = app
            .post(
                &format!("/counseling-centers/{center_id}/counselors"),
                &root,
                json!({ "counselorId": counselor }),
            )
            .await;
        assert_eq!(added.status, StatusCode::OK, "{}", added.body);
    }
    let listed = app.get(&format!("/counseling-centers/{center_id}"), &root).await;
    assert_eq!(listed.data()["counselors"].as_array().unwrap().len(), 2);

    let kim_token = app.login("kim@counsel.kr").await;
    let me = app.get("/auth/me", &kim_token).await;
    assert_eq!(me.data()["counselor"]["counselingCenter"], center_id.as_str());
    assert_eq!(me.data()["counselor"]["isIndependent"], false);

    let deleted = app
        .send(Method::DELETE, &format!("/counseling-centers/{center_id}"), Some(&root), None)
        .await;
    assert_eq!(deleted.status, StatusCode::OK, "{}", deleted.body);
    assert_eq!(deleted.data()["releasedCounselors"], 2);

    let me = app.get("/auth/me", &kim_token).await;
    assert!(me.data()["counselor"].get("counselingCenter").is_none());
    assert_eq!(me.data()["counselor"]["isIndependent"], true);

    let gone = app.get(&format!("/counseling-centers/{center_id}"), &root).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}
