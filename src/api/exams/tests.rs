use axum::http::{Method, StatusCode};
use serde_json::json;
use time::Duration;
use tower::ServiceExt;

use crate::core::security::UserRole;
use crate::db::types::AttemptStatus;
use crate::test_support::{self, bearer_token, json_request, read_json, TestApp};

fn exam_payload() -> serde_json::Value {
    json!({
        "title": "Chemistry midterm",
        "description": "Unit test exam",
        "start_time": "2025-03-01T09:00:00Z",
        "end_time": "2025-03-01T14:00:00Z",
        "duration_minutes": 30,
        "questions": [
            {
                "kind": "single_choice",
                "prompt": "Capital of France?",
                "options": ["Berlin", "Paris"],
                "correct_answer": "Paris",
                "points": 2.0
            },
            {
                "kind": "essay",
                "prompt": "Describe combustion.",
                "points": 5.0
            }
        ]
    })
}

async fn create_published_exam(app: &TestApp, teacher_token: &str) -> String {
    let response = app
        .app
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/exams", Some(teacher_token), Some(exam_payload())))
        .await
        .expect("create exam");
    assert_eq!(response.status(), StatusCode::CREATED);
    let exam_id = read_json(response).await["id"].as_str().expect("exam id").to_string();

    let response = app
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/exams/{exam_id}/publish"),
            Some(teacher_token),
            None,
        ))
        .await
        .expect("publish exam");
    assert_eq!(response.status(), StatusCode::OK);

    exam_id
}

#[tokio::test]
async fn teacher_creates_and_publishes_exam() {
    let app = test_support::test_app(3).await;
    let teacher = bearer_token("teacher-1", UserRole::Teacher, app.state.settings());

    let exam_id = create_published_exam(&app, &teacher).await;

    let response = app
        .app
        .clone()
        .oneshot(json_request(Method::GET, &format!("/api/v1/exams/{exam_id}"), Some(&teacher), None))
        .await
        .expect("get exam");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "published");
    assert_eq!(body["max_score"], 7.0);
    assert_eq!(body["questions"][0]["correct_answer"], "Paris");

    let response = app
        .app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/exams/{exam_id}/publish"),
            Some(&teacher),
            None,
        ))
        .await
        .expect("publish again");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(read_json(response).await["code"], "EXAM_NOT_PUBLISHABLE");
}

#[tokio::test]
async fn students_cannot_create_exams_or_see_answers() {
    let app = test_support::test_app(3).await;
    let teacher = bearer_token("teacher-1", UserRole::Teacher, app.state.settings());
    let student = bearer_token("student-1", UserRole::Student, app.state.settings());

    let response = app
        .app
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/exams", Some(&student), Some(exam_payload())))
        .await
        .expect("create exam");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let exam_id = create_published_exam(&app, &teacher).await;
    let response = app
        .app
        .clone()
        .oneshot(json_request(Method::GET, &format!("/api/v1/exams/{exam_id}"), Some(&student), None))
        .await
        .expect("get exam");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert!(body["questions"][0].get("correct_answer").is_none());
}

#[tokio::test]
async fn invalid_exam_lists_every_field() {
    let app = test_support::test_app(3).await;
    let teacher = bearer_token("teacher-1", UserRole::Teacher, app.state.settings());

    let mut payload = exam_payload();
    payload["title"] = json!("  ");
    payload["duration_minutes"] = json!(0);

    let response = app
        .app
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/exams", Some(&teacher), Some(payload)))
        .await
        .expect("create exam");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    let fields: Vec<&str> =
        body["errors"].as_array().expect("errors").iter().filter_map(|e| e["field"].as_str()).collect();
    assert!(fields.contains(&"title"));
    assert!(fields.contains(&"duration_minutes"));
}

#[tokio::test]
async fn student_starts_once_and_submits() {
    let app = test_support::test_app(3).await;
    let teacher = bearer_token("teacher-1", UserRole::Teacher, app.state.settings());
    let student = bearer_token("student-1", UserRole::Student, app.state.settings());
    let exam_id = create_published_exam(&app, &teacher).await;

    let response = app
        .app
        .clone()
        .oneshot(json_request(Method::POST, &format!("/api/v1/exams/{exam_id}/open"), Some(&student), None))
        .await
        .expect("open");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "not_started");

    let response = app
        .app
        .clone()
        .oneshot(json_request(Method::POST, &format!("/api/v1/exams/{exam_id}/start"), Some(&student), None))
        .await
        .expect("start");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    assert_eq!(body["attempt"]["status"], "in_progress");
    assert_eq!(body["attempt"]["remaining_seconds"], 30 * 60);
    assert!(body["questions"][0].get("correct_answer").is_none());
    let attempt_id = body["attempt"]["id"].as_str().expect("attempt id").to_string();

    app.ctx.clock.advance(Duration::minutes(5));
    let response = app
        .app
        .clone()
        .oneshot(json_request(Method::POST, &format!("/api/v1/exams/{exam_id}/start"), Some(&student), None))
        .await
        .expect("second start");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json(response).await;
    assert_eq!(body["code"], "ALREADY_STARTED");
    assert_eq!(body["attempt_id"], attempt_id.as_str());
    assert_eq!(body["started_at"], "2025-03-01T10:00:00Z");

    let response = app
        .app
        .clone()
        .oneshot(json_request(Method::POST, &format!("/api/v1/exams/{exam_id}/submit"), Some(&student), None))
        .await
        .expect("submit");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["transitioned"], true);
    assert_eq!(body["attempt"]["status"], "submitted");
    assert_eq!(body["attempt"]["submit_trigger"], "user");

    assert_eq!(app.ctx.store.attempt(&attempt_id).map(|a| a.status), Some(AttemptStatus::Submitted));
    assert_eq!(app.ctx.marking.enqueued(), vec![attempt_id]);
}

#[tokio::test]
async fn draft_exam_cannot_be_started() {
    let app = test_support::test_app(3).await;
    let teacher = bearer_token("teacher-1", UserRole::Teacher, app.state.settings());
    let student = bearer_token("student-1", UserRole::Student, app.state.settings());

    let response = app
        .app
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/exams", Some(&teacher), Some(exam_payload())))
        .await
        .expect("create exam");
    let exam_id = read_json(response).await["id"].as_str().expect("exam id").to_string();

    let response = app
        .app
        .clone()
        .oneshot(json_request(Method::POST, &format!("/api/v1/exams/{exam_id}/start"), Some(&student), None))
        .await
        .expect("start");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["code"], "EXAM_NOT_ACTIVE");
}

#[tokio::test]
async fn teachers_cannot_take_exams() {
    let app = test_support::test_app(3).await;
    let teacher = bearer_token("teacher-1", UserRole::Teacher, app.state.settings());
    let exam_id = create_published_exam(&app, &teacher).await;

    let response = app
        .app
        .clone()
        .oneshot(json_request(Method::POST, &format!("/api/v1/exams/{exam_id}/start"), Some(&teacher), None))
        .await
        .expect("start");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_exam_is_404() {
    let app = test_support::test_app(3).await;
    let student = bearer_token("student-1", UserRole::Student, app.state.settings());

    let response = app
        .app
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/exams/missing/start", Some(&student), None))
        .await
        .expect("start");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn staff_monitor_lists_running_attempts_with_events() {
    let app = test_support::test_app(10).await;
    let teacher = bearer_token("teacher-1", UserRole::Teacher, app.state.settings());
    let student = bearer_token("student-1", UserRole::Student, app.state.settings());
    test_support::published_exam_window(&app.ctx, "exam-1", 30).await;
    let running = app.ctx.submissions.start("exam-1", "student-1").await.expect("start");
    let finished = app.ctx.submissions.start("exam-1", "student-2").await.expect("start other");
    app.ctx
        .submissions
        .submit(&finished.attempt.id, crate::db::types::SubmitTrigger::User)
        .await
        .expect("submit");
    app.ctx
        .violations
        .record_violation(
            &running.attempt.id,
            crate::db::types::ViolationType::TabSwitch,
            json!({"count": 1}),
        )
        .await
        .expect("violation");

    let uri = "/api/v1/exams/exam-1/attempts?status=in_progress";
    let response = app
        .app
        .clone()
        .oneshot(json_request(Method::GET, uri, Some(&teacher), None))
        .await
        .expect("monitor");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let entries = body.as_array().expect("array");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["id"], running.attempt.id.as_str());
    assert_eq!(entries[0]["status"], "in_progress");
    assert_eq!(entries[0]["remaining_seconds"], 1800);
    assert_eq!(entries[0]["recent_violations"][0]["type"], "tab_switch");

    let response = app
        .app
        .clone()
        .oneshot(json_request(Method::GET, "/api/v1/exams/exam-1/attempts", Some(&teacher), None))
        .await
        .expect("monitor all");
    assert_eq!(read_json(response).await.as_array().map(Vec::len), Some(2));

    let response = app
        .app
        .clone()
        .oneshot(json_request(Method::GET, uri, Some(&student), None))
        .await
        .expect("student monitor");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .app
        .clone()
        .oneshot(json_request(Method::GET, "/api/v1/exams/missing/attempts", Some(&teacher), None))
        .await
        .expect("unknown exam");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
