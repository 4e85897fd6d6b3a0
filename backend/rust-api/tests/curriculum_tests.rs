use axum::http::StatusCode;
use serde_json::{json, Value};

mod common;

use cogni_api::errors::CoreError;
use cogni_api::models::user::UserRole;
use cogni_api::services::ai_client::PromptKind;
use common::{
    create_test_app, create_test_app_failing, curriculum_reply, quiz_reply, InsertFailure,
    TestApp,
};

fn create_body(topic: &str) -> Value {
    json!({"topic": topic, "difficulty": "beginner", "depth": "brief"})
}

async fn create_curriculum(app: &TestApp, token: &str, topic: &str) -> String {
    app.ai.push(curriculum_reply());
    let (status, body) = app
        .request(
            "POST",
            "/api/v1/curriculum/create",
            Some(token),
            Some(create_body(topic)),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn create_charges_ten_credits_after_generation() {
    let app = create_test_app();
    let (user, token) = app.seed_user("ada@example.com", UserRole::User, 100).await;

    app.ai.push(curriculum_reply());
    let (status, body) = app
        .request(
            "POST",
            "/api/v1/curriculum/create",
            Some(&token),
            Some(create_body("Rust")),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Curriculum created successfully");
    assert_eq!(body["data"]["title"], "Rust Ownership");
    assert_eq!(body["data"]["topic"], "Rust");
    assert_eq!(body["data"]["difficulty"], "beginner");
    assert_eq!(body["data"]["modules"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["userId"], user.id);
    assert_eq!(app.ai.calls(), vec![PromptKind::Curriculum]);
    assert_eq!(app.credits_of(&user.id).await, 90);
}

#[tokio::test]
async fn insufficient_credits_skip_the_ai_call() {
    let app = create_test_app();
    let (user, token) = app.seed_user("poor@example.com", UserRole::User, 5).await;

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/curriculum/create",
            Some(&token),
            Some(create_body("Rust")),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Insufficient credits. Need 10 credits, have 5.");
    assert!(app.ai.calls().is_empty());
    assert_eq!(app.credits_of(&user.id).await, 5);
}

#[tokio::test]
async fn failed_generation_costs_nothing() {
    let app = create_test_app();
    let (user, token) = app.seed_user("ada@example.com", UserRole::User, 100).await;

    app.ai.push("I'm sorry, I can't help with that.");
    let (status, _) = app
        .request(
            "POST",
            "/api/v1/curriculum/create",
            Some(&token),
            Some(create_body("Rust")),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    app.ai.push_err(CoreError::UpstreamTimeout(60));
    let (status, _) = app
        .request(
            "POST",
            "/api/v1/curriculum/create",
            Some(&token),
            Some(create_body("Rust")),
        )
        .await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);

    app.ai.push_err(CoreError::MissingApiKey);
    let (status, _) = app
        .request(
            "POST",
            "/api/v1/curriculum/create",
            Some(&token),
            Some(create_body("Rust")),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    assert_eq!(app.credits_of(&user.id).await, 100);
}

#[tokio::test]
async fn failed_insert_after_debit_is_refunded() {
    let app = create_test_app_failing(InsertFailure::CurriculumBackend);
    let (user, token) = app.seed_user("ada@example.com", UserRole::User, 100).await;

    app.ai.push(curriculum_reply());
    let (status, _) = app
        .request(
            "POST",
            "/api/v1/curriculum/create",
            Some(&token),
            Some(create_body("Rust")),
        )
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.ai.calls(), vec![PromptKind::Curriculum]);
    assert_eq!(app.credits_of(&user.id).await, 100);
}

#[tokio::test]
async fn create_validates_topic_and_enums() {
    let app = create_test_app();
    let (_, token) = app.seed_user("ada@example.com", UserRole::User, 100).await;

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/curriculum/create",
            Some(&token),
            Some(create_body("")),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Validation failed");

    let (status, _) = app
        .request(
            "POST",
            "/api/v1/curriculum/create",
            Some(&token),
            Some(json!({"topic": "Rust", "difficulty": "expert", "depth": "brief"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.ai.calls().is_empty());
}

#[tokio::test]
async fn list_only_returns_own_curricula_and_filters() {
    let app = create_test_app();
    let (_, ada) = app.seed_user("ada@example.com", UserRole::User, 100).await;
    let (_, bob) = app.seed_user("bob@example.com", UserRole::User, 100).await;

    create_curriculum(&app, &ada, "Rust").await;
    create_curriculum(&app, &ada, "Go").await;
    create_curriculum(&app, &bob, "Haskell").await;

    let (status, body) = app
        .request("GET", "/api/v1/curriculum", Some(&ada), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (_, body) = app
        .request("GET", "/api/v1/curriculum?search=rUsT", Some(&ada), None)
        .await;
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["topic"], "Rust");

    let (_, body) = app
        .request(
            "GET",
            "/api/v1/curriculum?difficulty=advanced",
            Some(&ada),
            None,
        )
        .await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn get_enforces_ownership() {
    let app = create_test_app();
    let (_, ada) = app.seed_user("ada@example.com", UserRole::User, 100).await;
    let (_, bob) = app.seed_user("bob@example.com", UserRole::User, 100).await;
    let id = create_curriculum(&app, &ada, "Rust").await;

    let (status, body) = app
        .request("GET", &format!("/api/v1/curriculum/{id}"), Some(&ada), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id);
    assert!(body["data"]["quizzes"].as_array().unwrap().is_empty());

    let (status, body) = app
        .request("GET", &format!("/api/v1/curriculum/{id}"), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Access denied");

    let (status, body) = app
        .request(
            "GET",
            "/api/v1/curriculum/000000000000000000000000",
            Some(&ada),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Curriculum not found");
}

#[tokio::test]
async fn update_changes_title_and_progress() {
    let app = create_test_app();
    let (_, token) = app.seed_user("ada@example.com", UserRole::User, 100).await;
    let id = create_curriculum(&app, &token, "Rust").await;

    let (status, body) = app
        .request(
            "PUT",
            &format!("/api/v1/curriculum/{id}"),
            Some(&token),
            Some(json!({"title": "My Rust", "progress": {"score": 75.0, "totalQuizzes": 2}})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Curriculum updated successfully");
    assert_eq!(body["data"]["title"], "My Rust");
    assert_eq!(body["data"]["progress"]["totalQuizzes"], 2);
}

#[tokio::test]
async fn delete_cascades_to_quiz() {
    let app = create_test_app();
    let (_, token) = app.seed_user("ada@example.com", UserRole::User, 100).await;
    let id = create_curriculum(&app, &token, "Rust").await;

    app.ai.push(quiz_reply());
    let (status, _) = app
        .request(
            "POST",
            &format!("/api/v1/curriculum/{id}/quiz/generate"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .request("DELETE", &format!("/api/v1/curriculum/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Curriculum deleted successfully");
    assert!(body["data"].is_null());

    let (status, _) = app
        .request("GET", &format!("/api/v1/curriculum/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let quizzes = cogni_api::storage::Storage::count_quizzes(app.storage.as_ref(), None)
        .await
        .unwrap();
    assert_eq!(quizzes, 0);
}
