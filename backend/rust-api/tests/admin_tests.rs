use axum::http::StatusCode;
use serde_json::json;

mod common;

use cogni_api::models::user::UserRole;
use cogni_api::storage::Storage;
use common::{create_test_app, curriculum_reply, quiz_reply, TestApp};

async fn create_curriculum(app: &TestApp, token: &str, topic: &str) -> String {
    app.ai.push(curriculum_reply());
    let (status, body) = app
        .request(
            "POST",
            "/api/v1/curriculum/create",
            Some(token),
            Some(json!({"topic": topic, "difficulty": "advanced", "depth": "comprehensive"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn admin_routes_require_admin_role() {
    let app = create_test_app();
    let (_, user) = app.seed_user("ada@example.com", UserRole::User, 100).await;

    let (status, body) = app
        .request("GET", "/api/v1/admin/users", Some(&user), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Admin access required");

    let (status, _) = app.request("GET", "/api/v1/admin/stats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn list_users_paginates_with_counts() {
    let app = create_test_app();
    let (_, admin) = app.seed_user("root@example.com", UserRole::Admin, 0).await;
    let (ada, ada_token) = app.seed_user("ada@example.com", UserRole::User, 100).await;
    app.seed_user("bob@example.com", UserRole::User, 100).await;
    app.seed_user("cy@example.com", UserRole::User, 100).await;
    create_curriculum(&app, &ada_token, "Rust").await;

    let (status, body) = app
        .request(
            "GET",
            "/api/v1/admin/users?role=user&sortBy=email&order=asc&page=1&limit=2",
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"]["pagination"],
        json!({"total": 3, "page": 1, "limit": 2, "totalPages": 2})
    );
    let users = body["data"]["users"].as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["id"], ada.id);
    assert_eq!(users[0]["_count"], json!({"curricula": 1, "quizResults": 0}));
    assert!(users[0].get("passwordHash").is_none());

    let (_, body) = app
        .request("GET", "/api/v1/admin/users?search=BOB", Some(&admin), None)
        .await;
    assert_eq!(body["data"]["users"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn user_detail_role_and_credit_changes() {
    let app = create_test_app();
    let (_, admin) = app.seed_user("root@example.com", UserRole::Admin, 0).await;
    let (ada, _) = app.seed_user("ada@example.com", UserRole::User, 100).await;

    let (status, body) = app
        .request(
            "GET",
            &format!("/api/v1/admin/users/{}", ada.id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["_count"]["conversations"], 0);

    let (status, body) = app
        .request(
            "PUT",
            &format!("/api/v1/admin/users/{}/role", ada.id),
            Some(&admin),
            Some(json!({"role": "admin"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Role updated successfully");
    assert_eq!(body["data"]["role"], "admin");

    let (status, body) = app
        .request(
            "PUT",
            &format!("/api/v1/admin/users/{}/credits", ada.id),
            Some(&admin),
            Some(json!({"credits": 250})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Credits updated successfully");
    assert_eq!(body["data"]["credits"], 250);
    assert_eq!(app.credits_of(&ada.id).await, 250);

    let (status, _) = app
        .request(
            "PUT",
            &format!("/api/v1/admin/users/{}/credits", ada.id),
            Some(&admin),
            Some(json!({"credits": -5})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.credits_of(&ada.id).await, 250);

    let (status, _) = app
        .request(
            "PUT",
            "/api/v1/admin/users/000000000000000000000000/role",
            Some(&admin),
            Some(json!({"role": "user"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_user_cascades_but_not_self() {
    let app = create_test_app();
    let (root, admin) = app.seed_user("root@example.com", UserRole::Admin, 0).await;
    let (ada, ada_token) = app.seed_user("ada@example.com", UserRole::User, 100).await;
    create_curriculum(&app, &ada_token, "Rust").await;

    let (status, body) = app
        .request(
            "DELETE",
            &format!("/api/v1/admin/users/{}", root.id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cannot delete your own account");

    let (status, body) = app
        .request(
            "DELETE",
            &format!("/api/v1/admin/users/{}", ada.id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User deleted successfully");
    assert!(app.storage.find_user_by_id(&ada.id).await.unwrap().is_none());
    assert_eq!(app.storage.count_curricula(None).await.unwrap(), 0);
}

#[tokio::test]
async fn curriculum_listing_detail_and_delete() {
    let app = create_test_app();
    let (_, admin) = app.seed_user("root@example.com", UserRole::Admin, 0).await;
    let (ada, ada_token) = app.seed_user("ada@example.com", UserRole::User, 100).await;
    let (_, bob_token) = app.seed_user("bob@example.com", UserRole::User, 100).await;
    let rust = create_curriculum(&app, &ada_token, "Rust").await;
    create_curriculum(&app, &bob_token, "Go").await;

    app.ai.push(quiz_reply());
    app.request(
        "POST",
        &format!("/api/v1/curriculum/{rust}/quiz/generate"),
        Some(&ada_token),
        None,
    )
    .await;
    app.request(
        "POST",
        &format!("/api/v1/curriculum/{rust}/quiz/submit"),
        Some(&ada_token),
        Some(json!({"answers": [0, 1, 2, 3]})),
    )
    .await;

    let (status, body) = app
        .request(
            "GET",
            &format!("/api/v1/admin/curriculum?userId={}", ada.id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["data"]["curricula"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["user"]["email"], "ada@example.com");
    assert_eq!(rows[0]["_count"], json!({"quizzes": 1}));
    assert_eq!(body["data"]["pagination"]["total"], 1);

    let (status, body) = app
        .request(
            "GET",
            &format!("/api/v1/admin/curriculum/{rust}"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["id"], ada.id);
    let quizzes = body["data"]["quizzes"].as_array().unwrap();
    assert_eq!(quizzes.len(), 1);
    assert_eq!(quizzes[0]["results"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .request(
            "DELETE",
            &format!("/api/v1/admin/curriculum/{rust}"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Curriculum deleted successfully");

    let (status, _) = app
        .request(
            "DELETE",
            &format!("/api/v1/admin/curriculum/{rust}"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_summarise_the_platform() {
    let app = create_test_app();
    let (_, admin) = app.seed_user("root@example.com", UserRole::Admin, 0).await;
    let (_, ada_token) = app.seed_user("ada@example.com", UserRole::User, 100).await;
    app.seed_user("bob@example.com", UserRole::User, 40).await;
    create_curriculum(&app, &ada_token, "Rust").await;

    let (status, body) = app
        .request("GET", "/api/v1/admin/stats", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let stats = &body["data"];
    assert_eq!(stats["totalUsers"], 3);
    assert_eq!(stats["totalCurricula"], 1);
    assert_eq!(stats["totalQuizzes"], 0);
    // 0 + (100 - 10) + 40
    assert_eq!(stats["totalCreditsDistributed"], 130);
    assert_eq!(stats["recentUsers"].as_array().unwrap().len(), 3);
    assert_eq!(
        stats["recentCurricula"][0]["user"]["email"],
        "ada@example.com"
    );
}
