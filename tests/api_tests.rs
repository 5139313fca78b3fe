// tests/api_tests.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reviewer_backend::{
    config::Config, email::Mailer, error::AppError, routes, state::AppState,
    utils::hash::hash_password,
};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

/// Capturing stand-in for the Brevo mailer: records every OTP instead of
/// sending it, so tests can complete the two-step login.
#[derive(Default, Clone)]
struct StubMailer {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl Mailer for StubMailer {
    async fn send_otp(&self, to_email: &str, _to_name: &str, code: &str) -> Result<(), AppError> {
        self.sent
            .lock()
            .unwrap()
            .push((to_email.to_string(), code.to_string()));
        Ok(())
    }
}

impl StubMailer {
    fn last_code_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, code)| code.clone())
    }
}

struct TestApp {
    address: String,
    users: SqlitePool,
    questions: SqlitePool,
    mailer: StubMailer,
}

/// Spawns the app on a random port against fresh in-memory databases.
async fn spawn_app() -> TestApp {
    let users = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory users store");

    let questions = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory questions store");

    sqlx::migrate!("./migrations/users")
        .run(&users)
        .await
        .expect("Failed to migrate users store");
    sqlx::migrate!("./migrations/questions")
        .run(&questions)
        .await
        .expect("Failed to migrate questions store");

    let config = Config {
        users_database_url: "sqlite::memory:".to_string(),
        questions_database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        brevo_api_key: "unused".to_string(),
        sender_email: "noreply@example.test".to_string(),
        sender_name: "Test Reviewer".to_string(),
        admin_username: None,
        admin_password: None,
        admin_email: None,
        rust_log: "error".to_string(),
    };

    let mailer = StubMailer::default();
    let state = AppState {
        users: users.clone(),
        questions: questions.clone(),
        config,
        mailer: Arc::new(mailer.clone()),
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address,
        users,
        questions,
        mailer,
    }
}

fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().to_string()[..8])
}

async fn register_user(app: &TestApp, client: &reqwest::Client, username: &str) -> String {
    let email = format!("{}@example.test", username);
    let response = client
        .post(format!("{}/api/auth/register", app.address))
        .json(&serde_json::json!({
            "username": username,
            "email": email,
            "password": "password123",
            "confirm_password": "password123",
            "cellphone": "09170000000",
            "major": "ict",
        }))
        .send()
        .await
        .expect("Register failed");
    assert_eq!(response.status().as_u16(), 201);
    email
}

/// Runs the full two-step login and returns a bearer token.
async fn login_user(app: &TestApp, client: &reqwest::Client, username: &str, email: &str) -> String {
    let login_resp = client
        .post(format!("{}/api/auth/login", app.address))
        .json(&serde_json::json!({
            "username": username,
            "password": "password123",
        }))
        .send()
        .await
        .expect("Login failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse login json");

    let pending_token = login_resp["pending_token"].as_str().expect("No pending token");
    let code = app.mailer.last_code_for(email).expect("No OTP captured");

    let verify_resp = client
        .post(format!("{}/api/auth/verify-otp", app.address))
        .json(&serde_json::json!({
            "pending_token": pending_token,
            "otp_code": code,
        }))
        .send()
        .await
        .expect("Verify failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse verify json");

    verify_resp["token"].as_str().expect("No token").to_string()
}

async fn seed_questions(pool: &SqlitePool, subject: &str, count: usize) {
    for i in 0..count {
        sqlx::query(
            r#"
            INSERT INTO questions
            (subject, question_text, choice_a, choice_b, choice_c, choice_d, correct_answer)
            VALUES (?, ?, 'w', 'x', 'y', 'z', 'a')
            "#,
        )
        .bind(subject)
        .bind(format!("{} question {}", subject, i))
        .execute(pool)
        .await
        .unwrap();
    }
}

async fn seed_admin(app: &TestApp, username: &str) -> String {
    let email = format!("{}@example.test", username);
    let hashed = hash_password("password123").unwrap();
    sqlx::query(
        r#"
        INSERT INTO users (username, email, password, cellphone, is_admin)
        VALUES (?, ?, ?, '', 1)
        "#,
    )
    .bind(username)
    .bind(&email)
    .bind(&hashed)
    .execute(&app.users)
    .await
    .unwrap();
    email
}

#[tokio::test]
async fn health_check_404() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/random_path_that_does_not_exist", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn register_works() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register_user(&app, &client, &unique_name("u")).await;
}

#[tokio::test]
async fn register_fails_validation() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // Username too short
    let response = client
        .post(format!("{}/api/auth/register", app.address))
        .json(&serde_json::json!({
            "username": "yo",
            "email": "yo@example.test",
            "password": "password123",
            "confirm_password": "password123",
            "cellphone": "09170000000",
            "major": "ict",
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn register_rejects_duplicate_username_and_email() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let username = unique_name("u");
    register_user(&app, &client, &username).await;

    // Same username, different email
    let response = client
        .post(format!("{}/api/auth/register", app.address))
        .json(&serde_json::json!({
            "username": username,
            "email": "other@example.test",
            "password": "password123",
            "confirm_password": "password123",
            "cellphone": "09170000000",
            "major": "ict",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);

    // Different username, same email
    let response = client
        .post(format!("{}/api/auth/register", app.address))
        .json(&serde_json::json!({
            "username": unique_name("u"),
            "email": format!("{}@example.test", username),
            "password": "password123",
            "confirm_password": "password123",
            "cellphone": "09170000000",
            "major": "ict",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn otp_login_flow_clears_code_on_success() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let username = unique_name("u");
    let email = register_user(&app, &client, &username).await;

    let login_resp = client
        .post(format!("{}/api/auth/login", app.address))
        .json(&serde_json::json!({
            "username": username,
            "password": "password123",
        }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();

    let pending_token = login_resp["pending_token"].as_str().unwrap();
    let code = app.mailer.last_code_for(&email).unwrap();

    // A wrong code does not pass (and does not clear the stored one).
    let response = client
        .post(format!("{}/api/auth/verify-otp", app.address))
        .json(&serde_json::json!({
            "pending_token": pending_token,
            "otp_code": "000000",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    // The real code passes.
    let response = client
        .post(format!("{}/api/auth/verify-otp", app.address))
        .json(&serde_json::json!({
            "pending_token": pending_token,
            "otp_code": code,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    // The code was cleared on success and never matches again.
    let response = client
        .post(format!("{}/api/auth/verify-otp", app.address))
        .json(&serde_json::json!({
            "pending_token": pending_token,
            "otp_code": code,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn pending_token_grants_no_api_access() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let username = unique_name("u");
    register_user(&app, &client, &username).await;

    let login_resp = client
        .post(format!("{}/api/auth/login", app.address))
        .json(&serde_json::json!({
            "username": username,
            "password": "password123",
        }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let pending_token = login_resp["pending_token"].as_str().unwrap();

    let response = client
        .get(format!("{}/api/me/attempts", app.address))
        .header("Authorization", format!("Bearer {}", pending_token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn password_reset_flow() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let username = unique_name("u");
    let email = register_user(&app, &client, &username).await;

    let forgot_resp = client
        .post(format!("{}/api/auth/forgot-password", app.address))
        .json(&serde_json::json!({ "email": email }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let reset_token = forgot_resp["reset_token"].as_str().unwrap();
    let code = app.mailer.last_code_for(&email).unwrap();

    let reset_resp = client
        .post(format!("{}/api/auth/reset-otp", app.address))
        .json(&serde_json::json!({
            "reset_token": reset_token,
            "otp_code": code,
        }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let set_token = reset_resp["token"].as_str().unwrap();

    let response = client
        .post(format!("{}/api/auth/set-password", app.address))
        .json(&serde_json::json!({
            "token": set_token,
            "password": "newpassword456",
            "confirm_password": "newpassword456",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    // The old password no longer works; the new one does.
    let response = client
        .post(format!("{}/api/auth/login", app.address))
        .json(&serde_json::json!({
            "username": username,
            "password": "password123",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    let response = client
        .post(format!("{}/api/auth/login", app.address))
        .json(&serde_json::json!({
            "username": username,
            "password": "newpassword456",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn quiz_flow_scores_and_records_attempt() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    seed_questions(&app.questions, "gened", 10).await;

    let username = unique_name("u");
    let email = register_user(&app, &client, &username).await;
    let token = login_user(&app, &client, &username, &email).await;

    let paper = client
        .post(format!("{}/api/quiz/start", app.address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "subject": "gened", "items": 5 }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();

    let questions = paper["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 5);
    // Answers are withheld from the paper.
    assert!(questions[0].get("correct_answer").is_none());
    let exam_token = paper["exam_token"].as_str().unwrap();

    // Answer everything with 'A' (correct per seed), mixed case on purpose.
    let mut answers = HashMap::new();
    for q in questions {
        answers.insert(q["id"].as_i64().unwrap().to_string(), "A".to_string());
    }

    let result = client
        .post(format!("{}/api/quiz/submit", app.address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "exam_token": exam_token,
            "answers": answers,
        }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();

    assert_eq!(result["score"], 5);
    assert_eq!(result["total_questions"], 5);
    assert_eq!(result["attempt_saved"], true);

    // The attempt shows up in the student's history with score <= max_score.
    let attempts = client
        .get(format!("{}/api/me/attempts", app.address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();

    let attempts = attempts.as_array().unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0]["subject"], "gened");
    assert!(attempts[0]["score"].as_f64().unwrap() <= attempts[0]["max_score"].as_f64().unwrap());
}

#[tokio::test]
async fn quiz_submission_rejects_id_set_mismatch() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    seed_questions(&app.questions, "gened", 10).await;

    let username = unique_name("u");
    let email = register_user(&app, &client, &username).await;
    let token = login_user(&app, &client, &username, &email).await;

    let paper = client
        .post(format!("{}/api/quiz/start", app.address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "subject": "gened", "items": 3 }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();

    let ids: Vec<i64> = paper["questions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["id"].as_i64().unwrap())
        .collect();
    let exam_token = paper["exam_token"].as_str().unwrap();

    // Same size, one id swapped for an unknown one.
    let mut answers = HashMap::new();
    answers.insert(ids[0].to_string(), "a".to_string());
    answers.insert(ids[1].to_string(), "a".to_string());
    answers.insert("999999".to_string(), "a".to_string());

    let response = client
        .post(format!("{}/api/quiz/submit", app.address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "exam_token": exam_token,
            "answers": answers,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // A missing answer key is a mismatch too.
    let mut answers = HashMap::new();
    answers.insert(ids[0].to_string(), "a".to_string());
    answers.insert(ids[1].to_string(), "a".to_string());

    let response = client
        .post(format!("{}/api/quiz/submit", app.address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "exam_token": exam_token,
            "answers": answers,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn quiz_requires_bearer_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/quiz/start", app.address))
        .json(&serde_json::json!({ "subject": "gened", "items": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn mock_exam_pools_and_loose_submission() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    seed_questions(&app.questions, "gened", 4).await;
    seed_questions(&app.questions, "profed", 3).await;

    // Registered major is 'ict', which has no questions: its pool is empty.
    let username = unique_name("u");
    let email = register_user(&app, &client, &username).await;
    let token = login_user(&app, &client, &username, &email).await;

    let paper = client
        .post(format!("{}/api/mock/start", app.address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();

    assert_eq!(paper["total_items"], 7);
    assert_eq!(paper["total_time_seconds"], 3 * 60 * 60);
    let exam_token = paper["exam_token"].as_str().unwrap();
    let ids: Vec<i64> = paper["questions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["id"].as_i64().unwrap())
        .collect();

    // Mock submission scores whatever ids arrive; answering a subset is fine.
    let mut answers = HashMap::new();
    answers.insert(ids[0].to_string(), "a".to_string());
    answers.insert(ids[1].to_string(), "b".to_string());

    let result = client
        .post(format!("{}/api/mock/submit", app.address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "exam_token": exam_token,
            "answers": answers,
        }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();

    assert_eq!(result["subject"], "Mock Exam");
    assert_eq!(result["total_questions"], 2);
    assert_eq!(result["score"], 1);
}

#[tokio::test]
async fn admin_upload_dedups_and_skips_short_rows() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let admin_name = unique_name("admin");
    let admin_email = seed_admin(&app, &admin_name).await;
    let token = login_user(&app, &client, &admin_name, &admin_email).await;

    let csv = "question,a,b,c,d,answer\n\
               First question?,1,2,3,4,a\n\
               short,row\n\
               First question?,1,2,3,4,a\n\
               Second question?,5,6,7,8,B\n";

    let upload = |csv: &'static str, token: String, address: String| async move {
        let form = reqwest::multipart::Form::new()
            .text("subject_tag", "gened")
            .part(
                "file",
                reqwest::multipart::Part::bytes(csv.as_bytes().to_vec())
                    .file_name("questions.csv"),
            );
        reqwest::Client::new()
            .post(format!("{}/api/admin/questions/upload", address))
            .header("Authorization", format!("Bearer {}", token))
            .multipart(form)
            .send()
            .await
            .unwrap()
            .json::<serde_json::Value>()
            .await
            .unwrap()
    };

    let result = upload(csv, token.clone(), app.address.clone()).await;
    assert_eq!(result["added"], 2);
    assert_eq!(result["duplicates_skipped"], 1);
    assert_eq!(result["rows_skipped"], 1);

    // Re-uploading the same file inserts nothing new.
    let result = upload(csv, token.clone(), app.address.clone()).await;
    assert_eq!(result["added"], 0);
    assert_eq!(result["duplicates_skipped"], 3);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions")
        .fetch_one(&app.questions)
        .await
        .unwrap();
    assert_eq!(count, 2);

    // Batch delete cleans them up.
    let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM questions")
        .fetch_all(&app.questions)
        .await
        .unwrap();
    let result = client
        .post(format!("{}/api/admin/questions/delete", app.address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "ids": ids }))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(result["deleted"], 2);
}

#[tokio::test]
async fn admin_routes_forbidden_for_students() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let username = unique_name("u");
    let email = register_user(&app, &client, &username).await;
    let token = login_user(&app, &client, &username, &email).await;

    let response = client
        .get(format!("{}/api/admin/students", app.address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = client
        .get(format!("{}/api/admin/attempts", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}
