#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use cogni_api::{
    config::{Config, StorageBackend},
    create_router,
    errors::CoreError,
    middlewares::auth::{JwtClaims, JwtService},
    models::{
        conversation::{ChatMessage, Conversation},
        curriculum::{Curriculum, CurriculumUpdate},
        quiz::{Quiz, QuizResult, WeakTopic},
        user::{User, UserRole},
    },
    services::{
        ai_client::{AiGenerator, PromptKind},
        scoring::ProgressPolicy,
        AppState,
    },
    storage::{
        new_id, CurriculumQuery, InMemoryStorage, Storage, StorageError, StorageResult, UserQuery,
    },
};

/// AI backend that replays queued replies in order and records the kinds it
/// was asked for.
#[derive(Default)]
pub struct ScriptedAi {
    replies: Mutex<VecDeque<Result<String, CoreError>>>,
    calls: Mutex<Vec<PromptKind>>,
}

impl ScriptedAi {
    pub fn push(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
    }

    pub fn push_err(&self, err: CoreError) {
        self.replies.lock().unwrap().push_back(Err(err));
    }

    pub fn calls(&self) -> Vec<PromptKind> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AiGenerator for ScriptedAi {
    async fn generate(
        &self,
        kind: PromptKind,
        _prompt: &str,
        _api_key: Option<&str>,
    ) -> Result<String, CoreError> {
        self.calls.lock().unwrap().push(kind);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CoreError::Upstream("no scripted reply".to_string())))
    }
}

/// Which insert `FailingInserts` breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertFailure {
    /// `insert_quiz` reports a quiz that a concurrent request stored first.
    DuplicateQuiz,
    /// `insert_curriculum` fails with a backend error.
    CurriculumBackend,
}

/// In-memory storage whose paid-content insert fails after every check that
/// precedes it has passed.
pub struct FailingInserts {
    inner: Arc<InMemoryStorage>,
    failure: InsertFailure,
}

impl FailingInserts {
    pub fn new(inner: Arc<InMemoryStorage>, failure: InsertFailure) -> Self {
        Self { inner, failure }
    }
}

#[async_trait]
impl Storage for FailingInserts {
    async fn ping(&self) -> StorageResult<()> {
        self.inner.ping().await
    }

    async fn insert_user(&self, user: User) -> StorageResult<User> {
        self.inner.insert_user(user).await
    }

    async fn find_user_by_id(&self, id: &str) -> StorageResult<Option<User>> {
        self.inner.find_user_by_id(id).await
    }

    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        self.inner.find_user_by_email(email).await
    }

    async fn update_user_profile(
        &self,
        id: &str,
        name: Option<String>,
        gemini_api_key: Option<Option<String>>,
    ) -> StorageResult<Option<User>> {
        self.inner.update_user_profile(id, name, gemini_api_key).await
    }

    async fn debit_credits(&self, user_id: &str, cost: u32) -> StorageResult<Option<u32>> {
        self.inner.debit_credits(user_id, cost).await
    }

    async fn refund_credits(&self, user_id: &str, amount: u32) -> StorageResult<Option<u32>> {
        self.inner.refund_credits(user_id, amount).await
    }

    async fn set_user_role(&self, id: &str, role: UserRole) -> StorageResult<Option<User>> {
        self.inner.set_user_role(id, role).await
    }

    async fn set_user_credits(&self, id: &str, credits: u32) -> StorageResult<Option<User>> {
        self.inner.set_user_credits(id, credits).await
    }

    async fn delete_user(&self, id: &str) -> StorageResult<bool> {
        self.inner.delete_user(id).await
    }

    async fn list_users(&self, query: &UserQuery) -> StorageResult<(Vec<User>, u64)> {
        self.inner.list_users(query).await
    }

    async fn count_users(&self) -> StorageResult<u64> {
        self.inner.count_users().await
    }

    async fn total_credits(&self) -> StorageResult<u64> {
        self.inner.total_credits().await
    }

    async fn recent_users(&self, limit: u64) -> StorageResult<Vec<User>> {
        self.inner.recent_users(limit).await
    }

    async fn insert_curriculum(&self, curriculum: Curriculum) -> StorageResult<Curriculum> {
        if self.failure == InsertFailure::CurriculumBackend {
            return Err(StorageError::Backend(anyhow::anyhow!(
                "write concern timed out"
            )));
        }
        self.inner.insert_curriculum(curriculum).await
    }

    async fn find_curriculum(&self, id: &str) -> StorageResult<Option<Curriculum>> {
        self.inner.find_curriculum(id).await
    }

    async fn update_curriculum(
        &self,
        id: &str,
        update: CurriculumUpdate,
    ) -> StorageResult<Option<Curriculum>> {
        self.inner.update_curriculum(id, update).await
    }

    async fn record_quiz_outcome(
        &self,
        id: &str,
        score: f64,
        focus_areas: Vec<WeakTopic>,
        policy: ProgressPolicy,
    ) -> StorageResult<Option<Curriculum>> {
        self.inner
            .record_quiz_outcome(id, score, focus_areas, policy)
            .await
    }

    async fn delete_curriculum(&self, id: &str) -> StorageResult<bool> {
        self.inner.delete_curriculum(id).await
    }

    async fn list_curricula(
        &self,
        query: &CurriculumQuery,
    ) -> StorageResult<(Vec<Curriculum>, u64)> {
        self.inner.list_curricula(query).await
    }

    async fn count_curricula(&self, user_id: Option<&str>) -> StorageResult<u64> {
        self.inner.count_curricula(user_id).await
    }

    async fn recent_curricula(&self, limit: u64) -> StorageResult<Vec<Curriculum>> {
        self.inner.recent_curricula(limit).await
    }

    async fn insert_quiz(&self, quiz: Quiz) -> StorageResult<Quiz> {
        if self.failure == InsertFailure::DuplicateQuiz {
            return Err(StorageError::Duplicate(format!(
                "quiz for curriculum {}",
                quiz.curriculum_id
            )));
        }
        self.inner.insert_quiz(quiz).await
    }

    async fn find_quiz_by_curriculum(&self, curriculum_id: &str) -> StorageResult<Option<Quiz>> {
        self.inner.find_quiz_by_curriculum(curriculum_id).await
    }

    async fn count_quizzes(&self, curriculum_id: Option<&str>) -> StorageResult<u64> {
        self.inner.count_quizzes(curriculum_id).await
    }

    async fn insert_quiz_result(&self, result: QuizResult) -> StorageResult<QuizResult> {
        self.inner.insert_quiz_result(result).await
    }

    async fn list_quiz_results(&self, quiz_id: &str) -> StorageResult<Vec<QuizResult>> {
        self.inner.list_quiz_results(quiz_id).await
    }

    async fn count_quiz_results(&self, user_id: &str) -> StorageResult<u64> {
        self.inner.count_quiz_results(user_id).await
    }

    async fn find_conversation(&self, id: &str) -> StorageResult<Option<Conversation>> {
        self.inner.find_conversation(id).await
    }

    async fn insert_conversation(
        &self,
        conversation: Conversation,
    ) -> StorageResult<Conversation> {
        self.inner.insert_conversation(conversation).await
    }

    async fn append_messages(&self, id: &str, messages: Vec<ChatMessage>) -> StorageResult<()> {
        self.inner.append_messages(id, messages).await
    }

    async fn count_conversations(&self, user_id: &str) -> StorageResult<u64> {
        self.inner.count_conversations(user_id).await
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub storage: Arc<InMemoryStorage>,
    pub ai: Arc<ScriptedAi>,
}

pub fn test_config() -> Config {
    Config {
        storage_backend: StorageBackend::Memory,
        bcrypt_cost: 4,
        jwt_secret: "integration-test-secret".to_string(),
        ..Config::default()
    }
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(test_config())
}

pub fn create_test_app_with(config: Config) -> TestApp {
    create_test_app_over(config, |storage| storage as Arc<dyn Storage>)
}

/// App whose storage breaks one paid-content insert.
pub fn create_test_app_failing(failure: InsertFailure) -> TestApp {
    create_test_app_over(test_config(), |storage| {
        Arc::new(FailingInserts::new(storage, failure)) as Arc<dyn Storage>
    })
}

/// Builds the app on a storage derived from the shared in-memory store;
/// `TestApp::storage` still reads the underlying data.
pub fn create_test_app_over(
    config: Config,
    wrap: impl FnOnce(Arc<InMemoryStorage>) -> Arc<dyn Storage>,
) -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let storage = Arc::new(InMemoryStorage::new());
    let ai = Arc::new(ScriptedAi::default());
    let state = Arc::new(AppState::with_components(
        config,
        wrap(storage.clone()),
        ai.clone(),
        None,
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        storage,
        ai,
    }
}

impl TestApp {
    /// Inserts a user directly and returns it together with a bearer token.
    pub async fn seed_user(&self, email: &str, role: UserRole, credits: u32) -> (User, String) {
        let now = Utc::now();
        let user = User {
            id: new_id(),
            email: email.to_string(),
            password_hash: bcrypt::hash("password123", 4).unwrap(),
            name: email.split('@').next().unwrap_or("user").to_string(),
            role,
            credits,
            learning_style: None,
            gemini_api_key: None,
            created_at: now,
            updated_at: now,
        };
        let user = self.storage.insert_user(user).await.unwrap();
        let token = self.token_for(&user);
        (user, token)
    }

    pub fn token_for(&self, user: &User) -> String {
        let claims = JwtClaims::for_user(user, 3600);
        JwtService::new(&self.state.config.jwt_secret)
            .generate_token(&claims)
            .unwrap()
    }

    pub async fn credits_of(&self, user_id: &str) -> u32 {
        self.storage
            .find_user_by_id(user_id)
            .await
            .unwrap()
            .unwrap()
            .credits
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

pub fn curriculum_reply() -> String {
    r#"Here is your curriculum:
```json
{
  "title": "Rust Ownership",
  "description": "Borrowing without tears",
  "modules": [
    {"title": "Moves", "lessons": [{"title": "What moves", "content": "..."}]},
    {"title": "Borrows", "lessons": [{"title": "Shared refs", "content": "..."}]}
  ]
}
```"#
        .to_string()
}

/// Four questions: two on "moves", two on "borrows"; correct answers 0,1,2,3.
pub fn quiz_reply() -> String {
    r#"{"questions": [
  {"question": "q1", "options": ["a","b","c","d"], "correctAnswer": 0, "topic": "moves"},
  {"question": "q2", "options": ["a","b","c","d"], "correctAnswer": 1, "topic": "borrows"},
  {"question": "q3", "options": ["a","b","c","d"], "correctAnswer": 2, "topic": "moves"},
  {"question": "q4", "options": ["a","b","c","d"], "correctAnswer": 3, "topic": "borrows"}
]}"#
    .to_string()
}
