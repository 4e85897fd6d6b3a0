use async_trait::async_trait;
use mongodb::error::{ErrorKind, WriteFailure};
use thiserror::Error;

use crate::models::conversation::{ChatMessage, Conversation};
use crate::models::curriculum::{Curriculum, CurriculumSortField, CurriculumUpdate, Difficulty};
use crate::models::quiz::{Quiz, QuizResult, WeakTopic};
use crate::models::user::{User, UserRole, UserSortField};
use crate::models::SortOrder;
use crate::services::scoring::ProgressPolicy;

pub mod memory;
pub mod mongo;

pub use memory::InMemoryStorage;
pub use mongo::MongoStorage;

const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Duplicate key: {0}")]
    Duplicate(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<mongodb::error::Error> for StorageError {
    fn from(err: mongodb::error::Error) -> Self {
        if let ErrorKind::Write(WriteFailure::WriteError(ref write_error)) = *err.kind {
            if write_error.code == DUPLICATE_KEY_CODE {
                return StorageError::Duplicate(write_error.message.clone());
            }
        }
        StorageError::Backend(err.into())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Filter, sort and window for user listings
#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub search: Option<String>,
    pub role: Option<UserRole>,
    pub sort_by: UserSortField,
    pub order: SortOrder,
    pub skip: u64,
    pub limit: Option<u64>,
}

/// Filter, sort and window for curriculum listings
#[derive(Debug, Clone, Default)]
pub struct CurriculumQuery {
    pub user_id: Option<String>,
    pub search: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub sort_by: CurriculumSortField,
    pub order: SortOrder,
    pub skip: u64,
    pub limit: Option<u64>,
}

/// Persistence boundary.
///
/// Operations the services rely on being atomic: `debit_credits` decrements
/// only when the balance covers the cost, `refund_credits` adds back in a
/// single increment, `record_quiz_outcome` folds a score into the stored
/// progress without a read-modify-write round trip, and `insert_quiz`
/// refuses a second quiz for the same curriculum with
/// `StorageError::Duplicate`.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn ping(&self) -> StorageResult<()>;

    // Users

    /// Fails with `Duplicate` when the email is taken.
    async fn insert_user(&self, user: User) -> StorageResult<User>;
    async fn find_user_by_id(&self, id: &str) -> StorageResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<User>>;
    /// `gemini_api_key`: `None` keeps, `Some(None)` clears, `Some(Some(k))` sets.
    async fn update_user_profile(
        &self,
        id: &str,
        name: Option<String>,
        gemini_api_key: Option<Option<String>>,
    ) -> StorageResult<Option<User>>;
    /// Atomically subtracts `cost` if the balance covers it and returns the
    /// new balance. `None` means nothing was debited.
    async fn debit_credits(&self, user_id: &str, cost: u32) -> StorageResult<Option<u32>>;
    /// Atomically adds `amount` back and returns the new balance, `None` when
    /// the user no longer exists.
    async fn refund_credits(&self, user_id: &str, amount: u32) -> StorageResult<Option<u32>>;
    async fn set_user_role(&self, id: &str, role: UserRole) -> StorageResult<Option<User>>;
    async fn set_user_credits(&self, id: &str, credits: u32) -> StorageResult<Option<User>>;
    /// Removes the user with their curricula, quizzes, results and conversations.
    async fn delete_user(&self, id: &str) -> StorageResult<bool>;
    /// Matching page plus the total number of matches.
    async fn list_users(&self, query: &UserQuery) -> StorageResult<(Vec<User>, u64)>;
    async fn count_users(&self) -> StorageResult<u64>;
    async fn total_credits(&self) -> StorageResult<u64>;
    async fn recent_users(&self, limit: u64) -> StorageResult<Vec<User>>;

    // Curricula

    async fn insert_curriculum(&self, curriculum: Curriculum) -> StorageResult<Curriculum>;
    async fn find_curriculum(&self, id: &str) -> StorageResult<Option<Curriculum>>;
    async fn update_curriculum(
        &self,
        id: &str,
        update: CurriculumUpdate,
    ) -> StorageResult<Option<Curriculum>>;
    /// Stores the latest score and focus areas. Under
    /// `ProgressPolicy::Accumulate` the attempt counter is incremented in
    /// place, so concurrent submissions are all counted.
    async fn record_quiz_outcome(
        &self,
        id: &str,
        score: f64,
        focus_areas: Vec<WeakTopic>,
        policy: ProgressPolicy,
    ) -> StorageResult<Option<Curriculum>>;
    /// Removes the curriculum together with its quiz and the quiz's results.
    async fn delete_curriculum(&self, id: &str) -> StorageResult<bool>;
    async fn list_curricula(
        &self,
        query: &CurriculumQuery,
    ) -> StorageResult<(Vec<Curriculum>, u64)>;
    async fn count_curricula(&self, user_id: Option<&str>) -> StorageResult<u64>;
    async fn recent_curricula(&self, limit: u64) -> StorageResult<Vec<Curriculum>>;

    // Quizzes

    /// Fails with `Duplicate` when the curriculum already has a quiz.
    async fn insert_quiz(&self, quiz: Quiz) -> StorageResult<Quiz>;
    async fn find_quiz_by_curriculum(&self, curriculum_id: &str) -> StorageResult<Option<Quiz>>;
    async fn count_quizzes(&self, curriculum_id: Option<&str>) -> StorageResult<u64>;
    async fn insert_quiz_result(&self, result: QuizResult) -> StorageResult<QuizResult>;
    /// Newest first.
    async fn list_quiz_results(&self, quiz_id: &str) -> StorageResult<Vec<QuizResult>>;
    async fn count_quiz_results(&self, user_id: &str) -> StorageResult<u64>;

    // Conversations

    async fn find_conversation(&self, id: &str) -> StorageResult<Option<Conversation>>;
    async fn insert_conversation(&self, conversation: Conversation)
        -> StorageResult<Conversation>;
    async fn append_messages(&self, id: &str, messages: Vec<ChatMessage>) -> StorageResult<()>;
    async fn count_conversations(&self, user_id: &str) -> StorageResult<u64>;
}

/// Fresh identifier in ObjectId hex form, shared by both backends so that
/// ids look the same regardless of where they are stored.
pub fn new_id() -> String {
    mongodb::bson::oid::ObjectId::new().to_hex()
}
