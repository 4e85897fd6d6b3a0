use anyhow::{anyhow, Context};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Bson, Document, Regex};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};

use super::{CurriculumQuery, Storage, StorageError, StorageResult, UserQuery};
use crate::models::conversation::{ChatMessage, Conversation};
use crate::models::curriculum::{Curriculum, CurriculumSortField, CurriculumUpdate};
use crate::models::quiz::{Quiz, QuizResult, WeakTopic};
use crate::models::user::{User, UserRole, UserSortField};
use crate::models::SortOrder;
use crate::services::scoring::ProgressPolicy;

const USERS: &str = "users";
const CURRICULA: &str = "curricula";
const QUIZZES: &str = "quizzes";
const QUIZ_RESULTS: &str = "quiz_results";
const CONVERSATIONS: &str = "conversations";

pub struct MongoStorage {
    db: Database,
}

impl MongoStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    fn curricula(&self) -> Collection<Curriculum> {
        self.db.collection(CURRICULA)
    }

    fn quizzes(&self) -> Collection<Quiz> {
        self.db.collection(QUIZZES)
    }

    fn quiz_results(&self) -> Collection<QuizResult> {
        self.db.collection(QUIZ_RESULTS)
    }

    fn conversations(&self) -> Collection<Conversation> {
        self.db.collection(CONVERSATIONS)
    }

    /// Creates the unique and lookup indexes the storage contract relies on.
    /// The unique index on `quizzes.curriculum_id` is what makes a second
    /// quiz insert fail with `Duplicate`.
    pub async fn ensure_indexes(&self) -> anyhow::Result<()> {
        let unique = || IndexOptions::builder().unique(true).build();

        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique())
                    .build(),
            )
            .await
            .context("Failed to create users.email index")?;

        self.curricula()
            .create_index(IndexModel::builder().keys(doc! { "user_id": 1 }).build())
            .await
            .context("Failed to create curricula.user_id index")?;

        self.quizzes()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "curriculum_id": 1 })
                    .options(unique())
                    .build(),
            )
            .await
            .context("Failed to create quizzes.curriculum_id index")?;

        self.quiz_results()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "quiz_id": 1, "createdAt": -1 })
                    .build(),
            )
            .await
            .context("Failed to create quiz_results index")?;

        self.conversations()
            .create_index(IndexModel::builder().keys(doc! { "user_id": 1 }).build())
            .await
            .context("Failed to create conversations.user_id index")?;

        tracing::info!("MongoDB indexes ensured");
        Ok(())
    }

    /// Deletes the quizzes of the given curricula and all of their results.
    async fn delete_quizzes_for(&self, curriculum_ids: &[String]) -> StorageResult<()> {
        if curriculum_ids.is_empty() {
            return Ok(());
        }
        let filter = doc! { "curriculum_id": { "$in": curriculum_ids.to_vec() } };
        let quiz_ids: Vec<String> = self
            .quizzes()
            .find(filter.clone())
            .await
            .context("Failed to query quizzes")?
            .try_collect::<Vec<Quiz>>()
            .await
            .context("Failed to read quizzes")?
            .into_iter()
            .map(|q| q.id)
            .collect();

        self.quiz_results()
            .delete_many(doc! { "quiz_id": { "$in": quiz_ids } })
            .await
            .context("Failed to delete quiz results")?;
        self.quizzes()
            .delete_many(filter)
            .await
            .context("Failed to delete quizzes")?;
        Ok(())
    }
}

fn now() -> bson::DateTime {
    bson::DateTime::now()
}

fn sort_doc(field: &str, order: SortOrder) -> Document {
    let direction = match order {
        SortOrder::Asc => 1,
        SortOrder::Desc => -1,
    };
    let mut sort = Document::new();
    sort.insert(field, direction);
    sort
}

/// Case-insensitive substring match on any of `fields`.
fn search_filter(search: &str, fields: &[&str]) -> Bson {
    let regex = Regex {
        pattern: regex::escape(search),
        options: "i".to_string(),
    };
    Bson::Array(
        fields
            .iter()
            .map(|field| {
                let mut clause = Document::new();
                clause.insert(*field, regex.clone());
                Bson::Document(clause)
            })
            .collect(),
    )
}

fn to_bson<T: serde::Serialize>(value: &T) -> StorageResult<Bson> {
    bson::to_bson(value)
        .context("Failed to encode BSON")
        .map_err(StorageError::from)
}

#[async_trait]
impl Storage for MongoStorage {
    async fn ping(&self) -> StorageResult<()> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        Ok(())
    }

    async fn insert_user(&self, user: User) -> StorageResult<User> {
        self.users().insert_one(&user).await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: &str) -> StorageResult<Option<User>> {
        Ok(self
            .users()
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to query user")?)
    }

    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        Ok(self
            .users()
            .find_one(doc! { "email": email })
            .await
            .context("Failed to query user by email")?)
    }

    async fn update_user_profile(
        &self,
        id: &str,
        name: Option<String>,
        gemini_api_key: Option<Option<String>>,
    ) -> StorageResult<Option<User>> {
        let mut set = doc! { "updatedAt": now() };
        let mut update = Document::new();

        if let Some(name) = name {
            set.insert("name", name);
        }
        match gemini_api_key {
            Some(Some(key)) => {
                set.insert("gemini_api_key", key);
            }
            Some(None) => {
                update.insert("$unset", doc! { "gemini_api_key": "" });
            }
            None => {}
        }
        update.insert("$set", set);

        Ok(self
            .users()
            .find_one_and_update(doc! { "_id": id }, update)
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to update user profile")?)
    }

    async fn debit_credits(&self, user_id: &str, cost: u32) -> StorageResult<Option<u32>> {
        let cost = cost as i64;
        let updated = self
            .users()
            .find_one_and_update(
                doc! { "_id": user_id, "credits": { "$gte": cost } },
                doc! {
                    "$inc": { "credits": -cost },
                    "$set": { "updatedAt": now() },
                },
            )
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to debit credits")?;
        Ok(updated.map(|user| user.credits))
    }

    async fn refund_credits(&self, user_id: &str, amount: u32) -> StorageResult<Option<u32>> {
        let updated = self
            .users()
            .find_one_and_update(
                doc! { "_id": user_id },
                doc! {
                    "$inc": { "credits": amount as i64 },
                    "$set": { "updatedAt": now() },
                },
            )
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to refund credits")?;
        Ok(updated.map(|user| user.credits))
    }

    async fn set_user_role(&self, id: &str, role: UserRole) -> StorageResult<Option<User>> {
        Ok(self
            .users()
            .find_one_and_update(
                doc! { "_id": id },
                doc! { "$set": { "role": role.as_str(), "updatedAt": now() } },
            )
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to update user role")?)
    }

    async fn set_user_credits(&self, id: &str, credits: u32) -> StorageResult<Option<User>> {
        Ok(self
            .users()
            .find_one_and_update(
                doc! { "_id": id },
                doc! { "$set": { "credits": credits as i64, "updatedAt": now() } },
            )
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to update user credits")?)
    }

    async fn delete_user(&self, id: &str) -> StorageResult<bool> {
        let deleted = self
            .users()
            .delete_one(doc! { "_id": id })
            .await
            .context("Failed to delete user")?;
        if deleted.deleted_count == 0 {
            return Ok(false);
        }

        let owned: Vec<String> = self
            .curricula()
            .find(doc! { "user_id": id })
            .await
            .context("Failed to query user curricula")?
            .try_collect::<Vec<Curriculum>>()
            .await
            .context("Failed to read user curricula")?
            .into_iter()
            .map(|c| c.id)
            .collect();

        self.delete_quizzes_for(&owned).await?;
        self.curricula()
            .delete_many(doc! { "user_id": id })
            .await
            .context("Failed to delete user curricula")?;
        self.quiz_results()
            .delete_many(doc! { "user_id": id })
            .await
            .context("Failed to delete user quiz results")?;
        self.conversations()
            .delete_many(doc! { "user_id": id })
            .await
            .context("Failed to delete user conversations")?;
        Ok(true)
    }

    async fn list_users(&self, query: &UserQuery) -> StorageResult<(Vec<User>, u64)> {
        let mut filter = Document::new();
        if let Some(role) = query.role {
            filter.insert("role", role.as_str());
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            filter.insert("$or", search_filter(search, &["email", "name"]));
        }

        let total = self
            .users()
            .count_documents(filter.clone())
            .await
            .context("Failed to count users")?;

        let field = match query.sort_by {
            UserSortField::CreatedAt => "createdAt",
            UserSortField::Credits => "credits",
            UserSortField::Email => "email",
        };
        let users = self.users();
        let mut find = users
            .find(filter)
            .sort(sort_doc(field, query.order))
            .skip(query.skip);
        if let Some(limit) = query.limit {
            find = find.limit(limit as i64);
        }
        let page = find
            .await
            .context("Failed to query users")?
            .try_collect()
            .await
            .context("Failed to read users")?;

        Ok((page, total))
    }

    async fn count_users(&self) -> StorageResult<u64> {
        Ok(self
            .users()
            .count_documents(doc! {})
            .await
            .context("Failed to count users")?)
    }

    async fn total_credits(&self) -> StorageResult<u64> {
        let mut cursor = self
            .users()
            .aggregate(vec![
                doc! { "$group": { "_id": Bson::Null, "total": { "$sum": "$credits" } } },
            ])
            .await
            .context("Failed to aggregate credits")?;

        let Some(row) = cursor
            .try_next()
            .await
            .context("Failed to read credit aggregate")?
        else {
            return Ok(0);
        };

        let total = match row.get("total") {
            Some(Bson::Int32(v)) => *v as i64,
            Some(Bson::Int64(v)) => *v,
            Some(Bson::Double(v)) => *v as i64,
            other => {
                return Err(anyhow!("Unexpected credit total: {:?}", other).into());
            }
        };
        Ok(total.max(0) as u64)
    }

    async fn recent_users(&self, limit: u64) -> StorageResult<Vec<User>> {
        Ok(self
            .users()
            .find(doc! {})
            .sort(doc! { "createdAt": -1 })
            .limit(limit as i64)
            .await
            .context("Failed to query recent users")?
            .try_collect()
            .await
            .context("Failed to read recent users")?)
    }

    async fn insert_curriculum(&self, curriculum: Curriculum) -> StorageResult<Curriculum> {
        self.curricula().insert_one(&curriculum).await?;
        Ok(curriculum)
    }

    async fn find_curriculum(&self, id: &str) -> StorageResult<Option<Curriculum>> {
        Ok(self
            .curricula()
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to query curriculum")?)
    }

    async fn update_curriculum(
        &self,
        id: &str,
        update: CurriculumUpdate,
    ) -> StorageResult<Option<Curriculum>> {
        let mut set = doc! { "updatedAt": now() };
        if let Some(title) = update.title {
            set.insert("title", title);
        }
        if let Some(progress) = update.progress {
            set.insert("progress", to_bson(&progress)?);
        }

        Ok(self
            .curricula()
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to update curriculum")?)
    }

    async fn record_quiz_outcome(
        &self,
        id: &str,
        score: f64,
        focus_areas: Vec<WeakTopic>,
        policy: ProgressPolicy,
    ) -> StorageResult<Option<Curriculum>> {
        let total_quizzes = match policy {
            ProgressPolicy::Overwrite => Bson::Int32(1),
            ProgressPolicy::Accumulate => Bson::Document(doc! {
                "$add": [{ "$ifNull": ["$progress.totalQuizzes", 0] }, 1]
            }),
        };
        let focus_areas = to_bson(&focus_areas)?;
        // Update pipeline: the counter is derived from the stored value in
        // the same write.
        let pipeline = vec![doc! {
            "$set": {
                "progress": { "score": score, "totalQuizzes": total_quizzes },
                "focus_areas": { "$literal": focus_areas },
                "updatedAt": now(),
            }
        }];

        Ok(self
            .curricula()
            .find_one_and_update(doc! { "_id": id }, pipeline)
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to record quiz outcome")?)
    }

    async fn delete_curriculum(&self, id: &str) -> StorageResult<bool> {
        let deleted = self
            .curricula()
            .delete_one(doc! { "_id": id })
            .await
            .context("Failed to delete curriculum")?;
        if deleted.deleted_count == 0 {
            return Ok(false);
        }
        self.delete_quizzes_for(&[id.to_string()]).await?;
        Ok(true)
    }

    async fn list_curricula(
        &self,
        query: &CurriculumQuery,
    ) -> StorageResult<(Vec<Curriculum>, u64)> {
        let mut filter = Document::new();
        if let Some(user_id) = &query.user_id {
            filter.insert("user_id", user_id.as_str());
        }
        if let Some(difficulty) = query.difficulty {
            filter.insert("difficulty", difficulty.as_str());
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            filter.insert("$or", search_filter(search, &["title", "topic"]));
        }

        let total = self
            .curricula()
            .count_documents(filter.clone())
            .await
            .context("Failed to count curricula")?;

        let field = match query.sort_by {
            CurriculumSortField::CreatedAt => "createdAt",
            CurriculumSortField::UpdatedAt => "updatedAt",
            CurriculumSortField::Title => "title",
        };
        let curricula = self.curricula();
        let mut find = curricula
            .find(filter)
            .sort(sort_doc(field, query.order))
            .skip(query.skip);
        if let Some(limit) = query.limit {
            find = find.limit(limit as i64);
        }
        let page = find
            .await
            .context("Failed to query curricula")?
            .try_collect()
            .await
            .context("Failed to read curricula")?;

        Ok((page, total))
    }

    async fn count_curricula(&self, user_id: Option<&str>) -> StorageResult<u64> {
        let filter = match user_id {
            Some(id) => doc! { "user_id": id },
            None => doc! {},
        };
        Ok(self
            .curricula()
            .count_documents(filter)
            .await
            .context("Failed to count curricula")?)
    }

    async fn recent_curricula(&self, limit: u64) -> StorageResult<Vec<Curriculum>> {
        Ok(self
            .curricula()
            .find(doc! {})
            .sort(doc! { "createdAt": -1 })
            .limit(limit as i64)
            .await
            .context("Failed to query recent curricula")?
            .try_collect()
            .await
            .context("Failed to read recent curricula")?)
    }

    async fn insert_quiz(&self, quiz: Quiz) -> StorageResult<Quiz> {
        self.quizzes().insert_one(&quiz).await?;
        Ok(quiz)
    }

    async fn find_quiz_by_curriculum(&self, curriculum_id: &str) -> StorageResult<Option<Quiz>> {
        Ok(self
            .quizzes()
            .find_one(doc! { "curriculum_id": curriculum_id })
            .await
            .context("Failed to query quiz")?)
    }

    async fn count_quizzes(&self, curriculum_id: Option<&str>) -> StorageResult<u64> {
        let filter = match curriculum_id {
            Some(id) => doc! { "curriculum_id": id },
            None => doc! {},
        };
        Ok(self
            .quizzes()
            .count_documents(filter)
            .await
            .context("Failed to count quizzes")?)
    }

    async fn insert_quiz_result(&self, result: QuizResult) -> StorageResult<QuizResult> {
        self.quiz_results().insert_one(&result).await?;
        Ok(result)
    }

    async fn list_quiz_results(&self, quiz_id: &str) -> StorageResult<Vec<QuizResult>> {
        Ok(self
            .quiz_results()
            .find(doc! { "quiz_id": quiz_id })
            .sort(doc! { "createdAt": -1, "_id": -1 })
            .await
            .context("Failed to query quiz results")?
            .try_collect()
            .await
            .context("Failed to read quiz results")?)
    }

    async fn count_quiz_results(&self, user_id: &str) -> StorageResult<u64> {
        Ok(self
            .quiz_results()
            .count_documents(doc! { "user_id": user_id })
            .await
            .context("Failed to count quiz results")?)
    }

    async fn find_conversation(&self, id: &str) -> StorageResult<Option<Conversation>> {
        Ok(self
            .conversations()
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to query conversation")?)
    }

    async fn insert_conversation(
        &self,
        conversation: Conversation,
    ) -> StorageResult<Conversation> {
        self.conversations().insert_one(&conversation).await?;
        Ok(conversation)
    }

    async fn append_messages(&self, id: &str, messages: Vec<ChatMessage>) -> StorageResult<()> {
        let messages = to_bson(&messages)?;
        let updated = self
            .conversations()
            .update_one(
                doc! { "_id": id },
                doc! {
                    "$push": { "messages": { "$each": messages } },
                    "$set": { "updatedAt": now() },
                },
            )
            .await
            .context("Failed to append conversation messages")?;
        if updated.matched_count == 0 {
            return Err(StorageError::NotFound("Conversation"));
        }
        Ok(())
    }

    async fn count_conversations(&self, user_id: &str) -> StorageResult<u64> {
        Ok(self
            .conversations()
            .count_documents(doc! { "user_id": user_id })
            .await
            .context("Failed to count conversations")?)
    }
}
