use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{CurriculumQuery, Storage, StorageError, StorageResult, UserQuery};
use crate::models::conversation::{ChatMessage, Conversation};
use crate::models::curriculum::{Curriculum, CurriculumSortField, CurriculumUpdate};
use crate::models::quiz::{Quiz, QuizResult, WeakTopic};
use crate::models::user::{User, UserRole, UserSortField};
use crate::models::SortOrder;
use crate::services::scoring::{next_progress, ProgressPolicy};

#[derive(Default)]
struct Collections {
    users: Vec<User>,
    curricula: Vec<Curriculum>,
    quizzes: Vec<Quiz>,
    quiz_results: Vec<QuizResult>,
    conversations: Vec<Conversation>,
}

/// Process-local storage used by the test suite and `STORAGE_BACKEND=memory`.
///
/// Everything sits behind one lock, so every trait method is atomic with
/// respect to the others.
#[derive(Default)]
pub struct InMemoryStorage {
    inner: RwLock<Collections>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_search(needle: &Option<String>, haystacks: &[&str]) -> bool {
    match needle {
        Some(needle) if !needle.is_empty() => {
            let needle = needle.to_lowercase();
            haystacks
                .iter()
                .any(|h| h.to_lowercase().contains(&needle))
        }
        _ => true,
    }
}

fn apply_order(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

fn window<T>(items: Vec<T>, skip: u64, limit: Option<u64>) -> Vec<T> {
    let iter = items.into_iter().skip(skip as usize);
    match limit {
        Some(limit) => iter.take(limit as usize).collect(),
        None => iter.collect(),
    }
}

/// Removes quizzes of the given curricula and every result attached to them.
fn drop_quizzes_for(inner: &mut Collections, curriculum_ids: &[String]) {
    let quiz_ids: Vec<String> = inner
        .quizzes
        .iter()
        .filter(|q| curriculum_ids.contains(&q.curriculum_id))
        .map(|q| q.id.clone())
        .collect();
    inner
        .quizzes
        .retain(|q| !curriculum_ids.contains(&q.curriculum_id));
    inner.quiz_results.retain(|r| !quiz_ids.contains(&r.quiz_id));
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn insert_user(&self, user: User) -> StorageResult<User> {
        let mut inner = self.inner.write().await;
        if inner.users.iter().any(|u| u.email == user.email) {
            return Err(StorageError::Duplicate(format!("email {}", user.email)));
        }
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn find_user_by_id(&self, id: &str) -> StorageResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.iter().find(|u| u.email == email).cloned())
    }

    async fn update_user_profile(
        &self,
        id: &str,
        name: Option<String>,
        gemini_api_key: Option<Option<String>>,
    ) -> StorageResult<Option<User>> {
        let mut inner = self.inner.write().await;
        let Some(user) = inner.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(name) = name {
            user.name = name;
        }
        if let Some(key) = gemini_api_key {
            user.gemini_api_key = key;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn debit_credits(&self, user_id: &str, cost: u32) -> StorageResult<Option<u32>> {
        let mut inner = self.inner.write().await;
        let Some(user) = inner.users.iter_mut().find(|u| u.id == user_id) else {
            return Ok(None);
        };
        if user.credits < cost {
            return Ok(None);
        }
        user.credits -= cost;
        user.updated_at = Utc::now();
        Ok(Some(user.credits))
    }

    async fn refund_credits(&self, user_id: &str, amount: u32) -> StorageResult<Option<u32>> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .map(|user| {
                user.credits = user.credits.saturating_add(amount);
                user.updated_at = Utc::now();
                user.credits
            }))
    }

    async fn set_user_role(&self, id: &str, role: UserRole) -> StorageResult<Option<User>> {
        let mut inner = self.inner.write().await;
        Ok(inner.users.iter_mut().find(|u| u.id == id).map(|user| {
            user.role = role;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn set_user_credits(&self, id: &str, credits: u32) -> StorageResult<Option<User>> {
        let mut inner = self.inner.write().await;
        Ok(inner.users.iter_mut().find(|u| u.id == id).map(|user| {
            user.credits = credits;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn delete_user(&self, id: &str) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;
        let before = inner.users.len();
        inner.users.retain(|u| u.id != id);
        if inner.users.len() == before {
            return Ok(false);
        }

        let owned: Vec<String> = inner
            .curricula
            .iter()
            .filter(|c| c.user_id == id)
            .map(|c| c.id.clone())
            .collect();
        drop_quizzes_for(&mut inner, &owned);
        inner.curricula.retain(|c| c.user_id != id);
        inner.quiz_results.retain(|r| r.user_id != id);
        inner.conversations.retain(|c| c.user_id != id);
        Ok(true)
    }

    async fn list_users(&self, query: &UserQuery) -> StorageResult<(Vec<User>, u64)> {
        let inner = self.inner.read().await;
        let mut users: Vec<User> = inner
            .users
            .iter()
            .filter(|u| query.role.is_none_or(|role| u.role == role))
            .filter(|u| matches_search(&query.search, &[&u.email, &u.name]))
            .cloned()
            .collect();

        users.sort_by(|a, b| {
            let ordering = match query.sort_by {
                UserSortField::CreatedAt => a.created_at.cmp(&b.created_at),
                UserSortField::Credits => a.credits.cmp(&b.credits),
                UserSortField::Email => a.email.cmp(&b.email),
            };
            apply_order(ordering, query.order)
        });

        let total = users.len() as u64;
        Ok((window(users, query.skip, query.limit), total))
    }

    async fn count_users(&self) -> StorageResult<u64> {
        Ok(self.inner.read().await.users.len() as u64)
    }

    async fn total_credits(&self) -> StorageResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner.users.iter().map(|u| u.credits as u64).sum())
    }

    async fn recent_users(&self, limit: u64) -> StorageResult<Vec<User>> {
        let inner = self.inner.read().await;
        let mut users: Vec<User> = inner.users.iter().rev().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        users.truncate(limit as usize);
        Ok(users)
    }

    async fn insert_curriculum(&self, curriculum: Curriculum) -> StorageResult<Curriculum> {
        let mut inner = self.inner.write().await;
        inner.curricula.push(curriculum.clone());
        Ok(curriculum)
    }

    async fn find_curriculum(&self, id: &str) -> StorageResult<Option<Curriculum>> {
        let inner = self.inner.read().await;
        Ok(inner.curricula.iter().find(|c| c.id == id).cloned())
    }

    async fn update_curriculum(
        &self,
        id: &str,
        update: CurriculumUpdate,
    ) -> StorageResult<Option<Curriculum>> {
        let mut inner = self.inner.write().await;
        let Some(curriculum) = inner.curricula.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        if let Some(title) = update.title {
            curriculum.title = title;
        }
        if let Some(progress) = update.progress {
            curriculum.progress = Some(progress);
        }
        curriculum.updated_at = Utc::now();
        Ok(Some(curriculum.clone()))
    }

    async fn record_quiz_outcome(
        &self,
        id: &str,
        score: f64,
        focus_areas: Vec<WeakTopic>,
        policy: ProgressPolicy,
    ) -> StorageResult<Option<Curriculum>> {
        let mut inner = self.inner.write().await;
        let Some(curriculum) = inner.curricula.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        curriculum.progress = Some(next_progress(curriculum.progress.as_ref(), score, policy));
        curriculum.focus_areas = focus_areas;
        curriculum.updated_at = Utc::now();
        Ok(Some(curriculum.clone()))
    }

    async fn delete_curriculum(&self, id: &str) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;
        let before = inner.curricula.len();
        inner.curricula.retain(|c| c.id != id);
        if inner.curricula.len() == before {
            return Ok(false);
        }
        drop_quizzes_for(&mut inner, &[id.to_string()]);
        Ok(true)
    }

    async fn list_curricula(
        &self,
        query: &CurriculumQuery,
    ) -> StorageResult<(Vec<Curriculum>, u64)> {
        let inner = self.inner.read().await;
        let mut curricula: Vec<Curriculum> = inner
            .curricula
            .iter()
            .filter(|c| query.user_id.as_deref().is_none_or(|id| c.user_id == id))
            .filter(|c| query.difficulty.is_none_or(|d| c.difficulty == d))
            .filter(|c| matches_search(&query.search, &[&c.title, &c.topic]))
            .cloned()
            .collect();

        curricula.sort_by(|a, b| {
            let ordering = match query.sort_by {
                CurriculumSortField::CreatedAt => a.created_at.cmp(&b.created_at),
                CurriculumSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                CurriculumSortField::Title => a.title.cmp(&b.title),
            };
            apply_order(ordering, query.order)
        });

        let total = curricula.len() as u64;
        Ok((window(curricula, query.skip, query.limit), total))
    }

    async fn count_curricula(&self, user_id: Option<&str>) -> StorageResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .curricula
            .iter()
            .filter(|c| user_id.is_none_or(|id| c.user_id == id))
            .count() as u64)
    }

    async fn recent_curricula(&self, limit: u64) -> StorageResult<Vec<Curriculum>> {
        let inner = self.inner.read().await;
        let mut curricula: Vec<Curriculum> = inner.curricula.iter().rev().cloned().collect();
        curricula.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        curricula.truncate(limit as usize);
        Ok(curricula)
    }

    async fn insert_quiz(&self, quiz: Quiz) -> StorageResult<Quiz> {
        let mut inner = self.inner.write().await;
        if inner
            .quizzes
            .iter()
            .any(|q| q.curriculum_id == quiz.curriculum_id)
        {
            return Err(StorageError::Duplicate(format!(
                "quiz for curriculum {}",
                quiz.curriculum_id
            )));
        }
        inner.quizzes.push(quiz.clone());
        Ok(quiz)
    }

    async fn find_quiz_by_curriculum(&self, curriculum_id: &str) -> StorageResult<Option<Quiz>> {
        let inner = self.inner.read().await;
        Ok(inner
            .quizzes
            .iter()
            .find(|q| q.curriculum_id == curriculum_id)
            .cloned())
    }

    async fn count_quizzes(&self, curriculum_id: Option<&str>) -> StorageResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .quizzes
            .iter()
            .filter(|q| curriculum_id.is_none_or(|id| q.curriculum_id == id))
            .count() as u64)
    }

    async fn insert_quiz_result(&self, result: QuizResult) -> StorageResult<QuizResult> {
        let mut inner = self.inner.write().await;
        inner.quiz_results.push(result.clone());
        Ok(result)
    }

    async fn list_quiz_results(&self, quiz_id: &str) -> StorageResult<Vec<QuizResult>> {
        let inner = self.inner.read().await;
        // Reverse insertion order first so equal timestamps still come out newest first.
        let mut results: Vec<QuizResult> = inner
            .quiz_results
            .iter()
            .rev()
            .filter(|r| r.quiz_id == quiz_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(results)
    }

    async fn count_quiz_results(&self, user_id: &str) -> StorageResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .quiz_results
            .iter()
            .filter(|r| r.user_id == user_id)
            .count() as u64)
    }

    async fn find_conversation(&self, id: &str) -> StorageResult<Option<Conversation>> {
        let inner = self.inner.read().await;
        Ok(inner.conversations.iter().find(|c| c.id == id).cloned())
    }

    async fn insert_conversation(
        &self,
        conversation: Conversation,
    ) -> StorageResult<Conversation> {
        let mut inner = self.inner.write().await;
        inner.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn append_messages(&self, id: &str, messages: Vec<ChatMessage>) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        let conversation = inner
            .conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(StorageError::NotFound("Conversation"))?;
        conversation.messages.extend(messages);
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn count_conversations(&self, user_id: &str) -> StorageResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .conversations
            .iter()
            .filter(|c| c.user_id == user_id)
            .count() as u64)
    }
}
