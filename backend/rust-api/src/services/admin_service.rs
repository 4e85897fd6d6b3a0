use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::errors::ApiError;
use crate::models::curriculum::{
    AdminCurriculumSummary, AdminListCurriculaQuery, Curriculum, QuizCount, RecentCurriculum,
};
use crate::models::quiz::{AdminCurriculumDetail, QuizView};
use crate::models::user::{
    AdminUserDetail, AdminUserSummary, ListUsersQuery, RecentUser, User, UserCounts,
    UserCreditsView, UserRole, UserRoleView, UserSummary,
};
use crate::models::{page_and_limit, Pagination};
use crate::storage::{CurriculumQuery, Storage, UserQuery};

const RECENT_LIMIT: u64 = 5;

#[derive(Debug, Serialize)]
pub struct UserList {
    pub users: Vec<AdminUserSummary>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct CurriculumList {
    pub curricula: Vec<AdminCurriculumSummary>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_users: u64,
    pub total_curricula: u64,
    pub total_quizzes: u64,
    /// Sum of all current balances
    pub total_credits_distributed: u64,
    pub recent_users: Vec<RecentUser>,
    pub recent_curricula: Vec<RecentCurriculum>,
}

pub struct AdminService {
    storage: Arc<dyn Storage>,
}

impl AdminService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    async fn user(&self, id: &str) -> Result<User, ApiError> {
        self.storage
            .find_user_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))
    }

    /// Owner summaries for a batch of curricula, one lookup per distinct owner.
    async fn owners(
        &self,
        curricula: &[Curriculum],
    ) -> Result<HashMap<String, UserSummary>, ApiError> {
        let mut owners = HashMap::new();
        for curriculum in curricula {
            if owners.contains_key(&curriculum.user_id) {
                continue;
            }
            if let Some(user) = self.storage.find_user_by_id(&curriculum.user_id).await? {
                owners.insert(curriculum.user_id.clone(), UserSummary::from(&user));
            }
        }
        Ok(owners)
    }

    pub async fn list_users(&self, query: ListUsersQuery) -> Result<UserList, ApiError> {
        let (page, limit) = page_and_limit(query.page.as_deref(), query.limit.as_deref());
        let user_query = UserQuery {
            search: query.search.filter(|s| !s.trim().is_empty()),
            role: query.role,
            sort_by: query.sort_by.unwrap_or_default(),
            order: query.order.unwrap_or_default(),
            skip: (page - 1) * limit,
            limit: Some(limit),
        };

        let (users, total) = self.storage.list_users(&user_query).await?;

        let mut rows = Vec::with_capacity(users.len());
        for user in users {
            let count = UserCounts {
                curricula: self.storage.count_curricula(Some(&user.id)).await?,
                quiz_results: self.storage.count_quiz_results(&user.id).await?,
                conversations: None,
            };
            rows.push(AdminUserSummary {
                id: user.id,
                email: user.email,
                name: user.name,
                credits: user.credits,
                role: user.role,
                created_at: user.created_at,
                count,
            });
        }

        Ok(UserList {
            users: rows,
            pagination: Pagination::new(total, page, limit),
        })
    }

    pub async fn get_user(&self, id: &str) -> Result<AdminUserDetail, ApiError> {
        let user = self.user(id).await?;
        let count = UserCounts {
            curricula: self.storage.count_curricula(Some(&user.id)).await?,
            quiz_results: self.storage.count_quiz_results(&user.id).await?,
            conversations: Some(self.storage.count_conversations(&user.id).await?),
        };

        Ok(AdminUserDetail {
            id: user.id,
            email: user.email,
            name: user.name,
            credits: user.credits,
            role: user.role,
            gemini_api_key: user.gemini_api_key,
            created_at: user.created_at,
            updated_at: user.updated_at,
            count,
        })
    }

    pub async fn set_role(&self, id: &str, role: UserRole) -> Result<UserRoleView, ApiError> {
        let user = self
            .storage
            .set_user_role(id, role)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        tracing::info!(user_id = %id, role = role.as_str(), "User role updated");
        Ok(UserRoleView {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
        })
    }

    pub async fn set_credits(&self, id: &str, credits: u32) -> Result<UserCreditsView, ApiError> {
        let user = self
            .storage
            .set_user_credits(id, credits)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        tracing::info!(user_id = %id, credits, "User credits set by admin");
        Ok(UserCreditsView {
            id: user.id,
            email: user.email,
            name: user.name,
            credits: user.credits,
        })
    }

    pub async fn delete_user(&self, actor_id: &str, id: &str) -> Result<(), ApiError> {
        if actor_id == id {
            return Err(ApiError::bad_request("Cannot delete your own account"));
        }

        if !self.storage.delete_user(id).await? {
            return Err(ApiError::not_found("User not found"));
        }

        tracing::info!(user_id = %id, actor_id = %actor_id, "User deleted");
        Ok(())
    }

    pub async fn list_curricula(
        &self,
        query: AdminListCurriculaQuery,
    ) -> Result<CurriculumList, ApiError> {
        let (page, limit) = page_and_limit(query.page.as_deref(), query.limit.as_deref());
        let curriculum_query = CurriculumQuery {
            user_id: query.user_id.filter(|s| !s.is_empty()),
            search: query.search.filter(|s| !s.trim().is_empty()),
            difficulty: None,
            sort_by: query.sort_by.unwrap_or_default(),
            order: query.order.unwrap_or_default(),
            skip: (page - 1) * limit,
            limit: Some(limit),
        };

        let (curricula, total) = self.storage.list_curricula(&curriculum_query).await?;
        let owners = self.owners(&curricula).await?;

        let mut rows = Vec::with_capacity(curricula.len());
        for curriculum in curricula {
            let quizzes = self.storage.count_quizzes(Some(&curriculum.id)).await?;
            rows.push(AdminCurriculumSummary {
                user: owners.get(&curriculum.user_id).cloned(),
                count: QuizCount { quizzes },
                curriculum: curriculum.into(),
            });
        }

        Ok(CurriculumList {
            curricula: rows,
            pagination: Pagination::new(total, page, limit),
        })
    }

    pub async fn get_curriculum(&self, id: &str) -> Result<AdminCurriculumDetail, ApiError> {
        let curriculum = self
            .storage
            .find_curriculum(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Curriculum not found"))?;

        let user = self
            .storage
            .find_user_by_id(&curriculum.user_id)
            .await?
            .map(|u| UserSummary::from(&u));

        let mut quizzes = Vec::new();
        if let Some(quiz) = self.storage.find_quiz_by_curriculum(&curriculum.id).await? {
            let results = self.storage.list_quiz_results(&quiz.id).await?;
            quizzes.push(QuizView::new(quiz, Some(results)));
        }

        Ok(AdminCurriculumDetail {
            curriculum: curriculum.into(),
            user,
            quizzes,
        })
    }

    pub async fn delete_curriculum(&self, id: &str) -> Result<(), ApiError> {
        if !self.storage.delete_curriculum(id).await? {
            return Err(ApiError::not_found("Curriculum not found"));
        }
        tracing::info!(curriculum_id = %id, "Curriculum deleted by admin");
        Ok(())
    }

    pub async fn stats(&self) -> Result<AdminStats, ApiError> {
        let recent_users = self
            .storage
            .recent_users(RECENT_LIMIT)
            .await?
            .into_iter()
            .map(|u| RecentUser {
                id: u.id,
                email: u.email,
                name: u.name,
                created_at: u.created_at,
            })
            .collect();

        let curricula = self.storage.recent_curricula(RECENT_LIMIT).await?;
        let owners = self.owners(&curricula).await?;
        let recent_curricula = curricula
            .into_iter()
            .map(|c| RecentCurriculum {
                user: owners.get(&c.user_id).cloned(),
                curriculum: c.into(),
            })
            .collect();

        Ok(AdminStats {
            total_users: self.storage.count_users().await?,
            total_curricula: self.storage.count_curricula(None).await?,
            total_quizzes: self.storage.count_quizzes(None).await?,
            total_credits_distributed: self.storage.total_credits().await?,
            recent_users,
            recent_curricula,
        })
    }
}
