use std::sync::Arc;

use chrono::Utc;

use crate::errors::ApiError;
use crate::models::curriculum::{
    CreateCurriculumRequest, Curriculum, CurriculumDetail, CurriculumUpdate, CurriculumView,
    GeneratedCurriculum, ListCurriculaQuery, QuizStub, UpdateCurriculumRequest,
};
use crate::services::ai_adapter::extract_structured;
use crate::services::ai_client::{AiGenerator, PromptKind};
use crate::services::credit_ledger::{CreditLedger, PaidAction};
use crate::services::prompts::curriculum_prompt;
use crate::storage::{new_id, CurriculumQuery, Storage};

pub struct CurriculumService {
    storage: Arc<dyn Storage>,
    ai: Arc<dyn AiGenerator>,
}

impl CurriculumService {
    pub fn new(storage: Arc<dyn Storage>, ai: Arc<dyn AiGenerator>) -> Self {
        Self { storage, ai }
    }

    /// Generates a curriculum and charges for it.
    ///
    /// Credits are only taken once the AI produced a usable payload; if a
    /// concurrent request drained the balance in the meantime the generated
    /// content is dropped and nothing is stored. A failed insert after the
    /// debit is refunded.
    pub async fn create(
        &self,
        user_id: &str,
        req: CreateCurriculumRequest,
    ) -> Result<CurriculumView, ApiError> {
        let user = self
            .storage
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        let ledger = CreditLedger::new(self.storage.clone());
        ledger.ensure_affordable(&user, PaidAction::CurriculumGeneration)?;

        let prompt = curriculum_prompt(&req.topic, req.difficulty, req.depth);
        let raw = self
            .ai
            .generate(
                PromptKind::Curriculum,
                &prompt,
                user.gemini_api_key.as_deref(),
            )
            .await?;
        let generated: GeneratedCurriculum = extract_structured(&raw)?;

        ledger
            .debit(&user.id, PaidAction::CurriculumGeneration)
            .await?;

        let now = Utc::now();
        let curriculum = Curriculum {
            id: new_id(),
            user_id: user.id,
            topic: req.topic,
            difficulty: req.difficulty,
            depth: req.depth,
            title: generated.title,
            description: generated.description,
            modules: generated.modules,
            progress: None,
            focus_areas: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let curriculum = ledger
            .settle(
                user_id,
                PaidAction::CurriculumGeneration,
                self.storage.insert_curriculum(curriculum),
            )
            .await?;

        tracing::info!(
            curriculum_id = %curriculum.id,
            user_id = %curriculum.user_id,
            modules = curriculum.modules.len(),
            "Curriculum created"
        );
        Ok(curriculum.into())
    }

    pub async fn list(
        &self,
        user_id: &str,
        query: ListCurriculaQuery,
    ) -> Result<Vec<CurriculumView>, ApiError> {
        let query = CurriculumQuery {
            user_id: Some(user_id.to_string()),
            search: query.search.filter(|s| !s.trim().is_empty()),
            difficulty: query.difficulty,
            sort_by: query.sort_by.unwrap_or_default(),
            order: query.order.unwrap_or_default(),
            ..CurriculumQuery::default()
        };

        let (curricula, _) = self.storage.list_curricula(&query).await?;
        Ok(curricula.into_iter().map(CurriculumView::from).collect())
    }

    /// Loads a curriculum and checks that `user_id` owns it.
    pub async fn owned(&self, user_id: &str, id: &str) -> Result<Curriculum, ApiError> {
        let curriculum = self
            .storage
            .find_curriculum(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Curriculum not found"))?;

        if curriculum.user_id != user_id {
            tracing::warn!(curriculum_id = %id, user_id = %user_id, "Curriculum access denied");
            return Err(ApiError::forbidden("Access denied"));
        }
        Ok(curriculum)
    }

    pub async fn get(&self, user_id: &str, id: &str) -> Result<CurriculumDetail, ApiError> {
        let curriculum = self.owned(user_id, id).await?;

        let quizzes = self
            .storage
            .find_quiz_by_curriculum(&curriculum.id)
            .await?
            .into_iter()
            .map(|quiz| QuizStub {
                id: quiz.id,
                created_at: quiz.created_at,
            })
            .collect();

        Ok(CurriculumDetail {
            curriculum: curriculum.into(),
            quizzes,
        })
    }

    pub async fn update(
        &self,
        user_id: &str,
        id: &str,
        req: UpdateCurriculumRequest,
    ) -> Result<CurriculumView, ApiError> {
        self.owned(user_id, id).await?;

        let update = CurriculumUpdate {
            title: req.title,
            progress: req.progress,
        };
        let curriculum = self
            .storage
            .update_curriculum(id, update)
            .await?
            .ok_or_else(|| ApiError::not_found("Curriculum not found"))?;

        tracing::info!(curriculum_id = %id, "Curriculum updated");
        Ok(curriculum.into())
    }

    pub async fn delete(&self, user_id: &str, id: &str) -> Result<(), ApiError> {
        self.owned(user_id, id).await?;

        if !self.storage.delete_curriculum(id).await? {
            return Err(ApiError::not_found("Curriculum not found"));
        }

        tracing::info!(curriculum_id = %id, "Curriculum deleted");
        Ok(())
    }
}
