use std::sync::Arc;

use chrono::Utc;

use crate::errors::ApiError;
use crate::metrics::{QUIZ_SCORE, QUIZ_SUBMISSIONS_TOTAL};
use crate::models::quiz::{
    GeneratedQuiz, Quiz, QuizResult, QuizView, SubmitQuizRequest, SubmitQuizResponse,
};
use crate::services::ai_adapter::{extract_structured, validate_quiz};
use crate::services::ai_client::{AiGenerator, PromptKind};
use crate::services::credit_ledger::{CreditLedger, PaidAction};
use crate::services::curriculum_service::CurriculumService;
use crate::services::prompts::quiz_prompt;
use crate::services::scoring::{focus_areas, recommendation, score_submission, ProgressPolicy};
use crate::storage::{new_id, Storage, StorageError};

const QUIZ_EXISTS: &str = "Quiz already exists for this curriculum";

pub struct QuizService {
    storage: Arc<dyn Storage>,
    ai: Arc<dyn AiGenerator>,
    progress_policy: ProgressPolicy,
}

impl QuizService {
    pub fn new(
        storage: Arc<dyn Storage>,
        ai: Arc<dyn AiGenerator>,
        progress_policy: ProgressPolicy,
    ) -> Self {
        Self {
            storage,
            ai,
            progress_policy,
        }
    }

    fn curricula(&self) -> CurriculumService {
        CurriculumService::new(self.storage.clone(), self.ai.clone())
    }

    pub async fn generate(&self, user_id: &str, curriculum_id: &str) -> Result<QuizView, ApiError> {
        let curriculum = self.curricula().owned(user_id, curriculum_id).await?;

        if self
            .storage
            .find_quiz_by_curriculum(&curriculum.id)
            .await?
            .is_some()
        {
            return Err(ApiError::bad_request(QUIZ_EXISTS));
        }

        let user = self
            .storage
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        let ledger = CreditLedger::new(self.storage.clone());
        ledger.ensure_affordable(&user, PaidAction::QuizGeneration)?;

        let raw = self
            .ai
            .generate(
                PromptKind::Quiz,
                &quiz_prompt(&curriculum),
                user.gemini_api_key.as_deref(),
            )
            .await?;
        let generated: GeneratedQuiz = extract_structured(&raw)?;
        validate_quiz(&generated)?;

        // A concurrent generate may have stored its quiz while we waited on
        // the AI; check again so the loser is not charged.
        if self
            .storage
            .find_quiz_by_curriculum(&curriculum.id)
            .await?
            .is_some()
        {
            return Err(ApiError::bad_request(QUIZ_EXISTS));
        }

        ledger.debit(&user.id, PaidAction::QuizGeneration).await?;

        let quiz = Quiz {
            id: new_id(),
            curriculum_id: curriculum.id,
            questions: generated.questions,
            created_at: Utc::now(),
        };
        let stored = ledger
            .settle(
                &user.id,
                PaidAction::QuizGeneration,
                self.storage.insert_quiz(quiz),
            )
            .await;
        let quiz = match stored {
            Ok(quiz) => quiz,
            Err(StorageError::Duplicate(_)) => {
                tracing::warn!(
                    curriculum_id = %curriculum_id,
                    user_id = %user_id,
                    "Quiz insert lost to a concurrent request, debit refunded"
                );
                return Err(ApiError::bad_request(QUIZ_EXISTS));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            quiz_id = %quiz.id,
            curriculum_id = %quiz.curriculum_id,
            questions = quiz.questions.len(),
            "Quiz generated"
        );
        Ok(QuizView::new(quiz, None))
    }

    pub async fn get(&self, user_id: &str, curriculum_id: &str) -> Result<QuizView, ApiError> {
        let curriculum = self.curricula().owned(user_id, curriculum_id).await?;

        let quiz = self
            .storage
            .find_quiz_by_curriculum(&curriculum.id)
            .await?
            .ok_or_else(|| ApiError::not_found("No quiz found for this curriculum"))?;
        let results = self.storage.list_quiz_results(&quiz.id).await?;

        Ok(QuizView::new(quiz, Some(results)))
    }

    pub async fn submit(
        &self,
        user_id: &str,
        curriculum_id: &str,
        req: SubmitQuizRequest,
    ) -> Result<SubmitQuizResponse, ApiError> {
        let curriculum = self.curricula().owned(user_id, curriculum_id).await?;

        let quiz = self
            .storage
            .find_quiz_by_curriculum(&curriculum.id)
            .await?
            .ok_or_else(|| ApiError::not_found("No quiz found for this curriculum"))?;

        let scored = match score_submission(&quiz.questions, &req.answers) {
            Ok(scored) => scored,
            Err(e) => {
                QUIZ_SUBMISSIONS_TOTAL.with_label_values(&["rejected"]).inc();
                return Err(e.into());
            }
        };

        let result = self
            .storage
            .insert_quiz_result(QuizResult {
                id: new_id(),
                quiz_id: quiz.id,
                user_id: user_id.to_string(),
                answers: req.answers,
                score: scored.score,
                weak_topics: scored.weak_topics.clone(),
                created_at: Utc::now(),
            })
            .await?;

        self.storage
            .record_quiz_outcome(
                &curriculum.id,
                scored.score,
                focus_areas(&scored.weak_topics),
                self.progress_policy,
            )
            .await?
            .ok_or_else(|| ApiError::not_found("Curriculum not found"))?;

        QUIZ_SUBMISSIONS_TOTAL.with_label_values(&["scored"]).inc();
        QUIZ_SCORE.observe(scored.score);
        tracing::info!(
            result_id = %result.id,
            curriculum_id = %curriculum.id,
            score = scored.score,
            correct = scored.correct_count,
            total = scored.total,
            "Quiz submitted"
        );

        Ok(SubmitQuizResponse {
            recommendations: recommendation(&scored.weak_topics),
            score: scored.score,
            weak_topics: scored.weak_topics,
            result: result.into(),
        })
    }
}
