use std::sync::Arc;

use chrono::Utc;

use crate::errors::ApiError;
use crate::models::conversation::{ChatMessage, ChatRequest, ChatResponse, ChatRole, Conversation};
use crate::services::ai_client::{AiGenerator, PromptKind};
use crate::services::prompts::mentor_prompt;
use crate::storage::{new_id, Storage};

/// Free-form mentor chat; costs no credits.
pub struct MentorService {
    storage: Arc<dyn Storage>,
    ai: Arc<dyn AiGenerator>,
}

impl MentorService {
    pub fn new(storage: Arc<dyn Storage>, ai: Arc<dyn AiGenerator>) -> Self {
        Self { storage, ai }
    }

    pub async fn chat(&self, user_id: &str, req: ChatRequest) -> Result<ChatResponse, ApiError> {
        let user = self
            .storage
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        let existing = match req.conversation_id.as_deref() {
            Some(id) => {
                let conversation = self
                    .storage
                    .find_conversation(id)
                    .await?
                    .ok_or_else(|| ApiError::not_found("Conversation not found"))?;
                if conversation.user_id != user.id {
                    return Err(ApiError::forbidden("Access denied"));
                }
                Some(conversation)
            }
            None => None,
        };

        let history = existing
            .as_ref()
            .map(|c| c.messages.as_slice())
            .unwrap_or_default();
        let reply = self
            .ai
            .generate(
                PromptKind::Mentor,
                &mentor_prompt(history, &req.message),
                user.gemini_api_key.as_deref(),
            )
            .await?;
        let reply = reply.trim().to_string();

        let exchange = vec![
            ChatMessage::new(ChatRole::User, req.message),
            ChatMessage::new(ChatRole::Assistant, reply.clone()),
        ];

        let conversation_id = match existing {
            Some(conversation) => {
                self.storage
                    .append_messages(&conversation.id, exchange)
                    .await?;
                conversation.id
            }
            None => {
                let now = Utc::now();
                let conversation = self
                    .storage
                    .insert_conversation(Conversation {
                        id: new_id(),
                        user_id: user.id.clone(),
                        messages: exchange,
                        created_at: now,
                        updated_at: now,
                    })
                    .await?;
                tracing::info!(
                    conversation_id = %conversation.id,
                    user_id = %user.id,
                    "Conversation started"
                );
                conversation.id
            }
        };

        Ok(ChatResponse {
            conversation_id,
            message: reply,
        })
    }
}
