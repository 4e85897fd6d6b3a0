use std::sync::Arc;

use crate::errors::{ApiError, CoreError};
use crate::metrics::{CREDIT_DEBITS_REJECTED_TOTAL, CREDIT_DEBITS_TOTAL, CREDIT_REFUNDS_TOTAL};
use crate::models::user::User;
use crate::storage::Storage;

pub const CURRICULUM_GENERATION_COST: u32 = 10;
pub const QUIZ_GENERATION_COST: u32 = 20;

/// Actions that are paid for with credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaidAction {
    CurriculumGeneration,
    QuizGeneration,
}

impl PaidAction {
    pub fn cost(self) -> u32 {
        match self {
            PaidAction::CurriculumGeneration => CURRICULUM_GENERATION_COST,
            PaidAction::QuizGeneration => QUIZ_GENERATION_COST,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaidAction::CurriculumGeneration => "curriculum",
            PaidAction::QuizGeneration => "quiz",
        }
    }
}

/// Returns the balance left after paying `cost`, or `InsufficientCredits`
/// when the balance does not cover it.
pub fn try_debit(balance: u32, cost: u32) -> Result<u32, CoreError> {
    balance
        .checked_sub(cost)
        .ok_or(CoreError::InsufficientCredits { balance, cost })
}

/// Gatekeeper for paid actions.
///
/// `ensure_affordable` is a cheap pre-flight check so that no AI call is
/// made for a user who cannot pay. The authoritative check is `debit`,
/// which runs after the AI call succeeded and relies on the storage layer's
/// conditional decrement, so two concurrent requests can never both spend
/// the same credits. When the paid result cannot be stored after the debit,
/// `refund` returns the cost so the user is never charged for nothing.
pub struct CreditLedger {
    storage: Arc<dyn Storage>,
}

impl CreditLedger {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn ensure_affordable(&self, user: &User, action: PaidAction) -> Result<(), CoreError> {
        try_debit(user.credits, action.cost()).map(|_| ()).map_err(|e| {
            CREDIT_DEBITS_REJECTED_TOTAL
                .with_label_values(&[action.as_str(), "precheck"])
                .inc();
            tracing::warn!(
                user_id = %user.id,
                balance = user.credits,
                cost = action.cost(),
                "Paid action rejected: insufficient credits"
            );
            e
        })
    }

    pub async fn debit(&self, user_id: &str, action: PaidAction) -> Result<u32, ApiError> {
        let cost = action.cost();

        if let Some(balance) = self.storage.debit_credits(user_id, cost).await? {
            CREDIT_DEBITS_TOTAL
                .with_label_values(&[action.as_str()])
                .inc_by(cost as u64);
            tracing::info!(
                user_id = %user_id,
                action = action.as_str(),
                cost,
                balance,
                "Credits debited"
            );
            return Ok(balance);
        }

        // The conditional decrement matched nothing: either the user is gone
        // or a concurrent request spent the credits after our pre-check.
        let user = self
            .storage
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        CREDIT_DEBITS_REJECTED_TOTAL
            .with_label_values(&[action.as_str(), "debit"])
            .inc();
        tracing::warn!(
            user_id = %user_id,
            balance = user.credits,
            cost,
            "Credit debit lost to a concurrent request"
        );

        Err(CoreError::InsufficientCredits {
            balance: user.credits,
            cost,
        }
        .into())
    }

    /// Gives back the cost of `action`. Returns the new balance, `None` when
    /// the user was deleted in the meantime.
    pub async fn refund(
        &self,
        user_id: &str,
        action: PaidAction,
    ) -> Result<Option<u32>, ApiError> {
        let cost = action.cost();
        let balance = self.storage.refund_credits(user_id, cost).await?;

        CREDIT_REFUNDS_TOTAL
            .with_label_values(&[action.as_str()])
            .inc_by(cost as u64);
        match balance {
            Some(balance) => tracing::info!(
                user_id = %user_id,
                action = action.as_str(),
                cost,
                balance,
                "Credits refunded"
            ),
            None => tracing::warn!(
                user_id = %user_id,
                action = action.as_str(),
                "Refund skipped: user no longer exists"
            ),
        }
        Ok(balance)
    }

    /// Runs `persist` after a successful debit and refunds the cost when it
    /// fails, handing the original error back to the caller.
    pub async fn settle<T, E, F>(
        &self,
        user_id: &str,
        action: PaidAction,
        persist: F,
    ) -> Result<T, E>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match persist.await {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    action = action.as_str(),
                    error = %e,
                    "Paid result not stored after debit, refunding"
                );
                if let Err(refund_err) = self.refund(user_id, action).await {
                    tracing::error!(
                        user_id = %user_id,
                        action = action.as_str(),
                        error = %refund_err,
                        "Refund failed"
                    );
                }
                Err(e)
            }
        }
    }
}
