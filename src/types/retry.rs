//! Retry job types
//!
//! A [`RetryJob`] records that a gateway call must be re-attempted or
//! reconciled later. The payload is opaque to the queue; drain workers
//! decode it back into a [`RetryAction`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::LedgerError;
use super::ids::TransactionId;
use super::money::Money;

/// Work a drain worker performs for a scheduled job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RetryAction {
    /// Re-send the transfer; the reference makes this idempotent
    InitiateTransfer {
        transaction_id: TransactionId,
        reference: String,
        recipient_code: String,
        amount: Money,
        reason: Option<String>,
        attempt: u32,
    },
    /// Ask the gateway what happened to a transfer with an ambiguous outcome
    VerifyTransfer {
        transaction_id: TransactionId,
        reference: String,
        attempt: u32,
    },
}

impl RetryAction {
    pub fn transaction_id(&self) -> TransactionId {
        match self {
            RetryAction::InitiateTransfer { transaction_id, .. }
            | RetryAction::VerifyTransfer { transaction_id, .. } => *transaction_id,
        }
    }

    pub fn attempt(&self) -> u32 {
        match self {
            RetryAction::InitiateTransfer { attempt, .. }
            | RetryAction::VerifyTransfer { attempt, .. } => *attempt,
        }
    }
}

/// A future-dated job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryJob {
    pub id: String,
    pub run_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl RetryJob {
    /// Job id for a transaction; rescheduling the same transaction upserts
    pub fn id_for(transaction_id: TransactionId) -> String {
        format!("retry:{}", transaction_id)
    }

    pub fn for_action(action: &RetryAction, run_at: DateTime<Utc>) -> Result<Self, LedgerError> {
        Ok(RetryJob {
            id: Self::id_for(action.transaction_id()),
            run_at,
            payload: serde_json::to_value(action)?,
        })
    }

    /// Decode the payload back into an action
    pub fn action(&self) -> Result<RetryAction, LedgerError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}
