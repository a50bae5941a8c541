//! Inbound gateway webhooks
//!
//! The gateway signs the raw request body with HMAC-SHA512 keyed by the
//! shared secret and sends the hex digest in [`SIGNATURE_HEADER`]. Every
//! delivery is acknowledged so the gateway stops redelivering; unsigned or
//! unknown events are simply not processed.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha512;
use tracing::{debug, error, info, warn};

use crate::core::orchestrator::PaymentOrchestrator;
use crate::types::{LedgerError, Money};

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

type HmacSha512 = Hmac<Sha512>;

/// Hex HMAC-SHA512 of `body` keyed by `secret`
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String, LedgerError> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| LedgerError::internal(format!("invalid webhook key: {}", e)))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChargeData {
    reference: String,
    amount: Money,
}

#[derive(Debug, Deserialize)]
struct TransferData {
    reference: String,
    #[serde(default)]
    transfer_code: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Response to a webhook delivery; always HTTP 200
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookAck {
    pub processed: bool,
    pub event: Option<String>,
}

impl WebhookAck {
    fn ignored(event: Option<String>) -> Self {
        WebhookAck { processed: false, event }
    }

    pub fn status_code(&self) -> u16 {
        200
    }
}

pub struct WebhookProcessor {
    orchestrator: Arc<PaymentOrchestrator>,
    secret: String,
}

impl WebhookProcessor {
    pub fn new(orchestrator: Arc<PaymentOrchestrator>, secret: impl Into<String>) -> Self {
        WebhookProcessor {
            orchestrator,
            secret: secret.into(),
        }
    }

    /// Verify and dispatch one delivery
    pub async fn handle(&self, raw_body: &[u8], signature: Option<&str>) -> WebhookAck {
        let signed = signature.is_some_and(|sig| verify_signature(&self.secret, raw_body, sig));
        if !signed {
            warn!(target: "security", has_signature = signature.is_some(), "webhook signature rejected");
            return WebhookAck::ignored(None);
        }

        let event: WebhookEvent = match serde_json::from_slice(raw_body) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "unreadable webhook body");
                return WebhookAck::ignored(None);
            }
        };

        let name = event.event.clone();
        info!(event = %name, "webhook received");
        match self.dispatch(event).await {
            Ok(true) => WebhookAck {
                processed: true,
                event: Some(name),
            },
            Ok(false) => {
                debug!(event = %name, "webhook event ignored");
                WebhookAck::ignored(Some(name))
            }
            Err(e) => {
                error!(event = %name, error = %e, "webhook processing failed");
                WebhookAck::ignored(Some(name))
            }
        }
    }

    async fn dispatch(&self, event: WebhookEvent) -> Result<bool, LedgerError> {
        match event.event.as_str() {
            "charge.success" => {
                let data: ChargeData = serde_json::from_value(event.data)?;
                self.orchestrator.confirm_deposit(&data.reference, data.amount).await?;
                Ok(true)
            }
            "transfer.success" => {
                let data: TransferData = serde_json::from_value(event.data)?;
                self.orchestrator
                    .settle_transfer_success(&data.reference, data.transfer_code)
                    .await?;
                Ok(true)
            }
            "transfer.failed" | "transfer.reversed" => {
                let data: TransferData = serde_json::from_value(event.data)?;
                let reason = data
                    .reason
                    .unwrap_or_else(|| event.event.replace('.', " "));
                self.orchestrator
                    .settle_transfer_failure(&data.reference, &reason)
                    .await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
