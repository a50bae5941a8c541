//! Shared fixtures for the end-to-end tests: a scripted gateway, a manual
//! clock and an orchestrator wired to in-memory stores.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use wallet_ledger::config::LedgerConfig;
use wallet_ledger::core::{ManualClock, MerchantPayment, PaymentOrchestrator, PeerTransfer, Stores};
use wallet_ledger::gateway::{
    ChargeStatus, ChargeVerification, CheckoutSession, GatewayError, InitializeTransaction, PaymentGateway,
    RecipientRequest, TransferRequest, TransferResult, TransferStatus,
};
use wallet_ledger::types::{MerchantInfo, Money, PeerRecipient, UserProfile, WalletType};

pub const PIN: &str = "1234";

/// How the gateway answers `initiate_transfer`
#[derive(Debug, Clone)]
pub enum TransferScript {
    Respond(TransferStatus),
    Error(GatewayError),
    /// Never answers within the configured timeout
    Hang,
    /// A settlement webhook lands while the call is in flight, then the call
    /// answers with `then`
    SettledMidCall {
        succeeded: bool,
        then: Result<TransferStatus, GatewayError>,
    },
}

pub struct ScriptedGateway {
    transfer: Mutex<TransferScript>,
    checkout: Mutex<Result<(), GatewayError>>,
    charges: Mutex<HashMap<String, ChargeVerification>>,
    recipient_failure: Mutex<Option<GatewayError>>,
    pub transfers: Mutex<Vec<TransferRequest>>,
    pub recipient_calls: AtomicUsize,
    orchestrator: Mutex<Option<Arc<PaymentOrchestrator>>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        ScriptedGateway {
            transfer: Mutex::new(TransferScript::Respond(TransferStatus::Success)),
            checkout: Mutex::new(Ok(())),
            charges: Mutex::new(HashMap::new()),
            recipient_failure: Mutex::new(None),
            transfers: Mutex::new(Vec::new()),
            recipient_calls: AtomicUsize::new(0),
            orchestrator: Mutex::new(None),
        }
    }

    /// Let scripted webhooks reach the orchestrator under test
    pub fn attach(&self, orchestrator: Arc<PaymentOrchestrator>) {
        *self.orchestrator.lock().unwrap() = Some(orchestrator);
    }

    pub fn script_transfer(&self, script: TransferScript) {
        *self.transfer.lock().unwrap() = script;
    }

    pub fn fail_checkout(&self, error: GatewayError) {
        *self.checkout.lock().unwrap() = Err(error);
    }

    pub fn fail_recipient(&self, error: GatewayError) {
        *self.recipient_failure.lock().unwrap() = Some(error);
    }

    pub fn set_charge(&self, reference: &str, status: ChargeStatus, amount: i64) {
        self.charges.lock().unwrap().insert(
            reference.to_string(),
            ChargeVerification {
                reference: reference.to_string(),
                status,
                amount: Money::from_minor(amount),
            },
        );
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initialize_transaction(&self, request: InitializeTransaction) -> Result<CheckoutSession, GatewayError> {
        self.checkout.lock().unwrap().clone()?;
        Ok(CheckoutSession {
            authorization_url: format!("https://checkout.test/{}", request.reference),
            access_code: format!("AC_{}", &request.reference[..8]),
            reference: request.reference,
        })
    }

    async fn verify_transaction(&self, reference: &str) -> Result<ChargeVerification, GatewayError> {
        self.charges
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| GatewayError::Status {
                code: 404,
                message: "Transaction reference not found".to_string(),
            })
    }

    async fn create_transfer_recipient(&self, _request: RecipientRequest) -> Result<String, GatewayError> {
        let n = self.recipient_calls.fetch_add(1, Ordering::SeqCst);
        match self.recipient_failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(format!("RCP_{}", n)),
        }
    }

    async fn initiate_transfer(&self, request: TransferRequest) -> Result<TransferResult, GatewayError> {
        let script = self.transfer.lock().unwrap().clone();
        let reference = request.reference.clone();
        let n = {
            let mut transfers = self.transfers.lock().unwrap();
            transfers.push(request);
            transfers.len()
        };
        match script {
            TransferScript::Respond(status) => Ok(TransferResult {
                reference,
                transfer_code: Some(format!("TRF_{}", n)),
                status,
            }),
            TransferScript::Error(error) => Err(error),
            TransferScript::Hang => {
                tokio::time::sleep(StdDuration::from_secs(3600)).await;
                Err(GatewayError::Timeout)
            }
            TransferScript::SettledMidCall { succeeded, then } => {
                let orchestrator = self.orchestrator.lock().unwrap().clone().unwrap();
                if succeeded {
                    orchestrator
                        .settle_transfer_success(&reference, Some("TRF_webhook".to_string()))
                        .await
                        .unwrap();
                } else {
                    orchestrator
                        .settle_transfer_failure(&reference, "transfer reversed")
                        .await
                        .unwrap();
                }
                then.map(|status| TransferResult {
                    reference,
                    transfer_code: Some(format!("TRF_{}", n)),
                    status,
                })
            }
        }
    }

    async fn verify_transfer(&self, reference: &str) -> Result<TransferResult, GatewayError> {
        Ok(TransferResult {
            reference: reference.to_string(),
            transfer_code: None,
            status: TransferStatus::Pending,
        })
    }
}

/// 10:00 UTC, 11:00 local at the default +01:00 offset
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
}

pub fn test_config() -> LedgerConfig {
    let mut config = LedgerConfig::default();
    config.pin.hash_cost = 4;
    config.webhook_secret = "whsec_test".to_string();
    config.gateway.timeout = StdDuration::from_secs(30);
    config
}

pub struct Harness {
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub gateway: Arc<ScriptedGateway>,
    pub clock: Arc<ManualClock>,
    pub stores: Stores,
    pub user: UserProfile,
}

pub async fn harness() -> Harness {
    harness_with(test_config()).await
}

pub async fn harness_with(config: LedgerConfig) -> Harness {
    harness_on(Stores::in_memory(), config).await
}

pub async fn harness_on(stores: Stores, config: LedgerConfig) -> Harness {
    let gateway = Arc::new(ScriptedGateway::new());
    let clock = Arc::new(ManualClock::new(start_time()));
    let orchestrator = Arc::new(PaymentOrchestrator::new(
        stores.clone(),
        gateway.clone(),
        clock.clone(),
        config,
    ));
    gateway.attach(orchestrator.clone());

    let user = UserProfile {
        id: Uuid::from_u128(0xA11CE),
        full_name: "Ada Obi".to_string(),
        email: "ada@example.com".to_string(),
        phone: Some("+2348031234567".to_string()),
    };
    orchestrator.provision_user(user.clone()).await.unwrap();
    orchestrator.pin_gate().set_pin(user.id, PIN).await.unwrap();

    Harness {
        orchestrator,
        gateway,
        clock,
        stores,
        user,
    }
}

impl Harness {
    pub async fn fund(&self, amount: i64) {
        self.orchestrator
            .ledger()
            .credit(self.user.id, WalletType::Main, Money::from_minor(amount))
            .await
            .unwrap();
    }

    pub async fn token(&self) -> String {
        self.orchestrator
            .pin_gate()
            .verify_pin(self.user.id, PIN)
            .await
            .unwrap()
            .token
            .unwrap()
    }

    pub async fn balances(&self) -> (Money, Money, Money) {
        let ledger = self.orchestrator.ledger();
        let main = ledger.get_wallet(self.user.id, WalletType::Main).await.unwrap();
        let savings = ledger.get_wallet(self.user.id, WalletType::Savings).await.unwrap();
        (main.available_balance, savings.balance, savings.available_balance)
    }

    pub async fn merchant_payment(&self, amount: i64) -> MerchantPayment {
        MerchantPayment {
            user_id: self.user.id,
            amount: Decimal::from(amount),
            pin_token: self.token().await,
            merchant: merchant(),
            description: Some("groceries".to_string()),
        }
    }

    pub async fn peer_transfer(&self, amount: i64, recipient: PeerRecipient) -> PeerTransfer {
        PeerTransfer {
            user_id: self.user.id,
            amount: Decimal::from(amount),
            pin_token: self.token().await,
            recipient,
            description: None,
        }
    }
}

pub fn merchant() -> MerchantInfo {
    MerchantInfo {
        merchant_id: "m_001".to_string(),
        name: "Corner Shop".to_string(),
        account_number: "0011223344".to_string(),
        bank_code: "058".to_string(),
        category: Some("groceries".to_string()),
        recipient_code: None,
    }
}

pub fn recipient(phone: Option<&str>, email: Option<&str>) -> PeerRecipient {
    PeerRecipient {
        name: "Bola Ade".to_string(),
        account_number: "0123456789".to_string(),
        bank_code: "044".to_string(),
        phone: phone.map(str::to_string),
        email: email.map(str::to_string),
        recipient_code: None,
    }
}
