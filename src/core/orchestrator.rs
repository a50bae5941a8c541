//! Payment orchestrator
//!
//! Drives a merchant payment or peer transfer from authorization to gateway
//! reconciliation:
//!
//! ```text
//! redeem PIN token → self-transfer check → balance precheck
//!   → record (limits) → resolve recipient → debit main
//!   → round-up (debit main, credit savings, linked record)
//!   → gateway transfer ─┬─ success      → completed
//!                       ├─ pending/otp  → pending
//!                       ├─ definitive   → compensating credit, failed
//!                       └─ transient    → retry job, pending + retry hint
//! ```
//!
//! Deposits run the other way: a pending record and a hosted checkout, with
//! the wallet credited only once the gateway confirms the charge.
//!
//! The orchestrator holds no locks. Each balance change is one atomic store
//! update and settlement paths claim the transaction with a status
//! compare-and-set, so a compensating credit happens at most once.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::config::LedgerConfig;
use crate::core::clock::Clock;
use crate::core::pin_gate::PinGate;
use crate::core::recipient::ensure_not_self;
use crate::core::retry_scheduler::RetryScheduler;
use crate::core::round_up::{calculate_round_up, can_apply_round_up};
use crate::core::traits::{GuardedUpdate, Stores};
use crate::core::transaction_writer::TransactionWriter;
use crate::core::wallet_ledger::WalletLedger;
use crate::gateway::{
    fee_for_transfer, ChargeStatus, GatewayError, InitializeTransaction, PaymentGateway,
    RecipientRequest, TransferRequest, TransferResult, TransferStatus,
};
use crate::types::{
    parse_id, LedgerError, MerchantInfo, Money, NewTransaction, PeerRecipient, RetryAction, RetryJob,
    RoundUpDetails, RoundUpRule, Transaction, TransactionDetails, TransactionId, TransactionStatus,
    TransactionType, UserId, UserProfile, Wallet, WalletType,
};

/// Reason reported when the wallet cannot cover a round-up
pub const ROUND_UP_SKIP_REASON: &str = "Insufficient funds for round-up";

/// Pay a merchant from the main wallet
#[derive(Debug, Clone, PartialEq)]
pub struct MerchantPayment {
    pub user_id: UserId,
    pub amount: Decimal,
    pub pin_token: String,
    pub merchant: MerchantInfo,
    pub description: Option<String>,
}

/// Send money from the main wallet to another person's bank account
#[derive(Debug, Clone, PartialEq)]
pub struct PeerTransfer {
    pub user_id: UserId,
    pub amount: Decimal,
    pub pin_token: String,
    pub recipient: PeerRecipient,
    pub description: Option<String>,
}

/// What happened to the round-up of a payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundUpOutcome {
    Applied {
        transaction_id: TransactionId,
        amount: Money,
    },
    Skipped {
        amount: Money,
        reason: String,
    },
    /// No enabled rule, or the payment needs no rounding
    NotApplicable,
}

/// Where the gateway left the payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    Completed {
        transfer_code: Option<String>,
    },
    /// Accepted; the final result arrives by webhook or verification
    Pending {
        status: TransferStatus,
    },
    /// No definitive answer; the debit stays held and a retry is queued
    RetryScheduled {
        job_id: String,
        retry_after: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    pub transaction: Transaction,
    pub round_up: RoundUpOutcome,
    pub gateway: GatewayOutcome,
    /// Main wallet available balance after the payment and round-up
    pub available_balance: Money,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepositCheckout {
    pub transaction: Transaction,
    pub authorization_url: String,
    pub access_code: String,
    pub expires_at: DateTime<Utc>,
}

/// Who an outbound payment goes to
enum Payee {
    Merchant(MerchantInfo),
    Peer(PeerRecipient),
}

impl Payee {
    fn recipient_code(&self) -> Option<&str> {
        match self {
            Payee::Merchant(merchant) => merchant.recipient_code.as_deref(),
            Payee::Peer(recipient) => recipient.recipient_code.as_deref(),
        }
    }

    fn set_recipient_code(&mut self, code: String) {
        match self {
            Payee::Merchant(merchant) => merchant.recipient_code = Some(code),
            Payee::Peer(recipient) => recipient.recipient_code = Some(code),
        }
    }

    fn recipient_request(&self, currency: &str) -> RecipientRequest {
        let (name, account_number, bank_code) = match self {
            Payee::Merchant(m) => (&m.name, &m.account_number, &m.bank_code),
            Payee::Peer(p) => (&p.name, &p.account_number, &p.bank_code),
        };
        RecipientRequest {
            kind: "nuban".to_string(),
            name: name.clone(),
            account_number: account_number.clone(),
            bank_code: bank_code.clone(),
            currency: currency.to_string(),
        }
    }

    fn category(&self) -> Option<String> {
        match self {
            Payee::Merchant(merchant) => merchant.category.clone(),
            Payee::Peer(_) => None,
        }
    }

    fn details(&self, description: Option<String>) -> TransactionDetails {
        match self {
            Payee::Merchant(merchant) => TransactionDetails::Payment {
                merchant: merchant.clone(),
                description,
            },
            Payee::Peer(recipient) => TransactionDetails::TransferOut {
                recipient: recipient.clone(),
                description,
            },
        }
    }
}

pub struct PaymentOrchestrator {
    stores: Stores,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
    ledger: WalletLedger,
    writer: TransactionWriter,
    pins: PinGate,
    retries: RetryScheduler,
}

impl PaymentOrchestrator {
    pub fn new(stores: Stores, gateway: Arc<dyn PaymentGateway>, clock: Arc<dyn Clock>, config: LedgerConfig) -> Self {
        let ledger = WalletLedger::new(stores.wallets.clone(), clock.clone())
            .with_savings_settlement_delay(config.savings_settlement_delay_minutes);
        let writer = TransactionWriter::new(stores.transactions.clone(), clock.clone(), config.limits.clone());
        let pins = PinGate::new(
            stores.pins.clone(),
            clock.clone(),
            config.pin.token_ttl,
            config.pin.hash_cost,
        );
        let retries = RetryScheduler::new(stores.retries.clone(), clock.clone(), config.retry.clone());
        PaymentOrchestrator {
            stores,
            gateway,
            clock,
            config,
            ledger,
            writer,
            pins,
            retries,
        }
    }

    pub fn ledger(&self) -> &WalletLedger {
        &self.ledger
    }

    pub fn writer(&self) -> &TransactionWriter {
        &self.writer
    }

    pub fn pin_gate(&self) -> &PinGate {
        &self.pins
    }

    pub fn retry_scheduler(&self) -> &RetryScheduler {
        &self.retries
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Register a user's contact details and create both wallets
    ///
    /// Idempotent for the wallets; the profile is replaced.
    pub async fn provision_user(&self, profile: UserProfile) -> Result<(Wallet, Wallet), LedgerError> {
        let user_id = profile.id;
        self.stores.users.upsert(profile).await?;
        self.ledger.provision(user_id).await
    }

    /// Validate and store a user's round-up rule, replacing any earlier one
    pub async fn set_round_up_rule(&self, rule: RoundUpRule) -> Result<RoundUpRule, LedgerError> {
        rule.validate()?;
        self.stores.rules.upsert(rule.clone()).await?;
        info!(user_id = %rule.user_id, increment = %rule.increment_type, enabled = rule.is_enabled, "round-up rule saved");
        Ok(rule)
    }

    /// Transactions of a user, newest first
    pub async fn history(&self, user_id: UserId) -> Result<Vec<Transaction>, LedgerError> {
        self.stores.transactions.list_for_user(user_id).await
    }

    /// Pay a merchant through the gateway
    ///
    /// # Errors
    ///
    /// - [`LedgerError::PinTokenExpired`] if the token is not usable
    /// - [`LedgerError::AmountNotInteger`] for fractional amounts
    /// - [`LedgerError::InsufficientFunds`] with the available balance
    /// - [`LedgerError::SingleLimitExceeded`] / [`LedgerError::DailyLimitExceeded`]
    /// - [`LedgerError::GatewayUnavailable`] when the gateway definitively
    ///   refuses; the debit has been credited back
    pub async fn pay_merchant(&self, request: MerchantPayment) -> Result<PaymentReceipt, LedgerError> {
        let MerchantPayment {
            user_id,
            amount,
            pin_token,
            merchant,
            description,
        } = request;
        self.execute_outbound(user_id, amount, &pin_token, Payee::Merchant(merchant), description)
            .await
    }

    /// Transfer to another person through the gateway
    ///
    /// Same errors as [`Self::pay_merchant`], plus
    /// [`LedgerError::SelfTransferNotAllowed`] when the recipient's phone or
    /// email resolves to the sender. Nothing is debited in that case.
    pub async fn transfer_peer(&self, request: PeerTransfer) -> Result<PaymentReceipt, LedgerError> {
        let PeerTransfer {
            user_id,
            amount,
            pin_token,
            recipient,
            description,
        } = request;
        self.execute_outbound(user_id, amount, &pin_token, Payee::Peer(recipient), description)
            .await
    }

    async fn execute_outbound(
        &self,
        user_id: UserId,
        amount: Decimal,
        pin_token: &str,
        mut payee: Payee,
        description: Option<String>,
    ) -> Result<PaymentReceipt, LedgerError> {
        // Redeeming consumes the token whatever happens next.
        self.pins.redeem_pin_token(user_id, pin_token).await?;

        if let Payee::Peer(recipient) = &payee {
            let sender = self
                .stores
                .users
                .get(user_id)
                .await?
                .ok_or_else(|| LedgerError::not_found("user", user_id))?;
            if let Err(e) = ensure_not_self(&sender, recipient) {
                warn!(user_id = %user_id, "self-transfer rejected");
                return Err(e);
            }
        }

        let requested = Money::from_decimal(amount)?;
        let wallet = self.ledger.get_wallet(user_id, WalletType::Main).await?;
        if wallet.available_balance < requested {
            return Err(LedgerError::insufficient_funds(
                user_id,
                WalletType::Main,
                wallet.available_balance,
                requested,
            ));
        }

        let mut entry = NewTransaction::new(user_id, amount, payee.details(description.clone()))
            .with_fee(fee_for_transfer(requested));
        if let Some(category) = payee.category() {
            entry = entry.with_category(category);
        }
        let mut transaction = self.writer.create(entry).await?;

        let recipient_code = match payee.recipient_code().map(str::to_string) {
            Some(code) => code,
            None => {
                let request = payee.recipient_request(&self.config.currency);
                match self
                    .call_gateway("create_transfer_recipient", self.gateway.create_transfer_recipient(request))
                    .await
                {
                    Ok(code) => {
                        payee.set_recipient_code(code.clone());
                        let details = payee.details(description.clone());
                        let record = |tx: &mut Transaction| tx.details = details.clone();
                        transaction = match self.writer.save_if_pending(transaction.id, &record).await? {
                            GuardedUpdate::Applied(saved) => saved,
                            GuardedUpdate::Skipped(current) => {
                                return Err(LedgerError::invalid_status_transition(
                                    current.id,
                                    current.status,
                                    TransactionStatus::Pending,
                                ))
                            }
                        };
                        code
                    }
                    Err(e) => {
                        self.fail_unfunded(&transaction, &e.to_string()).await;
                        return Err(e.into_ledger_error("create_transfer_recipient"));
                    }
                }
            }
        };

        let debited = match self.ledger.debit(user_id, WalletType::Main, transaction.amount).await {
            Ok(wallet) => wallet,
            Err(e) => {
                self.fail_unfunded(&transaction, &e.to_string()).await;
                return Err(e);
            }
        };

        let round_up = self.apply_round_up(&mut transaction, debited.available_balance).await;

        let request = TransferRequest {
            source: "balance".to_string(),
            amount: transaction.amount,
            recipient: recipient_code.clone(),
            reference: transaction.id.to_string(),
            reason: description.clone(),
            currency: self.config.currency.clone(),
        };
        let outcome = self
            .call_gateway("initiate_transfer", self.gateway.initiate_transfer(request))
            .await;
        let (transaction, gateway) = self
            .reconcile_transfer(transaction, &recipient_code, description, outcome)
            .await?;

        let available_balance = self
            .ledger
            .get_wallet(user_id, WalletType::Main)
            .await?
            .available_balance;

        Ok(PaymentReceipt {
            transaction,
            round_up,
            gateway,
            available_balance,
        })
    }

    /// Move the round-up to savings if the remaining balance allows it
    ///
    /// Never fails the parent payment; every problem becomes a skip.
    async fn apply_round_up(&self, parent: &mut Transaction, remaining: Money) -> RoundUpOutcome {
        let user_id = parent.user_id;
        let rule = match self.stores.rules.get(user_id).await {
            Ok(Some(rule)) if rule.is_enabled => rule,
            Ok(_) => return RoundUpOutcome::NotApplicable,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "round-up rule unavailable");
                return RoundUpOutcome::NotApplicable;
            }
        };

        let round_up = calculate_round_up(parent.amount, Some(&rule)).round_up_amount;
        if !round_up.is_positive() {
            return RoundUpOutcome::NotApplicable;
        }

        let skipped = |reason: String| {
            info!(user_id = %user_id, amount = %round_up, reason = %reason, "round-up skipped");
            RoundUpOutcome::Skipped {
                amount: round_up,
                reason,
            }
        };

        if !can_apply_round_up(parent.amount, round_up, remaining) {
            return skipped(ROUND_UP_SKIP_REASON.to_string());
        }

        match self.ledger.debit(user_id, WalletType::Main, round_up).await {
            Ok(_) => {}
            Err(LedgerError::InsufficientFunds { .. }) => return skipped(ROUND_UP_SKIP_REASON.to_string()),
            Err(e) => return skipped(e.to_string()),
        }

        if let Err(e) = self
            .ledger
            .credit_with_settlement(user_id, WalletType::Savings, round_up)
            .await
        {
            self.refund_main(user_id, round_up, "round-up savings credit failed").await;
            return skipped(e.to_string());
        }

        let entry = NewTransaction::new(user_id, Decimal::from(round_up.minor_units()), TransactionDetails::RoundUp)
            .with_round_up_details(RoundUpDetails {
                original_amount: parent.amount,
                round_up_amount: round_up,
                round_up_rule: rule.increment_type,
                related_transaction_id: Some(parent.id),
            });
        let child = match self.writer.create(entry).await {
            Ok(child) => child,
            Err(e) => {
                self.reverse_round_up(user_id, round_up).await;
                return skipped(e.to_string());
            }
        };

        let link = RoundUpDetails {
            original_amount: parent.amount,
            round_up_amount: round_up,
            round_up_rule: rule.increment_type,
            related_transaction_id: Some(child.id),
        };
        let record_link = |tx: &mut Transaction| tx.round_up_details = Some(link.clone());
        match self.writer.save_if_pending(parent.id, &record_link).await {
            Ok(GuardedUpdate::Applied(saved)) => *parent = saved,
            Ok(GuardedUpdate::Skipped(current)) => {
                warn!(transaction_id = %parent.id, status = %current.status, "parent settled before the round-up was linked");
                *parent = current;
            }
            Err(e) => warn!(transaction_id = %parent.id, error = %e, "failed to link round-up on parent"),
        }

        if let Err(e) = self.stores.rules.record_round_up(user_id, round_up, self.clock.now()).await {
            warn!(user_id = %user_id, error = %e, "failed to update round-up totals");
        }

        info!(
            user_id = %user_id,
            transaction_id = %child.id,
            parent_id = %parent.id,
            amount = %round_up,
            "round-up applied"
        );
        RoundUpOutcome::Applied {
            transaction_id: child.id,
            amount: round_up,
        }
    }

    async fn reconcile_transfer(
        &self,
        transaction: Transaction,
        recipient_code: &str,
        reason: Option<String>,
        outcome: Result<TransferResult, GatewayError>,
    ) -> Result<(Transaction, GatewayOutcome), LedgerError> {
        let id = transaction.id;
        let reference = id.to_string();
        match outcome {
            Ok(result) if result.status == TransferStatus::Success => {
                match self
                    .settle_transfer_success(&reference, result.transfer_code.clone())
                    .await?
                {
                    Some(settled) => Ok((
                        settled,
                        GatewayOutcome::Completed {
                            transfer_code: result.transfer_code,
                        },
                    )),
                    None => settled_elsewhere(self.writer.get(id).await?),
                }
            }
            Ok(result) if result.status.is_definitive_failure() => {
                let message = format!("transfer {:?}", result.status).to_lowercase();
                match self.settle_transfer_failure(&reference, &message).await? {
                    Some(_) => Err(LedgerError::gateway_unavailable("initiate_transfer", message, false)),
                    None => settled_elsewhere(self.writer.get(id).await?),
                }
            }
            Ok(result) => {
                let transfer_code = result.transfer_code.clone();
                let record_code = |tx: &mut Transaction| tx.external_transaction_id = transfer_code.clone();
                if let GuardedUpdate::Skipped(current) = self.writer.save_if_pending(id, &record_code).await? {
                    return settled_elsewhere(current);
                }

                // Reconcile by polling if the settlement webhook never arrives.
                let action = RetryAction::VerifyTransfer {
                    transaction_id: id,
                    reference,
                    attempt: 1,
                };
                match self
                    .schedule_while_pending(id, &action, transaction.retry.count, false)
                    .await?
                {
                    Scheduled::Pending(transaction, job) => {
                        info!(
                            transaction_id = %id,
                            status = ?result.status,
                            verify_at = ?job.map(|job| job.run_at),
                            "transfer accepted, awaiting confirmation"
                        );
                        Ok((transaction, GatewayOutcome::Pending { status: result.status }))
                    }
                    Scheduled::Settled(current) => settled_elsewhere(current),
                }
            }
            Err(e) if e.is_definitive() => match self.settle_transfer_failure(&reference, &e.to_string()).await? {
                Some(_) => Err(e.into_ledger_error("initiate_transfer")),
                None => settled_elsewhere(self.writer.get(id).await?),
            },
            Err(e) => {
                let attempts = transaction.retry.count;
                let action = RetryAction::InitiateTransfer {
                    transaction_id: id,
                    reference,
                    recipient_code: recipient_code.to_string(),
                    amount: transaction.amount,
                    reason,
                    attempt: attempts + 1,
                };
                match self.schedule_while_pending(id, &action, attempts, true).await? {
                    Scheduled::Pending(transaction, Some(job)) => {
                        warn!(
                            transaction_id = %id,
                            error = %e,
                            retry_after = %job.run_at,
                            "gateway unavailable, transfer retry scheduled"
                        );
                        Ok((
                            transaction,
                            GatewayOutcome::RetryScheduled {
                                job_id: job.id,
                                retry_after: job.run_at,
                            },
                        ))
                    }
                    Scheduled::Pending(transaction, None) => Ok((
                        transaction,
                        GatewayOutcome::Pending {
                            status: TransferStatus::Pending,
                        },
                    )),
                    Scheduled::Settled(current) => settled_elsewhere(current),
                }
            }
        }
    }

    /// Schedule `action` and record the hint while `id` is still pending
    ///
    /// Money has already moved when this runs, so a scheduling failure is
    /// logged and the pending row is left for reconciliation instead of
    /// failing the call.
    async fn schedule_while_pending(
        &self,
        id: TransactionId,
        action: &RetryAction,
        retry_count: u32,
        count_attempt: bool,
    ) -> Result<Scheduled, LedgerError> {
        let job = match self.retries.schedule(action, retry_count).await {
            Ok(job) => job,
            Err(e) => {
                error!(transaction_id = %id, error = %e, "retry scheduling failed; needs reconciliation");
                let current = self.writer.get(id).await?;
                return Ok(match current.status {
                    TransactionStatus::Pending => Scheduled::Pending(current, None),
                    _ => Scheduled::Settled(current),
                });
            }
        };

        let run_at = job.run_at;
        let hint = |tx: &mut Transaction| {
            if count_attempt {
                tx.retry.count += 1;
            }
            tx.retry.next_attempt_at = Some(run_at);
        };
        match self.writer.save_if_pending(id, &hint).await? {
            GuardedUpdate::Applied(transaction) => Ok(Scheduled::Pending(transaction, Some(job))),
            GuardedUpdate::Skipped(current) => {
                // The settlement may have run before the job existed.
                if let Err(e) = self.retries.complete(&job.id).await {
                    warn!(transaction_id = %id, job_id = %job.id, error = %e, "failed to drop retry job");
                }
                Ok(Scheduled::Settled(current))
            }
        }
    }

    /// Complete a pending payment or transfer
    ///
    /// Returns `None` if the transaction had already settled.
    pub async fn settle_transfer_success(
        &self,
        reference: &str,
        transfer_code: Option<String>,
    ) -> Result<Option<Transaction>, LedgerError> {
        let id = parse_id(reference, "reference")?;
        let Some(mut transaction) = self
            .writer
            .claim(id, TransactionStatus::Pending, TransactionStatus::Completed)
            .await?
        else {
            return Ok(None);
        };

        if transfer_code.is_some() {
            transaction.external_transaction_id = transfer_code;
        }
        transaction.retry.next_attempt_at = None;
        let transaction = self.writer.save(transaction).await?;
        self.retries.complete(&RetryJob::id_for(id)).await?;
        info!(transaction_id = %id, "transfer completed");
        Ok(Some(transaction))
    }

    /// Fail a pending payment or transfer and credit the base amount back
    ///
    /// The compensating credit runs exactly once: only the caller that wins
    /// the pending-to-failed claim performs it. A round-up already moved to
    /// savings stays there. Returns `None` if the transaction had already
    /// settled.
    pub async fn settle_transfer_failure(&self, reference: &str, reason: &str) -> Result<Option<Transaction>, LedgerError> {
        let id = parse_id(reference, "reference")?;
        let Some(mut transaction) = self
            .writer
            .claim(id, TransactionStatus::Pending, TransactionStatus::Failed)
            .await?
        else {
            return Ok(None);
        };

        if matches!(
            transaction.transaction_type(),
            TransactionType::Payment | TransactionType::TransferOut | TransactionType::Withdrawal
        ) {
            if let Err(e) = self
                .ledger
                .credit(transaction.user_id, WalletType::Main, transaction.amount)
                .await
            {
                error!(
                    transaction_id = %id,
                    user_id = %transaction.user_id,
                    amount = %transaction.amount,
                    error = %e,
                    "compensating credit failed; needs reconciliation"
                );
                return Err(e);
            }
        }

        transaction.failure_reason = Some(reason.to_string());
        transaction.retry.next_attempt_at = None;
        let transaction = self.writer.save(transaction).await?;
        self.retries.complete(&RetryJob::id_for(id)).await?;
        warn!(
            transaction_id = %id,
            user_id = %transaction.user_id,
            amount = %transaction.amount,
            reason = %reason,
            "transfer failed, funds returned"
        );
        Ok(Some(transaction))
    }

    /// Start a deposit: record it as pending and open a gateway checkout
    ///
    /// Nothing is credited until the charge is confirmed.
    ///
    /// # Errors
    ///
    /// Limit and amount errors as for payments;
    /// [`LedgerError::GatewayUnavailable`] if no checkout could be opened,
    /// in which case the deposit is marked failed.
    pub async fn initialize_deposit(&self, user_id: UserId, amount: Decimal) -> Result<DepositCheckout, LedgerError> {
        let profile = self
            .stores
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("user", user_id))?;
        // The wallet must exist before money can land in it.
        self.ledger.get_wallet(user_id, WalletType::Main).await?;

        let entry = NewTransaction::new(
            user_id,
            amount,
            TransactionDetails::Deposit {
                email: profile.email.clone(),
                checkout_url: None,
                access_code: None,
            },
        );
        let transaction = self.writer.create(entry).await?;

        let request = InitializeTransaction {
            email: profile.email.clone(),
            amount: transaction.amount,
            reference: transaction.id.to_string(),
            currency: self.config.currency.clone(),
        };
        let session = match self
            .call_gateway("initialize_transaction", self.gateway.initialize_transaction(request))
            .await
        {
            Ok(session) => session,
            Err(e) => {
                self.fail_unfunded(&transaction, &e.to_string()).await;
                return Err(e.into_ledger_error("initialize_transaction"));
            }
        };

        let details = TransactionDetails::Deposit {
            email: profile.email,
            checkout_url: Some(session.authorization_url.clone()),
            access_code: Some(session.access_code.clone()),
        };
        let record = |tx: &mut Transaction| tx.details = details.clone();
        // A confirmation may already have landed; its row wins.
        let transaction = match self.writer.save_if_pending(transaction.id, &record).await? {
            GuardedUpdate::Applied(saved) | GuardedUpdate::Skipped(saved) => saved,
        };
        info!(transaction_id = %transaction.id, user_id = %user_id, amount = %transaction.amount, "deposit initialized");

        Ok(DepositCheckout {
            expires_at: self.clock.now() + self.config.gateway.checkout_ttl,
            transaction,
            authorization_url: session.authorization_url,
            access_code: session.access_code,
        })
    }

    /// Credit a confirmed deposit to the main wallet
    ///
    /// Repeated confirmations return the completed transaction without
    /// crediting again.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] if the reference is not a deposit or the
    ///   confirmed amount differs from the recorded one
    /// - [`LedgerError::InvalidStatusTransition`] if the deposit already failed
    pub async fn confirm_deposit(&self, reference: &str, amount: Money) -> Result<Transaction, LedgerError> {
        let id = parse_id(reference, "reference")?;
        let transaction = self.writer.get(id).await?;
        if transaction.transaction_type() != TransactionType::Deposit {
            return Err(LedgerError::validation(
                "reference",
                format!("{} is a {}, not a deposit", id, transaction.transaction_type()),
            ));
        }
        match transaction.status {
            TransactionStatus::Completed => return Ok(transaction),
            TransactionStatus::Pending => {}
            status => {
                return Err(LedgerError::invalid_status_transition(
                    id,
                    status,
                    TransactionStatus::Completed,
                ))
            }
        }
        if amount != transaction.amount {
            warn!(target: "security", transaction_id = %id, expected = %transaction.amount, received = %amount, "deposit amount mismatch");
            return Err(LedgerError::validation(
                "amount",
                format!("confirmed {} but deposit was for {}", amount, transaction.amount),
            ));
        }

        let Some(claimed) = self
            .writer
            .claim(id, TransactionStatus::Pending, TransactionStatus::Completed)
            .await?
        else {
            // A concurrent confirmation won the claim.
            return self.writer.get(id).await;
        };

        if let Err(e) = self
            .ledger
            .credit_with_settlement(claimed.user_id, WalletType::Main, claimed.amount)
            .await
        {
            error!(
                transaction_id = %id,
                user_id = %claimed.user_id,
                amount = %claimed.amount,
                error = %e,
                "deposit confirmed but credit failed; needs reconciliation"
            );
            return Err(e);
        }
        info!(transaction_id = %id, user_id = %claimed.user_id, amount = %claimed.amount, "deposit credited");
        Ok(claimed)
    }

    /// Ask the gateway about a deposit and settle it accordingly
    pub async fn verify_deposit(&self, reference: &str) -> Result<Transaction, LedgerError> {
        let id = parse_id(reference, "reference")?;
        let verification = self
            .call_gateway("verify_transaction", self.gateway.verify_transaction(reference))
            .await
            .map_err(|e| e.into_ledger_error("verify_transaction"))?;

        match verification.status {
            ChargeStatus::Success => self.confirm_deposit(reference, verification.amount).await,
            ChargeStatus::Failed | ChargeStatus::Abandoned => {
                if let Some(mut failed) = self
                    .writer
                    .claim(id, TransactionStatus::Pending, TransactionStatus::Failed)
                    .await?
                {
                    failed.failure_reason = Some(format!("charge {:?}", verification.status).to_lowercase());
                    return self.writer.save(failed).await;
                }
                self.writer.get(id).await
            }
            ChargeStatus::Pending | ChargeStatus::Unknown => self.writer.get(id).await,
        }
    }

    async fn call_gateway<T, F>(&self, operation: &str, call: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        match tokio::time::timeout(self.config.gateway.timeout, call).await {
            Ok(result) => {
                if let Err(e) = &result {
                    warn!(operation, error = %e, "gateway call failed");
                }
                result
            }
            Err(_) => {
                warn!(operation, timeout = ?self.config.gateway.timeout, "gateway call timed out");
                Err(GatewayError::Timeout)
            }
        }
    }

    /// Fail a pending transaction that never moved money
    async fn fail_unfunded(&self, transaction: &Transaction, reason: &str) {
        let claimed = self
            .writer
            .claim(transaction.id, TransactionStatus::Pending, TransactionStatus::Failed)
            .await;
        match claimed {
            Ok(Some(mut failed)) => {
                failed.failure_reason = Some(reason.to_string());
                if let Err(e) = self.writer.save(failed).await {
                    warn!(transaction_id = %transaction.id, error = %e, "failed to record failure reason");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(transaction_id = %transaction.id, error = %e, "failed to mark transaction failed"),
        }
    }

    async fn refund_main(&self, user_id: UserId, amount: Money, context: &str) {
        if let Err(e) = self.ledger.credit(user_id, WalletType::Main, amount).await {
            error!(user_id = %user_id, amount = %amount, error = %e, context, "refund to main wallet failed; needs reconciliation");
        }
    }

    async fn reverse_round_up(&self, user_id: UserId, amount: Money) {
        match self.ledger.debit(user_id, WalletType::Savings, amount).await {
            Ok(_) => self.refund_main(user_id, amount, "round-up record failed").await,
            Err(e) => error!(user_id = %user_id, amount = %amount, error = %e, "round-up moved but not recorded; needs reconciliation"),
        }
    }
}

/// Where a transfer stands after trying to schedule its follow-up
enum Scheduled {
    Pending(Transaction, Option<RetryJob>),
    Settled(Transaction),
}

/// Report a transfer that a concurrent settlement already finished
fn settled_elsewhere(current: Transaction) -> Result<(Transaction, GatewayOutcome), LedgerError> {
    match current.status {
        TransactionStatus::Completed => {
            info!(transaction_id = %current.id, "transfer already settled as completed");
            let transfer_code = current.external_transaction_id.clone();
            Ok((current, GatewayOutcome::Completed { transfer_code }))
        }
        TransactionStatus::Pending => Ok((
            current,
            GatewayOutcome::Pending {
                status: TransferStatus::Pending,
            },
        )),
        status => {
            let reason = current
                .failure_reason
                .unwrap_or_else(|| format!("transfer {}", status));
            Err(LedgerError::gateway_unavailable("initiate_transfer", reason, false))
        }
    }
}
