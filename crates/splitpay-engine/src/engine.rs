//! # Split Engine
//!
//! Request/response operations over shared session state.
//!
//! ## Operation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SplitEngine operation                            │
//! │                                                                         │
//! │  1. Read current state          db.sessions().get_by_id(..)            │
//! │        │                        (bounded by storage timeout)            │
//! │        ▼                                                                │
//! │  2. Check the rule              splitpay_core::{ledger, session,        │
//! │        │                        settlement}  → fail fast, no write      │
//! │        ▼                                                                │
//! │  3. Conditional write           UPDATE ... WHERE version = ? AND        │
//! │        │                        state = 'open'   / unique index         │
//! │        ▼                                                                │
//! │  4. Return the stored entity    caller applies it to its context       │
//! │                                                                         │
//! │  Step 2 gives precise errors; step 3 is what actually holds under      │
//! │  concurrency. A write that loses a race surfaces as Conflict or        │
//! │  InvalidState, never as a silent overwrite.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here retries. A timed-out `request_payment` may or may not have
//! landed; the caller re-reads before trying again.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use tracing::{debug, info, warn};
use uuid::Uuid;

use splitpay_core::ledger::AssignmentRequest;
use splitpay_core::session::{
    check_admission, ensure_can_finalize, ensure_open, ensure_rates_editable, new_session,
};
use splitpay_core::settlement::{check_outcome, check_request, new_pending, participant_status};
use splitpay_core::split::{compute_obligations, compute_session_obligations};
use splitpay_core::validation::{validate_display_name, validate_id, validate_rates};
use splitpay_core::{
    Admission, ItemDraft, ItemLedger, JoinCode, LineItem, ObligationReport, Participant,
    ParticipantPaymentStatus, PaymentMethod, PaymentRecord, PaymentRequest, PaymentStatus,
    Receipt, Session, SplitRates,
};
use splitpay_db::{Database, DbError, DbResult};

use crate::config::EngineConfig;
use crate::context::{Leaderboard, SessionContext};
use crate::error::{EngineError, EngineResult};
use crate::provider::{ChargeReceipt, ChargeRequest, PaymentProvider};

/// Result of `record_outcome`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementUpdate {
    pub record: PaymentRecord,
    /// True when this outcome was the last payment the session waited on.
    pub session_finalized: bool,
}

/// The bill-split and settlement engine.
///
/// Cheap to clone; clones share the database pool.
#[derive(Debug, Clone)]
pub struct SplitEngine {
    db: Database,
    config: EngineConfig,
}

impl SplitEngine {
    pub fn new(db: Database, config: EngineConfig) -> Self {
        SplitEngine { db, config }
    }

    /// Opens the configured database and builds an engine on it.
    pub async fn connect(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let db = Database::new(config.db_config()).await?;
        Ok(SplitEngine::new(db, config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Opens a session with `creator` as its only member.
    ///
    /// A join code that collides with an existing one is redrawn, up to
    /// `sessions.join_code_attempts` times.
    pub async fn create_session(&self, creator: &Participant) -> EngineResult<Session> {
        validate_participant(creator)?;
        let now = Utc::now();

        self.storage("upsert_participant", self.db.participants().upsert(creator, now))
            .await?;

        let attempts = self.config.sessions.join_code_attempts;
        for attempt in 1..=attempts {
            let session = new_session(
                &creator.id,
                JoinCode::generate(),
                self.config.split_rates(),
                now,
            );

            match self
                .timed("create_session", self.db.sessions().insert(&session))
                .await?
            {
                Ok(stored) => return Ok(stored),
                Err(e) if e.is_unique_violation_on("sessions.join_code") => {
                    debug!(
                        attempt,
                        join_code = %session.join_code,
                        "Join code taken, drawing again"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(attempts, "Could not allocate a free join code");
        Err(EngineError::Conflict(format!(
            "no free join code after {} attempts",
            attempts
        )))
    }

    /// Adds `participant` to the session behind `join_code`.
    ///
    /// Joining twice is idempotent and reports `AlreadyMember`.
    pub async fn join_session(
        &self,
        join_code: &str,
        participant: &Participant,
    ) -> EngineResult<(Session, Admission)> {
        validate_participant(participant)?;

        // A malformed code cannot resolve to any session.
        let code: JoinCode = join_code
            .parse()
            .map_err(|_| EngineError::not_found("Session with join code", join_code.trim()))?;

        let session = self
            .storage("get_session_by_code", self.db.sessions().get_by_join_code(code.as_str()))
            .await?
            .ok_or_else(|| EngineError::not_found("Session with join code", code.as_str()))?;

        check_admission(&session, &participant.id)?;

        let now = Utc::now();
        self.storage("upsert_participant", self.db.participants().upsert(participant, now))
            .await?;

        let (session, admission) = self
            .storage(
                "add_member",
                self.db.sessions().add_member(&session.id, &participant.id, now),
            )
            .await?;

        Ok((session, admission))
    }

    /// Explicit finalization by the session's creator.
    pub async fn finalize_session(
        &self,
        session_id: &str,
        actor_id: &str,
    ) -> EngineResult<Session> {
        let session = self.require_session(session_id).await?;
        ensure_can_finalize(&session, actor_id)?;

        let (session, transitioned) = self
            .storage("finalize_session", self.db.sessions().finalize(session_id, Utc::now()))
            .await?;

        if !transitioned {
            return Err(EngineError::InvalidState {
                entity: "session".into(),
                id: session_id.into(),
                reason: "is already finalized".into(),
            });
        }
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str) -> EngineResult<Session> {
        self.require_session(session_id).await
    }

    /// Every session `participant_id` belongs to, newest first.
    pub async fn sessions_for(&self, participant_id: &str) -> EngineResult<Vec<Session>> {
        validate_id("participant_id", participant_id)?;
        self.storage(
            "list_sessions",
            self.db.sessions().list_for_participant(participant_id),
        )
        .await
    }

    /// Overrides the session's tax and service rates while it is open.
    pub async fn set_session_rates(
        &self,
        session_id: &str,
        rates: SplitRates,
        expected_version: i64,
    ) -> EngineResult<Session> {
        validate_rates(&rates)?;
        let session = self.require_session(session_id).await?;
        ensure_rates_editable(&session)?;

        self.storage(
            "update_rates",
            self.db.sessions().update_rates(session_id, rates, expected_version),
        )
        .await
    }

    // =========================================================================
    // Receipts & Items
    // =========================================================================

    /// Registers an uploaded receipt image. The uploader must be a member.
    pub async fn create_receipt(
        &self,
        session_id: &str,
        uploaded_by: &str,
        image_ref: Option<String>,
    ) -> EngineResult<Receipt> {
        validate_id("uploaded_by", uploaded_by)?;
        let session = self.require_session(session_id).await?;
        ensure_open(&session)?;
        if !session.is_member(uploaded_by) {
            return Err(EngineError::not_found(
                format!("member of session {}", session_id),
                uploaded_by,
            ));
        }

        let receipt = Receipt {
            id: Uuid::new_v4().to_string(),
            session_id: session.id.clone(),
            uploaded_by: uploaded_by.to_string(),
            image_ref,
            created_at: Utc::now(),
        };

        let stored = self
            .storage("insert_receipt", self.db.receipts().insert(&receipt))
            .await?;
        info!(receipt_id = %stored.id, session_id, "Receipt created");
        Ok(stored)
    }

    /// Appends scanned items to a receipt.
    pub async fn add_items(
        &self,
        receipt_id: &str,
        drafts: &[ItemDraft],
    ) -> EngineResult<Vec<LineItem>> {
        let ledger = self.require_ledger(receipt_id).await?;
        let session = self.require_session(&ledger.receipt().session_id).await?;

        let staged = ledger.stage_items(&session, drafts, Utc::now())?;
        let stored = self
            .storage("insert_items", self.db.receipts().insert_items(receipt_id, &staged))
            .await?;

        debug!(receipt_id, count = stored.len(), "Items added");
        Ok(stored)
    }

    /// Replaces an item's assignment.
    ///
    /// With `expected_version` the write only lands on that version of the
    /// item; with `None` the last committed write wins.
    pub async fn assign_item(
        &self,
        item_id: &str,
        request: &AssignmentRequest,
        expected_version: Option<i64>,
    ) -> EngineResult<LineItem> {
        let item = self
            .storage("get_item", self.db.receipts().get_item(item_id))
            .await?
            .ok_or_else(|| EngineError::not_found("Line item", item_id))?;
        let ledger = self.require_ledger(&item.receipt_id).await?;
        let session = self.require_session(&ledger.receipt().session_id).await?;

        let assignment = ledger.check_assignment(&session, item_id, request)?;

        let stored = self
            .storage(
                "update_assignment",
                self.db
                    .receipts()
                    .update_assignment(item_id, &assignment, expected_version),
            )
            .await?;

        debug!(
            item_id,
            receipt_id = %stored.receipt_id,
            mode = %stored.assignment.mode(),
            version = stored.version,
            "Item assigned"
        );
        Ok(stored)
    }

    /// The receipt's ledger; walk it with `ItemLedger::assignments`.
    pub async fn list_assignments(&self, receipt_id: &str) -> EngineResult<ItemLedger> {
        self.require_ledger(receipt_id).await
    }

    // =========================================================================
    // Obligations
    // =========================================================================

    /// Obligations for one receipt, at `rates` or else the session's rates.
    pub async fn compute_obligations(
        &self,
        receipt_id: &str,
        rates: Option<SplitRates>,
    ) -> EngineResult<ObligationReport> {
        let ledger = self.require_ledger(receipt_id).await?;
        let rates = match rates {
            Some(rates) => {
                validate_rates(&rates)?;
                rates
            }
            None => self.require_session(&ledger.receipt().session_id).await?.rates,
        };

        let report = compute_obligations(&ledger, &rates);
        log_unassigned(&report, &ledger.receipt().session_id);
        Ok(report)
    }

    /// Obligations across every receipt of the session, at the session's rates.
    pub async fn session_obligations(&self, session_id: &str) -> EngineResult<ObligationReport> {
        let session = self.require_session(session_id).await?;
        let ledgers = self
            .storage("load_ledgers", self.db.receipts().load_session_ledgers(session_id))
            .await?;

        let report = compute_session_obligations(&ledgers, &session.rates);
        log_unassigned(&report, session_id);
        Ok(report)
    }

    // =========================================================================
    // Settlement
    // =========================================================================

    /// Opens a `Pending` payment record.
    ///
    /// Fails with `Conflict` if the payer already has a pending or paid
    /// record in the session; the unique index decides races.
    pub async fn request_payment(
        &self,
        session_id: &str,
        request: &PaymentRequest,
    ) -> EngineResult<PaymentRecord> {
        let session = self.require_session(session_id).await?;
        check_request(&session, request)?;

        let record = new_pending(&session, request, Utc::now());
        match self
            .timed("request_payment", self.db.payments().insert_pending(&record))
            .await?
        {
            Ok(stored) => Ok(stored),
            Err(e) if e.is_unique_violation_on("payments.payer_id") => {
                Err(EngineError::Conflict(format!(
                    "payer {} already has an active payment in session {}",
                    request.payer_id, session_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Requests the payer's computed session total, payable to the creator.
    pub async fn request_obligation_payment(
        &self,
        session_id: &str,
        payer_id: &str,
        method: Option<PaymentMethod>,
    ) -> EngineResult<PaymentRecord> {
        let session = self.require_session(session_id).await?;
        let report = self.session_obligations(session_id).await?;

        let mut request = PaymentRequest::new(
            payer_id,
            session.creator_id.clone(),
            report.total_of(payer_id),
        );
        request.method = method;

        self.request_payment(session_id, &request).await
    }

    /// Hands a pending record to the payment provider.
    ///
    /// Acceptance by the provider does not settle anything; the outcome
    /// arrives later through `record_outcome`.
    pub async fn submit_charge<P: PaymentProvider>(
        &self,
        provider: &P,
        record_id: &str,
    ) -> EngineResult<ChargeReceipt> {
        let record = self.require_payment(record_id).await?;
        if record.status != PaymentStatus::Pending {
            return Err(EngineError::InvalidState {
                entity: "payment".into(),
                id: record_id.into(),
                reason: "is no longer pending".into(),
            });
        }

        let limit = self.config.provider_timeout();
        match tokio::time::timeout(limit, provider.charge(ChargeRequest::from(&record))).await {
            Ok(Ok(receipt)) => {
                info!(record_id, provider_ref = %receipt.provider_ref, "Charge submitted");
                Ok(receipt)
            }
            Ok(Err(e)) => {
                warn!(record_id, error = %e, "Charge not accepted");
                Err(e.into())
            }
            Err(_) => {
                warn!(
                    record_id,
                    timeout_ms = self.config.provider.timeout_ms,
                    "Payment provider timed out"
                );
                Err(EngineError::timeout("submit_charge", self.config.provider.timeout_ms))
            }
        }
    }

    /// Applies a provider outcome to a pending record.
    ///
    /// A success that leaves every member paid finalizes the session.
    pub async fn record_outcome(
        &self,
        record_id: &str,
        success: bool,
        at: DateTime<Utc>,
    ) -> EngineResult<SettlementUpdate> {
        let record = self.require_payment(record_id).await?;
        check_outcome(&record, at)?;

        let (record, session_finalized) = self
            .storage(
                "resolve_payment",
                self.db.payments().resolve(record_id, record.version, success, at),
            )
            .await?;

        info!(
            record_id,
            session_id = %record.session_id,
            payer = %record.payer_id,
            success,
            session_finalized,
            "Payment settled"
        );
        Ok(SettlementUpdate {
            record,
            session_finalized,
        })
    }

    /// Status of the participant's most recent record in the session.
    pub async fn participant_status(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> EngineResult<ParticipantPaymentStatus> {
        self.require_session(session_id).await?;
        let records = self
            .storage(
                "list_payments",
                self.db.payments().list_for_payer(session_id, participant_id),
            )
            .await?;
        Ok(participant_status(&records, participant_id))
    }

    // =========================================================================
    // Ranking & Context
    // =========================================================================

    /// Ranks every member by payment speed, with the header summary.
    pub async fn build_leaderboard(&self, session_id: &str) -> EngineResult<Leaderboard> {
        Ok(self
            .load_context(session_id)
            .await?
            .leaderboard(&self.config.reward_policy()))
    }

    /// Snapshot of everything a client shows for one session.
    pub async fn load_context(&self, session_id: &str) -> EngineResult<SessionContext> {
        let session = self.require_session(session_id).await?;
        let members = self
            .storage("list_members", self.db.participants().members_of(session_id))
            .await?;
        let ledgers = self
            .storage("load_ledgers", self.db.receipts().load_session_ledgers(session_id))
            .await?;
        let payments = self
            .storage("list_payments", self.db.payments().list_for_session(session_id))
            .await?;

        Ok(SessionContext::new(session, members, ledgers, payments))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn require_session(&self, session_id: &str) -> EngineResult<Session> {
        validate_id("session_id", session_id)?;
        self.storage("get_session", self.db.sessions().get_by_id(session_id))
            .await?
            .ok_or_else(|| EngineError::not_found("Session", session_id))
    }

    async fn require_ledger(&self, receipt_id: &str) -> EngineResult<ItemLedger> {
        validate_id("receipt_id", receipt_id)?;
        self.storage("load_ledger", self.db.receipts().load_ledger(receipt_id))
            .await?
            .ok_or_else(|| EngineError::not_found("Receipt", receipt_id))
    }

    async fn require_payment(&self, record_id: &str) -> EngineResult<PaymentRecord> {
        validate_id("record_id", record_id)?;
        self.storage("get_payment", self.db.payments().get_by_id(record_id))
            .await?
            .ok_or_else(|| EngineError::not_found("Payment", record_id))
    }

    /// Runs a storage call under the storage timeout and maps its error.
    async fn storage<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = DbResult<T>>,
    ) -> EngineResult<T> {
        self.timed(operation, call).await?.map_err(EngineError::from)
    }

    /// Runs a storage call under the storage timeout, leaving its error
    /// for the caller to inspect.
    async fn timed<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, DbError>>,
    ) -> EngineResult<Result<T, DbError>> {
        let limit = self.config.storage_timeout();
        tokio::time::timeout(limit, call).await.map_err(|_| {
            warn!(operation, timeout_ms = self.config.storage.timeout_ms, "Storage call timed out");
            EngineError::timeout(operation, self.config.storage.timeout_ms)
        })
    }
}

fn validate_participant(participant: &Participant) -> EngineResult<()> {
    validate_id("participant_id", &participant.id)?;
    validate_display_name(&participant.display_name)?;
    Ok(())
}

fn log_unassigned(report: &ObligationReport, session_id: &str) {
    if report.has_unassigned() {
        warn!(
            session_id,
            unassigned = report.unassigned.len(),
            "Obligations undercount the receipt: items are unassigned"
        );
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
