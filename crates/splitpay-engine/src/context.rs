//! # Session Context
//!
//! An explicit, session-scoped snapshot a client holds between calls.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  engine.load_context(session_id) ──► SessionContext                    │
//! │                                        ├── session (+ version)         │
//! │                                        ├── members (profiles)          │
//! │                                        ├── ledgers (receipt + items)   │
//! │                                        └── payments                    │
//! │                                                                         │
//! │  engine.assign_item(..)   ──► LineItem      ──► ctx.apply_item(..)     │
//! │  engine.record_outcome(..) ─► PaymentRecord ──► ctx.apply_payment(..)  │
//! │                                                                         │
//! │  Every write returns the stored entity. `apply_*` keeps the newer of   │
//! │  the held copy and the incoming one, so late or duplicated refreshes   │
//! │  never roll state back.                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use splitpay_core::ranking::{build_leaderboard, summarize};
use splitpay_core::settlement::participant_status;
use splitpay_core::split::compute_session_obligations;
use splitpay_core::{
    ItemLedger, LeaderboardEntry, LeaderboardSummary, LineItem, ObligationReport, Participant,
    ParticipantPaymentStatus, PaymentRecord, RewardPolicy, Session,
};

#[derive(Debug, Clone)]
pub struct SessionContext {
    session: Session,
    members: Vec<Participant>,
    ledgers: Vec<ItemLedger>,
    payments: Vec<PaymentRecord>,
}

/// Leaderboard rows plus the header numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Leaderboard {
    pub entries: Vec<LeaderboardEntry>,
    pub summary: LeaderboardSummary,
}

impl SessionContext {
    pub fn new(
        session: Session,
        members: Vec<Participant>,
        ledgers: Vec<ItemLedger>,
        payments: Vec<PaymentRecord>,
    ) -> Self {
        SessionContext {
            session,
            members,
            ledgers,
            payments,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn members(&self) -> &[Participant] {
        &self.members
    }

    pub fn ledgers(&self) -> &[ItemLedger] {
        &self.ledgers
    }

    pub fn ledger(&self, receipt_id: &str) -> Option<&ItemLedger> {
        self.ledgers.iter().find(|l| l.receipt().id == receipt_id)
    }

    pub fn payments(&self) -> &[PaymentRecord] {
        &self.payments
    }

    // =========================================================================
    // Applying Writes
    // =========================================================================

    /// Takes `session` if it is the same session at a newer version.
    pub fn apply_session(&mut self, session: Session) -> bool {
        if session.id != self.session.id || session.version <= self.session.version {
            return false;
        }
        self.session = session;
        true
    }

    /// Adds a member profile, or refreshes the held one.
    pub fn apply_member(&mut self, participant: Participant) {
        match self.members.iter_mut().find(|m| m.id == participant.id) {
            Some(existing) => *existing = participant,
            None => self.members.push(participant),
        }
    }

    /// Adds a receipt's ledger not seen before. Known receipts are left alone;
    /// use `apply_item` for their items.
    pub fn apply_ledger(&mut self, ledger: ItemLedger) -> bool {
        if ledger.receipt().session_id != self.session.id
            || self.ledger(&ledger.receipt().id).is_some()
        {
            return false;
        }
        self.ledgers.push(ledger);
        true
    }

    /// Routes an item to its receipt's ledger. False for unknown receipts
    /// and for copies no newer than the one held.
    pub fn apply_item(&mut self, item: LineItem) -> bool {
        match self
            .ledgers
            .iter_mut()
            .find(|l| l.receipt().id == item.receipt_id)
        {
            Some(ledger) => ledger.apply(item),
            None => false,
        }
    }

    /// Inserts a new record or replaces an older version of a held one.
    pub fn apply_payment(&mut self, record: PaymentRecord) -> bool {
        if record.session_id != self.session.id {
            return false;
        }
        match self.payments.iter_mut().find(|p| p.id == record.id) {
            Some(existing) if existing.version >= record.version => false,
            Some(existing) => {
                *existing = record;
                true
            }
            None => {
                self.payments.push(record);
                true
            }
        }
    }

    // =========================================================================
    // Derived Views
    // =========================================================================

    /// Obligations across every receipt at the session's rates.
    pub fn obligations(&self) -> ObligationReport {
        compute_session_obligations(&self.ledgers, &self.session.rates)
    }

    pub fn participant_status(&self, participant_id: &str) -> ParticipantPaymentStatus {
        participant_status(&self.payments, participant_id)
    }

    pub fn leaderboard(&self, policy: &RewardPolicy) -> Leaderboard {
        let entries = build_leaderboard(&self.members, &self.payments, policy);
        let summary = summarize(&entries);
        Leaderboard { entries, summary }
    }
}
