//! # Domain Types
//!
//! Core domain types used throughout SplitPay.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Session      │   │    Receipt      │   │  PaymentRecord  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │◄──│  session_id     │   │  session_id     │       │
//! │  │  join_code      │   │  image_ref      │   │  payer / payee  │       │
//! │  │  members[]      │   └────────┬────────┘   │  amount         │       │
//! │  │  state          │            │            │  status         │       │
//! │  │  rates          │   ┌────────▼────────┐   │  requested_at   │       │
//! │  └─────────────────┘   │    LineItem     │   │  paid_at        │       │
//! │                        │  name, price    │   └─────────────────┘       │
//! │                        │  assignment     │                              │
//! │                        └─────────────────┘                              │
//! │                                                                         │
//! │  Derived (never stored): Obligation (split.rs), LeaderboardEntry        │
//! │  (ranking.rs)                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every persisted entity carries a `version` token. Storage bumps it on each
//! write; a write conditioned on a stale version fails with a conflict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Rates
// =============================================================================

/// A percentage represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000, so 1000 bps = 10% tax and 500 bps = 5%
/// service charge stay exact integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Rate(u32);

impl Rate {
    /// Upper bound accepted by validation (100%).
    pub const MAX_BPS: u32 = 10_000;

    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::zero()
    }
}

/// Tax and service rates applied to each participant's subtotal.
///
/// Defaults come from configuration and can be overridden per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SplitRates {
    pub tax: Rate,
    pub service: Rate,
}

impl SplitRates {
    pub const fn new(tax: Rate, service: Rate) -> Self {
        SplitRates { tax, service }
    }
}

impl Default for SplitRates {
    /// 10% tax, 5% service.
    fn default() -> Self {
        SplitRates {
            tax: Rate::from_bps(1000),
            service: Rate::from_bps(500),
        }
    }
}

// =============================================================================
// Participant
// =============================================================================

/// A diner. The id comes from the identity provider and is never minted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Participant {
    pub id: String,
    pub display_name: String,
    pub phone: Option<String>,
}

impl Participant {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Participant {
            id: id.into(),
            display_name: display_name.into(),
            phone: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }
}

// =============================================================================
// Session
// =============================================================================

/// Lifecycle state of a split session.
///
/// ```text
///   Open ──(creator finalizes | every member paid)──► Finalized   (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Accepting members, receipts and assignments.
    Open,
    /// Read-only except for payment status updates.
    Finalized,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Open
    }
}

/// One shared-bill event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Session {
    pub id: String,
    /// Six-character uppercase alphanumeric code people type to join.
    pub join_code: String,
    pub creator_id: String,
    /// Join order; the creator is always first.
    pub members: Vec<String>,
    pub state: SessionState,
    pub rates: SplitRates,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub finalized_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl Session {
    pub fn is_member(&self, participant_id: &str) -> bool {
        self.members.iter().any(|m| m == participant_id)
    }

    pub fn is_finalized(&self) -> bool {
        self.state == SessionState::Finalized
    }
}

// =============================================================================
// Receipt
// =============================================================================

/// A scanned receipt. Its nominal subtotal is the sum of its items' prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Receipt {
    pub id: String,
    pub session_id: String,
    pub uploaded_by: String,
    /// Reference to the source image held by the capture collaborator.
    pub image_ref: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Line Items
// =============================================================================

/// Who owns a line item.
///
/// Serialized as `{"mode": "shared", "participants": ["a", "b"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "mode", content = "participants", rename_all = "snake_case")]
pub enum Assignment {
    /// Nobody claimed it yet; it is left out of every subtotal.
    Unassigned,
    /// One participant pays the full price.
    Exclusive(String),
    /// Two or more participants split the price; order drives remainder
    /// distribution.
    Shared(Vec<String>),
}

impl Assignment {
    pub fn mode(&self) -> AssignmentMode {
        match self {
            Assignment::Unassigned => AssignmentMode::Unassigned,
            Assignment::Exclusive(_) => AssignmentMode::Exclusive,
            Assignment::Shared(_) => AssignmentMode::Shared,
        }
    }

    /// Participants in assignment order (empty when unassigned).
    pub fn participants(&self) -> &[String] {
        match self {
            Assignment::Unassigned => &[],
            Assignment::Exclusive(owner) => std::slice::from_ref(owner),
            Assignment::Shared(owners) => owners,
        }
    }

    pub fn is_assigned(&self) -> bool {
        !matches!(self, Assignment::Unassigned)
    }
}

impl Default for Assignment {
    fn default() -> Self {
        Assignment::Unassigned
    }
}

/// The mode half of an assignment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMode {
    Unassigned,
    Exclusive,
    Shared,
}

impl std::fmt::Display for AssignmentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignmentMode::Unassigned => write!(f, "unassigned"),
            AssignmentMode::Exclusive => write!(f, "exclusive"),
            AssignmentMode::Shared => write!(f, "shared"),
        }
    }
}

/// One priced entry from a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineItem {
    pub id: String,
    pub receipt_id: String,
    pub name: String,
    #[ts(as = "String")]
    pub price: Money,
    pub assignment: Assignment,
    /// Creation order within the receipt.
    pub position: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    pub version: i64,
}

/// A `{name, price}` pair as supplied by the capture/OCR collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ItemDraft {
    pub name: String,
    #[ts(as = "String")]
    pub price: Money,
}

impl ItemDraft {
    pub fn new(name: impl Into<String>, price: Money) -> Self {
        ItemDraft {
            name: name.into(),
            price,
        }
    }
}

// =============================================================================
// Payments
// =============================================================================

/// Status of a single payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Charge requested, no outcome yet.
    Pending,
    /// Provider confirmed the charge.
    Paid,
    /// Provider rejected the charge; a new request may be made.
    Failed,
}

impl PaymentStatus {
    /// Pending and Paid records block a new request for the same payer.
    pub fn is_active(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Paid)
    }
}

/// Mobile money and card rails the provider collaborator can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    MtnMobileMoney,
    VodafoneCash,
    GhanaPay,
    Paystack,
    Flutterwave,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PaymentMethod::MtnMobileMoney => "MTN Mobile Money",
            PaymentMethod::VodafoneCash => "Vodafone Cash",
            PaymentMethod::GhanaPay => "GhanaPay",
            PaymentMethod::Paystack => "Paystack",
            PaymentMethod::Flutterwave => "Flutterwave",
        };
        f.write_str(label)
    }
}

/// One payment attempt from a payer to the session's collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentRecord {
    pub id: String,
    pub session_id: String,
    pub payer_id: String,
    /// The creator or a designated collector.
    pub payee_id: String,
    #[ts(as = "String")]
    pub amount: Money,
    pub method: Option<PaymentMethod>,
    pub status: PaymentStatus,
    #[ts(as = "String")]
    pub requested_at: DateTime<Utc>,
    /// Set only when the charge succeeded.
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub failed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

/// A participant's payment standing: the latest record's status, or
/// `NoPaymentRequested` when there is none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantPaymentStatus {
    NoPaymentRequested,
    Pending,
    Paid,
    Failed,
}

impl From<PaymentStatus> for ParticipantPaymentStatus {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Pending => ParticipantPaymentStatus::Pending,
            PaymentStatus::Paid => ParticipantPaymentStatus::Paid,
            PaymentStatus::Failed => ParticipantPaymentStatus::Failed,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
