//! # splitpay-core: Pure Rules for SplitPay
//!
//! This crate is the **heart** of SplitPay. It holds the bill-split and
//! settlement rules as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SplitPay Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 splitpay-engine (operations)                    │   │
//! │  │   create/join session ─► add items ─► assign ─► pay ─► rank     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ splitpay-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────────┐   │   │
//! │  │   │  money   │  │  ledger  │  │  split   │  │   session    │   │   │
//! │  │   │  Money   │  │ ItemLedg │  │Obligation│  │  JoinCode    │   │   │
//! │  │   └──────────┘  └──────────┘  └──────────┘  └──────────────┘   │   │
//! │  │   ┌──────────────┐  ┌──────────┐  ┌─────────────────────────┐  │   │
//! │  │   │  settlement  │  │ ranking  │  │ types / validation      │  │   │
//! │  │   │ PaymentRecord│  │Leaderbrd │  │ error                   │  │   │
//! │  │   └──────────────┘  └──────────┘  └─────────────────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                splitpay-db (storage collaborator)               │   │
//! │  │          SQLite queries, migrations, version tokens             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer minor-unit money with exact equal division
//! - [`types`] - Domain types (Session, Receipt, LineItem, PaymentRecord)
//! - [`ledger`] - Item Ledger: line items and their assignments
//! - [`split`] - Split Calculator: per-participant obligations
//! - [`session`] - Session State Machine and join codes
//! - [`settlement`] - Settlement Ledger rules
//! - [`ranking`] - Ranking Engine: leaderboard and reward tiers
//! - [`error`] - Error taxonomy
//! - [`validation`] - Input shape checks
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input, same output; time is passed in
//! 2. **No I/O**: storage and providers live in other crates
//! 3. **Integer Money**: minor units (pesewas) in an i64, never floats
//! 4. **Explicit Errors**: every failure is a typed `CoreError`
//!
//! ## Example Usage
//!
//! ```rust
//! use splitpay_core::money::Money;
//!
//! let platter: Money = "10.00".parse().unwrap();
//! let shares = platter.divide_equally(3);
//!
//! let printed: Vec<String> = shares.iter().map(|s| s.to_string()).collect();
//! assert_eq!(printed, vec!["3.34", "3.33", "3.33"]);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod money;
pub mod ranking;
pub mod session;
pub mod settlement;
pub mod split;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use ledger::{AssignmentRequest, ItemLedger};
pub use money::Money;
pub use ranking::{LeaderboardEntry, LeaderboardSummary, RewardPolicy, RewardTier};
pub use session::{Admission, JoinCode};
pub use settlement::PaymentRequest;
pub use split::{Obligation, ObligationReport};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Longest accepted item or display name, in characters.
pub const MAX_NAME_LEN: usize = 200;

/// Most items accepted in one `add_items` batch.
///
/// ## Business Reason
/// A restaurant receipt longer than this is almost certainly an OCR misread.
pub const MAX_ITEMS_PER_RECEIPT: usize = 200;
