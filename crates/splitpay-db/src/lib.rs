//! # splitpay-db: Storage Collaborator for SplitPay
//!
//! Persists sessions, receipts, line items and payment records in SQLite
//! with sqlx. Every mutable row carries a version token.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SplitPay Data Flow                               │
//! │                                                                         │
//! │  SplitEngine::request_payment                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   splitpay-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │   │   │
//! │  │   │               │    │ SessionRepo    │   │ 001_initial  │   │   │
//! │  │   │ SqlitePool    │◄───│ ReceiptRepo    │   │   _schema    │   │   │
//! │  │   │               │    │ PaymentRepo    │   │              │   │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use splitpay_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("splitpay.db")).await?;
//! let session = db.sessions().get_by_join_code("K7Q2ZD").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::participant::ParticipantRepository;
pub use repository::payment::PaymentRepository;
pub use repository::receipt::ReceiptRepository;
pub use repository::session::SessionRepository;
