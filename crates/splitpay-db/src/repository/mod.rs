//! # Repository Module
//!
//! Database repository implementations for SplitPay.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  SplitEngine operation                                                  │
//! │       │                                                                 │
//! │       │  db.payments().insert_pending(&record)                          │
//! │       ▼                                                                 │
//! │  PaymentRepository                                                      │
//! │  ├── insert_pending(&self, record)                                      │
//! │  ├── resolve(&self, id, expected_version, success, at)                  │
//! │  └── list_for_session(&self, session_id)                                │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! │                                                                         │
//! │  Every write returns the entity as stored, so callers never need a      │
//! │  follow-up read to learn the new version.                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ParticipantRepository`](participant::ParticipantRepository) - Profiles
//! - [`SessionRepository`](session::SessionRepository) - Sessions, members, join codes
//! - [`ReceiptRepository`](receipt::ReceiptRepository) - Receipts, items, assignments
//! - [`PaymentRepository`](payment::PaymentRepository) - Payment records

pub mod participant;
pub mod payment;
pub mod receipt;
pub mod session;
