//! # splitpay-engine: Bill-Split & Settlement Operations
//!
//! The caller-facing layer of SplitPay: every operation a client invokes,
//! gated by the session state machine and reporting one error taxonomy.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SplitPay Call Flow                               │
//! │                                                                         │
//! │  Client (mobile app, HTTP handler, simulate)                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                splitpay-engine (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │  SplitEngine ──► splitpay-core rules ──► splitpay-db writes     │   │
//! │  │       │                                                         │   │
//! │  │       └──► PaymentProvider (charge dispatch, timed)             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Result<T, EngineError> ──► ApiError { code, message, retryable }       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use splitpay_engine::{EngineConfig, SplitEngine};
//!
//! let engine = SplitEngine::connect(EngineConfig::load(None)?).await?;
//! let session = engine.create_session(&Participant::new("ama", "Ama")).await?;
//! let (session, _) = engine.join_session(&session.join_code, &kofi).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod provider;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::EngineConfig;
pub use context::{Leaderboard, SessionContext};
pub use engine::{SettlementUpdate, SplitEngine};
pub use error::{ApiError, EngineError, EngineResult};
pub use provider::{ChargeReceipt, ChargeRequest, PaymentProvider, ProviderError, RecordingProvider};
