//! # Payment Provider Seam
//!
//! The engine hands a charge to a provider and forgets about it. The outcome
//! comes back later, through whatever callback the provider uses, as a call
//! to `record_outcome`.
//!
//! ```text
//! request_payment ──► PaymentRecord (Pending)
//!        │
//!        ▼
//! submit_charge ──► PaymentProvider::charge ──► ChargeReceipt
//!                                                   │
//!            ... minutes or hours later ...         │
//!                                                   ▼
//! provider callback ──► record_outcome(record_id, success, at)
//! ```

use serde::{Deserialize, Serialize};
use splitpay_core::{Money, PaymentMethod, PaymentRecord};
use std::future::Future;
use std::sync::Mutex;
use thiserror::Error;
use ts_rs::TS;

/// What the provider is asked to collect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ChargeRequest {
    /// The payment record id; providers echo it back in their callback.
    pub reference: String,
    pub payer_id: String,
    pub payee_id: String,
    #[ts(as = "String")]
    pub amount: Money,
    pub method: Option<PaymentMethod>,
}

impl From<&PaymentRecord> for ChargeRequest {
    fn from(record: &PaymentRecord) -> Self {
        ChargeRequest {
            reference: record.id.clone(),
            payer_id: record.payer_id.clone(),
            payee_id: record.payee_id.clone(),
            amount: record.amount,
            method: record.method,
        }
    }
}

/// The provider's acknowledgement that a charge was accepted for processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ChargeReceipt {
    pub reference: String,
    /// The provider's own transaction id.
    pub provider_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider refused the charge (bad wallet number, unsupported method).
    #[error("{0}")]
    Rejected(String),

    /// The provider could not be reached or answered with a server error.
    #[error("{0}")]
    Unavailable(String),
}

/// A payment gateway (mobile money, card processor).
pub trait PaymentProvider: Send + Sync {
    fn charge(
        &self,
        request: ChargeRequest,
    ) -> impl Future<Output = Result<ChargeReceipt, ProviderError>> + Send;
}

// =============================================================================
// Recording Provider
// =============================================================================

/// Accepts every charge and remembers it. Used by `simulate` and tests.
#[derive(Debug, Default)]
pub struct RecordingProvider {
    charges: Mutex<Vec<ChargeRequest>>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every charge accepted so far, in submission order.
    pub fn charges(&self) -> Vec<ChargeRequest> {
        self.charges
            .lock()
            .map(|charges| charges.clone())
            .unwrap_or_default()
    }
}

impl PaymentProvider for RecordingProvider {
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, ProviderError> {
        let receipt = ChargeReceipt {
            reference: request.reference.clone(),
            provider_ref: format!("sim-{}", uuid::Uuid::new_v4().simple()),
        };
        self.charges
            .lock()
            .map_err(|_| ProviderError::Unavailable("provider state poisoned".into()))?
            .push(request);
        Ok(receipt)
    }
}
