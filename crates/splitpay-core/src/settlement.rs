//! # Settlement Ledger
//!
//! Rules for payment records: who may request, how an outcome lands, and
//! what a participant's standing is.
//!
//! ## Record Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   request ──► ┌─────────┐  success  ┌──────┐                            │
//! │               │ Pending │ ────────► │ Paid │      (blocks new requests) │
//! │               │         │  failure  ┌────────┐                          │
//! │               └─────────┘ ────────► │ Failed │    (payer may retry)     │
//! │                                     └────────┘                          │
//! │                                                                         │
//! │   At most one Pending-or-Paid record per (session, payer).              │
//! │   A retry after Failed creates a NEW record.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An abandoned request stays `Pending`; a late provider callback still
//! resolves it.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{
    ParticipantPaymentStatus, PaymentMethod, PaymentRecord, PaymentStatus, Session,
};
use crate::validation::{validate_id, validate_payment_amount};

// =============================================================================
// Requests
// =============================================================================

/// Input for a new payment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub payer_id: String,
    pub payee_id: String,
    pub amount: Money,
    pub method: Option<PaymentMethod>,
}

impl PaymentRequest {
    pub fn new(payer_id: impl Into<String>, payee_id: impl Into<String>, amount: Money) -> Self {
        PaymentRequest {
            payer_id: payer_id.into(),
            payee_id: payee_id.into(),
            amount,
            method: None,
        }
    }

    pub fn with_method(mut self, method: PaymentMethod) -> Self {
        self.method = Some(method);
        self
    }
}

/// Checks a request against the session without looking at existing records.
///
/// Payer and payee must both be members. Payer may equal payee, which is
/// how the creator settles their own share.
pub fn check_request(session: &Session, request: &PaymentRequest) -> CoreResult<()> {
    validate_id("payer_id", &request.payer_id)?;
    validate_id("payee_id", &request.payee_id)?;
    validate_payment_amount(request.amount)?;

    for participant in [&request.payer_id, &request.payee_id] {
        if !session.is_member(participant) {
            return Err(CoreError::not_found(
                format!("member of session {}", session.id),
                participant.clone(),
            ));
        }
    }
    Ok(())
}

/// Fails with `Conflict` if `payer_id` already has a pending or paid record.
pub fn ensure_no_active(records: &[PaymentRecord], payer_id: &str) -> CoreResult<()> {
    if let Some(active) = records
        .iter()
        .find(|r| r.payer_id == payer_id && r.status.is_active())
    {
        return Err(CoreError::Conflict(format!(
            "payer {} already has a {} payment ({})",
            payer_id,
            status_label(active.status),
            active.id
        )));
    }
    Ok(())
}

/// Builds a fresh `Pending` record for an accepted request.
pub fn new_pending(
    session: &Session,
    request: &PaymentRequest,
    now: DateTime<Utc>,
) -> PaymentRecord {
    PaymentRecord {
        id: Uuid::new_v4().to_string(),
        session_id: session.id.clone(),
        payer_id: request.payer_id.clone(),
        payee_id: request.payee_id.clone(),
        amount: request.amount,
        method: request.method,
        status: PaymentStatus::Pending,
        requested_at: now,
        paid_at: None,
        failed_at: None,
        version: 0,
    }
}

/// Full in-memory request: validate, enforce uniqueness, build the record.
pub fn request_payment(
    session: &Session,
    existing: &[PaymentRecord],
    request: &PaymentRequest,
    now: DateTime<Utc>,
) -> CoreResult<PaymentRecord> {
    check_request(session, request)?;
    ensure_no_active(existing, &request.payer_id)?;
    Ok(new_pending(session, request, now))
}

// =============================================================================
// Outcomes
// =============================================================================

/// Checks that an outcome can be applied to `record` at `at`.
pub fn check_outcome(record: &PaymentRecord, at: DateTime<Utc>) -> CoreResult<()> {
    if record.status != PaymentStatus::Pending {
        return Err(CoreError::invalid_state(
            "payment",
            record.id.clone(),
            format!("is already {}", status_label(record.status)),
        ));
    }
    if at < record.requested_at {
        return Err(ValidationError::InvalidFormat {
            field: "timestamp".to_string(),
            reason: "outcome cannot precede the payment request".to_string(),
        }
        .into());
    }
    Ok(())
}

/// Resolves a pending record to `Paid` or `Failed`.
///
/// `paid_at` is set only on success; the record is otherwise untouched on
/// error.
pub fn resolve(record: &mut PaymentRecord, success: bool, at: DateTime<Utc>) -> CoreResult<()> {
    check_outcome(record, at)?;
    if success {
        record.status = PaymentStatus::Paid;
        record.paid_at = Some(at);
    } else {
        record.status = PaymentStatus::Failed;
        record.failed_at = Some(at);
    }
    record.version += 1;
    Ok(())
}

// =============================================================================
// Standing
// =============================================================================

/// The payer's most recent record: latest `requested_at`, and for equal
/// timestamps the one listed last.
pub fn latest_record<'a>(
    records: &'a [PaymentRecord],
    payer_id: &str,
) -> Option<&'a PaymentRecord> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.payer_id == payer_id)
        .max_by_key(|(index, r)| (r.requested_at, *index))
        .map(|(_, r)| r)
}

/// Status of the most recent record, or `NoPaymentRequested`.
pub fn participant_status(records: &[PaymentRecord], payer_id: &str) -> ParticipantPaymentStatus {
    latest_record(records, payer_id)
        .map(|r| r.status.into())
        .unwrap_or(ParticipantPaymentStatus::NoPaymentRequested)
}

/// True when every current member has a `Paid` record for the session.
pub fn all_members_paid(session: &Session, records: &[PaymentRecord]) -> bool {
    !session.members.is_empty()
        && session.members.iter().all(|member| {
            records
                .iter()
                .any(|r| &r.payer_id == member && r.status == PaymentStatus::Paid)
        })
}

fn status_label(status: PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Pending => "pending",
        PaymentStatus::Paid => "paid",
        PaymentStatus::Failed => "failed",
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::session::{admit, new_session};
    use crate::types::SplitRates;
    use chrono::Duration;

    fn session() -> Session {
        let mut session = new_session(
            "ama",
            "PAY123".parse().unwrap(),
            SplitRates::default(),
            Utc::now(),
        );
        admit(&mut session, "kofi").unwrap();
        admit(&mut session, "esi").unwrap();
        session
    }

    fn request(payer: &str) -> PaymentRequest {
        PaymentRequest::new(payer, "ama", Money::from_minor(2500))
    }

    #[test]
    fn test_request_creates_pending() {
        let session = session();
        let now = Utc::now();
        let record = request_payment(&session, &[], &request("kofi"), now).unwrap();
        assert_eq!(record.status, PaymentStatus::Pending);
        assert_eq!(record.requested_at, now);
        assert!(record.paid_at.is_none());
    }

    #[test]
    fn test_request_validation() {
        let session = session();
        let negative = PaymentRequest::new("kofi", "ama", Money::from_minor(-100));
        assert_eq!(
            request_payment(&session, &[], &negative, Utc::now()).unwrap_err().kind(),
            ErrorKind::Validation
        );

        let nothing_owed = PaymentRequest::new("kofi", "ama", Money::zero());
        assert!(request_payment(&session, &[], &nothing_owed, Utc::now()).is_ok());

        let stranger = request("stranger");
        assert_eq!(
            request_payment(&session, &[], &stranger, Utc::now()).unwrap_err().kind(),
            ErrorKind::NotFound
        );

        let own_share = PaymentRequest::new("ama", "ama", Money::from_minor(100));
        assert!(request_payment(&session, &[], &own_share, Utc::now()).is_ok());
    }

    #[test]
    fn test_active_record_blocks_second_request() {
        let session = session();
        let first = request_payment(&session, &[], &request("kofi"), Utc::now()).unwrap();
        let err = request_payment(&session, &[first], &request("kofi"), Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_failed_record_allows_retry() {
        let session = session();
        let mut first = request_payment(&session, &[], &request("kofi"), Utc::now()).unwrap();
        resolve(&mut first, false, Utc::now()).unwrap();
        assert_eq!(first.status, PaymentStatus::Failed);
        assert!(first.paid_at.is_none());

        let retry = request_payment(&session, &[first.clone()], &request("kofi"), Utc::now());
        assert!(retry.is_ok());
        assert_ne!(retry.unwrap().id, first.id);
    }

    #[test]
    fn test_resolve_only_from_pending() {
        let session = session();
        let mut record = request_payment(&session, &[], &request("kofi"), Utc::now()).unwrap();
        resolve(&mut record, true, Utc::now()).unwrap();
        assert_eq!(record.status, PaymentStatus::Paid);
        assert!(record.paid_at.is_some());
        assert_eq!(record.version, 1);

        let err = resolve(&mut record, false, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(record.status, PaymentStatus::Paid);
    }

    #[test]
    fn test_outcome_cannot_precede_request() {
        let session = session();
        let now = Utc::now();
        let mut record = request_payment(&session, &[], &request("kofi"), now).unwrap();
        let err = resolve(&mut record, true, now - Duration::minutes(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(record.status, PaymentStatus::Pending);
    }

    #[test]
    fn test_participant_status_uses_latest_record() {
        let session = session();
        let start = Utc::now();
        assert_eq!(
            participant_status(&[], "kofi"),
            ParticipantPaymentStatus::NoPaymentRequested
        );

        let mut failed = request_payment(&session, &[], &request("kofi"), start).unwrap();
        resolve(&mut failed, false, start + Duration::minutes(1)).unwrap();
        let retry = request_payment(
            &session,
            &[failed.clone()],
            &request("kofi"),
            start + Duration::minutes(2),
        )
        .unwrap();

        let records = vec![retry, failed];
        assert_eq!(
            participant_status(&records, "kofi"),
            ParticipantPaymentStatus::Pending
        );
        assert_eq!(
            participant_status(&records, "esi"),
            ParticipantPaymentStatus::NoPaymentRequested
        );
    }

    #[test]
    fn test_all_members_paid() {
        let session = session();
        let mut records = Vec::new();
        for payer in ["ama", "kofi", "esi"] {
            let mut record =
                request_payment(&session, &records, &request(payer), Utc::now()).unwrap();
            assert!(!all_members_paid(&session, &records));
            resolve(&mut record, true, Utc::now()).unwrap();
            records.push(record);
        }
        assert!(all_members_paid(&session, &records));
    }
}
