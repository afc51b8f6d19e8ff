//! # Item Ledger
//!
//! Holds one receipt's line items and each item's ownership assignment.
//!
//! ## Assignment Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Request                     Accepted when                              │
//! │  ───────                     ─────────────                              │
//! │  Unassigned, []              always (clears the item)                   │
//! │  Exclusive,  [p]             exactly one participant, p is a member     │
//! │  Shared,     [p1, p2, ...]   two or more DISTINCT members               │
//! │                                                                         │
//! │  Anything else ──► ValidationError                                      │
//! │  Unknown item or non-member ──► NotFound                                │
//! │  Session finalized ──► InvalidState                                     │
//! │                                                                         │
//! │  The new assignment is fully built and checked BEFORE it replaces the   │
//! │  old one, so a rejected call leaves the prior assignment intact.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use chrono::Utc;
//! use splitpay_core::ledger::{AssignmentRequest, ItemLedger};
//! use splitpay_core::session::new_session;
//! use splitpay_core::{ItemDraft, Money, Receipt, SplitRates};
//!
//! let mut session = new_session("ama", "ABC123".parse().unwrap(), SplitRates::default(), Utc::now());
//! session.members.push("kofi".to_string());
//!
//! let receipt = Receipt {
//!     id: "r-1".into(),
//!     session_id: session.id.clone(),
//!     uploaded_by: "ama".into(),
//!     image_ref: None,
//!     created_at: Utc::now(),
//! };
//! let mut ledger = ItemLedger::new(receipt, Vec::new());
//! let added = ledger
//!     .add_items(&session, &[ItemDraft::new("Kelewele", Money::from_minor(1000))], Utc::now())
//!     .unwrap();
//! let item_id = added[0].id.clone();
//!
//! ledger
//!     .assign(&session, &item_id, &AssignmentRequest::shared(["ama", "kofi"]))
//!     .unwrap();
//!
//! let views: Vec<_> = ledger.assignments().collect();
//! assert_eq!(views[0].participants.len(), 2);
//! ```

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::session::ensure_open;
use crate::types::{Assignment, AssignmentMode, ItemDraft, LineItem, Receipt, Session};
use crate::validation::validate_item_drafts;

// =============================================================================
// Assignment Request
// =============================================================================

/// Caller input for `assign`: a mode plus the participants it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AssignmentRequest {
    pub mode: AssignmentMode,
    #[serde(default)]
    pub participants: Vec<String>,
}

impl AssignmentRequest {
    pub fn unassigned() -> Self {
        AssignmentRequest {
            mode: AssignmentMode::Unassigned,
            participants: Vec::new(),
        }
    }

    pub fn exclusive(participant: impl Into<String>) -> Self {
        AssignmentRequest {
            mode: AssignmentMode::Exclusive,
            participants: vec![participant.into()],
        }
    }

    pub fn shared<I, S>(participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AssignmentRequest {
            mode: AssignmentMode::Shared,
            participants: participants.into_iter().map(Into::into).collect(),
        }
    }
}

/// Turns a request into an `Assignment`, checking shape and membership.
///
/// Shape problems are `ValidationError`s; a participant outside the
/// session's member list is `NotFound`.
pub fn resolve_assignment(
    session: &Session,
    request: &AssignmentRequest,
) -> CoreResult<Assignment> {
    let count = request.participants.len();

    let assignment = match request.mode {
        AssignmentMode::Unassigned => {
            if count != 0 {
                return Err(wrong_count(request.mode, "no", count));
            }
            Assignment::Unassigned
        }
        AssignmentMode::Exclusive => {
            if count != 1 {
                return Err(wrong_count(request.mode, "exactly 1", count));
            }
            Assignment::Exclusive(request.participants[0].trim().to_string())
        }
        AssignmentMode::Shared => {
            if count < 2 {
                return Err(wrong_count(request.mode, "at least 2", count));
            }
            let mut seen = HashSet::with_capacity(count);
            let mut owners = Vec::with_capacity(count);
            for participant in &request.participants {
                let participant = participant.trim();
                if !seen.insert(participant) {
                    return Err(ValidationError::Duplicate {
                        field: "participants".to_string(),
                        value: participant.to_string(),
                    }
                    .into());
                }
                owners.push(participant.to_string());
            }
            Assignment::Shared(owners)
        }
    };

    for participant in assignment.participants() {
        if participant.is_empty() {
            return Err(ValidationError::Required {
                field: "participant".to_string(),
            }
            .into());
        }
        if !session.is_member(participant) {
            return Err(CoreError::not_found(
                format!("member of session {}", session.id),
                participant.clone(),
            ));
        }
    }

    Ok(assignment)
}

fn wrong_count(mode: AssignmentMode, expected: &str, actual: usize) -> CoreError {
    ValidationError::WrongParticipantCount {
        mode: mode.to_string(),
        expected: expected.to_string(),
        actual,
    }
    .into()
}

// =============================================================================
// Item Ledger
// =============================================================================

/// A receipt and its line items in creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemLedger {
    receipt: Receipt,
    items: Vec<LineItem>,
}

impl ItemLedger {
    /// Builds a ledger; items are put in creation order regardless of input order.
    pub fn new(receipt: Receipt, mut items: Vec<LineItem>) -> Self {
        items.sort_by_key(|item| item.position);
        ItemLedger { receipt, items }
    }

    pub fn receipt(&self) -> &Receipt {
        &self.receipt
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn item(&self, item_id: &str) -> CoreResult<&LineItem> {
        self.items
            .iter()
            .find(|item| item.id == item_id)
            .ok_or_else(|| CoreError::not_found("line item", item_id))
    }

    /// Builds line items for `drafts` without touching the ledger.
    ///
    /// Storage persists the returned items and then hands them back through
    /// `apply`; `add_items` does both steps in memory.
    pub fn stage_items(
        &self,
        session: &Session,
        drafts: &[ItemDraft],
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<LineItem>> {
        self.ensure_belongs_to(session)?;
        ensure_open(session)?;
        validate_item_drafts(self.items.len(), drafts)?;

        let next_position = self.items.last().map(|item| item.position + 1).unwrap_or(0);

        Ok(drafts
            .iter()
            .enumerate()
            .map(|(offset, draft)| LineItem {
                id: Uuid::new_v4().to_string(),
                receipt_id: self.receipt.id.clone(),
                name: draft.name.trim().to_string(),
                price: draft.price,
                assignment: Assignment::Unassigned,
                position: next_position + offset as i64,
                created_at: now,
                version: 0,
            })
            .collect())
    }

    /// Appends scanned items. Fails if the session is finalized or any
    /// price is negative; nothing is added on failure.
    pub fn add_items(
        &mut self,
        session: &Session,
        drafts: &[ItemDraft],
        now: DateTime<Utc>,
    ) -> CoreResult<&[LineItem]> {
        let staged = self.stage_items(session, drafts, now)?;
        let start = self.items.len();
        self.items.extend(staged);
        Ok(&self.items[start..])
    }

    /// Checks an assignment request against this ledger and the session,
    /// returning the assignment that `assign` would store.
    pub fn check_assignment(
        &self,
        session: &Session,
        item_id: &str,
        request: &AssignmentRequest,
    ) -> CoreResult<Assignment> {
        self.ensure_belongs_to(session)?;
        ensure_open(session)?;
        self.item(item_id)?;
        resolve_assignment(session, request)
    }

    /// Overwrites an item's assignment. On error the previous assignment is
    /// left as it was.
    pub fn assign(
        &mut self,
        session: &Session,
        item_id: &str,
        request: &AssignmentRequest,
    ) -> CoreResult<&LineItem> {
        let assignment = self.check_assignment(session, item_id, request)?;

        let item = self
            .items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| CoreError::not_found("line item", item_id))?;
        item.assignment = assignment;
        item.version += 1;
        Ok(item)
    }

    /// Replaces or inserts an item read back from storage.
    ///
    /// A copy older than the one held is ignored, so out-of-order refreshes
    /// never roll an assignment back.
    pub fn apply(&mut self, item: LineItem) -> bool {
        if item.receipt_id != self.receipt.id {
            return false;
        }

        match self.items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) if existing.version >= item.version => false,
            Some(existing) => {
                *existing = item;
                true
            }
            None => {
                self.items.push(item);
                self.items.sort_by_key(|item| item.position);
                true
            }
        }
    }

    /// Lazily walks `(item, mode, participants)` in creation order.
    ///
    /// Call again to restart; each call starts from the first item.
    pub fn assignments(&self) -> Assignments<'_> {
        Assignments {
            inner: self.items.iter(),
        }
    }

    /// Sum of every item's price: the receipt's nominal subtotal.
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(|item| item.price).sum()
    }

    /// Sum of prices of items that have an owner.
    pub fn assigned_total(&self) -> Money {
        self.items
            .iter()
            .filter(|item| item.assignment.is_assigned())
            .map(|item| item.price)
            .sum()
    }

    pub fn unassigned_items(&self) -> impl Iterator<Item = &LineItem> {
        self.items
            .iter()
            .filter(|item| !item.assignment.is_assigned())
    }

    fn ensure_belongs_to(&self, session: &Session) -> CoreResult<()> {
        if self.receipt.session_id != session.id {
            return Err(CoreError::not_found(
                format!("receipt in session {}", session.id),
                self.receipt.id.clone(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Assignment Iterator
// =============================================================================

/// One row of `ItemLedger::assignments`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentView<'a> {
    pub item: &'a LineItem,
    pub mode: AssignmentMode,
    pub participants: &'a [String],
}

/// Finite iterator over a ledger's assignments, in item creation order.
#[derive(Debug, Clone)]
pub struct Assignments<'a> {
    inner: std::slice::Iter<'a, LineItem>,
}

impl<'a> Iterator for Assignments<'a> {
    type Item = AssignmentView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|item| AssignmentView {
            item,
            mode: item.assignment.mode(),
            participants: item.assignment.participants(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Assignments<'_> {}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::session::{finalize, new_session};
    use crate::types::SplitRates;

    fn session_with(members: &[&str]) -> Session {
        let mut session = new_session(
            members[0],
            "TABLE1".parse().unwrap(),
            SplitRates::default(),
            Utc::now(),
        );
        for member in &members[1..] {
            session.members.push(member.to_string());
        }
        session
    }

    fn ledger_for(session: &Session, prices: &[i64]) -> ItemLedger {
        let receipt = Receipt {
            id: "r-1".to_string(),
            session_id: session.id.clone(),
            uploaded_by: session.creator_id.clone(),
            image_ref: Some("receipts/r-1.jpg".to_string()),
            created_at: Utc::now(),
        };
        let mut ledger = ItemLedger::new(receipt, Vec::new());
        let drafts: Vec<ItemDraft> = prices
            .iter()
            .enumerate()
            .map(|(i, p)| ItemDraft::new(format!("Item {}", i), Money::from_minor(*p)))
            .collect();
        ledger.add_items(session, &drafts, Utc::now()).unwrap();
        ledger
    }

    #[test]
    fn test_add_items_keeps_creation_order() {
        let session = session_with(&["ama"]);
        let mut ledger = ledger_for(&session, &[1000, 250]);
        ledger
            .add_items(&session, &[ItemDraft::new("Sobolo", Money::from_minor(500))], Utc::now())
            .unwrap();

        let positions: Vec<i64> = ledger.items().iter().map(|i| i.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(ledger.items()[2].name, "Sobolo");
        assert_eq!(ledger.subtotal().minor(), 1750);
    }

    #[test]
    fn test_add_items_rejects_negative_price() {
        let session = session_with(&["ama"]);
        let mut ledger = ledger_for(&session, &[1000]);

        let err = ledger
            .add_items(&session, &[ItemDraft::new("Discount", Money::from_minor(-100))], Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(ledger.items().len(), 1);
    }

    #[test]
    fn test_add_items_rejected_after_finalize() {
        let mut session = session_with(&["ama"]);
        let mut ledger = ledger_for(&session, &[1000]);
        finalize(&mut session, "ama", Utc::now()).unwrap();

        let err = ledger
            .add_items(&session, &[ItemDraft::new("Late", Money::from_minor(100))], Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_exclusive_needs_exactly_one() {
        let session = session_with(&["ama", "kofi"]);
        let mut ledger = ledger_for(&session, &[1000]);
        let id = ledger.items()[0].id.clone();

        let err = ledger
            .assign(
                &session,
                &id,
                &AssignmentRequest {
                    mode: AssignmentMode::Exclusive,
                    participants: vec!["ama".into(), "kofi".into()],
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        ledger
            .assign(&session, &id, &AssignmentRequest::exclusive("kofi"))
            .unwrap();
        assert_eq!(
            ledger.items()[0].assignment,
            Assignment::Exclusive("kofi".to_string())
        );
    }

    #[test]
    fn test_shared_needs_two_distinct_members() {
        let session = session_with(&["ama", "kofi"]);
        let mut ledger = ledger_for(&session, &[1000]);
        let id = ledger.items()[0].id.clone();

        let single = ledger.assign(&session, &id, &AssignmentRequest::shared(["ama"]));
        assert_eq!(single.unwrap_err().kind(), ErrorKind::Validation);

        let dup = ledger.assign(&session, &id, &AssignmentRequest::shared(["ama", "ama"]));
        assert_eq!(dup.unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_non_member_leaves_prior_assignment_intact() {
        let session = session_with(&["ama", "kofi"]);
        let mut ledger = ledger_for(&session, &[1000]);
        let id = ledger.items()[0].id.clone();

        ledger
            .assign(&session, &id, &AssignmentRequest::shared(["ama", "kofi"]))
            .unwrap();
        let before = ledger.items()[0].clone();

        let err = ledger
            .assign(&session, &id, &AssignmentRequest::shared(["ama", "stranger"]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(ledger.items()[0], before);
    }

    #[test]
    fn test_unknown_item_is_not_found() {
        let session = session_with(&["ama"]);
        let mut ledger = ledger_for(&session, &[1000]);
        let err = ledger
            .assign(&session, "nope", &AssignmentRequest::exclusive("ama"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_reassignment_overwrites_and_bumps_version() {
        let session = session_with(&["ama", "kofi", "esi"]);
        let mut ledger = ledger_for(&session, &[900]);
        let id = ledger.items()[0].id.clone();

        ledger
            .assign(&session, &id, &AssignmentRequest::exclusive("ama"))
            .unwrap();
        ledger
            .assign(&session, &id, &AssignmentRequest::shared(["kofi", "esi"]))
            .unwrap();

        let item = &ledger.items()[0];
        assert_eq!(item.version, 2);
        assert_eq!(item.assignment.participants(), &["kofi".to_string(), "esi".to_string()]);

        ledger
            .assign(&session, &id, &AssignmentRequest::unassigned())
            .unwrap();
        assert!(!ledger.items()[0].assignment.is_assigned());
    }

    #[test]
    fn test_assignments_iterator_is_restartable() {
        let session = session_with(&["ama", "kofi"]);
        let mut ledger = ledger_for(&session, &[100, 200, 300]);
        let second = ledger.items()[1].id.clone();
        ledger
            .assign(&session, &second, &AssignmentRequest::exclusive("kofi"))
            .unwrap();

        let first_pass: Vec<AssignmentMode> = ledger.assignments().map(|v| v.mode).collect();
        let second_pass: Vec<AssignmentMode> = ledger.assignments().map(|v| v.mode).collect();
        assert_eq!(first_pass, second_pass);
        assert_eq!(
            first_pass,
            vec![
                AssignmentMode::Unassigned,
                AssignmentMode::Exclusive,
                AssignmentMode::Unassigned
            ]
        );
        assert_eq!(ledger.assignments().len(), 3);
        assert_eq!(ledger.assigned_total().minor(), 200);
        assert_eq!(ledger.unassigned_items().count(), 2);
    }

    #[test]
    fn test_apply_ignores_stale_copies() {
        let session = session_with(&["ama", "kofi"]);
        let mut ledger = ledger_for(&session, &[100]);
        let id = ledger.items()[0].id.clone();
        let stale = ledger.items()[0].clone();

        ledger
            .assign(&session, &id, &AssignmentRequest::exclusive("kofi"))
            .unwrap();

        assert!(!ledger.apply(stale));
        assert!(ledger.items()[0].assignment.is_assigned());
    }
}
