//! # Split Calculator
//!
//! Derives each participant's subtotal, tax, service charge and total from
//! one or more item ledgers. Nothing here is stored; every call recomputes.
//!
//! ## Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  for each line item (creation order):                                   │
//! │     Exclusive(p)        → p += price                                    │
//! │     Shared([p1..pn])    → price.divide_equally(n), share[i] → pi        │
//! │     Unassigned          → nobody; reported as a warning                 │
//! │                                                                         │
//! │  for each participant:                                                  │
//! │     tax     = subtotal.apply_rate(tax_rate)       (half-up)             │
//! │     service = subtotal.apply_rate(service_rate)   (half-up)             │
//! │     total   = subtotal + tax + service                                  │
//! │                                                                         │
//! │  Σ subtotal == Σ price of assigned items    (exact, no leakage)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rates are applied to each participant's own subtotal, never to the
//! receipt total, so the result does not depend on rounding order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ledger::ItemLedger;
use crate::money::Money;
use crate::types::{Assignment, SplitRates};

// =============================================================================
// Results
// =============================================================================

/// One item's contribution to a participant's subtotal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ItemShare {
    pub receipt_id: String,
    pub item_id: String,
    pub name: String,
    #[ts(as = "String")]
    pub share: Money,
    /// How many participants split the item (1 for exclusive).
    pub split_ways: usize,
}

/// What one participant owes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Obligation {
    pub participant_id: String,
    #[ts(as = "String")]
    pub subtotal: Money,
    #[ts(as = "String")]
    pub tax: Money,
    #[ts(as = "String")]
    pub service: Money,
    #[ts(as = "String")]
    pub total: Money,
    pub items: Vec<ItemShare>,
}

impl Obligation {
    fn empty(participant_id: &str) -> Self {
        Obligation {
            participant_id: participant_id.to_string(),
            subtotal: Money::zero(),
            tax: Money::zero(),
            service: Money::zero(),
            total: Money::zero(),
            items: Vec::new(),
        }
    }
}

/// An item nobody owns yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UnassignedItem {
    pub receipt_id: String,
    pub item_id: String,
    pub name: String,
    #[ts(as = "String")]
    pub price: Money,
}

/// Obligations for every participant who owns at least one item, plus the
/// totals needed to check reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ObligationReport {
    pub rates: SplitRates,
    /// Keyed by participant id for deterministic iteration.
    pub obligations: BTreeMap<String, Obligation>,
    /// Sum of every item's price, assigned or not.
    #[ts(as = "String")]
    pub receipt_subtotal: Money,
    /// Sum of assigned items' prices; equals the sum of all subtotals.
    #[ts(as = "String")]
    pub assigned_total: Money,
    pub unassigned: Vec<UnassignedItem>,
}

impl ObligationReport {
    pub fn get(&self, participant_id: &str) -> Option<&Obligation> {
        self.obligations.get(participant_id)
    }

    /// Subtotal for a participant, zero if they own nothing.
    pub fn subtotal_of(&self, participant_id: &str) -> Money {
        self.get(participant_id)
            .map(|o| o.subtotal)
            .unwrap_or_default()
    }

    pub fn total_of(&self, participant_id: &str) -> Money {
        self.get(participant_id).map(|o| o.total).unwrap_or_default()
    }

    /// Sum of every participant's total (subtotals plus charges).
    pub fn grand_total(&self) -> Money {
        self.obligations.values().map(|o| o.total).sum()
    }

    pub fn has_unassigned(&self) -> bool {
        !self.unassigned.is_empty()
    }

    /// Human-readable notes about items left out of every subtotal.
    pub fn warnings(&self) -> Vec<String> {
        self.unassigned
            .iter()
            .map(|item| {
                format!(
                    "'{}' ({}) is not assigned to anyone and is not counted",
                    item.name, item.price
                )
            })
            .collect()
    }
}

// =============================================================================
// Computation
// =============================================================================

/// Computes obligations for a single receipt.
///
/// ```rust
/// use chrono::Utc;
/// use splitpay_core::ledger::{AssignmentRequest, ItemLedger};
/// use splitpay_core::session::new_session;
/// use splitpay_core::split::compute_obligations;
/// use splitpay_core::{ItemDraft, Money, Receipt, SplitRates};
///
/// let mut session = new_session("ama", "ABC123".parse().unwrap(), SplitRates::default(), Utc::now());
/// session.members.extend(["kofi".to_string(), "esi".to_string()]);
/// let receipt = Receipt {
///     id: "r-1".into(),
///     session_id: session.id.clone(),
///     uploaded_by: "ama".into(),
///     image_ref: None,
///     created_at: Utc::now(),
/// };
/// let mut ledger = ItemLedger::new(receipt, Vec::new());
/// let id = ledger
///     .add_items(&session, &[ItemDraft::new("Platter", Money::from_minor(1000))], Utc::now())
///     .unwrap()[0]
///     .id
///     .clone();
/// ledger
///     .assign(&session, &id, &AssignmentRequest::shared(["ama", "kofi", "esi"]))
///     .unwrap();
///
/// let report = compute_obligations(&ledger, &SplitRates::default());
/// assert_eq!(report.subtotal_of("ama").to_string(), "3.34");
/// assert_eq!(report.subtotal_of("kofi").to_string(), "3.33");
/// assert_eq!(report.assigned_total.to_string(), "10.00");
/// ```
pub fn compute_obligations(ledger: &ItemLedger, rates: &SplitRates) -> ObligationReport {
    compute_session_obligations(std::iter::once(ledger), rates)
}

/// Computes obligations across every receipt of a session.
///
/// Contributions from all ledgers are summed first; rates are applied once
/// per participant to the combined subtotal.
pub fn compute_session_obligations<'a, I>(ledgers: I, rates: &SplitRates) -> ObligationReport
where
    I: IntoIterator<Item = &'a ItemLedger>,
{
    let mut obligations: BTreeMap<String, Obligation> = BTreeMap::new();
    let mut receipt_subtotal = Money::zero();
    let mut assigned_total = Money::zero();
    let mut unassigned = Vec::new();

    for ledger in ledgers {
        let receipt_id = &ledger.receipt().id;

        for view in ledger.assignments() {
            let item = view.item;
            receipt_subtotal += item.price;

            match &item.assignment {
                Assignment::Unassigned => {
                    unassigned.push(UnassignedItem {
                        receipt_id: receipt_id.clone(),
                        item_id: item.id.clone(),
                        name: item.name.clone(),
                        price: item.price,
                    });
                }
                Assignment::Exclusive(_) | Assignment::Shared(_) => {
                    assigned_total += item.price;
                    let owners = view.participants;
                    let shares = item.price.divide_equally(owners.len());

                    for (owner, share) in owners.iter().zip(shares) {
                        let obligation = obligations
                            .entry(owner.clone())
                            .or_insert_with(|| Obligation::empty(owner));
                        obligation.subtotal += share;
                        obligation.items.push(ItemShare {
                            receipt_id: receipt_id.clone(),
                            item_id: item.id.clone(),
                            name: item.name.clone(),
                            share,
                            split_ways: owners.len(),
                        });
                    }
                }
            }
        }
    }

    for obligation in obligations.values_mut() {
        obligation.tax = obligation.subtotal.apply_rate(rates.tax);
        obligation.service = obligation.subtotal.apply_rate(rates.service);
        obligation.total = obligation.subtotal + obligation.tax + obligation.service;
    }

    ObligationReport {
        rates: *rates,
        obligations,
        receipt_subtotal,
        assigned_total,
        unassigned,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::AssignmentRequest;
    use crate::session::new_session;
    use crate::types::{ItemDraft, Rate, Receipt, Session};
    use chrono::Utc;
    use proptest::prelude::*;

    fn session_with(members: &[&str]) -> Session {
        let mut session = new_session(
            members[0],
            "SPLIT1".parse().unwrap(),
            SplitRates::default(),
            Utc::now(),
        );
        session
            .members
            .extend(members[1..].iter().map(|m| m.to_string()));
        session
    }

    fn ledger_with(session: &Session, receipt_id: &str, prices: &[i64]) -> ItemLedger {
        let receipt = Receipt {
            id: receipt_id.to_string(),
            session_id: session.id.clone(),
            uploaded_by: session.creator_id.clone(),
            image_ref: None,
            created_at: Utc::now(),
        };
        let mut ledger = ItemLedger::new(receipt, Vec::new());
        let drafts: Vec<ItemDraft> = prices
            .iter()
            .enumerate()
            .map(|(i, p)| ItemDraft::new(format!("Dish {}", i), Money::from_minor(*p)))
            .collect();
        ledger.add_items(session, &drafts, Utc::now()).unwrap();
        ledger
    }

    fn item_id(ledger: &ItemLedger, index: usize) -> String {
        ledger.items()[index].id.clone()
    }

    #[test]
    fn test_exclusive_and_shared_contributions() {
        let session = session_with(&["ama", "kofi", "esi"]);
        let mut ledger = ledger_with(&session, "r-1", &[4500, 1000, 300]);

        let (jollof, platter) = (item_id(&ledger, 0), item_id(&ledger, 1));
        ledger
            .assign(&session, &jollof, &AssignmentRequest::exclusive("kofi"))
            .unwrap();
        ledger
            .assign(&session, &platter, &AssignmentRequest::shared(["esi", "ama", "kofi"]))
            .unwrap();

        let report = compute_obligations(&ledger, &SplitRates::default());

        // esi is first in the shared list, so esi gets the extra pesewa
        assert_eq!(report.subtotal_of("esi").minor(), 334);
        assert_eq!(report.subtotal_of("ama").minor(), 333);
        assert_eq!(report.subtotal_of("kofi").minor(), 4500 + 333);

        assert_eq!(report.assigned_total.minor(), 5500);
        assert_eq!(report.receipt_subtotal.minor(), 5800);
        assert_eq!(report.unassigned.len(), 1);
        assert_eq!(report.warnings().len(), 1);
        assert_eq!(report.get("kofi").unwrap().items.len(), 2);
    }

    #[test]
    fn test_rates_apply_per_participant() {
        let session = session_with(&["ama", "kofi"]);
        let mut ledger = ledger_with(&session, "r-1", &[1650]);
        let id = item_id(&ledger, 0);
        ledger
            .assign(&session, &id, &AssignmentRequest::exclusive("ama"))
            .unwrap();

        let report = compute_obligations(&ledger, &SplitRates::default());
        let ama = report.get("ama").unwrap();
        assert_eq!(ama.tax.minor(), 165);
        assert_eq!(ama.service.minor(), 83);
        assert_eq!(ama.total.minor(), 1650 + 165 + 83);
        assert!(report.get("kofi").is_none());
        assert_eq!(report.total_of("kofi"), Money::zero());
    }

    #[test]
    fn test_zero_rates() {
        let session = session_with(&["ama"]);
        let mut ledger = ledger_with(&session, "r-1", &[999]);
        let id = item_id(&ledger, 0);
        ledger
            .assign(&session, &id, &AssignmentRequest::exclusive("ama"))
            .unwrap();

        let rates = SplitRates::new(Rate::zero(), Rate::zero());
        let report = compute_obligations(&ledger, &rates);
        assert_eq!(report.total_of("ama").minor(), 999);
    }

    #[test]
    fn test_compute_is_idempotent() {
        let session = session_with(&["ama", "kofi", "esi"]);
        let mut ledger = ledger_with(&session, "r-1", &[1001, 2002]);
        let first = item_id(&ledger, 0);
        ledger
            .assign(&session, &first, &AssignmentRequest::shared(["ama", "kofi", "esi"]))
            .unwrap();

        let a = compute_obligations(&ledger, &SplitRates::default());
        let b = compute_obligations(&ledger, &SplitRates::default());
        assert_eq!(a, b);
    }

    #[test]
    fn test_session_obligations_combine_receipts() {
        let session = session_with(&["ama", "kofi"]);
        let mut food = ledger_with(&session, "r-food", &[1000]);
        let mut drinks = ledger_with(&session, "r-drinks", &[500]);

        let food_id = item_id(&food, 0);
        let drink_id = item_id(&drinks, 0);
        food.assign(&session, &food_id, &AssignmentRequest::exclusive("ama"))
            .unwrap();
        drinks
            .assign(&session, &drink_id, &AssignmentRequest::exclusive("ama"))
            .unwrap();

        let report = compute_session_obligations([&food, &drinks], &SplitRates::default());
        let ama = report.get("ama").unwrap();
        assert_eq!(ama.subtotal.minor(), 1500);
        // 10% and 5% of the combined 15.00
        assert_eq!(ama.tax.minor(), 150);
        assert_eq!(ama.service.minor(), 75);
        assert_eq!(ama.items.len(), 2);
        assert_eq!(report.grand_total().minor(), 1725);
    }

    #[test]
    fn test_empty_ledger() {
        let session = session_with(&["ama"]);
        let receipt = Receipt {
            id: "r-empty".to_string(),
            session_id: session.id.clone(),
            uploaded_by: "ama".to_string(),
            image_ref: None,
            created_at: Utc::now(),
        };
        let ledger = ItemLedger::new(receipt, Vec::new());
        let report = compute_obligations(&ledger, &SplitRates::default());
        assert!(report.obligations.is_empty());
        assert!(!report.has_unassigned());
        assert_eq!(report.receipt_subtotal, Money::zero());
    }

    proptest! {
        #[test]
        fn subtotals_reconcile_with_assigned_items(
            prices in prop::collection::vec(0i64..100_000, 1..20),
            picks in prop::collection::vec(0usize..5, 20),
        ) {
            let members = ["ama", "kofi", "esi", "yaw"];
            let session = session_with(&members);
            let mut ledger = ledger_with(&session, "r-prop", &prices);

            for (index, pick) in picks.iter().take(prices.len()).enumerate() {
                let id = item_id(&ledger, index);
                let request = match pick {
                    0 => AssignmentRequest::unassigned(),
                    1 => AssignmentRequest::exclusive(members[index % 4]),
                    2 => AssignmentRequest::shared(["ama", "kofi"]),
                    3 => AssignmentRequest::shared(["esi", "yaw", "kofi"]),
                    _ => AssignmentRequest::shared(members),
                };
                ledger.assign(&session, &id, &request).unwrap();
            }

            let report = compute_obligations(&ledger, &SplitRates::default());
            let subtotal_sum: Money = report.obligations.values().map(|o| o.subtotal).sum();
            let assigned: Money = ledger
                .items()
                .iter()
                .filter(|i| i.assignment.is_assigned())
                .map(|i| i.price)
                .sum();

            prop_assert_eq!(subtotal_sum, assigned);
            prop_assert_eq!(report.assigned_total, assigned);
            for obligation in report.obligations.values() {
                prop_assert_eq!(
                    obligation.total,
                    obligation.subtotal + obligation.tax + obligation.service
                );
            }
        }
    }
}
