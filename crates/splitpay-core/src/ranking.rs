//! # Ranking Engine
//!
//! Reads payment records and produces the speed leaderboard. Never mutates.
//!
//! ## Ordering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Paid         elapsed (paid_at - requested_at) ascending             │
//! │  2. Pending /    requested_at ascending                                 │
//! │     Failed                                                              │
//! │  3. No request   (members who never got a payment request)              │
//! │                                                                         │
//! │  Ties in any group: participant id ascending.                           │
//! │                                                                         │
//! │  Tier (Paid only):  elapsed ≤ golden_within → Golden                    │
//! │                     elapsed ≤ silver_within → Silver                    │
//! │                     otherwise               → None                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::settlement::latest_record;
use crate::types::{Participant, ParticipantPaymentStatus, PaymentRecord, PaymentStatus};

// =============================================================================
// Policy
// =============================================================================

/// Thresholds for reward tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardPolicy {
    pub golden_within: Duration,
    pub silver_within: Duration,
}

impl RewardPolicy {
    pub fn from_hours(golden: i64, silver: i64) -> Self {
        RewardPolicy {
            golden_within: Duration::hours(golden),
            silver_within: Duration::hours(silver),
        }
    }

    /// Tier for a payment that took `elapsed` from request to success.
    pub fn tier_for(&self, elapsed: Duration) -> RewardTier {
        if elapsed <= self.golden_within {
            RewardTier::Golden
        } else if elapsed <= self.silver_within {
            RewardTier::Silver
        } else {
            RewardTier::None
        }
    }
}

impl Default for RewardPolicy {
    fn default() -> Self {
        RewardPolicy::from_hours(24, 48)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum RewardTier {
    Golden,
    Silver,
    None,
}

// =============================================================================
// Leaderboard
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LeaderboardEntry {
    /// 1-based position.
    pub rank: usize,
    pub participant_id: String,
    pub display_name: String,
    #[ts(as = "Option<String>")]
    pub amount: Option<Money>,
    pub status: ParticipantPaymentStatus,
    #[ts(as = "Option<String>")]
    pub requested_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
    /// Seconds from request to payment; only for paid entries.
    pub elapsed_secs: Option<i64>,
    pub tier: RewardTier,
}

/// Header numbers shown above the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LeaderboardSummary {
    pub golden: usize,
    pub silver: usize,
    pub paid: usize,
    pub pending: usize,
    #[ts(as = "String")]
    pub collected: Money,
    #[ts(as = "String")]
    pub outstanding: Money,
}

/// Ranks every member by the latest of their payment records.
///
/// `members` gives both the population and display names; records for
/// payers outside it are ignored.
pub fn build_leaderboard(
    members: &[Participant],
    records: &[PaymentRecord],
    policy: &RewardPolicy,
) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = members
        .iter()
        .map(|member| entry_for(member, records, policy))
        .collect();

    entries.sort_by(compare_entries);
    for (index, entry) in entries.iter_mut().enumerate() {
        entry.rank = index + 1;
    }
    entries
}

/// Tallies a built leaderboard.
pub fn summarize(entries: &[LeaderboardEntry]) -> LeaderboardSummary {
    let mut summary = LeaderboardSummary::default();
    for entry in entries {
        match entry.tier {
            RewardTier::Golden => summary.golden += 1,
            RewardTier::Silver => summary.silver += 1,
            RewardTier::None => {}
        }
        let amount = entry.amount.unwrap_or_default();
        match entry.status {
            ParticipantPaymentStatus::Paid => {
                summary.paid += 1;
                summary.collected += amount;
            }
            ParticipantPaymentStatus::Pending => {
                summary.pending += 1;
                summary.outstanding += amount;
            }
            ParticipantPaymentStatus::Failed => summary.outstanding += amount,
            ParticipantPaymentStatus::NoPaymentRequested => {}
        }
    }
    summary
}

fn entry_for(
    member: &Participant,
    records: &[PaymentRecord],
    policy: &RewardPolicy,
) -> LeaderboardEntry {
    let latest = latest_record(records, &member.id);

    let (elapsed, tier) = match latest {
        Some(record) if record.status == PaymentStatus::Paid => {
            let elapsed = record
                .paid_at
                .map(|paid_at| paid_at - record.requested_at)
                .unwrap_or_else(Duration::zero);
            (Some(elapsed.num_seconds()), policy.tier_for(elapsed))
        }
        _ => (None, RewardTier::None),
    };

    LeaderboardEntry {
        rank: 0,
        participant_id: member.id.clone(),
        display_name: member.display_name.clone(),
        amount: latest.map(|r| r.amount),
        status: latest
            .map(|r| r.status.into())
            .unwrap_or(ParticipantPaymentStatus::NoPaymentRequested),
        requested_at: latest.map(|r| r.requested_at),
        paid_at: latest.and_then(|r| r.paid_at),
        elapsed_secs: elapsed,
        tier,
    }
}

fn group(entry: &LeaderboardEntry) -> u8 {
    match entry.status {
        ParticipantPaymentStatus::Paid => 0,
        ParticipantPaymentStatus::Pending | ParticipantPaymentStatus::Failed => 1,
        ParticipantPaymentStatus::NoPaymentRequested => 2,
    }
}

fn compare_entries(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    group(a)
        .cmp(&group(b))
        .then_with(|| match group(a) {
            0 => a.elapsed_secs.cmp(&b.elapsed_secs),
            1 => a.requested_at.cmp(&b.requested_at),
            _ => Ordering::Equal,
        })
        .then_with(|| a.participant_id.cmp(&b.participant_id))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hours: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 6, 18, 0, 0).unwrap() + Duration::hours(hours)
    }

    fn record(
        payer: &str,
        status: PaymentStatus,
        requested: i64,
        paid: Option<i64>,
    ) -> PaymentRecord {
        PaymentRecord {
            id: format!("pay-{}", payer),
            session_id: "s-1".to_string(),
            payer_id: payer.to_string(),
            payee_id: "host".to_string(),
            amount: Money::from_minor(2000),
            method: None,
            status,
            requested_at: at(requested),
            paid_at: paid.map(at),
            failed_at: None,
            version: 1,
        }
    }

    fn members(ids: &[&str]) -> Vec<Participant> {
        ids.iter()
            .map(|id| Participant::new(*id, id.to_uppercase()))
            .collect()
    }

    #[test]
    fn test_paid_speed_ordering_and_tiers() {
        let records = vec![
            record("c", PaymentStatus::Pending, 0, None),
            record("b", PaymentStatus::Paid, 0, Some(30)),
            record("a", PaymentStatus::Paid, 0, Some(10)),
        ];
        let policy = RewardPolicy::default();
        let board = build_leaderboard(&members(&["c", "b", "a"]), &records, &policy);

        let order: Vec<(&str, RewardTier)> = board
            .iter()
            .map(|e| (e.participant_id.as_str(), e.tier))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a", RewardTier::Golden),
                ("b", RewardTier::Silver),
                ("c", RewardTier::None)
            ]
        );
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].elapsed_secs, Some(10 * 3600));
        assert_eq!(board[2].status, ParticipantPaymentStatus::Pending);
    }

    #[test]
    fn test_tier_boundaries() {
        let policy = RewardPolicy::default();
        assert_eq!(policy.tier_for(Duration::hours(24)), RewardTier::Golden);
        assert_eq!(policy.tier_for(Duration::hours(24) + Duration::seconds(1)), RewardTier::Silver);
        assert_eq!(policy.tier_for(Duration::hours(48)), RewardTier::Silver);
        assert_eq!(policy.tier_for(Duration::hours(49)), RewardTier::None);
    }

    #[test]
    fn test_unpaid_ordered_by_request_time_then_id() {
        let records = vec![
            record("z", PaymentStatus::Pending, 2, None),
            record("y", PaymentStatus::Failed, 1, None),
            record("x", PaymentStatus::Pending, 1, None),
        ];
        let board = build_leaderboard(
            &members(&["z", "y", "x", "w"]),
            &records,
            &RewardPolicy::default(),
        );
        let ids: Vec<&str> = board.iter().map(|e| e.participant_id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "z", "w"]);
        assert!(board.iter().all(|e| e.tier == RewardTier::None));
        assert_eq!(board[3].status, ParticipantPaymentStatus::NoPaymentRequested);
    }

    #[test]
    fn test_equal_elapsed_breaks_on_id() {
        let records = vec![
            record("kofi", PaymentStatus::Paid, 0, Some(1)),
            record("ama", PaymentStatus::Paid, 3, Some(4)),
        ];
        let policy = RewardPolicy::default();
        let board = build_leaderboard(&members(&["kofi", "ama"]), &records, &policy);
        assert_eq!(board[0].participant_id, "ama");
        assert_eq!(board[1].participant_id, "kofi");
    }

    #[test]
    fn test_configurable_policy() {
        let records = vec![record("a", PaymentStatus::Paid, 0, Some(3))];
        let strict = RewardPolicy::from_hours(1, 2);
        let board = build_leaderboard(&members(&["a"]), &records, &strict);
        assert_eq!(board[0].tier, RewardTier::None);
    }

    #[test]
    fn test_summary() {
        let records = vec![
            record("a", PaymentStatus::Paid, 0, Some(1)),
            record("b", PaymentStatus::Paid, 0, Some(40)),
            record("c", PaymentStatus::Pending, 0, None),
        ];
        let policy = RewardPolicy::default();
        let board = build_leaderboard(&members(&["a", "b", "c", "d"]), &records, &policy);
        let summary = summarize(&board);
        assert_eq!(summary.golden, 1);
        assert_eq!(summary.silver, 1);
        assert_eq!(summary.paid, 2);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.collected.minor(), 4000);
        assert_eq!(summary.outstanding.minor(), 2000);
    }
}
