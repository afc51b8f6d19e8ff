//! # Session State Machine
//!
//! Lifecycle rules for a split session and the join code people type to
//! find it.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌──────────┐   creator finalizes        ┌─────────────┐               │
//! │   │   Open   │ ─────────────────────────► │  Finalized  │  (terminal)   │
//! │   │          │   every member has Paid    │             │               │
//! │   └──────────┘ ─────────────────────────► └─────────────┘               │
//! │     members, receipts,                      payment status              │
//! │     items, assignments                      updates only                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Whichever trigger fires first wins; the second is a no-op. There is no
//! transition back to `Open`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{Session, SessionState, SplitRates};

/// Number of characters in a join code.
pub const JOIN_CODE_LENGTH: usize = 6;

const JOIN_CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// =============================================================================
// Join Code
// =============================================================================

/// A six-character uppercase alphanumeric code.
///
/// Parsing is case-insensitive: `"abc123"` and `"ABC123"` are the same code.
///
/// ```rust
/// use splitpay_core::session::JoinCode;
///
/// let code: JoinCode = " ab12cd ".parse().unwrap();
/// assert_eq!(code.as_str(), "AB12CD");
/// assert!("AB-12C".parse::<JoinCode>().is_err());
/// assert!("ABC".parse::<JoinCode>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JoinCode(String);

impl JoinCode {
    /// Draws a fresh random code.
    ///
    /// Uniqueness is not checked here; storage rejects a code already in use
    /// and the caller draws again.
    pub fn generate() -> Self {
        let mut entropy = Uuid::new_v4().as_u128();
        let mut code = String::with_capacity(JOIN_CODE_LENGTH);
        for _ in 0..JOIN_CODE_LENGTH {
            let index = (entropy % JOIN_CODE_ALPHABET.len() as u128) as usize;
            code.push(JOIN_CODE_ALPHABET[index] as char);
            entropy /= JOIN_CODE_ALPHABET.len() as u128;
        }
        JoinCode(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for JoinCode {
    type Err = ValidationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let code = input.trim().to_ascii_uppercase();

        if code.is_empty() {
            return Err(ValidationError::Required {
                field: "join_code".to_string(),
            });
        }

        if code.len() != JOIN_CODE_LENGTH {
            return Err(ValidationError::InvalidFormat {
                field: "join_code".to_string(),
                reason: format!("must be {} characters", JOIN_CODE_LENGTH),
            });
        }

        if !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(ValidationError::InvalidFormat {
                field: "join_code".to_string(),
                reason: "must contain only letters and digits".to_string(),
            });
        }

        Ok(JoinCode(code))
    }
}

impl TryFrom<String> for JoinCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<JoinCode> for String {
    fn from(code: JoinCode) -> Self {
        code.0
    }
}

impl fmt::Display for JoinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Lifecycle Rules
// =============================================================================

/// Builds a new open session with the creator as its only member.
pub fn new_session(
    creator_id: &str,
    join_code: JoinCode,
    rates: SplitRates,
    now: DateTime<Utc>,
) -> Session {
    Session {
        id: Uuid::new_v4().to_string(),
        join_code: join_code.into(),
        creator_id: creator_id.to_string(),
        members: vec![creator_id.to_string()],
        state: SessionState::Open,
        rates,
        created_at: now,
        finalized_at: None,
        version: 0,
    }
}

/// Fails with `InvalidState` unless the session still accepts edits.
pub fn ensure_open(session: &Session) -> CoreResult<()> {
    if session.is_finalized() {
        return Err(CoreError::invalid_state(
            "session",
            session.id.clone(),
            "is already finalized",
        ));
    }
    Ok(())
}

/// Outcome of a join attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    /// The participant was added to the member list.
    Joined,
    /// The participant was already a member; nothing changed.
    AlreadyMember,
}

/// Decides whether `participant_id` may join.
///
/// An existing member is admitted even after finalization, since nothing
/// changes for them.
pub fn check_admission(session: &Session, participant_id: &str) -> CoreResult<Admission> {
    if session.is_member(participant_id) {
        return Ok(Admission::AlreadyMember);
    }
    ensure_open(session)?;
    Ok(Admission::Joined)
}

/// Adds a member in memory. Idempotent.
pub fn admit(session: &mut Session, participant_id: &str) -> CoreResult<Admission> {
    let admission = check_admission(session, participant_id)?;
    if admission == Admission::Joined {
        session.members.push(participant_id.to_string());
    }
    Ok(admission)
}

/// Only the creator may finalize explicitly, and only an open session.
pub fn ensure_can_finalize(session: &Session, actor_id: &str) -> CoreResult<()> {
    ensure_open(session)?;
    if session.creator_id != actor_id {
        return Err(CoreError::invalid_state(
            "session",
            session.id.clone(),
            format!("can only be finalized by its creator, not {}", actor_id),
        ));
    }
    Ok(())
}

/// Explicit creator-driven finalization.
pub fn finalize(session: &mut Session, actor_id: &str, now: DateTime<Utc>) -> CoreResult<()> {
    ensure_can_finalize(session, actor_id)?;
    mark_finalized(session, now);
    Ok(())
}

/// Moves an open session to `Finalized`. Returns false if it already was.
pub fn mark_finalized(session: &mut Session, now: DateTime<Utc>) -> bool {
    if session.is_finalized() {
        return false;
    }
    session.state = SessionState::Finalized;
    session.finalized_at = Some(now);
    true
}

/// Per-session rate overrides are only accepted while open.
pub fn ensure_rates_editable(session: &Session) -> CoreResult<()> {
    ensure_open(session)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn open_session() -> Session {
        new_session(
            "ama",
            "ABC123".parse().unwrap(),
            SplitRates::default(),
            Utc::now(),
        )
    }

    #[test]
    fn test_generated_codes_are_well_formed() {
        for _ in 0..100 {
            let code = JoinCode::generate();
            assert_eq!(code.as_str().len(), JOIN_CODE_LENGTH);
            assert!(code
                .as_str()
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
            assert_eq!(code.as_str().parse::<JoinCode>().unwrap(), code);
        }
    }

    #[test]
    fn test_join_code_is_case_insensitive() {
        let lower: JoinCode = "xy9z01".parse().unwrap();
        let upper: JoinCode = "XY9Z01".parse().unwrap();
        assert_eq!(lower, upper);
        assert!("".parse::<JoinCode>().is_err());
        assert!("ABCDEFG".parse::<JoinCode>().is_err());
        assert!("ÅBC123".parse::<JoinCode>().is_err());
    }

    #[test]
    fn test_new_session_has_creator_first() {
        let session = open_session();
        assert_eq!(session.members, vec!["ama".to_string()]);
        assert_eq!(session.state, SessionState::Open);
        assert_eq!(session.join_code, "ABC123");
    }

    #[test]
    fn test_admit_is_idempotent() {
        let mut session = open_session();
        assert_eq!(admit(&mut session, "kofi").unwrap(), Admission::Joined);
        assert_eq!(admit(&mut session, "kofi").unwrap(), Admission::AlreadyMember);
        assert_eq!(admit(&mut session, "ama").unwrap(), Admission::AlreadyMember);
        assert_eq!(session.members, vec!["ama".to_string(), "kofi".to_string()]);
    }

    #[test]
    fn test_finalized_rejects_new_members() {
        let mut session = open_session();
        finalize(&mut session, "ama", Utc::now()).unwrap();

        let err = admit(&mut session, "kofi").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(err.to_string(), format!("session {} is already finalized", session.id));

        // existing members can still "join" without error
        assert_eq!(admit(&mut session, "ama").unwrap(), Admission::AlreadyMember);
    }

    #[test]
    fn test_only_creator_finalizes() {
        let mut session = open_session();
        admit(&mut session, "kofi").unwrap();

        let err = finalize(&mut session, "kofi", Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(!session.is_finalized());

        finalize(&mut session, "ama", Utc::now()).unwrap();
        assert!(session.is_finalized());
        assert!(session.finalized_at.is_some());
    }

    #[test]
    fn test_finalized_is_terminal() {
        let mut session = open_session();
        let first = Utc::now();
        assert!(mark_finalized(&mut session, first));
        assert!(!mark_finalized(&mut session, Utc::now()));
        assert_eq!(session.finalized_at, Some(first));
        assert!(finalize(&mut session, "ama", Utc::now()).is_err());
    }
}
