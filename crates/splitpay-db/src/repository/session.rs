//! # Session Repository
//!
//! Sessions, their member lists and the join-code lookup.
//!
//! ## Membership Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add_member(session, participant)                                       │
//! │                                                                         │
//! │  INSERT OR IGNORE INTO session_members                                  │
//! │  SELECT ... FROM sessions WHERE id = ? AND state = 'open'               │
//! │       │                                                                 │
//! │       ├── 1 row  → Joined (session version bumped, same transaction)    │
//! │       └── 0 rows → re-read: already a member → AlreadyMember            │
//! │                             no session        → NotFound                │
//! │                             finalized         → InvalidState            │
//! │                                                                         │
//! │  One statement decides; callers never rewrite the whole member list.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use splitpay_core::{Admission, Rate, Session, SessionState, SplitRates};

/// Repository for session database operations.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SessionRow {
    id: String,
    join_code: String,
    creator_id: String,
    state: SessionState,
    tax_bps: i64,
    service_bps: i64,
    created_at: DateTime<Utc>,
    finalized_at: Option<DateTime<Utc>>,
    version: i64,
}

impl SessionRow {
    fn into_session(self, members: Vec<String>) -> DbResult<Session> {
        Ok(Session {
            rates: SplitRates::new(
                rate_from_column("sessions.tax_bps", self.tax_bps)?,
                rate_from_column("sessions.service_bps", self.service_bps)?,
            ),
            id: self.id,
            join_code: self.join_code,
            creator_id: self.creator_id,
            members,
            state: self.state,
            created_at: self.created_at,
            finalized_at: self.finalized_at,
            version: self.version,
        })
    }
}

fn rate_from_column(column: &str, value: i64) -> DbResult<Rate> {
    u32::try_from(value)
        .map(Rate::from_bps)
        .map_err(|e| DbError::decode(column, e.to_string()))
}

const SESSION_COLUMNS: &str = r#"
    id, join_code, creator_id, state, tax_bps, service_bps,
    created_at, finalized_at, version
"#;

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SessionRepository { pool }
    }

    /// Inserts a new session and its creator's membership row.
    ///
    /// A taken join code surfaces as `UniqueViolation` on
    /// `sessions.join_code`; the caller draws a new code.
    pub async fn insert(&self, session: &Session) -> DbResult<Session> {
        debug!(session_id = %session.id, join_code = %session.join_code, "Inserting session");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, join_code, creator_id, state, tax_bps, service_bps,
                created_at, finalized_at, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&session.id)
        .bind(&session.join_code)
        .bind(&session.creator_id)
        .bind(session.state)
        .bind(session.rates.tax.bps() as i64)
        .bind(session.rates.service.bps() as i64)
        .bind(session.created_at)
        .bind(session.finalized_at)
        .bind(session.version)
        .execute(&mut *tx)
        .await?;

        for member in &session.members {
            sqlx::query(
                r#"
                INSERT INTO session_members (session_id, participant_id, joined_at)
                VALUES (?1, ?2, ?3)
                "#,
            )
            .bind(&session.id)
            .bind(member)
            .bind(session.created_at)
            .execute(&mut *tx)
            .await?;
        }

        let stored = fetch_session(&mut tx, &session.id)
            .await?
            .ok_or_else(|| DbError::not_found("Session", session.id.clone()))?;

        tx.commit().await?;

        info!(session_id = %stored.id, join_code = %stored.join_code, "Session created");
        Ok(stored)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Session>> {
        let mut conn = self.pool.acquire().await?;
        fetch_session(&mut conn, id).await
    }

    /// Looks a session up by its (already normalized) join code.
    pub async fn get_by_join_code(&self, join_code: &str) -> DbResult<Option<Session>> {
        let mut conn = self.pool.acquire().await?;

        let id: Option<String> = sqlx::query_scalar("SELECT id FROM sessions WHERE join_code = ?1")
            .bind(join_code)
            .fetch_optional(&mut *conn)
            .await?;

        match id {
            Some(id) => fetch_session(&mut conn, &id).await,
            None => Ok(None),
        }
    }

    /// Every session the participant belongs to, newest first.
    pub async fn list_for_participant(&self, participant_id: &str) -> DbResult<Vec<Session>> {
        let mut conn = self.pool.acquire().await?;

        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT session_id FROM session_members WHERE participant_id = ?1",
        )
        .bind(participant_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(session) = fetch_session(&mut conn, &id).await? {
                sessions.push(session);
            }
        }

        sessions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(sessions)
    }

    /// Atomically adds a member if the session is open. Idempotent.
    pub async fn add_member(
        &self,
        session_id: &str,
        participant_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<(Session, Admission)> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO session_members (session_id, participant_id, joined_at)
            SELECT id, ?2, ?3 FROM sessions WHERE id = ?1 AND state = 'open'
            "#,
        )
        .bind(session_id)
        .bind(participant_id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 1 {
            sqlx::query("UPDATE sessions SET version = version + 1 WHERE id = ?1")
                .bind(session_id)
                .execute(&mut *tx)
                .await?;
        }

        let session = fetch_session(&mut tx, session_id)
            .await?
            .ok_or_else(|| DbError::not_found("Session", session_id))?;

        tx.commit().await?;

        if inserted == 1 {
            info!(session_id, participant_id, members = session.members.len(), "Member joined");
            return Ok((session, Admission::Joined));
        }

        if session.is_member(participant_id) {
            debug!(session_id, participant_id, "Already a member");
            return Ok((session, Admission::AlreadyMember));
        }

        Err(DbError::invalid_state("session", session_id, "is already finalized"))
    }

    /// Overwrites the session's rates, conditioned on version and `Open`.
    pub async fn update_rates(
        &self,
        session_id: &str,
        rates: SplitRates,
        expected_version: i64,
    ) -> DbResult<Session> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE sessions SET
                tax_bps = ?2,
                service_bps = ?3,
                version = version + 1
            WHERE id = ?1 AND version = ?4 AND state = 'open'
            "#,
        )
        .bind(session_id)
        .bind(rates.tax.bps() as i64)
        .bind(rates.service.bps() as i64)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let session = fetch_session(&mut tx, session_id)
            .await?
            .ok_or_else(|| DbError::not_found("Session", session_id))?;
        tx.commit().await?;

        if updated == 1 {
            debug!(
                session_id,
                tax_bps = rates.tax.bps(),
                service_bps = rates.service.bps(),
                "Session rates updated"
            );
            return Ok(session);
        }
        if session.is_finalized() {
            return Err(DbError::invalid_state("session", session_id, "is already finalized"));
        }
        Err(DbError::version_conflict("session", session_id))
    }

    /// Moves an open session to `Finalized`.
    ///
    /// Returns the session and whether this call made the transition; a
    /// session that was already finalized comes back unchanged with `false`.
    pub async fn finalize(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<(Session, bool)> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE sessions SET
                state = 'finalized',
                finalized_at = ?2,
                version = version + 1
            WHERE id = ?1 AND state = 'open'
            "#,
        )
        .bind(session_id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let session = fetch_session(&mut tx, session_id)
            .await?
            .ok_or_else(|| DbError::not_found("Session", session_id))?;
        tx.commit().await?;

        if updated == 1 {
            info!(session_id, "Session finalized");
        }
        Ok((session, updated == 1))
    }

    /// Finalizes the session only if every current member has a paid record.
    pub async fn finalize_if_all_paid(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        finalize_when_settled(&mut conn, session_id, now).await
    }
}

/// Flips an open session to finalized when every current member has a paid
/// record.
///
/// The membership and payment checks run inside the UPDATE, so a member
/// joining concurrently is either counted or blocks the transition. Runs on
/// the caller's connection so a payment write and this check can share one
/// transaction.
pub(crate) async fn finalize_when_settled(
    conn: &mut SqliteConnection,
    session_id: &str,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let updated = sqlx::query(
        r#"
        UPDATE sessions SET
            state = 'finalized',
            finalized_at = ?2,
            version = version + 1
        WHERE id = ?1
          AND state = 'open'
          AND NOT EXISTS (
              SELECT 1 FROM session_members m
              WHERE m.session_id = sessions.id
                AND NOT EXISTS (
                    SELECT 1 FROM payments p
                    WHERE p.session_id = m.session_id
                      AND p.payer_id = m.participant_id
                      AND p.status = 'paid'
                )
          )
        "#,
    )
    .bind(session_id)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if updated == 1 {
        info!(session_id, "Session finalized: every member paid");
    }
    Ok(updated == 1)
}

/// Reads a session row plus its members in join order.
pub(crate) async fn fetch_session(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<Session>> {
    let row = sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {} FROM sessions WHERE id = ?1",
        SESSION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let members: Vec<String> = sqlx::query_scalar(
        "SELECT participant_id FROM session_members WHERE session_id = ?1 ORDER BY rowid",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    row.into_session(members).map(Some)
}

/// Current lifecycle state, or `None` if the session does not exist.
pub(crate) async fn session_state(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<SessionState>> {
    let state = sqlx::query_scalar::<_, SessionState>("SELECT state FROM sessions WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(state)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use splitpay_core::session::{new_session, JoinCode};
    use splitpay_core::Participant;

    pub(crate) async fn seeded_db(members: &[&str]) -> (Database, Session) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        for id in members {
            db.participants()
                .upsert(&Participant::new(*id, id.to_uppercase()), Utc::now())
                .await
                .unwrap();
        }
        let session = new_session(
            members[0],
            JoinCode::generate(),
            SplitRates::default(),
            Utc::now(),
        );
        let mut session = db.sessions().insert(&session).await.unwrap();
        for id in &members[1..] {
            session = db.sessions().add_member(&session.id, id, Utc::now()).await.unwrap().0;
        }
        (db, session)
    }

    #[tokio::test]
    async fn test_insert_and_lookup_by_code() {
        let (db, session) = seeded_db(&["ama"]).await;

        let found = db.sessions().get_by_join_code(&session.join_code).await.unwrap().unwrap();
        assert_eq!(found.id, session.id);
        assert_eq!(found.members, vec!["ama".to_string()]);
        assert_eq!(found.rates, SplitRates::default());

        assert!(db.sessions().get_by_join_code("ZZZZZZ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_join_code_is_unique_violation() {
        let (db, session) = seeded_db(&["ama"]).await;
        let code: JoinCode = session.join_code.parse().unwrap();
        let clash = new_session("ama", code, SplitRates::default(), Utc::now());

        let err = db.sessions().insert(&clash).await.unwrap_err();
        assert!(err.is_unique_violation_on("sessions.join_code"));
    }

    #[tokio::test]
    async fn test_add_member_is_idempotent_and_ordered() {
        let (db, session) = seeded_db(&["ama", "kofi"]).await;
        assert_eq!(session.members, vec!["ama".to_string(), "kofi".to_string()]);
        let version = session.version;

        let (again, admission) = db
            .sessions()
            .add_member(&session.id, "kofi", Utc::now())
            .await
            .unwrap();
        assert_eq!(admission, Admission::AlreadyMember);
        assert_eq!(again.members.len(), 2);
        assert_eq!(again.version, version);
    }

    #[tokio::test]
    async fn test_add_member_to_finalized_or_missing() {
        let (db, session) = seeded_db(&["ama", "esi"]).await;
        let (finalized, changed) = db.sessions().finalize(&session.id, Utc::now()).await.unwrap();
        assert!(changed);
        assert!(finalized.is_finalized());

        let err = db.sessions().add_member(&session.id, "esi", Utc::now()).await;
        assert_eq!(err.unwrap().1, Admission::AlreadyMember);

        db.participants()
            .upsert(&Participant::new("yaw", "Yaw"), Utc::now())
            .await
            .unwrap();
        let err = db.sessions().add_member(&session.id, "yaw", Utc::now()).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidState { .. }));

        let err = db.sessions().add_member("missing", "yaw", Utc::now()).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_finalize_happens_once() {
        let (db, session) = seeded_db(&["ama"]).await;
        let (_, first) = db.sessions().finalize(&session.id, Utc::now()).await.unwrap();
        let (after, second) = db.sessions().finalize(&session.id, Utc::now()).await.unwrap();
        assert!(first);
        assert!(!second);
        assert_eq!(after.state, SessionState::Finalized);
    }

    #[tokio::test]
    async fn test_update_rates_checks_version() {
        let (db, session) = seeded_db(&["ama"]).await;
        let rates = SplitRates::new(Rate::from_bps(1250), Rate::zero());

        let updated = db
            .sessions()
            .update_rates(&session.id, rates, session.version)
            .await
            .unwrap();
        assert_eq!(updated.rates, rates);

        let stale = db
            .sessions()
            .update_rates(&session.id, rates, session.version)
            .await
            .unwrap_err();
        assert!(matches!(stale, DbError::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn test_list_for_participant() {
        let (db, first) = seeded_db(&["ama", "kofi"]).await;
        let later = new_session(
            "kofi",
            JoinCode::generate(),
            SplitRates::default(),
            first.created_at + chrono::Duration::minutes(5),
        );
        db.sessions().insert(&later).await.unwrap();

        let kofi = db.sessions().list_for_participant("kofi").await.unwrap();
        assert_eq!(kofi.len(), 2);
        assert_eq!(kofi[0].id, later.id);

        let ama = db.sessions().list_for_participant("ama").await.unwrap();
        assert_eq!(ama.len(), 1);
    }
}
