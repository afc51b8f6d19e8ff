//! # Participant Repository
//!
//! Profile rows for diners. Identity is owned by the identity provider; we
//! only keep what the leaderboard and payment prompts display.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use splitpay_core::Participant;

/// Repository for participant profiles.
#[derive(Debug, Clone)]
pub struct ParticipantRepository {
    pool: SqlitePool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ParticipantRow {
    pub id: String,
    pub display_name: String,
    pub phone: Option<String>,
}

impl From<ParticipantRow> for Participant {
    fn from(row: ParticipantRow) -> Self {
        Participant {
            id: row.id,
            display_name: row.display_name,
            phone: row.phone,
        }
    }
}

impl ParticipantRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ParticipantRepository { pool }
    }

    /// Inserts the profile, or refreshes name and phone if it exists.
    ///
    /// A `None` phone never erases a stored one.
    pub async fn upsert(
        &self,
        participant: &Participant,
        now: DateTime<Utc>,
    ) -> DbResult<Participant> {
        debug!(participant_id = %participant.id, "Upserting participant");

        let row = sqlx::query_as::<_, ParticipantRow>(
            r#"
            INSERT INTO participants (id, display_name, phone, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT (id) DO UPDATE SET
                display_name = excluded.display_name,
                phone = COALESCE(excluded.phone, participants.phone),
                updated_at = excluded.updated_at
            RETURNING id, display_name, phone
            "#,
        )
        .bind(&participant.id)
        .bind(&participant.display_name)
        .bind(&participant.phone)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Participant>> {
        let row = sqlx::query_as::<_, ParticipantRow>(
            "SELECT id, display_name, phone FROM participants WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Participant::from))
    }

    /// Profiles of a session's members, in join order.
    pub async fn members_of(&self, session_id: &str) -> DbResult<Vec<Participant>> {
        let rows = sqlx::query_as::<_, ParticipantRow>(
            r#"
            SELECT p.id, p.display_name, p.phone
            FROM session_members m
            JOIN participants p ON p.id = m.participant_id
            WHERE m.session_id = ?1
            ORDER BY m.rowid
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Participant::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;
    use splitpay_core::Participant;

    #[tokio::test]
    async fn test_upsert_keeps_phone_when_absent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.participants();

        let ama = Participant::new("ama", "Ama").with_phone("+233200000001");
        repo.upsert(&ama, Utc::now()).await.unwrap();

        let renamed = repo
            .upsert(&Participant::new("ama", "Ama Serwaa"), Utc::now())
            .await
            .unwrap();
        assert_eq!(renamed.display_name, "Ama Serwaa");
        assert_eq!(renamed.phone.as_deref(), Some("+233200000001"));

        assert!(repo.get_by_id("nobody").await.unwrap().is_none());
    }
}
