//! # Payment Repository
//!
//! Payment records for the settlement ledger.
//!
//! ## Write Guards
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  insert_pending                                                         │
//! │    UNIQUE INDEX (session_id, payer_id) WHERE status IN (pending, paid)  │
//! │    → two racing requests: one row lands, the other gets UniqueViolation │
//! │                                                                         │
//! │  resolve                                                                │
//! │    UPDATE ... WHERE id = ? AND version = ? AND status = 'pending'       │
//! │    0 rows → re-read: missing → NotFound                                 │
//! │                     no longer pending → InvalidState                    │
//! │                     otherwise → VersionConflict                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::session::finalize_when_settled;
use splitpay_core::{Money, PaymentMethod, PaymentRecord, PaymentStatus};

/// Repository for payment records.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct PaymentRow {
    id: String,
    session_id: String,
    payer_id: String,
    payee_id: String,
    amount_minor: i64,
    method: Option<PaymentMethod>,
    status: PaymentStatus,
    requested_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    version: i64,
}

impl From<PaymentRow> for PaymentRecord {
    fn from(row: PaymentRow) -> Self {
        PaymentRecord {
            id: row.id,
            session_id: row.session_id,
            payer_id: row.payer_id,
            payee_id: row.payee_id,
            amount: Money::from_minor(row.amount_minor),
            method: row.method,
            status: row.status,
            requested_at: row.requested_at,
            paid_at: row.paid_at,
            failed_at: row.failed_at,
            version: row.version,
        }
    }
}

const PAYMENT_COLUMNS: &str = r#"
    id, session_id, payer_id, payee_id, amount_minor, method, status,
    requested_at, paid_at, failed_at, version
"#;

impl PaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Inserts a pending record.
    ///
    /// Fails with `UniqueViolation` on `payments.payer_id` when the payer
    /// already has a pending or paid record in the session.
    pub async fn insert_pending(&self, record: &PaymentRecord) -> DbResult<PaymentRecord> {
        debug!(
            record_id = %record.id,
            session_id = %record.session_id,
            payer = %record.payer_id,
            amount = %record.amount,
            "Inserting payment request"
        );

        let result = sqlx::query(
            r#"
            INSERT INTO payments (
                id, session_id, payer_id, payee_id, amount_minor, method, status,
                requested_at, paid_at, failed_at, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&record.id)
        .bind(&record.session_id)
        .bind(&record.payer_id)
        .bind(&record.payee_id)
        .bind(record.amount.minor())
        .bind(record.method)
        .bind(PaymentStatus::Pending)
        .bind(record.requested_at)
        .bind(Option::<DateTime<Utc>>::None)
        .bind(Option::<DateTime<Utc>>::None)
        .bind(record.version)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            let err = DbError::from(e);
            if err.is_unique_violation_on("payments.payer_id") {
                return Err(DbError::duplicate(
                    "payments.payer_id (active payment)",
                    record.payer_id.clone(),
                ));
            }
            return Err(err);
        }

        info!(record_id = %record.id, payer = %record.payer_id, "Payment requested");
        Ok(PaymentRecord {
            status: PaymentStatus::Pending,
            paid_at: None,
            failed_at: None,
            ..record.clone()
        })
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<PaymentRecord>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = ?1",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PaymentRecord::from))
    }

    /// Every record of a session, in request order.
    pub async fn list_for_session(&self, session_id: &str) -> DbResult<Vec<PaymentRecord>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE session_id = ?1 ORDER BY rowid",
            PAYMENT_COLUMNS
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PaymentRecord::from).collect())
    }

    /// One payer's records in a session, in request order.
    pub async fn list_for_payer(
        &self,
        session_id: &str,
        payer_id: &str,
    ) -> DbResult<Vec<PaymentRecord>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE session_id = ?1 AND payer_id = ?2 ORDER BY rowid",
            PAYMENT_COLUMNS
        ))
        .bind(session_id)
        .bind(payer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PaymentRecord::from).collect())
    }

    /// Moves a pending record to `Paid` or `Failed`, conditioned on version.
    ///
    /// A `Paid` outcome also runs the all-members-paid check in the same
    /// transaction; the flag reports whether it finalized the session.
    pub async fn resolve(
        &self,
        record_id: &str,
        expected_version: i64,
        success: bool,
        at: DateTime<Utc>,
    ) -> DbResult<(PaymentRecord, bool)> {
        let status = if success {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Failed
        };
        let paid_at = success.then_some(at);
        let failed_at = (!success).then_some(at);

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE payments SET
                status = ?3,
                paid_at = ?4,
                failed_at = ?5,
                version = version + 1
            WHERE id = ?1 AND version = ?2 AND status = 'pending'
            "#,
        )
        .bind(record_id)
        .bind(expected_version)
        .bind(status)
        .bind(paid_at)
        .bind(failed_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = ?1",
            PAYMENT_COLUMNS
        ))
        .bind(record_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Err(DbError::not_found("Payment", record_id));
        };
        let record = PaymentRecord::from(row);

        let session_finalized = if updated == 1 && success {
            finalize_when_settled(&mut tx, &record.session_id, at).await?
        } else {
            false
        };
        tx.commit().await?;

        if updated == 1 {
            info!(record_id, payer = %record.payer_id, success, "Payment outcome recorded");
            return Ok((record, session_finalized));
        }
        if record.status != PaymentStatus::Pending {
            return Err(DbError::invalid_state(
                "payment",
                record_id,
                "is no longer pending",
            ));
        }
        Err(DbError::version_conflict("payment", record_id))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::session::tests::seeded_db;
    use splitpay_core::settlement::{new_pending, PaymentRequest};
    use splitpay_core::SessionState;

    fn request(payer: &str) -> PaymentRequest {
        PaymentRequest::new(payer, "ama", Money::from_minor(2500))
            .with_method(PaymentMethod::MtnMobileMoney)
    }

    #[tokio::test]
    async fn test_second_active_request_is_rejected() {
        let (db, session) = seeded_db(&["ama", "kofi"]).await;
        let repo = db.payments();

        let first = new_pending(&session, &request("kofi"), Utc::now());
        let stored = repo.insert_pending(&first).await.unwrap();
        assert_eq!(stored.method, Some(PaymentMethod::MtnMobileMoney));

        let second = new_pending(&session, &request("kofi"), Utc::now());
        let err = repo.insert_pending(&second).await.unwrap_err();
        assert!(err.is_unique_violation_on("payments.payer_id"));
    }

    #[tokio::test]
    async fn test_failed_record_frees_the_payer() {
        let (db, session) = seeded_db(&["ama", "kofi"]).await;
        let repo = db.payments();

        let first = repo
            .insert_pending(&new_pending(&session, &request("kofi"), Utc::now()))
            .await
            .unwrap();
        let (failed, finalized) = repo
            .resolve(&first.id, first.version, false, Utc::now())
            .await
            .unwrap();
        assert!(!finalized);
        assert_eq!(failed.status, PaymentStatus::Failed);
        assert!(failed.failed_at.is_some());
        assert!(failed.paid_at.is_none());

        let retry = repo
            .insert_pending(&new_pending(&session, &request("kofi"), Utc::now()))
            .await
            .unwrap();
        assert_eq!(repo.list_for_payer(&session.id, "kofi").await.unwrap().len(), 2);
        assert_eq!(repo.list_for_session(&session.id).await.unwrap()[1].id, retry.id);
    }

    #[tokio::test]
    async fn test_resolve_guards() {
        let (db, session) = seeded_db(&["ama", "kofi"]).await;
        let repo = db.payments();
        let record = repo
            .insert_pending(&new_pending(&session, &request("kofi"), Utc::now()))
            .await
            .unwrap();

        let (paid, _) = repo
            .resolve(&record.id, record.version, true, Utc::now())
            .await
            .unwrap();
        assert_eq!(paid.status, PaymentStatus::Paid);
        assert_eq!(paid.version, record.version + 1);

        let again = repo
            .resolve(&record.id, paid.version, false, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(again, DbError::InvalidState { .. }));

        let missing = repo.resolve("nope", 0, true, Utc::now()).await.unwrap_err();
        assert!(matches!(missing, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_finalize_if_all_paid() {
        let (db, session) = seeded_db(&["ama", "kofi"]).await;
        let repo = db.payments();

        let mut records = Vec::new();
        for payer in ["ama", "kofi"] {
            records.push(
                repo.insert_pending(&new_pending(&session, &request(payer), Utc::now()))
                    .await
                    .unwrap(),
            );
        }

        let (_, finalized) = repo.resolve(&records[0].id, 0, true, Utc::now()).await.unwrap();
        assert!(!finalized);
        assert!(!db.sessions().finalize_if_all_paid(&session.id, Utc::now()).await.unwrap());

        let (_, finalized) = repo.resolve(&records[1].id, 0, true, Utc::now()).await.unwrap();
        assert!(finalized);
        assert!(!db.sessions().finalize_if_all_paid(&session.id, Utc::now()).await.unwrap());

        let stored = db.sessions().get_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.state, SessionState::Finalized);
    }
}
