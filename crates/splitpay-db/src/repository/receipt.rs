//! # Receipt Repository
//!
//! Receipts, their line items, and item assignments.
//!
//! ## Assignment Storage
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  receipt_items                                                          │
//! │  ┌──────────┬─────────────┬─────────────────┬──────────────┬─────────┐  │
//! │  │ id       │ price_minor │ assignment_mode │ assigned_to  │ version │  │
//! │  ├──────────┼─────────────┼─────────────────┼──────────────┼─────────┤  │
//! │  │ i-1      │ 4500        │ exclusive       │ ["kofi"]     │ 1       │  │
//! │  │ i-2      │ 1000        │ shared          │ ["esi","ama"]│ 3       │  │
//! │  │ i-3      │ 300         │ unassigned      │ []           │ 0       │  │
//! │  └──────────┴─────────────┴─────────────────┴──────────────┴─────────┘  │
//! │                                                                         │
//! │  Mode and participant list are written by ONE statement, so a reader    │
//! │  never sees a new mode with an old list.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::session::session_state;
use splitpay_core::{Assignment, ItemLedger, LineItem, Money, Receipt, SessionState};

/// Repository for receipts and line items.
#[derive(Debug, Clone)]
pub struct ReceiptRepository {
    pool: SqlitePool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ReceiptRow {
    id: String,
    session_id: String,
    uploaded_by: String,
    image_ref: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ReceiptRow> for Receipt {
    fn from(row: ReceiptRow) -> Self {
        Receipt {
            id: row.id,
            session_id: row.session_id,
            uploaded_by: row.uploaded_by,
            image_ref: row.image_ref,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ItemRow {
    id: String,
    receipt_id: String,
    name: String,
    price_minor: i64,
    assignment_mode: String,
    assigned_to: String,
    position: i64,
    created_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<ItemRow> for LineItem {
    type Error = DbError;

    fn try_from(row: ItemRow) -> DbResult<Self> {
        let participants: Vec<String> = serde_json::from_str(&row.assigned_to)
            .map_err(|e| DbError::decode("receipt_items.assigned_to", e.to_string()))?;

        let assignment = match (row.assignment_mode.as_str(), participants.len()) {
            ("unassigned", 0) => Assignment::Unassigned,
            ("exclusive", 1) => {
                Assignment::Exclusive(participants.into_iter().next().unwrap_or_default())
            }
            ("shared", n) if n >= 2 => Assignment::Shared(participants),
            (mode, n) => {
                return Err(DbError::decode(
                    "receipt_items.assignment_mode",
                    format!("mode '{}' with {} participant(s)", mode, n),
                ))
            }
        };

        Ok(LineItem {
            id: row.id,
            receipt_id: row.receipt_id,
            name: row.name,
            price: Money::from_minor(row.price_minor),
            assignment,
            position: row.position,
            created_at: row.created_at,
            version: row.version,
        })
    }
}

/// Splits an assignment into its `(assignment_mode, assigned_to)` columns.
fn assignment_columns(assignment: &Assignment) -> DbResult<(String, String)> {
    let participants = serde_json::to_string(assignment.participants())
        .map_err(|e| DbError::Internal(e.to_string()))?;
    Ok((assignment.mode().to_string(), participants))
}

const ITEM_COLUMNS: &str = r#"
    id, receipt_id, name, price_minor, assignment_mode, assigned_to,
    position, created_at, version
"#;

impl ReceiptRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReceiptRepository { pool }
    }

    /// Inserts a receipt if its session is still open.
    pub async fn insert(&self, receipt: &Receipt) -> DbResult<Receipt> {
        debug!(receipt_id = %receipt.id, session_id = %receipt.session_id, "Inserting receipt");

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO receipts (id, session_id, uploaded_by, image_ref, created_at)
            SELECT ?1, id, ?3, ?4, ?5 FROM sessions WHERE id = ?2 AND state = 'open'
            "#,
        )
        .bind(&receipt.id)
        .bind(&receipt.session_id)
        .bind(&receipt.uploaded_by)
        .bind(&receipt.image_ref)
        .bind(receipt.created_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            let state = session_state(&mut tx, &receipt.session_id).await?;
            return Err(closed_session_error(&receipt.session_id, state));
        }

        tx.commit().await?;
        Ok(receipt.clone())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Receipt>> {
        let row = sqlx::query_as::<_, ReceiptRow>(
            "SELECT id, session_id, uploaded_by, image_ref, created_at FROM receipts WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Receipt::from))
    }

    /// A session's receipts in upload order.
    pub async fn list_for_session(&self, session_id: &str) -> DbResult<Vec<Receipt>> {
        let rows = sqlx::query_as::<_, ReceiptRow>(
            r#"
            SELECT id, session_id, uploaded_by, image_ref, created_at
            FROM receipts
            WHERE session_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Receipt::from).collect())
    }

    /// Appends items to a receipt whose session is still open.
    ///
    /// Positions are assigned here, after the last stored item, so two
    /// batches never interleave. Returns the stored items.
    pub async fn insert_items(
        &self,
        receipt_id: &str,
        items: &[LineItem],
    ) -> DbResult<Vec<LineItem>> {
        debug!(receipt_id, count = items.len(), "Inserting line items");

        let mut tx = self.pool.begin().await?;

        let session_id: Option<String> =
            sqlx::query_scalar("SELECT session_id FROM receipts WHERE id = ?1")
                .bind(receipt_id)
                .fetch_optional(&mut *tx)
                .await?;
        let session_id = session_id.ok_or_else(|| DbError::not_found("Receipt", receipt_id))?;

        let next_position: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM receipt_items WHERE receipt_id = ?1",
        )
        .bind(receipt_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut stored = Vec::with_capacity(items.len());
        for (offset, item) in items.iter().enumerate() {
            let (mode, assigned_to) = assignment_columns(&item.assignment)?;
            let position = next_position + offset as i64;

            let inserted = sqlx::query(
                r#"
                INSERT INTO receipt_items (
                    id, receipt_id, name, price_minor, assignment_mode, assigned_to,
                    position, created_at, version
                )
                SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9
                FROM sessions WHERE id = ?10 AND state = 'open'
                "#,
            )
            .bind(&item.id)
            .bind(receipt_id)
            .bind(&item.name)
            .bind(item.price.minor())
            .bind(mode)
            .bind(assigned_to)
            .bind(position)
            .bind(item.created_at)
            .bind(item.version)
            .bind(&session_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if inserted == 0 {
                let state = session_state(&mut tx, &session_id).await?;
                return Err(closed_session_error(&session_id, state));
            }

            stored.push(LineItem {
                receipt_id: receipt_id.to_string(),
                position,
                ..item.clone()
            });
        }

        tx.commit().await?;
        Ok(stored)
    }

    /// A receipt's items in creation order.
    pub async fn get_items(&self, receipt_id: &str) -> DbResult<Vec<LineItem>> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {} FROM receipt_items WHERE receipt_id = ?1 ORDER BY position",
            ITEM_COLUMNS
        ))
        .bind(receipt_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LineItem::try_from).collect()
    }

    pub async fn get_item(&self, item_id: &str) -> DbResult<Option<LineItem>> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {} FROM receipt_items WHERE id = ?1",
            ITEM_COLUMNS
        ))
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(LineItem::try_from).transpose()
    }

    /// Loads a receipt and its items as a ledger.
    pub async fn load_ledger(&self, receipt_id: &str) -> DbResult<Option<ItemLedger>> {
        let Some(receipt) = self.get_by_id(receipt_id).await? else {
            return Ok(None);
        };
        let items = self.get_items(receipt_id).await?;
        Ok(Some(ItemLedger::new(receipt, items)))
    }

    /// Ledgers for every receipt of a session, in upload order.
    pub async fn load_session_ledgers(&self, session_id: &str) -> DbResult<Vec<ItemLedger>> {
        let receipts = self.list_for_session(session_id).await?;
        let mut ledgers = Vec::with_capacity(receipts.len());
        for receipt in receipts {
            let items = self.get_items(&receipt.id).await?;
            ledgers.push(ItemLedger::new(receipt, items));
        }
        Ok(ledgers)
    }

    /// Replaces an item's assignment in a single statement.
    ///
    /// With `expected_version` the write only lands on that version; with
    /// `None` the last committed write wins. Either way the session must
    /// still be open. Returns the stored item.
    pub async fn update_assignment(
        &self,
        item_id: &str,
        assignment: &Assignment,
        expected_version: Option<i64>,
    ) -> DbResult<LineItem> {
        let (mode, assigned_to) = assignment_columns(assignment)?;

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE receipt_items SET
                assignment_mode = ?2,
                assigned_to = ?3,
                version = version + 1
            WHERE id = ?1
              AND (?4 IS NULL OR version = ?4)
              AND EXISTS (
                  SELECT 1 FROM receipts r
                  JOIN sessions s ON s.id = r.session_id
                  WHERE r.id = receipt_items.receipt_id AND s.state = 'open'
              )
            "#,
        )
        .bind(item_id)
        .bind(&mode)
        .bind(&assigned_to)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {} FROM receipt_items WHERE id = ?1",
            ITEM_COLUMNS
        ))
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Err(DbError::not_found("Line item", item_id));
        };

        if updated == 1 {
            tx.commit().await?;
            debug!(item_id, mode = %mode, version = row.version, "Assignment stored");
            return LineItem::try_from(row);
        }

        let session_id: Option<String> =
            sqlx::query_scalar("SELECT session_id FROM receipts WHERE id = ?1")
                .bind(&row.receipt_id)
                .fetch_optional(&mut *tx)
                .await?;
        let state = match session_id {
            Some(ref id) => session_state(&mut tx, id).await?,
            None => None,
        };

        if state == Some(SessionState::Finalized) {
            return Err(closed_session_error(session_id.as_deref().unwrap_or_default(), state));
        }
        Err(DbError::version_conflict("line item", item_id))
    }
}

fn closed_session_error(session_id: &str, state: Option<SessionState>) -> DbError {
    match state {
        None => DbError::not_found("Session", session_id),
        Some(_) => DbError::invalid_state("session", session_id, "is already finalized"),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
