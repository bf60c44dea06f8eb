use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use hackspace_core::config::StorageConfig;
use hackspace_core::{
    BatchId, DateRange, ImportBatch, ImportStatus, MatchConfidence, MemberId,
    MemberPaymentProfile, Money, NewImportBatch, PersistedTransaction, RawTransaction,
    TransactionRecord,
};
use hackspace_import::{ReconciliationStore, StoreError};
use tracing::debug;

use crate::db::{create_db, DbPool};
use crate::members;

const DATE_FORMAT: &str = "%Y-%m-%d";

type BatchRow = (i64, String, i64, String, i64, i64, String);

type TransactionRow = (
    i64,
    String,
    String,
    i64,
    Option<String>,
    Option<i64>,
    Option<i64>,
    String,
    Option<i64>,
    Option<String>,
    i64,
    String,
    String,
);

const BATCH_COLUMNS: &str =
    "id, filename, uploaded_by, uploaded_at, row_count, matched_count, status";

const TRANSACTION_COLUMNS: &str = "id, transaction_date, description, amount_cents, reference, \
     balance_cents, user_id, match_confidence, matched_by, matched_at, import_batch_id, \
     raw_data, created_at";

/// Fixed-width UTC timestamps so text order is time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidData(format!("bad timestamp {raw:?}: {e}")))
}

fn parse_stored_date(raw: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| StoreError::InvalidData(format!("bad date {raw:?}: {e}")))
}

fn cents(money: Money) -> Result<i64, StoreError> {
    money
        .to_cents()
        .ok_or_else(|| StoreError::InvalidData(format!("amount {money} out of range")))
}

fn batch_from_row(row: BatchRow) -> Result<ImportBatch, StoreError> {
    let (id, filename, uploaded_by, uploaded_at, row_count, matched_count, status) = row;
    Ok(ImportBatch {
        id: BatchId(id),
        filename,
        uploaded_by: MemberId(uploaded_by),
        uploaded_at: parse_timestamp(&uploaded_at)?,
        row_count,
        matched_count,
        status: status.parse::<ImportStatus>().map_err(StoreError::InvalidData)?,
    })
}

/// Committed rows always carry a member and a match stamp; a row missing
/// either is reported rather than guessed at.
fn transaction_from_row(row: TransactionRow) -> Result<PersistedTransaction, StoreError> {
    let (
        id,
        transaction_date,
        description,
        amount_cents,
        reference,
        balance_cents,
        user_id,
        match_confidence,
        matched_by,
        matched_at,
        import_batch_id,
        raw_data,
        created_at,
    ) = row;

    let missing = |field: &str| StoreError::InvalidData(format!("transaction {id} has no {field}"));
    let raw_data: BTreeMap<String, String> =
        serde_json::from_str(&raw_data).map_err(StoreError::backend)?;

    Ok(PersistedTransaction {
        id,
        record: TransactionRecord {
            transaction: RawTransaction {
                transaction_date: parse_stored_date(&transaction_date)?,
                description,
                amount: Money::from_cents(amount_cents),
                reference,
                balance: balance_cents.map(Money::from_cents),
                raw_data,
            },
            user_id: MemberId(user_id.ok_or_else(|| missing("user_id"))?),
            match_confidence: match_confidence
                .parse::<MatchConfidence>()
                .map_err(StoreError::InvalidData)?,
            matched_by: MemberId(matched_by.ok_or_else(|| missing("matched_by"))?),
            matched_at: parse_timestamp(&matched_at.ok_or_else(|| missing("matched_at"))?)?,
            import_batch_id: BatchId(import_batch_id),
        },
        created_at: parse_timestamp(&created_at)?,
    })
}

/// [`ReconciliationStore`] over a SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn open(config: &StorageConfig) -> Result<Self, StoreError> {
        let pool = create_db(&config.database)
            .await
            .map_err(StoreError::backend)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl ReconciliationStore for SqliteStore {
    async fn payment_profiles(&self) -> Result<Vec<MemberPaymentProfile>, StoreError> {
        members::list_members(&self.pool).await
    }

    async fn set_payment_reference(
        &self,
        member: MemberId,
        reference: &str,
    ) -> Result<(), StoreError> {
        members::set_payment_reference(&self.pool, member, reference).await
    }

    async fn transactions_in_range(
        &self,
        range: DateRange,
    ) -> Result<Vec<PersistedTransaction>, StoreError> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE transaction_date >= ? AND transaction_date <= ? \
             ORDER BY transaction_date, id"
        ))
        .bind(range.start.format(DATE_FORMAT).to_string())
        .bind(range.end.format(DATE_FORMAT).to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        let found = rows
            .into_iter()
            .map(transaction_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(%range, found = found.len(), "transactions in range");
        Ok(found)
    }

    async fn create_batch(&self, batch: &NewImportBatch) -> Result<ImportBatch, StoreError> {
        let result = sqlx::query(
            "INSERT INTO import_batches (filename, uploaded_by, uploaded_at, row_count, matched_count, status) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(batch.filename.as_str())
        .bind(batch.uploaded_by.0)
        .bind(timestamp(batch.uploaded_at))
        .bind(batch.row_count)
        .bind(batch.matched_count)
        .bind(ImportStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        let id = BatchId(result.last_insert_rowid());
        debug!(batch = %id, filename = %batch.filename, "batch created");
        self.get_batch(id).await?.ok_or(StoreError::BatchNotFound(id))
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<ImportBatch>, StoreError> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM import_batches WHERE id = ?"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        row.map(batch_from_row).transpose()
    }

    async fn list_batches(&self) -> Result<Vec<ImportBatch>, StoreError> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM import_batches ORDER BY uploaded_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter().map(batch_from_row).collect()
    }

    async fn update_batch(
        &self,
        id: BatchId,
        status: ImportStatus,
        row_count: i64,
        matched_count: i64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE import_batches SET status = ?, row_count = ?, matched_count = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(row_count)
        .bind(matched_count)
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::BatchNotFound(id));
        }
        debug!(batch = %id, %status, row_count, matched_count, "batch updated");
        Ok(())
    }

    async fn insert_transactions(&self, rows: &[TransactionRecord]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;
        let mut written = 0;

        for record in rows {
            let t = &record.transaction;
            let raw_data = serde_json::to_string(&t.raw_data).map_err(StoreError::backend)?;
            let balance = t.balance.map(cents).transpose()?;

            let result = sqlx::query(
                "INSERT INTO transactions (transaction_date, description, amount_cents, reference, \
                 balance_cents, user_id, match_confidence, matched_by, matched_at, import_batch_id, raw_data) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (transaction_date, description, amount_cents) DO NOTHING",
            )
            .bind(t.transaction_date.format(DATE_FORMAT).to_string())
            .bind(&t.description)
            .bind(cents(t.amount)?)
            .bind(t.reference.as_deref())
            .bind(balance)
            .bind(record.user_id.0)
            .bind(record.match_confidence.as_str())
            .bind(record.matched_by.0)
            .bind(timestamp(record.matched_at))
            .bind(record.import_batch_id.0)
            .bind(raw_data)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::backend)?;

            written += result.rows_affected();
        }

        tx.commit().await.map_err(StoreError::backend)?;
        debug!(offered = rows.len(), written, "transactions inserted");
        Ok(written)
    }

    async fn batch_transactions(
        &self,
        id: BatchId,
    ) -> Result<Vec<PersistedTransaction>, StoreError> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE import_batch_id = ? ORDER BY transaction_date, id"
        ))
        .bind(id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter().map(transaction_from_row).collect()
    }

    async fn delete_batch(&self, id: BatchId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM import_batches WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::BatchNotFound(id));
        }
        debug!(batch = %id, "batch deleted");
        Ok(())
    }
}
