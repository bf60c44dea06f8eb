use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use hackspace_core::{
    BatchId, DateRange, ImportBatch, ImportStatus, MemberId, MemberPaymentProfile,
    NewImportBatch, PersistedTransaction, TransactionRecord, TransactionSignature,
};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Import batch not found: {0}")]
    BatchNotFound(BatchId),
    #[error("Member not found: {0}")]
    MemberNotFound(MemberId),
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
    #[error("Storage error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        StoreError::Backend(e.into())
    }
}

/// Everything the import workflow needs from persistence and the member
/// directory. Deleting a batch must also remove its transactions.
#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    async fn payment_profiles(&self) -> Result<Vec<MemberPaymentProfile>, StoreError>;

    async fn set_payment_reference(
        &self,
        member: MemberId,
        reference: &str,
    ) -> Result<(), StoreError>;

    /// Both bounds inclusive.
    async fn transactions_in_range(
        &self,
        range: DateRange,
    ) -> Result<Vec<PersistedTransaction>, StoreError>;

    async fn create_batch(&self, batch: &NewImportBatch) -> Result<ImportBatch, StoreError>;

    async fn get_batch(&self, id: BatchId) -> Result<Option<ImportBatch>, StoreError>;

    /// Newest first.
    async fn list_batches(&self) -> Result<Vec<ImportBatch>, StoreError>;

    async fn update_batch(
        &self,
        id: BatchId,
        status: ImportStatus,
        row_count: i64,
        matched_count: i64,
    ) -> Result<(), StoreError>;

    /// Writes all rows or none. Rows whose signature is already stored are
    /// skipped; returns how many were written.
    async fn insert_transactions(&self, rows: &[TransactionRecord]) -> Result<u64, StoreError>;

    async fn batch_transactions(&self, id: BatchId)
        -> Result<Vec<PersistedTransaction>, StoreError>;

    async fn delete_batch(&self, id: BatchId) -> Result<(), StoreError>;
}

// ── In-memory store ───────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryState {
    members: Vec<MemberPaymentProfile>,
    batches: Vec<ImportBatch>,
    transactions: Vec<PersistedTransaction>,
    next_batch_id: i64,
    next_transaction_id: i64,
}

/// Keeps everything in process memory, for dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_reference_writes: bool,
    fail_inserts: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_members(members: Vec<MemberPaymentProfile>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                members,
                ..MemoryState::default()
            }),
            ..Self::default()
        }
    }

    /// Make `set_payment_reference` fail.
    #[cfg(test)]
    pub fn failing_reference_writes(mut self) -> Self {
        self.fail_reference_writes = true;
        self
    }

    /// Make `insert_transactions` fail.
    #[cfg(test)]
    pub fn failing_inserts(mut self) -> Self {
        self.fail_inserts = true;
        self
    }

    /// Seed an already-committed row, bypassing the batch workflow.
    #[cfg(test)]
    pub async fn seed_transaction(&self, record: TransactionRecord) {
        let mut state = self.state.lock().await;
        state.next_transaction_id += 1;
        let id = state.next_transaction_id;
        state.transactions.push(PersistedTransaction {
            id,
            record,
            created_at: Utc::now(),
        });
    }

    #[cfg(test)]
    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }
}

#[async_trait]
impl ReconciliationStore for MemoryStore {
    async fn payment_profiles(&self) -> Result<Vec<MemberPaymentProfile>, StoreError> {
        Ok(self.state.lock().await.members.clone())
    }

    async fn set_payment_reference(
        &self,
        member: MemberId,
        reference: &str,
    ) -> Result<(), StoreError> {
        if self.fail_reference_writes {
            return Err(StoreError::backend("reference writes disabled"));
        }
        let mut state = self.state.lock().await;
        let profile = state
            .members
            .iter_mut()
            .find(|p| p.user_id == member)
            .ok_or(StoreError::MemberNotFound(member))?;
        profile.payment_reference = Some(reference.to_string());
        Ok(())
    }

    async fn transactions_in_range(
        &self,
        range: DateRange,
    ) -> Result<Vec<PersistedTransaction>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| range.contains(t.record.transaction.transaction_date))
            .cloned()
            .collect())
    }

    async fn create_batch(&self, batch: &NewImportBatch) -> Result<ImportBatch, StoreError> {
        let mut state = self.state.lock().await;
        state.next_batch_id += 1;
        let created = ImportBatch {
            id: BatchId(state.next_batch_id),
            filename: batch.filename.clone(),
            uploaded_by: batch.uploaded_by,
            uploaded_at: batch.uploaded_at,
            row_count: batch.row_count,
            matched_count: batch.matched_count,
            status: ImportStatus::Pending,
        };
        state.batches.push(created.clone());
        Ok(created)
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<ImportBatch>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.batches.iter().find(|b| b.id == id).cloned())
    }

    async fn list_batches(&self) -> Result<Vec<ImportBatch>, StoreError> {
        let state = self.state.lock().await;
        let mut batches = state.batches.clone();
        batches.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then(b.id.0.cmp(&a.id.0)));
        Ok(batches)
    }

    async fn update_batch(
        &self,
        id: BatchId,
        status: ImportStatus,
        row_count: i64,
        matched_count: i64,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let batch = state
            .batches
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(StoreError::BatchNotFound(id))?;
        batch.status = status;
        batch.row_count = row_count;
        batch.matched_count = matched_count;
        Ok(())
    }

    async fn insert_transactions(&self, rows: &[TransactionRecord]) -> Result<u64, StoreError> {
        if self.fail_inserts {
            return Err(StoreError::backend("inserts disabled"));
        }
        let mut state = self.state.lock().await;
        let mut seen: HashSet<TransactionSignature> =
            state.transactions.iter().map(|t| t.signature()).collect();
        let now = Utc::now();
        let mut written = 0;
        for record in rows {
            if !seen.insert(record.transaction.signature()) {
                continue;
            }
            state.next_transaction_id += 1;
            let id = state.next_transaction_id;
            state.transactions.push(PersistedTransaction {
                id,
                record: record.clone(),
                created_at: now,
            });
            written += 1;
        }
        Ok(written)
    }

    async fn batch_transactions(
        &self,
        id: BatchId,
    ) -> Result<Vec<PersistedTransaction>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.record.import_batch_id == id)
            .cloned()
            .collect())
    }

    async fn delete_batch(&self, id: BatchId) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let before = state.batches.len();
        state.batches.retain(|b| b.id != id);
        if state.batches.len() == before {
            return Err(StoreError::BatchNotFound(id));
        }
        // Mirrors the ON DELETE CASCADE of the SQL schema.
        state.transactions.retain(|t| t.record.import_batch_id != id);
        Ok(())
    }
}
