use chrono::Utc;
use hackspace_core::{
    BatchId, Config, DateOrder, ImportBatch, ImportStatus, MatchedTransaction, MemberId,
    MemberPaymentProfile, NewImportBatch, PersistedTransaction, TransactionRecord,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::csv::{parse_csv, ParseError};
use crate::dedupe::{mark_duplicates, scan_range};
use crate::match_engine::auto_match_transactions;
use crate::store::{ReconciliationStore, StoreError};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("No valid transactions found ({} parse errors)", .errors.len())]
    NoValidTransactions { errors: Vec<ParseError> },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Row {index} is out of range (batch has {len} rows)")]
    RowOutOfRange { index: usize, len: usize },
    #[error("Row {index} is a duplicate and cannot be matched")]
    DuplicateRow { index: usize },
    #[error("Import batch {id} is {status} and cannot be confirmed")]
    BatchNotPending { id: BatchId, status: ImportStatus },
}

/// What confirming the review would do with a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    WillImport,
    SkipUnmatched,
    SkipDuplicate,
}

impl RowOutcome {
    pub fn of(tx: &MatchedTransaction) -> Self {
        if tx.is_duplicate {
            RowOutcome::SkipDuplicate
        } else if tx.is_matched() {
            RowOutcome::WillImport
        } else {
            RowOutcome::SkipUnmatched
        }
    }
}

/// `matched` and `unmatched` never include duplicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewCounts {
    pub matched: usize,
    pub unmatched: usize,
    pub duplicates: usize,
}

impl ReviewCounts {
    pub fn tally(transactions: &[MatchedTransaction]) -> Self {
        transactions
            .iter()
            .fold(ReviewCounts::default(), |mut acc, tx| {
                match RowOutcome::of(tx) {
                    RowOutcome::WillImport => acc.matched += 1,
                    RowOutcome::SkipUnmatched => acc.unmatched += 1,
                    RowOutcome::SkipDuplicate => acc.duplicates += 1,
                }
                acc
            })
    }

    /// Rows that are not duplicates.
    pub fn new_rows(&self) -> usize {
        self.matched + self.unmatched
    }
}

/// An uploaded statement awaiting confirmation.
#[derive(Debug, Clone)]
pub struct ImportReview {
    pub batch: ImportBatch,
    pub transactions: Vec<MatchedTransaction>,
    /// Row-level problems that did not stop the upload.
    pub errors: Vec<ParseError>,
}

impl ImportReview {
    pub fn counts(&self) -> ReviewCounts {
        ReviewCounts::tally(&self.transactions)
    }

    pub fn outcome(&self, index: usize) -> Option<RowOutcome> {
        self.transactions.get(index).map(RowOutcome::of)
    }

    pub fn committable(&self) -> impl Iterator<Item = &MatchedTransaction> {
        self.transactions.iter().filter(|tx| tx.is_committable())
    }

    /// Links a non-duplicate row to `profile` by hand.
    pub fn assign_member(
        &mut self,
        index: usize,
        profile: &MemberPaymentProfile,
    ) -> Result<ReviewCounts, ImportError> {
        self.editable_row(index)?.assign_manually(profile);
        Ok(self.counts())
    }

    pub fn clear_member(&mut self, index: usize) -> Result<ReviewCounts, ImportError> {
        self.editable_row(index)?.clear_match();
        Ok(self.counts())
    }

    fn editable_row(&mut self, index: usize) -> Result<&mut MatchedTransaction, ImportError> {
        let len = self.transactions.len();
        let tx = self
            .transactions
            .get_mut(index)
            .ok_or(ImportError::RowOutOfRange { index, len })?;
        if tx.is_duplicate {
            return Err(ImportError::DuplicateRow { index });
        }
        Ok(tx)
    }
}

/// Drives one statement through parse → match → dedupe → review → confirm.
pub struct ImportManager<S: ReconciliationStore> {
    store: S,
    date_order: DateOrder,
}

impl<S: ReconciliationStore> ImportManager<S> {
    pub fn new(store: S, date_order: DateOrder) -> Self {
        Self { store, date_order }
    }

    pub fn from_config(store: S, config: &Config) -> Self {
        Self::new(store, config.parser.date_order)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Parses, matches and duplicate-checks `content`, then records a
    /// pending batch. Nothing is committed until [`Self::confirm_import`].
    pub async fn upload(
        &self,
        filename: &str,
        content: &str,
        uploaded_by: MemberId,
        profiles: &[MemberPaymentProfile],
    ) -> Result<ImportReview, ImportError> {
        let parsed = parse_csv(content, self.date_order);
        if parsed.transactions.is_empty() {
            warn!(filename, errors = parsed.errors.len(), "upload produced no transactions");
            return Err(ImportError::NoValidTransactions {
                errors: parsed.errors,
            });
        }

        let mut transactions = auto_match_transactions(parsed.transactions, profiles);

        if let Some(range) = scan_range(&transactions) {
            let existing = self.store.transactions_in_range(range).await?;
            let flagged = mark_duplicates(
                &mut transactions,
                existing.iter().map(PersistedTransaction::signature),
            );
            debug!(%range, existing = existing.len(), flagged, "duplicate scan");
        }

        let counts = ReviewCounts::tally(&transactions);
        let batch = self
            .store
            .create_batch(&NewImportBatch {
                filename: filename.to_string(),
                uploaded_by,
                uploaded_at: Utc::now(),
                row_count: counts.new_rows() as i64,
                matched_count: counts.matched as i64,
            })
            .await?;

        info!(
            batch = %batch.id,
            filename,
            rows = transactions.len(),
            matched = counts.matched,
            unmatched = counts.unmatched,
            duplicates = counts.duplicates,
            errors = parsed.errors.len(),
            "statement uploaded"
        );

        Ok(ImportReview {
            batch,
            transactions,
            errors: parsed.errors,
        })
    }

    /// [`Self::upload`] against the member directory held by the store.
    pub async fn upload_from_directory(
        &self,
        filename: &str,
        content: &str,
        uploaded_by: MemberId,
    ) -> Result<ImportReview, ImportError> {
        let profiles = self.store.payment_profiles().await?;
        self.upload(filename, content, uploaded_by, &profiles).await
    }

    /// Manual match on the review. When the member has no payment reference
    /// yet, the row's description becomes it so later statements auto-match.
    /// A failed reference write is logged and does not undo the match.
    pub async fn assign_member(
        &self,
        review: &mut ImportReview,
        index: usize,
        profile: &MemberPaymentProfile,
    ) -> Result<ReviewCounts, ImportError> {
        let counts = review.assign_member(index, profile)?;

        if !profile.has_reference() {
            let description = review.transactions[index].transaction.description.clone();
            match self
                .store
                .set_payment_reference(profile.user_id, &description)
                .await
            {
                Ok(()) => info!(member = %profile.user_id, reference = %description, "payment reference learned"),
                Err(e) => warn!(member = %profile.user_id, error = %e, "could not save payment reference"),
            }
        }

        Ok(counts)
    }

    /// Commits the matched, non-duplicate rows of a reviewed batch.
    ///
    /// An empty commit completes the batch with zero counts. If the row
    /// write fails the error is returned and the batch stays `processing`.
    pub async fn confirm_import(
        &self,
        batch_id: BatchId,
        transactions: &[MatchedTransaction],
        confirmed_by: MemberId,
    ) -> Result<ImportBatch, ImportError> {
        let batch = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or(StoreError::BatchNotFound(batch_id))?;
        if batch.status == ImportStatus::Completed {
            return Err(ImportError::BatchNotPending {
                id: batch_id,
                status: batch.status,
            });
        }

        let now = Utc::now();
        let records: Vec<TransactionRecord> = transactions
            .iter()
            .filter_map(|tx| TransactionRecord::from_reviewed(tx, batch_id, confirmed_by, now))
            .collect();

        if records.is_empty() {
            self.store
                .update_batch(batch_id, ImportStatus::Completed, 0, 0)
                .await?;
            info!(batch = %batch_id, "import confirmed with nothing to commit");
            return Ok(ImportBatch {
                status: ImportStatus::Completed,
                row_count: 0,
                matched_count: 0,
                ..batch
            });
        }

        let pending = records.len() as i64;
        self.store
            .update_batch(batch_id, ImportStatus::Processing, pending, pending)
            .await?;

        let written = self.store.insert_transactions(&records).await? as i64;
        if written < pending {
            warn!(batch = %batch_id, pending, written, "rows already stored were skipped");
        }

        self.store
            .update_batch(batch_id, ImportStatus::Completed, written, written)
            .await?;
        info!(batch = %batch_id, confirmed_by = %confirmed_by, written, "import confirmed");

        Ok(ImportBatch {
            status: ImportStatus::Completed,
            row_count: written,
            matched_count: written,
            ..batch
        })
    }

    pub async fn confirm_review(
        &self,
        review: &ImportReview,
        confirmed_by: MemberId,
    ) -> Result<ImportBatch, ImportError> {
        self.confirm_import(review.batch.id, &review.transactions, confirmed_by)
            .await
    }

    pub async fn list_batches(&self) -> Result<Vec<ImportBatch>, ImportError> {
        Ok(self.store.list_batches().await?)
    }

    pub async fn get_batch(&self, id: BatchId) -> Result<Option<ImportBatch>, ImportError> {
        Ok(self.store.get_batch(id).await?)
    }

    pub async fn batch_transactions(
        &self,
        id: BatchId,
    ) -> Result<Vec<PersistedTransaction>, ImportError> {
        Ok(self.store.batch_transactions(id).await?)
    }

    /// Removes the batch and every transaction it produced.
    pub async fn delete_batch(&self, id: BatchId) -> Result<(), ImportError> {
        self.store.delete_batch(id).await?;
        info!(batch = %id, "import batch deleted");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
