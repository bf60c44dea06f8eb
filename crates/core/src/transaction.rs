use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::batch::BatchId;
use super::member::{MemberId, MemberPaymentProfile};
use super::money::Money;

/// One accepted row of a bank statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub transaction_date: NaiveDate,
    pub description: String,
    /// Positive is money in.
    pub amount: Money,
    pub reference: Option<String>,
    pub balance: Option<Money>,
    /// Original header → cell text, kept for audit.
    pub raw_data: BTreeMap<String, String>,
}

impl RawTransaction {
    pub fn signature(&self) -> TransactionSignature {
        TransactionSignature {
            transaction_date: self.transaction_date,
            description: self.description.clone(),
            amount: self.amount,
        }
    }
}

/// Identity used for duplicate detection: exact date, description and amount.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionSignature {
    pub transaction_date: NaiveDate,
    pub description: String,
    pub amount: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchConfidence {
    Auto,
    Manual,
    Unmatched,
}

impl MatchConfidence {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchConfidence::Auto => "auto",
            MatchConfidence::Manual => "manual",
            MatchConfidence::Unmatched => "unmatched",
        }
    }
}

impl fmt::Display for MatchConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchConfidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(MatchConfidence::Auto),
            "manual" => Ok(MatchConfidence::Manual),
            "unmatched" => Ok(MatchConfidence::Unmatched),
            other => Err(format!("Unknown match confidence: '{other}'")),
        }
    }
}

/// A parsed row annotated with its member link and review flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedTransaction {
    #[serde(flatten)]
    pub transaction: RawTransaction,
    pub user_id: Option<MemberId>,
    pub match_confidence: MatchConfidence,
    pub matched_user_name: Option<String>,
    pub is_duplicate: bool,
}

impl MatchedTransaction {
    pub fn unmatched(transaction: RawTransaction) -> Self {
        MatchedTransaction {
            transaction,
            user_id: None,
            match_confidence: MatchConfidence::Unmatched,
            matched_user_name: None,
            is_duplicate: false,
        }
    }

    pub fn auto(transaction: RawTransaction, profile: &MemberPaymentProfile) -> Self {
        MatchedTransaction {
            transaction,
            user_id: Some(profile.user_id),
            match_confidence: MatchConfidence::Auto,
            matched_user_name: Some(profile.user_name.clone()),
            is_duplicate: false,
        }
    }

    pub fn assign_manually(&mut self, profile: &MemberPaymentProfile) {
        self.user_id = Some(profile.user_id);
        self.match_confidence = MatchConfidence::Manual;
        self.matched_user_name = Some(profile.user_name.clone());
    }

    pub fn clear_match(&mut self) {
        self.user_id = None;
        self.match_confidence = MatchConfidence::Unmatched;
        self.matched_user_name = None;
    }

    pub fn is_matched(&self) -> bool {
        self.user_id.is_some()
    }

    /// Only matched, non-duplicate rows are ever committed.
    pub fn is_committable(&self) -> bool {
        !self.is_duplicate && self.is_matched()
    }

    pub fn signature(&self) -> TransactionSignature {
        self.transaction.signature()
    }
}

/// A committed row ready to be written, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(flatten)]
    pub transaction: RawTransaction,
    pub user_id: MemberId,
    pub match_confidence: MatchConfidence,
    pub matched_by: MemberId,
    pub matched_at: DateTime<Utc>,
    pub import_batch_id: BatchId,
}

impl TransactionRecord {
    /// `None` for rows that must not be persisted (duplicates, unmatched).
    pub fn from_reviewed(
        tx: &MatchedTransaction,
        import_batch_id: BatchId,
        matched_by: MemberId,
        matched_at: DateTime<Utc>,
    ) -> Option<Self> {
        if !tx.is_committable() {
            return None;
        }
        Some(TransactionRecord {
            transaction: tx.transaction.clone(),
            user_id: tx.user_id?,
            match_confidence: tx.match_confidence,
            matched_by,
            matched_at,
            import_batch_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTransaction {
    pub id: i64,
    #[serde(flatten)]
    pub record: TransactionRecord,
    pub created_at: DateTime<Utc>,
}

impl PersistedTransaction {
    pub fn signature(&self) -> TransactionSignature {
        self.record.transaction.signature()
    }
}
