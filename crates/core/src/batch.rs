use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::member::MemberId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub i64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `Pending` until confirmed, then `Processing` while rows are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Pending,
    Processing,
    Completed,
}

impl ImportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportStatus::Pending => "pending",
            ImportStatus::Processing => "processing",
            ImportStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ImportStatus::Pending),
            "processing" => Ok(ImportStatus::Processing),
            "completed" => Ok(ImportStatus::Completed),
            other => Err(format!("Unknown import status: '{other}'")),
        }
    }
}

/// One statement upload and the rows it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportBatch {
    pub id: BatchId,
    pub filename: String,
    pub uploaded_by: MemberId,
    pub uploaded_at: DateTime<Utc>,
    pub row_count: i64,
    pub matched_count: i64,
    pub status: ImportStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImportBatch {
    pub filename: String,
    pub uploaded_by: MemberId,
    pub uploaded_at: DateTime<Utc>,
    pub row_count: i64,
    pub matched_count: i64,
}
