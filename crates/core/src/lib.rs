pub mod batch;
pub mod config;
pub mod member;
pub mod money;
pub mod period;
pub mod transaction;

pub use batch::{BatchId, ImportBatch, ImportStatus, NewImportBatch};
pub use config::{Config, ConfigError, DateOrder, ParserConfig, StorageConfig};
pub use member::{MemberId, MemberPaymentProfile, MIN_REFERENCE_LEN};
pub use money::Money;
pub use period::DateRange;
pub use transaction::{
    MatchConfidence, MatchedTransaction, PersistedTransaction, RawTransaction,
    TransactionRecord, TransactionSignature,
};
