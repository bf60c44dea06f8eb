pub mod csv;
pub mod dedupe;
pub mod match_engine;
pub mod normalize;
pub mod session;
pub mod store;

pub use self::csv::{parse_csv, ParseError, ParseOutcome};
pub use dedupe::{mark_duplicates, scan_range};
pub use match_engine::{auto_match_transactions, ReferenceMatcher};
pub use session::{ImportError, ImportManager, ImportReview, ReviewCounts, RowOutcome};
pub use store::{MemoryStore, ReconciliationStore, StoreError};
