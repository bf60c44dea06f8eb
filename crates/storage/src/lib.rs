pub mod db;
pub mod members;
pub mod store;

pub use db::{create_db, DbPool};
pub use members::{add_member, get_member, list_members, set_payment_reference};
pub use store::SqliteStore;
