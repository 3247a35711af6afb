/// Customer record layer
///
/// Record types and payload validation, the shared SQLite pool, and the
/// transactional record store used by the API and notification tasks.

pub mod database;
pub mod storage;
pub mod types;

pub use database::open_pool;
pub use storage::{CustomerStorage, StoreError};
pub use types::{CustomerRecord, NewCustomer, ValidationError};
