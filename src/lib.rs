/// Customer notification service
///
/// Registers customer records over HTTP and asynchronously simulates sending
/// a confirmation SMS, recording delivery back into SQLite.

// Core configuration and setup
pub mod config;

// Customer records - types, validation and SQLite persistence
pub mod customer;

// Background notification tasks
pub mod runtime;

// HTTP API layer - header gating, registration and lookup endpoints
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use api::AppState;
pub use customer::{CustomerRecord, CustomerStorage, NewCustomer, StoreError};
pub use runtime::{DelaySource, FixedDelay, NotificationDispatcher, UniformDelay};
pub use server::{create_router, create_state, start_server};
