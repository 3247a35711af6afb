/// HTTP API Layer
///
/// This module provides the customer REST endpoints. It handles:
/// - Header gating (session token, bot user agents)
/// - Customer registration and lookup
/// - Mapping failures onto HTTP status codes

// Error taxonomy and IntoResponse mapping
pub mod error;

// Session token / user agent middleware
pub mod gate;

// Registration and lookup endpoints
pub mod customers;

// Re-export router builder and shared state
pub use customers::{create_customer_routes, AppState};
pub use error::ApiError;
