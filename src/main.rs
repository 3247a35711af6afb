/// Customer notification service
///
/// Main entry point. Loads configuration from the environment and starts the
/// HTTP server.

use customer_notify::{config::Config, server::start_server};

/// Application entry point
///
/// The server provides:
/// - Customer registration at POST /api
/// - Customer lookup at GET /api?id=<integer>
/// - Health check at /healthz
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration (defaults to 0.0.0.0:8080 and customers.db)
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
