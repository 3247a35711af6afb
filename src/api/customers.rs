/// Customer registration and lookup endpoints
///
/// POST /api persists a customer synchronously and then hands the id to the
/// notification dispatcher without waiting. GET /api reads whatever the
/// store currently has committed (or, under read-uncommitted, has written).

use crate::{
    api::{error::ApiError, gate::gate_request},
    config::AuthConfig,
    customer::{
        storage::CustomerStorage,
        types::{CustomerRecord, NewCustomer},
    },
    runtime::notifier::NotificationDispatcher,
};
use axum::{
    body::Bytes,
    extract::{Query, State},
    middleware,
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Application state containing shared resources
#[derive(Debug, Clone)]
pub struct AppState {
    /// Customer record store (shared pool)
    pub storage: CustomerStorage,
    /// Spawns one notification task per registration
    pub notifier: NotificationDispatcher,
    /// Header gating settings
    pub auth: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(storage: CustomerStorage, notifier: NotificationDispatcher, auth: AuthConfig) -> Self {
        Self {
            storage,
            notifier,
            auth: Arc::new(auth),
        }
    }

    /// Persist a validated customer and schedule its notification
    ///
    /// Insert and dispatch run together in their own task, so dropping the
    /// request future (client disconnect) can never leave a committed record
    /// without its notification. The notification itself is not awaited.
    pub async fn register(&self, customer: NewCustomer) -> Result<(), ApiError> {
        let storage = self.storage.clone();
        let notifier = self.notifier.clone();

        let committed = tokio::spawn(async move {
            if let Err(e) = storage.insert_customer(&customer).await {
                tracing::error!("❌ Failed to persist customer {}: {}", customer.id, e);
                return Err(e);
            }

            // Fire and forget: the response goes out before the delay even starts.
            drop(notifier.dispatch(customer.id.clone()));
            tracing::info!("👤 Created customer: {}", customer.id);
            Ok(())
        });

        match committed.await {
            Ok(result) => result.map_err(ApiError::from),
            Err(e) => {
                tracing::error!("❌ Registration task failed: {}", e);
                Err(ApiError::Internal(e.to_string()))
            }
        }
    }
}

/// Query string of the lookup endpoint
#[derive(Debug, Deserialize)]
pub struct LookupParams {
    pub id: Option<String>,
}

/// Create customer routes
///
/// The header gate is a route layer, so unknown paths still 404 normally.
pub fn create_customer_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api", post(create_customer).get(get_customer))
        .route_layer(middleware::from_fn_with_state(state, gate_request))
}

/// Register a new customer
///
/// POST /api
/// Body: { "id": "...", "name": "...", "phone_number": "..." }
async fn create_customer(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    tracing::debug!("📄 Registration body: {}", String::from_utf8_lossy(&body));

    let customer = NewCustomer::from_json(&body).map_err(|e| {
        tracing::warn!("❌ Malformed registration payload: {}", e);
        ApiError::from(e)
    })?;
    customer.validate()?;

    state.register(customer).await?;

    Ok(Json(json!({ "message": "customer created" })))
}

/// Fetch a customer by numeric id
///
/// GET /api?id=42
async fn get_customer(
    State(state): State<AppState>,
    Query(params): Query<LookupParams>,
) -> Result<Json<CustomerRecord>, ApiError> {
    let customer_id: i64 = params
        .id
        .as_deref()
        .unwrap_or("")
        .parse()
        .map_err(|_| ApiError::MalformedRequest("malformed request".to_string()))?;

    // Ids are stored as TEXT; compare against the canonical decimal form.
    match state.storage.get_customer(&customer_id.to_string()).await {
        Ok(Some(customer)) => Ok(Json(customer)),
        Ok(None) => {
            tracing::debug!("🔍 Customer not found: {}", customer_id);
            Err(ApiError::NotFound)
        }
        Err(e) => {
            tracing::error!("❌ Failed to fetch customer {}: {}", customer_id, e);
            Err(ApiError::LookupFailed(e))
        }
    }
}
