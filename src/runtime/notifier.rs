/// Background SMS notification dispatcher
///
/// Each successful registration gets exactly one detached tokio task that
/// waits out a randomized delivery delay and then records `sms_sent = true`.
/// Tasks are fire-and-forget: their failures are logged and dropped, and
/// nothing ever joins them on the request path.

use crate::{config::NotificationConfig, customer::storage::CustomerStorage};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::task::JoinHandle;

/// Source of per-task delivery delays
///
/// Pluggable so tests can shrink or pin the delay instead of sleeping for
/// real seconds.
pub trait DelaySource: Send + Sync + fmt::Debug {
    /// Delay to wait before the next notification is recorded
    fn next_delay(&self) -> Duration;
}

/// `unit * (base_units + jitter)` with jitter uniform in `0..jitter_units`
///
/// With the defaults (10, 10, 1s) this yields whole seconds in [10, 20).
#[derive(Debug)]
pub struct UniformDelay {
    base_units: u32,
    jitter_units: u32,
    unit: Duration,
    rng: Mutex<StdRng>,
}

impl UniformDelay {
    /// Create a delay source; `seed` makes the sequence reproducible
    pub fn new(base_units: u32, jitter_units: u32, unit: Duration, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            base_units,
            jitter_units,
            unit,
            rng: Mutex::new(rng),
        }
    }

    pub fn from_config(config: &NotificationConfig) -> Self {
        Self::new(config.base_units, config.jitter_units, config.unit, config.seed)
    }

    /// Draw the next delay expressed in units
    pub fn sample_units(&self) -> u32 {
        if self.jitter_units == 0 {
            return self.base_units;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.base_units + rng.gen_range(0..self.jitter_units)
    }
}

impl DelaySource for UniformDelay {
    fn next_delay(&self) -> Duration {
        self.unit * self.sample_units()
    }
}

/// Always the same delay
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

impl DelaySource for FixedDelay {
    fn next_delay(&self) -> Duration {
        self.0
    }
}

/// Spawns and tracks notification tasks
///
/// Holds only the store handle; each task carries just the customer id and
/// re-reads nothing, so it can never act on a stale copy of the record.
#[derive(Clone)]
pub struct NotificationDispatcher {
    storage: CustomerStorage,
    delay: Arc<dyn DelaySource>,
    in_flight: Arc<AtomicUsize>,
}

impl fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("delay", &self.delay)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl NotificationDispatcher {
    pub fn new(storage: CustomerStorage, delay: Arc<dyn DelaySource>) -> Self {
        Self {
            storage,
            delay,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Schedule the notification for one freshly committed customer
    ///
    /// Returns immediately. The handle is only for tests and shutdown
    /// diagnostics; request handlers drop it. There is no cancellation: once
    /// spawned, the task runs to completion unless the runtime itself stops.
    pub fn dispatch(&self, customer_id: String) -> JoinHandle<()> {
        let delay = self.delay.next_delay();
        let storage = self.storage.clone();
        let guard = InFlightGuard::enter(Arc::clone(&self.in_flight));

        tracing::debug!("📨 Scheduling SMS for customer {} in {:?}", customer_id, delay);

        tokio::spawn(async move {
            let _guard = guard;
            // No transaction or lock is held while waiting.
            tokio::time::sleep(delay).await;
            send_sms(&storage, &customer_id).await;
        })
    }

    /// Number of tasks scheduled but not yet finished
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Record delivery for one customer; failures end here
async fn send_sms(storage: &CustomerStorage, customer_id: &str) {
    match storage.mark_sms_sent(customer_id).await {
        Ok(0) => {
            tracing::warn!("⚠️ SMS sent but no customer row matched id {}", customer_id);
        }
        Ok(_) => {
            tracing::info!("✅ Sent SMS to customer: {}", customer_id);
        }
        Err(e) => {
            tracing::error!("❌ Failed to record SMS delivery for customer {}: {}", customer_id, e);
        }
    }
}

struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
