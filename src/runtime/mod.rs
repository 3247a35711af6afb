/// Background runtime
///
/// Detached notification tasks that simulate SMS delivery latency and record
/// completion in the customer store.

pub mod notifier;

pub use notifier::{DelaySource, FixedDelay, NotificationDispatcher, UniformDelay};
