//! Realtime delivery.
//!
//! Subscriptions bridge the change feed and the store's ordered range
//! queries into an exactly-once, canonically-ordered delivery stream per
//! viewer, with resume and optimistic-echo reconciliation.

mod subscriber;

pub use subscriber::{Delivery, RealtimeSync, SubscribeOptions, Subscription};
