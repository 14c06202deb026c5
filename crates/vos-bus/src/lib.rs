//! # vos-bus — Event Bus
//!
//! Decouples trigger producers (timers, webhooks, agent signals) from
//! consumers (the rules runtime and any subscribed agent).
//!
//! ## Delivery
//!
//! Each subscribed [`EventHandler`] owns a bounded queue and a consumer
//! task. Delivery is at-least-once per handler: a
//! [`HandlerError::Transient`] failure is redelivered with exponential
//! backoff; a permanent failure, or exhausting redeliveries, moves the event
//! to the dead-letter list. Handlers must therefore be idempotent with
//! respect to the event id.
//!
//! ## Ordering
//!
//! Events from one source are delivered to each handler in timestamp order:
//! [`EventBus::publish`] rejects an event older than the last one published
//! by the same source, and publication is serialized so successive events
//! enter every queue in order. There is no ordering across sources.

pub mod bus;
pub mod error;
pub mod handler;
pub mod timer;

pub use bus::{BusConfig, BusStats, DeadLetter, EventBus};
pub use error::{BusError, HandlerError};
pub use handler::EventHandler;
pub use timer::{Cadence, TimerJob, TimerSource};
