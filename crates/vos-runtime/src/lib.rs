//! # vos-runtime — Runtime Assembly
//!
//! Wires the fact store, rules engine and action dispatcher into one
//! [`Runtime`] and enforces the concurrency model:
//!
//! - triggers for different products are processed concurrently;
//! - evaluation for one product is serialized by a per-product lock;
//! - actions computed under the lock are dispatched after it is released.
//!
//! [`RuntimeConfig`] and [`ProductRegistry`] are the static declarative
//! inputs loaded at startup. [`RulesHandler`] subscribes the runtime to an
//! [`EventBus`](vos_bus::EventBus).

pub mod config;
pub mod error;
pub mod handler;
pub mod locks;
pub mod registry;
pub mod runtime;

pub use config::{ApiConfig, ConfigError, EngineConfig, RuntimeConfig, TimerConfig};
pub use error::RuntimeError;
pub use handler::RulesHandler;
pub use locks::ProductLocks;
pub use registry::{ProductConfig, ProductRegistry};
pub use runtime::{ActionReport, ProductReport, Runtime, TriggerReport};
