//! Shared state for route handlers.

use std::sync::Arc;

use vos_bus::EventBus;
use vos_runtime::Runtime;

#[derive(Debug, Clone)]
pub struct AppState {
    pub runtime: Runtime,
    /// When present, submitted events are published to the bus and processed
    /// asynchronously; otherwise they are handled inline.
    pub bus: Option<Arc<EventBus>>,
    pub auth_token: Option<String>,
}

impl AppState {
    pub fn new(runtime: Runtime) -> Self {
        Self {
            runtime,
            bus: None,
            auth_token: None,
        }
    }

    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }
}
