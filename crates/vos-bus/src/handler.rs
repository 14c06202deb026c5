//! The consumer seam.

use async_trait::async_trait;
use vos_core::TriggerEvent;

use crate::error::HandlerError;

/// A consumer of trigger events.
///
/// The same event (same `event_id`) may be delivered more than once.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Unique name, used for logging and dead letters.
    fn name(&self) -> &str;

    /// Whether this handler wants the event. Rejected events are not queued.
    fn accepts(&self, _event: &TriggerEvent) -> bool {
        true
    }

    async fn handle(&self, event: &TriggerEvent) -> Result<(), HandlerError>;
}
