//! The event bus.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use vos_core::TriggerEvent;

use crate::error::{BusError, HandlerError};
use crate::handler::EventHandler;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusConfig {
    /// Per-handler queue capacity. Publishing waits when a queue is full.
    pub channel_capacity: usize,
    /// Redeliveries after the first attempt for transient failures.
    pub max_redeliveries: u32,
    /// Delay before the first redelivery; doubles on each retry.
    pub redelivery_backoff_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            max_redeliveries: 3,
            redelivery_backoff_ms: 100,
        }
    }
}

impl BusConfig {
    fn backoff(&self, redelivery: u32) -> Duration {
        let factor = 1u64.checked_shl(redelivery.saturating_sub(1)).unwrap_or(u64::MAX);
        Duration::from_millis(self.redelivery_backoff_ms.saturating_mul(factor))
    }
}

// ---------------------------------------------------------------------------
// Stats and dead letters
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    redelivered: AtomicU64,
    dead_lettered: AtomicU64,
}

/// Point-in-time delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    pub published: u64,
    /// Handler invocations, including redeliveries.
    pub delivered: u64,
    pub redelivered: u64,
    pub dead_lettered: u64,
}

/// An event a handler could not process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetter {
    pub handler: String,
    pub event: TriggerEvent,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Subscriber {
    name: String,
    handler: Arc<dyn EventHandler>,
    queue: mpsc::Sender<TriggerEvent>,
}

pub struct EventBus {
    config: BusConfig,
    subscribers: parking_lot::RwLock<Vec<Subscriber>>,
    /// Last published timestamp per source. Held across queue sends so that
    /// concurrent publishers cannot interleave one source's events.
    last_by_source: tokio::sync::Mutex<HashMap<String, DateTime<Utc>>>,
    counters: Arc<Counters>,
    dead_letters: Arc<parking_lot::Mutex<Vec<DeadLetter>>>,
    consumers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.subscribers.read().iter().map(|s| s.name.clone()).collect();
        f.debug_struct("EventBus")
            .field("config", &self.config)
            .field("subscribers", &names)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl EventBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            subscribers: parking_lot::RwLock::new(Vec::new()),
            last_by_source: tokio::sync::Mutex::new(HashMap::new()),
            counters: Arc::new(Counters::default()),
            dead_letters: Arc::new(parking_lot::Mutex::new(Vec::new())),
            consumers: parking_lot::Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Register a handler and spawn its consumer task. Must be called from
    /// within a Tokio runtime.
    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) -> Result<(), BusError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(BusError::ShutDown);
        }
        let name = handler.name().to_string();
        let mut subscribers = self.subscribers.write();
        if subscribers.iter().any(|s| s.name == name) {
            return Err(BusError::DuplicateHandler(name));
        }

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let consumer = Consumer {
            name: name.clone(),
            handler: Arc::clone(&handler),
            config: self.config.clone(),
            counters: Arc::clone(&self.counters),
            dead_letters: Arc::clone(&self.dead_letters),
        };
        self.consumers.lock().push(tokio::spawn(consumer.run(rx)));
        subscribers.push(Subscriber {
            name: name.clone(),
            handler,
            queue: tx,
        });
        tracing::info!(handler = %name, "handler subscribed");
        Ok(())
    }

    /// Publish an event to every accepting handler. Returns the number of
    /// handlers it was queued for.
    ///
    /// A handler whose consumer has stopped is skipped with a warning and
    /// unsubscribed; the event still reaches every other handler and counts
    /// as published.
    pub async fn publish(&self, event: TriggerEvent) -> Result<usize, BusError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(BusError::ShutDown);
        }

        let mut last_by_source = self.last_by_source.lock().await;
        if let Some(&last) = last_by_source.get(&event.source) {
            if event.timestamp < last {
                return Err(BusError::OutOfOrder {
                    source_name: event.source.clone(),
                    timestamp: event.timestamp,
                    last,
                });
            }
        }

        let subscribers: Vec<Subscriber> = self.subscribers.read().clone();
        let mut queued = 0;
        let mut closed = Vec::new();
        for subscriber in subscribers {
            if !subscriber.handler.accepts(&event) {
                continue;
            }
            if subscriber.queue.send(event.clone()).await.is_err() {
                tracing::warn!(
                    handler = %subscriber.name,
                    event_id = %event.event_id,
                    "handler queue closed, unsubscribing"
                );
                closed.push(subscriber.name);
                continue;
            }
            queued += 1;
        }
        if !closed.is_empty() {
            self.subscribers.write().retain(|s| !closed.contains(&s.name));
        }

        last_by_source.insert(event.source.clone(), event.timestamp);
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            source = %event.source,
            handlers = queued,
            "event published"
        );
        Ok(queued)
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.counters.published.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            redelivered: self.counters.redelivered.load(Ordering::Relaxed),
            dead_lettered: self.counters.dead_lettered.load(Ordering::Relaxed),
        }
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().clone()
    }

    pub fn handler_names(&self) -> Vec<String> {
        self.subscribers.read().iter().map(|s| s.name.clone()).collect()
    }

    /// Stop accepting events, let every consumer drain its queue, and wait
    /// for the consumers to finish.
    pub async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        // Taking the ordering lock waits out any in-flight publish.
        let _ordering = self.last_by_source.lock().await;
        self.subscribers.write().clear();
        let consumers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.consumers.lock());
        for consumer in consumers {
            if let Err(e) = consumer.await {
                tracing::error!(error = %e, "event consumer task failed");
            }
        }
        tracing::info!(stats = ?self.stats(), "event bus shut down");
    }
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

struct Consumer {
    name: String,
    handler: Arc<dyn EventHandler>,
    config: BusConfig,
    counters: Arc<Counters>,
    dead_letters: Arc<parking_lot::Mutex<Vec<DeadLetter>>>,
}

impl Consumer {
    async fn run(self, mut queue: mpsc::Receiver<TriggerEvent>) {
        while let Some(event) = queue.recv().await {
            self.deliver(event).await;
        }
        tracing::debug!(handler = %self.name, "event consumer stopped");
    }

    async fn deliver(&self, event: TriggerEvent) {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            self.counters.delivered.fetch_add(1, Ordering::Relaxed);
            let error = match self.handler.handle(&event).await {
                Ok(()) => return,
                Err(error) => error,
            };

            let redelivery = attempts;
            if error.is_transient() && redelivery <= self.config.max_redeliveries {
                let delay = self.config.backoff(redelivery);
                tracing::warn!(
                    handler = %self.name,
                    event_id = %event.event_id,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "handler failed, redelivering"
                );
                self.counters.redelivered.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(delay).await;
                continue;
            }

            self.dead_letter(event, error, attempts);
            return;
        }
    }

    fn dead_letter(&self, event: TriggerEvent, error: HandlerError, attempts: u32) {
        tracing::error!(
            handler = %self.name,
            event_id = %event.event_id,
            event_type = %event.event_type,
            attempts,
            error = %error,
            "event dead-lettered"
        );
        self.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);
        self.dead_letters.lock().push(DeadLetter {
            handler: self.name.clone(),
            event,
            error: error.to_string(),
            attempts,
            failed_at: Utc::now(),
        });
    }
}
