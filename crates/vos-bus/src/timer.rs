//! # Timer Trigger Source
//!
//! Publishes scheduled trigger events. All times are UTC.
//!
//! A job fires once per slot: the first time the source observes a slot
//! boundary it has not fired for. The slot current when a job is first
//! observed is skipped, so starting the service at 15:00 does not replay
//! the 09:00 daily job.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Days, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use vos_core::{event_types, ProductId, TriggerEvent};

use crate::bus::EventBus;

/// When a job fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cadence", rename_all = "snake_case")]
pub enum Cadence {
    /// Every N minutes, aligned to the Unix epoch.
    Every { minutes: u32 },
    Daily { hour: u32, minute: u32 },
    Weekly {
        weekday: Weekday,
        hour: u32,
        minute: u32,
    },
}

impl Cadence {
    /// Start of the most recent slot at or before `now`, or `None` if the
    /// cadence is invalid (zero interval or out-of-range time of day).
    pub fn slot_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            Cadence::Every { minutes } => {
                let period = i64::from(minutes) * 60;
                if period == 0 {
                    return None;
                }
                let start = now.timestamp().div_euclid(period) * period;
                Utc.timestamp_opt(start, 0).single()
            }
            Cadence::Daily { hour, minute } => {
                let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
                let today = now.date_naive().and_time(time).and_utc();
                if today <= now {
                    Some(today)
                } else {
                    today.checked_sub_days(Days::new(1))
                }
            }
            Cadence::Weekly {
                weekday,
                hour,
                minute,
            } => {
                let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
                let back = (7 + now.weekday().num_days_from_monday()
                    - weekday.num_days_from_monday())
                    % 7;
                let candidate = now
                    .date_naive()
                    .checked_sub_days(Days::new(u64::from(back)))?
                    .and_time(time)
                    .and_utc();
                if candidate <= now {
                    Some(candidate)
                } else {
                    candidate.checked_sub_days(Days::new(7))
                }
            }
        }
    }
}

/// A scheduled job producing one event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerJob {
    pub job_id: String,
    pub event_type: String,
    #[serde(flatten)]
    pub cadence: Cadence,
    /// Restrict the event to one product; `None` broadcasts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    #[serde(skip)]
    last_slot: Option<DateTime<Utc>>,
}

impl TimerJob {
    pub fn new(job_id: impl Into<String>, event_type: impl Into<String>, cadence: Cadence) -> Self {
        Self {
            job_id: job_id.into(),
            event_type: event_type.into(),
            cadence,
            product_id: None,
            last_slot: None,
        }
    }

    pub fn for_product(mut self, product_id: ProductId) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn source(&self) -> String {
        format!("scheduler:{}", self.job_id)
    }

    /// The event to publish if a new slot has started since the last check.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<TriggerEvent> {
        let slot = self.cadence.slot_at(now)?;
        let previous = self.last_slot.replace(slot);
        match previous {
            Some(last) if slot > last => Some(self.event_for(slot)),
            _ => None,
        }
    }

    fn event_for(&self, slot: DateTime<Utc>) -> TriggerEvent {
        let event = TriggerEvent::new(self.source(), self.event_type.clone())
            .with_timestamp(slot)
            .with_payload(serde_json::json!({ "job_id": self.job_id }));
        match &self.product_id {
            Some(p) => event.with_product(p.clone()),
            None => event,
        }
    }
}

/// A set of timer jobs polled on a fixed tick.
#[derive(Debug, Clone, Default)]
pub struct TimerSource {
    jobs: Vec<TimerJob>,
}

impl TimerSource {
    pub fn new(jobs: Vec<TimerJob>) -> Self {
        Self { jobs }
    }

    /// Health check every 5 minutes, ads optimization every 6 hours, daily
    /// revenue report at 09:00, weekly content calendar Monday 09:00, weekly
    /// SEO audit Tuesday 10:00.
    pub fn default_schedules() -> Self {
        Self::new(vec![
            TimerJob::new(
                "monitor_health_check",
                event_types::HEALTH_CHECK,
                Cadence::Every { minutes: 5 },
            ),
            TimerJob::new(
                "ads_optimization",
                event_types::ADS_OPTIMIZATION,
                Cadence::Every { minutes: 360 },
            ),
            TimerJob::new(
                "daily_revenue_report",
                event_types::DAILY_REVENUE,
                Cadence::Daily { hour: 9, minute: 0 },
            ),
            TimerJob::new(
                "weekly_content_calendar",
                event_types::WEEKLY_CONTENT,
                Cadence::Weekly {
                    weekday: Weekday::Mon,
                    hour: 9,
                    minute: 0,
                },
            ),
            TimerJob::new(
                "weekly_seo_audit",
                event_types::WEEKLY_SEO,
                Cadence::Weekly {
                    weekday: Weekday::Tue,
                    hour: 10,
                    minute: 0,
                },
            ),
        ])
    }

    pub fn jobs(&self) -> &[TimerJob] {
        &self.jobs
    }

    /// Events for every job whose slot has turned over.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<TriggerEvent> {
        self.jobs.iter_mut().filter_map(|job| job.poll(now)).collect()
    }

    /// Poll every `tick` and publish due events until `shutdown` flips to
    /// true or its sender is dropped.
    pub async fn run(mut self, bus: Arc<EventBus>, tick: Duration, mut shutdown: watch::Receiver<bool>) {
        for job in &self.jobs {
            if job.cadence.slot_at(Utc::now()).is_none() {
                tracing::warn!(job_id = %job.job_id, cadence = ?job.cadence, "timer job has an invalid cadence and will never fire");
            }
        }
        self.due(Utc::now());
        tracing::info!(jobs = self.jobs.len(), "timer source started");

        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for event in self.due(Utc::now()) {
                        let event_type = event.event_type.clone();
                        if let Err(e) = bus.publish(event).await {
                            tracing::warn!(event_type = %event_type, error = %e, "failed to publish timer event");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("timer source stopped");
    }
}
