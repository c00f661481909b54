//! Scheduling capability: run a named callback later, once or on a cron.

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

pub type ScheduleFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, ScheduleError>> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("invalid cron expression '{expression}': {message}")]
    InvalidCron { expression: String, message: String },
    #[error("delay of {0} seconds is out of range")]
    DelayOutOfRange(u64),
    #[error("no scheduled task with id {0}")]
    NotFound(String),
}

/// When a callback should run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Schedule {
    /// Once, at a fixed instant.
    Scheduled { date: DateTime<Utc> },
    /// Once, after a delay counted from scheduling time.
    Delayed { delay_in_seconds: u64 },
    /// Repeatedly. Five-field expressions get a leading seconds field.
    Cron { cron: String },
}

impl Schedule {
    /// First run at or after `from`.
    pub fn next_run(&self, from: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        match self {
            Schedule::Scheduled { date } => Ok(*date),
            Schedule::Delayed { delay_in_seconds } => i64::try_from(*delay_in_seconds)
                .ok()
                .and_then(TimeDelta::try_seconds)
                .and_then(|delta| from.checked_add_signed(delta))
                .ok_or(ScheduleError::DelayOutOfRange(*delay_in_seconds)),
            Schedule::Cron { cron } => {
                let schedule = parse_cron(cron)?;
                schedule
                    .after(&from)
                    .next()
                    .ok_or_else(|| ScheduleError::InvalidCron {
                        expression: cron.clone(),
                        message: "expression never fires".to_string(),
                    })
            }
        }
    }

    #[must_use]
    pub fn is_recurring(&self) -> bool {
        matches!(self, Schedule::Cron { .. })
    }
}

fn parse_cron(expression: &str) -> Result<cron::Schedule, ScheduleError> {
    let normalized = expression.trim();
    let parsed = if normalized.split_whitespace().count() == 5 {
        cron::Schedule::from_str(&format!("0 {normalized}"))
    } else {
        cron::Schedule::from_str(normalized)
    };
    parsed.map_err(|e| ScheduleError::InvalidCron {
        expression: expression.to_string(),
        message: e.to_string(),
    })
}

/// A registered callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    pub id: String,
    pub callback: String,
    pub payload: Value,
    #[serde(flatten)]
    pub schedule: Schedule,
    /// Next time the callback fires.
    pub time: DateTime<Utc>,
}

/// Scheduling capability provided by the hosting environment.
pub trait Scheduler: Send + Sync {
    fn schedule<'a>(
        &'a self,
        when: Schedule,
        callback: &'a str,
        payload: Value,
    ) -> ScheduleFut<'a, ScheduledTask>;
    fn list(&self) -> ScheduleFut<'_, Vec<ScheduledTask>>;
    fn cancel<'a>(&'a self, id: &'a str) -> ScheduleFut<'a, ()>;
}

/// In-process scheduler. Due tasks are collected with [`MemoryScheduler::take_due`].
#[derive(Debug, Default)]
pub struct MemoryScheduler {
    tasks: Mutex<Vec<ScheduledTask>>,
}

impl MemoryScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return the tasks due at `now`, in firing order.
    ///
    /// Cron tasks stay registered with their next firing time.
    pub async fn take_due(&self, now: DateTime<Utc>) -> Vec<ScheduledTask> {
        let mut tasks = self.tasks.lock().await;
        let mut due = Vec::new();
        let mut kept = Vec::with_capacity(tasks.len());
        for task in tasks.drain(..) {
            if task.time > now {
                kept.push(task);
                continue;
            }
            if task.schedule.is_recurring() {
                match task.schedule.next_run(now) {
                    Ok(time) => kept.push(ScheduledTask {
                        time,
                        ..task.clone()
                    }),
                    Err(e) => tracing::warn!(task = %task.id, "Dropping cron task: {e}"),
                }
            }
            due.push(task);
        }
        *tasks = kept;
        due.sort_by_key(|task| task.time);
        due
    }
}

impl Scheduler for MemoryScheduler {
    fn schedule<'a>(
        &'a self,
        when: Schedule,
        callback: &'a str,
        payload: Value,
    ) -> ScheduleFut<'a, ScheduledTask> {
        Box::pin(async move {
            let time = when.next_run(Utc::now())?;
            let task = ScheduledTask {
                id: uuid::Uuid::new_v4().to_string(),
                callback: callback.to_string(),
                payload,
                schedule: when,
                time,
            };
            tracing::debug!(task = %task.id, callback, %time, "Scheduled task");
            self.tasks.lock().await.push(task.clone());
            Ok(task)
        })
    }

    fn list(&self) -> ScheduleFut<'_, Vec<ScheduledTask>> {
        Box::pin(async move { Ok(self.tasks.lock().await.clone()) })
    }

    fn cancel<'a>(&'a self, id: &'a str) -> ScheduleFut<'a, ()> {
        Box::pin(async move {
            let mut tasks = self.tasks.lock().await;
            let before = tasks.len();
            tasks.retain(|task| task.id != id);
            if tasks.len() == before {
                return Err(ScheduleError::NotFound(id.to_string()));
            }
            Ok(())
        })
    }
}
