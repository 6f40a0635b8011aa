//! Cron-based maintenance scheduling
//!
//! - **ScheduleRegistry**: the enabled schedule set and the earliest next run
//!   across it
//! - **MaintenanceOrchestrator**: registers one cron job per enabled schedule
//!   and runs the staged shutdown countdown when a job fires
//!
//! Expressions use the 6-field form (sec min hour day month dow) and are
//! evaluated in UTC. A standard 5-field expression is accepted and gets a `0`
//! seconds field prepended. Numeric weekdays follow the usual crontab meaning
//! (0 or 7 is Sunday, 1 is Monday) and are rewritten to names, so the registry
//! and the job scheduler read the same expression the same way.
//!
//! ```toml
//! [[schedules]]
//! cron_expression = "0 0 4 * * *"  # Daily at 04:00 UTC
//! label = "nightly restart"
//! ```

pub mod orchestrator;
pub use orchestrator::{run_cycle, CycleOutcome, MaintenanceOrchestrator, Stage, STAGES};

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

use crate::database::ScheduleRecord;
use crate::errors::ScheduleError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextRun {
    pub at: DateTime<Utc>,
    pub seconds_until: i64,
    pub label: String,
}

/// Label used in logs, broadcasts and run records.
pub fn schedule_label(schedule: &ScheduleRecord) -> String {
    match schedule.label.as_deref().map(str::trim) {
        Some(label) if !label.is_empty() => label.to_string(),
        _ => schedule.cron_expression.clone(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleRegistry {
    schedules: Vec<ScheduleRecord>,
}

impl ScheduleRegistry {
    pub fn new(schedules: Vec<ScheduleRecord>) -> Self {
        Self { schedules }
    }

    /// Collapse whitespace, prepend a seconds field to 5-field expressions and
    /// spell numeric weekdays as names.
    pub fn normalize(expression: &str) -> String {
        let mut fields: Vec<String> = expression.split_whitespace().map(str::to_string).collect();
        if fields.len() == 5 {
            fields.insert(0, "0".to_string());
        }
        if fields.len() == 6 {
            fields[5] = weekday_names(&fields[5]);
        }
        fields.join(" ")
    }

    pub fn parse_expression(expression: &str) -> Result<Schedule, ScheduleError> {
        let normalized = Self::normalize(expression);
        let field_count = normalized.split_whitespace().count();

        if field_count != 6 {
            return Err(ScheduleError::InvalidCron {
                expression: expression.to_string(),
                reason: format!(
                    "expected 5 or 6 fields (sec min hour day month dow), got {}",
                    field_count
                ),
            });
        }

        Schedule::from_str(&normalized).map_err(|e| ScheduleError::InvalidCron {
            expression: expression.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn replace(&mut self, schedules: Vec<ScheduleRecord>) {
        self.schedules = schedules;
    }

    pub fn schedules(&self) -> &[ScheduleRecord] {
        &self.schedules
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ScheduleRecord> {
        self.schedules.iter().filter(|s| s.enabled)
    }

    /// Next time strictly after `now` that `schedule` fires.
    pub fn next_run_for(
        schedule: &ScheduleRecord,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        let parsed = Self::parse_expression(&schedule.cron_expression)?;
        Ok(parsed.after(&now).next())
    }

    /// Earliest upcoming run across every enabled schedule. Malformed
    /// expressions are skipped.
    pub fn next_run(&self, now: DateTime<Utc>) -> Option<NextRun> {
        self.enabled()
            .filter_map(|schedule| match Self::next_run_for(schedule, now) {
                Ok(Some(at)) => Some((at, schedule)),
                Ok(None) => None,
                Err(e) => {
                    warn!("Skipping schedule {}: {}", schedule.id, e);
                    None
                }
            })
            .min_by_key(|(at, _)| *at)
            .map(|(at, schedule)| NextRun {
                at,
                seconds_until: (at - now).num_seconds(),
                label: schedule_label(schedule),
            })
    }
}

const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

fn weekday(value: &str) -> Option<usize> {
    value.parse::<usize>().ok().filter(|n| *n <= 7).map(|n| n % 7)
}

fn weekday_range(from: &str, to: &str, stepped: bool) -> Option<String> {
    let first = from.parse::<usize>().ok().filter(|n| *n <= 7)?;
    let last = to.parse::<usize>().ok().filter(|n| *n <= 7)?;
    match (first, last) {
        (7, 7) => Some("SUN".to_string()),
        (0, 7) => Some("SUN-SAT".to_string()),
        // A range ending in 7 wraps onto Sunday
        (first, 7) if !stepped => Some(format!("{}-SAT,SUN", WEEKDAYS[first])),
        (first, last) if last < 7 && first <= last => {
            Some(format!("{}-{}", WEEKDAYS[first], WEEKDAYS[last]))
        }
        _ => None,
    }
}

/// `1-5` → `MON-FRI`, `0,3` → `SUN,WED`. Anything that is not a plain number
/// or range is left for the parser to accept or reject.
fn weekday_names(field: &str) -> String {
    field
        .split(',')
        .map(|item| {
            let (base, step) = match item.split_once('/') {
                Some((base, step)) => (base, Some(step)),
                None => (item, None),
            };
            let named = match base.split_once('-') {
                Some((from, to)) => weekday_range(from, to, step.is_some()),
                None => weekday(base).map(|n| WEEKDAYS[n].to_string()),
            };
            match (named, step) {
                (Some(named), Some(step)) => format!("{}/{}", named, step),
                (Some(named), None) => named,
                (None, _) => item.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
