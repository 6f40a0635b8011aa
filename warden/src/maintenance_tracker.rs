// File: warden/src/maintenance_tracker.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Cancellation and progress handle shared between a running cycle and the
/// tracker.
#[derive(Debug, Clone, Default)]
pub struct CycleControl {
    cancel: CancellationToken,
    dispatched: Arc<AtomicUsize>,
}

impl CycleControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleWindow {
    pub run_id: String,
    pub schedule_label: String,
    pub started_at: DateTime<Utc>,
    pub dispatched: usize,
}

struct ActiveCycle {
    schedule_label: String,
    started_at: DateTime<Utc>,
    control: CycleControl,
}

impl ActiveCycle {
    fn window(&self, run_id: &str) -> CycleWindow {
        CycleWindow {
            run_id: run_id.to_string(),
            schedule_label: self.schedule_label.clone(),
            started_at: self.started_at,
            dispatched: self.control.dispatched(),
        }
    }
}

/// In-flight maintenance cycles, keyed by run id.
#[derive(Clone, Default)]
pub struct MaintenanceTracker {
    active: Arc<RwLock<HashMap<String, ActiveCycle>>>,
}

impl MaintenanceTracker {
    pub fn new() -> Self {
        Self {
            active: Arc::new(RwLock::new(HashMap::with_capacity(8))),
        }
    }

    pub async fn start_cycle(&self, run_id: &str, schedule_label: &str) -> CycleControl {
        let control = CycleControl::new();
        let cycle = ActiveCycle {
            schedule_label: schedule_label.to_string(),
            started_at: Utc::now(),
            control: control.clone(),
        };

        let mut active = self.active.write().await;
        active.insert(run_id.to_string(), cycle);

        info!("Started maintenance cycle {} for '{}'", run_id, schedule_label);
        control
    }

    pub async fn end_cycle(&self, run_id: &str) {
        let mut active = self.active.write().await;
        match active.remove(run_id) {
            Some(cycle) => {
                let elapsed = Utc::now().signed_duration_since(cycle.started_at);
                info!(
                    "Maintenance cycle {} for '{}' ended after {}s ({} dispatches)",
                    run_id,
                    cycle.schedule_label,
                    elapsed.num_seconds(),
                    cycle.control.dispatched()
                );
            }
            None => warn!("Tried to end maintenance cycle {} but it was not tracked", run_id),
        }
    }

    pub async fn is_running(&self, schedule_label: &str) -> bool {
        let active = self.active.read().await;
        active.values().any(|c| c.schedule_label == schedule_label)
    }

    pub async fn active_cycles(&self) -> Vec<CycleWindow> {
        let active = self.active.read().await;
        let mut windows: Vec<CycleWindow> = active
            .iter()
            .map(|(run_id, cycle)| cycle.window(run_id))
            .collect();
        windows.sort_by_key(|w| w.started_at);
        windows
    }

    /// Signal every in-flight cycle to stop. Entries are removed by the cycles
    /// themselves when they observe the cancellation.
    pub async fn cancel_all(&self) -> usize {
        let active = self.active.read().await;
        for cycle in active.values() {
            cycle.control.cancel();
        }

        if !active.is_empty() {
            warn!("Cancelling {} in-flight maintenance cycles", active.len());
        }
        active.len()
    }

    /// Cancel and forget cycles that have been running longer than
    /// `max_duration_hours`.
    pub async fn cleanup_expired(&self, max_duration_hours: i64) -> usize {
        let mut active = self.active.write().await;
        let cutoff = Utc::now() - chrono::Duration::hours(max_duration_hours);
        let initial_count = active.len();

        let mut cleaned = Vec::new();
        active.retain(|run_id, cycle| {
            let keep = cycle.started_at > cutoff;
            if !keep {
                cycle.control.cancel();
                cleaned.push(format!("{}:{}", run_id, cycle.schedule_label));
            }
            keep
        });

        let cleaned_count = initial_count - active.len();
        if cleaned_count > 0 {
            error!(
                "Cleaned up {} stuck maintenance cycles ({}h max): {:?}",
                cleaned_count, max_duration_hours, cleaned
            );
        }

        cleaned_count
    }
}
