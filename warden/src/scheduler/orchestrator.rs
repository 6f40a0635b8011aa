// File: warden/src/scheduler/orchestrator.rs
use anyhow::{anyhow, Result};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{schedule_label, ScheduleRegistry};
use crate::console::ConsoleCommands;
use crate::constants::stages;
use crate::database::{MaintenanceRun, MaintenanceStore, ScheduleRecord};
use crate::errors::ScheduleError;
use crate::maintenance_tracker::{CycleControl, MaintenanceTracker};

/// One countdown step: broadcast `message`, then wait `wait_after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub message: &'static str,
    pub wait_after: Duration,
}

pub const STAGES: [Stage; 5] = [
    Stage {
        message: "Server restarting in 10 minutes",
        wait_after: stages::AFTER_TEN_MINUTE_WARNING,
    },
    Stage {
        message: "Server restarting in 5 minutes",
        wait_after: stages::AFTER_FIVE_MINUTE_WARNING,
    },
    Stage {
        message: "Server restarting in 1 minute",
        wait_after: stages::AFTER_ONE_MINUTE_WARNING,
    },
    Stage {
        message: "Server restarting in 30 seconds",
        wait_after: stages::AFTER_THIRTY_SECOND_WARNING,
    },
    Stage {
        message: "Server restarting in 5 seconds",
        wait_after: stages::AFTER_FIVE_SECOND_WARNING,
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// All warnings and the stop command were dispatched
    Completed { dispatches: usize },
    /// A dispatch failed; nothing after it was attempted
    Aborted { dispatches: usize, error: String },
    /// Cancelled between stages
    Cancelled { dispatches: usize },
}

impl CycleOutcome {
    pub fn dispatches(&self) -> usize {
        match self {
            CycleOutcome::Completed { dispatches }
            | CycleOutcome::Aborted { dispatches, .. }
            | CycleOutcome::Cancelled { dispatches } => *dispatches,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            CycleOutcome::Completed { .. } => "completed",
            CycleOutcome::Aborted { .. } => "failed",
            CycleOutcome::Cancelled { .. } => "cancelled",
        }
    }
}

/// Run the staged countdown to completion, the first failed dispatch, or
/// cancellation. Stages are strictly sequential.
pub async fn run_cycle(
    commands: &ConsoleCommands,
    label: &str,
    control: &CycleControl,
) -> CycleOutcome {
    for stage in STAGES.iter() {
        if control.is_cancelled() {
            return CycleOutcome::Cancelled {
                dispatches: control.dispatched(),
            };
        }

        if let Err(e) = commands.broadcast(stage.message).await {
            error!(
                "✗ Maintenance '{}' aborted at '{}': {}",
                label, stage.message, e
            );
            return CycleOutcome::Aborted {
                dispatches: control.dispatched(),
                error: e.to_string(),
            };
        }
        control.record_dispatch();
        info!("Maintenance '{}': broadcast '{}'", label, stage.message);

        tokio::select! {
            _ = control.cancelled() => {
                warn!("Maintenance '{}' cancelled after '{}'", label, stage.message);
                return CycleOutcome::Cancelled { dispatches: control.dispatched() };
            }
            _ = tokio::time::sleep(stage.wait_after) => {}
        }
    }

    if control.is_cancelled() {
        return CycleOutcome::Cancelled {
            dispatches: control.dispatched(),
        };
    }

    match commands.stop().await {
        Ok(_) => {
            control.record_dispatch();
            info!("✓ Maintenance '{}' sent stop", label);
            CycleOutcome::Completed {
                dispatches: control.dispatched(),
            }
        }
        Err(e) => {
            error!("✗ Maintenance '{}' failed to send stop: {}", label, e);
            CycleOutcome::Aborted {
                dispatches: control.dispatched(),
                error: e.to_string(),
            }
        }
    }
}

/// Spawns cycles as independent tasks and records each run.
#[derive(Clone)]
struct CycleLauncher {
    commands: Arc<ConsoleCommands>,
    store: Arc<dyn MaintenanceStore>,
    tracker: MaintenanceTracker,
    cycles: Arc<Mutex<Vec<JoinHandle<CycleOutcome>>>>,
}

impl CycleLauncher {
    async fn launch(&self, schedule: ScheduleRecord) -> String {
        let run_id = Uuid::new_v4().to_string();
        let label = schedule_label(&schedule);
        let control = self.tracker.start_cycle(&run_id, &label).await;

        let launcher = self.clone();
        let id = run_id.clone();
        let handle = tokio::spawn(async move {
            launcher.execute(id, schedule, label, control).await
        });

        let mut cycles = self.cycles.lock().await;
        cycles.retain(|h| !h.is_finished());
        cycles.push(handle);

        run_id
    }

    async fn execute(
        &self,
        run_id: String,
        schedule: ScheduleRecord,
        label: String,
        control: CycleControl,
    ) -> CycleOutcome {
        info!("🔧 Starting maintenance countdown '{}' ({})", label, run_id);

        let mut run = MaintenanceRun {
            id: run_id.clone(),
            schedule_label: label.clone(),
            cron_expression: schedule.cron_expression.clone(),
            status: "started".to_string(),
            stages_completed: 0,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
        };

        if let Err(e) = self.store.store_maintenance_run(&run).await {
            error!("Failed to store maintenance run {}: {}", run_id, e);
        }

        let outcome = run_cycle(&self.commands, &label, &control).await;

        run.status = outcome.status().to_string();
        run.stages_completed = outcome.dispatches() as i64;
        run.completed_at = Some(Utc::now());
        if let CycleOutcome::Aborted { error, .. } = &outcome {
            run.error_message = Some(error.clone());
        }

        if let Err(e) = self.store.store_maintenance_run(&run).await {
            error!("Failed to update maintenance run {}: {}", run_id, e);
        }

        self.tracker.end_cycle(&run_id).await;
        outcome
    }
}

pub struct MaintenanceOrchestrator {
    scheduler: JobScheduler,
    launcher: CycleLauncher,
    cancel_in_flight_on_replace: bool,
    jobs: Mutex<Vec<(Uuid, ScheduleRecord)>>,
}

impl MaintenanceOrchestrator {
    pub async fn new(
        commands: Arc<ConsoleCommands>,
        store: Arc<dyn MaintenanceStore>,
        tracker: MaintenanceTracker,
        cancel_in_flight_on_replace: bool,
    ) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| ScheduleError::SchedulerFailed {
                reason: format!("create: {}", e),
            })?;

        Ok(Self {
            scheduler,
            launcher: CycleLauncher {
                commands,
                store,
                tracker,
                cycles: Arc::new(Mutex::new(Vec::new())),
            },
            cancel_in_flight_on_replace,
            jobs: Mutex::new(Vec::new()),
        })
    }

    pub fn tracker(&self) -> &MaintenanceTracker {
        &self.launcher.tracker
    }

    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        self.scheduler
            .start()
            .await
            .map_err(|e| ScheduleError::SchedulerFailed {
                reason: format!("start: {}", e),
            })?;
        info!("✓ Maintenance scheduler started (6-field cron, UTC)");
        Ok(())
    }

    /// The schedules whose jobs are currently registered.
    pub async fn registered(&self) -> Vec<ScheduleRecord> {
        let jobs = self.jobs.lock().await;
        jobs.iter().map(|(_, schedule)| schedule.clone()).collect()
    }

    /// Replace every pending trigger with one job per enabled schedule.
    /// In-flight cycles keep running unless `cancel_in_flight_on_replace` is
    /// set. Returns the number of jobs registered.
    #[instrument(skip(self, schedules), fields(count = schedules.len()))]
    pub async fn register(&self, schedules: &[ScheduleRecord]) -> Result<usize> {
        let mut jobs = self.jobs.lock().await;

        for (job_id, schedule) in jobs.drain(..) {
            if let Err(e) = self.scheduler.remove(&job_id).await {
                warn!(
                    "Failed to remove job for '{}': {}",
                    schedule_label(&schedule),
                    e
                );
            }
        }

        if self.cancel_in_flight_on_replace {
            self.launcher.tracker.cancel_all().await;
        }

        for schedule in schedules.iter().filter(|s| s.enabled) {
            let label = schedule_label(schedule);
            match self.add_job(schedule).await {
                Ok(job_id) => {
                    info!("✓ Scheduled maintenance '{}': {}", label, schedule.cron_expression);
                    jobs.push((job_id, schedule.clone()));
                }
                Err(e) => {
                    error!(
                        "✗ Failed to schedule maintenance '{}': {} (schedule: {})",
                        label, e, schedule.cron_expression
                    );
                }
            }
        }

        if jobs.is_empty() {
            warn!("No enabled maintenance schedules registered");
        }

        Ok(jobs.len())
    }

    async fn add_job(&self, schedule: &ScheduleRecord) -> Result<Uuid> {
        ScheduleRegistry::parse_expression(&schedule.cron_expression)?;
        let expression = ScheduleRegistry::normalize(&schedule.cron_expression);

        let launcher = self.launcher.clone();
        let record = schedule.clone();

        let job = Job::new_async(expression.as_str(), move |_uuid, _scheduler| {
            let launcher = launcher.clone();
            let record = record.clone();

            Box::pin(async move {
                launcher.launch(record).await;
            })
        })
        .map_err(|e| anyhow!("Failed to create maintenance job for '{}': {}", expression, e))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| {
                ScheduleError::SchedulerFailed {
                    reason: format!("add job '{}': {}", expression, e),
                }
                .into()
            })
    }

    /// Start a cycle for `schedule` immediately, outside its cron timeline.
    #[instrument(skip(self, schedule), fields(label = %schedule_label(schedule)))]
    pub async fn trigger_now(&self, schedule: &ScheduleRecord) -> String {
        self.launcher.launch(schedule.clone()).await
    }

    /// Wait for every spawned cycle to finish.
    pub async fn join_cycles(&self) -> Vec<CycleOutcome> {
        let handles: Vec<JoinHandle<CycleOutcome>> = {
            let mut cycles = self.launcher.cycles.lock().await;
            cycles.drain(..).collect()
        };

        join_all(handles)
            .await
            .into_iter()
            .filter_map(|result| match result {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    error!("Maintenance cycle task failed: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Stop firing new jobs, cancel in-flight cycles and wait for them.
    pub async fn shutdown(&self) -> Vec<CycleOutcome> {
        let mut scheduler = self.scheduler.clone();
        if let Err(e) = scheduler.shutdown().await {
            warn!("Failed to shut down JobScheduler: {}", e);
        }

        self.launcher.tracker.cancel_all().await;
        self.join_cycles().await
    }
}
