// File: warden/src/main.rs
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use warden::config::ConfigManager;
use warden::console::{ConsoleCommands, RconClient, RemoteConsole, RosterQuery};
use warden::constants::{cleanup, tail};
use warden::database::{Database, MaintenanceStore, ScheduleRecord};
use warden::logs::{ActivityFeed, LogTailer, TailerSettings};
use warden::maintenance_tracker::MaintenanceTracker;
use warden::scheduler::{MaintenanceOrchestrator, ScheduleRegistry};
use warden::sessions::{run_ingest, SessionTracker};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("warden=info".parse()?)
        .add_directive("tokio_cron_scheduler=warn".parse()?)
        .add_directive("sqlx=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    info!("Starting warden");

    let config_dir = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    let config_manager = ConfigManager::new(config_dir).await?;
    let config = config_manager.get_current_config();

    let database = Arc::new(Database::new(&config.database_path).await?);

    seed_schedules(&database, &config.schedules).await?;

    // Log pipeline: tailer -> channel -> session tracker
    let feed = Arc::new(ActivityFeed::new(config.activity_capacity));
    let session_tracker = Arc::new(SessionTracker::new(
        database.clone(),
        config.sessions.reconnect_policy,
    ));
    info!(
        "Session tracker initialized (reconnect policy: {:?})",
        session_tracker.policy()
    );

    let (event_tx, event_rx) = mpsc::channel(tail::EVENT_CHANNEL_CAPACITY);
    let ingest = tokio::spawn(run_ingest(session_tracker, feed.clone(), event_rx));

    let shutdown = CancellationToken::new();
    let tailer = LogTailer::new(
        TailerSettings::from_config(&config.logs),
        database.clone(),
        event_tx,
    )
    .spawn(shutdown.child_token());
    info!("Log tailer started on {}", config.logs.live_path().display());

    // Remote console
    let console: Arc<dyn RemoteConsole> = Arc::new(RconClient::from_config(&config.console));
    let roster = RosterQuery::new(console.clone());
    let online = roster.roster().await;
    info!(
        "{} players online at startup: {:?}",
        online.len(),
        online.iter().map(|p| p.username.as_str()).collect::<Vec<_>>()
    );

    let commands = Arc::new(ConsoleCommands::new(
        console,
        config.console.broadcast_command.clone(),
    ));

    // Maintenance scheduling
    let maintenance_tracker = MaintenanceTracker::new();
    let orchestrator = Arc::new(
        MaintenanceOrchestrator::new(
            commands,
            database.clone(),
            maintenance_tracker.clone(),
            config.maintenance.cancel_in_flight_on_replace,
        )
        .await?,
    );

    let schedules = database.enabled_schedules().await?;
    orchestrator.register(&schedules).await?;
    orchestrator.start().await?;
    log_next_run(&schedules);

    let refresh = tokio::spawn(refresh_schedules(
        database.clone(),
        orchestrator.clone(),
        schedules,
        Duration::from_secs(config.maintenance.schedule_refresh_seconds),
        shutdown.child_token(),
    ));

    let cleanup_token = shutdown.child_token();
    let cleanup_tracker = maintenance_tracker.clone();
    let cleanup_loop = tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(cleanup::CLEANUP_INTERVAL_SECONDS));
        loop {
            tokio::select! {
                _ = cleanup_token.cancelled() => break,
                _ = interval.tick() => {
                    let cleaned = cleanup_tracker
                        .cleanup_expired(cleanup::MAINTENANCE_MAX_HOURS)
                        .await;
                    if cleaned > 0 {
                        warn!(
                            "Cleaned up {} maintenance cycles older than {} hours",
                            cleaned,
                            cleanup::MAINTENANCE_MAX_HOURS
                        );
                    }
                }
            }
        }
    });

    info!("Background tasks started");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    shutdown.cancel();
    tailer.shutdown().await;

    match ingest.await {
        Ok(applied) => info!("Ingest worker drained ({} events applied)", applied),
        Err(e) => error!("Ingest worker failed: {}", e),
    }

    let outcomes = orchestrator.shutdown().await;
    if !outcomes.is_empty() {
        info!("Stopped {} in-flight maintenance cycles", outcomes.len());
    }

    for task in [refresh, cleanup_loop] {
        if let Err(e) = task.await {
            error!("Background task failed: {}", e);
        }
    }

    info!(
        "Activity feed held {} recent events ({} evicted)",
        feed.recent_events(feed.capacity()).await.len(),
        feed.evicted()
    );
    info!("warden stopped");

    Ok(())
}

/// Copy configured schedules into an empty store. Once the store holds
/// schedules it is the source of truth.
async fn seed_schedules(
    database: &Database,
    configured: &[warden::config::ScheduleConfig],
) -> Result<()> {
    if !database.list_schedules().await?.is_empty() {
        return Ok(());
    }

    for schedule in configured {
        database
            .insert_schedule(
                &schedule.cron_expression,
                schedule.label.as_deref(),
                schedule.enabled,
            )
            .await?;
    }

    if !configured.is_empty() {
        info!("Seeded {} schedules from configuration", configured.len());
    }
    Ok(())
}

fn log_next_run(schedules: &[ScheduleRecord]) {
    match ScheduleRegistry::new(schedules.to_vec()).next_run(Utc::now()) {
        Some(next) => info!(
            "Next maintenance '{}' at {} (in {}s)",
            next.label, next.at, next.seconds_until
        ),
        None => info!("No upcoming maintenance"),
    }
}

async fn refresh_schedules(
    database: Arc<Database>,
    orchestrator: Arc<MaintenanceOrchestrator>,
    mut loaded: Vec<ScheduleRecord>,
    every: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(every);
    // First tick fires immediately and startup already registered
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let schedules = match database.enabled_schedules().await {
                    Ok(schedules) => schedules,
                    Err(e) => {
                        warn!("Failed to reload schedules: {}", e);
                        continue;
                    }
                };

                if schedules == loaded {
                    continue;
                }

                match orchestrator.register(&schedules).await {
                    Ok(count) => {
                        info!("Schedules changed, {} jobs registered", count);
                        log_next_run(&schedules);
                        loaded = schedules;
                    }
                    Err(e) => error!("Failed to re-register schedules: {}", e),
                }
            }
        }
    }
}
