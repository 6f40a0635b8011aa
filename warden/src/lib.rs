pub mod config;
pub mod console;
pub mod constants;
pub mod database;
pub mod errors;
pub mod logs;
pub mod maintenance_tracker;
pub mod scheduler;
pub mod sessions;

// Re-export commonly used types
pub use config::{Config, ConfigManager};
pub use console::{ConsoleCommands, RconClient, RemoteConsole, RosterQuery};
pub use database::Database;
pub use errors::{ConfigError, ConsoleError, ScheduleError, WardenError};
pub use logs::{classify_line, ActivityFeed, LogEvent, LogTailer, ObservedEvent};
pub use maintenance_tracker::MaintenanceTracker;
pub use scheduler::{MaintenanceOrchestrator, ScheduleRegistry};
pub use sessions::{ReconnectPolicy, SessionTracker};
