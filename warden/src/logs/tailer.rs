//! Incremental reader for the live server log plus one-time archive import.
//!
//! The tailer owns its byte offset. Each wake-up reads the delta between the
//! offset and the current file size, forwards every complete line that
//! classifies to an event, and advances the offset past the last newline only.
//! A file that shrank below the offset (or, on Unix, was replaced by a file
//! with a different inode) is treated as rotated and re-read from the start.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use flate2::read::GzDecoder;
use glob::glob;
use std::io::{ErrorKind, Read, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::classifier::classify_line;
use super::ObservedEvent;
use crate::config::LogsConfig;
use crate::constants::tail;
use crate::database::TailStore;

#[derive(Debug, Clone)]
pub struct TailerSettings {
    pub live_path: PathBuf,
    /// Glob for compressed archives; `None` disables the import
    pub archive_glob: Option<String>,
    pub poll_interval: Duration,
    pub resume_from_checkpoint: bool,
}

impl TailerSettings {
    pub fn from_config(logs: &LogsConfig) -> Self {
        Self {
            live_path: logs.live_path(),
            archive_glob: logs.import_archives.then(|| logs.archive_glob()),
            poll_interval: logs.poll_interval(),
            resume_from_checkpoint: logs.resume_from_checkpoint,
        }
    }
}

/// Result of a single wake-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOutcome {
    pub lines_read: usize,
    pub events_forwarded: usize,
    pub rotated: bool,
    pub missing: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartupReport {
    pub live_events: usize,
    pub archives_imported: usize,
    pub archive_events: usize,
}

pub struct LogTailer {
    settings: TailerSettings,
    store: Arc<dyn TailStore>,
    events: mpsc::Sender<ObservedEvent>,
    offset: u64,
    identity: Option<u64>,
    checkpoint_key: String,
}

impl LogTailer {
    pub fn new(
        settings: TailerSettings,
        store: Arc<dyn TailStore>,
        events: mpsc::Sender<ObservedEvent>,
    ) -> Self {
        let checkpoint_key = settings.live_path.to_string_lossy().into_owned();
        Self {
            settings,
            store,
            events,
            offset: 0,
            identity: None,
            checkpoint_key,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Historical import: the live file from offset 0 (or the stored
    /// checkpoint), then every archive not imported before.
    pub async fn startup(&mut self) -> Result<StartupReport> {
        let mut report = StartupReport::default();

        match tokio::fs::metadata(&self.settings.live_path).await {
            Ok(metadata) => {
                let size = metadata.len();
                self.offset = 0;
                if self.settings.resume_from_checkpoint {
                    match self.store.load_checkpoint(&self.checkpoint_key).await {
                        Ok(Some(offset)) if offset <= size => {
                            info!(
                                "Resuming {} from checkpoint at byte {}",
                                self.settings.live_path.display(),
                                offset
                            );
                            self.offset = offset;
                        }
                        Ok(Some(offset)) => {
                            info!(
                                "Checkpoint {} is past the end of {} ({} bytes), reading from start",
                                offset,
                                self.settings.live_path.display(),
                                size
                            );
                        }
                        Ok(None) => {}
                        Err(e) => warn!("Failed to load tail checkpoint: {}", e),
                    }
                }
                self.identity = file_identity(&metadata);
                report.live_events = self.catch_up().await?;
                info!(
                    "Imported {} events from {}",
                    report.live_events,
                    self.settings.live_path.display()
                );
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "No live log at {}, waiting for it to appear",
                    self.settings.live_path.display()
                );
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(pattern) = self.settings.archive_glob.clone() {
            let (archives, events) = self.import_archives(&pattern).await?;
            report.archives_imported = archives;
            report.archive_events = events;
        }

        Ok(report)
    }

    /// Poll until the offset reaches the size observed at the last poll.
    async fn catch_up(&mut self) -> Result<usize> {
        let mut forwarded = 0;
        loop {
            let before = self.offset;
            let outcome = self.poll_once().await?;
            forwarded += outcome.events_forwarded;
            if outcome.missing || self.offset == before {
                return Ok(forwarded);
            }
        }
    }

    /// One wake-up of the steady-state loop.
    pub async fn poll_once(&mut self) -> Result<PollOutcome> {
        let path = self.settings.live_path.clone();
        let mut outcome = PollOutcome::default();

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                outcome.missing = true;
                return Ok(outcome);
            }
            Err(e) => return Err(e.into()),
        };

        let size = metadata.len();
        let identity = file_identity(&metadata);
        let replaced = matches!((self.identity, identity), (Some(old), Some(new)) if old != new);

        if size < self.offset || replaced {
            info!(
                "Log rotation detected for {} (size {} < offset {} or file replaced), reading from start",
                path.display(),
                size,
                self.offset
            );
            self.offset = 0;
            outcome.rotated = true;
        }
        self.identity = identity;

        if size == self.offset {
            if outcome.rotated {
                self.save_checkpoint().await;
            }
            return Ok(outcome);
        }

        let to_read = (size - self.offset).min(tail::MAX_READ_CHUNK);
        let mut file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.seek(SeekFrom::Start(self.offset)).await?;

        let mut buffer = Vec::with_capacity(to_read as usize);
        file.take(to_read).read_to_end(&mut buffer).await?;

        let consumed = match buffer.iter().rposition(|b| *b == b'\n') {
            Some(last_newline) => last_newline + 1,
            None if to_read == tail::MAX_READ_CHUNK => {
                warn!(
                    "Skipping {} bytes without a line terminator in {}",
                    buffer.len(),
                    path.display()
                );
                self.offset += buffer.len() as u64;
                self.save_checkpoint().await;
                return Ok(outcome);
            }
            // Partial trailing line, re-read on the next wake-up
            None => return Ok(outcome),
        };

        let now = Utc::now();
        let written_at = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or(now)
            .min(now);
        for line in split_lines(&buffer[..consumed]) {
            outcome.lines_read += 1;
            if let Some(event) = classify_line(&line) {
                let observed_at = live_timestamp(&line, written_at).unwrap_or(now);
                self.forward(ObservedEvent { event, observed_at }).await?;
                outcome.events_forwarded += 1;
            }
        }

        self.offset += consumed as u64;
        self.save_checkpoint().await;

        debug!(
            "Read {} lines ({} events) from {}, offset now {}",
            outcome.lines_read,
            outcome.events_forwarded,
            path.display(),
            self.offset
        );

        Ok(outcome)
    }

    async fn forward(&self, event: ObservedEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| anyhow!("Event channel closed"))
    }

    async fn save_checkpoint(&self) {
        if let Err(e) = self
            .store
            .save_checkpoint(&self.checkpoint_key, self.offset)
            .await
        {
            error!("Failed to save tail checkpoint at {}: {}", self.offset, e);
        }
    }

    /// Import every archive matching `pattern` that the store has not seen.
    /// A broken archive is logged and skipped.
    pub async fn import_archives(&self, pattern: &str) -> Result<(usize, usize)> {
        let mut paths: Vec<PathBuf> = glob(pattern)
            .map_err(|e| anyhow!("Invalid archive pattern '{}': {}", pattern, e))?
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Unreadable archive entry: {}", e);
                    None
                }
            })
            .collect();
        paths.sort();

        let mut imported = 0;
        let mut forwarded = 0;

        for path in paths {
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };

            match self.store.is_archive_imported(&name).await {
                Ok(true) => {
                    debug!("Archive {} already imported", name);
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    error!("Failed to check archive {}: {}", name, e);
                    continue;
                }
            }

            match self.import_archive(&path, &name).await {
                Ok(count) => {
                    if let Err(e) = self.store.mark_archive_imported(&name).await {
                        error!("Failed to mark archive {} as imported: {}", name, e);
                    }
                    info!("Imported {} events from archive {}", count, name);
                    imported += 1;
                    forwarded += count;
                }
                Err(e) => error!("Failed to import archive {}: {}", path.display(), e),
            }
        }

        Ok((imported, forwarded))
    }

    async fn import_archive(&self, path: &Path, name: &str) -> Result<usize> {
        let owned = path.to_path_buf();
        let content = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let file = std::fs::File::open(&owned)?;
            let mut decoder = GzDecoder::new(file);
            let mut content = Vec::new();
            decoder.read_to_end(&mut content)?;
            Ok(content)
        })
        .await??;

        let archive_date = archive_date(name);
        let fallback = Utc::now();
        let mut forwarded = 0;

        for line in split_lines(&content) {
            if let Some(event) = classify_line(&line) {
                let observed_at = archive_date
                    .and_then(|date| line_timestamp(&line, date))
                    .unwrap_or(fallback);
                self.forward(ObservedEvent { event, observed_at }).await?;
                forwarded += 1;
            }
        }

        Ok(forwarded)
    }

    /// Run startup and then poll until `shutdown` is cancelled or the event
    /// receiver goes away.
    pub fn spawn(mut self, shutdown: CancellationToken) -> TailerHandle {
        let token = shutdown.clone();
        let join = tokio::spawn(async move {
            match self.startup().await {
                Ok(report) => info!(
                    "Log import finished: {} live events, {} archives ({} events)",
                    report.live_events, report.archives_imported, report.archive_events
                ),
                Err(e) => error!("Log import failed: {}", e),
            }

            let mut interval = tokio::time::interval(self.settings.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = self.poll_once().await {
                            warn!("Log poll failed: {}", e);
                        }
                        if self.events.is_closed() {
                            warn!("Event receiver dropped, stopping log tailer");
                            break;
                        }
                    }
                }
            }

            info!("Log tailer stopped at offset {}", self.offset);
        });

        TailerHandle { join, shutdown }
    }
}

/// Handle to the background tailer task.
pub struct TailerHandle {
    join: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl TailerHandle {
    /// Stop polling and wait for the task to exit. Dropping the tailer drops
    /// its event sender, which lets the ingest worker drain and finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.join.await {
            error!("Log tailer task failed: {}", e);
        }
    }
}

fn split_lines(bytes: &[u8]) -> impl Iterator<Item = String> + '_ {
    bytes
        .split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| {
            String::from_utf8_lossy(line)
                .trim_end_matches('\r')
                .to_string()
        })
}

#[cfg(unix)]
fn file_identity(metadata: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.ino())
}

#[cfg(not(unix))]
fn file_identity(_metadata: &std::fs::Metadata) -> Option<u64> {
    None
}

/// `2024-01-15-1.log.gz` → 2024-01-15
fn archive_date(name: &str) -> Option<NaiveDate> {
    let prefix = name.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

/// Combine an archive date with the `[HH:MM:SS]` clock prefix of a line.
fn line_timestamp(line: &str, date: NaiveDate) -> Option<DateTime<Utc>> {
    let clock = line.strip_prefix('[')?.get(..8)?;
    let time = NaiveTime::parse_from_str(clock, "%H:%M:%S").ok()?;
    Some(date.and_time(time).and_utc())
}

/// Stamp a live line with its clock prefix on the day the file was last
/// written. A clock later than that write belongs to the day before.
fn live_timestamp(line: &str, written_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let stamped = line_timestamp(line, written_at.date_naive())?;
    if stamped > written_at + chrono::Duration::minutes(1) {
        Some(stamped - chrono::Duration::days(1))
    } else {
        Some(stamped)
    }
}
