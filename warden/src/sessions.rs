//! Applies classified log events to player and session state.
//!
//! Events for the same player are applied one at a time under a per-player
//! lock; the lock entry is dropped again once no event for that player is in
//! flight. A login or logout stamped before the player's open session started
//! is history that is already covered and leaves the session alone. Store failures are reported to the caller of [`SessionTracker::apply`];
//! [`SessionTracker::handle`] logs them and moves on, which is what the ingest
//! worker uses.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

use crate::database::{PlayerStore, SessionRecord};
use crate::logs::activity::ActivityFeed;
use crate::logs::{LogEvent, ObservedEvent};

/// What to do with a login for a player whose session is still open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Keep the existing session and drop the second login.
    #[default]
    Ignore,
    /// Close the existing session at the new login time and open a fresh one.
    CloseAndReopen,
}

/// Outcome of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    SessionOpened,
    SessionAlreadyOpen,
    SessionReopened { previous_duration: i64 },
    SessionClosed { duration: i64 },
    NoOpenSession,
    /// Stamped before the open session's login; nothing changed
    StaleEvent,
    IdentityBound,
    CommandRecorded,
    UnknownPlayer,
}

pub struct SessionTracker {
    store: Arc<dyn PlayerStore>,
    policy: ReconnectPolicy,
    player_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionTracker {
    pub fn new(store: Arc<dyn PlayerStore>, policy: ReconnectPolicy) -> Self {
        Self {
            store,
            policy,
            player_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    async fn lock_for(&self, username: &str) -> Arc<Mutex<()>> {
        let mut locks = self.player_locks.lock().await;
        locks.entry(username.to_string()).or_default().clone()
    }

    /// Forget the player's lock when the map holds the only reference.
    async fn release(&self, username: &str) {
        let mut locks = self.player_locks.lock().await;
        if locks
            .get(username)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(username);
        }
    }

    /// Apply an event, swallowing store failures after logging them.
    pub async fn handle(&self, event: &LogEvent, at: DateTime<Utc>) -> Option<Applied> {
        match self.apply(event, at).await {
            Ok(applied) => {
                debug!("{} for {}: {:?}", event.kind(), event.username(), applied);
                Some(applied)
            }
            Err(e) => {
                error!(
                    "Failed to persist {} event for {}: {}",
                    event.kind(),
                    event.username(),
                    e
                );
                None
            }
        }
    }

    pub async fn apply(&self, event: &LogEvent, at: DateTime<Utc>) -> Result<Applied> {
        let lock = self.lock_for(event.username()).await;
        let result = {
            let _guard = lock.lock().await;
            self.apply_locked(event, at).await
        };
        drop(lock);
        self.release(event.username()).await;
        result
    }

    async fn apply_locked(&self, event: &LogEvent, at: DateTime<Utc>) -> Result<Applied> {
        match event {
            LogEvent::LoginWithAddress { username, address } => {
                self.apply_login(username, address, at).await
            }
            LogEvent::IdentityBound {
                username,
                stable_id,
            } => {
                if self.store.set_player_identifier(username, stable_id, at).await? {
                    Ok(Applied::IdentityBound)
                } else {
                    Ok(Applied::UnknownPlayer)
                }
            }
            LogEvent::Logout { username } => self.apply_logout(username, at).await,
            LogEvent::CommandIssued { username, command } => {
                match self.store.find_player(username).await? {
                    Some(player) => {
                        self.store.record_command(player.id, command, at).await?;
                        self.store.touch_player(player.id, at).await?;
                        Ok(Applied::CommandRecorded)
                    }
                    None => Ok(Applied::UnknownPlayer),
                }
            }
        }
    }

    async fn apply_login(
        &self,
        username: &str,
        address: &str,
        at: DateTime<Utc>,
    ) -> Result<Applied> {
        let player = self.store.upsert_player_login(username, address, at).await?;
        self.store.record_address(player.id, address, at).await?;

        match self.store.find_open_session(player.id).await? {
            None => {
                self.store.open_session(player.id, at).await?;
                info!("{} logged in from {}", username, address);
                Ok(Applied::SessionOpened)
            }
            Some(open) if at < open.login_time => {
                debug!(
                    "Ignoring login for {} at {}, open session started {}",
                    username, at, open.login_time
                );
                Ok(Applied::StaleEvent)
            }
            Some(open) => match self.policy {
                ReconnectPolicy::Ignore => {
                    debug!(
                        "{} already has an open session since {}, ignoring login",
                        username, open.login_time
                    );
                    Ok(Applied::SessionAlreadyOpen)
                }
                ReconnectPolicy::CloseAndReopen => {
                    let previous_duration = self.close(&open, at).await?;
                    self.store.open_session(player.id, at).await?;
                    info!(
                        "{} reconnected from {}, previous session lasted {}s",
                        username, address, previous_duration
                    );
                    Ok(Applied::SessionReopened { previous_duration })
                }
            },
        }
    }

    async fn apply_logout(&self, username: &str, at: DateTime<Utc>) -> Result<Applied> {
        let Some(player) = self.store.find_player(username).await? else {
            return Ok(Applied::NoOpenSession);
        };

        match self.store.find_open_session(player.id).await? {
            Some(open) if at < open.login_time => {
                debug!(
                    "Ignoring logout for {} at {}, open session started {}",
                    username, at, open.login_time
                );
                Ok(Applied::StaleEvent)
            }
            Some(open) => {
                let duration = self.close(&open, at).await?;
                info!("{} logged out after {}s", username, duration);
                Ok(Applied::SessionClosed { duration })
            }
            None => {
                self.store.touch_player(player.id, at).await?;
                Ok(Applied::NoOpenSession)
            }
        }
    }

    async fn close(&self, session: &SessionRecord, at: DateTime<Utc>) -> Result<i64> {
        let duration = (at - session.login_time).num_seconds();
        self.store.close_session(session, at, duration).await?;
        Ok(duration)
    }
}

/// Drain observed events into the tracker until every sender is dropped.
pub async fn run_ingest(
    tracker: Arc<SessionTracker>,
    feed: Arc<ActivityFeed>,
    mut events: mpsc::Receiver<ObservedEvent>,
) -> u64 {
    let mut applied = 0u64;

    while let Some(observed) = events.recv().await {
        feed.record(&observed.event, observed.observed_at).await;
        if tracker
            .handle(&observed.event, observed.observed_at)
            .await
            .is_some()
        {
            applied += 1;
        }
    }

    info!("Event ingest stopped after {} applied events", applied);
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use chrono::{Duration, TimeZone};

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn login(name: &str) -> LogEvent {
        LogEvent::LoginWithAddress {
            username: name.to_string(),
            address: "10.0.0.1".to_string(),
        }
    }

    fn logout(name: &str) -> LogEvent {
        LogEvent::Logout {
            username: name.to_string(),
        }
    }

    async fn tracker(policy: ReconnectPolicy) -> (Arc<Database>, SessionTracker) {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let tracker = SessionTracker::new(db.clone(), policy);
        (db, tracker)
    }

    #[tokio::test]
    async fn test_duplicate_login_is_ignored_by_default() {
        let (db, tracker) = tracker(ReconnectPolicy::default()).await;

        assert_eq!(tracker.apply(&login("Steve"), t(0)).await.unwrap(), Applied::SessionOpened);
        assert_eq!(
            tracker.apply(&login("Steve"), t(10)).await.unwrap(),
            Applied::SessionAlreadyOpen
        );

        let player = db.find_player("Steve").await.unwrap().unwrap();
        let sessions = db.sessions_for_player(player.id).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].login_time, t(0));
        // Both logins are still observed addresses
        assert_eq!(db.addresses_for_player(player.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_close_and_reopen_policy() {
        let (db, tracker) = tracker(ReconnectPolicy::CloseAndReopen).await;

        tracker.apply(&login("Steve"), t(0)).await.unwrap();
        assert_eq!(
            tracker.apply(&login("Steve"), t(40)).await.unwrap(),
            Applied::SessionReopened {
                previous_duration: 40
            }
        );

        let player = db.find_player("Steve").await.unwrap().unwrap();
        assert_eq!(player.cumulative_play_seconds, 40);
        let sessions = db.sessions_for_player(player.id).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions.iter().filter(|s| s.logout_time.is_none()).count(), 1);
    }

    #[tokio::test]
    async fn test_logout_older_than_open_session_is_ignored() {
        let (db, tracker) = tracker(ReconnectPolicy::Ignore).await;

        tracker.apply(&login("Alex"), t(100)).await.unwrap();
        assert_eq!(
            tracker.apply(&logout("Alex"), t(50)).await.unwrap(),
            Applied::StaleEvent
        );

        let player = db.find_player("Alex").await.unwrap().unwrap();
        let sessions = db.sessions_for_player(player.id).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].logout_time.is_none());
        assert_eq!(player.last_seen, t(100));

        assert_eq!(
            tracker.apply(&logout("Alex"), t(160)).await.unwrap(),
            Applied::SessionClosed { duration: 60 }
        );
    }

    #[tokio::test]
    async fn test_older_login_does_not_reopen_under_close_and_reopen() {
        let (db, tracker) = tracker(ReconnectPolicy::CloseAndReopen).await;

        tracker.apply(&login("Steve"), t(100)).await.unwrap();
        assert_eq!(
            tracker.apply(&login("Steve"), t(10)).await.unwrap(),
            Applied::StaleEvent
        );

        let player = db.find_player("Steve").await.unwrap().unwrap();
        assert_eq!(player.first_seen, t(10));
        assert_eq!(player.last_seen, t(100));
        let sessions = db.sessions_for_player(player.id).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].login_time, t(100));
    }

    #[tokio::test]
    async fn test_player_locks_are_released() {
        let (_db, tracker) = tracker(ReconnectPolicy::Ignore).await;
        let tracker = Arc::new(tracker);

        let mut tasks = Vec::new();
        for round in 0..20i64 {
            let tracker = tracker.clone();
            tasks.push(tokio::spawn(async move {
                let name = format!("Player{}", round % 4);
                tracker.apply(&login(&name), t(round)).await.unwrap();
                tracker.apply(&logout(&name), t(round + 1)).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(tracker.player_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_identity_and_command_for_unknown_player() {
        let (db, tracker) = tracker(ReconnectPolicy::Ignore).await;

        let identity = LogEvent::IdentityBound {
            username: "Ghost".to_string(),
            stable_id: "00000000-0000-0000-0000-000000000000".to_string(),
        };
        let command = LogEvent::CommandIssued {
            username: "Ghost".to_string(),
            command: "/help".to_string(),
        };

        assert_eq!(tracker.apply(&identity, t(0)).await.unwrap(), Applied::UnknownPlayer);
        assert_eq!(tracker.apply(&command, t(0)).await.unwrap(), Applied::UnknownPlayer);
        assert!(db.find_player("Ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_identity_binding_does_not_touch_sessions() {
        let (db, tracker) = tracker(ReconnectPolicy::Ignore).await;

        tracker.apply(&login("Steve"), t(0)).await.unwrap();
        let identity = LogEvent::IdentityBound {
            username: "Steve".to_string(),
            stable_id: "069a79f4-44e9-4726-a5be-fca90e38aaf5".to_string(),
        };
        assert_eq!(tracker.apply(&identity, t(5)).await.unwrap(), Applied::IdentityBound);

        let player = db.find_player("Steve").await.unwrap().unwrap();
        assert_eq!(
            player.identifier.as_deref(),
            Some("069a79f4-44e9-4726-a5be-fca90e38aaf5")
        );
        assert_eq!(db.open_session_count().await.unwrap(), 1);
    }
}
