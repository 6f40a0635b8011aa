//! Bounded in-memory feed of recently classified log events.
//!
//! Each queue holds at most `capacity` entries; pushing into a full queue
//! evicts the oldest entry. The feed is constructed once and shared by `Arc`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use super::classifier::LogEvent;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityEntry {
    pub event: LogEvent,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandEntry {
    pub username: String,
    pub command: String,
    pub executed_at: DateTime<Utc>,
}

pub struct ActivityFeed {
    capacity: usize,
    events: RwLock<VecDeque<ActivityEntry>>,
    commands: RwLock<VecDeque<CommandEntry>>,
    evicted: AtomicU64,
}

impl ActivityFeed {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: RwLock::new(VecDeque::with_capacity(capacity)),
            commands: RwLock::new(VecDeque::with_capacity(capacity)),
            evicted: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record an event; commands are additionally kept in their own queue.
    pub async fn record(&self, event: &LogEvent, observed_at: DateTime<Utc>) {
        if let LogEvent::CommandIssued { username, command } = event {
            let mut commands = self.commands.write().await;
            if commands.len() == self.capacity {
                commands.pop_front();
                self.evicted.fetch_add(1, Ordering::Relaxed);
            }
            commands.push_back(CommandEntry {
                username: username.clone(),
                command: command.clone(),
                executed_at: observed_at,
            });
        }

        let mut events = self.events.write().await;
        if events.len() == self.capacity {
            events.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        events.push_back(ActivityEntry {
            event: event.clone(),
            observed_at,
        });
    }

    /// Newest-first view of up to `limit` events.
    pub async fn recent_events(&self, limit: usize) -> Vec<ActivityEntry> {
        let events = self.events.read().await;
        events.iter().rev().take(limit).cloned().collect()
    }

    /// Newest-first view of up to `limit` commands.
    pub async fn recent_commands(&self, limit: usize) -> Vec<CommandEntry> {
        let commands = self.commands.read().await;
        commands.iter().rev().take(limit).cloned().collect()
    }

    /// Total number of entries dropped from either queue since startup.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}
