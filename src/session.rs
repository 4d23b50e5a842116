// src/session.rs

//! Multi-step conversations with front-end callers.
//!
//! Editing a variable takes two messages: a command (`/edit_var`) and then
//! the payload (`KEY=value`). Between the two, the caller has a pending
//! session recording what the next message means. Sessions expire after a
//! TTL and can be cancelled explicitly.
//!
//! This is a pure state machine: time is passed in, nothing here touches
//! tokio or the clock directly.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use tracing::debug;

/// What the caller's next plain-text message will be interpreted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    /// `KEY=value` for an existing key.
    Edit,
    /// `KEY=value`, creating the key if needed.
    Add,
    /// `KEY` to delete.
    Delete,
}

impl fmt::Display for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingAction::Edit => f.write_str("edit"),
            PendingAction::Add => f.write_str("add"),
            PendingAction::Delete => f.write_str("delete"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingSession {
    action: PendingAction,
    started_at: Instant,
}

/// Per-caller pending actions with expiry.
#[derive(Debug)]
pub struct Sessions {
    ttl: Duration,
    pending: HashMap<String, PendingSession>,
}

impl Sessions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: HashMap::new(),
        }
    }

    /// Start (or restart) a conversation for `caller`.
    pub fn begin(&mut self, caller: &str, action: PendingAction, now: Instant) {
        debug!(caller, %action, "session started");
        self.pending.insert(
            caller.to_string(),
            PendingSession {
                action,
                started_at: now,
            },
        );
    }

    /// Consume the caller's pending action, if one exists and has not
    /// expired. The session ends either way.
    pub fn take(&mut self, caller: &str, now: Instant) -> Option<PendingAction> {
        let session = self.pending.remove(caller)?;
        if self.is_expired(&session, now) {
            debug!(caller, action = %session.action, "session expired");
            return None;
        }
        Some(session.action)
    }

    /// Look at the pending action without consuming it.
    pub fn peek(&self, caller: &str, now: Instant) -> Option<PendingAction> {
        self.pending
            .get(caller)
            .filter(|s| !self.is_expired(s, now))
            .map(|s| s.action)
    }

    /// End the caller's conversation; returns whether one was active.
    pub fn cancel(&mut self, caller: &str, now: Instant) -> bool {
        match self.pending.remove(caller) {
            Some(session) => !self.is_expired(&session, now),
            None => false,
        }
    }

    /// Drop all expired sessions; returns how many were removed.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.pending.len();
        let ttl = self.ttl;
        self.pending
            .retain(|_, s| now.saturating_duration_since(s.started_at) < ttl);
        before - self.pending.len()
    }

    /// Number of sessions held, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn is_expired(&self, session: &PendingSession, now: Instant) -> bool {
        now.saturating_duration_since(session.started_at) >= self.ttl
    }
}
