//! Per-identity pool of idle sessions.

use crate::{PoolSettings, PooledSession};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

struct IdleEntry<S> {
    session: S,
    idle_since: Instant,
}

struct PoolState<S> {
    /// Most recently released last.
    entries: Vec<IdleEntry<S>>,
    max_size: Option<usize>,
    idle_timeout: Option<Duration>,
    pooling_enabled: Option<bool>,
    /// Set when the owning registry drops this pool.
    retired: bool,
}

/// Snapshot of one pool's idle count and effective settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub identity: String,
    pub idle: usize,
    pub max_size: usize,
    pub idle_timeout: Duration,
    pub pooling_enabled: bool,
}

/// Idle sessions for one connection identity.
///
/// Checked-out sessions are not tracked; ownership moves to the caller until
/// `release`. All state sits behind one per-pool lock, and sessions are always
/// closed after that lock is dropped.
pub struct SessionPool<S: PooledSession> {
    identity: String,
    settings: Arc<PoolSettings>,
    state: Mutex<PoolState<S>>,
}

impl<S: PooledSession> SessionPool<S> {
    pub fn new(identity: impl Into<String>, settings: Arc<PoolSettings>) -> Self {
        Self {
            identity: identity.into(),
            settings,
            state: Mutex::new(PoolState {
                entries: Vec::new(),
                max_size: None,
                idle_timeout: None,
                pooling_enabled: None,
                retired: false,
            }),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Take the most recently released usable session, if any.
    ///
    /// Expired entries, entries beyond the cap, and every entry of a disabled
    /// pool are closed on the way.
    pub fn try_acquire(&self) -> Option<S> {
        let (acquired, discarded) = {
            let mut state = self.state.lock();
            let mut discarded = self.evict_locked(&mut state, Instant::now());

            let mut acquired = None;
            while let Some(entry) = state.entries.pop() {
                if entry.session.is_usable() {
                    acquired = Some(entry.session);
                    break;
                }
                discarded.push(entry.session);
            }
            (acquired, discarded)
        };

        self.close_sessions(discarded, "evicted");
        if acquired.is_some() {
            debug!(identity = %self.identity, "Reusing idle session");
        }
        acquired
    }

    /// Return a session. It is kept if pooling is on and the pool has room,
    /// otherwise closed.
    pub fn release(&self, session: S) {
        let (rejected, discarded) = {
            let mut state = self.state.lock();
            let now = Instant::now();
            let discarded = self.evict_locked(&mut state, now);

            let keep = !state.retired
                && self.pooling_enabled_locked(&state)
                && state.entries.len() < self.max_size_locked(&state)
                && session.is_usable();

            if keep {
                state.entries.push(IdleEntry {
                    session,
                    idle_since: now,
                });
                (None, discarded)
            } else {
                (Some(session), discarded)
            }
        };

        self.close_sessions(discarded, "evicted");
        if let Some(session) = rejected {
            debug!(identity = %self.identity, "Pool not accepting session, closing it");
            session.close();
        }
    }

    /// Number of idle entries right now.
    pub fn current_size(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size_locked(&self.state.lock())
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout_locked(&self.state.lock())
    }

    pub fn pooling_enabled(&self) -> bool {
        self.pooling_enabled_locked(&self.state.lock())
    }

    /// Enable or disable pooling for this pool only. Idle entries of a
    /// disabled pool are closed on its next acquire or release.
    pub fn set_pooling(&self, enabled: bool) {
        self.state.lock().pooling_enabled = Some(enabled);
    }

    /// Set this pool's cap, closing idle entries above it.
    pub fn set_max_size(&self, max_size: usize) {
        let discarded = {
            let mut state = self.state.lock();
            state.max_size = Some(max_size);
            let excess = state.entries.len().saturating_sub(max_size);
            // Oldest entries sit at the front.
            state
                .entries
                .drain(..excess)
                .map(|entry| entry.session)
                .collect::<Vec<_>>()
        };
        self.close_sessions(discarded, "over capacity");
    }

    pub fn set_idle_timeout(&self, idle_timeout: Duration) {
        self.state.lock().idle_timeout = Some(idle_timeout);
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            identity: self.identity.clone(),
            idle: state.entries.len(),
            max_size: self.max_size_locked(&state),
            idle_timeout: self.idle_timeout_locked(&state),
            pooling_enabled: self.pooling_enabled_locked(&state),
        }
    }

    /// Close every idle entry. The pool stays usable.
    pub fn clear(&self) {
        let discarded = self.drain_all(false);
        self.close_sessions(discarded, "cleared");
    }

    /// Close every idle entry and refuse all future releases.
    pub(crate) fn retire(&self) {
        let discarded = self.drain_all(true);
        self.close_sessions(discarded, "retired");
    }

    fn drain_all(&self, retire: bool) -> Vec<S> {
        let mut state = self.state.lock();
        state.retired |= retire;
        state.entries.drain(..).map(|entry| entry.session).collect()
    }

    /// Remove entries that may no longer be handed out. Caller closes them.
    fn evict_locked(&self, state: &mut PoolState<S>, now: Instant) -> Vec<S> {
        if state.retired || !self.pooling_enabled_locked(state) {
            return state.entries.drain(..).map(|entry| entry.session).collect();
        }

        let idle_timeout = self.idle_timeout_locked(state);
        let max_size = self.max_size_locked(state);

        let mut discarded = Vec::new();
        let mut kept = Vec::with_capacity(state.entries.len());
        for entry in state.entries.drain(..) {
            if now.saturating_duration_since(entry.idle_since) > idle_timeout {
                discarded.push(entry.session);
            } else {
                kept.push(entry);
            }
        }

        let excess = kept.len().saturating_sub(max_size);
        discarded.extend(kept.drain(..excess).map(|entry| entry.session));
        state.entries = kept;
        discarded
    }

    fn close_sessions(&self, sessions: Vec<S>, reason: &str) {
        if sessions.is_empty() {
            return;
        }
        debug!(identity = %self.identity, count = sessions.len(), reason, "Closing idle sessions");
        for session in sessions {
            session.close();
        }
    }

    fn max_size_locked(&self, state: &PoolState<S>) -> usize {
        state.max_size.unwrap_or_else(|| self.settings.max_size())
    }

    fn idle_timeout_locked(&self, state: &PoolState<S>) -> Duration {
        state
            .idle_timeout
            .unwrap_or_else(|| self.settings.idle_timeout())
    }

    fn pooling_enabled_locked(&self, state: &PoolState<S>) -> bool {
        state
            .pooling_enabled
            .unwrap_or_else(|| self.settings.pooling_enabled())
    }
}
