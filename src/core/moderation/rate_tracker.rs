// Sliding-window rate tracking for message spam (per actor) and join raids
// (per scope).
//
// Each key owns an ordered deque of timestamps. On every touch the deque is
// trimmed to the window before counting, so idle keys stay small until the
// periodic `prune` evicts them. DashMap entry locks make the
// append-trim-count sequence atomic per key while different keys run in
// parallel.
//
// Raid mode is sticky: once a scope breaches the join limit it stays in raid
// mode until `clear_raid` is called.

use super::moderation_config::RateLimitConfig;
use super::moderation_models::{ScopeId, ScopedKey};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateKey {
    /// Messages from one actor in one scope.
    Actor(ScopedKey),
    /// Joins into one scope.
    Scope(ScopeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateStatus {
    pub count: usize,
    pub over_limit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaidStatus {
    pub joins: usize,
    pub raid_active: bool,
    /// True only for the join that switched raid mode on.
    pub newly_entered: bool,
}

#[derive(Default)]
pub struct RateTracker {
    windows: DashMap<RateKey, VecDeque<DateTime<Utc>>>,
    /// Scopes in raid mode, with the time raid mode started.
    raids: DashMap<ScopeId, DateTime<Utc>>,
}

/// Drop everything at or before `now - window`.
fn trim(window: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, length: chrono::Duration) {
    // A horizon before the earliest representable instant keeps everything.
    let Some(horizon) = now.checked_sub_signed(length) else {
        return;
    };
    while window.front().is_some_and(|t| *t <= horizon) {
        window.pop_front();
    }
}

impl RateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, key: RateKey, at: DateTime<Utc>, limits: &RateLimitConfig) -> RateStatus {
        let mut window = self.windows.entry(key).or_default();

        // Late events are slotted in order; the window is anchored on the newest one.
        let newest = window.back().copied();
        match newest {
            Some(last) if at < last => {
                let index = window.partition_point(|t| *t <= at);
                window.insert(index, at);
            }
            _ => window.push_back(at),
        }
        let reference = newest.map_or(at, |last| last.max(at));
        trim(&mut window, reference, limits.window());

        let count = window.len();
        RateStatus {
            count,
            over_limit: count > limits.max_events as usize,
        }
    }

    pub fn record_message(
        &self,
        key: &ScopedKey,
        at: DateTime<Utc>,
        limits: &RateLimitConfig,
    ) -> RateStatus {
        self.record(RateKey::Actor(key.clone()), at, limits)
    }

    pub fn record_join(
        &self,
        scope: &ScopeId,
        at: DateTime<Utc>,
        limits: &RateLimitConfig,
    ) -> RaidStatus {
        let status = self.record(RateKey::Scope(scope.clone()), at, limits);

        let newly_entered = status.over_limit
            && match self.raids.entry(scope.clone()) {
                Entry::Vacant(entry) => {
                    entry.insert(at);
                    true
                }
                Entry::Occupied(_) => false,
            };

        RaidStatus {
            joins: status.count,
            raid_active: newly_entered || self.raids.contains_key(scope),
            newly_entered,
        }
    }

    pub fn is_raid_active(&self, scope: &ScopeId) -> bool {
        self.raids.contains_key(scope)
    }

    pub fn raid_started_at(&self, scope: &ScopeId) -> Option<DateTime<Utc>> {
        self.raids.get(scope).map(|started| *started)
    }

    /// Leave raid mode. Returns whether the scope was in it.
    pub fn clear_raid(&self, scope: &ScopeId) -> bool {
        self.raids.remove(scope).is_some()
    }

    pub fn active_raids(&self) -> Vec<ScopeId> {
        self.raids.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Events still inside the window at `now`.
    pub fn window_len(&self, key: &RateKey, now: DateTime<Utc>, length: chrono::Duration) -> usize {
        match self.windows.get_mut(key) {
            Some(mut window) => {
                trim(&mut window, now, length);
                window.len()
            }
            None => 0,
        }
    }

    /// Trim every window to `horizon` and evict the ones left empty.
    /// Returns the number of keys evicted.
    pub fn prune(&self, now: DateTime<Utc>, horizon: chrono::Duration) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            trim(window, now, horizon);
            !window.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}
