// Escalation ledger: per-(scope, actor) warnings and mutes.
//
// The ledger is the only owner of WarningRecord and MuteRecord state. It is
// purely in-memory; the engine queues every mutation to the persistence
// worker and restores the ledger from the store at startup.
//
// Invariants:
// - sequence ids strictly increase per key and are never renumbered
// - a key with no warnings has no entry at all
// - at most one mute per key; a mute past `expires_at` is inactive even if
//   it has not been cleaned up yet

use super::moderation_config::EscalationConfig;
use super::moderation_models::{
    LedgerSnapshot, LedgerStats, MuteRecord, NewWarning, ScopeId, ScopedKey, WarningRecord,
};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("Warning #{0} does not exist for this user")]
    WarningNotFound(u64),
}

#[derive(Debug, Default)]
struct WarningLog {
    last_sequence: u64,
    entries: Vec<WarningRecord>,
}

/// What `record_warning` did.
#[derive(Debug, Clone, PartialEq)]
pub struct WarningOutcome {
    /// Warnings on file for the key after this one.
    pub warning_count: u32,
    pub record: WarningRecord,
    /// Set when this warning crossed a mute threshold.
    pub mute: Option<MuteRecord>,
}

#[derive(Default)]
pub struct EscalationLedger {
    warnings: DashMap<ScopedKey, WarningLog>,
    mutes: DashMap<ScopedKey, MuteRecord>,
}

fn expiry_after(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|length| now.checked_add_signed(length))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl EscalationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== WARNINGS =====

    /// Append a warning and apply the mute policy.
    pub fn record_warning(
        &self,
        key: &ScopedKey,
        warning: NewWarning,
        now: DateTime<Utc>,
        policy: &EscalationConfig,
    ) -> WarningOutcome {
        let (record, warning_count) = {
            let mut log = self.warnings.entry(key.clone()).or_default();
            log.last_sequence += 1;
            let record = WarningRecord {
                sequence_id: log.last_sequence,
                reason: warning.reason,
                severity: warning.severity,
                content_fingerprint: warning.content_fingerprint,
                created_at: now,
            };
            log.entries.push(record.clone());
            (record, log.entries.len() as u32)
        };

        let mute = policy.mute_for(warning_count).map(|duration| {
            self.create_mute(
                key,
                duration,
                format!("Reached {warning_count} warnings"),
                now,
            )
        });

        WarningOutcome {
            warning_count,
            record,
            mute,
        }
    }

    pub fn warning_count(&self, key: &ScopedKey) -> u32 {
        self.warnings
            .get(key)
            .map(|log| log.entries.len() as u32)
            .unwrap_or(0)
    }

    /// Warnings oldest first. With a limit, only the most recent `limit`.
    pub fn get_warnings(&self, key: &ScopedKey, limit: Option<usize>) -> Vec<WarningRecord> {
        let Some(log) = self.warnings.get(key) else {
            return Vec::new();
        };
        let skip = limit.map_or(0, |limit| log.entries.len().saturating_sub(limit));
        log.entries[skip..].to_vec()
    }

    /// Remove every warning for the key. Returns how many were removed.
    /// An active mute is left alone.
    pub fn clear_warnings(&self, key: &ScopedKey) -> u32 {
        self.warnings
            .remove(key)
            .map(|(_, log)| log.entries.len() as u32)
            .unwrap_or(0)
    }

    /// Remove a single warning without renumbering the rest.
    /// Returns the remaining count; the key is dropped when it reaches zero.
    pub fn remove_warning(&self, key: &ScopedKey, sequence_id: u64) -> Result<u32, LedgerError> {
        match self.warnings.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let log = entry.get_mut();
                let position = log
                    .entries
                    .iter()
                    .position(|w| w.sequence_id == sequence_id)
                    .ok_or(LedgerError::WarningNotFound(sequence_id))?;
                log.entries.remove(position);

                let remaining = log.entries.len() as u32;
                if remaining == 0 {
                    entry.remove();
                }
                Ok(remaining)
            }
            Entry::Vacant(_) => Err(LedgerError::WarningNotFound(sequence_id)),
        }
    }

    // ===== MUTES =====

    /// Create a mute, replacing whatever the key had before.
    pub fn create_mute(
        &self,
        key: &ScopedKey,
        duration: Duration,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> MuteRecord {
        let record = MuteRecord {
            started_at: now,
            expires_at: expiry_after(now, duration),
            reason: reason.into(),
            enforcement_applied: false,
            active: true,
        };
        self.mutes.insert(key.clone(), record.clone());
        record
    }

    /// True while an unexpired mute exists. Expired mutes are marked
    /// inactive on the way; repeated calls give the same answer.
    pub fn is_muted(&self, key: &ScopedKey, now: DateTime<Utc>) -> bool {
        self.get_mute(key, now).is_some()
    }

    /// The active mute for the key, if any.
    pub fn get_mute(&self, key: &ScopedKey, now: DateTime<Utc>) -> Option<MuteRecord> {
        let mut mute = self.mutes.get_mut(key)?;
        if mute.is_active_at(now) {
            return Some(mute.clone());
        }
        mute.active = false;
        None
    }

    /// End a mute early. Returns the record if one was active.
    pub fn end_mute(&self, key: &ScopedKey, now: DateTime<Utc>) -> Option<MuteRecord> {
        self.mutes
            .remove(key)
            .map(|(_, mute)| mute)
            .filter(|mute| mute.is_active_at(now))
    }

    /// Record that the platform timeout was applied for the current mute.
    pub fn mark_enforcement_applied(&self, key: &ScopedKey) -> Option<MuteRecord> {
        let mut mute = self.mutes.get_mut(key)?;
        mute.enforcement_applied = true;
        Some(mute.clone())
    }

    /// Mutes past their expiry that have not been cleaned up yet.
    pub fn expired_mutes(&self, now: DateTime<Utc>) -> Vec<(ScopedKey, MuteRecord)> {
        self.mutes
            .iter()
            .filter(|entry| !entry.value().is_active_at(now))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Drop expired mutes. Returns the keys that were removed.
    pub fn cleanup_expired_mutes(&self, now: DateTime<Utc>) -> Vec<ScopedKey> {
        let mut removed = Vec::new();
        self.mutes.retain(|key, mute| {
            let keep = mute.is_active_at(now);
            if !keep {
                removed.push(key.clone());
            }
            keep
        });
        removed
    }

    // ===== REPORTING + RESTORE =====

    /// Totals across the ledger, or for one scope.
    pub fn statistics(&self, scope: Option<&ScopeId>, now: DateTime<Utc>) -> LedgerStats {
        let in_scope = |key: &ScopedKey| scope.map_or(true, |s| &key.scope == s);
        let mut stats = LedgerStats::default();

        for entry in self.warnings.iter().filter(|e| in_scope(e.key())) {
            stats.users_warned += 1;
            stats.total_warnings += entry.entries.len();
            for warning in &entry.entries {
                *stats.severity_breakdown.entry(warning.severity).or_insert(0) += 1;
            }
        }

        stats.active_mutes = self
            .mutes
            .iter()
            .filter(|e| in_scope(e.key()) && e.value().is_active_at(now))
            .count();

        stats
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut warnings: Vec<(ScopedKey, Vec<WarningRecord>)> = self
            .warnings
            .iter()
            .map(|e| (e.key().clone(), e.entries.clone()))
            .collect();
        warnings.sort_by(|a, b| a.0.cmp(&b.0));

        let mut mutes: Vec<(ScopedKey, MuteRecord)> = self
            .mutes
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        mutes.sort_by(|a, b| a.0.cmp(&b.0));

        let mut sequences: Vec<(ScopedKey, u64)> = self
            .warnings
            .iter()
            .map(|e| (e.key().clone(), e.last_sequence))
            .collect();
        sequences.sort_by(|a, b| a.0.cmp(&b.0));

        LedgerSnapshot {
            warnings,
            mutes,
            sequences,
        }
    }

    /// Replace the ledger contents with a snapshot.
    pub fn restore(&self, snapshot: LedgerSnapshot) {
        self.warnings.clear();
        self.mutes.clear();

        let issued: HashMap<ScopedKey, u64> = snapshot.sequences.into_iter().collect();

        for (key, mut entries) in snapshot.warnings {
            if entries.is_empty() {
                continue;
            }
            entries.sort_by_key(|w| w.sequence_id);
            let newest = entries.last().map_or(0, |w| w.sequence_id);
            let last_sequence = issued.get(&key).map_or(newest, |high| newest.max(*high));
            self.warnings.insert(
                key,
                WarningLog {
                    last_sequence,
                    entries,
                },
            );
        }
        for (key, mute) in snapshot.mutes {
            self.mutes.insert(key, mute);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::moderation_models::Severity;
    use chrono::Duration as ChronoDuration;
    use std::sync::Arc;
    use std::thread;

    fn warning(reason: &str) -> NewWarning {
        NewWarning {
            reason: reason.to_string(),
            severity: Severity::Medium,
            content_fingerprint: Some("abc".to_string()),
        }
    }

    fn key() -> ScopedKey {
        ScopedKey::new("guild", "user")
    }

    #[test]
    fn test_record_warning_counts_and_sequences() {
        let ledger = EscalationLedger::new();
        let policy = EscalationConfig::default();
        let now = Utc::now();

        for expected in 1..=3 {
            let outcome = ledger.record_warning(&key(), warning("rude"), now, &policy);
            assert_eq!(outcome.warning_count, expected);
            assert_eq!(outcome.record.sequence_id, expected as u64);
            assert!(outcome.mute.is_none());
        }

        let stored = ledger.get_warnings(&key(), None);
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].reason, "rude");
        assert_eq!(stored[0].severity, Severity::Medium);
        assert_eq!(stored[0].content_fingerprint.as_deref(), Some("abc"));

        let recent = ledger.get_warnings(&key(), Some(2));
        assert_eq!(
            recent.iter().map(|w| w.sequence_id).collect::<Vec<_>>(),
            vec![2, 3]
        );
    }

    #[test]
    fn test_fifth_warning_mutes() {
        let ledger = EscalationLedger::new();
        let policy = EscalationConfig::default();
        let now = Utc::now();

        let mut last = None;
        for _ in 0..5 {
            last = Some(ledger.record_warning(&key(), warning("spam"), now, &policy));
        }
        let outcome = last.unwrap();

        assert_eq!(outcome.warning_count, 5);
        let mute = outcome.mute.expect("fifth warning should mute");
        assert_eq!(mute.expires_at, now + ChronoDuration::seconds(600));
        assert!(ledger.is_muted(&key(), now));
    }

    #[test]
    fn test_mute_duration_escalates() {
        let ledger = EscalationLedger::new();
        let policy = EscalationConfig::default();
        let now = Utc::now();

        let mutes: Vec<MuteRecord> = (0..10)
            .filter_map(|_| ledger.record_warning(&key(), warning("x"), now, &policy).mute)
            .collect();

        assert_eq!(mutes.len(), 2);
        assert_eq!(mutes[1].expires_at, now + ChronoDuration::seconds(1_800));
        // The second mute replaced the first.
        assert_eq!(ledger.get_mute(&key(), now), Some(mutes[1].clone()));
    }

    #[test]
    fn test_clear_warnings_keeps_mute() {
        let ledger = EscalationLedger::new();
        let now = Utc::now();
        ledger.record_warning(&key(), warning("x"), now, &EscalationConfig::default());
        ledger.create_mute(&key(), Duration::from_secs(60), "manual", now);

        assert_eq!(ledger.clear_warnings(&key()), 1);
        assert_eq!(ledger.warning_count(&key()), 0);
        assert!(ledger.is_muted(&key(), now));
        assert_eq!(ledger.clear_warnings(&key()), 0);
    }

    #[test]
    fn test_remove_warning_keeps_ids() {
        let ledger = EscalationLedger::new();
        let policy = EscalationConfig::default();
        let now = Utc::now();
        for _ in 0..3 {
            ledger.record_warning(&key(), warning("x"), now, &policy);
        }

        assert_eq!(ledger.remove_warning(&key(), 2), Ok(2));
        let ids: Vec<u64> = ledger
            .get_warnings(&key(), None)
            .iter()
            .map(|w| w.sequence_id)
            .collect();
        assert_eq!(ids, vec![1, 3]);

        assert_eq!(
            ledger.remove_warning(&key(), 2),
            Err(LedgerError::WarningNotFound(2))
        );

        // New warnings never reuse a removed id.
        let outcome = ledger.record_warning(&key(), warning("x"), now, &policy);
        assert_eq!(outcome.record.sequence_id, 4);
    }

    #[test]
    fn test_removing_last_warning_drops_key() {
        let ledger = EscalationLedger::new();
        let now = Utc::now();
        ledger.record_warning(&key(), warning("x"), now, &EscalationConfig::default());

        assert_eq!(ledger.remove_warning(&key(), 1), Ok(0));
        assert_eq!(ledger.warning_count(&key()), 0);
        assert!(ledger.snapshot().warnings.is_empty());
        assert_eq!(
            ledger.remove_warning(&ScopedKey::new("other", "user"), 1),
            Err(LedgerError::WarningNotFound(1))
        );
    }

    #[test]
    fn test_is_muted_is_idempotent_after_expiry() {
        let ledger = EscalationLedger::new();
        let now = Utc::now();
        ledger.create_mute(&key(), Duration::from_secs(30), "spam", now);

        let later = now + ChronoDuration::seconds(31);
        for _ in 0..3 {
            assert!(!ledger.is_muted(&key(), later));
        }
        // Still listed until cleanup.
        assert_eq!(ledger.expired_mutes(later).len(), 1);
        assert_eq!(ledger.cleanup_expired_mutes(later), vec![key()]);
        assert!(ledger.expired_mutes(later).is_empty());
        assert!(!ledger.is_muted(&key(), later));
    }

    #[test]
    fn test_end_mute_and_enforcement_flag() {
        let ledger = EscalationLedger::new();
        let now = Utc::now();
        ledger.create_mute(&key(), Duration::from_secs(60), "manual", now);

        let marked = ledger.mark_enforcement_applied(&key()).unwrap();
        assert!(marked.enforcement_applied);

        let ended = ledger.end_mute(&key(), now).unwrap();
        assert_eq!(ended.reason, "manual");
        assert!(!ledger.is_muted(&key(), now));
        assert!(ledger.end_mute(&key(), now).is_none());
    }

    #[test]
    fn test_statistics_per_scope() {
        let ledger = EscalationLedger::new();
        let policy = EscalationConfig::default();
        let now = Utc::now();

        ledger.record_warning(&ScopedKey::new("g1", "a"), warning("x"), now, &policy);
        ledger.record_warning(&ScopedKey::new("g1", "b"), warning("x"), now, &policy);
        ledger.record_warning(&ScopedKey::new("g2", "a"), warning("x"), now, &policy);
        ledger.create_mute(&ScopedKey::new("g1", "a"), Duration::from_secs(60), "x", now);

        let g1 = ledger.statistics(Some(&ScopeId::from("g1")), now);
        assert_eq!(g1.users_warned, 2);
        assert_eq!(g1.total_warnings, 2);
        assert_eq!(g1.active_mutes, 1);
        assert_eq!(g1.severity_breakdown.get(&Severity::Medium), Some(&2));

        let all = ledger.statistics(None, now);
        assert_eq!(all.total_warnings, 3);
    }

    #[test]
    fn test_snapshot_restore() {
        let ledger = EscalationLedger::new();
        let policy = EscalationConfig::default();
        let now = Utc::now();
        for _ in 0..2 {
            ledger.record_warning(&key(), warning("x"), now, &policy);
        }
        ledger.create_mute(&key(), Duration::from_secs(60), "manual", now);

        let restored = EscalationLedger::new();
        restored.restore(ledger.snapshot());

        assert_eq!(restored.warning_count(&key()), 2);
        assert!(restored.is_muted(&key(), now));
        let next = restored.record_warning(&key(), warning("x"), now, &policy);
        assert_eq!(next.record.sequence_id, 3);
    }

    #[test]
    fn test_restore_does_not_reissue_removed_top_id() {
        let ledger = EscalationLedger::new();
        let policy = EscalationConfig::default();
        let now = Utc::now();
        for _ in 0..3 {
            ledger.record_warning(&key(), warning("x"), now, &policy);
        }
        ledger.remove_warning(&key(), 3).unwrap();

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.sequences, vec![(key(), 3)]);

        let restored = EscalationLedger::new();
        restored.restore(snapshot);
        let next = restored.record_warning(&key(), warning("x"), now, &policy);
        assert_eq!(next.record.sequence_id, 4);
    }

    #[test]
    fn test_concurrent_warnings_on_one_key() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 25;

        let ledger = Arc::new(EscalationLedger::new());
        let policy = EscalationConfig::default();
        let now = Utc::now();

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let policy = policy.clone();
                thread::spawn(move || {
                    (0..PER_THREAD)
                        .map(|_| ledger.record_warning(&key(), warning("x"), now, &policy))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let outcomes: Vec<WarningOutcome> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        let total = THREADS * PER_THREAD;
        assert_eq!(ledger.warning_count(&key()), total as u32);

        let mut ids: Vec<u64> = outcomes.iter().map(|o| o.record.sequence_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=total as u64).collect::<Vec<_>>());

        // Every count from 1 to total was observed exactly once.
        let mut counts: Vec<u32> = outcomes.iter().map(|o| o.warning_count).collect();
        counts.sort_unstable();
        assert_eq!(counts, (1..=total as u32).collect::<Vec<_>>());

        let mutes = outcomes.iter().filter(|o| o.mute.is_some()).count();
        assert_eq!(mutes, total / policy.mute_every as usize);
    }

    #[test]
    fn test_concurrent_keys_stay_separate() {
        let ledger = Arc::new(EscalationLedger::new());
        let now = Utc::now();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    let key = ScopedKey::new("guild", format!("user{i}").as_str());
                    for _ in 0..10 {
                        ledger.record_warning(&key, warning("x"), now, &EscalationConfig::default());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for i in 0..4 {
            let key = ScopedKey::new("guild", format!("user{i}").as_str());
            assert_eq!(ledger.warning_count(&key), 10);
        }
    }
}
