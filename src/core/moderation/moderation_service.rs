// Moderation engine - per-event orchestration of the moderation core.
//
// For every event the engine:
// - skips system actors
// - updates the rate windows (spam for messages, raids for joins)
// - checks for an active mute
// - runs the extractors and score fusion on message text
// - records warnings and escalated mutes in the ledger
//
// Scopes with auto-moderation switched off are still analysed and their
// evidence is kept, but they never get a decision or a ledger entry.
//
// It returns a Decision and, for flagged content, an EvidenceRecord. It never
// deletes, mutes or notifies itself, and it never waits on storage: every
// ledger mutation is handed to the persistence queue.
//
// NO Discord dependencies here - just pure domain logic.

use super::enforcement::{
    apply_decision, EnforcementExecutor, EnforcementReport, EnforcementTarget, StepOutcome,
};
use super::escalation_ledger::{EscalationLedger, LedgerError, WarningOutcome};
use super::moderation_config::{CompiledConfig, ConfigError, ConfigHandle, ModerationConfig};
use super::moderation_models::{
    AbuseVerdict, ActorId, Decision, DecisionReason, EvaluationOutcome, Event, EventKind,
    EvidenceRecord, IngestError, LedgerSnapshot, LedgerStats, MuteRecord, NewWarning, RawEvent,
    ScopeId, ScopedKey, Severity, WarningRecord,
};
use super::persistence::{HealthReport, PersistCommand, PersistenceQueue};
use super::rate_tracker::RateTracker;
use super::score_fusion::ScoreFusion;
use chrono::{DateTime, Utc};
use std::sync::{Arc, OnceLock};

/// What a maintenance pass cleaned up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaintenanceReport {
    pub evicted_windows: usize,
    pub expired_mutes: usize,
}

pub struct ModerationEngine {
    config: Arc<ConfigHandle>,
    rates: RateTracker,
    ledger: EscalationLedger,
    persistence: PersistenceQueue,
    /// The bot's own account, known only once the gateway is ready.
    system_actor: OnceLock<ActorId>,
}

impl ModerationEngine {
    pub fn new(config: Arc<ConfigHandle>, persistence: PersistenceQueue) -> Self {
        Self {
            config,
            rates: RateTracker::new(),
            ledger: EscalationLedger::new(),
            persistence,
            system_actor: OnceLock::new(),
        }
    }

    pub fn register_system_actor(&self, actor: ActorId) {
        if self.system_actor.set(actor).is_err() {
            tracing::debug!("System actor already registered");
        }
    }

    fn is_system_actor(&self, settings: &ModerationConfig, actor: &ActorId) -> bool {
        self.system_actor.get() == Some(actor) || settings.is_system_actor(actor.as_str())
    }

    pub fn config(&self) -> Arc<CompiledConfig> {
        self.config.snapshot()
    }

    // ===== EVALUATION =====

    /// Validate a raw platform event and evaluate it.
    pub fn ingest(&self, raw: RawEvent) -> Result<EvaluationOutcome, IngestError> {
        let event = Event::try_from(raw)?;
        Ok(self.evaluate(&event))
    }

    pub fn evaluate(&self, event: &Event) -> EvaluationOutcome {
        let compiled = self.config.snapshot();
        let settings = compiled.settings();

        if !settings.enabled || self.is_system_actor(settings, &event.actor) {
            return EvaluationOutcome::ignored();
        }

        match event.kind {
            EventKind::Message => self.evaluate_message(&compiled, event),
            EventKind::Join => EvaluationOutcome {
                decision: self.evaluate_join(settings, event),
                ..Default::default()
            },
        }
    }

    fn evaluate_message(&self, compiled: &CompiledConfig, event: &Event) -> EvaluationOutcome {
        let settings = compiled.settings();
        let key = event.key();
        let now = event.occurred_at;
        let limits = settings.limits_for(&event.scope);
        let mut decision = Decision::default();

        let rate = self.rates.record_message(&key, now, &limits.spam);
        if !limits.auto_moderate {
            return self.observe_message(compiled, event);
        }

        let active_mute = self.ledger.get_mute(&key, now);

        if let Some(mute) = &active_mute {
            // The platform timeout can lag behind the ledger.
            decision.delete_content = true;
            decision.reasons.push(DecisionReason::ActorMuted {
                until: mute.expires_at,
            });
        }

        if rate.over_limit && active_mute.is_none() {
            tracing::info!(
                actor_id = %event.actor,
                scope_id = %event.scope,
                messages = rate.count,
                "Spam detected"
            );
            decision.delete_content = true;
            decision.notify_channel = true;
            decision.reasons.push(DecisionReason::Spam {
                messages_in_window: rate.count,
            });

            if let Some(duration) = settings.escalation.spam_mute() {
                let mute = self
                    .ledger
                    .create_mute(&key, duration, "Sending messages too quickly", now);
                self.persistence.submit(PersistCommand::SaveMute {
                    key: key.clone(),
                    mute,
                });
                decision.request_mute(duration);
            }
        }

        if !event.has_text() {
            return EvaluationOutcome {
                decision,
                ..Default::default()
            };
        }

        let bundle = compiled.pipeline().analyze(&event.text);
        let verdict = ScoreFusion::new(&settings.scoring).fuse(&bundle, now);

        if !verdict.is_flagged {
            return EvaluationOutcome {
                decision,
                verdict: Some(verdict),
                evidence: None,
            };
        }

        let outcome = self.ledger.record_warning(
            &key,
            NewWarning {
                reason: format!("Abusive content: {}", verdict.category),
                severity: verdict.severity,
                content_fingerprint: Some(verdict.content_fingerprint.clone()),
            },
            now,
            &settings.escalation,
        );
        self.persist_warning(&key, &outcome);

        if let Some(duration) = outcome.mute.as_ref().and_then(|m| m.remaining(now)) {
            decision.request_mute(duration);
        }
        decision.delete_content = true;
        decision.warn_user = true;
        decision.notify_channel = true;
        decision.warning_count = Some(outcome.warning_count);
        decision.reasons.push(DecisionReason::AbusiveContent {
            category: verdict.category,
            severity: verdict.severity,
        });

        tracing::info!(
            actor_id = %event.actor,
            scope_id = %event.scope,
            score = verdict.score,
            severity = %verdict.severity,
            category = %verdict.category,
            warning_count = outcome.warning_count,
            muted = outcome.mute.is_some(),
            "Flagged message"
        );

        let evidence = self.record_evidence(event, &verdict);
        EvaluationOutcome {
            decision,
            verdict: Some(verdict),
            evidence: Some(evidence),
        }
    }

    /// Analysis and evidence only, for scopes with auto-moderation off.
    fn observe_message(&self, compiled: &CompiledConfig, event: &Event) -> EvaluationOutcome {
        if !event.has_text() {
            return EvaluationOutcome::default();
        }

        let bundle = compiled.pipeline().analyze(&event.text);
        let verdict = ScoreFusion::new(&compiled.settings().scoring).fuse(&bundle, event.occurred_at);
        let evidence = verdict.is_flagged.then(|| {
            tracing::info!(
                actor_id = %event.actor,
                scope_id = %event.scope,
                category = %verdict.category,
                "Flagged message recorded; auto-moderation is off"
            );
            self.record_evidence(event, &verdict)
        });

        EvaluationOutcome {
            decision: Decision::default(),
            verdict: Some(verdict),
            evidence,
        }
    }

    fn record_evidence(&self, event: &Event, verdict: &AbuseVerdict) -> EvidenceRecord {
        let evidence = EvidenceRecord {
            actor: event.actor.clone(),
            scope: event.scope.clone(),
            text: event.text.clone(),
            occurred_at: event.occurred_at,
            content_fingerprint: verdict.content_fingerprint.clone(),
            verdict: verdict.clone(),
        };
        self.persistence
            .submit(PersistCommand::AppendEvidence(Box::new(evidence.clone())));
        evidence
    }

    fn evaluate_join(&self, settings: &ModerationConfig, event: &Event) -> Decision {
        let now = event.occurred_at;
        let limits = settings.limits_for(&event.scope);
        let mut decision = Decision::default();

        if limits.anti_raid {
            let raid = self.rates.record_join(&event.scope, now, &limits.raid);
            if raid.newly_entered {
                tracing::warn!(
                    scope_id = %event.scope,
                    joins = raid.joins,
                    "Raid detected; raid mode on"
                );
                decision.notify_channel = true;
                decision.reasons.push(DecisionReason::RaidDetected {
                    joins_in_window: raid.joins,
                });
            }
        }

        // Leaving and rejoining must not shake off a mute.
        if let Some(mute) = self.ledger.get_mute(&event.key(), now) {
            if let Some(remaining) = mute.remaining(now) {
                decision.request_mute(remaining);
                decision.reasons.push(DecisionReason::ActorMuted {
                    until: mute.expires_at,
                });
            }
        }

        decision
    }

    /// Classify text without touching rate or ledger state.
    pub fn scan(&self, text: &str) -> AbuseVerdict {
        let compiled = self.config.snapshot();
        let bundle = compiled.pipeline().analyze(text);
        ScoreFusion::new(&compiled.settings().scoring).fuse(&bundle, Utc::now())
    }

    /// Hand a decision to the executor and record a successful mute.
    pub async fn enforce<E: EnforcementExecutor + ?Sized>(
        &self,
        executor: &E,
        target: &EnforcementTarget,
        decision: &Decision,
        mention: &str,
    ) -> EnforcementReport {
        let report = apply_decision(executor, target, decision, mention).await;

        if report.mute == StepOutcome::Done {
            if let Some(mute) = self.ledger.mark_enforcement_applied(&target.key) {
                self.persistence.submit(PersistCommand::SaveMute {
                    key: target.key.clone(),
                    mute,
                });
            }
        }
        report
    }

    // ===== LEDGER ADMINISTRATION =====

    pub fn add_manual_warning(
        &self,
        key: &ScopedKey,
        reason: impl Into<String>,
        severity: Severity,
        now: DateTime<Utc>,
    ) -> WarningOutcome {
        let settings = self.config.snapshot();
        let outcome = self.ledger.record_warning(
            key,
            NewWarning {
                reason: reason.into(),
                severity,
                content_fingerprint: None,
            },
            now,
            &settings.settings().escalation,
        );
        self.persist_warning(key, &outcome);
        outcome
    }

    /// Record a moderator's warning and build the decision that delivers it:
    /// a private warning, a log entry and any escalation mute it triggered.
    pub fn warn_manually(
        &self,
        key: &ScopedKey,
        reason: &str,
        severity: Severity,
        now: DateTime<Utc>,
    ) -> (WarningOutcome, Decision) {
        let outcome = self.add_manual_warning(key, reason, severity, now);

        let mut decision = Decision {
            warn_user: true,
            warning_count: Some(outcome.warning_count),
            reasons: vec![DecisionReason::ManualWarning {
                reason: reason.to_string(),
                severity,
            }],
            ..Default::default()
        };
        if let Some(duration) = outcome.mute.as_ref().and_then(|m| m.remaining(now)) {
            decision.request_mute(duration);
        }
        (outcome, decision)
    }

    pub fn warnings(&self, key: &ScopedKey, limit: Option<usize>) -> Vec<WarningRecord> {
        self.ledger.get_warnings(key, limit)
    }

    pub fn warning_count(&self, key: &ScopedKey) -> u32 {
        self.ledger.warning_count(key)
    }

    pub fn remove_warning(&self, key: &ScopedKey, sequence_id: u64) -> Result<u32, LedgerError> {
        let remaining = self.ledger.remove_warning(key, sequence_id)?;
        self.persistence.submit(PersistCommand::DeleteWarning {
            key: key.clone(),
            sequence_id,
        });
        Ok(remaining)
    }

    pub fn clear_warnings(&self, key: &ScopedKey) -> u32 {
        let removed = self.ledger.clear_warnings(key);
        if removed > 0 {
            self.persistence
                .submit(PersistCommand::ClearWarnings { key: key.clone() });
        }
        removed
    }

    pub fn mute_status(&self, key: &ScopedKey, now: DateTime<Utc>) -> Option<MuteRecord> {
        self.ledger.get_mute(key, now)
    }

    /// End a mute early. Lifting the platform timeout is the caller's job.
    pub fn end_mute(&self, key: &ScopedKey, now: DateTime<Utc>) -> Option<MuteRecord> {
        let ended = self.ledger.end_mute(key, now);
        self.persistence
            .submit(PersistCommand::DeleteMute { key: key.clone() });
        ended
    }

    pub fn statistics(&self, scope: Option<&ScopeId>, now: DateTime<Utc>) -> LedgerStats {
        self.ledger.statistics(scope, now)
    }

    pub fn persistence_health(&self) -> HealthReport {
        self.persistence.health().report()
    }

    /// Load persisted ledger state. Call once at startup.
    pub fn restore(&self, snapshot: LedgerSnapshot) {
        let warned = snapshot.warnings.len();
        let mutes = snapshot.mutes.len();
        self.ledger.restore(snapshot);
        tracing::info!(warned, mutes, "Restored moderation ledger");
    }

    // ===== RAIDS =====

    pub fn raid_active(&self, scope: &ScopeId) -> bool {
        self.rates.is_raid_active(scope)
    }

    pub fn raid_started_at(&self, scope: &ScopeId) -> Option<DateTime<Utc>> {
        self.rates.raid_started_at(scope)
    }

    pub fn clear_raid(&self, scope: &ScopeId) -> bool {
        let cleared = self.rates.clear_raid(scope);
        if cleared {
            tracing::info!(scope_id = %scope, "Raid mode cleared");
        }
        cleared
    }

    pub fn alert_channel(&self, scope: &ScopeId) -> Option<String> {
        self.config.snapshot().settings().limits_for(scope).alert_channel_id
    }

    pub fn log_channel(&self, scope: &ScopeId) -> Option<String> {
        self.config.snapshot().settings().limits_for(scope).log_channel_id
    }

    // ===== CONFIG + HOUSEKEEPING =====

    /// Swap in new settings. On error the running configuration is kept.
    pub fn reload_config(&self, settings: ModerationConfig) -> Result<(), ConfigError> {
        let compiled = match self.config.reload(settings) {
            Ok(compiled) => compiled,
            Err(e) => {
                tracing::error!(error = %e, "Rejected moderation config; keeping the previous one");
                return Err(e);
            }
        };

        for scope in self.rates.active_raids() {
            if !compiled.settings().limits_for(&scope).anti_raid {
                self.rates.clear_raid(&scope);
                tracing::info!(scope_id = %scope, "Anti-raid disabled; raid mode cleared");
            }
        }

        tracing::info!("Moderation config reloaded");
        Ok(())
    }

    /// Evict idle rate windows and drop expired mutes.
    pub fn maintenance(&self, now: DateTime<Utc>) -> MaintenanceReport {
        let compiled = self.config.snapshot();
        let settings = compiled.settings();

        let horizon = settings
            .scopes
            .values()
            .flat_map(|o| [o.spam, o.raid])
            .flatten()
            .chain([settings.spam, settings.raid])
            .map(|limits| limits.window())
            .max()
            .unwrap_or_else(|| settings.spam.window());

        let evicted_windows = self.rates.prune(now, horizon);
        let expired = self.ledger.cleanup_expired_mutes(now);
        for key in &expired {
            self.persistence
                .submit(PersistCommand::DeleteMute { key: key.clone() });
        }

        if evicted_windows > 0 || !expired.is_empty() {
            tracing::debug!(
                evicted_windows,
                expired_mutes = expired.len(),
                "Moderation maintenance pass"
            );
        }

        MaintenanceReport {
            evicted_windows,
            expired_mutes: expired.len(),
        }
    }

    fn persist_warning(&self, key: &ScopedKey, outcome: &WarningOutcome) {
        self.persistence.submit(PersistCommand::SaveWarning {
            key: key.clone(),
            warning: outcome.record.clone(),
        });
        if let Some(mute) = &outcome.mute {
            self.persistence.submit(PersistCommand::SaveMute {
                key: key.clone(),
                mute: mute.clone(),
            });
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::moderation_models::{Category, EventKind};
    use crate::core::moderation::moderation_config::ScopeOverrides;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn engine_with(config: ModerationConfig) -> (ModerationEngine, mpsc::UnboundedReceiver<PersistCommand>) {
        let handle = Arc::new(ConfigHandle::new(config).unwrap());
        let (queue, receiver) = PersistenceQueue::new();
        (ModerationEngine::new(handle, queue), receiver)
    }

    fn engine() -> (ModerationEngine, mpsc::UnboundedReceiver<PersistCommand>) {
        engine_with(ModerationConfig::default())
    }

    fn drain(receiver: &mut mpsc::UnboundedReceiver<PersistCommand>) -> Vec<&'static str> {
        let mut labels = Vec::new();
        while let Ok(command) = receiver.try_recv() {
            labels.push(command.label());
        }
        labels
    }

    #[test]
    fn test_threat_is_flagged_and_warned() {
        let (engine, mut receiver) = engine();
        let outcome = engine.evaluate(&Event::message("user", "guild", "kill yourself", Utc::now()));

        let verdict = outcome.verdict.unwrap();
        assert!(verdict.is_flagged);
        assert_eq!(verdict.category, Category::ThreatViolence);

        let decision = outcome.decision;
        assert!(decision.delete_content);
        assert!(decision.warn_user);
        assert!(decision.notify_channel);
        assert_eq!(decision.mute, None);
        assert_eq!(decision.warning_count, Some(1));

        let evidence = outcome.evidence.unwrap();
        assert_eq!(evidence.text, "kill yourself");
        assert_eq!(evidence.content_fingerprint, verdict.content_fingerprint);

        assert_eq!(drain(&mut receiver), vec!["save_warning", "append_evidence"]);
    }

    #[test]
    fn test_clean_message_is_noop() {
        let (engine, mut receiver) = engine();
        let outcome =
            engine.evaluate(&Event::message("user", "guild", "hello how are you", Utc::now()));

        assert!(outcome.decision.is_noop());
        let verdict = outcome.verdict.unwrap();
        assert!(!verdict.is_flagged);
        assert!(verdict.matched_terms.is_empty());
        assert!(outcome.evidence.is_none());
        assert!(drain(&mut receiver).is_empty());
    }

    #[test]
    fn test_sixth_message_is_spam() {
        let (engine, _receiver) = engine();
        let start = Utc::now();

        for i in 0..5 {
            let event = Event::message("user", "guild", "hello", start + ChronoDuration::seconds(i));
            assert!(engine.evaluate(&event).decision.is_noop());
        }

        let event = Event::message("user", "guild", "hello", start + ChronoDuration::seconds(5));
        let decision = engine.evaluate(&event).decision;
        assert!(decision.delete_content);
        assert!(decision.notify_channel);
        assert_eq!(decision.mute, Some(Duration::from_secs(120)));
        assert!(matches!(
            decision.reasons[0],
            DecisionReason::Spam { messages_in_window: 6 }
        ));
        // Spam is not a content warning.
        assert_eq!(decision.warning_count, None);
        assert_eq!(engine.warning_count(&ScopedKey::new("guild", "user")), 0);

        // Further messages are just removed while the spam mute runs.
        let event = Event::message("user", "guild", "hello", start + ChronoDuration::seconds(6));
        let decision = engine.evaluate(&event).decision;
        assert!(decision.delete_content);
        assert!(!decision.notify_channel);
        assert!(matches!(decision.reasons[0], DecisionReason::ActorMuted { .. }));
    }

    #[test]
    fn test_fifth_flagged_message_mutes() {
        let (engine, _receiver) = engine();
        let start = Utc::now();

        let mut last = Decision::default();
        for i in 0..5 {
            let event = Event::message(
                "user",
                "guild",
                "you are an idiot",
                start + ChronoDuration::seconds(i * 3),
            );
            last = engine.evaluate(&event).decision;
            if i < 4 {
                assert_eq!(last.mute, None);
            }
        }

        assert_eq!(last.warning_count, Some(5));
        assert_eq!(last.mute, Some(Duration::from_secs(600)));
        assert!(engine.mute_status(&ScopedKey::new("guild", "user"), start + ChronoDuration::seconds(12)).is_some());
    }

    #[test]
    fn test_system_actor_is_ignored() {
        let mut config = ModerationConfig::default();
        config.system_actor_ids.push("webhook".to_string());
        let (engine, mut receiver) = engine_with(config);
        engine.register_system_actor(ActorId::from(42));

        for actor in ["webhook", "42"] {
            let outcome = engine.evaluate(&Event::message(actor, "guild", "kill yourself", Utc::now()));
            assert!(outcome.decision.is_noop());
            assert!(outcome.verdict.is_none());
        }
        assert!(drain(&mut receiver).is_empty());
    }

    #[test]
    fn test_blank_message_still_counts_toward_spam() {
        let (engine, _receiver) = engine();
        let now = Utc::now();

        for _ in 0..5 {
            let outcome = engine.evaluate(&Event::message("user", "guild", "   ", now));
            assert!(outcome.verdict.is_none());
        }
        let outcome = engine.evaluate(&Event::message("user", "guild", "", now));
        assert!(outcome.verdict.is_none());
        assert!(outcome.decision.delete_content);
    }

    #[test]
    fn test_raid_enters_once_and_stays() {
        let (engine, _receiver) = engine();
        let scope = ScopeId::from("guild");
        let start = Utc::now();

        let mut raid_notices = 0;
        for i in 0..8 {
            let event = Event::join(format!("user{i}").as_str(), "guild", start + ChronoDuration::seconds(i));
            let decision = engine.evaluate(&event).decision;
            if decision
                .reasons
                .iter()
                .any(|r| matches!(r, DecisionReason::RaidDetected { .. }))
            {
                raid_notices += 1;
                assert!(decision.notify_channel);
            }
        }

        assert_eq!(raid_notices, 1);
        assert!(engine.raid_active(&scope));
        assert!(engine.clear_raid(&scope));
        assert!(!engine.raid_active(&scope));
    }

    #[test]
    fn test_muted_actor_rejoining_gets_mute_back() {
        let (engine, _receiver) = engine();
        let now = Utc::now();
        let key = ScopedKey::new("guild", "user");
        engine
            .ledger
            .create_mute(&key, Duration::from_secs(300), "manual", now);

        let decision = engine
            .evaluate(&Event::join("user", "guild", now + ChronoDuration::seconds(100)))
            .decision;
        assert_eq!(decision.mute, Some(Duration::from_secs(200)));
    }

    #[test]
    fn test_scan_does_not_touch_state() {
        let (engine, mut receiver) = engine();
        let verdict = engine.scan("you are an idiot");

        assert!(verdict.is_flagged);
        assert_eq!(engine.statistics(None, Utc::now()).total_warnings, 0);
        assert!(drain(&mut receiver).is_empty());
    }

    #[test]
    fn test_ingest_rejects_malformed_events() {
        let (engine, _receiver) = engine();
        let raw = RawEvent {
            actor_id: String::new(),
            scope_id: "guild".to_string(),
            text: Some("hi".to_string()),
            kind: EventKind::Message,
            occurred_at: Utc::now(),
        };
        assert_eq!(engine.ingest(raw).unwrap_err(), IngestError::MissingActor);
    }

    #[test]
    fn test_decisions_survive_a_dead_store() {
        let (engine, receiver) = engine();
        drop(receiver);

        let outcome = engine.evaluate(&Event::message("user", "guild", "kill yourself", Utc::now()));
        assert!(outcome.decision.warn_user);
        assert_eq!(engine.warning_count(&ScopedKey::new("guild", "user")), 1);
        assert_eq!(engine.persistence_health().dropped, 2);
    }

    #[test]
    fn test_reload_disabling_anti_raid_clears_raid() {
        let (engine, _receiver) = engine();
        let now = Utc::now();
        for i in 0..6 {
            engine.evaluate(&Event::join(format!("u{i}").as_str(), "guild", now));
        }
        assert!(engine.raid_active(&ScopeId::from("guild")));

        let mut config = ModerationConfig::default();
        config.scopes.insert(
            "guild".to_string(),
            ScopeOverrides {
                anti_raid: Some(false),
                ..Default::default()
            },
        );
        engine.reload_config(config).unwrap();
        assert!(!engine.raid_active(&ScopeId::from("guild")));

        let mut bad = ModerationConfig::default();
        bad.escalation.mute_every = 0;
        assert!(engine.reload_config(bad).is_err());
        // The accepted override is still in force.
        assert!(!engine.config().settings().limits_for(&ScopeId::from("guild")).anti_raid);
    }

    #[test]
    fn test_admin_ledger_operations_are_persisted() {
        let (engine, mut receiver) = engine();
        let key = ScopedKey::new("guild", "user");
        let now = Utc::now();

        engine.add_manual_warning(&key, "being rude", Severity::Low, now);
        engine.add_manual_warning(&key, "being rude again", Severity::Medium, now);
        assert_eq!(engine.remove_warning(&key, 1), Ok(1));
        assert_eq!(engine.clear_warnings(&key), 1);
        assert!(engine.warnings(&key, None).is_empty());

        assert_eq!(
            drain(&mut receiver),
            vec!["save_warning", "save_warning", "delete_warning", "clear_warnings"]
        );
    }

    #[test]
    fn test_clean_words_with_profane_prefixes() {
        let (engine, mut receiver) = engine();
        let now = Utc::now();

        for text in [
            "I love shiitake mushrooms",
            "we flew to fukuoka",
            "my bichon frise is cute",
        ] {
            let outcome = engine.evaluate(&Event::message("user", "guild", text, now));
            assert!(outcome.decision.is_noop(), "{text} should not be moderated");
            assert!(!outcome.verdict.unwrap().is_flagged);
        }
        assert_eq!(engine.warning_count(&ScopedKey::new("guild", "user")), 0);
        assert!(drain(&mut receiver).is_empty());
    }

    #[test]
    fn test_auto_moderation_off_keeps_evidence_only() {
        let mut config = ModerationConfig::default();
        config.scopes.insert(
            "quiet".to_string(),
            ScopeOverrides {
                auto_moderate: Some(false),
                ..Default::default()
            },
        );
        let (engine, mut receiver) = engine_with(config);
        let now = Utc::now();

        let outcome = engine.evaluate(&Event::message("user", "quiet", "kill yourself", now));
        assert!(outcome.decision.is_noop());
        assert!(outcome.verdict.unwrap().is_flagged);
        assert!(outcome.evidence.is_some());
        assert_eq!(engine.warning_count(&ScopedKey::new("quiet", "user")), 0);
        assert_eq!(drain(&mut receiver), vec!["append_evidence"]);

        // Spam is not acted on either.
        for _ in 0..10 {
            let outcome = engine.evaluate(&Event::message("user", "quiet", "hello", now));
            assert!(outcome.decision.is_noop());
        }

        // Other scopes keep the default.
        let outcome = engine.evaluate(&Event::message("user", "guild", "kill yourself", now));
        assert!(outcome.decision.warn_user);
    }

    #[test]
    fn test_manual_warning_decision() {
        let (engine, _receiver) = engine();
        let key = ScopedKey::new("guild", "user");
        let now = Utc::now();

        for _ in 0..4 {
            engine.add_manual_warning(&key, "earlier", Severity::Low, now);
        }
        let (outcome, decision) = engine.warn_manually(&key, "posting slurs", Severity::High, now);

        assert_eq!(outcome.warning_count, 5);
        assert!(decision.warn_user);
        assert!(!decision.delete_content);
        assert!(!decision.notify_channel);
        assert_eq!(decision.warning_count, Some(5));
        assert_eq!(decision.mute, Some(Duration::from_secs(600)));
        assert_eq!(
            decision.reasons,
            vec![DecisionReason::ManualWarning {
                reason: "posting slurs".to_string(),
                severity: Severity::High,
            }]
        );
    }

    #[test]
    fn test_oversized_window_is_rejected_before_evaluation() {
        let mut config = ModerationConfig::default();
        config.spam.window_secs = 1_000_000_000_000_000;
        assert!(ConfigHandle::new(config.clone()).is_err());

        let (engine, _receiver) = engine();
        assert!(engine.reload_config(config).is_err());
        let outcome = engine.evaluate(&Event::message("user", "guild", "hello", Utc::now()));
        assert!(outcome.decision.is_noop());
    }

    #[test]
    fn test_maintenance_drops_expired_mutes() {
        let (engine, mut receiver) = engine();
        let now = Utc::now();
        let key = ScopedKey::new("guild", "user");
        engine
            .ledger
            .create_mute(&key, Duration::from_secs(60), "manual", now);
        engine.evaluate(&Event::message("other", "guild", "hello", now));

        let report = engine.maintenance(now + ChronoDuration::minutes(5));
        assert_eq!(
            report,
            MaintenanceReport {
                evicted_windows: 1,
                expired_mutes: 1,
            }
        );
        assert_eq!(drain(&mut receiver), vec!["delete_mute"]);
    }
}
