// Moderation configuration: thresholds, lexicons, patterns and escalation policy.
//
// The raw `ModerationConfig` is what lives on disk (JSON). It is validated and
// compiled into a `CompiledConfig` before the engine ever sees it, and held in
// a `ConfigHandle` so it can be swapped at runtime without touching evaluations
// that are already running.

use super::default_rules::{default_lexicons, default_patterns, LanguageLexicon};
use super::moderation_models::{Category, ScopeId};
use super::signal_extractors::SignalPipeline;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Pattern `{label}` does not compile: {source}")]
    InvalidPattern {
        label: String,
        #[source]
        source: regex::Error,
    },

    #[error("Lexicon `{language}` contains an empty term")]
    EmptyTerm { language: String },

    #[error("No lexicon configured for default language `{0}`")]
    MissingDefaultLexicon(String),
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidField {
        field: field.to_string(),
        reason: reason.into(),
    }
}

// ============================================================================
// CONFIG MODEL
// ============================================================================

/// "More than `max_events` within `window_secs`" is over the limit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_events: u32,
    pub window_secs: u64,
}

/// Longest accepted rate window: one day.
pub const MAX_WINDOW_SECS: u64 = 86_400;

impl RateLimitConfig {
    pub fn window(&self) -> chrono::Duration {
        let secs = self.window_secs.min(MAX_WINDOW_SECS) as i64;
        chrono::Duration::try_seconds(secs).unwrap_or_else(chrono::Duration::zero)
    }

    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if self.max_events == 0 {
            return Err(invalid(&format!("{field}.max_events"), "must be at least 1"));
        }
        if self.window_secs == 0 {
            return Err(invalid(&format!("{field}.window_secs"), "must be at least 1"));
        }
        if self.window_secs > MAX_WINDOW_SECS {
            return Err(invalid(
                &format!("{field}.window_secs"),
                format!("must be at most {MAX_WINDOW_SECS}"),
            ));
        }
        Ok(())
    }
}

/// Which conditions flag a message. Each can be switched off on its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagRules {
    /// Total score above `score_threshold`.
    pub on_score: bool,
    /// Any sentiment estimator below `strong_negative_sentiment`.
    pub on_strong_negative_sentiment: bool,
    /// Any lexicon term or pattern matched at all (zero tolerance).
    pub on_any_match: bool,
}

impl Default for FlagRules {
    fn default() -> Self {
        Self {
            on_score: true,
            on_strong_negative_sentiment: true,
            on_any_match: true,
        }
    }
}

/// A severity tier is reached when ANY configured bound is met.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityTier {
    pub min_score: Option<f64>,
    pub min_terms: Option<usize>,
    /// Strongest single negative sentiment at or below this value.
    pub max_sentiment: Option<f64>,
}

impl SeverityTier {
    pub fn is_met(&self, score: f64, terms: usize, strongest_negative: f64) -> bool {
        self.min_score.is_some_and(|min| score >= min)
            || self.min_terms.is_some_and(|min| terms >= min)
            || self.max_sentiment.is_some_and(|max| strongest_negative <= max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityTiers {
    pub critical: SeverityTier,
    pub high: SeverityTier,
    pub medium: SeverityTier,
}

impl Default for SeverityTiers {
    fn default() -> Self {
        Self {
            critical: SeverityTier {
                min_score: Some(2.0),
                min_terms: Some(5),
                max_sentiment: Some(-0.9),
            },
            high: SeverityTier {
                min_score: Some(0.8),
                min_terms: Some(3),
                max_sentiment: Some(-0.7),
            },
            medium: SeverityTier {
                min_score: Some(0.5),
                min_terms: Some(2),
                max_sentiment: Some(-0.4),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub keyword_weight: f64,
    pub score_threshold: f64,
    pub strong_negative_sentiment: f64,
    pub flag_rules: FlagRules,
    pub severity: SeverityTiers,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            keyword_weight: 0.4,
            score_threshold: 0.4,
            strong_negative_sentiment: -0.5,
            flag_rules: FlagRules::default(),
            severity: SeverityTiers::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// A mute is issued every time the warning count reaches a multiple of this.
    pub mute_every: u32,
    /// Mute length for the 1st, 2nd, ... multiple. The last entry repeats.
    pub mute_schedule_secs: Vec<u64>,
    /// Mute applied on a spam breach. Zero disables it.
    pub spam_mute_secs: u64,
}

impl EscalationConfig {
    /// Mute duration owed when the warning total reaches `warning_count`.
    pub fn mute_for(&self, warning_count: u32) -> Option<Duration> {
        if self.mute_every == 0 || warning_count == 0 || warning_count % self.mute_every != 0 {
            return None;
        }
        let level = (warning_count / self.mute_every) as usize;
        let index = (level - 1).min(self.mute_schedule_secs.len().saturating_sub(1));
        self.mute_schedule_secs
            .get(index)
            .map(|secs| Duration::from_secs(*secs))
    }

    pub fn spam_mute(&self) -> Option<Duration> {
        (self.spam_mute_secs > 0).then(|| Duration::from_secs(self.spam_mute_secs))
    }
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            mute_every: 5,
            mute_schedule_secs: vec![600, 1_800, 3_600, 86_400],
            spam_mute_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRule {
    /// Semantic label recorded as the matched term, e.g. `threat-self-harm`.
    pub label: String,
    pub category: Category,
    pub regex: String,
}

/// Per-scope overrides of the global limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeOverrides {
    pub spam: Option<RateLimitConfig>,
    pub raid: Option<RateLimitConfig>,
    pub anti_raid: Option<bool>,
    /// When false, messages are still analysed and evidence is kept, but
    /// nothing is enforced or added to the ledger.
    pub auto_moderate: Option<bool>,
    pub alert_channel_id: Option<String>,
    /// Moderator log channel for enforcement actions.
    pub log_channel_id: Option<String>,
}

/// Limits in force for one scope after applying overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeLimits {
    pub spam: RateLimitConfig,
    pub raid: RateLimitConfig,
    pub anti_raid: bool,
    pub auto_moderate: bool,
    pub alert_channel_id: Option<String>,
    pub log_channel_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    pub enabled: bool,
    /// Actors whose events are never evaluated (the bot itself, webhooks).
    pub system_actor_ids: Vec<String>,
    pub default_language: String,
    pub lexicons: BTreeMap<String, LanguageLexicon>,
    pub patterns: Vec<PatternRule>,
    pub spam: RateLimitConfig,
    pub raid: RateLimitConfig,
    pub anti_raid: bool,
    /// Default for scopes without an `auto_moderate` override.
    pub auto_moderate: bool,
    pub scoring: ScoringConfig,
    pub escalation: EscalationConfig,
    /// Longer texts are truncated before analysis.
    pub max_text_chars: usize,
    pub scopes: HashMap<String, ScopeOverrides>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            system_actor_ids: Vec::new(),
            default_language: "en".to_string(),
            lexicons: default_lexicons(),
            patterns: default_patterns(),
            spam: RateLimitConfig {
                max_events: 5,
                window_secs: 10,
            },
            raid: RateLimitConfig {
                max_events: 5,
                window_secs: 10,
            },
            anti_raid: true,
            auto_moderate: true,
            scoring: ScoringConfig::default(),
            escalation: EscalationConfig::default(),
            max_text_chars: 4_000,
            scopes: HashMap::new(),
        }
    }
}

impl ModerationConfig {
    pub fn limits_for(&self, scope: &ScopeId) -> ScopeLimits {
        let overrides = self.scopes.get(scope.as_str());
        ScopeLimits {
            spam: overrides.and_then(|o| o.spam).unwrap_or(self.spam),
            raid: overrides.and_then(|o| o.raid).unwrap_or(self.raid),
            anti_raid: overrides.and_then(|o| o.anti_raid).unwrap_or(self.anti_raid),
            auto_moderate: overrides
                .and_then(|o| o.auto_moderate)
                .unwrap_or(self.auto_moderate),
            alert_channel_id: overrides.and_then(|o| o.alert_channel_id.clone()),
            log_channel_id: overrides.and_then(|o| o.log_channel_id.clone()),
        }
    }

    pub fn is_system_actor(&self, actor: &str) -> bool {
        self.system_actor_ids.iter().any(|id| id == actor)
    }

    /// Reject configurations the engine cannot run on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.spam.validate("spam")?;
        self.raid.validate("raid")?;
        for (scope, overrides) in &self.scopes {
            if let Some(spam) = &overrides.spam {
                spam.validate(&format!("scopes.{scope}.spam"))?;
            }
            if let Some(raid) = &overrides.raid {
                raid.validate(&format!("scopes.{scope}.raid"))?;
            }
        }

        let scoring = &self.scoring;
        if !(scoring.keyword_weight > 0.0) {
            return Err(invalid("scoring.keyword_weight", "must be positive"));
        }
        if !(scoring.score_threshold >= 0.0) {
            return Err(invalid("scoring.score_threshold", "must not be negative"));
        }
        if !(-1.0..=1.0).contains(&scoring.strong_negative_sentiment) {
            return Err(invalid(
                "scoring.strong_negative_sentiment",
                "must be within [-1, 1]",
            ));
        }
        let rules = scoring.flag_rules;
        if !rules.on_score && !rules.on_strong_negative_sentiment && !rules.on_any_match {
            return Err(invalid(
                "scoring.flag_rules",
                "at least one flag rule must be enabled",
            ));
        }
        validate_tiers(&scoring.severity)?;

        let escalation = &self.escalation;
        if escalation.mute_every == 0 {
            return Err(invalid("escalation.mute_every", "must be at least 1"));
        }
        if escalation.mute_schedule_secs.is_empty() {
            return Err(invalid(
                "escalation.mute_schedule_secs",
                "needs at least one duration",
            ));
        }
        if escalation.mute_schedule_secs.contains(&0) {
            return Err(invalid(
                "escalation.mute_schedule_secs",
                "durations must be positive",
            ));
        }

        if self.max_text_chars == 0 {
            return Err(invalid("max_text_chars", "must be at least 1"));
        }
        if !self.lexicons.contains_key(&self.default_language) {
            return Err(ConfigError::MissingDefaultLexicon(
                self.default_language.clone(),
            ));
        }

        Ok(())
    }
}

fn validate_tiers(tiers: &SeverityTiers) -> Result<(), ConfigError> {
    let ordered = [
        ("critical", tiers.critical),
        ("high", tiers.high),
        ("medium", tiers.medium),
    ];

    for (name, tier) in &ordered {
        if let Some(max) = tier.max_sentiment {
            if !(-1.0..=1.0).contains(&max) {
                return Err(invalid(
                    &format!("scoring.severity.{name}.max_sentiment"),
                    "must be within [-1, 1]",
                ));
            }
        }
    }

    // A higher tier must never be easier to reach than the one below it.
    for pair in ordered.windows(2) {
        let (upper_name, upper) = pair[0];
        let (lower_name, lower) = pair[1];
        if let (Some(u), Some(l)) = (upper.min_score, lower.min_score) {
            if u < l {
                return Err(invalid(
                    &format!("scoring.severity.{upper_name}.min_score"),
                    format!("is below the {lower_name} tier"),
                ));
            }
        }
        if let (Some(u), Some(l)) = (upper.min_terms, lower.min_terms) {
            if u < l {
                return Err(invalid(
                    &format!("scoring.severity.{upper_name}.min_terms"),
                    format!("is below the {lower_name} tier"),
                ));
            }
        }
        if let (Some(u), Some(l)) = (upper.max_sentiment, lower.max_sentiment) {
            if u > l {
                return Err(invalid(
                    &format!("scoring.severity.{upper_name}.max_sentiment"),
                    format!("is less negative than the {lower_name} tier"),
                ));
            }
        }
    }

    Ok(())
}

// ============================================================================
// COMPILED CONFIG + HOT RELOAD
// ============================================================================

/// A validated configuration with its extractors built.
pub struct CompiledConfig {
    settings: ModerationConfig,
    pipeline: SignalPipeline,
}

impl CompiledConfig {
    pub fn compile(settings: ModerationConfig) -> Result<Self, ConfigError> {
        settings.validate()?;
        let pipeline = SignalPipeline::from_config(&settings)?;
        Ok(Self { settings, pipeline })
    }

    pub fn settings(&self) -> &ModerationConfig {
        &self.settings
    }

    pub fn pipeline(&self) -> &SignalPipeline {
        &self.pipeline
    }
}

/// Shared, hot-swappable configuration.
///
/// Readers take an `Arc` snapshot once per evaluation, so a reload only
/// affects events that start after it.
pub struct ConfigHandle {
    current: RwLock<Arc<CompiledConfig>>,
}

impl ConfigHandle {
    pub fn new(settings: ModerationConfig) -> Result<Self, ConfigError> {
        let compiled = CompiledConfig::compile(settings)?;
        Ok(Self {
            current: RwLock::new(Arc::new(compiled)),
        })
    }

    pub fn snapshot(&self) -> Arc<CompiledConfig> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Swap in a new configuration. On error the last-known-good one stays.
    pub fn reload(&self, settings: ModerationConfig) -> Result<Arc<CompiledConfig>, ConfigError> {
        let compiled = Arc::new(CompiledConfig::compile(settings)?);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::clone(&compiled);
        Ok(compiled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ModerationConfig::default().validate().is_ok());
        assert!(ConfigHandle::new(ModerationConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_zero_window() {
        let mut config = ModerationConfig::default();
        config.spam.window_secs = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("spam.window_secs"));
    }

    #[test]
    fn test_rejects_oversized_window() {
        let mut config = ModerationConfig::default();
        config.spam.window_secs = 1_000_000_000_000_000;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("spam.window_secs"));

        let mut config = ModerationConfig::default();
        config.scopes.insert(
            "g".to_string(),
            ScopeOverrides {
                raid: Some(RateLimitConfig {
                    max_events: 5,
                    window_secs: MAX_WINDOW_SECS + 1,
                }),
                ..Default::default()
            },
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("scopes.g.raid.window_secs"));

        config.scopes.clear();
        config.raid.window_secs = MAX_WINDOW_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_window_conversion_never_overflows() {
        let huge = RateLimitConfig {
            max_events: 1,
            window_secs: u64::MAX,
        };
        assert_eq!(huge.window(), chrono::Duration::seconds(MAX_WINDOW_SECS as i64));
    }

    #[test]
    fn test_rejects_inverted_severity_tiers() {
        let mut config = ModerationConfig::default();
        config.scoring.severity.high.min_score = Some(3.0);

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("critical.min_score"));
    }

    #[test]
    fn test_rejects_all_flag_rules_disabled() {
        let mut config = ModerationConfig::default();
        config.scoring.flag_rules = FlagRules {
            on_score: false,
            on_strong_negative_sentiment: false,
            on_any_match: false,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_pattern() {
        let mut config = ModerationConfig::default();
        config.patterns.push(PatternRule {
            label: "broken".to_string(),
            category: Category::Profanity,
            regex: "(unclosed".to_string(),
        });

        match CompiledConfig::compile(config) {
            Err(ConfigError::InvalidPattern { label, .. }) => assert_eq!(label, "broken"),
            other => panic!("expected InvalidPattern, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_failed_reload_keeps_last_known_good() {
        let handle = ConfigHandle::new(ModerationConfig::default()).unwrap();

        let mut bad = ModerationConfig::default();
        bad.raid.max_events = 0;
        assert!(handle.reload(bad).is_err());
        assert_eq!(handle.snapshot().settings().raid.max_events, 5);

        let mut good = ModerationConfig::default();
        good.raid.max_events = 9;
        handle.reload(good).unwrap();
        assert_eq!(handle.snapshot().settings().raid.max_events, 9);
    }

    #[test]
    fn test_snapshot_survives_reload() {
        let handle = ConfigHandle::new(ModerationConfig::default()).unwrap();
        let in_flight = handle.snapshot();

        let mut next = ModerationConfig::default();
        next.scoring.keyword_weight = 1.0;
        handle.reload(next).unwrap();

        assert_eq!(in_flight.settings().scoring.keyword_weight, 0.4);
        assert_eq!(handle.snapshot().settings().scoring.keyword_weight, 1.0);
    }

    #[test]
    fn test_scope_overrides() {
        let mut config = ModerationConfig::default();
        config.scopes.insert(
            "99".to_string(),
            ScopeOverrides {
                spam: Some(RateLimitConfig {
                    max_events: 2,
                    window_secs: 3,
                }),
                anti_raid: Some(false),
                auto_moderate: Some(false),
                log_channel_id: Some("555".to_string()),
                ..Default::default()
            },
        );

        let limits = config.limits_for(&ScopeId::from(99));
        assert_eq!(limits.spam.max_events, 2);
        assert_eq!(limits.raid, config.raid);
        assert!(!limits.anti_raid);
        assert!(!limits.auto_moderate);
        assert_eq!(limits.log_channel_id.as_deref(), Some("555"));

        let defaults = config.limits_for(&ScopeId::from(1));
        assert_eq!(defaults.spam, config.spam);
        assert!(defaults.anti_raid);
        assert!(defaults.auto_moderate);
        assert_eq!(defaults.log_channel_id, None);
    }

    #[test]
    fn test_mute_schedule_escalates_and_clamps() {
        let escalation = EscalationConfig::default();
        assert_eq!(escalation.mute_for(4), None);
        assert_eq!(escalation.mute_for(5), Some(Duration::from_secs(600)));
        assert_eq!(escalation.mute_for(6), None);
        assert_eq!(escalation.mute_for(10), Some(Duration::from_secs(1_800)));
        assert_eq!(escalation.mute_for(50), Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ModerationConfig =
            serde_json::from_str(r#"{ "spam": { "max_events": 3, "window_secs": 5 } }"#).unwrap();
        assert_eq!(config.spam.max_events, 3);
        assert_eq!(config.raid.max_events, 5);
        assert!(config.lexicons.contains_key("en"));
    }
}
