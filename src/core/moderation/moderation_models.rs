// Moderation domain models - data structures shared by the moderation engine.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts gateway events into `Event`s and turns
// `Decision`s back into Discord actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// The user/account that originated an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

/// The container (guild or channel) that rate and warning state is tracked in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(pub String);

macro_rules! opaque_id {
    ($name:ident) => {
        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id.to_string())
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id!(ActorId);
opaque_id!(ScopeId);

/// Composite key for per-(scope, actor) state.
///
/// Users can be in multiple guilds, and warnings/mutes are tracked
/// separately in each one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopedKey {
    pub scope: ScopeId,
    pub actor: ActorId,
}

impl ScopedKey {
    pub fn new(scope: impl Into<ScopeId>, actor: impl Into<ActorId>) -> Self {
        Self {
            scope: scope.into(),
            actor: actor.into(),
        }
    }
}

// ============================================================================
// EVENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    Join,
}

/// An event as delivered by the platform client, before validation.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub actor_id: String,
    pub scope_id: String,
    pub text: Option<String>,
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    #[error("Event is missing an actor id")]
    MissingActor,

    #[error("Event is missing a scope id")]
    MissingScope,
}

/// A validated, immutable event consumed once by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub actor: ActorId,
    pub scope: ScopeId,
    pub text: String,
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
}

impl Event {
    pub fn message(
        actor: impl Into<ActorId>,
        scope: impl Into<ScopeId>,
        text: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            actor: actor.into(),
            scope: scope.into(),
            text: text.into(),
            kind: EventKind::Message,
            occurred_at,
        }
    }

    pub fn join(
        actor: impl Into<ActorId>,
        scope: impl Into<ScopeId>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            actor: actor.into(),
            scope: scope.into(),
            text: String::new(),
            kind: EventKind::Join,
            occurred_at,
        }
    }

    pub fn key(&self) -> ScopedKey {
        ScopedKey {
            scope: self.scope.clone(),
            actor: self.actor.clone(),
        }
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

impl TryFrom<RawEvent> for Event {
    type Error = IngestError;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        let actor = raw.actor_id.trim();
        if actor.is_empty() {
            return Err(IngestError::MissingActor);
        }
        let scope = raw.scope_id.trim();
        if scope.is_empty() {
            return Err(IngestError::MissingScope);
        }

        Ok(Self {
            actor: ActorId(actor.to_string()),
            scope: ScopeId(scope.to_string()),
            text: raw.text.unwrap_or_default(),
            kind: raw.kind,
            occurred_at: raw.occurred_at,
        })
    }
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Abuse category. Declaration order is the resolution priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ThreatViolence,
    HateDiscrimination,
    Harassment,
    Profanity,
    Clean,
}

impl Category {
    /// Categories that carry evidence, highest priority first.
    pub const PRIORITY: [Category; 4] = [
        Category::ThreatViolence,
        Category::HateDiscrimination,
        Category::Harassment,
        Category::Profanity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::ThreatViolence => "threat_violence",
            Category::HateDiscrimination => "hate_discrimination",
            Category::Harassment => "harassment",
            Category::Profanity => "profanity",
            Category::Clean => "clean",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity `{other}`")),
        }
    }
}

/// Which family of extractor produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Pattern,
    Lexicon,
    Sentiment,
}

/// Raw output of a single extractor. Lives for one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalResult {
    pub extractor_name: String,
    pub kind: SignalKind,
    pub matched: bool,
    pub matched_terms: Vec<String>,
    /// Term count for term extractors, polarity in [-1, 1] for sentiment.
    pub numeric_score: f64,
    pub category: Category,
}

impl SignalResult {
    pub fn terms(name: &str, kind: SignalKind, found: Vec<(String, Category)>) -> Self {
        let category = Category::PRIORITY
            .into_iter()
            .find(|c| found.iter().any(|(_, fc)| fc == c))
            .unwrap_or(Category::Clean);

        Self {
            extractor_name: name.to_string(),
            kind,
            matched: !found.is_empty(),
            numeric_score: found.len() as f64,
            matched_terms: found.into_iter().map(|(term, _)| term).collect(),
            category,
        }
    }

    pub fn sentiment(name: &str, polarity: f64) -> Self {
        Self {
            extractor_name: name.to_string(),
            kind: SignalKind::Sentiment,
            matched: polarity < 0.0,
            matched_terms: Vec::new(),
            numeric_score: polarity.clamp(-1.0, 1.0),
            category: Category::Clean,
        }
    }
}

/// The fused classification of one piece of text. Persisted as evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbuseVerdict {
    pub is_flagged: bool,
    pub score: f64,
    pub severity: Severity,
    pub category: Category,
    /// Top matched terms (pattern labels first), at most five.
    pub matched_terms: Vec<String>,
    /// Distinct matched terms before the cap.
    pub term_count: usize,
    pub language: String,
    /// Polarity per sentiment estimator that produced a value.
    pub sentiment: BTreeMap<String, f64>,
    pub produced_at: DateTime<Utc>,
    pub content_fingerprint: String,
}

// ============================================================================
// LEDGER RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningRecord {
    pub sequence_id: u64,
    pub reason: String,
    pub severity: Severity,
    /// Manual warnings issued by a moderator have no content behind them.
    pub content_fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A warning about to be appended to the ledger.
#[derive(Debug, Clone)]
pub struct NewWarning {
    pub reason: String,
    pub severity: Severity,
    pub content_fingerprint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuteRecord {
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub reason: String,
    pub enforcement_applied: bool,
    /// Cleared lazily once `expires_at` has passed, or on early termination.
    pub active: bool,
}

impl MuteRecord {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.active && now < self.expires_at
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        if !self.is_active_at(now) {
            return None;
        }
        (self.expires_at - now).to_std().ok()
    }
}

/// Everything the ledger holds, used to restore state from the store at startup.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    pub warnings: Vec<(ScopedKey, Vec<WarningRecord>)>,
    pub mutes: Vec<(ScopedKey, MuteRecord)>,
    /// Highest sequence id issued per key, counting removed warnings.
    pub sequences: Vec<(ScopedKey, u64)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerStats {
    pub users_warned: usize,
    pub total_warnings: usize,
    pub active_mutes: usize,
    pub severity_breakdown: BTreeMap<Severity, usize>,
}

// ============================================================================
// DECISIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum DecisionReason {
    /// Actor exceeded the message rate for the scope.
    Spam { messages_in_window: usize },
    /// Scope entered raid mode on this join.
    RaidDetected { joins_in_window: usize },
    /// Actor already has an active mute.
    ActorMuted { until: DateTime<Utc> },
    AbusiveContent {
        category: Category,
        severity: Severity,
    },
    /// A moderator issued a warning by hand.
    ManualWarning { reason: String, severity: Severity },
}

/// What the enforcement executor should do. The engine never acts itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decision {
    pub delete_content: bool,
    pub warn_user: bool,
    pub mute: Option<Duration>,
    pub notify_channel: bool,
    pub reasons: Vec<DecisionReason>,
    /// Warning total after this event, when a warning was recorded.
    pub warning_count: Option<u32>,
}

impl Decision {
    pub fn is_noop(&self) -> bool {
        !self.delete_content && !self.warn_user && self.mute.is_none() && !self.notify_channel
    }

    /// Keep the longer of two mute requests.
    pub fn request_mute(&mut self, duration: Duration) {
        self.mute = Some(self.mute.map_or(duration, |current| current.max(duration)));
    }
}

/// Evidence handed to the persistence collaborator for every flagged verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub actor: ActorId,
    pub scope: ScopeId,
    pub text: String,
    pub occurred_at: DateTime<Utc>,
    pub content_fingerprint: String,
    pub verdict: AbuseVerdict,
}

/// Result of evaluating a single event.
#[derive(Debug, Clone, Default)]
pub struct EvaluationOutcome {
    pub decision: Decision,
    pub verdict: Option<AbuseVerdict>,
    pub evidence: Option<EvidenceRecord>,
}

impl EvaluationOutcome {
    pub fn ignored() -> Self {
        Self::default()
    }
}

// ============================================================================
// TEXT HELPERS
// ============================================================================

/// Lower-case, trim and collapse whitespace runs to a single space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable SHA-256 hex digest of the normalized text.
pub fn content_fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(text).as_bytes());
    hex::encode(hasher.finalize())
}
