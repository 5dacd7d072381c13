// Enforcement port: carries out a Decision on the chat platform.
//
// Each step (delete, warn, mute, notify, log) is attempted and reported on
// its own. A failing step never aborts the others and nothing is retried.

use super::moderation_models::{Decision, DecisionReason, ScopedKey};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnforcementError {
    #[error("Missing permission: {0}")]
    MissingPermission(String),

    #[error("Target no longer exists: {0}")]
    NotFound(String),

    #[error("Platform error: {0}")]
    Platform(String),
}

/// What a decision is about on the platform side.
#[derive(Debug, Clone, PartialEq)]
pub struct EnforcementTarget {
    pub key: ScopedKey,
    /// The offending message, when there is one.
    pub content_id: Option<String>,
    /// Where notices go.
    pub channel_id: Option<String>,
    /// The scope's moderator log channel, if one is configured.
    pub log_channel_id: Option<String>,
}

#[async_trait]
pub trait EnforcementExecutor: Send + Sync {
    async fn delete_content(&self, target: &EnforcementTarget) -> Result<(), EnforcementError>;

    /// Tell the actor privately why they were warned.
    async fn warn_user(&self, target: &EnforcementTarget, message: &str)
        -> Result<(), EnforcementError>;

    async fn apply_mute(
        &self,
        target: &EnforcementTarget,
        duration: Duration,
        reason: &str,
    ) -> Result<(), EnforcementError>;

    async fn lift_mute(&self, key: &ScopedKey) -> Result<(), EnforcementError>;

    /// Post a message to a channel in the target's scope.
    async fn notify(&self, channel_id: &str, notice: &str) -> Result<(), EnforcementError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Skipped,
    Done,
    Failed(String),
}

impl StepOutcome {
    fn from_result(result: Result<(), EnforcementError>) -> Self {
        match result {
            Ok(()) => StepOutcome::Done,
            Err(e) => StepOutcome::Failed(e.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnforcementReport {
    pub delete: StepOutcome,
    pub warn: StepOutcome,
    pub mute: StepOutcome,
    pub notify: StepOutcome,
    pub log: StepOutcome,
}

impl EnforcementReport {
    pub fn fully_applied(&self) -> bool {
        [&self.delete, &self.warn, &self.mute, &self.notify, &self.log]
            .iter()
            .all(|step| !step.is_failed())
    }
}

/// Run every step the decision asks for.
pub async fn apply_decision<E: EnforcementExecutor + ?Sized>(
    executor: &E,
    target: &EnforcementTarget,
    decision: &Decision,
    mention: &str,
) -> EnforcementReport {
    let delete = if decision.delete_content && target.content_id.is_some() {
        StepOutcome::from_result(executor.delete_content(target).await)
    } else {
        StepOutcome::Skipped
    };

    let warn = match render_warning(decision) {
        Some(message) if decision.warn_user => {
            StepOutcome::from_result(executor.warn_user(target, &message).await)
        }
        _ => StepOutcome::Skipped,
    };

    let mute = match decision.mute {
        Some(duration) => StepOutcome::from_result(
            executor
                .apply_mute(target, duration, &mute_reason(decision))
                .await,
        ),
        None => StepOutcome::Skipped,
    };

    let notify = match (render_notice(decision, mention), target.channel_id.as_deref()) {
        (Some(notice), Some(channel_id)) if decision.notify_channel => {
            StepOutcome::from_result(executor.notify(channel_id, &notice).await)
        }
        _ => StepOutcome::Skipped,
    };

    let log = match (render_log_entry(decision, target, mention), target.log_channel_id.as_deref()) {
        (Some(entry), Some(channel_id)) => {
            StepOutcome::from_result(executor.notify(channel_id, &entry).await)
        }
        _ => StepOutcome::Skipped,
    };

    let report = EnforcementReport {
        delete,
        warn,
        mute,
        notify,
        log,
    };
    if !report.fully_applied() {
        tracing::warn!(
            actor_id = %target.key.actor,
            scope_id = %target.key.scope,
            ?report,
            "Decision only partially enforced"
        );
    }
    report
}

fn mute_reason(decision: &Decision) -> String {
    decision
        .reasons
        .iter()
        .map(|reason| match reason {
            DecisionReason::Spam { .. } => "Sending messages too quickly".to_string(),
            DecisionReason::RaidDetected { .. } => "Join raid".to_string(),
            DecisionReason::ActorMuted { .. } => "Re-applying active mute".to_string(),
            DecisionReason::AbusiveContent { category, severity } => {
                format!("Abusive content ({category}, {severity})")
            }
            DecisionReason::ManualWarning { reason, .. } => format!("Warned: {reason}"),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        s if s >= 86_400 && s % 86_400 == 0 => format!("{} day(s)", s / 86_400),
        s if s >= 3_600 && s % 3_600 == 0 => format!("{} hour(s)", s / 3_600),
        s if s >= 60 => format!("{} minute(s)", s / 60),
        s => format!("{} second(s)", s),
    }
}

/// Channel notice for a decision, or `None` when there is nothing to say.
pub fn render_notice(decision: &Decision, mention: &str) -> Option<String> {
    let mut lines = Vec::new();

    for reason in &decision.reasons {
        match reason {
            DecisionReason::Spam { messages_in_window } => lines.push(format!(
                "🚫 {mention} **Slow down!** {messages_in_window} messages in a short time."
            )),
            DecisionReason::RaidDetected { joins_in_window } => lines.push(format!(
                "🚨 **Possible raid:** {joins_in_window} members joined in a short time. Raid mode is on until a moderator ends it."
            )),
            DecisionReason::AbusiveContent { category, severity } => {
                let count = decision
                    .warning_count
                    .map(|c| format!(" (warning #{c})"))
                    .unwrap_or_default();
                lines.push(format!(
                    "⚠️ {mention} your message was removed for **{category}** ({severity}){count}."
                ));
            }
            DecisionReason::ActorMuted { .. } | DecisionReason::ManualWarning { .. } => {}
        }
    }

    if let Some(duration) = decision.mute {
        lines.push(format!(
            "🔇 {mention} has been timed out for {}.",
            format_duration(duration)
        ));
    }

    join_lines(lines)
}

/// Private message for the warned actor.
pub fn render_warning(decision: &Decision) -> Option<String> {
    let mut lines = Vec::new();

    for reason in &decision.reasons {
        match reason {
            DecisionReason::AbusiveContent { category, severity } => lines.push(format!(
                "⚠️ Your message was removed for **{category}** ({severity})."
            )),
            DecisionReason::ManualWarning { reason, severity } => lines.push(format!(
                "⚠️ You have been warned by a moderator ({severity}): {reason}"
            )),
            _ => {}
        }
    }
    if lines.is_empty() {
        return None;
    }

    if let Some(count) = decision.warning_count {
        lines.push(format!("You now have **{count}** warning(s)."));
    }
    if let Some(duration) = decision.mute {
        lines.push(format!("🔇 You have been timed out for {}.", format_duration(duration)));
    }

    join_lines(lines)
}

/// Moderator log entry. Routine deletions while muted are not logged.
pub fn render_log_entry(
    decision: &Decision,
    target: &EnforcementTarget,
    mention: &str,
) -> Option<String> {
    let mut lines = Vec::new();

    for reason in &decision.reasons {
        match reason {
            DecisionReason::Spam { messages_in_window } => {
                lines.push(format!("Spam: {messages_in_window} messages in window"))
            }
            DecisionReason::RaidDetected { joins_in_window } => {
                lines.push(format!("Raid mode on: {joins_in_window} joins in window"))
            }
            DecisionReason::AbusiveContent { category, severity } => {
                lines.push(format!("Abusive content: {category} ({severity})"))
            }
            DecisionReason::ManualWarning { reason, severity } => {
                lines.push(format!("Manual warning ({severity}): {reason}"))
            }
            DecisionReason::ActorMuted { .. } => {}
        }
    }
    if lines.is_empty() {
        return None;
    }

    let mut header = format!("🛡️ **Moderation action** · {mention}");
    if let Some(channel_id) = &target.channel_id {
        header.push_str(&format!(" in <#{channel_id}>"));
    }
    lines.insert(0, header);

    if let Some(count) = decision.warning_count {
        lines.push(format!("Warnings: {count}"));
    }
    if decision.delete_content && target.content_id.is_some() {
        lines.push("Message deleted".to_string());
    }
    if let Some(duration) = decision.mute {
        lines.push(format!("Timed out for {}", format_duration(duration)));
    }

    join_lines(lines)
}

fn join_lines(lines: Vec<String>) -> Option<String> {
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
