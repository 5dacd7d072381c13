// Moderation admin slash commands.

use crate::core::moderation::{
    format_duration, EnforcementExecutor, EnforcementTarget, ScopeId, ScopedKey, Severity,
};
use crate::discord::moderation::executor::DiscordExecutor;
use crate::discord::{Data, Error};
use crate::infra::moderation::config_file::reload_from_file;
use crate::infra::moderation::update_scope_overrides;
use poise::serenity_prelude as serenity;

type Context<'a> = poise::Context<'a, Data, Error>;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum WarnSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl From<WarnSeverity> for Severity {
    fn from(value: WarnSeverity) -> Self {
        match value {
            WarnSeverity::Low => Severity::Low,
            WarnSeverity::Medium => Severity::Medium,
            WarnSeverity::High => Severity::High,
            WarnSeverity::Critical => Severity::Critical,
        }
    }
}

fn scope_of(ctx: &Context<'_>) -> Result<ScopeId, Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;
    Ok(ScopeId::from(guild_id.get()))
}

fn key_for(ctx: &Context<'_>, user: &serenity::User) -> Result<ScopedKey, Error> {
    Ok(ScopedKey::new(scope_of(ctx)?, user.id.get()))
}

fn severity_color(severity: Severity) -> u32 {
    match severity {
        Severity::Low => 0x95A5A6,
        Severity::Medium => 0xF1C40F,
        Severity::High => 0xE67E22,
        Severity::Critical => 0xE74C3C,
    }
}

/// Moderation tools: warnings, mutes, raid mode and config.
#[poise::command(
    slash_command,
    subcommands(
        "warnings",
        "history",
        "warn",
        "removewarning",
        "clearwarnings",
        "unmute",
        "raidstatus",
        "endraid",
        "scan",
        "stats",
        "automod",
        "setlog",
        "reload"
    ),
    required_permissions = "MODERATE_MEMBERS",
    guild_only
)]
pub async fn moderation(_ctx: Context<'_>) -> Result<(), Error> {
    // Parent command - shows help
    Ok(())
}

/// Show a member's warnings and mute status.
#[poise::command(slash_command, guild_only)]
pub async fn warnings(
    ctx: Context<'_>,
    #[description = "Member to look up"] user: serenity::User,
    #[description = "How many recent warnings to show (default: 10)"] limit: Option<u32>,
) -> Result<(), Error> {
    let key = key_for(&ctx, &user)?;
    let engine = &ctx.data().moderation;
    let now = chrono::Utc::now();

    let total = engine.warning_count(&key);
    let recent = engine.warnings(&key, Some(limit.unwrap_or(10).clamp(1, 25) as usize));

    let mut embed = serenity::CreateEmbed::new()
        .title(format!("⚠️ Warnings for {}", user.name))
        .color(0xF1C40F)
        .field("Total", total.to_string(), true);

    if let Some(mute) = engine.mute_status(&key, now) {
        let remaining = mute
            .remaining(now)
            .map(format_duration)
            .unwrap_or_else(|| "expired".to_string());
        embed = embed.field("🔇 Muted", format!("{} left: {}", remaining, mute.reason), true);
    }

    if recent.is_empty() {
        embed = embed.description("No warnings on record.");
    }
    for warning in recent.iter().rev() {
        embed = embed.field(
            format!("#{} · {}", warning.sequence_id, warning.severity),
            format!(
                "{}\n<t:{}:R>",
                warning.reason,
                warning.created_at.timestamp()
            ),
            false,
        );
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Issue a manual warning.
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "Member to warn"] user: serenity::User,
    #[description = "Why they are being warned"] reason: String,
    #[description = "Severity (default: Medium)"] severity: Option<WarnSeverity>,
) -> Result<(), Error> {
    let key = key_for(&ctx, &user)?;
    let now = chrono::Utc::now();
    let severity: Severity = severity.unwrap_or(WarnSeverity::Medium).into();

    let engine = &ctx.data().moderation;
    let (outcome, decision) = engine.warn_manually(&key, &reason, severity, now);

    let target = EnforcementTarget {
        log_channel_id: engine.log_channel(&key.scope),
        key,
        content_id: None,
        channel_id: Some(ctx.channel_id().get().to_string()),
    };
    let executor = DiscordExecutor::new(ctx.serenity_context().http.clone());
    let report = engine
        .enforce(&executor, &target, &decision, &format!("<@{}>", user.id))
        .await;

    let mut reply = format!(
        "⚠️ <@{}> warned ({}): {}\nThey now have **{}** warning(s).",
        user.id, severity, reason, outcome.warning_count
    );
    if report.warn.is_failed() {
        reply.push_str("\n📭 Could not DM them; they may have DMs turned off.");
    }
    if let Some(duration) = decision.mute {
        if report.mute.is_failed() {
            reply.push_str("\n❌ Escalation mute could not be applied; check my permissions.");
        } else {
            reply.push_str(&format!(
                "\n🔇 Timed out for {}.",
                format_duration(duration)
            ));
        }
    }

    ctx.say(reply).await?;
    Ok(())
}

/// Show the flagged messages recorded for a member.
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn history(
    ctx: Context<'_>,
    #[description = "Member to look up"] user: serenity::User,
    #[description = "How many cases to show (default: 5)"] limit: Option<u32>,
) -> Result<(), Error> {
    let key = key_for(&ctx, &user)?;
    let records = ctx
        .data()
        .store
        .evidence_for_actor(&key, limit.unwrap_or(5).clamp(1, 10))
        .await?;

    if records.is_empty() {
        let embed = serenity::CreateEmbed::new()
            .title("📋 Clean record")
            .description(format!("<@{}> has no flagged messages on file.", user.id))
            .color(0x2ECC71);
        ctx.send(poise::CreateReply::default().embed(embed)).await?;
        return Ok(());
    }

    let mut embed = serenity::CreateEmbed::new()
        .title(format!("📋 History for {}", user.name))
        .description(format!("{} most recent case(s)", records.len()))
        .color(severity_color(
            records
                .iter()
                .map(|r| r.verdict.severity)
                .max()
                .unwrap_or(Severity::Low),
        ));

    for (i, record) in records.iter().enumerate() {
        let excerpt: String = record.text.chars().take(100).collect();
        embed = embed.field(
            format!(
                "Case #{} · {} · {}",
                i + 1,
                record.verdict.severity,
                record.verdict.category
            ),
            format!(
                "{}\nScore {:.2} · <t:{}:d>",
                excerpt,
                record.verdict.score,
                record.occurred_at.timestamp()
            ),
            false,
        );
    }

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Remove a single warning by its number.
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn removewarning(
    ctx: Context<'_>,
    #[description = "Member the warning belongs to"] user: serenity::User,
    #[description = "Warning number (see /moderation warnings)"] warning_id: u64,
) -> Result<(), Error> {
    let key = key_for(&ctx, &user)?;

    match ctx.data().moderation.remove_warning(&key, warning_id) {
        Ok(remaining) => {
            ctx.say(format!(
                "✅ Removed warning #{} from <@{}>. {} warning(s) left.",
                warning_id, user.id, remaining
            ))
            .await?;
        }
        Err(e) => {
            ctx.say(format!("❌ {}", e)).await?;
        }
    }
    Ok(())
}

/// Clear every warning for a member.
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn clearwarnings(
    ctx: Context<'_>,
    #[description = "Member to clear warnings for"] user: serenity::User,
) -> Result<(), Error> {
    let key = key_for(&ctx, &user)?;
    let removed = ctx.data().moderation.clear_warnings(&key);

    ctx.say(format!(
        "✅ Cleared {} warning(s) for <@{}>.",
        removed, user.id
    ))
    .await?;
    Ok(())
}

/// End a member's mute early and lift their timeout.
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn unmute(
    ctx: Context<'_>,
    #[description = "Member to unmute"] user: serenity::User,
) -> Result<(), Error> {
    let key = key_for(&ctx, &user)?;
    let ended = ctx.data().moderation.end_mute(&key, chrono::Utc::now());

    // The platform timeout may outlive the ledger record, so always lift it.
    let executor = DiscordExecutor::new(ctx.serenity_context().http.clone());
    if let Err(e) = executor.lift_mute(&key).await {
        tracing::warn!(user_id = %key.actor, "Failed to lift timeout: {}", e);
        ctx.say(format!("❌ Could not lift the timeout for <@{}>: {}", user.id, e))
            .await?;
        return Ok(());
    }

    let message = match ended {
        Some(_) => format!("🔊 <@{}> has been unmuted.", user.id),
        None => format!("🔊 <@{}> had no active mute; timeout cleared anyway.", user.id),
    };
    ctx.say(message).await?;
    Ok(())
}

/// Show whether raid mode is on.
#[poise::command(slash_command, guild_only)]
pub async fn raidstatus(ctx: Context<'_>) -> Result<(), Error> {
    let scope = scope_of(&ctx)?;
    let engine = &ctx.data().moderation;
    let limits = engine.config().settings().limits_for(&scope);

    let status = match engine.raid_started_at(&scope) {
        Some(started) => format!("🚨 **Active** since <t:{}:R>", started.timestamp()),
        None => "✅ Inactive".to_string(),
    };

    let embed = serenity::CreateEmbed::new()
        .title("🛡️ Raid Protection")
        .color(if engine.raid_active(&scope) { 0xE74C3C } else { 0x2ECC71 })
        .field("Raid mode", status, false)
        .field(
            "Anti-raid",
            if limits.anti_raid { "Enabled" } else { "Disabled" },
            true,
        )
        .field(
            "Threshold",
            format!(
                "{} joins / {} seconds",
                limits.raid.max_events, limits.raid.window_secs
            ),
            true,
        );

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Turn raid mode off.
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn endraid(ctx: Context<'_>) -> Result<(), Error> {
    let scope = scope_of(&ctx)?;

    if ctx.data().moderation.clear_raid(&scope) {
        ctx.say("✅ Raid mode has been **ended**.").await?;
    } else {
        ctx.say("ℹ️ Raid mode was not active.").await?;
    }
    Ok(())
}

/// Preview how a piece of text would be classified. Nothing is recorded.
#[poise::command(slash_command, guild_only, required_permissions = "MODERATE_MEMBERS")]
pub async fn scan(
    ctx: Context<'_>,
    #[description = "Text to classify"] text: String,
) -> Result<(), Error> {
    let verdict = ctx.data().moderation.scan(&text);

    let terms = if verdict.matched_terms.is_empty() {
        "none".to_string()
    } else {
        verdict.matched_terms.join(", ")
    };
    let sentiment = verdict
        .sentiment
        .iter()
        .map(|(name, value)| format!("{}: {:.2}", name, value))
        .collect::<Vec<_>>()
        .join("\n");

    let embed = serenity::CreateEmbed::new()
        .title(if verdict.is_flagged {
            "🚩 Would be flagged"
        } else {
            "✅ Clean"
        })
        .color(if verdict.is_flagged {
            severity_color(verdict.severity)
        } else {
            0x2ECC71
        })
        .field("Category", verdict.category.to_string(), true)
        .field("Severity", verdict.severity.to_string(), true)
        .field("Score", format!("{:.2}", verdict.score), true)
        .field("Language", verdict.language.clone(), true)
        .field(
            format!("Matched terms ({})", verdict.term_count),
            terms,
            false,
        )
        .field(
            "Sentiment",
            if sentiment.is_empty() {
                "n/a".to_string()
            } else {
                sentiment
            },
            false,
        );

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Warning and mute statistics for this server.
#[poise::command(slash_command, guild_only)]
pub async fn stats(ctx: Context<'_>) -> Result<(), Error> {
    let scope = scope_of(&ctx)?;
    let engine = &ctx.data().moderation;
    let stats = engine.statistics(Some(&scope), chrono::Utc::now());
    let health = engine.persistence_health();

    let breakdown = if stats.severity_breakdown.is_empty() {
        "none".to_string()
    } else {
        stats
            .severity_breakdown
            .iter()
            .map(|(severity, count)| format!("{}: {}", severity, count))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let embed = serenity::CreateEmbed::new()
        .title("📊 Moderation Stats")
        .color(0x3498DB)
        .field("Members warned", stats.users_warned.to_string(), true)
        .field("Total warnings", stats.total_warnings.to_string(), true)
        .field("Active mutes", stats.active_mutes.to_string(), true)
        .field("By severity", breakdown, false)
        .field(
            "Storage",
            format!(
                "{} {} written · {} failed · {} dropped",
                if health.degraded { "⚠️ Degraded" } else { "✅ Healthy" },
                health.applied,
                health.failed,
                health.dropped
            ),
            false,
        );

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Switch automatic enforcement on or off for this server.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn automod(
    ctx: Context<'_>,
    #[description = "Delete, warn and mute automatically"] enabled: bool,
) -> Result<(), Error> {
    let scope = scope_of(&ctx)?;
    let data = ctx.data();

    match update_scope_overrides(&data.moderation, &data.config_path, &scope, |o| {
        o.auto_moderate = Some(enabled)
    }) {
        Ok(()) if enabled => {
            ctx.say("✅ Auto-moderation is **on**.").await?;
        }
        Ok(()) => {
            ctx.say("⏸️ Auto-moderation is **off**. Flagged messages are still recorded.")
                .await?;
        }
        Err(e) => {
            ctx.say(format!("❌ Could not save the setting: {:#}", e))
                .await?;
        }
    }
    Ok(())
}

/// Set the channel that receives moderation logs.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn setlog(
    ctx: Context<'_>,
    #[description = "Log channel (leave empty to turn logging off)"] channel: Option<
        serenity::Channel,
    >,
) -> Result<(), Error> {
    let scope = scope_of(&ctx)?;
    let data = ctx.data();
    let channel_id = channel.as_ref().map(|c| c.id().get().to_string());

    match update_scope_overrides(&data.moderation, &data.config_path, &scope, |o| {
        o.log_channel_id = channel_id
    }) {
        Ok(()) => match channel {
            Some(channel) => {
                ctx.say(format!("✅ Moderation logs will go to <#{}>.", channel.id()))
                    .await?;
            }
            None => {
                ctx.say("✅ Moderation logging turned off.").await?;
            }
        },
        Err(e) => {
            ctx.say(format!("❌ Could not save the setting: {:#}", e))
                .await?;
        }
    }
    Ok(())
}

/// Reload the moderation config file now. Bot owners only, since the file
/// covers every server.
#[poise::command(slash_command, owners_only)]
pub async fn reload(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();

    match reload_from_file(&data.moderation, &data.config_path) {
        Ok(()) => {
            ctx.say("✅ Moderation config reloaded.").await?;
        }
        Err(e) => {
            ctx.say(format!(
                "❌ Config rejected, keeping the previous one: {:#}",
                e
            ))
            .await?;
        }
    }
    Ok(())
}
