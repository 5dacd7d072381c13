// Gateway events -> engine events -> enforcement.

use crate::core::moderation::{EnforcementTarget, EventKind, RawEvent, ScopeId, ScopedKey};
use crate::discord::moderation::executor::DiscordExecutor;
use crate::discord::{Data, Error};
use poise::serenity_prelude as serenity;

/// Run a guild message through the moderation engine and carry out the decision.
pub async fn handle_message(
    ctx: &serenity::Context,
    data: &Data,
    msg: &serenity::Message,
) -> Result<(), Error> {
    // Bots and webhooks never get moderated
    if msg.author.bot || msg.webhook_id.is_some() {
        return Ok(());
    }

    let guild_id = match msg.guild_id {
        Some(id) => id,
        None => return Ok(()),
    };

    let outcome = data
        .moderation
        .ingest(RawEvent {
            actor_id: msg.author.id.get().to_string(),
            scope_id: guild_id.get().to_string(),
            text: Some(msg.content.clone()),
            kind: EventKind::Message,
            occurred_at: chrono::DateTime::from_timestamp(msg.timestamp.unix_timestamp(), 0)
                .unwrap_or_else(chrono::Utc::now),
        })
        .map_err(|e| Error::from(e.to_string()))?;

    if outcome.decision.is_noop() {
        return Ok(());
    }

    let scope = ScopeId::from(guild_id.get());
    let target = EnforcementTarget {
        key: ScopedKey::new(scope.clone(), msg.author.id.get()),
        content_id: Some(msg.id.get().to_string()),
        channel_id: Some(msg.channel_id.get().to_string()),
        log_channel_id: data.moderation.log_channel(&scope),
    };

    let executor = DiscordExecutor::new(ctx.http.clone());
    data.moderation
        .enforce(
            &executor,
            &target,
            &outcome.decision,
            &format!("<@{}>", msg.author.id),
        )
        .await;

    Ok(())
}

/// Feed a join into raid detection and re-apply any mute the member still owes.
pub async fn handle_member_join(
    ctx: &serenity::Context,
    data: &Data,
    member: &serenity::Member,
) -> Result<(), Error> {
    if member.user.bot {
        return Ok(());
    }

    let scope = ScopeId::from(member.guild_id.get());
    let outcome = data
        .moderation
        .ingest(RawEvent {
            actor_id: member.user.id.get().to_string(),
            scope_id: scope.to_string(),
            text: None,
            kind: EventKind::Join,
            occurred_at: chrono::Utc::now(),
        })
        .map_err(|e| Error::from(e.to_string()))?;

    if outcome.decision.is_noop() {
        return Ok(());
    }

    // Raid notices go to the configured alert channel, falling back to the
    // guild's system channel.
    let channel_id = data.moderation.alert_channel(&scope).or_else(|| {
        ctx.cache
            .guild(member.guild_id)
            .and_then(|g| g.system_channel_id)
            .map(|id| id.get().to_string())
    });

    let target = EnforcementTarget {
        key: ScopedKey::new(scope.clone(), member.user.id.get()),
        content_id: None,
        channel_id,
        log_channel_id: data.moderation.log_channel(&scope),
    };

    let executor = DiscordExecutor::new(ctx.http.clone());
    data.moderation
        .enforce(
            &executor,
            &target,
            &outcome.decision,
            &format!("<@{}>", member.user.id),
        )
        .await;

    Ok(())
}
