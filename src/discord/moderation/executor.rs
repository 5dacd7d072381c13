// Discord side of enforcement: turns decision steps into serenity HTTP calls.

use crate::core::moderation::{EnforcementError, EnforcementExecutor, EnforcementTarget, ScopedKey};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;

/// Discord refuses communication timeouts longer than 28 days.
const MAX_TIMEOUT: Duration = Duration::from_secs(28 * 24 * 60 * 60);

pub struct DiscordExecutor {
    http: Arc<serenity::Http>,
}

impl DiscordExecutor {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

fn parse_id(kind: &str, raw: &str) -> Result<u64, EnforcementError> {
    raw.parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .ok_or_else(|| EnforcementError::NotFound(format!("{kind} `{raw}`")))
}

fn member_ids(key: &ScopedKey) -> Result<(serenity::GuildId, serenity::UserId), EnforcementError> {
    let guild_id = serenity::GuildId::new(parse_id("guild", key.scope.as_str())?);
    let user_id = serenity::UserId::new(parse_id("user", key.actor.as_str())?);
    Ok((guild_id, user_id))
}

fn platform_error(e: serenity::Error) -> EnforcementError {
    let status = match &e {
        serenity::Error::Http(http) => http.status_code().map(|s| s.as_u16()),
        _ => None,
    };
    match status {
        Some(403) => EnforcementError::MissingPermission(e.to_string()),
        Some(404) => EnforcementError::NotFound(e.to_string()),
        _ => EnforcementError::Platform(e.to_string()),
    }
}

fn required<'a>(value: &'a Option<String>, kind: &str) -> Result<&'a str, EnforcementError> {
    value
        .as_deref()
        .ok_or_else(|| EnforcementError::NotFound(format!("no {kind} on target")))
}

#[async_trait]
impl EnforcementExecutor for DiscordExecutor {
    async fn delete_content(&self, target: &EnforcementTarget) -> Result<(), EnforcementError> {
        let channel_id =
            serenity::ChannelId::new(parse_id("channel", required(&target.channel_id, "channel")?)?);
        let message_id =
            serenity::MessageId::new(parse_id("message", required(&target.content_id, "message")?)?);

        channel_id
            .delete_message(&self.http, message_id)
            .await
            .map_err(platform_error)
    }

    async fn warn_user(
        &self,
        target: &EnforcementTarget,
        message: &str,
    ) -> Result<(), EnforcementError> {
        let (_, user_id) = member_ids(&target.key)?;

        // Fails with 403 when the member has DMs from server members turned off.
        let dm = user_id
            .create_dm_channel(&self.http)
            .await
            .map_err(platform_error)?;
        dm.id
            .say(&self.http, message)
            .await
            .map_err(platform_error)?;
        Ok(())
    }

    async fn apply_mute(
        &self,
        target: &EnforcementTarget,
        duration: Duration,
        reason: &str,
    ) -> Result<(), EnforcementError> {
        let (guild_id, user_id) = member_ids(&target.key)?;
        let duration = duration.min(MAX_TIMEOUT);

        let timeout_until = serenity::Timestamp::from_unix_timestamp(
            chrono::Utc::now().timestamp() + duration.as_secs() as i64,
        )
        .map_err(|e| EnforcementError::Platform(format!("bad timeout timestamp: {e}")))?;

        guild_id
            .edit_member(
                &self.http,
                user_id,
                serenity::EditMember::new()
                    .disable_communication_until_datetime(timeout_until)
                    .audit_log_reason(reason),
            )
            .await
            .map_err(platform_error)?;
        Ok(())
    }

    async fn lift_mute(&self, key: &ScopedKey) -> Result<(), EnforcementError> {
        let (guild_id, user_id) = member_ids(key)?;

        guild_id
            .edit_member(
                &self.http,
                user_id,
                serenity::EditMember::new().enable_communication(),
            )
            .await
            .map_err(platform_error)?;
        Ok(())
    }

    async fn notify(&self, channel_id: &str, notice: &str) -> Result<(), EnforcementError> {
        let channel_id = serenity::ChannelId::new(parse_id("channel", channel_id)?);

        channel_id
            .say(&self.http, notice)
            .await
            .map_err(platform_error)?;
        Ok(())
    }
}
