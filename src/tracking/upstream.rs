//! The authoritative invite list, as Discord reports it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::serenity;
use crate::serenity::{GuildId, UserId};
use crate::BotError;

/// An invite as fetched from Discord.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamInvite {
    pub code: String,
    pub uses: u64,
    pub inviter: Option<UserId>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&serenity::RichInvite> for UpstreamInvite {
    fn from(invite: &serenity::RichInvite) -> Self {
        Self {
            code: invite.code.clone(),
            uses: u64::from(invite.uses),
            inviter: invite.inviter.as_ref().map(|u| u.id),
            created_at: timestamp(&invite.created_at),
        }
    }
}

impl From<&serenity::InviteCreateEvent> for UpstreamInvite {
    fn from(event: &serenity::InviteCreateEvent) -> Self {
        Self {
            code: event.code.clone(),
            uses: u64::from(event.uses),
            inviter: event.inviter.as_ref().map(|u| u.id),
            created_at: timestamp(&event.created_at),
        }
    }
}

/// Converts a Discord timestamp, dropping sub-second precision.
pub fn timestamp(ts: &serenity::Timestamp) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.unix_timestamp(), 0)
}

/// Something that can list a guild's invites and name users.
#[async_trait]
pub trait InviteSource: Send + Sync {
    /// Every invite currently live in `guild`.
    async fn guild_invites(&self, guild: GuildId) -> Result<Vec<UpstreamInvite>, BotError>;

    /// The user's name, for display.
    async fn user_name(&self, user: UserId) -> Result<String, BotError>;
}

#[async_trait]
impl InviteSource for serenity::Http {
    async fn guild_invites(&self, guild: GuildId) -> Result<Vec<UpstreamInvite>, BotError> {
        let invites = guild.invites(self).await?;
        Ok(invites.iter().map(UpstreamInvite::from).collect())
    }

    async fn user_name(&self, user: UserId) -> Result<String, BotError> {
        let user = user.to_user(self).await?;
        Ok(user.name)
    }
}
