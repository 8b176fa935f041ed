//! In-memory stand-in for Discord used by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::upstream::{InviteSource, UpstreamInvite};
use crate::data::{InviteLedger, MemberLedger};
use crate::error::UserError;
use crate::serenity::{GuildId, UserId};
use crate::BotError;

pub fn guild() -> GuildId {
    GuildId::new(100)
}

#[derive(Debug, Default)]
pub struct FakeDiscord {
    invites: Mutex<HashMap<GuildId, Vec<UpstreamInvite>>>,
    users: HashMap<UserId, String>,
    /// Make every invite fetch fail.
    offline: bool,
}

impl FakeDiscord {
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Default::default()
        }
    }

    pub fn with_user(mut self, id: u64, name: &str) -> Self {
        self.users.insert(UserId::new(id), name.to_string());
        self
    }

    /// Replace the guild's live invites with `(code, uses)` pairs created by user 1.
    pub fn set_invites(&self, guild: GuildId, invites: &[(&str, u64)]) {
        let invites = invites
            .iter()
            .map(|(code, uses)| UpstreamInvite {
                code: code.to_string(),
                uses: *uses,
                inviter: Some(UserId::new(1)),
                created_at: Some(Utc::now()),
            })
            .collect();
        self.invites.lock().unwrap().insert(guild, invites);
    }

    pub fn invites(&self, guild: GuildId) -> Vec<UpstreamInvite> {
        self.invites
            .lock()
            .unwrap()
            .get(&guild)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl InviteSource for FakeDiscord {
    async fn guild_invites(&self, guild: GuildId) -> Result<Vec<UpstreamInvite>, BotError> {
        if self.offline {
            return Err(UserError::GuildOnly.into());
        }
        Ok(self.invites(guild))
    }

    async fn user_name(&self, user: UserId) -> Result<String, BotError> {
        self.users.get(&user).cloned().ok_or_else(|| {
            UserError::BadArgs {
                input: Some(user.to_string()),
            }
            .into()
        })
    }
}

/// Fresh ledgers in a temporary directory. Keep the directory alive for the test's duration.
pub fn ledgers() -> (tempfile::TempDir, InviteLedger, MemberLedger) {
    let dir = tempfile::tempdir().unwrap();
    let invites = InviteLedger::new(dir.path().join("invites.json"));
    let members = MemberLedger::new(dir.path().join("members.json"));
    (dir, invites, members)
}
