//! This module contains everything relating to [Data] and the ledgers it holds.

mod records;
mod store;

use std::collections::HashSet;
use std::path::Path;

use serenity::GuildId;
use serenity::UserId;

use crate::error::UserError;
use crate::serenity;
use crate::setup::TrackingConfig;
use crate::tracking::snapshot::SnapshotCache;
use crate::Context;
pub use records::{InviteRecord, JoinSource};
pub use store::{Entries, JsonStore, Repository};

/// Invite code -> [InviteRecord].
pub type InviteLedger = JsonStore<InviteRecord>;

/// Member id -> [JoinSource].
pub type MemberLedger = JsonStore<JoinSource>;

/// The data kept between shards
#[derive(Debug)]
pub struct Data {
    /// List of users to send bug notifications
    pub notify_list: HashSet<UserId>,
    pub invites: InviteLedger,
    pub members: MemberLedger,
    /// Last seen invite use counts, per guild.
    pub snapshots: SnapshotCache,
    pub tracking: TrackingConfig,
}

impl Data {
    /// Opens the ledgers in the configured data directory. Files are created on first access.
    pub fn new(notify_list: HashSet<UserId>, tracking: TrackingConfig) -> Self {
        let dir = Path::new(tracking.data_dir());
        Self {
            notify_list,
            invites: InviteLedger::new(dir.join("invites.json")),
            members: MemberLedger::new(dir.join("members.json")),
            snapshots: SnapshotCache::default(),
            tracking,
        }
    }
}

/// Shortcuts for commands.
pub trait GetData {
    /// The guild this command was used in. Errors outside of guilds.
    fn command_guild(&self) -> Result<GuildId, UserError>;
    /// Discord's HTTP client, the [InviteSource](crate::tracking::upstream::InviteSource) the
    /// tracking engines read from.
    fn invite_source(&self) -> &serenity::Http;
}

impl GetData for Context<'_> {
    fn command_guild(&self) -> Result<GuildId, UserError> {
        self.guild_id().ok_or(UserError::GuildOnly)
    }

    fn invite_source(&self) -> &serenity::Http {
        &self.serenity_context().http
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::upstream::InviteSource;

    fn reads_invites(_: &impl InviteSource) {}

    /// Only needs to compile: commands hand [GetData::invite_source] straight to the engines.
    #[allow(dead_code)]
    fn commands_reach_the_engines(ctx: Context<'_>) {
        reads_invites(ctx.invite_source());
    }

    #[test]
    fn ledgers_live_in_the_data_dir() {
        let data = Data::new(HashSet::new(), TrackingConfig::default());
        assert_eq!(data.invites.path(), Path::new("data/invites.json"));
        assert_eq!(data.members.path(), Path::new("data/members.json"));
    }
}
