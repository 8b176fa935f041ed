//! Last observed invite use counts per guild.
//!
//! Nothing here is persisted. The cache is rebuilt from Discord on startup and kept current by
//! invite create/delete events and after every member join.

use std::collections::HashMap;
use std::sync::Arc;

use delegate::delegate;
use tokio::sync::Mutex;

use super::upstream::UpstreamInvite;
use crate::serenity::{GuildId, UserId};

/// What we last saw of one invite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub uses: u64,
    pub creator: Option<UserId>,
}

/// Invite code -> [SnapshotEntry] for a single guild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuildSnapshot {
    entries: HashMap<String, SnapshotEntry>,
}

impl GuildSnapshot {
    delegate! {
        to self.entries {
            pub fn get(&self, code: &str) -> Option<&SnapshotEntry>;
            pub fn len(&self) -> usize;
            pub fn is_empty(&self) -> bool;
            pub fn contains_key(&self, code: &str) -> bool;
        }
    }
}

impl FromIterator<(String, SnapshotEntry)> for GuildSnapshot {
    fn from_iter<T: IntoIterator<Item = (String, SnapshotEntry)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl From<&[UpstreamInvite]> for GuildSnapshot {
    fn from(invites: &[UpstreamInvite]) -> Self {
        invites
            .iter()
            .map(|invite| {
                let entry = SnapshotEntry {
                    uses: invite.uses,
                    creator: invite.inviter,
                };
                (invite.code.clone(), entry)
            })
            .collect()
    }
}

/// Per-guild invite snapshots, shared by the event handlers.
/// Internally uses an [Arc], so it's cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct SnapshotCache {
    guilds: Arc<Mutex<HashMap<GuildId, GuildSnapshot>>>,
}

impl SnapshotCache {
    /// Replace everything known about `guild`.
    pub async fn initialize(&self, guild: GuildId, invites: &[UpstreamInvite]) {
        let snapshot = GuildSnapshot::from(invites);
        tracing::debug!("Cached {} invites for guild {guild}.", snapshot.len());
        self.guilds.lock().await.insert(guild, snapshot);
    }

    /// Insert or update one invite.
    pub async fn record_invite(
        &self,
        guild: GuildId,
        code: impl Into<String>,
        uses: u64,
        creator: Option<UserId>,
    ) {
        let mut guilds = self.guilds.lock().await;
        let snapshot = guilds.entry(guild).or_default();
        snapshot
            .entries
            .insert(code.into(), SnapshotEntry { uses, creator });
    }

    /// Drop one invite.
    pub async fn forget(&self, guild: GuildId, code: &str) {
        if let Some(snapshot) = self.guilds.lock().await.get_mut(&guild) {
            snapshot.entries.remove(code);
        }
    }

    /// A copy of the guild's snapshot, empty if the guild was never initialized.
    pub async fn snapshot(&self, guild: GuildId) -> GuildSnapshot {
        self.guilds
            .lock()
            .await
            .get(&guild)
            .cloned()
            .unwrap_or_default()
    }
}
