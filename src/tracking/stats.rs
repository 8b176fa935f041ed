//! Aggregated views over the ledgers.
//!
//! Invites are grouped by who they're attributed to: custom labels stay distinct, while every
//! invite a creator made lands in one group.

use futures::future::join_all;
use itertools::Itertools;

use super::labels::{self, SourceName};
use super::upstream::InviteSource;
use crate::data::{Entries, InviteRecord, JoinSource};
use crate::serenity::{GuildId, UserId};

/// Who a group of invites is attributed to, before names are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identity {
    Custom(String),
    Creator(UserId),
    Unknown,
}

impl Identity {
    pub fn of(record: &InviteRecord) -> Self {
        if record.is_custom_label {
            return Identity::Custom(record.source_label.clone());
        }
        record.creator().map_or(Identity::Unknown, Identity::Creator)
    }

    pub async fn resolve(&self, source: &impl InviteSource) -> SourceName {
        match self {
            Identity::Custom(label) => SourceName::Custom(label.clone()),
            Identity::Creator(id) => labels::resolve_user(*id, source).await,
            Identity::Unknown => SourceName::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteGroup {
    pub identity: Identity,
    pub total_uses: u64,
    pub invites: usize,
    /// Invites that aren't archived.
    pub active: usize,
}

/// Group the invites of `guild`, most used first.
pub fn group_invites(guild: GuildId, entries: &Entries<InviteRecord>) -> Vec<InviteGroup> {
    entries
        .values()
        .filter(|record| record.belongs_to(guild))
        .into_group_map_by(|record| Identity::of(record))
        .into_iter()
        .map(|(identity, records)| InviteGroup {
            identity,
            total_uses: records.iter().map(|r| r.use_count).sum(),
            invites: records.len(),
            active: records.iter().filter(|r| !r.archived).count(),
        })
        .sorted_by(|a, b| {
            b.total_uses
                .cmp(&a.total_uses)
                .then_with(|| a.identity.cmp(&b.identity))
        })
        .collect()
}

/// Member counts per join source.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemberStats {
    /// Members that joined through a tracked invite, grouped like [group_invites], largest first.
    pub by_identity: Vec<(Identity, usize)>,
    /// Joined through an invite that's no longer in the ledger.
    pub forgotten: usize,
    pub unknown: usize,
    pub untracked: usize,
    pub pre_existing: usize,
}

impl MemberStats {
    pub fn total(&self) -> usize {
        self.by_identity.iter().map(|(_, n)| n).sum::<usize>()
            + self.forgotten
            + self.unknown
            + self.untracked
            + self.pre_existing
    }
}

/// Count members by how they joined. Members that joined through another guild's invite are
/// skipped. Sentinel sources carry no guild and are always counted.
pub fn member_stats(
    guild: GuildId,
    members: &Entries<JoinSource>,
    invites: &Entries<InviteRecord>,
) -> MemberStats {
    let mut stats = MemberStats::default();
    let mut identities = Vec::new();

    for source in members.values() {
        match source {
            JoinSource::Invite(code) => match invites.get(code) {
                Some(record) if record.belongs_to(guild) => identities.push(Identity::of(record)),
                Some(_) => {}
                None => stats.forgotten += 1,
            },
            JoinSource::Unknown => stats.unknown += 1,
            JoinSource::Untracked => stats.untracked += 1,
            JoinSource::PreExisting => stats.pre_existing += 1,
        }
    }

    stats.by_identity = identities
        .into_iter()
        .counts()
        .into_iter()
        .sorted_by(|(a, a_count), (b, b_count)| b_count.cmp(a_count).then_with(|| a.cmp(b)))
        .collect();
    stats
}

/// Resolve every identity's display name concurrently, keeping order.
pub async fn resolve_all<'a, T: 'a>(
    items: impl IntoIterator<Item = (&'a Identity, T)>,
    source: &impl InviteSource,
) -> Vec<(SourceName, T)> {
    let lookups = items.into_iter().map(|(identity, item)| async move {
        let name = identity.resolve(source).await;
        (name, item)
    });
    join_all(lookups).await
}
