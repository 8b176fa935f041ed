//! Working out which invite a new member used.
//!
//! Discord doesn't say which invite a member joined through. Instead, the cached snapshot of
//! invite use counts is compared with a fresh fetch; the invite whose count went up is the one
//! that was used. When several invites went up between two joins, the first one in Discord's
//! order wins. There is no tie-break for that case.

use tracing::instrument;

use super::labels::{self, SourceName};
use super::snapshot::{GuildSnapshot, SnapshotCache};
use super::upstream::{InviteSource, UpstreamInvite};
use crate::data::{InviteRecord, JoinSource, Repository};
use crate::serenity::{GuildId, UserId};

/// The verdict on a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub source: JoinSource,
    /// Resolved name of the invite's source, when the invite is tracked.
    pub name: Option<SourceName>,
}

impl Attribution {
    fn unknown() -> Self {
        Self {
            source: JoinSource::Unknown,
            name: None,
        }
    }

    /// Completes "They joined through ...".
    pub fn join_phrase(&self) -> String {
        match &self.name {
            Some(name) => name.join_phrase(),
            None => self.source.to_string(),
        }
    }
}

/// The first invite (in `fresh` order) used more often than the snapshot remembers.
/// Invites missing from the snapshot are never picked.
pub fn find_consumed<'a>(
    cached: &GuildSnapshot,
    fresh: &'a [UpstreamInvite],
) -> Option<&'a UpstreamInvite> {
    fresh.iter().find(|invite| {
        cached
            .get(&invite.code)
            .is_some_and(|old| invite.uses > old.uses)
    })
}

/// Attribute a member join to an invite, record it, and refresh the snapshot.
///
/// This never fails. A failed fetch attributes the join to [JoinSource::Unknown]; failed
/// ledger writes are logged and the verdict is still returned so the member gets welcomed.
#[instrument(skip(source, snapshots, invites, members))]
pub async fn reconcile_join(
    guild: GuildId,
    member: UserId,
    source: &impl InviteSource,
    snapshots: &SnapshotCache,
    invites: &impl Repository<InviteRecord>,
    members: &impl Repository<JoinSource>,
) -> Attribution {
    let fresh = match source.guild_invites(guild).await {
        Ok(fresh) => fresh,
        Err(e) => {
            tracing::warn!("Couldn't fetch invites, can't attribute join: {e}");
            let attribution = Attribution::unknown();
            record_member(members, member, &attribution.source).await;
            return attribution;
        }
    };

    let cached = snapshots.snapshot(guild).await;
    let attribution = match find_consumed(&cached, &fresh) {
        None => {
            tracing::info!("Couldn't determine which invite was used.");
            Attribution::unknown()
        }
        Some(used) => {
            let old_uses = cached.get(&used.code).map_or(0, |e| e.uses);
            tracing::info!(
                "Detected invite {} used ({old_uses} -> {}).",
                used.code,
                used.uses
            );
            attribute_to(used, source, invites).await
        }
    };

    record_member(members, member, &attribution.source).await;
    snapshots.initialize(guild, &fresh).await;
    attribution
}

/// Update the used invite's count and resolve its name.
async fn attribute_to(
    used: &UpstreamInvite,
    source: &impl InviteSource,
    invites: &impl Repository<InviteRecord>,
) -> Attribution {
    let updated = invites
        .modify(|entries| {
            entries.get_mut(&used.code).map(|record| {
                record.use_count = used.uses;
                record.clone()
            })
        })
        .await;

    match updated {
        Ok(Some(record)) => Attribution {
            source: JoinSource::Invite(used.code.clone()),
            name: Some(labels::resolve(&record, source).await),
        },
        Ok(None) => {
            tracing::warn!("Invite {} isn't in the ledger.", used.code);
            Attribution {
                source: JoinSource::Untracked,
                name: None,
            }
        }
        Err(e) => {
            tracing::error!("Couldn't update uses of invite {}: {e}", used.code);
            Attribution {
                source: JoinSource::Invite(used.code.clone()),
                name: None,
            }
        }
    }
}

async fn record_member(members: &impl Repository<JoinSource>, member: UserId, source: &JoinSource) {
    if let Err(e) = members.upsert(&member.to_string(), source.clone()).await {
        tracing::error!("Couldn't record how {member} joined: {e}");
    }
}

/// Forget a member that left. Returns a phrase describing how they had joined.
#[instrument(skip(source, invites, members))]
pub async fn reconcile_leave(
    member: UserId,
    source: &impl InviteSource,
    invites: &impl Repository<InviteRecord>,
    members: &impl Repository<JoinSource>,
) -> String {
    let joined = match members.delete(&member.to_string()).await {
        Ok(joined) => joined,
        Err(e) => {
            tracing::error!("Couldn't remove {member} from the member ledger: {e}");
            None
        }
    };

    let joined = joined.unwrap_or(JoinSource::Unknown);
    if let JoinSource::Invite(code) = &joined {
        if let Ok(Some(record)) = invites.get(code).await {
            return labels::resolve(&record, source).await.join_phrase();
        }
    }
    joined.to_string()
}

/// Record members that were already in the guild as [JoinSource::PreExisting].
/// Members that already have a record are left alone. Returns how many were added.
pub async fn backfill_members(
    existing: impl IntoIterator<Item = UserId>,
    members: &impl Repository<JoinSource>,
) -> Result<usize, crate::BotError> {
    let existing: Vec<String> = existing.into_iter().map(|id| id.to_string()).collect();
    let added = members
        .modify(move |entries| {
            let mut added = 0;
            for id in existing {
                entries.entry(id).or_insert_with(|| {
                    added += 1;
                    JoinSource::PreExisting
                });
            }
            added
        })
        .await?;
    Ok(added)
}
