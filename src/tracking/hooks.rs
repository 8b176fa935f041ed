//! Keeping the invite ledger and snapshot cache in step with invite create/delete events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::snapshot::SnapshotCache;
use super::upstream::UpstreamInvite;
use crate::data::{Entries, InviteRecord, Repository};
use crate::serenity::GuildId;
use crate::BotError;

/// What happens to a ledger record once its invite is gone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryMode {
    /// Keep the record for historical stats, flagged as archived.
    #[default]
    Archive,
    /// Remove the record outright.
    Delete,
}

impl ExpiryMode {
    /// Expire `code` in `entries`. Returns the record as it was expired, if there was one.
    /// Records that are already archived keep their original expiry.
    pub fn expire(
        self,
        entries: &mut Entries<InviteRecord>,
        code: &str,
        now: DateTime<Utc>,
    ) -> Option<InviteRecord> {
        match self {
            ExpiryMode::Archive => {
                let record = entries.get_mut(code).filter(|r| !r.archived)?;
                record.archive(now);
                Some(record.clone())
            }
            ExpiryMode::Delete => entries.remove(code),
        }
    }
}

/// A new invite was created: start tracking it.
///
/// The ledger starts the invite at zero uses, the snapshot takes whatever Discord reported.
#[instrument(skip_all, fields(guild = %guild, code = %invite.code))]
pub async fn invite_created(
    guild: GuildId,
    invite: &UpstreamInvite,
    snapshots: &SnapshotCache,
    invites: &impl Repository<InviteRecord>,
) -> Result<(), BotError> {
    snapshots
        .record_invite(guild, invite.code.as_str(), invite.uses, invite.inviter)
        .await;

    let created_at = invite.created_at.unwrap_or_else(Utc::now);
    let is_new = invites
        .modify(|entries| match entries.get_mut(&invite.code) {
            Some(existing) => {
                existing.unarchive();
                false
            }
            None => {
                let record = InviteRecord::tracked(Some(guild), invite.inviter, 0, created_at);
                entries.insert(invite.code.clone(), record);
                true
            }
        })
        .await?;

    let creator = invite
        .inviter
        .map_or("Unknown".to_string(), |id| id.to_string());
    if is_new {
        tracing::info!("Tracking new invite {} created by {creator}.", invite.code);
    } else {
        tracing::info!("Invite {} was already tracked.", invite.code);
    }
    Ok(())
}

/// An invite was deleted or expired.
#[instrument(skip(snapshots, invites))]
pub async fn invite_deleted(
    guild: GuildId,
    code: &str,
    mode: ExpiryMode,
    snapshots: &SnapshotCache,
    invites: &impl Repository<InviteRecord>,
) -> Result<Option<InviteRecord>, BotError> {
    snapshots.forget(guild, code).await;

    let now = Utc::now();
    let expired = invites
        .modify(|entries| mode.expire(entries, code, now))
        .await?;

    match (&expired, mode) {
        (Some(record), ExpiryMode::Archive) => tracing::info!(
            "Archived invite {code} ({}, {} uses).",
            record.source_label,
            record.use_count
        ),
        (Some(_), ExpiryMode::Delete) => tracing::info!("Removed invite {code}."),
        (None, _) => {
            tracing::debug!("Deleted invite {code} wasn't tracked or was already archived.")
        }
    }
    Ok(expired)
}
