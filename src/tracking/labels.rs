//! Turning stored invite labels into something people can read.

use std::fmt::Display;

use chrono::Utc;
use tracing::instrument;

use super::upstream::InviteSource;
use crate::data::{InviteRecord, Repository};
use crate::error::UserError;
use crate::serenity::{GuildId, UserId};
use crate::BotError;

/// Who or what an invite is attributed to, resolved for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceName {
    /// An admin-assigned label, shown verbatim.
    Custom(String),
    /// The creator's name.
    Creator(String),
    /// A creator whose name couldn't be fetched.
    Unresolved(UserId),
    Unknown,
}

impl SourceName {
    /// Completes "They joined through ...".
    pub fn join_phrase(&self) -> String {
        match self {
            SourceName::Custom(label) => label.clone(),
            SourceName::Creator(_) | SourceName::Unresolved(_) => {
                format!("an invite created by {self}")
            }
            SourceName::Unknown => "an Unknown invite".to_string(),
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, SourceName::Custom(_))
    }
}

impl Display for SourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceName::Custom(label) => write!(f, "{label}"),
            SourceName::Creator(name) => write!(f, "{name}"),
            SourceName::Unresolved(id) => write!(f, "<@{id}>"),
            SourceName::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Resolve a record's label. Never fails: lookups that error fall back to a mention.
pub async fn resolve(record: &InviteRecord, source: &impl InviteSource) -> SourceName {
    if record.is_custom_label {
        return SourceName::Custom(record.source_label.clone());
    }
    match record.creator() {
        Some(id) => resolve_user(id, source).await,
        None => SourceName::Unknown,
    }
}

/// Look up a creator's name, falling back to [SourceName::Unresolved].
pub async fn resolve_user(id: UserId, source: &impl InviteSource) -> SourceName {
    match source.user_name(id).await {
        Ok(name) => SourceName::Creator(name),
        Err(e) => {
            tracing::warn!("Couldn't resolve user {id}: {e}");
            SourceName::Unresolved(id)
        }
    }
}

/// Track an invite, optionally giving it a custom label.
///
/// Invites that exist in `guild` but aren't tracked yet are tracked first. Invites that are
/// neither tracked nor live are rejected, as are records of other guilds.
#[instrument(skip(source, invites))]
pub async fn track_invite(
    guild: GuildId,
    code: &str,
    label: Option<&str>,
    source: &impl InviteSource,
    invites: &impl Repository<InviteRecord>,
) -> Result<InviteRecord, BotError> {
    let live = source
        .guild_invites(guild)
        .await?
        .into_iter()
        .find(|invite| invite.code == code);

    let tracked = invites
        .modify(|entries| {
            if !entries.contains_key(code) {
                let live = live.as_ref()?;
                let created_at = live.created_at.unwrap_or_else(Utc::now);
                let record = InviteRecord::tracked(Some(guild), live.inviter, live.uses, created_at);
                entries.insert(code.to_string(), record);
            }
            let record = entries.get_mut(code).filter(|r| r.belongs_to(guild))?;
            if let Some(live) = &live {
                record.use_count = live.uses;
                record.unarchive();
            }
            if let Some(label) = label {
                record.set_custom_label(label);
            }
            Some(record.clone())
        })
        .await?
        .ok_or_else(|| UserError::InviteNotFound {
            code: code.to_string(),
        })?;

    match label {
        Some(label) => tracing::info!("Invite {code} is now labelled '{label}'."),
        None => tracing::info!("Invite {code} is tracked."),
    }
    Ok(tracked)
}

/// Remove an invite's custom label, going back to its creator.
/// Returns the updated record and the label that was removed.
#[instrument(skip(invites))]
pub async fn clear_label(
    guild: GuildId,
    code: &str,
    invites: &impl Repository<InviteRecord>,
) -> Result<(InviteRecord, String), BotError> {
    let cleared = invites
        .modify(|entries| {
            let Some(record) = entries.get_mut(code).filter(|r| r.belongs_to(guild)) else {
                return Err(UserError::NotTracked {
                    code: code.to_string(),
                });
            };
            match record.clear_custom_label() {
                Some(removed) => Ok((record.clone(), removed)),
                None => Err(UserError::NoCustomLabel {
                    code: code.to_string(),
                }),
            }
        })
        .await??;

    tracing::info!("Removed label '{}' from invite {code}.", cleared.1);
    Ok(cleared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::testing::{guild, ledgers, FakeDiscord};

    #[tokio::test]
    async fn custom_labels_are_verbatim() {
        let discord = FakeDiscord::default();
        let mut record = InviteRecord::tracked(None, Some(UserId::new(3)), 0, Utc::now());
        record.set_custom_label("Twitter bio");

        let name = resolve(&record, &discord).await;
        assert_eq!(name, SourceName::Custom("Twitter bio".into()));
        assert_eq!(name.join_phrase(), "Twitter bio");
    }

    #[tokio::test]
    async fn creators_resolve_to_names() {
        let discord = FakeDiscord::default().with_user(3, "ferris");
        let record = InviteRecord::tracked(None, Some(UserId::new(3)), 0, Utc::now());

        let name = resolve(&record, &discord).await;
        assert_eq!(name.join_phrase(), "an invite created by ferris");
    }

    #[tokio::test]
    async fn unresolvable_creators_become_mentions() {
        let discord = FakeDiscord::default();
        let record = InviteRecord::tracked(None, Some(UserId::new(3)), 0, Utc::now());

        let name = resolve(&record, &discord).await;
        assert_eq!(name, SourceName::Unresolved(UserId::new(3)));
        assert_eq!(name.join_phrase(), "an invite created by <@3>");
    }

    #[tokio::test]
    async fn unknown_creator() {
        let discord = FakeDiscord::default();
        let record = InviteRecord::tracked(None, None, 0, Utc::now());

        let name = resolve(&record, &discord).await;
        assert_eq!(name.join_phrase(), "an Unknown invite");
    }

    #[tokio::test]
    async fn assigning_tracks_live_invites() {
        let (_dir, invites, _) = ledgers();
        let discord = FakeDiscord::default();
        discord.set_invites(guild(), &[("abc", 6)]);

        let record = track_invite(guild(), "abc", Some("YouTube"), &discord, &invites)
            .await
            .unwrap();

        assert!(record.is_custom_label);
        assert_eq!(record.source_label, "YouTube");
        assert_eq!(record.original_creator.as_deref(), Some("1"));
        assert_eq!(record.use_count, 6);
        assert_eq!(invites.get("abc").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn assigning_unknown_invite_fails() {
        let (_dir, invites, _) = ledgers();
        let discord = FakeDiscord::default();

        let result = track_invite(guild(), "nope", Some("YouTube"), &discord, &invites).await;

        assert!(matches!(
            result,
            Err(BotError::UserError(UserError::InviteNotFound { .. }))
        ));
        assert!(invites.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn archived_invites_can_still_be_labelled() {
        let (_dir, invites, _) = ledgers();
        let discord = FakeDiscord::default();
        let mut record = InviteRecord::tracked(Some(guild()), Some(UserId::new(4)), 9, Utc::now());
        record.archive(Utc::now());
        invites.upsert("old", record).await.unwrap();

        let record = track_invite(guild(), "old", Some("Flyers"), &discord, &invites)
            .await
            .unwrap();
        assert_eq!(record.source_label, "Flyers");
        assert_eq!(record.use_count, 9);
        assert!(record.archived);
    }

    #[tokio::test]
    async fn tracking_without_label_revives_live_invites() {
        let (_dir, invites, _) = ledgers();
        let discord = FakeDiscord::default();
        let mut record = InviteRecord::tracked(Some(guild()), Some(UserId::new(1)), 1, Utc::now());
        record.archive(Utc::now());
        invites.upsert("abc", record).await.unwrap();
        discord.set_invites(guild(), &[("abc", 3)]);

        let record = track_invite(guild(), "abc", None, &discord, &invites)
            .await
            .unwrap();

        assert!(!record.archived);
        assert!(!record.is_custom_label);
        assert_eq!(record.use_count, 3);
    }

    #[tokio::test]
    async fn other_guilds_records_are_off_limits() {
        let (_dir, invites, _) = ledgers();
        let discord = FakeDiscord::default();
        let mut record = InviteRecord::tracked(Some(GuildId::new(999)), None, 0, Utc::now());
        record.set_custom_label("Theirs");
        invites.upsert("abc", record.clone()).await.unwrap();

        let labelled = track_invite(guild(), "abc", Some("Mine"), &discord, &invites).await;
        let cleared = clear_label(guild(), "abc", &invites).await;

        assert!(matches!(
            labelled,
            Err(BotError::UserError(UserError::InviteNotFound { .. }))
        ));
        assert!(matches!(
            cleared,
            Err(BotError::UserError(UserError::NotTracked { .. }))
        ));
        assert_eq!(invites.get("abc").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn label_round_trip_through_ledger() {
        let (_dir, invites, _) = ledgers();
        let discord = FakeDiscord::default();
        discord.set_invites(guild(), &[("abc", 0)]);

        track_invite(guild(), "abc", Some("First"), &discord, &invites)
            .await
            .unwrap();
        track_invite(guild(), "abc", Some("Second"), &discord, &invites)
            .await
            .unwrap();
        let (record, removed) = clear_label(guild(), "abc", &invites).await.unwrap();

        assert_eq!(removed, "Second");
        assert_eq!(record.source_label, "1");
        assert!(!record.is_custom_label);

        let again = clear_label(guild(), "abc", &invites).await;
        assert!(matches!(
            again,
            Err(BotError::UserError(UserError::NoCustomLabel { .. }))
        ));
        let missing = clear_label(guild(), "zzz", &invites).await;
        assert!(matches!(
            missing,
            Err(BotError::UserError(UserError::NotTracked { .. }))
        ));
    }
}
