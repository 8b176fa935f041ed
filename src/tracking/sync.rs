//! Converging the invite ledger with Discord's invite list.
//!
//! [sync] only adds and updates, [validate] expires what Discord no longer has. Both are safe to
//! run any number of times.

use std::collections::HashSet;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::instrument;

use super::hooks::ExpiryMode;
use super::labels::{self, SourceName};
use super::upstream::{InviteSource, UpstreamInvite};
use crate::data::{Entries, InviteRecord, Repository};
use crate::serenity;
use crate::serenity::GuildId;
use crate::BotError;

/// Outcome of a [sync].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Invites Discord reported.
    pub total: usize,
    pub added: usize,
    pub updated: usize,
    pub unarchived: usize,
    pub unchanged: usize,
}

impl SyncReport {
    pub fn changed(&self) -> bool {
        self.added + self.updated + self.unarchived > 0
    }
}

impl Display for SyncReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} added, {} updated, {} unarchived, {} unchanged",
            self.added, self.updated, self.unarchived, self.unchanged
        )
    }
}

/// Track every live invite and bring use counts up to date. Never removes anything.
#[instrument(skip(source, invites))]
pub async fn sync(
    guild: GuildId,
    source: &impl InviteSource,
    invites: &impl Repository<InviteRecord>,
) -> Result<SyncReport, BotError> {
    let upstream = source.guild_invites(guild).await?;
    let now = Utc::now();

    // Dry run first so an unchanged ledger isn't rewritten.
    let mut preview = invites.list().await?;
    let mut report = apply_sync(guild, &upstream, &mut preview, now);
    if report.changed() {
        report = invites
            .modify(|entries| apply_sync(guild, &upstream, entries, now))
            .await?;
    }

    tracing::info!("Sync complete: {report}.");
    Ok(report)
}

fn apply_sync(
    guild: GuildId,
    upstream: &[UpstreamInvite],
    entries: &mut Entries<InviteRecord>,
    now: DateTime<Utc>,
) -> SyncReport {
    let mut report = SyncReport {
        total: upstream.len(),
        ..Default::default()
    };

    for invite in upstream {
        let Some(record) = entries.get_mut(&invite.code) else {
            let created_at = invite.created_at.unwrap_or(now);
            let record = InviteRecord::tracked(Some(guild), invite.inviter, invite.uses, created_at);
            entries.insert(invite.code.clone(), record);
            tracing::debug!("Added {} ({} uses).", invite.code, invite.uses);
            report.added += 1;
            continue;
        };

        let unarchived = record.unarchive();
        if unarchived {
            tracing::debug!("Unarchived {}.", invite.code);
            report.unarchived += 1;
        }

        if record.use_count != invite.uses {
            tracing::debug!(
                "Updated {}: {} -> {} uses.",
                invite.code,
                record.use_count,
                invite.uses
            );
            record.use_count = invite.uses;
            report.updated += 1;
        } else if !unarchived {
            report.unchanged += 1;
        }
    }

    report
}

/// A record expired by [validate].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredInvite {
    pub code: String,
    pub name: SourceName,
    pub uses: u64,
}

/// Outcome of a [validate].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// Ledger records belonging to the guild.
    pub total: usize,
    pub valid: usize,
    pub already_archived: usize,
    /// Records expired by this run.
    pub expired: Vec<ExpiredInvite>,
}

impl Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} valid, {} archived, {} already archived",
            self.valid,
            self.expired.len(),
            self.already_archived
        )
    }
}

/// Expire every record of `guild` whose invite Discord no longer has.
#[instrument(skip(source, invites))]
pub async fn validate(
    guild: GuildId,
    mode: ExpiryMode,
    source: &impl InviteSource,
    invites: &impl Repository<InviteRecord>,
) -> Result<ValidationReport, BotError> {
    let upstream = source.guild_invites(guild).await?;
    let live: HashSet<&str> = upstream.iter().map(|i| i.code.as_str()).collect();
    let now = Utc::now();

    let mut preview = invites.list().await?;
    let (mut counts, mut expired) = apply_validation(guild, &live, &mut preview, mode, now);
    if !expired.is_empty() {
        (counts, expired) = invites
            .modify(|entries| apply_validation(guild, &live, entries, mode, now))
            .await?;
    }

    let mut report = counts;
    for (code, record) in expired {
        let name = labels::resolve(&record, source).await;
        tracing::info!("Expired {code} ({name}, {} uses).", record.use_count);
        report.expired.push(ExpiredInvite {
            code,
            name,
            uses: record.use_count,
        });
    }

    tracing::info!("Validation complete: {report}.");
    Ok(report)
}

fn apply_validation(
    guild: GuildId,
    live: &HashSet<&str>,
    entries: &mut Entries<InviteRecord>,
    mode: ExpiryMode,
    now: DateTime<Utc>,
) -> (ValidationReport, Vec<(String, InviteRecord)>) {
    let mut report = ValidationReport::default();
    let mut expired = Vec::new();

    let codes: Vec<String> = entries
        .iter()
        .filter(|(_, record)| record.belongs_to(guild))
        .map(|(code, _)| code.clone())
        .collect();

    for code in codes {
        report.total += 1;
        if live.contains(code.as_str()) {
            report.valid += 1;
        } else if entries.get(&code).is_some_and(|r| r.archived) {
            report.already_archived += 1;
        } else if let Some(record) = mode.expire(entries, &code, now) {
            expired.push((code, record));
        }
    }

    (report, expired)
}

/// Validate every guild in the cache every `every`, forever. The first run happens after one
/// full interval, startup already syncs.
pub async fn validate_periodically(
    http: Arc<serenity::Http>,
    cache: Arc<serenity::Cache>,
    invites: crate::data::InviteLedger,
    mode: ExpiryMode,
    every: Duration,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        tracing::info!("Running scheduled invite validation.");
        for guild in cache.guilds() {
            if let Err(e) = validate(guild, mode, &*http, &invites).await {
                tracing::error!("Scheduled validation of guild {guild} failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serenity::UserId;
    use crate::tracking::testing::{guild, ledgers, FakeDiscord};

    #[tokio::test]
    async fn sync_adds_and_updates() {
        let (_dir, invites, _) = ledgers();
        let discord = FakeDiscord::default();
        invites
            .upsert(
                "A",
                InviteRecord::tracked(Some(guild()), Some(UserId::new(1)), 1, Utc::now()),
            )
            .await
            .unwrap();
        discord.set_invites(guild(), &[("A", 4), ("B", 2)]);

        let report = sync(guild(), &discord, &invites).await.unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(report.added, 1);
        assert_eq!(report.updated, 1);
        let entries = invites.list().await.unwrap();
        assert_eq!(entries["A"].use_count, 4);
        assert_eq!(entries["B"].use_count, 2);
        assert_eq!(entries["B"].source_label, "1");
    }

    #[tokio::test]
    async fn sync_is_idempotent() {
        let (_dir, invites, _) = ledgers();
        let discord = FakeDiscord::default();
        discord.set_invites(guild(), &[("A", 4), ("B", 2)]);

        sync(guild(), &discord, &invites).await.unwrap();
        let modified = std::fs::metadata(invites.path()).unwrap().modified().unwrap();
        let second = sync(guild(), &discord, &invites).await.unwrap();

        assert!(!second.changed());
        assert_eq!(second.unchanged, 2);
        assert_eq!(
            std::fs::metadata(invites.path()).unwrap().modified().unwrap(),
            modified
        );
    }

    #[tokio::test]
    async fn sync_unarchives_returning_invites() {
        let (_dir, invites, _) = ledgers();
        let discord = FakeDiscord::default();
        let mut record = InviteRecord::tracked(Some(guild()), None, 3, Utc::now());
        record.archive(Utc::now());
        invites.upsert("A", record).await.unwrap();
        discord.set_invites(guild(), &[("A", 3)]);

        let report = sync(guild(), &discord, &invites).await.unwrap();

        assert_eq!(report.unarchived, 1);
        assert_eq!(report.unchanged, 0);
        let record = invites.get("A").await.unwrap().unwrap();
        assert!(!record.archived);
        assert!(record.expired_at.is_none());
    }

    #[tokio::test]
    async fn validate_archives_missing_invites() {
        let (_dir, invites, _) = ledgers();
        let discord = FakeDiscord::default().with_user(1, "ferris");
        discord.set_invites(guild(), &[("A", 1), ("B", 2), ("C", 3)]);
        sync(guild(), &discord, &invites).await.unwrap();
        let mut custom = invites.get("C").await.unwrap().unwrap();
        custom.set_custom_label("Podcast");
        invites.upsert("C", custom).await.unwrap();

        discord.set_invites(guild(), &[("A", 1)]);
        let report = validate(guild(), ExpiryMode::Archive, &discord, &invites)
            .await
            .unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.valid, 1);
        assert_eq!(report.expired.len(), 2);
        let podcast = report.expired.iter().find(|e| e.code == "C").unwrap();
        assert_eq!(podcast.name, SourceName::Custom("Podcast".into()));
        assert_eq!(podcast.uses, 3);
        let b = report.expired.iter().find(|e| e.code == "B").unwrap();
        assert_eq!(b.name, SourceName::Creator("ferris".into()));

        // Every record is now either live or archived.
        let live = ["A"];
        for (code, record) in invites.list().await.unwrap() {
            assert!(record.archived || live.contains(&code.as_str()));
            assert_eq!(record.archived, !live.contains(&code.as_str()));
        }

        let again = validate(guild(), ExpiryMode::Archive, &discord, &invites)
            .await
            .unwrap();
        assert!(again.expired.is_empty());
        assert_eq!(again.already_archived, 2);
    }

    #[tokio::test]
    async fn validate_ignores_other_guilds() {
        let (_dir, invites, _) = ledgers();
        let discord = FakeDiscord::default();
        let other = GuildId::new(200);
        invites
            .upsert("Z", InviteRecord::tracked(Some(other), None, 0, Utc::now()))
            .await
            .unwrap();

        let report = validate(guild(), ExpiryMode::Archive, &discord, &invites)
            .await
            .unwrap();

        assert_eq!(report.total, 0);
        assert!(!invites.get("Z").await.unwrap().unwrap().archived);
    }

    #[tokio::test]
    async fn validate_in_delete_mode() {
        let (_dir, invites, _) = ledgers();
        let discord = FakeDiscord::default();
        invites
            .upsert("A", InviteRecord::tracked(Some(guild()), None, 0, Utc::now()))
            .await
            .unwrap();

        let report = validate(guild(), ExpiryMode::Delete, &discord, &invites)
            .await
            .unwrap();

        assert_eq!(report.expired.len(), 1);
        assert_eq!(report.expired[0].name, SourceName::Unknown);
        assert!(invites.list().await.unwrap().is_empty());
    }
}
