//! Implements the `/invites` command.
//!
//! Lets server managers curate the invite ledger: name invites after where they were posted,
//! list what's tracked, and force a validation run.

use futures::future::join_all;
use poise::CreateReply;
use serenity::CreateEmbed;
use serenity::GuildId;
use tracing::instrument;

use super::{fit_lines, DESCRIPTION_LIMIT};
use crate::data::GetData;
use crate::data::{InviteRecord, Repository};
use crate::error::UserError;
use crate::serenity;
use crate::tracking;
use crate::tracking::hooks::ExpiryMode;
use crate::tracking::labels;
use crate::tracking::sync;
use crate::tracking::upstream::InviteSource;
use crate::BotError;
use crate::Context;

/// Manage tracked invites
#[poise::command(
    slash_command,
    guild_only,
    subcommands("add", "remove", "list", "validate"),
    subcommand_required,
    default_member_permissions = "MANAGE_GUILD"
)]
pub async fn invites(_ctx: Context<'_>) -> Result<(), BotError> {
    Ok(())
}

/// Track an invite, optionally under a custom name
#[instrument(skip(ctx))]
#[poise::command(slash_command, guild_only)]
async fn add(
    ctx: Context<'_>,
    #[description = "Invite link or code"] invite: String,
    #[description = "Name to show instead of the creator, like where the link was posted"]
    name: Option<String>,
) -> Result<(), BotError> {
    let guild = ctx.command_guild()?;
    let reply = add_reply(
        guild,
        &invite,
        name.as_deref(),
        ctx.invite_source(),
        &ctx.data().invites,
    )
    .await?;
    ctx.reply(reply).await?;
    Ok(())
}

async fn add_reply(
    guild: GuildId,
    invite: &str,
    name: Option<&str>,
    source: &impl InviteSource,
    invites: &impl Repository<InviteRecord>,
) -> Result<String, BotError> {
    let code = tracking::parse_invite_code(invite)?;
    let name = name.map(str::trim);
    if name.is_some_and(str::is_empty) {
        return Err(UserError::BadArgs {
            input: Some("an empty name".to_string()),
        }
        .into());
    }

    let record = labels::track_invite(guild, &code, name, source, invites).await?;

    Ok(match name {
        Some(name) => format!(
            "Invite `{code}` is now shown as **{name}** ({} uses).",
            record.use_count
        ),
        None => format!("Invite `{code}` is tracked ({} uses).", record.use_count),
    })
}

/// Remove an invite's custom name
#[instrument(skip(ctx))]
#[poise::command(slash_command, guild_only)]
async fn remove(
    ctx: Context<'_>,
    #[description = "Invite link or code"] invite: String,
) -> Result<(), BotError> {
    let guild = ctx.command_guild()?;
    let reply = remove_reply(guild, &invite, ctx.invite_source(), &ctx.data().invites).await?;
    ctx.reply(reply).await?;
    Ok(())
}

async fn remove_reply(
    guild: GuildId,
    invite: &str,
    source: &impl InviteSource,
    invites: &impl Repository<InviteRecord>,
) -> Result<String, BotError> {
    let code = tracking::parse_invite_code(invite)?;
    let (record, removed) = labels::clear_label(guild, &code, invites).await?;
    let restored = labels::resolve(&record, source).await;

    Ok(format!(
        "Removed **{removed}** from `{code}`, it's credited to **{restored}** again."
    ))
}

/// List tracked invites
#[instrument(skip(ctx))]
#[poise::command(slash_command, guild_only)]
async fn list(ctx: Context<'_>) -> Result<(), BotError> {
    let guild = ctx.command_guild()?;
    ctx.defer().await?;

    let lines = list_lines(guild, ctx.invite_source(), &ctx.data().invites).await?;
    if lines.is_empty() {
        ctx.reply("No invites are tracked yet.").await?;
        return Ok(());
    }

    let embed = CreateEmbed::new()
        .title("Tracked invites")
        .description(fit_lines(&lines, DESCRIPTION_LIMIT));
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Active invites, then archived ones. Empty if the guild has none.
async fn list_lines(
    guild: GuildId,
    source: &impl InviteSource,
    invites: &impl Repository<InviteRecord>,
) -> Result<Vec<String>, BotError> {
    let (active, archived): (Vec<_>, Vec<_>) = invites
        .list()
        .await?
        .into_iter()
        .filter(|(_, record)| record.belongs_to(guild))
        .partition(|(_, record)| !record.archived);

    if active.is_empty() && archived.is_empty() {
        return Ok(Vec::new());
    }

    let mut lines = vec![format!("**Active ({})**", active.len())];
    lines.extend(describe(&active, source).await);
    if !archived.is_empty() {
        lines.push(String::new());
        lines.push(format!("**Archived ({})**", archived.len()));
        lines.extend(describe(&archived, source).await);
    }
    Ok(lines)
}

/// One line per invite, names resolved concurrently.
async fn describe(records: &[(String, InviteRecord)], source: &impl InviteSource) -> Vec<String> {
    let lines = records.iter().map(|(code, record)| async move {
        let name = labels::resolve(record, source).await;
        format!("`{code}` · **{name}** · {} uses", record.use_count)
    });
    join_all(lines).await
}

/// Sync and validate tracked invites now
#[instrument(skip(ctx))]
#[poise::command(slash_command, guild_only)]
async fn validate(ctx: Context<'_>) -> Result<(), BotError> {
    let guild = ctx.command_guild()?;
    ctx.defer().await?;

    let data = ctx.data();
    let lines = validation_lines(
        guild,
        data.tracking.expiry_mode(),
        ctx.invite_source(),
        &data.invites,
    )
    .await?;

    let embed = CreateEmbed::new()
        .title("Invite validation")
        .description(fit_lines(&lines, DESCRIPTION_LIMIT));
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

async fn validation_lines(
    guild: GuildId,
    mode: ExpiryMode,
    source: &impl InviteSource,
    invites: &impl Repository<InviteRecord>,
) -> Result<Vec<String>, BotError> {
    let synced = sync::sync(guild, source, invites).await?;
    let validated = sync::validate(guild, mode, source, invites).await?;

    let mut lines = vec![
        format!("**Sync:** {synced}."),
        format!("**Validation:** {validated}."),
    ];
    if !validated.expired.is_empty() {
        lines.push(String::new());
        lines.push("**Expired**".to_string());
        lines.extend(validated.expired.iter().map(|e| {
            let kind = if e.name.is_custom() {
                "custom label"
            } else {
                "creator"
            };
            format!("`{}` · **{}** ({kind}) · {} uses", e.code, e.name, e.uses)
        }));
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::serenity::UserId;
    use crate::tracking::testing::{guild, ledgers, FakeDiscord};

    fn record(uses: u64) -> InviteRecord {
        InviteRecord::tracked(Some(guild()), Some(UserId::new(1)), uses, Utc::now())
    }

    #[tokio::test]
    async fn adding_a_link_labels_the_invite() {
        let (_dir, invites, _) = ledgers();
        let discord = FakeDiscord::default();
        discord.set_invites(guild(), &[("abc", 4)]);

        let reply = add_reply(
            guild(),
            "https://discord.gg/abc",
            Some("  Reddit "),
            &discord,
            &invites,
        )
        .await
        .unwrap();

        assert_eq!(reply, "Invite `abc` is now shown as **Reddit** (4 uses).");
        assert_eq!(invites.get("abc").await.unwrap().unwrap().source_label, "Reddit");
    }

    #[tokio::test]
    async fn blank_names_are_rejected() {
        let (_dir, invites, _) = ledgers();
        let discord = FakeDiscord::default();
        discord.set_invites(guild(), &[("abc", 0)]);

        let result = add_reply(guild(), "abc", Some("   "), &discord, &invites).await;

        assert!(matches!(
            result,
            Err(BotError::UserError(UserError::BadArgs { .. }))
        ));
        assert!(invites.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn removing_credits_the_creator_again() {
        let (_dir, invites, _) = ledgers();
        let discord = FakeDiscord::default().with_user(1, "alice");
        let mut labelled = record(2);
        labelled.set_custom_label("Twitter");
        invites.upsert("abc", labelled).await.unwrap();

        let reply = remove_reply(guild(), "discord.com/invite/abc", &discord, &invites)
            .await
            .unwrap();

        assert_eq!(
            reply,
            "Removed **Twitter** from `abc`, it's credited to **alice** again."
        );
    }

    #[tokio::test]
    async fn listing_puts_archived_invites_last() {
        let (_dir, invites, _) = ledgers();
        let discord = FakeDiscord::default().with_user(1, "alice");
        let mut old = record(9);
        old.archive(Utc::now());
        invites.upsert("old", old).await.unwrap();
        invites.upsert("new", record(3)).await.unwrap();

        let lines = list_lines(guild(), &discord, &invites).await.unwrap();

        assert_eq!(
            lines,
            vec![
                "**Active (1)**".to_string(),
                "`new` · **alice** · 3 uses".to_string(),
                String::new(),
                "**Archived (1)**".to_string(),
                "`old` · **alice** · 9 uses".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn listing_nothing() {
        let (_dir, invites, _) = ledgers();
        let lines = list_lines(guild(), &FakeDiscord::default(), &invites)
            .await
            .unwrap();
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn validation_reports_label_kinds() {
        let (_dir, invites, _) = ledgers();
        let discord = FakeDiscord::default().with_user(1, "alice");
        discord.set_invites(guild(), &[("live", 1)]);
        let mut labelled = record(5);
        labelled.set_custom_label("Flyers");
        invites.upsert("gone", labelled).await.unwrap();
        invites.upsert("lost", record(2)).await.unwrap();

        let lines = validation_lines(guild(), ExpiryMode::Archive, &discord, &invites)
            .await
            .unwrap();

        assert!(lines.contains(&"`gone` · **Flyers** (custom label) · 5 uses".to_string()));
        assert!(lines.contains(&"`lost` · **alice** (creator) · 2 uses".to_string()));
        assert!(invites.get("live").await.unwrap().is_some());
    }
}
