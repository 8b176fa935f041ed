//! Implements the `/stats` command.

use poise::CreateReply;
use serenity::CreateEmbed;
use serenity::GuildId;
use tracing::instrument;

use super::{fit_lines, DESCRIPTION_LIMIT};
use crate::data::GetData;
use crate::data::{InviteRecord, JoinSource, Repository};
use crate::serenity;
use crate::tracking::stats::{group_invites, member_stats, resolve_all};
use crate::tracking::sync;
use crate::tracking::upstream::InviteSource;
use crate::BotError;
use crate::Context;

/// Invite and member statistics
#[poise::command(
    slash_command,
    guild_only,
    subcommands("invites", "members"),
    subcommand_required
)]
pub async fn stats(_ctx: Context<'_>) -> Result<(), BotError> {
    Ok(())
}

/// Uses per invite source
#[instrument(skip(ctx))]
#[poise::command(slash_command, guild_only)]
async fn invites(ctx: Context<'_>) -> Result<(), BotError> {
    let guild = ctx.command_guild()?;
    ctx.defer().await?;

    let lines = invite_lines(guild, ctx.invite_source(), &ctx.data().invites).await?;
    if lines.is_empty() {
        ctx.reply("No invites are tracked yet.").await?;
        return Ok(());
    }

    let embed = CreateEmbed::new()
        .title("Invite usage")
        .description(fit_lines(&lines, DESCRIPTION_LIMIT));
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// One line per invite source plus a total. Empty if the guild has no invites.
async fn invite_lines(
    guild: GuildId,
    source: &impl InviteSource,
    invites: &impl Repository<InviteRecord>,
) -> Result<Vec<String>, BotError> {
    // Stale counts are still worth showing.
    if let Err(e) = sync::sync(guild, source, invites).await {
        tracing::warn!("Showing stats without syncing first: {e}");
    }

    let groups = group_invites(guild, &invites.list().await?);
    if groups.is_empty() {
        return Ok(Vec::new());
    }

    let total_uses: u64 = groups.iter().map(|g| g.total_uses).sum();
    let count: usize = groups.iter().map(|g| g.invites).sum();
    let active: usize = groups.iter().map(|g| g.active).sum();

    let named = resolve_all(groups.iter().map(|g| (&g.identity, g)), source).await;
    let mut lines: Vec<String> = named
        .into_iter()
        .map(|(name, group)| {
            format!(
                "**{name}** · {} uses · {}/{} invites active",
                group.total_uses, group.active, group.invites
            )
        })
        .collect();
    lines.push(String::new());
    lines.push(format!(
        "**Total:** {total_uses} uses · {active}/{count} invites active"
    ));
    Ok(lines)
}

/// How current members joined
#[instrument(skip(ctx))]
#[poise::command(slash_command, guild_only)]
async fn members(ctx: Context<'_>) -> Result<(), BotError> {
    let guild = ctx.command_guild()?;
    ctx.defer().await?;

    let data = ctx.data();
    let lines = member_lines(guild, ctx.invite_source(), &data.invites, &data.members).await?;

    let embed = CreateEmbed::new()
        .title("Member sources")
        .description(fit_lines(&lines, DESCRIPTION_LIMIT));
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

async fn member_lines(
    guild: GuildId,
    source: &impl InviteSource,
    invites: &impl Repository<InviteRecord>,
    members: &impl Repository<JoinSource>,
) -> Result<Vec<String>, BotError> {
    let counts = member_stats(guild, &members.list().await?, &invites.list().await?);

    let named = resolve_all(
        counts.by_identity.iter().map(|(identity, n)| (identity, *n)),
        source,
    )
    .await;
    let mut lines: Vec<String> = named
        .into_iter()
        .map(|(name, n)| format!("**{name}** · {n} members"))
        .collect();
    lines.push(String::new());
    for (label, n) in [
        ("Removed invites", counts.forgotten),
        ("Untracked invites", counts.untracked),
        ("Unknown", counts.unknown),
        ("Joined before tracking", counts.pre_existing),
    ] {
        if n > 0 {
            lines.push(format!("**{label}** · {n} members"));
        }
    }
    lines.push(format!("**Total:** {} members", counts.total()));
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::serenity::UserId;
    use crate::tracking::testing::{guild, ledgers, FakeDiscord};

    fn record(creator: u64, uses: u64) -> InviteRecord {
        InviteRecord::tracked(Some(guild()), Some(UserId::new(creator)), uses, Utc::now())
    }

    #[tokio::test]
    async fn invite_usage_is_synced_first() {
        let (_dir, invites, _) = ledgers();
        let discord = FakeDiscord::default().with_user(1, "alice");
        discord.set_invites(guild(), &[("abc", 7)]);
        invites.upsert("abc", record(1, 2)).await.unwrap();
        let mut flyers = record(1, 3);
        flyers.set_custom_label("Flyers");
        flyers.archive(Utc::now());
        invites.upsert("fly", flyers).await.unwrap();

        let lines = invite_lines(guild(), &discord, &invites).await.unwrap();

        assert_eq!(
            lines,
            vec![
                "**alice** · 7 uses · 1/1 invites active".to_string(),
                "**Flyers** · 3 uses · 0/1 invites active".to_string(),
                String::new(),
                "**Total:** 10 uses · 1/2 invites active".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn invite_usage_survives_failed_sync() {
        let (_dir, invites, _) = ledgers();
        invites.upsert("abc", record(1, 2)).await.unwrap();

        let lines = invite_lines(guild(), &FakeDiscord::offline(), &invites)
            .await
            .unwrap();

        assert_eq!(lines[0], "**<@1>** · 2 uses · 1/1 invites active");
    }

    #[tokio::test]
    async fn member_sources() {
        let (_dir, invites, members) = ledgers();
        let discord = FakeDiscord::default().with_user(1, "alice");
        invites.upsert("abc", record(1, 2)).await.unwrap();
        members
            .upsert("10", JoinSource::Invite("abc".into()))
            .await
            .unwrap();
        members.upsert("11", JoinSource::PreExisting).await.unwrap();

        let lines = member_lines(guild(), &discord, &invites, &members)
            .await
            .unwrap();

        assert_eq!(
            lines,
            vec![
                "**alice** · 1 members".to_string(),
                String::new(),
                "**Joined before tracking** · 1 members".to_string(),
                "**Total:** 2 members".to_string(),
            ]
        );
    }
}
