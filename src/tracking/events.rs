//! Gateway event handling.
//!
//! Handlers log and swallow their own failures where a partial result is still useful, so one
//! bad event never blocks the next. Anything they do return ends up in
//! [handle_framework_error](crate::log::handle_framework_error).

use futures::TryStreamExt;
use serenity::CreateEmbed;
use serenity::CreateEmbedFooter;
use serenity::CreateMessage;
use serenity::FullEvent;
use serenity::Mentionable;
use tracing::instrument;

use super::hooks;
use super::reconcile;
use super::sync;
use super::upstream::{InviteSource, UpstreamInvite};
use crate::serenity;
use crate::serenity::{GuildId, Member, User};
use crate::BotError;
use crate::Data;

const JOIN_COLOUR: u32 = 0x00FF00;
const LEAVE_COLOUR: u32 = 0xFF0000;
const WELCOME_COLOUR: u32 = 0x006AD7;

/// Dispatches the events the bot cares about.
pub async fn event_handler(
    ctx: &serenity::Context,
    event: &FullEvent,
    _framework: poise::FrameworkContext<'_, Data, BotError>,
    data: &Data,
) -> Result<(), BotError> {
    match event {
        FullEvent::GuildMemberAddition { new_member } => member_joined(ctx, data, new_member).await,
        FullEvent::GuildMemberRemoval { guild_id, user, .. } => {
            member_left(ctx, data, *guild_id, user).await;
            Ok(())
        }
        FullEvent::InviteCreate { data: created } => {
            let Some(guild) = created.guild_id else {
                return Ok(());
            };
            let invite = UpstreamInvite::from(created);
            hooks::invite_created(guild, &invite, &data.snapshots, &data.invites).await
        }
        FullEvent::InviteDelete { data: deleted } => {
            let Some(guild) = deleted.guild_id else {
                return Ok(());
            };
            let mode = data.tracking.expiry_mode();
            hooks::invite_deleted(guild, &deleted.code, mode, &data.snapshots, &data.invites)
                .await?;
            Ok(())
        }
        FullEvent::GuildCreate {
            guild,
            is_new: Some(true),
        } => {
            tracing::info!("Joined new guild '{}'.", guild.name);
            prepare_guild(ctx, data, guild.id).await
        }
        _ => Ok(()),
    }
}

/// Get a guild ready for tracking: cache its invites, sync the ledger, and backfill members.
#[instrument(skip(ctx, data))]
pub async fn prepare_guild(
    ctx: &serenity::Context,
    data: &Data,
    guild: GuildId,
) -> Result<(), BotError> {
    let http = &*ctx.http;
    let invites = http.guild_invites(guild).await?;
    data.snapshots.initialize(guild, &invites).await;
    sync::sync(guild, http, &data.invites).await?;

    if data.tracking.backfill_members() {
        let existing: Vec<_> = guild
            .members_iter(ctx)
            .try_filter_map(|member| async move {
                Ok((!member.user.bot).then_some(member.user.id))
            })
            .try_collect()
            .await?;
        let added = reconcile::backfill_members(existing, &data.members).await?;
        tracing::info!("Recorded {added} pre-existing members.");
    }
    Ok(())
}

#[instrument(skip_all, fields(guild = %member.guild_id, member = %member.user.id))]
async fn member_joined(
    ctx: &serenity::Context,
    data: &Data,
    member: &Member,
) -> Result<(), BotError> {
    if member.user.bot {
        tracing::debug!("Ignoring bot {}.", member.user.name);
        return Ok(());
    }
    let guild = member.guild_id;

    if data.tracking.welcome_dm() {
        welcome(ctx, member).await;
    }

    let attribution = reconcile::reconcile_join(
        guild,
        member.user.id,
        &*ctx.http,
        &data.snapshots,
        &data.invites,
        &data.members,
    )
    .await;

    let embed = CreateEmbed::new()
        .colour(JOIN_COLOUR)
        .title("MEMBER JOINED")
        .description(format!(
            "{} has joined the server.\nThey joined through **{}**",
            member.mention(),
            attribution.join_phrase()
        ))
        .thumbnail(member.user.face())
        .timestamp(serenity::Timestamp::now())
        .footer(CreateEmbedFooter::new(format!("User ID: {}", member.user.id)));
    announce(ctx, data, guild, embed).await;
    Ok(())
}

#[instrument(skip_all, fields(guild = %guild, member = %user.id))]
async fn member_left(ctx: &serenity::Context, data: &Data, guild: GuildId, user: &User) {
    let joined_through =
        reconcile::reconcile_leave(user.id, &*ctx.http, &data.invites, &data.members).await;

    let embed = CreateEmbed::new()
        .colour(LEAVE_COLOUR)
        .title("MEMBER LEFT")
        .description(format!(
            "**{}** has left the server.\nThey originally joined through **{joined_through}**",
            user.tag()
        ))
        .thumbnail(user.face())
        .timestamp(serenity::Timestamp::now())
        .footer(CreateEmbedFooter::new(format!("User ID: {}", user.id)));
    announce(ctx, data, guild, embed).await;
}

/// DM the new member. Members with closed DMs are skipped.
async fn welcome(ctx: &serenity::Context, member: &Member) {
    let (name, icon) = match ctx.cache.guild(member.guild_id) {
        Some(guild) => (guild.name.clone(), guild.icon_url()),
        None => ("the server".to_string(), None),
    };

    let mut embed = CreateEmbed::new()
        .colour(WELCOME_COLOUR)
        .title(format!("Welcome to **{name}**!"))
        .description(
            "Glad to have you here. Have a look around, introduce yourself, \
             and don't hesitate to ask if you need help.",
        )
        .footer(CreateEmbedFooter::new(format!("The {name} Team")))
        .timestamp(serenity::Timestamp::now());
    if let Some(icon) = icon {
        embed = embed.thumbnail(icon);
    }

    let message = CreateMessage::new().embed(embed);
    match member.user.direct_message(ctx, message).await {
        Ok(_) => tracing::info!("Sent welcome DM to {}.", member.user.name),
        Err(e) => tracing::warn!("Couldn't DM {}: {e}", member.user.name),
    }
}

/// Post to the join/leave channel, if there is one and the bot may write there.
async fn announce(ctx: &serenity::Context, data: &Data, guild: GuildId, embed: CreateEmbed) {
    let Some(channel) = data.tracking.join_leave_channel() else {
        tracing::debug!("No join/leave channel configured.");
        return;
    };

    let allowed = {
        let Some(guild) = ctx.cache.guild(guild) else {
            tracing::warn!("Guild {guild} isn't cached, skipping announcement.");
            return;
        };
        let Some(guild_channel) = guild.channels.get(&channel) else {
            tracing::warn!("Join/leave channel {channel} not found in '{}'.", guild.name);
            return;
        };
        let me = ctx.cache.current_user().id;
        let Some(bot_member) = guild.members.get(&me) else {
            tracing::warn!("Couldn't find own member in '{}'.", guild.name);
            return;
        };
        let permissions = guild.user_permissions_in(guild_channel, bot_member);
        permissions.view_channel() && permissions.send_messages()
    };
    if !allowed {
        tracing::warn!("Missing permissions to post in join/leave channel {channel}.");
        return;
    }

    let message = CreateMessage::new().embed(embed);
    if let Err(e) = channel.send_message(ctx, message).await {
        tracing::error!("Failed to send announcement to {channel}: {e}");
    }
}
