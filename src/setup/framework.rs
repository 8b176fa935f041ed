//! Setup for [poise::Framework]

use crate::commands;
use crate::serenity;
use crate::tracking::events;
use crate::tracking::presence;
use crate::tracking::sync;
use crate::BotError;
use crate::Config;
use crate::Data;

/// Convenient type alias, only this [poise::Framework] type is used.
type Framework = poise::Framework<Data, BotError>;

/// Construct a [poise::Framework]
pub(super) fn framework(config: Config) -> Framework {
    poise::Framework::builder()
        .options(framework_options())
        .setup(|ctx, rdy, fw| framework_setup(ctx, rdy, fw, config))
        .build()
}

/// Configure options for the [Framework]
fn framework_options() -> poise::FrameworkOptions<Data, BotError> {
    poise::FrameworkOptions {
        // Add commands to the framework
        commands: commands::list(),
        // Handle framework errors
        on_error: |e| crate::log::handle_framework_error(e),
        // Member, invite and guild events
        event_handler: |ctx, event, framework, data| {
            Box::pin(events::event_handler(ctx, event, framework, data))
        },
        // Log when commands start
        pre_command: |ctx| {
            Box::pin(async move {
                let cmd_name = &ctx.command().qualified_name;
                let user = &ctx.author();
                tracing::info!("Started '{cmd_name}' command from {user}.")
            })
        },
        // Log when finishing commands
        post_command: |ctx| {
            Box::pin(async move {
                let cmd_name = &ctx.command().qualified_name;
                let user = &ctx.author();
                tracing::info!("Finished '{cmd_name}' command from {user}.")
            })
        },
        ..Default::default()
    }
}

/// Construct future that runs on startup
fn framework_setup<'a>(
    ctx: &'a serenity::Context,
    rdy: &'a serenity::Ready,
    fw: &'a Framework,
    config: Config,
) -> poise::BoxFuture<'a, Result<Data, BotError>> {
    Box::pin(async move {
        // Register the commands
        let commands = &commands::list();
        let app_commands = poise::builtins::create_application_commands(commands);

        serenity::Command::set_global_commands(&ctx, app_commands.clone()).await?;
        if let Some(dev_guild) = config.dev_guild() {
            // This is faster than global registers, useful for development.
            tracing::info!("Registering commands on dev guild.");
            dev_guild.set_commands(ctx, app_commands).await?;
        }

        let data = Data::new(config.notify_list(fw), config.tracking().clone());

        // One failing guild doesn't stop the others.
        for guild in &rdy.guilds {
            if let Err(e) = events::prepare_guild(ctx, &data, guild.id).await {
                tracing::error!("Failed to prepare guild {}: {e}", guild.id);
            }
        }

        tokio::spawn(presence::rotate(ctx.clone()));
        match data.tracking.validate_interval() {
            Some(every) => {
                tokio::spawn(sync::validate_periodically(
                    ctx.http.clone(),
                    ctx.cache.clone(),
                    data.invites.clone(),
                    data.tracking.expiry_mode(),
                    every,
                ));
            }
            None => tracing::info!("Periodic invite validation is off."),
        }

        // Simple message that logs when the bot has initialized
        let bot_name = &rdy.user.name;
        tracing::info!("{bot_name} is ready!");

        Ok(data)
    })
}
