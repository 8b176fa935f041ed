//! Logging functionality and error reporting.
//! The logging library of choice is [tracing].
//!
//! Failures inside event handlers end up in [handle_framework_error] too, where they are logged
//! and dropped.

use itertools::Itertools;
use poise::BoxFuture;
use poise::CreateReply;
use poise::FrameworkError;
use serenity::CreateMessage;
use tracing::debug;
use tracing::error;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

use crate::error::UserError;
use crate::serenity;
use crate::BotError;
use crate::Config;
use crate::Context;
use crate::Data;

/// The name of this crate, used to set filter target.
const THIS_CRATE: &str = env!("CARGO_CRATE_NAME");

/// Setup format layers, tracing subscribers, and installs tracing.
/// The returned guard must be held until shutdown, or buffered file logs are lost.
pub(super) fn install_tracing(config: &Config) -> Option<WorkerGuard> {
    // Uses local time.
    let timer = fmt::time::ChronoLocal::rfc_3339();
    let debug = config.console_debug();

    // By default, all INFO traces and above are shown.
    let target = if debug {
        Targets::new()
            .with_default(LevelFilter::INFO)
            .with_target(THIS_CRATE, LevelFilter::DEBUG)
    } else {
        Targets::new().with_default(LevelFilter::INFO)
    };

    let console_layer = fmt::layer()
        .with_ansi(true)
        .with_file(debug)
        .with_level(true)
        .with_line_number(debug)
        .with_target(true)
        .with_timer(timer.clone())
        .pretty()
        .with_filter(target.clone());

    // File logs go to `log_dir` as "{THIS_CRATE}.log.{TIMESTAMP}", one file per hour.
    let (file_layer, guard) = if config.logs_enabled() {
        let appender = tracing_appender::rolling::hourly(config.log_dir(), format!("{THIS_CRATE}.log"));
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let layer = fmt::layer()
            .with_ansi(false)
            .with_file(debug)
            .with_level(true)
            .with_line_number(debug)
            .with_target(true)
            .with_timer(timer)
            .with_writer(writer)
            .compact()
            .with_filter(target);

        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}

/// Defines various behaviors for how to handle errors.
/// [UserError]s become an [ephemeral_reply], unexpected errors trigger a [notify_bug].
pub fn handle_framework_error(err: FrameworkError<Data, BotError>) -> BoxFuture<()> {
    let handler = async move {
        match err {
            // ---
            // Invisible to users.
            // ---
            FrameworkError::Setup { error, .. } => error!("Error during startup: {error}"),
            FrameworkError::EventHandler { error, event, .. } => error!(
                "Error while handling {} event: {error}",
                event.snake_case_name()
            ),

            // ---
            // Shown to users, only logged at debug level.
            // ---
            FrameworkError::Command {
                error: BotError::UserError(user_error),
                ctx,
                ..
            } => reply_user_error(&ctx, user_error, None).await,
            FrameworkError::SubcommandRequired { ctx } => {
                let subcmds = ctx
                    .command()
                    .subcommands
                    .iter()
                    .map(|s| s.name.as_str())
                    .join(", ");
                reply_user_error(&ctx, UserError::MissingSubcommand { subcmds }, None).await
            }
            FrameworkError::ArgumentParse {
                error, input, ctx, ..
            } => reply_user_error(&ctx, UserError::BadArgs { input }, Some(error.to_string())).await,
            FrameworkError::CooldownHit {
                remaining_cooldown,
                ctx,
                ..
            } => reply_user_error(&ctx, UserError::OnCooldown { remaining_cooldown }, None).await,
            FrameworkError::MissingBotPermissions {
                missing_permissions,
                ctx,
                ..
            } => {
                let user_error = UserError::MissingBotPermissions {
                    missing_permissions,
                };
                reply_user_error(&ctx, user_error, None).await
            }
            FrameworkError::MissingUserPermissions {
                missing_permissions,
                ctx,
                ..
            } => {
                let user_error = UserError::MissingUserPermissions {
                    missing_permissions,
                };
                reply_user_error(&ctx, user_error, None).await
            }
            FrameworkError::NotAnOwner { ctx, .. } => {
                reply_user_error(&ctx, UserError::NotOwner, None).await
            }
            FrameworkError::GuildOnly { ctx, .. } => {
                reply_user_error(&ctx, UserError::GuildOnly, None).await
            }
            FrameworkError::DmOnly { ctx, .. } => {
                reply_user_error(&ctx, UserError::DmOnly, None).await
            }
            FrameworkError::NsfwOnly { ctx, .. } => {
                reply_user_error(&ctx, UserError::NsfwOnly, None).await
            }
            FrameworkError::CommandCheckFailed { error, ctx, .. } => {
                let error = BotError::CheckFailed {
                    reason: error.map(|e| e.to_string()),
                };
                Response::builder()
                    .ctx(&ctx)
                    .reply(error.to_string())
                    .source(error)
                    .build()
                    .send()
                    .await;
            }

            // ---
            // Shown to users, logged as errors and reported as bugs.
            // ---
            FrameworkError::Command { error, ctx, .. } => {
                Response::builder()
                    .ctx(&ctx)
                    .reply("Something went wrong... A bug report has been sent.")
                    .source(error)
                    .bug(true)
                    .build()
                    .send()
                    .await;
            }
            FrameworkError::CommandPanic { payload, ctx, .. } => {
                Response::builder()
                    .ctx(&ctx)
                    .reply("Something went horribly wrong... A bug report has been sent.")
                    .source(BotError::Panic { payload })
                    .bug(true)
                    .build()
                    .send()
                    .await;
            }
            FrameworkError::CommandStructureMismatch {
                description, ctx, ..
            } => {
                let error = BotError::CommandStructureMismatch {
                    description: description.to_string(),
                };
                Response::builder()
                    .ctx(&ctx.into())
                    .reply("Command structure mismatch. Please wait until discord catches up to a bot update.")
                    .source(error)
                    .bug(true)
                    .build()
                    .send()
                    .await;
            }

            // ---
            // Unreachable with slash commands only.
            // ---
            FrameworkError::UnknownCommand { .. } => {
                error!("Prefix commands are not supported.")
            }
            FrameworkError::UnknownInteraction { interaction, .. } => {
                let name = &interaction.data.name;
                error!("Received unknown interaction: {name}")
            }
            FrameworkError::DynamicPrefix { .. } => {
                error!("Dynamic prefixes are not supported.")
            }
            _ => error!("Unhandled framework error."),
        }
    };

    Box::pin(handler)
}

/// Tell the invoker what they did wrong.
async fn reply_user_error(ctx: &Context<'_>, user_error: UserError, add_info: Option<String>) {
    Response::builder()
        .ctx(ctx)
        .reply(user_error.to_string())
        .source(user_error)
        .maybe_add_info(add_info)
        .build()
        .send()
        .await;
}

/// Sends an ephemeral reply to the [Context] author.
async fn ephemeral_reply(ctx: &Context<'_>, content: impl Into<String>) {
    let reply = CreateReply::default().ephemeral(true).content(content);
    if let Err(e) = ctx.send(reply).await {
        error!("Failed to send ephemeral reply. {e}")
    };
}

/// Sends a notification (via private message) to everyone on [Data::notify_list].
/// If message fails, only log and don't retry.
async fn notify_bug(ctx: &Context<'_>, content: impl Into<String>) {
    let message = CreateMessage::new().content(content);

    for user in &ctx.data().notify_list {
        if let Err(e) = user.direct_message(ctx, message.clone()).await {
            error!("Failed to send bug notification. {e}");
        }
    }
}

/// Who ran what, and where.
fn debug_info(ctx: &Context) -> String {
    let user = &ctx.author().name;
    let cmd = &ctx.command().qualified_name;
    let user_input = ctx.invocation_string();
    let place = ctx
        .guild_id()
        .map_or("a DM".to_string(), |guild| format!("guild {guild}"));
    format!("{user} tried to use {cmd} with {user_input} in {place}.")
}

/// Structured response to errors.
/// Logs at [debug level](tracing::debug), or at [error level](tracing::error) with a
/// [notify_bug] carrying [debug info](debug_info) when `bug` is set.
#[derive(bon::Builder)]
#[builder(on(String, into))]
struct Response<'a> {
    ctx: &'a Context<'a>,
    /// The reason for this reply, usually the error causing the response.
    #[builder(into)]
    source: BotError,
    /// Optional ephemeral reply to user.
    reply: Option<String>,
    /// Additional information to log
    add_info: Option<String>,
    /// Unexpected failure that someone should look at.
    #[builder(default = false)]
    bug: bool,
}

impl Response<'_> {
    async fn send(&self) {
        let ctx = self.ctx;

        let log_message = match &self.add_info {
            Some(info) => format!("{} | {info}", self.source),
            None => self.source.to_string(),
        };
        if self.bug {
            error!("{log_message}");
            let content = format!("Debug Info: {}\n{log_message}", debug_info(ctx));
            notify_bug(ctx, content).await;
        } else {
            debug!("{log_message}");
        }

        if let Some(ref reply) = self.reply {
            ephemeral_reply(ctx, reply).await;
        }
    }
}
