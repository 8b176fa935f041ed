//! Error types.
//!
//! [BotError] is the error type handed to [poise], everything else converts into it.

use std::time::Duration;

use thiserror::Error;

use crate::serenity;

/// Top level error for commands, events and setup.
#[derive(Error, Debug)]
pub enum BotError {
    /// Shown to the user who caused it.
    #[error(transparent)]
    UserError(#[from] UserError),

    #[error(transparent)]
    ConfigError(#[from] ConfigError),

    #[error(transparent)]
    StoreError(#[from] StoreError),

    #[error("Discord error: {0}")]
    Serenity(#[from] serenity::Error),

    #[error("A command check failed. Reason: {reason:?}")]
    CheckFailed { reason: Option<String> },

    #[error("A command panicked! Payload: {payload:?}")]
    Panic { payload: Option<String> },

    #[error("Command structure mismatch: {description}")]
    CommandStructureMismatch { description: String },
}

/// Errors caused by user input, these are replied to instead of reported.
#[derive(Error, Debug)]
pub enum UserError {
    #[error("Missing subcommand! Try one of: {subcmds}")]
    MissingSubcommand { subcmds: String },

    #[error("Couldn't understand the input: {input:?}")]
    BadArgs { input: Option<String> },

    #[error("Slow down! Try again in {} seconds.", remaining_cooldown.as_secs())]
    OnCooldown { remaining_cooldown: Duration },

    #[error("I'm missing permissions: {missing_permissions}")]
    MissingBotPermissions {
        missing_permissions: serenity::Permissions,
    },

    #[error("You're missing permissions: {missing_permissions:?}")]
    MissingUserPermissions {
        missing_permissions: Option<serenity::Permissions>,
    },

    #[error("Only the bot owner can do that.")]
    NotOwner,

    #[error("This only works in a server.")]
    GuildOnly,

    #[error("This only works in direct messages.")]
    DmOnly,

    #[error("This only works in NSFW channels.")]
    NsfwOnly,

    #[error("Invite `{code}` doesn't exist in this server.")]
    InviteNotFound { code: String },

    #[error("Invite `{code}` is not being tracked.")]
    NotTracked { code: String },

    #[error("Invite `{code}` doesn't have a custom name.")]
    NoCustomLabel { code: String },

    #[error("`{input}` is not an invite link or code.")]
    MalformedInvite { input: String },
}

/// Failures reading or writing a ledger file.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Couldn't access ledger '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Ledger '{path}' is malformed: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

/// Problems with the config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing config file. {action_msg}")]
    MissingConfig { action_msg: String },

    #[error("Invalid config: {reason}")]
    InvalidConfig { reason: String },

    #[error("Couldn't read config: {0}")]
    IoError(std::io::Error),
}
