//! Builds the client and framework from a [Config].

mod config;
mod framework;

use crate::serenity;
use crate::BotError;

pub use config::{Config, TrackingConfig};

/// Constructs a [serenity::Client] running the bot's [poise::Framework].
pub(super) async fn client(config: Config) -> Result<serenity::Client, BotError> {
    // Get discord token from config file
    let token = config.token()?.clone();

    // Member events and member listing need GUILD_MEMBERS, invite events come with GUILD_INVITES.
    // See https://discord.com/developers/docs/topics/gateway#gateway-intents
    let intents =
        serenity::GatewayIntents::non_privileged() | serenity::GatewayIntents::GUILD_MEMBERS;

    let client = serenity::ClientBuilder::new(token, intents)
        .framework(framework::framework(config))
        .await?;

    Ok(client)
}
