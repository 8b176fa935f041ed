//! A Discord bot that welcomes new members and keeps track of which invite brought them in.

mod commands;
mod data;
mod error;
mod log;
mod setup;
mod tracking;

pub use data::Data;
pub use error::BotError;
use poise::serenity_prelude as serenity;
pub use setup::Config;

/// Convenient type alias for [poise::Context].
type Context<'a> = poise::Context<'a, Data, BotError>;

#[tokio::main]
async fn main() -> Result<(), BotError> {
    let config = Config::read()?;

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _guard = log::install_tracing(&config);

    let mut client = setup::client(config).await?;
    client.start().await?;

    Ok(())
}
