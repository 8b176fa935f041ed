//! Configuration for running this bot.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::num::NonZeroU64;
use std::time::Duration;

use poise::Framework;
use serde::Deserialize;
use serde::Serialize;
use serenity::ChannelId;
use serenity::GuildId;
use serenity::UserId;

use crate::error::ConfigError;
use crate::serenity;
use crate::tracking::hooks::ExpiryMode;

/// The path to the config file
const CONFIG_PATH: &str = "config.toml";

/// Longest validation interval, one year. Larger values are clamped.
const MAX_VALIDATE_INTERVAL_HOURS: u64 = 24 * 365;

/// Settings read from [CONFIG_PATH] that modify bot behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Token needed to use a bot account.
    discord_token: String,

    /// See [LoggingConfig]
    logging: LoggingConfig,

    /// See [TrackingConfig]
    tracking: TrackingConfig,

    /// Useful developer specific configs.
    dev_utils: DevConfig,
}

impl Config {
    /// Tries to read [CONFIG_PATH] to extract a [Config].
    /// If a file doesn't exists, create the default config file and returns error.
    /// If a file exists but is empty, re-write the default values and return error.
    /// If a file exists but is incomplete, show error and don't change files.
    /// If a file exists and is complete, read file to create a config.
    /// If file existance is indeterminent (e.g. missing permissions), return error.
    pub fn read() -> Result<Config, ConfigError> {
        let file = std::fs::read_to_string(CONFIG_PATH);

        match file {
            Ok(content) => {
                if content.trim().is_empty() {
                    write_file(&Config::default())?;
                    Err(ConfigError::InvalidConfig {
                        reason: format!("Empty config file! Rewriting {CONFIG_PATH} ..."),
                    })
                } else {
                    Config::parse(&content)
                }
            }
            Err(file_error) => match file_error.kind() {
                std::io::ErrorKind::NotFound => {
                    let action = format!("Creating {CONFIG_PATH}...");
                    write_file(&Config::default())?;
                    Err(ConfigError::MissingConfig { action_msg: action })
                }
                _ => Err(ConfigError::IoError(file_error)),
            },
        }
    }

    /// Deserialize a config, reporting the path of the offending key on failure.
    fn parse(content: &str) -> Result<Config, ConfigError> {
        let to_toml = toml::Deserializer::new(content);
        serde_path_to_error::deserialize(to_toml).map_err(|error| ConfigError::InvalidConfig {
            reason: error.to_string(),
        })
    }

    /// Basic sanity check for if a token was given.
    pub fn token(&self) -> Result<&String, ConfigError> {
        let default_token = Config::default().discord_token;
        let given_token = &self.discord_token;

        let is_empty = given_token.is_empty();
        let contains_default = given_token.contains(&default_token);

        if !is_empty && !contains_default {
            Ok(&self.discord_token)
        } else {
            Err(ConfigError::InvalidConfig {
                reason: "Missing discord token".to_string(),
            })
        }
    }

    /// Construct a bug notification notify list based on the config.
    /// Wrapper for [NotifyConfig::notify_list]
    pub fn notify_list<U, E>(&self, fw: &Framework<U, E>) -> HashSet<UserId> {
        self.dev_utils.notifications.notify_list(fw)
    }

    pub fn log_dir(&self) -> &str {
        &self.logging.log_dir
    }

    /// Is debug mode enabled for console logs
    pub fn console_debug(&self) -> bool {
        self.logging.console_debug
    }

    /// Is file logging enabled.
    pub fn logs_enabled(&self) -> bool {
        self.logging.logs_enabled
    }

    pub fn dev_guild(&self) -> Option<GuildId> {
        self.dev_utils.dev_guild
    }

    pub fn tracking(&self) -> &TrackingConfig {
        &self.tracking
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: "put_token_here".to_string(),

            logging: LoggingConfig {
                console_debug: false,
                logs_enabled: true,
                log_dir: "logs".to_string(),
            },

            tracking: TrackingConfig::default(),

            dev_utils: DevConfig {
                dev_guild: None,
                notifications: NotifyConfig {
                    enabled: false,
                    add_owners: true,
                    userids: vec![],
                },
            },
        }
    }
}

/// Configs for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LoggingConfig {
    /// Print debug traces to console?
    console_debug: bool,
    /// Enable writing to log file?
    logs_enabled: bool,
    /// Directory to store log files
    log_dir: String,
}

/// How invites and members are tracked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Directory holding the ledger files.
    data_dir: String,
    /// Where join and leave announcements go.
    #[serde(serialize_with = "serialize_opt", deserialize_with = "deserialize_opt")]
    join_leave_channel: Option<ChannelId>,
    /// Hours between validation runs, at most a year. 0 turns periodic validation off.
    validate_interval_hours: u64,
    /// What to do with records of invites that no longer exist.
    expiry_mode: ExpiryMode,
    /// Record members already in a guild as pre-existing on startup.
    backfill_members: bool,
    /// DM new members a welcome message.
    welcome_dm: bool,
}

impl TrackingConfig {
    pub fn data_dir(&self) -> &str {
        &self.data_dir
    }

    pub fn join_leave_channel(&self) -> Option<ChannelId> {
        self.join_leave_channel
    }

    /// `None` if periodic validation is off.
    pub fn validate_interval(&self) -> Option<Duration> {
        match self.validate_interval_hours {
            0 => None,
            hours => Some(Duration::from_secs(hours.min(MAX_VALIDATE_INTERVAL_HOURS) * 60 * 60)),
        }
    }

    pub fn expiry_mode(&self) -> ExpiryMode {
        self.expiry_mode
    }

    pub fn backfill_members(&self) -> bool {
        self.backfill_members
    }

    pub fn welcome_dm(&self) -> bool {
        self.welcome_dm
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            join_leave_channel: None,
            validate_interval_hours: 6,
            expiry_mode: ExpiryMode::Archive,
            backfill_members: true,
            welcome_dm: true,
        }
    }
}

/// Optional configs to enable developer-specific behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DevConfig {
    /// Optional guild to automatically update commands quickly.
    #[serde(serialize_with = "serialize_opt", deserialize_with = "deserialize_opt")]
    dev_guild: Option<GuildId>,
    /// See [NotifyConfig]
    notifications: NotifyConfig,
}

/// Configs for notification behavior when encountering unexpected errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct NotifyConfig {
    /// Enable this behavior or not. (bot sends a private message)
    enabled: bool,
    /// Whether to automatically add owners to the notify list.
    add_owners: bool,
    /// Additional users to add to the notify list.
    userids: Vec<UserId>,
}

impl NotifyConfig {
    /// Construct a bug notification notify list based on the config.
    fn notify_list<U, E>(&self, fw: &Framework<U, E>) -> HashSet<UserId> {
        let mut notify_list = HashSet::new();

        // If disabled, don't add anyone to the list.
        if !self.enabled {
            return notify_list;
        }

        if self.add_owners {
            notify_list.extend(fw.options().owners.iter().copied());
        }
        notify_list.extend(self.userids.iter().copied());

        notify_list
    }
}

/// Write the given config to [CONFIG_PATH].
fn write_file(config: &Config) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidConfig {
        reason: e.to_string(),
    })?;
    std::fs::write(CONFIG_PATH, content).map_err(ConfigError::IoError)
}

fn deserialize_opt<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: From<u64>,
{
    deserializer.deserialize_str(OptVisitor(PhantomData))
}

fn serialize_opt<T, S>(val: &Option<T>, ser: S) -> Result<S::Ok, S::Error>
where
    T: serde::Serialize,
    S: serde::Serializer,
{
    match val {
        Some(v) => v.serialize(ser),
        None => ser.serialize_str(""),
    }
}

/// Reads an id written as a string, `""` being `None`.
struct OptVisitor<T>(PhantomData<T>);

impl<'de, T: From<u64>> serde::de::Visitor<'de> for OptVisitor<T> {
    type Value = Option<T>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a valid id or \"\"")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        match v {
            "" => Ok(None),
            _ => {
                let num: NonZeroU64 = v.parse().map_err(|_| E::custom("not a non-zero u64"))?;
                Ok(Some(T::from(num.get())))
            }
        }
    }
}
