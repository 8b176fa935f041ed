//! Invite tracking: snapshots, reconciliation, and everything that keeps the ledgers honest.

pub mod events;
pub mod hooks;
pub mod labels;
pub mod presence;
pub mod reconcile;
pub mod snapshot;
pub mod stats;
pub mod sync;
pub mod upstream;

#[cfg(test)]
pub mod testing;

use url::Url;

use crate::error::UserError;

/// Extract an invite code from a link or a bare code.
///
/// Accepts `discord.gg/CODE`, `discord.com/invite/CODE` and `discordapp.com/invite/CODE`, with or
/// without a scheme.
pub fn parse_invite_code(input: &str) -> Result<String, UserError> {
    let input = input.trim();
    let malformed = || UserError::MalformedInvite {
        input: input.to_string(),
    };

    let code = if input.contains('/') {
        let with_scheme = if input.contains("://") {
            input.to_string()
        } else {
            format!("https://{input}")
        };
        let url = Url::parse(&with_scheme).map_err(|_| malformed())?;
        let host = url.host_str().ok_or_else(malformed)?;
        let host = host.strip_prefix("www.").unwrap_or(host);
        let segments: Vec<&str> = url
            .path_segments()
            .ok_or_else(malformed)?
            .filter(|s| !s.is_empty())
            .collect();

        let code = match (host, segments.as_slice()) {
            ("discord.gg", [code]) => code,
            ("discord.com" | "discordapp.com", ["invite", code]) => code,
            _ => return Err(malformed()),
        };
        code.to_string()
    } else {
        input.to_string()
    };

    let valid = !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(code)
    } else {
        Err(malformed())
    }
}
