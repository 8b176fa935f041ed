//! Bot commands.

mod invites;
mod stats;

use crate::{BotError, Data};

/// Convenient type alias for [poise::Command].
pub type Command = poise::Command<Data, BotError>;

/// Longest embed description Discord accepts.
const DESCRIPTION_LIMIT: usize = 4096;

/// Lists all the implemented commands
pub fn list() -> Vec<Command> {
    vec![invites::invites(), stats::stats()]
}

/// Join `lines` without going over `limit` bytes, noting how many were cut.
fn fit_lines(lines: &[String], limit: usize) -> String {
    let mut out = String::new();
    for (shown, line) in lines.iter().enumerate() {
        let more = format!("\n...and {} more", lines.len() - shown);
        if out.len() + line.len() + 1 + more.len() > limit {
            out.push_str(&more);
            break;
        }
        if shown > 0 {
            out.push('\n');
        }
        out.push_str(line);
    }
    out
}
