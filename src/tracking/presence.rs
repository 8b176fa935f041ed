//! Rotating presence.

use std::time::Duration;

use crate::serenity;
use crate::serenity::ActivityData;

/// How long each status stays up.
const ROTATE_EVERY: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Watching,
    Playing,
    Listening,
}

const STATUSES: &[(Kind, &str)] = &[
    (Kind::Watching, "new members join"),
    (Kind::Playing, "invite tracking"),
    (Kind::Listening, "invite analytics"),
    (Kind::Watching, "over server growth"),
    (Kind::Watching, "member statistics"),
    (Kind::Watching, "join/leave events"),
];

fn activity(index: usize) -> ActivityData {
    let (kind, text) = STATUSES[index % STATUSES.len()];
    match kind {
        Kind::Watching => ActivityData::watching(text),
        Kind::Playing => ActivityData::playing(text),
        Kind::Listening => ActivityData::listening(text),
    }
}

/// Cycle through [STATUSES] forever.
pub async fn rotate(ctx: serenity::Context) {
    let mut ticker = tokio::time::interval(ROTATE_EVERY);
    for index in 0.. {
        ticker.tick().await;
        let activity = activity(index);
        tracing::trace!("Setting activity to '{}'.", activity.name);
        ctx.set_activity(Some(activity));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serenity::ActivityType;

    #[test]
    fn statuses_wrap_around() {
        assert_eq!(activity(0).name, "new members join");
        assert_eq!(activity(0).kind, ActivityType::Watching);
        assert_eq!(activity(2).kind, ActivityType::Listening);
        assert_eq!(activity(STATUSES.len() + 1).name, "invite tracking");
    }
}
