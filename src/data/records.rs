//! Records kept in the invite and member ledgers.

use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::serenity::{GuildId, UserId};

/// Label used when an invite has no known creator.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// One tracked invite, keyed by its code in the invite ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRecord {
    /// Creator id, [UNKNOWN_LABEL], or a custom label set by an admin.
    pub source_label: String,
    /// `true` once an admin has overridden the creator label.
    #[serde(default)]
    pub is_custom_label: bool,
    /// The label before it was customised, restored when the custom label is removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_creator: Option<String>,
    /// Last known use count.
    #[serde(default)]
    pub use_count: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: Option<UserId>,
    /// Guild the invite belongs to. Missing on records written by older versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<GuildId>,
    /// `true` once the invite is gone upstream.
    #[serde(default)]
    pub archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<DateTime<Utc>>,
}

impl InviteRecord {
    /// A freshly tracked invite, labelled by its creator.
    pub fn tracked(
        guild_id: Option<GuildId>,
        creator: Option<UserId>,
        use_count: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        let source_label = creator.map_or(UNKNOWN_LABEL.to_string(), |id| id.to_string());
        Self {
            source_label,
            is_custom_label: false,
            original_creator: None,
            use_count,
            created_at,
            created_by: creator,
            guild_id,
            archived: false,
            expired_at: None,
        }
    }

    /// Override the label. The creator label is remembered the first time.
    pub fn set_custom_label(&mut self, label: impl Into<String>) {
        if !self.is_custom_label {
            self.original_creator = Some(std::mem::take(&mut self.source_label));
        }
        self.source_label = label.into();
        self.is_custom_label = true;
    }

    /// Drop the custom label and go back to the creator label.
    /// Returns the removed label, or `None` if there was no custom label.
    pub fn clear_custom_label(&mut self) -> Option<String> {
        if !self.is_custom_label {
            return None;
        }
        let restored = self
            .original_creator
            .take()
            .or_else(|| self.created_by.map(|id| id.to_string()))
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string());
        self.is_custom_label = false;
        Some(std::mem::replace(&mut self.source_label, restored))
    }

    pub fn archive(&mut self, now: DateTime<Utc>) {
        self.archived = true;
        self.expired_at = Some(now);
    }

    /// Clears the archive flag. Returns `true` if it was archived.
    pub fn unarchive(&mut self) -> bool {
        let was_archived = self.archived;
        self.archived = false;
        self.expired_at = None;
        was_archived
    }

    /// The creator behind a non-custom label, if the label is a user id.
    pub fn creator(&self) -> Option<UserId> {
        if self.is_custom_label {
            return self.created_by;
        }
        parse_user_id(&self.source_label).or(self.created_by)
    }

    /// Whether this record is considered part of `guild`.
    /// Records without a guild predate guild tracking and belong everywhere.
    pub fn belongs_to(&self, guild: GuildId) -> bool {
        self.guild_id.map_or(true, |id| id == guild)
    }
}

/// Parses a stored user id, rejecting zero and anything non-numeric.
pub fn parse_user_id(s: &str) -> Option<UserId> {
    s.parse::<std::num::NonZeroU64>()
        .ok()
        .map(|id| UserId::new(id.get()))
}

/// How a member joined, stored as a bare string in the member ledger.
///
/// Invite codes are stored as they are, unless a code reads like one of the sentinels. Those
/// get an `invite:` prefix, which real codes can't contain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JoinSource {
    /// Joined through the invite with this code.
    Invite(String),
    /// No invite use count changed.
    Unknown,
    /// An invite was consumed but it isn't in the invite ledger.
    Untracked,
    /// Already a member when the bot started tracking.
    PreExisting,
}

impl JoinSource {
    const UNKNOWN: &'static str = "unknown";
    const UNTRACKED: &'static str = "untracked";
    const PRE_EXISTING: &'static str = "pre_existing";
    const INVITE_PREFIX: &'static str = "invite:";

    fn is_reserved(code: &str) -> bool {
        matches!(code, Self::UNKNOWN | Self::UNTRACKED | Self::PRE_EXISTING)
            || code.starts_with(Self::INVITE_PREFIX)
    }
}

impl From<String> for JoinSource {
    fn from(value: String) -> Self {
        if let Some(code) = value.strip_prefix(Self::INVITE_PREFIX) {
            return JoinSource::Invite(code.to_string());
        }
        match value.as_str() {
            Self::UNKNOWN => JoinSource::Unknown,
            Self::UNTRACKED => JoinSource::Untracked,
            Self::PRE_EXISTING => JoinSource::PreExisting,
            _ => JoinSource::Invite(value),
        }
    }
}

impl From<JoinSource> for String {
    fn from(value: JoinSource) -> Self {
        match value {
            JoinSource::Invite(code) if JoinSource::is_reserved(&code) => {
                format!("{}{code}", JoinSource::INVITE_PREFIX)
            }
            JoinSource::Invite(code) => code,
            JoinSource::Unknown => JoinSource::UNKNOWN.to_string(),
            JoinSource::Untracked => JoinSource::UNTRACKED.to_string(),
            JoinSource::PreExisting => JoinSource::PRE_EXISTING.to_string(),
        }
    }
}

impl Display for JoinSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinSource::Invite(code) => write!(f, "invite `{code}`"),
            JoinSource::Unknown => write!(f, "an Unknown invite"),
            JoinSource::Untracked => write!(f, "an Untracked invite"),
            JoinSource::PreExisting => write!(f, "an Unknown invite (joined before tracking)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_by(creator: u64) -> InviteRecord {
        InviteRecord::tracked(None, Some(UserId::new(creator)), 0, Utc::now())
    }

    #[test]
    fn custom_label_round_trip_restores_creator() {
        let mut record = record_by(42);
        record.set_custom_label("YouTube");
        record.set_custom_label("Partnership");
        assert!(record.is_custom_label);
        assert_eq!(record.original_creator.as_deref(), Some("42"));

        let removed = record.clear_custom_label();
        assert_eq!(removed.as_deref(), Some("Partnership"));
        assert_eq!(record.source_label, "42");
        assert!(!record.is_custom_label);
        assert!(record.original_creator.is_none());
    }

    #[test]
    fn clearing_without_custom_label_does_nothing() {
        let mut record = record_by(7);
        assert_eq!(record.clear_custom_label(), None);
        assert_eq!(record.source_label, "7");
    }

    #[test]
    fn unknown_creator_keeps_invariant() {
        let mut record = InviteRecord::tracked(None, None, 3, Utc::now());
        assert_eq!(record.source_label, UNKNOWN_LABEL);
        record.set_custom_label("Flyers");
        assert_eq!(record.original_creator.as_deref(), Some(UNKNOWN_LABEL));
        record.clear_custom_label();
        assert_eq!(record.source_label, UNKNOWN_LABEL);
        assert_eq!(record.creator(), None);
    }

    #[test]
    fn archive_and_unarchive() {
        let mut record = record_by(1);
        record.archive(Utc::now());
        assert!(record.archived && record.expired_at.is_some());
        assert!(record.unarchive());
        assert!(!record.archived && record.expired_at.is_none());
        assert!(!record.unarchive());
    }

    #[test]
    fn join_source_sentinels() {
        for (source, text) in [
            (JoinSource::Unknown, "\"unknown\""),
            (JoinSource::Untracked, "\"untracked\""),
            (JoinSource::PreExisting, "\"pre_existing\""),
            (JoinSource::Invite("abc123".into()), "\"abc123\""),
        ] {
            assert_eq!(serde_json::to_string(&source).unwrap(), text);
            let parsed: JoinSource = serde_json::from_str(text).unwrap();
            assert_eq!(parsed, source);
        }
    }

    #[test]
    fn invite_codes_named_like_sentinels() {
        for (code, text) in [
            ("unknown", "\"invite:unknown\""),
            ("untracked", "\"invite:untracked\""),
            ("pre_existing", "\"invite:pre_existing\""),
        ] {
            let source = JoinSource::Invite(code.to_string());
            assert_eq!(serde_json::to_string(&source).unwrap(), text);
            let parsed: JoinSource = serde_json::from_str(text).unwrap();
            assert_eq!(parsed, source);
        }
    }

    #[test]
    fn record_serialises_camel_case() {
        let mut record = record_by(99);
        record.set_custom_label("Reddit");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["sourceLabel"], "Reddit");
        assert_eq!(json["isCustomLabel"], true);
        assert_eq!(json["originalCreator"], "99");
        assert_eq!(json["useCount"], 0);
        assert!(json.get("expiredAt").is_none());
    }

    #[test]
    fn zero_is_not_a_user_id() {
        assert_eq!(parse_user_id("0"), None);
        assert_eq!(parse_user_id("Unknown"), None);
        assert_eq!(parse_user_id("12"), Some(UserId::new(12)));
    }
}
