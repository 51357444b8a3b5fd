//! Typed events produced by the parser.
//!
//! Every decoded feed line becomes a [`Message`]: the common wiki identity
//! fields plus a [`Body`] tagged by line kind. Log entries additionally carry
//! a [`LogFamily`] and the family-specific [`LogDetails`] variant, replacing
//! the stringly dispatch of the upstream feed with a `match`-friendly shape.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The three WikiaRC feed channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Rc,
    Discussions,
    NewUsers,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rc => "rc",
            Self::Discussions => "discussions",
            Self::NewUsers => "newusers",
        }
    }
}

/// Wiki farm domains the feed can reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    FandomCom,
    WikiaCom,
    WikiaOrg,
    GamepediaCom,
    GamepediaIo,
    /// `fandom-dev.<tld>` staging farms; the TLD varies.
    FandomDev(String),
}

impl Default for Domain {
    fn default() -> Self {
        Self::FandomCom
    }
}

impl Domain {
    /// Parses a captured domain string. Unknown domains are rejected so the
    /// decoder's grammar and this type can never disagree.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fandom.com" => Some(Self::FandomCom),
            "wikia.com" => Some(Self::WikiaCom),
            "wikia.org" => Some(Self::WikiaOrg),
            "gamepedia.com" => Some(Self::GamepediaCom),
            "gamepedia.io" => Some(Self::GamepediaIo),
            _ => s
                .strip_prefix("fandom-dev.")
                .map(|tld| Self::FandomDev(tld.to_string())),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FandomCom => f.write_str("fandom.com"),
            Self::WikiaCom => f.write_str("wikia.com"),
            Self::WikiaOrg => f.write_str("wikia.org"),
            Self::GamepediaCom => f.write_str("gamepedia.com"),
            Self::GamepediaIo => f.write_str("gamepedia.io"),
            Self::FandomDev(tld) => write!(f, "fandom-dev.{tld}"),
        }
    }
}

/// Recent-changes edit flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditFlag {
    /// `N`: page creation.
    New,
    /// `B`: bot edit.
    Bot,
    /// `M`: minor edit.
    Minor,
    /// `!`: unpatrolled.
    Unpatrolled,
}

impl EditFlag {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'N' => Some(Self::New),
            'B' => Some(Self::Bot),
            'M' => Some(Self::Minor),
            '!' => Some(Self::Unpatrolled),
            _ => None,
        }
    }
}

/// Log families recognized by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogFamily {
    Block,
    Delete,
    Move,
    Protect,
    Rights,
    Upload,
    Patrol,
    AbuseFilter,
    ChatBan,
    UserAvatar,
    NewUsers,
    WikiFeatures,
    Thread,
    /// Fandom's broken-dispatch bucket (an empty log URL, emitted when a
    /// thread is closed). Resolved into [`Self::Thread`] by enrichment.
    Zero,
}

impl LogFamily {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "block" => Some(Self::Block),
            "delete" => Some(Self::Delete),
            "move" => Some(Self::Move),
            "protect" => Some(Self::Protect),
            "rights" => Some(Self::Rights),
            "upload" => Some(Self::Upload),
            "patrol" => Some(Self::Patrol),
            "abusefilter" => Some(Self::AbuseFilter),
            "chatban" => Some(Self::ChatBan),
            "useravatar" => Some(Self::UserAvatar),
            "newusers" => Some(Self::NewUsers),
            "wikifeatures" => Some(Self::WikiFeatures),
            "thread" => Some(Self::Thread),
            "0" => Some(Self::Zero),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Delete => "delete",
            Self::Move => "move",
            Self::Protect => "protect",
            Self::Rights => "rights",
            Self::Upload => "upload",
            Self::Patrol => "patrol",
            Self::AbuseFilter => "abusefilter",
            Self::ChatBan => "chatban",
            Self::UserAvatar => "useravatar",
            Self::NewUsers => "newusers",
            Self::WikiFeatures => "wikifeatures",
            Self::Thread => "thread",
            Self::Zero => "0",
        }
    }
}

/// One `[feature=level] (expiry)` triple from a protection summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionLevel {
    pub feature: String,
    pub level: String,
    pub expiry: String,
}

/// Family-specific structured fields of a log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogDetails {
    Block {
        target: String,
        /// Absent for `unblock`.
        expiry: Option<String>,
        /// Matched flag names; unmatched flags are recorded as `"unknown"`.
        flags: Vec<String>,
        reason: Option<String>,
    },
    Delete {
        page: String,
        reason: Option<String>,
    },
    /// `delete/revision` and `delete/event`.
    RevisionDelete {
        target: String,
        reason: Option<String>,
    },
    Move {
        page: String,
        target: String,
        reason: Option<String>,
    },
    Patrol {
        revision: i64,
        page: String,
    },
    Protect {
        page: String,
        /// Only for `move_prot`.
        target: Option<String>,
        levels: Vec<ProtectionLevel>,
        reason: Option<String>,
    },
    Rights {
        target: String,
        old_groups: Vec<String>,
        new_groups: Vec<String>,
        reason: Option<String>,
    },
    Upload {
        file: String,
        reason: Option<String>,
    },
    Avatar {
        target: String,
    },
    AbuseFilter {
        filter: i64,
        diff: i64,
    },
    WikiFeatures {
        feature: String,
        value: bool,
    },
    ChatBan {
        target: String,
        /// Absent for `chatbanremove`.
        length: Option<String>,
        expires: Option<String>,
        reason: Option<String>,
    },
    /// Account creation entries surfacing through the recent-changes log.
    Registration,
    /// Populated from the `threadlog` enrichment for the `"0"` bucket.
    Thread {
        page: String,
        namespace: i64,
        thread_id: String,
        reason: Option<String>,
        /// Display title from the `threadtitle` enrichment.
        title: Option<String>,
    },
    /// A `"0"`-family entry before enrichment has resolved it.
    Pending,
}

/// Discussions platforms, derived from the event URL shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscussionsPlatform {
    Discussion,
    ArticleComment,
    MessageWall,
}

impl DiscussionsPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discussion => "discussion",
            Self::ArticleComment => "article-comment",
            Self::MessageWall => "message-wall",
        }
    }
}

/// Discussions entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscussionsType {
    Thread,
    Post,
    Reply,
    Report,
}

/// A decoded Discussions event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discussions {
    pub platform: DiscussionsPlatform,
    pub dtype: DiscussionsType,
    pub action: String,
    pub title: String,
    pub snippet: String,
    pub size: i64,
    pub category: String,
    pub url: String,
    /// 19-digit decimal thread id.
    pub thread: String,
    /// 19-digit decimal reply id, when the event targets a reply.
    pub reply: Option<String>,
    /// Parent page for article comments and message walls.
    pub page: Option<String>,
}

/// A decoded recent-changes edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edit {
    pub page: String,
    pub flags: Vec<EditFlag>,
    /// Integer query parameters from the diff URL; `diff` and `oldid` are
    /// the ones consumers read.
    pub params: HashMap<String, i64>,
    /// Signed byte delta.
    pub diff: i64,
    pub summary: String,
    /// Canonical title resolved by the `pagetitle` enrichment.
    pub title: Option<String>,
}

/// A decoded log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Log {
    pub family: LogFamily,
    pub action: String,
    pub details: LogDetails,
}

/// A parse failure that still flows through dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    /// Stable code from the error taxonomy.
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: HashMap<String, String>,
}

/// Line-kind specific payload of a [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Body {
    Edit(Edit),
    Log(Log),
    Discussions(Discussions),
    /// New-user registration from the dedicated feed.
    NewUser,
    Error(Failure),
}

impl Body {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Edit(_) => "edit",
            Self::Log(_) => "log",
            Self::Discussions(_) => "discussions",
            Self::NewUser => "newusers",
            Self::Error(_) => "error",
        }
    }
}

/// A fully decoded feed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Wiki subdomain.
    pub wiki: String,
    pub domain: Domain,
    /// Never empty; an empty capture decodes as `"en"`.
    pub language: String,
    pub user: String,
    /// The original line, kept for debugging.
    pub raw: String,
    pub body: Body,
}

impl Message {
    /// Base URL of the wiki this event belongs to.
    pub fn wiki_url(&self) -> String {
        crate::util::url(&self.wiki, &self.language, &self.domain.to_string())
    }

    pub fn is_error(&self) -> bool {
        matches!(self.body, Body::Error(_))
    }

    /// The stable error code, when this message is a parse failure.
    pub fn error_code(&self) -> Option<&str> {
        match &self.body {
            Body::Error(f) => Some(f.code.as_str()),
            _ => None,
        }
    }
}
