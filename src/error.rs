//! Unified error handling for kockalogger.
//!
//! Each concern gets its own `thiserror` enum with a stable `error_code()`
//! label. The codes appear in logs, in metrics, and inside `error` messages
//! flowing through dispatch, so they must never change meaning.

use crate::model::Failure;
use std::collections::HashMap;
use thiserror::Error;

// ============================================================================
// Parse Errors (decoder + parser)
// ============================================================================

/// Errors raised while decoding a feed line into a typed message.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("line matched neither the edit nor the log grammar")]
    RcLine,

    #[error("no i18n regex matched the log summary")]
    LogSummary,

    #[error("no message mapped for {0}/{1}")]
    UnknownLogAction(String, String),

    #[error("abuse filter summary did not match")]
    AbuseFilter,

    #[error("rights entry is missing old or new groups")]
    MissingGroups,

    #[error("wikifeatures summary did not match")]
    WikiFeatures,

    #[error("discussions payload is not valid JSON: {0}")]
    DiscussionsJson(String),

    #[error("discussions url not recognized: {0}")]
    DiscussionsUrl(String),

    #[error("comment url not recognized: {0}")]
    DiscussionsCommentUrl(String),

    #[error("unknown discussions type: {0}")]
    DiscussionsType(String),

    #[error("malformed newusers line")]
    NewUsers,

    #[error("payload matched no grammar for its channel")]
    #[allow(dead_code)]
    UnknownType,
}

impl ParseError {
    /// Stable code for logs, metrics and `error` messages.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::RcLine => "rcerror",
            Self::LogSummary => "logparsefail",
            Self::UnknownLogAction(_, _) => "logactionunknown",
            Self::AbuseFilter => "afparseerr",
            Self::MissingGroups => "missinggroups",
            Self::WikiFeatures => "wikifeatureserror",
            Self::DiscussionsJson(_) => "discussionsjson",
            Self::DiscussionsUrl(_) => "discussionsurl",
            Self::DiscussionsCommentUrl(_) => "discussionsurl2",
            Self::DiscussionsType(_) => "discussionstype",
            Self::NewUsers => "newuserserror",
            Self::UnknownType => "unknowntype",
        }
    }

    /// Shapes this error into the `error` message body that flows through
    /// dispatch.
    pub fn into_failure(self) -> Failure {
        let mut details = HashMap::new();
        if let Self::UnknownLogAction(log, action) = &self {
            details.insert("log".to_string(), log.clone());
            details.insert("action".to_string(), action.clone());
        }
        Failure {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details,
        }
    }
}

// ============================================================================
// Fetch Errors (message-cache loader + retry fetcher)
// ============================================================================

/// Errors raised while fetching system messages over HTTP.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body was not JSON, usually a captive portal or an HTML
    /// error page in front of the wiki.
    #[error("response was not JSON")]
    Html,

    /// JSON came back but `query.allmessages` was missing.
    #[error("response lacks query.allmessages")]
    Unusual,
}

impl FetchError {
    /// Subcode recorded under the `messagefetch` error family.
    pub fn subcode(&self) -> &'static str {
        match self {
            Self::Http(_) => "fail",
            Self::Html => "html",
            Self::Unusual => "unusual",
        }
    }
}

// ============================================================================
// Enrichment Errors (dispatcher property fetches)
// ============================================================================

/// Errors raised while enriching a message before fan-out.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("thread log query failed: {0}")]
    ThreadLogQuery(#[source] reqwest::Error),

    #[error("no logtype-0 entry in recent changes")]
    ThreadLogNoFind,

    #[error("title query failed: {0}")]
    TitleQuery(#[source] reqwest::Error),

    #[error("title response carried no title")]
    NoTitle,

    #[error("thread parent content query failed: {0}")]
    ThreadInfoQuery(#[source] reqwest::Error),

    #[error("no ac_metadata title in thread parent content")]
    ThreadTitleParse,

    #[error("thread title cache read failed: {0}")]
    CacheThreadTitle(#[source] redis::RedisError),

    #[error("thread title cache write failed: {0}")]
    CacheSetThreadCache(#[source] redis::RedisError),
}

impl EnrichError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ThreadLogQuery(_) => "api-threadlog",
            Self::ThreadLogNoFind => "threadlognofind",
            Self::TitleQuery(_) => "api-titleapi",
            Self::NoTitle => "api-notitle",
            Self::ThreadInfoQuery(_) => "api-threadinfo",
            Self::ThreadTitleParse => "threadtitleparse",
            Self::CacheThreadTitle(_) => "cache-threadtitle",
            Self::CacheSetThreadCache(_) => "cache-setthreadcache",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_codes() {
        assert_eq!(ParseError::RcLine.error_code(), "rcerror");
        assert_eq!(ParseError::LogSummary.error_code(), "logparsefail");
        assert_eq!(
            ParseError::UnknownLogAction("block".into(), "zap".into()).error_code(),
            "logactionunknown"
        );
        assert_eq!(
            ParseError::DiscussionsCommentUrl("x".into()).error_code(),
            "discussionsurl2"
        );
    }

    #[test]
    fn test_unknown_action_failure_details() {
        let failure = ParseError::UnknownLogAction("rights".into(), "zap".into()).into_failure();
        assert_eq!(failure.code, "logactionunknown");
        assert_eq!(failure.details.get("log").map(String::as_str), Some("rights"));
        assert_eq!(failure.details.get("action").map(String::as_str), Some("zap"));
    }

    #[test]
    fn test_fetch_subcodes() {
        assert_eq!(FetchError::Html.subcode(), "html");
        assert_eq!(FetchError::Unusual.subcode(), "unusual");
    }

    #[test]
    fn test_enrich_error_codes() {
        assert_eq!(EnrichError::ThreadLogNoFind.error_code(), "threadlognofind");
        assert_eq!(EnrichError::NoTitle.error_code(), "api-notitle");
        assert_eq!(EnrichError::ThreadTitleParse.error_code(), "threadtitleparse");
    }
}
