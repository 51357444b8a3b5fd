//! Discussions feed payloads.
//!
//! The Discussions channel carries JSON objects rather than colored IRC
//! lines. The entity kind and ids are split between the `type` field and
//! the URL: `/f/p/<thread>` and `/f/p/<thread>/r/<reply>` for the
//! Discussions platform proper, `?commentId=` (and `&replyId=`) on a wiki
//! page URL for article comments and message walls.

use super::decoder::{WikiRef, DOMAINS};
use crate::error::ParseError;
use crate::model::{Discussions, DiscussionsPlatform, DiscussionsType};
use crate::util;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

lazy_static! {
    static ref DISCUSSION_URL: Regex = Regex::new(&format!(
        r"^https?://(?P<wiki>[a-z0-9.-]+?)\.(?P<domain>{DOMAINS})/(?:(?P<lang>[a-z-]+)/)?f/p/(?P<thread>\d{{19}})(?:/r/(?P<reply>\d{{19}}))?/?$"
    ))
    .unwrap();
    static ref COMMENT_URL: Regex = Regex::new(&format!(
        r"^https?://(?P<wiki>[a-z0-9.-]+?)\.(?P<domain>{DOMAINS})/(?:(?P<lang>[a-z-]+)/)?wiki/(?P<page>[^?]+)\?commentId=(?P<thread>\d{{19}})(?:&replyId=(?P<reply>\d{{19}}))?$"
    ))
    .unwrap();
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(rename = "type")]
    kind: String,
    action: String,
    url: String,
    #[serde(rename = "userName")]
    user_name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    category: String,
}

/// Decodes one reassembled Discussions JSON payload.
pub fn parse_discussions(payload: &str) -> Result<(WikiRef, String, Discussions), ParseError> {
    let data: Payload = serde_json::from_str(payload)
        .map_err(|e| ParseError::DiscussionsJson(e.to_string()))?;

    let (wiki, platform, thread, reply, page) = parse_url(&data.url)?;

    let dtype = if reply.is_some() {
        DiscussionsType::Reply
    } else {
        match data.kind.as_str() {
            "discussion-thread" => DiscussionsType::Thread,
            "discussion-post" => DiscussionsType::Post,
            "discussion-report" => DiscussionsType::Report,
            other => return Err(ParseError::DiscussionsType(other.to_string())),
        }
    };

    Ok((
        wiki,
        data.user_name,
        Discussions {
            platform,
            dtype,
            action: data.action,
            title: data.title,
            snippet: data.snippet,
            size: data.size,
            category: data.category,
            url: data.url,
            thread,
            reply,
            page,
        },
    ))
}

type ParsedUrl = (
    WikiRef,
    DiscussionsPlatform,
    String,
    Option<String>,
    Option<String>,
);

fn parse_url(url: &str) -> Result<ParsedUrl, ParseError> {
    if url.contains("/f/p/") {
        let caps = DISCUSSION_URL
            .captures(url)
            .ok_or_else(|| ParseError::DiscussionsUrl(url.to_string()))?;
        return Ok((
            wiki_ref(&caps),
            DiscussionsPlatform::Discussion,
            caps["thread"].to_string(),
            caps.name("reply").map(|m| m.as_str().to_string()),
            None,
        ));
    }

    if url.contains("commentId=") {
        let caps = COMMENT_URL
            .captures(url)
            .ok_or_else(|| ParseError::DiscussionsCommentUrl(url.to_string()))?;
        let page = util::decode(&caps["page"]);
        let platform = if page.starts_with("Message Wall:") {
            DiscussionsPlatform::MessageWall
        } else {
            DiscussionsPlatform::ArticleComment
        };
        return Ok((
            wiki_ref(&caps),
            platform,
            caps["thread"].to_string(),
            caps.name("reply").map(|m| m.as_str().to_string()),
            Some(page),
        ));
    }

    Err(ParseError::DiscussionsUrl(url.to_string()))
}

fn wiki_ref(caps: &regex::Captures<'_>) -> WikiRef {
    let language = caps
        .name("lang")
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("en");
    WikiRef {
        wiki: caps["wiki"].to_string(),
        domain: caps["domain"].to_string(),
        language: language.to_string(),
    }
}
