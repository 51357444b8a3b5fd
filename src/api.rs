//! MediaWiki API client.
//!
//! Thin wrapper over `reqwest`: every call is an `action=query` GET against
//! `<base>/api.php` with `format=json` and a millisecond cache buster, sent
//! with the product User-Agent.

use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;

/// `<product> v<version>: <description>`.
pub const USER_AGENT: &str = concat!(
    env!("CARGO_PKG_NAME"),
    " v",
    env!("CARGO_PKG_VERSION"),
    ": ",
    env!("CARGO_PKG_DESCRIPTION"),
);

const API_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http }
    }

    /// Runs an `action=query` call and deserializes the JSON response.
    pub async fn query<T: for<'de> Deserialize<'de>>(
        &self,
        base: &str,
        params: &[(&str, &str)],
    ) -> Result<T, reqwest::Error> {
        self.get(base, params)
            .await?
            .error_for_status()?
            .json()
            .await
    }

    /// Runs an `action=query` call and returns the raw body. Callers that
    /// must tell JSON apart from captive-portal HTML parse it themselves.
    pub async fn query_text(
        &self,
        base: &str,
        params: &[(&str, &str)],
    ) -> Result<String, reqwest::Error> {
        self.get(base, params)
            .await?
            .error_for_status()?
            .text()
            .await
    }

    async fn get(
        &self,
        base: &str,
        params: &[(&str, &str)],
    ) -> Result<reqwest::Response, reqwest::Error> {
        let cb = Utc::now().timestamp_millis().to_string();
        self.http
            .get(format!("{base}/api.php"))
            .query(&[("action", "query"), ("format", "json")])
            .query(params)
            .query(&[("cb", cb.as_str())])
            .send()
            .await
    }
}

// ============================================================================
// Typed responses
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LanguagesResponse {
    pub query: Option<LanguagesQuery>,
}

#[derive(Debug, Deserialize)]
pub struct LanguagesQuery {
    #[serde(default)]
    pub languages: Vec<LanguageEntry>,
}

#[derive(Debug, Deserialize)]
pub struct LanguageEntry {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct AllMessagesResponse {
    pub query: Option<AllMessagesQuery>,
}

#[derive(Debug, Deserialize)]
pub struct AllMessagesQuery {
    #[serde(default)]
    pub allmessages: Vec<MessageEntry>,
}

#[derive(Debug, Deserialize)]
pub struct MessageEntry {
    pub name: String,
    /// The message's current (possibly customized) text.
    #[serde(rename = "*")]
    pub value: Option<String>,
    /// Present when `amprop=default` was requested and the message differs
    /// from (or reports) its default.
    pub default: Option<String>,
}

impl MessageEntry {
    /// The text the cache stores: the default when known, else the
    /// localized value.
    pub fn text(&self) -> Option<&str> {
        self.default.as_deref().or(self.value.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_shape() {
        assert!(USER_AGENT.starts_with("kockalogger v"));
        assert!(USER_AGENT.contains(": "));
    }

    #[test]
    fn test_message_entry_prefers_default() {
        let entry: MessageEntry = serde_json::from_str(
            r#"{"name":"blocklogentry","*":"custom text","default":"default text"}"#,
        )
        .unwrap();
        assert_eq!(entry.text(), Some("default text"));

        let entry: MessageEntry =
            serde_json::from_str(r#"{"name":"blocklogentry","*":"only value"}"#).unwrap();
        assert_eq!(entry.text(), Some("only value"));
    }

    #[test]
    fn test_languages_response_parses() {
        let resp: LanguagesResponse = serde_json::from_str(
            r#"{"query":{"languages":[{"code":"en","*":"English"},{"code":"fr","*":"français"}]}}"#,
        )
        .unwrap();
        let codes: Vec<_> = resp
            .query
            .unwrap()
            .languages
            .iter()
            .map(|l| l.code.clone())
            .collect();
        assert_eq!(codes, vec!["en", "fr"]);
    }
}
