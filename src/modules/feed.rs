//! Structured-log sink: every decoded event, one line each.

use super::{Interest, Module, Property};
use crate::model::{Body, Discussions, Edit, Log, LogDetails, LogFamily, Message};
use crate::util;
use async_trait::async_trait;
use tracing::info;

pub struct FeedModule {
    include_errors: bool,
}

impl FeedModule {
    pub fn new(config: &toml::Value) -> Self {
        Self {
            include_errors: config
                .get("errors")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        }
    }
}

#[async_trait]
impl Module for FeedModule {
    fn name(&self) -> &'static str {
        "feed"
    }

    fn interested(&self, message: &Message) -> Interest {
        match &message.body {
            Body::Error(_) if !self.include_errors => Interest::No,
            // The broken-dispatch bucket is only presentable once resolved
            // into a thread event with its title.
            Body::Log(log) if log.family == LogFamily::Zero => {
                Interest::Enrich(vec![Property::ThreadLog, Property::ThreadTitle])
            }
            _ => Interest::Yes,
        }
    }

    async fn execute(&self, message: &Message) -> anyhow::Result<()> {
        info!(target: "feed", wiki = %message.wiki, "{}", format_message(message));
        Ok(())
    }
}

/// One Markdown-safe line per event.
pub fn format_message(message: &Message) -> String {
    let user = util::escape_markdown(&message.user);
    match &message.body {
        Body::Edit(edit) => format_edit(message, &user, edit),
        Body::Log(log) => format_log(&user, log),
        Body::Discussions(d) => format_discussions(&user, d),
        Body::NewUser => format!("New user **{user}** registered"),
        Body::Error(failure) => format!("Unparsed event ({}): {}", failure.code, failure.message),
    }
}

fn format_edit(message: &Message, user: &str, edit: &Edit) -> String {
    let page = edit.title.as_deref().unwrap_or(&edit.page);
    let link = format!("{}/wiki/{}", message.wiki_url(), util::encode(page));
    let mut line = format!(
        "**{user}** edited [{}]({link}) ({:+})",
        util::escape_markdown(page),
        edit.diff
    );
    if !edit.summary.is_empty() {
        line.push_str(": ");
        line.push_str(&util::escape_markdown(&edit.summary));
    }
    line
}

fn format_log(user: &str, log: &Log) -> String {
    let reason = |r: &Option<String>| {
        r.as_deref()
            .map(|r| format!(": {}", util::escape_markdown(r)))
            .unwrap_or_default()
    };
    match &log.details {
        LogDetails::Block {
            target,
            expiry,
            reason: r,
            ..
        } => match &log.action[..] {
            "unblock" => format!("**{user}** unblocked **{target}**{}", reason(r)),
            _ => {
                let verb = if util::is_ip_range(target) {
                    "rangeblocked"
                } else {
                    "blocked"
                };
                format!(
                    "**{user}** {verb} **{target}** ({}){}",
                    expiry.as_deref().unwrap_or("unknown expiry"),
                    reason(r)
                )
            }
        },
        LogDetails::Delete { page, reason: r } => match &log.action[..] {
            "restore" => format!("**{user}** restored **{page}**{}", reason(r)),
            _ => format!("**{user}** deleted **{page}**{}", reason(r)),
        },
        LogDetails::RevisionDelete { target, reason: r } => {
            format!("**{user}** changed revision visibility on **{target}**{}", reason(r))
        }
        LogDetails::Move {
            page,
            target,
            reason: r,
        } => format!("**{user}** moved **{page}** to **{target}**{}", reason(r)),
        LogDetails::Patrol { revision, page } => {
            format!("**{user}** patrolled revision {revision} of **{page}**")
        }
        LogDetails::Protect {
            page, reason: r, ..
        } => format!("**{user}** changed protection of **{page}**{}", reason(r)),
        LogDetails::Rights {
            target,
            old_groups,
            new_groups,
            reason: r,
        } => format!(
            "**{user}** changed rights of **{target}** from {} to {}{}",
            old_groups.join(", "),
            new_groups.join(", "),
            reason(r)
        ),
        LogDetails::Upload { file, reason: r } => {
            format!("**{user}** uploaded **{file}**{}", reason(r))
        }
        LogDetails::Avatar { target } => {
            format!("**{user}** removed the avatar of **{target}**")
        }
        LogDetails::AbuseFilter { filter, diff } => {
            format!("**{user}** hit abuse filter {filter} (diff {diff})")
        }
        LogDetails::WikiFeatures { feature, value } => {
            format!("**{user}** set wiki feature {feature} to {value}")
        }
        LogDetails::ChatBan {
            target,
            length,
            reason: r,
            ..
        } => match &log.action[..] {
            "chatbanremove" => format!("**{user}** lifted the chat ban of **{target}**{}", reason(r)),
            _ => format!(
                "**{user}** banned **{target}** from chat ({}){}",
                length.as_deref().unwrap_or("unknown length"),
                reason(r)
            ),
        },
        LogDetails::Registration => format!("**{user}** created an account"),
        LogDetails::Thread {
            page,
            title,
            reason: r,
            ..
        } => format!(
            "**{user}** {} the thread **{}** on **{page}**{}",
            log.action,
            title.as_deref().unwrap_or("(untitled)"),
            reason(r)
        ),
        LogDetails::Pending => format!("**{user}** acted on an unresolved thread log"),
    }
}

fn format_discussions(user: &str, d: &Discussions) -> String {
    format!(
        "**{user}** {} a {} {:?} [{}]({}): {}",
        d.action,
        d.platform.as_str(),
        d.dtype,
        util::escape_markdown(&d.title),
        d.url,
        util::escape_markdown(&d.snippet)
    )
}
