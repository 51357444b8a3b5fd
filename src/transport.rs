//! Inbound IRC feed client.
//!
//! Connects to the WikiaRC server, registers, joins the three feed
//! channels, answers PING, and forwards `(user, channel, line)` triples to
//! the pipeline. Consume-only: nothing is ever posted to the channels.
//! Lines from nicks other than the configured feed bots are dropped here.

use crate::config::ClientConfig;
use crate::model::Channel;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Notifications the pipeline consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Registered,
    Join { channel: Channel },
    Line { channel: Channel, line: String },
    Error { message: String },
}

/// Spawns the feed client; it reconnects up to `retries` times and emits
/// [`TransportEvent::Error`] when it gives up.
pub fn spawn(
    config: ClientConfig,
    tx: mpsc::Sender<TransportEvent>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut attempts = 0u32;
        loop {
            match run_connection(&config, &tx, &mut shutdown).await {
                ConnectionEnd::Shutdown => break,
                ConnectionEnd::Lost(reason) => {
                    attempts += 1;
                    if attempts >= config.retries {
                        let _ = tx
                            .send(TransportEvent::Error {
                                message: format!("Giving up after {attempts} attempts: {reason}"),
                            })
                            .await;
                        break;
                    }
                    warn!(attempt = attempts, reason = %reason, "Feed connection lost, retrying");
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }
        info!("Feed client stopped");
    })
}

enum ConnectionEnd {
    Shutdown,
    Lost(String),
}

async fn run_connection(
    config: &ClientConfig,
    tx: &mpsc::Sender<TransportEvent>,
    shutdown: &mut broadcast::Receiver<()>,
) -> ConnectionEnd {
    let addr = (config.server.as_str(), config.port);
    let stream = tokio::select! {
        _ = shutdown.recv() => return ConnectionEnd::Shutdown,
        result = TcpStream::connect(addr) => match result {
            Ok(stream) => stream,
            Err(e) => return ConnectionEnd::Lost(e.to_string()),
        },
    };
    info!(server = %config.server, port = config.port, "Connected to feed server");

    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(2048));
    let username = config.username.as_deref().unwrap_or(&config.nick);
    let realname = config.realname.as_deref().unwrap_or(&config.nick);
    if framed.send(format!("NICK {}", config.nick)).await.is_err() {
        return ConnectionEnd::Lost("registration write failed".to_string());
    }
    if framed
        .send(format!("USER {username} 0 * :{realname}"))
        .await
        .is_err()
    {
        return ConnectionEnd::Lost("registration write failed".to_string());
    }

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                let _ = framed.send("QUIT :shutting down".to_string()).await;
                return ConnectionEnd::Shutdown;
            }
            next = framed.next() => {
                let line = match next {
                    Some(Ok(line)) => line,
                    Some(Err(e)) => return ConnectionEnd::Lost(e.to_string()),
                    None => return ConnectionEnd::Lost("connection closed".to_string()),
                };
                if let Some(reply) = handle_line(&line, config, tx).await {
                    if framed.send(reply).await.is_err() {
                        return ConnectionEnd::Lost("write failed".to_string());
                    }
                }
            }
        }
    }
}

/// Processes one raw IRC line; returns a protocol reply to send, if any.
async fn handle_line(
    line: &str,
    config: &ClientConfig,
    tx: &mpsc::Sender<TransportEvent>,
) -> Option<String> {
    if let Some(token) = line.strip_prefix("PING ") {
        return Some(format!("PONG {token}"));
    }

    let (nick, command, rest) = split_message(line)?;
    match command {
        "001" => {
            let _ = tx.send(TransportEvent::Registered).await;
            info!("Registered with feed server");
            Some(format!(
                "JOIN {},{},{}",
                config.channels.rc, config.channels.discussions, config.channels.newusers
            ))
        }
        "JOIN" => {
            let name = rest.trim_start_matches(':');
            if nick == config.nick {
                if let Some(channel) = config.channels.channel_of(name) {
                    let _ = tx.send(TransportEvent::Join { channel }).await;
                    info!(channel = %name, "Joined feed channel");
                }
            }
            None
        }
        "PRIVMSG" => {
            let (target, text) = rest.split_once(" :")?;
            let channel = config.channels.channel_of(target.trim())?;
            if nick != config.users.get(channel) {
                debug!(nick = %nick, channel = %target, "Ignoring line from unexpected nick");
                return None;
            }
            let _ = tx
                .send(TransportEvent::Line {
                    channel,
                    line: text.to_string(),
                })
                .await;
            None
        }
        "ERROR" => {
            let _ = tx
                .send(TransportEvent::Error {
                    message: rest.trim_start_matches(':').to_string(),
                })
                .await;
            None
        }
        _ => None,
    }
}

/// Splits `:nick!user@host COMMAND rest` into its parts. Server-sourced
/// messages yield the server name as `nick`.
fn split_message(line: &str) -> Option<(&str, &str, &str)> {
    let (prefix, rest) = if let Some(stripped) = line.strip_prefix(':') {
        stripped.split_once(' ')?
    } else {
        ("", line)
    };
    let nick = prefix.split('!').next().unwrap_or("");
    let (command, params) = match rest.split_once(' ') {
        Some((c, p)) => (c, p),
        None => (rest, ""),
    };
    Some((nick, command, params))
}
