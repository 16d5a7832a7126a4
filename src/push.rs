//! Push channel client for sample-accepted events.
//!
//! The backend broadcasts over Socket.IO v4, so this speaks just enough of
//! the Engine.IO framing on top of a `tokio-tungstenite` WebSocket: answer
//! the open packet with a namespace connect, answer pings, and decode event
//! packets. The canonical event is [`SAMPLE_EVENT`]; the legacy single and
//! batch names are folded into the same path.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, trace, warn};

use crate::IncomingSample;

// ---

/// Event carrying one newly accepted sample.
pub const SAMPLE_EVENT: &str = "new_data_point";
/// Legacy single-sample event name.
pub const LEGACY_SAMPLE_EVENT: &str = "new_sample";
/// Legacy batch event name; payload is an array of samples.
pub const LEGACY_BATCH_EVENT: &str = "new_samples";

/// What the push task reports to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Connected,
    Disconnected,
    Samples(Vec<IncomingSample>),
}

/// One decoded Engine.IO / Socket.IO text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Engine.IO handshake.
    Open,
    /// Engine.IO close.
    Close,
    Ping,
    Pong,
    /// Socket.IO namespace connected.
    Connected,
    /// Socket.IO namespace disconnected by the server.
    Disconnected,
    ConnectError(String),
    Event { name: String, payload: Value },
    Unknown,
}

/// Socket.IO endpoint for a backend base URL.
pub fn push_url(api_url: &str) -> String {
    // ---
    let base = api_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{ws_base}/socket.io/?EIO=4&transport=websocket")
}

pub fn parse_frame(text: &str) -> Frame {
    // ---
    let mut chars = text.chars();
    match chars.next() {
        Some('0') => Frame::Open,
        Some('1') => Frame::Close,
        Some('2') => Frame::Ping,
        Some('3') => Frame::Pong,
        Some('4') => parse_socket_packet(chars.as_str()),
        _ => Frame::Unknown,
    }
}

fn parse_socket_packet(packet: &str) -> Frame {
    // ---
    let mut chars = packet.chars();
    let kind = chars.next();
    let body = strip_namespace(chars.as_str());
    match kind {
        Some('0') => Frame::Connected,
        Some('1') => Frame::Disconnected,
        Some('2') => parse_event_body(body),
        Some('4') => Frame::ConnectError(body.to_string()),
        _ => Frame::Unknown,
    }
}

/// Drop a `/namespace,` prefix and any ack id before the JSON body.
fn strip_namespace(body: &str) -> &str {
    // ---
    let body = if body.starts_with('/') {
        body.split_once(',').map_or("", |(_, rest)| rest)
    } else {
        body
    };
    body.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn parse_event_body(body: &str) -> Frame {
    // ---
    let Ok(Value::Array(mut parts)) = serde_json::from_str::<Value>(body) else {
        return Frame::Unknown;
    };
    if parts.is_empty() {
        return Frame::Unknown;
    }
    let payload = if parts.len() > 1 {
        parts.swap_remove(1)
    } else {
        Value::Null
    };
    match parts.swap_remove(0) {
        Value::String(name) => Frame::Event { name, payload },
        _ => Frame::Unknown,
    }
}

/// Samples carried by an event, or `None` for events we do not consume.
///
/// Elements that are not sample-shaped objects are dropped.
pub fn decode_event(name: &str, payload: Value) -> Option<Vec<IncomingSample>> {
    // ---
    let items = match name {
        SAMPLE_EVENT | LEGACY_SAMPLE_EVENT => vec![payload],
        LEGACY_BATCH_EVENT => match payload {
            Value::Array(items) => items,
            other => vec![other],
        },
        _ => return None,
    };

    Some(
        items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| match serde_json::from_value::<IncomingSample>(item) {
                Ok(sample) => Some(sample),
                Err(e) => {
                    trace!(error = %e, "dropping malformed push sample");
                    None
                }
            })
            .collect(),
    )
}

/// Keep a push connection open for the life of the process.
///
/// Reconnects after `reconnect` whenever the connection drops. Returns when
/// the receiving side of `tx` is gone.
pub async fn run(url: String, reconnect: Duration, tx: mpsc::Sender<PushEvent>) {
    // ---
    loop {
        match run_connection(&url, &tx).await {
            Ok(()) => {}
            Err(ChannelClosed) => {
                debug!("push consumer gone, stopping");
                return;
            }
        }
        tokio::time::sleep(reconnect).await;
    }
}

struct ChannelClosed;

async fn run_connection(url: &str, tx: &mpsc::Sender<PushEvent>) -> Result<(), ChannelClosed> {
    // ---
    info!(url, "Connecting push channel");
    let ws_stream = match connect_async(url).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            warn!(error = %e, "Push channel connect failed");
            return Ok(());
        }
    };
    let (mut write, mut read) = ws_stream.split();
    let mut connected = false;

    while let Some(msg) = read.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                warn!("Push channel closed by server");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                error!(error = %e, "Push channel error");
                break;
            }
        };

        let reply = match parse_frame(text.as_str()) {
            Frame::Open => Some("40"),
            Frame::Ping => Some("3"),
            Frame::Connected => {
                connected = true;
                info!("Push channel connected");
                tx.send(PushEvent::Connected).await.map_err(|_| ChannelClosed)?;
                None
            }
            Frame::Event { name, payload } => {
                match decode_event(&name, payload) {
                    Some(samples) if !samples.is_empty() => {
                        tx.send(PushEvent::Samples(samples))
                            .await
                            .map_err(|_| ChannelClosed)?;
                    }
                    Some(_) => trace!(event = %name, "event without usable samples"),
                    None => trace!(event = %name, "ignoring event"),
                }
                None
            }
            Frame::ConnectError(reason) => {
                warn!(%reason, "Push namespace refused connection");
                break;
            }
            Frame::Disconnected | Frame::Close => break,
            Frame::Pong | Frame::Unknown => None,
        };

        if let Some(reply) = reply {
            if let Err(e) = write.send(Message::Text(reply.into())).await {
                error!(error = %e, "Push channel write failed");
                break;
            }
        }
    }

    warn!("Push channel stream ended");
    if connected {
        tx.send(PushEvent::Disconnected)
            .await
            .map_err(|_| ChannelClosed)?;
    }
    Ok(())
}
