//! Realtime websocket task.
//!
//! The socket runs in a dedicated tokio task.  External code talks to it
//! through a typed command channel; decoded events are fanned out through
//! the [`Hub`].  The wire protocol is the service's Phoenix-style
//! framing: channels are joined per topic, a heartbeat goes out every
//! 30 seconds, and `postgres_changes` / `broadcast` payloads carry the
//! CDC and direct-topic traffic.
//!
//! There is no reconnect or backoff policy here; if the connection
//! drops, the task ends and later commands fail with a closed channel.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::hub::Hub;
use crate::store::{ChangeAction, ChangeEvent};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Commands sent *into* the socket task.
#[derive(Debug)]
pub enum SocketCommand {
    /// Join the CDC channel for a table.
    JoinTable { table: String },
    /// Join a named direct broadcast topic.
    JoinDirect { topic: String },
    /// Publish a payload on a direct topic.
    Broadcast { topic: String, payload: Value },
    /// Gracefully shut the socket down.
    Shutdown,
}

/// One wire frame in either direction.
#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    topic: String,
    event: String,
    payload: Value,
    #[serde(rename = "ref")]
    reference: Option<String>,
}

/// Spawn the websocket task; returns its command sender.
pub fn spawn_socket(config: RemoteConfig, hub: Arc<Hub>) -> mpsc::Sender<SocketCommand> {
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(run(config, hub, rx));
    tx
}

async fn run(config: RemoteConfig, hub: Arc<Hub>, mut commands: mpsc::Receiver<SocketCommand>) {
    let url = config.ws_url();
    let (mut socket, _) = match connect_async(&url).await {
        Ok(pair) => pair,
        Err(e) => {
            warn!(error = %e, "realtime socket connect failed; realtime disabled");
            return;
        }
    };

    debug!("realtime socket connected");

    let mut joined: HashSet<String> = HashSet::new();
    let mut reference: u64 = 0;
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                reference += 1;
                let frame = match command {
                    SocketCommand::JoinTable { table } => {
                        let topic = format!("realtime:public:{table}");
                        if !joined.insert(topic.clone()) {
                            continue;
                        }
                        Frame {
                            topic,
                            event: "phx_join".into(),
                            payload: json!({
                                "config": {
                                    "postgres_changes": [
                                        { "event": "*", "schema": "public", "table": table }
                                    ]
                                }
                            }),
                            reference: Some(reference.to_string()),
                        }
                    }
                    SocketCommand::JoinDirect { topic } => {
                        let wire_topic = format!("realtime:{topic}");
                        if !joined.insert(wire_topic.clone()) {
                            continue;
                        }
                        Frame {
                            topic: wire_topic,
                            event: "phx_join".into(),
                            payload: json!({ "config": { "broadcast": { "self": false } } }),
                            reference: Some(reference.to_string()),
                        }
                    }
                    SocketCommand::Broadcast { topic, payload } => Frame {
                        topic: format!("realtime:{topic}"),
                        event: "broadcast".into(),
                        payload: json!({
                            "type": "broadcast",
                            "event": "message",
                            "payload": payload
                        }),
                        reference: Some(reference.to_string()),
                    },
                    SocketCommand::Shutdown => break,
                };

                if let Err(e) = send_frame(&mut socket, &frame).await {
                    warn!(error = %e, "realtime send failed; socket task ending");
                    break;
                }
            }

            _ = heartbeat.tick() => {
                reference += 1;
                let frame = Frame {
                    topic: "phoenix".into(),
                    event: "heartbeat".into(),
                    payload: json!({}),
                    reference: Some(reference.to_string()),
                };
                if let Err(e) = send_frame(&mut socket, &frame).await {
                    warn!(error = %e, "realtime heartbeat failed; socket task ending");
                    break;
                }
            }

            message = socket.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => handle_frame(&hub, &text),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "realtime socket error; socket task ending");
                        break;
                    }
                    None => {
                        debug!("realtime socket closed by peer");
                        break;
                    }
                }
            }
        }
    }
}

async fn send_frame<S>(socket: &mut S, frame: &Frame) -> Result<(), String>
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let text = serde_json::to_string(frame).map_err(|e| e.to_string())?;
    socket
        .send(Message::Text(text))
        .await
        .map_err(|e| e.to_string())
}

/// Decode one incoming frame and fan it out.
fn handle_frame(hub: &Hub, text: &str) {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "ignoring undecodable realtime frame");
            return;
        }
    };

    match frame.event.as_str() {
        "postgres_changes" => {
            let data = &frame.payload["data"];
            let Some(table) = data["table"].as_str() else { return };
            let Ok(action) = serde_json::from_value::<ChangeAction>(data["type"].clone()) else {
                return;
            };
            let record = match action {
                ChangeAction::Delete => data["old_record"].clone(),
                _ => data["record"].clone(),
            };
            hub.emit(ChangeEvent {
                table: table.to_string(),
                action,
                record,
            });
        }
        "broadcast" => {
            let Some(topic) = frame.topic.strip_prefix("realtime:") else { return };
            hub.emit_direct(topic, frame.payload["payload"].clone());
        }
        // phx_reply / presence / system frames carry nothing we consume.
        _ => {}
    }
}
