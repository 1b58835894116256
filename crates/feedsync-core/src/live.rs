//! Push channel adapter. Decodes server notifications into `LiveEvent`s and
//! forwards them, in arrival order, to the feed session.
//!
//! Delivery is best effort: frames that do not decode are dropped, and a
//! closed socket simply ends the stream of events.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::constant::POSTS_EVENT;
use crate::post::{Post, PostId};
use crate::session::LiveSink;
use crate::FeedResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    Created(Post),
    Updated(Post),
    Deleted(PostId),
}

impl LiveEvent {
    pub fn post_id(&self) -> &PostId {
        match self {
            LiveEvent::Created(post) | LiveEvent::Updated(post) => &post.id,
            LiveEvent::Deleted(id) => id,
        }
    }
}

/// What a single text frame turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Transport handshake; the namespace still has to be joined.
    Open,
    /// Keep-alive ping that needs a pong.
    Ping,
    Event(LiveEvent),
    Close,
    Ignored,
}

#[derive(Deserialize)]
struct WireMessage {
    action: String,
    #[serde(default)]
    post: Value,
}

/// Decodes `{ "action": ..., "post": ... }`. For deletes `post` may be the
/// bare id or an object carrying `_id`.
pub fn decode_event(value: Value) -> Option<LiveEvent> {
    let message: WireMessage = serde_json::from_value(value).ok()?;
    match message.action.as_str() {
        "create" => serde_json::from_value(message.post).ok().map(LiveEvent::Created),
        "update" => serde_json::from_value(message.post).ok().map(LiveEvent::Updated),
        "delete" => {
            let id = match &message.post {
                Value::String(id) => id.as_str(),
                Value::Object(fields) => fields.get("_id")?.as_str()?,
                _ => return None,
            };
            Some(LiveEvent::Deleted(PostId::new(id)))
        }
        _ => None,
    }
}

/// Decodes a text frame. Plain JSON messages are accepted as well as
/// socket.io packets (`0` open, `2` ping, `42["posts", {...}]` event).
pub fn decode_frame(text: &str) -> Frame {
    let text = text.trim();
    if text.starts_with('{') {
        return serde_json::from_str(text)
            .ok()
            .and_then(decode_event)
            .map_or(Frame::Ignored, Frame::Event);
    }

    match text.as_bytes() {
        [b'0', ..] => Frame::Open,
        [b'1', ..] => Frame::Close,
        [b'2', ..] => Frame::Ping,
        [b'4', b'1', ..] => Frame::Close,
        [b'4', b'2', ..] => decode_socketio_event(text).map_or(Frame::Ignored, Frame::Event),
        _ => Frame::Ignored,
    }
}

fn decode_socketio_event(packet: &str) -> Option<LiveEvent> {
    // Namespace and ack id, if present, sit before the JSON array.
    let start = packet.find('[')?;
    let args: Vec<Value> = serde_json::from_str(&packet[start..]).ok()?;
    let mut args = args.into_iter();
    if args.next()?.as_str()? != POSTS_EVENT {
        return None;
    }
    decode_event(args.next()?)
}

pub struct LiveChannel;

impl LiveChannel {
    /// Connects once and spawns the reader. There is no reconnect; when the
    /// socket goes away the session keeps working without live events.
    pub async fn connect(url: &Url, sink: LiveSink) -> FeedResult<JoinHandle<()>> {
        let (socket, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        tracing::info!(%url, "live channel connected");
        let (mut write, mut read) = socket.split();

        let handle = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(err) => {
                        tracing::warn!(error = %err, "live channel read failed");
                        break;
                    }
                };

                let reply = match decode_frame(&text) {
                    Frame::Open => Some("40"),
                    Frame::Ping => Some("3"),
                    Frame::Event(event) => {
                        tracing::debug!(id = %event.post_id(), "live event");
                        if !sink.deliver(event) {
                            break;
                        }
                        None
                    }
                    Frame::Close => break,
                    Frame::Ignored => {
                        tracing::debug!(frame = %text, "dropping undecodable frame");
                        None
                    }
                };

                if let Some(reply) = reply {
                    if let Err(err) = write.send(Message::Text(reply.to_string())).await {
                        tracing::warn!(error = %err, "live channel write failed");
                        break;
                    }
                }
            }
            tracing::info!("live channel closed");
        });
        Ok(handle)
    }
}
