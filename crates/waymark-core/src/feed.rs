//! Live update feed
//!
//! The server pushes `{type, payload}` notifications over a websocket after
//! an authorization message. Messages are observed and logged; they are not
//! applied to the collection.

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::models::Objective;
use crate::remote::RemoteError;
use crate::session::Session;

const FEED_BUFFER: usize = 64;

/// Kind of change announced by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedKind {
    Created,
    Updated,
    Other(String),
}

impl From<&str> for FeedKind {
    fn from(value: &str) -> Self {
        match value {
            "created" => Self::Created,
            "updated" => Self::Updated,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One notification from the feed
#[derive(Debug, Clone, PartialEq)]
pub struct FeedMessage {
    pub kind: FeedKind,
    pub payload: Option<Objective>,
}

#[derive(Debug, Deserialize)]
struct RawFeedMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct AuthorizationMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    payload: AuthorizationPayload<'a>,
}

#[derive(Debug, Serialize)]
struct AuthorizationPayload<'a> {
    token: &'a str,
}

/// Decode a text frame; payloads that are not objectives are kept as `None`
pub fn parse_message(text: &str) -> Result<FeedMessage> {
    let raw: RawFeedMessage = serde_json::from_str(text)?;
    let payload = serde_json::from_value::<Objective>(raw.payload).ok();
    Ok(FeedMessage {
        kind: FeedKind::from(raw.kind.as_str()),
        payload,
    })
}

fn authorization_frame(session: &Session) -> Result<String> {
    Ok(serde_json::to_string(&AuthorizationMessage {
        kind: "authorization",
        payload: AuthorizationPayload {
            token: &session.token,
        },
    })?)
}

fn feed_unreachable(error: impl std::fmt::Display) -> Error {
    Error::Remote(RemoteError::Unreachable(error.to_string()))
}

/// Open subscription to the feed
pub struct FeedSubscription {
    pub messages: mpsc::Receiver<FeedMessage>,
    task: JoinHandle<()>,
}

impl FeedSubscription {
    /// Stop reading and close the socket
    pub fn close(self) {
        self.task.abort();
    }
}

/// Connect to `url`, authorize with the session token and forward messages
/// until the socket closes or `cancel` fires.
pub async fn subscribe(
    url: &str,
    session: &Session,
    cancel: CancellationToken,
) -> Result<FeedSubscription> {
    let (socket, _) = connect_async(url)
        .await
        .map_err(feed_unreachable)?;
    tracing::debug!("Feed socket opened at {url}");
    let (mut write, mut read) = socket.split();

    write
        .send(Message::Text(authorization_frame(session)?))
        .await
        .map_err(feed_unreachable)?;

    let (tx, messages) = mpsc::channel(FEED_BUFFER);
    let task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                () = cancel.cancelled() => break,
                frame = read.next() => frame,
            };
            match frame {
                Some(Ok(Message::Text(text))) => match parse_message(&text) {
                    Ok(message) => {
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => tracing::warn!("Ignoring undecodable feed message: {error}"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    tracing::warn!("Feed socket error: {error}");
                    break;
                }
            }
        }
        let _ = write.close().await;
        tracing::debug!("Feed socket closed");
    });

    Ok(FeedSubscription { messages, task })
}
