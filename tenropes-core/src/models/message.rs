use std::fmt;

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ChannelId;

/// Body of a message. Serializes to the backend's `{"type": ..., "value": ...}` shape,
/// which is also the body of an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Content {
    #[serde(alias = "text", alias = "TEXT")]
    Text(String),
    #[serde(alias = "image", alias = "IMAGE")]
    Image(String),
}

impl Content {
    pub fn value(&self) -> &str {
        match self {
            Content::Text(value) | Content::Image(value) => value,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Content::Image(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Content::Text(_) => "Text",
            Content::Image(_) => "Image",
        }
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Text(text) => write!(f, "{text}"),
            Content::Image(url) => write!(f, "[image] {url}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "WireMessage")]
pub struct Message {
    pub id: Option<i64>,
    pub channel_id: ChannelId,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub content: Content,
}

/// Identity used to recognise the same message arriving twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Id(i64),
    Composite {
        author: String,
        timestamp: i64,
        content: Content,
    },
}

impl Message {
    /// Decode one JSON message as delivered by the live socket.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).with_context(|| format!("malformed message payload: {raw}"))
    }

    pub fn key(&self) -> MessageKey {
        match self.id {
            Some(id) => MessageKey::Id(id),
            None => MessageKey::Composite {
                author: self.author.clone(),
                timestamp: self.timestamp.timestamp_millis(),
                content: self.content.clone(),
            },
        }
    }
}

// The backend has shipped two message shapes:
//   {channel_id, timestamp: <millis>, author: "name", content: {type, value}}
//   {id, channel_id, author: {id, username}, authorId, createdAt: "<iso>", content: "...", type}
#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    id: Option<i64>,
    channel_id: ChannelId,
    author: WireAuthor,
    #[serde(default, alias = "createdAt")]
    timestamp: Option<WireTimestamp>,
    content: WireContent,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireAuthor {
    Name(String),
    Ref { username: String },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Millis(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireContent {
    Tagged(Content),
    Bare(String),
}

impl WireTimestamp {
    fn to_utc(&self) -> anyhow::Result<DateTime<Utc>> {
        match self {
            WireTimestamp::Millis(millis) => Utc
                .timestamp_millis_opt(*millis)
                .single()
                .ok_or_else(|| anyhow!("invalid timestamp {millis}")),
            WireTimestamp::Text(text) => {
                if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                    return Ok(parsed.with_timezone(&Utc));
                }
                // some payloads drop the offset, those are UTC
                NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                    .map(|naive| naive.and_utc())
                    .with_context(|| format!("invalid timestamp {text:?}"))
            }
        }
    }
}

impl TryFrom<WireMessage> for Message {
    type Error = anyhow::Error;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let timestamp = wire
            .timestamp
            .ok_or_else(|| anyhow!("message has no timestamp"))?
            .to_utc()?;

        let author = match wire.author {
            WireAuthor::Name(name) => name,
            WireAuthor::Ref { username } => username,
        };

        let content = match wire.content {
            WireContent::Tagged(content) => content,
            WireContent::Bare(value) => match wire.kind.as_deref() {
                Some(kind) if kind.eq_ignore_ascii_case("image") => Content::Image(value),
                _ => Content::Text(value),
            },
        };

        Ok(Message {
            id: wire.id,
            channel_id: wire.channel_id,
            author,
            timestamp,
            content,
        })
    }
}
