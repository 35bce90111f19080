//! In-app messages with typed content.
//!
//! On the wire a message carries a `content_type` literal next to a `content`
//! object whose shape depends on it. Decoding goes through [`MessageWire`] so
//! the pair becomes a single [`MessageContent`] value and a mismatched body is
//! a decode error rather than a half-filled struct.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Resource, ResourceKind};

crate::wire_enum! {
    /// Discriminator for [`MessageContent`].
    pub enum MessageContentType {
        Text => "text",
        Html => "html",
        Image => "image",
        Video => "video",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextContent {
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlContent {
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageContent {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoContent {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub autoplay: bool,
    #[serde(default)]
    pub muted: bool,
}

/// Message body, one shape per content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(TextContent),
    Html(HtmlContent),
    Image(ImageContent),
    Video(VideoContent),
}

impl MessageContent {
    #[must_use]
    pub const fn content_type(&self) -> MessageContentType {
        match self {
            Self::Text(_) => MessageContentType::Text,
            Self::Html(_) => MessageContentType::Html,
            Self::Image(_) => MessageContentType::Image,
            Self::Video(_) => MessageContentType::Video,
        }
    }
}

/// Call to action attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAction {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub open_externally: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MessageWire", into = "MessageWire")]
pub struct Message {
    pub id: i64,
    pub event: Option<String>,
    pub header: Option<String>,
    pub title: Option<String>,
    pub content: MessageContent,
    pub action: Option<MessageAction>,
    pub read: bool,
    pub important: bool,
    pub interactive: bool,
    pub persistent: bool,
    pub placement: Option<String>,
    pub created_date: Option<DateTime<Utc>>,
}

impl Resource for Message {
    const KIND: ResourceKind = ResourceKind::Message;

    fn id(&self) -> i64 {
        self.id
    }
}

/// Flat wire shape of [`Message`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageWire {
    pub id: i64,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub content_type: MessageContentType,
    pub content: serde_json::Value,
    #[serde(default)]
    pub action: Option<MessageAction>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub important: bool,
    #[serde(default)]
    pub interactive: bool,
    #[serde(default)]
    pub persistent: bool,
    #[serde(default)]
    pub placement: Option<String>,
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
}

impl TryFrom<MessageWire> for Message {
    type Error = String;

    fn try_from(wire: MessageWire) -> Result<Self, Self::Error> {
        let bad_body = |e: serde_json::Error| {
            format!("message {}: invalid {} content: {e}", wire.id, wire.content_type)
        };
        let content = match wire.content_type {
            MessageContentType::Text => {
                MessageContent::Text(serde_json::from_value(wire.content.clone()).map_err(bad_body)?)
            }
            MessageContentType::Html => {
                MessageContent::Html(serde_json::from_value(wire.content.clone()).map_err(bad_body)?)
            }
            MessageContentType::Image => {
                MessageContent::Image(serde_json::from_value(wire.content.clone()).map_err(bad_body)?)
            }
            MessageContentType::Video => {
                MessageContent::Video(serde_json::from_value(wire.content.clone()).map_err(bad_body)?)
            }
            MessageContentType::Unknown => {
                return Err(format!("message {}: unsupported content type", wire.id));
            }
        };

        Ok(Self {
            id: wire.id,
            event: wire.event,
            header: wire.header,
            title: wire.title,
            content,
            action: wire.action,
            read: wire.read,
            important: wire.important,
            interactive: wire.interactive,
            persistent: wire.persistent,
            placement: wire.placement,
            created_date: wire.created_date,
        })
    }
}

impl From<Message> for MessageWire {
    fn from(message: Message) -> Self {
        let content_type = message.content.content_type();
        let content = match message.content {
            MessageContent::Text(c) => serde_json::to_value(c),
            MessageContent::Html(c) => serde_json::to_value(c),
            MessageContent::Image(c) => serde_json::to_value(c),
            MessageContent::Video(c) => serde_json::to_value(c),
        }
        .unwrap_or(serde_json::Value::Null);

        Self {
            id: message.id,
            event: message.event,
            header: message.header,
            title: message.title,
            content_type,
            content,
            action: message.action,
            read: message.read,
            important: message.important,
            interactive: message.interactive,
            persistent: message.persistent,
            placement: message.placement,
            created_date: message.created_date,
        }
    }
}
