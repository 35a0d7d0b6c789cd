use std::borrow::Cow;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use super::tool::ToolCall;

/// Role of a message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// Developer instruction (higher priority than user, lower than system)
    Developer,
    /// User turn
    User,
    /// Assistant turn
    Assistant,
    /// Tool result
    Tool,
}

impl Role {
    /// Whether this role carries instructions rather than conversation turns
    pub const fn is_instruction(self) -> bool {
        matches!(self, Self::System | Self::Developer)
    }
}

/// Message in a conversation
///
/// When `items` is non-empty it takes precedence over `content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author
    pub role: Role,
    /// Plain text content
    #[serde(default)]
    pub content: String,
    /// Typed content items
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ContentItem>,
    /// Tool calls requested by the assistant
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Tool call this message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Participant or tool name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    /// Create a text message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            items: Vec::new(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn developer(content: impl Into<String>) -> Self {
        Self::new(Role::Developer, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Tool result answering the call with `tool_call_id`
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    /// Replace the typed content items
    #[must_use]
    pub fn with_items(mut self, items: Vec<ContentItem>) -> Self {
        self.items = items;
        self
    }

    /// Attach assistant tool calls
    #[must_use]
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Set the participant or tool name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Effective content items
    ///
    /// Returns `items` when present, otherwise `content` as a single text
    /// item, or nothing for an empty message.
    pub fn parts(&self) -> Cow<'_, [ContentItem]> {
        if !self.items.is_empty() {
            return Cow::Borrowed(&self.items);
        }
        if self.content.is_empty() {
            return Cow::Owned(Vec::new());
        }
        Cow::Owned(vec![ContentItem::Text {
            text: self.content.clone(),
        }])
    }

    /// Concatenated text of the effective content
    pub fn text(&self) -> Cow<'_, str> {
        if self.items.is_empty() {
            return Cow::Borrowed(&self.content);
        }
        Cow::Owned(
            self.items
                .iter()
                .filter_map(|item| match item {
                    ContentItem::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        )
    }

    /// Whether any effective item is an image or file
    pub fn has_media(&self) -> bool {
        self.items
            .iter()
            .any(|item| matches!(item, ContentItem::Image { .. } | ContentItem::File { .. }))
    }
}

/// Typed content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    /// Text segment
    Text {
        /// The text
        text: String,
    },
    /// Image input
    Image {
        /// Where the image bytes come from
        source: MediaSource,
        /// Resolution hint (e.g. "low", "high")
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    /// Document or other file input
    File {
        /// Where the file bytes come from
        source: MediaSource,
        /// Original file name
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
    /// Provider-specific content passed through verbatim
    Raw {
        /// Wire value
        value: serde_json::Value,
    },
}

impl ContentItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub const fn image(source: MediaSource) -> Self {
        Self::Image { source, detail: None }
    }

    pub const fn file(source: MediaSource) -> Self {
        Self::File { source, filename: None }
    }
}

/// Location of media content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaSource {
    /// Remote URL (`data:` URLs are treated as inline content)
    Url {
        /// The URL
        url: String,
    },
    /// Inline base64 payload
    Base64 {
        /// MIME type (e.g. "image/png")
        media_type: String,
        /// Base64-encoded bytes
        data: String,
    },
}

/// Borrowed, normalized view of a [`MediaSource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaRef<'a> {
    /// Remote URL
    Url(&'a str),
    /// Inline base64 content
    Inline {
        /// MIME type
        media_type: &'a str,
        /// Base64-encoded bytes
        data: &'a str,
    },
}

impl MediaSource {
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }

    /// Inline content from raw bytes
    pub fn from_bytes(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self::Base64 {
            media_type: media_type.into(),
            data: STANDARD.encode(bytes),
        }
    }

    /// Resolve `data:` URLs into inline content
    pub fn resolve(&self) -> MediaRef<'_> {
        match self {
            Self::Url { url } => parse_data_url(url).unwrap_or(MediaRef::Url(url)),
            Self::Base64 { media_type, data } => MediaRef::Inline { media_type, data },
        }
    }

    /// URL form, using a `data:` URL for inline content
    pub fn to_url(&self) -> Cow<'_, str> {
        match self {
            Self::Url { url } => Cow::Borrowed(url),
            Self::Base64 { media_type, data } => Cow::Owned(format!("data:{media_type};base64,{data}")),
        }
    }
}

/// Split `data:<mime>;base64,<payload>`
fn parse_data_url(url: &str) -> Option<MediaRef<'_>> {
    let rest = url.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let media_type = meta.strip_suffix(";base64")?;
    Some(MediaRef::Inline {
        media_type: if media_type.is_empty() { "application/octet-stream" } else { media_type },
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_take_precedence_over_content() {
        let msg = Message::user("ignored").with_items(vec![ContentItem::text("a"), ContentItem::text("b")]);
        assert_eq!(msg.parts().len(), 2);
        assert_eq!(msg.text(), "ab");
    }

    #[test]
    fn empty_message_has_no_parts() {
        assert!(Message::assistant("").parts().is_empty());
        assert_eq!(&*Message::user("hi").parts(), [ContentItem::text("hi")]);
    }

    #[test]
    fn data_url_resolves_to_inline() {
        let source = MediaSource::url("data:image/png;base64,iVBORw0KGgo=");
        assert_eq!(
            source.resolve(),
            MediaRef::Inline {
                media_type: "image/png",
                data: "iVBORw0KGgo=",
            }
        );

        let remote = MediaSource::url("https://example.com/cat.png");
        assert_eq!(remote.resolve(), MediaRef::Url("https://example.com/cat.png"));
    }

    #[test]
    fn from_bytes_encodes_base64() {
        let source = MediaSource::from_bytes("text/plain", b"hello");
        assert_eq!(source.to_url(), "data:text/plain;base64,aGVsbG8=");
    }

    #[test]
    fn role_round_trips_through_strings() {
        assert_eq!(Role::Developer.to_string(), "developer");
        assert_eq!("tool".parse::<Role>().unwrap(), Role::Tool);
    }
}
