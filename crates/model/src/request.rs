use std::fmt::{self, Debug, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::response::ToolCallRequest;

/// A request to be sent to the model provider.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelRequest {
    /// The system instructions.
    pub system: Option<String>,
    /// The transcript, oldest turn first.
    pub messages: Vec<ModelMessage>,
    /// Tools that are available to the model.
    pub tools: Vec<ModelTool>,
}

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The agent, speaking on behalf of the user.
    User,
    /// The model.
    Assistant,
}

/// A complete message (a turn) in the transcript.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelMessage {
    /// Author of this message.
    pub role: Role,
    /// Content blocks, in the order they were produced.
    pub content: Vec<ContentBlock>,
}

impl ModelMessage {
    /// Creates a user message.
    #[inline]
    pub fn user(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }

    /// Creates an assistant message.
    #[inline]
    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// Returns an iterator over the tool call requests in this message.
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallRequest> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolUse(req) => Some(req),
            _ => None,
        })
    }
}

/// One typed unit of message content.
#[derive(Clone, Debug, PartialEq)]
pub enum ContentBlock {
    /// Plain text.
    Text(String),
    /// An encoded image.
    Image(ImageSource),
    /// A tool call requested by the model.
    ToolUse(ToolCallRequest),
    /// The result of a tool call, sent back to the model.
    ToolResult(ToolCallResult),
}

/// The encoding of an image payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    /// JPEG.
    Jpeg,
    /// PNG.
    Png,
}

impl ImageFormat {
    /// Returns the media type of this format.
    #[inline]
    pub fn media_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }
}

/// An encoded bitmap, carried inline as base64.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ImageSource {
    /// The format tag.
    pub format: ImageFormat,
    /// Base64-encoded image bytes.
    pub data: String,
}

impl Debug for ImageSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // Screenshots are large, keep them out of the logs.
        f.debug_struct("ImageSource")
            .field("format", &self.format)
            .field("data", &format_args!("<{} bytes>", self.data.len()))
            .finish()
    }
}

/// The result of calling a tool.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ToolCallResult {
    /// The identifier of the originating tool call request.
    pub id: String,
    /// The result of the tool call.
    pub content: String,
}

/// Describes a tool that can be used by the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelTool {
    /// Name of the tool.
    pub name: String,
    /// Description of the tool.
    pub description: String,
    /// Parameters definition of the tool.
    ///
    /// For most model providers, the parameters should typically be
    /// defined by a [JSON schema](https://json-schema.org/).
    pub parameters: Value,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_tool_calls_in_order() {
        let msg = ModelMessage::assistant(vec![
            ContentBlock::Text("Moving first.".to_owned()),
            ContentBlock::ToolUse(ToolCallRequest {
                id: "toolu_1".to_owned(),
                name: "move_cursor".to_owned(),
                arguments: json!({ "direction": "right", "distance": 50 }),
            }),
            ContentBlock::ToolUse(ToolCallRequest {
                id: "toolu_2".to_owned(),
                name: "click_cursor".to_owned(),
                arguments: json!({}),
            }),
        ]);
        let ids: Vec<_> = msg.tool_calls().map(|req| req.id.as_str()).collect();
        assert_eq!(ids, ["toolu_1", "toolu_2"]);
    }

    #[test]
    fn test_image_debug_hides_payload() {
        let image = ImageSource {
            format: ImageFormat::Jpeg,
            data: "aGVsbG8=".to_owned(),
        };
        let debug = format!("{image:?}");
        assert!(!debug.contains("aGVsbG8="));
        assert!(debug.contains("<8 bytes>"));
        assert_eq!(image.format.media_type(), "image/jpeg");
    }
}
