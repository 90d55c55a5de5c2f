use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Content part types ───────────────────────────────────────────────────────

/// A single content part in a multi-part message.
///
/// Used for user messages that mix text with images.  Images are represented
/// as data URLs (`data:<mime>;base64,<b64>`) or HTTPS URLs for providers that
/// accept remote references.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { image_url: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(image_url: impl Into<String>) -> Self {
        Self::Image { image_url: image_url.into() }
    }
}

/// The content of a message: plain text for most messages, mixed parts for
/// multimodal user turns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

// ─── Message types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in the conversation history.
///
/// `tool_calls` is populated on assistant messages that request tool
/// invocations; `tool_call_id` back-references the originating call on
/// tool-role result messages.  Both reasoning dialects seen on the wire are
/// carried separately so neither is lost on round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
}

impl Message {
    fn plain(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            reasoning: None,
            reasoning_content: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::plain(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::plain(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, text)
    }

    /// Assistant message that requests tool invocations.  When `reasoning`
    /// is non-empty it is mirrored into both wire dialects.
    pub fn assistant_with_tools(
        text: impl Into<String>,
        tool_calls: Vec<ToolCall>,
        reasoning: impl Into<String>,
    ) -> Self {
        let reasoning = reasoning.into();
        let (r1, r2) = if reasoning.is_empty() {
            (None, None)
        } else {
            (Some(reasoning.clone()), Some(reasoning))
        };
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
            tool_calls,
            tool_call_id: None,
            reasoning: r1,
            reasoning_content: r2,
        }
    }

    pub fn tool_result(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::Text(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(id.into()),
            reasoning: None,
            reasoning_content: None,
        }
    }

    pub fn user_with_parts(parts: Vec<ContentPart>) -> Self {
        let content = if parts.is_empty() {
            MessageContent::Text(String::new())
        } else if parts.len() == 1 {
            if let ContentPart::Text { text } = &parts[0] {
                MessageContent::Text(text.clone())
            } else {
                MessageContent::Parts(parts)
            }
        } else {
            MessageContent::Parts(parts)
        };
        Self {
            role: Role::User,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            reasoning: None,
            reasoning_content: None,
        }
    }

    /// Return the plain text of this message, if it has exactly one text part.
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(t) => Some(t),
            MessageContent::Parts(parts) if parts.len() == 1 => match &parts[0] {
                ContentPart::Text { text } => Some(text),
                _ => None,
            },
            _ => None,
        }
    }
}

/// A structured function-call request emitted by the model.
///
/// `arguments` is the raw JSON argument document exactly as accumulated from
/// the wire; tools parse it when they run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque identifier returned by the model (forwarded verbatim)
    pub id: String,
    pub name: String,
    pub arguments: String,
}

// ─── Conversation entries ─────────────────────────────────────────────────────

/// Record of a completed tool execution attached to its conversation entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionRecord {
    pub tool_name: String,
    pub arguments: String,
    pub output: String,
    pub success: bool,
}

/// One entry in the conversation log.
///
/// Hidden entries are part of the model-facing history but suppressed from
/// user-facing renderings (system reminders, cancellation markers).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub message: Message,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_execution: Option<ToolExecutionRecord>,
}

impl ConversationEntry {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            model: None,
            time: Utc::now(),
            hidden: false,
            tool_execution: None,
        }
    }

    pub fn hidden(message: Message) -> Self {
        Self { hidden: true, ..Self::new(message) }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_tool_execution(mut self, record: ToolExecutionRecord) -> Self {
        self.tool_execution = Some(record);
        self
    }
}

// ─── Streaming deltas ─────────────────────────────────────────────────────────

/// A fragment of a tool call carried by one delta.  Chunks for the same call
/// share an index; ids, names and argument fragments may arrive across many
/// deltas in any split the provider chooses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCallChunk {
    pub index: u32,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// One streamed chunk from the model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallChunk>,
    /// Usage statistics, present on the terminal delta when the provider
    /// reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl Delta {
    pub fn content(text: impl Into<String>) -> Self {
        Self { content: Some(text.into()), ..Default::default() }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self { reasoning: Some(text.into()), ..Default::default() }
    }

    pub fn tool_chunk(index: u32, id: &str, name: &str, arguments: &str) -> Self {
        Self {
            tool_calls: vec![ToolCallChunk {
                index,
                id: id.into(),
                name: name.into(),
                arguments: arguments.into(),
            }],
            ..Default::default()
        }
    }

    pub fn usage(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            usage: Some(Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }),
            ..Default::default()
        }
    }
}

/// Token usage from one turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
