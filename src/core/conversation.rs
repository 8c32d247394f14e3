use serde::{Deserialize, Serialize};
use std::fmt;

/// Rendered in place of the last user utterance when the window holds none.
pub const UNKNOWN_LAST_USER: &str = "(unknown last user message)";

/// Speaker of a chat turn. Unrecognised roles are kept verbatim so they can
/// still be rendered into the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    #[default]
    User,
    Assistant,
    System,
    Tool,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
            Role::Other(s) => s,
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" | "" => Role::User,
            "assistant" => Role::Assistant,
            "system" => Role::System,
            "tool" => Role::Tool,
            _ => Role::Other(s),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Caller-owned request for one analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationInput {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub user_comment: Option<String>,
    #[serde(default)]
    pub task_hint: Option<String>,
}

impl ConversationInput {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            user_comment: None,
            task_hint: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.user_comment = Some(comment.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.task_hint = Some(hint.into());
        self
    }
}

/// Trailing slice of a conversation plus the most recent user utterance in it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationWindow<'a> {
    pub trimmed: &'a [ChatMessage],
    pub last_user_content: String,
}

impl<'a> ConversationWindow<'a> {
    /// Keeps the last `max_size` messages, dropping the oldest first.
    pub fn new(messages: &'a [ChatMessage], max_size: usize) -> Self {
        let start = messages.len().saturating_sub(max_size);
        let trimmed = &messages[start..];

        let last_user_content = trimmed
            .iter()
            .rev()
            .find(|m| m.role == Role::User && !m.content.is_empty())
            .map(|m| m.content.trim())
            .unwrap_or(UNKNOWN_LAST_USER)
            .to_string();

        Self {
            trimmed,
            last_user_content,
        }
    }

    /// `ROLE: content` lines in chronological order; blank turns are skipped.
    pub fn transcript(&self) -> String {
        self.trimmed
            .iter()
            .filter_map(|m| {
                let content = m.content.trim();
                if content.is_empty() {
                    None
                } else {
                    Some(format!("{}: {}", m.role.as_str().to_uppercase(), content))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
