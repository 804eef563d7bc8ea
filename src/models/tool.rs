use serde::{Deserialize, Serialize};

// ── Tool Call ────────────────────────────────────────────────

/// A named action an agent wants to execute, with its structured input.
///
/// The `name` is what policies match against; the `input` travels along so
/// approval prompts can show a human what the agent is actually about to do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub input: serde_json::Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            input,
        }
    }
}

// ── Platform Context ─────────────────────────────────────────

/// Identifies who and where a tool call originates. Immutable per evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformContext {
    /// Platform the session lives on, e.g. "slack", "telegram", "whatsapp".
    pub platform: String,
    pub user_id: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl PlatformContext {
    pub fn new(
        platform: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            platform: platform.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            channel_id: None,
            thread_id: None,
            chat_id: None,
            metadata: None,
        }
    }
}
