//! Platform approval adapters.
//!
//! An adapter is the platform-specific mechanism for posting an approval
//! prompt and parsing the user's response back into a resolution. The
//! engine never talks to a chat platform directly; it resolves an adapter
//! through the [`registry::AdapterRegistry`] and stays platform-agnostic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::approval::{ApprovalRequest, ApprovalStatus};
use crate::models::tool::PlatformContext;

pub mod registry;
pub mod webhook;

pub use registry::AdapterRegistry;
pub use webhook::WebhookAdapter;

// ── Adapter Contract ─────────────────────────────────────────

#[async_trait]
pub trait ApprovalAdapter: Send + Sync {
    /// Whether the platform can render a native approval UI. Platforms
    /// without it are bypassed in favor of the configured fallback.
    fn supports_native_approval(&self) -> bool;

    /// Post a human-readable prompt for the request. May be a no-op network
    /// call in test doubles.
    async fn request_approval(
        &self,
        request: &ApprovalRequest,
        context: &PlatformContext,
    ) -> anyhow::Result<PromptReceipt>;

    /// Parse a raw platform payload (button click, slash command, webhook
    /// callback) into a resolution. `None` means the payload is not an
    /// approval response: ignored, not an error.
    fn handle_approval_response(&self, raw: &serde_json::Value) -> Option<AdapterResponse>;
}

/// What an adapter returns after posting a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptReceipt {
    pub request_id: String,
    /// Platform-side reference to the prompt message, when the platform
    /// hands one back (Slack ts, Telegram message id, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_message_id: Option<String>,
}

/// A platform response parsed into engine terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterResponse {
    pub request_id: String,
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}
