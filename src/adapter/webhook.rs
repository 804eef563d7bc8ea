//! Webhook-backed approval adapter.
//!
//! Posts a Slack-compatible prompt to a configured webhook URL and parses
//! the button-callback payload the webhook consumer sends back. The shape
//! works for any platform that can receive an incoming webhook and forward
//! a JSON callback; platform-specific rich formatting stays out of scope.

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::models::approval::{ApprovalRequest, ApprovalStatus};
use crate::models::tool::PlatformContext;

use super::{AdapterResponse, ApprovalAdapter, PromptReceipt};

pub struct WebhookAdapter {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

#[derive(Serialize)]
struct PromptMessage {
    text: String,
}

impl WebhookAdapter {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }

    fn render_prompt(request: &ApprovalRequest, context: &PlatformContext) -> String {
        let input = serde_json::to_string_pretty(&request.tool.input).unwrap_or_default();
        let expires = request
            .expires_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        format!(
            "🚨 *Approval required* 🚨\n\n\
             Agent `{}` wants to run `{}` for {} on {}.\n\
             Policy: {} (risk: {:?})\nRequest ID: `{}`\nExpires: {}\n\
             Input:\n```{}```\n\n\
             Reply with `approve {}` or `deny {}`",
            request.agent_id,
            request.tool.name,
            context.user_id,
            context.platform,
            request.policy.name,
            request.policy.risk_level,
            request.id,
            expires,
            input,
            request.id,
            request.id,
        )
    }
}

#[async_trait]
impl ApprovalAdapter for WebhookAdapter {
    fn supports_native_approval(&self) -> bool {
        true
    }

    async fn request_approval(
        &self,
        request: &ApprovalRequest,
        context: &PlatformContext,
    ) -> anyhow::Result<PromptReceipt> {
        let url = match &self.webhook_url {
            Some(u) => u,
            None => {
                debug!(request_id = %request.id, "no webhook URL configured, skipping prompt");
                return Ok(PromptReceipt {
                    request_id: request.id.clone(),
                    platform_message_id: None,
                });
            }
        };

        let message = PromptMessage {
            text: Self::render_prompt(request, context),
        };
        let resp = self
            .client
            .post(url)
            .json(&message)
            .send()
            .await
            .context("failed to post approval prompt")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("webhook returned error: status={}, body={}", status, body);
        }

        // Incoming webhooks respond with a bare acknowledgement; some
        // gateways echo a message timestamp usable as a reference.
        let message_id = resp.text().await.ok().filter(|body| {
            !body.is_empty() && body != "ok" && body.len() <= 64
        });

        info!(request_id = %request.id, "posted approval prompt via webhook");
        Ok(PromptReceipt {
            request_id: request.id.clone(),
            platform_message_id: message_id,
        })
    }

    fn handle_approval_response(&self, raw: &serde_json::Value) -> Option<AdapterResponse> {
        let request_id = raw.get("request_id")?.as_str()?.to_string();
        let decision = raw.get("decision")?.as_str()?;
        let status = match decision {
            "approve" | "approved" => ApprovalStatus::Approved,
            "deny" | "denied" | "reject" | "rejected" => ApprovalStatus::Denied,
            _ => return None,
        };

        Some(AdapterResponse {
            request_id,
            status,
            resolved_by: raw
                .get("user")
                .and_then(|u| u.as_str())
                .map(str::to_string),
            resolved_at: None,
            metadata: raw.get("metadata").cloned(),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────
