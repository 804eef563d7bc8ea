//! The policy engine: tool-call evaluation and approval orchestration.
//!
//! Evaluation is synchronous apart from store round-trips. Approval is the
//! one genuinely concurrent operation: the caller suspends on a one-shot
//! channel keyed by request id while a timer races it. Whichever path
//! removes the pending entry first wins, so a result is delivered at most
//! once and the losing path finds the store already terminal.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapter::AdapterRegistry;
use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::models::approval::{
    ApprovalGrant, ApprovalRequest, ApprovalRequestPatch, ApprovalResult, ApprovalStatus,
    GrantFilter, GrantType, SYSTEM_RESOLVER,
};
use crate::models::policy::{
    default_policies, PermissionPolicy, PolicyAction, PolicyDecision,
};
use crate::models::tool::{PlatformContext, ToolCall};
use crate::pattern::PatternSet;
use crate::store::ApprovalStore;

// ── Engine ───────────────────────────────────────────────────

/// Cheap to clone; all clones share the same pending-waiter map.
#[derive(Clone)]
pub struct PolicyEngine {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn ApprovalStore>,
    registry: AdapterRegistry,
    config: EngineConfig,
    /// request id → waiter for requests this engine is blocked on.
    pending: DashMap<String, oneshot::Sender<ApprovalResult>>,
    /// policy id → compiled patterns, refreshed when a policy's patterns change.
    matchers: DashMap<String, Arc<PatternSet>>,
}

impl PolicyEngine {
    pub fn new(
        store: Arc<dyn ApprovalStore>,
        registry: AdapterRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                registry,
                config,
                pending: DashMap::new(),
                matchers: DashMap::new(),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn ApprovalStore> {
        &self.inner.store
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.inner.registry
    }

    /// Number of approval requests this engine is currently waiting on.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    // ── Evaluation ───────────────────────────────────────────

    /// Evaluate a tool call against the merged policy table.
    ///
    /// Scans in descending priority; the first enabled policy whose
    /// pattern, platform filter, and agent filter all match is effective.
    /// No match is an implicit allow.
    pub async fn evaluate_tool_call(
        &self,
        tool: &ToolCall,
        context: &PlatformContext,
        agent_id: &str,
    ) -> Result<PolicyDecision, EngineError> {
        let policies = self.load_policies().await?;
        let now = Utc::now();

        for policy in &policies {
            if !policy.enabled {
                continue;
            }
            if let Some(platforms) = &policy.platforms {
                if !platforms.iter().any(|p| p == &context.platform) {
                    continue;
                }
            }
            if let Some(agents) = &policy.agent_ids {
                if !agents.iter().any(|a| a == agent_id) {
                    continue;
                }
            }
            if !self.matcher_for(policy).matches(&tool.name) {
                continue;
            }

            debug!(
                tool = %tool.name,
                policy = %policy.id,
                action = ?policy.action,
                "policy matched"
            );
            return match policy.action {
                PolicyAction::Allow | PolicyAction::Deny => {
                    Ok(PolicyDecision::from_policy(policy.action, policy))
                }
                PolicyAction::Ask => {
                    // per_call approvals are never grant-cached
                    let Some(grant_type) = GrantType::for_granularity(policy.granularity) else {
                        return Ok(PolicyDecision::from_policy(PolicyAction::Ask, policy));
                    };
                    let grants = self
                        .inner
                        .store
                        .list_approval_grants(GrantFilter {
                            session_id: context.session_id.clone(),
                            user_id: context.user_id.clone(),
                            grant_type: Some(grant_type),
                            grant_value: Some(policy.id.clone()),
                        })
                        .await
                        .map_err(EngineError::Store)?;
                    match grants.into_iter().find(|g| !g.is_expired(now)) {
                        Some(grant) => {
                            debug!(policy = %policy.id, grant = %grant.id, "reusing grant");
                            Ok(PolicyDecision::granted(policy, grant))
                        }
                        None => Ok(PolicyDecision::from_policy(PolicyAction::Ask, policy)),
                    }
                }
            };
        }

        Ok(PolicyDecision::implicit_allow())
    }

    /// Stored policies overlaid on the built-in table by id, sorted by
    /// priority descending with ties broken by policy id ascending.
    async fn load_policies(&self) -> Result<Vec<PermissionPolicy>, EngineError> {
        let stored = self
            .inner
            .store
            .list_policies()
            .await
            .map_err(EngineError::Store)?;

        let mut merged: BTreeMap<String, PermissionPolicy> = default_policies()
            .iter()
            .cloned()
            .map(|p| (p.id.clone(), p))
            .collect();
        for policy in stored {
            merged.insert(policy.id.clone(), policy);
        }

        let mut policies: Vec<PermissionPolicy> = merged.into_values().collect();
        policies.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        Ok(policies)
    }

    fn matcher_for(&self, policy: &PermissionPolicy) -> Arc<PatternSet> {
        if let Some(existing) = self.inner.matchers.get(&policy.id) {
            if existing.sources() == policy.tool_patterns.as_slice() {
                return existing.value().clone();
            }
        }
        let compiled = Arc::new(PatternSet::compile(&policy.tool_patterns));
        self.inner
            .matchers
            .insert(policy.id.clone(), compiled.clone());
        compiled
    }

    // ── Approval Orchestration ───────────────────────────────

    /// Create an approval request, prompt the resolved platform, and wait
    /// for the human (or the timeout) to decide.
    ///
    /// Fail-closed cases return a well-formed denied result rather than an
    /// error: a platform without a registered adapter never blocks a call
    /// open-ended, it denies it.
    pub async fn request_approval(
        &self,
        tool: &ToolCall,
        context: &PlatformContext,
        policy: &PermissionPolicy,
        agent_id: &str,
    ) -> Result<ApprovalResult, EngineError> {
        let request_id = Uuid::new_v4().to_string();
        let platform = self.resolve_platform(&context.platform);
        let wait_ms = policy
            .timeout_ms
            .unwrap_or(self.inner.config.default_timeout_ms);
        let now = Utc::now();
        // expires_at follows the policy's own timeout; the engine-wide
        // default bounds the wait but is not persisted, so grants issued
        // under a no-timeout policy never expire.
        let expires_at = policy
            .timeout_ms
            .map(|ms| now + chrono::Duration::milliseconds(ms as i64));

        let request = ApprovalRequest {
            id: request_id.clone(),
            session_id: context.session_id.clone(),
            platform: platform.clone(),
            user_id: context.user_id.clone(),
            agent_id: agent_id.to_string(),
            tool: tool.clone(),
            policy: policy.clone(),
            status: ApprovalStatus::Pending,
            created_at: now,
            resolved_at: None,
            resolved_by: None,
            platform_message_id: None,
            expires_at,
        };
        self.inner
            .store
            .create_approval_request(request.clone())
            .await
            .map_err(EngineError::Store)?;
        info!(
            request_id = %request_id,
            platform = %platform,
            tool = %tool.name,
            policy = %policy.id,
            "approval request created"
        );

        let Some(adapter) = self.inner.registry.get(&platform) else {
            warn!(
                request_id = %request_id,
                platform = %platform,
                "no approval adapter registered, failing closed"
            );
            let denied = ApprovalResult::denied(
                &request_id,
                SYSTEM_RESOLVER,
                format!("no approval adapter registered for platform '{platform}'"),
            );
            return self.resolve_approval(&request_id, denied).await;
        };

        // Register the waiter before prompting so a response that arrives
        // while the prompt call is still in flight has somewhere to land.
        let (tx, mut rx) = oneshot::channel();
        self.inner.pending.insert(request_id.clone(), tx);

        let receipt = match adapter.request_approval(&request, context).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.inner.pending.remove(&request_id);
                return Err(EngineError::Adapter(e));
            }
        };
        if let Some(message_id) = receipt.platform_message_id {
            if let Err(e) = self
                .inner
                .store
                .update_approval_request(
                    &request_id,
                    ApprovalRequestPatch {
                        platform_message_id: Some(message_id),
                        ..Default::default()
                    },
                )
                .await
            {
                self.inner.pending.remove(&request_id);
                return Err(EngineError::Store(e));
            }
        }

        let sleep = tokio::time::sleep(Duration::from_millis(wait_ms));
        tokio::pin!(sleep);
        tokio::select! {
            delivered = &mut rx => match delivered {
                Ok(result) => Ok(result),
                Err(_) => Ok(self.channel_closed(&request_id)),
            },
            _ = &mut sleep => {
                if self.inner.pending.remove(&request_id).is_some() {
                    // Timer won the race; nobody else can deliver now.
                    info!(request_id = %request_id, "approval request timed out");
                    self.persist_resolution(&request_id, ApprovalResult::expired(&request_id))
                        .await
                } else {
                    // A resolver claimed the entry just before the timer
                    // fired; its result is already on the way.
                    match rx.await {
                        Ok(result) => Ok(result),
                        Err(_) => Ok(self.channel_closed(&request_id)),
                    }
                }
            }
        }
    }

    /// Resolve a pending request to a terminal status and wake its waiter.
    ///
    /// Idempotent: an already-terminal request is left untouched and its
    /// stored outcome is returned; a request missing from the store fails
    /// closed to denied.
    pub async fn resolve_approval(
        &self,
        request_id: &str,
        result: ApprovalResult,
    ) -> Result<ApprovalResult, EngineError> {
        let resolved = self.persist_resolution(request_id, result).await?;
        if let Some((_, tx)) = self.inner.pending.remove(request_id) {
            let _ = tx.send(resolved.clone());
        }
        Ok(resolved)
    }

    /// Route a raw platform payload through the platform's adapter and, if
    /// it parses into a resolution, the regular resolve path. Unparseable
    /// or adapter-less payloads are ignored.
    pub async fn handle_platform_response(
        &self,
        platform: &str,
        raw: &serde_json::Value,
    ) -> Result<Option<ApprovalResult>, EngineError> {
        let Some(adapter) = self.inner.registry.get(platform) else {
            debug!(platform = %platform, "response for platform without adapter, ignoring");
            return Ok(None);
        };
        let Some(response) = adapter.handle_approval_response(raw) else {
            debug!(platform = %platform, "payload is not an approval response, ignoring");
            return Ok(None);
        };

        let request_id = response.request_id.clone();
        let result = ApprovalResult {
            request_id: request_id.clone(),
            status: response.status,
            resolved_by: response.resolved_by,
            resolved_at: response.resolved_at,
            reason: None,
        };
        self.resolve_approval(&request_id, result).await.map(Some)
    }

    /// Drop every cached grant for a session/user pair.
    pub async fn revoke_grants(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<u64, EngineError> {
        let removed = self
            .inner
            .store
            .delete_approval_grants(GrantFilter {
                session_id: session_id.to_string(),
                user_id: user_id.to_string(),
                grant_type: None,
                grant_value: None,
            })
            .await
            .map_err(EngineError::Store)?;
        if removed > 0 {
            info!(session_id, user_id, removed, "revoked approval grants");
        }
        Ok(removed)
    }

    // ── Internals ────────────────────────────────────────────

    fn resolve_platform(&self, platform: &str) -> String {
        if self.inner.registry.supports_native_approval(platform) {
            platform.to_string()
        } else {
            debug!(
                platform = %platform,
                fallback = %self.inner.config.fallback_platform,
                "platform lacks native approval UI, using fallback"
            );
            self.inner.config.fallback_platform.clone()
        }
    }

    fn channel_closed(&self, request_id: &str) -> ApprovalResult {
        warn!(request_id = %request_id, "approval channel closed without a result");
        ApprovalResult::denied(
            request_id,
            SYSTEM_RESOLVER,
            "approval channel closed without a result",
        )
    }

    /// Persist a terminal status and issue a grant when warranted. The
    /// terminal-status check against the store is what keeps repeated and
    /// racing resolutions idempotent.
    async fn persist_resolution(
        &self,
        request_id: &str,
        mut result: ApprovalResult,
    ) -> Result<ApprovalResult, EngineError> {
        let existing = self
            .inner
            .store
            .get_approval_request(request_id)
            .await
            .map_err(EngineError::Store)?;
        let Some(request) = existing else {
            warn!(request_id = %request_id, "resolution for unknown request, failing closed");
            return Ok(ApprovalResult::denied(
                request_id,
                SYSTEM_RESOLVER,
                "approval request not found",
            ));
        };
        if request.status.is_terminal() {
            debug!(
                request_id = %request_id,
                status = ?request.status,
                "request already terminal, resolution is a no-op"
            );
            return Ok(ApprovalResult::from_terminal(&request));
        }

        result.request_id = request_id.to_string();
        if result.resolved_at.is_none() {
            result.resolved_at = Some(Utc::now());
        }
        self.inner
            .store
            .update_approval_request(
                request_id,
                ApprovalRequestPatch {
                    status: Some(result.status),
                    resolved_at: result.resolved_at,
                    resolved_by: result.resolved_by.clone(),
                    platform_message_id: None,
                },
            )
            .await
            .map_err(EngineError::Store)?;

        if result.status == ApprovalStatus::Approved {
            if let Some(grant_type) = GrantType::for_granularity(request.policy.granularity) {
                // The grant inherits the request's expiry so it cannot
                // outlive the approval window it was issued under.
                let grant = ApprovalGrant {
                    id: Uuid::new_v4().to_string(),
                    session_id: request.session_id.clone(),
                    user_id: request.user_id.clone(),
                    grant_type,
                    grant_value: request.policy.id.clone(),
                    expires_at: request.expires_at,
                    created_at: Utc::now(),
                };
                info!(
                    request_id = %request_id,
                    grant = %grant.id,
                    grant_type = ?grant_type,
                    "issuing approval grant"
                );
                self.inner
                    .store
                    .create_approval_grant(grant)
                    .await
                    .map_err(EngineError::Store)?;
            }
        }

        info!(
            request_id = %request_id,
            status = ?result.status,
            resolved_by = ?result.resolved_by,
            "approval request resolved"
        );
        Ok(result)
    }
}

// ── Tests ────────────────────────────────────────────────────
