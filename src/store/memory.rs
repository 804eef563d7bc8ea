//! In-memory reference store.
//!
//! Backs the engine's own correctness requirements and tests. Per-entry
//! writes go through DashMap shards, so concurrent updates to the same
//! request id serialize on the entry and the last write wins on
//! overlapping fields.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::models::approval::{
    ApprovalGrant, ApprovalRequest, ApprovalRequestFilter, ApprovalRequestPatch, GrantFilter,
};
use crate::models::policy::PermissionPolicy;

use super::ApprovalStore;

#[derive(Debug, Default)]
pub struct MemoryStore {
    policies: DashMap<String, PermissionPolicy>,
    requests: DashMap<String, ApprovalRequest>,
    grants: DashMap<String, ApprovalGrant>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stored policy (overlays the built-in with the same id at
    /// evaluation time).
    pub fn upsert_policy(&self, policy: PermissionPolicy) {
        self.policies.insert(policy.id.clone(), policy);
    }

    pub fn remove_policy(&self, id: &str) -> Option<PermissionPolicy> {
        self.policies.remove(id).map(|(_, p)| p)
    }
}

#[async_trait]
impl ApprovalStore for MemoryStore {
    async fn list_policies(&self) -> anyhow::Result<Vec<PermissionPolicy>> {
        Ok(self.policies.iter().map(|e| e.value().clone()).collect())
    }

    async fn create_approval_request(&self, request: ApprovalRequest) -> anyhow::Result<()> {
        self.requests.insert(request.id.clone(), request);
        Ok(())
    }

    async fn update_approval_request(
        &self,
        id: &str,
        patch: ApprovalRequestPatch,
    ) -> anyhow::Result<Option<ApprovalRequest>> {
        let Some(mut entry) = self.requests.get_mut(id) else {
            return Ok(None);
        };
        let request = entry.value_mut();
        if let Some(status) = patch.status {
            request.status = status;
        }
        if let Some(resolved_at) = patch.resolved_at {
            request.resolved_at = Some(resolved_at);
        }
        if let Some(resolved_by) = patch.resolved_by {
            request.resolved_by = Some(resolved_by);
        }
        if let Some(message_id) = patch.platform_message_id {
            request.platform_message_id = Some(message_id);
        }
        Ok(Some(request.clone()))
    }

    async fn get_approval_request(&self, id: &str) -> anyhow::Result<Option<ApprovalRequest>> {
        Ok(self.requests.get(id).map(|e| e.value().clone()))
    }

    async fn list_approval_requests(
        &self,
        filter: ApprovalRequestFilter,
    ) -> anyhow::Result<Vec<ApprovalRequest>> {
        let mut matched: Vec<ApprovalRequest> = self
            .requests
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matched)
    }

    async fn list_approval_grants(
        &self,
        filter: GrantFilter,
    ) -> anyhow::Result<Vec<ApprovalGrant>> {
        let mut matched: Vec<ApprovalGrant> = self
            .grants
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matched)
    }

    async fn create_approval_grant(&self, grant: ApprovalGrant) -> anyhow::Result<()> {
        self.grants.insert(grant.id.clone(), grant);
        Ok(())
    }

    async fn delete_approval_grants(&self, filter: GrantFilter) -> anyhow::Result<u64> {
        let doomed: Vec<String> = self
            .grants
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.key().clone())
            .collect();
        let mut removed = 0;
        for id in doomed {
            if self.grants.remove(&id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::approval::{ApprovalStatus, GrantType};
    use crate::models::policy::{Granularity, PolicyAction, RiskLevel};
    use crate::models::tool::ToolCall;
    use chrono::Utc;

    fn request(id: &str, session: &str, status: ApprovalStatus) -> ApprovalRequest {
        ApprovalRequest {
            id: id.to_string(),
            session_id: session.to_string(),
            platform: "slack".to_string(),
            user_id: "u1".to_string(),
            agent_id: "agent-1".to_string(),
            tool: ToolCall::new("jira.deleteIssue", serde_json::json!({"key": "TG-1"})),
            policy: policy("p1"),
            status,
            created_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
            platform_message_id: None,
            expires_at: None,
        }
    }

    fn policy(id: &str) -> PermissionPolicy {
        PermissionPolicy {
            id: id.to_string(),
            name: id.to_string(),
            tool_patterns: vec!["jira.*".to_string()],
            agent_ids: None,
            platforms: None,
            action: PolicyAction::Ask,
            granularity: Granularity::PerCall,
            timeout_ms: None,
            risk_level: RiskLevel::Medium,
            priority: 0,
            enabled: true,
        }
    }

    fn grant(id: &str, session: &str, grant_type: GrantType, value: &str) -> ApprovalGrant {
        ApprovalGrant {
            id: id.to_string(),
            session_id: session.to_string(),
            user_id: "u1".to_string(),
            grant_type,
            grant_value: value.to_string(),
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_update_patch_leaves_absent_fields_untouched() {
        let store = MemoryStore::new();
        store
            .create_approval_request(request("r1", "s1", ApprovalStatus::Pending))
            .await
            .unwrap();

        let updated = store
            .update_approval_request(
                "r1",
                ApprovalRequestPatch {
                    platform_message_id: Some("msg-9".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, ApprovalStatus::Pending);
        assert_eq!(updated.platform_message_id.as_deref(), Some("msg-9"));

        let resolved = store
            .update_approval_request(
                "r1",
                ApprovalRequestPatch {
                    status: Some(ApprovalStatus::Approved),
                    resolved_at: Some(Utc::now()),
                    resolved_by: Some("alice".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.status, ApprovalStatus::Approved);
        // Earlier patch survives
        assert_eq!(resolved.platform_message_id.as_deref(), Some("msg-9"));
    }

    #[tokio::test]
    async fn test_update_unknown_id_returns_none() {
        let store = MemoryStore::new();
        let result = store
            .update_approval_request("missing", ApprovalRequestPatch::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_request_filter_is_conjunctive() {
        let store = MemoryStore::new();
        store
            .create_approval_request(request("r1", "s1", ApprovalStatus::Pending))
            .await
            .unwrap();
        store
            .create_approval_request(request("r2", "s1", ApprovalStatus::Approved))
            .await
            .unwrap();
        store
            .create_approval_request(request("r3", "s2", ApprovalStatus::Pending))
            .await
            .unwrap();

        let pending_s1 = store
            .list_approval_requests(ApprovalRequestFilter {
                session_id: Some("s1".to_string()),
                status: Some(ApprovalStatus::Pending),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(pending_s1.len(), 1);
        assert_eq!(pending_s1[0].id, "r1");

        // Absent fields are wildcards
        let everything = store
            .list_approval_requests(ApprovalRequestFilter::default())
            .await
            .unwrap();
        assert_eq!(everything.len(), 3);
    }

    #[tokio::test]
    async fn test_grant_filters_and_deletion() {
        let store = MemoryStore::new();
        store
            .create_approval_grant(grant("g1", "s1", GrantType::Policy, "p1"))
            .await
            .unwrap();
        store
            .create_approval_grant(grant("g2", "s1", GrantType::Category, "p2"))
            .await
            .unwrap();
        store
            .create_approval_grant(grant("g3", "s2", GrantType::Policy, "p1"))
            .await
            .unwrap();

        let s1_policy = store
            .list_approval_grants(GrantFilter {
                session_id: "s1".to_string(),
                user_id: "u1".to_string(),
                grant_type: Some(GrantType::Policy),
                grant_value: Some("p1".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(s1_policy.len(), 1);
        assert_eq!(s1_policy[0].id, "g1");

        let removed = store
            .delete_approval_grants(GrantFilter {
                session_id: "s1".to_string(),
                user_id: "u1".to_string(),
                grant_type: None,
                grant_value: None,
            })
            .await
            .unwrap();
        assert_eq!(removed, 2);

        let remaining = store
            .list_approval_grants(GrantFilter {
                session_id: "s2".to_string(),
                user_id: "u1".to_string(),
                grant_type: None,
                grant_value: None,
            })
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn test_policy_upsert_and_remove() {
        let store = MemoryStore::new();
        store.upsert_policy(policy("p1"));
        store.upsert_policy(policy("p2"));

        let mut p1_override = policy("p1");
        p1_override.priority = 99;
        store.upsert_policy(p1_override);

        let policies = store.list_policies().await.unwrap();
        assert_eq!(policies.len(), 2);
        let p1 = policies.iter().find(|p| p.id == "p1").unwrap();
        assert_eq!(p1.priority, 99);

        assert!(store.remove_policy("p2").is_some());
        assert_eq!(store.list_policies().await.unwrap().len(), 1);
    }
}
