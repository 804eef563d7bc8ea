use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::policy::{Granularity, PermissionPolicy};
use super::tool::ToolCall;

/// `resolved_by` value used for every engine-initiated resolution
/// (fail-closed denials and timeouts).
pub const SYSTEM_RESOLVER: &str = "system";

// ── Approval Request ─────────────────────────────────────────

/// A pending or resolved human-approval record for one tool call.
///
/// Created in `Pending` and transitions exactly once to a terminal status;
/// the terminal status is immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub session_id: String,
    /// Platform the prompt was posted on (after fallback resolution).
    pub platform: String,
    pub user_id: String,
    pub agent_id: String,
    pub tool: ToolCall,
    /// Snapshot of the policy that required the approval.
    pub policy: PermissionPolicy,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    /// Reference to the prompt message the platform posted, when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

impl ApprovalStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }
}

/// Partial update applied to an approval request. Absent fields are left
/// untouched; on overlapping concurrent updates, the last write wins.
#[derive(Debug, Clone, Default)]
pub struct ApprovalRequestPatch {
    pub status: Option<ApprovalStatus>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub platform_message_id: Option<String>,
}

/// Conjunctive filter over approval requests; absent fields are wildcards.
#[derive(Debug, Clone, Default)]
pub struct ApprovalRequestFilter {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub platform: Option<String>,
    pub status: Option<ApprovalStatus>,
}

impl ApprovalRequestFilter {
    pub fn matches(&self, request: &ApprovalRequest) -> bool {
        self.session_id
            .as_ref()
            .is_none_or(|v| *v == request.session_id)
            && self.user_id.as_ref().is_none_or(|v| *v == request.user_id)
            && self
                .platform
                .as_ref()
                .is_none_or(|v| *v == request.platform)
            && self.status.is_none_or(|v| v == request.status)
    }
}

// ── Approval Grant ───────────────────────────────────────────

/// A cached "already approved" fact scoped to a session+user+value tuple.
///
/// Issued only when an `ask` policy with `per_session` or `per_category`
/// granularity resolves to approved. A grant with no `expires_at` never
/// expires; an expired grant is treated as absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalGrant {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub grant_type: GrantType,
    pub grant_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalGrant {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GrantType {
    Tool,
    Category,
    Policy,
}

impl GrantType {
    /// Grant type issued when an approval under `granularity` is cached.
    /// `per_call` approvals are never cached.
    pub fn for_granularity(granularity: Granularity) -> Option<Self> {
        match granularity {
            Granularity::PerCall => None,
            Granularity::PerSession => Some(GrantType::Policy),
            Granularity::PerCategory => Some(GrantType::Category),
        }
    }
}

/// Conjunctive filter over grants; optional fields are wildcards.
#[derive(Debug, Clone)]
pub struct GrantFilter {
    pub session_id: String,
    pub user_id: String,
    pub grant_type: Option<GrantType>,
    pub grant_value: Option<String>,
}

impl GrantFilter {
    pub fn matches(&self, grant: &ApprovalGrant) -> bool {
        self.session_id == grant.session_id
            && self.user_id == grant.user_id
            && self.grant_type.is_none_or(|t| t == grant.grant_type)
            && self
                .grant_value
                .as_ref()
                .is_none_or(|v| *v == grant.grant_value)
    }
}

// ── Approval Result ──────────────────────────────────────────

/// The asynchronous outcome delivered to whoever is waiting on a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalResult {
    pub request_id: String,
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ApprovalResult {
    pub fn approved(request_id: impl Into<String>, resolved_by: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            status: ApprovalStatus::Approved,
            resolved_by: Some(resolved_by.into()),
            resolved_at: Some(Utc::now()),
            reason: None,
        }
    }

    pub fn denied(
        request_id: impl Into<String>,
        resolved_by: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            status: ApprovalStatus::Denied,
            resolved_by: Some(resolved_by.into()),
            resolved_at: Some(Utc::now()),
            reason: Some(reason.into()),
        }
    }

    pub fn expired(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            status: ApprovalStatus::Expired,
            resolved_by: Some(SYSTEM_RESOLVER.to_string()),
            resolved_at: Some(Utc::now()),
            reason: Some("approval timed out".to_string()),
        }
    }

    /// Rebuild the outcome of a request that is already terminal in the
    /// store, so repeated resolutions stay idempotent.
    pub fn from_terminal(request: &ApprovalRequest) -> Self {
        Self {
            request_id: request.id.clone(),
            status: request.status,
            resolved_by: request.resolved_by.clone(),
            resolved_at: request.resolved_at,
            reason: None,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn grant(expires_at: Option<DateTime<Utc>>) -> ApprovalGrant {
        ApprovalGrant {
            id: "g1".to_string(),
            session_id: "s1".to_string(),
            user_id: "u1".to_string(),
            grant_type: GrantType::Policy,
            grant_value: "p1".to_string(),
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_wire_format_includes_expired() {
        assert_eq!(
            serde_json::to_string(&ApprovalStatus::Expired).unwrap(),
            "\"expired\""
        );
        let s: ApprovalStatus = serde_json::from_str("\"denied\"").unwrap();
        assert_eq!(s, ApprovalStatus::Denied);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!ApprovalStatus::Pending.is_terminal());
        assert!(ApprovalStatus::Approved.is_terminal());
        assert!(ApprovalStatus::Denied.is_terminal());
        assert!(ApprovalStatus::Expired.is_terminal());
    }

    #[test]
    fn test_grant_without_expiry_never_expires() {
        let g = grant(None);
        assert!(!g.is_expired(Utc::now() + Duration::days(3650)));
    }

    #[test]
    fn test_grant_expiry_boundary() {
        let now = Utc::now();
        assert!(grant(Some(now - Duration::seconds(1))).is_expired(now));
        assert!(grant(Some(now)).is_expired(now));
        assert!(!grant(Some(now + Duration::seconds(1))).is_expired(now));
    }

    #[test]
    fn test_grant_type_for_granularity() {
        assert_eq!(GrantType::for_granularity(Granularity::PerCall), None);
        assert_eq!(
            GrantType::for_granularity(Granularity::PerSession),
            Some(GrantType::Policy)
        );
        assert_eq!(
            GrantType::for_granularity(Granularity::PerCategory),
            Some(GrantType::Category)
        );
    }

    #[test]
    fn test_grant_filter_optional_fields_are_wildcards() {
        let g = grant(None);
        let filter = GrantFilter {
            session_id: "s1".to_string(),
            user_id: "u1".to_string(),
            grant_type: None,
            grant_value: None,
        };
        assert!(filter.matches(&g));

        let narrowed = GrantFilter {
            grant_type: Some(GrantType::Category),
            ..filter
        };
        assert!(!narrowed.matches(&g));
    }

    #[test]
    fn test_expired_result_is_system_resolved() {
        let result = ApprovalResult::expired("req-1");
        assert_eq!(result.status, ApprovalStatus::Expired);
        assert_eq!(result.resolved_by.as_deref(), Some(SYSTEM_RESOLVER));
    }
}
