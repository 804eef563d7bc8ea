use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::approval::ApprovalGrant;

// ── Permission Policy ────────────────────────────────────────

/// A rule mapping tool-name patterns to an allow/deny/ask decision.
///
/// Policies are evaluated on every tool call. The highest-priority enabled
/// policy whose patterns, platform filter, and agent filter all match is the
/// effective one; absence of any match is an implicit allow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionPolicy {
    pub id: String,
    pub name: String,
    /// Glob-style patterns matched case-insensitively against the full tool
    /// name (`*` matches any substring).
    pub tool_patterns: Vec<String>,
    /// If present, only these agents are subject to the policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_ids: Option<Vec<String>>,
    /// If present, only sessions on these platforms are subject to it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platforms: Option<Vec<String>>,
    pub action: PolicyAction,
    #[serde(default)]
    pub granularity: Granularity,
    /// How long an approval prompt stays open, in milliseconds. When absent
    /// the engine-wide default applies to the wait, and grants issued under
    /// this policy never expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub risk_level: RiskLevel,
    /// Higher priority wins; ties break by policy id ascending.
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    Allow,
    Deny,
    Ask,
}

/// How broadly an approval applies once granted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// Every call prompts again; approvals are never cached.
    #[default]
    PerCall,
    /// One approval covers the policy for the rest of the session.
    PerSession,
    /// One approval covers the policy's category for the session.
    PerCategory,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

// ── Policy Decision ──────────────────────────────────────────

/// The synchronous output of evaluating a tool call, distinct from the
/// asynchronous [`super::approval::ApprovalResult`] that resolves a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub action: PolicyAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PermissionPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Present when an existing unexpired grant satisfied an `ask` policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant: Option<ApprovalGrant>,
}

impl PolicyDecision {
    /// No policy matched; tool calls are allowed by default.
    pub fn implicit_allow() -> Self {
        Self {
            action: PolicyAction::Allow,
            policy: None,
            reason: Some("no matching policy".to_string()),
            grant: None,
        }
    }

    pub fn from_policy(action: PolicyAction, policy: &PermissionPolicy) -> Self {
        Self {
            action,
            policy: Some(policy.clone()),
            reason: None,
            grant: None,
        }
    }

    /// An `ask` policy satisfied by a cached grant.
    pub fn granted(policy: &PermissionPolicy, grant: ApprovalGrant) -> Self {
        Self {
            action: PolicyAction::Allow,
            policy: Some(policy.clone()),
            reason: Some("covered by existing grant".to_string()),
            grant: Some(grant),
        }
    }
}

// ── Built-in Default Policies ────────────────────────────────

/// The built-in policy table merged under stored policies at evaluation
/// time. Stored policies overlay these by id, and all built-ins sit at
/// negative priority so any stored policy outranks them.
pub fn default_policies() -> &'static [PermissionPolicy] {
    static DEFAULTS: Lazy<Vec<PermissionPolicy>> = Lazy::new(|| {
        vec![
            PermissionPolicy {
                id: "builtin.payments-deny".to_string(),
                name: "Block payment tools".to_string(),
                tool_patterns: vec![
                    "payments.*".to_string(),
                    "stripe.*".to_string(),
                    "billing.*".to_string(),
                ],
                agent_ids: None,
                platforms: None,
                action: PolicyAction::Deny,
                granularity: Granularity::PerCall,
                timeout_ms: None,
                risk_level: RiskLevel::Critical,
                priority: -10,
                enabled: true,
            },
            PermissionPolicy {
                id: "builtin.destructive-ask".to_string(),
                name: "Confirm destructive tools".to_string(),
                tool_patterns: vec![
                    "*.delete*".to_string(),
                    "*.remove*".to_string(),
                    "*.drop*".to_string(),
                    "*.destroy*".to_string(),
                ],
                agent_ids: None,
                platforms: None,
                action: PolicyAction::Ask,
                granularity: Granularity::PerCall,
                timeout_ms: Some(120_000),
                risk_level: RiskLevel::High,
                priority: -20,
                enabled: true,
            },
            PermissionPolicy {
                id: "builtin.outbound-ask".to_string(),
                name: "Confirm outbound messages".to_string(),
                tool_patterns: vec![
                    "*.send*".to_string(),
                    "*.post*".to_string(),
                    "*.reply*".to_string(),
                    "*.publish*".to_string(),
                ],
                agent_ids: None,
                platforms: None,
                action: PolicyAction::Ask,
                granularity: Granularity::PerSession,
                timeout_ms: Some(300_000),
                risk_level: RiskLevel::Medium,
                priority: -30,
                enabled: true,
            },
            PermissionPolicy {
                id: "builtin.read-allow".to_string(),
                name: "Allow read-only tools".to_string(),
                tool_patterns: vec![
                    "*.get*".to_string(),
                    "*.list*".to_string(),
                    "*.read*".to_string(),
                    "*.search*".to_string(),
                ],
                agent_ids: None,
                platforms: None,
                action: PolicyAction::Allow,
                granularity: Granularity::PerCall,
                timeout_ms: None,
                risk_level: RiskLevel::Low,
                priority: -40,
                enabled: true,
            },
        ]
    });
    &DEFAULTS
}

// ── Tests ────────────────────────────────────────────────────
