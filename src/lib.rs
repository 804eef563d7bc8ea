//! Toolgate — policy evaluation and human-in-the-loop approval for agent
//! tool calls.
//!
//! Embedders evaluate every tool call through [`PolicyEngine`]; calls that
//! hit an `ask` policy block on a chat-platform approval prompt until a
//! human resolves them or the timeout expires.

pub mod adapter;
pub mod config;
pub mod engine;
pub mod errors;
pub mod models;
pub mod pattern;
pub mod store;

pub use adapter::{AdapterRegistry, AdapterResponse, ApprovalAdapter, PromptReceipt, WebhookAdapter};
pub use config::EngineConfig;
pub use engine::PolicyEngine;
pub use errors::EngineError;
pub use models::approval::{
    ApprovalGrant, ApprovalRequest, ApprovalResult, ApprovalStatus, GrantType,
};
pub use models::policy::{
    Granularity, PermissionPolicy, PolicyAction, PolicyDecision, RiskLevel,
};
pub use models::tool::{PlatformContext, ToolCall};
pub use store::{ApprovalStore, MemoryStore};
