//! Durable-state contract consumed by the policy engine.
//!
//! The store owns policies, approval requests, and grants; the engine owns
//! only the transient waiter bookkeeping for requests it is actively
//! blocked on. Any backend that preserves these filter semantics
//! (conjunctive, absent fields are wildcards) and does not drop concurrent
//! writes to the same request id can sit behind this trait; the in-memory
//! implementation in [`memory`] is the reference.

use async_trait::async_trait;

use crate::models::approval::{
    ApprovalGrant, ApprovalRequest, ApprovalRequestFilter, ApprovalRequestPatch, GrantFilter,
};
use crate::models::policy::PermissionPolicy;

pub mod memory;

pub use memory::MemoryStore;

#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn list_policies(&self) -> anyhow::Result<Vec<PermissionPolicy>>;

    async fn create_approval_request(&self, request: ApprovalRequest) -> anyhow::Result<()>;

    /// Apply a partial update; returns the updated request, or `None` when
    /// the id is unknown. Overlapping concurrent updates are last-write-wins
    /// per field.
    async fn update_approval_request(
        &self,
        id: &str,
        patch: ApprovalRequestPatch,
    ) -> anyhow::Result<Option<ApprovalRequest>>;

    async fn get_approval_request(&self, id: &str) -> anyhow::Result<Option<ApprovalRequest>>;

    async fn list_approval_requests(
        &self,
        filter: ApprovalRequestFilter,
    ) -> anyhow::Result<Vec<ApprovalRequest>>;

    async fn list_approval_grants(&self, filter: GrantFilter)
        -> anyhow::Result<Vec<ApprovalGrant>>;

    async fn create_approval_grant(&self, grant: ApprovalGrant) -> anyhow::Result<()>;

    /// Delete all grants matching the filter; returns how many were removed.
    async fn delete_approval_grants(&self, filter: GrantFilter) -> anyhow::Result<u64>;
}
