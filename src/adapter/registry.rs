//! Name→adapter lookup. Exact platform-name equality, no matching logic,
//! no state beyond the registration table.

use std::sync::Arc;

use dashmap::DashMap;

use super::ApprovalAdapter;

#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: Arc<DashMap<String, Arc<dyn ApprovalAdapter>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, platform: impl Into<String>, adapter: Arc<dyn ApprovalAdapter>) {
        self.adapters.insert(platform.into(), adapter);
    }

    pub fn get(&self, platform: &str) -> Option<Arc<dyn ApprovalAdapter>> {
        self.adapters.get(platform).map(|e| e.value().clone())
    }

    /// True when the platform has a registered adapter that can render a
    /// native approval UI.
    pub fn supports_native_approval(&self, platform: &str) -> bool {
        self.get(platform)
            .is_some_and(|adapter| adapter.supports_native_approval())
    }

    pub fn platforms(&self) -> Vec<String> {
        self.adapters.iter().map(|e| e.key().clone()).collect()
    }
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AdapterResponse, PromptReceipt};
    use crate::models::approval::ApprovalRequest;
    use crate::models::tool::PlatformContext;
    use async_trait::async_trait;

    struct NoUiAdapter;

    #[async_trait]
    impl ApprovalAdapter for NoUiAdapter {
        fn supports_native_approval(&self) -> bool {
            false
        }

        async fn request_approval(
            &self,
            request: &ApprovalRequest,
            _context: &PlatformContext,
        ) -> anyhow::Result<PromptReceipt> {
            Ok(PromptReceipt {
                request_id: request.id.clone(),
                platform_message_id: None,
            })
        }

        fn handle_approval_response(&self, _raw: &serde_json::Value) -> Option<AdapterResponse> {
            None
        }
    }

    #[test]
    fn test_lookup_is_exact_name_equality() {
        let registry = AdapterRegistry::new();
        registry.register("telegram", Arc::new(NoUiAdapter));

        assert!(registry.get("telegram").is_some());
        assert!(registry.get("Telegram").is_none());
        assert!(registry.get("tele").is_none());
    }

    #[test]
    fn test_native_approval_probe() {
        let registry = AdapterRegistry::new();
        registry.register("telegram", Arc::new(NoUiAdapter));

        // Registered but without native UI
        assert!(!registry.supports_native_approval("telegram"));
        // Not registered at all
        assert!(!registry.supports_native_approval("whatsapp"));
    }
}
