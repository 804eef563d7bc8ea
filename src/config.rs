use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Approval wait applied when a policy specifies no timeout, in
    /// milliseconds. Set via TOOLGATE_DEFAULT_TIMEOUT_MS. Default: 5 minutes.
    pub default_timeout_ms: u64,
    /// Platform prompted on when the session's platform has no adapter with
    /// native approval UI, the control surface of last resort.
    /// Set via TOOLGATE_FALLBACK_PLATFORM. Default: "slack".
    pub fallback_platform: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 300_000,
            fallback_platform: "slack".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        Self {
            default_timeout_ms: std::env::var("TOOLGATE_DEFAULT_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_timeout_ms),
            fallback_platform: std::env::var("TOOLGATE_FALLBACK_PLATFORM")
                .unwrap_or(defaults.fallback_platform),
        }
    }
}
