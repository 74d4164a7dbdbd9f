use std::path::Path;

use serde::Deserialize;

use super::EngineCore;

pub(crate) const DEFAULT_API_BASE_URL: &str = "https://api.lettora.app/v1";

const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BACKOFF_BASE_MS: u64 = 500;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct EngineConfig {
    pub(crate) api_base_url: Option<String>,
    pub(crate) disable_network: Option<bool>,
    pub(crate) realtime_reconnect_max_attempts: Option<u32>,
    pub(crate) realtime_backoff_base_ms: Option<u64>,
}

pub(crate) fn load_engine_config(data_dir: &str) -> EngineConfig {
    let path = Path::new(data_dir).join("lettora_config.json");
    let Ok(bytes) = std::fs::read(&path) else {
        return EngineConfig::default();
    };
    serde_json::from_slice::<EngineConfig>(&bytes).unwrap_or_default()
}

impl EngineConfig {
    pub(crate) fn api_base_url(&self) -> String {
        self.api_base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_API_BASE_URL)
            .to_string()
    }

    pub(crate) fn reconnect_max_attempts(&self) -> u32 {
        self.realtime_reconnect_max_attempts
            .unwrap_or(DEFAULT_RECONNECT_MAX_ATTEMPTS)
    }

    pub(crate) fn backoff_base_ms(&self) -> u64 {
        self.realtime_backoff_base_ms.unwrap_or(DEFAULT_BACKOFF_BASE_MS)
    }
}

impl EngineCore {
    pub(super) fn network_enabled(&self) -> bool {
        // Used to keep Rust tests deterministic and offline.
        if let Some(disable) = self.config.disable_network {
            return !disable;
        }
        std::env::var("LETTORA_DISABLE_NETWORK").ok().as_deref() != Some("1")
    }
}
