//! Configuration: per-request provider snapshots, lifecycle tuning, and
//! the layered client config (file < env < code) they are resolved from.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use tracing::debug;

use crate::error::{Result, TalkwireError};
use crate::models::{ModelCapabilities, ProviderKind};

/// Immutable settings for one request.
///
/// Cloned into the request task; changes only apply to the next send.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    #[builder(into)]
    pub model: String,
    #[builder(into, default)]
    pub api_key: String,
    /// Overrides [`ProviderKind::default_host`].
    #[builder(into)]
    pub host: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    #[builder(into)]
    pub system_prompt: Option<String>,
    /// Names of the tools offered to the model.
    #[builder(default)]
    #[serde(default)]
    pub tools: BTreeSet<String>,
    #[builder(default = true)]
    pub stream: bool,
    /// Overrides [`ModelCapabilities::for_kind`].
    pub capabilities: Option<ModelCapabilities>,
}

impl ProviderConfig {
    /// Resolved base URL without a trailing slash.
    pub fn host(&self) -> &str {
        self.host
            .as_deref()
            .unwrap_or_else(|| self.kind.default_host())
            .trim_end_matches('/')
    }

    pub fn capabilities(&self) -> ModelCapabilities {
        self.capabilities
            .unwrap_or_else(|| ModelCapabilities::for_kind(self.kind))
    }

    pub fn tool_enabled(&self, name: &str) -> bool {
        self.tools.contains(name)
    }

    /// Non-empty system prompt, if any.
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Timing and bounds for the request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// Minimum spacing between draft updates published to the UI.
    pub flush_interval: Duration,
    /// Tool execution rounds allowed per turn before the turn fails.
    pub max_tool_rounds: usize,
    /// Longest wait for the next stream chunk; `None` waits forever.
    pub stream_idle_timeout: Option<Duration>,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(100),
            max_tool_rounds: 10,
            stream_idle_timeout: Some(Duration::from_secs(120)),
        }
    }
}

impl LifecycleSettings {
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_stream_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stream_idle_timeout = timeout;
        self
    }
}

/// Layered client configuration.
///
/// Resolution order, lowest first:
/// 1. TOML config file
/// 2. Environment variables (after loading `.env`)
/// 3. Explicit `with_*` calls
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    api_keys: HashMap<ProviderKind, String>,
    hosts: HashMap<ProviderKind, String>,
    lifecycle: LifecycleSettings,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    providers: HashMap<ProviderKind, ProviderEntry>,
    #[serde(default)]
    lifecycle: Option<LifecycleEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderEntry {
    api_key: Option<String>,
    host: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LifecycleEntry {
    flush_interval_ms: Option<u64>,
    max_tool_rounds: Option<usize>,
    /// Zero disables the idle timeout.
    stream_idle_timeout_secs: Option<u64>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from environment variables (`OPENAI_API_KEY`, `ANTHROPIC_BASE_URL`, ...).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::new();
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(raw)
            .map_err(|e| TalkwireError::Configuration(format!("invalid config file: {e}")))?;
        let mut config = Self::new();
        for (kind, entry) in file.providers {
            if let Some(key) = entry.api_key.filter(|k| !k.is_empty()) {
                config.api_keys.insert(kind, key);
            }
            if let Some(host) = entry.host.filter(|h| !h.is_empty()) {
                config.hosts.insert(kind, host);
            }
        }
        if let Some(lifecycle) = file.lifecycle {
            if let Some(ms) = lifecycle.flush_interval_ms {
                config.lifecycle.flush_interval = Duration::from_millis(ms);
            }
            if let Some(rounds) = lifecycle.max_tool_rounds {
                config.lifecycle.max_tool_rounds = rounds;
            }
            if let Some(secs) = lifecycle.stream_idle_timeout_secs {
                config.lifecycle.stream_idle_timeout =
                    (secs > 0).then(|| Duration::from_secs(secs));
            }
        }
        Ok(config)
    }

    /// Load a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        debug!(path = %path.display(), "loaded config file");
        Self::from_toml_str(&raw)
    }

    /// Platform config file location (`.../talkwire/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "talkwire")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Default config file (when present) overlaid with the environment.
    pub fn load_default() -> Result<Self> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path)?,
            _ => Self::new(),
        };
        let _ = dotenvy::dotenv();
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Overlay values read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for kind in ProviderKind::iter() {
            let key = lookup(kind.api_key_env()).or_else(|| match kind {
                ProviderKind::Google => lookup("GEMINI_API_KEY"),
                _ => None,
            });
            if let Some(key) = key.filter(|k| !k.is_empty()) {
                self.api_keys.insert(kind, key);
            }
            if let Some(host) = lookup(kind.base_url_env()).filter(|h| !h.is_empty()) {
                self.hosts.insert(kind, host);
            }
        }
    }

    pub fn with_api_key(mut self, kind: ProviderKind, key: impl Into<String>) -> Self {
        self.api_keys.insert(kind, key.into());
        self
    }

    pub fn with_host(mut self, kind: ProviderKind, host: impl Into<String>) -> Self {
        self.hosts.insert(kind, host.into());
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: LifecycleSettings) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn api_key(&self, kind: ProviderKind) -> Option<&str> {
        self.api_keys.get(&kind).map(String::as_str)
    }

    pub fn host(&self, kind: ProviderKind) -> Option<&str> {
        self.hosts.get(&kind).map(String::as_str)
    }

    pub fn lifecycle(&self) -> LifecycleSettings {
        self.lifecycle
    }

    pub fn has_credentials(&self, kind: ProviderKind) -> bool {
        !kind.requires_api_key() || self.api_keys.contains_key(&kind)
    }

    /// Build a request snapshot for `kind` and `model` with default sampling.
    pub fn provider_config(&self, kind: ProviderKind, model: impl Into<String>) -> Result<ProviderConfig> {
        let api_key = match self.api_key(kind) {
            Some(key) => key.to_string(),
            None if !kind.requires_api_key() => String::new(),
            None => {
                return Err(TalkwireError::Configuration(format!(
                    "Missing {}",
                    kind.api_key_env()
                )))
            }
        };
        Ok(ProviderConfig::builder()
            .kind(kind)
            .model(model)
            .api_key(api_key)
            .maybe_host(self.host(kind).map(str::to_string))
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = ClientConfig::from_toml_str(
            r#"
            [providers.openai]
            api_key = "file-key"
            host = "https://file.example/v1"
            "#,
        )
        .unwrap();
        config.apply_env(env(&[("OPENAI_API_KEY", "env-key")]));

        assert_eq!(config.api_key(ProviderKind::OpenAi), Some("env-key"));
        assert_eq!(config.host(ProviderKind::OpenAi), Some("https://file.example/v1"));
    }

    #[test]
    fn gemini_key_is_accepted_for_google() {
        let mut config = ClientConfig::new();
        config.apply_env(env(&[("GEMINI_API_KEY", "g-key")]));
        assert_eq!(config.api_key(ProviderKind::Google), Some("g-key"));
    }

    #[test]
    fn missing_key_is_a_configuration_error() {
        let err = ClientConfig::new()
            .provider_config(ProviderKind::Anthropic, "claude-sonnet-4-5")
            .unwrap_err();
        assert!(matches!(err, TalkwireError::Configuration(msg) if msg.contains("ANTHROPIC_API_KEY")));
    }

    #[test]
    fn custom_servers_need_no_key() {
        let config = ClientConfig::new()
            .with_host(ProviderKind::Custom, "http://127.0.0.1:8080/v1/")
            .provider_config(ProviderKind::Custom, "llama3")
            .unwrap();
        assert_eq!(config.api_key, "");
        assert_eq!(config.host(), "http://127.0.0.1:8080/v1");
        assert!(config.stream);
    }

    #[test]
    fn lifecycle_table_is_read() {
        let config = ClientConfig::from_toml_str(
            r#"
            [lifecycle]
            flush_interval_ms = 250
            max_tool_rounds = 3
            stream_idle_timeout_secs = 0
            "#,
        )
        .unwrap();
        let lifecycle = config.lifecycle();
        assert_eq!(lifecycle.flush_interval, Duration::from_millis(250));
        assert_eq!(lifecycle.max_tool_rounds, 3);
        assert_eq!(lifecycle.stream_idle_timeout, None);
    }

    #[test]
    fn capabilities_default_by_kind() {
        let config = ProviderConfig::builder()
            .kind(ProviderKind::Groq)
            .model("llama-3.3-70b")
            .build();
        assert!(!config.capabilities().supports_vision);
        assert_eq!(config.host(), "https://api.groq.com/openai/v1");
    }
}
