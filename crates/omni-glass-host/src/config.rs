//! Provider configuration.
//!
//! `config.toml` under the Omni-Glass home selects the active provider
//! and carries per-provider settings. API keys resolve from the config
//! file first and fall back to the well-known environment variables;
//! they are read only by this parent process and never reach a plugin's
//! environment (see the spawn-env policy in `omni-glass-core`).
//!
//! A provider with no usable key silently falls back to the local
//! in-process model; a missing key is a policy condition, not an error.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use omni_glass_core::GlassHome;
use omni_glass_llm::{
    ClaudeProvider, LlmProvider, LocalProvider, OpenAiCompatProvider, ProviderConfig,
};

use crate::error::{HostError, HostResult};

/// The selectable providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Anthropic Claude (remote).
    Claude,
    /// Google Gemini via its OpenAI-compatible endpoint (remote).
    Gemini,
    /// `OpenAI` (remote).
    Openai,
    /// The in-process local model.
    Local,
}

impl ProviderKind {
    /// The well-known environment variable holding this provider's key.
    #[must_use]
    pub fn key_env_var(&self) -> Option<&'static str> {
        match self {
            Self::Claude => Some("ANTHROPIC_API_KEY"),
            Self::Gemini => Some("GOOGLE_API_KEY"),
            Self::Openai => Some("OPENAI_API_KEY"),
            Self::Local => None,
        }
    }

    /// Default model name for this provider.
    #[must_use]
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Claude => "claude-sonnet-4-20250514",
            Self::Gemini => "gemini-2.0-flash",
            Self::Openai => "gpt-4o-mini",
            Self::Local => "local",
        }
    }

    /// The config-file table key for this provider.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Gemini => "gemini",
            Self::Openai => "openai",
            Self::Local => "local",
        }
    }
}

/// Per-provider settings.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderEntry {
    /// Model override.
    pub model: Option<String>,
    /// API key stored in the config file (the keychain collaborator may
    /// supersede this; the environment variable is the fallback).
    pub api_key: Option<String>,
    /// Endpoint override.
    pub base_url: Option<String>,
}

impl std::fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("model", &self.model)
            .field("has_api_key", &self.api_key.is_some())
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// The persisted configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlassConfig {
    /// The provider the pipeline streams through.
    pub active_provider: ProviderKind,
    /// Per-provider settings, keyed by [`ProviderKind::as_str`].
    pub providers: BTreeMap<String, ProviderEntry>,
}

impl Default for GlassConfig {
    fn default() -> Self {
        Self {
            active_provider: ProviderKind::Claude,
            providers: BTreeMap::new(),
        }
    }
}

impl GlassConfig {
    /// Load from the home's `config.toml`, tolerating a missing file.
    pub fn load(home: &GlassHome) -> HostResult<Self> {
        match std::fs::read_to_string(home.config_file()) {
            Ok(raw) => toml::from_str(&raw).map_err(|e| HostError::Config(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist atomically (write-to-temp-then-rename).
    pub fn save(&self, home: &GlassHome) -> HostResult<()> {
        home.ensure_layout()?;
        let body = toml::to_string_pretty(self).map_err(|e| HostError::Config(e.to_string()))?;
        let path = home.config_file();
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// The settings entry for a provider, defaulted when absent.
    #[must_use]
    pub fn entry(&self, kind: ProviderKind) -> ProviderEntry {
        self.providers.get(kind.as_str()).cloned().unwrap_or_default()
    }

    /// Resolve the API key: config file first, environment second.
    #[must_use]
    pub fn resolve_api_key(&self, kind: ProviderKind) -> Option<String> {
        if let Some(key) = self.entry(kind).api_key.filter(|k| !k.is_empty()) {
            return Some(key);
        }
        kind.key_env_var()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty())
    }

    /// Build the provider for `kind`, silently falling back to the local
    /// model when a remote provider has no key.
    #[must_use]
    pub fn build_provider(&self, kind: ProviderKind) -> Arc<dyn LlmProvider> {
        if kind == ProviderKind::Local {
            return Arc::new(LocalProvider::new());
        }

        let Some(api_key) = self.resolve_api_key(kind) else {
            warn!(provider = ?kind, "no API key; falling back to the local provider");
            return Arc::new(LocalProvider::new());
        };

        let entry = self.entry(kind);
        let model = entry
            .model
            .unwrap_or_else(|| kind.default_model().to_string());
        let mut config = ProviderConfig::new(api_key, model);
        if let Some(base_url) = entry.base_url {
            config = config.base_url(base_url);
        }

        match kind {
            ProviderKind::Claude => Arc::new(ClaudeProvider::new(config)),
            ProviderKind::Gemini => Arc::new(OpenAiCompatProvider::gemini(config)),
            ProviderKind::Openai => Arc::new(OpenAiCompatProvider::openai(config)),
            ProviderKind::Local => Arc::new(LocalProvider::new()),
        }
    }

    /// Build the active provider.
    #[must_use]
    pub fn build_active_provider(&self) -> Arc<dyn LlmProvider> {
        self.build_provider(self.active_provider)
    }

    /// A masked view for the settings UI: never exposes key material.
    #[must_use]
    pub fn masked(&self) -> serde_json::Value {
        let kinds = [
            ProviderKind::Claude,
            ProviderKind::Gemini,
            ProviderKind::Openai,
            ProviderKind::Local,
        ];
        let providers: BTreeMap<&str, serde_json::Value> = kinds
            .iter()
            .map(|kind| {
                let entry = self.entry(*kind);
                (
                    kind.as_str(),
                    serde_json::json!({
                        "model": entry.model.unwrap_or_else(|| kind.default_model().to_string()),
                        "hasApiKey": self.resolve_api_key(*kind).is_some(),
                        "baseUrl": entry.base_url,
                    }),
                )
            })
            .collect();
        serde_json::json!({
            "activeProvider": self.active_provider,
            "providers": providers,
        })
    }
}
