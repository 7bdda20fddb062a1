//! Provider vocabulary and model capabilities.

pub mod capabilities;

pub use capabilities::ModelCapabilities;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// A concrete provider endpoint the user can configure.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderKind {
    OpenAi,
    OpenRouter,
    Groq,
    Mistral,
    Together,
    /// Any other OpenAI-compatible server, typically local.
    Custom,
    Anthropic,
    Google,
}

/// Wire-format family shared by several provider kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ProviderFamily {
    OpenAiCompatible,
    Anthropic,
    Google,
}

impl ProviderKind {
    pub fn family(&self) -> ProviderFamily {
        match self {
            Self::OpenAi | Self::OpenRouter | Self::Groq | Self::Mistral | Self::Together | Self::Custom => {
                ProviderFamily::OpenAiCompatible
            }
            Self::Anthropic => ProviderFamily::Anthropic,
            Self::Google => ProviderFamily::Google,
        }
    }

    /// Base URL used when the config does not override the host.
    pub fn default_host(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::Mistral => "https://api.mistral.ai/v1",
            Self::Together => "https://api.together.xyz/v1",
            Self::Custom => "http://localhost:11434/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Google => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    /// Environment variable holding the API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::Groq => "GROQ_API_KEY",
            Self::Mistral => "MISTRAL_API_KEY",
            Self::Together => "TOGETHER_API_KEY",
            Self::Custom => "CUSTOM_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Google => "GOOGLE_API_KEY",
        }
    }

    /// Environment variable overriding the host.
    pub fn base_url_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_BASE_URL",
            Self::OpenRouter => "OPENROUTER_BASE_URL",
            Self::Groq => "GROQ_BASE_URL",
            Self::Mistral => "MISTRAL_BASE_URL",
            Self::Together => "TOGETHER_BASE_URL",
            Self::Custom => "CUSTOM_BASE_URL",
            Self::Anthropic => "ANTHROPIC_BASE_URL",
            Self::Google => "GOOGLE_BASE_URL",
        }
    }

    /// Local servers usually run without authentication.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Custom)
    }

    /// Whether streaming requests accept `stream_options.include_usage`.
    pub fn streams_usage_on_request(&self) -> bool {
        matches!(self, Self::OpenAi | Self::OpenRouter | Self::Groq | Self::Together)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!(ProviderKind::from_str("OpenRouter").unwrap(), ProviderKind::OpenRouter);
        assert_eq!(ProviderKind::from_str("OPENAI").unwrap(), ProviderKind::OpenAi);
        assert_eq!(ProviderKind::Google.to_string(), "google");
        assert_eq!(ProviderKind::OpenRouter.to_string(), "openrouter");
    }

    #[test]
    fn openai_like_kinds_share_a_family() {
        assert_eq!(ProviderKind::Groq.family(), ProviderFamily::OpenAiCompatible);
        assert_eq!(ProviderKind::Custom.family(), ProviderFamily::OpenAiCompatible);
        assert_eq!(ProviderKind::Anthropic.family(), ProviderFamily::Anthropic);
    }
}
