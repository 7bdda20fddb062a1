//! Model capabilities descriptor.

use serde::{Deserialize, Serialize};

use super::{ProviderFamily, ProviderKind};

/// Describes which inputs a configured model accepts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelCapabilities {
    pub supports_vision: bool,
    pub supports_audio: bool,
    pub supports_documents: bool,
    pub supports_tools: bool,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            supports_vision: false,
            supports_audio: false,
            supports_documents: false,
            supports_tools: true,
        }
    }
}

impl ModelCapabilities {
    /// Text-only model.
    pub fn text_only() -> Self {
        Self::default()
    }

    /// Everything the provider family can carry.
    pub fn full() -> Self {
        Self {
            supports_vision: true,
            supports_audio: true,
            supports_documents: true,
            supports_tools: true,
        }
    }

    /// Reasonable defaults for a provider kind when nothing else is known.
    pub fn for_kind(kind: ProviderKind) -> Self {
        match kind.family() {
            ProviderFamily::Google => Self::full(),
            ProviderFamily::Anthropic => Self {
                supports_vision: true,
                supports_documents: true,
                ..Self::default()
            },
            ProviderFamily::OpenAiCompatible => match kind {
                ProviderKind::OpenAi | ProviderKind::OpenRouter => Self {
                    supports_vision: true,
                    ..Self::default()
                },
                _ => Self::default(),
            },
        }
    }
}
