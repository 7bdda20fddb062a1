//! Wire formatting helpers shared by the adapters.

use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

use crate::error::TalkwireError;
use crate::models::ProviderKind;
use crate::types::{ToolCall, TypedData};

/// `data:` URL for an inline attachment.
pub(crate) fn data_url(attachment: &TypedData) -> String {
    format!("data:{};base64,{}", attachment.mime_type, attachment.base64())
}

/// Text attachments are inlined into the prompt under their display name.
pub(crate) fn inline_text(attachment: &TypedData) -> String {
    if attachment.display_name.is_empty() {
        attachment.text()
    } else {
        format!("[{}]\n{}", attachment.display_name, attachment.text())
    }
}

pub(crate) fn unsupported(kind: ProviderKind, attachment: &TypedData) -> TalkwireError {
    TalkwireError::UnsupportedContent {
        provider: kind.to_string(),
        mime_type: attachment.mime_type.clone(),
    }
}

/// Tool arguments as a JSON object, for APIs that want structured input.
pub(crate) fn arguments_value(call: &ToolCall) -> Value {
    call.parsed_arguments().unwrap_or_else(|_| json!({}))
}

/// Field deserializer that reads an explicit `null` as the default value.
///
/// Pair with `#[serde(default)]` so a missing field is accepted too.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// One provider-side turn before serialization.
#[derive(Debug)]
pub(crate) struct Turn {
    pub role: &'static str,
    pub parts: Vec<Value>,
}

/// Collapse consecutive turns with the same role and drop empty ones.
///
/// Anthropic and Google expect alternating roles, and several tool results
/// answering one assistant turn must travel together.
pub(crate) fn merge_turns(turns: Vec<Turn>) -> Vec<Turn> {
    let mut merged: Vec<Turn> = Vec::with_capacity(turns.len());
    for turn in turns.into_iter().filter(|t| !t.parts.is_empty()) {
        match merged.last_mut() {
            Some(last) if last.role == turn.role => last.parts.extend(turn.parts),
            _ => merged.push(turn),
        }
    }
    merged
}
