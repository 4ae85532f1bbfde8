use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Output of one successful synthesis call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub image_url: String,
    pub explanation: Option<String>,
}

/// Application lifecycle. Each variant carries exactly the data valid in it,
/// so a stored result or a stray error message cannot outlive its state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AppState {
    #[default]
    Idle,
    KeySelection {
        message: Option<String>,
    },
    Generating,
    Success(GenerationResult),
    Error {
        message: String,
    },
}

#[derive(Serialize)]
struct StateRecord<'a> {
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    explanation: Option<&'a str>,
}

impl AppState {
    pub fn kind(&self) -> &'static str {
        match self {
            AppState::Idle => "idle",
            AppState::KeySelection { .. } => "key-selection",
            AppState::Generating => "generating",
            AppState::Success(_) => "success",
            AppState::Error { .. } => "error",
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            AppState::KeySelection { message } => message.as_deref(),
            AppState::Error { message } => Some(message.as_str()),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&GenerationResult> {
        match self {
            AppState::Success(result) => Some(result),
            _ => None,
        }
    }

    pub fn is_generating(&self) -> bool {
        matches!(self, AppState::Generating)
    }

    /// Journal-friendly summary. The image itself is left out; data URLs are
    /// far too large for a line-oriented log.
    pub fn record(&self) -> Map<String, Value> {
        let record = StateRecord {
            state: self.kind(),
            message: self.message(),
            explanation: self
                .result()
                .and_then(|result| result.explanation.as_deref()),
        };
        match serde_json::to_value(record) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}
