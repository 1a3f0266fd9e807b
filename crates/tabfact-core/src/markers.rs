//! Thinking-marker configuration per model.
//!
//! Reasoning models wrap their chain of thought in a pair of textual
//! markers. The pair is chosen once per run from the model identifier and
//! stays fixed for the whole streaming session.

use serde::{Deserialize, Serialize};

/// A start/end marker pair delimiting the reasoning region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerPair {
    /// Opens the reasoning region (e.g. `<think>`)
    pub start: String,

    /// Closes the reasoning region (e.g. `</think>`)
    pub end: String,
}

/// Known model identifiers and their markers. Lookups are exact matches.
const MODEL_MARKERS: &[(&str, &str, &str)] = &[
    ("exaone-deep", "<thought>", "</thought>"),
    ("deepseek-r1:latest", "<think>", "</think>"),
    ("cogito", "<think>", "</think>"),
];

const DEFAULT_START: &str = "<think>";
const DEFAULT_END: &str = "</think>";

impl MarkerPair {
    /// Create a custom marker pair.
    ///
    /// Both markers must be non-empty; an empty marker would match at every
    /// position and the segmenter could never make progress.
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Option<Self> {
        let start = start.into();
        let end = end.into();
        if start.is_empty() || end.is_empty() {
            return None;
        }
        Some(Self { start, end })
    }

    /// Marker pair for a model identifier, falling back to `<think>`/`</think>`.
    pub fn for_model(model: &str) -> Self {
        MODEL_MARKERS
            .iter()
            .find(|(id, _, _)| *id == model)
            .map(|(_, start, end)| Self {
                start: (*start).to_string(),
                end: (*end).to_string(),
            })
            .unwrap_or_default()
    }

    /// Model identifiers with an explicit entry in the lookup table.
    pub fn known_models() -> impl Iterator<Item = &'static str> {
        MODEL_MARKERS.iter().map(|(id, _, _)| *id)
    }
}

impl Default for MarkerPair {
    fn default() -> Self {
        Self {
            start: DEFAULT_START.to_string(),
            end: DEFAULT_END.to_string(),
        }
    }
}
