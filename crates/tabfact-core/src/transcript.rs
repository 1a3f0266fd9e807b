//! Complete (non-streamed) model outputs.
//!
//! Precomputed prediction files store the whole raw response per claim.
//! These helpers split such a response in one pass instead of replaying
//! it token by token.

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::markers::MarkerPair;
use crate::segmenter::Segmenter;
use crate::types::Verdict;
use crate::verdict::{extract_verdict_with_source, VerdictSource};

/// Separate the first reasoning block from the rest of a finished response.
///
/// Markers match case-insensitively. Both halves are trimmed. Without a
/// complete block the reasoning is empty and the text is returned trimmed.
pub fn split_reasoning(text: &str, markers: &MarkerPair) -> (String, String) {
    let pattern = format!(
        "{}(.*?){}",
        regex::escape(&markers.start),
        regex::escape(&markers.end)
    );
    let regex = match RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
    {
        Ok(regex) => regex,
        Err(e) => {
            tracing::warn!(error = %e, "could not build marker pattern");
            return (String::new(), text.trim().to_string());
        }
    };

    match regex.captures(text) {
        Some(caps) => {
            let reasoning = caps.get(1).map_or("", |m| m.as_str()).trim().to_string();
            let remainder = regex.replace(text, "").trim().to_string();
            (reasoning, remainder)
        }
        None => (String::new(), text.trim().to_string()),
    }
}

/// A finished response split into regions with its verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub reasoning: String,
    pub answer: String,
    pub verdict: Verdict,
    pub source: VerdictSource,
}

impl Transcript {
    /// Segment a complete response exactly as a stream would be segmented,
    /// then extract the verdict from the answer region.
    pub fn from_text(text: &str, markers: MarkerPair) -> Self {
        let mut segmenter = Segmenter::new(markers);
        segmenter.push(text);
        segmenter.finish();
        let (reasoning, answer) = segmenter.into_parts();
        let (verdict, source) = extract_verdict_with_source(&answer);
        Self {
            reasoning,
            answer,
            verdict,
            source,
        }
    }
}
