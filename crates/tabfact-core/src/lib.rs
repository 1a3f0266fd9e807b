//! # tabfact-core
//!
//! Deterministic building blocks for live table fact-checking.
//!
//! A model is asked whether a claim about a table is TRUE or FALSE. Its
//! answer streams back token by token, possibly wrapped in a "thinking"
//! block, and ends with a JSON verdict. This crate answers:
//! - Which streamed text is reasoning and which is the answer?
//! - What verdict did the model reach, and which cells did it cite?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same tokens always produce the same split and verdict
//! 2. **No I/O**: Networking lives in `tabfact-runtime`
//! 3. **Split-tolerant**: Markers split across tokens are handled
//! 4. **Total**: Verdict extraction never fails
//!
//! ## Example
//!
//! ```rust
//! use tabfact_core::{Answer, MarkerPair, Segmenter, extract_verdict};
//!
//! let mut segmenter = Segmenter::new(MarkerPair::for_model("deepseek-r1:latest"));
//! for token in ["<th", "ink>Row 0 lists 1998.</think>", r#"{"answer": "TRUE", "relevant_cells": []}"#] {
//!     segmenter.push(token);
//! }
//! segmenter.finish();
//!
//! assert_eq!(segmenter.reasoning(), "Row 0 lists 1998.");
//! assert_eq!(extract_verdict(segmenter.answer()).answer, Answer::True);
//! ```

pub mod framing;
pub mod markers;
pub mod prompt;
pub mod segmenter;
pub mod table;
pub mod transcript;
pub mod types;
pub mod verdict;

// Re-export main types at crate root
pub use framing::{parse_token_line, FramingError, LineFramer, TokenEvent};
pub use markers::MarkerPair;
pub use prompt::{build_prompt, system_prompt, InferenceRequest};
pub use segmenter::{SegmentUpdate, Segmenter};
pub use table::{Table, TableError};
pub use transcript::{split_reasoning, Transcript};
pub use types::{Answer, Delta, Region, RelevantCell, Verdict};
pub use verdict::{extract_verdict, extract_verdict_with_source, VerdictSource};

/// Segment a complete response for `model` and extract its verdict.
///
/// This is the offline counterpart of a streaming run: the markers come
/// from the model lookup table and the whole text is treated as one token.
pub fn check_response(model: &str, response: &str) -> Transcript {
    Transcript::from_text(response, MarkerPair::for_model(model))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_response_end_to_end() {
        let response = r#"<think>Alice is in row 0 with 1998.</think>
The table confirms it.
```json
{"answer": "TRUE", "relevant_cells": [{"row_index": 0, "column_name": "Year"}]}
```"#;
        let transcript = check_response("cogito", response);

        assert_eq!(transcript.reasoning, "Alice is in row 0 with 1998.");
        assert_eq!(transcript.verdict.answer, Answer::True);
        assert_eq!(
            transcript.verdict.relevant_cells,
            vec![RelevantCell::new(0, "Year")]
        );

        let table = Table::parse("Name#Year\nAlice#1998").unwrap();
        assert_eq!(table.cited_cells(&transcript.verdict).len(), 1);
    }

    #[test]
    fn test_check_response_plain_model() {
        let transcript = check_response("llama3.2", "The claim is false because Bob left in 2001.");
        assert_eq!(transcript.reasoning, "");
        assert_eq!(transcript.verdict, Verdict::bare(Answer::False));
    }
}
