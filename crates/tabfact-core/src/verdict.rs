//! Verdict extraction from free-form model output.
//!
//! Models are asked to finish with a JSON object
//! `{"answer": "TRUE"|"FALSE", "relevant_cells": [...]}`, but they surround
//! it with prose, code fences and sometimes earlier drafts of the same
//! object. Extraction therefore:
//!
//! 1. strips Markdown code fences,
//! 2. collects every balanced `{...}` span with a brace-depth counter,
//! 3. tries the spans from last to first and keeps the first one that is a
//!    JSON object with both `answer` and `relevant_cells`,
//! 4. otherwise falls back to a keyword search for "true" / "false".
//!
//! Extraction never fails: a finished answer always yields a [`Verdict`].

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Answer, RelevantCell, Verdict};

lazy_static! {
    /// Opening or closing Markdown fence, optionally tagged `json`.
    static ref CODE_FENCE: Regex = Regex::new(r"(?i)```(json)?").unwrap();
}

/// How a verdict was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerdictSource {
    /// Parsed from the `index`-th balanced-brace candidate (0-based, in
    /// order of appearance) out of `candidates` found
    Json { index: usize, candidates: usize },

    /// The word "true" or "false" appeared in the text
    Keyword,

    /// Nothing usable; defaulted to FALSE
    Default,
}

/// Remove ```` ``` ```` and ```` ```json ```` fences and surrounding whitespace.
pub fn strip_code_fences(raw: &str) -> String {
    CODE_FENCE.replace_all(raw, "").trim().to_string()
}

/// Every balanced `{...}` span in `text`, in order of appearance.
///
/// Braces inside double-quoted strings do not count. Prose can carry a
/// stray `"` (an inch mark, say), so a `{` that never closes under string
/// tracking is measured again with a plain depth counter. After a span
/// closes, scanning resumes right after it, so objects nested inside an
/// earlier span are not reported separately. A `{` that closes under
/// neither count ends the scan.
pub fn json_candidates(text: &str) -> Vec<&str> {
    let mut candidates = Vec::new();
    let mut offset = 0;

    while let Some(found) = text[offset..].find('{') {
        let start = offset + found;
        let rest = &text[start..];
        let close = closing_brace(rest, true).or_else(|| {
            tracing::trace!(start, "unclosed under string tracking, recounting braces");
            closing_brace(rest, false)
        });

        match close {
            Some(i) => {
                let end = start + i;
                candidates.push(&text[start..=end]);
                offset = end + 1;
            }
            None => break,
        }
    }

    candidates
}

/// Byte offset of the `}` that balances the `{` at the start of `text`.
fn closing_brace(text: &str, track_strings: bool) -> Option<usize> {
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' if track_strings => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract a verdict from a finished answer.
pub fn extract_verdict(raw: &str) -> Verdict {
    extract_verdict_with_source(raw).0
}

/// Extract a verdict and report which path produced it.
pub fn extract_verdict_with_source(raw: &str) -> (Verdict, VerdictSource) {
    let cleaned = strip_code_fences(raw);
    let candidates = json_candidates(&cleaned);

    for (index, candidate) in candidates.iter().enumerate().rev() {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) => {
                if let Some(verdict) = verdict_from_value(&value) {
                    tracing::debug!(index, total = candidates.len(), "verdict parsed from JSON");
                    return (
                        verdict,
                        VerdictSource::Json {
                            index,
                            candidates: candidates.len(),
                        },
                    );
                }
            }
            Err(e) => {
                tracing::trace!(index, error = %e, "candidate is not valid JSON");
            }
        }
    }

    let lower = cleaned.to_lowercase();
    let (answer, source) = if lower.contains("true") {
        (Answer::True, VerdictSource::Keyword)
    } else if lower.contains("false") {
        (Answer::False, VerdictSource::Keyword)
    } else {
        (Answer::False, VerdictSource::Default)
    };
    tracing::debug!(?source, %answer, "no JSON verdict, using keyword fallback");

    (Verdict::bare(answer), source)
}

/// Convert a parsed candidate into a verdict.
///
/// The object must carry both keys and an interpretable answer. Cells that
/// lack an integer `row_index` or a string `column_name` are dropped, and a
/// `relevant_cells` value that is not an array counts as empty.
fn verdict_from_value(value: &Value) -> Option<Verdict> {
    let object = value.as_object()?;
    let answer = Answer::from_json(object.get("answer")?)?;
    let cells = object.get("relevant_cells")?;

    let relevant_cells = cells
        .as_array()
        .map(|items| items.iter().filter_map(cell_from_value).collect())
        .unwrap_or_default();

    Some(Verdict {
        answer,
        relevant_cells,
    })
}

fn cell_from_value(value: &Value) -> Option<RelevantCell> {
    let row_index = match value.get("row_index")? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    let column_name = value.get("column_name")?.as_str()?.to_string();
    Some(RelevantCell {
        row_index,
        column_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_last_qualifying_object_wins() {
        let raw = r#"Explanation... {"foo":1} final: {"answer":"TRUE","relevant_cells":[{"row_index":1,"column_name":"Name"}]}"#;
        let (verdict, source) = extract_verdict_with_source(raw);
        assert_eq!(verdict.answer, Answer::True);
        assert_eq!(verdict.relevant_cells, vec![RelevantCell::new(1, "Name")]);
        assert_eq!(source, VerdictSource::Json { index: 1, candidates: 2 });
    }

    #[test]
    fn test_later_draft_overrides_earlier() {
        let raw = r#"Draft: {"answer": "TRUE", "relevant_cells": []}
Actually, re-checking row 3...
{"answer": "FALSE", "relevant_cells": [{"row_index": 3, "column_name": "Score"}]}"#;
        let verdict = extract_verdict(raw);
        assert_eq!(verdict.answer, Answer::False);
        assert_eq!(verdict.relevant_cells, vec![RelevantCell::new(3, "Score")]);
    }

    #[test]
    fn test_invalid_last_candidate_falls_back_to_earlier() {
        let raw = r#"{"answer": "TRUE", "relevant_cells": []} then {not json}"#;
        let (verdict, source) = extract_verdict_with_source(raw);
        assert_eq!(verdict.answer, Answer::True);
        assert_eq!(source, VerdictSource::Json { index: 0, candidates: 2 });
    }

    #[test]
    fn test_code_fences_are_stripped() {
        let raw = "Result:\n```json\n{\"answer\": \"FALSE\", \"relevant_cells\": []}\n```";
        assert_eq!(strip_code_fences(raw), "Result:\n\n{\"answer\": \"FALSE\", \"relevant_cells\": []}");
        let verdict = extract_verdict(raw);
        assert_eq!(verdict, Verdict::bare(Answer::False));

        let upper = "```JSON\n{\"answer\": \"TRUE\", \"relevant_cells\": []}\n```";
        assert_eq!(extract_verdict(upper), Verdict::bare(Answer::True));
    }

    #[test]
    fn test_nested_objects_form_one_candidate() {
        let raw = r#"{"answer": "TRUE", "relevant_cells": [{"row_index": 0, "column_name": "A"}], "meta": {"k": {"x": 1}}}"#;
        let candidates = json_candidates(raw);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0], raw);
        assert_eq!(extract_verdict(raw).relevant_cells.len(), 1);
    }

    #[test]
    fn test_unbalanced_brace_stops_discovery() {
        let candidates = json_candidates(r#"{"a": 1} { unterminated {"b": 2}"#);
        assert_eq!(candidates, vec![r#"{"a": 1}"#]);
    }

    #[test]
    fn test_stray_quote_in_prose_does_not_hide_later_object() {
        let raw = r#"Is it true that he is taller? Row 0 lists {height: 6'2"} for him. {"answer": "FALSE", "relevant_cells": [{"row_index": 0, "column_name": "Height"}]}"#;
        assert_eq!(json_candidates(raw).len(), 2);

        let (verdict, source) = extract_verdict_with_source(raw);
        assert_eq!(verdict.answer, Answer::False);
        assert_eq!(verdict.relevant_cells, vec![RelevantCell::new(0, "Height")]);
        assert_eq!(source, VerdictSource::Json { index: 1, candidates: 2 });
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let raw = r#"{"answer": "TRUE", "relevant_cells": [{"row_index": 0, "column_name": "Set {A}\"}"}]}"#;
        let candidates = json_candidates(raw);
        assert_eq!(candidates, vec![raw]);
        assert_eq!(
            extract_verdict(raw).relevant_cells,
            vec![RelevantCell::new(0, "Set {A}\"}")]
        );
    }

    #[test]
    fn test_keyword_fallback_false() {
        let (verdict, source) =
            extract_verdict_with_source("The claim is false because the table lists 1998.");
        assert_eq!(verdict, Verdict::bare(Answer::False));
        assert_eq!(source, VerdictSource::Keyword);
    }

    #[test]
    fn test_keyword_fallback_prefers_true() {
        // Substring match on purpose: "construe" contains "true"
        let verdict = extract_verdict("One could construe this as false.");
        assert_eq!(verdict.answer, Answer::True);
    }

    #[test]
    fn test_default_is_false() {
        let (verdict, source) = extract_verdict_with_source("I cannot tell.");
        assert_eq!(verdict, Verdict::bare(Answer::False));
        assert_eq!(source, VerdictSource::Default);
        assert_eq!(extract_verdict(""), Verdict::bare(Answer::False));
    }

    #[test]
    fn test_object_missing_keys_is_skipped() {
        let raw = r#"{"answer": "TRUE"} and nothing else"#;
        let (verdict, source) = extract_verdict_with_source(raw);
        // Fallback still finds "true" inside the rejected object text
        assert_eq!(verdict, Verdict::bare(Answer::True));
        assert_eq!(source, VerdictSource::Keyword);
    }

    #[test]
    fn test_answer_normalisation_and_cell_coercion() {
        let raw = r#"{"answer": "true", "relevant_cells": [
            {"row_index": "2", "column_name": "Year"},
            {"row_index": 4.0, "column_name": "Team"},
            {"row_index": "x", "column_name": "Bad"},
            {"column_name": "NoRow"}
        ]}"#;
        let verdict = extract_verdict(raw);
        assert_eq!(verdict.answer, Answer::True);
        assert_eq!(
            verdict.relevant_cells,
            vec![RelevantCell::new(2, "Year"), RelevantCell::new(4, "Team")]
        );
    }

    #[test]
    fn test_non_array_cells_count_as_empty() {
        let verdict = extract_verdict(r#"{"answer": "FALSE", "relevant_cells": null}"#);
        assert_eq!(verdict, Verdict::bare(Answer::False));
    }

    #[test]
    fn test_uninterpretable_answer_skips_candidate() {
        let raw = r#"{"answer": "TRUE", "relevant_cells": []} {"answer": "UNKNOWN", "relevant_cells": []}"#;
        let (verdict, source) = extract_verdict_with_source(raw);
        assert_eq!(verdict.answer, Answer::True);
        assert_eq!(source, VerdictSource::Json { index: 0, candidates: 2 });
    }

    fn verdicts() -> impl Strategy<Value = Verdict> {
        (
            prop_oneof![Just(Answer::True), Just(Answer::False)],
            prop::collection::vec((0i64..500, "[A-Za-z0-9 _{}\"]{0,12}"), 0..6),
        )
            .prop_map(|(answer, cells)| Verdict {
                answer,
                relevant_cells: cells
                    .into_iter()
                    .map(|(row, column)| RelevantCell::new(row, column))
                    .collect(),
            })
    }

    proptest! {
        #[test]
        fn prop_clean_json_is_idempotent(verdict in verdicts()) {
            let serialized = serde_json::to_string(&verdict).unwrap();
            prop_assert_eq!(extract_verdict(&serialized), verdict);
        }

        #[test]
        fn prop_never_panics(raw in "\\PC{0,120}") {
            let _ = extract_verdict(&raw);
        }
    }
}
