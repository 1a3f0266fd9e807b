//! Shared types for tabfact evaluation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The truth value a model assigns to a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Answer {
    /// The table supports the claim
    True,

    /// The table refutes the claim (also the default when nothing is found)
    False,
}

impl Answer {
    /// Interpret a JSON value produced by a model.
    ///
    /// Accepts `"TRUE"` / `"FALSE"` in any case (surrounding whitespace
    /// ignored) and JSON booleans.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(true) => Some(Answer::True),
            serde_json::Value::Bool(false) => Some(Answer::False),
            serde_json::Value::String(s) => {
                let s = s.trim();
                if s.eq_ignore_ascii_case("true") {
                    Some(Answer::True)
                } else if s.eq_ignore_ascii_case("false") {
                    Some(Answer::False)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Answer::True => "TRUE",
            Answer::False => "FALSE",
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A table cell the model cites as evidence for its answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelevantCell {
    /// Zero-based data row index (header excluded)
    pub row_index: i64,

    /// Header text of the cited column
    pub column_name: String,
}

impl RelevantCell {
    pub fn new(row_index: i64, column_name: impl Into<String>) -> Self {
        Self {
            row_index,
            column_name: column_name.into(),
        }
    }
}

/// Final, read-only result of one fact-check run.
///
/// This is the shape consumed by the table-highlighting renderer:
/// `{"answer": "TRUE"|"FALSE", "relevant_cells": [{"row_index": 0, "column_name": "..."}]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// TRUE or FALSE
    pub answer: Answer,

    /// Cells the model cited
    #[serde(default)]
    pub relevant_cells: Vec<RelevantCell>,
}

impl Verdict {
    /// A verdict with no cited cells.
    pub fn bare(answer: Answer) -> Self {
        Self {
            answer,
            relevant_cells: Vec::new(),
        }
    }

    /// Whether the verdict cites the given cell.
    pub fn cites(&self, row_index: usize, column_name: &str) -> bool {
        self.relevant_cells.iter().any(|cell| {
            cell.row_index == row_index as i64 && cell.column_name == column_name
        })
    }
}

/// Which part of the streamed output a piece of text belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    /// Text between the model's thinking markers
    Reasoning,

    /// Everything outside the markers
    Answer,
}

/// An ordered piece of text appended to one of the accumulators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub region: Region,
    pub text: String,
}

impl Delta {
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            region: Region::Reasoning,
            text: text.into(),
        }
    }

    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            region: Region::Answer,
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_answer_from_json() {
        assert_eq!(Answer::from_json(&json!("TRUE")), Some(Answer::True));
        assert_eq!(Answer::from_json(&json!(" false ")), Some(Answer::False));
        assert_eq!(Answer::from_json(&json!(true)), Some(Answer::True));
        assert_eq!(Answer::from_json(&json!("maybe")), None);
        assert_eq!(Answer::from_json(&json!(1)), None);
    }

    #[test]
    fn test_verdict_wire_shape() {
        let verdict = Verdict {
            answer: Answer::True,
            relevant_cells: vec![RelevantCell::new(1, "Name")],
        };
        let value = serde_json::to_value(&verdict).unwrap();
        assert_eq!(
            value,
            json!({"answer": "TRUE", "relevant_cells": [{"row_index": 1, "column_name": "Name"}]})
        );
    }

    #[test]
    fn test_verdict_cites() {
        let verdict = Verdict {
            answer: Answer::False,
            relevant_cells: vec![RelevantCell::new(2, "Year")],
        };
        assert!(verdict.cites(2, "Year"));
        assert!(!verdict.cites(2, "Name"));
        assert!(!Verdict::bare(Answer::True).cites(0, "Year"));
    }
}
