//! Delimited table text.
//!
//! Tables travel as plain text, one row per line. The delimiter is `#`
//! when the header line contains one (the OCR and dataset format), and a
//! comma otherwise.

use serde_json::{json, Value};
use thiserror::Error;

use crate::types::{RelevantCell, Verdict};

/// Errors from table parsing.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TableError {
    #[error("Table has no header row")]
    Empty,
}

/// A parsed table: a header row and zero or more data rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Parse delimited text. Blank lines are skipped and cells are trimmed.
    pub fn parse(text: &str) -> Result<Self, TableError> {
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());
        let header = lines.next().ok_or(TableError::Empty)?;
        let delimiter = if header.contains('#') { '#' } else { ',' };

        let split = |line: &str| -> Vec<String> {
            line.split(delimiter).map(|cell| cell.trim().to_string()).collect()
        };

        Ok(Self {
            columns: split(header),
            rows: lines.map(split).collect(),
        })
    }

    /// Render as a Markdown table, the format the model sees in its prompt.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        md.push_str(&markdown_row(&self.columns));
        md.push_str(&markdown_row(&vec!["---".to_string(); self.columns.len()]));
        for row in &self.rows {
            md.push_str(&markdown_row(row));
        }
        md
    }

    /// `{"columns": [...], "data": [[...], ...]}`
    pub fn to_json(&self) -> Value {
        json!({
            "columns": self.columns,
            "data": self.rows,
        })
    }

    /// Cell text at a data row and column name.
    pub fn cell(&self, row_index: usize, column_name: &str) -> Option<&str> {
        let column = self.columns.iter().position(|c| c == column_name)?;
        self.rows
            .get(row_index)
            .and_then(|row| row.get(column))
            .map(String::as_str)
    }

    /// Whether `verdict` cites this cell. Cells outside the table never are.
    pub fn is_relevant(&self, row_index: usize, column_name: &str, verdict: &Verdict) -> bool {
        self.cell(row_index, column_name).is_some() && verdict.cites(row_index, column_name)
    }

    /// Cells cited by the verdict that actually exist in this table.
    pub fn cited_cells<'a>(&self, verdict: &'a Verdict) -> Vec<&'a RelevantCell> {
        verdict
            .relevant_cells
            .iter()
            .filter(|cell| {
                usize::try_from(cell.row_index)
                    .ok()
                    .and_then(|row| self.cell(row, &cell.column_name))
                    .is_some()
            })
            .collect()
    }
}

fn markdown_row(cells: &[String]) -> String {
    format!("| {} |\n", cells.join(" | "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Answer;

    const HASH_TABLE: &str = "Name#Year#Team\nAlice#1998#Reds\n\nBob # 2001 # Blues\n";

    #[test]
    fn test_parse_hash_delimited() {
        let table = Table::parse(HASH_TABLE).unwrap();
        assert_eq!(table.columns, vec!["Name", "Year", "Team"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1], vec!["Bob", "2001", "Blues"]);
    }

    #[test]
    fn test_parse_comma_delimited() {
        let table = Table::parse("a,b\n1,2\r\n").unwrap();
        assert_eq!(table.columns, vec!["a", "b"]);
        assert_eq!(table.rows, vec![vec!["1", "2"]]);
    }

    #[test]
    fn test_hash_header_keeps_commas_in_cells() {
        let table = Table::parse("City#Population\nOslo#1,064,235").unwrap();
        assert_eq!(table.cell(0, "Population"), Some("1,064,235"));
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(Table::parse(""), Err(TableError::Empty));
        assert_eq!(Table::parse("\n  \n"), Err(TableError::Empty));
    }

    #[test]
    fn test_to_markdown() {
        let table = Table::parse("a#b\n1#2").unwrap();
        assert_eq!(table.to_markdown(), "| a | b |\n| --- | --- |\n| 1 | 2 |\n");
    }

    #[test]
    fn test_to_json() {
        let table = Table::parse("a#b\n1#2").unwrap();
        assert_eq!(table.to_json(), json!({"columns": ["a", "b"], "data": [["1", "2"]]}));
    }

    #[test]
    fn test_cited_cells_filters_missing() {
        let table = Table::parse(HASH_TABLE).unwrap();
        let verdict = Verdict {
            answer: Answer::True,
            relevant_cells: vec![
                RelevantCell::new(0, "Year"),
                RelevantCell::new(5, "Year"),
                RelevantCell::new(-1, "Name"),
                RelevantCell::new(1, "Coach"),
            ],
        };
        let cited = table.cited_cells(&verdict);
        assert_eq!(cited, vec![&RelevantCell::new(0, "Year")]);

        assert!(table.is_relevant(0, "Year", &verdict));
        assert!(!table.is_relevant(0, "Name", &verdict));
        assert!(!table.is_relevant(5, "Year", &verdict));
    }
}
