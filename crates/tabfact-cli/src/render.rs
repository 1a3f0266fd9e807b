//! Terminal output for runs, verdicts and tables.

use colored::*;
use std::io::Write;
use tabfact_core::{Answer, Delta, Region, Table, Verdict, VerdictSource};
use tabfact_runtime::{RunReport, SessionObserver};

/// Prints a run as it streams.
pub struct TerminalObserver {
    show_reasoning: bool,
}

impl TerminalObserver {
    pub fn new(show_reasoning: bool) -> Self {
        Self { show_reasoning }
    }
}

impl SessionObserver for TerminalObserver {
    fn on_region_started(&mut self, region: Region) {
        match region {
            Region::Reasoning if self.show_reasoning => {
                println!("{}", "Thinking...".dimmed().italic());
            }
            Region::Reasoning => {}
            Region::Answer => println!("\n{}", "Answer:".bold().cyan()),
        }
    }

    fn on_delta(&mut self, delta: &Delta) {
        match delta.region {
            Region::Reasoning if self.show_reasoning => print!("{}", delta.text.dimmed()),
            Region::Reasoning => return,
            Region::Answer => print!("{}", delta.text),
        }
        let _ = std::io::stdout().flush();
    }

    fn on_verdict(&mut self, _verdict: &Verdict, source: &VerdictSource) {
        println!();
        if !matches!(source, VerdictSource::Json { .. }) {
            tracing::warn!(?source, "answer had no usable JSON verdict");
        }
    }
}

pub fn answer_label(answer: Answer) -> ColoredString {
    match answer {
        Answer::True => answer.as_str().green().bold(),
        Answer::False => answer.as_str().red().bold(),
    }
}

/// Summary printed after a completed run.
pub fn render_report(report: &RunReport, table: Option<&Table>) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\n{} {}\n",
        "Verdict:".bold(),
        answer_label(report.verdict.answer)
    ));
    if let Some(thinking) = report.reasoning_duration {
        out.push_str(&format!("Thought for {:.1}s\n", thinking.as_secs_f64()));
    }
    out.push_str(&format!(
        "{} tokens in {:.1}s",
        report.tokens,
        report.total_duration.as_secs_f64()
    ));
    if report.malformed_lines > 0 {
        out.push_str(&format!(", {} malformed lines skipped", report.malformed_lines));
    }
    out.push('\n');

    if let Some(table) = table {
        let cited = table.cited_cells(&report.verdict);
        if cited.len() < report.verdict.relevant_cells.len() {
            out.push_str(&format!(
                "{}\n",
                format!(
                    "{} cited cells are not in the table",
                    report.verdict.relevant_cells.len() - cited.len()
                )
                .yellow()
            ));
        }
        out.push('\n');
        out.push_str(&render_table(table, Some(&report.verdict)));
    }
    out
}

/// Aligned text table. Cells cited by `verdict` are highlighted and marked `*`.
pub fn render_table(table: &Table, verdict: Option<&Verdict>) -> String {
    let is_cited = |row: usize, column: &str| {
        verdict
            .map(|v| table.is_relevant(row, column, v))
            .unwrap_or(false)
    };

    let mut widths: Vec<usize> = table.columns.iter().map(|c| c.chars().count()).collect();
    for (row_index, row) in table.rows.iter().enumerate() {
        for (col, cell) in row.iter().enumerate() {
            if col >= widths.len() {
                widths.push(0);
            }
            let marker = table
                .columns
                .get(col)
                .map(|name| is_cited(row_index, name) as usize)
                .unwrap_or(0);
            widths[col] = widths[col].max(cell.chars().count() + marker);
        }
    }
    let index_width = table.rows.len().saturating_sub(1).to_string().len().max(1);

    let mut out = String::new();
    out.push_str(&format!("{:>w$} ", "#", w = index_width));
    for (col, name) in table.columns.iter().enumerate() {
        out.push_str(&format!("| {} ", pad(name, widths[col]).bold()));
    }
    out.push('\n');

    for (row_index, row) in table.rows.iter().enumerate() {
        out.push_str(&format!("{:>w$} ", row_index, w = index_width).dimmed().to_string());
        for (col, cell) in row.iter().enumerate() {
            let cited = table
                .columns
                .get(col)
                .map(|name| is_cited(row_index, name))
                .unwrap_or(false);
            if cited {
                let text = pad(&format!("{}*", cell), widths[col]);
                out.push_str(&format!("| {} ", text.on_yellow().black().bold()));
            } else {
                out.push_str(&format!("| {} ", pad(cell, widths[col])));
            }
        }
        out.push('\n');
    }
    out
}

fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{}{}", text, " ".repeat(width.saturating_sub(len)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabfact_core::RelevantCell;

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_render_table_marks_cited_cells() {
        plain();
        let table = Table::parse("Name#Year\nAlice#1998\nBob#2003").unwrap();
        let verdict = Verdict {
            answer: Answer::True,
            relevant_cells: vec![RelevantCell::new(1, "Year"), RelevantCell::new(7, "Year")],
        };

        let out = render_table(&table, Some(&verdict));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("Name"));
        assert!(lines[2].contains("2003*"));
        assert!(!lines[1].contains('*'));
    }

    #[test]
    fn test_render_table_aligns_columns() {
        plain();
        let table = Table::parse("a,bb\nlonger,x").unwrap();
        let out = render_table(&table, None);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0].find("| bb"), lines[1].find("| x"));
    }
}
