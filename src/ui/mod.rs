//! User interface abstraction
//!
//! Commands report to the operator through the [`UI`] trait so they can be
//! driven by the CLI or by tests capturing everything they print.

use crate::error::Result;
use std::io::{self, Write};

/// Abstract UI trait for command interaction
pub trait UI {
    /// Output a message to the user
    fn output(&mut self, message: &str) -> Result<()>;

    /// Output an error message
    fn error(&mut self, message: &str) -> Result<()>;

    /// Output a warning message
    fn warning(&mut self, message: &str) -> Result<()>;

    /// Output rows as left-aligned columns
    fn output_table(&mut self, rows: &[Vec<String>]) -> Result<()> {
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        let widths: Vec<usize> = (0..columns)
            .map(|i| {
                rows.iter()
                    .filter_map(|row| row.get(i))
                    .map(|cell| cell.chars().count())
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        for row in rows {
            let line = row
                .iter()
                .enumerate()
                .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
                .collect::<Vec<_>>()
                .join("  ");
            self.output(line.trim_end())?;
        }
        Ok(())
    }
}

/// Command-line UI implementation
pub struct CliUI {
    stdout: Box<dyn Write>,
    stderr: Box<dyn Write>,
}

impl CliUI {
    /// Creates a new command-line UI instance using stdout and stderr.
    pub fn new() -> Self {
        CliUI {
            stdout: Box::new(io::stdout()),
            stderr: Box::new(io::stderr()),
        }
    }
}

impl Default for CliUI {
    fn default() -> Self {
        Self::new()
    }
}

impl UI for CliUI {
    fn output(&mut self, message: &str) -> Result<()> {
        writeln!(self.stdout, "{}", message)?;
        Ok(())
    }

    fn error(&mut self, message: &str) -> Result<()> {
        writeln!(self.stderr, "Error: {}", message)?;
        Ok(())
    }

    fn warning(&mut self, message: &str) -> Result<()> {
        writeln!(self.stderr, "Warning: {}", message)?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_helpers::TestUI;
    use super::*;

    #[test]
    fn test_ui_captures_by_kind() {
        let mut ui = TestUI::new();
        ui.output("test message").unwrap();
        ui.error("error message").unwrap();
        ui.warning("warning message").unwrap();
        assert_eq!(ui.output, vec!["test message"]);
        assert_eq!(ui.errors, vec!["error message"]);
        assert_eq!(ui.warnings, vec!["warning message"]);
    }

    #[test]
    fn test_ui_table_alignment() {
        let mut ui = TestUI::new();
        let rows = vec![
            vec!["uuid".to_string(), "total".to_string()],
            vec!["a1".to_string(), "12".to_string()],
        ];
        ui.output_table(&rows).unwrap();
        assert_eq!(ui.output, vec!["uuid  total", "a1    12"]);
    }

    #[test]
    fn test_ui_table_ragged_rows() {
        let mut ui = TestUI::new();
        ui.output_table(&[vec!["a".to_string(), "b".to_string()], vec!["ccc".to_string()]])
            .unwrap();
        assert_eq!(ui.output, vec!["a    b", "ccc"]);
    }
}
