//! Show the local run history

use crate::commands::utils::load_config;
use crate::commands::Command;
use crate::error::{Error, Result};
use crate::history::{FileHistory, HistoryDataPoint, HistorySink};
use crate::ui::UI;

pub struct HistoryCommand {
    base_path: Option<String>,
    count: Option<usize>,
}

impl HistoryCommand {
    pub fn new(base_path: Option<String>) -> Self {
        HistoryCommand {
            base_path,
            count: None,
        }
    }

    /// Show only the `count` most recent runs
    pub fn with_count(base_path: Option<String>, count: usize) -> Self {
        HistoryCommand {
            base_path,
            count: Some(count),
        }
    }
}

fn metric(point: &HistoryDataPoint, name: &str) -> String {
    point
        .metrics
        .get(name)
        .map(|value| format!("{}", *value as u64))
        .unwrap_or_else(|| "-".to_string())
}

impl Command for HistoryCommand {
    fn execute(&self, ui: &mut dyn UI) -> Result<i32> {
        let config = load_config(self.base_path.as_deref())?;
        let path = config
            .history_path
            .ok_or_else(|| Error::Config("history_path is not configured".to_string()))?;

        let history = FileHistory::new(&path, None);
        let points = history.read_history()?;
        if points.is_empty() {
            ui.output("No history recorded")?;
            return Ok(0);
        }

        let shown = self.count.unwrap_or(points.len()).min(points.len());
        let mut rows = vec![vec![
            "Run".to_string(),
            "Date".to_string(),
            "Name".to_string(),
            "Total".to_string(),
            "Failed".to_string(),
            "Broken".to_string(),
        ]];
        for point in points.iter().take(shown) {
            rows.push(vec![
                point.uuid.clone(),
                point.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                point.name.clone(),
                metric(point, "total"),
                metric(point, "failed"),
                metric(point, "broken"),
            ]);
        }
        ui.output_table(&rows)?;

        if shown < points.len() {
            ui.output(&format!("({} older runs not shown)", points.len() - shown))?;
        }
        Ok(0)
    }

    fn name(&self) -> &str {
        "history"
    }

    fn help(&self) -> &str {
        "Show the recorded history of report runs"
    }
}
