//! Utility functions for command implementation

use crate::config::ReportConfig;
use crate::error::Result;
use crate::model::TestStatistic;
use crate::ui::UI;
use std::path::{Path, PathBuf};

/// Base directory of a command (or current directory if None)
pub fn base_dir(base_path: Option<&str>) -> &Path {
    base_path.map(Path::new).unwrap_or_else(|| Path::new("."))
}

/// `path` made relative to `base` unless already absolute
pub(crate) fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Load the configuration of `base_path`, with paths made relative to it
pub fn load_config(base_path: Option<&str>) -> Result<ReportConfig> {
    let base = base_dir(base_path);
    let mut config = ReportConfig::load_or_default(base)?;

    config.output = resolve(base, &config.output);
    config.log_dir = resolve(base, &config.log_dir);
    config.history_path = config.history_path.map(|p| resolve(base, &p));
    Ok(config)
}

/// Print the status counts of a run
pub fn show_statistic(ui: &mut dyn UI, stats: &TestStatistic) -> Result<()> {
    ui.output(&format!(
        "  Total: {}  Passed: {}  Failed: {}  Broken: {}  Skipped: {}  Unknown: {}",
        stats.total, stats.passed, stats.failed, stats.broken, stats.skipped, stats.unknown
    ))?;
    if stats.retries > 0 || stats.flaky > 0 {
        ui.output(&format!(
            "  Retried: {}  Flaky: {}",
            stats.retries, stats.flaky
        ))?;
    }
    Ok(())
}
