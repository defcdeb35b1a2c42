//! Write a stage dump of test results for a later `generate`

use crate::commands::generate::read_sources;
use crate::commands::utils::{base_dir, load_config, resolve, show_statistic};
use crate::commands::Command;
use crate::error::{Error, Result};
use crate::orchestrator::ReportOrchestrator;
use crate::ui::UI;
use std::path::PathBuf;

pub struct DumpCommand {
    base_path: Option<String>,
    sources: Vec<PathBuf>,
    destination: PathBuf,
}

impl DumpCommand {
    pub fn new(base_path: Option<String>, sources: Vec<PathBuf>, destination: PathBuf) -> Self {
        DumpCommand {
            base_path,
            sources,
            destination,
        }
    }
}

impl Command for DumpCommand {
    fn execute(&self, ui: &mut dyn UI) -> Result<i32> {
        let config = load_config(self.base_path.as_deref())?;

        // Only the store matters here: no plugins, no history.
        let mut orchestrator = ReportOrchestrator::builder(&config.name, &config.output).build()?;
        orchestrator.start()?;
        read_sources(&mut orchestrator, &self.sources, ui)?;

        if orchestrator.store().all_test_results(false).is_empty() {
            return Err(Error::NoResults);
        }

        let destination = resolve(base_dir(self.base_path.as_deref()), &self.destination);
        orchestrator.dump_state(&destination)?;
        ui.output(&format!("Wrote stage dump to {}", destination.display()))?;
        show_statistic(ui, &orchestrator.store().tests_statistic())?;
        Ok(0)
    }

    fn name(&self) -> &str {
        "dump"
    }

    fn help(&self) -> &str {
        "Read test results and write them as a stage dump"
    }
}
