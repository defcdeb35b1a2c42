//! Generate a report from result directories and stage dumps

use crate::commands::utils::{load_config, show_statistic};
use crate::commands::Command;
use crate::error::{Error, Result};
use crate::orchestrator::{OrchestratorBuilder, ReportOrchestrator};
use crate::ui::UI;
use std::path::PathBuf;

pub struct GenerateCommand {
    base_path: Option<String>,
    sources: Vec<PathBuf>,
    stages: Vec<PathBuf>,
    output: Option<PathBuf>,
    name: Option<String>,
}

impl GenerateCommand {
    pub fn new(base_path: Option<String>, sources: Vec<PathBuf>) -> Self {
        GenerateCommand {
            base_path,
            sources,
            stages: Vec::new(),
            output: None,
            name: None,
        }
    }

    /// Also restore these stage dumps before reading sources
    pub fn with_stages(mut self, stages: Vec<PathBuf>) -> Self {
        self.stages = stages;
        self
    }

    pub fn with_output(mut self, output: Option<PathBuf>) -> Self {
        self.output = output;
        self
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    fn build(&self) -> Result<ReportOrchestrator> {
        let mut config = load_config(self.base_path.as_deref())?;
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        OrchestratorBuilder::from_config(&config)?.build()
    }
}

/// Feed every source into `orchestrator`: directories are walked, files read
///
/// Source files in a format the reader rejects are skipped with a warning.
pub(crate) fn read_sources(
    orchestrator: &mut ReportOrchestrator,
    sources: &[PathBuf],
    ui: &mut dyn UI,
) -> Result<()> {
    for source in sources {
        if source.is_dir() {
            orchestrator.read_directory(source)?;
            continue;
        }
        match orchestrator.read_file(source) {
            Ok(()) => {}
            Err(e) if e.is_recoverable_format_error() => {
                tracing::warn!("skipping {}: {}", source.display(), e);
                ui.warning(&format!("Skipping {}: {}", source.display(), e))?;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

impl Command for GenerateCommand {
    fn execute(&self, ui: &mut dyn UI) -> Result<i32> {
        let mut orchestrator = self.build()?;
        orchestrator.start()?;

        if !self.stages.is_empty() {
            orchestrator.restore_state(&self.stages)?;
        }
        read_sources(&mut orchestrator, &self.sources, ui)?;

        if orchestrator.store().all_test_results(false).is_empty() {
            return Err(Error::NoResults);
        }

        let outcome = orchestrator.done()?;
        let stats = orchestrator.store().tests_statistic();

        ui.output(&format!(
            "Report {} ({})",
            orchestrator.report_name(),
            orchestrator.report_uuid()
        ))?;
        show_statistic(ui, &stats)?;
        ui.output(&format!("  Output: {}", orchestrator.output().display()))?;
        if let Some(url) = orchestrator.report_url() {
            ui.output(&format!("  Published: {}", url))?;
        }

        for error in &outcome.publish_errors {
            ui.warning(&format!("Publishing failed: {}", error))?;
        }

        if outcome.is_successful() {
            Ok(0)
        } else {
            for violation in &outcome.quality_gate {
                ui.error(&format!("Quality gate failed: {}", violation))?;
            }
            Ok(1)
        }
    }

    fn name(&self) -> &str {
        "generate"
    }

    fn help(&self) -> &str {
        "Generate a report from test results"
    }
}
