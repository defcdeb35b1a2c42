//! Report orchestration
//!
//! [`ReportOrchestrator`] drives one report run through
//! `Uninitialised -> Started -> Completed`:
//!
//! 1. `start()` creates the remote report, loads history and starts plugins.
//! 2. Results are fed from directories, files, records or stage dumps.
//! 3. `done()` runs the plugins, records history, publishes, and evaluates
//!    the quality gate.
//!
//! Plugins are always invoked in declared order, one after another.
//! Disabled plugins are never invoked.

use crate::config::ReportConfig;
use crate::error::{Error, Result};
use crate::history::{
    create_history_point, merge_history, FileHistory, HistoryDataPoint, HistorySink,
    RemoteHistory, RemoteService,
};
use crate::model::TestResult;
use crate::plugin::{PluginContext, PluginDescriptor, PluginOptions, PluginSummary};
use crate::plugins::create_plugin;
use crate::quality_gate::{self, QualityGateRule, QualityGateViolation};
use crate::reader::{JsonResultsReader, ResultsReader};
use crate::store::{ResultStore, StageDump};
use chrono::Utc;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;
use walkdir::WalkDir;

/// Name of the combined summary written when several reports are published
pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportState {
    Uninitialised,
    Started,
    Completed,
}

/// Everything `done()` produced
#[derive(Debug, Clone)]
pub struct DoneOutcome {
    pub history_point: HistoryDataPoint,
    /// Summaries of published plugins, in declared order
    pub summaries: Vec<PluginSummary>,
    pub quality_gate: Vec<QualityGateViolation>,
    /// Failures of the best-effort publication steps
    pub publish_errors: Vec<String>,
}

impl DoneOutcome {
    pub fn is_successful(&self) -> bool {
        self.quality_gate.is_empty()
    }
}

struct PluginSlot {
    descriptor: PluginDescriptor,
    context: PluginContext,
}

#[derive(Debug, Clone, Copy)]
enum Hook {
    Start,
    Update,
    Done,
}

/// Keep known errors as they are so they reach the operator verbatim
fn plugin_error(id: &str, err: Error) -> Error {
    if err.is_known() || matches!(err, Error::Plugin { .. }) {
        err
    } else {
        Error::Plugin {
            id: id.to_string(),
            message: err.to_string(),
        }
    }
}

fn run_hook(slots: &mut [PluginSlot], store: &ResultStore, hook: Hook) -> Result<()> {
    for slot in slots.iter_mut().filter(|slot| slot.descriptor.enabled) {
        let plugin = &mut slot.descriptor.plugin;
        let outcome = match hook {
            Hook::Start => plugin.start(&mut slot.context, store),
            Hook::Update => plugin.update(&mut slot.context, store),
            Hook::Done => plugin.done(&mut slot.context, store),
        };
        outcome.map_err(|e| plugin_error(&slot.descriptor.id, e))?;
    }
    Ok(())
}

/// Collects the collaborators of a [`ReportOrchestrator`]
pub struct OrchestratorBuilder {
    name: String,
    output: PathBuf,
    realtime: bool,
    plugins: Vec<PluginDescriptor>,
    sinks: Vec<Box<dyn HistorySink>>,
    remote: Option<Arc<dyn RemoteService>>,
    reader: Box<dyn ResultsReader>,
    quality_gate: Vec<QualityGateRule>,
}

impl OrchestratorBuilder {
    pub fn new(name: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        OrchestratorBuilder {
            name: name.into(),
            output: output.into(),
            realtime: false,
            plugins: Vec::new(),
            sinks: Vec::new(),
            remote: None,
            reader: Box::new(JsonResultsReader),
            quality_gate: Vec::new(),
        }
    }

    /// Builder for `config`, with its history file and built-in plugins
    pub fn from_config(config: &ReportConfig) -> Result<Self> {
        let mut builder = Self::new(&config.name, &config.output)
            .realtime(config.realtime)
            .quality_gate(config.quality_gate.clone());

        if let Some(path) = &config.history_path {
            builder = builder.history_sink(FileHistory::new(path, config.history_limit));
        }

        let categories = config.category_rules()?;
        for plugin_config in &config.plugins {
            let options = PluginOptions {
                publish: plugin_config.publish,
                values: plugin_config.options.clone(),
            };
            let plugin = create_plugin(&plugin_config.implementation, &options, &categories)?;
            builder = builder.plugin(PluginDescriptor {
                id: plugin_config.id.clone(),
                enabled: plugin_config.enabled,
                options,
                plugin,
            });
        }

        Ok(builder)
    }

    /// Call `update` on plugins after every ingestion call
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn plugin(mut self, descriptor: PluginDescriptor) -> Self {
        self.plugins.push(descriptor);
        self
    }

    pub fn history_sink(mut self, sink: impl HistorySink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Publish to `service`, which also becomes a history source
    pub fn remote(mut self, service: Arc<dyn RemoteService>) -> Self {
        self.sinks.push(Box::new(RemoteHistory::new(service.clone())));
        self.remote = Some(service);
        self
    }

    pub fn reader(mut self, reader: impl ResultsReader + 'static) -> Self {
        self.reader = Box::new(reader);
        self
    }

    pub fn quality_gate(mut self, rules: Vec<QualityGateRule>) -> Self {
        self.quality_gate = rules;
        self
    }

    pub fn build(self) -> Result<ReportOrchestrator> {
        let mut seen = HashSet::new();
        for descriptor in &self.plugins {
            if !seen.insert(descriptor.id.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate plugin id '{}'",
                    descriptor.id
                )));
            }
        }

        let report_uuid = Uuid::new_v4().to_string();
        let plugins = self
            .plugins
            .into_iter()
            .map(|descriptor| PluginSlot {
                context: PluginContext::new(&descriptor.id, &report_uuid, &self.name, &self.output),
                descriptor,
            })
            .collect();

        Ok(ReportOrchestrator {
            state: ReportState::Uninitialised,
            report_uuid,
            report_name: self.name,
            output: self.output,
            realtime: self.realtime,
            plugins,
            sinks: self.sinks,
            remote: self.remote,
            report_url: None,
            reader: self.reader,
            quality_gate: self.quality_gate,
            store: ResultStore::new(),
            publish_errors: Vec::new(),
        })
    }
}

pub struct ReportOrchestrator {
    state: ReportState,
    report_uuid: String,
    report_name: String,
    output: PathBuf,
    realtime: bool,
    plugins: Vec<PluginSlot>,
    sinks: Vec<Box<dyn HistorySink>>,
    remote: Option<Arc<dyn RemoteService>>,
    /// Set once the remote report exists.
    report_url: Option<String>,
    reader: Box<dyn ResultsReader>,
    quality_gate: Vec<QualityGateRule>,
    store: ResultStore,
    publish_errors: Vec<String>,
}

impl ReportOrchestrator {
    pub fn builder(name: impl Into<String>, output: impl Into<PathBuf>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(name, output)
    }

    pub fn report_uuid(&self) -> &str {
        &self.report_uuid
    }

    pub fn report_name(&self) -> &str {
        &self.report_name
    }

    /// URL of the remote report, once created
    pub fn report_url(&self) -> Option<&str> {
        self.report_url.as_deref()
    }

    pub fn state(&self) -> ReportState {
        self.state
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    fn ensure_started(&self) -> Result<()> {
        match self.state {
            ReportState::Uninitialised => Err(Error::NotStarted),
            ReportState::Started => Ok(()),
            ReportState::Completed => Err(Error::AlreadyCompleted),
        }
    }

    fn after_ingest(&mut self) -> Result<()> {
        if self.realtime {
            run_hook(&mut self.plugins, &self.store, Hook::Update)?;
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        match self.state {
            ReportState::Uninitialised => {}
            ReportState::Started => return Err(Error::AlreadyStarted),
            ReportState::Completed => return Err(Error::AlreadyCompleted),
        }
        self.state = ReportState::Started;
        tracing::info!("starting report {} ({})", self.report_name, self.report_uuid);

        if let Some(service) = &self.remote {
            match service.create_report(&self.report_uuid, &self.report_name) {
                Ok(url) => {
                    tracing::info!("remote report created at {}", url);
                    self.report_url = Some(url);
                }
                Err(e) => {
                    tracing::warn!("remote report could not be created: {}", e);
                    self.publish_errors.push(e.to_string());
                }
            }
        }

        let mut sources = Vec::with_capacity(self.sinks.len());
        for sink in &self.sinks {
            sources.push(sink.read_history()?);
        }
        let history = merge_history(sources);
        tracing::debug!("loaded {} history points", history.len());
        self.store.set_history(history);

        run_hook(&mut self.plugins, &self.store, Hook::Start)
    }

    /// Replay stage dumps written by [`ReportOrchestrator::dump_state`]
    pub fn restore_state(&mut self, paths: &[PathBuf]) -> Result<()> {
        self.ensure_started()?;
        for path in paths {
            let dump = StageDump::load(path)?;
            tracing::debug!(
                "restoring {} results from {}",
                dump.results.len(),
                path.display()
            );
            self.store.restore(dump);
        }
        self.after_ingest()
    }

    /// Ingest every recognised file under `dir`, returning how many were read
    pub fn read_directory(&mut self, dir: &Path) -> Result<usize> {
        self.ensure_started()?;
        let count = self.ingest_directory(dir)?;
        tracing::info!("read {} files from {}", count, dir.display());
        self.after_ingest()?;
        Ok(count)
    }

    pub fn read_file(&mut self, path: &Path) -> Result<()> {
        self.ensure_started()?;
        self.ingest_file(path)?;
        self.after_ingest()
    }

    pub fn read_result(&mut self, result: TestResult) -> Result<()> {
        self.ensure_started()?;
        self.store.add_result(result);
        self.after_ingest()
    }

    /// Write a stage dump; allowed any time after `start()`
    pub fn dump_state(&self, path: &Path) -> Result<()> {
        if self.state == ReportState::Uninitialised {
            return Err(Error::NotStarted);
        }
        self.store.dump().save(path)?;
        tracing::info!("stage dump written to {}", path.display());
        Ok(())
    }

    fn ingest_directory(&mut self, dir: &Path) -> Result<usize> {
        if !dir.is_dir() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: not a directory", dir.display()),
            )));
        }

        let mut count = 0;
        // Directory symlinks are not descended into.
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            match self.ingest_file(path) {
                Ok(()) => count += 1,
                Err(Error::UnrecognizedFormat(path)) => {
                    tracing::debug!("skipping {}: unrecognized format", path.display())
                }
                Err(e) if e.is_recoverable_format_error() => {
                    tracing::warn!("skipping {}: {}", path.display(), e)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(count)
    }

    fn ingest_file(&mut self, path: &Path) -> Result<()> {
        let outcome = self.reader.read(path)?;
        for result in outcome.results {
            self.store.add_result(result);
        }
        for fixture in outcome.fixtures {
            self.store.add_fixture(fixture);
        }
        for attachment in outcome.attachments {
            self.store.add_attachment(attachment);
        }
        Ok(())
    }

    pub fn done(&mut self) -> Result<DoneOutcome> {
        self.ensure_started()?;
        self.state = ReportState::Completed;

        run_hook(&mut self.plugins, &self.store, Hook::Done)?;

        let history_point = create_history_point(
            &self.store,
            &self.report_uuid,
            &self.report_name,
            Utc::now(),
            self.report_url.as_deref(),
        );
        for sink in self.sinks.iter_mut() {
            sink.append_history(&history_point)?;
        }

        self.upload_published_files();

        let mut summaries = Vec::new();
        let mut summary_errors = Vec::new();
        for slot in self.published_plugins() {
            let id = &slot.descriptor.id;
            let summary = match slot.descriptor.plugin.info(&slot.context, &self.store) {
                Ok(summary) => summary,
                Err(e) => {
                    tracing::warn!("plugin {} summary failed: {}", id, e);
                    summary_errors.push(format!("{}: {}", id, e));
                    continue;
                }
            };
            if let Some(mut summary) = summary {
                summary.href = Some(format!("{}/index.html", id));
                summary.remote_href = self
                    .report_url
                    .as_deref()
                    .map(|url| format!("{}/{}/index.html", url.trim_end_matches('/'), id));
                summaries.push(summary);
            }
        }

        self.publish_errors.extend(summary_errors);

        if summaries.len() >= 2 {
            fs::create_dir_all(&self.output)?;
            let path = self.output.join(SUMMARY_FILE);
            fs::write(&path, serde_json::to_vec_pretty(&summaries)?)?;
            tracing::info!("combined summary written to {}", path.display());
        }

        if let (Some(service), Some(_)) = (&self.remote, &self.report_url) {
            if let Err(e) = service.complete_report(&self.report_uuid, &history_point) {
                tracing::warn!("remote report could not be completed: {}", e);
                self.publish_errors.push(e.to_string());
            }
        }

        let stats = self.store.tests_statistic();
        let violations = quality_gate::evaluate(
            &self.quality_gate,
            &stats,
            &self.store.all_test_results(false),
        );
        for violation in &violations {
            tracing::warn!("quality gate: {}", violation);
        }

        tracing::info!("report {} completed", self.report_uuid);
        Ok(DoneOutcome {
            history_point,
            summaries,
            quality_gate: violations,
            publish_errors: std::mem::take(&mut self.publish_errors),
        })
    }

    fn published_plugins(&self) -> impl Iterator<Item = &PluginSlot> {
        self.plugins
            .iter()
            .filter(|slot| slot.descriptor.enabled && slot.descriptor.options.publish)
    }

    /// Upload the files of published plugins; failures are only recorded
    fn upload_published_files(&mut self) {
        let Some(service) = &self.remote else {
            return;
        };
        if self.report_url.is_none() {
            return;
        }

        let mut errors = Vec::new();
        for slot in self.published_plugins() {
            for key in slot.context.files.keys() {
                let remote_key = format!("{}/{}", slot.descriptor.id, key);
                let uploaded = fs::read(slot.context.files.path(key))
                    .map_err(Error::from)
                    .and_then(|contents| {
                        service.upload_file(&self.report_uuid, &remote_key, &contents)
                    });
                if let Err(e) = uploaded {
                    tracing::warn!("failed to upload {}: {}", remote_key, e);
                    errors.push(format!("{}: {}", remote_key, e));
                }
            }
        }
        self.publish_errors.extend(errors);
    }
}
