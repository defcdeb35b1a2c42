//! Report plugins
//!
//! A plugin produces one report (files, a summary) from the store. The
//! orchestrator drives every enabled plugin through `start`, optional
//! `update` calls and `done`, always in the declared order. Each plugin
//! writes into its own namespace under the output directory.

use crate::error::{Error, Result};
use crate::history::TestTransition;
use crate::model::{TestStatistic, TestStatus};
use crate::store::ResultStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Lifecycle hooks of a report plugin
///
/// Every hook defaults to doing nothing, so a plugin only implements the
/// parts it cares about.
pub trait Plugin {
    /// Called once when the report starts, after history was loaded
    fn start(&mut self, _context: &mut PluginContext, _store: &ResultStore) -> Result<()> {
        Ok(())
    }

    /// Called after each ingestion step in realtime mode
    fn update(&mut self, _context: &mut PluginContext, _store: &ResultStore) -> Result<()> {
        Ok(())
    }

    /// Called once when all results are in
    fn done(&mut self, _context: &mut PluginContext, _store: &ResultStore) -> Result<()> {
        Ok(())
    }

    /// Summary of the produced report, if the plugin has one
    fn info(&self, _context: &PluginContext, _store: &ResultStore) -> Result<Option<PluginSummary>> {
        Ok(None)
    }
}

/// Options of one configured plugin
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginOptions {
    /// Whether the plugin's files and summary are published
    pub publish: bool,
    /// Free-form plugin specific options
    pub values: BTreeMap<String, String>,
}

impl PluginOptions {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// A plugin instance as declared in the configuration
pub struct PluginDescriptor {
    pub id: String,
    pub enabled: bool,
    pub options: PluginOptions,
    pub plugin: Box<dyn Plugin>,
}

impl PluginDescriptor {
    pub fn new(id: impl Into<String>, plugin: Box<dyn Plugin>) -> Self {
        PluginDescriptor {
            id: id.into(),
            enabled: true,
            options: PluginOptions::default(),
            plugin,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn publish(mut self, publish: bool) -> Self {
        self.options.publish = publish;
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.values.insert(key.into(), value.into());
        self
    }
}

/// Directory a plugin writes its report into
///
/// Key `k` lands at `<output>/<plugin id>/<k>`. Written keys are remembered
/// so they can be uploaded when the report is published.
#[derive(Debug, Clone)]
pub struct PluginFiles {
    root: PathBuf,
    keys: Vec<String>,
}

impl PluginFiles {
    pub fn new(output: &Path, plugin_id: &str) -> Self {
        PluginFiles {
            root: output.join(plugin_id),
            keys: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Keys written so far, in first-write order
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Path for `key`, refusing keys that leave this plugin's directory
    fn checked_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::RootDir | Component::Prefix(_) | Component::ParentDir
            )
        });
        if key.is_empty() || escapes {
            return Err(Error::Other(format!(
                "invalid file key '{}': keys must stay under {}",
                key,
                self.root.display()
            )));
        }
        Ok(self.root.join(relative))
    }

    pub fn write_file(&mut self, key: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.checked_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        if !self.keys.iter().any(|k| k == key) {
            self.keys.push(key.to_string());
        }
        Ok(path)
    }

    pub fn write_json<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<PathBuf> {
        let contents = serde_json::to_vec_pretty(value)?;
        self.write_file(key, &contents)
    }
}

/// What a plugin sees of the report it works on
#[derive(Debug, Clone)]
pub struct PluginContext {
    pub plugin_id: String,
    pub report_uuid: String,
    pub report_name: String,
    pub files: PluginFiles,
}

impl PluginContext {
    pub fn new(plugin_id: &str, report_uuid: &str, report_name: &str, output: &Path) -> Self {
        PluginContext {
            plugin_id: plugin_id.to_string(),
            report_uuid: report_uuid.to_string(),
            report_name: report_name.to_string(),
            files: PluginFiles::new(output, plugin_id),
        }
    }
}

/// Short description of a finished report, shown in combined summaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSummary {
    pub name: String,
    pub plugin: String,
    pub stats: TestStatistic,
    pub status: TestStatus,
    /// Milliseconds.
    pub duration: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_href: Option<String>,
    #[serde(default)]
    pub new_tests: usize,
    #[serde(default)]
    pub flaky_tests: usize,
    #[serde(default)]
    pub retry_tests: usize,
}

impl PluginSummary {
    /// Summary of `store` as seen by the plugin `plugin`
    pub fn from_store(name: &str, plugin: &str, store: &ResultStore) -> Self {
        let stats = store.tests_statistic();
        let results = store.all_test_results(false);
        let duration = results
            .iter()
            .filter_map(|tr| tr.effective_duration())
            .map(|d| d.as_millis() as u64)
            .sum();
        let new_tests = results
            .iter()
            .filter(|tr| store.transition_by_tr_id(&tr.id) == Some(TestTransition::New))
            .count();

        PluginSummary {
            name: name.to_string(),
            plugin: plugin.to_string(),
            stats,
            status: stats.worst_status(),
            duration,
            created_at: Utc::now(),
            href: None,
            remote_href: None,
            new_tests,
            flaky_tests: stats.flaky,
            retry_tests: stats.retries,
        }
    }
}
