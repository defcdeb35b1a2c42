//! Machine-readable report data
//!
//! Writes the aggregated data of a run as JSON files other tools render:
//!
//! - `statistic.json`: counts per status
//! - `tree.json`: results grouped by labels, then title path
//! - `categories.json`: failure categories
//! - `history.json`: per-result transition, flakiness and history

use crate::categories::{categorize, CategoryRule};
use crate::error::Result;
use crate::history::{is_flaky, HistoryTestResult, TestTransition};
use crate::model::{TestId, TestResult, TestStatistic, TestStatus};
use crate::plugin::{Plugin, PluginContext, PluginOptions, PluginSummary};
use crate::store::ResultStore;
use crate::tree::{group_by_labels_then_title_path, TreeData};
use serde::Serialize;
use std::collections::BTreeMap;

/// Labels results are grouped by unless `group_by` says otherwise
pub const DEFAULT_GROUP_BY: &[&str] = &["parentSuite", "suite", "subSuite"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafData {
    pub name: String,
    pub status: TestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    pub flaky: bool,
    pub retries_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<TestTransition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupData {
    pub statistic: TestStatistic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    transition: Option<TestTransition>,
    flaky: bool,
    history: Vec<HistoryTestResult>,
}

#[derive(Debug, Clone)]
pub struct DataPlugin {
    group_by: Vec<String>,
    category_rules: Vec<CategoryRule>,
}

impl Default for DataPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl DataPlugin {
    pub fn new() -> Self {
        DataPlugin {
            group_by: DEFAULT_GROUP_BY.iter().map(|s| s.to_string()).collect(),
            category_rules: Vec::new(),
        }
    }

    /// Build from configuration; `group_by` is a comma separated label list
    pub fn from_options(options: &PluginOptions) -> Result<Self> {
        let mut plugin = Self::new();
        if let Some(group_by) = options.get("group_by") {
            plugin.group_by = group_by
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(plugin)
    }

    pub fn with_category_rules(mut self, rules: Vec<CategoryRule>) -> Self {
        self.category_rules = rules;
        self
    }

    pub fn group_by(&self) -> &[String] {
        &self.group_by
    }

    /// Tree of visible results, groups carrying running statistics
    pub fn build_tree(&self, store: &ResultStore) -> TreeData<LeafData, GroupData> {
        group_by_labels_then_title_path(
            store.all_test_results(false),
            &self.group_by,
            |tr| leaf_data(store, tr),
            |_, _| GroupData::default(),
            |group, leaf| group.statistic.record(leaf.data.status),
        )
    }

    fn write_history(&self, context: &mut PluginContext, store: &ResultStore) -> Result<()> {
        let entries: BTreeMap<&TestId, HistoryEntry> = store
            .all_test_results(false)
            .into_iter()
            .map(|tr| {
                let entry = HistoryEntry {
                    transition: store.transition_by_tr_id(&tr.id),
                    flaky: is_flaky(tr),
                    history: store.history_by_tr_id(&tr.id),
                };
                (&tr.id, entry)
            })
            .collect();
        context.files.write_json("history.json", &entries)?;
        Ok(())
    }
}

fn leaf_data(store: &ResultStore, result: &TestResult) -> LeafData {
    LeafData {
        name: result.name.clone(),
        status: result.status,
        duration: result.effective_duration().map(|d| d.as_millis() as u64),
        flaky: is_flaky(result),
        retries_count: result.retries.len(),
        transition: store.transition_by_tr_id(&result.id),
    }
}

impl Plugin for DataPlugin {
    fn update(&mut self, context: &mut PluginContext, store: &ResultStore) -> Result<()> {
        context
            .files
            .write_json("statistic.json", &store.tests_statistic())?;
        Ok(())
    }

    fn done(&mut self, context: &mut PluginContext, store: &ResultStore) -> Result<()> {
        context
            .files
            .write_json("statistic.json", &store.tests_statistic())?;
        context.files.write_json("tree.json", &self.build_tree(store))?;
        let categories = categorize(&self.category_rules, store.all_test_results(false));
        context.files.write_json("categories.json", &categories)?;
        self.write_history(context, store)?;

        tracing::debug!(
            "data plugin '{}' wrote {} files",
            context.plugin_id,
            context.files.keys().len()
        );
        Ok(())
    }

    fn info(&self, context: &PluginContext, store: &ResultStore) -> Result<Option<PluginSummary>> {
        Ok(Some(PluginSummary::from_store(
            &context.report_name,
            &context.plugin_id,
            store,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::test_helpers::point;
    use std::fs;
    use tempfile::TempDir;

    fn store_with_results() -> ResultStore {
        let mut store = ResultStore::new();
        store.add_result(
            TestResult::passed("1")
                .with_history_id("h1")
                .with_label("suite", "api")
                .with_title_path(["api.rs"]),
        );
        store.add_result(
            TestResult::failed("2", "boom")
                .with_history_id("h2")
                .with_label("suite", "api"),
        );
        store.add_result(TestResult::broken("3", "crash").with_history_id("h3"));
        store
    }

    #[test]
    fn test_group_by_option() {
        let mut options = PluginOptions::default();
        options
            .values
            .insert("group_by".to_string(), "epic, feature,".to_string());

        let plugin = DataPlugin::from_options(&options).unwrap();
        assert_eq!(plugin.group_by(), &["epic".to_string(), "feature".to_string()]);
        assert_eq!(DataPlugin::new().group_by().len(), 3);
    }

    #[test]
    fn test_tree_groups_carry_statistics() {
        let store = store_with_results();
        let tree = DataPlugin::from_options(&PluginOptions {
            publish: false,
            values: [("group_by".to_string(), "suite".to_string())].into(),
        })
        .unwrap()
        .build_tree(&store);

        assert_eq!(tree.root.groups.len(), 1);
        assert_eq!(tree.root.leaves, vec!["3".to_string()]);
        let api = &tree.groups_by_id[&tree.root.groups[0]];
        assert_eq!(api.name, "api");
        assert_eq!(api.data.statistic.total, 2);
        assert_eq!(api.data.statistic.failed, 1);
        assert_eq!(api.groups.len(), 1);
        assert_eq!(api.leaves, vec!["2".to_string()]);
    }

    #[test]
    fn test_done_writes_report_files() {
        let temp = TempDir::new().unwrap();
        let mut store = store_with_results();
        store.set_history(vec![point(
            "prev",
            1000,
            "",
            &[("h1", TestStatus::Failed), ("h2", TestStatus::Failed)],
        )]);
        let mut context = PluginContext::new("data", "uuid", "Nightly", temp.path());
        let mut plugin = DataPlugin::new();

        plugin.done(&mut context, &store).unwrap();

        assert_eq!(
            context.files.keys(),
            &[
                "statistic.json".to_string(),
                "tree.json".to_string(),
                "categories.json".to_string(),
                "history.json".to_string(),
            ]
        );

        let dir = temp.path().join("data");
        let statistic: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("statistic.json")).unwrap())
                .unwrap();
        assert_eq!(statistic["total"], 3);

        let history: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("history.json")).unwrap()).unwrap();
        assert_eq!(history["1"]["transition"], "fixed");
        assert!(history["2"].get("transition").is_none());
        assert_eq!(history["3"]["transition"], "new");

        let categories: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("categories.json")).unwrap())
                .unwrap();
        assert_eq!(categories[0]["name"], "Product defects");
        assert_eq!(categories[1]["resultIds"][0], "3");
    }

    #[test]
    fn test_update_only_refreshes_statistic() {
        let temp = TempDir::new().unwrap();
        let store = store_with_results();
        let mut context = PluginContext::new("data", "uuid", "Nightly", temp.path());

        DataPlugin::new().update(&mut context, &store).unwrap();
        assert_eq!(context.files.keys(), &["statistic.json".to_string()]);
    }

    #[test]
    fn test_info_summarises_run() {
        let temp = TempDir::new().unwrap();
        let store = store_with_results();
        let context = PluginContext::new("data", "uuid", "Nightly", temp.path());

        let summary = DataPlugin::new().info(&context, &store).unwrap().unwrap();
        assert_eq!(summary.name, "Nightly");
        assert_eq!(summary.plugin, "data");
        assert_eq!(summary.stats.total, 3);
        assert_eq!(summary.status, TestStatus::Failed);
    }
}
