//! In-memory store of one report run
//!
//! The store owns everything ingested for the current run: results,
//! fixtures, attachments and free-form metadata, plus the history read at
//! start. Writes with an id already present overwrite; queries on an empty
//! store return empty collections.
//!
//! Attempts of the same test (same `history_id`) are merged at ingestion:
//! the latest attempt stays visible and carries the others as `retries`,
//! which are kept as hidden results. Results read as hidden are stored as
//! they are and never become visible.

use crate::error::{Error, Result};
use crate::history::{
    classify_transition, is_flaky, match_history_for_result, HistoryDataPoint, HistoryTestResult,
    TestTransition,
};
use crate::model::{AttachmentLink, TestFixture, TestId, TestResult, TestStatistic};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// Format version of stage dumps
pub const STAGE_DUMP_VERSION: u32 = 1;

/// Serialized snapshot of a store, used to split a build into stages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDump {
    pub version: u32,
    /// Visible results, each carrying its retries.
    pub results: Vec<TestResult>,
    #[serde(default)]
    pub fixtures: Vec<TestFixture>,
    #[serde(default)]
    pub attachments: Vec<AttachmentLink>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl StageDump {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let dump: StageDump = serde_json::from_str(&contents)?;
        if dump.version != STAGE_DUMP_VERSION {
            return Err(Error::Parse(format!(
                "{}: unsupported stage dump version {}",
                path.display(),
                dump.version
            )));
        }
        Ok(dump)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ResultStore {
    results: HashMap<TestId, TestResult>,
    /// Ingestion order of result ids.
    order: Vec<TestId>,
    /// history id -> id of the visible result carrying it.
    visible_by_history_id: HashMap<String, TestId>,
    fixtures: HashMap<String, TestFixture>,
    fixture_order: Vec<String>,
    attachments: HashMap<String, AttachmentLink>,
    attachment_order: Vec<String>,
    metadata: BTreeMap<String, serde_json::Value>,
    history: Vec<HistoryDataPoint>,
}

/// Newer attempts sort first; attempts without a stop time are oldest.
fn newest_first(a: &TestResult, b: &TestResult) -> std::cmp::Ordering {
    b.stop.cmp(&a.stop)
}

/// Copy of `attempt` as stored once a later attempt replaced it
fn superseded(attempt: &TestResult) -> TestResult {
    let mut hidden = attempt.clone();
    hidden.hidden = true;
    hidden.retries.clear();
    hidden
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_raw(&mut self, result: TestResult) {
        if !self.results.contains_key(&result.id) {
            self.order.push(result.id.clone());
        }
        self.results.insert(result.id.clone(), result);
    }

    /// Add a result, merging it with other attempts of the same test.
    pub fn add_result(&mut self, result: TestResult) {
        if let Some(history_id) = self
            .results
            .get(&result.id)
            .and_then(|previous| previous.history_id.clone())
        {
            if self.visible_by_history_id.get(&history_id) == Some(&result.id) {
                self.visible_by_history_id.remove(&history_id);
            }
        }

        for retry in &result.retries {
            self.insert_raw(superseded(retry));
        }

        // Results read as hidden never compete for visibility.
        let Some(history_id) = result.history_id.clone().filter(|_| !result.hidden) else {
            self.insert_raw(result);
            return;
        };

        let existing = self
            .visible_by_history_id
            .get(&history_id)
            .and_then(|id| self.results.get(id))
            .filter(|existing| existing.id != result.id)
            .cloned();
        let Some(existing) = existing else {
            self.visible_by_history_id
                .insert(history_id, result.id.clone());
            self.insert_raw(result);
            return;
        };

        let (mut winner, loser) = if result.stop >= existing.stop {
            (result, existing)
        } else {
            (existing, result)
        };
        tracing::debug!(
            "{} supersedes {} for history id {}",
            winner.id,
            loser.id,
            history_id
        );

        let hidden = superseded(&loser);
        winner.retries.extend(loser.retries);
        winner.retries.push(hidden.clone());
        winner.retries.sort_by(newest_first);
        winner.retries.dedup_by(|a, b| a.id == b.id);

        self.insert_raw(hidden);
        self.visible_by_history_id
            .insert(history_id, winner.id.clone());
        self.insert_raw(winner);
    }

    pub fn add_fixture(&mut self, fixture: TestFixture) {
        if !self.fixtures.contains_key(&fixture.id) {
            self.fixture_order.push(fixture.id.clone());
        }
        self.fixtures.insert(fixture.id.clone(), fixture);
    }

    pub fn add_attachment(&mut self, attachment: AttachmentLink) {
        if !self.attachments.contains_key(&attachment.id) {
            self.attachment_order.push(attachment.id.clone());
        }
        self.attachments.insert(attachment.id.clone(), attachment);
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn metadata(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    /// Replace the history known to this run
    pub fn set_history(&mut self, points: Vec<HistoryDataPoint>) {
        self.history = points;
    }

    /// Results in ingestion order; hidden retries only if asked for
    pub fn all_test_results(&self, include_hidden: bool) -> Vec<&TestResult> {
        self.order
            .iter()
            .filter_map(|id| self.results.get(id))
            .filter(|tr| include_hidden || !tr.hidden)
            .collect()
    }

    pub fn test_result_by_id(&self, id: &TestId) -> Option<&TestResult> {
        self.results.get(id)
    }

    pub fn all_fixtures(&self) -> Vec<&TestFixture> {
        self.fixture_order
            .iter()
            .filter_map(|id| self.fixtures.get(id))
            .collect()
    }

    pub fn all_attachments(&self) -> Vec<&AttachmentLink> {
        self.attachment_order
            .iter()
            .filter_map(|id| self.attachments.get(id))
            .collect()
    }

    /// History points, most recent first
    pub fn all_history_data_points(&self) -> &[HistoryDataPoint] {
        &self.history
    }

    pub fn history_by_tr_id(&self, id: &TestId) -> Vec<HistoryTestResult> {
        match self.results.get(id) {
            Some(result) => match_history_for_result(&self.history, result),
            None => Vec::new(),
        }
    }

    pub fn retries_by_tr_id(&self, id: &TestId) -> &[TestResult] {
        self.results
            .get(id)
            .map(|result| result.retries.as_slice())
            .unwrap_or(&[])
    }

    pub fn fixtures_by_tr_id(&self, id: &TestId) -> Vec<&TestFixture> {
        self.all_fixtures()
            .into_iter()
            .filter(|fixture| fixture.test_result_ids.contains(id))
            .collect()
    }

    pub fn attachments_by_tr_id(&self, id: &TestId) -> Vec<&AttachmentLink> {
        let Some(result) = self.results.get(id) else {
            return Vec::new();
        };
        let sources = result.all_attachment_sources();
        self.all_attachments()
            .into_iter()
            .filter(|attachment| sources.contains(&attachment.source.as_str()))
            .collect()
    }

    pub fn transition_by_tr_id(&self, id: &TestId) -> Option<TestTransition> {
        let result = self.results.get(id)?;
        classify_transition(result, &self.history_by_tr_id(id))
    }

    /// Visible results bucketed by their first value of `label_name`
    ///
    /// Results without the label land in the `None` bucket.
    pub fn test_results_by_label(
        &self,
        label_name: &str,
    ) -> BTreeMap<Option<String>, Vec<&TestResult>> {
        let mut buckets: BTreeMap<Option<String>, Vec<&TestResult>> = BTreeMap::new();
        for result in self.all_test_results(false) {
            let key = result.label_value(label_name).map(str::to_string);
            buckets.entry(key).or_default().push(result);
        }
        buckets
    }

    pub fn tests_statistic(&self) -> TestStatistic {
        let mut stats = TestStatistic::default();
        for result in self.all_test_results(false) {
            stats.record(result.status);
            if result.has_retries() {
                stats.retries += 1;
            }
            if is_flaky(result) {
                stats.flaky += 1;
            }
        }
        stats
    }

    /// Snapshot the store for a later [`ResultStore::restore`]
    pub fn dump(&self) -> StageDump {
        StageDump {
            version: STAGE_DUMP_VERSION,
            results: self
                .all_test_results(false)
                .into_iter()
                .cloned()
                .collect(),
            fixtures: self.all_fixtures().into_iter().cloned().collect(),
            attachments: self.all_attachments().into_iter().cloned().collect(),
            metadata: self.metadata.clone(),
        }
    }

    /// Replay a stage dump into this store
    pub fn restore(&mut self, dump: StageDump) {
        for result in dump.results {
            self.add_result(result);
        }
        for fixture in dump.fixtures {
            self.add_fixture(fixture);
        }
        for attachment in dump.attachments {
            self.add_attachment(attachment);
        }
        self.metadata.extend(dump.metadata);
    }
}
