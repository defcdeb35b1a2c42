//! Run history: snapshots of past runs and classification against them
//!
//! A [`HistoryDataPoint`] is a frozen snapshot of one past run. Results of the
//! current run are correlated with history through their `history_id`. All
//! functions in this module are total: missing data degrades to the
//! "no information" answer instead of failing.

use crate::error::Result;
use crate::model::{Label, TestId, TestResult, TestStatus};
use crate::store::ResultStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::time::Duration;
use url::Url;

pub mod file;
pub mod remote;

pub use file::FileHistory;
pub use remote::{RemoteHistory, RemoteService};

/// Historical shadow of a [`TestResult`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryTestResult {
    pub id: TestId,
    pub history_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    pub status: TestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<DateTime<Utc>>,
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default)]
    pub labels: Vec<Label>,
    /// Link to this result in the archived report; empty for local history.
    #[serde(default)]
    pub url: String,
}

impl HistoryTestResult {
    /// Snapshot `result`, which must carry a history id
    pub fn from_result(result: &TestResult) -> Option<Self> {
        let history_id = result.history_id.clone()?;
        Some(HistoryTestResult {
            id: result.id.clone(),
            history_id,
            name: result.name.clone(),
            full_name: result.full_name.clone(),
            status: result.status,
            message: result.message.clone(),
            start: result.start,
            stop: result.stop,
            duration: result.effective_duration().map(|d| d.as_millis() as u64),
            labels: result.labels.clone(),
            url: String::new(),
        })
    }
}

/// Snapshot of one past run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDataPoint {
    pub uuid: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    /// Every history id known at the time, to tell "absent" from "new".
    #[serde(default)]
    pub known_test_case_ids: BTreeSet<String>,
    /// History id to result. Keys always equal the record's `history_id`.
    #[serde(default)]
    pub test_results: BTreeMap<String, HistoryTestResult>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    /// Report URL when the run was published remotely.
    #[serde(default)]
    pub url: String,
}

/// How a result's status moved relative to its history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestTransition {
    /// No history at all.
    New,
    /// Now passing, previously failed or broken.
    Fixed,
    /// Now failing.
    Regressed,
    /// Now broken.
    Malfunctioned,
}

impl fmt::Display for TestTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TestTransition::New => "new",
            TestTransition::Fixed => "fixed",
            TestTransition::Regressed => "regressed",
            TestTransition::Malfunctioned => "malfunctioned",
        };
        f.write_str(s)
    }
}

/// Storage for history data points
pub trait HistorySink {
    /// Read all points, most recent first
    fn read_history(&self) -> Result<Vec<HistoryDataPoint>>;

    /// Append the point of the current run
    fn append_history(&mut self, point: &HistoryDataPoint) -> Result<()>;
}

/// Point `url` at `fragment`, replacing any existing fragment
fn with_fragment(url: &str, fragment: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(Some(fragment));
            parsed.to_string()
        }
        Err(_) => {
            let base = url.split('#').next().unwrap_or(url);
            format!("{}#{}", base, fragment)
        }
    }
}

/// Every historic entry of `result`, in the order of `points`
///
/// Entries from published points get a url deep-linking to the result in
/// that report.
pub fn match_history_for_result(
    points: &[HistoryDataPoint],
    result: &TestResult,
) -> Vec<HistoryTestResult> {
    let Some(history_id) = result.history_id.as_deref() else {
        return Vec::new();
    };

    points
        .iter()
        .filter_map(|point| {
            let entry = point.test_results.get(history_id)?;
            let mut entry = entry.clone();
            if !point.url.is_empty() {
                entry.url = with_fragment(&point.url, result.id.as_str());
            }
            Some(entry)
        })
        .collect()
}

/// Status of the newest entry that is neither skipped nor unknown
pub fn last_significant_status(history: &[HistoryTestResult]) -> Option<TestStatus> {
    history
        .iter()
        .map(|entry| entry.status)
        .find(TestStatus::is_significant)
}

/// Classify `result` against its (newest first) history
pub fn classify_transition(
    result: &TestResult,
    history: &[HistoryTestResult],
) -> Option<TestTransition> {
    if history.is_empty() {
        return Some(TestTransition::New);
    }

    let previous = last_significant_status(history)?;
    if previous == result.status {
        return None;
    }

    match result.status {
        TestStatus::Passed => Some(TestTransition::Fixed),
        TestStatus::Failed => Some(TestTransition::Regressed),
        TestStatus::Broken => Some(TestTransition::Malfunctioned),
        TestStatus::Skipped | TestStatus::Unknown => None,
    }
}

/// True if some retry of `result` ended with a different status
pub fn is_flaky(result: &TestResult) -> bool {
    result
        .retries
        .iter()
        .any(|retry| retry.status != result.status)
}

/// Keep the `limit` most recent points, preserving their relative order
///
/// No limit keeps everything; a limit of zero or less keeps nothing.
pub fn limit_history(points: Vec<HistoryDataPoint>, limit: Option<i64>) -> Vec<HistoryDataPoint> {
    let Some(limit) = limit else {
        return points;
    };
    if limit <= 0 {
        return Vec::new();
    }
    let limit = limit as usize;
    if points.len() <= limit {
        return points;
    }

    let mut by_recency: Vec<usize> = (0..points.len()).collect();
    by_recency.sort_by(|a, b| points[*b].timestamp.cmp(&points[*a].timestamp));
    let keep: HashSet<usize> = by_recency.into_iter().take(limit).collect();

    points
        .into_iter()
        .enumerate()
        .filter(|(i, _)| keep.contains(i))
        .map(|(_, point)| point)
        .collect()
}

/// Merge points read from several sinks
///
/// Points are deduplicated by uuid, the earlier source winning, and
/// returned most recent first.
pub fn merge_history(sources: Vec<Vec<HistoryDataPoint>>) -> Vec<HistoryDataPoint> {
    let mut seen = HashSet::new();
    let mut merged: Vec<HistoryDataPoint> = sources
        .into_iter()
        .flatten()
        .filter(|point| seen.insert(point.uuid.clone()))
        .collect();
    merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    merged
}

/// Build the history point of the current run from the store contents
pub fn create_history_point(
    store: &ResultStore,
    uuid: &str,
    name: &str,
    timestamp: DateTime<Utc>,
    url: Option<&str>,
) -> HistoryDataPoint {
    let results = store.all_test_results(false);

    let mut test_results = BTreeMap::new();
    let mut known_test_case_ids = BTreeSet::new();
    for entry in results.iter().filter_map(|tr| HistoryTestResult::from_result(tr)) {
        known_test_case_ids.insert(entry.history_id.clone());
        test_results.insert(entry.history_id.clone(), entry);
    }

    let stats = store.tests_statistic();
    let mut metrics = BTreeMap::new();
    for status in TestStatus::ALL {
        metrics.insert(status.as_str().to_string(), stats.count(status) as f64);
    }
    metrics.insert("total".to_string(), stats.total as f64);
    metrics.insert("flaky".to_string(), stats.flaky as f64);
    metrics.insert("retries".to_string(), stats.retries as f64);
    let duration: Duration = results
        .iter()
        .filter_map(|tr| tr.effective_duration())
        .sum();
    metrics.insert("duration".to_string(), duration.as_millis() as f64);

    HistoryDataPoint {
        uuid: uuid.to_string(),
        name: name.to_string(),
        timestamp,
        known_test_case_ids,
        test_results,
        metrics,
        url: url.unwrap_or_default().to_string(),
    }
}
