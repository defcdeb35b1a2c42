//! Test result data structures
//!
//! These are the records the engine ingests. They serialize to camelCase
//! JSON, which is the format of result files, stage dumps and history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Run-local identifier of a test result
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TestId(String);

impl TestId {
    /// Creates a new test identifier from a string.
    pub fn new(id: impl Into<String>) -> Self {
        TestId(id.into())
    }

    /// Returns the test identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TestId {
    fn from(s: String) -> Self {
        TestId(s)
    }
}

impl From<&str> for TestId {
    fn from(s: &str) -> Self {
        TestId(s.to_string())
    }
}

/// Status of a test execution.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// Test passed.
    Passed,
    /// Test failed an assertion.
    Failed,
    /// Test hit an unexpected error.
    Broken,
    /// Test was skipped or disabled.
    Skipped,
    /// No verdict was reported.
    #[default]
    Unknown,
}

impl TestStatus {
    /// Every status, in display order.
    pub const ALL: [TestStatus; 5] = [
        TestStatus::Passed,
        TestStatus::Failed,
        TestStatus::Broken,
        TestStatus::Skipped,
        TestStatus::Unknown,
    ];

    /// Returns true for failed and broken results.
    pub fn is_failure(&self) -> bool {
        matches!(self, TestStatus::Failed | TestStatus::Broken)
    }

    /// Returns true if the status carries a verdict, i.e. it is neither
    /// skipped nor unknown.
    pub fn is_significant(&self) -> bool {
        !matches!(self, TestStatus::Skipped | TestStatus::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Broken => "broken",
            TestStatus::Skipped => "skipped",
            TestStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A name/value label attached to a result. Names may repeat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Label {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A step inside a test, possibly with nested steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestStep {
    pub name: String,
    pub status: TestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    #[serde(with = "duration_ms", skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<TestStep>,
}

/// Result of a single test execution in the current run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestResult {
    /// Run-local identifier.
    pub id: TestId,
    /// Identity of the logical test across runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    pub status: TestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<DateTime<Utc>>,
    #[serde(with = "duration_ms", skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<TestStep>,
    /// Earlier attempts of this test within the run, newest first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub retries: Vec<TestResult>,
    /// Set for attempts superseded by a later retry, or by the reader.
    pub hidden: bool,
    /// Set for results matching a known issue.
    pub known: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub title_path: Vec<String>,
    /// Source names of attachments referenced by this result.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

impl TestResult {
    /// Create a result with the given status, named after its id
    pub fn new(id: impl Into<TestId>, status: TestStatus) -> Self {
        let id = id.into();
        TestResult {
            name: id.as_str().to_string(),
            id,
            status,
            ..Default::default()
        }
    }

    /// Create a passed test result
    pub fn passed(id: impl Into<TestId>) -> Self {
        Self::new(id, TestStatus::Passed)
    }

    /// Create a failed test result
    pub fn failed(id: impl Into<TestId>, message: impl Into<String>) -> Self {
        let mut result = Self::new(id, TestStatus::Failed);
        result.message = Some(message.into());
        result
    }

    /// Create a broken test result
    pub fn broken(id: impl Into<TestId>, message: impl Into<String>) -> Self {
        let mut result = Self::new(id, TestStatus::Broken);
        result.message = Some(message.into());
        result
    }

    /// Create a skipped test result
    pub fn skipped(id: impl Into<TestId>) -> Self {
        Self::new(id, TestStatus::Skipped)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_history_id(mut self, history_id: impl Into<String>) -> Self {
        self.history_id = Some(history_id.into());
        self
    }

    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push(Label::new(name, value));
        self
    }

    pub fn with_title_path<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.title_path = segments.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_stop(mut self, stop: DateTime<Utc>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn with_retry(mut self, retry: TestResult) -> Self {
        self.retries.push(retry);
        self
    }

    pub fn with_attachment(mut self, source: impl Into<String>) -> Self {
        self.attachments.push(source.into());
        self
    }

    /// Values of every label named `name`, in declaration order
    pub fn label_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.labels
            .iter()
            .filter(move |l| l.name == name)
            .map(|l| l.value.as_str())
    }

    /// First value of the label named `name`
    pub fn label_value(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }

    /// Duration as reported, or derived from start/stop
    pub fn effective_duration(&self) -> Option<Duration> {
        if self.duration.is_some() {
            return self.duration;
        }
        match (self.start, self.stop) {
            (Some(start), Some(stop)) => (stop - start).to_std().ok(),
            _ => None,
        }
    }

    pub fn has_retries(&self) -> bool {
        !self.retries.is_empty()
    }

    /// Attachment source names used by this result and its steps
    pub fn all_attachment_sources(&self) -> Vec<&str> {
        fn collect<'a>(steps: &'a [TestStep], out: &mut Vec<&'a str>) {
            for step in steps {
                out.extend(step.attachments.iter().map(String::as_str));
                collect(&step.steps, out);
            }
        }

        let mut sources: Vec<&str> = self.attachments.iter().map(String::as_str).collect();
        collect(&self.steps, &mut sources);
        sources
    }
}

/// Whether a fixture runs before or after its tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixtureType {
    Before,
    After,
}

/// Setup or teardown code attached to one or more results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestFixture {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub fixture_type: FixtureType,
    #[serde(default)]
    pub status: TestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<DateTime<Utc>>,
    #[serde(default)]
    pub test_result_ids: Vec<TestId>,
}

/// Metadata for an attachment file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentLink {
    pub id: String,
    pub name: String,
    pub content_type: String,
    /// File name results use to refer to this attachment.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Counts of results per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStatistic {
    pub passed: usize,
    pub failed: usize,
    pub broken: usize,
    pub skipped: usize,
    pub unknown: usize,
    pub total: usize,
    /// Results that were retried within the run.
    pub retries: usize,
    /// Results whose attempts disagreed on the verdict.
    pub flaky: usize,
}

impl TestStatistic {
    /// Count one result with the given status.
    pub fn record(&mut self, status: TestStatus) {
        match status {
            TestStatus::Passed => self.passed += 1,
            TestStatus::Failed => self.failed += 1,
            TestStatus::Broken => self.broken += 1,
            TestStatus::Skipped => self.skipped += 1,
            TestStatus::Unknown => self.unknown += 1,
        }
        self.total += 1;
    }

    pub fn count(&self, status: TestStatus) -> usize {
        match status {
            TestStatus::Passed => self.passed,
            TestStatus::Failed => self.failed,
            TestStatus::Broken => self.broken,
            TestStatus::Skipped => self.skipped,
            TestStatus::Unknown => self.unknown,
        }
    }

    /// Failed plus broken.
    pub fn failures(&self) -> usize {
        self.failed + self.broken
    }

    /// Add the counts of `other` to these.
    pub fn merge(&mut self, other: &TestStatistic) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.broken += other.broken;
        self.skipped += other.skipped;
        self.unknown += other.unknown;
        self.total += other.total;
        self.retries += other.retries;
        self.flaky += other.flaky;
    }

    /// The worst status present, used as the overall verdict of a run.
    pub fn worst_status(&self) -> TestStatus {
        if self.failed > 0 {
            TestStatus::Failed
        } else if self.broken > 0 {
            TestStatus::Broken
        } else if self.passed > 0 {
            TestStatus::Passed
        } else if self.skipped > 0 {
            TestStatus::Skipped
        } else {
            TestStatus::Unknown
        }
    }
}

/// Serde helpers storing durations as integer milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
