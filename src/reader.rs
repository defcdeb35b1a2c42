//! Reading result files
//!
//! Parsing result formats is delegated to a [`ResultsReader`]. The built-in
//! [`JsonResultsReader`] understands the engine's own JSON records:
//!
//! - `*-result.json`: one [`TestResult`]
//! - `*-fixture.json`: one [`TestFixture`]
//! - `*-attachment.*`: attachment content, referred to by file name

use crate::error::{Error, Result};
use crate::model::{AttachmentLink, TestFixture, TestResult};
use std::fs;
use std::path::Path;

/// Records produced from one source file
#[derive(Debug, Default)]
pub struct ReadOutcome {
    pub results: Vec<TestResult>,
    pub fixtures: Vec<TestFixture>,
    pub attachments: Vec<AttachmentLink>,
}

impl ReadOutcome {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.fixtures.is_empty() && self.attachments.is_empty()
    }
}

/// Turns a file into records
pub trait ResultsReader {
    /// Read `path`; inputs the reader does not handle must yield
    /// [`Error::UnrecognizedFormat`].
    fn read(&self, path: &Path) -> Result<ReadOutcome>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonResultsReader;

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("txt") | Some("log") => "text/plain",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("html") | Some("htm") => "text/html",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

impl ResultsReader for JsonResultsReader {
    fn read(&self, path: &Path) -> Result<ReadOutcome> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::UnrecognizedFormat(path.to_path_buf()))?;

        let mut outcome = ReadOutcome::default();
        if file_name.ends_with("-result.json") {
            let contents = fs::read_to_string(path)?;
            let result: TestResult = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("{}: {}", path.display(), e)))?;
            outcome.results.push(result);
        } else if file_name.ends_with("-fixture.json") {
            let contents = fs::read_to_string(path)?;
            let fixture: TestFixture = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("{}: {}", path.display(), e)))?;
            outcome.fixtures.push(fixture);
        } else if file_name.contains("-attachment") {
            let metadata = fs::metadata(path)?;
            outcome.attachments.push(AttachmentLink {
                id: file_name.to_string(),
                name: file_name.to_string(),
                content_type: content_type_for(path).to_string(),
                source: file_name.to_string(),
                path: Some(path.to_path_buf()),
                size: Some(metadata.len()),
            });
        } else {
            return Err(Error::UnrecognizedFormat(path.to_path_buf()));
        }

        Ok(outcome)
    }
}
