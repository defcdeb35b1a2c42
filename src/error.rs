//! Error types for testreport
//!
//! Errors fall into two families when they reach an operator. Known errors
//! (service responses, lifecycle misuse, configuration problems) carry a
//! message that is safe to print as is. Everything else is unknown: the
//! [`ErrorReporter`] writes the details to a diagnostic log and only points
//! the operator at that file.

use chrono::Utc;
use std::backtrace::Backtrace;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for testreport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for testreport
#[derive(Error, Debug)]
pub enum Error {
    /// The remote report service rejected a request.
    #[error("{message} (status {status})")]
    Service { status: u16, message: String },

    /// A data-accepting method was called before `start()`.
    #[error("Report is not initialised: call start() before feeding results or calling done()")]
    NotStarted,

    /// `start()` was called twice.
    #[error("Report has already been started")]
    AlreadyStarted,

    /// The report lifecycle has finished; no more data is accepted.
    #[error("Report has already been completed")]
    AlreadyCompleted,

    /// The reader does not understand this input.
    #[error("Unrecognized result format: {0}")]
    UnrecognizedFormat(PathBuf),

    /// No results could be found in any of the given sources.
    #[error("No test results found")]
    NoResults,

    /// Configuration file error or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A plugin failed while generating its output.
    #[error("Plugin {id} failed: {message}")]
    Plugin { id: String, message: String },

    /// Failed to parse result data.
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error with custom message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Returns true if the message can be shown to an operator verbatim.
    pub fn is_known(&self) -> bool {
        matches!(
            self,
            Error::Service { .. }
                | Error::NotStarted
                | Error::AlreadyStarted
                | Error::AlreadyCompleted
                | Error::NoResults
                | Error::Config(_)
        )
    }

    /// Returns true if ingestion should skip the offending source and carry on.
    pub fn is_recoverable_format_error(&self) -> bool {
        matches!(
            self,
            Error::UnrecognizedFormat(_) | Error::Parse(_) | Error::Json(_)
        )
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

/// Turns errors into operator-facing messages.
///
/// Unknown errors are appended to a daily log file in `log_dir` together
/// with a timestamp and a captured backtrace.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    log_dir: PathBuf,
}

impl ErrorReporter {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        ErrorReporter {
            log_dir: log_dir.into(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Path of the log file entries written today go to.
    pub fn log_file(&self) -> PathBuf {
        self.log_dir
            .join(format!("treport-{}.log", Utc::now().format("%Y-%m-%d")))
    }

    /// Produce the message to show for `err`.
    pub fn describe(&self, err: &Error) -> String {
        if err.is_known() {
            return err.to_string();
        }

        match self.write_entry(err) {
            Ok(path) => format!(
                "An unexpected error occurred. Details were written to {}",
                path.display()
            ),
            Err(log_err) => {
                tracing::warn!("failed to write diagnostic log: {}", log_err);
                "An unexpected error occurred and the diagnostic log could not be written"
                    .to_string()
            }
        }
    }

    fn write_entry(&self, err: &Error) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.log_dir)?;
        let path = self.log_file();
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "[{}] {}", Utc::now().to_rfc3339(), err)?;
        writeln!(file, "{:?}", err)?;
        writeln!(file, "{}", Backtrace::force_capture())?;
        writeln!(file)?;
        Ok(path)
    }
}
