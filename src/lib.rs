//! testreport - Aggregation, grouping and history engine for test reports
//!
//! testreport collects test results from many sources into one run, compares
//! them with the history of earlier runs, groups them into trees for
//! presentation and drives a list of report plugins over the result.
//!
//! # Architecture
//!
//! The library is organized into several key modules:
//!
//! - [`model`]: Test results, fixtures, attachments and statistics
//! - [`tree`]: Grouping of results by labels and title path
//! - [`history`]: History points, transitions, flakiness and history sinks
//! - [`store`]: The in-memory store of one run and its stage dumps
//! - [`reader`]: Reading result files into the store
//! - [`plugin`] and [`plugins`]: Report plugins and the built-in ones
//! - [`orchestrator`]: The lifecycle driving a report run
//! - [`quality_gate`] and [`categories`]: Checks and failure classification
//! - [`config`]: .treport.conf configuration file parsing
//! - [`commands`]: User-facing commands (generate, dump, history)
//! - [`ui`]: User interface abstraction for output
//! - [`error`]: Error types and Result alias
//!
//! # Example
//!
//! ```no_run
//! use testreport::history::FileHistory;
//! use testreport::model::TestResult;
//! use testreport::orchestrator::ReportOrchestrator;
//! use testreport::plugin::PluginDescriptor;
//! use testreport::plugins::DataPlugin;
//! use std::path::Path;
//!
//! # fn main() -> testreport::error::Result<()> {
//! let mut report = ReportOrchestrator::builder("Nightly", "build/report")
//!     .history_sink(FileHistory::new(".treport/history.jsonl", Some(20)))
//!     .plugin(PluginDescriptor::new("data", Box::new(DataPlugin::new())))
//!     .build()?;
//!
//! report.start()?;
//! report.read_directory(Path::new("build/test-results"))?;
//! report.read_result(TestResult::passed("smoke").with_history_id("smoke"))?;
//!
//! let outcome = report.done()?;
//! for violation in &outcome.quality_gate {
//!     eprintln!("{}", violation);
//! }
//! # Ok(())
//! # }
//! ```

pub mod categories;
pub mod commands;
pub mod config;
pub mod error;
pub mod history;
pub mod model;
pub mod orchestrator;
pub mod plugin;
pub mod plugins;
pub mod quality_gate;
pub mod reader;
pub mod store;
pub mod tree;
pub mod ui;

pub use error::{Error, Result};
