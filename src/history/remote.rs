//! Remote report service
//!
//! The transport is not part of this crate: callers plug in an implementation
//! of [`RemoteService`]. Failures the service reports deliberately should be
//! returned as [`Error::Service`](crate::error::Error::Service) so they reach
//! the operator verbatim.

use crate::error::Result;
use crate::history::{HistoryDataPoint, HistorySink};
use std::sync::Arc;

/// Client of a remote history and report publication service
pub trait RemoteService: Send + Sync {
    /// Fetch the history of the project, most recent first
    fn download_history(&self) -> Result<Vec<HistoryDataPoint>>;

    /// Register a new report, returning its public URL
    fn create_report(&self, report_uuid: &str, name: &str) -> Result<String>;

    /// Upload one report file under `key`
    fn upload_file(&self, report_uuid: &str, key: &str, contents: &[u8]) -> Result<()>;

    /// Mark the report as complete and attach the run's history point
    fn complete_report(&self, report_uuid: &str, history_point: &HistoryDataPoint) -> Result<()>;
}

/// History backed by a [`RemoteService`]
///
/// Appending is a no-op: the history point reaches the service when the
/// report is completed.
pub struct RemoteHistory {
    service: Arc<dyn RemoteService>,
}

impl RemoteHistory {
    pub fn new(service: Arc<dyn RemoteService>) -> Self {
        RemoteHistory { service }
    }
}

impl HistorySink for RemoteHistory {
    fn read_history(&self) -> Result<Vec<HistoryDataPoint>> {
        let mut points = self.service.download_history()?;
        points.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(points)
    }

    fn append_history(&mut self, point: &HistoryDataPoint) -> Result<()> {
        tracing::debug!("history point {} is published with the report", point.uuid);
        Ok(())
    }
}
