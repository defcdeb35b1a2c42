//! File-based history
//!
//! History is a JSON Lines file: one [`HistoryDataPoint`] per line, oldest
//! first. New points are appended; the file is only rewritten in full when
//! the retention limit drops old points.

use crate::error::Result;
use crate::history::{limit_history, HistoryDataPoint, HistorySink};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub struct FileHistory {
    path: PathBuf,
    limit: Option<i64>,
}

impl FileHistory {
    /// History stored at `path`, keeping at most `limit` points
    pub fn new(path: impl Into<PathBuf>, limit: Option<i64>) -> Self {
        FileHistory {
            path: path.into(),
            limit,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the points in file order (oldest first)
    fn read_lines(&self) -> Result<Vec<HistoryDataPoint>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.path)?;
        let mut points = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryDataPoint>(trimmed) {
                Ok(point) => points.push(point),
                Err(e) => tracing::warn!(
                    "skipping malformed history entry at {}:{}: {}",
                    self.path.display(),
                    number + 1,
                    e
                ),
            }
        }

        Ok(points)
    }

    fn write_all(&self, points: &[HistoryDataPoint]) -> Result<()> {
        let mut contents = String::new();
        for point in points {
            contents.push_str(&serde_json::to_string(point)?);
            contents.push('\n');
        }
        fs::write(&self.path, contents)?;
        Ok(())
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

impl HistorySink for FileHistory {
    fn read_history(&self) -> Result<Vec<HistoryDataPoint>> {
        let mut points = self.read_lines()?;
        points.reverse();
        // stable: equal timestamps keep most-recently-appended first
        points.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(points)
    }

    fn append_history(&mut self, point: &HistoryDataPoint) -> Result<()> {
        self.ensure_parent()?;

        if let Some(limit) = self.limit {
            let mut points = self.read_lines()?;
            if points.len() as i64 + 1 > limit {
                points.push(point.clone());
                let kept = limit_history(points, Some(limit));
                tracing::debug!(
                    "rewriting {} with {} history points",
                    self.path.display(),
                    kept.len()
                );
                return self.write_all(&kept);
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(point)?)?;
        Ok(())
    }
}
