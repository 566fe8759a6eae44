//! Recently processed jobs
//!
//! A small FIFO of the last few composites, oldest first. Adding a job that
//! is already present moves it to the newest slot instead of duplicating it.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::band::BandSettings;

/// Number of jobs kept
pub const HISTORY_CAPACITY: usize = 5;

/// One processed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: Uuid,
    pub file_name: String,
    pub output_name: String,
    pub settings: BandSettings,
    pub page_count: u32,
    pub processed_at: DateTime<Utc>,
}

impl JobRecord {
    /// New record with a fresh id, stamped now
    pub fn new(
        file_name: impl Into<String>,
        output_name: impl Into<String>,
        settings: BandSettings,
        page_count: u32,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            file_name: file_name.into(),
            output_name: output_name.into(),
            settings,
            page_count,
            processed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobHistory {
    entries: VecDeque<JobRecord>,
    capacity: usize,
}

impl Default for JobHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl JobHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// History holding at most `capacity` jobs (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a job as the newest entry. Returns the evicted oldest job, if any.
    pub fn push(&mut self, record: JobRecord) -> Option<JobRecord> {
        if let Some(pos) = self.position(record.job_id) {
            self.entries.remove(pos);
        }
        self.entries.push_back(record);
        if self.entries.len() > self.capacity {
            self.entries.pop_front()
        } else {
            None
        }
    }

    /// Oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &JobRecord> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, job_id: Uuid) -> Option<usize> {
        self.entries.iter().position(|r| r.job_id == job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn settings() -> BandSettings {
        BandSettings {
            height: 60.0,
            y_offset: 0.0,
            background_color: Some("#ffffff".into()),
            text_content: None,
            text_color: None,
        }
    }

    fn record(name: &str) -> JobRecord {
        JobRecord::new(name, format!("{}_modified.pdf", name), settings(), 1)
    }

    #[test]
    fn test_sixth_push_evicts_oldest() {
        let mut history = JobHistory::new();
        let records: Vec<JobRecord> = (0..6).map(|i| record(&format!("f{}", i))).collect();
        for r in &records[..5] {
            assert_eq!(history.push(r.clone()), None);
        }
        let evicted = history.push(records[5].clone()).unwrap();
        assert_eq!(evicted.file_name, "f0");
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.iter().last().unwrap().file_name, "f5");
    }

    #[test]
    fn test_repush_moves_to_newest() {
        let mut history = JobHistory::new();
        let first = record("first");
        history.push(first.clone());
        history.push(record("second"));

        let mut updated = first.clone();
        updated.page_count = 3;
        assert_eq!(history.push(updated), None);

        assert_eq!(history.len(), 2);
        let names: Vec<&str> = history.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["second", "first"]);
        assert_eq!(history.iter().last().unwrap().page_count, 3);
    }

    #[test]
    fn test_newest_first_listing() {
        let mut history = JobHistory::new();
        assert!(history.is_empty());
        for name in ["a", "b", "c"] {
            history.push(record(name));
        }
        let newest_first: Vec<JobRecord> = history.iter().rev().cloned().collect();
        let names: Vec<&str> = newest_first.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
        assert_eq!(history.iter().len(), 3);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let json = serde_json::to_value(record("flyer.pdf")).unwrap();
        assert!(json.get("jobId").is_some());
        assert_eq!(json["outputName"], "flyer.pdf_modified.pdf");
        assert_eq!(json["settings"]["height"], 60.0);
    }
}
