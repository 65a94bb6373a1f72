//! Rolling run history.
//!
//! The history is an oldest-first list of [`RunRecord`]s capped at a fixed
//! number of entries. It round-trips through JSON; the shape is compatible
//! with reports written by the original shell-era tooling.

pub mod stats;

use std::collections::VecDeque;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::probes::ProbeResult;

pub use self::stats::{compute_stats, EndpointStats, StatsParams, Status, SuccessRate, Trend, TrendMark};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to decode history: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode history: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Results of one run, one entry per probed endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub date: NaiveDate,
    pub results: Vec<ProbeResult>,
}

impl RunRecord {
    pub fn new(date: NaiveDate, results: Vec<ProbeResult>) -> Self {
        Self { date, results }
    }

    /// Result for the endpoint with the given base URL, if it was probed.
    pub fn result_for(&self, key: &str) -> Option<&ProbeResult> {
        self.results.iter().find(|r| r.endpoint == key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    records: VecDeque<RunRecord>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = RunRecord>) -> Self {
        Self {
            records: records.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Oldest first.
    pub fn records(&self) -> impl DoubleEndedIterator<Item = &RunRecord> + ExactSizeIterator {
        self.records.iter()
    }

    pub fn latest(&self) -> Option<&RunRecord> {
        self.records.back()
    }

    /// The newest `n` records, still oldest first.
    pub fn last_n(&self, n: usize) -> impl Iterator<Item = &RunRecord> {
        self.records.iter().skip(self.records.len().saturating_sub(n))
    }

    /// Append `record`, then drop the oldest records until at most
    /// `max_days` remain. The new record itself is always kept.
    pub fn merge(&mut self, record: RunRecord, max_days: usize) {
        self.records.push_back(record);
        let cap = max_days.max(1);
        let mut dropped = 0;
        while self.records.len() > cap {
            self.records.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, kept = self.records.len(), "trimmed history window");
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, HistoryError> {
        serde_json::to_string_pretty(self).map_err(HistoryError::Encode)
    }

    pub fn from_json(json: &str) -> Result<Self, HistoryError> {
        serde_json::from_str(json).map_err(HistoryError::Decode)
    }
}

/// Owned form of [`History::merge`].
pub fn merge(mut history: History, record: RunRecord, max_days: usize) -> History {
    history.merge(record, max_days);
    history
}
