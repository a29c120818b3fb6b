// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Migration progress accounting.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

/// One failed record in the error report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationErrorEntry {
    pub protocol_id: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Counters for one batch run.
///
/// Every handled record increments `processed` and exactly one of
/// `successful` or `failed`. The error report keeps at most the configured
/// number of entries; the rest are only counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationProgress {
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<MigrationErrorEntry>,
    /// Errors dropped from the report once it was full.
    pub errors_truncated: usize,
    pub start_time: DateTime<Utc>,
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl MigrationProgress {
    pub fn new(total: usize, start_time: DateTime<Utc>) -> Self {
        Self {
            total,
            processed: 0,
            successful: 0,
            failed: 0,
            errors: Vec::new(),
            errors_truncated: 0,
            start_time,
            estimated_completion: None,
        }
    }

    /// Whole-percent success rate, 0 before anything was processed.
    pub fn success_rate(&self) -> u32 {
        if self.processed == 0 {
            return 0;
        }
        (self.successful as f64 / self.processed as f64 * 100.0).round() as u32
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.processed)
    }

    pub fn is_complete(&self) -> bool {
        self.processed >= self.total
    }

    pub fn record_success(&mut self) {
        self.processed += 1;
        self.successful += 1;
    }

    pub fn record_failure(
        &mut self,
        protocol_id: impl Into<String>,
        error: impl Into<String>,
        at: DateTime<Utc>,
        max_entries: usize,
    ) {
        self.processed += 1;
        self.failed += 1;
        if self.errors.len() < max_entries {
            self.errors.push(MigrationErrorEntry {
                protocol_id: protocol_id.into(),
                error: error.into(),
                timestamp: at,
            });
        } else {
            self.errors_truncated += 1;
        }
    }

    /// Project the finish time from the average time per processed record.
    pub fn update_estimate(&mut self, elapsed: Duration, now: DateTime<Utc>) {
        if self.processed == 0 {
            self.estimated_completion = None;
            return;
        }
        let average_ms = elapsed.as_millis() as f64 / self.processed as f64;
        let remaining_ms = (average_ms * self.remaining() as f64).round() as i64;
        self.estimated_completion = Some(now + TimeDelta::milliseconds(remaining_ms));
    }
}
