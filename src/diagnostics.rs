use crate::clean::{UnparsableDate, MAX_UNPARSABLE_SAMPLES};
use crate::error::Result;
use crate::join::JoinKeyDuplicationWarning;
use serde::Serialize;
use uuid::Uuid;

/// Row accounting for one executed plan stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub op: String,
    pub rows_in: usize,
    pub rows_out: usize,
    /// Rows excluded by this stage (missing fields, bad dates, no category,
    /// no join partner); grouping does not count as dropping
    pub dropped: usize,
}

/// What happened during one report run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunDiagnostics {
    pub run_id: Uuid,
    pub report: String,
    pub stages: Vec<StageReport>,
    pub join_warnings: Vec<JoinKeyDuplicationWarning>,
    /// Fields that did not coerce to their declared type at ingest
    pub coerced_to_missing: usize,
    pub unparsable_dates: usize,
    pub unparsable_samples: Vec<UnparsableDate>,
    /// Destinations written, in execution order
    pub outputs: Vec<String>,
}

impl RunDiagnostics {
    pub fn new(run_id: Uuid, report: impl Into<String>) -> Self {
        RunDiagnostics {
            run_id,
            report: report.into(),
            stages: Vec::new(),
            join_warnings: Vec::new(),
            coerced_to_missing: 0,
            unparsable_dates: 0,
            unparsable_samples: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn record_stage(&mut self, report: StageReport) {
        self.stages.push(report);
    }

    pub fn record_unparsable(&mut self, count: usize, samples: Vec<UnparsableDate>) {
        self.unparsable_dates += count;
        let room = MAX_UNPARSABLE_SAMPLES.saturating_sub(self.unparsable_samples.len());
        self.unparsable_samples.extend(samples.into_iter().take(room));
    }

    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.stage == name)
    }

    /// Rows dropped across all stages.
    pub fn total_dropped(&self) -> usize {
        self.stages.iter().map(|report| report.dropped).sum()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
