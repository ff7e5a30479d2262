use crate::error::TaskError;
use crate::pipeline::PipelineStage;
use serde::Serialize;

/// Outcome of one pipeline stage over one tier.
#[derive(Clone, Debug, Serialize)]
pub struct StageReport {
    pub stage: PipelineStage,
    pub elapsed_ms: f64,
    /// Tasks that ran and succeeded.
    pub processed: usize,
    /// Tasks skipped because their output already existed (or had nothing
    /// to do).
    pub skipped: usize,
    /// Per-cell (or per-layer) failures; empty on a clean stage.
    pub failures: Vec<TaskError>,
}

impl StageReport {
    pub fn new(
        stage: PipelineStage,
        elapsed_ms: f64,
        processed: usize,
        skipped: usize,
        failures: Vec<TaskError>,
    ) -> Self {
        Self {
            stage,
            elapsed_ms,
            processed,
            skipped,
            failures,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of one full tier run, stage by stage.
#[derive(Clone, Debug, Serialize)]
pub struct TierReport {
    pub tier: u32,
    pub cell_count: usize,
    pub split: StageReport,
    pub matching: StageReport,
    pub align: StageReport,
    pub warp: StageReport,
}

impl TierReport {
    pub fn failures(&self) -> impl Iterator<Item = &TaskError> {
        self.split
            .failures
            .iter()
            .chain(&self.matching.failures)
            .chain(&self.align.failures)
            .chain(&self.warp.failures)
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}
