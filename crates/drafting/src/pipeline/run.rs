//! One execution of a pipeline, owned by the requesting call.

use crate::pipeline::stage::{PipelineState, StageInput, StageName, StageResult, StageStatus};
use casedraft_core::provider::Usage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    /// Fact extraction, structuring and tone finishing in sequence.
    Staged,
    /// One generation call straight from the assembled context.
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

/// Record of one pipeline execution.
///
/// A staged run always carries exactly three stage records, in order. The
/// artifact is present only once the run has succeeded. Outputs of stages
/// that finished before a failure stay available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub mode: PipelineMode,
    pub state: PipelineState,
    pub status: RunStatus,
    pub stages: Vec<StageResult>,
    pub artifact: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(mode: PipelineMode) -> Self {
        let stages = match mode {
            PipelineMode::Staged => vec![
                StageResult::pending(StageName::FactExtraction, StageInput::AssembledContext),
                StageResult::pending(
                    StageName::Structuring,
                    StageInput::Stage(StageName::FactExtraction),
                ),
                StageResult::pending(
                    StageName::ToneFinishing,
                    StageInput::Stage(StageName::Structuring),
                ),
            ],
            PipelineMode::Direct => vec![StageResult::pending(
                StageName::SinglePass,
                StageInput::AssembledContext,
            )],
        };

        Self {
            id: Uuid::new_v4(),
            mode,
            state: PipelineState::Idle,
            status: RunStatus::Running,
            stages,
            artifact: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Move to `next`. Illegal transitions are logged and ignored.
    pub(crate) fn advance(&mut self, next: PipelineState) {
        if self.state.can_advance_to(next) {
            self.state = next;
        } else {
            warn!(run_id = %self.id, from = ?self.state, to = ?next, "Ignoring illegal pipeline transition");
        }
    }

    pub(crate) fn record_success(
        &mut self,
        stage: StageName,
        output: String,
        usage: Option<Usage>,
        elapsed_ms: u64,
    ) {
        if let Some(result) = self.stage_mut(stage) {
            result.status = StageStatus::Succeeded;
            result.output = Some(output);
            result.usage = usage;
            result.elapsed_ms = elapsed_ms;
        }
    }

    pub(crate) fn record_failure(&mut self, stage: StageName, reason: String, elapsed_ms: u64) {
        if let Some(result) = self.stage_mut(stage) {
            result.status = StageStatus::Failed;
            result.error = Some(reason);
            result.elapsed_ms = elapsed_ms;
        }
        self.advance(PipelineState::Failed(stage));
        self.status = RunStatus::Failed;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn complete(&mut self, artifact: String) {
        self.advance(PipelineState::Complete);
        self.status = RunStatus::Succeeded;
        self.artifact = Some(artifact);
        self.finished_at = Some(Utc::now());
    }

    pub fn stage(&self, stage: StageName) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    fn stage_mut(&mut self, stage: StageName) -> Option<&mut StageResult> {
        self.stages.iter_mut().find(|s| s.stage == stage)
    }

    /// Output of `stage`, if it succeeded.
    pub fn output(&self, stage: StageName) -> Option<&str> {
        self.stage(stage).and_then(|s| s.output.as_deref())
    }

    /// The stage that failed, if any.
    pub fn failed_stage(&self) -> Option<StageName> {
        match self.state {
            PipelineState::Failed(stage) => Some(stage),
            _ => None,
        }
    }

    /// Backend usage summed over every stage that reported it.
    pub fn total_usage(&self) -> Usage {
        self.stages
            .iter()
            .filter_map(|s| s.usage)
            .fold(Usage::default(), |acc, u| Usage {
                prompt_tokens: acc.prompt_tokens + u.prompt_tokens,
                completion_tokens: acc.completion_tokens + u.completion_tokens,
                total_tokens: acc.total_tokens + u.total_tokens,
            })
    }

    pub fn elapsed_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(n: u32) -> Option<Usage> {
        Some(Usage {
            prompt_tokens: n,
            completion_tokens: n,
            total_tokens: 2 * n,
        })
    }

    #[test]
    fn staged_run_has_three_chained_stages() {
        let run = PipelineRun::new(PipelineMode::Staged);
        let names: Vec<StageName> = run.stages.iter().map(|s| s.stage).collect();
        assert_eq!(names, StageName::ORDER);
        assert_eq!(run.stages[0].input, StageInput::AssembledContext);
        assert_eq!(run.stages[1].input, StageInput::Stage(StageName::FactExtraction));
        assert_eq!(run.stages[2].input, StageInput::Stage(StageName::Structuring));
        assert!(run.stages.iter().all(|s| s.status == StageStatus::Pending));
        assert_eq!(run.state, PipelineState::Idle);
        assert!(run.artifact.is_none());
    }

    #[test]
    fn direct_run_has_single_stage() {
        let run = PipelineRun::new(PipelineMode::Direct);
        assert_eq!(run.stages.len(), 1);
        assert_eq!(run.stages[0].stage, StageName::SinglePass);
    }

    #[test]
    fn failure_keeps_earlier_outputs() {
        let mut run = PipelineRun::new(PipelineMode::Staged);
        run.advance(PipelineState::FactExtraction);
        run.record_success(StageName::FactExtraction, "facts".into(), usage(3), 10);
        run.advance(PipelineState::Structuring);
        run.record_failure(StageName::Structuring, "backend down".into(), 5);

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.failed_stage(), Some(StageName::Structuring));
        assert_eq!(run.output(StageName::FactExtraction), Some("facts"));
        let failed = run.stage(StageName::Structuring).unwrap();
        assert_eq!(failed.error.as_deref(), Some("backend down"));
        assert_eq!(run.stage(StageName::ToneFinishing).unwrap().status, StageStatus::Pending);
        assert!(run.artifact.is_none());
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn illegal_transition_is_ignored() {
        let mut run = PipelineRun::new(PipelineMode::Staged);
        run.advance(PipelineState::ToneFinishing);
        assert_eq!(run.state, PipelineState::Idle);
    }

    #[test]
    fn usage_sums_across_stages() {
        let mut run = PipelineRun::new(PipelineMode::Staged);
        run.record_success(StageName::FactExtraction, "a".into(), usage(1), 0);
        run.record_success(StageName::Structuring, "b".into(), None, 0);
        run.record_success(StageName::ToneFinishing, "c".into(), usage(4), 0);
        let total = run.total_usage();
        assert_eq!(total.prompt_tokens, 5);
        assert_eq!(total.total_tokens, 10);
    }

    #[test]
    fn serializes_for_persistence() {
        let run = PipelineRun::new(PipelineMode::Staged);
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["mode"], "staged");
        assert_eq!(json["status"], "running");
        assert_eq!(json["stages"].as_array().unwrap().len(), 3);
        let back: PipelineRun = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, run.id);
    }
}
