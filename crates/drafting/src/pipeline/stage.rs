//! Stage names, per-stage records and the run state machine.

use casedraft_core::provider::Usage;
use serde::{Deserialize, Serialize};

/// One generation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    FactExtraction,
    Structuring,
    ToneFinishing,
    /// The single call made by the direct pipeline.
    SinglePass,
}

impl StageName {
    /// Staged pipeline order. Never reordered, never skipped.
    pub const ORDER: [StageName; 3] = [
        StageName::FactExtraction,
        StageName::Structuring,
        StageName::ToneFinishing,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            StageName::FactExtraction => "fact extraction",
            StageName::Structuring => "structuring",
            StageName::ToneFinishing => "tone finishing",
            StageName::SinglePass => "single pass",
        }
    }

    /// 1-based position within its pipeline.
    pub fn step(&self) -> usize {
        match self {
            StageName::FactExtraction | StageName::SinglePass => 1,
            StageName::Structuring => 2,
            StageName::ToneFinishing => 3,
        }
    }

    /// Number of steps in the pipeline this stage belongs to.
    pub fn total_steps(&self) -> usize {
        match self {
            StageName::SinglePass => 1,
            _ => StageName::ORDER.len(),
        }
    }

    /// Progress percentage reported once this stage succeeds.
    pub fn checkpoint(&self) -> u8 {
        match self {
            StageName::FactExtraction => 33,
            StageName::Structuring => 66,
            StageName::ToneFinishing | StageName::SinglePass => 100,
        }
    }

    /// Operator-facing message sent with the checkpoint.
    pub fn completion_message(&self) -> &'static str {
        match self {
            StageName::FactExtraction => "Facts extracted from case material",
            StageName::Structuring => "Draft structured into sections",
            StageName::ToneFinishing => "Draft finished",
            StageName::SinglePass => "Draft generated",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Orchestrator state. Moves strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    FactExtraction,
    Structuring,
    ToneFinishing,
    SinglePass,
    Complete,
    Failed(StageName),
}

impl PipelineState {
    /// The state entered when `stage` starts.
    pub fn running(stage: StageName) -> Self {
        match stage {
            StageName::FactExtraction => PipelineState::FactExtraction,
            StageName::Structuring => PipelineState::Structuring,
            StageName::ToneFinishing => PipelineState::ToneFinishing,
            StageName::SinglePass => PipelineState::SinglePass,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Complete | PipelineState::Failed(_))
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Idle, FactExtraction) | (Idle, SinglePass) => true,
            (FactExtraction, Structuring) | (Structuring, ToneFinishing) => true,
            (ToneFinishing, Complete) | (SinglePass, Complete) => true,
            (FactExtraction, Failed(StageName::FactExtraction))
            | (Structuring, Failed(StageName::Structuring))
            | (ToneFinishing, Failed(StageName::ToneFinishing))
            | (SinglePass, Failed(StageName::SinglePass)) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Succeeded,
    Failed,
}

/// What a stage consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "stage", rename_all = "snake_case")]
pub enum StageInput {
    /// The assembled context body.
    AssembledContext,
    /// The output of an earlier stage.
    Stage(StageName),
}

/// Outcome of one stage within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: StageName,
    pub input: StageInput,
    pub status: StageStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    pub usage: Option<Usage>,
    pub elapsed_ms: u64,
}

impl StageResult {
    pub fn pending(stage: StageName, input: StageInput) -> Self {
        Self {
            stage,
            input,
            status: StageStatus::Pending,
            output: None,
            error: None,
            usage: None,
            elapsed_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_and_checkpoints() {
        let checkpoints: Vec<u8> = StageName::ORDER.iter().map(|s| s.checkpoint()).collect();
        assert_eq!(checkpoints, [33, 66, 100]);
        let steps: Vec<usize> = StageName::ORDER.iter().map(|s| s.step()).collect();
        assert_eq!(steps, [1, 2, 3]);
        assert!(StageName::ORDER.iter().all(|s| s.total_steps() == 3));
    }

    #[test]
    fn single_pass_is_one_of_one() {
        assert_eq!(StageName::SinglePass.step(), 1);
        assert_eq!(StageName::SinglePass.total_steps(), 1);
        assert_eq!(StageName::SinglePass.checkpoint(), 100);
    }

    #[test]
    fn staged_happy_path_is_legal() {
        let path = [
            PipelineState::Idle,
            PipelineState::FactExtraction,
            PipelineState::Structuring,
            PipelineState::ToneFinishing,
            PipelineState::Complete,
        ];
        assert!(path.windows(2).all(|w| w[0].can_advance_to(w[1])));
    }

    #[test]
    fn no_skipping_or_going_back() {
        assert!(!PipelineState::Idle.can_advance_to(PipelineState::Structuring));
        assert!(!PipelineState::FactExtraction.can_advance_to(PipelineState::ToneFinishing));
        assert!(!PipelineState::Structuring.can_advance_to(PipelineState::FactExtraction));
        assert!(!PipelineState::Structuring.can_advance_to(PipelineState::Complete));
        assert!(!PipelineState::Complete.can_advance_to(PipelineState::Idle));
    }

    #[test]
    fn failure_only_from_the_running_stage() {
        assert!(
            PipelineState::Structuring.can_advance_to(PipelineState::Failed(StageName::Structuring))
        );
        assert!(
            !PipelineState::Structuring
                .can_advance_to(PipelineState::Failed(StageName::FactExtraction))
        );
        assert!(!PipelineState::Failed(StageName::Structuring).can_advance_to(PipelineState::Complete));
        assert!(PipelineState::Failed(StageName::Structuring).is_terminal());
    }

    #[test]
    fn labels_render_for_errors() {
        assert_eq!(StageName::ToneFinishing.to_string(), "tone finishing");
        let json = serde_json::to_string(&StageName::FactExtraction).unwrap();
        assert_eq!(json, "\"fact_extraction\"");
    }
}
