//! Context budgeting and staged generation for engagement documents.
//!
//! A drafting request flows through:
//!
//! 1. **Budget**: a fixed token capacity split across categories
//! 2. **Assembly**: evidence summarized, selected and cut to fit
//! 3. **Pipeline**: fact extraction → structuring → tone finishing (or a
//!    single direct call)
//!
//! The result is a [`PipelineRun`] carrying the artifact, or an error that
//! names the failed stage and keeps earlier outputs.

pub mod context;
pub mod pipeline;
pub mod service;

pub use context::{
    AssembledContext, AssemblyLimits, BudgetError, Category, ContextAssembler, ContextStats,
    Evidence, PrecedentHit, ReferenceHit, SourceDocument, TokenBudget,
};
pub use pipeline::{
    DirectPipeline, DraftRequest, FirmProfile, PipelineError, PipelineMode, PipelineRun,
    PipelineSettings, PipelineState, ProgressEvent, ProgressFn, RunStatus, StageFailure,
    StageName, StageResult, StageStatus, StagedPipeline,
};
pub use context::token::{TRUNCATION_MARKER, estimate_tokens};
pub use service::{DraftOutcome, DraftService};
