//! Bounded context assembly.
//!
//! Fits an unbounded amount of evidence into a fixed token budget. Cuts
//! happen at two levels so one oversized input can't starve the rest.
//!
//! | Category | Selection | Per-item cap |
//! |----------|-----------|--------------|
//! | Instructions | Fixed preamble | - |
//! | Source material | All documents | Raw text |
//! | Reference material | Top-N by relevance | Content |
//! | Precedent material | Top-M by relevance | Summary and outcome, each |

pub mod assembler;
pub mod budget;
pub mod evidence;
pub mod summarizer;
pub mod token;

pub use assembler::{
    AssembledContext, AssemblyLimits, ContextAssembler, ContextSection, ContextStats,
    SectionStats,
};
pub use budget::{BudgetError, BudgetRatios, Category, TokenBudget};
pub use evidence::{Evidence, PrecedentHit, ReferenceHit, SourceDocument};
