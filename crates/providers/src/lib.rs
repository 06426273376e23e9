//! Generation backend implementations for CaseDraft.
//!
//! All providers implement the `casedraft_core::Provider` trait.
//! `build_from_config` selects the configured one.

pub mod anthropic;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use router::build_from_config;
