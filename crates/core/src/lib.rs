//! # CaseDraft Core
//!
//! Domain types, traits and the backend error shared by every CaseDraft
//! crate. The generation backend is defined here as a trait; concrete
//! backends live in `casedraft-providers`, and tests substitute scripted
//! fakes.

pub mod error;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use error::ProviderError;
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
