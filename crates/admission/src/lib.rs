//! Admission control for CaseDraft.
//!
//! Every request is checked against a sliding-window quota keyed by caller
//! identity and operation class before any assembly or generation happens.
//! Over-quota requests are rejected without touching the generation
//! backend. A failing counter store admits requests (fail-open) and logs
//! the outage.
//!
//! Counter stores:
//! - [`InMemoryCounterStore`]: per process
//! - `SqliteCounterStore` (feature `sqlite`): shared through a database file

pub mod class;
pub mod gate;
pub mod identity;
#[cfg(feature = "sqlite")]
pub mod sqlite_store;
pub mod store;

pub use class::{OperationClass, Quota, QuotaTable};
pub use gate::{AdmissionDecision, AdmissionError, AdmissionGate, RateLimitStatus};
pub use identity::CallerIdentity;
#[cfg(feature = "sqlite")]
pub use sqlite_store::SqliteCounterStore;
pub use store::{CounterStore, InMemoryCounterStore, StoreError, WindowSnapshot};

use casedraft_config::{AppConfig, CounterBackend};
use std::sync::Arc;

/// Build the configured counter store.
pub async fn store_from_config(config: &AppConfig) -> Result<Arc<dyn CounterStore>, StoreError> {
    match config.rate_limits.backend {
        CounterBackend::Memory => Ok(Arc::new(InMemoryCounterStore::new())),
        #[cfg(feature = "sqlite")]
        CounterBackend::Sqlite => {
            let path = config.rate_limit_db_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(format!("{}: {e}", parent.display())))?;
            }
            let url = format!("sqlite://{}", path.display());
            Ok(Arc::new(SqliteCounterStore::new(&url).await?))
        }
        #[cfg(not(feature = "sqlite"))]
        CounterBackend::Sqlite => Err(StoreError::Unavailable(
            "built without the `sqlite` feature".into(),
        )),
    }
}
