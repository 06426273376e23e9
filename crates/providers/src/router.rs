//! Provider selection: builds the configured generation backend.

use crate::anthropic::{self, AnthropicProvider};
use casedraft_core::error::ProviderError;
use casedraft_core::provider::Provider;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Build the default provider from configuration.
///
/// The API key comes from the provider's own section first, then the
/// top-level `api_key` (which `AppConfig::load` fills from the
/// environment).
pub fn build_from_config(
    config: &casedraft_config::AppConfig,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let name = config.default_provider.as_str();
    let provider_config = config.providers.get(name);

    let api_key = provider_config
        .and_then(|p| p.api_key.clone())
        .or_else(|| config.api_key.clone())
        .ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "no API key for provider '{name}' (set CASEDRAFT_API_KEY or ANTHROPIC_API_KEY)"
            ))
        })?;

    let timeout = provider_config
        .and_then(|p| p.timeout_secs)
        .map(Duration::from_secs)
        .unwrap_or(anthropic::DEFAULT_TIMEOUT);

    match name {
        "anthropic" => {
            let mut provider = AnthropicProvider::new(api_key, timeout)?;
            if let Some(url) = provider_config.and_then(|p| p.api_url.as_ref()) {
                provider = provider.with_base_url(url);
            }
            info!(provider = name, timeout_secs = timeout.as_secs(), "Generation backend ready");
            Ok(Arc::new(provider))
        }
        other => Err(ProviderError::NotConfigured(format!(
            "unknown provider '{other}'"
        ))),
    }
}
