//! Reasoning backend implementations for datalyst.
//!
//! All providers implement the `datalyst_core::Provider` trait.

pub mod openai_compat;

use std::sync::Arc;
use std::time::Duration;

use datalyst_core::error::ProviderError;
use datalyst_core::provider::Provider;

pub use openai_compat::OpenAiCompatProvider;

/// Build the configured backend.
///
/// Local servers need no key; a placeholder is sent so the
/// `Authorization` header stays well-formed.
pub fn build_from_config(
    config: &datalyst_config::AppConfig,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let provider = &config.provider;
    let api_key = provider.api_key.clone().unwrap_or_else(|| "not-needed".into());

    tracing::debug!(
        provider = %provider.name,
        base_url = %provider.base_url,
        model = %provider.model,
        "Building reasoning backend"
    );

    let backend = OpenAiCompatProvider::new(
        provider.name.clone(),
        provider.base_url.clone(),
        api_key,
        Duration::from_secs(provider.timeout_secs),
    )?;

    Ok(Arc::new(backend))
}
