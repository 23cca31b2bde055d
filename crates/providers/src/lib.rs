//! Model provider implementations for Dealroom.
//!
//! All providers implement the `dealroom_core::Provider` trait. The provider
//! is built once at startup from configuration and shared as
//! `Arc<dyn Provider>`.

pub mod anthropic;
pub mod sse;

pub use anthropic::AnthropicProvider;

use std::sync::Arc;
use std::time::Duration;

use dealroom_config::AppConfig;
use dealroom_core::Provider;
use dealroom_core::error::ProviderError;

/// Build the configured provider.
pub fn from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        ProviderError::NotConfigured(
            "No API key configured — set DEALROOM_API_KEY or ANTHROPIC_API_KEY".into(),
        )
    })?;

    let mut provider = AnthropicProvider::new(
        api_key,
        Duration::from_secs(config.provider.request_timeout_secs),
    )?;
    if let Some(url) = &config.provider.api_url {
        provider = provider.with_base_url(url);
    }
    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_not_configured() {
        let err = from_config(&AppConfig::default()).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn builds_with_key() {
        let config = AppConfig {
            api_key: Some("sk-ant-test".into()),
            ..AppConfig::default()
        };
        let provider = from_config(&config).unwrap();
        assert_eq!(provider.name(), "anthropic");
    }
}
