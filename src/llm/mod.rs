//! LLM integration.
//!
//! The extractor talks to a `LlmProvider`; the only production backend is
//! Gemini over plain HTTP.

pub mod gemini;
pub mod provider;

pub use gemini::GeminiProvider;
pub use provider::*;

use std::sync::Arc;

use secrecy::SecretString;

use crate::config::ProviderConfig;

/// Create the LLM provider from configuration.
///
/// Returns `None` when no API key is configured; the extractor then produces
/// degraded results instead of calling out.
pub fn create_provider(
    config: &ProviderConfig,
    client: reqwest::Client,
) -> Option<Arc<dyn LlmProvider>> {
    let api_key: &SecretString = config.llm_api_key.as_ref()?;
    tracing::info!("Using Gemini (model: {})", config.llm_model);
    Some(Arc::new(GeminiProvider::new(
        client,
        api_key.clone(),
        config.llm_model.clone(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_yields_no_provider() {
        let config = ProviderConfig::disabled();
        assert!(create_provider(&config, reqwest::Client::new()).is_none());
    }

    #[test]
    fn configured_key_constructs_provider() {
        let mut config = ProviderConfig::disabled();
        config.llm_api_key = Some(SecretString::from("test-key"));
        config.llm_model = "gemini-2.0-flash".to_string();
        let provider = create_provider(&config, reqwest::Client::new()).unwrap();
        assert_eq!(provider.model_name(), "gemini-2.0-flash");
    }
}
