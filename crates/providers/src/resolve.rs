//! Model resolution — declarative model spec to provider instance.
//!
//! A bare model name means "run it on the local model runtime". An
//! explicit provider tag selects a backend; only `local` and `openai`
//! exist, and anything else is a configuration error, caught at
//! construction rather than on the first request.

use std::sync::Arc;

use agentmesh_config::{AgentConfig, ProvidersConfig};
use agentmesh_core::error::ConfigError;
use agentmesh_core::provider::Provider;

use crate::openai_compat::OpenAiCompatProvider;

/// Provider tag used when a model spec does not name one.
pub const DEFAULT_PROVIDER: &str = "local";

/// Resolve an agent's model field into a provider and a model name.
pub fn resolve_model(
    config: &AgentConfig,
    providers: &ProvidersConfig,
) -> Result<(Arc<dyn Provider>, String), ConfigError> {
    let model = config
        .model
        .as_ref()
        .ok_or_else(|| ConfigError::MissingModel(config.name.clone()))?;

    let (name, provider_tag) = model.parts();
    if name.is_empty() {
        return Err(ConfigError::MissingModelName(config.name.clone()));
    }
    let provider_tag = provider_tag.unwrap_or(DEFAULT_PROVIDER);

    let provider: Arc<dyn Provider> = match provider_tag {
        "local" => Arc::new(OpenAiCompatProvider::new(
            "local",
            &providers.local_base_url,
            &providers.local_api_key,
        )),
        "openai" => {
            let api_key = providers.openai_api_key.as_deref().ok_or_else(|| {
                ConfigError::MissingApiKey {
                    provider: "openai".into(),
                }
            })?;
            Arc::new(OpenAiCompatProvider::new(
                "openai",
                &providers.openai_base_url,
                api_key,
            ))
        }
        other => return Err(ConfigError::UnknownProvider(other.into())),
    };

    Ok((provider, name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmesh_config::{ModelField, ModelSpec};

    fn agent_with_model(model: Option<ModelField>) -> AgentConfig {
        AgentConfig {
            name: "writer".into(),
            model,
            ..Default::default()
        }
    }

    #[test]
    fn bare_name_defaults_to_local() {
        let config = agent_with_model(Some(ModelField::Name("ai/qwen3".into())));
        let (provider, model) = resolve_model(&config, &ProvidersConfig::default()).unwrap();
        assert_eq!(provider.name(), "local");
        assert_eq!(model, "ai/qwen3");
    }

    #[test]
    fn spec_without_provider_defaults_to_local() {
        let config = agent_with_model(Some(ModelField::Spec(ModelSpec {
            name: "ai/qwen3".into(),
            provider: None,
        })));
        let (provider, _) = resolve_model(&config, &ProvidersConfig::default()).unwrap();
        assert_eq!(provider.name(), "local");
    }

    #[test]
    fn openai_requires_api_key() {
        let config = agent_with_model(Some(ModelField::Spec(ModelSpec {
            name: "gpt-4o".into(),
            provider: Some("openai".into()),
        })));

        let err = resolve_model(&config, &ProvidersConfig::default()).err().unwrap();
        assert!(matches!(err, ConfigError::MissingApiKey { .. }));

        let providers = ProvidersConfig {
            openai_api_key: Some("sk-test".into()),
            ..Default::default()
        };
        let (provider, model) = resolve_model(&config, &providers).unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(model, "gpt-4o");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = agent_with_model(Some(ModelField::Spec(ModelSpec {
            name: "m".into(),
            provider: Some("bedrock".into()),
        })));
        let err = resolve_model(&config, &ProvidersConfig::default()).err().unwrap();
        match err {
            ConfigError::UnknownProvider(tag) => assert_eq!(tag, "bedrock"),
            other => panic!("Expected UnknownProvider, got: {other:?}"),
        }
    }

    #[test]
    fn missing_model_is_rejected() {
        let err = resolve_model(&agent_with_model(None), &ProvidersConfig::default()).err().unwrap();
        assert!(matches!(err, ConfigError::MissingModel(_)));
    }

    #[test]
    fn empty_model_name_is_rejected() {
        let config = agent_with_model(Some(ModelField::Name(String::new())));
        let err = resolve_model(&config, &ProvidersConfig::default()).err().unwrap();
        assert!(matches!(err, ConfigError::MissingModelName(_)));
    }
}
