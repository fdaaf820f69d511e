use super::{
    types::{Config, LlmProvider},
    ConfigError,
};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Chunking leaves room for forward progress (overlap < 70% of chunk size)
/// - Batching and retry settings are usable
/// - Anthropic has an API key
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    // Pipeline validation
    let pipeline = &config.pipeline;
    if pipeline.chunk_size_chars == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.chunk_size_chars must be greater than 0".to_string(),
        ));
    }
    if pipeline.overlap_chars * 10 >= pipeline.chunk_size_chars * 7 {
        return Err(ConfigError::ValidationError(format!(
            "pipeline.overlap_chars ({}) must be less than 70% of chunk_size_chars ({})",
            pipeline.overlap_chars, pipeline.chunk_size_chars
        )));
    }
    if pipeline.concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.concurrency must be at least 1".to_string(),
        ));
    }
    if pipeline.retry.backoff_multiplier < 1.0 {
        return Err(ConfigError::ValidationError(
            "pipeline.retry.backoff_multiplier must be at least 1.0".to_string(),
        ));
    }

    // LLM validation
    if let Some(llm) = &config.llm {
        let has_key = llm.api_key.as_deref().is_some_and(|k| !k.is_empty());
        if llm.provider == LlmProvider::Anthropic && !has_key {
            return Err(ConfigError::ValidationError(
                "llm.api_key is required for the anthropic provider".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LlmConfig, ServerConfig};
    use std::net::IpAddr;

    fn llm(provider: LlmProvider, api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider,
            model: "m".to_string(),
            api_key: api_key.map(String::from),
            api_base: None,
            max_tokens: 1024,
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let config = Config {
            server: ServerConfig {
                host: "0.0.0.0".parse::<IpAddr>().unwrap(),
                port: 0,
            },
            ..Default::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_overlap_bound() {
        let mut config = Config::default();
        config.pipeline.chunk_size_chars = 100;

        config.pipeline.overlap_chars = 69;
        assert!(validate_config(&config).is_ok());

        config.pipeline.overlap_chars = 70;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_chunk_size_and_concurrency() {
        let mut config = Config::default();
        config.pipeline.chunk_size_chars = 0;
        config.pipeline.overlap_chars = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.pipeline.concurrency = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_backoff_multiplier() {
        let mut config = Config::default();
        config.pipeline.retry.backoff_multiplier = 0.5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_anthropic_requires_api_key() {
        let mut config = Config {
            llm: Some(llm(LlmProvider::Anthropic, None)),
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());

        config.llm = Some(llm(LlmProvider::Anthropic, Some("")));
        assert!(validate_config(&config).is_err());

        config.llm = Some(llm(LlmProvider::Anthropic, Some("sk-test")));
        assert!(validate_config(&config).is_ok());

        config.llm = Some(llm(LlmProvider::Ollama, None));
        assert!(validate_config(&config).is_ok());
    }
}
