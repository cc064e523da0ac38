use crate::config::{GatewayConfig, Provider};
use crate::error::{GatewayError, Result};
use crate::providers::{
    AnthropicAdapter, OllamaAdapter, OpenAiAdapter, ProviderAdapter, QwenAdapter, ZhipuAdapter,
};

/// adapter 构造的注入点，测试时可替换为计数 mock
pub trait AdapterFactory: Send + Sync {
    fn create(&self, config: &GatewayConfig) -> Result<Box<dyn ProviderAdapter>>;
}

#[derive(Debug, Default)]
pub struct DefaultAdapterFactory;

impl AdapterFactory for DefaultAdapterFactory {
    fn create(&self, config: &GatewayConfig) -> Result<Box<dyn ProviderAdapter>> {
        Ok(match config.provider {
            Provider::Anthropic => Box::new(AnthropicAdapter::new(config, resolve_api_key(config)?)),
            Provider::OpenAI => Box::new(OpenAiAdapter::new(config, resolve_api_key(config)?)),
            Provider::Zhipu => Box::new(ZhipuAdapter::new(config, resolve_api_key(config)?)),
            Provider::Qwen => Box::new(QwenAdapter::new(config, resolve_api_key(config)?)),
            Provider::Ollama => Box::new(OllamaAdapter::new(config)),
        })
    }
}

// 显式配置优先，其次按 provider 对应的环境变量
fn resolve_api_key(config: &GatewayConfig) -> Result<String> {
    resolve_api_key_with(config, |var| std::env::var(var).ok())
}

// env 查询可注入，测试不依赖进程环境；
// 无密钥来源的 provider（如 Ollama）不得走到这里，走到即配置错误
fn resolve_api_key_with(
    config: &GatewayConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String> {
    if let Some(key) = &config.api_key
        && !key.trim().is_empty()
    {
        return Ok(key.clone());
    }

    let Some(var) = config.provider.env_key() else {
        return Err(GatewayError::Config(format!(
            "Provider {} takes no API key",
            config.provider
        )));
    };

    match lookup(var) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(GatewayError::Config(format!(
            "Missing API key for provider {}: set config.api_key or the {} environment variable",
            config.provider, var
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_key_wins_over_env() {
        let mut config = GatewayConfig::new(Provider::Zhipu, "glm-4-plus");
        config.api_key = Some("zp-explicit".into());
        let key = resolve_api_key_with(&config, |_| Some("zp-env".into())).unwrap();
        assert_eq!(key, "zp-explicit");
    }

    #[test]
    fn env_variable_supplies_key() {
        let config = GatewayConfig::new(Provider::Zhipu, "glm-4-plus");
        let key = resolve_api_key_with(&config, |var| {
            (var == "ZHIPU_API_KEY").then(|| "zp-env".to_string())
        })
        .unwrap();
        assert_eq!(key, "zp-env");
    }

    #[test]
    fn missing_key_is_config_error() {
        let config = GatewayConfig::new(Provider::Zhipu, "glm-4-plus");
        match resolve_api_key_with(&config, |_| None) {
            Err(GatewayError::Config(msg)) => assert!(msg.contains("ZHIPU_API_KEY")),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn keyless_provider_is_rejected_loudly() {
        let config = GatewayConfig::new(Provider::Ollama, "llama3.1");
        assert!(matches!(
            resolve_api_key_with(&config, |_| Some("irrelevant".into())),
            Err(GatewayError::Config(_))
        ));
    }

    #[test]
    fn ollama_needs_no_key() {
        let config = GatewayConfig::new(Provider::Ollama, "llama3.1");
        assert!(DefaultAdapterFactory.create(&config).is_ok());
    }
}
