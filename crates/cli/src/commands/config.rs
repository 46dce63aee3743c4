use dealwise_core::config::EngineConfig;

use super::CommandResult;

pub fn run(config: &EngineConfig) -> CommandResult {
    let narrative_api_key =
        if config.narrative.api_key.is_some() { "<redacted>" } else { "<unset>" };

    let data = serde_json::json!({
        "model_service": {
            "url": config.model_service.url.as_deref().unwrap_or("<unset>"),
            "timeout_secs": config.model_service.timeout_secs,
        },
        "narrative": {
            "endpoint": config.narrative.endpoint.as_deref().unwrap_or("<unset>"),
            "api_key": narrative_api_key,
            "cache_ttl_secs": config.narrative.cache_ttl_secs,
        },
        "deal_cache_ttl_secs": config.deal_cache_ttl_secs,
        "oem_profiles": config
            .oem_profiles
            .iter()
            .map(|profile| profile.vendor.clone())
            .collect::<Vec<_>>(),
        "logging": {
            "level": config.logging.level,
            "format": format!("{:?}", config.logging.format).to_lowercase(),
        },
    });

    CommandResult::success(
        "config",
        "effective config (source precedence: env > file > default)",
        data,
    )
}

#[cfg(test)]
mod tests {
    use dealwise_core::config::EngineConfig;

    #[test]
    fn secrets_never_appear_in_output() {
        let mut config = EngineConfig::default();
        config.narrative.api_key = Some("nk-live-supersecret".to_string().into());
        config.narrative.endpoint = Some("https://narrative.example.test".to_string());

        let result = super::run(&config);
        assert!(!result.output.contains("supersecret"));
        assert!(result.output.contains("<redacted>"));
    }
}
