use std::collections::HashMap;
use std::env::VarError;

use super::*;

fn lookup_from_map<'a>(
    map: &'a HashMap<&'a str, &'a str>,
) -> impl Fn(&str) -> Result<String, VarError> + 'a {
    move |key| {
        map.get(key)
            .map(|v| (*v).to_string())
            .ok_or(VarError::NotPresent)
    }
}

fn invalid_var(result: &Result<AppConfig, ConfigError>) -> Option<&str> {
    match result {
        Err(ConfigError::InvalidEnvVar { var, .. }) => Some(var.as_str()),
        _ => None,
    }
}

#[test]
fn parse_environment_development() {
    assert_eq!(
        parse_environment("development").unwrap(),
        Environment::Development
    );
}

#[test]
fn parse_environment_production() {
    assert_eq!(
        parse_environment("production").unwrap(),
        Environment::Production
    );
}

#[test]
fn parse_environment_unknown_fails() {
    let err = parse_environment("staging").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEnvVar { ref var, .. } if var == "TLENS_ENV"));
}

#[test]
fn build_app_config_uses_defaults_for_empty_env() {
    let map: HashMap<&str, &str> = HashMap::new();
    let cfg = build_app_config(lookup_from_map(&map)).expect("defaults should load");
    assert_eq!(cfg.env, Environment::Development);
    assert_eq!(cfg.log_level, "info");
    assert!(cfg.api_key.is_none());
    assert_eq!(cfg.api_base_url, "https://api.openai.com/v1");
    assert_eq!(cfg.model, "gpt-4o-mini");
    assert_eq!(cfg.request_timeout_secs, 60);
    assert_eq!(cfg.max_retries, 3);
    assert_eq!(cfg.retry_base_delay_ms, 1000);
    assert_eq!(cfg.retry_max_delay_ms, 10_000);
    assert_eq!(cfg.max_transcript_chars, 60_000);
    assert_eq!(cfg.max_completion_tokens, 4000);
    assert_eq!(cfg.validation_mode, ValidationMode::Strict);
}

#[test]
fn build_app_config_reads_overrides() {
    let mut map = HashMap::new();
    map.insert("TLENS_API_KEY", "sk-test");
    map.insert("TLENS_MODEL", "gpt-4o");
    map.insert("TLENS_MAX_RETRIES", "5");
    map.insert("TLENS_RETRY_BASE_DELAY_MS", "250");
    map.insert("TLENS_RETRY_MAX_DELAY_MS", "4000");
    map.insert("TLENS_VALIDATION_MODE", "Lenient");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.api_key.as_deref(), Some("sk-test"));
    assert_eq!(cfg.model, "gpt-4o");
    assert_eq!(cfg.max_retries, 5);
    assert_eq!(cfg.retry_base_delay_ms, 250);
    assert_eq!(cfg.retry_max_delay_ms, 4000);
    assert_eq!(cfg.validation_mode, ValidationMode::Lenient);
}

#[test]
fn blank_api_key_is_treated_as_absent() {
    let mut map = HashMap::new();
    map.insert("TLENS_API_KEY", "   ");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert!(cfg.api_key.is_none());
}

#[test]
fn build_app_config_fails_with_invalid_max_retries() {
    let mut map = HashMap::new();
    map.insert("TLENS_MAX_RETRIES", "not-a-number");
    let result = build_app_config(lookup_from_map(&map));
    assert_eq!(
        invalid_var(&result),
        Some("TLENS_MAX_RETRIES"),
        "expected InvalidEnvVar(TLENS_MAX_RETRIES), got: {result:?}"
    );
}

#[test]
fn build_app_config_rejects_max_delay_below_base_delay() {
    let mut map = HashMap::new();
    map.insert("TLENS_RETRY_BASE_DELAY_MS", "5000");
    map.insert("TLENS_RETRY_MAX_DELAY_MS", "1000");
    let result = build_app_config(lookup_from_map(&map));
    assert_eq!(
        invalid_var(&result),
        Some("TLENS_RETRY_MAX_DELAY_MS"),
        "expected InvalidEnvVar(TLENS_RETRY_MAX_DELAY_MS), got: {result:?}"
    );
}

#[test]
fn build_app_config_rejects_unknown_validation_mode() {
    let mut map = HashMap::new();
    map.insert("TLENS_VALIDATION_MODE", "permissive");
    let result = build_app_config(lookup_from_map(&map));
    assert_eq!(
        invalid_var(&result),
        Some("TLENS_VALIDATION_MODE"),
        "expected InvalidEnvVar(TLENS_VALIDATION_MODE), got: {result:?}"
    );
}

#[test]
fn debug_output_redacts_api_key() {
    let mut map = HashMap::new();
    map.insert("TLENS_API_KEY", "sk-very-secret");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    let rendered = format!("{cfg:?}");
    assert!(!rendered.contains("sk-very-secret"));
    assert!(rendered.contains("[redacted]"));
}

#[test]
fn require_api_key_reports_missing_variable() {
    let map: HashMap<&str, &str> = HashMap::new();
    let config = build_app_config(lookup_from_map(&map)).unwrap();
    let err = config.require_api_key().unwrap_err();
    assert!(matches!(err, ConfigError::MissingEnvVar(ref var) if var == "TLENS_API_KEY"));
}

#[test]
fn require_api_key_returns_configured_key() {
    let map: HashMap<&str, &str> = HashMap::from([("TLENS_API_KEY", "sk-test")]);
    let config = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(config.require_api_key().unwrap(), "sk-test");
}
