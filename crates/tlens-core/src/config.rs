use crate::app_config::{AppConfig, Environment, ValidationMode};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let env = parse_environment(&or_default("TLENS_ENV", "development"))?;
    let log_level = or_default("TLENS_LOG_LEVEL", "info");
    let api_key = lookup("TLENS_API_KEY").ok().filter(|k| !k.trim().is_empty());
    let api_base_url = or_default("TLENS_API_BASE_URL", "https://api.openai.com/v1");
    let model = or_default("TLENS_MODEL", "gpt-4o-mini");

    let request_timeout_secs = parse_u64("TLENS_REQUEST_TIMEOUT_SECS", "60")?;
    let max_retries = parse_u32("TLENS_MAX_RETRIES", "3")?;
    let retry_base_delay_ms = parse_u64("TLENS_RETRY_BASE_DELAY_MS", "1000")?;
    let retry_max_delay_ms = parse_u64("TLENS_RETRY_MAX_DELAY_MS", "10000")?;
    if retry_max_delay_ms < retry_base_delay_ms {
        return Err(ConfigError::InvalidEnvVar {
            var: "TLENS_RETRY_MAX_DELAY_MS".to_string(),
            reason: format!(
                "must be >= TLENS_RETRY_BASE_DELAY_MS ({retry_base_delay_ms}), \
                 got {retry_max_delay_ms}"
            ),
        });
    }

    let max_transcript_chars = parse_usize("TLENS_MAX_TRANSCRIPT_CHARS", "60000")?;
    let max_completion_tokens = parse_u32("TLENS_MAX_COMPLETION_TOKENS", "4000")?;
    let validation_mode = parse_validation_mode(&or_default("TLENS_VALIDATION_MODE", "strict"))?;

    Ok(AppConfig {
        env,
        log_level,
        api_key,
        api_base_url,
        model,
        request_timeout_secs,
        max_retries,
        retry_base_delay_ms,
        retry_max_delay_ms,
        max_transcript_chars,
        max_completion_tokens,
        validation_mode,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "TLENS_ENV".to_string(),
            reason: format!("expected development, test, or production; got {other:?}"),
        }),
    }
}

fn parse_validation_mode(s: &str) -> Result<ValidationMode, ConfigError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "strict" => Ok(ValidationMode::Strict),
        "lenient" => Ok(ValidationMode::Lenient),
        other => Err(ConfigError::InvalidEnvVar {
            var: "TLENS_VALIDATION_MODE".to_string(),
            reason: format!("expected strict or lenient; got {other:?}"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
