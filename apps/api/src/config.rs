use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::llm_client::{gemini_endpoint, DEFAULT_MODEL};
use crate::pipeline::worker::DEFAULT_WORKER_COUNT;
use crate::retry::{RetryPolicy, RetryStrategy};

/// Control-plane configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Not needed when `PROVIDER_URL` points at the simulator.
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub provider_url: String,
    pub worker_count: usize,
    pub retry_strategy: RetryStrategy,
    /// Ceiling for the honor-delay strategy. `None` retries indefinitely.
    pub retry_max_attempts: Option<u32>,
    pub port: u16,
    pub rust_log: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: DEFAULT_MODEL.to_string(),
            provider_url: gemini_endpoint(DEFAULT_MODEL),
            worker_count: DEFAULT_WORKER_COUNT,
            retry_strategy: RetryStrategy::default(),
            retry_max_attempts: None,
            port: 8001,
            rust_log: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = Config::default();
        let gemini_model = optional_env("GEMINI_MODEL").unwrap_or(defaults.gemini_model);
        let provider_url =
            optional_env("PROVIDER_URL").unwrap_or_else(|| gemini_endpoint(&gemini_model));

        let retry_strategy = match optional_env("RETRY_STRATEGY") {
            Some(raw) => raw
                .parse::<RetryStrategy>()
                .map_err(anyhow::Error::msg)
                .context("RETRY_STRATEGY is invalid")?,
            None => defaults.retry_strategy,
        };

        let worker_count: usize = parse_env("WORKER_COUNT")?.unwrap_or(defaults.worker_count);
        if worker_count == 0 {
            anyhow::bail!("WORKER_COUNT must be at least 1");
        }

        Ok(Config {
            gemini_api_key: optional_env("GEMINI_API_KEY"),
            gemini_model,
            provider_url,
            worker_count,
            retry_strategy,
            retry_max_attempts: parse_env("RETRY_MAX_ATTEMPTS")?,
            port: parse_env("PORT")?.unwrap_or(defaults.port),
            rust_log: optional_env("RUST_LOG").unwrap_or(defaults.rust_log),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_strategy(self.retry_strategy, self.retry_max_attempts)
    }
}

/// Quota simulator configuration.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub capacity: u32,
    pub refill_period: Duration,
    pub generate_delay: Duration,
    pub port: u16,
    pub rust_log: String,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            capacity: 15,
            refill_period: Duration::from_secs(60),
            generate_delay: Duration::from_millis(3000),
            port: 8000,
            rust_log: "info".to_string(),
        }
    }
}

impl SimulatorConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = SimulatorConfig::default();
        let capacity: u32 = parse_env("SIM_CAPACITY")?.unwrap_or(defaults.capacity);
        let refill_secs: u64 = parse_env("SIM_REFILL_SECS")?.unwrap_or(60);
        if refill_secs == 0 {
            anyhow::bail!("SIM_REFILL_SECS must be at least 1");
        }

        Ok(SimulatorConfig {
            capacity,
            refill_period: Duration::from_secs(refill_secs),
            generate_delay: parse_env("SIM_GENERATE_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.generate_delay),
            port: parse_env("SIM_PORT")?.unwrap_or(defaults.port),
            rust_log: optional_env("RUST_LOG").unwrap_or(defaults.rust_log),
        })
    }
}

/// Unset and blank variables are both treated as absent.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    optional_env(key)
        .map(|raw| {
            raw.parse::<T>()
                .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.worker_count, 5);
        assert_eq!(config.port, 8001);
        assert_eq!(config.retry_strategy, RetryStrategy::HonorDelay);
        assert!(config.provider_url.ends_with("gemini-2.5-flash-lite:generateContent"));

        let sim = SimulatorConfig::default();
        assert_eq!(sim.capacity, 15);
        assert_eq!(sim.refill_period, Duration::from_secs(60));
        assert_eq!(sim.port, 8000);
    }

    #[test]
    fn test_retry_policy_follows_strategy() {
        let config = Config {
            retry_strategy: RetryStrategy::Exponential,
            ..Config::default()
        };
        assert_eq!(config.retry_policy().strategy(), RetryStrategy::Exponential);
    }

    #[test]
    fn test_parse_env_reports_bad_values() {
        std::env::set_var("COVERLETTER_TEST_BAD_PORT", "eighty");
        let result: Result<Option<u16>> = parse_env("COVERLETTER_TEST_BAD_PORT");
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("COVERLETTER_TEST_BAD_PORT"));
        std::env::remove_var("COVERLETTER_TEST_BAD_PORT");
    }

    #[test]
    fn test_blank_env_is_absent() {
        std::env::set_var("COVERLETTER_TEST_BLANK", "   ");
        assert_eq!(optional_env("COVERLETTER_TEST_BLANK"), None);
        let parsed: Option<u32> = parse_env("COVERLETTER_TEST_BLANK").unwrap();
        assert_eq!(parsed, None);
        std::env::remove_var("COVERLETTER_TEST_BLANK");
    }
}
