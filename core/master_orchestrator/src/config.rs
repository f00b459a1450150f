//! C7: typed configuration, loaded once from the environment at startup.
//!
//! Fails fast on any required key missing or malformed, in keeping with the
//! house style of the rest of this codebase: a broken environment is a
//! Configuration error (§7 item 1), not something the pipeline discovers
//! lazily mid-request.

use platform::errors::PlatformError;
use std::time::Duration;

/// Fully-resolved process configuration. Immutable after startup; held
/// behind an `Arc` and shared read-only by every task (§5 "no global
/// mutable state" rule).
#[derive(Debug, Clone)]
pub struct Config {
    pub llm_endpoint: String,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,

    pub memory_service_url: String,
    pub action_executor_url: String,

    pub enable_sandbox: bool,
    pub dry_run_mode: bool,
    pub max_concurrent_actions: usize,
    pub action_timeout: Duration,
    pub allowed_actions: Vec<String>,

    /// C1 per-collaborator deadlines (`spec.md` §4.1): `LlmClient::generate`
    /// 60s, `MemoryClient` 10s, `ActionClient` 60s at the transport layer
    /// (C4 layers the shorter `action_timeout` on top via its own
    /// `tokio::time::timeout`).
    pub llm_deadline: Duration,
    pub memory_deadline: Duration,
    pub action_client_deadline: Duration,

    pub cors_origins: Vec<String>,
    pub api_host: String,
    pub api_port: u16,

    pub request_deadline: Duration,
    pub shutdown_grace: Duration,
    pub policy_path: String,
    pub system_prompt_path: String,

    pub jwt_secret: String,
    pub rate_limit_requests: u32,
    pub rate_limit_window_secs: u64,

    pub app_env: String,
    pub metrics_addr: String,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_required(key: &str) -> Result<String, PlatformError> {
    env_opt(key).ok_or_else(|| PlatformError::Config(format!("missing required env var {key}")))
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, PlatformError> {
    match env_opt(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| PlatformError::Config(format!("invalid value for {key}: {raw}"))),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool, PlatformError> {
    match env_opt(key) {
        None => Ok(default),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(PlatformError::Config(format!("invalid bool for {key}: {raw}"))),
        },
    }
}

fn env_csv(key: &str, default: &[&str]) -> Vec<String> {
    match env_opt(key) {
        None => default.iter().map(|s| s.to_string()).collect(),
        Some(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    }
}

impl Config {
    /// Load and validate configuration from the environment. `dotenvy`
    /// loads a local `.env` file first if present (development convenience;
    /// a missing `.env` is not an error).
    pub fn from_env() -> Result<Self, PlatformError> {
        let _ = dotenvy::dotenv();

        let config = Config {
            llm_endpoint: env_required("LLM_ENDPOINT")?,
            llm_model: env_or("LLM_MODEL", "llama3.2:latest"),
            llm_temperature: env_parse_or("LLM_TEMPERATURE", 0.7_f32)?,
            llm_max_tokens: env_parse_or("LLM_MAX_TOKENS", 2048_u32)?,

            memory_service_url: env_required("MEMORY_SERVICE_URL")?,
            action_executor_url: env_required("ACTION_EXECUTOR_URL")?,

            enable_sandbox: env_bool("ENABLE_SANDBOX", true)?,
            dry_run_mode: env_bool("DRY_RUN_MODE", false)?,
            max_concurrent_actions: env_parse_or("MAX_CONCURRENT_ACTIONS", 5_usize)?,
            action_timeout: Duration::from_secs(env_parse_or("ACTION_TIMEOUT", 30_u64)?),
            allowed_actions: env_csv(
                "ALLOWED_ACTIONS",
                &["open_app", "search_web", "send_notification"],
            ),

            llm_deadline: Duration::from_secs(env_parse_or("LLM_DEADLINE_SECS", 60_u64)?),
            memory_deadline: Duration::from_secs(env_parse_or("MEMORY_DEADLINE_SECS", 10_u64)?),
            action_client_deadline: Duration::from_secs(env_parse_or(
                "ACTION_CLIENT_DEADLINE_SECS",
                60_u64,
            )?),

            cors_origins: env_csv("CORS_ORIGINS", &["http://localhost:3000"]),
            api_host: env_or("API_HOST", "127.0.0.1"),
            api_port: env_parse_or("API_PORT", 8181_u16)?,

            request_deadline: Duration::from_secs(env_parse_or("REQUEST_DEADLINE_SECS", 120_u64)?),
            shutdown_grace: Duration::from_secs(env_parse_or("SHUTDOWN_GRACE_SECS", 10_u64)?),
            policy_path: env_or("POLICY_PATH", "policy/permissions.yml"),
            system_prompt_path: env_or("SYSTEM_PROMPT_PATH", "config/system_prompt.txt"),

            jwt_secret: env_required("JWT_SECRET")?,
            rate_limit_requests: env_parse_or("RATE_LIMIT_REQUESTS", 100_u32)?,
            rate_limit_window_secs: env_parse_or("RATE_LIMIT_WINDOW_SECS", 60_u64)?,

            app_env: env_or("APP_ENV", "development"),
            metrics_addr: env_or("METRICS_ADDR", "127.0.0.1:9100"),
        };

        if config.max_concurrent_actions == 0 {
            return Err(PlatformError::Config(
                "MAX_CONCURRENT_ACTIONS must be >= 1".to_string(),
            ));
        }

        Ok(config)
    }
}
