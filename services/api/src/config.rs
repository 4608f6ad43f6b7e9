use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;
use voicenet_core::PromptConfig;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Settings for keeping the incoming-call dispatch subscription registered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchConfig {
    pub public_url: String,
    pub did: String,
    pub workflow_id: String,
    pub node_id: String,
}

impl DispatchConfig {
    /// Webhook URL the backend should call for incoming calls.
    pub fn callback_url(&self) -> String {
        format!("{}/webhooks/voicenet", self.public_url.trim_end_matches('/'))
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub base_url: String,
    pub api_key: SecretString,
    pub signing_secret: Option<SecretString>,
    pub runtime_url: Option<String>,
    pub log_level: Level,
    pub command_timeout: Duration,
    pub connect_timeout: Duration,
    pub keepalive_interval: Duration,
    pub signature_tolerance: Duration,
    pub prompt: PromptConfig,
    pub auto_answer: bool,
    pub dispatch: Option<DispatchConfig>,
    pub subscriptions_path: PathBuf,
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required_var(name: &str) -> Result<String, ConfigError> {
    optional_var(name).ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

fn secs_var(name: &str, default: u64) -> Result<Duration, ConfigError> {
    match optional_var(name) {
        None => Ok(Duration::from_secs(default)),
        Some(raw) => match raw.parse::<u64>() {
            Ok(0) => Err(ConfigError::InvalidValue(
                name.to_string(),
                "must be greater than zero".to_string(),
            )),
            Ok(secs) => Ok(Duration::from_secs(secs)),
            Err(e) => Err(ConfigError::InvalidValue(name.to_string(), e.to_string())),
        },
    }
}

fn bool_var(name: &str, default: bool) -> Result<bool, ConfigError> {
    match optional_var(name) {
        None => Ok(default),
        Some(raw) => match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue(
                name.to_string(),
                format!("'{}' is not a boolean", raw),
            )),
        },
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let base_url = required_var("VOICENET_BASE_URL")?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue(
                "VOICENET_BASE_URL".to_string(),
                format!("'{}' must be an http(s) URL", base_url),
            ));
        }
        let api_key = SecretString::from(required_var("VOICENET_API_KEY")?);
        let signing_secret = optional_var("VOICENET_SIGNING_SECRET").map(SecretString::from);
        let runtime_url = optional_var("VOICENET_RUNTIME_URL");

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let defaults = PromptConfig::default();
        let prompt = PromptConfig {
            prompt_base: optional_var("AGENT_PROMPT_BASE").unwrap_or(defaults.prompt_base),
            user_instructions: optional_var("AGENT_USER_INSTRUCTIONS")
                .unwrap_or(defaults.user_instructions),
            locale: optional_var("AGENT_LOCALE").unwrap_or(defaults.locale),
            barge_in: bool_var("AGENT_BARGE_IN", defaults.barge_in)?,
        };

        let dispatch = match optional_var("PUBLIC_URL") {
            Some(public_url) => Some(DispatchConfig {
                public_url,
                did: required_var("DISPATCH_DID")?,
                workflow_id: optional_var("WORKFLOW_ID").unwrap_or_else(|| "voicenet".to_string()),
                node_id: optional_var("NODE_ID").unwrap_or_else(|| "inbound".to_string()),
            }),
            None => None,
        };

        let subscriptions_path = optional_var("SUBSCRIPTIONS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./subscriptions.json"));

        Ok(Self {
            bind_address,
            base_url,
            api_key,
            signing_secret,
            runtime_url,
            log_level,
            command_timeout: secs_var("COMMAND_TIMEOUT_SECS", 10)?,
            connect_timeout: secs_var("CONNECT_TIMEOUT_SECS", 10)?,
            keepalive_interval: secs_var("KEEPALIVE_INTERVAL_SECS", 30)?,
            signature_tolerance: secs_var("SIGNATURE_TOLERANCE_SECS", 300)?,
            prompt,
            auto_answer: bool_var("AUTO_ANSWER", true)?,
            dispatch,
            subscriptions_path,
        })
    }
}
