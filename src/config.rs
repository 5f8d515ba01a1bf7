//! Process configuration, loaded from the environment.
//!
//! `.env` files are honored via dotenvy in `main`. Secrets (bot token,
//! webhook secret) are wrapped in `SecretString` so they never show up in
//! debug output or logs.

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default Telegram Bot API endpoint. Overridable for self-hosted
/// bot-api servers (they speak the same protocol on a different origin).
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Top-level configuration.
#[derive(Debug)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub server: ServerConfig,
    pub database: Option<DatabaseConfig>,
}

/// Telegram Bot API access.
#[derive(Debug)]
pub struct TelegramConfig {
    /// Bot token, as issued by BotFather.
    pub bot_token: SecretString,
    /// API origin, without a trailing slash.
    pub api_base: String,
}

/// HTTP server settings.
#[derive(Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Shared secret expected in `X-Telegram-Bot-Api-Secret-Token` on
    /// webhook calls. Unset disables the check (local development only).
    pub webhook_secret: Option<SecretString>,
}

/// PostgreSQL settings. Absent entirely when `DATABASE_URL` is unset, in
/// which case the in-memory store is used and records do not survive restart.
#[derive(Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = require("TELEGRAM_BOT_TOKEN")?;

        let api_base = std::env::var("TELEGRAM_API_BASE")
            .unwrap_or_else(|_| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let host = std::env::var("RELAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match std::env::var("RELAY_PORT") {
            Ok(v) => v.parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: "RELAY_PORT",
                reason: e.to_string(),
            })?,
            Err(_) => 8080,
        };

        let webhook_secret = std::env::var("WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .map(SecretString::from);

        let database = match std::env::var("DATABASE_URL") {
            Ok(url) if !url.is_empty() => {
                let pool_size = match std::env::var("DATABASE_POOL_SIZE") {
                    Ok(v) => v.parse::<usize>().map_err(|e| ConfigError::Invalid {
                        name: "DATABASE_POOL_SIZE",
                        reason: e.to_string(),
                    })?,
                    Err(_) => 8,
                };
                Some(DatabaseConfig { url, pool_size })
            }
            _ => None,
        };

        Ok(Self {
            telegram: TelegramConfig {
                bot_token: SecretString::from(bot_token),
                api_base,
            },
            server: ServerConfig {
                host,
                port,
                webhook_secret,
            },
            database,
        })
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or(ConfigError::MissingVar { name })
}
