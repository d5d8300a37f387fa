//! Runtime configuration parsed from environment variables.
//!
//! Optional knobs fall back to defaults when missing or unparsable. The JWT
//! secret is the only required value: without it no connection could ever be
//! admitted, so startup fails instead.

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_CHAT_MAX_MESSAGE_CHARS: usize = 1000;
pub const DEFAULT_WORK_DURATION_SECS: u32 = 1500;
pub const DEFAULT_BREAK_DURATION_SECS: u32 = 300;
pub const DEFAULT_WS_CLIENT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_TIMER_PERSIST_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
}

/// Defaults applied when a room record carries no usable timer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerDefaults {
    pub work_duration: u32,
    pub break_duration: u32,
}

impl Default for TimerDefaults {
    fn default() -> Self {
        Self { work_duration: DEFAULT_WORK_DURATION_SECS, break_duration: DEFAULT_BREAK_DURATION_SECS }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    /// JSON file of room records seeding the in-memory store.
    pub rooms_file: Option<String>,
    pub jwt_secret: String,
    pub chat_max_message_chars: usize,
    pub timer_defaults: TimerDefaults,
    pub ws_client_queue_capacity: usize,
    pub timer_persist_queue_capacity: usize,
}

impl AppConfig {
    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `JWT_SECRET`
    ///
    /// Optional:
    /// - `PORT` (default 3000)
    /// - `DATABASE_URL` (unset: in-memory room store)
    /// - `ROOMS_FILE` (seed records for the in-memory store)
    /// - `CHAT_MAX_MESSAGE_CHARS` (default 1000)
    /// - `DEFAULT_WORK_DURATION_SECS` / `DEFAULT_BREAK_DURATION_SECS`
    /// - `WS_CLIENT_QUEUE_CAPACITY` (default 256)
    /// - `TIMER_PERSIST_QUEUE_CAPACITY` (default 1024)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when `JWT_SECRET` is absent or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        Ok(Self {
            port: env_parse("PORT", DEFAULT_PORT),
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            rooms_file: std::env::var("ROOMS_FILE").ok().filter(|s| !s.is_empty()),
            jwt_secret,
            chat_max_message_chars: env_parse("CHAT_MAX_MESSAGE_CHARS", DEFAULT_CHAT_MAX_MESSAGE_CHARS).max(1),
            timer_defaults: TimerDefaults {
                work_duration: env_parse("DEFAULT_WORK_DURATION_SECS", DEFAULT_WORK_DURATION_SECS).max(1),
                break_duration: env_parse("DEFAULT_BREAK_DURATION_SECS", DEFAULT_BREAK_DURATION_SECS).max(1),
            },
            ws_client_queue_capacity: env_parse("WS_CLIENT_QUEUE_CAPACITY", DEFAULT_WS_CLIENT_QUEUE_CAPACITY).max(1),
            timer_persist_queue_capacity: env_parse(
                "TIMER_PERSIST_QUEUE_CAPACITY",
                DEFAULT_TIMER_PERSIST_QUEUE_CAPACITY,
            )
            .max(1),
        })
    }

    /// Config with defaults and the given secret.
    #[cfg(test)]
    #[must_use]
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            rooms_file: None,
            jwt_secret: jwt_secret.into(),
            chat_max_message_chars: DEFAULT_CHAT_MAX_MESSAGE_CHARS,
            timer_defaults: TimerDefaults::default(),
            ws_client_queue_capacity: DEFAULT_WS_CLIENT_QUEUE_CAPACITY,
            timer_persist_queue_capacity: DEFAULT_TIMER_PERSIST_QUEUE_CAPACITY,
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
