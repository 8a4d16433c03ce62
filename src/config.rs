use crate::error::AppError;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cookie_name: String,
    /// Signing secrets. The first signs new cookies, all are accepted on verify.
    pub secrets: Vec<String>,
    pub key_prefix: String,
}

/// Real-time transport tuning shared by every service behind the dispatcher.
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub heartbeat_interval: Duration,
    pub send_timeout: Duration,
    pub outbound_buffer: usize,
    pub inbound_buffer: usize,
    pub max_body_bytes: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            send_timeout: Duration::from_millis(5000),
            outbound_buffer: 64,
            inbound_buffer: 32,
            max_body_bytes: 4000,
        }
    }
}

/// Path-to-service mapping table for the upgrade dispatcher.
#[derive(Debug, Clone)]
pub struct ServicePaths {
    pub chat: String,
    pub meeting: String,
}

impl Default for ServicePaths {
    fn default() -> Self {
        Self {
            chat: "/ws/chat".to_string(),
            meeting: "/ws/meeting".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: usize,
    pub redis_url: String,
    pub session: SessionConfig,
    pub ws: WsConfig,
    pub paths: ServicePaths,
    pub json_logs: bool,
}

impl Config {
    fn parse_list(value: &str) -> Vec<String> {
        value
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    }

    fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
        env::var(key)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default)
    }

    fn normalize_path(path: String) -> String {
        let trimmed = path.trim().trim_end_matches('/');
        if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL missing".into()))?;
        let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());

        let secrets = env::var("SESSION_SECRETS")
            .map(|v| Self::parse_list(&v))
            .map_err(|_| AppError::Config("SESSION_SECRETS missing".into()))?;
        if secrets.is_empty() {
            return Err(AppError::Config(
                "SESSION_SECRETS must contain at least one secret".into(),
            ));
        }

        let session = SessionConfig {
            cookie_name: env::var("SESSION_COOKIE_NAME")
                .unwrap_or_else(|_| "connect.sid".to_string()),
            secrets,
            key_prefix: env::var("SESSION_KEY_PREFIX").unwrap_or_else(|_| "sess:".to_string()),
        };

        let defaults = WsConfig::default();
        let ws = WsConfig {
            heartbeat_interval: Duration::from_secs(Self::parse_or(
                "WS_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval.as_secs(),
            )),
            send_timeout: Duration::from_millis(Self::parse_or(
                "WS_SEND_TIMEOUT_MS",
                defaults.send_timeout.as_millis() as u64,
            )),
            outbound_buffer: Self::parse_or("WS_OUTBOUND_BUFFER", defaults.outbound_buffer),
            inbound_buffer: Self::parse_or("WS_INBOUND_BUFFER", defaults.inbound_buffer),
            max_body_bytes: Self::parse_or("WS_MAX_BODY_BYTES", defaults.max_body_bytes),
        };
        if ws.heartbeat_interval.is_zero() || ws.outbound_buffer == 0 || ws.inbound_buffer == 0 {
            return Err(AppError::Config(
                "WS_HEARTBEAT_INTERVAL_SECS, WS_OUTBOUND_BUFFER and WS_INBOUND_BUFFER must be positive"
                    .into(),
            ));
        }

        let default_paths = ServicePaths::default();
        let paths = ServicePaths {
            chat: Self::normalize_path(env::var("WS_CHAT_PATH").unwrap_or(default_paths.chat)),
            meeting: Self::normalize_path(
                env::var("WS_MEETING_PATH").unwrap_or(default_paths.meeting),
            ),
        };
        if paths.chat == paths.meeting {
            return Err(AppError::Config(format!(
                "WS_CHAT_PATH and WS_MEETING_PATH must differ (both {})",
                paths.chat
            )));
        }

        let json_logs = env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(Self {
            port: Self::parse_or("PORT", 3000),
            database_url,
            db_max_connections: Self::parse_or("DB_MAX_CONNECTIONS", 16),
            redis_url,
            session,
            ws,
            paths,
            json_logs,
        })
    }
}
