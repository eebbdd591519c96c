use std::env;
use std::str::FromStr;
use std::time::Duration;

/// How invitation keys reach the room host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRotationMode {
    /// Server rotates on a fixed period and pushes over a WebSocket.
    Push,
    /// Server polls for expiry and emits over server-sent events.
    Poll,
}

impl FromStr for KeyRotationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "push" | "ws" => Ok(KeyRotationMode::Push),
            "poll" | "sse" => Ok(KeyRotationMode::Poll),
            other => Err(ConfigError::InvalidRotationMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    pub invitation_key_ttl_seconds: u64,
    pub key_rotation_seconds: u64,
    pub key_poll_seconds: u64,
    pub key_rotation_mode: KeyRotationMode,
    pub request_timeout_seconds: u64,
    pub stun_server: String,
    pub turn_server: Option<String>,
    pub turn_username: Option<String>,
    pub turn_credential: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::MissingJwtSecret)?,
            jwt_expiry_seconds: seconds_from_env("JWT_EXPIRY_SECONDS", 900),
            invitation_key_ttl_seconds: seconds_from_env("INVITATION_KEY_TTL_SECONDS", 60),
            key_rotation_seconds: seconds_from_env("KEY_ROTATION_SECONDS", 60),
            key_poll_seconds: seconds_from_env("KEY_POLL_SECONDS", 30),
            key_rotation_mode: env::var("KEY_ROTATION_MODE")
                .unwrap_or_else(|_| "push".to_string())
                .parse()?,
            request_timeout_seconds: seconds_from_env("REQUEST_TIMEOUT_SECONDS", 30),
            stun_server: env::var("STUN_SERVER")
                .unwrap_or_else(|_| "stun:stun.l.google.com:19302".to_string()),
            turn_server: env::var("TURN_SERVER").ok(),
            turn_username: env::var("TURN_USERNAME").ok(),
            turn_credential: env::var("TURN_CREDENTIAL").ok(),
        })
    }

    /// Default settings with the given signing secret; used by tests and tools.
    pub fn with_defaults(jwt_secret: impl Into<String>) -> Self {
        Config {
            server_host: "0.0.0.0".to_string(),
            server_port: 8080,
            redis_url: "redis://localhost:6379".to_string(),
            jwt_secret: jwt_secret.into(),
            jwt_expiry_seconds: 900,
            invitation_key_ttl_seconds: 60,
            key_rotation_seconds: 60,
            key_poll_seconds: 30,
            key_rotation_mode: KeyRotationMode::Push,
            request_timeout_seconds: 30,
            stun_server: "stun:stun.l.google.com:19302".to_string(),
            turn_server: None,
            turn_username: None,
            turn_credential: None,
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn invitation_key_ttl(&self) -> Duration {
        Duration::from_secs(self.invitation_key_ttl_seconds)
    }

    pub fn key_rotation_interval(&self) -> Duration {
        Duration::from_secs(self.key_rotation_seconds)
    }

    pub fn key_poll_interval(&self) -> Duration {
        Duration::from_secs(self.key_poll_seconds)
    }
}

/// Zero is rejected so a misconfigured interval cannot spin a rotation loop.
fn seconds_from_env(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v: &u64| *v > 0)
        .unwrap_or(default)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server port")]
    InvalidPort,
    #[error("JWT_SECRET environment variable is required")]
    MissingJwtSecret,
    #[error("Invalid KEY_ROTATION_MODE '{0}', expected 'push' or 'poll'")]
    InvalidRotationMode(String),
}
