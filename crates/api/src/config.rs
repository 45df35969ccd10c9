use std::str::FromStr;
use std::time::Duration;

use hailango_events::hub::{
    HubConfig, DEFAULT_BACKPRESSURE_GRACE, DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_PING_INTERVAL,
    DEFAULT_PONG_TIMEOUT, DEFAULT_QUEUE_CAPACITY, DEFAULT_SWEEP_INTERVAL, DEFAULT_WRITE_TIMEOUT,
};
use hailango_pipeline::SimulationConfig;

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for in-flight jobs, in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// JWT verification settings.
    pub jwt: JwtConfig,
    /// Notification hub tuning (queue size, heartbeat, backpressure).
    pub hub: HubConfig,
    /// Simulated media backend settings.
    pub simulation: SimulationConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                    |
    /// |----------------------------|----------------------------|
    /// | `HOST`                     | `0.0.0.0`                  |
    /// | `PORT`                     | `3000`                     |
    /// | `CORS_ORIGINS`             | `http://localhost:3000`    |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `30`                       |
    /// | `WS_QUEUE_CAPACITY`        | `256`                      |
    /// | `WS_PING_INTERVAL_SECS`    | `54`                       |
    /// | `WS_PONG_TIMEOUT_SECS`     | `60`                       |
    /// | `WS_WRITE_TIMEOUT_SECS`    | `10`                       |
    /// | `WS_BACKPRESSURE_GRACE_MS` | `2000`                     |
    /// | `WS_SWEEP_INTERVAL_MS`     | `1000`                     |
    /// | `WS_MAX_MESSAGE_BYTES`     | `524288`                   |
    /// | `SIM_FAILURE_RATE`         | `0.0`                      |
    /// | `SIM_STEP_DELAY_MS`        | per-kind defaults          |
    ///
    /// See [`JwtConfig::from_env`] for the JWT variables.
    ///
    /// # Panics
    ///
    /// Panics if a variable is set but cannot be parsed.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env_or("PORT", 3000);

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env_or("REQUEST_TIMEOUT_SECS", 30);
        let shutdown_timeout_secs: u64 = env_or("SHUTDOWN_TIMEOUT_SECS", 30);

        let hub = HubConfig {
            queue_capacity: env_or("WS_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY),
            ping_interval: Duration::from_secs(env_or(
                "WS_PING_INTERVAL_SECS",
                DEFAULT_PING_INTERVAL.as_secs(),
            )),
            pong_timeout: Duration::from_secs(env_or(
                "WS_PONG_TIMEOUT_SECS",
                DEFAULT_PONG_TIMEOUT.as_secs(),
            )),
            write_timeout: Duration::from_secs(env_or(
                "WS_WRITE_TIMEOUT_SECS",
                DEFAULT_WRITE_TIMEOUT.as_secs(),
            )),
            backpressure_grace: Duration::from_millis(env_or(
                "WS_BACKPRESSURE_GRACE_MS",
                DEFAULT_BACKPRESSURE_GRACE.as_millis() as u64,
            )),
            sweep_interval: Duration::from_millis(env_or(
                "WS_SWEEP_INTERVAL_MS",
                DEFAULT_SWEEP_INTERVAL.as_millis() as u64,
            )),
            max_message_bytes: env_or("WS_MAX_MESSAGE_BYTES", DEFAULT_MAX_MESSAGE_BYTES),
        };
        assert!(hub.queue_capacity > 0, "WS_QUEUE_CAPACITY must be positive");
        assert!(
            hub.pong_timeout > hub.ping_interval,
            "WS_PONG_TIMEOUT_SECS must exceed WS_PING_INTERVAL_SECS"
        );

        let mut simulation =
            SimulationConfig::default().with_failure_rate(env_or("SIM_FAILURE_RATE", 0.0));
        if let Ok(raw) = std::env::var("SIM_STEP_DELAY_MS") {
            let millis: u64 = raw.parse().expect("SIM_STEP_DELAY_MS must be a valid u64");
            simulation = simulation.with_step_delay(Duration::from_millis(millis));
        }

        let jwt = JwtConfig::from_env();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            jwt,
            hub,
            simulation,
        }
    }
}

/// Read `name` and parse it, falling back to `default` when unset.
fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            panic!("{name} must be a valid {}: {e}", std::any::type_name::<T>())
        }),
        Err(_) => default,
    }
}
