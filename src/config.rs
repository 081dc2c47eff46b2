use std::env;
use std::time::Duration;

use crate::channel::link::ReconnectPolicy;
use crate::error::AppError;
use crate::models::coordinate::Coordinate;
use crate::tracking::view::{DEFAULT_CENTER, TrackingSettings};

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub poll_interval_ms: u64,
    pub geolocation_timeout_ms: u64,
    pub tracking_zoom: u8,
    pub driver_zoom: u8,
    pub default_center: Coordinate,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    pub routing_url: Option<String>,
    pub routing_timeout_ms: u64,
    pub api_timeout_ms: u64,
    pub api_base_url: Option<String>,
    pub api_token: Option<String>,
    pub static_dir: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        Self::from_source(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys take their defaults.
    pub fn from_source<F>(get: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(get);

        let default_center = Coordinate::new(
            vars.parse_or("DEFAULT_CENTER_LAT", DEFAULT_CENTER.lat)?,
            vars.parse_or("DEFAULT_CENTER_LNG", DEFAULT_CENTER.lng)?,
        )
        .map_err(|err| AppError::Internal(format!("invalid default center: {err}")))?;

        Ok(Self {
            http_port: vars.parse_or("HTTP_PORT", 3000)?,
            log_level: vars.or("LOG_LEVEL", "info"),
            event_buffer_size: vars.parse_or("EVENT_BUFFER_SIZE", 1024)?,
            poll_interval_ms: vars.parse_or("POLL_INTERVAL_MS", 5000)?,
            geolocation_timeout_ms: vars.parse_or("GEOLOCATION_TIMEOUT_MS", 10_000)?,
            tracking_zoom: vars.parse_or("TRACKING_ZOOM", 14)?,
            driver_zoom: vars.parse_or("DRIVER_ZOOM", 13)?,
            default_center,
            reconnect_initial_ms: vars.parse_or("RECONNECT_INITIAL_MS", 500)?,
            reconnect_max_ms: vars.parse_or("RECONNECT_MAX_MS", 30_000)?,
            routing_url: vars.optional("ROUTING_URL"),
            routing_timeout_ms: vars.parse_or("ROUTING_TIMEOUT_MS", 10_000)?,
            api_base_url: vars.optional("API_BASE_URL"),
            api_token: vars.optional("API_TOKEN"),
            api_timeout_ms: vars.parse_or("API_TIMEOUT_MS", 10_000)?,
            static_dir: vars.or("STATIC_DIR", "static"),
        })
    }

    pub fn tracking_settings(&self) -> TrackingSettings {
        TrackingSettings {
            zoom: self.tracking_zoom,
            driver_zoom: self.driver_zoom,
            default_center: self.default_center,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            geolocation_timeout: Duration::from_millis(self.geolocation_timeout_ms),
            reconnect: ReconnectPolicy {
                initial_delay: Duration::from_millis(self.reconnect_initial_ms),
                max_delay: Duration::from_millis(self.reconnect_max_ms),
                ..ReconnectPolicy::default()
            },
            event_buffer: self.event_buffer_size,
        }
    }

    pub fn routing_timeout(&self) -> Duration {
        Duration::from_millis(self.routing_timeout_ms)
    }

    /// Request timeout for the order backend.
    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        (self.0)(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, AppError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match (self.0)(key) {
            Some(raw) => raw
                .parse::<T>()
                .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
            None => Ok(default),
        }
    }
}
