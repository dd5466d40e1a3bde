//! Process configuration, read from the environment (optionally seeded from `.env`).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::seating::{LayoutError, SeatLayout};

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::apply_security_headers;

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var}='{value}' is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("seat layout: {0}")]
    Layout(#[from] LayoutError),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs the server on the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub host: IpAddr,
    pub port: u16,
    pub secret_key: String,
    pub token_ttl: Duration,
    pub request_timeout: Duration,
    pub seat_layout: SeatLayout,
    pub ticket_price: Decimal,
    /// When set, an `admin` account with this password is created at startup.
    pub admin_password: Option<String>,
    pub seed_catalog: bool,
    pub cors_allowed_origins: Vec<String>,
    /// `RUST_ENV=production`; turns on HSTS.
    pub production: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let secret_key = get("SECRET_KEY").ok_or(ConfigError::Missing("SECRET_KEY"))?;
        let token_ttl_hours: u64 = parse_or(&get, "TOKEN_TTL_HOURS", 72)?;
        let token_ttl = token_ttl_hours
            .checked_mul(3600)
            .map(Duration::from_secs)
            .ok_or_else(|| ConfigError::Invalid {
                var: "TOKEN_TTL_HOURS",
                value: token_ttl_hours.to_string(),
                reason: "too large".to_string(),
            })?;
        let request_timeout_secs: u64 = parse_or(&get, "REQUEST_TIMEOUT_SECS", 5)?;
        if request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "REQUEST_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let rows = get("SEAT_ROWS").unwrap_or_else(|| crate::seating::layout::DEFAULT_ROWS.to_string());
        let columns: u32 = parse_or(&get, "SEAT_COLUMNS", crate::seating::layout::DEFAULT_COLUMNS)?;

        let ticket_price: Decimal = parse_or(&get, "TICKET_PRICE", Decimal::from(5))?;
        if ticket_price.is_sign_negative() {
            return Err(ConfigError::Invalid {
                var: "TICKET_PRICE",
                value: ticket_price.to_string(),
                reason: "must not be negative".to_string(),
            });
        }

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            database_url: get("DATABASE_URL"),
            max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 5)?,
            host: parse_or(&get, "HOST", IpAddr::V4(Ipv4Addr::UNSPECIFIED))?,
            port: parse_or(&get, "PORT", 8080)?,
            secret_key,
            token_ttl,
            request_timeout: Duration::from_secs(request_timeout_secs),
            seat_layout: SeatLayout::new(&rows, columns)?,
            ticket_price,
            admin_password: get("ADMIN_PASSWORD"),
            seed_catalog: parse_bool_or(&get, "SEED_CATALOG", true)?,
            cors_allowed_origins,
            production: get("RUST_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production")),
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_bool_or<G>(get: &G, var: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(var).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(value) => Err(ConfigError::Invalid {
            var,
            value,
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("SECRET_KEY", "s3cret")]).unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:8080");
        assert_eq!(config.token_ttl, Duration::from_secs(72 * 3600));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.seat_layout, SeatLayout::default());
        assert_eq!(config.ticket_price, Decimal::from(5));
        assert!(config.admin_password.is_none());
        assert!(config.seed_catalog);
        assert_eq!(
            config.cors_allowed_origins,
            vec!["http://localhost:3000", "http://localhost:5173"]
        );
        assert!(!config.production);
    }

    #[test]
    fn test_secret_key_is_required() {
        assert!(matches!(config(&[]), Err(ConfigError::Missing("SECRET_KEY"))));
        assert!(matches!(
            config(&[("SECRET_KEY", "  ")]),
            Err(ConfigError::Missing("SECRET_KEY"))
        ));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("SECRET_KEY", "s3cret"),
            ("DATABASE_URL", "postgres://db/cinema"),
            ("PORT", "9000"),
            ("SEAT_ROWS", "ABC"),
            ("SEAT_COLUMNS", "8"),
            ("TICKET_PRICE", "7.50"),
            ("SEED_CATALOG", "false"),
            ("RUST_ENV", "Production"),
            ("CORS_ALLOWED_ORIGINS", "https://cinema.example, "),
        ])
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("postgres://db/cinema"));
        assert_eq!(config.port, 9000);
        assert_eq!(config.seat_layout.max_seats(), 24);
        assert_eq!(config.ticket_price, Decimal::new(750, 2));
        assert!(!config.seed_catalog);
        assert!(config.production);
        assert_eq!(config.cors_allowed_origins, vec!["https://cinema.example"]);
    }

    #[test]
    fn test_invalid_values_are_reported() {
        assert!(matches!(
            config(&[("SECRET_KEY", "s"), ("PORT", "http")]),
            Err(ConfigError::Invalid { var: "PORT", .. })
        ));
        assert!(matches!(
            config(&[("SECRET_KEY", "s"), ("SEAT_ROWS", "AA")]),
            Err(ConfigError::Layout(LayoutError::DuplicateRow('A')))
        ));
        assert!(matches!(
            config(&[("SECRET_KEY", "s"), ("SEED_CATALOG", "maybe")]),
            Err(ConfigError::Invalid { var: "SEED_CATALOG", .. })
        ));
        assert!(matches!(
            config(&[("SECRET_KEY", "s"), ("TICKET_PRICE", "-1")]),
            Err(ConfigError::Invalid { var: "TICKET_PRICE", .. })
        ));
        assert!(matches!(
            config(&[("SECRET_KEY", "s"), ("TOKEN_TTL_HOURS", "5124095576030432")]),
            Err(ConfigError::Invalid { var: "TOKEN_TTL_HOURS", .. })
        ));
    }
}
