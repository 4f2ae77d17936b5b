// ⚙️ Configuration - environment variables, optionally from a .env file

use dotenvy::dotenv;
use rust_decimal::Decimal;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::normalizer::MAX_AMOUNT;
use crate::store::DEFAULT_PAGE_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub owner_id: String,
    pub default_commission: Decimal,
    pub server_addr: String,
    pub page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: PathBuf::from("fleet_earnings.db"),
            owner_id: "default".to_string(),
            default_commission: Decimal::ZERO,
            server_addr: "0.0.0.0:3000".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Config {
    /// Read `FLEET_*` variables (after loading `.env` if present)
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source; unset or blank values use defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let default_commission = match get("FLEET_DEFAULT_COMMISSION") {
            Some(raw) => {
                let amount = Decimal::from_str(raw.trim()).map_err(|_| ConfigError::Invalid {
                    name: "FLEET_DEFAULT_COMMISSION",
                    value: raw.clone(),
                    reason: "expected a decimal amount",
                })?;
                if amount < Decimal::ZERO {
                    return Err(ConfigError::Invalid {
                        name: "FLEET_DEFAULT_COMMISSION",
                        value: raw,
                        reason: "commission cannot be negative",
                    });
                }
                if amount > MAX_AMOUNT {
                    return Err(ConfigError::Invalid {
                        name: "FLEET_DEFAULT_COMMISSION",
                        value: raw,
                        reason: "commission is out of range",
                    });
                }
                amount
            }
            None => defaults.default_commission,
        };

        let page_size = match get("FLEET_PAGE_SIZE") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "FLEET_PAGE_SIZE",
                        value: raw,
                        reason: "expected a positive integer",
                    })
                }
            },
            None => defaults.page_size,
        };

        Ok(Config {
            db_path: get("FLEET_DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            owner_id: get("FLEET_OWNER_ID").unwrap_or(defaults.owner_id),
            default_commission,
            server_addr: get("FLEET_SERVER_ADDR").unwrap_or(defaults.server_addr),
            page_size,
        })
    }
}
