//! Configuration loading and representation.

use thiserror::Error;

use kart_core::Money;
use kart_orders::{DEFAULT_SHIPPING_TOTAL_MINOR, OrderNumberGenerator};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Settings for the orders subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrdersConfig {
    /// Shipping charge given to every new order.
    pub default_shipping_total: Money,
    pub order_numbers: OrderNumberGenerator,
    pub database_url: Option<String>,
    pub use_persistent_stores: bool,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            default_shipping_total: Money::from_minor(DEFAULT_SHIPPING_TOTAL_MINOR),
            order_numbers: OrderNumberGenerator::default(),
            database_url: None,
            use_persistent_stores: false,
        }
    }
}

impl OrdersConfig {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; unset keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("KART_DEFAULT_SHIPPING_TOTAL") {
            let amount = Money::parse(&raw).map_err(|e| ConfigError::Invalid {
                var: "KART_DEFAULT_SHIPPING_TOTAL",
                reason: e.to_string(),
            })?;
            if amount.is_negative() {
                return Err(ConfigError::Invalid {
                    var: "KART_DEFAULT_SHIPPING_TOTAL",
                    reason: "must not be negative".to_string(),
                });
            }
            config.default_shipping_total = amount;
        }

        if let Some(raw) = lookup("KART_ORDER_NUMBER_LENGTH") {
            let length = raw.trim().parse::<usize>().map_err(|e| ConfigError::Invalid {
                var: "KART_ORDER_NUMBER_LENGTH",
                reason: e.to_string(),
            })?;
            config.order_numbers =
                OrderNumberGenerator::new(length).map_err(|e| ConfigError::Invalid {
                    var: "KART_ORDER_NUMBER_LENGTH",
                    reason: e.to_string(),
                })?;
        }

        config.database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        config.use_persistent_stores = match lookup("USE_PERSISTENT_STORES") {
            Some(raw) => raw.trim().parse::<bool>().map_err(|e| ConfigError::Invalid {
                var: "USE_PERSISTENT_STORES",
                reason: e.to_string(),
            })?,
            None => false,
        };

        Ok(config)
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }
}
