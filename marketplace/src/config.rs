//! Configuration for the marketplace
//!
//! Read once at startup (TOML file, then `MARKET_*` environment overrides)
//! and injected into the engine, so tests can vary policy per case.

use ledger_store::{Credits, StoreConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Marketplace configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Ledger store configuration
    pub store: StoreConfig,

    /// Checkout policy
    pub checkout: CheckoutPolicy,

    /// Listing price bounds
    pub listings: ListingPolicy,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "marketplace".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            store: StoreConfig::default(),
            checkout: CheckoutPolicy::default(),
            listings: ListingPolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Checkout policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckoutPolicy {
    /// Maximum cart entries per checkout
    pub max_cart_items: usize,

    /// Let guest accounts cart and buy
    pub allow_guest_checkout: bool,
}

impl Default for CheckoutPolicy {
    fn default() -> Self {
        Self {
            max_cart_items: 10,
            allow_guest_checkout: false,
        }
    }
}

/// Listing price bounds (inclusive)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingPolicy {
    /// Lowest accepted list price
    pub min_listing_price: Credits,

    /// Highest accepted list price
    pub max_listing_price: Credits,
}

impl Default for ListingPolicy {
    fn default() -> Self {
        Self {
            min_listing_price: 1_000,
            max_listing_price: 1_000_000_000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub filter: String,

    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an optional file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> crate::Result<()> {
        if let Ok(dir) = std::env::var("MARKET_DATA_DIR") {
            self.store.data_dir = PathBuf::from(dir);
        }

        if let Some(max) = env_parse("MARKET_MAX_CART_ITEMS")? {
            self.checkout.max_cart_items = max;
        }

        if let Some(allow) = env_parse("MARKET_ALLOW_GUEST_CHECKOUT")? {
            self.checkout.allow_guest_checkout = allow;
        }

        if let Some(min) = env_parse("MARKET_MIN_LISTING_PRICE")? {
            self.listings.min_listing_price = min;
        }

        if let Some(max) = env_parse("MARKET_MAX_LISTING_PRICE")? {
            self.listings.max_listing_price = max;
        }

        if let Some(json) = env_parse("MARKET_LOG_JSON")? {
            self.logging.json = json;
        }

        Ok(())
    }

    /// Reject configurations the engine cannot honor
    pub fn validate(&self) -> crate::Result<()> {
        if self.checkout.max_cart_items == 0 {
            return Err(crate::Error::Config(
                "checkout.max_cart_items must be at least 1".to_string(),
            ));
        }

        if self.listings.min_listing_price > self.listings.max_listing_price {
            return Err(crate::Error::Config(format!(
                "listings.min_listing_price ({}) exceeds listings.max_listing_price ({})",
                self.listings.min_listing_price, self.listings.max_listing_price
            )));
        }

        self.store.validate()?;
        Ok(())
    }
}

fn env_parse<T: FromStr>(name: &str) -> crate::Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| crate::Error::Config(format!("{} has an invalid value: {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}
