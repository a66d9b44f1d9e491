//! Engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All optional; defaults match the storefront's product decisions.
//!
//! - `FAITHLINE_MAX_QUANTITY_PER_ITEM` - Per-line quantity cap (default: 99)
//! - `FAITHLINE_MAX_TOTAL_ITEMS` - Cap on the sum of quantities (default: 100)
//! - `FAITHLINE_MAX_UNIQUE_PRODUCTS` - Cap on distinct lines (default: 50)
//! - `FAITHLINE_IDENTITY_WAIT_MS` - Identity-gate wait budget (default: 5000)

use std::time::Duration;

use thiserror::Error;

/// Default per-line quantity cap.
const DEFAULT_MAX_QUANTITY_PER_ITEM: u32 = 99;
/// Default cap on the sum of all quantities in a cart.
const DEFAULT_MAX_TOTAL_ITEMS: u32 = 100;
/// Default cap on the number of distinct cart lines.
const DEFAULT_MAX_UNIQUE_PRODUCTS: u32 = 50;
/// Default identity-gate wait budget before failing open to guest mode.
const DEFAULT_IDENTITY_WAIT_MS: u64 = 5_000;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that does not parse as a number.
    #[error("{name} must be a positive integer, got {value:?}")]
    InvalidNumber {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
    /// A limit was set to zero, which would make every mutation fail.
    #[error("{name} must be greater than zero")]
    Zero {
        /// Variable name.
        name: &'static str,
    },
}

/// Cart size limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartLimits {
    /// Maximum quantity for a single cart line.
    pub max_quantity_per_item: u32,
    /// Maximum sum of quantities across the whole cart.
    pub max_total_items: u32,
    /// Maximum number of distinct lines in the cart.
    pub max_unique_products: u32,
}

impl Default for CartLimits {
    fn default() -> Self {
        Self {
            max_quantity_per_item: DEFAULT_MAX_QUANTITY_PER_ITEM,
            max_total_items: DEFAULT_MAX_TOTAL_ITEMS,
            max_unique_products: DEFAULT_MAX_UNIQUE_PRODUCTS,
        }
    }
}

/// Configuration shared by the cart and wishlist engines.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Cart size limits (the wishlist is unbounded by product decision).
    pub limits: CartLimits,
    /// Local-store key for the guest cart.
    pub cart_storage_key: String,
    /// Local-store key for the guest wishlist.
    pub wishlist_storage_key: String,
    /// How long to wait for the identity gate before proceeding as guest.
    pub identity_wait: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            limits: CartLimits::default(),
            cart_storage_key: "cart".to_owned(),
            wishlist_storage_key: "wishlist".to_owned(),
            identity_wait: Duration::from_millis(DEFAULT_IDENTITY_WAIT_MS),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but not a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = CartLimits::default();

        let limits = CartLimits {
            max_quantity_per_item: parse_limit(
                "FAITHLINE_MAX_QUANTITY_PER_ITEM",
                std::env::var("FAITHLINE_MAX_QUANTITY_PER_ITEM").ok().as_deref(),
                defaults.max_quantity_per_item,
            )?,
            max_total_items: parse_limit(
                "FAITHLINE_MAX_TOTAL_ITEMS",
                std::env::var("FAITHLINE_MAX_TOTAL_ITEMS").ok().as_deref(),
                defaults.max_total_items,
            )?,
            max_unique_products: parse_limit(
                "FAITHLINE_MAX_UNIQUE_PRODUCTS",
                std::env::var("FAITHLINE_MAX_UNIQUE_PRODUCTS").ok().as_deref(),
                defaults.max_unique_products,
            )?,
        };

        let wait_ms = parse_wait(
            "FAITHLINE_IDENTITY_WAIT_MS",
            std::env::var("FAITHLINE_IDENTITY_WAIT_MS").ok().as_deref(),
        )?;

        Ok(Self {
            limits,
            identity_wait: Duration::from_millis(wait_ms),
            ..Self::default()
        })
    }
}

/// Parse an optional limit override, rejecting zero and non-numeric values.
fn parse_limit(
    name: &'static str,
    raw: Option<&str>,
    default: u32,
) -> Result<u32, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };

    let value: u32 = raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        name,
        value: raw.to_owned(),
    })?;

    if value == 0 {
        return Err(ConfigError::Zero { name });
    }

    Ok(value)
}

/// Parse the identity wait budget. Zero is allowed (no wait: always guest
/// unless the gate resolved before `init`).
fn parse_wait(name: &'static str, raw: Option<&str>) -> Result<u64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_IDENTITY_WAIT_MS);
    };

    raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        name,
        value: raw.to_owned(),
    })
}
