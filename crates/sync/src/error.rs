//! Unified error handling for the reconciliation engines.
//!
//! The taxonomy follows the failure paths of the engines:
//!
//! - [`ValidationError`] - rejected before any mutation or persistence; the
//!   display strings double as user-facing notification text.
//! - [`StoreError`] - a single remote call failed; persistence wraps it in
//!   [`SyncError::Persistence`] after rollback/fallback has completed.
//! - Load failures never surface at all: the engines degrade to a local-store
//!   read and log the error.
//!
//! Engines never panic on a storage failure; every path has a defined
//! fallback target before the error is returned to the caller.

use thiserror::Error;

/// A mutation rejected before touching memory or storage.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The input had a nil product ID.
    #[error("item is missing a product id")]
    MissingProductId,

    /// The price is negative or not a finite number.
    #[error("Invalid product price")]
    InvalidPrice,

    /// The requested quantity is zero or above the per-line cap.
    #[error("Quantity must be between 1 and {max}")]
    InvalidQuantity {
        /// Per-line quantity cap.
        max: u32,
    },

    /// Incrementing an existing line would exceed the per-line cap.
    #[error("Cannot add more. Maximum {max} per item")]
    PerItemLimit {
        /// Per-line quantity cap.
        max: u32,
    },

    /// The cart already holds the maximum number of distinct lines.
    #[error("Cart is full. Maximum {max} different items")]
    UniqueItemLimit {
        /// Distinct-line cap.
        max: u32,
    },

    /// The mutation would push the sum of quantities over the cart cap.
    #[error("Cart limit reached. Maximum {max} total items")]
    TotalItemLimit {
        /// Total-quantity cap.
        max: u32,
    },

    /// The catalog has no such product, or the product/variant is inactive.
    #[error("Product not available")]
    ProductUnavailable,

    /// The product or variant cannot be sold out of stock.
    #[error("This item is out of stock")]
    OutOfStock,
}

/// A failure from a single remote collection call.
///
/// Each call is an independent network round trip; there is no cross-call
/// atomicity, which is why the engines carry their own rollback logic.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("store returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated by the client).
        body: String,
    },

    /// The response body did not decode into the expected rows.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The backend reported itself unavailable (also used by test fakes for
    /// injected failures).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A failure writing the guest collection to the local store.
#[derive(Debug, Error)]
pub enum LocalStoreError {
    /// The in-memory collection failed to serialize.
    #[error("failed to encode collection: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Top-level error type returned by the engine public API.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The mutation was rejected before any state change.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Remote persistence failed. `rolled_back` reports whether the remote
    /// collection was restored to its pre-save snapshot; when `false` the
    /// in-memory state was written to the local store as an emergency cache.
    #[error("failed to persist collection (rolled back: {rolled_back}): {source}")]
    Persistence {
        /// The first remote call that failed.
        source: StoreError,
        /// Whether the pre-save remote snapshot was restored.
        rolled_back: bool,
    },

    /// A remote fetch failed during init or merge. Engines degrade to a
    /// local-store read instead of surfacing this; it appears in logs and
    /// in the merge fallback path only.
    #[error("failed to load collection: {0}")]
    Load(#[from] StoreError),

    /// The guest collection could not be written to the local store.
    #[error(transparent)]
    Local(#[from] LocalStoreError),

    /// A positional index was outside the current collection.
    #[error("index {index} out of range for collection of {len} items")]
    OutOfRange {
        /// Requested index.
        index: usize,
        /// Collection length at the time of the call.
        len: usize,
    },
}

/// Result type alias for [`SyncError`].
pub type Result<T> = std::result::Result<T, SyncError>;
