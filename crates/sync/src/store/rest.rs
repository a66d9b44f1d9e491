//! REST implementations of the remote collections.
//!
//! The backing service exposes its relational store over a PostgREST-style
//! API: one resource path per collection, filters in the query string
//! (`user_id=eq.<uuid>`, `id=in.(a,b)`), `Prefer: return=minimal` on writes.
//! Each method is a single HTTP round trip; there is no multi-statement
//! transaction, which is exactly the contract the engines are built around.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};
use url::Url;

use faithline_core::{RowId, UserId};

use crate::error::StoreError;

use super::{CartRow, CartStore, NewCartRow, NewWishlistRow, WishlistRow, WishlistStore};

/// Cap on response-body bytes echoed into error messages.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Connection settings for the REST data store.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Service base URL (e.g. `https://project.example.co`).
    pub base_url: Url,
    /// API key, sent as both `apikey` and bearer token.
    pub api_key: SecretString,
}

/// Shared HTTP client for the REST data store.
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<RestClientInner>,
}

struct RestClientInner {
    http: reqwest::Client,
    base_url: Url,
    api_key: SecretString,
}

impl RestClient {
    /// Create a client from connection settings.
    #[must_use]
    pub fn new(config: RestConfig) -> Self {
        Self {
            inner: Arc::new(RestClientInner {
                http: reqwest::Client::new(),
                base_url: config.base_url,
                api_key: config.api_key,
            }),
        }
    }

    fn headers(&self) -> Result<HeaderMap, StoreError> {
        let key = self.inner.api_key.expose_secret();
        let mut headers = HeaderMap::new();
        let mut api_key = HeaderValue::from_str(key)
            .map_err(|_| StoreError::Unavailable("API key is not a valid header".to_owned()))?;
        api_key.set_sensitive(true);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|_| StoreError::Unavailable("API key is not a valid header".to_owned()))?;
        bearer.set_sensitive(true);
        headers.insert("apikey", api_key);
        headers.insert(reqwest::header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    fn endpoint(&self, collection: &str, query: &[(&str, String)]) -> Result<Url, StoreError> {
        let mut url = self
            .inner
            .base_url
            .join(&format!("rest/v1/{collection}"))
            .map_err(|e| StoreError::Unavailable(format!("bad collection URL: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let mut body = response.text().await.unwrap_or_default();
        body.truncate(MAX_ERROR_BODY_CHARS);
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// `GET /rest/v1/{collection}?{query}` decoded as a row array.
    pub(crate) async fn select<T: DeserializeOwned>(
        &self,
        collection: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, StoreError> {
        let url = self.endpoint(collection, query)?;
        debug!(collection, "select");
        let response = self
            .inner
            .http
            .get(url)
            .headers(self.headers()?)
            .send()
            .await?;
        let body = Self::check(response).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// `POST /rest/v1/{collection}` with a row array body.
    async fn insert<T: Serialize + Sync>(
        &self,
        collection: &str,
        rows: &[T],
    ) -> Result<(), StoreError> {
        let url = self.endpoint(collection, &[])?;
        debug!(collection, count = rows.len(), "insert");
        let response = self
            .inner
            .http
            .post(url)
            .headers(self.headers()?)
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await?;
        Self::check(response).await.map(drop)
    }

    /// `PATCH /rest/v1/{collection}?{query}` with a partial-row body.
    async fn update(
        &self,
        collection: &str,
        query: &[(&str, String)],
        body: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let url = self.endpoint(collection, query)?;
        debug!(collection, "update");
        let response = self
            .inner
            .http
            .patch(url)
            .headers(self.headers()?)
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;
        Self::check(response).await.map(drop)
    }

    /// `DELETE /rest/v1/{collection}?{query}`.
    async fn delete(&self, collection: &str, query: &[(&str, String)]) -> Result<(), StoreError> {
        let url = self.endpoint(collection, query)?;
        debug!(collection, "delete");
        let response = self
            .inner
            .http
            .delete(url)
            .headers(self.headers()?)
            .send()
            .await?;
        Self::check(response).await.map(drop)
    }
}

/// `id=in.(a,b,c)` filter value for a set of row IDs.
fn in_filter(ids: &[RowId]) -> String {
    let joined = ids
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("in.({joined})")
}

/// `eq.<value>` filter value.
fn eq_filter(value: impl ToString) -> String {
    format!("eq.{}", value.to_string())
}

/// REST-backed `cart_items` collection.
#[derive(Clone)]
pub struct RestCartStore {
    client: RestClient,
}

impl RestCartStore {
    /// Wrap a shared client.
    #[must_use]
    pub const fn new(client: RestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CartStore for RestCartStore {
    #[instrument(skip(self))]
    async fn list(&self, user_id: UserId) -> Result<Vec<CartRow>, StoreError> {
        self.client
            .select(
                "cart_items",
                &[
                    ("user_id", eq_filter(user_id)),
                    ("select", "*".to_owned()),
                ],
            )
            .await
    }

    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn insert(&self, rows: Vec<NewCartRow>) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.client.insert("cart_items", &rows).await
    }

    #[instrument(skip(self))]
    async fn update_quantity(&self, id: RowId, quantity: u32) -> Result<(), StoreError> {
        self.client
            .update(
                "cart_items",
                &[("id", eq_filter(id))],
                &json!({ "quantity": quantity }),
            )
            .await
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn delete(&self, ids: Vec<RowId>) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.client
            .delete("cart_items", &[("id", in_filter(&ids))])
            .await
    }

    #[instrument(skip(self))]
    async fn delete_all(&self, user_id: UserId) -> Result<(), StoreError> {
        self.client
            .delete("cart_items", &[("user_id", eq_filter(user_id))])
            .await
    }
}

/// REST-backed `wishlist_items` collection.
#[derive(Clone)]
pub struct RestWishlistStore {
    client: RestClient,
}

impl RestWishlistStore {
    /// Wrap a shared client.
    #[must_use]
    pub const fn new(client: RestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WishlistStore for RestWishlistStore {
    #[instrument(skip(self))]
    async fn list(&self, user_id: UserId) -> Result<Vec<WishlistRow>, StoreError> {
        self.client
            .select(
                "wishlist_items",
                &[
                    ("user_id", eq_filter(user_id)),
                    ("select", "*".to_owned()),
                ],
            )
            .await
    }

    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn insert(&self, rows: Vec<NewWishlistRow>) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.client.insert("wishlist_items", &rows).await
    }

    #[instrument(skip(self))]
    async fn delete_all(&self, user_id: UserId) -> Result<(), StoreError> {
        self.client
            .delete("wishlist_items", &[("user_id", eq_filter(user_id))])
            .await
    }
}
