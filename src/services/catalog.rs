//! Product catalog model and read-only catalog sources.
//!
//! `HttpCatalog` is a thin wrapper over the fakestore-shaped REST API
//! (`/products`, `/products/categories`, `/products/{id}`); body parsing is
//! split into pure functions for testability. `InMemoryCatalog` serves fixed
//! product lists.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::HttpTimeouts;
use crate::error::ErrorCode;

pub type ProductId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub rate: f64,
    pub count: u32,
}

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Request(String),

    #[error("catalog response error: status {status}")]
    Response { status: u16, body: String },

    #[error("catalog response parse failed: {0}")]
    Parse(String),

    #[error("product {0} not found")]
    NotFound(ProductId),

    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ErrorCode for CatalogError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Request(_) => "E_CATALOG_REQUEST",
            Self::Response { .. } => "E_CATALOG_RESPONSE",
            Self::Parse(_) => "E_CATALOG_PARSE",
            Self::NotFound(_) => "E_PRODUCT_NOT_FOUND",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Response { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// SOURCE TRAIT
// =============================================================================

#[async_trait::async_trait]
pub trait CatalogSource: Send + Sync {
    async fn list_products(&self) -> Result<Vec<Product>, CatalogError>;

    async fn list_categories(&self) -> Result<Vec<String>, CatalogError>;

    async fn get_product(&self, id: ProductId) -> Result<Product, CatalogError>;
}

// =============================================================================
// HTTP
// =============================================================================

pub struct HttpCatalog {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCatalog {
    /// # Errors
    ///
    /// Returns [`CatalogError::HttpClientBuild`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeouts: HttpTimeouts) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| CatalogError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn fetch(&self, path: &str) -> Result<(u16, String), CatalogError> {
        let url = self.endpoint(path);
        debug!(%url, "catalog fetch");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CatalogError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| CatalogError::Request(e.to_string()))?;
        Ok((status, text))
    }
}

#[async_trait::async_trait]
impl CatalogSource for HttpCatalog {
    async fn list_products(&self) -> Result<Vec<Product>, CatalogError> {
        let (status, body) = self.fetch("products").await?;
        parse_body(status, &body)
    }

    async fn list_categories(&self) -> Result<Vec<String>, CatalogError> {
        let (status, body) = self.fetch("products/categories").await?;
        parse_body(status, &body)
    }

    async fn get_product(&self, id: ProductId) -> Result<Product, CatalogError> {
        let (status, body) = self.fetch(&format!("products/{id}")).await?;
        if status == 404 {
            return Err(CatalogError::NotFound(id));
        }
        // fakestore answers 200 with an empty body for unknown ids.
        if (200..300).contains(&status) && body.trim().is_empty() {
            return Err(CatalogError::NotFound(id));
        }
        parse_body(status, &body)
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(status: u16, body: &str) -> Result<T, CatalogError> {
    if !(200..300).contains(&status) {
        return Err(CatalogError::Response { status, body: body.to_owned() });
    }
    serde_json::from_str(body).map_err(|e| CatalogError::Parse(e.to_string()))
}

// =============================================================================
// IN-MEMORY
// =============================================================================

/// Catalog backed by a fixed product list. Categories are derived in first
/// appearance order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    products: Vec<Product>,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for product in &self.products {
            if !out.contains(&product.category) {
                out.push(product.category.clone());
            }
        }
        out
    }
}

#[async_trait::async_trait]
impl CatalogSource for InMemoryCatalog {
    async fn list_products(&self) -> Result<Vec<Product>, CatalogError> {
        Ok(self.products.clone())
    }

    async fn list_categories(&self) -> Result<Vec<String>, CatalogError> {
        Ok(self.categories())
    }

    async fn get_product(&self, id: ProductId) -> Result<Product, CatalogError> {
        self.products
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(CatalogError::NotFound(id))
    }
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod tests;
