//! Catalog filter engine.
//!
//! DESIGN
//! ======
//! [`FilterCriteria::matches`] is the pure predicate: a product passes when
//! its category is selected (or none are), the trimmed lower-cased search
//! term appears in its title or description (or the term is empty), and its
//! price falls in the chosen bucket (or none is chosen).
//!
//! [`FilterEngine`] holds the four inputs as observables and republishes the
//! filtered list whenever any of them changes. The search term is owned by
//! the [`CartStore`] and mirrored here, so `reset_filters` leaves it alone.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cart::CartStore;
use super::catalog::{CatalogError, CatalogSource, Product};
use crate::reactive::{Observable, Subscription};

// =============================================================================
// PRICE BUCKETS
// =============================================================================

/// Non-overlapping price ranges. `50.00` and `150.00` both fall in
/// [`PriceBucket::Between50And150`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceBucket {
    /// `price < 50`
    #[serde(rename = "under-50")]
    Under50,
    /// `50 <= price <= 150`
    #[serde(rename = "50-150")]
    Between50And150,
    /// `150 < price <= 300`
    #[serde(rename = "150-300")]
    Between150And300,
}

impl PriceBucket {
    pub const ALL: [Self; 3] = [Self::Under50, Self::Between50And150, Self::Between150And300];

    #[must_use]
    pub fn contains(self, price: f64) -> bool {
        match self {
            Self::Under50 => price < 50.0,
            Self::Between50And150 => (50.0..=150.0).contains(&price),
            Self::Between150And300 => price > 150.0 && price <= 300.0,
        }
    }

    /// The bucket holding `price`, or `None` above 300 (and for NaN).
    #[must_use]
    pub fn for_price(price: f64) -> Option<Self> {
        Self::ALL.into_iter().find(|bucket| bucket.contains(price))
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Under50 => "under-50",
            Self::Between50And150 => "50-150",
            Self::Between150And300 => "150-300",
        }
    }
}

impl std::fmt::Display for PriceBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown price bucket '{0}' (expected under-50, 50-150 or 150-300)")]
pub struct PriceBucketParseError(pub String);

impl FromStr for PriceBucket {
    type Err = PriceBucketParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|bucket| bucket.as_str() == s.trim())
            .ok_or_else(|| PriceBucketParseError(s.to_owned()))
    }
}

// =============================================================================
// CRITERIA
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub selected_categories: BTreeSet<String>,
    /// Raw term; normalized when matching.
    pub search_term: String,
    pub price_bucket: Option<PriceBucket>,
}

impl FilterCriteria {
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        let term = self.search_term.trim().to_lowercase();
        self.matches_normalized(product, &term)
    }

    fn matches_normalized(&self, product: &Product, term: &str) -> bool {
        let category_ok =
            self.selected_categories.is_empty() || self.selected_categories.contains(&product.category);
        let search_ok = term.is_empty()
            || product.title.to_lowercase().contains(term)
            || product.description.to_lowercase().contains(term);
        let price_ok = self.price_bucket.is_none_or(|bucket| bucket.contains(product.price));
        category_ok && search_ok && price_ok
    }

    /// Products passing every predicate, in input order.
    #[must_use]
    pub fn apply(&self, products: &[Product]) -> Vec<Product> {
        let term = self.search_term.trim().to_lowercase();
        products
            .iter()
            .filter(|p| self.matches_normalized(p, &term))
            .cloned()
            .collect()
    }
}

// =============================================================================
// ENGINE
// =============================================================================

pub struct FilterEngine {
    products: Observable<Vec<Product>>,
    categories: Observable<Vec<String>>,
    selected: Observable<BTreeSet<String>>,
    search: Observable<String>,
    bucket: Observable<Option<PriceBucket>>,
    filtered: Observable<Vec<Product>>,
    _subscriptions: Vec<Subscription>,
}

impl FilterEngine {
    /// Engine over an empty product list, following `cart`'s search term.
    #[must_use]
    pub fn new(cart: &CartStore) -> Self {
        let products: Observable<Vec<Product>> = Observable::default();
        let selected: Observable<BTreeSet<String>> = Observable::default();
        let search = Observable::new(cart.search_term());
        let bucket: Observable<Option<PriceBucket>> = Observable::default();
        let filtered: Observable<Vec<Product>> = Observable::default();

        let recompute: Arc<dyn Fn() + Send + Sync> = {
            let (products, selected, search, bucket, filtered) =
                (products.clone(), selected.clone(), search.clone(), bucket.clone(), filtered.clone());
            Arc::new(move || {
                let criteria = FilterCriteria {
                    selected_categories: selected.get(),
                    search_term: search.get(),
                    price_bucket: bucket.get(),
                };
                let next = products.with(|list| criteria.apply(list));
                debug!(shown = next.len(), "catalog filter recomputed");
                filtered.set(next);
            })
        };

        let subscriptions = vec![
            subscribe_recompute(&products, &recompute),
            subscribe_recompute(&selected, &recompute),
            subscribe_recompute(&search, &recompute),
            subscribe_recompute(&bucket, &recompute),
            {
                let search = search.clone();
                cart.subscribe_search(move |term| search.set(term.clone()))
            },
        ];

        Self {
            products,
            categories: Observable::default(),
            selected,
            search,
            bucket,
            filtered,
            _subscriptions: subscriptions,
        }
    }

    /// Load products and categories from `source`. Nothing changes on error.
    ///
    /// # Errors
    ///
    /// Returns the source's [`CatalogError`] unchanged.
    pub async fn refresh(&self, source: &dyn CatalogSource) -> Result<(), CatalogError> {
        let products = source.list_products().await?;
        let categories = source.list_categories().await?;
        self.categories.set(categories);
        self.products.set(products);
        Ok(())
    }

    pub fn set_products(&self, products: Vec<Product>) {
        self.products.set(products);
    }

    #[must_use]
    pub fn products(&self) -> Vec<Product> {
        self.products.get()
    }

    pub fn set_categories(&self, categories: Vec<String>) {
        self.categories.set(categories);
    }

    /// Categories offered by the catalog.
    #[must_use]
    pub fn available_categories(&self) -> Vec<String> {
        self.categories.get()
    }

    /// Select `category`, or deselect it if already selected.
    pub fn toggle_category(&self, category: &str) {
        self.selected.update(|selected| {
            if !selected.remove(category) {
                selected.insert(category.to_owned());
            }
        });
    }

    #[must_use]
    pub fn is_category_selected(&self, category: &str) -> bool {
        self.selected.with(|selected| selected.contains(category))
    }

    pub fn set_price_bucket(&self, bucket: Option<PriceBucket>) {
        self.bucket.set(bucket);
    }

    #[must_use]
    pub fn price_bucket(&self) -> Option<PriceBucket> {
        self.bucket.get()
    }

    /// Clear selected categories and the price bucket. The search term stays.
    pub fn reset_filters(&self) {
        self.selected.set(BTreeSet::new());
        self.bucket.set(None);
    }

    #[must_use]
    pub fn criteria(&self) -> FilterCriteria {
        FilterCriteria {
            selected_categories: self.selected.get(),
            search_term: self.search.get(),
            price_bucket: self.bucket.get(),
        }
    }

    #[must_use]
    pub fn filtered(&self) -> Vec<Product> {
        self.filtered.get()
    }

    pub fn subscribe(&self, callback: impl Fn(&Vec<Product>) + Send + Sync + 'static) -> Subscription {
        self.filtered.subscribe(callback)
    }
}

fn subscribe_recompute<T: Clone + Send + 'static>(
    input: &Observable<T>,
    recompute: &Arc<dyn Fn() + Send + Sync>,
) -> Subscription {
    let recompute = Arc::clone(recompute);
    input.subscribe(move |_| recompute())
}

#[cfg(test)]
#[path = "filter_test.rs"]
mod tests;
