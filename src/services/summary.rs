//! Derived cart totals.
//!
//! Totals are never stored. [`summarize`] computes them from a cart snapshot
//! and a product list; [`SummaryView`] keeps a published summary current as
//! either input changes.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::cart::{CartItems, CartStore};
use super::catalog::{Product, ProductId};
use crate::config::Pricing;
use crate::reactive::{Observable, Subscription};

/// One resolved cart line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryLine {
    pub product: Product,
    pub quantity: u32,
    pub line_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartSummary {
    pub lines: Vec<SummaryLine>,
    pub subtotal: f64,
    pub discount: f64,
    pub delivery_fee: f64,
    pub total: f64,
}

/// Totals for `cart` priced against `products`.
///
/// Cart entries whose product is not in `products` are left out of the lines
/// and the subtotal. The delivery fee always applies; the total is clamped at
/// zero.
#[must_use]
pub fn summarize(cart: &CartItems, products: &[Product], pricing: Pricing) -> CartSummary {
    let by_id: HashMap<ProductId, &Product> = products.iter().map(|p| (p.id, p)).collect();

    let lines: Vec<SummaryLine> = cart
        .iter()
        .filter_map(|(id, qty)| {
            let product = by_id.get(id)?;
            Some(SummaryLine {
                product: (*product).clone(),
                quantity: *qty,
                line_total: product.price * f64::from(*qty),
            })
        })
        .collect();

    let subtotal: f64 = lines.iter().map(|line| line.line_total).sum();
    let discount = if subtotal > 0.0 { subtotal * pricing.discount_percent / 100.0 } else { 0.0 };
    let total = (subtotal - discount + pricing.delivery_fee).max(0.0);

    CartSummary { lines, subtotal, discount, delivery_fee: pricing.delivery_fee, total }
}

// =============================================================================
// REACTIVE VIEW
// =============================================================================

/// Summary that follows a [`CartStore`] and a product list.
pub struct SummaryView {
    products: Observable<Vec<Product>>,
    summary: Observable<CartSummary>,
    _subscriptions: Vec<Subscription>,
}

impl SummaryView {
    #[must_use]
    pub fn new(cart: &CartStore, pricing: Pricing) -> Self {
        let items: Observable<CartItems> = Observable::new(cart.cart_items());
        let products: Observable<Vec<Product>> = Observable::default();
        let summary = Observable::new(summarize(&items.get(), &[], pricing));

        let recompute: Arc<dyn Fn() + Send + Sync> = {
            let (items, products, summary) = (items.clone(), products.clone(), summary.clone());
            Arc::new(move || {
                let next = products.with(|list| items.with(|cart| summarize(cart, list, pricing)));
                summary.set(next);
            })
        };

        let on_items = Arc::clone(&recompute);
        let on_products = recompute;
        let subscriptions = vec![
            items.subscribe(move |_| on_items()),
            products.subscribe(move |_| on_products()),
            cart.subscribe_cart(move |cart| items.set(cart.clone())),
        ];

        Self { products, summary, _subscriptions: subscriptions }
    }

    /// Replace the product list used to resolve cart entries.
    pub fn set_products(&self, products: Vec<Product>) {
        self.products.set(products);
    }

    #[must_use]
    pub fn summary(&self) -> CartSummary {
        self.summary.get()
    }

    pub fn subscribe(&self, callback: impl Fn(&CartSummary) + Send + Sync + 'static) -> Subscription {
        self.summary.subscribe(callback)
    }
}

#[cfg(test)]
#[path = "summary_test.rs"]
mod tests;
