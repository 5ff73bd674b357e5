use std::collections::BTreeMap;
use std::sync::Mutex;

use super::*;
use crate::storage::MemoryStore;

fn product(id: ProductId, price: f64) -> Product {
    Product {
        id,
        title: format!("Product {id}"),
        description: String::new(),
        price,
        image: String::new(),
        category: "misc".into(),
        rating: None,
    }
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// =========================================================================
// summarize
// =========================================================================

#[test]
fn two_units_at_forty() {
    let cart = BTreeMap::from([(1, 2)]);
    let summary = summarize(&cart, &[product(1, 40.0)], Pricing::default());
    assert!(approx(summary.subtotal, 80.0));
    assert!(approx(summary.discount, 16.0));
    assert!(approx(summary.delivery_fee, 15.0));
    assert!(approx(summary.total, 79.0));
    assert_eq!(summary.lines.len(), 1);
    assert!(approx(summary.lines[0].line_total, 80.0));
}

#[test]
fn empty_cart_costs_only_delivery() {
    let summary = summarize(&CartItems::new(), &[], Pricing::default());
    assert!(approx(summary.subtotal, 0.0));
    assert!(approx(summary.discount, 0.0));
    assert!(approx(summary.total, 15.0));
}

#[test]
fn unresolved_entries_are_dropped() {
    let cart = BTreeMap::from([(1, 1), (99, 5)]);
    let summary = summarize(&cart, &[product(1, 10.0)], Pricing::default());
    assert_eq!(summary.lines.len(), 1);
    assert_eq!(summary.lines[0].product.id, 1);
    assert!(approx(summary.subtotal, 10.0));
}

#[test]
fn total_is_clamped_at_zero() {
    let pricing = Pricing { delivery_fee: -50.0, discount_percent: 20.0 };
    let cart = BTreeMap::from([(1, 1)]);
    let summary = summarize(&cart, &[product(1, 10.0)], pricing);
    assert!(approx(summary.total, 0.0));
}

#[test]
fn pricing_knobs_apply() {
    let pricing = Pricing { delivery_fee: 0.0, discount_percent: 50.0 };
    let cart = BTreeMap::from([(1, 3)]);
    let summary = summarize(&cart, &[product(1, 10.0)], pricing);
    assert!(approx(summary.discount, 15.0));
    assert!(approx(summary.total, 15.0));
}

// =========================================================================
// SummaryView
// =========================================================================

#[test]
fn view_follows_cart_and_products() {
    let cart = CartStore::load(Arc::new(MemoryStore::new()));
    let view = SummaryView::new(&cart, Pricing::default());
    assert!(approx(view.summary().total, 15.0));

    cart.add_to_cart(1);
    assert!(view.summary().lines.is_empty());

    view.set_products(vec![product(1, 40.0)]);
    cart.add_to_cart(1);
    assert!(approx(view.summary().total, 79.0));

    cart.clear();
    assert!(approx(view.summary().subtotal, 0.0));
}

#[test]
fn view_subscribers_receive_recomputed_totals() {
    let cart = CartStore::load(Arc::new(MemoryStore::new()));
    let view = SummaryView::new(&cart, Pricing::default());
    view.set_products(vec![product(1, 10.0)]);

    let totals = Arc::new(Mutex::new(Vec::new()));
    let sink = totals.clone();
    let _sub = view.subscribe(move |s| sink.lock().unwrap().push(s.subtotal));

    cart.add_to_cart(1);
    let seen = totals.lock().unwrap().clone();
    assert!(approx(seen[0], 0.0));
    assert!(approx(*seen.last().unwrap(), 10.0));
}

#[test]
fn dropping_view_detaches_from_cart() {
    let cart = CartStore::load(Arc::new(MemoryStore::new()));
    let view = SummaryView::new(&cart, Pricing::default());
    drop(view);
    cart.add_to_cart(1);
    assert_eq!(cart.cart_count(), 1);
}
