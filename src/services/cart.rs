//! Cart, favorites, and search term state.
//!
//! DESIGN
//! ======
//! Three independent observables, each mirrored to its own persisted record.
//! Mutations rewrite the whole record while the value lock is held and
//! publish afterwards, so the persisted copy never lags the published one.
//!
//! ERROR HANDLING
//! ==============
//! Writes are best-effort: a failed write is logged and the in-memory value
//! still changes. The next successful write rewrites the full record.
//! Corrupt records load as empty. Loaded carts drop non-positive quantities.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info};

use super::catalog::ProductId;
use crate::reactive::{Observable, Subscription};
use crate::storage::{CART_KEY, FAVORITES_KEY, KvStore, SEARCH_KEY, load_json, save_json};

/// Product id -> quantity. Every stored quantity is at least 1.
pub type CartItems = BTreeMap<ProductId, u32>;

pub type Favorites = BTreeSet<ProductId>;

pub struct CartStore {
    store: Arc<dyn KvStore>,
    cart: Observable<CartItems>,
    favorites: Observable<Favorites>,
    search: Observable<String>,
}

impl CartStore {
    /// Load cart, favorites, and search term from `store`.
    #[must_use]
    pub fn load(store: Arc<dyn KvStore>) -> Self {
        let cart: CartItems = load_json::<CartItems>(store.as_ref(), CART_KEY)
            .unwrap_or_default()
            .into_iter()
            .filter(|(_, qty)| *qty > 0)
            .collect();
        let favorites: Favorites = load_json(store.as_ref(), FAVORITES_KEY).unwrap_or_default();
        let search: String = load_json(store.as_ref(), SEARCH_KEY).unwrap_or_default();
        debug!(cart_lines = cart.len(), favorites = favorites.len(), "cart store loaded");

        Self {
            store,
            cart: Observable::new(cart),
            favorites: Observable::new(favorites),
            search: Observable::new(search),
        }
    }

    fn persist<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = save_json(self.store.as_ref(), key, value) {
            error!(%key, error = %e, "failed to persist store record");
        }
    }

    // =========================================================================
    // CART
    // =========================================================================

    /// Add one unit of `id`, starting from 1 when absent.
    pub fn add_to_cart(&self, id: ProductId) {
        self.cart.update(|items| {
            let qty = items.entry(id).or_insert(0);
            *qty = qty.saturating_add(1);
            debug!(product_id = id, qty = *qty, "cart item added");
            self.persist(CART_KEY, items);
        });
    }

    /// Remove one unit of `id`, dropping the line when it reaches zero.
    /// No-op when `id` is not in the cart.
    pub fn decrement_cart_item(&self, id: ProductId) {
        if !self.is_in_cart(id) {
            return;
        }
        self.cart.update(|items| {
            match items.get_mut(&id) {
                Some(qty) if *qty > 1 => {
                    *qty -= 1;
                    debug!(product_id = id, qty = *qty, "cart item decremented");
                }
                _ => {
                    items.remove(&id);
                    debug!(product_id = id, "cart line removed");
                }
            }
            self.persist(CART_KEY, items);
        });
    }

    /// Drop the whole line for `id`. No-op when absent.
    pub fn remove_cart_item(&self, id: ProductId) {
        if !self.is_in_cart(id) {
            return;
        }
        self.cart.update(|items| {
            items.remove(&id);
            debug!(product_id = id, "cart line removed");
            self.persist(CART_KEY, items);
        });
    }

    /// Remove the line if present, otherwise add one unit.
    pub fn toggle_cart_item(&self, id: ProductId) {
        if self.is_in_cart(id) {
            self.remove_cart_item(id);
        } else {
            self.add_to_cart(id);
        }
    }

    #[must_use]
    pub fn is_in_cart(&self, id: ProductId) -> bool {
        self.cart.with(|items| items.contains_key(&id))
    }

    /// Quantity of `id`, zero when absent.
    #[must_use]
    pub fn quantity(&self, id: ProductId) -> u32 {
        self.cart.with(|items| items.get(&id).copied().unwrap_or(0))
    }

    /// Sum of all quantities.
    #[must_use]
    pub fn cart_count(&self) -> u64 {
        self.cart.with(|items| items.values().map(|qty| u64::from(*qty)).sum())
    }

    #[must_use]
    pub fn cart_items(&self) -> CartItems {
        self.cart.get()
    }

    pub fn subscribe_cart(&self, callback: impl Fn(&CartItems) + Send + Sync + 'static) -> Subscription {
        self.cart.subscribe(callback)
    }

    // =========================================================================
    // FAVORITES
    // =========================================================================

    /// Flip membership of `id`. Returns whether it is now a favorite.
    pub fn toggle_favorite(&self, id: ProductId) -> bool {
        self.favorites.update(|favorites| {
            let now_favorite = if favorites.remove(&id) {
                false
            } else {
                favorites.insert(id);
                true
            };
            debug!(product_id = id, favorite = now_favorite, "favorite toggled");
            self.persist(FAVORITES_KEY, favorites);
            now_favorite
        })
    }

    #[must_use]
    pub fn is_favorite(&self, id: ProductId) -> bool {
        self.favorites.with(|favorites| favorites.contains(&id))
    }

    #[must_use]
    pub fn favorites_count(&self) -> usize {
        self.favorites.with(BTreeSet::len)
    }

    #[must_use]
    pub fn favorites(&self) -> Favorites {
        self.favorites.get()
    }

    pub fn subscribe_favorites(&self, callback: impl Fn(&Favorites) + Send + Sync + 'static) -> Subscription {
        self.favorites.subscribe(callback)
    }

    // =========================================================================
    // SEARCH
    // =========================================================================

    /// Store `term` as given and publish it, even when unchanged.
    /// Consumers trim and case-fold.
    pub fn set_search_term(&self, term: &str) {
        self.search.update(|current| {
            term.clone_into(current);
            debug!(term = %current, "search term set");
            self.persist(SEARCH_KEY, current);
        });
    }

    #[must_use]
    pub fn search_term(&self) -> String {
        self.search.get()
    }

    pub fn subscribe_search(&self, callback: impl Fn(&String) + Send + Sync + 'static) -> Subscription {
        self.search.subscribe(callback)
    }

    // =========================================================================
    // RESET
    // =========================================================================

    /// Empty cart, favorites, and search, and erase their records.
    pub fn clear(&self) {
        for key in [CART_KEY, FAVORITES_KEY, SEARCH_KEY] {
            if let Err(e) = self.store.remove(key) {
                error!(%key, error = %e, "failed to erase store record");
            }
        }
        self.cart.set(CartItems::new());
        self.favorites.set(Favorites::new());
        self.search.set(String::new());
        info!("cart, favorites and search cleared");
    }
}

#[cfg(test)]
#[path = "cart_test.rs"]
mod tests;
