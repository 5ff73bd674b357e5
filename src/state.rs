//! Per-process storefront context.
//!
//! DESIGN
//! ======
//! `Storefront` owns one key-value store, one session manager and one cart
//! store, and is passed explicitly to whatever drives them. There are no
//! process-wide globals; tests build one instance each.
//!
//! Derived views (`FilterEngine`, `SummaryView`) are created on demand and
//! stay subscribed to the cart store until dropped.

use std::sync::Arc;

use tracing::info;

use crate::config::{AuthMode, StorefrontConfig};
use crate::services::cart::CartStore;
use crate::services::catalog::{CatalogError, HttpCatalog};
use crate::services::filter::FilterEngine;
use crate::services::remote_auth::{HttpRemoteAuth, RemoteAuthError};
use crate::services::session::{AuthBackend, SessionManager, SessionSettings};
use crate::services::summary::SummaryView;
use crate::storage::{FileStore, KvStore};

pub struct Storefront {
    config: StorefrontConfig,
    store: Arc<dyn KvStore>,
    session: SessionManager,
    cart: CartStore,
}

impl Storefront {
    /// Wire a context over `store`, restoring persisted session and cart state.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, config: StorefrontConfig, backend: AuthBackend) -> Self {
        let session = SessionManager::new(Arc::clone(&store), SessionSettings::from(&config), backend);
        let cart = CartStore::load(Arc::clone(&store));
        Self { config, store, session, cart }
    }

    /// Open a file-backed context under `config.data_dir`, using the HTTP
    /// auth endpoint when `config.auth_mode` is remote.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteAuthError::Transport`] if the remote auth client cannot
    /// be built.
    pub fn open(config: StorefrontConfig) -> Result<Self, RemoteAuthError> {
        let backend = match config.auth_mode {
            AuthMode::Local => AuthBackend::Local,
            AuthMode::Remote => {
                AuthBackend::Remote(Arc::new(HttpRemoteAuth::new(&config.api_base_url, config.timeouts)?))
            }
        };
        let store: Arc<dyn KvStore> = Arc::new(FileStore::new(config.data_dir.clone()));
        info!(data_dir = %config.data_dir.display(), auth_mode = ?config.auth_mode, "storefront opened");
        Ok(Self::new(store, config, backend))
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    #[must_use]
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    #[must_use]
    pub fn cart(&self) -> &CartStore {
        &self.cart
    }

    /// End the session and clear cart, favorites and search so nothing
    /// carries over to the next identity on this device.
    pub fn logout(&self) {
        self.session.logout();
        self.cart.clear();
    }

    /// Filter engine following this context's search term.
    #[must_use]
    pub fn filter_engine(&self) -> FilterEngine {
        FilterEngine::new(&self.cart)
    }

    /// Totals view priced with the configured fee and discount.
    #[must_use]
    pub fn summary_view(&self) -> SummaryView {
        SummaryView::new(&self.cart, self.config.pricing)
    }

    /// HTTP catalog at the configured API base URL.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::HttpClientBuild`] if the client cannot be built.
    pub fn http_catalog(&self) -> Result<HttpCatalog, CatalogError> {
        HttpCatalog::new(&self.config.api_base_url, self.config.timeouts)
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
#[path = "state_helpers_test.rs"]
pub mod test_helpers;

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
