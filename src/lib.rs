//! Storefront session and commerce-state core.
//!
//! ARCHITECTURE
//! ============
//! Leaves first: `storage` persists opaque JSON records, `reactive` provides
//! the push-based value holders, and `services` builds the credential
//! registry, session manager, cart/favorites store, derived totals, and the
//! catalog filter engine on top of them. `state::Storefront` wires one
//! instance of each into an explicit context object.
//!
//! Presentation (pages, routing, markup) and the remote catalog/auth APIs
//! are external collaborators reached through traits.

pub mod config;
pub mod error;
pub mod reactive;
pub mod services;
pub mod state;
pub mod storage;

pub use config::{AuthMode, StorefrontConfig};
pub use error::ErrorCode;
pub use reactive::{Observable, Subscription};
pub use state::Storefront;
pub use storage::{FileStore, KvStore, MemoryStore};
