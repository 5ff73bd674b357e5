//! Storefront services.
//!
//! ARCHITECTURE
//! ============
//! `validation` and `token` are pure helpers. `registry` and `session` own
//! the identity side, `cart` and `summary` the commerce side, and
//! `catalog`/`filter` the product listing. `remote_auth` and `catalog` hold
//! the traits for the remote collaborators.

pub mod cart;
pub mod catalog;
pub mod filter;
pub mod registry;
pub mod remote_auth;
pub mod session;
pub mod summary;
pub mod token;
pub mod validation;
