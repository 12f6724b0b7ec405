//! Catalog and account stores for the OCS rating engine
//!
//! Two implementations of `ocs_core::traits::CatalogStore`:
//!
//! - `InMemoryStore` - `parking_lot` guarded maps for embedding and tests
//! - `RedisStore` - JSON documents in Redis through a connection manager
//!
//! # Example
//!
//! ```
//! use ocs_core::models::Destination;
//! use ocs_store::InMemoryStore;
//!
//! let store = InMemoryStore::new();
//! store.set_destination(Destination::new("GERMANY", &["49"]));
//! ```

pub mod keys;
pub mod memory;
pub mod redis_store;

pub use memory::InMemoryStore;
pub use redis_store::RedisStore;
