//! Tenant registry
//!
//! Maps a business uid to its balance table namespace and webhook URLs.

pub mod memory;
pub mod models;
pub mod repository;

pub use memory::MemoryBusinessStore;
pub use models::{Business, NotifyKind};
pub use repository::{BusinessError, BusinessStore, PgBusinessStore};
