//! Tenant webhook notifications

pub mod client;
pub mod types;

pub use client::{NotifyError, Notifier};
pub use types::{NotifyRequest, NotifyResponse, NotifyTransaction};
