//! Warm-boot reconciliation cache.

mod cache;

pub use cache::WarmBootCache;
