//! State-delta application.

#[allow(clippy::module_inception)]
mod applier;

pub use applier::{ApplierOptions, ApplierStats, DeltaApplier};
