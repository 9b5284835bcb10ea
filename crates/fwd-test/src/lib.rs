//! Shared test fixtures for the forwarding agent.
//!
//! [`FakeSdk`] implements [`SwitchSdk`] over an in-memory model of the
//! ASIC's L3 tables. Tests use it to assert hardware-state invariants
//! (which entries exist, which calls were issued, what an ECMP group's
//! membership is) and to inject failures at chosen call sites.

mod fake_sdk;

pub use fake_sdk::FakeSdk;
