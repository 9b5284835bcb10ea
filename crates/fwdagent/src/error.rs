//! Error types for the forwarding object manager.

use fwd_sdk::SdkError;
use fwd_types::{InterfaceId, IpAddress, VrfId};
use thiserror::Error;

/// Recoverable errors surfaced to the state-delta applier.
///
/// SDK failures and missing lookups abort the current operation after
/// rollback; the applier logs them and moves to the next entity.
/// Invariant violations are not represented here: they indicate
/// corruption and go through [`fatal!`](crate::fatal) instead.
#[derive(Debug, Error)]
pub enum L3Error {
    #[error(transparent)]
    Sdk(#[from] SdkError),

    #[error("no route for {prefix}/{len} in vrf {vrf}")]
    RouteNotFound {
        vrf: VrfId,
        prefix: IpAddress,
        len: u8,
    },

    #[error("no host for {ip} in vrf {vrf}")]
    HostNotFound { vrf: VrfId, ip: IpAddress },

    #[error("interface {0} not in interface table")]
    IntfNotFound(InterfaceId),
}

/// Result alias for agent operations.
pub type L3Result<T> = Result<T, L3Error>;

/// Logs at error level and aborts.
///
/// Used for invariant violations: warm-boot host drift, refcount
/// operations on unknown ids, double insertion. These mean the
/// in-memory model and the hardware no longer agree and continuing
/// would corrupt forwarding state.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
        panic!($($arg)*);
    }};
}
