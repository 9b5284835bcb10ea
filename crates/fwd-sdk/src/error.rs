//! SDK status codes and error handling.
//!
//! Every vendor SDK call returns an integer status; zero is success and
//! negative values name the failure. This module converts those codes
//! into Rust's `Result` at the call boundary.

use std::fmt;
use thiserror::Error;

/// Raw SDK status codes.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdkStatus {
    Ok = 0,
    Internal = -1,
    Memory = -2,
    BadUnit = -3,
    Param = -4,
    Empty = -5,
    Full = -6,
    NotFound = -7,
    Exists = -8,
    Timeout = -9,
    Busy = -10,
    Fail = -11,
    Disabled = -12,
    BadId = -13,
    Resource = -14,
    Config = -15,
    Unavail = -16,
    Init = -17,
    Port = -18,
}

impl SdkStatus {
    /// Creates a status from a raw return value. Unknown codes collapse
    /// to `Fail`.
    pub fn from_raw(status: i32) -> Self {
        match status {
            0 => SdkStatus::Ok,
            -1 => SdkStatus::Internal,
            -2 => SdkStatus::Memory,
            -3 => SdkStatus::BadUnit,
            -4 => SdkStatus::Param,
            -5 => SdkStatus::Empty,
            -6 => SdkStatus::Full,
            -7 => SdkStatus::NotFound,
            -8 => SdkStatus::Exists,
            -9 => SdkStatus::Timeout,
            -10 => SdkStatus::Busy,
            -12 => SdkStatus::Disabled,
            -13 => SdkStatus::BadId,
            -14 => SdkStatus::Resource,
            -15 => SdkStatus::Config,
            -16 => SdkStatus::Unavail,
            -17 => SdkStatus::Init,
            -18 => SdkStatus::Port,
            _ => SdkStatus::Fail,
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == SdkStatus::Ok
    }

    /// Converts to a `Result` with the given context attached on failure.
    pub fn into_result(self, context: impl Into<String>) -> SdkResult<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(SdkError::Failure {
                status: self,
                context: context.into(),
            })
        }
    }
}

impl fmt::Display for SdkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SdkStatus::Ok => "E_NONE",
            SdkStatus::Internal => "E_INTERNAL",
            SdkStatus::Memory => "E_MEMORY",
            SdkStatus::BadUnit => "E_UNIT",
            SdkStatus::Param => "E_PARAM",
            SdkStatus::Empty => "E_EMPTY",
            SdkStatus::Full => "E_FULL",
            SdkStatus::NotFound => "E_NOT_FOUND",
            SdkStatus::Exists => "E_EXISTS",
            SdkStatus::Timeout => "E_TIMEOUT",
            SdkStatus::Busy => "E_BUSY",
            SdkStatus::Fail => "E_FAIL",
            SdkStatus::Disabled => "E_DISABLED",
            SdkStatus::BadId => "E_BADID",
            SdkStatus::Resource => "E_RESOURCE",
            SdkStatus::Config => "E_CONFIG",
            SdkStatus::Unavail => "E_UNAVAIL",
            SdkStatus::Init => "E_INIT",
            SdkStatus::Port => "E_PORT",
        };
        write!(f, "{}", s)
    }
}

/// Error type for SDK operations.
#[derive(Debug, Clone, Error)]
pub enum SdkError {
    /// The SDK returned a non-zero status.
    #[error("{context}: {status}")]
    Failure { status: SdkStatus, context: String },
}

impl SdkError {
    pub fn failure(status: SdkStatus, context: impl Into<String>) -> Self {
        SdkError::Failure {
            status,
            context: context.into(),
        }
    }

    /// Returns the underlying status code.
    pub fn status(&self) -> SdkStatus {
        match self {
            SdkError::Failure { status, .. } => *status,
        }
    }

    /// Returns true if the failure was a missing-entry status, which
    /// some teardown paths tolerate.
    pub fn is_not_found(&self) -> bool {
        self.status() == SdkStatus::NotFound
    }
}

/// Result type for SDK operations.
pub type SdkResult<T> = Result<T, SdkError>;

/// Extension trait for converting raw SDK return values.
pub trait SdkStatusExt {
    /// Converts a raw status code to a `Result`, attaching context to
    /// the error.
    fn to_result(self, context: impl Into<String>) -> SdkResult<()>;
}

impl SdkStatusExt for i32 {
    fn to_result(self, context: impl Into<String>) -> SdkResult<()> {
        SdkStatus::from_raw(self).into_result(context)
    }
}
