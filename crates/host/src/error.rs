use std::fmt;

use axhost_domain::ActivationLevel;
use thiserror::Error;

pub const S_FALSE: i32 = 1;
pub const E_NOTIMPL: i32 = 0x8000_4001u32 as i32;
pub const E_NOINTERFACE: i32 = 0x8000_4002u32 as i32;
pub const E_FAIL: i32 = 0x8000_4005u32 as i32;
pub const E_UNEXPECTED: i32 = 0x8000_FFFFu32 as i32;
pub const CLASS_E_NOTLICENSED: i32 = 0x8004_0112u32 as i32;
pub const DISP_E_MEMBERNOTFOUND: i32 = 0x8002_0003u32 as i32;

/// Failure reported by a hosted object or one of its sub-interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectError {
    code: i32,
    message: String,
}

impl ObjectError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_implemented() -> Self {
        Self::new(E_NOTIMPL, "not implemented")
    }

    pub fn no_interface() -> Self {
        Self::new(E_NOINTERFACE, "interface not supported")
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(E_FAIL, message)
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_not_licensed(&self) -> bool {
        self.code == CLASS_E_NOTLICENSED
    }
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010X}", self.code as u32)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ObjectError {}

pub type ObjectResult<T> = std::result::Result<T, ObjectError>;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("hosted objects must be created on a single-threaded apartment thread")]
    NotSingleThreadedApartment,

    #[error("no valid license is available to create {class_id}")]
    Licensing {
        class_id: String,
        #[source]
        source: ObjectError,
    },

    #[error("transition from {from} to {expected} ended at {observed}")]
    InvalidTransition {
        from: ActivationLevel,
        expected: ActivationLevel,
        observed: ActivationLevel,
    },

    #[error("the hosted object implements no persistence interface")]
    NoPersistenceInterface,

    #[error("the hosted object did not supply a window handle")]
    NoWindowHandle(#[source] Option<ObjectError>),

    #[error("UI activation requires user mode or an edit-mode override")]
    UiActivationDenied,

    #[error("{operation} failed")]
    Object {
        operation: &'static str,
        #[source]
        source: ObjectError,
    },

    #[error("the host has been closed")]
    Closed,
}

impl HostError {
    pub fn object(operation: &'static str, source: ObjectError) -> Self {
        Self::Object { operation, source }
    }

    /// Fatal errors are contract violations that must not be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. } | Self::NoPersistenceInterface
        )
    }
}

pub type Result<T> = std::result::Result<T, HostError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("persisted state is truncated: needed {needed} more bytes")]
    Truncated { needed: usize },

    #[error("unknown persistence mechanism tag {0}")]
    UnknownMechanism(i32),

    #[error("unsupported persisted state version {0}")]
    UnsupportedVersion(i32),

    #[error("negative length {0} in persisted state")]
    NegativeLength(i32),

    #[error("license string is not valid UTF-16")]
    InvalidLicense,

    #[error("property bag section is malformed: {0}")]
    InvalidPropertyBag(String),

    #[error("persisted state text is not valid base64")]
    InvalidBase64,

    #[error("{0} bytes do not fit a persisted state length field")]
    TooLong(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_error_formats_hresult() {
        let err = ObjectError::new(E_FAIL, "boom");
        assert_eq!(err.to_string(), "0x80004005: boom");
        assert!(!err.is_not_licensed());
        assert!(ObjectError::new(CLASS_E_NOTLICENSED, "").is_not_licensed());
    }

    #[test]
    fn only_contract_violations_are_fatal() {
        let fatal = HostError::InvalidTransition {
            from: ActivationLevel::Running,
            expected: ActivationLevel::InPlace,
            observed: ActivationLevel::Loaded,
        };
        assert!(fatal.is_fatal());
        assert!(HostError::NoPersistenceInterface.is_fatal());
        assert!(!HostError::UiActivationDenied.is_fatal());
    }
}
