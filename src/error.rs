//! Error handling for iio-core
//!
//! This module defines the error taxonomy shared by every layer of the crate
//! and a Result alias. Errors carry an errno-style code so they can travel
//! through the attribute batch wire format, where a failed item is encoded as
//! a negative header.

use thiserror::Error;

/// No such entity
pub const ENOENT: i32 = 2;
/// Transfer failed at the transport
pub const EIO: i32 = 5;
/// Resource busy
pub const EBUSY: i32 = 16;
/// Invalid argument
pub const EINVAL: i32 = 22;
/// Capability not implemented by the backend
pub const ENOSYS: i32 = 38;
/// Deadline exceeded
pub const ETIMEDOUT: i32 = 110;

/// Main error type for iio-core operations
#[derive(Error, Debug)]
pub enum IioError {
    /// Unknown device, channel or attribute
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request (bad format descriptor, non-trigger target, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend lacks the requested capability
    #[error("Operation not supported: {0}")]
    Unsupported(String),

    /// Attribute or buffer transfer failed at the transport
    #[error("I/O failure: {0}")]
    Io(String),

    /// Operation exceeded the context deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A typed attribute read could not parse the textual value
    #[error("Type mismatch: attribute '{attr}' value {value:?} is not a valid {expected}")]
    TypeMismatch {
        attr: String,
        value: String,
        expected: &'static str,
    },

    /// Error code reported by a backend that has no dedicated variant
    #[error("Backend error (code {code}): {message}")]
    Backend { code: i32, message: String },

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    StdIo(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<IioError>,
    },
}

impl IioError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        IioError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Positive errno code describing this error
    pub fn errno(&self) -> i32 {
        match self {
            IioError::NotFound(_) => ENOENT,
            IioError::InvalidArgument(_) | IioError::TypeMismatch { .. } => EINVAL,
            IioError::Unsupported(_) => ENOSYS,
            IioError::Io(_) | IioError::Config(_) => EIO,
            IioError::Timeout(_) => ETIMEDOUT,
            IioError::Backend { code, .. } => *code,
            IioError::StdIo(e) => e.raw_os_error().unwrap_or(EIO),
            IioError::WithContext { source, .. } => source.errno(),
        }
    }

    /// Build an error from an errno code, accepting either sign
    pub fn from_errno(code: i32) -> Self {
        let code = code.saturating_abs();
        match code {
            ENOENT => IioError::NotFound(format!("errno {}", code)),
            EINVAL => IioError::InvalidArgument(format!("errno {}", code)),
            ENOSYS => IioError::Unsupported(format!("errno {}", code)),
            EIO => IioError::Io(format!("errno {}", code)),
            ETIMEDOUT => IioError::Timeout(format!("errno {}", code)),
            _ => IioError::Backend {
                code,
                message: format!("errno {}", code),
            },
        }
    }

    /// Check if this is a "not found" type error
    pub fn is_not_found(&self) -> bool {
        match self {
            IioError::NotFound(_) => true,
            IioError::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is a timeout
    pub fn is_timeout(&self) -> bool {
        match self {
            IioError::Timeout(_) => true,
            IioError::WithContext { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

/// Result type alias for iio-core operations
pub type Result<T> = std::result::Result<T, IioError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IioError::NotFound("device 'adc0'".to_string());
        assert_eq!(err.to_string(), "Not found: device 'adc0'");
    }

    #[test]
    fn test_error_with_context() {
        let err = IioError::Io("short read".to_string());
        let with_ctx = err.with_context("Failed to refill");
        assert!(with_ctx.to_string().contains("Failed to refill"));
        assert_eq!(with_ctx.errno(), EIO);
    }

    #[test]
    fn test_errno_mapping_both_ways() {
        for code in [ENOENT, EIO, EINVAL, ENOSYS, ETIMEDOUT, 16] {
            assert_eq!(IioError::from_errno(code).errno(), code);
            assert_eq!(IioError::from_errno(-code).errno(), code);
        }
        assert!(IioError::from_errno(-2).is_not_found());
        assert!(IioError::from_errno(110).is_timeout());
    }

    #[test]
    fn test_type_mismatch_message() {
        let err = IioError::TypeMismatch {
            attr: "scale".to_string(),
            value: "abc".to_string(),
            expected: "floating-point number",
        };
        assert!(err.to_string().contains("scale"));
        assert!(err.to_string().contains("abc"));
        assert_eq!(err.errno(), EINVAL);
    }
}
