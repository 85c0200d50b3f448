use crate::types::ProductId;
use std::fmt;

/// Errors that can occur when talking to GoIO sensors.
#[derive(Debug, thiserror::Error)]
pub enum GoIoError {
    /// A GoIO_DLL entry point or sensor command returned a non-zero status.
    #[error("{call} returned with error {code}")]
    VendorCall { call: String, code: i32 },

    #[error("Device {device:?} not found among connected {product} devices")]
    DeviceNotFound { device: String, product: ProductId },

    #[error("Sensor is not open")]
    SensorNotOpen,

    #[error("Invalid {kind} name {name:?}, expected one of: {expected}")]
    InvalidName {
        kind: &'static str,
        name: String,
        expected: String,
    },

    #[error("Invalid {kind} code 0x{code:02x}")]
    InvalidCode { kind: &'static str, code: i64 },

    #[error("Command {command} expected a {expected}-byte response, got {actual}")]
    ResponseLength {
        command: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Bridge I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bridge serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Bridge protocol error: {0}")]
    Protocol(String),

    #[error("Remote call {method} failed: {message}")]
    Remote { method: String, message: String },

    #[error("Timeout waiting for the bridge server")]
    Timeout,
}

impl GoIoError {
    pub(crate) fn vendor(call: impl Into<String>, code: i32) -> Self {
        GoIoError::VendorCall {
            call: call.into(),
            code,
        }
    }
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &GoIoError) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", err));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut msg) = self.message.lock() {
            msg.clear();
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_error_message() {
        let err = GoIoError::vendor("Command GET_STATUS", -1);
        assert_eq!(err.to_string(), "Command GET_STATUS returned with error -1");
    }

    #[test]
    fn test_last_error_is_nul_terminated() {
        let last = LastError::new();
        assert!(last.as_ptr().is_null());

        last.set(&GoIoError::SensorNotOpen);
        let msg = unsafe { std::ffi::CStr::from_ptr(last.as_ptr()) };
        assert_eq!(msg.to_str().unwrap(), "Sensor is not open");

        last.clear();
        assert!(last.as_ptr().is_null());
    }
}
