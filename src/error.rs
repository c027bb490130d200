//! # PLC Variable Error Handling
//!
//! This module provides the single error type used across the crate. It covers
//! the three failure families that matter when mapping typed variables onto a
//! Modbus register space:
//!
//! ### Map / programmer errors
//! - **DuplicateName**: a variable name registered twice in one map
//! - **UnknownVariable**: a lookup or stage for a name the map does not know
//! - **InvalidAddress**: a descriptor that does not fit in the address space
//!
//! ### Data / schema errors
//! - **SizeMismatch**, **StringTooLong**, **UnknownEnumValue**, **Conversion**
//!
//! These are reported per variable by the batched reader and never abort a batch.
//!
//! ### Connection errors
//! - **DeviceTypeMismatch**, **UnsupportedVersion**: the PLC runs a different
//!   project than the map describes; fatal for the connection
//! - **Io**, **Connection**, **Timeout**, **Exception**, **Protocol**: transport
//!   failures, converted into reconnects by the connection monitor
//!
//! ## Error Classification
//!
//! ```rust
//! use voltage_plcvars::PlcError;
//!
//! fn classify(error: &PlcError) {
//!     if error.is_transport_error() {
//!         println!("connectivity lost: {}", error);
//!     } else if error.is_fatal_for_connection() {
//!         println!("wrong program loaded: {}", error);
//!     } else if error.is_data_error() {
//!         println!("bad value: {}", error);
//!     }
//! }
//! ```

use thiserror::Error;

/// Result type alias for PLC variable operations
pub type PlcResult<T> = Result<T, PlcError>;

/// Errors raised by the codec, the variable map, the reader/writer and the
/// transport layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlcError {
    /// A descriptor with this name is already registered in the map
    #[error("Duplicate variable name: {name}")]
    DuplicateName { name: String },

    /// No descriptor with this name exists in the map
    #[error("Unknown variable: {name}")]
    UnknownVariable { name: String },

    /// Register slice length does not match what the value type needs
    ///
    /// For fixed-size types `actual` must equal `expected`; for strings it must
    /// be at least `expected`.
    #[error("Register count mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// String does not fit into the registers reserved for it
    #[error("String of {length} characters does not fit in {capacity} registers")]
    StringTooLong { length: usize, capacity: usize },

    /// Wire value of an enum variable matches no known enumerator
    #[error("Unknown value {value} for enum {enum_name}")]
    UnknownEnumValue { enum_name: String, value: i64 },

    /// Value cannot be represented in the target type without loss
    #[error("Conversion error: {message}")]
    Conversion { message: String },

    /// The PLC runs a different project than the one the map was built for
    #[error("Device type mismatch: expected {expected}, PLC reports {actual}")]
    DeviceTypeMismatch { expected: u16, actual: u16 },

    /// The project version on the PLC is outside the supported range
    #[error("Unsupported version {version} (supported {min}..={max})")]
    UnsupportedVersion { version: u16, min: u16, max: u16 },

    /// Register range does not fit the 16-bit address space or collides with
    /// the header block
    #[error("Invalid address: start={start}, count={count}")]
    InvalidAddress { start: u16, count: u16 },

    /// I/O related errors (socket level)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Connection establishment or loss
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Transport call exceeded its timeout
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Modbus exception response from the PLC
    #[error("Modbus exception: {message}")]
    Exception { message: String },

    /// Malformed or unexpected response
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Invalid configuration values
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Library internal errors (poisoned locks, task failures)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PlcError {
    pub fn duplicate_name<S: Into<String>>(name: S) -> Self {
        Self::DuplicateName { name: name.into() }
    }

    pub fn unknown_variable<S: Into<String>>(name: S) -> Self {
        Self::UnknownVariable { name: name.into() }
    }

    pub fn size_mismatch(expected: usize, actual: usize) -> Self {
        Self::SizeMismatch { expected, actual }
    }

    pub fn string_too_long(length: usize, capacity: usize) -> Self {
        Self::StringTooLong { length, capacity }
    }

    pub fn unknown_enum_value<S: Into<String>>(enum_name: S, value: i64) -> Self {
        Self::UnknownEnumValue {
            enum_name: enum_name.into(),
            value,
        }
    }

    pub fn conversion<S: Into<String>>(message: S) -> Self {
        Self::Conversion {
            message: message.into(),
        }
    }

    pub fn device_type_mismatch(expected: u16, actual: u16) -> Self {
        Self::DeviceTypeMismatch { expected, actual }
    }

    pub fn unsupported_version(version: u16, min: u16, max: u16) -> Self {
        Self::UnsupportedVersion { version, min, max }
    }

    pub fn invalid_address(start: u16, count: u16) -> Self {
        Self::InvalidAddress { start, count }
    }

    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn exception<S: Into<String>>(message: S) -> Self {
        Self::Exception {
            message: message.into(),
        }
    }

    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if the error means the transport session is unusable
    ///
    /// Exception and protocol errors count as well: a PLC answering garbage
    /// or refusing the probe is treated the same as a dead socket.
    ///
    /// ```rust
    /// use voltage_plcvars::PlcError;
    ///
    /// assert!(PlcError::timeout("probe", 1000).is_transport_error());
    /// assert!(!PlcError::unknown_variable("Temp").is_transport_error());
    /// ```
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::Connection { .. }
                | Self::Timeout { .. }
                | Self::Exception { .. }
                | Self::Protocol { .. }
        )
    }

    /// Check if retrying the same operation later might succeed
    pub fn is_recoverable(&self) -> bool {
        self.is_transport_error()
    }

    /// Check if the error concerns a single variable's data
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::SizeMismatch { .. }
                | Self::StringTooLong { .. }
                | Self::UnknownEnumValue { .. }
                | Self::Conversion { .. }
        )
    }

    /// Check if the connected PLC cannot be used with the current map
    pub fn is_fatal_for_connection(&self) -> bool {
        matches!(
            self,
            Self::DeviceTypeMismatch { .. } | Self::UnsupportedVersion { .. }
        )
    }

    /// Check if the error is a local misuse of the API
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateName { .. } | Self::UnknownVariable { .. } | Self::InvalidAddress { .. }
        )
    }
}

impl From<std::io::Error> for PlcError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

/// Converts Tokio's timeout errors; callers that know the duration should
/// build `PlcError::timeout` themselves.
impl From<tokio::time::error::Elapsed> for PlcError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::timeout("Operation timeout", 0)
    }
}

impl From<serde_json::Error> for PlcError {
    fn from(err: serde_json::Error) -> Self {
        Self::configuration(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for PlcError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::configuration(format!("YAML error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = PlcError::timeout("read_registers", 5000);
        assert!(err.is_recoverable());
        assert!(err.is_transport_error());
        assert!(!err.is_fatal_for_connection());

        let err = PlcError::device_type_mismatch(1, 2);
        assert!(err.is_fatal_for_connection());
        assert!(!err.is_recoverable());

        let err = PlcError::unknown_enum_value("Mode", 9);
        assert!(err.is_data_error());
        assert!(!err.is_transport_error());

        assert!(PlcError::duplicate_name("Temp").is_programmer_error());
    }

    #[test]
    fn test_error_display() {
        let err = PlcError::unsupported_version(7, 1, 3);
        let msg = format!("{}", err);
        assert!(msg.contains("Unsupported version 7"));
        assert!(msg.contains("1..=3"));

        let err = PlcError::string_too_long(12, 10);
        assert_eq!(
            err.to_string(),
            "String of 12 characters does not fit in 10 registers"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err: PlcError = io.into();
        assert!(matches!(err, PlcError::Io { .. }));
        assert!(err.is_transport_error());
    }
}
