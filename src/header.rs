//! Project identity header
//!
//! The two lowest holding registers identify which project is loaded on the
//! PLC: register 0 is the device type, register 1 the project version. The
//! header is checked before any variable register is interpreted, because a
//! map applied to the wrong program yields plausible but meaningless values.

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::{PlcError, PlcResult};
use crate::transport::{RegisterTransport, SlaveId};
use crate::value::{Value, ValueType};
use crate::variable_map::AddressWindow;

/// First register of the header block
pub const HEADER_ADDRESS: u16 = 0;
/// Number of registers in the header block
pub const HEADER_SPAN: u16 = 2;

/// Decoded header block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub device_type: u16,
    pub version: u16,
}

impl Header {
    pub fn new(device_type: u16, version: u16) -> Self {
        Self {
            device_type,
            version,
        }
    }

    /// Register window occupied by the header
    pub fn window() -> AddressWindow {
        AddressWindow::new(HEADER_ADDRESS, HEADER_SPAN)
    }

    /// Decode the header from its two registers
    pub fn decode(registers: &[u16]) -> PlcResult<Self> {
        if registers.len() != HEADER_SPAN as usize {
            return Err(PlcError::size_mismatch(HEADER_SPAN as usize, registers.len()));
        }
        Ok(Self {
            device_type: decode_word(&registers[0..1])?,
            version: decode_word(&registers[1..2])?,
        })
    }

    pub fn encode(&self) -> [u16; 2] {
        [self.device_type, self.version]
    }
}

fn decode_word(registers: &[u16]) -> PlcResult<u16> {
    match codec::decode(registers, &ValueType::UInt16)? {
        Value::UInt16(word) => Ok(word),
        other => Err(PlcError::internal(format!("Unexpected header value {}", other))),
    }
}

/// The device type and version range a variable map was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderExpectation {
    pub device_type: u16,
    pub min_version: u16,
    pub max_version: u16,
}

impl HeaderExpectation {
    pub fn new(device_type: u16, min_version: u16, max_version: u16) -> Self {
        Self {
            device_type,
            min_version,
            max_version,
        }
    }

    /// Accept exactly one version
    pub fn exact(device_type: u16, version: u16) -> Self {
        Self::new(device_type, version, version)
    }

    /// Check a header read from the PLC.
    ///
    /// The device type is checked first: a different project makes the
    /// version number meaningless.
    ///
    /// ```rust
    /// use voltage_plcvars::{Header, HeaderExpectation, PlcError};
    ///
    /// let expected = HeaderExpectation::new(1, 10, 12);
    /// assert!(expected.validate(&Header::new(1, 11)).is_ok());
    /// assert_eq!(
    ///     expected.validate(&Header::new(2, 11)),
    ///     Err(PlcError::device_type_mismatch(1, 2))
    /// );
    /// ```
    pub fn validate(&self, header: &Header) -> PlcResult<()> {
        if header.device_type != self.device_type {
            return Err(PlcError::device_type_mismatch(
                self.device_type,
                header.device_type,
            ));
        }
        if header.version < self.min_version || header.version > self.max_version {
            return Err(PlcError::unsupported_version(
                header.version,
                self.min_version,
                self.max_version,
            ));
        }
        Ok(())
    }
}

/// Free-function form of [`HeaderExpectation::validate`]
pub fn validate(header: &Header, expected: &HeaderExpectation) -> PlcResult<()> {
    expected.validate(header)
}

/// Read and decode the header block through the transport
pub async fn read_header(transport: &mut dyn RegisterTransport, slave: SlaveId) -> PlcResult<Header> {
    let registers = transport
        .read_registers(slave, HEADER_ADDRESS, HEADER_SPAN)
        .await?;
    Header::decode(&registers)
}
