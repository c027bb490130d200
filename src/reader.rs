//! Batched reader
//!
//! Reads the header and every variable of a map with a single transport
//! request covering the minimal window `[0, max(address + span))`, then
//! demultiplexes the registers per descriptor. All values in one
//! [`ReadSnapshot`] therefore come from the same instant on the PLC.
//!
//! Decode failures are isolated per variable: a variable whose registers do
//! not decode is reported in [`ReadSnapshot::errors`] while the others are
//! still returned.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::codec;
use crate::error::{PlcError, PlcResult};
use crate::header::{Header, HeaderExpectation, HEADER_ADDRESS, HEADER_SPAN};
use crate::transport::{RegisterTransport, SlaveId};
use crate::value::Value;
use crate::variable_map::{AddressWindow, VariableMap};

/// A successfully decoded variable
#[derive(Debug, Clone, PartialEq)]
pub struct VariableValue {
    pub name: String,
    pub value: Value,
}

/// A variable whose registers could not be decoded
#[derive(Debug, Clone, PartialEq)]
pub struct VariableError {
    pub name: String,
    pub error: PlcError,
}

/// Result of one batched read
#[derive(Debug, Clone, PartialEq)]
pub struct ReadSnapshot {
    pub header: Header,
    /// Decoded variables in map registration order
    pub values: Vec<VariableValue>,
    pub errors: Vec<VariableError>,
    pub read_at: DateTime<Utc>,
}

impl ReadSnapshot {
    /// Decoded value of `name`, if it decoded in this snapshot
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.value)
    }

    /// Decode error of `name`, if it failed in this snapshot
    pub fn error(&self, name: &str) -> Option<&PlcError> {
        self.errors
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.error)
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Reader bound to one variable map and header expectation
#[derive(Debug, Clone)]
pub struct BatchedReader {
    map: Arc<VariableMap>,
    expected: HeaderExpectation,
    window: AddressWindow,
}

impl BatchedReader {
    pub fn new(map: Arc<VariableMap>, expected: HeaderExpectation) -> Self {
        let window = map.read_window();
        Self {
            map,
            expected,
            window,
        }
    }

    /// The single register window read per cycle, header included
    pub fn window(&self) -> AddressWindow {
        self.window
    }

    pub fn map(&self) -> &Arc<VariableMap> {
        &self.map
    }

    pub fn expected(&self) -> &HeaderExpectation {
        &self.expected
    }

    /// Issue the one transport read covering the window
    pub async fn read_raw(&self, transport: &mut dyn RegisterTransport, slave: SlaveId) -> PlcResult<Vec<u16>> {
        let registers = transport
            .read_registers(slave, self.window.start, self.window.count)
            .await?;
        if registers.len() != self.window.count as usize {
            return Err(PlcError::protocol(format!(
                "Read of {} registers returned {}",
                self.window.count,
                registers.len()
            )));
        }
        Ok(registers)
    }

    /// Decode a window's worth of registers.
    ///
    /// The header is validated before any variable is touched; on a header
    /// mismatch the error is returned and no variable is decoded.
    pub fn decode(&self, registers: &[u16]) -> PlcResult<ReadSnapshot> {
        if registers.len() != self.window.count as usize {
            return Err(PlcError::size_mismatch(self.window.count as usize, registers.len()));
        }

        let header_offset = self.window.offset(HEADER_ADDRESS);
        let header = Header::decode(&registers[header_offset..header_offset + HEADER_SPAN as usize])?;
        self.expected.validate(&header)?;

        let mut values = Vec::with_capacity(self.map.len());
        let mut errors = Vec::new();
        for descriptor in self.map.iter() {
            let offset = self.window.offset(descriptor.address);
            let slice = &registers[offset..offset + descriptor.register_span()];
            match codec::decode(slice, &descriptor.value_type) {
                Ok(value) => values.push(VariableValue {
                    name: descriptor.name.clone(),
                    value,
                }),
                Err(error) => {
                    warn!("Failed to decode {}: {}", descriptor.name, error);
                    errors.push(VariableError {
                        name: descriptor.name.clone(),
                        error,
                    });
                }
            }
        }

        Ok(ReadSnapshot {
            header,
            values,
            errors,
            read_at: Utc::now(),
        })
    }

    /// Read and decode the header and every variable
    pub async fn read_all(&self, transport: &mut dyn RegisterTransport, slave: SlaveId) -> PlcResult<ReadSnapshot> {
        let registers = self.read_raw(transport, slave).await?;
        let snapshot = self.decode(&registers)?;
        debug!(
            "Read {} variables ({} failed) from slave {}",
            snapshot.values.len(),
            snapshot.errors.len(),
            slave
        );
        Ok(snapshot)
    }
}

/// One-shot form of [`BatchedReader::read_all`]
pub async fn read_all(
    transport: &mut dyn RegisterTransport,
    slave: SlaveId,
    map: Arc<VariableMap>,
    expected: HeaderExpectation,
) -> PlcResult<ReadSnapshot> {
    BatchedReader::new(map, expected).read_all(transport, slave).await
}
