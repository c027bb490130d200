//! Variable descriptors and the variable map
//!
//! A [`VariableMap`] is the static description of what lives where in the PLC's
//! holding registers. Names are unique per map, not per process, so maps for
//! different device types can reuse them.
//!
//! ```rust
//! use voltage_plcvars::{VariableDescriptor, VariableMap, ValueType};
//!
//! let mut map = VariableMap::new();
//! map.register(VariableDescriptor::new("BoolVar", ValueType::Bool, 2)).unwrap();
//! map.register(VariableDescriptor::new("ByteVar", ValueType::UInt8, 3)).unwrap();
//!
//! let window = map.address_window().unwrap();
//! assert_eq!((window.start, window.count), (2, 2));
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{PlcError, PlcResult};
use crate::header::{HEADER_ADDRESS, HEADER_SPAN};
use crate::utils::validation;
use crate::value::ValueType;

/// Identity and layout of one named PLC variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub address: u16,
    /// Explicit register span; only strings may reserve more than their type needs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<u16>,
}

impl VariableDescriptor {
    pub fn new<S: Into<String>>(name: S, value_type: ValueType, address: u16) -> Self {
        Self {
            name: name.into(),
            value_type,
            address,
            span: None,
        }
    }

    /// String variable with room for `capacity` characters
    pub fn string<S: Into<String>>(name: S, capacity: u16, address: u16) -> Self {
        Self::new(name, ValueType::String { capacity }, address)
    }

    /// Reserve an explicit number of registers
    pub fn with_span(mut self, span: u16) -> Self {
        self.span = Some(span);
        self
    }

    /// Number of registers the variable occupies
    pub fn register_span(&self) -> usize {
        self.span
            .map(|span| span as usize)
            .unwrap_or_else(|| self.value_type.register_span())
    }

    /// Registers `[address, end)` occupied by the variable
    pub fn end(&self) -> u32 {
        self.address as u32 + self.register_span() as u32
    }

    /// Check the descriptor on its own, independent of any map
    pub fn validate(&self) -> PlcResult<()> {
        if self.name.trim().is_empty() {
            return Err(PlcError::configuration("Variable name must not be empty"));
        }
        self.value_type.validate()?;

        let minimum = self.value_type.register_span();
        let span = self.register_span();
        let span_ok = if self.value_type.is_variable_length() {
            span >= minimum
        } else {
            span == minimum
        };
        if !span_ok {
            return Err(PlcError::configuration(format!(
                "Variable {}: span {} does not fit type {} (needs {})",
                self.name, span, self.value_type, minimum
            )));
        }

        let count = u16::try_from(span).map_err(|_| PlcError::invalid_address(self.address, u16::MAX))?;
        validation::validate_address_range(self.address, count)?;
        // the read window starts at register 0, so its count must fit a u16
        if self.end() > u16::MAX as u32 {
            return Err(PlcError::invalid_address(self.address, count));
        }

        let header_end = HEADER_ADDRESS as u32 + HEADER_SPAN as u32;
        if (self.address as u32) < header_end && self.end() > HEADER_ADDRESS as u32 {
            return Err(PlcError::invalid_address(self.address, count));
        }
        Ok(())
    }
}

/// Contiguous register interval `[start, start + count)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressWindow {
    pub start: u16,
    pub count: u16,
}

impl AddressWindow {
    pub fn new(start: u16, count: u16) -> Self {
        Self { start, count }
    }

    /// Window `[start, end)`, failing when `end - start` does not fit a count
    fn from_bounds(start: u32, end: u32) -> PlcResult<Self> {
        let start_u16 = u16::try_from(start).map_err(|_| PlcError::invalid_address(u16::MAX, 0))?;
        let count = u16::try_from(end.saturating_sub(start))
            .map_err(|_| PlcError::invalid_address(start_u16, u16::MAX))?;
        Ok(Self::new(start_u16, count))
    }

    /// Minimal window covering every `[address, address + span)` interval given.
    ///
    /// Returns `Ok(None)` for an empty input and [`PlcError::InvalidAddress`]
    /// when the covering window is too large to read.
    pub fn covering<I>(intervals: I) -> PlcResult<Option<Self>>
    where
        I: IntoIterator<Item = (u16, usize)>,
    {
        let mut bounds: Option<(u32, u32)> = None;
        for (address, span) in intervals {
            let start = address as u32;
            let end = start.saturating_add(u32::try_from(span).unwrap_or(u32::MAX));
            bounds = Some(match bounds {
                Some((lo, hi)) => (lo.min(start), hi.max(end)),
                None => (start, end),
            });
        }
        bounds.map(|(lo, hi)| Self::from_bounds(lo, hi)).transpose()
    }

    /// Exclusive end address
    pub fn end(&self) -> u32 {
        self.start as u32 + self.count as u32
    }

    /// Smallest window covering both
    pub fn union(&self, other: &AddressWindow) -> PlcResult<AddressWindow> {
        let start = self.start.min(other.start) as u32;
        let end = self.end().max(other.end());
        Self::from_bounds(start, end)
    }

    pub fn contains(&self, address: u16, span: usize) -> bool {
        address >= self.start && address as u32 + span as u32 <= self.end()
    }

    /// Offset of `address` relative to the window start
    pub fn offset(&self, address: u16) -> usize {
        (address - self.start) as usize
    }
}

/// Immutable-after-construction set of variable descriptors
#[derive(Debug, Clone)]
pub struct VariableMap {
    descriptors: Vec<VariableDescriptor>,
    by_name: HashMap<String, usize>,
    by_address: HashMap<u16, usize>,
    /// Window over the variables only
    window: Option<AddressWindow>,
    /// Window over the header and the variables
    read_window: AddressWindow,
}

impl Default for VariableMap {
    fn default() -> Self {
        Self {
            descriptors: Vec::new(),
            by_name: HashMap::new(),
            by_address: HashMap::new(),
            window: None,
            read_window: AddressWindow::new(HEADER_ADDRESS, HEADER_SPAN),
        }
    }
}

impl VariableMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from descriptors, failing on the first invalid or duplicate one
    pub fn from_descriptors<I>(descriptors: I) -> PlcResult<Self>
    where
        I: IntoIterator<Item = VariableDescriptor>,
    {
        let mut map = Self::new();
        for descriptor in descriptors {
            map.register(descriptor)?;
        }
        Ok(map)
    }

    /// Add a descriptor.
    ///
    /// Fails with [`PlcError::DuplicateName`] when the name is taken in this
    /// map and with [`PlcError::InvalidAddress`] when another descriptor already
    /// starts at the same address or the variable overlaps the header block.
    /// Overlapping spans are otherwise tolerated.
    pub fn register(&mut self, descriptor: VariableDescriptor) -> PlcResult<()> {
        if self.by_name.contains_key(&descriptor.name) {
            return Err(PlcError::duplicate_name(descriptor.name));
        }
        descriptor.validate()?;
        if self.by_address.contains_key(&descriptor.address) {
            return Err(PlcError::invalid_address(
                descriptor.address,
                descriptor.register_span() as u16,
            ));
        }

        let own = AddressWindow::new(descriptor.address, u16::try_from(descriptor.register_span())
            .map_err(|_| PlcError::invalid_address(descriptor.address, u16::MAX))?);
        let window = match &self.window {
            Some(window) => window.union(&own)?,
            None => own,
        };
        let read_window = self.read_window.union(&window)?;

        let index = self.descriptors.len();
        self.by_name.insert(descriptor.name.clone(), index);
        self.by_address.insert(descriptor.address, index);
        self.descriptors.push(descriptor);
        self.window = Some(window);
        self.read_window = read_window;
        Ok(())
    }

    /// Resolve a name, failing with [`PlcError::UnknownVariable`]
    pub fn lookup(&self, name: &str) -> PlcResult<&VariableDescriptor> {
        self.get(name).ok_or_else(|| PlcError::unknown_variable(name))
    }

    pub fn get(&self, name: &str) -> Option<&VariableDescriptor> {
        self.by_name.get(name).map(|&index| &self.descriptors[index])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Descriptors in registration order
    pub fn iter(&self) -> impl Iterator<Item = &VariableDescriptor> {
        self.descriptors.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.iter().map(|d| d.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Minimal contiguous window covering every descriptor, gaps included
    pub fn address_window(&self) -> Option<AddressWindow> {
        self.window
    }

    /// Window read in one request: the header block plus every descriptor
    pub fn read_window(&self) -> AddressWindow {
        self.read_window
    }
}

/// Minimal contiguous register window covering every descriptor in `map`.
///
/// `start = min(address)`, `end = max(address + span)`. Registers inside the
/// window that no descriptor owns are read and discarded by the reader.
pub fn address_window(map: &VariableMap) -> Option<AddressWindow> {
    map.address_window()
}

impl<'a> IntoIterator for &'a VariableMap {
    type Item = &'a VariableDescriptor;
    type IntoIter = std::slice::Iter<'a, VariableDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.iter()
    }
}
