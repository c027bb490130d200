//! Runtime value model for PLC variables
//!
//! A PLC exposes only 16-bit registers, so the type of every variable is known
//! at runtime only, from the variable map. [`ValueType`] is that runtime type
//! tag and [`Value`] is the tagged union holding a decoded value. Assigning a
//! value to a variable goes through [`Value::coerce_to`], which converts
//! between compatible kinds and rejects anything lossy.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PlcError, PlcResult};

/// Semantic type of a PLC variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    #[serde(rename = "uint8", alias = "byte")]
    UInt8,
    #[serde(rename = "uint16", alias = "word")]
    UInt16,
    #[serde(rename = "uint32", alias = "dword")]
    UInt32,
    #[serde(rename = "uint64")]
    UInt64,
    #[serde(alias = "real")]
    Float32,
    #[serde(alias = "lreal")]
    Float64,
    /// Millisecond count in 32 bits (2 registers)
    Duration,
    /// Seconds since the Unix epoch in 32 bits (2 registers)
    Timestamp,
    /// Enumeration stored as its underlying integer
    Enum(EnumType),
    /// Length-prefixed string: one count register plus `capacity` character registers
    String { capacity: u16 },
    /// Homogeneous array, elements laid out back to back
    Array { element: Box<ValueType>, count: u16 },
}

impl ValueType {
    /// Number of registers the type needs.
    ///
    /// For strings this is the minimum; a descriptor may reserve more.
    pub fn register_span(&self) -> usize {
        match self {
            ValueType::Bool
            | ValueType::Int8
            | ValueType::Int16
            | ValueType::UInt8
            | ValueType::UInt16 => 1,
            ValueType::Int32
            | ValueType::UInt32
            | ValueType::Float32
            | ValueType::Duration
            | ValueType::Timestamp => 2,
            ValueType::Int64 | ValueType::UInt64 | ValueType::Float64 => 4,
            ValueType::Enum(enum_type) => enum_type.underlying.register_span(),
            ValueType::String { capacity } => *capacity as usize + 1,
            ValueType::Array { element, count } => element.register_span() * *count as usize,
        }
    }

    /// Types whose descriptor may reserve more registers than `register_span`
    pub fn is_variable_length(&self) -> bool {
        matches!(self, ValueType::String { .. })
    }

    pub fn is_integer(&self) -> bool {
        self.integer_range().is_some()
    }

    /// Inclusive value range of integer types
    pub fn integer_range(&self) -> Option<(i128, i128)> {
        let range = match self {
            ValueType::Int8 => (i8::MIN as i128, i8::MAX as i128),
            ValueType::Int16 => (i16::MIN as i128, i16::MAX as i128),
            ValueType::Int32 => (i32::MIN as i128, i32::MAX as i128),
            ValueType::Int64 => (i64::MIN as i128, i64::MAX as i128),
            ValueType::UInt8 => (0, u8::MAX as i128),
            ValueType::UInt16 => (0, u16::MAX as i128),
            ValueType::UInt32 => (0, u32::MAX as i128),
            ValueType::UInt64 => (0, u64::MAX as i128),
            _ => return None,
        };
        Some(range)
    }

    /// Check the type definition itself (enum variants, array element count)
    pub fn validate(&self) -> PlcResult<()> {
        match self {
            ValueType::Enum(enum_type) => enum_type.validate(),
            ValueType::Array { element, count } => {
                if *count == 0 {
                    return Err(PlcError::configuration("Array type needs at least one element"));
                }
                element.validate()
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Bool => write!(f, "bool"),
            ValueType::Int8 => write!(f, "int8"),
            ValueType::Int16 => write!(f, "int16"),
            ValueType::Int32 => write!(f, "int32"),
            ValueType::Int64 => write!(f, "int64"),
            ValueType::UInt8 => write!(f, "uint8"),
            ValueType::UInt16 => write!(f, "uint16"),
            ValueType::UInt32 => write!(f, "uint32"),
            ValueType::UInt64 => write!(f, "uint64"),
            ValueType::Float32 => write!(f, "float32"),
            ValueType::Float64 => write!(f, "float64"),
            ValueType::Duration => write!(f, "duration"),
            ValueType::Timestamp => write!(f, "timestamp"),
            ValueType::Enum(enum_type) => write!(f, "enum {}", enum_type.name),
            ValueType::String { capacity } => write!(f, "string[{}]", capacity),
            ValueType::Array { element, count } => write!(f, "array[{}] of {}", count, element),
        }
    }
}

/// One named enumerator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumVariant {
    pub name: String,
    pub value: i64,
}

/// Enumeration with an integer wire representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumType {
    pub name: String,
    pub underlying: Box<ValueType>,
    pub variants: Vec<EnumVariant>,
}

impl EnumType {
    /// Build and validate an enum type
    ///
    /// ```rust
    /// use voltage_plcvars::{EnumType, ValueType};
    ///
    /// let mode = EnumType::new("Mode", ValueType::UInt16, [("Off", 0), ("Auto", 1), ("Manual", 2)]).unwrap();
    /// assert_eq!(mode.name_of(1), Some("Auto"));
    /// ```
    pub fn new<N, V, I>(name: N, underlying: ValueType, variants: I) -> PlcResult<Self>
    where
        N: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (V, i64)>,
    {
        let enum_type = Self {
            name: name.into(),
            underlying: Box::new(underlying),
            variants: variants
                .into_iter()
                .map(|(name, value)| EnumVariant {
                    name: name.into(),
                    value,
                })
                .collect(),
        };
        enum_type.validate()?;
        Ok(enum_type)
    }

    pub fn validate(&self) -> PlcResult<()> {
        let (min, max) = self.underlying.integer_range().ok_or_else(|| {
            PlcError::configuration(format!(
                "Enum {} needs an integer underlying type, got {}",
                self.name, self.underlying
            ))
        })?;

        for (i, variant) in self.variants.iter().enumerate() {
            let value = variant.value as i128;
            if value < min || value > max {
                return Err(PlcError::configuration(format!(
                    "Enumerator {}::{} = {} does not fit {}",
                    self.name, variant.name, variant.value, self.underlying
                )));
            }
            if self.variants[..i]
                .iter()
                .any(|other| other.name == variant.name || other.value == variant.value)
            {
                return Err(PlcError::configuration(format!(
                    "Enumerator {}::{} is defined twice",
                    self.name, variant.name
                )));
            }
        }
        Ok(())
    }

    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.variants
            .iter()
            .find(|variant| variant.value == value)
            .map(|variant| variant.name.as_str())
    }

    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.variants
            .iter()
            .find(|variant| variant.name == name)
            .map(|variant| variant.value)
    }

    /// Resolve a wire integer into an enum value, rejecting unknown enumerators
    pub fn resolve(&self, value: i64) -> PlcResult<Value> {
        let name = self
            .name_of(value)
            .ok_or_else(|| PlcError::unknown_enum_value(self.name.clone(), value))?;
        Ok(Value::Enum {
            name: name.to_string(),
            value,
        })
    }
}

/// Decoded or staged value of a PLC variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Duration(Duration),
    Timestamp(DateTime<Utc>),
    Enum { name: String, value: i64 },
    String(String),
    Array(Vec<Value>),
}

impl Value {
    /// Short name of the value's kind, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int8(_) => "int8",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::UInt8(_) => "uint8",
            Value::UInt16(_) => "uint16",
            Value::UInt32(_) => "uint32",
            Value::UInt64(_) => "uint64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::Duration(_) => "duration",
            Value::Timestamp(_) => "timestamp",
            Value::Enum { .. } => "enum",
            Value::String(_) => "string",
            Value::Array(_) => "array",
        }
    }

    /// Integer view of integer-like values (integers, bools and enums)
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Bool(v) => Some(*v as i128),
            Value::Int8(v) => Some(*v as i128),
            Value::Int16(v) => Some(*v as i128),
            Value::Int32(v) => Some(*v as i128),
            Value::Int64(v) => Some(*v as i128),
            Value::UInt8(v) => Some(*v as i128),
            Value::UInt16(v) => Some(*v as i128),
            Value::UInt32(v) => Some(*v as i128),
            Value::UInt64(v) => Some(*v as i128),
            Value::Enum { value, .. } => Some(*value as i128),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            other => other.as_i128().map(|v| v as f64),
        }
    }

    /// Convert the value to the representation required by `ty`.
    ///
    /// Integers are range checked, floats are accepted by integer types only
    /// when they have no fractional part, and integers are accepted by float
    /// types only when exactly representable.
    ///
    /// ```rust
    /// use voltage_plcvars::{Value, ValueType};
    ///
    /// assert_eq!(Value::Float64(3.0).coerce_to(&ValueType::Int16).unwrap(), Value::Int16(3));
    /// assert!(Value::Float64(3.5).coerce_to(&ValueType::Int16).is_err());
    /// assert!(Value::Int32(70000).coerce_to(&ValueType::UInt16).is_err());
    /// ```
    pub fn coerce_to(&self, ty: &ValueType) -> PlcResult<Value> {
        match ty {
            ValueType::Bool => match self {
                Value::Bool(v) => Ok(Value::Bool(*v)),
                other => match other.as_i128() {
                    Some(0) => Ok(Value::Bool(false)),
                    Some(1) => Ok(Value::Bool(true)),
                    _ => Err(self.incompatible(ty)),
                },
            },
            ValueType::Int8
            | ValueType::Int16
            | ValueType::Int32
            | ValueType::Int64
            | ValueType::UInt8
            | ValueType::UInt16
            | ValueType::UInt32
            | ValueType::UInt64 => {
                let integer = self.integer_for(ty)?;
                integer_value(integer, ty)
            }
            ValueType::Float32 => match self {
                Value::Float32(v) => Ok(Value::Float32(*v)),
                Value::Float64(v) => {
                    if v.is_finite() && v.abs() > f32::MAX as f64 {
                        return Err(PlcError::conversion(format!("{} is out of float32 range", v)));
                    }
                    let narrowed = *v as f32;
                    // NaN never compares equal; infinities narrow exactly
                    if v.is_finite() && narrowed as f64 != *v {
                        return Err(PlcError::conversion(format!(
                            "{} is not exactly representable as float32",
                            v
                        )));
                    }
                    Ok(Value::Float32(narrowed))
                }
                other => match other.as_i128() {
                    Some(i) if (i as f32) as i128 == i => Ok(Value::Float32(i as f32)),
                    Some(i) => Err(PlcError::conversion(format!(
                        "{} is not exactly representable as float32",
                        i
                    ))),
                    None => Err(self.incompatible(ty)),
                },
            },
            ValueType::Float64 => match self {
                Value::Float32(v) => Ok(Value::Float64(*v as f64)),
                Value::Float64(v) => Ok(Value::Float64(*v)),
                other => match other.as_i128() {
                    Some(i) if (i as f64) as i128 == i => Ok(Value::Float64(i as f64)),
                    Some(i) => Err(PlcError::conversion(format!(
                        "{} is not exactly representable as float64",
                        i
                    ))),
                    None => Err(self.incompatible(ty)),
                },
            },
            ValueType::Duration => {
                let millis = match self {
                    Value::Duration(d) => d.as_millis(),
                    Value::Bool(_) | Value::Enum { .. } => return Err(self.incompatible(ty)),
                    other => {
                        let integer = other.integer_for(ty)?;
                        if integer < 0 {
                            return Err(PlcError::conversion("Duration cannot be negative"));
                        }
                        integer as u128
                    }
                };
                if millis > u32::MAX as u128 {
                    return Err(PlcError::conversion(format!(
                        "Duration of {}ms exceeds the 32-bit millisecond range",
                        millis
                    )));
                }
                Ok(Value::Duration(Duration::from_millis(millis as u64)))
            }
            ValueType::Timestamp => {
                let seconds = match self {
                    Value::Timestamp(ts) => ts.timestamp() as i128,
                    Value::Bool(_) | Value::Enum { .. } => return Err(self.incompatible(ty)),
                    other => other.integer_for(ty)?,
                };
                if seconds < 0 || seconds > u32::MAX as i128 {
                    return Err(PlcError::conversion(format!(
                        "Timestamp {}s is outside the 32-bit epoch range",
                        seconds
                    )));
                }
                timestamp_from_secs(seconds as u32)
            }
            ValueType::Enum(enum_type) => match self {
                Value::String(name) => {
                    let value = enum_type.value_of(name).ok_or_else(|| {
                        PlcError::conversion(format!(
                            "{} is not an enumerator of {}",
                            name, enum_type.name
                        ))
                    })?;
                    enum_type.resolve(value)
                }
                Value::Bool(_) => Err(self.incompatible(ty)),
                other => {
                    let integer = other.integer_for(ty)?;
                    let value = i64::try_from(integer)
                        .map_err(|_| PlcError::conversion(format!("{} is out of range", integer)))?;
                    enum_type.resolve(value)
                }
            },
            ValueType::String { .. } => match self {
                Value::String(s) => {
                    if let Some(c) = s.chars().find(|c| (*c as u32) > 0xFF) {
                        return Err(PlcError::conversion(format!(
                            "Character {:?} cannot be stored in a single register byte",
                            c
                        )));
                    }
                    Ok(Value::String(s.clone()))
                }
                _ => Err(self.incompatible(ty)),
            },
            ValueType::Array { element, count } => match self {
                Value::Array(items) => {
                    if items.len() != *count as usize {
                        return Err(PlcError::conversion(format!(
                            "Array needs {} elements, got {}",
                            count,
                            items.len()
                        )));
                    }
                    items
                        .iter()
                        .map(|item| item.coerce_to(element))
                        .collect::<PlcResult<Vec<_>>>()
                        .map(Value::Array)
                }
                _ => Err(self.incompatible(ty)),
            },
        }
    }

    fn integer_for(&self, ty: &ValueType) -> PlcResult<i128> {
        match self {
            Value::Float32(v) => float_to_integer(*v as f64),
            Value::Float64(v) => float_to_integer(*v),
            other => other.as_i128().ok_or_else(|| other.incompatible(ty)),
        }
    }

    fn incompatible(&self, ty: &ValueType) -> PlcError {
        PlcError::conversion(format!("Cannot assign {} value to {}", self.kind(), ty))
    }
}

fn float_to_integer(value: f64) -> PlcResult<i128> {
    if !value.is_finite() {
        return Err(PlcError::conversion(format!("{} is not a finite number", value)));
    }
    if value.fract() != 0.0 {
        return Err(PlcError::conversion(format!(
            "{} has a fractional part and cannot be assigned to an integer",
            value
        )));
    }
    // saturating cast; out-of-range values are caught by the caller's range check
    Ok(value as i128)
}

fn integer_value(integer: i128, ty: &ValueType) -> PlcResult<Value> {
    let (min, max) = ty
        .integer_range()
        .ok_or_else(|| PlcError::internal(format!("{} is not an integer type", ty)))?;
    if integer < min || integer > max {
        return Err(PlcError::conversion(format!(
            "{} is out of range for {} ({}..={})",
            integer, ty, min, max
        )));
    }
    Ok(match ty {
        ValueType::Int8 => Value::Int8(integer as i8),
        ValueType::Int16 => Value::Int16(integer as i16),
        ValueType::Int32 => Value::Int32(integer as i32),
        ValueType::Int64 => Value::Int64(integer as i64),
        ValueType::UInt8 => Value::UInt8(integer as u8),
        ValueType::UInt16 => Value::UInt16(integer as u16),
        ValueType::UInt32 => Value::UInt32(integer as u32),
        _ => Value::UInt64(integer as u64),
    })
}

pub(crate) fn timestamp_from_secs(seconds: u32) -> PlcResult<Value> {
    DateTime::<Utc>::from_timestamp(seconds as i64, 0)
        .map(Value::Timestamp)
        .ok_or_else(|| PlcError::conversion(format!("Invalid timestamp {}", seconds)))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int8(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::UInt8(v) => write!(f, "{}", v),
            Value::UInt16(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::UInt64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Duration(d) => write!(f, "{}ms", d.as_millis()),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::Enum { name, value } => write!(f, "{}({})", name, value),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

macro_rules! impl_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_value_from! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    Duration => Duration,
    DateTime<Utc> => Timestamp,
    String => String,
    Vec<Value> => Array,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode_type() -> EnumType {
        EnumType::new("Mode", ValueType::Int16, [("Off", 0), ("Auto", 1), ("Manual", 2)]).unwrap()
    }

    #[test]
    fn test_register_spans() {
        assert_eq!(ValueType::Bool.register_span(), 1);
        assert_eq!(ValueType::UInt8.register_span(), 1);
        assert_eq!(ValueType::Float32.register_span(), 2);
        assert_eq!(ValueType::Timestamp.register_span(), 2);
        assert_eq!(ValueType::Float64.register_span(), 4);
        assert_eq!(ValueType::String { capacity: 10 }.register_span(), 11);
        assert_eq!(ValueType::Enum(mode_type()).register_span(), 1);

        let array = ValueType::Array {
            element: Box::new(ValueType::Int32),
            count: 3,
        };
        assert_eq!(array.register_span(), 6);
    }

    #[test]
    fn test_integer_coercion() {
        assert_eq!(Value::Int64(-5).coerce_to(&ValueType::Int8).unwrap(), Value::Int8(-5));
        assert_eq!(Value::Bool(true).coerce_to(&ValueType::UInt16).unwrap(), Value::UInt16(1));
        assert!(Value::Int16(-1).coerce_to(&ValueType::UInt32).is_err());
        assert!(Value::UInt16(300).coerce_to(&ValueType::UInt8).is_err());
        assert!(Value::String("12".into()).coerce_to(&ValueType::Int32).is_err());
    }

    #[test]
    fn test_fractional_float_to_integer_is_rejected() {
        let err = Value::Float64(21.5).coerce_to(&ValueType::Int32).unwrap_err();
        assert!(matches!(err, PlcError::Conversion { .. }));
        assert_eq!(Value::Float32(22.0).coerce_to(&ValueType::Int32).unwrap(), Value::Int32(22));
        assert!(Value::Float64(f64::NAN).coerce_to(&ValueType::Int32).is_err());
    }

    #[test]
    fn test_float_coercion() {
        assert_eq!(Value::Float64(21.5).coerce_to(&ValueType::Float32).unwrap(), Value::Float32(21.5));
        assert_eq!(Value::Int32(7).coerce_to(&ValueType::Float64).unwrap(), Value::Float64(7.0));
        assert!(Value::Int32(16_777_217).coerce_to(&ValueType::Float32).is_err());
        assert!(Value::Float64(1e300).coerce_to(&ValueType::Float32).is_err());
    }

    #[test]
    fn test_float64_narrowing_is_exact() {
        assert!(matches!(
            Value::Float64(0.1).coerce_to(&ValueType::Float32),
            Err(PlcError::Conversion { .. })
        ));
        assert!(Value::Float64(1.0 + f64::EPSILON).coerce_to(&ValueType::Float32).is_err());
        assert_eq!(Value::Float64(0.5).coerce_to(&ValueType::Float32).unwrap(), Value::Float32(0.5));
        assert_eq!(
            Value::Float64(0.1f32 as f64).coerce_to(&ValueType::Float32).unwrap(),
            Value::Float32(0.1)
        );
        assert_eq!(
            Value::Float64(f64::INFINITY).coerce_to(&ValueType::Float32).unwrap(),
            Value::Float32(f32::INFINITY)
        );
        match Value::Float64(f64::NAN).coerce_to(&ValueType::Float32).unwrap() {
            Value::Float32(v) => assert!(v.is_nan()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bool_coercion() {
        assert_eq!(Value::UInt8(0).coerce_to(&ValueType::Bool).unwrap(), Value::Bool(false));
        assert!(Value::Int16(2).coerce_to(&ValueType::Bool).is_err());
        assert!(Value::Float32(1.0).coerce_to(&ValueType::Bool).is_err());
    }

    #[test]
    fn test_enum_coercion() {
        let ty = ValueType::Enum(mode_type());
        assert_eq!(
            Value::from("Manual").coerce_to(&ty).unwrap(),
            Value::Enum { name: "Manual".into(), value: 2 }
        );
        assert_eq!(
            Value::Int16(1).coerce_to(&ty).unwrap(),
            Value::Enum { name: "Auto".into(), value: 1 }
        );
        assert!(matches!(
            Value::Int16(9).coerce_to(&ty),
            Err(PlcError::UnknownEnumValue { value: 9, .. })
        ));
        assert!(Value::from("Turbo").coerce_to(&ty).is_err());
    }

    #[test]
    fn test_enum_definition_validation() {
        assert!(EnumType::new("Bad", ValueType::Float32, [("A", 0)]).is_err());
        assert!(EnumType::new("Bad", ValueType::UInt8, [("A", 256)]).is_err());
        assert!(EnumType::new("Bad", ValueType::UInt8, [("A", 1), ("A", 2)]).is_err());
    }

    #[test]
    fn test_duration_and_timestamp_coercion() {
        let d = Value::UInt32(1500).coerce_to(&ValueType::Duration).unwrap();
        assert_eq!(d, Value::Duration(Duration::from_millis(1500)));
        assert!(Value::Int32(-1).coerce_to(&ValueType::Duration).is_err());
        assert!(Value::Duration(Duration::from_secs(5_000_000))
            .coerce_to(&ValueType::Duration)
            .is_err());

        let ts = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(
            Value::Timestamp(ts).coerce_to(&ValueType::Timestamp).unwrap(),
            Value::Timestamp(ts)
        );
        let before_epoch = DateTime::<Utc>::from_timestamp(-10, 0).unwrap();
        assert!(Value::Timestamp(before_epoch).coerce_to(&ValueType::Timestamp).is_err());
    }

    #[test]
    fn test_string_and_array_coercion() {
        let ty = ValueType::String { capacity: 8 };
        assert!(Value::from("pump").coerce_to(&ty).is_ok());
        assert!(Value::from("温度").coerce_to(&ty).is_err());

        let array = ValueType::Array {
            element: Box::new(ValueType::Int16),
            count: 2,
        };
        assert_eq!(
            Value::Array(vec![Value::Int64(1), Value::Float64(2.0)]).coerce_to(&array).unwrap(),
            Value::Array(vec![Value::Int16(1), Value::Int16(2)])
        );
        assert!(Value::Array(vec![Value::Int16(1)]).coerce_to(&array).is_err());
    }

    #[test]
    fn test_value_type_serde() {
        let yaml = "kind: array\nelement:\n  kind: uint16\ncount: 4\n";
        let ty: ValueType = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(ty.register_span(), 4);

        let ty: ValueType = serde_json::from_str(r#"{"kind":"byte"}"#).unwrap();
        assert_eq!(ty, ValueType::UInt8);
    }
}
