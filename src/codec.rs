//! Register codec
//!
//! Pure conversions between slices of 16-bit registers and typed [`Value`]s.
//! Multi-register values are big-endian in register order: the most
//! significant 16 bits sit in the lowest-addressed register.
//!
//! | Type | Registers | Layout |
//! |------|-----------|--------|
//! | bool, int8/16, uint8/16 | 1 | low bits of register 0 |
//! | int32, uint32, float32 | 2 | high word first, IEEE-754 bit pattern for floats |
//! | int64, uint64, float64 | 4 | high word first |
//! | duration | 2 | u32 milliseconds |
//! | timestamp | 2 | u32 seconds since 1970-01-01T00:00:00Z |
//! | enum | underlying | underlying integer, validated against the enumerators |
//! | string | 1 + capacity | register 0 = length n, registers 1..=n hold one character each in the low byte |
//! | array of T | count * span(T) | elements back to back |
//!
//! ```rust
//! use voltage_plcvars::codec::{decode, encode};
//! use voltage_plcvars::{Value, ValueType};
//!
//! let registers = encode(&Value::Float32(25.5), &ValueType::Float32).unwrap();
//! assert_eq!(registers, vec![0x41CC, 0x0000]);
//! assert_eq!(decode(&registers, &ValueType::Float32).unwrap(), Value::Float32(25.5));
//! ```

use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{PlcError, PlcResult};
use crate::value::{timestamp_from_secs, Value, ValueType};

/// Decode a value from exactly the registers it occupies.
///
/// Fixed-size types require `registers.len() == ty.register_span()`; strings
/// accept any length of at least `ty.register_span()`.
pub fn decode(registers: &[u16], ty: &ValueType) -> PlcResult<Value> {
    check_span(ty, registers.len())?;

    match ty {
        ValueType::Bool => Ok(Value::Bool(registers[0] != 0)),
        ValueType::Int8 => Ok(Value::Int8(registers[0] as u8 as i8)),
        ValueType::Int16 => Ok(Value::Int16(registers[0] as i16)),
        ValueType::UInt8 => Ok(Value::UInt8(registers[0] as u8)),
        ValueType::UInt16 => Ok(Value::UInt16(registers[0])),
        ValueType::Int32 => Ok(Value::Int32(BigEndian::read_i32(&to_bytes(registers)))),
        ValueType::UInt32 => Ok(Value::UInt32(BigEndian::read_u32(&to_bytes(registers)))),
        ValueType::Float32 => Ok(Value::Float32(BigEndian::read_f32(&to_bytes(registers)))),
        ValueType::Int64 => Ok(Value::Int64(BigEndian::read_i64(&to_bytes(registers)))),
        ValueType::UInt64 => Ok(Value::UInt64(BigEndian::read_u64(&to_bytes(registers)))),
        ValueType::Float64 => Ok(Value::Float64(BigEndian::read_f64(&to_bytes(registers)))),
        ValueType::Duration => {
            let millis = BigEndian::read_u32(&to_bytes(registers));
            Ok(Value::Duration(Duration::from_millis(millis as u64)))
        }
        ValueType::Timestamp => timestamp_from_secs(BigEndian::read_u32(&to_bytes(registers))),
        ValueType::Enum(enum_type) => {
            let raw = decode(registers, &enum_type.underlying)?;
            let integer = raw
                .as_i128()
                .and_then(|v| i64::try_from(v).ok())
                .ok_or_else(|| PlcError::conversion(format!("{} does not fit an enum value", raw)))?;
            enum_type.resolve(integer)
        }
        ValueType::String { .. } => decode_string(registers),
        ValueType::Array { element, .. } => {
            let element_span = element.register_span();
            if element_span == 0 {
                return Err(PlcError::configuration(format!("Array element {} occupies no registers", element)));
            }
            registers
                .chunks(element_span)
                .map(|chunk| decode(chunk, element))
                .collect::<PlcResult<Vec<_>>>()
                .map(Value::Array)
        }
    }
}

/// Encode a value into `ty.register_span()` registers.
///
/// The value is first coerced to `ty`, so any value accepted by
/// [`Value::coerce_to`] can be encoded.
pub fn encode(value: &Value, ty: &ValueType) -> PlcResult<Vec<u16>> {
    encode_with_span(value, ty, ty.register_span())
}

/// Encode a value into a caller-chosen number of registers.
///
/// `span` must match the type exactly, except for strings where it only has
/// to be large enough; unused string registers are zero.
pub fn encode_with_span(value: &Value, ty: &ValueType, span: usize) -> PlcResult<Vec<u16>> {
    check_span(ty, span)?;
    let value = value.coerce_to(ty)?;

    let registers = match (ty, &value) {
        (ValueType::Bool, Value::Bool(v)) => vec![*v as u16],
        (ValueType::Int8, Value::Int8(v)) => vec![*v as u8 as u16],
        (ValueType::Int16, Value::Int16(v)) => vec![*v as u16],
        (ValueType::UInt8, Value::UInt8(v)) => vec![*v as u16],
        (ValueType::UInt16, Value::UInt16(v)) => vec![*v],
        (ValueType::Int32, Value::Int32(v)) => with_bytes::<4>(|buf| BigEndian::write_i32(buf, *v)),
        (ValueType::UInt32, Value::UInt32(v)) => with_bytes::<4>(|buf| BigEndian::write_u32(buf, *v)),
        (ValueType::Float32, Value::Float32(v)) => with_bytes::<4>(|buf| BigEndian::write_f32(buf, *v)),
        (ValueType::Int64, Value::Int64(v)) => with_bytes::<8>(|buf| BigEndian::write_i64(buf, *v)),
        (ValueType::UInt64, Value::UInt64(v)) => with_bytes::<8>(|buf| BigEndian::write_u64(buf, *v)),
        (ValueType::Float64, Value::Float64(v)) => with_bytes::<8>(|buf| BigEndian::write_f64(buf, *v)),
        (ValueType::Duration, Value::Duration(d)) => {
            let millis = d.as_millis() as u32;
            with_bytes::<4>(|buf| BigEndian::write_u32(buf, millis))
        }
        (ValueType::Timestamp, Value::Timestamp(ts)) => {
            let seconds = ts.timestamp() as u32;
            with_bytes::<4>(|buf| BigEndian::write_u32(buf, seconds))
        }
        (ValueType::Enum(enum_type), Value::Enum { value, .. }) => {
            encode(&Value::Int64(*value), &enum_type.underlying)?
        }
        (ValueType::String { .. }, Value::String(s)) => encode_string(s, span)?,
        (ValueType::Array { element, .. }, Value::Array(items)) => {
            let mut registers = Vec::with_capacity(span);
            for item in items {
                registers.extend(encode(item, element)?);
            }
            registers
        }
        _ => {
            return Err(PlcError::internal(format!(
                "Coerced {} value does not match {}",
                value.kind(),
                ty
            )))
        }
    };

    Ok(registers)
}

fn check_span(ty: &ValueType, actual: usize) -> PlcResult<()> {
    let expected = ty.register_span();
    let fits = if ty.is_variable_length() {
        actual >= expected
    } else {
        actual == expected
    };
    if fits {
        Ok(())
    } else {
        Err(PlcError::size_mismatch(expected, actual))
    }
}

fn decode_string(registers: &[u16]) -> PlcResult<Value> {
    let length = registers[0] as usize;
    let capacity = registers.len() - 1;
    if length > capacity {
        return Err(PlcError::string_too_long(length, capacity));
    }
    // registers past `length` are ignored
    let text = registers[1..=length]
        .iter()
        .map(|register| (*register as u8) as char)
        .collect();
    Ok(Value::String(text))
}

fn encode_string(text: &str, span: usize) -> PlcResult<Vec<u16>> {
    let capacity = span - 1;
    let length = text.chars().count();
    if length > capacity {
        return Err(PlcError::string_too_long(length, capacity));
    }
    let mut registers = vec![0u16; span];
    registers[0] = length as u16;
    for (slot, c) in registers[1..].iter_mut().zip(text.chars()) {
        *slot = c as u32 as u16;
    }
    Ok(registers)
}

fn to_bytes(registers: &[u16]) -> Vec<u8> {
    let mut bytes = vec![0u8; registers.len() * 2];
    BigEndian::write_u16_into(registers, &mut bytes);
    bytes
}

fn with_bytes<const N: usize>(write: impl FnOnce(&mut [u8])) -> Vec<u16> {
    let mut bytes = [0u8; N];
    write(&mut bytes);
    let mut registers = vec![0u16; N / 2];
    BigEndian::read_u16_into(&bytes, &mut registers);
    registers
}
