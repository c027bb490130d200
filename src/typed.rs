//! Typed convenience layer
//!
//! The core works with runtime-typed [`Value`]s. When the Rust type of a
//! variable is known at compile time, a [`TypedVariable<T>`] checks the
//! descriptor once at bind time and then reads and stages plain `T`s.
//!
//! ```rust
//! use voltage_plcvars::{HeaderExpectation, PlcClient, ValueType, VariableDescriptor, VariableMap};
//!
//! let map = VariableMap::from_descriptors([
//!     VariableDescriptor::new("Setpoint", ValueType::Float32, 2),
//! ]).unwrap();
//! let client = PlcClient::new(map, HeaderExpectation::exact(1, 1), 1);
//!
//! let setpoint = client.variable::<f32>("Setpoint").unwrap();
//! setpoint.stage(&client, 21.5).unwrap();
//! assert!(client.variable::<bool>("Setpoint").is_err());
//! ```

use std::marker::PhantomData;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::client::PlcClient;
use crate::error::{PlcError, PlcResult};
use crate::reader::ReadSnapshot;
use crate::value::{Value, ValueType};
use crate::variable_map::VariableMap;

/// Rust types that can stand for a PLC variable
pub trait PlcType: Sized + Send + Sync + 'static {
    /// Whether every value of `ty` can be represented as `Self`
    fn accepts(ty: &ValueType) -> bool;

    fn from_value(value: &Value) -> PlcResult<Self>;

    fn into_value(self) -> Value;
}

fn mismatch<T>(value: &Value) -> PlcError {
    PlcError::conversion(format!(
        "{} value {} cannot be read as {}",
        value.kind(),
        value,
        std::any::type_name::<T>()
    ))
}

/// Integer range of `ty`, looking through enums to their underlying type
fn integer_range_of(ty: &ValueType) -> Option<(i128, i128)> {
    match ty {
        ValueType::Enum(enum_type) => enum_type.underlying.integer_range(),
        other => other.integer_range(),
    }
}

macro_rules! impl_plc_integer {
    ($($ty:ty),* $(,)?) => {
        $(
            impl PlcType for $ty {
                fn accepts(ty: &ValueType) -> bool {
                    integer_range_of(ty).map_or(false, |(min, max)| {
                        min >= <$ty>::MIN as i128 && max <= <$ty>::MAX as i128
                    })
                }

                fn from_value(value: &Value) -> PlcResult<Self> {
                    value
                        .as_i128()
                        .and_then(|v| <$ty>::try_from(v).ok())
                        .ok_or_else(|| mismatch::<$ty>(value))
                }

                fn into_value(self) -> Value {
                    Value::from(self)
                }
            }
        )*
    };
}

impl_plc_integer!(i8, i16, i32, i64, u8, u16, u32, u64);

impl PlcType for bool {
    fn accepts(ty: &ValueType) -> bool {
        matches!(ty, ValueType::Bool)
    }

    fn from_value(value: &Value) -> PlcResult<Self> {
        match value {
            Value::Bool(v) => Ok(*v),
            other => Err(mismatch::<bool>(other)),
        }
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl PlcType for f32 {
    fn accepts(ty: &ValueType) -> bool {
        matches!(ty, ValueType::Float32)
    }

    fn from_value(value: &Value) -> PlcResult<Self> {
        match value {
            Value::Float32(v) => Ok(*v),
            other => Err(mismatch::<f32>(other)),
        }
    }

    fn into_value(self) -> Value {
        Value::Float32(self)
    }
}

impl PlcType for f64 {
    fn accepts(ty: &ValueType) -> bool {
        matches!(ty, ValueType::Float32 | ValueType::Float64)
    }

    fn from_value(value: &Value) -> PlcResult<Self> {
        match value {
            Value::Float32(v) => Ok(*v as f64),
            Value::Float64(v) => Ok(*v),
            other => Err(mismatch::<f64>(other)),
        }
    }

    fn into_value(self) -> Value {
        Value::Float64(self)
    }
}

impl PlcType for Duration {
    fn accepts(ty: &ValueType) -> bool {
        matches!(ty, ValueType::Duration)
    }

    fn from_value(value: &Value) -> PlcResult<Self> {
        match value {
            Value::Duration(d) => Ok(*d),
            other => Err(mismatch::<Duration>(other)),
        }
    }

    fn into_value(self) -> Value {
        Value::Duration(self)
    }
}

impl PlcType for DateTime<Utc> {
    fn accepts(ty: &ValueType) -> bool {
        matches!(ty, ValueType::Timestamp)
    }

    fn from_value(value: &Value) -> PlcResult<Self> {
        match value {
            Value::Timestamp(ts) => Ok(*ts),
            other => Err(mismatch::<DateTime<Utc>>(other)),
        }
    }

    fn into_value(self) -> Value {
        Value::Timestamp(self)
    }
}

/// Strings, and enums by enumerator name
impl PlcType for String {
    fn accepts(ty: &ValueType) -> bool {
        matches!(ty, ValueType::String { .. } | ValueType::Enum(_))
    }

    fn from_value(value: &Value) -> PlcResult<Self> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Enum { name, .. } => Ok(name.clone()),
            other => Err(mismatch::<String>(other)),
        }
    }

    fn into_value(self) -> Value {
        Value::String(self)
    }
}

/// Handle to one variable with a compile-time value type
#[derive(Debug, Clone)]
pub struct TypedVariable<T> {
    name: String,
    value_type: ValueType,
    _marker: PhantomData<fn() -> T>,
}

impl<T: PlcType> TypedVariable<T> {
    /// Resolve `name` in `map` and check its type is representable as `T`
    pub fn bind(map: &VariableMap, name: &str) -> PlcResult<Self> {
        let descriptor = map.lookup(name)?;
        if !T::accepts(&descriptor.value_type) {
            return Err(PlcError::conversion(format!(
                "Variable {} of type {} cannot be bound as {}",
                name,
                descriptor.value_type,
                std::any::type_name::<T>()
            )));
        }
        Ok(Self {
            name: descriptor.name.clone(),
            value_type: descriptor.value_type.clone(),
            _marker: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    /// Value of the variable in `snapshot`, or its decode error
    pub fn get(&self, snapshot: &ReadSnapshot) -> PlcResult<T> {
        if let Some(value) = snapshot.get(&self.name) {
            return T::from_value(value);
        }
        match snapshot.error(&self.name) {
            Some(error) => Err(error.clone()),
            None => Err(PlcError::unknown_variable(self.name.clone())),
        }
    }

    /// Stage a new value on `client`; see [`PlcClient::stage`]
    pub fn stage(&self, client: &PlcClient, value: T) -> PlcResult<bool> {
        client.stage(&self.name, value.into_value())
    }
}
