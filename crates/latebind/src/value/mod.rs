//! Native values: the caller-side view of what a tagged value holds

mod array;
mod display;
mod impls;
mod refs;
mod scalars;

pub use array::ArrayValue;
pub use refs::RefHandle;
pub use scalars::{
    ByRef, Currency, Date, Empty, ErrorCode, VariantRef, CURRENCY_SCALE, MAX_DATE, MIN_DATE,
    PARAM_NOT_FOUND,
};

use std::any::Any;
use std::sync::Arc;

use crate::invoke::Dispatch;
use crate::object::{Object, ObjectRef};

/// A decoded value.
///
/// Values are organized into three tiers:
/// - Tier 1: Inline scalars (no foreign memory involved)
/// - Tier 2: Owned copies of foreign data (strings, arrays) and object
///   references that hold their own reference count
/// - Tier 3: Borrowed by-reference slots and caller-registered native types
#[derive(Clone)]
pub enum Value {
    // ═══════════════════════════════════════════════════════════════════
    // Tier 1: Inline Scalars
    // ═══════════════════════════════════════════════════════════════════
    /// No value (the result of a member with no return)
    Empty,

    /// Explicit null
    Null,

    /// Boolean
    Bool(bool),

    // Signed integers
    /// 8-bit signed integer
    I8(i8),
    /// 16-bit signed integer
    I16(i16),
    /// 32-bit signed integer
    I32(i32),
    /// 64-bit signed integer
    I64(i64),

    // Unsigned integers
    /// 8-bit unsigned integer
    U8(u8),
    /// 16-bit unsigned integer
    U16(u16),
    /// 32-bit unsigned integer
    U32(u32),
    /// 64-bit unsigned integer
    U64(u64),

    // Floating point
    /// 32-bit floating point
    F32(f32),
    /// 64-bit floating point
    F64(f64),

    /// Scaled fixed-point currency
    Currency(Currency),

    /// Day-offset date
    Date(Date),

    /// Status code carried as a value
    Error(ErrorCode),

    // ═══════════════════════════════════════════════════════════════════
    // Tier 2: Owned Data and Object References
    // ═══════════════════════════════════════════════════════════════════
    /// String copied out of foreign memory
    String(Arc<String>),

    /// Array copied out of foreign memory
    Array(Arc<ArrayValue>),

    /// Plain object reference
    Object(ObjectRef<dyn Object>),

    /// Dispatchable object reference
    Dispatch(ObjectRef<dyn Dispatch>),

    // ═══════════════════════════════════════════════════════════════════
    // Tier 3: Borrowed Slots and Registered Types
    // ═══════════════════════════════════════════════════════════════════
    /// A by-reference slot the value does not own
    Ref(RefHandle),

    /// Any native type with a registered conversion
    Custom(Arc<dyn Any + Send + Sync>),
}

static EMPTY: Empty = Empty;

impl Value {
    /// The native value the conversion registry keys on, or `None` for
    /// null (which always encodes to the null tag).
    pub fn as_native(&self) -> Option<&dyn Any> {
        let native: &dyn Any = match self {
            Value::Null => return None,
            Value::Empty => &EMPTY,
            Value::Bool(v) => v,
            Value::I8(v) => v,
            Value::I16(v) => v,
            Value::I32(v) => v,
            Value::I64(v) => v,
            Value::U8(v) => v,
            Value::U16(v) => v,
            Value::U32(v) => v,
            Value::U64(v) => v,
            Value::F32(v) => v,
            Value::F64(v) => v,
            Value::Currency(v) => v,
            Value::Date(v) => v,
            Value::Error(v) => v,
            Value::String(v) => &**v,
            Value::Array(v) => &**v,
            Value::Object(v) => v,
            Value::Dispatch(v) => v,
            Value::Ref(v) => v,
            Value::Custom(v) => &**v,
        };
        Some(native)
    }

    /// Short name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Empty => "Empty",
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::I8(_) => "I8",
            Value::I16(_) => "I16",
            Value::I32(_) => "I32",
            Value::I64(_) => "I64",
            Value::U8(_) => "U8",
            Value::U16(_) => "U16",
            Value::U32(_) => "U32",
            Value::U64(_) => "U64",
            Value::F32(_) => "F32",
            Value::F64(_) => "F64",
            Value::Currency(_) => "Currency",
            Value::Date(_) => "Date",
            Value::Error(_) => "Error",
            Value::String(_) => "String",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
            Value::Dispatch(_) => "Dispatch",
            Value::Ref(_) => "Ref",
            Value::Custom(_) => "Custom",
        }
    }
}
