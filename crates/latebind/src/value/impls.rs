//! Value trait implementations: constructors, predicates, extractors, From traits, PartialEq

use std::any::Any;
use std::sync::Arc;

use super::*;
use crate::tag::VarKind;

// ═══════════════════════════════════════════════════════════════════
// Convenience Constructors
// ═══════════════════════════════════════════════════════════════════

impl Value {
    /// Create a string value
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(Arc::new(s.into()))
    }

    /// Create an array value
    pub fn array(a: ArrayValue) -> Self {
        Value::Array(Arc::new(a))
    }

    /// Create a zero-based, one-dimensional array value
    pub fn vector(kind: VarKind, items: Vec<Value>) -> Self {
        Value::array(ArrayValue::vector(kind, items))
    }

    /// Wrap any native type that has a registered conversion
    pub fn native<T: Any + Send + Sync>(v: T) -> Self {
        Value::Custom(Arc::new(v))
    }

    /// Pass `v` by reference; the callee sees a slot of `v`'s tag
    pub fn by_ref<T: Any + Send + Sync>(v: T) -> Self {
        Value::native(ByRef(v))
    }

    /// Pass a whole tagged value by reference
    pub fn variant_ref(inner: Value) -> Self {
        Value::native(VariantRef(inner))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Type Predicates
    // ═══════════════════════════════════════════════════════════════════
    /// Check if value is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if value is any integer type
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Value::I8(_)
                | Value::I16(_)
                | Value::I32(_)
                | Value::I64(_)
                | Value::U8(_)
                | Value::U16(_)
                | Value::U32(_)
                | Value::U64(_)
        )
    }

    /// Check if value is any float type
    pub fn is_float(&self) -> bool {
        matches!(self, Value::F32(_) | Value::F64(_))
    }

    /// Check if value is a string
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Check if value is an object reference of either kind
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Dispatch(_))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Extractors
    // ═══════════════════════════════════════════════════════════════════

    /// Extract boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract as i64 (converts from any integer type that fits)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I8(n) => Some(i64::from(*n)),
            Value::I16(n) => Some(i64::from(*n)),
            Value::I32(n) => Some(i64::from(*n)),
            Value::I64(n) => Some(*n),
            Value::U8(n) => Some(i64::from(*n)),
            Value::U16(n) => Some(i64::from(*n)),
            Value::U32(n) => Some(i64::from(*n)),
            Value::U64(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Extract as f64 (converts from f32, integers and currency)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F32(n) => Some(f64::from(*n)),
            Value::F64(n) => Some(*n),
            Value::Currency(c) => Some(c.to_f64()),
            other => other.as_i64().map(|n| n as f64),
        }
    }

    /// Extract string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Extract an array
    pub fn as_array(&self) -> Option<&ArrayValue> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Extract a dispatch reference
    pub fn as_dispatch(&self) -> Option<&ObjectRef<dyn Dispatch>> {
        match self {
            Value::Dispatch(d) => Some(d),
            _ => None,
        }
    }

    /// Extract a plain object reference
    pub fn as_object(&self) -> Option<&ObjectRef<dyn Object>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Extract a registered native value of type `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Custom(v) => v.downcast_ref::<T>(),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// PartialEq
// ═══════════════════════════════════════════════════════════════════

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Empty, Value::Empty) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,

            (Value::I8(a), Value::I8(b)) => a == b,
            (Value::I16(a), Value::I16(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,

            (Value::U8(a), Value::U8(b)) => a == b,
            (Value::U16(a), Value::U16(b)) => a == b,
            (Value::U32(a), Value::U32(b)) => a == b,
            (Value::U64(a), Value::U64(b)) => a == b,

            (Value::F32(a), Value::F32(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,

            (Value::Currency(a), Value::Currency(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,

            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,

            // Objects compare by identity
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Dispatch(a), Value::Dispatch(b)) => a.ptr_eq(b),

            (Value::Ref(a), Value::Ref(b)) => a == b,
            (Value::Custom(a), Value::Custom(b)) => Arc::ptr_eq(a, b),

            _ => false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// From Implementations
// ═══════════════════════════════════════════════════════════════════

macro_rules! from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        }
    )*};
}

from_scalar! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Currency => Currency,
    Date => Date,
    ErrorCode => Error,
    RefHandle => Ref,
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::new(s))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::new(s.to_string()))
    }
}

impl From<ArrayValue> for Value {
    fn from(a: ArrayValue) -> Self {
        Value::Array(Arc::new(a))
    }
}

impl From<ObjectRef<dyn Object>> for Value {
    fn from(o: ObjectRef<dyn Object>) -> Self {
        Value::Object(o)
    }
}

impl From<ObjectRef<dyn Dispatch>> for Value {
    fn from(d: ObjectRef<dyn Dispatch>) -> Self {
        Value::Dispatch(d)
    }
}

impl From<Empty> for Value {
    fn from(_: Empty) -> Self {
        Value::Empty
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_constructor() {
        let v = Value::string("hello");
        assert_eq!(v.as_str(), Some("hello"));
        assert!(v.is_string());
    }

    #[test]
    fn test_as_i64_widens() {
        assert_eq!(Value::I8(-3).as_i64(), Some(-3));
        assert_eq!(Value::U32(7).as_i64(), Some(7));
        assert_eq!(Value::U64(u64::MAX).as_i64(), None);
        assert_eq!(Value::F64(1.0).as_i64(), None);
    }

    #[test]
    fn test_as_f64() {
        assert_eq!(Value::F32(0.5).as_f64(), Some(0.5));
        assert_eq!(Value::Currency(Currency(25_000)).as_f64(), Some(2.5));
        assert_eq!(Value::I32(2).as_f64(), Some(2.0));
    }

    #[test]
    fn test_partialeq_is_typed() {
        assert_eq!(Value::I32(1), Value::I32(1));
        assert_ne!(Value::I32(1), Value::I64(1));
        assert_ne!(Value::Empty, Value::Null);
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some(5i32)), Value::I32(5));
    }

    #[test]
    fn test_native_round_trip() {
        let v = Value::by_ref(7i32);
        let inner = v.downcast_ref::<ByRef<i32>>();
        assert_eq!(inner, Some(&ByRef(7)));
        assert!(v.as_native().is_some());
    }

    #[test]
    fn test_null_has_no_native() {
        assert!(Value::Null.as_native().is_none());
        assert!(Value::Empty.as_native().is_some());
    }
}
