//! Display and Debug implementations for Value

use std::fmt;

use super::*;

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => write!(f, "Empty"),
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "{}", b),

            Value::I8(n) => write!(f, "{}i8", n),
            Value::I16(n) => write!(f, "{}i16", n),
            Value::I32(n) => write!(f, "{}i32", n),
            Value::I64(n) => write!(f, "{}i64", n),

            Value::U8(n) => write!(f, "{}u8", n),
            Value::U16(n) => write!(f, "{}u16", n),
            Value::U32(n) => write!(f, "{}u32", n),
            Value::U64(n) => write!(f, "{}u64", n),

            Value::F32(n) => write!(f, "{:?}f32", n),
            Value::F64(n) => write!(f, "{:?}f64", n),

            Value::Currency(c) => write!(f, "Currency({})", c),
            Value::Date(d) => write!(f, "Date({})", d),
            Value::Error(e) => write!(f, "Error({:#010x})", e.0),

            Value::String(s) => write!(f, "{:?}", s.as_ref()),
            Value::Array(a) => {
                write!(f, "Array<{}>[", a.kind)?;
                for (i, item) in a.items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}", item)?;
                }
                write!(f, "]")
            }

            Value::Object(o) => write!(f, "Object({:?})", o),
            Value::Dispatch(d) => write!(f, "Dispatch({:?})", d),
            Value::Ref(r) => write!(f, "Ref({}, #{:x})", r.referent, r.slot.raw()),
            Value::Custom(_) => write!(f, "<custom>"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::I8(n) => write!(f, "{}", n),
            Value::I16(n) => write!(f, "{}", n),
            Value::I32(n) => write!(f, "{}", n),
            Value::I64(n) => write!(f, "{}", n),
            Value::U8(n) => write!(f, "{}", n),
            Value::U16(n) => write!(f, "{}", n),
            Value::U32(n) => write!(f, "{}", n),
            Value::U64(n) => write!(f, "{}", n),
            Value::F32(n) => write!(f, "{}", n),
            Value::F64(n) => write!(f, "{}", n),
            Value::Currency(c) => write!(f, "{}", c),
            Value::Date(d) => write!(f, "{}", d),
            Value::Error(e) => write!(f, "error {:#010x}", e.0),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(a) => {
                write!(f, "[")?;
                for (i, item) in a.items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Object(_) => write!(f, "<object>"),
            Value::Dispatch(_) => write!(f, "<dispatch>"),
            Value::Ref(r) => write!(f, "<ref {}>", r.referent),
            Value::Custom(_) => write!(f, "<custom>"),
        }
    }
}
