use std::fmt;

use crate::tag::VarKind;

use super::TaggedValue;

impl fmt::Debug for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.tag();
        if tag.is_by_ref() || tag.is_array() {
            return write!(f, "{}(#{:x})", tag, self.payload());
        }
        match tag.kind() {
            VarKind::Empty | VarKind::Null => write!(f, "{}", tag),
            VarKind::Bool => write!(f, "Bool({})", self.payload() != 0),
            VarKind::I8 | VarKind::I16 | VarKind::I32 | VarKind::I64 => {
                write!(f, "{}({})", tag, self.payload() as i64)
            }
            VarKind::F32 => write!(f, "F32({:?})", f32::from_bits(self.payload() as u32)),
            VarKind::F64 => write!(f, "F64({:?})", f64::from_bits(self.payload())),
            VarKind::Currency => write!(f, "Currency({})", crate::value::Currency(self.payload() as i64)),
            VarKind::Date => write!(f, "Date({})", f64::from_bits(self.payload())),
            VarKind::Error => write!(f, "Error({:#010x})", self.payload() as u32),
            VarKind::String | VarKind::Dispatch | VarKind::Unknown | VarKind::Variant => {
                write!(f, "{}(#{:x})", tag, self.payload())
            }
            _ => write!(f, "{}({})", tag, self.payload()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::Tag;

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", TaggedValue::from_i32(-4)), "I32(-4)");
        assert_eq!(format!("{:?}", TaggedValue::from_f64(1.5)), "F64(1.5)");
        assert_eq!(format!("{:?}", TaggedValue::init()), "Empty");
        assert_eq!(
            format!("{:?}", TaggedValue::from_raw_parts(Tag::new(VarKind::String), 0x1f)),
            "String(#1f)"
        );
    }
}
