//! Built-in conversions
//!
//! Covers every scalar kind and its by-reference form, strings, both object
//! kinds, nested tagged values by reference, and arrays of any element kind.

use chrono::NaiveDateTime;

use crate::error::ConversionError;
use crate::heap::ArrayHandle;
use crate::invoke::Dispatch;
use crate::object::{Object, ObjectRef};
use crate::tag::{Tag, VarKind};
use crate::value::{ArrayValue, ByRef, Currency, Date, Empty, ErrorCode, RefHandle, Value, VariantRef};
use crate::variant::TaggedValue;

use super::{CodecContext, ConversionRegistry};

pub(super) fn install(registry: &ConversionRegistry) {
    install_scalars(registry);
    install_strings(registry);
    install_objects(registry);
    install_references(registry);
    install_arrays(registry);
}

fn by_ref_decoder(value: &TaggedValue, _: &CodecContext<'_>) -> Result<Value, ConversionError> {
    Ok(Value::Ref(RefHandle {
        slot: value.slot_handle()?,
        referent: value.tag().deref(),
    }))
}

/// Encode `inner` into a fresh slot and return a by-reference value
/// pointing at it. The caller owns the slot.
fn into_slot(inner: TaggedValue, cx: &CodecContext<'_>) -> TaggedValue {
    let referent = inner.tag();
    let slot = cx.heap.alloc_slot(inner);
    TaggedValue::from_slot(referent, slot)
}

macro_rules! scalar {
    ($registry:expr, $($ty:ty => $kind:ident, $ctor:ident, $reader:ident, $variant:ident;)*) => {$(
        $registry.register_type(
            Tag::new(VarKind::$kind),
            |v: &$ty, _| Ok(TaggedValue::$ctor(*v)),
            |v, _| Ok(Value::$variant(v.$reader()?)),
        );
        $registry.register_encoder(
            Tag::new(VarKind::$kind).by_ref(),
            |v: &ByRef<$ty>, cx| Ok(into_slot(TaggedValue::$ctor(v.0), cx)),
        );
        $registry.register_decoder(Tag::new(VarKind::$kind).by_ref(), by_ref_decoder);
    )*};
}

fn install_scalars(registry: &ConversionRegistry) {
    scalar! { registry,
        bool => Bool, from_bool, as_bool, Bool;
        i8 => I8, from_i8, as_i8, I8;
        i16 => I16, from_i16, as_i16, I16;
        i32 => I32, from_i32, as_i32, I32;
        i64 => I64, from_i64, as_i64, I64;
        u8 => U8, from_u8, as_u8, U8;
        u16 => U16, from_u16, as_u16, U16;
        u32 => U32, from_u32, as_u32, U32;
        u64 => U64, from_u64, as_u64, U64;
        f32 => F32, from_f32, as_f32, F32;
        f64 => F64, from_f64, as_f64, F64;
        Currency => Currency, from_currency, as_currency, Currency;
        Date => Date, from_date, as_date, Date;
        ErrorCode => Error, from_error, as_error, Error;
    }

    registry.register_type(
        Tag::EMPTY,
        |_: &Empty, _| Ok(TaggedValue::init()),
        |_, _| Ok(Value::Empty),
    );
    registry.register_decoder(Tag::NULL, |_, _| Ok(Value::Null));
    registry.register_encoder(Tag::new(VarKind::Date), |v: &NaiveDateTime, _| {
        Ok(TaggedValue::from_date(Date::from_datetime(*v)?))
    });
}

fn install_strings(registry: &ConversionRegistry) {
    registry.register_type(
        Tag::new(VarKind::String),
        |s: &String, cx| Ok(TaggedValue::from_string_handle(cx.heap.alloc_string(s))),
        |v, cx| Ok(Value::string(v.read_string(cx.heap)?)),
    );
    registry.register_encoder(Tag::new(VarKind::String), |s: &&'static str, cx| {
        Ok(TaggedValue::from_string_handle(cx.heap.alloc_string(s)))
    });
    registry.register_encoder(Tag::new(VarKind::String).by_ref(), |s: &ByRef<String>, cx| {
        let inner = TaggedValue::from_string_handle(cx.heap.alloc_string(&s.0));
        Ok(into_slot(inner, cx))
    });
    registry.register_decoder(Tag::new(VarKind::String).by_ref(), by_ref_decoder);
}

fn object_error(expected: VarKind, status: crate::error::Status) -> ConversionError {
    ConversionError::TypeMismatch {
        expected: expected.to_string(),
        got: status.to_string(),
    }
}

fn install_objects(registry: &ConversionRegistry) {
    registry.register_type(
        Tag::new(VarKind::Unknown),
        |o: &ObjectRef<dyn Object>, cx| {
            let key = cx.heap.register_object(o.clone().into_interface());
            Ok(TaggedValue::from_object(VarKind::Unknown, key))
        },
        |v, cx| {
            let key = v.object_key()?;
            if key.is_null() {
                return Ok(Value::Null);
            }
            let object = cx.heap.object(key)?;
            let unknown = object
                .to_unknown()
                .map_err(|status| object_error(VarKind::Unknown, status))?;
            Ok(Value::Object(unknown))
        },
    );
    registry.register_type(
        Tag::new(VarKind::Dispatch),
        |d: &ObjectRef<dyn Dispatch>, cx| {
            let key = cx.heap.register_object(d.clone().into_interface());
            Ok(TaggedValue::from_object(VarKind::Dispatch, key))
        },
        |v, cx| {
            let key = v.object_key()?;
            if key.is_null() {
                return Ok(Value::Null);
            }
            let object = cx.heap.object(key)?;
            let dispatch = object
                .to_dispatch()
                .map_err(|status| object_error(VarKind::Dispatch, status))?;
            Ok(Value::Dispatch(dispatch))
        },
    );
    for kind in [VarKind::Unknown, VarKind::Dispatch] {
        registry.register_decoder(Tag::new(kind).by_ref(), by_ref_decoder);
    }
}

fn install_references(registry: &ConversionRegistry) {
    // A nested tagged value by reference: the slot holds a whole value
    registry.register_encoder(Tag::new(VarKind::Variant).by_ref(), |v: &VariantRef, cx| {
        let nested = || ConversionError::TypeMismatch {
            expected: "a value, not a reference".to_string(),
            got: v.0.type_name().to_string(),
        };
        if matches!(v.0, Value::Ref(_)) {
            return Err(nested());
        }
        let inner = cx.registry.encode_value(&v.0, cx.heap)?;
        if inner.tag().is_by_ref() {
            // freshly allocated by the inner encoder, so ours to drop
            cx.heap.drop_slot(inner.slot_handle()?)?;
            return Err(nested());
        }
        let slot = cx.heap.alloc_slot(inner);
        Ok(TaggedValue::from_slot(Tag::new(VarKind::Variant), slot))
    });
    registry.register_decoder(Tag::new(VarKind::Variant).by_ref(), by_ref_decoder);

    // An existing slot passed back through without taking ownership
    registry.register_encoder(Tag::new(VarKind::Variant).by_ref(), |r: &RefHandle, _| {
        Ok(r.to_tagged())
    });
}

fn install_arrays(registry: &ConversionRegistry) {
    registry.register_type(
        Tag::array_of(VarKind::Variant),
        |a: &ArrayValue, cx| {
            let handle = cx.registry.array_from_value(cx.heap, a)?;
            Ok(TaggedValue::from_array(a.kind, handle))
        },
        decode_array,
    );
    for kind in VarKind::ALL {
        let tag = Tag::array_of(kind);
        if tag.is_valid() {
            registry.register_decoder(tag, decode_array);
            registry.register_decoder(tag.by_ref(), by_ref_decoder);
        }
    }

    registry.register_encoder(Tag::array_of(VarKind::U8), |bytes: &Vec<u8>, cx| {
        let handle = cx.registry.array_from_bytes(cx.heap, bytes)?;
        Ok(TaggedValue::from_array(VarKind::U8, handle))
    });
    registry.register_encoder(Tag::array_of(VarKind::String), |strings: &Vec<String>, cx| {
        let items: Vec<Value> = strings.iter().map(|s| Value::string(s.as_str())).collect();
        let handle = cx.registry.array_from_values(cx.heap, VarKind::String, &items)?;
        Ok(TaggedValue::from_array(VarKind::String, handle))
    });
    registry.register_encoder(Tag::array_of(VarKind::Variant), |items: &Vec<Value>, cx| {
        let handle = cx.registry.array_from_values(cx.heap, VarKind::Variant, items)?;
        Ok(TaggedValue::from_array(VarKind::Variant, handle))
    });
}

fn decode_array(value: &TaggedValue, cx: &CodecContext<'_>) -> Result<Value, ConversionError> {
    let handle: ArrayHandle = value.array_handle()?;
    Ok(Value::array(cx.registry.array_to_value(cx.heap, handle)?))
}
