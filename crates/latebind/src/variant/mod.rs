//! Tagged values
//!
//! A [`TaggedValue`] is a tag plus a 64-bit payload. Copying one copies the
//! bits only: whatever the payload owns (a string, an array, an object
//! reference) still has exactly one owner, and only that owner may call
//! [`TaggedValue::clear`]. Use [`OwnedValue`] when a value should clean up
//! after itself.

mod display;
mod owned;

pub use owned::OwnedValue;

use crate::error::{ConversionError, HeapError};
use crate::heap::{ArrayHandle, ForeignHeap, ObjectKey, SlotHandle, StrHandle};
use crate::registry::ConversionRegistry;
use crate::tag::{Tag, VarKind};
use crate::value::{Currency, Date, ErrorCode, Value};

/// Payload of an automation `true`.
pub const BOOL_TRUE: u64 = 0xffff;

/// A tag and its payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TaggedValue {
    tag: Tag,
    payload: u64,
}

fn mismatch(expected: Tag, got: Tag) -> ConversionError {
    ConversionError::TypeMismatch {
        expected: expected.to_string(),
        got: got.to_string(),
    }
}

macro_rules! scalar_ctors {
    ($($ctor:ident, $reader:ident, $ty:ty, $kind:ident, $to:expr, $from:expr;)*) => {$(
        #[doc = concat!("A `", stringify!($kind), "` value.")]
        pub fn $ctor(v: $ty) -> Self {
            let to: fn($ty) -> u64 = $to;
            TaggedValue::from_raw_parts(Tag::new(VarKind::$kind), to(v))
        }

        #[doc = concat!("Read a `", stringify!($kind), "` payload.")]
        pub fn $reader(&self) -> Result<$ty, ConversionError> {
            self.expect(Tag::new(VarKind::$kind))?;
            let from: fn(u64) -> $ty = $from;
            Ok(from(self.payload))
        }
    )*};
}

impl TaggedValue {
    /// An empty value.
    pub fn init() -> Self {
        TaggedValue::default()
    }

    /// The null value.
    pub fn null() -> Self {
        TaggedValue::from_raw_parts(Tag::NULL, 0)
    }

    /// Assemble a value from its parts. The caller is responsible for the
    /// payload matching the tag.
    pub fn from_raw_parts(tag: Tag, payload: u64) -> Self {
        TaggedValue { tag, payload }
    }

    /// The tag
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// The raw payload
    pub fn payload(&self) -> u64 {
        self.payload
    }

    /// Check for the empty tag
    pub fn is_empty(&self) -> bool {
        self.tag.is_empty()
    }

    /// Check for the null tag
    pub fn is_null(&self) -> bool {
        self.tag.is_null()
    }

    fn expect(&self, tag: Tag) -> Result<(), ConversionError> {
        if self.tag == tag {
            Ok(())
        } else {
            Err(mismatch(tag, self.tag))
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Scalars
    // ═══════════════════════════════════════════════════════════════════

    /// A `Bool` value, stored as the 16-bit automation boolean.
    pub fn from_bool(v: bool) -> Self {
        TaggedValue::from_raw_parts(Tag::new(VarKind::Bool), if v { BOOL_TRUE } else { 0 })
    }

    /// Read a `Bool` payload. Any non-zero payload is true.
    pub fn as_bool(&self) -> Result<bool, ConversionError> {
        self.expect(Tag::new(VarKind::Bool))?;
        Ok(self.payload & BOOL_TRUE != 0)
    }

    scalar_ctors! {
        from_i8, as_i8, i8, I8, |v| i64::from(v) as u64, |p| p as i8;
        from_i16, as_i16, i16, I16, |v| i64::from(v) as u64, |p| p as i16;
        from_i32, as_i32, i32, I32, |v| i64::from(v) as u64, |p| p as i32;
        from_i64, as_i64, i64, I64, |v| v as u64, |p| p as i64;
        from_u8, as_u8, u8, U8, u64::from, |p| p as u8;
        from_u16, as_u16, u16, U16, u64::from, |p| p as u16;
        from_u32, as_u32, u32, U32, u64::from, |p| p as u32;
        from_u64, as_u64, u64, U64, |v| v, |p| p;
        from_f32, as_f32, f32, F32, |v| u64::from(v.to_bits()), |p| f32::from_bits(p as u32);
        from_f64, as_f64, f64, F64, f64::to_bits, f64::from_bits;
        from_currency, as_currency, Currency, Currency, |v| v.0 as u64, |p| Currency(p as i64);
        from_date, as_date, Date, Date, |v| v.0.to_bits(), |p| Date(f64::from_bits(p));
        from_error, as_error, ErrorCode, Error, |v| u64::from(v.0), |p| ErrorCode(p as u32);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Handles
    // ═══════════════════════════════════════════════════════════════════

    /// A `String` value owning `handle`.
    pub fn from_string_handle(handle: StrHandle) -> Self {
        TaggedValue::from_raw_parts(Tag::new(VarKind::String), handle.raw())
    }

    /// An array value owning `handle`.
    pub fn from_array(elem: VarKind, handle: ArrayHandle) -> Self {
        TaggedValue::from_raw_parts(Tag::array_of(elem), handle.raw())
    }

    /// An object value (`Unknown` or `Dispatch`) owning `key`.
    pub fn from_object(kind: VarKind, key: ObjectKey) -> Self {
        TaggedValue::from_raw_parts(Tag::new(kind), key.raw())
    }

    /// A by-reference value pointing at `slot`, which holds a `referent`.
    pub fn from_slot(referent: Tag, slot: SlotHandle) -> Self {
        TaggedValue::from_raw_parts(referent.by_ref(), slot.raw())
    }

    /// The string handle of a `String` value.
    pub fn string_handle(&self) -> Result<StrHandle, ConversionError> {
        self.expect(Tag::new(VarKind::String))?;
        Ok(StrHandle::from_raw(self.payload))
    }

    /// The array handle of an array value.
    pub fn array_handle(&self) -> Result<ArrayHandle, ConversionError> {
        if self.tag.is_array() && !self.tag.is_by_ref() {
            Ok(ArrayHandle::from_raw(self.payload))
        } else {
            Err(mismatch(Tag::array_of(self.tag.kind()), self.tag))
        }
    }

    /// The object key of an object value.
    pub fn object_key(&self) -> Result<ObjectKey, ConversionError> {
        if self.tag.kind().is_object() && !self.tag.is_array() && !self.tag.is_by_ref() {
            Ok(ObjectKey::from_raw(self.payload))
        } else {
            Err(mismatch(Tag::new(VarKind::Unknown), self.tag))
        }
    }

    /// The slot handle of a by-reference value.
    pub fn slot_handle(&self) -> Result<SlotHandle, ConversionError> {
        if self.tag.is_by_ref() {
            Ok(SlotHandle::from_raw(self.payload))
        } else {
            Err(mismatch(self.tag.by_ref(), self.tag))
        }
    }

    /// Copy out a `String` payload.
    pub fn read_string(&self, heap: &ForeignHeap) -> Result<String, ConversionError> {
        Ok(heap.read_string(self.string_handle()?)?)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════

    /// Release whatever the payload owns and reset to empty.
    ///
    /// Clearing an empty value, a scalar, or a by-reference value releases
    /// nothing. If the release itself fails (a locked array, a stale
    /// handle), the value is left untouched and the error returned.
    pub fn clear(&mut self, heap: &ForeignHeap) -> Result<(), HeapError> {
        let old = std::mem::take(self);
        if !old.tag.owns_payload() || old.payload == 0 {
            return Ok(());
        }
        let released = if old.tag.is_array() {
            heap.destroy_array(ArrayHandle::from_raw(old.payload))
        } else if old.tag.kind().is_object() {
            heap.release_object(ObjectKey::from_raw(old.payload)).map(|_| ())
        } else {
            heap.free_string(StrHandle::from_raw(old.payload))
        };
        if released.is_err() {
            *self = old;
        }
        released
    }

    /// Move the value out, leaving empty behind.
    pub fn take(&mut self) -> TaggedValue {
        std::mem::take(self)
    }

    /// Follow one level of indirection. The result is a bit copy; the slot
    /// keeps ownership of its contents.
    pub fn deref_slot(&self, heap: &ForeignHeap) -> Result<TaggedValue, ConversionError> {
        let slot = self.slot_handle()?;
        let inner = heap.load_slot(slot)?;
        let referent = self.tag.deref();
        if referent.kind() == VarKind::Variant && !referent.is_array() {
            if inner.tag.is_by_ref() {
                return Err(mismatch(Tag::EMPTY, inner.tag));
            }
            return Ok(inner);
        }
        if inner.tag != referent {
            return Err(mismatch(referent, inner.tag));
        }
        Ok(inner)
    }

    /// Decode into a native value, following one indirection first for
    /// by-reference tags.
    pub fn read(
        &self,
        registry: &ConversionRegistry,
        heap: &ForeignHeap,
    ) -> Result<Value, ConversionError> {
        if self.tag.is_by_ref() {
            let inner = self.deref_slot(heap)?;
            return registry.decode(&inner, heap);
        }
        registry.decode(self, heap)
    }
}
