//! Borrowed by-reference slots

use crate::error::ConversionError;
use crate::heap::{ForeignHeap, SlotHandle};
use crate::registry::ConversionRegistry;
use crate::tag::Tag;
use crate::variant::TaggedValue;

use super::Value;

/// A by-reference value as seen by whoever decoded it.
///
/// The handle does not own the slot; it only knows where the slot is and
/// what it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefHandle {
    /// The slot
    pub slot: SlotHandle,
    /// Tag of the value in the slot (`Variant` for a nested tagged value)
    pub referent: Tag,
}

impl RefHandle {
    /// The by-reference tagged value this handle was decoded from.
    pub fn to_tagged(self) -> TaggedValue {
        TaggedValue::from_slot(self.referent, self.slot)
    }

    /// Decode the value in the slot.
    pub fn deref(
        &self,
        registry: &ConversionRegistry,
        heap: &ForeignHeap,
    ) -> Result<Value, ConversionError> {
        self.to_tagged().read(registry, heap)
    }

    /// Overwrite the value in the slot, clearing what it held. The new value
    /// must encode to the slot's tag unless the slot holds a nested tagged
    /// value.
    pub fn store(
        &self,
        value: &Value,
        registry: &ConversionRegistry,
        heap: &ForeignHeap,
    ) -> Result<(), ConversionError> {
        let mut encoded = registry.encode_value(value, heap)?;
        let accepted = if self.referent.kind() == crate::tag::VarKind::Variant
            && !self.referent.is_array()
        {
            !encoded.tag().is_by_ref()
        } else {
            encoded.tag() == self.referent
        };
        if !accepted {
            let got = encoded.tag();
            encoded.clear(heap)?;
            return Err(ConversionError::TypeMismatch {
                expected: self.referent.to_string(),
                got: got.to_string(),
            });
        }
        let mut old = match heap.store_slot(self.slot, encoded) {
            Ok(old) => old,
            Err(e) => {
                encoded.clear(heap)?;
                return Err(e.into());
            }
        };
        old.clear(heap)?;
        Ok(())
    }
}
