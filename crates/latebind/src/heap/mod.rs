//! Foreign-owned memory
//!
//! Everything a tagged value can point at lives here: length-prefixed
//! strings, arrays, by-reference slots, and the object handles carried by
//! object-typed values. Each table hands out opaque, never-reused 64-bit
//! handles; `0` is the null handle. Freeing a handle twice is reported as
//! an error instead of corrupting anything.

mod array;

pub use array::{ArrayBound, ArrayData, ArrayHandle};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::HeapError;
use crate::object::Interface;
use crate::variant::TaggedValue;

use array::ArrayCell;

/// Handle to a foreign string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StrHandle(pub(crate) u64);

/// Handle to a by-reference slot holding one tagged value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SlotHandle(pub(crate) u64);

/// Handle to an object registered for transport inside a tagged value.
///
/// Each key owns exactly one reference on the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectKey(pub(crate) u64);

macro_rules! handle_impls {
    ($($ty:ident),*) => {$(
        impl $ty {
            /// The null handle.
            pub const NULL: $ty = $ty(0);

            /// Wrap a raw payload.
            pub fn from_raw(raw: u64) -> Self {
                $ty(raw)
            }

            /// The raw payload.
            pub fn raw(self) -> u64 {
                self.0
            }

            /// Check for the null handle
            pub fn is_null(self) -> bool {
                self.0 == 0
            }
        }
    )*};
}

handle_impls!(StrHandle, SlotHandle, ObjectKey);

/// The foreign heap shared by caller and callee.
///
/// Share it as `Arc<ForeignHeap>`; every table is safe for concurrent use.
#[derive(Default)]
pub struct ForeignHeap {
    next: AtomicU64,
    strings: DashMap<u64, Box<[u16]>>,
    slots: DashMap<u64, TaggedValue>,
    pub(crate) arrays: DashMap<u64, Arc<ArrayCell>>,
    objects: DashMap<u64, Interface>,
}

impl ForeignHeap {
    /// Create an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty heap ready to share.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub(crate) fn next_handle(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }

    // ═══════════════════════════════════════════════════════════════════
    // Strings
    // ═══════════════════════════════════════════════════════════════════

    /// Allocate a string from UTF-8 text.
    pub fn alloc_string(&self, text: &str) -> StrHandle {
        let units: Vec<u16> = text.encode_utf16().collect();
        self.alloc_string_len(&units)
    }

    /// Allocate a string holding exactly `units`. Embedded NULs are kept.
    pub fn alloc_string_len(&self, units: &[u16]) -> StrHandle {
        let id = self.next_handle();
        self.strings.insert(id, units.into());
        tracing::trace!(handle = id, len = units.len(), "alloc string");
        StrHandle(id)
    }

    /// Length of a string in UTF-16 units. The null string has length 0.
    pub fn string_len(&self, handle: StrHandle) -> Result<usize, HeapError> {
        if handle.is_null() {
            return Ok(0);
        }
        self.strings
            .get(&handle.0)
            .map(|s| s.len())
            .ok_or(HeapError::InvalidString(handle.0))
    }

    /// Copy out the raw UTF-16 units, using the stored length.
    pub fn string_units(&self, handle: StrHandle) -> Result<Vec<u16>, HeapError> {
        if handle.is_null() {
            return Ok(Vec::new());
        }
        self.strings
            .get(&handle.0)
            .map(|s| s.to_vec())
            .ok_or(HeapError::InvalidString(handle.0))
    }

    /// Copy out a string using its stored length. Unpaired surrogates are
    /// replaced; embedded NULs are preserved.
    pub fn read_string(&self, handle: StrHandle) -> Result<String, HeapError> {
        if handle.is_null() {
            return Ok(String::new());
        }
        self.strings
            .get(&handle.0)
            .map(|s| String::from_utf16_lossy(&s))
            .ok_or(HeapError::InvalidString(handle.0))
    }

    /// Copy out a string up to its first NUL. Only for display paths; use
    /// [`ForeignHeap::read_string`] for anything binary-safe.
    pub fn read_display_string(&self, handle: StrHandle) -> Result<String, HeapError> {
        let units = self.string_units(handle)?;
        let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
        Ok(String::from_utf16_lossy(&units[..end]))
    }

    /// Free a string. Freeing the null string is a no-op; freeing a string
    /// that is not live is an error.
    pub fn free_string(&self, handle: StrHandle) -> Result<(), HeapError> {
        if handle.is_null() {
            return Ok(());
        }
        match self.strings.remove(&handle.0) {
            Some(_) => {
                tracing::trace!(handle = handle.0, "free string");
                Ok(())
            }
            None => Err(HeapError::InvalidString(handle.0)),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // By-reference slots
    // ═══════════════════════════════════════════════════════════════════

    /// Allocate a slot holding `value`. The slot owns what the value owns.
    pub fn alloc_slot(&self, value: TaggedValue) -> SlotHandle {
        let id = self.next_handle();
        self.slots.insert(id, value);
        tracing::trace!(handle = id, tag = %value.tag(), "alloc slot");
        SlotHandle(id)
    }

    /// Read the value in a slot (a bit copy; ownership stays with the slot).
    pub fn load_slot(&self, handle: SlotHandle) -> Result<TaggedValue, HeapError> {
        self.slots
            .get(&handle.0)
            .map(|v| *v)
            .ok_or(HeapError::InvalidSlot(handle.0))
    }

    /// Overwrite a slot, returning the previous value so the caller can
    /// clear it.
    pub fn store_slot(&self, handle: SlotHandle, value: TaggedValue) -> Result<TaggedValue, HeapError> {
        let mut slot = self
            .slots
            .get_mut(&handle.0)
            .ok_or(HeapError::InvalidSlot(handle.0))?;
        Ok(std::mem::replace(&mut *slot, value))
    }

    /// Remove a slot, returning its contents (which the caller now owns).
    pub fn free_slot(&self, handle: SlotHandle) -> Result<TaggedValue, HeapError> {
        let (_, value) = self
            .slots
            .remove(&handle.0)
            .ok_or(HeapError::InvalidSlot(handle.0))?;
        tracing::trace!(handle = handle.0, "free slot");
        Ok(value)
    }

    /// Remove a slot and clear whatever it held.
    pub fn drop_slot(&self, handle: SlotHandle) -> Result<(), HeapError> {
        let mut value = self.free_slot(handle)?;
        value.clear(self)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Object handles
    // ═══════════════════════════════════════════════════════════════════

    /// Register an object for transport. The key adopts one reference the
    /// caller already holds.
    pub fn register_object(&self, object: Interface) -> ObjectKey {
        let id = self.next_handle();
        self.objects.insert(id, object);
        tracing::trace!(handle = id, "register object");
        ObjectKey(id)
    }

    /// Look up a registered object without touching its reference count.
    pub fn object(&self, key: ObjectKey) -> Result<Interface, HeapError> {
        self.objects
            .get(&key.0)
            .map(|o| o.clone())
            .ok_or(HeapError::InvalidObject(key.0))
    }

    /// Drop a key and release the reference it owned. Returns the object's
    /// new reference count.
    pub fn release_object(&self, key: ObjectKey) -> Result<u32, HeapError> {
        let (_, object) = self
            .objects
            .remove(&key.0)
            .ok_or(HeapError::InvalidObject(key.0))?;
        tracing::trace!(handle = key.0, "release object");
        object.release().map_err(|status| {
            tracing::warn!(handle = key.0, %status, "object rejected release");
            HeapError::InvalidObject(key.0)
        })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Whole values
    // ═══════════════════════════════════════════════════════════════════

    /// Deep-copy a tagged value: strings and arrays are duplicated and
    /// object handles acquire a new reference. By-reference values are bit
    /// copies, since they never own their referent.
    pub fn copy_value(&self, value: &TaggedValue) -> Result<TaggedValue, HeapError> {
        let tag = value.tag();
        if tag.is_by_ref() || !tag.owns_payload() || value.payload() == 0 {
            return Ok(*value);
        }
        if tag.is_array() {
            let copy = self.copy_array(ArrayHandle::from_raw(value.payload()))?;
            return Ok(TaggedValue::from_raw_parts(tag, copy.raw()));
        }
        if tag.kind().is_object() {
            let object = self.object(ObjectKey(value.payload()))?;
            object.add_ref();
            let key = self.register_object(object);
            return Ok(TaggedValue::from_raw_parts(tag, key.raw()));
        }
        let units = self.string_units(StrHandle(value.payload()))?;
        let copy = self.alloc_string_len(&units);
        Ok(TaggedValue::from_raw_parts(tag, copy.raw()))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Accounting
    // ═══════════════════════════════════════════════════════════════════

    /// Number of live strings
    pub fn live_strings(&self) -> usize {
        self.strings.len()
    }

    /// Number of live slots
    pub fn live_slots(&self) -> usize {
        self.slots.len()
    }

    /// Number of live arrays
    pub fn live_arrays(&self) -> usize {
        self.arrays.len()
    }

    /// Number of live object keys
    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    /// True when nothing is allocated.
    pub fn is_clean(&self) -> bool {
        self.strings.is_empty()
            && self.slots.is_empty()
            && self.arrays.is_empty()
            && self.objects.is_empty()
    }
}

impl fmt::Debug for ForeignHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignHeap")
            .field("strings", &self.strings.len())
            .field("slots", &self.slots.len())
            .field("arrays", &self.arrays.len())
            .field("objects", &self.objects.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{Tag, VarKind};

    #[test]
    fn test_string_round_trip() {
        let heap = ForeignHeap::new();
        let s = heap.alloc_string("héllo");
        assert_eq!(heap.read_string(s).unwrap(), "héllo");
        assert_eq!(heap.string_len(s).unwrap(), 5);
        heap.free_string(s).unwrap();
        assert!(heap.is_clean());
    }

    #[test]
    fn test_string_is_binary_safe() {
        let heap = ForeignHeap::new();
        let units: Vec<u16> = "a\0b".encode_utf16().collect();
        let s = heap.alloc_string_len(&units);
        assert_eq!(heap.read_string(s).unwrap(), "a\0b");
        assert_eq!(heap.read_display_string(s).unwrap(), "a");
        heap.free_string(s).unwrap();
    }

    #[test]
    fn test_double_free_detected() {
        let heap = ForeignHeap::new();
        let s = heap.alloc_string("x");
        heap.free_string(s).unwrap();
        assert_eq!(heap.free_string(s), Err(HeapError::InvalidString(s.raw())));
        assert!(heap.read_string(s).is_err());
    }

    #[test]
    fn test_null_string() {
        let heap = ForeignHeap::new();
        assert_eq!(heap.read_string(StrHandle::NULL).unwrap(), "");
        assert_eq!(heap.string_len(StrHandle::NULL).unwrap(), 0);
        assert!(heap.free_string(StrHandle::NULL).is_ok());
    }

    #[test]
    fn test_slots() {
        let heap = ForeignHeap::new();
        let slot = heap.alloc_slot(TaggedValue::from_i32(1));
        let old = heap.store_slot(slot, TaggedValue::from_i32(2)).unwrap();
        assert_eq!(old, TaggedValue::from_i32(1));
        assert_eq!(heap.load_slot(slot).unwrap(), TaggedValue::from_i32(2));
        assert_eq!(heap.free_slot(slot).unwrap(), TaggedValue::from_i32(2));
        assert!(heap.load_slot(slot).is_err());
    }

    #[test]
    fn test_copy_value_duplicates_strings() {
        let heap = ForeignHeap::new();
        let s = heap.alloc_string("copy me");
        let original = TaggedValue::from_raw_parts(Tag::new(VarKind::String), s.raw());
        let copy = heap.copy_value(&original).unwrap();
        assert_ne!(copy.payload(), original.payload());
        assert_eq!(heap.live_strings(), 2);
        assert_eq!(
            heap.read_string(StrHandle::from_raw(copy.payload())).unwrap(),
            "copy me"
        );
    }

    #[test]
    fn test_handles_are_never_null() {
        let heap = ForeignHeap::new();
        assert!(!heap.alloc_string("").is_null());
        assert!(!heap.alloc_slot(TaggedValue::init()).is_null());
    }
}
