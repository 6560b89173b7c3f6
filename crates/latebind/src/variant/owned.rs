use std::fmt;
use std::sync::Arc;

use crate::error::{ConversionError, HeapError};
use crate::heap::ForeignHeap;
use crate::registry::ConversionRegistry;
use crate::value::Value;

use super::TaggedValue;

/// A tagged value that clears itself when dropped.
///
/// Call results come back wrapped in this so that ignoring a result never
/// leaks the string, array, or object reference it carries.
pub struct OwnedValue {
    raw: TaggedValue,
    heap: Arc<ForeignHeap>,
    registry: Arc<ConversionRegistry>,
}

impl OwnedValue {
    /// Take ownership of `raw`.
    pub fn new(raw: TaggedValue, heap: Arc<ForeignHeap>, registry: Arc<ConversionRegistry>) -> Self {
        OwnedValue { raw, heap, registry }
    }

    /// Decode into a native value. The tagged value stays owned here.
    pub fn value(&self) -> Result<Value, ConversionError> {
        self.raw.read(&self.registry, &self.heap)
    }

    /// Borrow the raw tagged value
    pub fn raw(&self) -> &TaggedValue {
        &self.raw
    }

    /// Give up ownership; the caller must clear the returned value.
    pub fn into_raw(mut self) -> TaggedValue {
        self.raw.take()
    }

    /// Clear now, surfacing any release failure.
    pub fn clear(&mut self) -> Result<(), HeapError> {
        self.raw.clear(&self.heap)
    }
}

impl Drop for OwnedValue {
    fn drop(&mut self) {
        if let Err(e) = self.raw.clear(&self.heap) {
            tracing::warn!(error = %e, "failed to clear dropped value");
        }
    }
}

impl fmt::Debug for OwnedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OwnedValue").field(&self.raw).finish()
    }
}
