use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Status;
use crate::heap::ForeignHeap;
use crate::invoke::EnumVariant;
use crate::object::{Iid, Interface, Object, ObjectRef, RefCount};
use crate::registry::ConversionRegistry;
use crate::value::Value;
use crate::variant::TaggedValue;

/// An enumeration over a fixed list of values.
///
/// Every item handed out is a fresh encoding, owned by the caller. Clones
/// share the items but move their own cursor.
pub struct CollectionEnumerator {
    items: Arc<[Value]>,
    cursor: Mutex<usize>,
    registry: Arc<ConversionRegistry>,
    refs: RefCount,
}

impl CollectionEnumerator {
    /// An enumerator positioned at the first item, holding its creator's
    /// reference.
    pub fn new(items: Vec<Value>, registry: Arc<ConversionRegistry>) -> Self {
        CollectionEnumerator {
            items: items.into(),
            cursor: Mutex::new(0),
            registry,
            refs: RefCount::new(),
        }
    }

    /// Index of the next item
    pub fn position(&self) -> usize {
        *self.cursor.lock()
    }

    /// Total number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check for no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Current reference count
    pub fn ref_count(&self) -> u32 {
        self.refs.count()
    }
}

impl Object for CollectionEnumerator {
    fn add_ref(&self) -> u32 {
        self.refs.add_ref()
    }

    fn release(&self) -> Result<u32, Status> {
        self.refs.release()
    }

    fn query_interface(self: Arc<Self>, iid: Iid) -> Result<Interface, Status> {
        if iid == Iid::UNKNOWN {
            self.refs.add_ref();
            Ok(Interface::Unknown(self))
        } else if iid == Iid::ENUM_VARIANT {
            self.refs.add_ref();
            Ok(Interface::Enumerator(self))
        } else {
            Err(Status::NoInterface)
        }
    }
}

impl EnumVariant for CollectionEnumerator {
    fn next(&self, count: u32, heap: &ForeignHeap) -> Result<Vec<TaggedValue>, Status> {
        let mut cursor = self.cursor.lock();
        let start = (*cursor).min(self.items.len());
        let end = start.saturating_add(count as usize).min(self.items.len());
        let mut out = Vec::with_capacity(end - start);
        for item in &self.items[start..end] {
            match self.registry.encode_value(item, heap) {
                Ok(encoded) => out.push(encoded),
                Err(e) => {
                    tracing::debug!(error = %e, "collection item did not encode");
                    for mut done in out {
                        if let Err(e) = done.clear(heap) {
                            tracing::warn!(error = %e, "failed to clear encoded item");
                        }
                    }
                    return Err(Status::TypeMismatch);
                }
            }
        }
        *cursor = end;
        Ok(out)
    }

    fn skip(&self, count: u32) -> Result<bool, Status> {
        let mut cursor = self.cursor.lock();
        let wanted = cursor.saturating_add(count as usize);
        *cursor = wanted.min(self.items.len());
        Ok(wanted <= self.items.len())
    }

    fn reset(&self) -> Result<(), Status> {
        *self.cursor.lock() = 0;
        Ok(())
    }

    fn clone_cursor(&self) -> Result<ObjectRef<dyn EnumVariant>, Status> {
        let copy = CollectionEnumerator {
            items: Arc::clone(&self.items),
            cursor: Mutex::new(self.position()),
            registry: Arc::clone(&self.registry),
            refs: RefCount::new(),
        };
        Ok(ObjectRef::adopt(Arc::new(copy)))
    }
}

impl fmt::Debug for CollectionEnumerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionEnumerator")
            .field("len", &self.items.len())
            .field("position", &self.position())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn five() -> CollectionEnumerator {
        let items = (1..=5).map(Value::I32).collect();
        CollectionEnumerator::new(items, ConversionRegistry::shared())
    }

    #[test]
    fn test_batches_until_exhausted() {
        let heap = ForeignHeap::new();
        let e = five();
        let sizes: Vec<usize> = (0..4).map(|_| e.next(2, &heap).unwrap().len()).collect();
        assert_eq!(sizes, vec![2, 2, 1, 0]);
        e.reset().unwrap();
        assert_eq!(e.next(5, &heap).unwrap().len(), 5);
    }

    #[test]
    fn test_skip_reports_short_sequences() {
        let e = five();
        assert_eq!(e.skip(3), Ok(true));
        assert_eq!(e.skip(3), Ok(false));
        assert_eq!(e.position(), 5);
    }

    #[test]
    fn test_clone_has_its_own_cursor() {
        let heap = ForeignHeap::new();
        let e = five();
        e.skip(1).unwrap();
        let copy = e.clone_cursor().unwrap();
        assert_eq!(copy.next(1, &heap).unwrap(), vec![TaggedValue::from_i32(2)]);
        assert_eq!(e.position(), 1);
    }

    #[test]
    fn test_items_are_fresh_copies() {
        let heap = ForeignHeap::new();
        let e = CollectionEnumerator::new(vec![Value::string("a")], ConversionRegistry::shared());
        let mut first = e.next(1, &heap).unwrap();
        e.reset().unwrap();
        let mut second = e.next(1, &heap).unwrap();
        assert_ne!(first[0].payload(), second[0].payload());
        first[0].clear(&heap).unwrap();
        second[0].clear(&heap).unwrap();
        assert!(heap.is_clean());
    }
}
