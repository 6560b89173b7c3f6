//! Enumeration over collection objects

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::error::{InvokeError, Status};
use crate::heap::ForeignHeap;
use crate::object::{Object, ObjectRef};
use crate::registry::ConversionRegistry;
use crate::value::Value;
use crate::variant::TaggedValue;

/// The enumeration capability.
///
/// Items handed out by [`EnumVariant::next`] are owned by the caller,
/// which must clear them.
pub trait EnumVariant: Object {
    /// Fetch up to `count` items. Fewer than `count` means the sequence is
    /// exhausted.
    fn next(&self, count: u32, heap: &ForeignHeap) -> Result<Vec<TaggedValue>, Status>;

    /// Advance past `count` items. Returns `false` when fewer remained.
    fn skip(&self, count: u32) -> Result<bool, Status>;

    /// Rewind to the first item.
    fn reset(&self) -> Result<(), Status>;

    /// A new enumerator at the same position, moving independently.
    fn clone_cursor(&self) -> Result<ObjectRef<dyn EnumVariant>, Status>;
}

/// A caller-side enumerator that decodes items as it goes.
pub struct Enumerator {
    inner: ObjectRef<dyn EnumVariant>,
    registry: Arc<ConversionRegistry>,
    heap: Arc<ForeignHeap>,
    batch: u32,
}

fn protocol(member: &str) -> impl FnOnce(Status) -> InvokeError + '_ {
    move |status| InvokeError::Protocol {
        member: member.to_string(),
        status,
    }
}

impl Enumerator {
    /// Wrap an enumeration reference.
    pub fn new(
        inner: ObjectRef<dyn EnumVariant>,
        registry: Arc<ConversionRegistry>,
        heap: Arc<ForeignHeap>,
        batch: u32,
    ) -> Self {
        Enumerator {
            inner,
            registry,
            heap,
            batch: batch.max(1),
        }
    }

    /// The underlying enumeration object
    pub fn inner(&self) -> &ObjectRef<dyn EnumVariant> {
        &self.inner
    }

    /// Fetch and decode up to `count` items. Every fetched item is cleared,
    /// even when one of them fails to decode.
    pub fn next(&self, count: u32) -> Result<Vec<Value>, InvokeError> {
        let raw = self.inner.next(count, &self.heap).map_err(protocol("Next"))?;
        tracing::trace!(requested = count, fetched = raw.len(), "enumerator next");
        let mut decoded = Vec::with_capacity(raw.len());
        let mut first_error = None;
        for mut item in raw {
            match self.registry.decode(&item, &self.heap) {
                Ok(value) => decoded.push(value),
                Err(e) => {
                    first_error.get_or_insert(InvokeError::from(e));
                }
            }
            if let Err(e) = item.clear(&self.heap) {
                first_error.get_or_insert(InvokeError::from(e));
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(decoded),
        }
    }

    /// Skip `count` items. Returns `false` when fewer remained.
    pub fn skip(&self, count: u32) -> Result<bool, InvokeError> {
        self.inner.skip(count).map_err(protocol("Skip"))
    }

    /// Rewind to the first item.
    pub fn reset(&self) -> Result<(), InvokeError> {
        self.inner.reset().map_err(protocol("Reset"))
    }

    /// An independent enumerator at the same position.
    pub fn try_clone(&self) -> Result<Enumerator, InvokeError> {
        let inner = self.inner.clone_cursor().map_err(protocol("Clone"))?;
        Ok(Enumerator {
            inner,
            registry: Arc::clone(&self.registry),
            heap: Arc::clone(&self.heap),
            batch: self.batch,
        })
    }

    /// Call `f` for every remaining item, fetching in batches.
    pub fn for_each<F: FnMut(Value)>(&self, mut f: F) -> Result<(), InvokeError> {
        loop {
            let items = self.next(self.batch)?;
            let exhausted = items.len() < self.batch as usize;
            items.into_iter().for_each(&mut f);
            if exhausted {
                return Ok(());
            }
        }
    }
}

impl fmt::Debug for Enumerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enumerator")
            .field("inner", &self.inner)
            .field("batch", &self.batch)
            .finish()
    }
}

impl IntoIterator for Enumerator {
    type Item = Result<Value, InvokeError>;
    type IntoIter = EnumIter;

    fn into_iter(self) -> EnumIter {
        EnumIter {
            source: self,
            buffer: VecDeque::new(),
            done: false,
        }
    }
}

/// Iterator over an [`Enumerator`]. Stops after the first error.
#[derive(Debug)]
pub struct EnumIter {
    source: Enumerator,
    buffer: VecDeque<Value>,
    done: bool,
}

impl Iterator for EnumIter {
    type Item = Result<Value, InvokeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(value) = self.buffer.pop_front() {
            return Some(Ok(value));
        }
        if self.done {
            return None;
        }
        match self.source.next(self.source.batch) {
            Ok(items) => {
                self.done = items.len() < self.source.batch as usize;
                self.buffer.extend(items);
                self.buffer.pop_front().map(Ok)
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
