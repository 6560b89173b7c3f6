//! Argument packing
//!
//! Arguments are given in natural left-to-right order and stored reversed:
//! positional slot 0 holds the last argument. Property puts carry one named
//! argument, [`MemberId::PROPERTY_PUT`], marking slot 0 as the value being
//! assigned.

use std::fmt;
use std::sync::Arc;

use crate::error::{ConversionError, HeapError};
use crate::heap::{ForeignHeap, SlotHandle};
use crate::invoke::MemberId;
use crate::registry::ConversionRegistry;
use crate::value::Value;
use crate::variant::TaggedValue;

/// How a member is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Call a method
    Method,
    /// Read a property
    PropertyGet,
    /// Assign a property by value
    PropertyPut,
    /// Assign a property by reference
    PropertyPutRef,
}

impl CallKind {
    /// The conventional flag value for this call kind.
    pub fn flag(self) -> u16 {
        match self {
            CallKind::Method => 0x1,
            CallKind::PropertyGet => 0x2,
            CallKind::PropertyPut => 0x4,
            CallKind::PropertyPutRef => 0x8,
        }
    }

    /// Check if this kind assigns a property
    pub fn is_put(self) -> bool {
        matches!(self, CallKind::PropertyPut | CallKind::PropertyPutRef)
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallKind::Method => "method",
            CallKind::PropertyGet => "get",
            CallKind::PropertyPut => "put",
            CallKind::PropertyPutRef => "putref",
        };
        f.write_str(name)
    }
}

/// Packed arguments for one call.
///
/// The block owns every value it holds, plus the slots allocated for
/// by-reference arguments. [`ParamBlock::clear`] releases all of it.
#[derive(Debug, Default)]
pub struct ParamBlock {
    args: Vec<TaggedValue>,
    named: Vec<MemberId>,
    slots: Vec<(usize, SlotHandle)>,
}

impl ParamBlock {
    /// An empty block
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a block from already reversed arguments. The block takes
    /// ownership of the values; by-reference arguments are treated as
    /// borrowed.
    pub fn from_raw_parts(args: Vec<TaggedValue>, named: Vec<MemberId>) -> Self {
        ParamBlock {
            args,
            named,
            slots: Vec::new(),
        }
    }

    /// Positional arguments in protocol order (last natural argument first)
    pub fn positional(&self) -> &[TaggedValue] {
        &self.args
    }

    /// Named-argument markers
    pub fn named_args(&self) -> &[MemberId] {
        &self.named
    }

    /// Number of positional arguments
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Check for no arguments
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Argument by natural (left-to-right) position.
    pub fn natural_arg(&self, index: usize) -> Option<&TaggedValue> {
        let reversed = self.args.len().checked_sub(index + 1)?;
        self.args.get(reversed)
    }

    /// The value being assigned by a property put: positional slot 0 when
    /// it is marked by the put named argument.
    pub fn put_value(&self) -> Option<&TaggedValue> {
        match self.named.first() {
            Some(&MemberId::PROPERTY_PUT) => self.args.first(),
            _ => None,
        }
    }

    /// Decode the current contents of a by-reference argument, by natural
    /// position. Used to read values a callee wrote back.
    pub fn by_ref_result(
        &self,
        index: usize,
        registry: &ConversionRegistry,
        heap: &ForeignHeap,
    ) -> Result<Option<Value>, ConversionError> {
        match self.natural_arg(index) {
            Some(arg) if arg.tag().is_by_ref() => arg.read(registry, heap).map(Some),
            _ => Ok(None),
        }
    }

    /// Release every value and slot the block owns. Safe to call twice.
    pub fn clear(&mut self, heap: &ForeignHeap) -> Result<(), HeapError> {
        let mut first_error = None;
        for arg in &mut self.args {
            if let Err(e) = arg.clear(heap) {
                first_error.get_or_insert(e);
            }
        }
        for (_, slot) in self.slots.drain(..) {
            if let Err(e) = heap.drop_slot(slot) {
                first_error.get_or_insert(e);
            }
        }
        self.args.clear();
        self.named.clear();
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Encodes native arguments into a [`ParamBlock`].
#[derive(Debug, Clone)]
pub struct ArgumentPacker {
    registry: Arc<ConversionRegistry>,
    heap: Arc<ForeignHeap>,
}

impl ArgumentPacker {
    /// A packer over the given registry and heap
    pub fn new(registry: Arc<ConversionRegistry>, heap: Arc<ForeignHeap>) -> Self {
        ArgumentPacker { registry, heap }
    }

    /// Encode `args` (natural order) for a call of `kind`.
    ///
    /// Nothing is left allocated if any argument fails to encode.
    pub fn pack(&self, kind: CallKind, args: &[Value]) -> Result<ParamBlock, ConversionError> {
        let mut block = ParamBlock::new();
        for (natural, arg) in args.iter().enumerate().rev() {
            let encoded = match self.registry.encode_value(arg, &self.heap) {
                Ok(encoded) => encoded,
                Err(e) => {
                    if let Err(cleanup) = block.clear(&self.heap) {
                        tracing::warn!(error = %cleanup, "failed to release partially packed arguments");
                    }
                    return Err(e);
                }
            };
            // slots made for this call belong to the block; passed-through
            // references do not
            if encoded.tag().is_by_ref() && !matches!(arg, Value::Ref(_)) {
                block.slots.push((natural, SlotHandle::from_raw(encoded.payload())));
            }
            block.args.push(encoded);
        }
        if kind.is_put() {
            block.named.push(MemberId::PROPERTY_PUT);
        }
        tracing::trace!(%kind, args = block.len(), named = block.named.len(), "packed arguments");
        Ok(block)
    }
}
