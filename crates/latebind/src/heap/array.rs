//! Foreign arrays
//!
//! Arrays are homogeneous, multi-dimensional, and carry per-dimension lower
//! bounds. Storage is one flat vector of tagged values with the first
//! dimension varying fastest. Every element carries the array's element tag,
//! except arrays of `Variant`, whose elements are whole tagged values.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ConversionError, HeapError};
use crate::tag::{Tag, VarKind};
use crate::variant::TaggedValue;

use super::ForeignHeap;

/// Handle to a foreign array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ArrayHandle(pub(crate) u64);

impl ArrayHandle {
    /// The null handle.
    pub const NULL: ArrayHandle = ArrayHandle(0);

    /// Wrap a raw payload.
    pub fn from_raw(raw: u64) -> Self {
        ArrayHandle(raw)
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

/// One dimension of an array: its lower bound and element count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayBound {
    /// Index of the first element
    pub lower: i32,
    /// Number of elements
    pub len: u32,
}

impl ArrayBound {
    /// A zero-based dimension of `len` elements.
    pub fn zero_based(len: u32) -> Self {
        ArrayBound { lower: 0, len }
    }

    /// Highest valid index (one below `lower` when empty). Widened to
    /// `i64` since `lower + len - 1` can leave the `i32` range.
    pub fn upper(self) -> i64 {
        i64::from(self.lower) + i64::from(self.len) - 1
    }
}

pub(crate) struct ArrayCell {
    elem: VarKind,
    bounds: Vec<ArrayBound>,
    data: Mutex<Vec<TaggedValue>>,
    locks: AtomicU32,
}

impl ArrayCell {
    fn element_tag(&self) -> Tag {
        if self.elem == VarKind::Variant {
            Tag::EMPTY
        } else {
            Tag::new(self.elem)
        }
    }

    fn offset(&self, handle: ArrayHandle, index: &[i32]) -> Result<usize, HeapError> {
        if index.len() != self.bounds.len() {
            return Err(HeapError::BadDimension {
                handle: handle.0,
                dims: self.bounds.len(),
                got: index.len(),
            });
        }
        let out_of_bounds = || HeapError::IndexOutOfBounds {
            handle: handle.0,
            index: index.to_vec(),
        };
        let mut offset = 0usize;
        let mut stride = 1usize;
        for (&i, bound) in index.iter().zip(&self.bounds) {
            let rel = i64::from(i) - i64::from(bound.lower);
            if rel < 0 || rel >= i64::from(bound.len) {
                return Err(out_of_bounds());
            }
            offset += rel as usize * stride;
            stride *= bound.len as usize;
        }
        Ok(offset)
    }
}

/// A locked view over an array's elements.
///
/// Holding the view keeps the array locked, so it cannot be destroyed
/// underneath the reader. Dropping the view unlocks it.
pub struct ArrayData {
    handle: ArrayHandle,
    cell: Arc<ArrayCell>,
}

impl ArrayData {
    /// The array being viewed
    pub fn handle(&self) -> ArrayHandle {
        self.handle
    }

    /// Element kind
    pub fn kind(&self) -> VarKind {
        self.cell.elem
    }

    /// Per-dimension bounds
    pub fn bounds(&self) -> &[ArrayBound] {
        &self.cell.bounds
    }

    /// Total element count
    pub fn len(&self) -> usize {
        self.cell.data.lock().len()
    }

    /// Check for zero elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at a flat offset (bit copy; the array keeps ownership).
    pub fn get(&self, offset: usize) -> Option<TaggedValue> {
        self.cell.data.lock().get(offset).copied()
    }

    /// Bit copies of every element in storage order.
    pub fn to_vec(&self) -> Vec<TaggedValue> {
        self.cell.data.lock().clone()
    }
}

impl Drop for ArrayData {
    fn drop(&mut self) {
        self.cell.locks.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for ArrayData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayData")
            .field("handle", &self.handle)
            .field("kind", &self.cell.elem)
            .field("bounds", &self.cell.bounds)
            .finish()
    }
}

impl ForeignHeap {
    fn cell(&self, handle: ArrayHandle) -> Result<Arc<ArrayCell>, HeapError> {
        self.arrays
            .get(&handle.0)
            .map(|c| Arc::clone(&c))
            .ok_or(HeapError::InvalidArray(handle.0))
    }

    // The shard guard is held across the increment so a lock can never
    // land on a cell that `destroy_array` has already taken out.
    fn locked_cell(&self, handle: ArrayHandle) -> Result<Arc<ArrayCell>, HeapError> {
        let entry = self
            .arrays
            .get(&handle.0)
            .ok_or(HeapError::InvalidArray(handle.0))?;
        entry.locks.fetch_add(1, Ordering::AcqRel);
        Ok(Arc::clone(&entry))
    }

    /// Create an array with the given element kind and bounds. Elements
    /// start as the zero value of the element kind.
    pub fn create_array(&self, elem: VarKind, bounds: &[ArrayBound]) -> ArrayHandle {
        let count: usize = bounds.iter().map(|b| b.len as usize).product();
        let init = if elem == VarKind::Variant {
            TaggedValue::init()
        } else {
            TaggedValue::from_raw_parts(Tag::new(elem), 0)
        };
        let cell = ArrayCell {
            elem,
            bounds: bounds.to_vec(),
            data: Mutex::new(vec![init; count]),
            locks: AtomicU32::new(0),
        };
        let id = self.next_handle();
        self.arrays.insert(id, Arc::new(cell));
        tracing::trace!(handle = id, %elem, dims = bounds.len(), count, "create array");
        ArrayHandle(id)
    }

    /// Create a one-dimensional, zero-based array.
    pub fn create_vector(&self, elem: VarKind, len: u32) -> ArrayHandle {
        self.create_array(elem, &[ArrayBound::zero_based(len)])
    }

    /// Number of dimensions
    pub fn array_dims(&self, handle: ArrayHandle) -> Result<usize, HeapError> {
        Ok(self.cell(handle)?.bounds.len())
    }

    /// All bounds, first dimension first
    pub fn array_bounds(&self, handle: ArrayHandle) -> Result<Vec<ArrayBound>, HeapError> {
        Ok(self.cell(handle)?.bounds.clone())
    }

    fn bound(&self, handle: ArrayHandle, dim: usize) -> Result<ArrayBound, HeapError> {
        let cell = self.cell(handle)?;
        dim.checked_sub(1)
            .and_then(|d| cell.bounds.get(d).copied())
            .ok_or(HeapError::BadDimension {
                handle: handle.0,
                dims: cell.bounds.len(),
                got: dim,
            })
    }

    /// Lower bound of dimension `dim` (1-based).
    pub fn array_lbound(&self, handle: ArrayHandle, dim: usize) -> Result<i32, HeapError> {
        Ok(self.bound(handle, dim)?.lower)
    }

    /// Upper bound of dimension `dim` (1-based).
    pub fn array_ubound(&self, handle: ArrayHandle, dim: usize) -> Result<i64, HeapError> {
        Ok(self.bound(handle, dim)?.upper())
    }

    /// Element kind
    pub fn array_kind(&self, handle: ArrayHandle) -> Result<VarKind, HeapError> {
        Ok(self.cell(handle)?.elem)
    }

    /// Element width in bytes
    pub fn array_element_size(&self, handle: ArrayHandle) -> Result<u32, HeapError> {
        Ok(self.cell(handle)?.elem.element_size())
    }

    /// Total element count across all dimensions
    pub fn array_len(&self, handle: ArrayHandle) -> Result<usize, HeapError> {
        Ok(self.cell(handle)?.data.lock().len())
    }

    /// Increment the lock count.
    pub fn lock_array(&self, handle: ArrayHandle) -> Result<(), HeapError> {
        self.locked_cell(handle).map(|_| ())
    }

    /// Decrement the lock count. Unlocking an unlocked array is an error.
    pub fn unlock_array(&self, handle: ArrayHandle) -> Result<(), HeapError> {
        let cell = self.cell(handle)?;
        cell.locks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map(|_| ())
            .map_err(|_| HeapError::ArrayNotLocked(handle.0))
    }

    /// Lock the array and return a view over its elements.
    pub fn access_array(&self, handle: ArrayHandle) -> Result<ArrayData, HeapError> {
        let cell = self.locked_cell(handle)?;
        Ok(ArrayData { handle, cell })
    }

    /// Read one element (bit copy; the array keeps ownership).
    pub fn get_element(&self, handle: ArrayHandle, index: &[i32]) -> Result<TaggedValue, HeapError> {
        let cell = self.cell(handle)?;
        let offset = cell.offset(handle, index)?;
        let data = cell.data.lock();
        data.get(offset)
            .copied()
            .ok_or_else(|| HeapError::IndexOutOfBounds {
                handle: handle.0,
                index: index.to_vec(),
            })
    }

    /// Store one element. The array takes ownership of `value`; the element
    /// it replaces is cleared.
    pub fn put_element(
        &self,
        handle: ArrayHandle,
        index: &[i32],
        value: TaggedValue,
    ) -> Result<(), ConversionError> {
        let cell = self.cell(handle)?;
        let expected = cell.element_tag();
        let accepted = if cell.elem == VarKind::Variant {
            !value.tag().is_by_ref()
        } else {
            value.tag() == expected
        };
        if !accepted {
            return Err(ConversionError::TypeMismatch {
                expected: Tag::array_of(cell.elem).to_string(),
                got: value.tag().to_string(),
            });
        }
        let offset = cell.offset(handle, index)?;
        let mut old = {
            let mut data = cell.data.lock();
            match data.get_mut(offset) {
                Some(slot) => std::mem::replace(slot, value),
                None => {
                    return Err(HeapError::IndexOutOfBounds {
                        handle: handle.0,
                        index: index.to_vec(),
                    }
                    .into())
                }
            }
        };
        old.clear(self)?;
        Ok(())
    }

    /// Destroy an array and clear every element it owns.
    ///
    /// Fails with [`HeapError::ArrayLocked`] while any lock is held.
    pub fn destroy_array(&self, handle: ArrayHandle) -> Result<(), HeapError> {
        if handle.is_null() {
            return Ok(());
        }
        // check and removal happen under one shard write guard
        let removed = self
            .arrays
            .remove_if(&handle.0, |_, cell| cell.locks.load(Ordering::Acquire) == 0);
        let Some((_, cell)) = removed else {
            return Err(if self.arrays.contains_key(&handle.0) {
                HeapError::ArrayLocked(handle.0)
            } else {
                HeapError::InvalidArray(handle.0)
            });
        };
        let elements = std::mem::take(&mut *cell.data.lock());
        for mut element in elements {
            if let Err(e) = element.clear(self) {
                tracing::warn!(handle = handle.0, error = %e, "failed to clear array element");
            }
        }
        tracing::trace!(handle = handle.0, "destroy array");
        Ok(())
    }

    /// Deep-copy an array, duplicating every element it owns.
    pub fn copy_array(&self, handle: ArrayHandle) -> Result<ArrayHandle, HeapError> {
        let cell = self.cell(handle)?;
        let source = cell.data.lock().clone();
        let mut copied = Vec::with_capacity(source.len());
        for element in &source {
            match self.copy_value(element) {
                Ok(v) => copied.push(v),
                Err(e) => {
                    for mut v in copied {
                        if let Err(cleanup) = v.clear(self) {
                            tracing::warn!(handle = handle.0, error = %cleanup, "failed to clear partial copy");
                        }
                    }
                    return Err(e);
                }
            }
        }
        let copy = ArrayCell {
            elem: cell.elem,
            bounds: cell.bounds.clone(),
            data: Mutex::new(copied),
            locks: AtomicU32::new(0),
        };
        let id = self.next_handle();
        self.arrays.insert(id, Arc::new(copy));
        Ok(ArrayHandle(id))
    }
}
