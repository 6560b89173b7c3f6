//! Arrays copied out of foreign memory

use crate::heap::ArrayBound;
use crate::tag::VarKind;

use super::Value;

/// A decoded array: element kind, per-dimension bounds, and the elements
/// in storage order (first dimension varies fastest).
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    /// Element kind; `Variant` arrays hold mixed values
    pub kind: VarKind,
    /// Bounds, first dimension first
    pub bounds: Vec<ArrayBound>,
    /// Elements in storage order
    pub items: Vec<Value>,
}

impl ArrayValue {
    /// A zero-based, one-dimensional array.
    pub fn vector(kind: VarKind, items: Vec<Value>) -> Self {
        ArrayValue {
            kind,
            bounds: vec![ArrayBound::zero_based(items.len() as u32)],
            items,
        }
    }

    /// Number of dimensions
    pub fn dims(&self) -> usize {
        self.bounds.len()
    }

    /// Total element count
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check for zero elements
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Element at a multi-dimensional index.
    pub fn get(&self, index: &[i32]) -> Option<&Value> {
        if index.len() != self.bounds.len() {
            return None;
        }
        let mut offset = 0usize;
        let mut stride = 1usize;
        for (&i, bound) in index.iter().zip(&self.bounds) {
            let rel = i64::from(i) - i64::from(bound.lower);
            if rel < 0 || rel >= i64::from(bound.len) {
                return None;
            }
            offset += rel as usize * stride;
            stride *= bound.len as usize;
        }
        self.items.get(offset)
    }
}
