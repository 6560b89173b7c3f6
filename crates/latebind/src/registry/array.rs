//! Typed array element access
//!
//! Elements that own something (strings, object handles, nested values)
//! carry their own ownership, so element reads and writes go through the
//! element kind's registry entry rather than copying raw payloads.

use crate::error::ConversionError;
use crate::heap::{ArrayBound, ArrayHandle, ForeignHeap};
use crate::tag::{Tag, VarKind};
use crate::value::{ArrayValue, Value};
use crate::variant::TaggedValue;

use super::ConversionRegistry;

/// Element count of a zero-based vector, which must be indexable by `i32`.
fn vector_len(len: usize) -> Result<u32, ConversionError> {
    i32::try_from(len)
        .ok()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or(ConversionError::ArrayTooLarge { len })
}

/// Multi-dimensional index of a storage offset (first dimension fastest).
fn index_of(bounds: &[ArrayBound], mut offset: usize) -> Vec<i32> {
    bounds
        .iter()
        .map(|b| {
            let len = (b.len as usize).max(1);
            let i = b.lower + (offset % len) as i32;
            offset /= len;
            i
        })
        .collect()
}

impl ConversionRegistry {
    /// Read and decode one element.
    pub fn array_get(
        &self,
        heap: &ForeignHeap,
        handle: ArrayHandle,
        index: &[i32],
    ) -> Result<Value, ConversionError> {
        let element = heap.get_element(handle, index)?;
        self.decode(&element, heap)
    }

    /// Encode and store one element, clearing the element it replaces.
    pub fn array_put(
        &self,
        heap: &ForeignHeap,
        handle: ArrayHandle,
        index: &[i32],
        value: &Value,
    ) -> Result<(), ConversionError> {
        let mut encoded = self.encode_value(value, heap)?;
        if let Err(e) = heap.put_element(handle, index, encoded) {
            encoded.clear(heap)?;
            return Err(e);
        }
        Ok(())
    }

    /// Build a foreign array from a decoded one.
    pub fn array_from_value(
        &self,
        heap: &ForeignHeap,
        array: &ArrayValue,
    ) -> Result<ArrayHandle, ConversionError> {
        let expected: usize = array.bounds.iter().map(|b| b.len as usize).product();
        if expected != array.items.len() {
            return Err(ConversionError::TypeMismatch {
                expected: format!("{} elements", expected),
                got: format!("{} elements", array.items.len()),
            });
        }
        let handle = heap.create_array(array.kind, &array.bounds);
        for (offset, item) in array.items.iter().enumerate() {
            let index = index_of(&array.bounds, offset);
            if let Err(e) = self.array_put(heap, handle, &index, item) {
                heap.destroy_array(handle)?;
                return Err(e);
            }
        }
        Ok(handle)
    }

    /// Build a zero-based vector of `kind` from values.
    pub fn array_from_values(
        &self,
        heap: &ForeignHeap,
        kind: VarKind,
        items: &[Value],
    ) -> Result<ArrayHandle, ConversionError> {
        self.array_from_value(heap, &ArrayValue::vector(kind, items.to_vec()))
    }

    /// Build a byte vector.
    pub fn array_from_bytes(&self, heap: &ForeignHeap, bytes: &[u8]) -> Result<ArrayHandle, ConversionError> {
        let len = vector_len(bytes.len())?;
        let handle = heap.create_vector(VarKind::U8, len);
        for (i, b) in (0..).zip(bytes) {
            if let Err(e) = heap.put_element(handle, &[i], TaggedValue::from_u8(*b)) {
                heap.destroy_array(handle)?;
                return Err(e);
            }
        }
        Ok(handle)
    }

    /// Decode a whole array.
    pub fn array_to_value(
        &self,
        heap: &ForeignHeap,
        handle: ArrayHandle,
    ) -> Result<ArrayValue, ConversionError> {
        let data = heap.access_array(handle)?;
        let items = data
            .to_vec()
            .iter()
            .map(|element| self.decode(element, heap))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ArrayValue {
            kind: data.kind(),
            bounds: data.bounds().to_vec(),
            items,
        })
    }

    /// Decode every element in storage order.
    pub fn array_to_values(
        &self,
        heap: &ForeignHeap,
        handle: ArrayHandle,
    ) -> Result<Vec<Value>, ConversionError> {
        Ok(self.array_to_value(heap, handle)?.items)
    }

    /// Copy out a string array.
    pub fn array_to_strings(
        &self,
        heap: &ForeignHeap,
        handle: ArrayHandle,
    ) -> Result<Vec<String>, ConversionError> {
        let data = heap.access_array(handle)?;
        if data.kind() != VarKind::String {
            return Err(ConversionError::TypeMismatch {
                expected: Tag::array_of(VarKind::String).to_string(),
                got: Tag::array_of(data.kind()).to_string(),
            });
        }
        data.to_vec()
            .iter()
            .map(|element| element.read_string(heap))
            .collect()
    }

    /// Copy out a byte array.
    pub fn array_to_bytes(
        &self,
        heap: &ForeignHeap,
        handle: ArrayHandle,
    ) -> Result<Vec<u8>, ConversionError> {
        let data = heap.access_array(handle)?;
        data.to_vec().iter().map(TaggedValue::as_u8).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_of_first_dimension_fastest() {
        let bounds = [
            ArrayBound { lower: 1, len: 2 },
            ArrayBound { lower: 0, len: 3 },
        ];
        assert_eq!(index_of(&bounds, 0), vec![1, 0]);
        assert_eq!(index_of(&bounds, 1), vec![2, 0]);
        assert_eq!(index_of(&bounds, 2), vec![1, 1]);
        assert_eq!(index_of(&bounds, 5), vec![2, 2]);
    }

    #[test]
    fn test_vector_len_limits() {
        assert_eq!(vector_len(3).unwrap(), 3);
        assert_eq!(vector_len(i32::MAX as usize).unwrap(), i32::MAX as u32);
        assert!(matches!(
            vector_len(i32::MAX as usize + 1),
            Err(ConversionError::ArrayTooLarge { .. })
        ));
    }

    #[test]
    fn test_bytes_round_trip() {
        let registry = ConversionRegistry::with_builtins();
        let heap = ForeignHeap::new();
        let handle = registry.array_from_bytes(&heap, b"\x00\x7f\xff").unwrap();
        assert_eq!(registry.array_to_bytes(&heap, handle).unwrap(), vec![0, 0x7f, 0xff]);
        heap.destroy_array(handle).unwrap();
    }

    #[test]
    fn test_string_elements_are_owned() {
        let registry = ConversionRegistry::with_builtins();
        let heap = ForeignHeap::new();
        let items = vec![Value::string("a"), Value::string("b")];
        let handle = registry
            .array_from_values(&heap, VarKind::String, &items)
            .unwrap();
        assert_eq!(heap.live_strings(), 2);
        registry
            .array_put(&heap, handle, &[0], &Value::string("c"))
            .unwrap();
        assert_eq!(heap.live_strings(), 2);
        assert_eq!(
            registry.array_to_strings(&heap, handle).unwrap(),
            vec!["c".to_string(), "b".to_string()]
        );
        heap.destroy_array(handle).unwrap();
        assert!(heap.is_clean());
    }

    #[test]
    fn test_wrong_element_type_is_rejected_without_leaking() {
        let registry = ConversionRegistry::with_builtins();
        let heap = ForeignHeap::new();
        let handle = heap.create_vector(VarKind::I32, 1);
        assert!(registry
            .array_put(&heap, handle, &[0], &Value::string("nope"))
            .is_err());
        assert_eq!(heap.live_strings(), 0);
        heap.destroy_array(handle).unwrap();
    }

    #[test]
    fn test_variant_array_holds_mixed_values() {
        let registry = ConversionRegistry::with_builtins();
        let heap = ForeignHeap::new();
        let items = vec![Value::I32(1), Value::string("two"), Value::Null];
        let handle = registry
            .array_from_values(&heap, VarKind::Variant, &items)
            .unwrap();
        assert_eq!(registry.array_to_values(&heap, handle).unwrap(), items);
        assert_eq!(
            registry.array_get(&heap, handle, &[1]).unwrap(),
            Value::string("two")
        );
        heap.destroy_array(handle).unwrap();
        assert!(heap.is_clean());
    }
}
