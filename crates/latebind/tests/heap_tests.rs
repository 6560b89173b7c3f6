//! Foreign strings, arrays, and deep copies

use pretty_assertions::assert_eq;

use latebind::*;

#[test]
fn test_strings_keep_their_length() {
    let heap = ForeignHeap::new();
    let units: Vec<u16> = "a\0b".encode_utf16().collect();
    let handle = heap.alloc_string_len(&units);
    assert_eq!(heap.string_len(handle).unwrap(), 3);
    assert_eq!(heap.read_string(handle).unwrap(), "a\0b");
    assert_eq!(heap.read_display_string(handle).unwrap(), "a");
    heap.free_string(handle).unwrap();
    assert_eq!(heap.free_string(handle), Err(HeapError::InvalidString(handle.raw())));
    assert!(heap.free_string(StrHandle::NULL).is_ok());
}

#[test]
fn test_multi_dimensional_array() {
    let registry = ConversionRegistry::with_builtins();
    let heap = ForeignHeap::new();
    let bounds = [ArrayBound { lower: 1, len: 2 }, ArrayBound { lower: -1, len: 3 }];
    let handle = heap.create_array(VarKind::I32, &bounds);

    assert_eq!(heap.array_dims(handle).unwrap(), 2);
    assert_eq!(heap.array_lbound(handle, 2).unwrap(), -1);
    assert_eq!(heap.array_ubound(handle, 2).unwrap(), 1);
    assert_eq!(heap.array_len(handle).unwrap(), 6);
    assert_eq!(heap.array_element_size(handle).unwrap(), 4);
    assert!(matches!(
        heap.array_lbound(handle, 3),
        Err(HeapError::BadDimension { dims: 2, got: 3, .. })
    ));

    registry
        .array_put(&heap, handle, &[2, 1], &Value::I32(99))
        .unwrap();
    assert_eq!(registry.array_get(&heap, handle, &[2, 1]).unwrap(), Value::I32(99));
    assert_eq!(registry.array_get(&heap, handle, &[1, -1]).unwrap(), Value::I32(0));
    assert!(matches!(
        heap.get_element(handle, &[3, 0]),
        Err(HeapError::IndexOutOfBounds { .. })
    ));
    assert!(matches!(
        registry.array_put(&heap, handle, &[1, 0], &Value::string("x")),
        Err(ConversionError::TypeMismatch { .. })
    ));
    assert_eq!(heap.live_strings(), 0);

    heap.destroy_array(handle).unwrap();
    assert!(heap.is_clean());
}

#[test]
fn test_locked_array_cannot_be_destroyed() {
    let heap = ForeignHeap::new();
    let handle = heap.create_vector(VarKind::U8, 4);
    {
        let data = heap.access_array(handle).unwrap();
        assert_eq!(data.len(), 4);
        assert_eq!(heap.destroy_array(handle), Err(HeapError::ArrayLocked(handle.raw())));
    }
    heap.lock_array(handle).unwrap();
    heap.unlock_array(handle).unwrap();
    assert_eq!(heap.unlock_array(handle), Err(HeapError::ArrayNotLocked(handle.raw())));
    heap.destroy_array(handle).unwrap();
    assert!(heap.is_clean());
}

#[test]
fn test_array_conversions() {
    let registry = ConversionRegistry::with_builtins();
    let heap = ForeignHeap::new();

    let names = registry
        .array_from_values(
            &heap,
            VarKind::String,
            &[Value::string("x"), Value::string("y")],
        )
        .unwrap();
    assert_eq!(registry.array_to_strings(&heap, names).unwrap(), vec!["x", "y"]);
    assert!(registry.array_to_bytes(&heap, names).is_err());

    let bytes = registry.array_from_bytes(&heap, &[1, 2, 3]).unwrap();
    assert_eq!(registry.array_to_bytes(&heap, bytes).unwrap(), vec![1, 2, 3]);
    assert_eq!(
        registry.array_to_values(&heap, bytes).unwrap(),
        vec![Value::U8(1), Value::U8(2), Value::U8(3)]
    );

    let mismatch = registry.array_from_values(
        &heap,
        VarKind::I32,
        &[Value::I32(1), Value::string("two")],
    );
    assert!(mismatch.is_err());

    heap.destroy_array(names).unwrap();
    heap.destroy_array(bytes).unwrap();
    assert!(heap.is_clean());
}

#[test]
fn test_deep_copy_is_independent() {
    let registry = ConversionRegistry::with_builtins();
    let heap = ForeignHeap::new();
    let original = registry
        .encode_value(
            &Value::vector(VarKind::String, vec![Value::string("kept")]),
            &heap,
        )
        .unwrap();
    let mut copy = heap.copy_value(&original).unwrap();
    assert_ne!(copy.payload(), original.payload());
    assert_eq!(heap.live_strings(), 2);

    let mut original = original;
    original.clear(&heap).unwrap();
    assert_eq!(
        registry.decode(&copy, &heap).unwrap(),
        Value::vector(VarKind::String, vec![Value::string("kept")])
    );
    copy.clear(&heap).unwrap();
    assert!(heap.is_clean());
}

#[test]
fn test_owned_value_clears_on_drop() {
    let registry = ConversionRegistry::shared();
    let heap = ForeignHeap::shared();
    let raw = registry.encode_value(&Value::string("temp"), &heap).unwrap();
    {
        let owned = OwnedValue::new(raw, heap.clone(), registry.clone());
        assert_eq!(owned.value().unwrap(), Value::string("temp"));
        assert_eq!(heap.live_strings(), 1);
    }
    assert!(heap.is_clean());
}
