//! Enumerating collection objects

use std::sync::Arc;

use pretty_assertions::assert_eq;

use latebind::*;

fn collection(registry: &Arc<ConversionRegistry>, items: Vec<Value>) -> ObjectRef<dyn Dispatch> {
    let items = Arc::new(items);
    let counted = Arc::clone(&items);
    DispatchObject::builder("Items", Arc::clone(registry))
        .getter("Count", 0, move |_| Ok(Value::I32(counted.len() as i32)))
        .collection(move |_| Ok(items.as_ref().clone()))
        .build()
        .into_ref()
}

fn five(registry: &Arc<ConversionRegistry>) -> ObjectRef<dyn Dispatch> {
    collection(registry, (1..=5).map(Value::I32).collect())
}

fn setup() -> (Arc<ConversionRegistry>, Arc<ForeignHeap>, Invoker) {
    let registry = ConversionRegistry::shared();
    let heap = ForeignHeap::shared();
    let invoker = Invoker::new(Arc::clone(&registry), Arc::clone(&heap));
    (registry, heap, invoker)
}

#[test]
fn test_batches_shrink_then_stop() {
    let (registry, heap, invoker) = setup();
    let items = five(&registry);
    let e = invoker.enumerate(&*items).unwrap();

    assert_eq!(e.next(2).unwrap(), vec![Value::I32(1), Value::I32(2)]);
    assert_eq!(e.next(2).unwrap(), vec![Value::I32(3), Value::I32(4)]);
    assert_eq!(e.next(2).unwrap(), vec![Value::I32(5)]);
    assert!(e.next(2).unwrap().is_empty());

    e.reset().unwrap();
    assert_eq!(e.next(5).unwrap().len(), 5);
    drop(e);
    assert!(heap.is_clean());
}

#[test]
fn test_skip_and_clone() {
    let (registry, _heap, invoker) = setup();
    let items = five(&registry);
    let e = invoker.enumerate(&*items).unwrap();

    assert!(e.skip(3).unwrap());
    let copy = e.try_clone().unwrap();
    assert_eq!(e.next(10).unwrap(), vec![Value::I32(4), Value::I32(5)]);
    assert_eq!(copy.next(1).unwrap(), vec![Value::I32(4)]);
    assert!(!e.skip(1).unwrap());
}

#[test]
fn test_for_each_visits_everything_in_small_batches() {
    let (registry, heap, invoker) = setup();
    let items = collection(
        &registry,
        vec![Value::string("a"), Value::string("b"), Value::string("c")],
    );
    let invoker = invoker.with_config(InvokeConfig::new().with_enum_batch_size(2));

    let mut seen = Vec::new();
    invoker
        .for_each(&*items, |v| seen.push(v.as_str().unwrap_or_default().to_string()))
        .unwrap();
    assert_eq!(seen, vec!["a", "b", "c"]);
    assert!(heap.is_clean());
}

#[test]
fn test_iterator_adapter() {
    let (registry, _heap, invoker) = setup();
    let items = five(&registry);
    let total: i64 = invoker
        .enumerate(&*items)
        .unwrap()
        .into_iter()
        .map(|v| v.unwrap().as_i64().unwrap())
        .sum();
    assert_eq!(total, 15);
}

#[test]
fn test_empty_collection() {
    let (registry, _heap, invoker) = setup();
    let items = collection(&registry, Vec::new());
    let e = invoker.enumerate(&*items).unwrap();
    assert!(e.next(1).unwrap().is_empty());
    assert_eq!(e.into_iter().count(), 0);
}

#[test]
fn test_non_collection_cannot_enumerate() {
    let (registry, heap, invoker) = setup();
    let plain = DispatchObject::builder("Plain", Arc::clone(&registry))
        .getter("Name", 0, |_| Ok(Value::string("plain")))
        .build()
        .into_ref();
    let err = invoker.enumerate(&*plain).unwrap_err();
    assert_eq!(err.status(), Status::MemberNotFound);
    assert!(heap.is_clean());
}

#[test]
fn test_enumerator_releases_its_references() {
    let (registry, heap, _) = setup();
    let enumerator = Arc::new(CollectionEnumerator::new(
        vec![Value::I32(1)],
        Arc::clone(&registry),
    ));
    {
        let held = ObjectRef::adopt(Arc::clone(&enumerator) as Arc<dyn EnumVariant>);
        let e = Enumerator::new(held, Arc::clone(&registry), Arc::clone(&heap), 10);
        let copy = e.try_clone().unwrap();
        assert_eq!(enumerator.ref_count(), 1);
        assert_eq!(copy.next(1).unwrap(), vec![Value::I32(1)]);
    }
    assert_eq!(enumerator.ref_count(), 0);
}
