//! Late-bound invocation against in-process callees

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use latebind::*;

// ═══════════════════════════════════════════════════════════════════════
// Fixtures
// ═══════════════════════════════════════════════════════════════════════

/// Records exactly what arrives at the callee.
#[derive(Default)]
struct Recorder {
    refs: RefCount,
    lookups: AtomicUsize,
    calls: Mutex<Vec<(MemberId, CallKind, Vec<i32>, Vec<MemberId>)>>,
}

impl Object for Recorder {
    fn add_ref(&self) -> u32 {
        self.refs.add_ref()
    }

    fn release(&self) -> std::result::Result<u32, Status> {
        self.refs.release()
    }

    fn query_interface(self: Arc<Self>, iid: Iid) -> std::result::Result<Interface, Status> {
        if iid == Iid::UNKNOWN {
            self.refs.add_ref();
            Ok(Interface::Unknown(self))
        } else if iid == Iid::DISPATCH {
            self.refs.add_ref();
            Ok(Interface::Dispatch(self))
        } else {
            Err(Status::NoInterface)
        }
    }
}

impl Dispatch for Recorder {
    fn ids_of_names(&self, names: &[&str], _locale: u32) -> std::result::Result<Vec<MemberId>, Status> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        match names {
            ["Record"] => Ok(vec![MemberId(7)]),
            _ => Err(Status::NameNotFound),
        }
    }

    fn invoke(
        &self,
        call: DispatchCall<'_>,
        result: &mut TaggedValue,
        _diagnostic: &mut DiagnosticRecord,
    ) -> Status {
        let args: Vec<i32> = call
            .params
            .positional()
            .iter()
            .map(|v| v.as_i32().unwrap_or(-1))
            .collect();
        *result = TaggedValue::from_i32(args.len() as i32);
        self.calls.lock().push((
            call.member,
            call.kind,
            args,
            call.params.named_args().to_vec(),
        ));
        Status::Success
    }
}

/// Raises an error whose help file handle points at nothing.
#[derive(Default)]
struct Garbled {
    refs: RefCount,
}

impl Object for Garbled {
    fn add_ref(&self) -> u32 {
        self.refs.add_ref()
    }

    fn release(&self) -> std::result::Result<u32, Status> {
        self.refs.release()
    }

    fn query_interface(self: Arc<Self>, iid: Iid) -> std::result::Result<Interface, Status> {
        if iid == Iid::DISPATCH {
            self.refs.add_ref();
            Ok(Interface::Dispatch(self))
        } else {
            Err(Status::NoInterface)
        }
    }
}

impl Dispatch for Garbled {
    fn ids_of_names(&self, _names: &[&str], _locale: u32) -> std::result::Result<Vec<MemberId>, Status> {
        Ok(vec![MemberId(1)])
    }

    fn invoke(
        &self,
        call: DispatchCall<'_>,
        _result: &mut TaggedValue,
        diagnostic: &mut DiagnosticRecord,
    ) -> Status {
        *diagnostic = DiagnosticRecord::raise(call.heap, 7, "Src", "desc");
        diagnostic.help_file = StrHandle::from_raw(0xdead_beef);
        Status::CalleeRaisedError
    }
}

struct Fixture {
    registry: Arc<ConversionRegistry>,
    heap: Arc<ForeignHeap>,
    invoker: Invoker,
}

fn fixture() -> Fixture {
    let registry = ConversionRegistry::shared();
    let heap = ForeignHeap::shared();
    let invoker = Invoker::new(Arc::clone(&registry), Arc::clone(&heap));
    Fixture {
        registry,
        heap,
        invoker,
    }
}

fn calculator(registry: &Arc<ConversionRegistry>) -> Arc<DispatchObject> {
    let total = Arc::new(Mutex::new(0i64));
    let read = Arc::clone(&total);
    let write = Arc::clone(&total);
    DispatchObject::builder("Calc", Arc::clone(registry))
        .method("Add", 2, |frame| {
            let a = frame.arg(0)?.as_i64().ok_or(Status::TypeMismatch)?;
            let b = frame.arg(1)?.as_i64().ok_or(Status::TypeMismatch)?;
            Ok(Value::I64(a + b))
        })
        .method("Divide", 2, |frame| {
            let a = frame.arg(0)?.as_f64().ok_or(Status::TypeMismatch)?;
            let b = frame.arg(1)?.as_f64().ok_or(Status::TypeMismatch)?;
            if b == 0.0 {
                return Err(MemberError::raise("division by zero"));
            }
            Ok(Value::F64(a / b))
        })
        .method("Describe", 1, |frame| {
            let name = frame.arg(0)?;
            let name = name.as_str().ok_or(Status::TypeMismatch)?;
            Ok(Value::string(format!("hello, {}", name)))
        })
        .method("Double", 1, |frame| {
            let n = frame.arg(0)?.as_i64().ok_or(Status::TypeMismatch)?;
            frame.store(0, &Value::I32((n * 2) as i32))?;
            Ok(Value::Empty)
        })
        .getter("Total", 0, move |_| Ok(Value::I64(*read.lock())))
        .setter("Total", 0, move |frame| {
            *write.lock() = frame.value()?.as_i64().ok_or(Status::TypeMismatch)?;
            Ok(Value::Empty)
        })
        .build()
}

// ═══════════════════════════════════════════════════════════════════════
// Packing Conventions
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_arguments_arrive_reversed() {
    let f = fixture();
    let recorder = Arc::new(Recorder::default());
    let args = [Value::I32(1), Value::I32(2), Value::I32(3)];
    let count = f.invoker.call_method(&*recorder, "Record", &args).unwrap();
    assert_eq!(count, Value::I32(3));

    let calls = recorder.calls.lock();
    assert_eq!(calls[0].0, MemberId(7));
    assert_eq!(calls[0].2, vec![3, 2, 1]);
    assert!(calls[0].3.is_empty());
    assert!(f.heap.is_clean());
}

#[test]
fn test_puts_carry_the_marker() {
    let f = fixture();
    let recorder = Arc::new(Recorder::default());
    f.invoker
        .put_property(&*recorder, "Record", &[Value::I32(4), Value::I32(9)])
        .unwrap();
    f.invoker
        .put_property_ref(&*recorder, "Record", &[Value::I32(5)])
        .unwrap();
    f.invoker.get_property(&*recorder, "Record", &[]).unwrap();

    let calls = recorder.calls.lock();
    assert_eq!(calls[0].1, CallKind::PropertyPut);
    assert_eq!(calls[0].2, vec![9, 4]);
    assert_eq!(calls[0].3, vec![MemberId::PROPERTY_PUT]);
    assert_eq!(calls[1].1, CallKind::PropertyPutRef);
    assert_eq!(calls[1].3, vec![MemberId::PROPERTY_PUT]);
    assert_eq!(calls[2].1, CallKind::PropertyGet);
    assert!(calls[2].3.is_empty());
}

#[test]
fn test_unknown_name_never_dispatches() {
    let f = fixture();
    let recorder = Arc::new(Recorder::default());
    let err = f
        .invoker
        .call_method(&*recorder, "Missing", &[Value::string("unused")])
        .unwrap_err();
    assert!(matches!(err, InvokeError::NameNotFound { ref name } if name == "Missing"));
    assert_eq!(err.status(), Status::NameNotFound);
    assert!(recorder.calls.lock().is_empty());
    assert!(f.heap.is_clean());
}

#[test]
fn test_unconvertible_argument_fails_before_dispatch() {
    struct Opaque;
    let f = fixture();
    let recorder = Arc::new(Recorder::default());
    let err = f
        .invoker
        .call_method(
            &*recorder,
            "Record",
            &[Value::string("leak?"), Value::native(Opaque)],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        InvokeError::Conversion(ConversionError::UnsupportedNativeType { .. })
    ));
    assert!(recorder.calls.lock().is_empty());
    assert!(f.heap.is_clean());
}

// ═══════════════════════════════════════════════════════════════════════
// Results and Failures
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_method_results() {
    let f = fixture();
    let calc = calculator(&f.registry).into_ref();
    assert_eq!(
        f.invoker
            .call_method(&*calc, "add", &[Value::I32(2), Value::I64(40)])
            .unwrap(),
        Value::I64(42)
    );
    assert_eq!(
        f.invoker
            .call_method(&*calc, "Describe", &[Value::string("world")])
            .unwrap(),
        Value::string("hello, world")
    );
    assert!(f.heap.is_clean());
}

#[test]
fn test_property_round_trip() {
    let f = fixture();
    let calc = calculator(&f.registry).into_ref();
    f.invoker
        .put_property(&*calc, "Total", &[Value::I64(12)])
        .unwrap();
    assert_eq!(
        f.invoker.get_property(&*calc, "Total", &[]).unwrap(),
        Value::I64(12)
    );
}

#[test]
fn test_callee_error_carries_diagnostic() {
    let f = fixture();
    let calc = calculator(&f.registry).into_ref();
    let err = f
        .invoker
        .call_method(&*calc, "Divide", &[Value::F64(1.0), Value::F64(0.0)])
        .unwrap_err();
    assert_eq!(err.status(), Status::CalleeRaisedError);
    let diagnostic = err.diagnostic().unwrap();
    assert_eq!(diagnostic.source.as_deref(), Some("Calc"));
    assert_eq!(diagnostic.description.as_deref(), Some("division by zero"));
    assert_eq!(diagnostic.scode, Status::Unknown.code());
    assert_eq!(err.to_string(), "`Divide` raised: division by zero");
    // the record's strings were released after rendering
    assert!(f.heap.is_clean());
}

#[test]
fn test_unreadable_diagnostic_is_reported_and_freed() {
    let f = fixture();
    let callee = Arc::new(Garbled::default());
    let err = f.invoker.call_method(&*callee, "Fail", &[]).unwrap_err();
    assert_eq!(err.status(), Status::CalleeRaisedError);
    let diagnostic = err.diagnostic().unwrap();
    assert_eq!(diagnostic.scode, 7);
    assert_eq!(diagnostic.source.as_deref(), Some("Src"));
    assert_eq!(diagnostic.description.as_deref(), Some("desc"));
    assert_eq!(diagnostic.help_file, None);
    assert_eq!(f.heap.live_strings(), 0);
}

#[test]
fn test_protocol_errors_have_no_diagnostic() {
    let f = fixture();
    let calc = calculator(&f.registry).into_ref();
    let err = f
        .invoker
        .call_method(&*calc, "Add", &[Value::I32(1)])
        .unwrap_err();
    assert!(matches!(
        err,
        InvokeError::Protocol {
            status: Status::BadParamCount,
            ..
        }
    ));
    assert!(err.diagnostic().is_none());

    let err = f.invoker.get_property(&*calc, "Add", &[]).unwrap_err();
    assert_eq!(err.status(), Status::MemberNotFound);
    assert!(f.heap.is_clean());
}

#[test]
fn test_by_ref_argument_written_back() {
    let f = fixture();
    let calc = calculator(&f.registry).into_ref();
    let member = f.invoker.resolve_name(&*calc, "Double").unwrap();
    let mut params = f
        .invoker
        .packer()
        .pack(CallKind::Method, &[Value::by_ref(21i32)])
        .unwrap();
    let result = f
        .invoker
        .invoke(&*calc, member, CallKind::Method, &mut params)
        .unwrap();
    assert_eq!(result.value().unwrap(), Value::Empty);
    assert_eq!(
        params.by_ref_result(0, &f.registry, &f.heap).unwrap(),
        Some(Value::I32(42))
    );
    drop(result);
    params.clear(&f.heap).unwrap();
    assert!(f.heap.is_clean());
}

#[test]
#[should_panic(expected = "unknown name `Nope`")]
fn test_must_call_panics_on_failure() {
    let f = fixture();
    let calc = calculator(&f.registry).into_ref();
    f.invoker.must_call_method(&*calc, "Nope", &[]);
}

#[test]
fn test_must_call_releases_before_panicking() {
    let f = fixture();
    let calc = calculator(&f.registry).into_ref();
    let failing = [
        // strings that Divide cannot read as numbers
        vec![Value::string("ten"), Value::string("two")],
        // raises a diagnostic with foreign strings
        vec![Value::I32(1), Value::I32(0)],
    ];
    for args in failing {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            f.invoker.must_call_method(&*calc, "Divide", &args)
        }));
        assert!(outcome.is_err());
        assert!(f.heap.is_clean());
    }
}

#[test]
fn test_must_call_returns_value() {
    let f = fixture();
    let calc = calculator(&f.registry).into_ref();
    let value = f
        .invoker
        .must_call_method(&*calc, "Add", &[Value::I32(1), Value::I32(1)]);
    assert_eq!(value, Value::I64(2));
}

// ═══════════════════════════════════════════════════════════════════════
// Reference Counting
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_object_results_balance_references() {
    let f = fixture();
    let child = calculator(&f.registry);
    let child_ref = Arc::clone(&child).into_ref();
    let handed_out = child_ref.clone();
    let parent = DispatchObject::builder("Parent", Arc::clone(&f.registry))
        .getter("Child", 0, move |_| Ok(Value::Dispatch(handed_out.clone())))
        .build()
        .into_ref();
    assert_eq!(child.ref_count(), 2);

    let value = f.invoker.get_property(&*parent, "Child", &[]).unwrap();
    assert_eq!(child.ref_count(), 3);
    let got = match value {
        Value::Dispatch(d) => d,
        other => panic!("expected a dispatch object, got {:?}", other),
    };
    assert_eq!(
        f.invoker
            .call_method(&*got, "Add", &[Value::I32(3), Value::I32(4)])
            .unwrap(),
        Value::I64(7)
    );

    drop(got);
    assert_eq!(child.ref_count(), 2);
    drop(parent);
    assert_eq!(child.ref_count(), 1);
    drop(child_ref);
    assert_eq!(child.ref_count(), 0);
    assert!(f.heap.is_clean());
}

#[test]
fn test_object_arguments_are_not_consumed() {
    let f = fixture();
    let recorder = Arc::new(Recorder::default());
    let target = calculator(&f.registry);
    let arg = Value::Dispatch(Arc::clone(&target).into_ref());
    let _ = f.invoker.call_method(&*recorder, "Record", &[arg.clone()]);
    assert_eq!(target.ref_count(), 1);
    drop(arg);
    assert_eq!(target.ref_count(), 0);
    assert!(f.heap.is_clean());
}

// ═══════════════════════════════════════════════════════════════════════
// Bound Objects
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_bound_object_caches_per_instance() {
    let f = fixture();
    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());
    let bound_first = LateBound::new(f.invoker.clone(), ObjectRef::adopt(Arc::clone(&first) as Arc<dyn Dispatch>));
    let bound_second = LateBound::new(f.invoker.clone(), ObjectRef::adopt(Arc::clone(&second) as Arc<dyn Dispatch>));

    bound_first.call_method("Record", &[]).unwrap();
    bound_first.call_method("Record", &[Value::I32(1)]).unwrap();
    assert_eq!(first.lookups.load(Ordering::SeqCst), 1);
    assert_eq!(bound_first.cached_ids(), 1);

    bound_second.call_method("Record", &[]).unwrap();
    assert_eq!(second.lookups.load(Ordering::SeqCst), 1);

    bound_first.forget_ids();
    bound_first.call_method("Record", &[]).unwrap();
    assert_eq!(first.lookups.load(Ordering::SeqCst), 2);
}

#[test]
fn test_bound_object_without_cache() {
    let f = fixture();
    let recorder = Arc::new(Recorder::default());
    let invoker = f
        .invoker
        .clone()
        .with_config(InvokeConfig::new().with_member_id_cache(false));
    let bound = LateBound::new(invoker, ObjectRef::adopt(Arc::clone(&recorder) as Arc<dyn Dispatch>));
    bound.call_method("Record", &[]).unwrap();
    bound.call_method("Record", &[]).unwrap();
    assert_eq!(recorder.lookups.load(Ordering::SeqCst), 2);
    assert_eq!(bound.cached_ids(), 0);
}

#[test]
fn test_bound_errors_name_the_member() {
    let f = fixture();
    let calc = calculator(&f.registry).into_ref();
    let bound = LateBound::new(f.invoker.clone(), calc);
    let err = bound.call_method("Add", &[]).unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("`Add` failed: invalid number of parameters ({:#010x})", Status::BadParamCount.code())
    );
}
