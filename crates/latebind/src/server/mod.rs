//! Serving dispatch objects from Rust closures
//!
//! [`DispatchObject`] is the callee side of the protocol. Members are
//! registered by name when the object is built; each gets a stable
//! identifier (its position, starting at 1). Name lookup ignores ASCII
//! case. On every call the object checks the call kind, the put marker,
//! and the argument count before decoding the arguments into natural order
//! and running the callback.

mod collection;

pub use collection::CollectionEnumerator;

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::diagnostic::DiagnosticRecord;
use crate::error::{ConversionError, InvokeError, MemberError, Status};
use crate::heap::ForeignHeap;
use crate::invoke::{Dispatch, DispatchCall, Invoker, MemberId, MemberInfo, TypeInfo};
use crate::object::{Iid, Interface, Object, ObjectRef, RefCount};
use crate::pack::CallKind;
use crate::registry::ConversionRegistry;
use crate::value::Value;
use crate::variant::TaggedValue;

/// A member callback.
pub type MemberFn = Arc<dyn Fn(&CallFrame<'_>) -> Result<Value, MemberError> + Send + Sync>;

/// Produces the items of a collection object.
pub type CollectionFn = Arc<dyn Fn(&CallFrame<'_>) -> Result<Vec<Value>, MemberError> + Send + Sync>;

/// The name collections are enumerated through.
pub const NEW_ENUM_NAME: &str = "_NewEnum";

// ═══════════════════════════════════════════════════════════════════════
// Call Frames
// ═══════════════════════════════════════════════════════════════════════

/// What a member callback sees: decoded arguments in natural order.
///
/// By-reference arguments arrive as [`Value::Ref`]; [`CallFrame::arg`]
/// follows them and [`CallFrame::store`] writes through them.
pub struct CallFrame<'a> {
    /// The member name as registered
    pub member: &'a str,
    /// How the member was invoked
    pub kind: CallKind,
    /// Locale the caller used
    pub locale: u32,
    args: Vec<Value>,
    registry: &'a ConversionRegistry,
    heap: &'a ForeignHeap,
}

impl<'a> CallFrame<'a> {
    /// Arguments in natural order. For puts the assigned value is last.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Number of arguments
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Check for no arguments
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Argument `index`, following a by-reference argument to its value.
    pub fn arg(&self, index: usize) -> Result<Value, MemberError> {
        match self.args.get(index) {
            Some(Value::Ref(handle)) => Ok(handle.deref(self.registry, self.heap)?),
            Some(value) => Ok(value.clone()),
            None => Err(MemberError::Status(Status::BadParamCount)),
        }
    }

    /// The value being assigned by a put.
    pub fn value(&self) -> Result<Value, MemberError> {
        match self.args.len().checked_sub(1) {
            Some(last) if self.kind.is_put() => self.arg(last),
            _ => Err(MemberError::Status(Status::InvalidArgument)),
        }
    }

    /// Write `value` back through by-reference argument `index`.
    pub fn store(&self, index: usize, value: &Value) -> Result<(), MemberError> {
        match self.args.get(index) {
            Some(Value::Ref(handle)) => Ok(handle.store(value, self.registry, self.heap)?),
            Some(other) => Err(MemberError::Conversion(ConversionError::TypeMismatch {
                expected: "a by-reference argument".to_string(),
                got: other.type_name().to_string(),
            })),
            None => Err(MemberError::Status(Status::BadParamCount)),
        }
    }

    /// The callee's registry
    pub fn registry(&self) -> &ConversionRegistry {
        self.registry
    }

    /// The heap arguments live on
    pub fn heap(&self) -> &ForeignHeap {
        self.heap
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Members
// ═══════════════════════════════════════════════════════════════════════

#[derive(Clone)]
struct Handler {
    /// Exact argument count; `None` accepts any
    arity: Option<usize>,
    func: MemberFn,
}

#[derive(Clone, Default)]
struct Member {
    name: String,
    method: Option<Handler>,
    getter: Option<Handler>,
    setter: Option<Handler>,
    setter_ref: Option<Handler>,
}

impl Member {
    fn handler(&self, kind: CallKind) -> Option<&Handler> {
        match kind {
            CallKind::Method => self.method.as_ref(),
            CallKind::PropertyGet => self.getter.as_ref(),
            CallKind::PropertyPut => self.setter.as_ref(),
            CallKind::PropertyPutRef => self.setter_ref.as_ref(),
        }
    }

    fn kinds(&self) -> Vec<CallKind> {
        [
            CallKind::Method,
            CallKind::PropertyGet,
            CallKind::PropertyPut,
            CallKind::PropertyPutRef,
        ]
        .into_iter()
        .filter(|kind| self.handler(*kind).is_some())
        .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Builder
// ═══════════════════════════════════════════════════════════════════════

/// Builds a [`DispatchObject`].
pub struct DispatchObjectBuilder {
    name: String,
    registry: Arc<ConversionRegistry>,
    members: IndexMap<String, Member>,
    collection: Option<CollectionFn>,
}

impl DispatchObjectBuilder {
    fn entry(&mut self, name: &str) -> &mut Member {
        self.members
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| Member {
                name: name.to_string(),
                ..Member::default()
            })
    }

    fn handler<F>(arity: Option<usize>, func: F) -> Handler
    where
        F: Fn(&CallFrame<'_>) -> Result<Value, MemberError> + Send + Sync + 'static,
    {
        Handler {
            arity,
            func: Arc::new(func),
        }
    }

    /// A method taking exactly `arity` arguments.
    pub fn method<F>(mut self, name: &str, arity: usize, func: F) -> Self
    where
        F: Fn(&CallFrame<'_>) -> Result<Value, MemberError> + Send + Sync + 'static,
    {
        self.entry(name).method = Some(Self::handler(Some(arity), func));
        self
    }

    /// A method taking any number of arguments.
    pub fn variadic<F>(mut self, name: &str, func: F) -> Self
    where
        F: Fn(&CallFrame<'_>) -> Result<Value, MemberError> + Send + Sync + 'static,
    {
        self.entry(name).method = Some(Self::handler(None, func));
        self
    }

    /// A property read with `indices` index arguments.
    pub fn getter<F>(mut self, name: &str, indices: usize, func: F) -> Self
    where
        F: Fn(&CallFrame<'_>) -> Result<Value, MemberError> + Send + Sync + 'static,
    {
        self.entry(name).getter = Some(Self::handler(Some(indices), func));
        self
    }

    /// A by-value property assignment with `indices` index arguments. The
    /// callback receives the indices followed by the new value.
    pub fn setter<F>(mut self, name: &str, indices: usize, func: F) -> Self
    where
        F: Fn(&CallFrame<'_>) -> Result<Value, MemberError> + Send + Sync + 'static,
    {
        self.entry(name).setter = Some(Self::handler(Some(indices + 1), func));
        self
    }

    /// A by-reference property assignment with `indices` index arguments.
    pub fn setter_ref<F>(mut self, name: &str, indices: usize, func: F) -> Self
    where
        F: Fn(&CallFrame<'_>) -> Result<Value, MemberError> + Send + Sync + 'static,
    {
        self.entry(name).setter_ref = Some(Self::handler(Some(indices + 1), func));
        self
    }

    /// Make the object a collection: [`MemberId::NEW_ENUM`] hands out an
    /// enumerator over whatever `items` returns at that moment.
    pub fn collection<F>(mut self, items: F) -> Self
    where
        F: Fn(&CallFrame<'_>) -> Result<Vec<Value>, MemberError> + Send + Sync + 'static,
    {
        self.collection = Some(Arc::new(items));
        self
    }

    /// Finish. The returned Arc carries the creator's reference; hand it to
    /// [`DispatchObject::into_ref`] to manage it.
    pub fn build(self) -> Arc<DispatchObject> {
        tracing::debug!(object = %self.name, members = self.members.len(), "built dispatch object");
        Arc::new(DispatchObject {
            name: self.name,
            registry: self.registry,
            members: self.members,
            collection: self.collection,
            refs: RefCount::new(),
            sinks: Mutex::new(IndexMap::new()),
            next_cookie: AtomicU32::new(0),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// The Object
// ═══════════════════════════════════════════════════════════════════════

/// A dispatch object whose members are Rust closures.
pub struct DispatchObject {
    name: String,
    registry: Arc<ConversionRegistry>,
    members: IndexMap<String, Member>,
    collection: Option<CollectionFn>,
    refs: RefCount,
    sinks: Mutex<IndexMap<u32, ObjectRef<dyn Dispatch>>>,
    next_cookie: AtomicU32,
}

impl DispatchObject {
    /// Start building an object. `registry` decodes arguments and encodes
    /// results.
    pub fn builder(name: impl Into<String>, registry: Arc<ConversionRegistry>) -> DispatchObjectBuilder {
        DispatchObjectBuilder {
            name: name.into(),
            registry,
            members: IndexMap::new(),
            collection: None,
        }
    }

    /// Take over the creator's reference.
    pub fn into_ref(self: Arc<Self>) -> ObjectRef<dyn Dispatch> {
        ObjectRef::adopt(self)
    }

    /// The object's name, used as the source of raised errors
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current reference count
    pub fn ref_count(&self) -> u32 {
        self.refs.count()
    }

    /// Served members in registration order
    pub fn members(&self) -> Vec<MemberInfo> {
        let mut listed: Vec<MemberInfo> = self
            .members
            .values()
            .enumerate()
            .map(|(index, member)| MemberInfo {
                id: MemberId(index as i32 + 1),
                name: member.name.clone(),
                kinds: member.kinds(),
            })
            .collect();
        if self.collection.is_some() {
            listed.push(MemberInfo {
                id: MemberId::NEW_ENUM,
                name: NEW_ENUM_NAME.to_string(),
                kinds: vec![CallKind::Method, CallKind::PropertyGet],
            });
        }
        listed
    }

    // ═══════════════════════════════════════════════════════════════════
    // Event Sinks
    // ═══════════════════════════════════════════════════════════════════

    /// Connect an event sink. The object holds a reference to the sink
    /// until [`DispatchObject::unadvise`] is called with the returned
    /// cookie.
    pub fn advise(&self, sink: ObjectRef<dyn Dispatch>) -> u32 {
        let cookie = self.next_cookie.fetch_add(1, Ordering::Relaxed) + 1;
        self.sinks.lock().insert(cookie, sink);
        tracing::debug!(object = %self.name, cookie, "sink connected");
        cookie
    }

    /// Disconnect a sink and release it.
    pub fn unadvise(&self, cookie: u32) -> Result<(), Status> {
        let removed = self.sinks.lock().shift_remove(&cookie);
        match removed {
            Some(_) => {
                tracing::debug!(object = %self.name, cookie, "sink disconnected");
                Ok(())
            }
            None => Err(Status::InvalidArgument),
        }
    }

    /// Number of connected sinks
    pub fn sink_count(&self) -> usize {
        self.sinks.lock().len()
    }

    /// Call `event` as a method on every connected sink, in connection
    /// order, and return how many handled it. Sinks without that member
    /// are skipped. A failing sink does not stop delivery to the others;
    /// the first failure is returned once all have been called.
    pub fn fire(&self, invoker: &Invoker, event: &str, args: &[Value]) -> Result<usize, InvokeError> {
        let sinks: Vec<ObjectRef<dyn Dispatch>> = self.sinks.lock().values().cloned().collect();
        let mut delivered = 0;
        let mut failure = None;
        for sink in &sinks {
            match invoker.call_method(&**sink, event, args) {
                Ok(_) => delivered += 1,
                Err(InvokeError::NameNotFound { .. }) => {}
                Err(e) => {
                    tracing::debug!(object = %self.name, event, error = %e, "sink failed");
                    failure.get_or_insert(e);
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(delivered),
        }
    }

    fn lookup(&self, name: &str) -> Option<MemberId> {
        if self.collection.is_some() && name.eq_ignore_ascii_case(NEW_ENUM_NAME) {
            return Some(MemberId::NEW_ENUM);
        }
        self.members
            .get_index_of(&name.to_ascii_lowercase())
            .map(|index| MemberId(index as i32 + 1))
    }

    fn member(&self, id: MemberId) -> Option<&Member> {
        let index = usize::try_from(id.0).ok()?.checked_sub(1)?;
        self.members.get_index(index).map(|(_, member)| member)
    }

    /// Decode the block into natural order. By-reference arguments stay
    /// references.
    fn frame<'a>(&'a self, member: &'a str, call: &DispatchCall<'a>) -> Result<CallFrame<'a>, Status> {
        let mut args = Vec::with_capacity(call.params.len());
        for index in 0..call.params.len() {
            let raw = call.params.natural_arg(index).ok_or(Status::BadParamCount)?;
            let value = self.registry.decode(raw, call.heap).map_err(|e| {
                tracing::debug!(member, index, error = %e, "argument did not decode");
                Status::TypeMismatch
            })?;
            args.push(value);
        }
        Ok(CallFrame {
            member,
            kind: call.kind,
            locale: call.locale,
            args,
            registry: &self.registry,
            heap: call.heap,
        })
    }

    fn check_named(call: &DispatchCall<'_>) -> Result<(), Status> {
        let named = call.params.named_args();
        let expected: &[MemberId] = if call.kind.is_put() {
            &[MemberId::PROPERTY_PUT]
        } else {
            &[]
        };
        if named == expected {
            Ok(())
        } else {
            Err(Status::InvalidArgument)
        }
    }

    /// Turn a callback outcome into a status, filling `result` or
    /// `diagnostic`.
    fn finish(
        &self,
        outcome: Result<Value, MemberError>,
        heap: &ForeignHeap,
        result: &mut TaggedValue,
        diagnostic: &mut DiagnosticRecord,
    ) -> Status {
        match outcome {
            Ok(value) => match self.registry.encode_value(&value, heap) {
                Ok(encoded) => {
                    *result = encoded;
                    Status::Success
                }
                Err(e) => {
                    tracing::debug!(object = %self.name, error = %e, "result did not encode");
                    Status::TypeMismatch
                }
            },
            Err(MemberError::Status(status)) => status,
            Err(MemberError::Raised {
                scode,
                origin,
                description,
            }) => {
                let origin = origin.as_deref().unwrap_or(&self.name);
                *diagnostic = DiagnosticRecord::raise(heap, scode, origin, &description);
                Status::CalleeRaisedError
            }
            Err(MemberError::Conversion(e)) => {
                tracing::debug!(object = %self.name, error = %e, "callback conversion failed");
                Status::TypeMismatch
            }
        }
    }

    fn enumerate(&self, collection: &CollectionFn, frame: &CallFrame<'_>) -> Result<Value, MemberError> {
        let items = collection(frame)?;
        let enumerator = CollectionEnumerator::new(items, Arc::clone(&self.registry));
        Ok(Value::Object(ObjectRef::adopt(Arc::new(enumerator))))
    }
}

impl Object for DispatchObject {
    fn add_ref(&self) -> u32 {
        self.refs.add_ref()
    }

    fn release(&self) -> Result<u32, Status> {
        let count = self.refs.release()?;
        if count == 0 {
            tracing::trace!(object = %self.name, "last reference released");
        }
        Ok(count)
    }

    fn query_interface(self: Arc<Self>, iid: Iid) -> Result<Interface, Status> {
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

impl Dispatch for DispatchObject {
    fn ids_of_names(&self, names: &[&str], _locale: u32) -> Result<Vec<MemberId>, Status> {
        match names {
            // served members take positional arguments only
            [name] => self.lookup(name).map(|id| vec![id]).ok_or(Status::NameNotFound),
            _ => Err(Status::NameNotFound),
        }
    }

    fn invoke(
        &self,
        call: DispatchCall<'_>,
        result: &mut TaggedValue,
        diagnostic: &mut DiagnosticRecord,
    ) -> Status {
        if let Err(status) = Self::check_named(&call) {
            return status;
        }

        if call.member == MemberId::NEW_ENUM {
            let Some(collection) = &self.collection else {
                return Status::MemberNotFound;
            };
            if call.kind.is_put() {
                return Status::MemberNotFound;
            }
            if !call.params.is_empty() {
                return Status::BadParamCount;
            }
            let frame = match self.frame(NEW_ENUM_NAME, &call) {
                Ok(frame) => frame,
                Err(status) => return status,
            };
            let outcome = self.enumerate(collection, &frame);
            return self.finish(outcome, call.heap, result, diagnostic);
        }

        let Some(member) = self.member(call.member) else {
            return Status::MemberNotFound;
        };
        let Some(handler) = member.handler(call.kind) else {
            return Status::MemberNotFound;
        };
        if handler.arity.is_some_and(|arity| arity != call.params.len()) {
            return Status::BadParamCount;
        }
        let frame = match self.frame(&member.name, &call) {
            Ok(frame) => frame,
            Err(status) => return status,
        };
        tracing::trace!(object = %self.name, member = %member.name, kind = %call.kind, "serving call");
        let outcome = (handler.func)(&frame);
        self.finish(outcome, call.heap, result, diagnostic)
    }

    fn type_info(&self) -> Result<TypeInfo, Status> {
        Ok(TypeInfo {
            name: self.name.clone(),
            members: self.members(),
        })
    }
}

impl fmt::Debug for DispatchObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchObject")
            .field("name", &self.name)
            .field("members", &self.members.keys().collect::<Vec<_>>())
            .field("refs", &self.refs.count())
            .field("sinks", &self.sink_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::ArgumentPacker;

    fn counter(registry: &Arc<ConversionRegistry>) -> Arc<DispatchObject> {
        DispatchObject::builder("Counter", Arc::clone(registry))
            .method("Add", 2, |frame| {
                let a = frame.arg(0)?.as_i64().ok_or(Status::TypeMismatch)?;
                let b = frame.arg(1)?.as_i64().ok_or(Status::TypeMismatch)?;
                Ok(Value::I32((a + b) as i32))
            })
            .getter("Name", 0, |_| Ok(Value::string("counter")))
            .build()
    }

    #[test]
    fn test_names_resolve_case_insensitively() {
        let registry = ConversionRegistry::shared();
        let object = counter(&registry);
        assert_eq!(object.ids_of_names(&["add"], 0), Ok(vec![MemberId(1)]));
        assert_eq!(object.ids_of_names(&["NAME"], 0), Ok(vec![MemberId(2)]));
        assert_eq!(object.ids_of_names(&["Nope"], 0), Err(Status::NameNotFound));
        assert_eq!(object.ids_of_names(&["_NewEnum"], 0), Err(Status::NameNotFound));
    }

    #[test]
    fn test_arity_and_kind_are_checked() {
        let registry = ConversionRegistry::shared();
        let heap = ForeignHeap::shared();
        let packer = ArgumentPacker::new(Arc::clone(&registry), Arc::clone(&heap));
        let object = counter(&registry);

        let mut one = packer.pack(CallKind::Method, &[Value::I32(1)]).unwrap();
        let call = DispatchCall {
            member: MemberId(1),
            kind: CallKind::Method,
            locale: 0,
            params: &one,
            heap: &heap,
        };
        let mut result = TaggedValue::init();
        let mut record = DiagnosticRecord::new();
        assert_eq!(object.invoke(call, &mut result, &mut record), Status::BadParamCount);

        let call = DispatchCall {
            kind: CallKind::PropertyGet,
            ..call
        };
        assert_eq!(object.invoke(call, &mut result, &mut record), Status::MemberNotFound);
        assert!(result.is_empty());
        one.clear(&heap).unwrap();
        assert!(heap.is_clean());
    }

    #[test]
    fn test_put_without_marker_is_rejected() {
        let registry = ConversionRegistry::shared();
        let heap = ForeignHeap::shared();
        let object = DispatchObject::builder("Box", Arc::clone(&registry))
            .setter("Value", 0, |_| Ok(Value::Empty))
            .build();
        let params = crate::pack::ParamBlock::from_raw_parts(vec![TaggedValue::from_i32(3)], vec![]);
        let call = DispatchCall {
            member: MemberId(1),
            kind: CallKind::PropertyPut,
            locale: 0,
            params: &params,
            heap: &heap,
        };
        let mut result = TaggedValue::init();
        let mut record = DiagnosticRecord::new();
        assert_eq!(object.invoke(call, &mut result, &mut record), Status::InvalidArgument);
    }

    #[test]
    fn test_members_listing() {
        let registry = ConversionRegistry::shared();
        let object = DispatchObject::builder("List", Arc::clone(&registry))
            .getter("Count", 0, |_| Ok(Value::I32(0)))
            .setter("Count", 0, |_| Ok(Value::Empty))
            .collection(|_| Ok(Vec::new()))
            .build();
        let members = object.members();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].kinds, vec![CallKind::PropertyGet, CallKind::PropertyPut]);
        assert_eq!(members[1].id, MemberId::NEW_ENUM);
    }

    #[test]
    fn test_query_interface_counts_references() {
        let registry = ConversionRegistry::shared();
        let object = counter(&registry);
        let held = Arc::clone(&object).into_ref();
        let unknown = held.query_unknown().unwrap();
        assert_eq!(object.ref_count(), 2);
        assert_eq!(held.query_enum().err(), Some(Status::NoInterface));
        drop(unknown);
        drop(held);
        assert_eq!(object.ref_count(), 0);
    }
}
