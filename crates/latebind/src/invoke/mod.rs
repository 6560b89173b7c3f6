//! Late-bound invocation
//!
//! Every call runs `NameResolution -> Dispatch -> ResultDecode` and ends in
//! `Success` or `Failed`. Resolution always finishes before dispatch starts.
//! Whatever the outcome, the packed arguments, the result slot, and any
//! diagnostic strings are released before the call returns.

mod bound;
mod dispatch;
mod enumerator;

pub use bound::LateBound;
pub use dispatch::{Dispatch, DispatchCall, MemberId, MemberInfo, TypeInfo};
pub use enumerator::{EnumIter, EnumVariant, Enumerator};

use std::fmt;
use std::sync::Arc;

use crate::config::InvokeConfig;
use crate::diagnostic::{Diagnostic, DiagnosticRecord};
use crate::error::{InvokeError, Status};
use crate::heap::ForeignHeap;
use crate::pack::{ArgumentPacker, CallKind, ParamBlock};
use crate::registry::ConversionRegistry;
use crate::value::Value;
use crate::variant::{OwnedValue, TaggedValue};

/// Where a call currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    /// Mapping the member name to an identifier
    NameResolution,
    /// Waiting on the callee
    Dispatch,
    /// Decoding the result
    ResultDecode,
    /// Finished with a result
    Success,
    /// Finished with an error
    Failed,
}

/// Performs late-bound calls against dispatch objects.
///
/// Cheap to clone; clones share the registry and heap.
#[derive(Clone)]
pub struct Invoker {
    registry: Arc<ConversionRegistry>,
    heap: Arc<ForeignHeap>,
    packer: ArgumentPacker,
    config: InvokeConfig,
}

impl Invoker {
    /// An invoker with default configuration.
    pub fn new(registry: Arc<ConversionRegistry>, heap: Arc<ForeignHeap>) -> Self {
        Invoker {
            packer: ArgumentPacker::new(Arc::clone(&registry), Arc::clone(&heap)),
            registry,
            heap,
            config: InvokeConfig::default(),
        }
    }

    /// Replace the configuration.
    pub fn with_config(self, config: InvokeConfig) -> Self {
        Invoker { config, ..self }
    }

    /// The conversion registry
    pub fn registry(&self) -> &Arc<ConversionRegistry> {
        &self.registry
    }

    /// The foreign heap
    pub fn heap(&self) -> &Arc<ForeignHeap> {
        &self.heap
    }

    /// The argument packer
    pub fn packer(&self) -> &ArgumentPacker {
        &self.packer
    }

    /// The configuration
    pub fn config(&self) -> &InvokeConfig {
        &self.config
    }

    fn phase(&self, phase: CallPhase, member: &str) {
        if self.config.trace_calls {
            tracing::trace!(?phase, member, "call phase");
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Name Resolution
    // ═══════════════════════════════════════════════════════════════════

    /// Resolve one member name on this object.
    pub fn resolve_name(&self, object: &dyn Dispatch, name: &str) -> Result<MemberId, InvokeError> {
        self.phase(CallPhase::NameResolution, name);
        let ids = self.resolve_names(object, &[name])?;
        ids.first().copied().ok_or_else(|| InvokeError::NameNotFound {
            name: name.to_string(),
        })
    }

    /// Resolve a member name and parameter names in one request.
    pub fn resolve_names(
        &self,
        object: &dyn Dispatch,
        names: &[&str],
    ) -> Result<Vec<MemberId>, InvokeError> {
        let label = names.first().copied().unwrap_or_default();
        match object.ids_of_names(names, self.config.locale) {
            Ok(ids) if ids.len() == names.len() && !ids.contains(&MemberId::UNKNOWN) => Ok(ids),
            Ok(_) | Err(Status::NameNotFound) => Err(InvokeError::NameNotFound {
                name: label.to_string(),
            }),
            Err(status) => Err(InvokeError::Protocol {
                member: label.to_string(),
                status,
            }),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Invocation
    // ═══════════════════════════════════════════════════════════════════

    /// Invoke a resolved member with an already packed block. The block
    /// stays owned by the caller; the result is owned by the returned value.
    pub fn invoke(
        &self,
        object: &dyn Dispatch,
        member: MemberId,
        kind: CallKind,
        params: &mut ParamBlock,
    ) -> Result<OwnedValue, InvokeError> {
        self.dispatch(object, &member.to_string(), member, kind, params)
    }

    fn dispatch(
        &self,
        object: &dyn Dispatch,
        label: &str,
        member: MemberId,
        kind: CallKind,
        params: &mut ParamBlock,
    ) -> Result<OwnedValue, InvokeError> {
        self.phase(CallPhase::Dispatch, label);
        let mut result = TaggedValue::init();
        let mut record = DiagnosticRecord::new();
        let call = DispatchCall {
            member,
            kind,
            locale: self.config.locale,
            params,
            heap: &self.heap,
        };
        let status = object.invoke(call, &mut result, &mut record);

        if status.is_success() {
            if record.is_set() {
                let stray = self.drain(&mut record);
                tracing::debug!(member = label, diagnostic = %stray, "diagnostic filled on success");
            }
            tracing::debug!(member = label, %kind, "call succeeded");
            return Ok(OwnedValue::new(
                result,
                Arc::clone(&self.heap),
                Arc::clone(&self.registry),
            ));
        }

        self.phase(CallPhase::Failed, label);
        if let Err(e) = result.clear(&self.heap) {
            tracing::warn!(member = label, error = %e, "failed to clear result of failed call");
        }
        tracing::debug!(member = label, %kind, %status, "call failed");
        if status == Status::CalleeRaisedError {
            let diagnostic = self.drain(&mut record);
            return Err(InvokeError::Callee {
                member: label.to_string(),
                diagnostic,
            });
        }
        if record.is_set() {
            let stray = self.drain(&mut record);
            tracing::debug!(member = label, diagnostic = %stray, "diagnostic filled on protocol error");
        }
        Err(InvokeError::Protocol {
            member: label.to_string(),
            status,
        })
    }

    /// Render, then release, a diagnostic record. The record's strings are
    /// freed even when some of them cannot be read.
    fn drain(&self, record: &mut DiagnosticRecord) -> Diagnostic {
        let diagnostic = record.render_lossy(&self.heap).clone();
        if let Err(e) = record.release(&self.heap) {
            tracing::warn!(error = %e, "failed to release diagnostic record");
        }
        diagnostic
    }

    /// Pack, dispatch, decode, and release, for an already resolved member.
    pub fn call_by_id(
        &self,
        object: &dyn Dispatch,
        member: MemberId,
        kind: CallKind,
        args: &[Value],
    ) -> Result<Value, InvokeError> {
        self.call_resolved(object, &member.to_string(), member, kind, args)
    }

    fn call_resolved(
        &self,
        object: &dyn Dispatch,
        label: &str,
        member: MemberId,
        kind: CallKind,
        args: &[Value],
    ) -> Result<Value, InvokeError> {
        let mut params = self.packer.pack(kind, args)?;
        let outcome = self.dispatch(object, label, member, kind, &mut params);
        if let Err(e) = params.clear(&self.heap) {
            tracing::warn!(member = label, error = %e, "failed to release arguments");
        }
        let result = outcome?;
        self.phase(CallPhase::ResultDecode, label);
        let value = result.value()?;
        self.phase(CallPhase::Success, label);
        Ok(value)
    }

    /// Resolve `name`, then call it.
    #[tracing::instrument(level = "debug", skip(self, object, args), fields(args = args.len()))]
    pub fn call(
        &self,
        object: &dyn Dispatch,
        name: &str,
        kind: CallKind,
        args: &[Value],
    ) -> Result<Value, InvokeError> {
        let member = self.resolve_name(object, name)?;
        self.call_resolved(object, name, member, kind, args)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Convenience Forms
    // ═══════════════════════════════════════════════════════════════════

    /// Call a method by name.
    pub fn call_method(&self, object: &dyn Dispatch, name: &str, args: &[Value]) -> Result<Value, InvokeError> {
        self.call(object, name, CallKind::Method, args)
    }

    /// Read a property by name. `args` are index arguments, if any.
    pub fn get_property(&self, object: &dyn Dispatch, name: &str, args: &[Value]) -> Result<Value, InvokeError> {
        self.call(object, name, CallKind::PropertyGet, args)
    }

    /// Assign a property by value. The last argument is the new value.
    pub fn put_property(&self, object: &dyn Dispatch, name: &str, args: &[Value]) -> Result<Value, InvokeError> {
        self.call(object, name, CallKind::PropertyPut, args)
    }

    /// Assign a property by reference. The last argument is the new value.
    pub fn put_property_ref(
        &self,
        object: &dyn Dispatch,
        name: &str,
        args: &[Value],
    ) -> Result<Value, InvokeError> {
        self.call(object, name, CallKind::PropertyPutRef, args)
    }

    /// [`Invoker::call_method`], panicking on failure after cleanup.
    #[track_caller]
    pub fn must_call_method(&self, object: &dyn Dispatch, name: &str, args: &[Value]) -> Value {
        must(self.call_method(object, name, args))
    }

    /// [`Invoker::get_property`], panicking on failure after cleanup.
    #[track_caller]
    pub fn must_get_property(&self, object: &dyn Dispatch, name: &str, args: &[Value]) -> Value {
        must(self.get_property(object, name, args))
    }

    /// [`Invoker::put_property`], panicking on failure after cleanup.
    #[track_caller]
    pub fn must_put_property(&self, object: &dyn Dispatch, name: &str, args: &[Value]) -> Value {
        must(self.put_property(object, name, args))
    }

    /// [`Invoker::put_property_ref`], panicking on failure after cleanup.
    #[track_caller]
    pub fn must_put_property_ref(&self, object: &dyn Dispatch, name: &str, args: &[Value]) -> Value {
        must(self.put_property_ref(object, name, args))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Enumeration
    // ═══════════════════════════════════════════════════════════════════

    /// Get an enumerator over a collection object through its
    /// [`MemberId::NEW_ENUM`] member.
    pub fn enumerate(&self, object: &dyn Dispatch) -> Result<Enumerator, InvokeError> {
        let label = "_NewEnum";
        let value = self.call_resolved(object, label, MemberId::NEW_ENUM, CallKind::PropertyGet, &[])?;
        let queried = match &value {
            Value::Object(o) => o.query_enum(),
            Value::Dispatch(d) => d.query_enum(),
            _ => Err(Status::NoInterface),
        };
        let inner = queried.map_err(|status| InvokeError::Protocol {
            member: label.to_string(),
            status,
        })?;
        Ok(Enumerator::new(
            inner,
            Arc::clone(&self.registry),
            Arc::clone(&self.heap),
            self.config.enum_batch_size,
        ))
    }

    /// Walk a collection, calling `f` for every item.
    pub fn for_each<F: FnMut(Value)>(&self, object: &dyn Dispatch, f: F) -> Result<(), InvokeError> {
        self.enumerate(object)?.for_each(f)
    }

    /// [`Invoker::for_each`], panicking on failure after cleanup.
    #[track_caller]
    pub fn must_for_each<F: FnMut(Value)>(&self, object: &dyn Dispatch, f: F) {
        must(self.for_each(object, f))
    }
}

#[track_caller]
fn must<T>(result: Result<T, InvokeError>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("{}", e),
    }
}

impl fmt::Debug for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
