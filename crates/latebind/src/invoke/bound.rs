//! A dispatch object bound to an invoker

use dashmap::DashMap;

use crate::error::InvokeError;
use crate::object::ObjectRef;
use crate::pack::CallKind;
use crate::value::Value;

use super::{Dispatch, Enumerator, Invoker, MemberId};

/// One dispatch object plus the invoker that drives it.
///
/// Resolved identifiers are cached per instance, keyed by the exact name
/// used. They are never shared with other objects, even of the same kind.
#[derive(Debug)]
pub struct LateBound {
    object: ObjectRef<dyn Dispatch>,
    invoker: Invoker,
    ids: DashMap<String, MemberId>,
}

impl LateBound {
    /// Bind `object` to `invoker`.
    pub fn new(invoker: Invoker, object: ObjectRef<dyn Dispatch>) -> Self {
        LateBound {
            object,
            invoker,
            ids: DashMap::new(),
        }
    }

    /// The bound object
    pub fn object(&self) -> &ObjectRef<dyn Dispatch> {
        &self.object
    }

    /// The invoker
    pub fn invoker(&self) -> &Invoker {
        &self.invoker
    }

    /// Resolve a member name, consulting the cache first when enabled.
    pub fn member_id(&self, name: &str) -> Result<MemberId, InvokeError> {
        if !self.invoker.config().cache_member_ids {
            return self.invoker.resolve_name(&*self.object, name);
        }
        if let Some(id) = self.ids.get(name) {
            return Ok(*id);
        }
        let id = self.invoker.resolve_name(&*self.object, name)?;
        self.ids.insert(name.to_string(), id);
        Ok(id)
    }

    /// Number of cached identifiers
    pub fn cached_ids(&self) -> usize {
        self.ids.len()
    }

    /// Drop every cached identifier.
    pub fn forget_ids(&self) {
        self.ids.clear();
    }

    /// Call a member by name.
    pub fn call(&self, name: &str, kind: CallKind, args: &[Value]) -> Result<Value, InvokeError> {
        let member = self.member_id(name)?;
        self.invoker.call_resolved(&*self.object, name, member, kind, args)
    }

    /// Call a method.
    pub fn call_method(&self, name: &str, args: &[Value]) -> Result<Value, InvokeError> {
        self.call(name, CallKind::Method, args)
    }

    /// Read a property.
    pub fn get_property(&self, name: &str, args: &[Value]) -> Result<Value, InvokeError> {
        self.call(name, CallKind::PropertyGet, args)
    }

    /// Assign a property by value.
    pub fn put_property(&self, name: &str, args: &[Value]) -> Result<Value, InvokeError> {
        self.call(name, CallKind::PropertyPut, args)
    }

    /// Assign a property by reference.
    pub fn put_property_ref(&self, name: &str, args: &[Value]) -> Result<Value, InvokeError> {
        self.call(name, CallKind::PropertyPutRef, args)
    }

    /// Enumerate the bound collection.
    pub fn enumerate(&self) -> Result<Enumerator, InvokeError> {
        self.invoker.enumerate(&*self.object)
    }
}
