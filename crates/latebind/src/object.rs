//! Reference-counted objects
//!
//! Objects follow the automation lifetime rules: every holder owns one
//! reference, `add_ref` and `release` adjust the count explicitly, and a
//! successful capability query hands back a new reference. [`ObjectRef`]
//! is the RAII holder that pairs each acquired reference with exactly one
//! release.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::Status;
use crate::invoke::{Dispatch, EnumVariant};
use crate::tag::VarKind;

/// Interface identifier used by capability queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Iid(pub u128);

impl Iid {
    /// The base object capability
    pub const UNKNOWN: Iid = Iid(0x0000_0000_0000_0000_c000_0000_0000_0046);
    /// Late-bound dispatch
    pub const DISPATCH: Iid = Iid(0x0002_0400_0000_0000_c000_0000_0000_0046);
    /// Variant enumeration
    pub const ENUM_VARIANT: Iid = Iid(0x0002_0404_0000_0000_c000_0000_0000_0046);
}

impl fmt::Display for Iid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{{{:08x}-{:04x}-{:04x}-{:04x}-{:012x}}}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xffff_ffff_ffff
        )
    }
}

/// A reference counter for object implementations.
///
/// Starts at one, the reference held by whoever created the object.
#[derive(Debug)]
pub struct RefCount(AtomicU32);

impl RefCount {
    /// A counter holding the creator's reference
    pub fn new() -> Self {
        RefCount(AtomicU32::new(1))
    }

    /// Add a reference, returning the new count.
    pub fn add_ref(&self) -> u32 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drop a reference, returning the new count. Releasing more references
    /// than were acquired is rejected and leaves the count at zero.
    pub fn release(&self) -> Result<u32, Status> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map(|previous| previous - 1)
            .map_err(|_| Status::InvalidArgument)
    }

    /// Current count
    pub fn count(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

/// The base object capability: reference counting and capability queries.
pub trait Object: Send + Sync {
    /// Add a reference, returning the new count.
    fn add_ref(&self) -> u32;

    /// Drop a reference, returning the new count.
    fn release(&self) -> Result<u32, Status>;

    /// Ask for another capability. On success the returned interface holds
    /// a new reference that the caller must release.
    fn query_interface(self: Arc<Self>, iid: Iid) -> Result<Interface, Status>;
}

/// A capability returned by [`Object::query_interface`].
#[derive(Clone)]
pub enum Interface {
    /// The base capability
    Unknown(Arc<dyn Object>),
    /// Late-bound dispatch
    Dispatch(Arc<dyn Dispatch>),
    /// Variant enumeration
    Enumerator(Arc<dyn EnumVariant>),
}

impl Interface {
    /// Add a reference to the underlying object
    pub fn add_ref(&self) -> u32 {
        match self {
            Interface::Unknown(o) => o.add_ref(),
            Interface::Dispatch(o) => o.add_ref(),
            Interface::Enumerator(o) => o.add_ref(),
        }
    }

    /// Release a reference on the underlying object
    pub fn release(&self) -> Result<u32, Status> {
        match self {
            Interface::Unknown(o) => o.release(),
            Interface::Dispatch(o) => o.release(),
            Interface::Enumerator(o) => o.release(),
        }
    }

    /// Query the underlying object for another capability.
    pub fn query(&self, iid: Iid) -> Result<Interface, Status> {
        match self {
            Interface::Unknown(o) => Arc::clone(o).query_interface(iid),
            Interface::Dispatch(o) => Arc::clone(o).query_interface(iid),
            Interface::Enumerator(o) => Arc::clone(o).query_interface(iid),
        }
    }

    /// The value kind this interface travels as.
    pub fn kind(&self) -> VarKind {
        match self {
            Interface::Dispatch(_) => VarKind::Dispatch,
            _ => VarKind::Unknown,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Interface::Unknown(_) => "Unknown",
            Interface::Dispatch(_) => "Dispatch",
            Interface::Enumerator(_) => "Enumerator",
        }
    }

    /// A new base-capability reference to the same object.
    pub fn to_unknown(&self) -> Result<ObjectRef<dyn Object>, Status> {
        if let Interface::Unknown(o) = self {
            return Ok(ObjectRef::acquire(Arc::clone(o)));
        }
        match self.query(Iid::UNKNOWN)? {
            Interface::Unknown(o) => Ok(ObjectRef::adopt(o)),
            other => {
                release_quietly(&other);
                Err(Status::NoInterface)
            }
        }
    }

    /// A new dispatch reference to the same object.
    pub fn to_dispatch(&self) -> Result<ObjectRef<dyn Dispatch>, Status> {
        if let Interface::Dispatch(o) = self {
            return Ok(ObjectRef::acquire(Arc::clone(o)));
        }
        match self.query(Iid::DISPATCH)? {
            Interface::Dispatch(o) => Ok(ObjectRef::adopt(o)),
            other => {
                release_quietly(&other);
                Err(Status::NoInterface)
            }
        }
    }

    /// A new enumerator reference to the same object.
    pub fn to_enumerator(&self) -> Result<ObjectRef<dyn EnumVariant>, Status> {
        if let Interface::Enumerator(o) = self {
            return Ok(ObjectRef::acquire(Arc::clone(o)));
        }
        match self.query(Iid::ENUM_VARIANT)? {
            Interface::Enumerator(o) => Ok(ObjectRef::adopt(o)),
            other => {
                release_quietly(&other);
                Err(Status::NoInterface)
            }
        }
    }
}

fn release_quietly(interface: &Interface) {
    if let Err(status) = interface.release() {
        tracing::warn!(%status, "release of unexpected interface failed");
    }
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Interface::{}", self.name())
    }
}

/// An owned reference to an object.
///
/// Cloning acquires a reference; dropping releases it.
pub struct ObjectRef<T: ?Sized + Object = dyn Object> {
    inner: Arc<T>,
}

impl<T: ?Sized + Object> ObjectRef<T> {
    /// Take over a reference the caller already owns.
    pub fn adopt(inner: Arc<T>) -> Self {
        ObjectRef { inner }
    }

    /// Acquire a new reference.
    pub fn acquire(inner: Arc<T>) -> Self {
        inner.add_ref();
        ObjectRef { inner }
    }

    /// Give up ownership without releasing. The caller now owns the
    /// reference.
    pub fn into_raw(self) -> Arc<T> {
        let inner = Arc::clone(&self.inner);
        // dropping `self` releases the reference added here
        inner.add_ref();
        drop(self);
        inner
    }

    /// Borrow the underlying Arc
    pub fn as_arc(&self) -> &Arc<T> {
        &self.inner
    }

    /// Same object, compared by address.
    pub fn ptr_eq<U: ?Sized + Object>(&self, other: &ObjectRef<U>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }

    fn query(&self, iid: Iid) -> Result<Interface, Status> {
        Arc::clone(&self.inner).query_interface(iid)
    }

    /// Query for the dispatch capability.
    pub fn query_dispatch(&self) -> Result<ObjectRef<dyn Dispatch>, Status> {
        match self.query(Iid::DISPATCH)? {
            Interface::Dispatch(o) => Ok(ObjectRef::adopt(o)),
            other => {
                release_quietly(&other);
                Err(Status::NoInterface)
            }
        }
    }

    /// Query for the base capability.
    pub fn query_unknown(&self) -> Result<ObjectRef<dyn Object>, Status> {
        match self.query(Iid::UNKNOWN)? {
            Interface::Unknown(o) => Ok(ObjectRef::adopt(o)),
            other => {
                release_quietly(&other);
                Err(Status::NoInterface)
            }
        }
    }

    /// Query for the enumeration capability.
    pub fn query_enum(&self) -> Result<ObjectRef<dyn EnumVariant>, Status> {
        match self.query(Iid::ENUM_VARIANT)? {
            Interface::Enumerator(o) => Ok(ObjectRef::adopt(o)),
            other => {
                release_quietly(&other);
                Err(Status::NoInterface)
            }
        }
    }
}

impl ObjectRef<dyn Object> {
    /// Hand the reference over as a transportable interface.
    pub fn into_interface(self) -> Interface {
        Interface::Unknown(self.into_raw())
    }
}

impl ObjectRef<dyn Dispatch> {
    /// Hand the reference over as a transportable interface.
    pub fn into_interface(self) -> Interface {
        Interface::Dispatch(self.into_raw())
    }
}

impl ObjectRef<dyn EnumVariant> {
    /// Hand the reference over as a transportable interface.
    pub fn into_interface(self) -> Interface {
        Interface::Enumerator(self.into_raw())
    }
}

impl<T: ?Sized + Object> Deref for ObjectRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: ?Sized + Object> Clone for ObjectRef<T> {
    fn clone(&self) -> Self {
        ObjectRef::acquire(Arc::clone(&self.inner))
    }
}

impl<T: ?Sized + Object> Drop for ObjectRef<T> {
    fn drop(&mut self) {
        if let Err(status) = self.inner.release() {
            tracing::warn!(%status, "object reference released too many times");
        }
    }
}

impl<T: ?Sized + Object> fmt::Debug for ObjectRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:p})", Arc::as_ptr(&self.inner) as *const ())
    }
}
