//! The dispatch capability: name resolution and late-bound invocation

use std::fmt;

use crate::diagnostic::DiagnosticRecord;
use crate::error::Status;
use crate::heap::ForeignHeap;
use crate::object::Object;
use crate::pack::{CallKind, ParamBlock};
use crate::variant::TaggedValue;

/// Opaque identifier of a member, valid only for the object instance that
/// resolved it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId(pub i32);

impl MemberId {
    /// The default member
    pub const VALUE: MemberId = MemberId(0);
    /// Returned for names that did not resolve
    pub const UNKNOWN: MemberId = MemberId(-1);
    /// Named-argument marker for the value assigned by a property put
    pub const PROPERTY_PUT: MemberId = MemberId(-3);
    /// Member returning an enumerator over a collection
    pub const NEW_ENUM: MemberId = MemberId(-4);
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything the callee receives for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct DispatchCall<'a> {
    /// The member being invoked
    pub member: MemberId,
    /// Method, property get, put, or put-by-reference
    pub kind: CallKind,
    /// Locale the caller resolved names in
    pub locale: u32,
    /// Packed arguments
    pub params: &'a ParamBlock,
    /// Where argument payloads live and where results are allocated
    pub heap: &'a ForeignHeap,
}

/// Description of one member, for listings and type information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    /// Identifier handed out by name resolution
    pub id: MemberId,
    /// Registered name
    pub name: String,
    /// Call kinds the member answers to
    pub kinds: Vec<CallKind>,
}

/// What an object reports about itself through [`Dispatch::type_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    /// Name of the object's type
    pub name: String,
    /// Every member, in identifier order
    pub members: Vec<MemberInfo>,
}

impl TypeInfo {
    /// Find a member by name, ignoring ASCII case.
    pub fn member(&self, name: &str) -> Option<&MemberInfo> {
        self.members
            .iter()
            .find(|member| member.name.eq_ignore_ascii_case(name))
    }
}

/// An object whose members are resolved and invoked by name at runtime.
pub trait Dispatch: Object {
    /// Map names to member identifiers. The first name is the member; any
    /// further names are its parameters. Fails with
    /// [`Status::NameNotFound`] if any name is unknown.
    fn ids_of_names(&self, names: &[&str], locale: u32) -> Result<Vec<MemberId>, Status>;

    /// Invoke a member. On success the callee writes the return value (or
    /// leaves it empty) into `result`, which the caller then owns. On
    /// [`Status::CalleeRaisedError`] it fills `diagnostic`.
    fn invoke(
        &self,
        call: DispatchCall<'_>,
        result: &mut TaggedValue,
        diagnostic: &mut DiagnosticRecord,
    ) -> Status;

    /// Describe the object's members. Objects without type information
    /// report [`Status::NotImplemented`].
    fn type_info(&self) -> Result<TypeInfo, Status> {
        Err(Status::NotImplemented)
    }
}
