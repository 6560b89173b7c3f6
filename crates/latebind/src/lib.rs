//! # Latebind
//!
//! Late-bound automation calls without a compile-time interface.
//!
//! A caller that only knows an object by name resolves member names to
//! identifiers, packs native arguments into self-describing tagged values,
//! invokes the member, and decodes a tagged result. Failed calls can carry
//! a diagnostic record that is rendered and then released.
//!
//! ## Architecture
//!
//! - **Tagged values** ([`TaggedValue`]): a type [`Tag`] plus a 64-bit
//!   payload; the wire shape of every argument and result
//! - **Conversion registry** ([`ConversionRegistry`]): native type to tag
//!   and back, extensible at runtime
//! - **Argument packer** ([`ArgumentPacker`]): natural-order arguments into
//!   a reversed [`ParamBlock`], with the property-put marker
//! - **Invoker** ([`Invoker`], [`LateBound`]): name resolution, dispatch,
//!   result decoding, enumeration
//! - **Foreign heap** ([`ForeignHeap`]): strings, arrays, by-reference
//!   slots, and object handles, with explicit ownership
//! - **Diagnostics** ([`DiagnosticRecord`]): the render-then-release side
//!   channel of a raised error
//! - **Serving** ([`DispatchObject`]): build a callee from closures
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use latebind::{ConversionRegistry, DispatchObject, ForeignHeap, Invoker, Status, Value};
//!
//! let registry = ConversionRegistry::shared();
//! let heap = ForeignHeap::shared();
//!
//! let calc = DispatchObject::builder("Calc", Arc::clone(&registry))
//!     .method("Add", 2, |frame| {
//!         let a = frame.arg(0)?.as_i64().ok_or(Status::TypeMismatch)?;
//!         let b = frame.arg(1)?.as_i64().ok_or(Status::TypeMismatch)?;
//!         Ok(Value::I64(a + b))
//!     })
//!     .build()
//!     .into_ref();
//!
//! let invoker = Invoker::new(registry, Arc::clone(&heap));
//! let sum = invoker.call_method(&*calc, "Add", &[Value::I32(2), Value::I32(3)]).unwrap();
//! assert_eq!(sum, Value::I64(5));
//! assert!(heap.is_clean());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod diagnostic;
pub mod error;
pub mod heap;
pub mod invoke;
pub mod object;
pub mod pack;
pub mod registry;
pub mod server;
pub mod tag;
pub mod value;
pub mod variant;

// Re-export main types
pub use config::{InvokeConfig, LOCALE_USER_DEFAULT};
pub use diagnostic::{Diagnostic, DiagnosticRecord};
pub use error::{ConversionError, DiagnosticError, HeapError, InvokeError, MemberError, Status};
pub use heap::{ArrayBound, ArrayData, ArrayHandle, ForeignHeap, ObjectKey, SlotHandle, StrHandle};
pub use invoke::{
    CallPhase, Dispatch, DispatchCall, EnumIter, EnumVariant, Enumerator, Invoker, LateBound,
    MemberId, MemberInfo, TypeInfo,
};
pub use object::{Iid, Interface, Object, ObjectRef, RefCount};
pub use pack::{ArgumentPacker, CallKind, ParamBlock};
pub use registry::{CodecContext, ConversionRegistry, Decoder, Encoder};
pub use server::{
    CallFrame, CollectionEnumerator, DispatchObject, DispatchObjectBuilder, MemberFn,
};
pub use tag::{Tag, VarKind};
pub use value::{
    ArrayValue, ByRef, Currency, Date, Empty, ErrorCode, RefHandle, Value, VariantRef,
    CURRENCY_SCALE, MAX_DATE, MIN_DATE, PARAM_NOT_FOUND,
};
pub use variant::{OwnedValue, TaggedValue};

/// Latebind version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
