//! Error types for late-bound calls and the values that flow through them

use thiserror::Error;

use crate::diagnostic::Diagnostic;
use crate::tag::Tag;

/// Status codes surfaced by the invocation protocol.
///
/// These are abstract, but each carries the conventional 32-bit automation
/// code so it can cross a boundary that only speaks integers.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The call completed.
    #[error("success")]
    Success,

    /// The callee does not implement the requested operation.
    #[error("not implemented")]
    NotImplemented,

    /// Name resolution found no member with the given name.
    #[error("unknown name")]
    NameNotFound,

    /// The object does not support the requested capability.
    #[error("no such interface supported")]
    NoInterface,

    /// A required object handle was null.
    #[error("null handle")]
    NullHandle,

    /// An argument had the wrong shape.
    #[error("invalid argument")]
    InvalidArgument,

    /// The callee could not allocate.
    #[error("out of memory")]
    OutOfMemory,

    /// The callee raised an error; a diagnostic record accompanies it.
    #[error("exception occurred")]
    CalleeRaisedError,

    /// Wrong number of arguments for the member.
    #[error("invalid number of parameters")]
    BadParamCount,

    /// The member exists but not for the requested call kind.
    #[error("member not found")]
    MemberNotFound,

    /// An argument could not be coerced to the type the member expects.
    #[error("type mismatch")]
    TypeMismatch,

    /// An array was locked when it had to be destroyed or resized.
    #[error("array is locked")]
    ArrayLocked,

    /// Anything else.
    #[error("unspecified failure")]
    Unknown,
}

impl Status {
    /// The conventional 32-bit code for this status.
    pub fn code(self) -> u32 {
        match self {
            Status::Success => 0x0000_0000,
            Status::NotImplemented => 0x8000_4001,
            Status::NoInterface => 0x8000_4002,
            Status::NullHandle => 0x8000_4003,
            Status::Unknown => 0x8000_4005,
            Status::InvalidArgument => 0x8007_0057,
            Status::OutOfMemory => 0x8007_000E,
            Status::MemberNotFound => 0x8002_0003,
            Status::TypeMismatch => 0x8002_0005,
            Status::NameNotFound => 0x8002_0006,
            Status::CalleeRaisedError => 0x8002_0009,
            Status::BadParamCount => 0x8002_000E,
            Status::ArrayLocked => 0x8002_000D,
        }
    }

    /// Map a 32-bit code back to a status. Codes this crate does not know
    /// collapse to [`Status::Unknown`].
    pub fn from_code(code: u32) -> Self {
        match code {
            0x0000_0000 => Status::Success,
            0x8000_4001 => Status::NotImplemented,
            0x8000_4002 => Status::NoInterface,
            0x8000_4003 => Status::NullHandle,
            0x8007_0057 => Status::InvalidArgument,
            0x8007_000E => Status::OutOfMemory,
            0x8002_0003 => Status::MemberNotFound,
            0x8002_0005 => Status::TypeMismatch,
            0x8002_0006 => Status::NameNotFound,
            0x8002_0009 => Status::CalleeRaisedError,
            0x8002_000E => Status::BadParamCount,
            0x8002_000D => Status::ArrayLocked,
            _ => Status::Unknown,
        }
    }

    /// Check if this status reports success
    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

/// Errors raised while converting between native values and tagged values.
///
/// These never cross the call boundary: they abort packing or reading
/// before anything is sent.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// No encoder is registered for the native type.
    #[error("no conversion registered for native type `{type_name}`")]
    UnsupportedNativeType {
        /// Name of the native type (best effort)
        type_name: String,
    },

    /// No decoder is registered for the tag.
    #[error("no conversion registered for variant type {tag}")]
    UnsupportedVariantType {
        /// The tag that has no decoder
        tag: Tag,
    },

    /// A raw tag value that does not name a valid tag combination.
    #[error("unknown variant type {raw:#06x}")]
    UnknownTag {
        /// The raw 16-bit tag
        raw: u16,
    },

    /// A tagged value did not carry the tag the caller expected.
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected tag or native type
        expected: String,
        /// What was actually found
        got: String,
    },

    /// A date outside the representable automation date range.
    #[error("date {value} is outside the automation date range")]
    DateOutOfRange {
        /// The offending day offset
        value: f64,
    },

    /// More elements than a single array dimension can index.
    #[error("{len} elements do not fit in one array dimension")]
    ArrayTooLarge {
        /// Requested element count
        len: usize,
    },

    /// Foreign memory failed underneath a conversion.
    #[error(transparent)]
    Heap(#[from] HeapError),
}

/// Errors from the foreign memory tables.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    /// A string handle that is not live (never allocated or already freed).
    #[error("invalid string handle {0:#x}")]
    InvalidString(u64),

    /// An array handle that is not live.
    #[error("invalid array handle {0:#x}")]
    InvalidArray(u64),

    /// A by-reference slot handle that is not live.
    #[error("invalid slot handle {0:#x}")]
    InvalidSlot(u64),

    /// An object handle that is not live (released too often, or never
    /// registered).
    #[error("invalid object handle {0:#x}")]
    InvalidObject(u64),

    /// The array is locked and cannot be destroyed.
    #[error("array {0:#x} is locked")]
    ArrayLocked(u64),

    /// Unlock without a matching lock.
    #[error("array {0:#x} is not locked")]
    ArrayNotLocked(u64),

    /// An element index outside the array's bounds.
    #[error("index {index:?} out of bounds for array {handle:#x}")]
    IndexOutOfBounds {
        /// The array handle
        handle: u64,
        /// The offending index
        index: Vec<i32>,
    },

    /// Wrong number of indices for the array's dimensions, or an
    /// invalid dimension number.
    #[error("array {handle:#x} has {dims} dimensions, got {got}")]
    BadDimension {
        /// The array handle
        handle: u64,
        /// Dimensions the array has
        dims: usize,
        /// Dimension count or number requested
        got: usize,
    },
}

/// Contract violations on a diagnostic record.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticError {
    /// `release` was called before `render`; the strings were left alone.
    #[error("diagnostic record released before it was rendered")]
    ReleaseBeforeRender,
}

/// Errors from a late-bound call.
#[derive(Error, Debug, Clone)]
pub enum InvokeError {
    /// Packing or reading failed locally; nothing was sent.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// The callee has no member with this name.
    #[error("unknown name `{name}`")]
    NameNotFound {
        /// The name that failed to resolve
        name: String,
    },

    /// A protocol-level failure with no diagnostic record.
    #[error("`{member}` failed: {status} ({:#010x})", .status.code())]
    Protocol {
        /// Member name (or `#id` when invoked by identifier)
        member: String,
        /// The status the callee returned
        status: Status,
    },

    /// The callee raised an error during execution.
    #[error("`{member}` raised: {}", .diagnostic.describe())]
    Callee {
        /// Member name (or `#id` when invoked by identifier)
        member: String,
        /// The rendered diagnostic record
        diagnostic: Diagnostic,
    },

    /// Foreign memory failed while cleaning up or reading the result.
    #[error(transparent)]
    Heap(#[from] HeapError),
}

impl InvokeError {
    /// The status this error corresponds to.
    pub fn status(&self) -> Status {
        match self {
            InvokeError::Conversion(ConversionError::TypeMismatch { .. }) => Status::TypeMismatch,
            InvokeError::Conversion(_) => Status::InvalidArgument,
            InvokeError::NameNotFound { .. } => Status::NameNotFound,
            InvokeError::Protocol { status, .. } => *status,
            InvokeError::Callee { .. } => Status::CalleeRaisedError,
            InvokeError::Heap(HeapError::ArrayLocked(_)) => Status::ArrayLocked,
            InvokeError::Heap(_) => Status::InvalidArgument,
        }
    }

    /// The diagnostic record, when the callee raised one.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            InvokeError::Callee { diagnostic, .. } => Some(diagnostic),
            _ => None,
        }
    }
}

/// Errors returned by member callbacks on a served dispatch object.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MemberError {
    /// Fail the call with a bare status and no diagnostic.
    #[error("{0}")]
    Status(Status),

    /// Raise an error; the caller receives a diagnostic record.
    #[error("{}", raised_message(.origin, .description))]
    Raised {
        /// Status code carried in the record
        scode: u32,
        /// Who raised it; the object name when `None`
        origin: Option<String>,
        /// What went wrong
        description: String,
    },

    /// An argument or result did not convert.
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl MemberError {
    /// Raise an unspecified failure with a description.
    pub fn raise(description: impl Into<String>) -> Self {
        MemberError::Raised {
            scode: Status::Unknown.code(),
            origin: None,
            description: description.into(),
        }
    }

    /// Raise with an explicit status code and source.
    pub fn raise_from(scode: u32, origin: impl Into<String>, description: impl Into<String>) -> Self {
        MemberError::Raised {
            scode,
            origin: Some(origin.into()),
            description: description.into(),
        }
    }
}

fn raised_message(origin: &Option<String>, description: &str) -> String {
    match origin {
        Some(origin) => format!("{origin}: {description}"),
        None => description.to_string(),
    }
}

impl From<Status> for MemberError {
    fn from(status: Status) -> Self {
        MemberError::Status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_round_trip() {
        let all = [
            Status::Success,
            Status::NotImplemented,
            Status::NameNotFound,
            Status::NoInterface,
            Status::NullHandle,
            Status::InvalidArgument,
            Status::OutOfMemory,
            Status::CalleeRaisedError,
            Status::BadParamCount,
            Status::MemberNotFound,
            Status::TypeMismatch,
            Status::ArrayLocked,
            Status::Unknown,
        ];
        for status in all {
            assert_eq!(Status::from_code(status.code()), status);
        }
    }

    #[test]
    fn test_unknown_code_collapses() {
        assert_eq!(Status::from_code(0x1234), Status::Unknown);
    }

    #[test]
    fn test_invoke_error_status() {
        let err = InvokeError::NameNotFound {
            name: "Frobnicate".to_string(),
        };
        assert_eq!(err.status(), Status::NameNotFound);
        assert!(err.diagnostic().is_none());
        assert_eq!(err.to_string(), "unknown name `Frobnicate`");
    }

    #[test]
    fn test_member_error_display() {
        assert_eq!(MemberError::raise("boom").to_string(), "boom");
        assert_eq!(
            MemberError::raise_from(1, "Calc", "boom").to_string(),
            "Calc: boom"
        );
        assert_eq!(
            MemberError::from(Status::BadParamCount).to_string(),
            "invalid number of parameters"
        );
    }
}
