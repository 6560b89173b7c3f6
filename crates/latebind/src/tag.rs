//! Type tags for tagged values
//!
//! A tag is a base kind plus two orthogonal modifier bits: `array` (the
//! payload is an array handle whose elements have the base kind) and
//! `by_ref` (the payload is the address of a slot holding the described
//! type). The raw 16-bit layout follows the conventional automation
//! numbering so tags can be logged and compared against other tooling.

use std::fmt;

use crate::error::ConversionError;

/// Raw modifier bit: the payload is an array of the base kind.
pub const ARRAY_BIT: u16 = 0x2000;

/// Raw modifier bit: the payload points at a slot holding the base kind.
pub const BY_REF_BIT: u16 = 0x4000;

/// Mask selecting the base kind from a raw tag.
pub const KIND_MASK: u16 = 0x0fff;

/// The base kind of a tagged value.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VarKind {
    /// No value
    Empty = 0x0,
    /// Explicit null
    Null = 0x1,
    /// 16-bit signed integer
    I16 = 0x2,
    /// 32-bit signed integer
    I32 = 0x3,
    /// 32-bit float
    F32 = 0x4,
    /// 64-bit float
    F64 = 0x5,
    /// Scaled 64-bit currency
    Currency = 0x6,
    /// Day-offset date
    Date = 0x7,
    /// Length-prefixed foreign string
    String = 0x8,
    /// Dispatchable object handle
    Dispatch = 0x9,
    /// Status code carried as a value
    Error = 0xa,
    /// 16-bit automation boolean
    Bool = 0xb,
    /// Nested tagged value (by reference or as an array element only)
    Variant = 0xc,
    /// Plain object handle
    Unknown = 0xd,
    /// 8-bit signed integer
    I8 = 0x10,
    /// 8-bit unsigned integer
    U8 = 0x11,
    /// 16-bit unsigned integer
    U16 = 0x12,
    /// 32-bit unsigned integer
    U32 = 0x13,
    /// 64-bit signed integer
    I64 = 0x14,
    /// 64-bit unsigned integer
    U64 = 0x15,
}

impl VarKind {
    /// Every kind, in numeric order.
    pub const ALL: [VarKind; 20] = [
        VarKind::Empty,
        VarKind::Null,
        VarKind::I16,
        VarKind::I32,
        VarKind::F32,
        VarKind::F64,
        VarKind::Currency,
        VarKind::Date,
        VarKind::String,
        VarKind::Dispatch,
        VarKind::Error,
        VarKind::Bool,
        VarKind::Variant,
        VarKind::Unknown,
        VarKind::I8,
        VarKind::U8,
        VarKind::U16,
        VarKind::U32,
        VarKind::I64,
        VarKind::U64,
    ];

    /// Kinds whose payload is an inline scalar.
    pub const SCALARS: [VarKind; 14] = [
        VarKind::Bool,
        VarKind::I8,
        VarKind::I16,
        VarKind::I32,
        VarKind::I64,
        VarKind::U8,
        VarKind::U16,
        VarKind::U32,
        VarKind::U64,
        VarKind::F32,
        VarKind::F64,
        VarKind::Currency,
        VarKind::Date,
        VarKind::Error,
    ];

    /// Look up a kind by its raw number.
    pub fn from_raw(raw: u16) -> Option<Self> {
        VarKind::ALL.iter().copied().find(|k| *k as u16 == raw)
    }

    /// Short display name
    pub fn name(self) -> &'static str {
        match self {
            VarKind::Empty => "Empty",
            VarKind::Null => "Null",
            VarKind::I16 => "I16",
            VarKind::I32 => "I32",
            VarKind::F32 => "F32",
            VarKind::F64 => "F64",
            VarKind::Currency => "Currency",
            VarKind::Date => "Date",
            VarKind::String => "String",
            VarKind::Dispatch => "Dispatch",
            VarKind::Error => "Error",
            VarKind::Bool => "Bool",
            VarKind::Variant => "Variant",
            VarKind::Unknown => "Unknown",
            VarKind::I8 => "I8",
            VarKind::U8 => "U8",
            VarKind::U16 => "U16",
            VarKind::U32 => "U32",
            VarKind::I64 => "I64",
            VarKind::U64 => "U64",
        }
    }

    /// Whether the payload of this kind is a handle to foreign-owned memory.
    pub fn is_owned_handle(self) -> bool {
        matches!(
            self,
            VarKind::String | VarKind::Dispatch | VarKind::Unknown
        )
    }

    /// Whether this kind is an object handle.
    pub fn is_object(self) -> bool {
        matches!(self, VarKind::Dispatch | VarKind::Unknown)
    }

    /// Element width in bytes when stored in an array.
    pub fn element_size(self) -> u32 {
        match self {
            VarKind::Empty | VarKind::Null => 0,
            VarKind::I8 | VarKind::U8 => 1,
            VarKind::I16 | VarKind::U16 | VarKind::Bool => 2,
            VarKind::I32 | VarKind::U32 | VarKind::F32 | VarKind::Error => 4,
            VarKind::I64
            | VarKind::U64
            | VarKind::F64
            | VarKind::Currency
            | VarKind::Date
            | VarKind::String
            | VarKind::Dispatch
            | VarKind::Unknown => 8,
            VarKind::Variant => 16,
        }
    }
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A full tag: base kind plus the array and by-reference modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    kind: VarKind,
    array: bool,
    by_ref: bool,
}

impl Tag {
    /// The empty tag.
    pub const EMPTY: Tag = Tag::new(VarKind::Empty);

    /// The null tag.
    pub const NULL: Tag = Tag::new(VarKind::Null);

    /// A plain tag of the given kind.
    pub const fn new(kind: VarKind) -> Self {
        Tag {
            kind,
            array: false,
            by_ref: false,
        }
    }

    /// An array tag with the given element kind.
    pub const fn array_of(kind: VarKind) -> Self {
        Tag {
            kind,
            array: true,
            by_ref: false,
        }
    }

    /// This tag with the by-reference bit set.
    pub const fn by_ref(self) -> Self {
        Tag {
            by_ref: true,
            ..self
        }
    }

    /// This tag with the by-reference bit cleared.
    pub const fn deref(self) -> Self {
        Tag {
            by_ref: false,
            ..self
        }
    }

    /// The base kind
    pub fn kind(self) -> VarKind {
        self.kind
    }

    /// Check if the array bit is set
    pub fn is_array(self) -> bool {
        self.array
    }

    /// Check if the by-reference bit is set
    pub fn is_by_ref(self) -> bool {
        self.by_ref
    }

    /// Check if this is the empty tag
    pub fn is_empty(self) -> bool {
        self == Tag::EMPTY
    }

    /// Check if this is the null tag
    pub fn is_null(self) -> bool {
        self == Tag::NULL
    }

    /// Whether clearing a value with this tag releases something.
    ///
    /// By-reference values never own their referent.
    pub fn owns_payload(self) -> bool {
        !self.by_ref && (self.array || self.kind.is_owned_handle())
    }

    /// Whether this combination of kind and modifiers is meaningful.
    pub fn is_valid(self) -> bool {
        match self.kind {
            VarKind::Empty | VarKind::Null => !self.array && !self.by_ref,
            VarKind::Variant => self.array || self.by_ref,
            _ => true,
        }
    }

    /// Raw 16-bit encoding.
    pub fn to_raw(self) -> u16 {
        let mut raw = self.kind as u16;
        if self.array {
            raw |= ARRAY_BIT;
        }
        if self.by_ref {
            raw |= BY_REF_BIT;
        }
        raw
    }

    /// Decode a raw 16-bit tag, rejecting unknown kinds and invalid
    /// modifier combinations.
    pub fn from_raw(raw: u16) -> Result<Self, ConversionError> {
        let unknown = || ConversionError::UnknownTag { raw };
        if raw & !(KIND_MASK | ARRAY_BIT | BY_REF_BIT) != 0 {
            return Err(unknown());
        }
        let kind = VarKind::from_raw(raw & KIND_MASK).ok_or_else(unknown)?;
        let tag = Tag {
            kind,
            array: raw & ARRAY_BIT != 0,
            by_ref: raw & BY_REF_BIT != 0,
        };
        if tag.is_valid() {
            Ok(tag)
        } else {
            Err(unknown())
        }
    }
}

impl Default for Tag {
    fn default() -> Self {
        Tag::EMPTY
    }
}

impl From<VarKind> for Tag {
    fn from(kind: VarKind) -> Self {
        Tag::new(kind)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.array {
            write!(f, "Array<{}>", self.kind)?;
        } else {
            write!(f, "{}", self.kind)?;
        }
        if self.by_ref {
            write!(f, "&")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_round_trip() {
        for kind in VarKind::ALL {
            let tag = Tag::new(kind);
            if tag.is_valid() {
                assert_eq!(Tag::from_raw(tag.to_raw()), Ok(tag));
            }
            if !matches!(kind, VarKind::Empty | VarKind::Null) {
                let by_ref = tag.by_ref();
                assert_eq!(Tag::from_raw(by_ref.to_raw()), Ok(by_ref));
                let array = Tag::array_of(kind);
                assert_eq!(Tag::from_raw(array.to_raw()), Ok(array));
            }
        }
    }

    #[test]
    fn test_conventional_numbers() {
        assert_eq!(Tag::new(VarKind::I32).to_raw(), 0x3);
        assert_eq!(Tag::new(VarKind::String).to_raw(), 0x8);
        assert_eq!(Tag::new(VarKind::I32).by_ref().to_raw(), 0x4003);
        assert_eq!(Tag::array_of(VarKind::Variant).to_raw(), 0x200c);
    }

    #[test]
    fn test_invalid_combinations_rejected() {
        assert!(Tag::from_raw(0x4000).is_err()); // empty by reference
        assert!(Tag::from_raw(0x2001).is_err()); // array of null
        assert!(Tag::from_raw(0x000c).is_err()); // bare variant
        assert!(Tag::from_raw(0x0017).is_err()); // unknown kind
        assert!(Tag::from_raw(0x8003).is_err()); // reserved bit
    }

    #[test]
    fn test_owns_payload() {
        assert!(Tag::new(VarKind::String).owns_payload());
        assert!(Tag::new(VarKind::Dispatch).owns_payload());
        assert!(Tag::array_of(VarKind::I32).owns_payload());
        assert!(!Tag::new(VarKind::String).by_ref().owns_payload());
        assert!(!Tag::new(VarKind::I64).owns_payload());
        assert!(!Tag::EMPTY.owns_payload());
    }

    #[test]
    fn test_display() {
        assert_eq!(Tag::new(VarKind::I32).to_string(), "I32");
        assert_eq!(Tag::new(VarKind::I32).by_ref().to_string(), "I32&");
        assert_eq!(Tag::array_of(VarKind::String).to_string(), "Array<String>");
    }
}
