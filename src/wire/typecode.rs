//! # Wire Type Codes
//!
//! The closed set of D-Bus/AllJoyn wire types and their alignment rules,
//! ported from `SignatureUtils::AlignmentForType` in the original C++
//! (`alljoyn_core/src/SignatureUtils.cc`). Every alignment value below is
//! taken from that switch statement, not guessed from the wire-format
//! prose alone.

/// A single wire type code, one-to-one with the ASCII signature
/// characters the format uses on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    Invalid,
    Byte,
    Boolean,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Double,
    String,
    ObjectPath,
    Signature,
    Handle,
    Array,
    Struct,
    DictEntry,
    Variant,
    /// `*` — matches any complete type; only legal inside a format-string
    /// argument builder, never on the wire.
    Wildcard,
}

impl TypeCode {
    /// Maps a signature character to its type code. Container-open/close
    /// brackets (`a ( ) { }`) are handled by the signature parser, not
    /// here, since they don't correspond to a single self-contained value.
    pub fn from_char(c: char) -> Option<TypeCode> {
        Some(match c {
            'y' => TypeCode::Byte,
            'b' => TypeCode::Boolean,
            'n' => TypeCode::Int16,
            'q' => TypeCode::Uint16,
            'i' => TypeCode::Int32,
            'u' => TypeCode::Uint32,
            'x' => TypeCode::Int64,
            't' => TypeCode::Uint64,
            'd' => TypeCode::Double,
            's' => TypeCode::String,
            'o' => TypeCode::ObjectPath,
            'g' => TypeCode::Signature,
            'h' => TypeCode::Handle,
            'a' => TypeCode::Array,
            '(' | ')' => TypeCode::Struct,
            '{' | '}' => TypeCode::DictEntry,
            'v' => TypeCode::Variant,
            '*' => TypeCode::Wildcard,
            _ => return None,
        })
    }

    /// The canonical signature character for this type code.
    pub fn as_char(self) -> char {
        match self {
            TypeCode::Invalid => '\0',
            TypeCode::Byte => 'y',
            TypeCode::Boolean => 'b',
            TypeCode::Int16 => 'n',
            TypeCode::Uint16 => 'q',
            TypeCode::Int32 => 'i',
            TypeCode::Uint32 => 'u',
            TypeCode::Int64 => 'x',
            TypeCode::Uint64 => 't',
            TypeCode::Double => 'd',
            TypeCode::String => 's',
            TypeCode::ObjectPath => 'o',
            TypeCode::Signature => 'g',
            TypeCode::Handle => 'h',
            TypeCode::Array => 'a',
            TypeCode::Struct => '(',
            TypeCode::DictEntry => '{',
            TypeCode::Variant => 'v',
            TypeCode::Wildcard => '*',
        }
    }

    /// A basic type is usable as a dict-entry key and as a scalar array
    /// element; matches `SignatureUtils::IsBasicType`.
    pub fn is_basic(self) -> bool {
        matches!(
            self,
            TypeCode::Byte
                | TypeCode::Int16
                | TypeCode::Uint16
                | TypeCode::Boolean
                | TypeCode::Int32
                | TypeCode::Uint32
                | TypeCode::Double
                | TypeCode::Uint64
                | TypeCode::Int64
                | TypeCode::ObjectPath
                | TypeCode::String
                | TypeCode::Signature
                | TypeCode::Handle
        )
    }

    /// Byte alignment required before a value of this type, per
    /// `SignatureUtils::AlignmentForType`.
    pub fn alignment(self) -> usize {
        match self {
            TypeCode::Boolean | TypeCode::Int32 | TypeCode::Uint32 | TypeCode::Handle => 4,
            // length-prefixed types align their 4-byte length the same way
            TypeCode::ObjectPath | TypeCode::String | TypeCode::Array => 4,
            TypeCode::Int16 | TypeCode::Uint16 => 2,
            TypeCode::Variant | TypeCode::Signature | TypeCode::Byte => 1,
            TypeCode::Struct | TypeCode::DictEntry | TypeCode::Double | TypeCode::Uint64 | TypeCode::Int64 => 8,
            TypeCode::Invalid | TypeCode::Wildcard => 1,
        }
    }
}

/// Rounds `n` up to the next multiple of `alignment` (`alignment` must be
/// a power of two). Mirrors the `PadUp` macro from `SignatureUtils.cc`.
pub fn pad_up(n: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (n + alignment - 1) & !(alignment - 1)
}
