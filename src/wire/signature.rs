//! # Signature Parsing
//!
//! A signature is a (possibly empty) sequence of *complete types*, each no
//! more than 255 bytes total. This module is a direct port of
//! `SignatureUtils::ParseCompleteType` / `ParseContainerSignature` from
//! `alljoyn_core/src/SignatureUtils.cc`, translated from the original's
//! explicit fixed-size container stack into a growable `Vec`-backed one,
//! but preserving its exact nesting-depth bookkeeping: array and struct
//! depth are tracked independently, each capped at 32; a dict-entry
//! requires exactly two members (a basic key, any value); a struct
//! requires at least one member; an array container auto-closes the
//! instant its single element type has been parsed.

use crate::error::{BusError, Result};
use crate::wire::typecode::TypeCode;

const MAX_SIGNATURE_LEN: usize = 255;
const MAX_CONTAINER_DEPTH: u32 = 32;

/// A validated signature string. Construction is the only way to obtain
/// one, so every `Signature` in the system is known-parseable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Signature(String);

impl Signature {
    /// Validates `s` as a complete signature (zero or more complete
    /// types, total length <= 255) and wraps it.
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        validate_signature(&s)?;
        Ok(Signature(s))
    }

    /// The empty signature, valid for a message body with no arguments.
    pub fn empty() -> Self {
        Signature(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `true` if `other` is textually identical or this signature is the
    /// wildcard `*` accepted by `UnmarshalArgs` for "any signature".
    pub fn matches(&self, other: &str) -> bool {
        self.0 == "*" || self.0 == other
    }

    pub fn count_complete_types(&self) -> usize {
        count_complete_types(&self.0).unwrap_or(0)
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_signature(s: &str) -> Result<()> {
    if s.len() > MAX_SIGNATURE_LEN {
        return Err(BusError::NameTooLong(s.to_string()));
    }
    if !s.is_ascii() {
        return Err(BusError::BadSignature(s.to_string()));
    }
    let bytes = s.as_bytes();
    let mut pos = 0usize;
    while pos < bytes.len() {
        parse_complete_type(bytes, &mut pos)?;
    }
    Ok(())
}

/// Advances `pos` across exactly one complete type starting at `pos`, or
/// fails with `BadSignature`/`BadCompleteType`.
pub fn parse_complete_type(sig: &[u8], pos: &mut usize) -> Result<TypeCode> {
    let start = *pos;
    if *pos >= sig.len() {
        return Err(BusError::BadCompleteType(start));
    }
    let c = sig[*pos] as char;
    *pos += 1;
    match c {
        'y' | 'n' | 'q' | 'b' | 'i' | 'u' | 'd' | 't' | 'x' | 'o' | 's' | 'g' | 'v' | 'h' | '*' => {
            Ok(TypeCode::from_char(c).unwrap())
        }
        '{' => {
            parse_container_signature(TypeCode::DictEntry, sig, pos, /* in_array */ false)?;
            Ok(TypeCode::DictEntry)
        }
        '(' => {
            parse_container_signature(TypeCode::Struct, sig, pos, false)?;
            Ok(TypeCode::Struct)
        }
        'a' => {
            parse_container_signature(TypeCode::Array, sig, pos, false)?;
            Ok(TypeCode::Array)
        }
        _ => Err(BusError::BadCompleteType(start)),
    }
}

#[derive(Clone, Copy)]
struct Frame {
    kind: TypeCode,
    members: u32,
}

/// Parses the body of a struct/dict-entry/array signature whose opening
/// bracket was already consumed, mirroring `ParseContainerSignature`.
fn parse_container_signature(
    container: TypeCode,
    sig: &[u8],
    pos: &mut usize,
    _top_level_in_array: bool,
) -> Result<()> {
    let mut stack = vec![Frame { kind: container, members: 0 }];
    let mut array_depth: u32 = 0;
    let mut struct_depth: u32 = 0;
    if container == TypeCode::Array {
        array_depth += 1;
    } else {
        struct_depth += 1;
    }

    loop {
        if *pos >= sig.len() {
            if struct_depth + array_depth > 0 {
                return Err(BusError::BadSignature("unterminated container".into()));
            }
            break;
        }
        let c = sig[*pos] as char;
        *pos += 1;

        match c {
            'y' | 'n' | 'q' | 'b' | 'i' | 'u' | 'd' | 't' | 'x' | 'o' | 's' | 'g' | 'v' | 'h' | '*' => {
                stack.last_mut().unwrap().members += 1;
            }
            'a' => {
                array_depth += 1;
                if array_depth > MAX_CONTAINER_DEPTH {
                    return Err(BusError::BadSignature("array nesting too deep".into()));
                }
                stack.push(Frame { kind: TypeCode::Array, members: 0 });
            }
            '{' => {
                struct_depth += 1;
                if struct_depth > MAX_CONTAINER_DEPTH {
                    return Err(BusError::BadSignature("dict-entry nesting too deep".into()));
                }
                let is_array_element = stack.last().unwrap().kind == TypeCode::Array;
                if !is_array_element {
                    return Err(BusError::BadSignature("dict-entry outside array".into()));
                }
                if *pos >= sig.len() {
                    return Err(BusError::BadSignature("truncated dict-entry key".into()));
                }
                let key_char = sig[*pos] as char;
                *pos += 1;
                let key_tc = TypeCode::from_char(key_char)
                    .ok_or_else(|| BusError::BadSignature(format!("bad dict-entry key '{}'", key_char)))?;
                if !key_tc.is_basic() {
                    return Err(BusError::BadSignature("dict-entry key must be a basic type".into()));
                }
                stack.push(Frame { kind: TypeCode::DictEntry, members: 1 });
            }
            '}' => {
                let top = *stack.last().unwrap();
                if top.kind == TypeCode::DictEntry && top.members == 2 {
                    struct_depth -= 1;
                    stack.pop();
                    if let Some(parent) = stack.last_mut() {
                        parent.members += 1;
                    }
                } else {
                    return Err(BusError::BadSignature("dict-entry must have exactly 2 members".into()));
                }
            }
            '(' => {
                struct_depth += 1;
                if struct_depth > MAX_CONTAINER_DEPTH {
                    return Err(BusError::BadSignature("struct nesting too deep".into()));
                }
                stack.push(Frame { kind: TypeCode::Struct, members: 0 });
            }
            ')' => {
                let top = *stack.last().unwrap();
                if top.kind == TypeCode::Struct && top.members > 0 {
                    struct_depth -= 1;
                    stack.pop();
                    if let Some(parent) = stack.last_mut() {
                        parent.members += 1;
                    }
                } else {
                    return Err(BusError::BadSignature("struct must have at least 1 member".into()));
                }
            }
            _ => return Err(BusError::BadSignature(format!("unrecognized type code '{}'", c))),
        }

        // An array container is complete the instant its one element type
        // has been parsed; pop it and count it as a member of its parent.
        while array_depth > 0 && stack.last().map_or(false, |f| f.kind == TypeCode::Array && f.members == 1) {
            array_depth -= 1;
            stack.pop();
            if let Some(parent) = stack.last_mut() {
                parent.members += 1;
            }
        }

        if struct_depth + array_depth == 0 {
            break;
        }
    }

    Ok(())
}

/// Counts the number of complete types in `sig`, failing if any prefix is
/// malformed. Used by the testable property `CountCompleteTypes(S ++ S) ==
/// 2 * CountCompleteTypes(S)`.
pub fn count_complete_types(sig: &str) -> Result<usize> {
    let bytes = sig.as_bytes();
    let mut pos = 0usize;
    let mut count = 0usize;
    while pos < bytes.len() {
        parse_complete_type(bytes, &mut pos)?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_basic_types() {
        for s in ["y", "b", "n", "q", "i", "u", "x", "t", "d", "s", "o", "g", "h", "v"] {
            assert!(Signature::new(s).is_ok(), "{s} should be valid");
        }
    }

    #[test]
    fn accepts_empty_signature() {
        assert!(Signature::new("").is_ok());
    }

    #[test]
    fn accepts_struct_and_array() {
        assert!(Signature::new("(iu)").is_ok());
        assert!(Signature::new("as").is_ok());
        assert!(Signature::new("a(iu)").is_ok());
        assert!(Signature::new("a{sv}").is_ok());
    }

    #[test]
    fn rejects_empty_struct() {
        assert!(Signature::new("()").is_err());
    }

    #[test]
    fn rejects_dict_entry_outside_array() {
        assert!(Signature::new("{sv}").is_err());
    }

    #[test]
    fn rejects_dict_entry_with_non_basic_key() {
        assert!(Signature::new("a{(i)v}").is_err());
    }

    #[test]
    fn rejects_dict_entry_with_wrong_member_count() {
        assert!(Signature::new("a{s}").is_err());
    }

    #[test]
    fn rejects_array_nesting_over_32() {
        let sig = "a".repeat(33) + "y";
        assert!(Signature::new(sig).is_err());
    }

    #[test]
    fn accepts_array_nesting_at_32() {
        let sig = "a".repeat(32) + "y";
        assert!(Signature::new(sig).is_ok());
    }

    #[test]
    fn rejects_struct_nesting_over_32() {
        let sig = "(".repeat(33) + "y" + &")".repeat(33);
        assert!(Signature::new(sig).is_err());
    }

    #[test]
    fn count_complete_types_doubles_on_concat() {
        let sig = "a{sv}(iu)s";
        let n = count_complete_types(sig).unwrap();
        let doubled = count_complete_types(&sig.repeat(2)).unwrap();
        assert_eq!(doubled, 2 * n);
    }

    #[test]
    fn wildcard_matches_anything() {
        let wildcard = Signature::new("*").unwrap();
        assert!(wildcard.matches("a{sv}"));
        assert!(wildcard.matches(""));
    }
}
