//! # Header Fields
//!
//! The fixed-index header-field table, ported byte-for-byte from
//! `HeaderFields::FieldType` and `HeaderFields::Compressible` in
//! `alljoyn_core/src/Message.cc` (lines ~78-111). Each field id mandates
//! an exact wire type and carries a flag saying whether a compression
//! rule may omit it from the wire.

use crate::error::{BusError, Result};
use crate::wire::arg::Arg;
use crate::wire::typecode::TypeCode;
use std::collections::HashMap;

/// A header-field id, indexing directly into `FIELD_TYPE`/`COMPRESSIBLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum HeaderField {
    Invalid = 0,
    Path = 1,
    Interface = 2,
    Member = 3,
    ErrorName = 4,
    ReplySerial = 5,
    Destination = 6,
    Sender = 7,
    Signature = 8,
    Handles = 9,
    Timestamp = 10,
    Ttl = 11,
    CompressionToken = 12,
    SessionId = 13,
}

const NUM_HEADER_FIELDS: usize = 14;

/// `HeaderFields::FieldType`: the wire type mandated for each field id.
const FIELD_TYPE: [TypeCode; NUM_HEADER_FIELDS] = [
    TypeCode::Invalid,    // Invalid - not allowed on the wire
    TypeCode::ObjectPath, // Path
    TypeCode::String,     // Interface
    TypeCode::String,     // Member
    TypeCode::String,     // ErrorName
    TypeCode::Uint32,     // ReplySerial
    TypeCode::String,     // Destination
    TypeCode::String,     // Sender
    TypeCode::Signature,  // Signature
    TypeCode::Uint32,     // Handles
    TypeCode::Uint32,     // Timestamp
    TypeCode::Uint16,     // Ttl
    TypeCode::Uint32,     // CompressionToken
    TypeCode::Uint32,     // SessionId
];

/// `HeaderFields::Compressible`: whether a compression rule may omit
/// this field from the wire when its value matches the rule.
const COMPRESSIBLE: [bool; NUM_HEADER_FIELDS] = [
    false, // Invalid
    true,  // Path
    true,  // Interface
    true,  // Member
    false, // ErrorName
    false, // ReplySerial
    true,  // Destination
    true,  // Sender
    true,  // Signature
    false, // Handles
    false, // Timestamp
    true,  // Ttl
    false, // CompressionToken
    true,  // SessionId
];

impl HeaderField {
    pub fn from_u8(id: u8) -> Result<HeaderField> {
        match id {
            0 => Ok(HeaderField::Invalid),
            1 => Ok(HeaderField::Path),
            2 => Ok(HeaderField::Interface),
            3 => Ok(HeaderField::Member),
            4 => Ok(HeaderField::ErrorName),
            5 => Ok(HeaderField::ReplySerial),
            6 => Ok(HeaderField::Destination),
            7 => Ok(HeaderField::Sender),
            8 => Ok(HeaderField::Signature),
            9 => Ok(HeaderField::Handles),
            10 => Ok(HeaderField::Timestamp),
            11 => Ok(HeaderField::Ttl),
            12 => Ok(HeaderField::CompressionToken),
            13 => Ok(HeaderField::SessionId),
            other => Err(BusError::InvalidHeaderField(other)),
        }
    }

    /// The wire type mandated for this field's value.
    pub fn wire_type(self) -> TypeCode {
        FIELD_TYPE[self as usize]
    }

    /// Whether a compression rule may elide this field.
    pub fn is_compressible(self) -> bool {
        COMPRESSIBLE[self as usize]
    }
}

/// The parsed set of header-field entries for one message, keyed by
/// field id. A `HashMap` plays the role of the source's fixed-size
/// array since most fields are absent on most messages.
#[derive(Debug, Clone, Default)]
pub struct HeaderFieldTable {
    fields: HashMap<HeaderField, Arg>,
}

impl HeaderFieldTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: HeaderField, value: Arg) -> Result<()> {
        if value.type_code() != field.wire_type() {
            return Err(BusError::InvalidHeaderField(field as u8));
        }
        self.fields.insert(field, value);
        Ok(())
    }

    pub fn get(&self, field: HeaderField) -> Option<&Arg> {
        self.fields.get(&field)
    }

    pub fn remove(&mut self, field: HeaderField) -> Option<Arg> {
        self.fields.remove(&field)
    }

    pub fn contains(&self, field: HeaderField) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn path(&self) -> Option<&str> {
        match self.get(HeaderField::Path) {
            Some(Arg::ObjectPath(p)) => Some(p.as_str()),
            _ => None,
        }
    }

    pub fn interface(&self) -> Option<&str> {
        match self.get(HeaderField::Interface) {
            Some(Arg::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn member(&self) -> Option<&str> {
        match self.get(HeaderField::Member) {
            Some(Arg::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn sender(&self) -> Option<&str> {
        match self.get(HeaderField::Sender) {
            Some(Arg::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn destination(&self) -> Option<&str> {
        match self.get(HeaderField::Destination) {
            Some(Arg::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn error_name(&self) -> Option<&str> {
        match self.get(HeaderField::ErrorName) {
            Some(Arg::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn reply_serial(&self) -> Option<u32> {
        match self.get(HeaderField::ReplySerial) {
            Some(Arg::Uint32(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn signature(&self) -> Option<&str> {
        match self.get(HeaderField::Signature) {
            Some(Arg::Signature(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderField, &Arg)> {
        self.fields.iter()
    }

    /// Overlays every field present in `rule` that this table does not
    /// already carry explicitly; used by the compression overlay step
    /// (§4.1 "Compression").
    pub fn overlay_from_rule(&mut self, rule: &HeaderFieldTable) {
        for (field, value) in rule.fields.iter() {
            self.fields.entry(*field).or_insert_with(|| value.clone());
        }
    }
}
