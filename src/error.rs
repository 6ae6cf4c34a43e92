//! # Error Taxonomy
//!
//! Every fallible operation in the bus core returns a [`BusError`] rather
//! than `anyhow::Error`: callers up and down the stack (the dispatcher
//! deciding whether to reply with a typed D-Bus error name, the proxy
//! deciding whether a call is retryable) need to match on the error kind,
//! not just print it.
//!
//! The variants are grouped by the taxonomy the runtime documents: wire
//! signature/value errors, framing errors, policy errors, security
//! errors, routing errors, timing errors, and concurrency errors.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BusError>;

/// All error kinds produced by the wire codec, endpoint, proxy, and
/// observer subsystems.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    // ---- Signature / Value -------------------------------------------------
    #[error("bad signature: {0}")]
    BadSignature(String),

    #[error("wrong element type for array: expected {expected}, found {found}")]
    ArrayElementMismatch { expected: String, found: String },

    #[error("bad complete type at offset {0}")]
    BadCompleteType(usize),

    #[error("bad value for type code '{0}'")]
    BadValue(char),

    // ---- Framing -------------------------------------------------------------
    #[error("bad header length: {0} exceeds maximum of 65536 bytes")]
    BadHeaderLength(u32),

    #[error("bad body length: {0} exceeds maximum packet size")]
    BadBodyLength(u32),

    #[error("invalid endian flag: {0:#x}")]
    InvalidEndian(u8),

    #[error("invalid header field id: {0}")]
    InvalidHeaderField(u8),

    #[error("missing required header field: {0}")]
    MissingHeaderField(&'static str),

    // ---- Policy ----------------------------------------------------------
    #[error("interface mismatch for '{0}' on re-registration")]
    InterfaceMismatch(String),

    #[error("member '{0}' already exists")]
    MemberAlreadyExists(String),

    #[error("property access denied: {0}")]
    PropertyAccessDenied(String),

    #[error("property does not exist: {0}")]
    NoSuchProperty(String),

    #[error("no such interface: {0}")]
    NoSuchInterface(String),

    #[error("no such member: {0}")]
    NoSuchMember(String),

    #[error("illegal object path: {0}")]
    IllegalObjectPath(String),

    #[error("name too long: {0} exceeds maximum of 255 bytes")]
    NameTooLong(String),

    // ---- Security ----------------------------------------------------------
    #[error("message not encrypted but interface requires it")]
    NotEncrypted,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("not authorized")]
    NotAuthorized,

    // ---- Routing -----------------------------------------------------------
    #[error("no such object: {0}")]
    NoSuchObject(String),

    #[error("no such service: {0}")]
    ServiceUnknown(String),

    #[error("endpoint is closing")]
    EndpointClosing,

    #[error("bus attachment is not started")]
    BusNotStarted,

    #[error("no pending reply context for serial {0}")]
    UnmatchedReplySerial(u32),

    // ---- Timing --------------------------------------------------------------
    #[error("message time-to-live expired")]
    TtlExpired,

    #[error("reply timeout")]
    Timeout,

    #[error("endpoint is exiting")]
    Exiting,

    // ---- Concurrency ---------------------------------------------------------
    #[error("blocking call not allowed from a dispatcher callback thread without reentrancy opt-in")]
    BlockingCallNotAllowed,

    #[error("operation would block: authentication in progress")]
    WouldBlock,

    #[error("method call aborted")]
    MethodCallAborted,

    // ---- Compression / misc wire-level --------------------------------------
    #[error("cannot expand compression token {0}")]
    CannotExpand(u32),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("XML parse error: {0}")]
    Xml(String),
}

impl From<std::io::Error> for BusError {
    fn from(e: std::io::Error) -> Self {
        BusError::Io(e.to_string())
    }
}

impl BusError {
    /// The D-Bus-style reverse-DNS error name used when this error is sent
    /// back to a caller as an error-reply message (spec §7's propagation
    /// policy: "the endpoint converts method-call errors into error-reply
    /// messages addressed to the original sender").
    pub fn error_name(&self) -> &'static str {
        match self {
            BusError::BadSignature(_)
            | BusError::ArrayElementMismatch { .. }
            | BusError::BadCompleteType(_)
            | BusError::BadValue(_) => "org.alljoyn.Bus.BadSignature",
            BusError::BadHeaderLength(_)
            | BusError::BadBodyLength(_)
            | BusError::InvalidEndian(_)
            | BusError::InvalidHeaderField(_)
            | BusError::MissingHeaderField(_) => "org.alljoyn.Bus.BadMessage",
            BusError::InterfaceMismatch(_) => "org.alljoyn.Bus.InterfaceMismatch",
            BusError::MemberAlreadyExists(_) => "org.alljoyn.Bus.MemberAlreadyExists",
            BusError::PropertyAccessDenied(_) => "org.freedesktop.DBus.Error.PropertyAccessDenied",
            BusError::NoSuchProperty(_) => "org.freedesktop.DBus.Error.PropertyDoesNotExist",
            BusError::NoSuchInterface(_) => "org.freedesktop.DBus.Error.UnknownInterface",
            BusError::NoSuchMember(_) => "org.freedesktop.DBus.Error.UnknownMethod",
            BusError::IllegalObjectPath(_) => "org.alljoyn.Bus.BadObjPath",
            BusError::NameTooLong(_) => "org.alljoyn.Bus.NameTooLong",
            BusError::NotEncrypted => "org.alljoyn.Bus.MessageNotEncrypted",
            BusError::DecryptionFailed => "org.alljoyn.Bus.DecryptionFailed",
            BusError::NotAuthorized => "org.alljoyn.Bus.NotAuthorized",
            BusError::NoSuchObject(_) => "org.freedesktop.DBus.Error.UnknownObject",
            BusError::ServiceUnknown(_) => "org.freedesktop.DBus.Error.ServiceUnknown",
            BusError::EndpointClosing => "org.alljoyn.Bus.EndpointClosing",
            BusError::BusNotStarted => "org.alljoyn.Bus.BusNotStarted",
            BusError::UnmatchedReplySerial(_) => "org.alljoyn.Bus.UnmatchedReplySerial",
            BusError::TtlExpired => "org.alljoyn.Bus.TTLExpired",
            BusError::Timeout => "org.alljoyn.Bus.Timeout",
            BusError::Exiting => "org.alljoyn.Bus.Exiting",
            BusError::BlockingCallNotAllowed => "org.alljoyn.Bus.BlockingCallNotAllowed",
            BusError::WouldBlock => "org.alljoyn.Bus.WouldBlock",
            BusError::MethodCallAborted => "org.alljoyn.Bus.MethodCallAborted",
            BusError::CannotExpand(_) => "org.alljoyn.Bus.CannotExpand",
            BusError::Io(_) => "org.alljoyn.Bus.IOError",
            BusError::Xml(_) => "org.alljoyn.Bus.BadXml",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_name_matches_taxonomy() {
        assert_eq!(BusError::Timeout.error_name(), "org.alljoyn.Bus.Timeout");
        assert_eq!(
            BusError::BlockingCallNotAllowed.error_name(),
            "org.alljoyn.Bus.BlockingCallNotAllowed"
        );
        assert_eq!(
            BusError::NoSuchInterface("org.example.Foo".into()).error_name(),
            "org.freedesktop.DBus.Error.UnknownInterface"
        );
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let bus_err: BusError = io_err.into();
        matches!(bus_err, BusError::Io(_));
    }
}
