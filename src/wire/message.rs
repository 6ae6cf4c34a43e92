//! # Message Codec
//!
//! Converts [`Message`] values to and from the binary representation
//! described in spec §6 ("Wire format (bit-exact)"): a fixed 16-byte
//! header, an array of 8-byte-aligned header-field entries, padding to an
//! 8-byte boundary, then the body. Endian handling, the `New -> HeaderFields
//! -> HeaderBody -> Complete` receive state machine, and the lazy
//! `UnmarshalArgs` cache are all modeled here.

use crate::error::{BusError, Result};
use crate::runtime::CompressionTable;
use crate::wire::arg::Arg;
use crate::wire::header::{HeaderField, HeaderFieldTable};
use crate::wire::signature::{parse_complete_type, Signature};
use crate::wire::typecode::{pad_up, TypeCode};
use std::sync::atomic::{AtomicU32, Ordering};

/// Default maximum packet size (header + body), per spec §6 Limits.
pub const MAX_PACKET_SIZE: u32 = 128 * 1024;
/// Default maximum header size, per spec §6 Limits.
pub const MAX_HEADER_SIZE: u32 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn wire_byte(self) -> u8 {
        match self {
            Endian::Little => b'l',
            Endian::Big => b'B',
        }
    }

    pub fn from_wire_byte(b: u8) -> Result<Endian> {
        match b {
            b'l' => Ok(Endian::Little),
            b'B' => Ok(Endian::Big),
            other => Err(BusError::InvalidEndian(other)),
        }
    }

    pub fn host() -> Endian {
        if cfg!(target_endian = "little") {
            Endian::Little
        } else {
            Endian::Big
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Invalid = 0,
    MethodCall = 1,
    MethodReturn = 2,
    Error = 3,
    Signal = 4,
}

impl MessageType {
    pub fn from_u8(b: u8) -> Result<MessageType> {
        match b {
            0 => Ok(MessageType::Invalid),
            1 => Ok(MessageType::MethodCall),
            2 => Ok(MessageType::MethodReturn),
            3 => Ok(MessageType::Error),
            4 => Ok(MessageType::Signal),
            other => Err(BusError::BadValue(other as char)),
        }
    }
}

/// Message flag bits. Not tied to the upstream D-Bus flag bitfield one
/// for one, since this dialect adds sessionless/global-broadcast/
/// compressed bits spec §3 names explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    pub const NO_REPLY_EXPECTED: Flags = Flags(0x01);
    pub const AUTO_START: Flags = Flags(0x02);
    pub const ENCRYPTED: Flags = Flags(0x04);
    pub const SESSIONLESS: Flags = Flags(0x08);
    pub const GLOBAL_BROADCAST: Flags = Flags(0x10);
    pub const COMPRESSED: Flags = Flags(0x20);

    pub fn empty() -> Flags {
        Flags(0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> Flags {
        Flags(bits)
    }

    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Flags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;
    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// Monotonic per-endpoint serial allocator. Zero is never emitted (it is
/// reserved as "invalid").
#[derive(Debug, Default)]
pub struct SerialAllocator(AtomicU32);

impl SerialAllocator {
    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    pub fn next(&self) -> u32 {
        loop {
            let s = self.0.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if s != 0 {
                return s;
            }
            // wrapped exactly onto zero; spin to skip it.
        }
    }
}

/// A fully decoded or not-yet-fully-built bus message.
#[derive(Debug, Clone)]
pub struct Message {
    pub endian: Endian,
    pub msg_type: MessageType,
    pub flags: Flags,
    pub version: u8,
    pub serial: u32,
    pub header_fields: HeaderFieldTable,
    body_sig: Signature,
    /// Raw marshalled body bytes, pre-`UnmarshalArgs`, in
    /// `body_wire_endian` order rather than `endian` — `endian` is
    /// normalized to host immediately on decode (spec §4.1/§8 scenario
    /// 1), but the body bytes aren't actually swapped until
    /// `unmarshal_args` reads them, so the two can briefly disagree.
    raw_body: Vec<u8>,
    /// The endian the still-raw `raw_body` bytes are actually in.
    /// Equal to `endian` for any message built via the constructors
    /// below; only diverges for a `decode()`d message from a
    /// foreign-endian peer, until `unmarshal_args` catches it up.
    body_wire_endian: Endian,
    args: Option<Vec<Arg>>,
    pub received_endpoint: Option<String>,
    pub handles: Vec<i32>,
    pub timestamp: u64,
    pub ttl: Option<u16>,
}

impl Message {
    pub fn new(msg_type: MessageType, serial: u32) -> Result<Message> {
        if serial == 0 {
            return Err(BusError::BadValue('0'));
        }
        Ok(Message {
            endian: Endian::host(),
            msg_type,
            flags: Flags::empty(),
            version: 1,
            serial,
            header_fields: HeaderFieldTable::new(),
            body_sig: Signature::empty(),
            raw_body: Vec::new(),
            body_wire_endian: Endian::host(),
            args: None,
            received_endpoint: None,
            handles: Vec::new(),
            timestamp: 0,
            ttl: None,
        })
    }

    pub fn method_call(
        path: &str,
        interface: Option<&str>,
        member: &str,
        serial: u32,
    ) -> Result<Message> {
        let mut m = Message::new(MessageType::MethodCall, serial)?;
        m.header_fields.set(HeaderField::Path, Arg::ObjectPath(path.to_string()))?;
        if let Some(iface) = interface {
            m.header_fields.set(HeaderField::Interface, Arg::String(iface.to_string()))?;
        }
        m.header_fields.set(HeaderField::Member, Arg::String(member.to_string()))?;
        Ok(m)
    }

    pub fn signal(path: &str, interface: &str, member: &str, serial: u32) -> Result<Message> {
        let mut m = Message::new(MessageType::Signal, serial)?;
        m.header_fields.set(HeaderField::Path, Arg::ObjectPath(path.to_string()))?;
        m.header_fields.set(HeaderField::Interface, Arg::String(interface.to_string()))?;
        m.header_fields.set(HeaderField::Member, Arg::String(member.to_string()))?;
        Ok(m)
    }

    pub fn error_reply(error_name: &str, reply_serial: u32, serial: u32) -> Result<Message> {
        let mut m = Message::new(MessageType::Error, serial)?;
        m.header_fields.set(HeaderField::ErrorName, Arg::String(error_name.to_string()))?;
        m.header_fields.set(HeaderField::ReplySerial, Arg::Uint32(reply_serial))?;
        Ok(m)
    }

    pub fn method_return(reply_serial: u32, serial: u32) -> Result<Message> {
        let mut m = Message::new(MessageType::MethodReturn, serial)?;
        m.header_fields.set(HeaderField::ReplySerial, Arg::Uint32(reply_serial))?;
        Ok(m)
    }

    /// Sets the outbound argument list and its signature; the arguments
    /// are also cached immediately since we built them ourselves (only
    /// a *received* message defers unmarshal).
    pub fn set_args(&mut self, sig: Signature, args: Vec<Arg>) -> Result<()> {
        self.header_fields.set(HeaderField::Signature, Arg::Signature(sig.clone()))?;
        self.raw_body = encode_args(&args);
        self.body_sig = sig;
        self.args = Some(args);
        Ok(())
    }

    /// Validates the per-type required-field invariants from spec §3.
    pub fn header_checks(&self) -> Result<()> {
        match self.msg_type {
            MessageType::MethodCall => {
                if self.header_fields.path().is_none() {
                    return Err(BusError::MissingHeaderField("path"));
                }
                if self.header_fields.member().is_none() {
                    return Err(BusError::MissingHeaderField("member"));
                }
            }
            MessageType::Signal => {
                if self.header_fields.path().is_none() {
                    return Err(BusError::MissingHeaderField("path"));
                }
                if self.header_fields.interface().is_none() {
                    return Err(BusError::MissingHeaderField("interface"));
                }
                if self.header_fields.member().is_none() {
                    return Err(BusError::MissingHeaderField("member"));
                }
            }
            MessageType::Error => {
                if self.header_fields.error_name().is_none() {
                    return Err(BusError::MissingHeaderField("error_name"));
                }
                if self.header_fields.reply_serial().is_none() {
                    return Err(BusError::MissingHeaderField("reply_serial"));
                }
            }
            MessageType::MethodReturn => {
                if self.header_fields.reply_serial().is_none() {
                    return Err(BusError::MissingHeaderField("reply_serial"));
                }
            }
            MessageType::Invalid => return Err(BusError::BadValue('\0')),
        }
        if self.serial == 0 {
            return Err(BusError::BadValue('0'));
        }
        Ok(())
    }

    /// Encodes this message to its wire representation:
    /// `<fixed 16-byte header><header-fields><pad to 8><body>`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.header_checks()?;

        let mut fields_buf = Vec::new();
        let mut ordered: Vec<_> = self.header_fields.iter().collect();
        ordered.sort_by_key(|(field, _)| **field);
        for (field, value) in ordered {
            align_write(&mut fields_buf, 8);
            fields_buf.push(*field as u8);
            let sig = value.signature();
            fields_buf.push(sig.len() as u8);
            fields_buf.extend_from_slice(sig.as_bytes());
            fields_buf.push(0);
            write_arg(&mut fields_buf, value, self.endian);
        }

        let header_len = fields_buf.len() as u32;
        if header_len > MAX_HEADER_SIZE {
            return Err(BusError::BadHeaderLength(header_len));
        }
        let body_len = self.raw_body.len() as u32;
        if body_len > MAX_PACKET_SIZE {
            return Err(BusError::BadBodyLength(body_len));
        }

        let mut out = Vec::with_capacity(16 + fields_buf.len() + 8 + self.raw_body.len());
        out.push(self.endian.wire_byte());
        out.push(self.msg_type as u8);
        out.push(self.flags.bits());
        out.push(self.version);
        write_u32(&mut out, body_len, self.endian);
        write_u32(&mut out, self.serial, self.endian);
        write_u32(&mut out, header_len, self.endian);

        out.extend_from_slice(&fields_buf);
        align_write(&mut out, 8);
        out.extend_from_slice(&self.raw_body);
        Ok(out)
    }

    /// Parses the fixed 16-byte header only, normalizing endianness to
    /// host order per the receive state machine's `HeaderFields` state.
    /// Returns `(message type, flags, version, body_len, serial,
    /// header_len)` plus the detected wire endian.
    pub fn parse_fixed_header(bytes: &[u8]) -> Result<FixedHeader> {
        if bytes.len() < 16 {
            return Err(BusError::Io("short read on fixed header".into()));
        }
        let endian = Endian::from_wire_byte(bytes[0])?;
        let msg_type = MessageType::from_u8(bytes[1])?;
        let flags = Flags::from_bits(bytes[2]);
        let version = bytes[3];
        let body_len = read_u32(&bytes[4..8], endian);
        let serial = read_u32(&bytes[8..12], endian);
        let header_len = read_u32(&bytes[12..16], endian);
        Ok(FixedHeader { endian, msg_type, flags, version, body_len, serial, header_len })
    }

    /// `InterpretHeader`: validates the fixed header and computes the
    /// total packet size expected to follow.
    pub fn interpret_header(fh: &FixedHeader, max_packet: u32) -> Result<usize> {
        if fh.header_len > MAX_HEADER_SIZE {
            return Err(BusError::BadHeaderLength(fh.header_len));
        }
        let pkt_size = pad_up(fh.header_len as usize, 8) + fh.body_len as usize;
        if pkt_size as u32 > max_packet || fh.body_len > max_packet {
            return Err(BusError::BadBodyLength(fh.body_len));
        }
        Ok(pkt_size)
    }

    /// Decodes a complete wire buffer (fixed header + header fields +
    /// padding + body) into a `Message`. Body arguments remain
    /// unmarshalled until [`Message::unmarshal_args`] is called.
    pub fn decode(bytes: &[u8], max_packet: u32) -> Result<Message> {
        let fh = Message::parse_fixed_header(bytes)?;
        let pkt_size = Message::interpret_header(&fh, max_packet)?;
        if bytes.len() < 16 + pkt_size {
            return Err(BusError::Io("short read on message body".into()));
        }
        let mut pos = 16usize;
        let fields_end = 16 + fh.header_len as usize;
        let mut header_fields = HeaderFieldTable::new();
        while pos < fields_end {
            align_read(&mut pos, 8);
            if pos >= fields_end {
                break;
            }
            let field_id = bytes[pos];
            pos += 1;
            let sig_len = bytes[pos] as usize;
            pos += 1;
            let sig_str = std::str::from_utf8(&bytes[pos..pos + sig_len])
                .map_err(|_| BusError::BadSignature("non-utf8 header field signature".into()))?
                .to_string();
            pos += sig_len;
            pos += 1; // NUL terminator
            let field = HeaderField::from_u8(field_id)?;
            let mut sig_pos = 0usize;
            let sig_bytes = sig_str.as_bytes();
            let tc = parse_complete_type(sig_bytes, &mut sig_pos)?;
            if tc != field.wire_type() {
                return Err(BusError::InvalidHeaderField(field_id));
            }
            let value = read_arg(bytes, &mut pos, sig_bytes, &mut 0, fh.endian)?;
            header_fields.set(field, value)?;
        }

        let body_start = 16 + pad_up(fh.header_len as usize, 8);
        let body_end = body_start + fh.body_len as usize;
        let raw_body = bytes[body_start..body_end].to_vec();

        let body_sig = header_fields
            .signature()
            .map(|s| Signature::new(s.to_string()))
            .transpose()?
            .unwrap_or_else(Signature::empty);

        Ok(Message {
            // Normalized to host immediately: the receive state machine's
            // `HeaderFields` state is defined to leave no observable trace
            // of the wire endian once the fixed header has been read.
            endian: Endian::host(),
            msg_type: fh.msg_type,
            flags: fh.flags,
            version: fh.version,
            serial: fh.serial,
            header_fields,
            body_sig,
            raw_body,
            body_wire_endian: fh.endian,
            args: None,
            received_endpoint: None,
            handles: Vec::new(),
            timestamp: 0,
            ttl: None,
        })
    }

    /// Lazily unmarshals and caches the body arguments, requiring the
    /// body signature to exactly match `expected_sig` (or `*`). Reads
    /// `raw_body` using `body_wire_endian` — the endian the bytes were
    /// actually written in — regardless of what `endian` (already
    /// host-normalized by `decode()`) reports. On failure the cache
    /// remains unset so a retry with a different expectation is possible.
    pub fn unmarshal_args(&mut self, expected_sig: &str) -> Result<&[Arg]> {
        if self.args.is_none() {
            if !(expected_sig == "*" || expected_sig == self.body_sig.as_str()) {
                return Err(BusError::BadSignature(format!(
                    "expected '{}', found '{}'",
                    expected_sig,
                    self.body_sig.as_str()
                )));
            }
            let sig_bytes = self.body_sig.as_str().as_bytes().to_vec();
            let mut byte_pos = 0usize;
            let mut args = Vec::new();
            let mut sig_pos = 0usize;
            while sig_pos < sig_bytes.len() {
                args.push(read_arg(&self.raw_body, &mut byte_pos, &sig_bytes, &mut sig_pos, self.body_wire_endian)?);
            }
            self.args = Some(args);
            self.body_wire_endian = Endian::host();
        }
        Ok(self.args.as_deref().unwrap())
    }

    pub fn body_signature(&self) -> &str {
        self.body_sig.as_str()
    }

    /// Expands a `Flags::COMPRESSED` message's header fields against the
    /// rule its `CompressionToken` field names, overlaying every field
    /// the sender elided (spec §4.1 "Compression"). A no-op when the
    /// message isn't flagged compressed.
    pub fn expand_compression(&mut self, compression: &CompressionTable) -> Result<()> {
        if !self.flags.contains(Flags::COMPRESSED) {
            return Ok(());
        }
        let token = match self.header_fields.get(HeaderField::CompressionToken) {
            Some(Arg::Uint32(token)) => *token,
            _ => return Err(BusError::MissingHeaderField("compression_token")),
        };
        let rule = compression.expand(token)?;
        self.header_fields.overlay_from_rule(&rule);
        Ok(())
    }

    pub fn is_method_call(&self) -> bool {
        self.msg_type == MessageType::MethodCall
    }

    pub fn is_signal(&self) -> bool {
        self.msg_type == MessageType::Signal
    }

    pub fn is_error(&self) -> bool {
        self.msg_type == MessageType::Error
    }

    pub fn is_method_return(&self) -> bool {
        self.msg_type == MessageType::MethodReturn
    }

    /// Diagnostics-only human-readable summary, never used on the wire.
    /// Mirrors `_Message::ToString()` in the original source.
    pub fn display_summary(&self) -> String {
        let kind = match self.msg_type {
            MessageType::Invalid => "INVALID",
            MessageType::MethodCall => "METHOD_CALL",
            MessageType::MethodReturn => "METHOD_RET",
            MessageType::Error => "ERROR",
            MessageType::Signal => "SIGNAL",
        };
        format!(
            "{kind} serial={} path={:?} iface={:?} member={:?} sig={:?}",
            self.serial,
            self.header_fields.path(),
            self.header_fields.interface(),
            self.header_fields.member(),
            self.body_sig.as_str(),
        )
    }
}

pub struct FixedHeader {
    pub endian: Endian,
    pub msg_type: MessageType,
    pub flags: Flags,
    pub version: u8,
    pub body_len: u32,
    pub serial: u32,
    pub header_len: u32,
}

fn align_write(buf: &mut Vec<u8>, alignment: usize) {
    let target = pad_up(buf.len(), alignment);
    buf.resize(target, 0);
}

fn align_read(pos: &mut usize, alignment: usize) {
    *pos = pad_up(*pos, alignment);
}

fn write_u16(buf: &mut Vec<u8>, v: u16, endian: Endian) {
    match endian {
        Endian::Little => buf.extend_from_slice(&v.to_le_bytes()),
        Endian::Big => buf.extend_from_slice(&v.to_be_bytes()),
    }
}

fn write_u32(buf: &mut Vec<u8>, v: u32, endian: Endian) {
    match endian {
        Endian::Little => buf.extend_from_slice(&v.to_le_bytes()),
        Endian::Big => buf.extend_from_slice(&v.to_be_bytes()),
    }
}

fn write_u64(buf: &mut Vec<u8>, v: u64, endian: Endian) {
    match endian {
        Endian::Little => buf.extend_from_slice(&v.to_le_bytes()),
        Endian::Big => buf.extend_from_slice(&v.to_be_bytes()),
    }
}

fn read_u16(bytes: &[u8], endian: Endian) -> u16 {
    let arr: [u8; 2] = bytes[..2].try_into().unwrap();
    match endian {
        Endian::Little => u16::from_le_bytes(arr),
        Endian::Big => u16::from_be_bytes(arr),
    }
}

fn read_u32(bytes: &[u8], endian: Endian) -> u32 {
    let arr: [u8; 4] = bytes[..4].try_into().unwrap();
    match endian {
        Endian::Little => u32::from_le_bytes(arr),
        Endian::Big => u32::from_be_bytes(arr),
    }
}

fn read_u64(bytes: &[u8], endian: Endian) -> u64 {
    let arr: [u8; 8] = bytes[..8].try_into().unwrap();
    match endian {
        Endian::Little => u64::from_le_bytes(arr),
        Endian::Big => u64::from_be_bytes(arr),
    }
}

fn encode_args(args: &[Arg]) -> Vec<u8> {
    let mut buf = Vec::new();
    for a in args {
        write_arg(&mut buf, a, Endian::host());
    }
    buf
}

fn write_arg(buf: &mut Vec<u8>, arg: &Arg, endian: Endian) {
    let align = arg.type_code().alignment();
    if !matches!(arg, Arg::Signature(_)) {
        align_write(buf, align);
    }
    match arg {
        Arg::Byte(v) => buf.push(*v),
        Arg::Boolean(v) => write_u32(buf, if *v { 1 } else { 0 }, endian),
        Arg::Int16(v) => write_u16(buf, *v as u16, endian),
        Arg::Uint16(v) => write_u16(buf, *v, endian),
        Arg::Int32(v) => write_u32(buf, *v as u32, endian),
        Arg::Uint32(v) => write_u32(buf, *v, endian),
        Arg::Int64(v) => write_u64(buf, *v as u64, endian),
        Arg::Uint64(v) => write_u64(buf, *v, endian),
        Arg::Double(bits) => write_u64(buf, *bits, endian),
        Arg::String(s) | Arg::ObjectPath(s) => {
            write_u32(buf, s.len() as u32, endian);
            buf.extend_from_slice(s.as_bytes());
            buf.push(0);
        }
        Arg::Signature(sig) => {
            buf.push(sig.as_str().len() as u8);
            buf.extend_from_slice(sig.as_str().as_bytes());
            buf.push(0);
        }
        Arg::Handle(idx) => write_u32(buf, *idx as u32, endian),
        Arg::Array { elements, elem_sig } => {
            let len_pos = buf.len();
            write_u32(buf, 0, endian);
            // Pad to the element alignment unconditionally, even for an
            // empty array: `GetSize`/`read_arg`/`ParseArray` all align
            // before the (possibly zero-length) element data, so an
            // empty array of a >4-byte-aligned element type still needs
            // its padding written for `decode(encode(M)) == M` to hold.
            let elem_align = elem_sig
                .as_str()
                .chars()
                .next()
                .and_then(TypeCode::from_char)
                .map(TypeCode::alignment)
                .unwrap_or(1);
            align_write(buf, elem_align);
            let data_start = buf.len();
            for e in elements {
                write_arg(buf, e, endian);
            }
            let data_len = (buf.len() - data_start) as u32;
            let bytes: [u8; 4] = match endian {
                Endian::Little => data_len.to_le_bytes(),
                Endian::Big => data_len.to_be_bytes(),
            };
            buf[len_pos..len_pos + 4].copy_from_slice(&bytes);
        }
        Arg::Struct(members) => {
            for m in members {
                write_arg(buf, m, endian);
            }
        }
        Arg::DictEntry(k, v) => {
            write_arg(buf, k, endian);
            write_arg(buf, v, endian);
        }
        Arg::Variant(inner) => {
            let sig = inner.signature();
            buf.push(sig.len() as u8);
            buf.extend_from_slice(sig.as_bytes());
            buf.push(0);
            write_arg(buf, inner, endian);
        }
    }
}

/// Reads one value of the complete type starting at `sig[*sig_pos]` from
/// `bytes[*byte_pos]`, advancing both cursors.
fn read_arg(
    bytes: &[u8],
    byte_pos: &mut usize,
    sig: &[u8],
    sig_pos: &mut usize,
    endian: Endian,
) -> Result<Arg> {
    if *sig_pos >= sig.len() {
        return Err(BusError::BadCompleteType(*sig_pos));
    }
    let c = sig[*sig_pos] as char;
    *sig_pos += 1;

    macro_rules! align {
        ($n:expr) => {
            align_read(byte_pos, $n)
        };
    }

    Ok(match c {
        'y' => {
            let v = bytes[*byte_pos];
            *byte_pos += 1;
            Arg::Byte(v)
        }
        'b' => {
            align!(4);
            let v = read_u32(&bytes[*byte_pos..], endian);
            *byte_pos += 4;
            Arg::Boolean(v != 0)
        }
        'n' => {
            align!(2);
            let v = read_u16(&bytes[*byte_pos..], endian) as i16;
            *byte_pos += 2;
            Arg::Int16(v)
        }
        'q' => {
            align!(2);
            let v = read_u16(&bytes[*byte_pos..], endian);
            *byte_pos += 2;
            Arg::Uint16(v)
        }
        'i' => {
            align!(4);
            let v = read_u32(&bytes[*byte_pos..], endian) as i32;
            *byte_pos += 4;
            Arg::Int32(v)
        }
        'u' => {
            align!(4);
            let v = read_u32(&bytes[*byte_pos..], endian);
            *byte_pos += 4;
            Arg::Uint32(v)
        }
        'x' => {
            align!(8);
            let v = read_u64(&bytes[*byte_pos..], endian) as i64;
            *byte_pos += 8;
            Arg::Int64(v)
        }
        't' => {
            align!(8);
            let v = read_u64(&bytes[*byte_pos..], endian);
            *byte_pos += 8;
            Arg::Uint64(v)
        }
        'd' => {
            align!(8);
            let v = read_u64(&bytes[*byte_pos..], endian);
            *byte_pos += 8;
            Arg::Double(v)
        }
        's' | 'o' => {
            align!(4);
            let len = read_u32(&bytes[*byte_pos..], endian) as usize;
            *byte_pos += 4;
            let s = std::str::from_utf8(&bytes[*byte_pos..*byte_pos + len])
                .map_err(|_| BusError::BadValue('s'))?
                .to_string();
            *byte_pos += len + 1; // skip trailing NUL
            if c == 's' {
                Arg::String(s)
            } else {
                Arg::ObjectPath(s)
            }
        }
        'g' => {
            let len = bytes[*byte_pos] as usize;
            *byte_pos += 1;
            let s = std::str::from_utf8(&bytes[*byte_pos..*byte_pos + len])
                .map_err(|_| BusError::BadValue('g'))?
                .to_string();
            *byte_pos += len + 1;
            Arg::Signature(Signature::new(s)?)
        }
        'h' => {
            align!(4);
            let v = read_u32(&bytes[*byte_pos..], endian) as i32;
            *byte_pos += 4;
            Arg::Handle(v)
        }
        'v' => {
            let len = bytes[*byte_pos] as usize;
            *byte_pos += 1;
            let inner_sig = bytes[*byte_pos..*byte_pos + len].to_vec();
            *byte_pos += len + 1;
            let mut inner_pos = 0usize;
            let inner = read_arg(bytes, byte_pos, &inner_sig, &mut inner_pos, endian)?;
            Arg::Variant(Box::new(inner))
        }
        'a' => {
            align!(4);
            let data_len = read_u32(&bytes[*byte_pos..], endian) as usize;
            *byte_pos += 4;
            // determine the element's complete-type span within `sig`
            let elem_start = *sig_pos;
            let mut probe = elem_start;
            let elem_tc = parse_complete_type(sig, &mut probe)?;
            let elem_sig_str = std::str::from_utf8(&sig[elem_start..probe]).unwrap().to_string();
            align_read(byte_pos, elem_tc.alignment());
            let data_end = *byte_pos + data_len;
            let mut elements = Vec::new();
            while *byte_pos < data_end {
                let mut elem_sig_pos = elem_start;
                elements.push(read_arg(bytes, byte_pos, sig, &mut elem_sig_pos, endian)?);
            }
            *sig_pos = probe;
            Arg::Array { elem_sig: Signature::new(elem_sig_str)?, elements }
        }
        '(' => {
            align_read(byte_pos, 8);
            let mut members = Vec::new();
            loop {
                if sig[*sig_pos] == b')' {
                    *sig_pos += 1;
                    break;
                }
                members.push(read_arg(bytes, byte_pos, sig, sig_pos, endian)?);
            }
            Arg::Struct(members)
        }
        '{' => {
            align_read(byte_pos, 8);
            let key = read_arg(bytes, byte_pos, sig, sig_pos, endian)?;
            let val = read_arg(bytes, byte_pos, sig, sig_pos, endian)?;
            if sig.get(*sig_pos) == Some(&b'}') {
                *sig_pos += 1;
            }
            Arg::DictEntry(Box::new(key), Box::new(val))
        }
        _ => return Err(BusError::BadCompleteType(*sig_pos)),
    })
}
