//! # Runtime Configuration
//!
//! The original source keeps compression rules and the default
//! endianness as process-wide static globals. Per spec §9 ("Global
//! state"), this crate instead builds an explicit [`Runtime`] value once
//! at bus-attachment startup and threads it through every component by
//! `Arc`, the way the teacher threads a `TransportConfig`/`BenchmarkConfig`
//! pair through its transports and runner.

use crate::error::{BusError, Result};
use crate::wire::header::HeaderFieldTable;
use crate::wire::message::{Endian, MAX_HEADER_SIZE, MAX_PACKET_SIZE};
use std::collections::HashMap;
use std::sync::RwLock;

/// Wire and protocol limits, overridable by the embedding application.
/// Defaults match spec §6 Limits.
#[derive(Debug, Clone)]
pub struct Limits {
    pub max_packet_size: u32,
    pub max_header_size: u32,
    pub max_name_length: usize,
    pub max_signature_length: usize,
    pub max_array_nesting: u32,
    pub max_struct_nesting: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_packet_size: MAX_PACKET_SIZE,
            max_header_size: MAX_HEADER_SIZE,
            max_name_length: 255,
            max_signature_length: 255,
            max_array_nesting: 32,
            max_struct_nesting: 32,
        }
    }
}

/// A previously-negotiated compression rule: an opaque token identifying
/// a fixed set of header-field values a sender may omit from later
/// messages (spec §4.1 "Compression").
#[derive(Debug, Default)]
pub struct CompressionTable {
    rules: RwLock<HashMap<u32, HeaderFieldTable>>,
}

impl CompressionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: u32, rule: HeaderFieldTable) {
        self.rules.write().unwrap().insert(token, rule);
    }

    /// Looks up the expansion rule for `token`; `CannotExpand` if the
    /// rule is unknown so the application can fetch it and retry.
    pub fn expand(&self, token: u32) -> Result<HeaderFieldTable> {
        self.rules
            .read()
            .unwrap()
            .get(&token)
            .cloned()
            .ok_or(BusError::CannotExpand(token))
    }
}

/// Process-wide bus configuration, constructed once and shared via `Arc`
/// across the endpoint, proxy, and observer subsystems.
#[derive(Debug)]
pub struct Runtime {
    pub limits: Limits,
    pub default_endian: Endian,
    pub compression: CompressionTable,
    /// Default per-call method-call timeout, used when a caller doesn't
    /// specify one explicitly.
    pub default_call_timeout: std::time::Duration,
    /// Default worker-pool size for the local endpoint's dispatcher
    /// (spec §4.2: "a bounded worker pool (default 4)").
    pub dispatcher_workers: usize,
    /// Observer keep-alive ping interval (spec §4.4: group `OBSERVER`,
    /// interval 30s).
    pub observer_ping_interval: std::time::Duration,
    /// This endpoint's answer to `org.freedesktop.DBus.Peer.GetMachineId`
    /// (spec §4.2 "Standard interfaces"): stable for the life of the
    /// process, generated once at startup rather than persisted.
    pub machine_id: String,
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime {
            limits: Limits::default(),
            default_endian: Endian::host(),
            compression: CompressionTable::new(),
            default_call_timeout: std::time::Duration::from_secs(25),
            dispatcher_workers: 4,
            observer_ping_interval: std::time::Duration::from_secs(30),
            machine_id: generate_machine_id(),
        }
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: Limits) -> Self {
        Runtime { limits, ..Self::default() }
    }
}

/// A 32-hex-character id, process-unique enough to answer `GetMachineId`
/// without needing a filesystem-persisted UUID the way `dbus-daemon`'s
/// `/var/lib/dbus/machine-id` does.
fn generate_machine_id() -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::time::{SystemTime, UNIX_EPOCH};

    let mut hasher = DefaultHasher::new();
    std::process::id().hash(&mut hasher);
    SystemTime::now().duration_since(UNIX_EPOCH).ok().hash(&mut hasher);
    let high = hasher.finish();
    hasher.write_u8(0xa5);
    let low = hasher.finish();
    format!("{high:016x}{low:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::arg::Arg;
    use crate::wire::header::HeaderField;

    #[test]
    fn default_limits_match_spec() {
        let rt = Runtime::new();
        assert_eq!(rt.limits.max_packet_size, 128 * 1024);
        assert_eq!(rt.limits.max_header_size, 64 * 1024);
        assert_eq!(rt.limits.max_array_nesting, 32);
        assert_eq!(rt.limits.max_struct_nesting, 32);
    }

    #[test]
    fn machine_id_is_32_lowercase_hex_chars() {
        let id = generate_machine_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn compression_table_round_trips() {
        let table = CompressionTable::new();
        let mut rule = HeaderFieldTable::new();
        rule.set(HeaderField::Path, Arg::ObjectPath("/a".into())).unwrap();
        table.insert(7, rule);
        assert!(table.expand(7).is_ok());
        assert!(matches!(table.expand(8), Err(BusError::CannotExpand(8))));
    }
}
