//! # AllJoyn Bus Core
//!
//! A bus-attachment-free core implementing the wire codec, interface
//! descriptions, local object dispatch, remote proxies, and peer
//! discovery of an AllJoyn-style message bus, independent of any
//! specific transport.

pub mod endpoint;
pub mod error;
pub mod iface;
pub mod logging;
pub mod object;
pub mod observer;
pub mod proxy;
pub mod runtime;
pub mod transport;
pub mod wire;

pub use endpoint::LocalEndpoint;
pub use error::{BusError, Result};
pub use iface::{InterfaceDescription, Member, Property};
pub use object::BusObject;
pub use observer::ObserverManager;
pub use proxy::ProxyObject;
pub use runtime::{Limits, Runtime};
pub use transport::{SecurityHooks, Transport};
pub use wire::{Arg, Message, MessageType, Signature};

/// The current version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values (spec §6 "External Interfaces").
pub mod defaults {
    use std::time::Duration;

    /// Default maximum packet size (header + body) in bytes.
    pub const MAX_PACKET_SIZE: u32 = 128 * 1024;

    /// Default maximum header-field section size in bytes.
    pub const MAX_HEADER_SIZE: u32 = 64 * 1024;

    /// Default per-call method-call timeout.
    pub const CALL_TIMEOUT: Duration = Duration::from_secs(25);

    /// Default dispatcher worker-pool size.
    pub const DISPATCHER_WORKERS: usize = 4;

    /// Default observer keep-alive ping interval.
    pub const OBSERVER_PING_INTERVAL: Duration = Duration::from_secs(30);
}
