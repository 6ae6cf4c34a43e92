//! # `org.freedesktop.DBus.Peer` Built-ins
//!
//! Every local endpoint answers `Ping` and `GetMachineId` without any
//! application registration, the same way the teacher's connection
//! handshake answers a fixed, non-configurable set of control messages
//! before handing the socket off to application-level dispatch.

use crate::endpoint::method_table::MethodTable;
use crate::error::{BusError, Result};
use crate::object::MethodHandler;
use crate::wire::arg::Arg;
use crate::wire::message::{Message, SerialAllocator};
use async_trait::async_trait;
use std::sync::Arc;

pub const PEER_INTERFACE: &str = "org.freedesktop.DBus.Peer";

/// Answers `Ping` with an empty `METHOD_RETURN` and `GetMachineId` with
/// this endpoint's stable machine id string.
pub struct PeerInterface {
    machine_id: String,
    serials: Arc<SerialAllocator>,
}

impl PeerInterface {
    pub fn new(machine_id: impl Into<String>, serials: Arc<SerialAllocator>) -> Self {
        PeerInterface { machine_id: machine_id.into(), serials }
    }

    /// Registers `Ping`/`GetMachineId` on `object_path` in `table`.
    pub fn install(self: Arc<Self>, table: &mut MethodTable, object_path: &str) {
        table.add(object_path, Some(PEER_INTERFACE), "Ping", self.clone());
        table.add(object_path, Some(PEER_INTERFACE), "GetMachineId", self);
    }
}

#[async_trait]
impl MethodHandler for PeerInterface {
    async fn handle_method_call(&self, msg: &Message) -> Result<Message> {
        let serial = self.serials.next();
        match msg.header_fields.member() {
            Some("Ping") => Message::method_return(msg.serial, serial),
            Some("GetMachineId") => {
                let mut reply = Message::method_return(msg.serial, serial)?;
                reply.set_args(crate::wire::signature::Signature::new("s")?, vec![Arg::String(self.machine_id.clone())])?;
                Ok(reply)
            }
            other => Err(BusError::NoSuchMember(other.unwrap_or("").to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ping_returns_empty_method_return() {
        let peer = PeerInterface::new("abc-123", Arc::new(SerialAllocator::new()));
        let call = Message::method_call("/", Some(PEER_INTERFACE), "Ping", 1).unwrap();
        let reply = peer.handle_method_call(&call).await.unwrap();
        assert!(reply.is_method_return());
        assert_eq!(reply.header_fields.reply_serial(), Some(1));
    }

    #[tokio::test]
    async fn get_machine_id_returns_configured_id() {
        let peer = PeerInterface::new("abc-123", Arc::new(SerialAllocator::new()));
        let call = Message::method_call("/", Some(PEER_INTERFACE), "GetMachineId", 1).unwrap();
        let mut reply = peer.handle_method_call(&call).await.unwrap();
        assert_eq!(reply.unmarshal_args("s").unwrap()[0], Arg::String("abc-123".into()));
    }
}
