//! Exercises a `ProxyObject`'s property cache against a fake
//! `org.freedesktop.DBus.Properties` responder reached over the
//! loopback transport: a cold read round-trips through the wire, a
//! warm read is served from cache without touching the transport.

mod common;

use alljoyn_bus_core::endpoint::ReplyMap;
use alljoyn_bus_core::error::Result;
use alljoyn_bus_core::proxy::{ProxyObject, Reentrancy};
use alljoyn_bus_core::transport::{Handle, Transport};
use alljoyn_bus_core::wire::{Arg, Message, Signature};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Duration;

const LIGHT_INTERFACE: &str = "org.example.Light";

/// Answers every `Properties.Get` with a fixed brightness value and
/// counts how many times it was actually asked.
struct PropertiesResponder {
    inbox: mpsc::Receiver<Message>,
    reply_map: Arc<Mutex<ReplyMap>>,
    gets_served: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for PropertiesResponder {
    async fn recv_message(&mut self, _max_packet: u32) -> Result<(Message, Vec<Handle>)> {
        self.inbox.recv().await.map(|m| (m, vec![])).ok_or(alljoyn_bus_core::error::BusError::EndpointClosing)
    }

    async fn send_message(&mut self, message: &Message, _handles: &[Handle]) -> Result<()> {
        self.gets_served.fetch_add(1, Ordering::SeqCst);
        let mut reply = Message::method_return(message.serial, message.serial + 1)?;
        reply.set_args(Signature::new("v")?, vec![Arg::Variant(Box::new(Arg::Int32(72)))])?;
        self.reply_map.lock().await.complete(reply)
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "properties-responder"
    }
}

#[tokio::test]
async fn cold_get_hits_the_wire_and_warm_get_is_served_from_cache() {
    let reply_map = Arc::new(Mutex::new(ReplyMap::new()));
    let gets_served = Arc::new(AtomicUsize::new(0));
    let (_tx, rx) = mpsc::channel(4);
    let transport: Arc<Mutex<dyn Transport>> = Arc::new(Mutex::new(PropertiesResponder {
        inbox: rx,
        reply_map: reply_map.clone(),
        gets_served: gets_served.clone(),
    }));

    let proxy = ProxyObject::new(
        "/light1",
        transport,
        Arc::new(alljoyn_bus_core::wire::SerialAllocator::new()),
        reply_map,
        Duration::from_secs(5),
    );

    let first = proxy.get_property(LIGHT_INTERFACE, "Brightness", Reentrancy::Allowed).await.unwrap();
    assert_eq!(first, Arg::Int32(72));
    assert_eq!(gets_served.load(Ordering::SeqCst), 1);

    let second = proxy.get_property(LIGHT_INTERFACE, "Brightness", Reentrancy::Allowed).await.unwrap();
    assert_eq!(second, Arg::Int32(72));
    assert_eq!(gets_served.load(Ordering::SeqCst), 1, "a warm read must not touch the transport again");
}

#[tokio::test]
async fn invalidating_the_interface_forces_the_next_read_back_onto_the_wire() {
    let reply_map = Arc::new(Mutex::new(ReplyMap::new()));
    let gets_served = Arc::new(AtomicUsize::new(0));
    let (_tx, rx) = mpsc::channel(4);
    let transport: Arc<Mutex<dyn Transport>> = Arc::new(Mutex::new(PropertiesResponder {
        inbox: rx,
        reply_map: reply_map.clone(),
        gets_served: gets_served.clone(),
    }));

    let proxy = ProxyObject::new(
        "/light1",
        transport,
        Arc::new(alljoyn_bus_core::wire::SerialAllocator::new()),
        reply_map,
        Duration::from_secs(5),
    );

    proxy.get_property(LIGHT_INTERFACE, "Brightness", Reentrancy::Allowed).await.unwrap();
    proxy.properties().invalidate(LIGHT_INTERFACE);
    proxy.get_property(LIGHT_INTERFACE, "Brightness", Reentrancy::Allowed).await.unwrap();

    assert_eq!(gets_served.load(Ordering::SeqCst), 2);
}
