//! Drives a `LocalEndpoint` from the client side of a loopback
//! transport: register a bus object, place a call, route the reply back
//! through a `ReplyMap`, and confirm an unknown member still reports a
//! typed error instead of hanging.

mod common;

use alljoyn_bus_core::endpoint::{LocalEndpoint, ReplyMap};
use alljoyn_bus_core::error::{BusError, Result};
use alljoyn_bus_core::object::{BusObject, MethodHandler};
use alljoyn_bus_core::proxy::{MethodCaller, Reentrancy};
use alljoyn_bus_core::runtime::Runtime;
use alljoyn_bus_core::transport::Transport;
use alljoyn_bus_core::wire::{Arg, Message, MAX_PACKET_SIZE};
use async_trait::async_trait;
use common::loopback_pair;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;

const CALCULATOR_INTERFACE: &str = "org.example.Calculator";

struct Add;

#[async_trait]
impl MethodHandler for Add {
    async fn handle_method_call(&self, msg: &Message) -> Result<Message> {
        let mut msg = msg.clone();
        let args = msg.unmarshal_args("ii")?;
        let (a, b) = match (&args[0], &args[1]) {
            (Arg::Int32(a), Arg::Int32(b)) => (*a, *b),
            _ => return Err(BusError::BadValue('i')),
        };
        let mut reply = Message::method_return(msg.serial, msg.serial.wrapping_add(1))?;
        reply.set_args(alljoyn_bus_core::wire::Signature::new("i")?, vec![Arg::Int32(a + b)])?;
        Ok(reply)
    }
}

async fn serve_one(service: Arc<Mutex<dyn Transport>>, endpoint: Arc<LocalEndpoint>) {
    let received = service.lock().await.recv_message(MAX_PACKET_SIZE).await;
    let (msg, _handles) = received.expect("service half should receive the call");
    if let Some(reply) = endpoint.route(msg).await {
        service.lock().await.send_message(&reply, &[]).await.expect("reply send should succeed");
    }
}

#[tokio::test]
async fn registered_handler_answers_a_call_routed_across_the_loopback() {
    let (client_half, service_half) = loopback_pair();
    let client_transport: Arc<Mutex<dyn Transport>> = Arc::new(Mutex::new(client_half));
    let service_transport: Arc<Mutex<dyn Transport>> = Arc::new(Mutex::new(service_half));

    let runtime = Arc::new(Runtime::new());
    let endpoint = Arc::new(LocalEndpoint::new(runtime.clone()));
    let mut calculator = BusObject::new("/calc", false).unwrap();
    calculator.add_method_handler(Some(CALCULATOR_INTERFACE.to_string()), "Add", Arc::new(Add)).unwrap();
    endpoint.register_object(calculator).await.unwrap();

    let service_loop = tokio::spawn(serve_one(service_transport, endpoint));

    let reply_map = Arc::new(Mutex::new(ReplyMap::new()));
    let client_loop = {
        let client_transport = client_transport.clone();
        let reply_map = reply_map.clone();
        tokio::spawn(async move {
            let (msg, _) = client_transport.lock().await.recv_message(MAX_PACKET_SIZE).await.unwrap();
            reply_map.lock().await.complete(msg).unwrap();
        })
    };

    let caller = MethodCaller::new(
        client_transport,
        Arc::new(alljoyn_bus_core::wire::SerialAllocator::new()),
        reply_map,
        Duration::from_secs(5),
    );

    let mut reply = caller
        .call("/calc", Some(CALCULATOR_INTERFACE), "Add", vec![Arg::Int32(3), Arg::Int32(4)], "ii", Reentrancy::Allowed)
        .await
        .unwrap();
    let result = reply.unmarshal_args("i").unwrap();
    assert_eq!(result[0], Arg::Int32(7));

    service_loop.await.unwrap();
    client_loop.await.unwrap();
}

#[tokio::test]
async fn call_to_unregistered_object_surfaces_no_such_object() {
    let runtime = Arc::new(Runtime::new());
    let endpoint = LocalEndpoint::new(runtime);

    let call = Message::method_call("/nowhere", Some(CALCULATOR_INTERFACE), "Add", 1).unwrap();
    let reply = endpoint.route(call).await.unwrap();
    assert!(reply.is_error());
    assert_eq!(reply.header_fields.error_name(), Some(BusError::NoSuchObject(String::new()).error_name()));
}
