//! A small end-to-end demo: an in-process "Calculator" bus object served
//! over a loopback transport, called through a [`ProxyObject`]-style
//! method caller. Exercises the wire codec, local endpoint dispatch, and
//! proxy call path together without needing a real socket.

use alljoyn_bus_core::endpoint::{LocalEndpoint, ReplyMap};
use alljoyn_bus_core::error::{BusError, Result};
use alljoyn_bus_core::object::{BusObject, MethodHandler};
use alljoyn_bus_core::proxy::{MethodCaller, Reentrancy};
use alljoyn_bus_core::runtime::Runtime;
use alljoyn_bus_core::transport::{Handle, Transport};
use alljoyn_bus_core::wire::{Arg, Message};
use async_trait::async_trait;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use alljoyn_bus_core::logging::init_tracing;
use tracing::info;

const CALCULATOR_INTERFACE: &str = "org.example.Calculator";

#[derive(Parser, Debug)]
#[command(name = "echo-service", about = "Demo calculator bus object served over a loopback transport")]
struct Args {
    /// -v for debug, -vv for trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress the colorized stdout log layer
    #[arg(short, long)]
    quiet: bool,

    /// Optional path to a detailed log file
    #[arg(long)]
    log_file: Option<String>,

    #[arg(long, default_value_t = 3)]
    a: i32,

    #[arg(long, default_value_t = 4)]
    b: i32,
}

/// One half of an in-process, unbounded-enough loopback connection.
struct LoopbackHalf {
    incoming: mpsc::Receiver<Message>,
    outgoing: mpsc::Sender<Message>,
    name: &'static str,
}

#[async_trait]
impl Transport for LoopbackHalf {
    async fn recv_message(&mut self, _max_packet: u32) -> Result<(Message, Vec<Handle>)> {
        self.incoming.recv().await.map(|m| (m, Vec::new())).ok_or(BusError::EndpointClosing)
    }

    async fn send_message(&mut self, message: &Message, _handles: &[Handle]) -> Result<()> {
        self.outgoing.send(message.clone()).await.map_err(|_| BusError::EndpointClosing)
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        self.name
    }
}

fn loopback_pair() -> (LoopbackHalf, LoopbackHalf) {
    let (client_tx, service_rx) = mpsc::channel(32);
    let (service_tx, client_rx) = mpsc::channel(32);
    (
        LoopbackHalf { incoming: client_rx, outgoing: client_tx, name: "client" },
        LoopbackHalf { incoming: service_rx, outgoing: service_tx, name: "service" },
    )
}

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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_tracing(args.verbose, args.quiet, args.log_file.as_deref());

    let runtime = Arc::new(Runtime::new());
    let (client_half, service_half) = loopback_pair();
    let service_transport: Arc<Mutex<dyn Transport>> = Arc::new(Mutex::new(service_half));
    let client_transport: Arc<Mutex<dyn Transport>> = Arc::new(Mutex::new(client_half));

    let endpoint = Arc::new(LocalEndpoint::new(runtime.clone()));
    let mut calculator = BusObject::new("/calc", false)?;
    calculator.add_method_handler(Some(CALCULATOR_INTERFACE.to_string()), "Add", Arc::new(Add))?;
    endpoint.register_object(calculator).await?;

    let service_loop = {
        let endpoint = endpoint.clone();
        let service_transport = service_transport.clone();
        tokio::spawn(async move {
            loop {
                let received = service_transport.lock().await.recv_message(alljoyn_bus_core::wire::MAX_PACKET_SIZE).await;
                let (msg, _handles) = match received {
                    Ok(pair) => pair,
                    Err(_) => break,
                };
                if let Some(reply) = endpoint.route(msg).await {
                    let _ = service_transport.lock().await.send_message(&reply, &[]).await;
                }
            }
        })
    };

    let client_reply_map = Arc::new(Mutex::new(ReplyMap::new()));
    let client_loop = {
        let client_transport = client_transport.clone();
        let client_reply_map = client_reply_map.clone();
        tokio::spawn(async move {
            loop {
                let received = client_transport.lock().await.recv_message(alljoyn_bus_core::wire::MAX_PACKET_SIZE).await;
                match received {
                    Ok((msg, _)) => {
                        let _ = client_reply_map.lock().await.complete(msg);
                    }
                    Err(_) => break,
                }
            }
        })
    };

    let caller = MethodCaller::new(
        client_transport,
        Arc::new(alljoyn_bus_core::wire::message::SerialAllocator::new()),
        client_reply_map,
        runtime.default_call_timeout,
    );

    info!("calling {}.Add({}, {})", CALCULATOR_INTERFACE, args.a, args.b);
    let mut reply = caller
        .call("/calc", Some(CALCULATOR_INTERFACE), "Add", vec![Arg::Int32(args.a), Arg::Int32(args.b)], "ii", Reentrancy::Allowed)
        .await?;
    let result = reply.unmarshal_args("i")?;
    println!("{} + {} = {:?}", args.a, args.b, result[0]);

    service_loop.abort();
    client_loop.abort();
    Ok(())
}
