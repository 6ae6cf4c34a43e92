//! Shared fixtures for the integration tests: a loopback [`Transport`]
//! pair and a one-time tracing init, mirroring the teacher's
//! `tests/integration_*_round_trip.rs` fixture style.

use alljoyn_bus_core::error::{BusError, Result};
use alljoyn_bus_core::transport::{Handle, Transport};
use alljoyn_bus_core::wire::Message;
use async_trait::async_trait;
use std::sync::Once;
use tokio::sync::mpsc;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// One half of an in-process loopback connection used in place of a
/// real socket for every integration test.
pub struct LoopbackHalf {
    incoming: mpsc::Receiver<Message>,
    outgoing: mpsc::Sender<Message>,
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
        "loopback"
    }
}

pub fn loopback_pair() -> (LoopbackHalf, LoopbackHalf) {
    let (a_tx, b_rx) = mpsc::channel(64);
    let (b_tx, a_rx) = mpsc::channel(64);
    (LoopbackHalf { incoming: a_rx, outgoing: a_tx }, LoopbackHalf { incoming: b_rx, outgoing: b_tx })
}
