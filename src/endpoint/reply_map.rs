//! # Reply Map
//!
//! Tracks outstanding method calls waiting for a `METHOD_RETURN` or
//! `ERROR` reply, keyed by the serial the call was sent with. A reply's
//! arrival (or a timeout sweep) completes the matching `oneshot` and
//! removes the entry — no response can complete the same context twice.

use crate::error::{BusError, Result};
use crate::wire::message::Message;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// One outstanding call, created when a method call is sent and dropped
/// once its reply is delivered, it times out, or its endpoint closes.
struct ReplyContext {
    sender: oneshot::Sender<Message>,
    deadline: Instant,
}

/// Outstanding-call bookkeeping for one local endpoint.
#[derive(Default)]
pub struct ReplyMap {
    pending: HashMap<u32, ReplyContext>,
}

impl ReplyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new outstanding call, returning the receiver half the
    /// caller awaits on.
    pub fn register(&mut self, serial: u32, timeout: Duration) -> oneshot::Receiver<Message> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(serial, ReplyContext { sender: tx, deadline: Instant::now() + timeout });
        rx
    }

    pub fn cancel(&mut self, serial: u32) {
        self.pending.remove(&serial);
    }

    /// Completes the outstanding call matching `msg`'s `REPLY_SERIAL`
    /// header field. Returns `UnmatchedReplySerial` if there is no such
    /// context (a stale or duplicate reply, or one that already timed out).
    pub fn complete(&mut self, msg: Message) -> Result<()> {
        let serial = msg.header_fields.reply_serial().ok_or(BusError::MissingHeaderField("reply_serial"))?;
        match self.pending.remove(&serial) {
            Some(ctx) => {
                let _ = ctx.sender.send(msg);
                Ok(())
            }
            None => Err(BusError::UnmatchedReplySerial(serial)),
        }
    }

    /// Drops every context whose deadline has passed; the corresponding
    /// `oneshot::Receiver`s observe a dropped sender and the caller
    /// translates that into [`BusError::Timeout`].
    pub fn sweep_expired(&mut self, now: Instant) {
        self.pending.retain(|_, ctx| ctx.deadline > now);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::message::Message;

    #[tokio::test]
    async fn complete_delivers_to_waiter() {
        let mut map = ReplyMap::new();
        let rx = map.register(7, Duration::from_secs(5));
        let reply = Message::method_return(7, 99).unwrap();
        map.complete(reply).unwrap();
        let received = rx.await.unwrap();
        assert_eq!(received.header_fields.reply_serial(), Some(7));
    }

    #[test]
    fn complete_rejects_unmatched_serial() {
        let mut map = ReplyMap::new();
        let reply = Message::method_return(42, 1).unwrap();
        assert!(map.complete(reply).is_err());
    }

    #[test]
    fn sweep_expired_drops_stale_contexts() {
        let mut map = ReplyMap::new();
        let _rx = map.register(1, Duration::from_secs(0));
        std::thread::sleep(Duration::from_millis(5));
        map.sweep_expired(Instant::now());
        assert!(map.is_empty());
    }
}
