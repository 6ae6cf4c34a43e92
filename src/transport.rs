//! # Transport and Security Collaborators
//!
//! Spec §6 treats byte-plumbing and authentication as external
//! collaborators with a fixed contract, not as something this crate
//! implements. The trait shapes below follow the teacher's
//! `#[async_trait] trait IpcTransport` (`ipc/mod.rs`): an async trait
//! object (`Box<dyn Transport>`) the rest of the crate depends on only
//! through its abstract interface, never a concrete socket type.

use crate::error::Result;
use crate::wire::message::Message;
use async_trait::async_trait;

/// One accompanying file descriptor read together with a message's
/// fixed header, per spec §6 transport contract item 2.
pub type Handle = i32;

/// A single connection's ordered, reliable byte stream, plus whatever
/// file descriptors accompanied each read. The core never opens sockets
/// itself; it is handed an already-connected `Transport`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Reads one complete wire message (fixed header, header fields,
    /// body) plus any handles delivered atomically with it.
    async fn recv_message(&mut self, max_packet: u32) -> Result<(Message, Vec<Handle>)>;

    /// Writes one already-marshalled message, plus any accompanying
    /// handles, atomically with respect to other writers.
    async fn send_message(&mut self, message: &Message, handles: &[Handle]) -> Result<()>;

    /// Closes the connection. A graceful close must be distinguishable
    /// from a timeout by the error it surfaces on the next `recv_message`.
    async fn close(&mut self) -> Result<()>;

    fn name(&self) -> &str;
}

/// The four security hooks spec §6 names: encrypt/decrypt, an outbound
/// authorization check, and a violation-reporting sink.
#[async_trait]
pub trait SecurityHooks: Send + Sync {
    /// Encrypts `body` in place using the peer session (unicast) or
    /// group (broadcast) key.
    async fn encrypt(&self, peer_or_group: &str, body: &mut Vec<u8>) -> Result<()>;

    /// Decrypts `body` in place; `DecryptionFailed` on failure.
    async fn decrypt(&self, peer_or_group: &str, body: &mut Vec<u8>) -> Result<()>;

    /// Authorizes an outbound non-broadcast encrypted message against
    /// per-object/per-interface policy.
    async fn authorize(&self, object_path: &str, interface: &str) -> Result<()>;

    /// Reports a security violation for diagnostics and key-lifecycle
    /// decisions (e.g. session teardown).
    async fn report_violation(&self, peer: &str, reason: &str);
}

/// A `SecurityHooks` that never encrypts and always authorizes; used by
/// tests and by bus attachments that don't enable security.
#[derive(Debug, Default)]
pub struct NoSecurity;

#[async_trait]
impl SecurityHooks for NoSecurity {
    async fn encrypt(&self, _peer_or_group: &str, _body: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }

    async fn decrypt(&self, _peer_or_group: &str, _body: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }

    async fn authorize(&self, _object_path: &str, _interface: &str) -> Result<()> {
        Ok(())
    }

    async fn report_violation(&self, _peer: &str, _reason: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_security_never_fails() {
        let hooks = NoSecurity;
        let mut body = vec![1, 2, 3];
        assert!(hooks.encrypt("peer", &mut body).await.is_ok());
        assert!(hooks.decrypt("peer", &mut body).await.is_ok());
        assert!(hooks.authorize("/a", "org.example.I").await.is_ok());
    }
}
