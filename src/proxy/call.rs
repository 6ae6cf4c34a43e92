//! # Proxy Method Call
//!
//! Sends a method call over a [`Transport`] and waits for its reply,
//! honoring the call timeout and the reentrancy rule: a synchronous call
//! made from inside a dispatcher callback without an explicit opt-in is
//! rejected up front rather than risking a deadlock (spec §5
//! "Concurrency").

use crate::endpoint::{in_dispatch_callback, ReplyMap};
use crate::error::{BusError, Result};
use crate::transport::Transport;
use crate::wire::arg::Arg;
use crate::wire::message::{Message, SerialAllocator};
use crate::wire::signature::Signature;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Receives the outcome of an asynchronous method call (spec §4.3
/// "Asynchronous method call"), invoked from the dispatcher once the
/// reply arrives, the call times out, or it's aborted — never from the
/// calling thread.
#[async_trait]
pub trait ReplyHandler: Send + Sync {
    async fn handle_reply(&self, reply: Result<Message>);
}

/// The outcome of [`PendingCall::cancel`]. Both variants are a success:
/// racing a cancellation against a handler that has already started
/// firing is not an error, it just means the call's effects already
/// happened before the cancellation could take hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unregistered {
    CancelledBeforeFiring,
    HandlerAlreadyFired,
}

/// A handle to one outstanding asynchronous call, letting the caller
/// cancel its reply handler before it fires.
pub struct PendingCall {
    serial: u32,
    reply_map: Arc<Mutex<ReplyMap>>,
    fired: Arc<AtomicBool>,
}

impl PendingCall {
    /// Cancels the call's reply handler if it hasn't already started
    /// running. If the handler has already fired (or is in the process of
    /// firing, racing this very call), that's treated as success: the
    /// call's effects already happened and there's nothing left to
    /// cancel.
    pub async fn cancel(&self) -> Unregistered {
        if self.fired.load(Ordering::SeqCst) {
            return Unregistered::HandlerAlreadyFired;
        }
        self.reply_map.lock().await.cancel(self.serial);
        Unregistered::CancelledBeforeFiring
    }
}

/// Whether a call is permitted to run on a dispatcher thread that is
/// already inside a callback, accepting the deadlock risk the caller has
/// reasoned about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reentrancy {
    Forbidden,
    Allowed,
}

/// A live handle for issuing method calls against one remote object/
/// interface pair over a shared transport.
pub struct MethodCaller {
    transport: Arc<Mutex<dyn Transport>>,
    serials: Arc<SerialAllocator>,
    reply_map: Arc<Mutex<ReplyMap>>,
    default_timeout: Duration,
}

impl MethodCaller {
    pub fn new(
        transport: Arc<Mutex<dyn Transport>>,
        serials: Arc<SerialAllocator>,
        reply_map: Arc<Mutex<ReplyMap>>,
        default_timeout: Duration,
    ) -> Self {
        MethodCaller { transport, serials, reply_map, default_timeout }
    }

    /// Issues a method call and blocks until the reply arrives, the
    /// timeout elapses, or the call is aborted.
    pub async fn call(
        &self,
        path: &str,
        interface: Option<&str>,
        member: &str,
        args: Vec<Arg>,
        sig: &str,
        reentrancy: Reentrancy,
    ) -> Result<Message> {
        if reentrancy == Reentrancy::Forbidden && in_dispatch_callback() {
            return Err(BusError::BlockingCallNotAllowed);
        }

        let serial = self.serials.next();
        let mut msg = Message::method_call(path, interface, member, serial)?;
        if !args.is_empty() || !sig.is_empty() {
            msg.set_args(Signature::new(sig)?, args)?;
        }

        let rx = { self.reply_map.lock().await.register(serial, self.default_timeout) };
        self.transport.lock().await.send_message(&msg, &[]).await?;

        match timeout(self.default_timeout, rx).await {
            Ok(Ok(reply)) if reply.is_error() => {
                let name = reply.header_fields.error_name().unwrap_or("org.alljoyn.Bus.Unknown").to_string();
                Err(BusError::NoSuchMember(name))
            }
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(BusError::MethodCallAborted),
            Err(_) => {
                self.reply_map.lock().await.cancel(serial);
                Err(BusError::Timeout)
            }
        }
    }

    /// Issues a method call without blocking the caller: registers the
    /// reply, sends the message, then hands the wait off to a spawned
    /// task that invokes `handler.handle_reply` once the reply arrives,
    /// the timeout elapses, or the call is aborted (spec §4.3
    /// "Asynchronous method call"). The returned [`PendingCall`] lets the
    /// caller cancel the handler before it fires.
    pub async fn call_async(
        &self,
        path: &str,
        interface: Option<&str>,
        member: &str,
        args: Vec<Arg>,
        sig: &str,
        handler: Arc<dyn ReplyHandler>,
    ) -> Result<PendingCall> {
        let serial = self.serials.next();
        let mut msg = Message::method_call(path, interface, member, serial)?;
        if !args.is_empty() || !sig.is_empty() {
            msg.set_args(Signature::new(sig)?, args)?;
        }

        let rx = { self.reply_map.lock().await.register(serial, self.default_timeout) };
        self.transport.lock().await.send_message(&msg, &[]).await?;

        let fired = Arc::new(AtomicBool::new(false));
        let pending = PendingCall { serial, reply_map: self.reply_map.clone(), fired: fired.clone() };

        let default_timeout = self.default_timeout;
        let reply_map = self.reply_map.clone();
        tokio::spawn(async move {
            let result = match timeout(default_timeout, rx).await {
                Ok(Ok(reply)) if reply.is_error() => {
                    let name =
                        reply.header_fields.error_name().unwrap_or("org.alljoyn.Bus.Unknown").to_string();
                    Err(BusError::NoSuchMember(name))
                }
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(_)) => Err(BusError::MethodCallAborted),
                Err(_) => {
                    reply_map.lock().await.cancel(serial);
                    Err(BusError::Timeout)
                }
            };
            fired.store(true, Ordering::SeqCst);
            handler.handle_reply(result).await;
        });

        Ok(pending)
    }

    /// Convenience wrapper building a single-scalar-argument call.
    pub async fn call_scalar(
        &self,
        path: &str,
        interface: &str,
        member: &str,
        arg: Arg,
        reentrancy: Reentrancy,
    ) -> Result<Message> {
        let sig = arg.signature();
        self.call(path, Some(interface), member, vec![arg], &sig, reentrancy).await
    }
}
