//! # Local Endpoint
//!
//! The piece that owns the local object tree and routes inbound wire
//! traffic to it: method calls to a [`BusObject`]'s handler, replies to
//! a waiting caller, signals to every matching subscription (spec §4.2
//! "Local endpoint").

pub mod dispatcher;
pub mod method_table;
pub mod peer_iface;
pub mod reply_map;
pub mod signal_table;

pub use dispatcher::{in_dispatch_callback, Dispatcher, MessageRouter};
pub use method_table::MethodTable;
pub use peer_iface::{PeerInterface, PEER_INTERFACE};
pub use reply_map::ReplyMap;
pub use signal_table::{MatchRule, SignalHandler, SignalTable};

use crate::error::{BusError, Result};
use crate::iface::description::{InterfaceDescription, PropertyAccess};
use crate::iface::xml::generate_introspection_xml;
use crate::object::bus_object::MethodHandler;
use crate::object::{is_legal_object_path, parent_of, BusObject};
use crate::runtime::Runtime;
use crate::wire::arg::{Arg, ArgBuilder};
use crate::wire::message::{Message, MessageType, SerialAllocator};
use crate::wire::signature::Signature;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const INTROSPECTABLE_INTERFACE: &str = "org.freedesktop.DBus.Introspectable";
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// A registered object's slot in the tree: either a real, application-
/// installed object, or a placeholder auto-created to fill in an
/// ancestor path component that was never explicitly registered (spec
/// §3 "placeholder parents are auto-created").
enum ObjectSlot {
    Real(BusObject),
    Placeholder,
}

/// Owns every locally implemented object, the method/signal dispatch
/// tables, and outstanding-call bookkeeping for one bus attachment.
pub struct LocalEndpoint {
    runtime: Arc<Runtime>,
    serials: Arc<SerialAllocator>,
    objects: Mutex<HashMap<String, ObjectSlot>>,
    method_table: Mutex<MethodTable>,
    signal_table: Mutex<SignalTable>,
    reply_map: Mutex<ReplyMap>,
    /// Answers `org.freedesktop.DBus.Peer` on every object path; there's
    /// no per-path registration step since every local endpoint answers
    /// it identically (spec §4.2 "Standard interfaces").
    peer: Arc<PeerInterface>,
}

impl LocalEndpoint {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        let mut objects = HashMap::new();
        objects.insert("/".to_string(), ObjectSlot::Placeholder);
        let serials = Arc::new(SerialAllocator::new());
        let peer = Arc::new(PeerInterface::new(runtime.machine_id.clone(), serials.clone()));
        LocalEndpoint {
            runtime,
            serials,
            objects: Mutex::new(objects),
            method_table: Mutex::new(MethodTable::new()),
            signal_table: Mutex::new(SignalTable::new()),
            reply_map: Mutex::new(ReplyMap::new()),
            peer,
        }
    }

    pub fn serials(&self) -> Arc<SerialAllocator> {
        self.serials.clone()
    }

    /// Registers `object`, auto-creating placeholder ancestors for any
    /// path component that isn't already registered. Fails if the exact
    /// path already carries a real object.
    pub async fn register_object(&self, mut object: BusObject) -> Result<()> {
        if !is_legal_object_path(object.path()) {
            return Err(BusError::IllegalObjectPath(object.path().to_string()));
        }
        let path = object.path().to_string();

        let mut objects = self.objects.lock().await;
        if matches!(objects.get(&path), Some(ObjectSlot::Real(_))) {
            return Err(BusError::MemberAlreadyExists(path));
        }

        let mut ancestor = object.parent_path();
        while let Some(p) = ancestor {
            ancestor = parent_of(&p);
            objects.entry(p).or_insert(ObjectSlot::Placeholder);
        }

        let mut method_table = self.method_table.lock().await;
        for row in object.method_contexts() {
            method_table.add(&path, row.interface.as_deref(), &row.member, row.handler.clone());
        }
        drop(method_table);

        object.mark_registered();
        objects.insert(path, ObjectSlot::Real(object));
        Ok(())
    }

    pub async fn unregister_object(&self, path: &str) {
        let mut objects = self.objects.lock().await;
        objects.remove(path);
        drop(objects);
        self.method_table.lock().await.remove_object(path);
    }

    pub async fn subscribe_signal(&self, rule: MatchRule, handler: Arc<dyn SignalHandler>) -> u64 {
        self.signal_table.lock().await.subscribe(rule, handler)
    }

    pub async fn unsubscribe_signal(&self, id: u64) {
        self.signal_table.lock().await.unsubscribe(id);
    }

    pub async fn await_reply(&self, serial: u32) -> tokio::sync::oneshot::Receiver<Message> {
        self.reply_map.lock().await.register(serial, self.runtime.default_call_timeout)
    }

    /// Routes one received message: a method call goes to the object's
    /// handler and produces a reply message to send back; a signal fans
    /// out to matching subscriptions; a reply completes the matching
    /// outstanding call. A `Flags::COMPRESSED` message is expanded
    /// against the runtime's negotiated compression rules first.
    pub async fn route(&self, mut msg: Message) -> Option<Message> {
        if let Err(e) = msg.expand_compression(&self.runtime.compression) {
            tracing::warn!(error = %e, serial = msg.serial, "dropping message with an unexpandable compression token");
            return if msg.msg_type == MessageType::MethodCall { Some(self.error_reply(&msg, e)) } else { None };
        }
        match msg.msg_type {
            MessageType::MethodCall => Some(self.dispatch_method_call(&msg).await),
            MessageType::Signal => {
                let handlers = self.signal_table.lock().await.matching_handlers(&msg);
                for handler in handlers {
                    handler.handle_signal(&msg).await;
                }
                None
            }
            MessageType::MethodReturn | MessageType::Error => {
                let _ = self.reply_map.lock().await.complete(msg);
                None
            }
            MessageType::Invalid => None,
        }
    }

    async fn dispatch_method_call(&self, msg: &Message) -> Message {
        let path = match msg.header_fields.path() {
            Some(p) => p.to_string(),
            None => return self.error_reply(msg, BusError::MissingHeaderField("path")),
        };
        let member = match msg.header_fields.member() {
            Some(m) => m.to_string(),
            None => return self.error_reply(msg, BusError::MissingHeaderField("member")),
        };
        let interface = msg.header_fields.interface().map(|s| s.to_string());

        {
            let objects = self.objects.lock().await;
            match objects.get(&path) {
                Some(ObjectSlot::Real(_)) => {}
                _ => return self.error_reply(msg, BusError::NoSuchObject(path)),
            }
        }

        let handler = self.method_table.lock().await.lookup(&path, interface.as_deref(), &member);
        if let Some(handler) = handler {
            return match handler.handle_method_call(msg).await {
                Ok(reply) => reply,
                Err(e) => self.error_reply(msg, e),
            };
        }

        match self.dispatch_standard_interface(&path, interface.as_deref(), &member, msg).await {
            Some(Ok(reply)) => reply,
            Some(Err(e)) => self.error_reply(msg, e),
            None => self.error_reply(msg, BusError::NoSuchMember(member)),
        }
    }

    /// Falls back to the built-in `org.freedesktop.DBus.Peer`,
    /// `Introspectable`, and `Properties` interfaces on a `MethodTable`
    /// miss (spec §4.2 "Standard interfaces"). `None` means neither
    /// interface claims the member, so the caller should report
    /// `NoSuchMember` itself.
    async fn dispatch_standard_interface(
        &self,
        path: &str,
        interface: Option<&str>,
        member: &str,
        msg: &Message,
    ) -> Option<Result<Message>> {
        if (interface.is_none() || interface == Some(PEER_INTERFACE)) && matches!(member, "Ping" | "GetMachineId") {
            return Some(self.peer.handle_method_call(msg).await);
        }
        match interface {
            Some(INTROSPECTABLE_INTERFACE) if member == "Introspect" => Some(self.handle_introspect(path, msg).await),
            Some(PROPERTIES_INTERFACE) => match member {
                "Get" => Some(self.handle_properties_get(path, msg).await),
                "Set" => Some(self.handle_properties_set(path, msg).await),
                "GetAll" => Some(self.handle_properties_get_all(path, msg).await),
                _ => None,
            },
            _ => None,
        }
    }

    async fn handle_introspect(&self, path: &str, msg: &Message) -> Result<Message> {
        let objects = self.objects.lock().await;
        let object = match objects.get(path) {
            Some(ObjectSlot::Real(o)) => o,
            _ => return Err(BusError::NoSuchObject(path.to_string())),
        };
        let interfaces: Vec<&InterfaceDescription> = object.interfaces().collect();
        let children = child_names(&objects, path);
        let xml = generate_introspection_xml(&interfaces, &children)?;
        let mut reply = Message::method_return(msg.serial, self.serials.next())?;
        reply.set_args(Signature::new("s")?, vec![Arg::String(xml)])?;
        Ok(reply)
    }

    async fn handle_properties_get(&self, path: &str, msg: &Message) -> Result<Message> {
        let mut call = msg.clone();
        let args = call.unmarshal_args("ss")?;
        let (interface, property) = match (&args[0], &args[1]) {
            (Arg::String(i), Arg::String(p)) => (i.clone(), p.clone()),
            _ => return Err(BusError::BadValue('s')),
        };

        let objects = self.objects.lock().await;
        let object = match objects.get(path) {
            Some(ObjectSlot::Real(o)) => o,
            _ => return Err(BusError::NoSuchObject(path.to_string())),
        };
        let iface = object.interfaces().find(|d| d.name == interface).ok_or_else(|| BusError::NoSuchInterface(interface.clone()))?;
        let prop = iface.property(&property).ok_or_else(|| BusError::NoSuchProperty(property.clone()))?;
        if prop.access == PropertyAccess::Write {
            return Err(BusError::PropertyAccessDenied(property));
        }
        let value = object.property_value(&interface, &property).cloned().ok_or_else(|| BusError::NoSuchProperty(property.clone()))?;

        let mut reply = Message::method_return(msg.serial, self.serials.next())?;
        reply.set_args(Signature::new("v")?, vec![Arg::Variant(Box::new(value))])?;
        Ok(reply)
    }

    async fn handle_properties_set(&self, path: &str, msg: &Message) -> Result<Message> {
        let mut call = msg.clone();
        let args = call.unmarshal_args("ssv")?;
        let (interface, property, value) = match (&args[0], &args[1], &args[2]) {
            (Arg::String(i), Arg::String(p), Arg::Variant(v)) => (i.clone(), p.clone(), (**v).clone()),
            _ => return Err(BusError::BadValue('v')),
        };

        let mut objects = self.objects.lock().await;
        let object = match objects.get_mut(path) {
            Some(ObjectSlot::Real(o)) => o,
            _ => return Err(BusError::NoSuchObject(path.to_string())),
        };
        let writable = {
            let iface = object.interfaces().find(|d| d.name == interface).ok_or_else(|| BusError::NoSuchInterface(interface.clone()))?;
            let prop = iface.property(&property).ok_or_else(|| BusError::NoSuchProperty(property.clone()))?;
            prop.access != PropertyAccess::Read
        };
        if !writable {
            return Err(BusError::PropertyAccessDenied(property));
        }
        object.set_property_value(interface, property, value);
        Message::method_return(msg.serial, self.serials.next())
    }

    async fn handle_properties_get_all(&self, path: &str, msg: &Message) -> Result<Message> {
        let mut call = msg.clone();
        let args = call.unmarshal_args("s")?;
        let interface = match &args[0] {
            Arg::String(i) => i.clone(),
            _ => return Err(BusError::BadValue('s')),
        };

        let objects = self.objects.lock().await;
        let object = match objects.get(path) {
            Some(ObjectSlot::Real(o)) => o,
            _ => return Err(BusError::NoSuchObject(path.to_string())),
        };
        object.interfaces().find(|d| d.name == interface).ok_or_else(|| BusError::NoSuchInterface(interface.clone()))?;

        let entries: Vec<Arg> = object
            .properties_for_interface(&interface)
            .into_iter()
            .map(|(name, value)| ArgBuilder::dict_entry(Arg::String(name.to_string()), Arg::Variant(Box::new(value.clone()))))
            .collect::<Result<Vec<_>>>()?;
        let dict = ArgBuilder::array("{sv}", entries)?;

        let mut reply = Message::method_return(msg.serial, self.serials.next())?;
        reply.set_args(Signature::new("a{sv}")?, vec![dict])?;
        Ok(reply)
    }

    fn error_reply(&self, msg: &Message, err: BusError) -> Message {
        Message::error_reply(err.error_name(), msg.serial, self.serials.next())
            .expect("error_reply serial is always non-zero")
    }
}

/// The immediate children of `path` in the object tree, derived from the
/// registered path strings themselves (see [`BusObject`]'s module docs).
fn child_names(objects: &HashMap<String, ObjectSlot>, path: &str) -> Vec<String> {
    let mut names: Vec<String> = objects
        .keys()
        .filter(|p| parent_of(p).as_deref() == Some(path))
        .filter_map(|p| p.rsplit('/').next().map(|s| s.to_string()))
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::MethodHandler;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl MethodHandler for Echo {
        async fn handle_method_call(&self, msg: &Message) -> Result<Message> {
            Message::method_return(msg.serial, msg.serial + 1000)
        }
    }

    #[tokio::test]
    async fn registering_nested_path_creates_placeholder_ancestors() {
        let endpoint = LocalEndpoint::new(Arc::new(Runtime::new()));
        let mut obj = BusObject::new("/a/b", false).unwrap();
        obj.add_method_handler(Some("org.example.I".into()), "Do", Arc::new(Echo)).unwrap();
        endpoint.register_object(obj).await.unwrap();

        let objects = endpoint.objects.lock().await;
        assert!(matches!(objects.get("/a"), Some(ObjectSlot::Placeholder)));
        assert!(matches!(objects.get("/a/b"), Some(ObjectSlot::Real(_))));
    }

    #[tokio::test]
    async fn dispatch_routes_to_registered_handler() {
        let endpoint = LocalEndpoint::new(Arc::new(Runtime::new()));
        let mut obj = BusObject::new("/a", false).unwrap();
        obj.add_method_handler(Some("org.example.I".into()), "Do", Arc::new(Echo)).unwrap();
        endpoint.register_object(obj).await.unwrap();

        let call = Message::method_call("/a", Some("org.example.I"), "Do", 5).unwrap();
        let reply = endpoint.route(call).await.unwrap();
        assert!(reply.is_method_return());
        assert_eq!(reply.header_fields.reply_serial(), Some(5));
    }

    #[tokio::test]
    async fn dispatch_unknown_object_returns_error_reply() {
        let endpoint = LocalEndpoint::new(Arc::new(Runtime::new()));
        let call = Message::method_call("/missing", Some("org.example.I"), "Do", 5).unwrap();
        let reply = endpoint.route(call).await.unwrap();
        assert!(reply.is_error());
        assert_eq!(reply.header_fields.error_name(), Some(BusError::NoSuchObject(String::new()).error_name()));
    }
}
