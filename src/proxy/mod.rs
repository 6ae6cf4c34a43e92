//! Remote object proxies: method calls and the property cache (spec §3
//! "Proxy object", §4.3 "Property cache").

pub mod call;
pub mod property_cache;

pub use call::{MethodCaller, PendingCall, Reentrancy, ReplyHandler, Unregistered};
pub use property_cache::PropertyCache;

use crate::endpoint::{MatchRule, ReplyMap, SignalHandler};
use crate::error::Result;
use crate::transport::Transport;
use crate::wire::arg::Arg;
use crate::wire::message::{Message, SerialAllocator};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// The standard interface name every `PropertiesChanged` signal is sent
/// under (spec §6 "Standard interfaces").
const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// A client-side handle to one remote object path, bundling the method
/// caller and the property cache that backs its `GetProperty`/
/// `SetProperty` convenience methods.
pub struct ProxyObject {
    path: String,
    caller: MethodCaller,
    properties: PropertyCache,
}

impl ProxyObject {
    pub fn new(
        path: impl Into<String>,
        transport: Arc<Mutex<dyn Transport>>,
        serials: Arc<SerialAllocator>,
        reply_map: Arc<Mutex<ReplyMap>>,
        default_timeout: Duration,
    ) -> Self {
        ProxyObject {
            path: path.into(),
            caller: MethodCaller::new(transport, serials, reply_map, default_timeout),
            properties: PropertyCache::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn caller(&self) -> &MethodCaller {
        &self.caller
    }

    pub fn properties(&self) -> &PropertyCache {
        &self.properties
    }

    /// Reads a property, serving the cache when warm and falling back to
    /// a `org.freedesktop.DBus.Properties.Get` call on a miss.
    pub async fn get_property(&self, interface: &str, property: &str, reentrancy: Reentrancy) -> Result<Arg> {
        if let Some(cached) = self.properties.get(interface, property) {
            return Ok(cached);
        }
        let mut reply = self
            .caller
            .call(
                &self.path,
                Some("org.freedesktop.DBus.Properties"),
                "Get",
                vec![Arg::String(interface.to_string()), Arg::String(property.to_string())],
                "ss",
                reentrancy,
            )
            .await?;
        let args = reply.unmarshal_args("v")?;
        let value = match &args[0] {
            Arg::Variant(inner) => inner.as_ref().clone(),
            other => other.clone(),
        };
        self.properties.set(interface, property, value.clone());
        Ok(value)
    }

    /// The match rule this proxy's `PropertiesChanged` subscription
    /// should be registered under (spec §4.3 "PropertiesChanged
    /// listener"). Callers hand `(rule, self.clone() as Arc<dyn
    /// SignalHandler>)` to a `LocalEndpoint::subscribe_signal` to wire
    /// automatic cache maintenance up.
    pub fn properties_changed_match_rule(&self) -> MatchRule {
        MatchRule {
            sender: None,
            path: Some(self.path.clone()),
            interface: Some(PROPERTIES_INTERFACE.to_string()),
            member: Some("PropertiesChanged".to_string()),
        }
    }

    /// Applies one observed `PropertiesChanged(interface: s, changed:
    /// a{sv}, invalidated: as)` signal to the property cache: changed
    /// values are merged in, invalidated ones are dropped, and a payload
    /// that doesn't even unmarshal far enough to name its interface
    /// invalidates every cached interface rather than risk serving a
    /// stale value for one we can't identify (spec §4.3 "Property
    /// cache", §8 "any PropertiesChanged signal with unparseable payload
    /// results in the cache for that interface being empty on the next
    /// read").
    async fn apply_properties_changed(&self, msg: &Message) {
        let mut msg = msg.clone();
        let args = match msg.unmarshal_args("sa{sv}as") {
            Ok(args) => args,
            Err(_) => {
                self.properties.invalidate_all();
                return;
            }
        };
        let interface = match &args[0] {
            Arg::String(s) => s.clone(),
            _ => return,
        };
        let changed: HashMap<String, Arg> = match &args[1] {
            Arg::Array { elements, .. } => elements
                .iter()
                .filter_map(|e| match e {
                    Arg::DictEntry(k, v) => match (k.as_ref(), v.as_ref()) {
                        (Arg::String(name), Arg::Variant(value)) => Some((name.clone(), (**value).clone())),
                        _ => None,
                    },
                    _ => None,
                })
                .collect(),
            _ => HashMap::new(),
        };
        let invalidated: Vec<String> = match &args[2] {
            Arg::Array { elements, .. } => elements
                .iter()
                .filter_map(|e| match e {
                    Arg::String(s) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        self.properties.apply_changed(&interface, changed, &invalidated);
    }
}

#[async_trait]
impl SignalHandler for ProxyObject {
    async fn handle_signal(&self, msg: &Message) {
        self.apply_properties_changed(msg).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Handle;
    use crate::wire::arg::ArgBuilder;
    use crate::wire::message::SerialAllocator;
    use crate::wire::signature::Signature;
    use tokio::sync::mpsc;

    struct NoopTransport(mpsc::Receiver<Message>);

    #[async_trait]
    impl Transport for NoopTransport {
        async fn recv_message(&mut self, _max_packet: u32) -> Result<(Message, Vec<Handle>)> {
            self.0.recv().await.map(|m| (m, vec![])).ok_or(crate::error::BusError::EndpointClosing)
        }

        async fn send_message(&mut self, _message: &Message, _handles: &[Handle]) -> Result<()> {
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "noop"
        }
    }

    fn new_proxy() -> ProxyObject {
        let (_tx, rx) = mpsc::channel(1);
        let transport: Arc<Mutex<dyn Transport>> = Arc::new(Mutex::new(NoopTransport(rx)));
        ProxyObject::new(
            "/light1",
            transport,
            Arc::new(SerialAllocator::new()),
            Arc::new(Mutex::new(ReplyMap::new())),
            Duration::from_secs(5),
        )
    }

    fn properties_changed(interface: &str, changed: Vec<(&str, Arg)>, invalidated: Vec<&str>) -> Message {
        let mut msg = Message::signal("/light1", PROPERTIES_INTERFACE, "PropertiesChanged", 1).unwrap();
        let entries: Vec<Arg> = changed
            .into_iter()
            .map(|(name, value)| ArgBuilder::dict_entry(Arg::String(name.to_string()), Arg::Variant(Box::new(value))).unwrap())
            .collect();
        let dict = ArgBuilder::array("{sv}", entries).unwrap();
        let invalidated = Arg::Array { elem_sig: Signature::new("s").unwrap(), elements: invalidated.into_iter().map(|s| Arg::String(s.to_string())).collect() };
        msg.set_args(Signature::new("sa{sv}as").unwrap(), vec![Arg::String(interface.to_string()), dict, invalidated]).unwrap();
        msg
    }

    #[tokio::test]
    async fn properties_changed_signal_merges_changed_and_drops_invalidated() {
        let proxy = new_proxy();
        proxy.properties.set("org.example.Light", "Volume", Arg::Int32(1));
        proxy.properties.set("org.example.Light", "Muted", Arg::Boolean(true));

        let msg = properties_changed("org.example.Light", vec![("Volume", Arg::Int32(9))], vec!["Muted"]);
        proxy.handle_signal(&msg).await;

        assert_eq!(proxy.properties().get("org.example.Light", "Volume"), Some(Arg::Int32(9)));
        assert_eq!(proxy.properties().get("org.example.Light", "Muted"), None);
    }

    #[tokio::test]
    async fn unparseable_payload_invalidates_every_cached_interface() {
        let proxy = new_proxy();
        proxy.properties.set("org.example.Light", "Volume", Arg::Int32(1));
        proxy.properties.set("org.example.Other", "Name", Arg::String("x".into()));

        let mut bad = Message::signal("/light1", PROPERTIES_INTERFACE, "PropertiesChanged", 1).unwrap();
        bad.set_args(Signature::new("s").unwrap(), vec![Arg::String("org.example.Light".into())]).unwrap();
        proxy.handle_signal(&bad).await;

        assert_eq!(proxy.properties().get("org.example.Light", "Volume"), None);
        assert_eq!(proxy.properties().get("org.example.Other", "Name"), None);
    }

    #[test]
    fn match_rule_scopes_to_this_proxys_path() {
        let proxy = new_proxy();
        let rule = proxy.properties_changed_match_rule();
        assert_eq!(rule.path.as_deref(), Some("/light1"));
        assert_eq!(rule.interface.as_deref(), Some(PROPERTIES_INTERFACE));
        assert_eq!(rule.member.as_deref(), Some("PropertiesChanged"));
    }
}
