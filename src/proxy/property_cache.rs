//! # Property Cache
//!
//! A per-interface cache of remote property values, kept warm by
//! `PropertiesChanged` signals and invalidated wholesale when a changed
//! payload can't be parsed — conservative over clever, since serving a
//! stale value after a parse failure is worse than one extra round trip
//! (spec §4.3 "Property cache").

use crate::wire::arg::Arg;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct InterfaceCache {
    values: HashMap<String, Arg>,
    invalidated: bool,
}

/// Caches property values per `(interface, property name)`, populated
/// either by an explicit `Get`/`GetAll` reply or by a `PropertiesChanged`
/// signal from the peer.
#[derive(Default)]
pub struct PropertyCache {
    interfaces: RwLock<HashMap<String, InterfaceCache>>,
}

impl PropertyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, interface: &str, property: &str) -> Option<Arg> {
        self.interfaces.read().unwrap().get(interface).and_then(|c| {
            if c.invalidated {
                None
            } else {
                c.values.get(property).cloned()
            }
        })
    }

    pub fn set(&self, interface: &str, property: &str, value: Arg) {
        let mut interfaces = self.interfaces.write().unwrap();
        let cache = interfaces.entry(interface.to_string()).or_default();
        cache.invalidated = false;
        cache.values.insert(property.to_string(), value);
    }

    /// Replaces a whole interface's cached snapshot, as returned by a
    /// `GetAll` call.
    pub fn replace_all(&self, interface: &str, values: HashMap<String, Arg>) {
        let mut interfaces = self.interfaces.write().unwrap();
        interfaces.insert(interface.to_string(), InterfaceCache { values, invalidated: false });
    }

    /// Applies a `PropertiesChanged(interface, changed, invalidated)`
    /// signal: updates changed values, drops invalidated ones from the
    /// cache (forcing the next `get` to miss and re-fetch).
    pub fn apply_changed(&self, interface: &str, changed: HashMap<String, Arg>, invalidated_props: &[String]) {
        let mut interfaces = self.interfaces.write().unwrap();
        let cache = interfaces.entry(interface.to_string()).or_default();
        for (name, value) in changed {
            cache.values.insert(name, value);
        }
        for name in invalidated_props {
            cache.values.remove(name);
        }
    }

    /// Discards an entire interface's cache, used when a
    /// `PropertiesChanged` payload fails to parse and the cache can no
    /// longer be trusted.
    pub fn invalidate(&self, interface: &str) {
        let mut interfaces = self.interfaces.write().unwrap();
        let cache = interfaces.entry(interface.to_string()).or_default();
        cache.invalidated = true;
        cache.values.clear();
    }

    /// Discards every cached interface. Used when a `PropertiesChanged`
    /// signal's payload fails to unmarshal far enough to even name the
    /// interface it's about — the only safe assumption left is that any
    /// interface might be stale.
    pub fn invalidate_all(&self) {
        let mut interfaces = self.interfaces.write().unwrap();
        for cache in interfaces.values_mut() {
            cache.invalidated = true;
            cache.values.clear();
        }
    }
}
