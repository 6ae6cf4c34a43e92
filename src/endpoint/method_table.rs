//! # Method Table
//!
//! Routes an incoming method call to a registered handler. Grounded
//! directly on `MethodTable::Add()` (`original_source/alljoyn_core/src/
//! MethodTable.cc`): a bare member name (no interface qualifier) is
//! registered into a secondary index the first time it's seen for a
//! given object path, and later registrations of the same bare name on
//! the same path are silently ignored rather than replacing the first
//! — first-writer-wins, not last-writer-wins.

use crate::object::MethodHandler;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Hash, PartialEq, Eq, Clone)]
struct FullKey {
    object_path: String,
    interface: String,
    member: String,
}

#[derive(Hash, PartialEq, Eq, Clone)]
struct BareKey {
    object_path: String,
    member: String,
}

/// Object-path-scoped dispatch table mapping `(interface, member)` to a
/// handler, plus a first-writer-wins bare-name fallback index used when
/// an incoming call has no `INTERFACE` header field.
#[derive(Default)]
pub struct MethodTable {
    by_full_key: HashMap<FullKey, Arc<dyn MethodHandler>>,
    by_bare_name: HashMap<BareKey, Arc<dyn MethodHandler>>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, object_path: &str, interface: Option<&str>, member: &str, handler: Arc<dyn MethodHandler>) {
        let bare_key = BareKey { object_path: object_path.to_string(), member: member.to_string() };
        self.by_bare_name.entry(bare_key).or_insert_with(|| handler.clone());

        if let Some(interface) = interface {
            let key = FullKey { object_path: object_path.to_string(), interface: interface.to_string(), member: member.to_string() };
            self.by_full_key.insert(key, handler);
        }
    }

    /// Removes every handler registered for `object_path` (used when an
    /// object is unregistered).
    pub fn remove_object(&mut self, object_path: &str) {
        self.by_full_key.retain(|k, _| k.object_path != object_path);
        self.by_bare_name.retain(|k, _| k.object_path != object_path);
    }

    /// Looks up a handler for an incoming call. When `interface` is
    /// `Some`, only an exact `(path, interface, member)` match is
    /// returned. When `None`, falls back to the first-registered handler
    /// for that bare member name on the object path.
    pub fn lookup(&self, object_path: &str, interface: Option<&str>, member: &str) -> Option<Arc<dyn MethodHandler>> {
        if let Some(interface) = interface {
            let key = FullKey { object_path: object_path.to_string(), interface: interface.to_string(), member: member.to_string() };
            if let Some(handler) = self.by_full_key.get(&key) {
                return Some(handler.clone());
            }
        }
        let bare_key = BareKey { object_path: object_path.to_string(), member: member.to_string() };
        self.by_bare_name.get(&bare_key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::wire::message::Message;
    use async_trait::async_trait;

    struct Handler(u32);

    #[async_trait]
    impl MethodHandler for Handler {
        async fn handle_method_call(&self, _msg: &Message) -> Result<Message> {
            unreachable!()
        }
    }

    #[test]
    fn exact_interface_match_wins_over_bare_name() {
        let mut table = MethodTable::new();
        table.add("/a", Some("org.example.I1"), "Do", Arc::new(Handler(1)));
        table.add("/a", Some("org.example.I2"), "Do", Arc::new(Handler(2)));

        let h1 = table.lookup("/a", Some("org.example.I1"), "Do").unwrap();
        assert_eq!(h1.0, 1);
        let h2 = table.lookup("/a", Some("org.example.I2"), "Do").unwrap();
        assert_eq!(h2.0, 2);
    }

    #[test]
    fn bare_name_lookup_is_first_writer_wins() {
        let mut table = MethodTable::new();
        table.add("/a", Some("org.example.I1"), "Do", Arc::new(Handler(1)));
        table.add("/a", Some("org.example.I2"), "Do", Arc::new(Handler(2)));

        let resolved = table.lookup("/a", None, "Do").unwrap();
        assert_eq!(resolved.0, 1);
    }

    #[test]
    fn remove_object_clears_both_indices() {
        let mut table = MethodTable::new();
        table.add("/a", Some("org.example.I1"), "Do", Arc::new(Handler(1)));
        table.remove_object("/a");
        assert!(table.lookup("/a", Some("org.example.I1"), "Do").is_none());
        assert!(table.lookup("/a", None, "Do").is_none());
    }
}
