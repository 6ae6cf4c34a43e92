//! # Signal Table
//!
//! Match rules and the signal handlers subscribed against them. Dispatch
//! copies the matching handler set out from under the table lock before
//! invoking anything, so a handler that registers or removes a match
//! rule from within its own callback cannot deadlock or corrupt the
//! table mid-iteration — the same copy-then-release shape the teacher
//! uses for its connection table in `ipc/mod.rs`.

use crate::wire::message::Message;
use async_trait::async_trait;
use std::sync::Arc;

/// Capability interface for a subscribed signal handler (spec §9).
#[async_trait]
pub trait SignalHandler: Send + Sync {
    async fn handle_signal(&self, msg: &Message);
}

/// A signal subscription filter. `None` on any field means "don't care".
#[derive(Debug, Clone, Default)]
pub struct MatchRule {
    pub sender: Option<String>,
    pub path: Option<String>,
    pub interface: Option<String>,
    pub member: Option<String>,
}

impl MatchRule {
    pub fn matches(&self, msg: &Message) -> bool {
        if !msg.is_signal() {
            return false;
        }
        if let Some(sender) = &self.sender {
            if msg.header_fields.sender() != Some(sender.as_str()) {
                return false;
            }
        }
        if let Some(path) = &self.path {
            if msg.header_fields.path() != Some(path.as_str()) {
                return false;
            }
        }
        if let Some(interface) = &self.interface {
            if msg.header_fields.interface() != Some(interface.as_str()) {
                return false;
            }
        }
        if let Some(member) = &self.member {
            if msg.header_fields.member() != Some(member.as_str()) {
                return false;
            }
        }
        true
    }
}

struct Subscription {
    rule: MatchRule,
    handler: Arc<dyn SignalHandler>,
}

/// The set of all subscribed match rules for a local endpoint.
#[derive(Default)]
pub struct SignalTable {
    subscriptions: Vec<Subscription>,
    next_id: u64,
    ids: Vec<u64>,
}

impl SignalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a match rule, returning a token that later unsubscribes it.
    pub fn subscribe(&mut self, rule: MatchRule, handler: Arc<dyn SignalHandler>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.ids.push(id);
        self.subscriptions.push(Subscription { rule, handler });
        id
    }

    pub fn unsubscribe(&mut self, id: u64) {
        if let Some(pos) = self.ids.iter().position(|&x| x == id) {
            self.ids.remove(pos);
            self.subscriptions.remove(pos);
        }
    }

    /// Returns the handlers whose rule matches `msg`, snapshotted out of
    /// the table so the caller can invoke them without holding any lock
    /// this table might be wrapped in.
    pub fn matching_handlers(&self, msg: &Message) -> Vec<Arc<dyn SignalHandler>> {
        self.subscriptions.iter().filter(|s| s.rule.matches(msg)).map(|s| s.handler.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::message::Message;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(Arc<AtomicUsize>);

    #[async_trait]
    impl SignalHandler for Counter {
        async fn handle_signal(&self, _msg: &Message) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn match_rule_filters_by_interface_and_member() {
        let msg = Message::signal("/a", "org.example.I", "Changed", 1).unwrap();
        let rule = MatchRule { interface: Some("org.example.I".into()), member: Some("Changed".into()), ..Default::default() };
        assert!(rule.matches(&msg));

        let wrong = MatchRule { member: Some("Other".into()), ..Default::default() };
        assert!(!wrong.matches(&msg));
    }

    #[test]
    fn unsubscribe_removes_handler_from_matching_set() {
        let mut table = SignalTable::new();
        let count = Arc::new(AtomicUsize::new(0));
        let id = table.subscribe(MatchRule::default(), Arc::new(Counter(count.clone())));
        let msg = Message::signal("/a", "org.example.I", "Changed", 1).unwrap();
        assert_eq!(table.matching_handlers(&msg).len(), 1);

        table.unsubscribe(id);
        assert_eq!(table.matching_handlers(&msg).len(), 0);
    }
}
