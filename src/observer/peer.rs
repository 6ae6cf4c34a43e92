//! # Observer Peer State
//!
//! The set of remote objects and interfaces an [`super::ObserverManager`]
//! currently believes exist, grouped by the peer (unique bus name) that
//! announced them (spec §4.4 "Observer manager").

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

/// An unordered set of interface names an observer was registered to
/// watch for. A discovered object must implement every interface in the
/// combination to be reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceCombination(BTreeSet<String>);

impl InterfaceCombination {
    pub fn new<I: IntoIterator<Item = S>, S: Into<String>>(interfaces: I) -> Self {
        InterfaceCombination(interfaces.into_iter().map(Into::into).collect())
    }

    pub fn is_satisfied_by(&self, implemented: &BTreeSet<String>) -> bool {
        self.0.is_subset(implemented)
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.as_str())
    }
}

/// One object path a peer has announced, with the interfaces it
/// implements (from the `org.alljoyn.About.Announce` payload or an
/// introspection round trip).
#[derive(Debug, Clone)]
pub struct DiscoveredObject {
    pub path: String,
    pub interfaces: BTreeSet<String>,
}

impl DiscoveredObject {
    pub fn new(path: impl Into<String>, interfaces: BTreeSet<String>) -> Self {
        DiscoveredObject { path: path.into(), interfaces }
    }
}

/// One remote bus attachment's announced objects, and when it was last
/// heard from (used by the ping sweep to detect silently-dropped peers).
#[derive(Debug, Clone)]
pub struct Peer {
    pub unique_name: String,
    pub objects: HashMap<String, DiscoveredObject>,
    pub last_seen: Instant,
}

impl Peer {
    pub fn new(unique_name: impl Into<String>, now: Instant) -> Self {
        Peer { unique_name: unique_name.into(), objects: HashMap::new(), last_seen: now }
    }

    pub fn announce(&mut self, object: DiscoveredObject, now: Instant) {
        self.last_seen = now;
        self.objects.insert(object.path.clone(), object);
    }

    pub fn forget(&mut self, path: &str) -> Option<DiscoveredObject> {
        self.objects.remove(path)
    }

    pub fn is_stale(&self, now: Instant, grace: std::time::Duration) -> bool {
        now.duration_since(self.last_seen) > grace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_combination_requires_every_interface() {
        let combo = InterfaceCombination::new(["org.example.A", "org.example.B"]);
        let mut implemented = BTreeSet::new();
        implemented.insert("org.example.A".to_string());
        assert!(!combo.is_satisfied_by(&implemented));

        implemented.insert("org.example.B".to_string());
        assert!(combo.is_satisfied_by(&implemented));
    }

    #[test]
    fn peer_tracks_announced_and_forgotten_objects() {
        let now = Instant::now();
        let mut peer = Peer::new(":1.42", now);
        let mut ifaces = BTreeSet::new();
        ifaces.insert("org.example.A".to_string());
        peer.announce(DiscoveredObject::new("/a", ifaces), now);
        assert!(peer.objects.contains_key("/a"));

        peer.forget("/a");
        assert!(!peer.objects.contains_key("/a"));
    }
}
