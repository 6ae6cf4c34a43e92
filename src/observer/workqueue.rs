//! # Observer Work Queue
//!
//! Every state transition an [`super::ObserverManager`] reacts to —
//! a peer announcing an object, a peer dropping one, a ping-interval
//! tick — is pushed through a single-worker queue rather than handled
//! inline, so two concurrent announcements can never interleave their
//! updates to the peer map. Grounded on `original_source/alljoyn_core/
//! src/ObserverManager.h`'s `WorkItem` subclass hierarchy, each kind
//! processed one at a time by one dedicated thread.

use crate::observer::peer::DiscoveredObject;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One unit of observer state change, queued for the single worker to
/// apply in order.
pub enum WorkItem {
    PeerAnnouncedObject { peer: String, object: DiscoveredObject },
    PeerLostObject { peer: String, path: String },
    PeerDropped { peer: String },
    PingTick,
    EnablePendingListener { listener_id: u64 },
}

/// Something that knows how to apply one [`WorkItem`] to observer state.
/// Implemented by [`super::ObserverManager`]; split out as a trait so the
/// worker loop doesn't need to know the manager's internals.
#[async_trait::async_trait]
pub trait WorkItemSink: Send + Sync {
    async fn apply(&self, item: WorkItem);
}

/// Owns the queue's send half; the receive half is drained by one
/// spawned worker task for the lifetime of the observer manager.
pub struct WorkQueue {
    sender: mpsc::Sender<WorkItem>,
    worker: JoinHandle<()>,
}

impl WorkQueue {
    pub fn spawn(sink: std::sync::Arc<dyn WorkItemSink>) -> Self {
        let (sender, mut receiver) = mpsc::channel(256);
        let worker = tokio::spawn(async move {
            while let Some(item) = receiver.recv().await {
                sink.apply(item).await;
            }
        });
        WorkQueue { sender, worker }
    }

    pub async fn push(&self, item: WorkItem) {
        let _ = self.sender.send(item).await;
    }

    pub async fn shutdown(self) {
        drop(self.sender);
        let _ = self.worker.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl WorkItemSink for CountingSink {
        async fn apply(&self, _item: WorkItem) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn items_are_applied_in_submission_order_by_one_worker() {
        let count = Arc::new(AtomicUsize::new(0));
        let queue = WorkQueue::spawn(Arc::new(CountingSink(count.clone())));
        for _ in 0..10 {
            queue.push(WorkItem::PingTick).await;
        }
        queue.shutdown().await;
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }
}
