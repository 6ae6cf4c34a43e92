//! # Dispatcher
//!
//! A small worker pool that pulls inbound messages off one queue and
//! routes each to whatever method/signal table match it finds (spec
//! §4.2 "Local endpoint", §5 "dispatcher worker count defaults to 4").
//! Every worker marks a task-local flag for the duration of a callback
//! so a handler's own code can detect it is running on a dispatcher
//! thread and refuse a blocking call that would deadlock waiting on a
//! reply the dispatcher itself would have to deliver.

use crate::error::{BusError, Result};
use crate::wire::message::Message;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

tokio::task_local! {
    static IN_DISPATCH: bool;
}

/// True when called from within a dispatcher worker's callback.
pub fn in_dispatch_callback() -> bool {
    IN_DISPATCH.try_with(|v| *v).unwrap_or(false)
}

/// Runs `future` with the dispatch-callback flag set, for exercising
/// reentrancy checks in tests without spinning up a real `Dispatcher`.
pub async fn run_as_if_in_dispatch<F: std::future::Future>(future: F) -> F::Output {
    IN_DISPATCH.scope(true, future).await
}

/// Receives one message at a time, routed from the dispatcher's queue.
#[async_trait]
pub trait MessageRouter: Send + Sync {
    async fn route(&self, msg: Message);
}

/// A fixed-size pool of workers draining a shared inbound queue.
pub struct Dispatcher {
    sender: mpsc::Sender<Message>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawns `worker_count` tasks (clamped to at least 1) pulling from a
    /// single bounded channel.
    pub fn spawn(worker_count: usize, router: Arc<dyn MessageRouter>) -> Dispatcher {
        let (sender, receiver) = mpsc::channel(1024);
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..worker_count.max(1))
            .map(|_| {
                let receiver = receiver.clone();
                let router = router.clone();
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        match next {
                            Some(msg) => IN_DISPATCH.scope(true, router.route(msg)).await,
                            None => break,
                        }
                    }
                })
            })
            .collect();

        Dispatcher { sender, workers }
    }

    pub async fn submit(&self, msg: Message) -> Result<()> {
        self.sender.send(msg).await.map_err(|_| BusError::EndpointClosing)
    }

    /// Closes the queue and waits for every worker to drain and exit.
    pub async fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRouter {
        seen: Arc<AtomicUsize>,
        saw_dispatch_flag: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MessageRouter for CountingRouter {
        async fn route(&self, _msg: Message) {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if in_dispatch_callback() {
                self.saw_dispatch_flag.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn worker_pool_drains_submitted_messages() {
        let seen = Arc::new(AtomicUsize::new(0));
        let saw_flag = Arc::new(AtomicUsize::new(0));
        let router = Arc::new(CountingRouter { seen: seen.clone(), saw_dispatch_flag: saw_flag.clone() });
        let dispatcher = Dispatcher::spawn(2, router);

        for i in 1..=5u32 {
            dispatcher.submit(Message::signal("/a", "org.example.I", "M", i).unwrap()).await.unwrap();
        }
        dispatcher.shutdown().await;

        assert_eq!(seen.load(Ordering::SeqCst), 5);
        assert_eq!(saw_flag.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn outside_dispatch_flag_is_false() {
        assert!(!in_dispatch_callback());
    }
}
