//! Per-connection correlation-id multiplexing.
//!
//! A two-level map `socketId -> (correlationId -> PendingRequest)`. Lives
//! behind a single mutex — `queue`/`resolve`/`unqueue`/`fail` all take the
//! lock only for the duration of a map mutation, never across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;

use crate::errors::{Error, Result};
use crate::network::frame::Frame;

type Decoder = Box<dyn FnOnce(Bytes) -> Result<Bytes> + Send>;

struct PendingRequest {
    decode: Decoder,
    reply: oneshot::Sender<Result<Bytes>>,
    timeout: JoinHandle<()>,
    longpolling: bool,
}

type Partition = HashMap<i32, PendingRequest>;

#[derive(Clone, Default)]
pub struct CallbackQueue {
    partitions: Arc<Mutex<HashMap<u64, Partition>>>,
    drained: Arc<Notify>,
}

impl CallbackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a callback for `(socket_id, correlation_id)`, returning a
    /// receiver the caller awaits for the eventual result. `decode` is
    /// invoked exactly once, on the thread that calls `resolve`.
    pub fn queue<D>(
        &self,
        socket_id: u64,
        correlation_id: i32,
        longpolling: bool,
        timeout: Duration,
        decode: D,
    ) -> oneshot::Receiver<Result<Bytes>>
    where
        D: FnOnce(Bytes) -> Result<Bytes> + Send + 'static,
    {
        let (reply, receiver) = oneshot::channel();

        let partitions = self.partitions.clone();
        let drained = self.drained.clone();
        let timeout_handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            let pending = {
                let mut partitions = partitions.lock();
                partitions
                    .get_mut(&socket_id)
                    .and_then(|partition| partition.remove(&correlation_id))
            };

            if let Some(pending) = pending {
                let _ = pending.reply.send(Err(Error::Timeout(timeout)));
                drained.notify_waiters();
            }
        });

        let entry = PendingRequest {
            decode: Box::new(decode),
            reply,
            timeout: timeout_handle,
            longpolling,
        };

        self.partitions
            .lock()
            .entry(socket_id)
            .or_default()
            .insert(correlation_id, entry);

        receiver
    }

    /// Resolves a previously-queued callback with an arrived frame. A
    /// correlation id with no matching entry (already timed out, or a late
    /// frame after the entry was cancelled) is silently dropped — timer
    /// fire is final.
    pub fn resolve(&self, socket_id: u64, frame: Frame) {
        let pending = {
            let mut partitions = self.partitions.lock();
            partitions
                .get_mut(&socket_id)
                .and_then(|partition| partition.remove(&frame.correlation_id))
        };

        if let Some(pending) = pending {
            pending.timeout.abort();
            let result = (pending.decode)(frame.body);
            let _ = pending.reply.send(result);
            self.drained.notify_waiters();
        }
    }

    /// Cancels a queued callback without invoking it.
    pub fn unqueue(&self, socket_id: u64, correlation_id: i32) {
        let pending = {
            let mut partitions = self.partitions.lock();
            partitions
                .get_mut(&socket_id)
                .and_then(|partition| partition.remove(&correlation_id))
        };
        if let Some(pending) = pending {
            pending.timeout.abort();
            self.drained.notify_waiters();
        }
    }

    /// Fails every pending callback on a connection (connection close),
    /// dropping the partition entirely. A long-polling entry with no error
    /// supplied is dropped silently rather than failed.
    pub fn fail(&self, socket_id: u64, err: Option<Error>) {
        let partition = self.partitions.lock().remove(&socket_id);

        let Some(partition) = partition else { return };

        for (_, pending) in partition {
            pending.timeout.abort();
            match &err {
                Some(e) => {
                    let _ = pending.reply.send(Err(clone_for_fanout(e)));
                }
                None if pending.longpolling => {
                    // dropped silently: sender is simply not notified
                }
                None => {
                    let _ = pending.reply.send(Err(Error::BrokerNotAvailable(
                        "connection closed".to_owned(),
                    )));
                }
            }
        }

        self.drained.notify_waiters();
    }

    pub fn pending_count(&self, socket_id: u64) -> usize {
        self.partitions
            .lock()
            .get(&socket_id)
            .map(|p| p.len())
            .unwrap_or(0)
    }

    pub fn total_pending(&self) -> usize {
        self.partitions.lock().values().map(|p| p.len()).sum()
    }

    /// Resolves once every connection's callback partition is empty —
    /// used by `close()` to defer teardown until the queue drains.
    pub async fn wait_drained(&self) {
        loop {
            if self.total_pending() == 0 {
                return;
            }
            let notified = self.drained.notified();
            if self.total_pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// `Error` does not implement `Clone` (it wraps `std::io::Error`); fan-out
/// to every pending callback on close needs one `Error` per callback, so we
/// re-render it from its `Display` form rather than threading `Arc<Error>`
/// through every call site.
fn clone_for_fanout(err: &Error) -> Error {
    Error::BrokerNotAvailable(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn resolve_delivers_decoded_result() {
        let queue = CallbackQueue::new();
        let receiver = queue.queue(1, 42, false, Duration::from_secs(5), |body| Ok(body));

        queue.resolve(
            1,
            Frame {
                correlation_id: 42,
                body: Bytes::from_static(b"hello"),
            },
        );

        let result = receiver.await.unwrap().unwrap();
        assert_eq!(&result[..], b"hello");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_removes_entry_and_fails_caller() {
        let queue = CallbackQueue::new();
        let receiver = queue.queue(1, 7, false, Duration::from_millis(50), |body| Ok(body));

        tokio::time::advance(Duration::from_millis(60)).await;

        let result = receiver.await.unwrap();
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert_eq!(queue.pending_count(1), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn late_frame_after_timeout_is_silently_dropped() {
        let queue = CallbackQueue::new();
        let receiver = queue.queue(1, 7, false, Duration::from_millis(10), |body| Ok(body));
        tokio::time::advance(Duration::from_millis(20)).await;
        let _ = receiver.await;

        // does not panic, does not resurrect the entry
        queue.resolve(
            1,
            Frame {
                correlation_id: 7,
                body: Bytes::new(),
            },
        );
        assert_eq!(queue.pending_count(1), 0);
    }

    #[tokio::test]
    async fn fail_delivers_error_to_every_pending_entry() {
        let queue = CallbackQueue::new();
        let r1 = queue.queue(1, 1, false, Duration::from_secs(5), |b| Ok(b));
        let r2 = queue.queue(1, 2, false, Duration::from_secs(5), |b| Ok(b));

        queue.fail(1, Some(Error::BrokerNotAvailable("gone".to_owned())));

        assert!(r1.await.unwrap().is_err());
        assert!(r2.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn fail_without_error_drops_longpolling_entries_silently() {
        let queue = CallbackQueue::new();
        let r1 = queue.queue(1, 1, true, Duration::from_secs(5), |b| Ok(b));

        queue.fail(1, None);

        // sender dropped without a value: receiver resolves to RecvError
        assert!(r1.await.is_err());
    }
}
