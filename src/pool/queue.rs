// Bounded task queue for asynchronous acquire requests.
//
// Async-acquire enqueues the callback with its enqueue instant; the
// async-request workers pull tasks in FIFO order and run the synchronous
// acquire against the remaining deadline.

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::driver::Driver;
use crate::error::PoolError;
use crate::pool::core::PooledConnection;

pub(crate) type AcquireCallback<D> =
    Box<dyn FnOnce(Result<PooledConnection<D>, PoolError>) + Send + 'static>;

/// One pending asynchronous acquire.
pub(crate) struct AsyncRequest<D: Driver> {
    pub callback: AcquireCallback<D>,
    pub timeout: Duration,
    pub enqueued_at: Instant,
}

impl<D: Driver> AsyncRequest<D> {
    pub fn new(callback: AcquireCallback<D>, timeout: Duration) -> Self {
        Self {
            callback,
            timeout,
            enqueued_at: Instant::now(),
        }
    }

    /// Deadline budget left for this request.
    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.enqueued_at.elapsed())
    }
}

/// FIFO queue of pending async requests with a hard capacity bound.
pub(crate) struct RequestQueue<D: Driver> {
    sender: Sender<AsyncRequest<D>>,
    receiver: Receiver<AsyncRequest<D>>,
    capacity: usize,
    enqueued: AtomicU64,
    rejected: AtomicU64,
}

impl<D: Driver> RequestQueue<D> {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self {
            sender,
            receiver,
            capacity: capacity.max(1),
            enqueued: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Enqueue a request; hands it back if the queue is full.
    pub fn enqueue(&self, request: AsyncRequest<D>) -> Result<(), AsyncRequest<D>> {
        match self.sender.try_send(request) {
            Ok(()) => {
                self.enqueued.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(TrySendError::Full(request)) | Err(TrySendError::Disconnected(request)) => {
                self.rejected.fetch_add(1, Ordering::SeqCst);
                Err(request)
            }
        }
    }

    /// Worker-side receiver; each worker holds its own clone.
    pub fn receiver(&self) -> Receiver<AsyncRequest<D>> {
        self.receiver.clone()
    }

    /// Drain everything still queued. Used at shutdown so no callback is
    /// silently dropped.
    pub fn drain(&self) -> Vec<AsyncRequest<D>> {
        let mut drained = Vec::new();
        while let Ok(request) = self.receiver.try_recv() {
            drained.push(request);
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    struct NullDriver;

    impl Driver for NullDriver {
        type Conn = ();

        fn connect(&self, _endpoint: &str, _username: &str, _password: &str) -> Result<()> {
            Ok(())
        }

        fn execute(&self, _conn: &mut (), _query: &str) -> Result<()> {
            Ok(())
        }

        fn validate(&self, _conn: &mut (), _probe: &str) -> bool {
            true
        }

        fn set_autocommit(&self, _conn: &mut (), _enabled: bool) -> Result<()> {
            Ok(())
        }

        fn close(&self, _conn: ()) {}
    }

    fn request(timeout: Duration) -> AsyncRequest<NullDriver> {
        AsyncRequest::new(Box::new(|_| {}), timeout)
    }

    #[test]
    fn test_queue_enqueue_and_drain() {
        let queue: RequestQueue<NullDriver> = RequestQueue::new(4);
        assert!(queue.enqueue(request(Duration::from_secs(1))).is_ok());
        assert!(queue.enqueue(request(Duration::from_secs(1))).is_ok());
        assert_eq!(queue.len(), 2);

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_queue_rejects_when_full() {
        let queue: RequestQueue<NullDriver> = RequestQueue::new(1);
        assert!(queue.enqueue(request(Duration::from_secs(1))).is_ok());

        let rejected = queue.enqueue(request(Duration::from_secs(1)));
        assert!(rejected.is_err());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_request_remaining_budget() {
        let req = request(Duration::from_secs(5));
        assert!(req.remaining() <= Duration::from_secs(5));

        let spent = request(Duration::from_millis(0));
        assert_eq!(spent.remaining(), Duration::ZERO);
    }
}
