use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

/// Answer delivered to a queued caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ticket {
    /// The collection slot is now yours.
    Proceed,
    /// Waited too long or the scheduler shut down. Resolve to `None`.
    Expired,
}

#[derive(Debug)]
pub struct CollectionRequest {
    responder: oneshot::Sender<Ticket>,
    enqueued_at: Instant,
}

/// A request that was handed the slot.
#[derive(Debug)]
pub struct Granted {
    pub waited: Duration,
}

/// Bounded strict-FIFO queue of callers waiting for the collection slot.
///
/// Requests older than the staleness timeout are resolved `Expired`
/// whenever the queue is touched; requests whose caller has gone away are
/// skipped silently.
#[derive(Debug)]
pub struct BackpressureQueue {
    capacity: usize,
    timeout: Duration,
    pending: VecDeque<CollectionRequest>,
}

impl BackpressureQueue {
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        Self {
            capacity,
            timeout,
            pending: VecDeque::with_capacity(capacity),
        }
    }

    /// Queues a caller. `None` when the queue is full after stale entries
    /// have been purged.
    pub fn try_enqueue(&mut self, now: Instant) -> Option<oneshot::Receiver<Ticket>> {
        if self.pending.len() >= self.capacity {
            self.expire_stale(now);
        }
        if self.pending.len() >= self.capacity {
            return None;
        }

        let (responder, receiver) = oneshot::channel();
        self.pending.push_back(CollectionRequest { responder, enqueued_at: now });
        Some(receiver)
    }

    /// Hands the slot to the oldest live, fresh request.
    ///
    /// Returns the grant (if any) and how long every expired request had
    /// waited, for bookkeeping.
    pub fn grant_next(&mut self, now: Instant) -> (Option<Granted>, Vec<Duration>) {
        let mut expired = Vec::new();

        while let Some(request) = self.pending.pop_front() {
            let waited = now.saturating_duration_since(request.enqueued_at);
            if request.responder.is_closed() {
                continue;
            }
            if waited > self.timeout {
                let _ = request.responder.send(Ticket::Expired);
                expired.push(waited);
                continue;
            }
            if request.responder.send(Ticket::Proceed).is_ok() {
                return (Some(Granted { waited }), expired);
            }
        }

        (None, expired)
    }

    /// Resolves every stale request `Expired`. Returns their wait times.
    pub fn expire_stale(&mut self, now: Instant) -> Vec<Duration> {
        let mut expired = Vec::new();
        let mut kept = VecDeque::with_capacity(self.capacity);

        for request in self.pending.drain(..) {
            let waited = now.saturating_duration_since(request.enqueued_at);
            if request.responder.is_closed() {
                continue;
            }
            if waited > self.timeout {
                let _ = request.responder.send(Ticket::Expired);
                expired.push(waited);
                continue;
            }
            kept.push_back(request);
        }
        self.pending = kept;

        if !expired.is_empty() {
            debug!(count = expired.len(), "Expired stale collection requests");
        }
        expired
    }

    /// Resolves everything still waiting. Returns how many were resolved.
    pub fn drain(&mut self) -> usize {
        let mut resolved = 0;
        for request in self.pending.drain(..) {
            if request.responder.send(Ticket::Expired).is_ok() {
                resolved += 1;
            }
        }
        resolved
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
