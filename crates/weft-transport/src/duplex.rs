//! In-process duplex channel pair.
//!
//! [`duplex`] builds two [`ChannelTransport`] endpoints wired
//! front-to-back: whatever one side sends, the other receives. This is
//! the transport the test harness runs sessions over, so its queue
//! semantics carry the harness guarantees:
//!
//! - each direction is a bounded FIFO; `send` suspends when full,
//!   `receive` suspends when empty;
//! - severing the pair marks both directions closed: writes fail
//!   immediately instead of blocking, reads drain whatever is already
//!   queued (so a terminal `close` frame still gets through) and then
//!   fail immediately instead of blocking;
//! - each endpoint can report how many unconsumed data frames sit in
//!   either direction, and can wait for its outbound direction to drain.
//!
//! Each direction has exactly one producer and one consumer for its
//! whole lifetime, so every wakeup uses `Notify::notify_one` and relies
//! on its stored permit; waiters re-check state in a loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use weft_protocol::Message;

use crate::{Transport, TransportError};

/// Default per-direction queue capacity.
pub const DEFAULT_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// Channel (one direction)
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Channel {
    queue: Mutex<VecDeque<Message>>,
    capacity: usize,
    closed: AtomicBool,
    /// A message was pushed, or the channel closed.
    readable: Notify,
    /// A message was popped, or the channel closed.
    writable: Notify,
    /// A pop may have emptied the queue of data frames, or the channel
    /// closed.
    drained: Notify,
}

impl Channel {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            capacity,
            closed: AtomicBool::new(false),
            readable: Notify::new(),
            writable: Notify::new(),
            drained: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Message>> {
        // The critical sections never panic while holding the guard;
        // recover the data from a poisoned lock rather than propagating.
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.readable.notify_one();
        self.writable.notify_one();
        self.drained.notify_one();
    }

    async fn push(&self, message: Message) -> Result<(), TransportError> {
        loop {
            let writable = self.writable.notified();
            {
                let mut queue = self.lock();
                if self.is_closed() {
                    return Err(TransportError::ConnectionAbandoned);
                }
                if queue.len() < self.capacity {
                    queue.push_back(message);
                    drop(queue);
                    self.readable.notify_one();
                    return Ok(());
                }
            }
            writable.await;
        }
    }

    async fn pop(&self) -> Result<Message, TransportError> {
        loop {
            let readable = self.readable.notified();
            {
                let mut queue = self.lock();
                if let Some(message) = queue.pop_front() {
                    drop(queue);
                    self.writable.notify_one();
                    self.drained.notify_one();
                    return Ok(message);
                }
                if self.is_closed() {
                    return Err(TransportError::ConnectionAbandoned);
                }
            }
            readable.await;
        }
    }

    /// Resolves once no data frames remain queued (control frames do
    /// not count) or the channel is closed.
    async fn wait_data_drained(&self) {
        loop {
            let drained = self.drained.notified();
            if self.data_frames() == 0 || self.is_closed() {
                return;
            }
            drained.await;
        }
    }

    fn data_frames(&self) -> usize {
        self.lock().iter().filter(|m| m.is_data()).count()
    }
}

// ---------------------------------------------------------------------------
// ChannelTransport (one endpoint)
// ---------------------------------------------------------------------------

/// One endpoint of an in-process duplex pair.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    incoming: Arc<Channel>,
    outgoing: Arc<Channel>,
}

/// Builds a connected endpoint pair with the given per-direction
/// capacity (clamped to at least 1).
pub fn duplex(capacity: usize) -> (ChannelTransport, ChannelTransport) {
    let capacity = capacity.max(1);
    let forward = Arc::new(Channel::new(capacity));
    let backward = Arc::new(Channel::new(capacity));
    (
        ChannelTransport { incoming: Arc::clone(&backward), outgoing: Arc::clone(&forward) },
        ChannelTransport { incoming: forward, outgoing: backward },
    )
}

impl ChannelTransport {
    /// Marks both directions closed. Blocked operations on either
    /// endpoint wake and fail; queued messages stay readable.
    pub fn sever(&self) {
        tracing::trace!("severing duplex pair");
        self.incoming.close();
        self.outgoing.close();
    }

    pub fn is_severed(&self) -> bool {
        self.incoming.is_closed()
    }

    /// Unconsumed data frames waiting to be received by this endpoint.
    pub fn inbound_data_frames(&self) -> usize {
        self.incoming.data_frames()
    }

    /// Data frames this endpoint sent that the other side has not yet
    /// consumed.
    pub fn outbound_data_frames(&self) -> usize {
        self.outgoing.data_frames()
    }

    /// Waits until every data frame this endpoint sent has been
    /// consumed, or the pair is severed. Control frames still queued do
    /// not hold this up.
    pub async fn outbound_drained(&self) {
        self.outgoing.wait_data_drained().await;
    }
}

impl Transport for ChannelTransport {
    async fn receive(&self) -> Result<Message, TransportError> {
        self.incoming.pop().await
    }

    async fn send(&self, message: Message) -> Result<(), TransportError> {
        self.outgoing.push(message).await
    }
}
