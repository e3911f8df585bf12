//! FIFO message queue attached to one interface
//!
//! The accessor decides who may drain the queue. The queue itself tracks
//! the serial of the writer it delivers to: enqueues are refused while no
//! writer is attached, and closing the writer flushes the queue under the
//! same lock, so nothing enqueued for one writer reaches the next.

use crate::message::Message;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, LazyLock};

/// Queue state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// No messages
    Empty,
    /// At least one message
    NonEmpty,
}

struct Inner {
    messages: VecDeque<Arc<Message>>,
    next_id: u32,
    writer: Option<u32>,
}

/// Lock-protected FIFO of messages
pub struct MessageQueue {
    inner: Mutex<Inner>,
}

impl MessageQueue {
    /// Empty queue; ids start at 1
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                messages: VecDeque::new(),
                next_id: 1,
                writer: None,
            }),
        }
    }

    fn take_id(inner: &mut Inner) -> u32 {
        let id = inner.next_id;
        inner.next_id = inner.next_id.wrapping_add(1).max(1);
        id
    }

    /// Deliver to the writer with `serial` from now on
    pub fn open_writer(&self, serial: u32) {
        self.inner.lock().writer = Some(serial);
    }

    /// Detach the writer and drop its pending messages; returns how many
    pub fn close_writer(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.writer = None;
        let count = inner.messages.len();
        inner.messages.clear();
        count
    }

    /// Stamp `message` with a fresh id and append it.
    ///
    /// `admit` runs without the queue lock, after the id is assigned and
    /// before the append; returning `false` drops the message and the id is
    /// still returned. `None` if no writer is attached, or if the writer
    /// that was attached when the id was taken has gone by the append.
    pub fn append_with(
        &self,
        mut message: Message,
        admit: impl FnOnce(&Message) -> bool,
    ) -> Option<(u32, bool)> {
        let (id, writer) = {
            let mut inner = self.inner.lock();
            let writer = inner.writer?;
            (Self::take_id(&mut inner), writer)
        };
        message.id = id;
        if !admit(&message) {
            return Some((id, false));
        }
        let mut inner = self.inner.lock();
        if inner.writer != Some(writer) {
            return None;
        }
        inner.messages.push_back(Arc::new(message));
        Some((id, true))
    }

    /// Oldest message without removing it
    pub fn first(&self) -> Option<Arc<Message>> {
        self.inner.lock().messages.front().cloned()
    }

    /// Remove and return the oldest message
    pub fn pop(&self) -> Option<Arc<Message>> {
        self.inner.lock().messages.pop_front()
    }

    /// Remove the message with `id`; true if it was queued
    pub fn remove(&self, id: u32) -> bool {
        let mut inner = self.inner.lock();
        match inner.messages.iter().position(|m| m.id == id) {
            Some(index) => {
                inner.messages.remove(index);
                true
            }
            None => false,
        }
    }

    /// Drop every queued message, returning how many there were
    pub fn flush(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.messages.len();
        inner.messages.clear();
        count
    }

    /// Queued messages
    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    /// True if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.inner.lock().messages.is_empty()
    }

    /// `Empty` or `NonEmpty`
    pub fn state(&self) -> QueueState {
        if self.is_empty() {
            QueueState::Empty
        } else {
            QueueState::NonEmpty
        }
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity of one interface block incarnation within this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueKey {
    /// Region epoch
    pub epoch: u64,
    /// Region master
    pub master_pid: u32,
    /// Directory slot
    pub slot: u32,
    /// Slot generation
    pub generation: u32,
}

/// Queues of every block with an open accessor in this process, with the
/// number of accessors holding each
static QUEUES: LazyLock<Mutex<HashMap<QueueKey, (Arc<MessageQueue>, usize)>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Queue of `key`, created on first use
pub fn attach_queue(key: QueueKey) -> Arc<MessageQueue> {
    let mut queues = QUEUES.lock();
    let (queue, holders) = queues
        .entry(key)
        .or_insert_with(|| (Arc::new(MessageQueue::new()), 0));
    *holders += 1;
    Arc::clone(queue)
}

/// Drop one holder of `key`; the queue goes away with the last one
pub fn detach_queue(key: &QueueKey) {
    let mut queues = QUEUES.lock();
    if let Some((_, holders)) = queues.get_mut(key) {
        *holders -= 1;
        if *holders == 0 {
            queues.remove(key);
        }
    }
}
