//! Bounded mailboxes between the client facade and the connection engine.
//!
//! Both directions are fixed-capacity deques with explicit overflow
//! policies:
//!
//! - [`Outbox`] drops the single oldest queued message when the bound is
//!   exceeded.
//! - [`Inbox`] clears itself entirely when an insert would exceed the
//!   bound.
//!
//! The inbox also implements the newest-frame-first delivery order: each
//! completed frame's messages are prepended as a block, so a slow consumer
//! always sees the freshest data first while order within a frame is
//! preserved.

use std::collections::VecDeque;

use crate::protocol::Message;

/// Outbound queue of messages awaiting transmission.
#[derive(Debug)]
pub(crate) struct Outbox {
    queue: VecDeque<Message>,
    capacity: usize,
}

impl Outbox {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Enqueue a message, dropping the oldest one if over the bound.
    pub(crate) fn push(&mut self, msg: Message) {
        self.queue.push_back(msg);
        if self.queue.len() > self.capacity {
            if let Some(dropped) = self.queue.pop_front() {
                tracing::warn!(
                    variable = %dropped.name,
                    capacity = self.capacity,
                    "outbox full, dropping oldest message"
                );
            }
        }
    }

    /// Remove and return all queued messages in enqueue order.
    pub(crate) fn drain(&mut self) -> Vec<Message> {
        self.queue.drain(..).collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
    }
}

/// Inbound queue of received messages awaiting delivery.
#[derive(Debug)]
pub(crate) struct Inbox {
    queue: VecDeque<Message>,
    capacity: usize,
}

impl Inbox {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Prepend one frame's messages as a block.
    ///
    /// Later frames end up in front of earlier ones; order within the
    /// frame is kept. If the insert would exceed the bound the whole
    /// mailbox is cleared first.
    pub(crate) fn push_frame(&mut self, messages: Vec<Message>) {
        if messages.is_empty() {
            return;
        }
        if self.queue.len() + messages.len() > self.capacity {
            tracing::warn!(
                queued = self.queue.len(),
                incoming = messages.len(),
                capacity = self.capacity,
                "inbox overflowing, clearing"
            );
            self.queue.clear();
        }
        for msg in messages.into_iter().rev() {
            self.queue.push_front(msg);
        }
    }

    /// Remove and return everything, newest frame first.
    pub(crate) fn take_all(&mut self) -> Vec<Message> {
        self.queue.drain(..).collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
    }
}
