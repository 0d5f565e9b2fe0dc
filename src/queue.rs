//! FIFO between the transport callback and the turn collector

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::types::ServerMessage;

/// Something the transport handed over
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Message(ServerMessage),
    Error(String),
    Closed(Option<String>),
}

type Shared = Arc<Mutex<VecDeque<Delivery>>>;

fn lock(shared: &Shared) -> MutexGuard<'_, VecDeque<Delivery>> {
    // A panicking producer can't leave the deque half-written.
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Consumer side of a session's delivery queue
///
/// There is no peek, so only one reader may drain it. The collector owns it.
#[derive(Debug, Default)]
pub struct MessageQueue {
    shared: Shared,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle the transport uses to push deliveries, from any thread or task
    pub fn producer(&self) -> QueueProducer {
        QueueProducer {
            shared: self.shared.clone(),
        }
    }

    pub fn pop(&self) -> Option<Delivery> {
        lock(&self.shared).pop_front()
    }

    pub fn len(&self) -> usize {
        lock(&self.shared).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.shared).is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct QueueProducer {
    shared: Shared,
}

impl QueueProducer {
    pub fn push(&self, delivery: Delivery) {
        lock(&self.shared).push_back(delivery);
    }

    pub fn message(&self, message: ServerMessage) {
        self.push(Delivery::Message(message));
    }

    pub fn error(&self, error: impl Into<String>) {
        self.push(Delivery::Error(error.into()));
    }

    pub fn closed(&self, reason: Option<String>) {
        self.push(Delivery::Closed(reason));
    }
}
