//! Bounded multi-producer multi-consumer queue of heights.

use crate::types::Height;
use std::collections::VecDeque;
use tokio::sync::{Mutex, Notify};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("height queue is closed; height {0} was not enqueued")]
pub struct QueueClosed(pub Height);

#[derive(Debug, Default)]
struct QueueState {
    heights: VecDeque<Height>,
    closed: bool,
}

/// Each pushed height is popped by exactly one consumer.
#[derive(Debug)]
pub struct HeightQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    items_available: Notify,
    space_available: Notify,
}

impl HeightQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            capacity: capacity.max(1),
            items_available: Notify::new(),
            space_available: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Waits for room, then enqueues. Fails once the queue is closed.
    pub async fn push(&self, height: Height) -> Result<(), QueueClosed> {
        loop {
            let notified = self.space_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Err(QueueClosed(height));
                }
                if state.heights.len() < self.capacity {
                    state.heights.push_back(height);
                    drop(state);
                    self.items_available.notify_one();
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    /// Next height, or `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<Height> {
        loop {
            let notified = self.items_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if let Some(height) = state.heights.pop_front() {
                    drop(state);
                    self.space_available.notify_one();
                    return Some(height);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Rejects further pushes. Heights already queued remain poppable.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.items_available.notify_waiters();
        self.space_available.notify_waiters();
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.heights.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
