// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared outbound queue.
//!
//! The queue, the sender state, the time of the last successful send and the
//! worker's join handle all live behind one mutex. Producers append and
//! signal; the delivery worker swaps the whole queue out for a flush and puts
//! failed batches back in front of anything enqueued meanwhile.
//!
//! The wake signal is a [`Notify`]: a signal sent while the worker is busy is
//! stored as a permit, so the worker never misses a wake-up between checking
//! the queue and starting to wait. A [`Condvar`] on the same mutex lets every
//! `close()` caller block until the state reaches [`SenderState::Closed`].

use crate::EventRecord;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Lifecycle of a sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// Accepting records.
    Running,
    /// `close()` was called; the worker is draining the queue.
    Closing,
    /// The worker has exited.
    Closed,
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenderState::Running => write!(f, "running"),
            SenderState::Closing => write!(f, "closing"),
            SenderState::Closed => write!(f, "closed"),
        }
    }
}

/// Everything guarded by the queue lock.
pub struct QueueState {
    pub records: VecDeque<EventRecord>,
    pub status: SenderState,
    /// Last successful flush, or queue creation.
    pub last_send: Instant,
    pub(crate) worker: Option<JoinHandle<()>>,
}

impl QueueState {
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == SenderState::Running
    }

    /// Move every pending record out of the queue.
    pub fn take_batch(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.records).into()
    }

    /// Put a failed batch back ahead of records enqueued since it was taken.
    pub fn requeue_front(&mut self, batch: Vec<EventRecord>) {
        if batch.is_empty() {
            return;
        }
        let newer = std::mem::take(&mut self.records);
        let mut records = VecDeque::from(batch);
        records.extend(newer);
        self.records = records;
    }
}

pub struct OutboundQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    closed: Condvar,
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                records: VecDeque::new(),
                status: SenderState::Running,
                last_send: Instant::now(),
                worker: None,
            }),
            notify: Notify::new(),
            closed: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, QueueState> {
        #[allow(clippy::expect_used)]
        let state = self.state.lock().expect("lock poisoned");
        state
    }

    /// Wake the worker, or leave a permit if it is not waiting yet.
    pub fn signal(&self) {
        self.notify.notify_one();
    }

    /// Wait for a signal, at most `timeout`.
    pub async fn wait(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }

    #[must_use]
    pub fn status(&self) -> SenderState {
        self.lock().status
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    pub(crate) fn set_worker(&self, handle: JoinHandle<()>) {
        self.lock().worker = Some(handle);
    }

    /// Move `Running` to `Closing` and hand out the worker handle to join.
    ///
    /// Only the first caller gets the handle.
    pub(crate) fn begin_close(&self) -> Option<JoinHandle<()>> {
        let mut state = self.lock();
        if state.status == SenderState::Running {
            state.status = SenderState::Closing;
        }
        state.worker.take()
    }

    pub(crate) fn mark_closed(&self) {
        let mut state = self.lock();
        self.close_locked(&mut state);
    }

    /// Set [`SenderState::Closed`] while holding the lock and wake every
    /// thread blocked in [`OutboundQueue::wait_closed`].
    pub(crate) fn close_locked(&self, state: &mut QueueState) {
        state.status = SenderState::Closed;
        self.closed.notify_all();
    }

    /// Block the calling thread until the state is [`SenderState::Closed`].
    pub(crate) fn wait_closed(&self) {
        let state = self.lock();
        #[allow(clippy::expect_used)]
        let _state = self
            .closed
            .wait_while(state, |state| state.status != SenderState::Closed)
            .expect("lock poisoned");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn record(n: i64) -> EventRecord {
        match json!({ "n": n }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn numbers(records: &VecDeque<EventRecord>) -> Vec<i64> {
        records
            .iter()
            .map(|r| r["n"].as_i64().expect("n"))
            .collect()
    }

    #[test]
    fn test_take_batch_empties_queue() {
        let queue = OutboundQueue::new();
        {
            let mut state = queue.lock();
            state.records.push_back(record(1));
            state.records.push_back(record(2));
        }
        let batch = queue.lock().take_batch();
        assert_eq!(batch.len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_requeue_front_preserves_order() {
        let queue = OutboundQueue::new();
        let mut state = queue.lock();
        state.records.extend([record(1), record(2)]);
        let batch = state.take_batch();
        state.records.extend([record(3), record(4)]);

        state.requeue_front(batch);
        assert_eq!(numbers(&state.records), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_requeue_empty_batch_is_noop() {
        let queue = OutboundQueue::new();
        let mut state = queue.lock();
        state.records.push_back(record(1));
        state.requeue_front(Vec::new());
        assert_eq!(numbers(&state.records), vec![1]);
    }

    #[test]
    fn test_begin_close_transitions_once() {
        let queue = OutboundQueue::new();
        queue.set_worker(std::thread::spawn(|| {}));

        assert!(queue.begin_close().is_some());
        assert_eq!(queue.status(), SenderState::Closing);
        assert!(queue.begin_close().is_none());
        assert_eq!(queue.status(), SenderState::Closing);

        queue.mark_closed();
        assert!(queue.begin_close().is_none());
        assert_eq!(queue.status(), SenderState::Closed);
    }

    #[test]
    fn test_wait_closed_blocks_until_closed() {
        let queue = std::sync::Arc::new(OutboundQueue::new());
        assert!(queue.begin_close().is_none());

        let closer = {
            let queue = std::sync::Arc::clone(&queue);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(100));
                queue.mark_closed();
            })
        };

        let start = Instant::now();
        queue.wait_closed();
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(queue.status(), SenderState::Closed);
        closer.join().expect("closer thread");
    }

    #[test]
    fn test_wait_closed_returns_when_already_closed() {
        let queue = OutboundQueue::new();
        queue.mark_closed();
        queue.wait_closed();
        assert_eq!(queue.status(), SenderState::Closed);
    }

    #[tokio::test]
    async fn test_signal_before_wait_is_not_lost() {
        let queue = OutboundQueue::new();
        queue.signal();

        let start = Instant::now();
        queue.wait(Duration::from_secs(10)).await;
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let queue = OutboundQueue::new();
        let start = Instant::now();
        queue.wait(Duration::from_millis(50)).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SenderState::Closing.to_string(), "closing");
    }
}
