//! Bounded in-memory FIFO with automatic spill-to-disk, blocking dequeue,
//! and persistence across restarts.

mod disk;
mod error;

pub use error::QueueError;

use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};
use xrm_types::QueueMessage;

use disk::DiskStore;

/// Default in-memory high-water mark: disk spillover begins once the
/// in-memory FIFO reaches this length.
pub const DEFAULT_MAX_IN_MEMORY: usize = 100;
/// Default low-water mark: disk mode is exited once the on-disk backlog
/// falls to or below this length.
pub const DEFAULT_LOW_WATER: usize = 50;
/// Default segment size for the disk-backed overflow store.
pub const DEFAULT_SEGMENT_CAPACITY: usize = 10_000;

struct State {
    memory: VecDeque<QueueMessage>,
    using_disk: bool,
    disk: DiskStore,
}

/// A durable, bounded confirmation queue: strictly FIFO, spills to disk
/// once the in-memory backlog grows past `max_in_memory`, and drains back
/// to memory once the disk backlog falls to `low_water`.
pub struct DurableQueue {
    state: Mutex<State>,
    not_empty: Notify,
    max_in_memory: usize,
    low_water: usize,
}

impl DurableQueue {
    /// Open a queue backed by `dir`, recovering any segments left over
    /// from a previous run. If recovered items exist, disk mode is
    /// re-entered automatically.
    pub async fn open(
        dir: impl Into<std::path::PathBuf>,
        max_in_memory: usize,
        low_water: usize,
    ) -> Result<Self, QueueError> {
        Self::open_with_segment_capacity(dir, max_in_memory, low_water, DEFAULT_SEGMENT_CAPACITY).await
    }

    /// As [`Self::open`] but with an explicit segment capacity (mainly
    /// for tests that want small segments).
    pub async fn open_with_segment_capacity(
        dir: impl Into<std::path::PathBuf>,
        max_in_memory: usize,
        low_water: usize,
        segment_capacity: usize,
    ) -> Result<Self, QueueError> {
        let disk = DiskStore::open(dir, segment_capacity)?;
        let using_disk = disk.has_recovered_segments();
        if using_disk {
            tracing::info!(target: "relay.queue", pending = disk.pending(), "recovered disk-backed backlog on startup");
        }
        Ok(Self {
            state: Mutex::new(State {
                memory: VecDeque::new(),
                using_disk,
                disk,
            }),
            not_empty: Notify::new(),
            max_in_memory,
            low_water,
        })
    }

    /// Append a message. Spills to disk once the in-memory length reaches
    /// `max_in_memory`; once in disk mode, all further enqueues go
    /// straight to disk until the low-water drain brings the queue back
    /// to memory mode.
    pub async fn enqueue(&self, msg: QueueMessage) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if !state.using_disk && state.memory.len() < self.max_in_memory {
            state.memory.push_back(msg);
        } else if !state.using_disk {
            tracing::info!(target: "relay.queue", "in-memory high-water mark reached, spilling to disk");
            state.using_disk = true;
            while let Some(pending) = state.memory.pop_front() {
                state.disk.push(&pending)?;
            }
            state.disk.push(&msg)?;
        } else {
            state.disk.push(&msg)?;
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// Block until a message is available, then pop and return it
    /// (strict FIFO order).
    pub async fn dequeue(&self) -> Result<QueueMessage, QueueError> {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(msg) = self.try_pop_locked(&mut state)? {
                    return Ok(msg);
                }
            }
            self.not_empty.notified().await;
        }
    }

    /// Non-blocking pop; returns `None` if the queue is currently empty.
    pub async fn try_dequeue(&self) -> Result<Option<QueueMessage>, QueueError> {
        let mut state = self.state.lock().await;
        self.try_pop_locked(&mut state)
    }

    fn try_pop_locked(&self, state: &mut State) -> Result<Option<QueueMessage>, QueueError> {
        if !state.using_disk {
            if let Some(msg) = state.memory.pop_front() {
                return Ok(Some(msg));
            }
            return Ok(None);
        }

        if state.disk.pending() > self.low_water {
            return state.disk.pop();
        }

        tracing::info!(target: "relay.queue", pending = state.disk.pending(), "disk backlog below low-water mark, draining to memory");
        while let Some(msg) = state.disk.pop()? {
            state.memory.push_back(msg);
        }
        state.using_disk = false;
        Ok(state.memory.pop_front())
    }

    /// Current length: in-memory length if in memory mode, else the disk
    /// backlog size.
    pub async fn size(&self) -> usize {
        let state = self.state.lock().await;
        if state.using_disk {
            state.disk.pending()
        } else {
            state.memory.len()
        }
    }

    /// Whether the queue is currently spilled to disk.
    pub async fn using_disk(&self) -> bool {
        self.state.lock().await.using_disk
    }

    /// Flush and close the disk store. Safe to call once; subsequent
    /// enqueue/dequeue calls still function against whatever remains in
    /// memory.
    pub async fn close(&self) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.disk.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(n: u32) -> QueueMessage {
        QueueMessage::new(n.to_be_bytes().to_vec(), "ex", "rk")
    }

    #[tokio::test]
    async fn fifo_order_preserved_under_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let queue = DurableQueue::open_with_segment_capacity(dir.path(), 5, 2, 1000)
            .await
            .unwrap();
        for i in 0..20u32 {
            queue.enqueue(msg(i)).await.unwrap();
        }
        let mut out = Vec::new();
        for _ in 0..20 {
            let m = queue.dequeue().await.unwrap();
            out.push(u32::from_be_bytes(m.bytes.try_into().unwrap()));
        }
        assert_eq!(out, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn size_is_never_negative_and_tracks_state() {
        let dir = tempfile::tempdir().unwrap();
        let queue = DurableQueue::open(dir.path(), 100, 50).await.unwrap();
        assert_eq!(queue.size().await, 0);
        queue.enqueue(msg(1)).await.unwrap();
        assert_eq!(queue.size().await, 1);
        queue.dequeue().await.unwrap();
        assert_eq!(queue.size().await, 0);
    }

    #[tokio::test]
    async fn spills_to_disk_past_high_water_mark() {
        let dir = tempfile::tempdir().unwrap();
        let queue = DurableQueue::open(dir.path(), 3, 1).await.unwrap();
        for i in 0..3u32 {
            queue.enqueue(msg(i)).await.unwrap();
        }
        assert!(!queue.using_disk().await);
        queue.enqueue(msg(3)).await.unwrap();
        assert!(queue.using_disk().await);
    }

    #[tokio::test]
    async fn drains_back_to_memory_at_low_water() {
        let dir = tempfile::tempdir().unwrap();
        let queue = DurableQueue::open(dir.path(), 3, 2).await.unwrap();
        for i in 0..4u32 {
            queue.enqueue(msg(i)).await.unwrap();
        }
        assert!(queue.using_disk().await);
        // disk pending=4: two pops stay above low_water(2), the third pop
        // finds pending<=low_water and drains the remainder into memory.
        queue.dequeue().await.unwrap();
        queue.dequeue().await.unwrap();
        queue.dequeue().await.unwrap();
        assert!(!queue.using_disk().await);
    }

    #[tokio::test]
    async fn persists_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let queue = DurableQueue::open(dir.path(), 2, 1).await.unwrap();
            for i in 0..5u32 {
                queue.enqueue(msg(i)).await.unwrap();
            }
            queue.close().await.unwrap();
        }
        let queue = DurableQueue::open(dir.path(), 2, 1).await.unwrap();
        assert!(queue.using_disk().await);
        let mut out = Vec::new();
        for _ in 0..5 {
            let m = queue.dequeue().await.unwrap();
            out.push(u32::from_be_bytes(m.bytes.try_into().unwrap()));
        }
        assert_eq!(out, (0..5).collect::<Vec<_>>());
    }
}
