//! Priority command queue
//!
//! Binary heap ordered by (priority, enqueue sequence) plus a pending set
//! of entries at priority ≤ Normal. Inserting a Refinement command evicts
//! every pending entry first ("actually, do X instead"). Dequeue is a
//! bounded wait so callers stay responsive to other events.
//!
//! Invariant: no stale pending command survives a refinement insert, and
//! every enqueued command is delivered exactly once.

use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;
use tokio::sync::Notify;

use crate::types::{Command, Priority};

struct Entry {
    command: Command,
    seq: u64,
}

impl Entry {
    fn key(&self) -> (u8, u64) {
        (self.command.priority as u8, self.seq)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<Reverse<Entry>>,
    /// Sequence numbers of entries at priority ≤ Normal
    pending: HashSet<u64>,
    next_seq: u64,
}

impl Inner {
    /// Re-key entries that aged past the expiry window to `Expired`.
    /// Expired entries also leave the pending set, so a later refinement
    /// purge no longer touches them.
    fn rekey_expired(&mut self) {
        let needs_rekey = self
            .heap
            .iter()
            .any(|Reverse(e)| e.command.priority != Priority::Expired && e.command.is_expired());
        if !needs_rekey {
            return;
        }

        let entries: Vec<Entry> = std::mem::take(&mut self.heap)
            .into_iter()
            .map(|Reverse(mut e)| {
                if e.command.priority != Priority::Expired && e.command.is_expired() {
                    e.command.priority = Priority::Expired;
                    self.pending.remove(&e.seq);
                }
                e
            })
            .collect();
        self.heap = entries.into_iter().map(Reverse).collect();
    }
}

/// Internally synchronized priority command queue
pub struct CommandQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
        }
    }

    /// Enqueue a command
    ///
    /// A Refinement command evicts all currently pending (≤ Normal)
    /// entries before it is inserted.
    pub fn enqueue(&self, command: Command) {
        {
            let mut inner = self.inner.lock();

            if command.priority == Priority::Refinement && !inner.pending.is_empty() {
                let before = inner.heap.len();
                let pending = std::mem::take(&mut inner.pending);
                let survivors: Vec<Reverse<Entry>> = std::mem::take(&mut inner.heap)
                    .into_iter()
                    .filter(|Reverse(e)| !pending.contains(&e.seq))
                    .collect();
                inner.heap = survivors.into();
                tracing::debug!(
                    evicted = before - inner.heap.len(),
                    "refinement command evicted pending queue entries"
                );
            }

            let seq = inner.next_seq;
            inner.next_seq += 1;
            if command.priority <= Priority::Normal {
                inner.pending.insert(seq);
            }
            inner.heap.push(Reverse(Entry { command, seq }));
        }
        self.notify.notify_one();
    }

    /// Pop the minimum (priority, sequence) entry, if any
    pub fn try_dequeue(&self) -> Option<Command> {
        let mut inner = self.inner.lock();
        inner.rekey_expired();
        inner.heap.pop().map(|Reverse(entry)| {
            inner.pending.remove(&entry.seq);
            entry.command
        })
    }

    /// Dequeue with a bounded wait
    ///
    /// Returns `None` once the timeout elapses with nothing available,
    /// so a stalled producer can never starve the caller's bookkeeping.
    pub async fn dequeue(&self, timeout: Duration) -> Option<Command> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(command) = self.try_dequeue() {
                return Some(command);
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    return self.try_dequeue();
                }
            }
        }
    }

    /// Number of queued commands
    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().heap.is_empty()
    }

    /// Drop everything (session teardown)
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.heap.clear();
        inner.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CommandKind;
    use std::time::Instant;

    #[test]
    fn test_stop_dequeues_before_request() {
        // Scenario: Stop enqueued before a news request must come out first
        let queue = CommandQueue::new();
        queue.enqueue(Command::new(CommandKind::Stop, "stop"));
        queue.enqueue(
            Command::new(CommandKind::NewsRequest, "AAPL price").with_payload("AAPL price"),
        );

        assert_eq!(queue.try_dequeue().unwrap().kind, CommandKind::Stop);
        assert_eq!(queue.try_dequeue().unwrap().kind, CommandKind::NewsRequest);
        assert!(queue.try_dequeue().is_none());
    }

    #[test]
    fn test_priority_beats_insertion_order() {
        let queue = CommandQueue::new();
        queue.enqueue(Command::new(CommandKind::NewsRequest, "news"));
        queue.enqueue(Command::new(CommandKind::Stop, "stop"));

        assert_eq!(queue.try_dequeue().unwrap().kind, CommandKind::Stop);
        assert_eq!(queue.try_dequeue().unwrap().kind, CommandKind::NewsRequest);
    }

    #[test]
    fn test_ties_break_on_enqueue_order() {
        let queue = CommandQueue::new();
        queue.enqueue(Command::new(CommandKind::NewsRequest, "first"));
        queue.enqueue(Command::new(CommandKind::WeatherRequest, "second"));

        assert_eq!(queue.try_dequeue().unwrap().origin_text, "first");
        assert_eq!(queue.try_dequeue().unwrap().origin_text, "second");
    }

    #[test]
    fn test_refinement_evicts_pending() {
        let queue = CommandQueue::new();
        queue.enqueue(Command::new(CommandKind::NewsRequest, "old news"));
        queue.enqueue(Command::new(CommandKind::StockRequest, "old stocks"));

        let refinement = Command::new(CommandKind::WeatherRequest, "actually the weather")
            .with_priority(Priority::Refinement);
        queue.enqueue(refinement);

        assert_eq!(queue.len(), 1);
        let cmd = queue.try_dequeue().unwrap();
        assert_eq!(cmd.kind, CommandKind::WeatherRequest);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_expired_entries_survive_refinement() {
        let queue = CommandQueue::new();

        let mut stale = Command::new(CommandKind::NewsRequest, "stale");
        stale.created_at = Instant::now() - Duration::from_secs(6);
        queue.enqueue(stale);

        // Re-key happens on inspection; force it before the refinement lands
        assert_eq!(queue.len(), 1);
        queue.inner.lock().rekey_expired();

        queue.enqueue(
            Command::new(CommandKind::WeatherRequest, "instead").with_priority(Priority::Refinement),
        );

        // The expired entry left the pending set, so it survives the purge
        // and is delivered after the refinement.
        assert_eq!(queue.try_dequeue().unwrap().kind, CommandKind::WeatherRequest);
        let expired = queue.try_dequeue().unwrap();
        assert_eq!(expired.kind, CommandKind::NewsRequest);
        assert_eq!(expired.priority, Priority::Expired);
    }

    #[test]
    fn test_aged_command_rekeyed_at_dequeue() {
        let queue = CommandQueue::new();

        let mut stale = Command::new(CommandKind::NewsRequest, "stale");
        stale.created_at = Instant::now() - Duration::from_secs(6);
        queue.enqueue(stale);
        queue.enqueue(Command::new(CommandKind::WeatherRequest, "fresh"));

        // Fresh Normal entry outranks the re-keyed Expired one despite the
        // later enqueue.
        assert_eq!(queue.try_dequeue().unwrap().origin_text, "fresh");
        assert_eq!(queue.try_dequeue().unwrap().priority, Priority::Expired);
    }

    #[tokio::test]
    async fn test_dequeue_timeout_returns_none() {
        let queue = CommandQueue::new();
        let start = Instant::now();
        let result = queue.dequeue(Duration::from_millis(10)).await;
        assert!(result.is_none());
        // Bounded: did not block indefinitely
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let queue = std::sync::Arc::new(CommandQueue::new());

        let producer = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            producer.enqueue(Command::new(CommandKind::NewsRequest, "late arrival"));
        });

        let cmd = queue.dequeue(Duration::from_millis(500)).await;
        assert_eq!(cmd.unwrap().kind, CommandKind::NewsRequest);
    }
}
