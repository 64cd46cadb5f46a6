//! Packet queue bridging the dispatch loop and the audio callback
//!
//! The dispatch thread pushes compressed audio packets while the audio device
//! thread pops them on demand. A single mutex guards the FIFO and its
//! counters; a condition variable paired with that mutex wakes a consumer
//! blocked on an empty queue.
//!
//! The queue assumes a single consumer. With several consumers every packet
//! is still handed out exactly once, but the wake-up order between them is
//! unspecified.

use std::collections::TryReserveError;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use thiserror::Error;

use super::types::Packet;

/// Errors returned by [`PacketQueue::put`]
#[derive(Debug, Error)]
pub enum QueueError {
    /// The packet payload or its queue slot could not be allocated
    #[error("failed to allocate {bytes} bytes for queued packet")]
    Allocation {
        bytes: usize,
        #[source]
        source: TryReserveError,
    },
}

struct QueueState {
    packets: VecDeque<Packet>,
    /// Sum of payload sizes of all queued packets
    size: usize,
    /// Set on teardown; consumers stop waiting once the queue is drained
    closed: bool,
}

/// Thread-safe FIFO of compressed packets with blocking dequeue
pub struct PacketQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl PacketQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                packets: VecDeque::new(),
                size: 0,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    // a panic on the other side must not wedge the audio thread
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a packet, taking ownership of it
    ///
    /// The payload is copied first if its storage is shared with the caller,
    /// so reuse of the caller's buffer can never alter a queued packet.
    pub fn put(&self, mut packet: Packet) -> Result<(), QueueError> {
        packet.data = detach(packet.data)?;
        let bytes = packet.size();

        let mut state = self.lock();
        state
            .packets
            .try_reserve(1)
            .map_err(|source| QueueError::Allocation {
                bytes: std::mem::size_of::<Packet>(),
                source,
            })?;
        state.packets.push_back(packet);
        state.size += bytes;

        self.available.notify_one();
        Ok(())
    }

    /// Remove the oldest packet
    ///
    /// Without `block`, returns `None` as soon as the queue is empty. With
    /// `block`, waits until a packet arrives; `None` then means the queue was
    /// closed and fully drained.
    pub fn get(&self, block: bool) -> Option<Packet> {
        let mut state = self.lock();

        loop {
            if let Some(packet) = state.packets.pop_front() {
                state.size -= packet.size();
                return Some(packet);
            }

            if !block || state.closed {
                return None;
            }

            // a wake-up does not guarantee a packet, re-test after waiting
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Stop accepting waits: wake every blocked consumer
    ///
    /// Packets already queued remain retrievable.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.available.notify_all();
    }

    /// Check whether the queue has been closed
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of queued packets
    pub fn len(&self) -> usize {
        self.lock().packets.len()
    }

    /// Check whether the queue holds no packets
    pub fn is_empty(&self) -> bool {
        self.lock().packets.is_empty()
    }

    /// Total payload bytes currently queued
    pub fn size(&self) -> usize {
        self.lock().size
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PacketQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("PacketQueue")
            .field("nb_packets", &state.packets.len())
            .field("size", &state.size)
            .field("closed", &state.closed)
            .finish()
    }
}

/// Make sure no one else holds a reference to the payload storage
fn detach(data: Bytes) -> Result<Bytes, QueueError> {
    match data.try_into_mut() {
        Ok(unique) => Ok(unique.freeze()),
        Err(shared) => {
            let mut owned = Vec::new();
            owned
                .try_reserve_exact(shared.len())
                .map_err(|source| QueueError::Allocation {
                    bytes: shared.len(),
                    source,
                })?;
            owned.extend_from_slice(&shared);
            Ok(Bytes::from(owned))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn packet(stream_index: usize, size: usize, fill: u8) -> Packet {
        Packet::new(stream_index, Bytes::from(vec![fill; size]))
    }

    #[test]
    fn test_fifo_counts_and_sizes() {
        let queue = PacketQueue::new();
        queue.put(packet(1, 100, 1)).unwrap();
        queue.put(packet(1, 200, 2)).unwrap();
        queue.put(packet(1, 50, 3)).unwrap();

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.size(), 350);

        let first = queue.get(false).unwrap();
        assert_eq!(first.data[0], 1);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.size(), 250);

        let second = queue.get(false).unwrap();
        assert_eq!(second.data[0], 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.size(), 50);

        let third = queue.get(false).unwrap();
        assert_eq!(third.data[0], 3);
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.size(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_non_blocking_get_on_empty() {
        let queue = PacketQueue::new();
        assert!(queue.get(false).is_none());
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn test_order_preserved_for_many_packets() {
        let queue = PacketQueue::new();
        for i in 0..64u8 {
            queue.put(packet(0, i as usize + 1, i)).unwrap();
        }

        let mut expected_size: usize = (1..=64).sum();
        for i in 0..64u8 {
            let p = queue.get(false).unwrap();
            assert_eq!(p.data[0], i);
            expected_size -= p.size();
            assert_eq!(queue.size(), expected_size);
        }
    }

    #[test]
    fn test_put_copies_shared_payload() {
        let queue = PacketQueue::new();
        let shared = Bytes::from(vec![7u8; 32]);
        let caller_copy = shared.clone();

        queue.put(Packet::new(0, shared)).unwrap();
        let queued = queue.get(false).unwrap();

        assert_eq!(queued.data, caller_copy);
        assert_ne!(queued.data.as_ptr(), caller_copy.as_ptr());
    }

    #[test]
    fn test_blocking_get_wakes_on_put() {
        let queue = Arc::new(PacketQueue::new());
        let consumer_queue = queue.clone();
        let (tx, rx) = mpsc::channel();

        let consumer = thread::spawn(move || {
            let p = consumer_queue.get(true);
            tx.send(p.map(|p| p.size())).unwrap();
        });

        // consumer should still be waiting
        thread::sleep(Duration::from_millis(50));
        assert!(rx.try_recv().is_err());

        queue.put(packet(0, 42, 0)).unwrap();
        let received = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(received, Some(42));
        consumer.join().unwrap();
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn test_close_releases_blocked_consumer() {
        let queue = Arc::new(PacketQueue::new());
        let consumer_queue = queue.clone();
        let (tx, rx) = mpsc::channel();

        let consumer = thread::spawn(move || {
            tx.send(consumer_queue.get(true).is_none()).unwrap();
        });

        thread::sleep(Duration::from_millis(20));
        queue.close();

        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        consumer.join().unwrap();
    }

    #[test]
    fn test_closed_queue_drains_before_reporting_end() {
        let queue = PacketQueue::new();
        queue.put(packet(0, 10, 1)).unwrap();
        queue.put(packet(0, 20, 2)).unwrap();
        queue.close();

        assert!(queue.is_closed());
        assert_eq!(queue.get(true).unwrap().size(), 10);
        assert_eq!(queue.get(true).unwrap().size(), 20);
        assert!(queue.get(true).is_none());
    }

    #[test]
    fn test_single_consumer_sees_every_packet_once() {
        let queue = Arc::new(PacketQueue::new());
        let producer_queue = queue.clone();

        let producer = thread::spawn(move || {
            for i in 0..500u32 {
                let data = Bytes::from(i.to_le_bytes().to_vec());
                producer_queue.put(Packet::new(0, data)).unwrap();
                if i % 50 == 0 {
                    thread::sleep(Duration::from_micros(200));
                }
            }
            producer_queue.close();
        });

        let mut seen = Vec::new();
        while let Some(p) = queue.get(true) {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&p.data);
            seen.push(u32::from_le_bytes(raw));
        }
        producer.join().unwrap();

        assert_eq!(seen, (0..500).collect::<Vec<_>>());
        assert_eq!(queue.size(), 0);
    }
}
