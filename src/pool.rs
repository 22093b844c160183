//! Fixed-count packet buffer pools
//!
//! Every pool is pre-filled at construction: allocation is a lock-free pop,
//! release is a push plus a wakeup for any receive path waiting on the pool.
//! Buffers return themselves on drop, so the upper layer releases a packet
//! simply by letting it go out of scope.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use crossbeam_queue::ArrayQueue;
use tokio::sync::Notify;
use tracing::trace;

#[derive(Debug)]
struct PoolShared {
    free: ArrayQueue<BytesMut>,
    buf_size: usize,
    capacity: usize,
    in_use: AtomicUsize,
    released: Notify,
}

/// A pool handing out a fixed number of fixed-size buffers.
#[derive(Debug, Clone)]
pub struct PacketPool {
    shared: Arc<PoolShared>,
}

impl PacketPool {
    /// Create a pool holding `count` buffers of `buf_size` bytes each.
    ///
    /// A zero-count pool is legal and simply never grants; discardable
    /// traffic configured that way is dropped outright.
    pub fn new(count: usize, buf_size: usize) -> Self {
        let free = ArrayQueue::new(count.max(1));
        for _ in 0..count {
            let _ = free.push(BytesMut::with_capacity(buf_size));
        }

        Self {
            shared: Arc::new(PoolShared {
                free,
                buf_size,
                capacity: count,
                in_use: AtomicUsize::new(0),
                released: Notify::new(),
            }),
        }
    }

    /// Take a buffer if one is free. Never blocks.
    pub fn try_alloc(&self) -> Option<PacketBuf> {
        let data = self.shared.free.pop()?;
        self.shared.in_use.fetch_add(1, Ordering::Relaxed);

        Some(PacketBuf {
            data: Some(data),
            origin: Some(Arc::clone(&self.shared)),
        })
    }

    /// A token that resolves once any buffer returns to this pool.
    pub fn retry_token(&self) -> RetryToken {
        RetryToken {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Total buffers the pool was created with.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Buffers currently held by allocations.
    pub fn in_use(&self) -> usize {
        self.shared.in_use.load(Ordering::Relaxed)
    }

    /// Byte size of each buffer in the pool.
    pub fn buf_size(&self) -> usize {
        self.shared.buf_size
    }
}

/// Waits for a release on the pool that was exhausted.
///
/// A release that fires before the wait begins is not lost: the underlying
/// notification stores one permit.
#[derive(Debug)]
pub struct RetryToken {
    shared: Arc<PoolShared>,
}

impl RetryToken {
    /// Suspend until a buffer has been returned to the pool. The caller must
    /// then re-invoke allocation; another taker may have won the race.
    pub async fn released(self) {
        self.shared.released.notified().await;
    }
}

/// A buffer granted from a [`PacketPool`], or a detached one-off.
///
/// Pooled buffers go back to their pool on drop and wake one waiter.
#[derive(Debug)]
pub struct PacketBuf {
    data: Option<BytesMut>,
    origin: Option<Arc<PoolShared>>,
}

impl PacketBuf {
    /// A buffer owned by no pool. Used for the pre-reserved command-response
    /// slot, whose lifetime is managed by the command sender.
    pub fn detached(capacity: usize) -> Self {
        Self {
            data: Some(BytesMut::with_capacity(capacity)),
            origin: None,
        }
    }

    fn data(&self) -> &BytesMut {
        self.data.as_ref().expect("buffer present until drop")
    }

    fn data_mut(&mut self) -> &mut BytesMut {
        self.data.as_mut().expect("buffer present until drop")
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// True when no bytes have been written.
    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }

    /// Append bytes to the packet.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data_mut().extend_from_slice(bytes);
    }

    /// Grow the packet by `extra` bytes and return that tail region for a
    /// read to fill in place.
    pub fn tail_mut(&mut self, extra: usize) -> &mut [u8] {
        let data = self.data_mut();
        let start = data.len();
        data.resize(start + extra, 0);
        &mut data[start..]
    }

    /// Drop any written bytes, keeping the buffer's storage.
    pub fn clear(&mut self) {
        self.data_mut().clear();
    }
}

impl Deref for PacketBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data()
    }
}

impl DerefMut for PacketBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data_mut()
    }
}

impl AsRef<[u8]> for PacketBuf {
    fn as_ref(&self) -> &[u8] {
        self.data()
    }
}

impl Drop for PacketBuf {
    fn drop(&mut self) {
        let (Some(mut data), Some(origin)) = (self.data.take(), self.origin.take()) else {
            return;
        };

        data.clear();
        // Push cannot fail: the queue is sized for every buffer the pool owns.
        let _ = origin.free.push(data);
        origin.in_use.fetch_sub(1, Ordering::Relaxed);
        origin.released.notify_one();
        trace!(in_use = origin.in_use.load(Ordering::Relaxed), "pool buffer released");
    }
}

/// Single-slot store for the command-response buffer.
///
/// The command sender deposits a pre-reserved buffer here before the command
/// goes on the wire; the first Command Complete / Command Status with a
/// non-zero opcode takes it. This makes response allocation impossible to
/// exhaust while a command is in flight.
#[derive(Debug, Default)]
pub struct CommandSlot {
    slot: Mutex<Option<PacketBuf>>,
}

impl CommandSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the slot. A stale buffer from an abandoned command is replaced
    /// and returns to wherever it came from.
    pub fn deposit(&self, buf: PacketBuf) {
        let mut slot = self.slot.lock().expect("command slot lock");
        *slot = Some(buf);
    }

    /// Take the reserved buffer, leaving the slot empty.
    pub fn take(&self) -> Option<PacketBuf> {
        self.slot.lock().expect("command slot lock").take()
    }

    /// True while a response buffer is reserved.
    pub fn is_armed(&self) -> bool {
        self.slot.lock().expect("command slot lock").is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_grants_until_exhausted() {
        let pool = PacketPool::new(2, 64);
        assert_eq!(pool.capacity(), 2);

        let a = pool.try_alloc().unwrap();
        let b = pool.try_alloc().unwrap();
        assert_eq!(pool.in_use(), 2);
        assert!(pool.try_alloc().is_none());

        drop(a);
        assert_eq!(pool.in_use(), 1);
        let _c = pool.try_alloc().unwrap();

        drop(b);
        assert_eq!(pool.in_use(), 1);
    }

    #[test]
    fn zero_count_pool_never_grants() {
        let pool = PacketPool::new(0, 64);
        assert!(pool.try_alloc().is_none());
        assert_eq!(pool.capacity(), 0);
    }

    #[test]
    fn buffer_tail_fills_in_place() {
        let pool = PacketPool::new(1, 64);
        let mut buf = pool.try_alloc().unwrap();

        buf.extend_from_slice(&[1, 2, 3]);
        let tail = buf.tail_mut(2);
        tail.copy_from_slice(&[4, 5]);

        assert_eq!(&buf[..], &[1, 2, 3, 4, 5]);
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn released_buffer_comes_back_empty() {
        let pool = PacketPool::new(1, 64);
        {
            let mut buf = pool.try_alloc().unwrap();
            buf.extend_from_slice(b"stale");
        }
        let buf = pool.try_alloc().unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn detached_buffers_skip_the_pool() {
        let pool = PacketPool::new(1, 64);
        let _held = pool.try_alloc().unwrap();

        let mut detached = PacketBuf::detached(32);
        detached.extend_from_slice(b"cmd");
        drop(detached);

        // Dropping a detached buffer must not refill the pool.
        assert!(pool.try_alloc().is_none());
    }

    #[test]
    fn command_slot_round_trip() {
        let slot = CommandSlot::new();
        assert!(!slot.is_armed());
        assert!(slot.take().is_none());

        slot.deposit(PacketBuf::detached(16));
        assert!(slot.is_armed());
        assert!(slot.take().is_some());
        assert!(!slot.is_armed());
    }

    #[tokio::test]
    async fn retry_token_wakes_on_release() {
        let pool = PacketPool::new(1, 64);
        let held = pool.try_alloc().unwrap();
        assert!(pool.try_alloc().is_none());

        let token = pool.retry_token();
        drop(held);

        // The release happened before the wait; the stored permit resolves it.
        token.released().await;
        assert!(pool.try_alloc().is_some());
    }
}
