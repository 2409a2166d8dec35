//! Byte-buffer recycling for the relay core.
//!
//! Two pool shapes are needed: a **fixed** pool whose buffers are always
//! exactly the configured capacity (the plain, non-TLS path, where
//! `applicationBufferSize` never changes), and an **expanding** pool whose
//! capacity is a single, monotonically non-decreasing value shared by every
//! buffer it hands out (the TLS path, where a handshake can raise
//! `applicationBufferSize`/`packetBufferSize` mid-connection).
//!
//! Both pools are process-wide singletons, initialized once at service
//! start (see [`init`]) and read from every reactor thread thereafter.

use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

/// A growable, cursor-tracked byte buffer.
///
/// Bytes accumulate at the tail (`advance_write`) and are drained from the
/// head (`advance_read`); `compact` slides any unread remainder back to
/// offset zero so a socket read can fill the rest of the capacity.
#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    start: usize,
    end: usize,
}

impl Buffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            start: 0,
            end: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes written but not yet read.
    pub fn remaining(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The unread portion of the buffer.
    pub fn readable(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    /// The writable tail of the buffer, i.e. space not yet filled.
    pub fn writable_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.end..]
    }

    pub fn writable_len(&self) -> usize {
        self.data.len() - self.end
    }

    pub fn advance_write(&mut self, n: usize) {
        self.end += n;
        debug_assert!(self.end <= self.data.len());
    }

    pub fn advance_read(&mut self, n: usize) {
        self.start += n;
        debug_assert!(self.start <= self.end);
        if self.start == self.end {
            self.clear();
        }
    }

    /// Append bytes directly (used when copying a partial chunk into a
    /// freshly borrowed, larger buffer on `BUFFER_OVERFLOW`/`UNDERFLOW`).
    pub fn put(&mut self, bytes: &[u8]) {
        let len = bytes.len();
        self.data[self.end..self.end + len].copy_from_slice(bytes);
        self.end += len;
    }

    /// Slide any unread remainder to offset zero, freeing tail space.
    pub fn compact(&mut self) {
        if self.start > 0 {
            self.data.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
    }

    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    /// Grow the backing storage in place, preserving unread content.
    pub fn grow_to(&mut self, new_capacity: usize) {
        if new_capacity > self.data.len() {
            self.data.resize(new_capacity, 0);
        }
    }
}

/// Fixed-capacity pool: every buffer handed out is exactly `capacity`
/// bytes; buffers of any other capacity are dropped instead of recycled.
pub struct FixedBufferPool {
    capacity: usize,
    free: Mutex<Vec<Buffer>>,
}

impl FixedBufferPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            free: Mutex::new(Vec::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn borrow(&self) -> Buffer {
        if let Some(buf) = self.free.lock().pop() {
            return buf;
        }
        Buffer::with_capacity(self.capacity)
    }

    pub fn recycle(&self, mut buf: Buffer) {
        if buf.capacity() != self.capacity {
            return; // wrong-capacity buffers are silently dropped
        }
        buf.clear();
        self.free.lock().push(buf);
    }
}

/// Expanding pool: all buffers share one non-decreasing capacity `C`.
/// Raising `C` discards every buffer currently queued, since they are now
/// undersized.
pub struct ExpandingBufferPool {
    capacity: AtomicUsize,
    free: Mutex<Vec<Buffer>>,
}

impl ExpandingBufferPool {
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            capacity: AtomicUsize::new(initial_capacity),
            free: Mutex::new(Vec::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// Raise `C` to at least `n`; a no-op if `n` does not exceed the
    /// current capacity. Queued buffers are discarded on a real raise.
    pub fn use_buffer_size(&self, n: usize) {
        let prev = self.capacity.fetch_max(n, Ordering::AcqRel);
        if n > prev {
            self.free.lock().clear();
        }
    }

    pub fn borrow(&self) -> Buffer {
        let cap = self.capacity();
        let mut free = self.free.lock();
        while let Some(buf) = free.pop() {
            if buf.capacity() >= cap {
                return buf;
            }
            // smaller than current capacity: discard and keep looking
        }
        Buffer::with_capacity(cap)
    }

    pub fn recycle(&self, mut buf: Buffer) {
        let cap = self.capacity();
        if buf.capacity() < cap {
            return; // undersized, discard
        }
        buf.clear();
        self.free.lock().push(buf);
    }
}

static FIXED_POOL: OnceCell<FixedBufferPool> = OnceCell::new();
static EXPANDING_POOL: OnceCell<ExpandingBufferPool> = OnceCell::new();

/// Initialize the two process-wide pools. Called once by the Service
/// Facade at startup; subsequent calls are no-ops.
pub fn init(fixed_capacity: usize, expanding_initial_capacity: usize) {
    let _ = FIXED_POOL.set(FixedBufferPool::new(fixed_capacity));
    let _ = EXPANDING_POOL.set(ExpandingBufferPool::new(expanding_initial_capacity));
}

pub fn fixed_pool() -> &'static FixedBufferPool {
    FIXED_POOL
        .get()
        .expect("relay::buffer_pool::init was not called at startup")
}

pub fn expanding_pool() -> &'static ExpandingBufferPool {
    EXPANDING_POOL
        .get()
        .expect("relay::buffer_pool::init was not called at startup")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_pool_recycles_matching_capacity() {
        let pool = FixedBufferPool::new(128);
        let mut buf = pool.borrow();
        assert_eq!(buf.capacity(), 128);
        buf.put(b"hello");
        pool.recycle(buf);

        let buf2 = pool.borrow();
        assert!(buf2.is_empty(), "recycled buffer must be cleared");
        assert_eq!(buf2.capacity(), 128);
    }

    #[test]
    fn fixed_pool_drops_wrong_capacity() {
        let pool = FixedBufferPool::new(128);
        let oversized = Buffer::with_capacity(256);
        pool.recycle(oversized);
        let buf = pool.borrow();
        // since nothing of the right capacity was queued, a fresh one is made
        assert_eq!(buf.capacity(), 128);
    }

    #[test]
    fn expanding_pool_grows_monotonically_and_discards_small_buffers() {
        let pool = ExpandingBufferPool::new(64);
        let small = pool.borrow();
        pool.recycle(small);
        assert_eq!(pool.capacity(), 64);

        pool.use_buffer_size(32); // smaller, no-op
        assert_eq!(pool.capacity(), 64);

        pool.use_buffer_size(256);
        assert_eq!(pool.capacity(), 256);

        let buf = pool.borrow();
        assert_eq!(buf.capacity(), 256, "stale 64-byte buffer must not be reused");
    }

    #[test]
    fn buffer_compact_slides_unread_remainder() {
        let mut buf = Buffer::with_capacity(16);
        buf.put(b"abcdefgh");
        buf.advance_read(4); // "abcd" consumed
        buf.compact();
        assert_eq!(buf.readable(), b"efgh");
        assert_eq!(buf.writable_len(), 12);
    }
}
