//! Reusable packet buffers.
//!
//! Buffers are grouped by power-of-two size class. Large buffers are
//! handed back like any other, but [`BufferPool::trim`] drops every retained
//! buffer above [`LARGE_BUFFER_THRESHOLD`] so a single huge result does not
//! pin memory for the life of the session.

use std::collections::BTreeMap;

/// Retained buffers larger than this are released by `trim`.
pub const LARGE_BUFFER_THRESHOLD: usize = 1024 * 1024;

/// Smallest size class handed out.
const MIN_CLASS: usize = 256;

/// Buffers kept per size class.
const MAX_PER_CLASS: usize = 4;

/// Pool statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferPoolStats {
    /// Buffers currently retained
    pub retained: usize,
    /// Sum of retained capacities in bytes
    pub retained_bytes: usize,
    /// Acquires served from a retained buffer
    pub reused: u64,
    /// Acquires that had to allocate
    pub allocated: u64,
}

#[derive(Debug, Default)]
pub struct BufferPool {
    classes: BTreeMap<usize, Vec<Vec<u8>>>,
    reused: u64,
    allocated: u64,
}

fn size_class(len: usize) -> usize {
    len.max(MIN_CLASS).next_power_of_two()
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take an empty buffer with at least `min_capacity` bytes of capacity.
    pub fn acquire(&mut self, min_capacity: usize) -> Vec<u8> {
        let wanted = size_class(min_capacity);
        let found = self
            .classes
            .range_mut(wanted..)
            .find_map(|(_, bufs)| bufs.pop());
        match found {
            Some(mut buf) => {
                buf.clear();
                self.reused += 1;
                buf
            }
            None => {
                self.allocated += 1;
                Vec::with_capacity(wanted)
            }
        }
    }

    /// Return a buffer for reuse.
    pub fn release(&mut self, buf: Vec<u8>) {
        let capacity = buf.capacity();
        if capacity < MIN_CLASS {
            return;
        }
        // Classify by the largest class the buffer fully covers.
        let class = if capacity.is_power_of_two() {
            capacity
        } else {
            capacity.next_power_of_two() / 2
        };
        let slot = self.classes.entry(class).or_default();
        if slot.len() < MAX_PER_CLASS {
            slot.push(buf);
        }
    }

    /// Drop retained buffers larger than 1 MiB.
    pub fn trim(&mut self) {
        let large = self.classes.split_off(&(LARGE_BUFFER_THRESHOLD + 1));
        if !large.is_empty() {
            let freed: usize = large
                .values()
                .flat_map(|bufs| bufs.iter().map(Vec::capacity))
                .sum();
            tracing::debug!(freed_bytes = freed, "trimmed large packet buffers");
        }
    }

    pub fn stats(&self) -> BufferPoolStats {
        let (retained, retained_bytes) = self
            .classes
            .values()
            .flatten()
            .fold((0, 0), |(n, bytes), buf| (n + 1, bytes + buf.capacity()));
        BufferPoolStats {
            retained,
            retained_bytes,
            reused: self.reused,
            allocated: self.allocated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_reuses_released_buffer() {
        let mut pool = BufferPool::new();
        let mut buf = pool.acquire(1000);
        assert!(buf.capacity() >= 1000);
        buf.extend_from_slice(b"stale");
        pool.release(buf);

        let again = pool.acquire(800);
        assert!(again.is_empty());
        assert!(again.capacity() >= 800);
        let stats = pool.stats();
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.allocated, 1);
    }

    #[test]
    fn test_small_request_can_use_larger_class() {
        let mut pool = BufferPool::new();
        pool.release(Vec::with_capacity(4096));
        let buf = pool.acquire(10);
        assert!(buf.capacity() >= 4096);
        assert_eq!(pool.stats().retained, 0);
    }

    #[test]
    fn test_trim_drops_only_large_buffers() {
        let mut pool = BufferPool::new();
        pool.release(Vec::with_capacity(4096));
        pool.release(Vec::with_capacity(LARGE_BUFFER_THRESHOLD));
        pool.release(Vec::with_capacity(4 * LARGE_BUFFER_THRESHOLD));
        assert_eq!(pool.stats().retained, 3);

        pool.trim();
        let stats = pool.stats();
        assert_eq!(stats.retained, 2);
        assert!(stats.retained_bytes <= LARGE_BUFFER_THRESHOLD + 8192);
    }

    #[test]
    fn test_per_class_limit() {
        let mut pool = BufferPool::new();
        for _ in 0..10 {
            pool.release(Vec::with_capacity(512));
        }
        assert_eq!(pool.stats().retained, MAX_PER_CLASS);
    }
}
