//! The dual-buffer render/output handoff (spec §5 "BufferPool", invariants
//! I4 "exactly one writer and one reader per buffer at a time" and I5
//! "frames leave in the order they were rendered").
//!
//! Grounded on the explicit acquire/release buffer-handle API shape, with
//! a Drop-based safety net (inspired by a race-free guard-handle idiom
//! seen elsewhere in the pack) so a leased buffer is never stranded if a
//! worker bails out early.

use std::cell::UnsafeCell;
use std::sync::{Condvar, Mutex};
use std::time::Duration as StdDuration;

use pov_common::time::Instant;

use crate::render_context::RenderContext;

const BUFFER_COUNT: usize = 2;

struct Signal {
    flag: Mutex<bool>,
    cvar: Condvar,
}

impl Signal {
    fn new(initial: bool) -> Self {
        Self { flag: Mutex::new(initial), cvar: Condvar::new() }
    }

    fn set(&self, value: bool) {
        *self.flag.lock().unwrap() = value;
        self.cvar.notify_all();
    }

    /// Wait until the flag is `true` or `timeout` elapses, then consume it
    /// back to `false`. Returns `true` iff it was actually claimed.
    fn wait_and_claim(&self, timeout: StdDuration) -> bool {
        let guard = self.flag.lock().unwrap();
        let (mut guard, _) = self.cvar.wait_timeout_while(guard, timeout, |ready| !*ready).unwrap();
        if *guard {
            *guard = false;
            true
        } else {
            false
        }
    }
}

/// Exactly two [`RenderContext`] slots handed back and forth between a
/// render worker and an output worker (spec §5 "dual-buffer pipeline").
pub struct BufferPool {
    buffers: [UnsafeCell<RenderContext>; BUFFER_COUNT],
    free: [Signal; BUFFER_COUNT],
    ready: [Signal; BUFFER_COUNT],
    target_t: [Mutex<Option<Instant>>; BUFFER_COUNT],
    next_write: Mutex<usize>,
    next_read: Mutex<usize>,
}

// SAFETY: access to each `UnsafeCell<RenderContext>` is serialized by the
// `free`/`ready` signal pair for that index — at most one lease (write or
// read) exists per buffer at a time (invariant I4).
unsafe impl Sync for BufferPool {}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            buffers: [UnsafeCell::new(RenderContext::new()), UnsafeCell::new(RenderContext::new())],
            free: [Signal::new(true), Signal::new(true)],
            ready: [Signal::new(false), Signal::new(false)],
            target_t: [Mutex::new(None), Mutex::new(None)],
            next_write: Mutex::new(0),
            next_read: Mutex::new(0),
        }
    }

    /// Claim the next buffer in round-robin order for rendering, blocking
    /// up to `timeout` for it to become free (spec §5
    /// "acquireWriteBuffer"). Returns `None` on timeout.
    pub fn acquire_write(&self, timeout: StdDuration) -> Option<WriteLease<'_>> {
        let index = {
            let mut next = self.next_write.lock().unwrap();
            let index = *next;
            *next = (*next + 1) % BUFFER_COUNT;
            index
        };
        if !self.free[index].wait_and_claim(timeout) {
            return None;
        }
        Some(WriteLease { pool: self, index, released: false })
    }

    /// Claim the next buffer in round-robin order for output, blocking up
    /// to `timeout` for it to become ready (spec §5 "acquireReadBuffer").
    /// Returns `None` on timeout. Round-robin read order mirrors the write
    /// order, preserving FIFO frame delivery (invariant I5).
    pub fn acquire_read(&self, timeout: StdDuration) -> Option<ReadLease<'_>> {
        let index = {
            let mut next = self.next_read.lock().unwrap();
            let index = *next;
            *next = (*next + 1) % BUFFER_COUNT;
            index
        };
        if !self.ready[index].wait_and_claim(timeout) {
            return None;
        }
        let target_t = self.target_t[index].lock().unwrap().take().unwrap_or(Instant::ZERO);
        Some(ReadLease { pool: self, index, target_t, released: false })
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// An exclusive render handle on one buffer. Must be released with
/// [`WriteLease::release`] to hand the frame to the output side; dropping
/// without releasing returns the buffer to the free pool instead of
/// leaking it, but the frame is lost (spec §5 "a write that never
/// releases must not deadlock the pool").
pub struct WriteLease<'a> {
    pool: &'a BufferPool,
    index: usize,
    released: bool,
}

impl<'a> WriteLease<'a> {
    pub fn context_mut(&mut self) -> &mut RenderContext {
        // SAFETY: this lease is the only holder of `free[index] == false`
        // for this index until `release` or `Drop` runs.
        unsafe { &mut *self.pool.buffers[self.index].get() }
    }

    /// Hand the rendered frame to the output side, tagged with its
    /// absolute fire time (spec §5 "releaseWriteBuffer(handle, targetTime)").
    pub fn release(mut self, target_t: Instant) {
        self.released = true;
        *self.pool.target_t[self.index].lock().unwrap() = Some(target_t);
        self.pool.ready[self.index].set(true);
    }
}

impl<'a> Drop for WriteLease<'a> {
    fn drop(&mut self) {
        if !self.released {
            self.pool.free[self.index].set(true);
        }
    }
}

/// An exclusive output handle on one buffer, carrying the absolute time
/// the frame should fire at.
pub struct ReadLease<'a> {
    pool: &'a BufferPool,
    index: usize,
    pub target_t: Instant,
    released: bool,
}

impl<'a> ReadLease<'a> {
    pub fn context(&self) -> &RenderContext {
        // SAFETY: see `WriteLease::context_mut`; symmetric for the read side.
        unsafe { &*self.pool.buffers[self.index].get() }
    }

    /// Return the buffer to the free pool (spec §5 "releaseReadBuffer").
    pub fn release(mut self) {
        self.released = true;
        self.pool.free[self.index].set(true);
    }
}

impl<'a> Drop for ReadLease<'a> {
    fn drop(&mut self) {
        if !self.released {
            self.pool.free[self.index].set(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn write_then_read_round_trip() {
        let pool = BufferPool::new();
        let mut write = pool.acquire_write(StdDuration::from_millis(10)).unwrap();
        write.context_mut().set_virtual(0, (5, 6, 7));
        write.release(Instant::from_micros(123));

        let read = pool.acquire_read(StdDuration::from_millis(10)).unwrap();
        assert_eq!(read.target_t, Instant::from_micros(123));
        assert_eq!(read.context().arm0()[0], (5, 6, 7));
        read.release();
    }

    #[test]
    fn both_buffers_can_be_in_flight_at_once() {
        let pool = BufferPool::new();
        let w0 = pool.acquire_write(StdDuration::from_millis(10)).unwrap();
        let w1 = pool.acquire_write(StdDuration::from_millis(10)).unwrap();
        // A third immediate acquire must time out: both buffers are taken.
        assert!(pool.acquire_write(StdDuration::from_millis(5)).is_none());
        w0.release(Instant::from_micros(1));
        w1.release(Instant::from_micros(2));
    }

    #[test]
    fn read_order_matches_write_order() {
        let pool = BufferPool::new();
        let w0 = pool.acquire_write(StdDuration::from_millis(10)).unwrap();
        w0.release(Instant::from_micros(111));
        let w1 = pool.acquire_write(StdDuration::from_millis(10)).unwrap();
        w1.release(Instant::from_micros(222));

        let r0 = pool.acquire_read(StdDuration::from_millis(10)).unwrap();
        assert_eq!(r0.target_t, Instant::from_micros(111));
        r0.release();
        let r1 = pool.acquire_read(StdDuration::from_millis(10)).unwrap();
        assert_eq!(r1.target_t, Instant::from_micros(222));
        r1.release();
    }

    #[test]
    fn dropped_write_lease_returns_buffer_to_free_pool() {
        let pool = BufferPool::new();
        {
            let _w = pool.acquire_write(StdDuration::from_millis(10)).unwrap();
            // dropped without release
        }
        assert!(pool.acquire_write(StdDuration::from_millis(10)).is_some());
    }

    #[test]
    fn acquire_read_times_out_when_nothing_ready() {
        let pool = BufferPool::new();
        assert!(pool.acquire_read(StdDuration::from_millis(5)).is_none());
    }

    #[test]
    fn concurrent_writer_and_reader_hand_off() {
        let pool = Arc::new(BufferPool::new());
        let writer_pool = pool.clone();
        let writer = thread::spawn(move || {
            for i in 0..4u64 {
                let mut w = writer_pool.acquire_write(StdDuration::from_secs(1)).unwrap();
                w.context_mut().set_virtual(0, (i as u8, 0, 0));
                w.release(Instant::from_micros(i));
            }
        });
        let mut seen = Vec::new();
        for _ in 0..4 {
            let r = pool.acquire_read(StdDuration::from_secs(1)).unwrap();
            seen.push(r.context().arm0()[0].0);
            r.release();
        }
        writer.join().unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }
}
