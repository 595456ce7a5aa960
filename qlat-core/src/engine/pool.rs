use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Per-connection arena of request slots.
///
/// A slot holds the request's start timestamp (+1, so that 0 means "free").
/// [`RequestPool::take`] swaps the stamp out, which makes consuming a request
/// exactly-once even if the transport reports a stream twice or a forced close
/// races a completion.
#[derive(Debug)]
pub(crate) struct RequestPool {
    starts: Box<[AtomicU64]>,
    free: Mutex<Vec<u32>>,
}

impl RequestPool {
    pub(crate) fn new(size: u32) -> Self {
        Self {
            starts: (0..size).map(|_| AtomicU64::new(0)).collect(),
            // Popped from the back, so hand out low slots first.
            free: Mutex::new((0..size).rev().collect()),
        }
    }

    pub(crate) fn acquire(&self) -> Option<u32> {
        self.free.lock().pop()
    }

    pub(crate) fn stamp(&self, slot: u32, start_ns: u64) {
        if let Some(s) = self.starts.get(slot as usize) {
            s.store(start_ns.saturating_add(1), Ordering::Release);
        }
    }

    /// Consumes the slot's start timestamp. `None` if it was already taken.
    pub(crate) fn take(&self, slot: u32) -> Option<u64> {
        let stamped = self.starts.get(slot as usize)?.swap(0, Ordering::AcqRel);
        stamped.checked_sub(1)
    }

    pub(crate) fn release(&self, slot: u32) {
        if (slot as usize) < self.starts.len() {
            self.free.lock().push(slot);
        }
    }

    /// Drops every in-flight request and returns how many were dropped.
    pub(crate) fn reset(&self) -> u32 {
        let mut dropped = 0;
        let mut free = self.free.lock();
        for (idx, s) in self.starts.iter().enumerate() {
            if s.swap(0, Ordering::AcqRel) != 0 {
                dropped += 1;
                free.push(idx as u32);
            }
        }
        dropped
    }

    #[cfg(test)]
    pub(crate) fn available(&self) -> usize {
        self.free.lock().len()
    }
}
