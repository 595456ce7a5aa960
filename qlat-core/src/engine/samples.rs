use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Slots hold `micros + 1`; zero marks a slot that was claimed but not written.
const EMPTY: u32 = 0;
const MAX_MICROS: u32 = u32::MAX - 1;

/// Slots per lazily allocated chunk (256 KiB).
const CHUNK_SLOTS: usize = 64 * 1024;

/// Outcome of [`LatencySampleStore::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Stored(usize),
    /// Store full; the completion is counted but not kept.
    Overflow,
    /// Store sealed after a drain timeout; nothing is written.
    Sealed,
}

/// Fixed-capacity latency sample array with a lock-free write cursor.
///
/// Each completion claims its own index with `fetch_add`, so concurrent writers
/// never share a slot. Capacity is sized for the worst case, so backing memory
/// is allocated in chunks on first write; a short run only pays for the chunks
/// it fills.
#[derive(Debug)]
pub struct LatencySampleStore {
    chunks: Box<[OnceLock<Box<[AtomicU32]>>]>,
    capacity: usize,
    cursor: AtomicU64,
    sealed: AtomicBool,
    writers: AtomicU32,
}

/// Open write window on a [`LatencySampleStore`]. [`LatencySampleStore::seal`]
/// does not return while one is alive, so anything done under it (recording
/// the sample, bumping counters) is visible to whoever reads after the seal.
#[derive(Debug)]
pub struct SampleWriter<'a> {
    store: &'a LatencySampleStore,
}

impl SampleWriter<'_> {
    pub fn record(&self, latency_us: u64) -> Recorded {
        let store = self.store;
        let idx = store.cursor.fetch_add(1, Ordering::Relaxed);
        let Some(slot) = usize::try_from(idx).ok().and_then(|i| store.slot(i)) else {
            return Recorded::Overflow;
        };

        let value = u32::try_from(latency_us).unwrap_or(MAX_MICROS).min(MAX_MICROS);
        slot.store(value + 1, Ordering::Release);
        // `idx` fits because the slot lookup succeeded.
        Recorded::Stored(idx as usize)
    }
}

impl Drop for SampleWriter<'_> {
    fn drop(&mut self) {
        self.store.writers.fetch_sub(1, Ordering::SeqCst);
    }
}

impl LatencySampleStore {
    pub fn with_capacity(capacity: usize) -> Self {
        let chunks = (0..capacity.div_ceil(CHUNK_SLOTS))
            .map(|_| OnceLock::new())
            .collect();
        Self {
            chunks,
            capacity,
            cursor: AtomicU64::new(0),
            sealed: AtomicBool::new(false),
            writers: AtomicU32::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn chunk_len(&self, chunk: usize) -> usize {
        (self.capacity - chunk * CHUNK_SLOTS).min(CHUNK_SLOTS)
    }

    fn slot(&self, idx: usize) -> Option<&AtomicU32> {
        if idx >= self.capacity {
            return None;
        }
        let chunk = idx / CHUNK_SLOTS;
        let slots = self.chunks.get(chunk)?.get_or_init(|| {
            (0..self.chunk_len(chunk))
                .map(|_| AtomicU32::new(EMPTY))
                .collect()
        });
        slots.get(idx % CHUNK_SLOTS)
    }

    /// Opens a write window, or `None` once the store is sealed.
    pub fn writer(&self) -> Option<SampleWriter<'_>> {
        self.writers.fetch_add(1, Ordering::SeqCst);
        let writer = SampleWriter { store: self };
        if self.sealed.load(Ordering::SeqCst) {
            return None;
        }
        Some(writer)
    }

    pub fn record(&self, latency_us: u64) -> Recorded {
        match self.writer() {
            Some(w) => w.record(latency_us),
            None => Recorded::Sealed,
        }
    }

    /// Number of slots claimed within capacity.
    pub fn len(&self) -> usize {
        let claimed = self.cursor.load(Ordering::Acquire);
        usize::try_from(claimed)
            .unwrap_or(usize::MAX)
            .min(self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Completions that found the store full.
    pub fn overflowed(&self) -> u64 {
        let claimed = self.cursor.load(Ordering::Acquire);
        claimed.saturating_sub(self.capacity as u64)
    }

    /// Rejects further writes and waits for open [`SampleWriter`]s to finish.
    /// Writers never block, so the wait is a few instructions long.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
        while self.writers.load(Ordering::SeqCst) != 0 {
            std::thread::yield_now();
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Written samples in ascending order.
    pub fn sorted_micros(&self) -> Vec<u32> {
        let mut remaining = self.len();
        let mut out = Vec::with_capacity(remaining);
        for chunk in self.chunks.iter() {
            if remaining == 0 {
                break;
            }
            let Some(slots) = chunk.get() else {
                remaining = remaining.saturating_sub(CHUNK_SLOTS);
                continue;
            };
            let take = remaining.min(slots.len());
            out.extend(
                slots[..take]
                    .iter()
                    .map(|s| s.load(Ordering::Acquire))
                    .filter(|&v| v != EMPTY)
                    .map(|v| v - 1),
            );
            remaining -= take;
        }
        out.sort_unstable();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn records_until_full_then_counts_overflow() {
        let store = LatencySampleStore::with_capacity(2);
        assert_eq!(store.record(30), Recorded::Stored(0));
        assert_eq!(store.record(10), Recorded::Stored(1));
        assert_eq!(store.record(20), Recorded::Overflow);

        assert_eq!(store.len(), 2);
        assert_eq!(store.overflowed(), 1);
        assert_eq!(store.sorted_micros(), vec![10, 30]);
    }

    #[test]
    fn sealed_store_rejects_writes() {
        let store = LatencySampleStore::with_capacity(4);
        store.record(5);
        store.seal();
        assert_eq!(store.record(6), Recorded::Sealed);
        assert_eq!(store.sorted_micros(), vec![5]);
        assert_eq!(store.overflowed(), 0);
    }

    #[test]
    fn zero_latency_is_kept() {
        let store = LatencySampleStore::with_capacity(2);
        store.record(0);
        assert_eq!(store.sorted_micros(), vec![0]);
    }

    #[test]
    fn chunks_are_allocated_on_first_write() {
        let store = LatencySampleStore::with_capacity(3 * CHUNK_SLOTS + 7);
        assert_eq!(store.chunks.len(), 4);
        assert!(store.chunks.iter().all(|c| c.get().is_none()));

        for v in 0..(CHUNK_SLOTS as u64 + 1) {
            store.record(v);
        }
        let allocated = store.chunks.iter().filter(|c| c.get().is_some()).count();
        assert_eq!(allocated, 2);
        assert_eq!(store.sorted_micros().len(), CHUNK_SLOTS + 1);
    }

    #[test]
    fn last_chunk_is_trimmed_to_capacity() {
        let store = LatencySampleStore::with_capacity(CHUNK_SLOTS + 3);
        assert_eq!(store.chunk_len(1), 3);
        assert!(store.slot(CHUNK_SLOTS + 2).is_some());
        assert!(store.slot(CHUNK_SLOTS + 3).is_none());
    }

    #[test]
    fn seal_waits_for_open_writers() {
        let store = Arc::new(LatencySampleStore::with_capacity(4));
        let writer = store.writer().unwrap_or_else(|| panic!("store sealed"));

        let sealed = Arc::new(AtomicBool::new(false));
        let sealer = {
            let store = Arc::clone(&store);
            let sealed = Arc::clone(&sealed);
            std::thread::spawn(move || {
                store.seal();
                sealed.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!sealed.load(Ordering::SeqCst), "seal returned with a writer open");
        assert!(store.writer().is_none());

        assert_eq!(writer.record(42), Recorded::Stored(0));
        drop(writer);
        sealer.join().unwrap_or_else(|_| panic!("sealer panicked"));

        assert!(sealed.load(Ordering::SeqCst));
        assert_eq!(store.sorted_micros(), vec![42]);
        assert_eq!(store.record(7), Recorded::Sealed);
    }

    #[test]
    fn huge_latencies_are_clamped() {
        let store = LatencySampleStore::with_capacity(1);
        store.record(u64::MAX);
        assert_eq!(store.sorted_micros(), vec![MAX_MICROS]);
    }

    #[test]
    fn concurrent_writers_claim_distinct_slots() {
        let store = Arc::new(LatencySampleStore::with_capacity(8 * 500));
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..500u64)
                        .map(|i| match store.record(t * 1_000 + i) {
                            Recorded::Stored(idx) => idx,
                            other => panic!("unexpected {other:?}"),
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for idx in h.join().unwrap_or_else(|_| panic!("writer panicked")) {
                assert!(seen.insert(idx), "slot {idx} written twice");
            }
        }
        assert_eq!(seen.len(), 4_000);
        assert_eq!(store.sorted_micros().len(), 4_000);
    }
}
