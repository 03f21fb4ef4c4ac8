//! Discardable in-memory frame cache.
//!
//! Entries behave like purgeable memory: while nobody is reading them they
//! may be reclaimed at any moment, so a `set` never guarantees a later `get`
//! hit. A miss is always recovered by decoding the frame again.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};

/// Default resident byte budget for a [`FrameCache`]: 32 frames at 512x512.
pub const DEFAULT_CACHE_BUDGET: usize = 32 * 512 * 512 * 4;

#[derive(Default)]
struct PurgeState {
    bytes: Option<Arc<[u8]>>,
    readers: usize,
}

/// A byte buffer that can be reclaimed whenever it is not being accessed.
#[derive(Default)]
pub struct PurgeableData {
    state: Mutex<PurgeState>,
}

impl PurgeableData {
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            state: Mutex::new(PurgeState {
                bytes: Some(Arc::from(bytes)),
                readers: 0,
            }),
        }
    }

    /// Pin the contents for reading, or `None` if they were reclaimed.
    ///
    /// The contents cannot be purged until the guard is released (dropped).
    pub fn try_acquire(&self) -> Option<AccessGuard<'_>> {
        let mut state = lock(&self.state);
        let bytes = state.bytes.clone()?;
        state.readers += 1;
        Some(AccessGuard { owner: self, bytes })
    }

    fn release(&self) {
        let mut state = lock(&self.state);
        state.readers = state.readers.saturating_sub(1);
    }

    /// Reclaim the contents unless a reader holds them. Returns whether the
    /// bytes are gone after the call.
    pub fn purge(&self) -> bool {
        let mut state = lock(&self.state);
        if state.readers == 0 {
            state.bytes = None;
        }
        state.bytes.is_none()
    }

    pub fn is_resident(&self) -> bool {
        lock(&self.state).bytes.is_some()
    }

    fn resident_len(&self) -> usize {
        lock(&self.state).bytes.as_ref().map_or(0, |b| b.len())
    }
}

/// Read access to a [`PurgeableData`]; releases the pin on drop.
pub struct AccessGuard<'a> {
    owner: &'a PurgeableData,
    bytes: Arc<[u8]>,
}

impl AccessGuard<'_> {
    /// Explicit release, equivalent to dropping the guard.
    pub fn release(self) {}
}

impl Deref for AccessGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for AccessGuard<'_> {
    fn drop(&mut self) {
        self.owner.release();
    }
}

/// Frame index → purgeable pixel bytes.
///
/// Owned by a single playback session; the internal lock only makes it safe
/// to hand between the control thread and the decode worker.
pub struct FrameCache {
    entries: Mutex<HashMap<u32, Arc<PurgeableData>>>,
    budget: usize,
}

impl Default for FrameCache {
    fn default() -> Self {
        Self::with_budget(DEFAULT_CACHE_BUDGET)
    }
}

impl FrameCache {
    /// A cache that purges unpinned entries once more than `budget` bytes are
    /// resident.
    pub fn with_budget(budget: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            budget,
        }
    }

    /// Store a discardable copy of `bytes` for `index`.
    pub fn set(&self, index: u32, bytes: &[u8]) {
        let mut entries = lock(&self.entries);
        entries.insert(index, Arc::new(PurgeableData::new(bytes)));

        let mut resident: usize = entries.values().map(|e| e.resident_len()).sum();
        if resident > self.budget {
            for (key, entry) in entries.iter() {
                if resident <= self.budget {
                    break;
                }
                if *key == index {
                    continue;
                }
                let len = entry.resident_len();
                if entry.purge() {
                    resident -= len;
                }
            }
            entries.retain(|_, e| e.is_resident());
        }
    }

    /// Copy out the bytes for `index` if they are still resident.
    ///
    /// A reclaimed entry is dropped from the map and reported as a miss.
    pub fn get(&self, index: u32) -> Option<Vec<u8>> {
        let mut entries = lock(&self.entries);
        let entry = entries.get(&index)?.clone();
        let hit = entry.try_acquire().map(|guard| guard.to_vec());
        if hit.is_none() {
            entries.remove(&index);
        }
        hit
    }

    /// Simulate memory pressure: reclaim every unpinned entry.
    /// Returns how many entries were reclaimed.
    pub fn purge(&self) -> usize {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|_, e| !e.purge());
        before - entries.len()
    }

    pub fn remove_all(&self) {
        lock(&self.entries).clear();
    }

    /// Number of entries in the map, resident or not.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
