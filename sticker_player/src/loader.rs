//! Getting asset bytes into the player.
//!
//! The player never does I/O itself. It hands a [`ResourceSink`] to a
//! [`ResourceStore`] (direct mode) or a [`Transcoder`] (cached mode) and
//! picks up whatever they deliver on its control thread.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use sticker_core::{transcode_vector, Codec, VectorBackend};

/// Logical identifier of an animation asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ResourceKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// One delivery from a store. Only `complete` deliveries are ever used.
#[derive(Debug, Clone)]
pub struct ResourceData {
    pub bytes: Arc<[u8]>,
    pub complete: bool,
    /// Where the bytes live on disk, when they do.
    pub path: Option<PathBuf>,
}

impl ResourceData {
    pub fn complete(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
            complete: true,
            path: None,
        }
    }

    pub fn partial(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            complete: false,
            ..Self::complete(bytes)
        }
    }
}

type Deliver = Arc<dyn Fn(ResourceData) + Send + Sync>;

/// Where a store sends what it loaded. Cheap to clone.
///
/// Once the load it belongs to is cancelled, deliveries are dropped on the
/// floor; long-running stores should also poll [`is_cancelled`] and give up.
///
/// [`is_cancelled`]: ResourceSink::is_cancelled
#[derive(Clone)]
pub struct ResourceSink {
    cancelled: Arc<AtomicBool>,
    deliver: Deliver,
}

impl ResourceSink {
    pub fn new(cancelled: Arc<AtomicBool>, deliver: impl Fn(ResourceData) + Send + Sync + 'static) -> Self {
        Self {
            cancelled,
            deliver: Arc::new(deliver),
        }
    }

    /// A sink sharing this one's cancellation but delivering elsewhere.
    /// Used by collaborators that post-process what another store loads.
    pub fn redirect(&self, deliver: impl Fn(ResourceData) + Send + Sync + 'static) -> Self {
        Self::new(self.cancelled.clone(), deliver)
    }

    pub fn deliver(&self, data: ResourceData) {
        if self.is_cancelled() {
            log::trace!("dropping delivery for a cancelled load");
            return;
        }
        (self.deliver)(data);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Storage collaborator: fetches an asset by key, possibly in several
/// deliveries, the last of which is `complete`.
pub trait ResourceStore: Send + Sync {
    fn fetch(&self, key: &ResourceKey, sink: ResourceSink);
}

/// Transcoding collaborator: produces a container sized `width`x`height` for
/// the asset and delivers it complete.
pub trait Transcoder: Send + Sync {
    fn transcode(&self, key: &ResourceKey, width: u32, height: u32, sink: ResourceSink);
}

// ── Single-slot load handle ────────────────────────────────────────────────

/// Identity of one load started by a player.
#[derive(Debug, Clone)]
pub struct LoadTicket {
    pub generation: u64,
    cancelled: Arc<AtomicBool>,
}

impl LoadTicket {
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Holds at most one in-flight load. Starting a new one cancels the old.
#[derive(Debug, Default)]
pub struct LoadSlot {
    generation: u64,
    current: Option<LoadTicket>,
}

impl LoadSlot {
    /// Cancel the in-flight load, if any, and open a new one.
    pub fn replace(&mut self) -> LoadTicket {
        self.cancel();
        self.generation += 1;
        let ticket = LoadTicket {
            generation: self.generation,
            cancelled: Arc::new(AtomicBool::new(false)),
        };
        self.current = Some(ticket.clone());
        ticket
    }

    pub fn cancel(&mut self) {
        if let Some(ticket) = self.current.take() {
            ticket.cancelled.store(true, Ordering::SeqCst);
        }
    }

    /// Whether a delivery tagged with `generation` belongs to the live load.
    pub fn accepts(&self, generation: u64) -> bool {
        self.current
            .as_ref()
            .is_some_and(|t| t.generation == generation && !t.is_cancelled())
    }

    pub fn is_loading(&self) -> bool {
        self.current.is_some()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Stores ─────────────────────────────────────────────────────────────────

/// Reads `<root>/<key>` on a loader thread and delivers it complete.
pub struct FsResourceStore {
    root: PathBuf,
}

impl FsResourceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ResourceStore for FsResourceStore {
    fn fetch(&self, key: &ResourceKey, sink: ResourceSink) {
        let path = self.root.join(key.as_str());
        let spawned = thread::Builder::new()
            .name("sticker-load".into())
            .spawn(move || {
                if sink.is_cancelled() {
                    return;
                }
                match std::fs::read(&path) {
                    Ok(bytes) => sink.deliver(ResourceData {
                        bytes: bytes.into(),
                        complete: true,
                        path: Some(path),
                    }),
                    Err(e) => log::warn!("failed to read sticker {}: {}", path.display(), e),
                }
            });
        if let Err(e) = spawned {
            log::error!("could not spawn loader thread: {e}");
        }
    }
}

/// In-memory store.
///
/// In deferred mode fetches are parked until [`release`](Self::release) is
/// called, which lets callers control exactly when (and in which order)
/// loads complete.
#[derive(Default)]
pub struct MemoryStore {
    assets: Mutex<HashMap<ResourceKey, Arc<[u8]>>>,
    deferred: bool,
    pending: Mutex<Vec<(ResourceKey, ResourceSink)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deferred() -> Self {
        Self {
            deferred: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, key: impl Into<ResourceKey>, bytes: impl Into<Arc<[u8]>>) {
        lock(&self.assets).insert(key.into(), bytes.into());
    }

    /// Complete every parked fetch of `key`. Returns how many were parked.
    pub fn release(&self, key: &ResourceKey) -> usize {
        let ready: Vec<ResourceSink> = {
            let mut pending = lock(&self.pending);
            let (ready, keep): (Vec<_>, Vec<_>) = pending.drain(..).partition(|(k, _)| k == key);
            *pending = keep;
            ready.into_iter().map(|(_, sink)| sink).collect()
        };
        for sink in &ready {
            self.deliver(key, sink);
        }
        ready.len()
    }

    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }

    fn deliver(&self, key: &ResourceKey, sink: &ResourceSink) {
        let bytes = lock(&self.assets).get(key).cloned();
        match bytes {
            Some(bytes) => sink.deliver(ResourceData::complete(bytes)),
            None => log::debug!("no asset stored under {key}"),
        }
    }
}

impl ResourceStore for MemoryStore {
    fn fetch(&self, key: &ResourceKey, sink: ResourceSink) {
        if self.deferred {
            lock(&self.pending).push((key.clone(), sink));
        } else {
            self.deliver(key, &sink);
        }
    }
}

// ── Transcoding ────────────────────────────────────────────────────────────

/// Transcoder that fetches the original vector asset from a store and
/// renders it into a container on its own thread.
pub struct LocalTranscoder {
    store: Arc<dyn ResourceStore>,
    unzip: Arc<dyn Codec>,
    backend: Arc<dyn VectorBackend>,
    frame_codec: Arc<dyn Codec>,
}

impl LocalTranscoder {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        unzip: Arc<dyn Codec>,
        backend: Arc<dyn VectorBackend>,
        frame_codec: Arc<dyn Codec>,
    ) -> Self {
        Self {
            store,
            unzip,
            backend,
            frame_codec,
        }
    }
}

impl Transcoder for LocalTranscoder {
    fn transcode(&self, key: &ResourceKey, width: u32, height: u32, sink: ResourceSink) {
        let unzip = self.unzip.clone();
        let backend = self.backend.clone();
        let frame_codec = self.frame_codec.clone();
        let name = key.to_string();
        let outer = sink.clone();

        let inner = sink.redirect(move |data| {
            if !data.complete {
                return;
            }
            let (unzip, backend, frame_codec) = (unzip.clone(), backend.clone(), frame_codec.clone());
            let outer = outer.clone();
            let name = name.clone();
            let spawned = thread::Builder::new()
                .name("sticker-transcode".into())
                .spawn(move || {
                    if outer.is_cancelled() {
                        return;
                    }
                    let cache_key = data
                        .path
                        .as_ref()
                        .map_or(name.clone(), |p| p.display().to_string());
                    match transcode_vector(
                        &data.bytes,
                        &cache_key,
                        width,
                        height,
                        unzip.as_ref(),
                        backend.as_ref(),
                        frame_codec,
                    ) {
                        Ok(container) => outer.deliver(ResourceData::complete(container)),
                        Err(e) => log::warn!("transcoding {name} failed: {e:#}"),
                    }
                });
            if let Err(e) = spawned {
                log::error!("could not spawn transcoder thread: {e}");
            }
        });
        self.store.fetch(key, inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn recording_sink(cancelled: Arc<AtomicBool>) -> (ResourceSink, mpsc::Receiver<ResourceData>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let sink = ResourceSink::new(cancelled, move |data| {
            let _ = lock(&tx).send(data);
        });
        (sink, rx)
    }

    #[test]
    fn test_replace_cancels_previous_ticket() {
        let mut slot = LoadSlot::default();
        let first = slot.replace();
        assert!(slot.accepts(first.generation));
        let second = slot.replace();
        assert!(first.is_cancelled());
        assert!(!slot.accepts(first.generation));
        assert!(slot.accepts(second.generation));
        slot.cancel();
        assert!(second.is_cancelled());
        assert!(!slot.accepts(second.generation));
        assert!(!slot.is_loading());
    }

    #[test]
    fn test_cancelled_sink_drops_deliveries() {
        let flag = Arc::new(AtomicBool::new(false));
        let (sink, rx) = recording_sink(flag.clone());
        sink.deliver(ResourceData::complete(vec![1u8]));
        flag.store(true, Ordering::SeqCst);
        sink.deliver(ResourceData::complete(vec![2u8]));
        assert_eq!(&*rx.try_recv().unwrap().bytes, &[1]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_deferred_store_releases_per_key() {
        let store = MemoryStore::deferred();
        store.insert("a", vec![1u8]);
        store.insert("b", vec![2u8]);
        let (sink, rx) = recording_sink(Arc::default());
        store.fetch(&"a".into(), sink.clone());
        store.fetch(&"b".into(), sink);
        assert!(rx.try_recv().is_err());
        assert_eq!(store.release(&"b".into()), 1);
        assert_eq!(&*rx.try_recv().unwrap().bytes, &[2]);
        assert_eq!(store.pending(), 1);
    }

    #[test]
    fn test_fs_store_reports_path() {
        let dir = std::env::temp_dir().join("sticker_player_fs_store");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("hello.tgs"), b"payload").unwrap();
        let (sink, rx) = recording_sink(Arc::default());
        FsResourceStore::new(&dir).fetch(&"hello.tgs".into(), sink);
        let data = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert!(data.complete);
        assert_eq!(&*data.bytes, b"payload");
        assert_eq!(data.path, Some(dir.join("hello.tgs")));
    }
}
