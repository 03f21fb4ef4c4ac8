//! The per-view player and the context players share.

use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sticker_core::cache::DEFAULT_CACHE_BUDGET;
use sticker_core::format::DEFAULT_CANVAS_SIZE;
use sticker_core::{
    Codec, ContainerDecoder, DecodeError, FrameBuffer, FrameCache, FrameSource, VectorBackend,
    VectorDecoder,
};

use crate::clock::Clock;
use crate::executor::Executor;
use crate::loader::{LoadSlot, ResourceData, ResourceKey, ResourceSink, ResourceStore, Transcoder};
use crate::render::{RenderCompletion, RenderTarget};
use crate::session::{Playback, Session};
use crate::visibility::{PlaybackState, Transition, VisibilityGate};

// ── Configuration ──────────────────────────────────────────────────────────

/// How a player obtains its frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Ask the transcoder for a pre-rendered delta-frame container.
    Cached,
    /// Fetch the gzip-wrapped vector asset and render it while playing.
    Direct,
}

#[derive(Debug, Clone, Copy)]
pub struct PlayerConfig {
    /// Canvas used when rendering vector assets directly.
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Byte budget of each player's vector frame cache.
    pub frame_cache_budget: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            canvas_width: DEFAULT_CANVAS_SIZE,
            canvas_height: DEFAULT_CANVAS_SIZE,
            frame_cache_budget: DEFAULT_CACHE_BUDGET,
        }
    }
}

/// Collaborators shared by every player of a process.
#[derive(Clone)]
pub struct PlayerContext {
    pub executor: Arc<dyn Executor>,
    pub clock: Arc<dyn Clock>,
    pub store: Arc<dyn ResourceStore>,
    pub transcoder: Arc<dyn Transcoder>,
    /// Block codec of container frames.
    pub frame_codec: Arc<dyn Codec>,
    /// Unwraps vector payloads in direct mode.
    pub unzip: Arc<dyn Codec>,
    pub vector_backend: Arc<dyn VectorBackend>,
    pub config: PlayerConfig,
}

impl PlayerContext {
    pub fn player<R: RenderTarget>(&self, renderer: R) -> StickerPlayer<R> {
        StickerPlayer::new(self.clone(), renderer)
    }
}

// ── Control events ─────────────────────────────────────────────────────────

/// Everything that reaches the control thread from elsewhere.
pub(crate) enum ControlEvent {
    Resource {
        load: u64,
        mode: PlaybackMode,
        key: ResourceKey,
        data: ResourceData,
    },
    Frame {
        generation: u64,
        index: u32,
        frame: FrameBuffer,
    },
    Rendered {
        generation: u64,
    },
    Failed {
        generation: u64,
        error: DecodeError,
    },
}

#[derive(Clone)]
enum LoadedAsset {
    Container(Arc<[u8]>),
    Vector { data: Arc<[u8]>, cache_key: String },
}

// ── Player ─────────────────────────────────────────────────────────────────

/// Plays one sticker into one [`RenderTarget`].
///
/// A player is driven from a single control thread: every method, the
/// renderer and the started callback run there. Work from other threads
/// (loads, decoded frames, render completions) is queued and applied by
/// [`pump`](Self::pump).
pub struct StickerPlayer<R: RenderTarget> {
    context: PlayerContext,
    renderer: R,
    events: Sender<ControlEvent>,
    inbox: Receiver<ControlEvent>,
    gate: VisibilityGate,
    load: LoadSlot,
    mode: Option<PlaybackMode>,
    asset: Option<LoadedAsset>,
    session: Arc<Session>,
    cache: Arc<FrameCache>,
    on_started: Option<Box<dyn FnMut()>>,
    reported_started: bool,
    frames_presented: u64,
    current_frame: Option<u32>,
}

impl<R: RenderTarget> StickerPlayer<R> {
    pub fn new(context: PlayerContext, renderer: R) -> Self {
        let (events, inbox) = channel();
        let cache = Arc::new(FrameCache::with_budget(context.config.frame_cache_budget));
        Self {
            context,
            renderer,
            events,
            inbox,
            gate: VisibilityGate::new(),
            load: LoadSlot::default(),
            mode: None,
            asset: None,
            session: Arc::new(Session::default()),
            cache,
            on_started: None,
            reported_started: false,
            frames_presented: 0,
            current_frame: None,
        }
    }

    /// Start loading `key`. Any load still in flight is cancelled and its
    /// late deliveries are ignored. Whatever was loaded before keeps playing
    /// until the new asset arrives.
    pub fn setup(&mut self, key: impl Into<ResourceKey>, width: u32, height: u32, mode: PlaybackMode) {
        let key = key.into();
        let ticket = self.load.replace();
        self.mode = Some(mode);
        log::debug!("loading {key} ({mode:?}, {width}x{height})");

        let events = Mutex::new(self.events.clone());
        let load = ticket.generation;
        let sink_key = key.clone();
        let sink = ResourceSink::new(ticket.cancel_flag(), move |data| {
            let event = ControlEvent::Resource {
                load,
                mode,
                key: sink_key.clone(),
                data,
            };
            let _ = events.lock().unwrap_or_else(|p| p.into_inner()).send(event);
        });

        match mode {
            PlaybackMode::Cached => self.context.transcoder.transcode(&key, width, height, sink),
            PlaybackMode::Direct => self.context.store.fetch(&key, sink),
        }
    }

    /// Cancel any load, stop playback and forget the asset.
    pub fn reset(&mut self) {
        self.load.cancel();
        self.stop();
        self.asset = None;
        self.mode = None;
        self.cache.remove_all();
        self.current_frame = None;
    }

    pub fn set_visible(&mut self, visible: bool) {
        let transition = self.gate.set_visible(visible);
        self.apply(transition);
    }

    /// The hosting view joined or left a display.
    pub fn on_display_membership_changed(&mut self, displayed: bool) {
        let transition = self.gate.set_displayed(displayed);
        self.apply(transition);
    }

    /// Called once per playback session, after its first frame is on screen.
    pub fn on_playback_started(&mut self, callback: impl FnMut() + 'static) {
        self.on_started = Some(Box::new(callback));
    }

    pub fn update_canvas_size(&mut self, width: u32, height: u32) {
        self.renderer.resize(width, height);
    }

    /// `Playing` only while the view is effectively visible and a session
    /// is actually animating.
    ///
    /// A session that failed to decode reports `Stopped` even though the
    /// visibility gate is still open; the next visibility edge or `setup`
    /// starts a new one.
    pub fn state(&self) -> PlaybackState {
        if self.gate.is_playing() && self.session.is_running() {
            PlaybackState::Playing
        } else {
            PlaybackState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    pub fn mode(&self) -> Option<PlaybackMode> {
        self.mode
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Index of the last frame handed to the renderer.
    pub fn current_frame(&self) -> Option<u32> {
        self.current_frame
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Apply every queued event without blocking. Returns how many.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.inbox.try_recv() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    /// Apply events as they arrive until `duration` has passed.
    pub fn pump_for(&mut self, duration: Duration) -> usize {
        let deadline = Instant::now() + duration;
        let mut handled = 0;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return handled;
            }
            match self.inbox.recv_timeout(deadline - now) {
                Ok(event) => {
                    self.handle(event);
                    handled += 1;
                }
                Err(RecvTimeoutError::Timeout) => return handled,
                // The player holds a sender itself, so this cannot happen.
                Err(RecvTimeoutError::Disconnected) => return handled,
            }
        }
    }

    fn apply(&mut self, transition: Option<Transition>) {
        match transition {
            Some(Transition::Play) => self.play(),
            Some(Transition::Stop) => self.stop(),
            None => {}
        }
    }

    fn handle(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::Resource { load, mode, key, data } => {
                if !self.load.accepts(load) {
                    log::trace!("ignoring stale delivery of {key}");
                    return;
                }
                if !data.complete {
                    return;
                }
                let asset = match mode {
                    PlaybackMode::Cached => LoadedAsset::Container(data.bytes),
                    PlaybackMode::Direct => LoadedAsset::Vector {
                        cache_key: data
                            .path
                            .as_ref()
                            .map_or_else(|| key.to_string(), |p| p.display().to_string()),
                        data: data.bytes,
                    },
                };
                log::debug!("{key} loaded");
                self.asset = Some(asset);
                self.cache.remove_all();
                if self.gate.is_playing() {
                    self.play();
                }
            }
            ControlEvent::Frame {
                generation,
                index,
                frame,
            } => {
                if !self.session.is_current(generation) || !self.gate.is_playing() {
                    return;
                }
                self.current_frame = Some(index);
                self.frames_presented += 1;
                let done = RenderCompletion::new(self.events.clone(), generation);
                self.renderer.render(frame, done);
            }
            ControlEvent::Rendered { generation } => {
                if !self.session.is_current(generation) || self.reported_started {
                    return;
                }
                self.reported_started = true;
                if let Some(callback) = self.on_started.as_mut() {
                    callback();
                }
            }
            ControlEvent::Failed { generation, error } => {
                if !self.session.is_current(generation) {
                    return;
                }
                log::warn!("sticker playback failed ({:?}): {error}", error.kind());
                self.stop();
            }
        }
    }

    /// Start a fresh session over the loaded asset. Without an asset this
    /// does nothing; playback begins when the load lands.
    fn play(&mut self) {
        let Some(asset) = self.asset.clone() else {
            return;
        };
        let generation = self.session.begin();
        self.reported_started = false;

        let playback = Playback::new(
            Arc::downgrade(&self.session),
            generation,
            self.context.executor.clone(),
            self.events.clone(),
        );
        let clock = self.context.clock.clone();
        let frame_codec = self.context.frame_codec.clone();
        let unzip = self.context.unzip.clone();
        let backend = self.context.vector_backend.clone();
        let cache = self.cache.clone();
        let (width, height) = (self.context.config.canvas_width, self.context.config.canvas_height);

        self.context.executor.execute(Box::new(move || {
            playback.start(clock.as_ref(), move || -> Result<Box<dyn FrameSource>, DecodeError> {
                match asset {
                    LoadedAsset::Container(data) => {
                        Ok(Box::new(ContainerDecoder::open(data, frame_codec)?))
                    }
                    LoadedAsset::Vector { data, cache_key } => {
                        let decoder = VectorDecoder::open(
                            &data,
                            &cache_key,
                            unzip.as_ref(),
                            backend.as_ref(),
                            width,
                            height,
                        )?;
                        Ok(Box::new(decoder.with_cache(cache)))
                    }
                }
            })
        }));
    }

    fn stop(&mut self) {
        self.session.end();
        self.reported_started = false;
    }
}

impl<R: RenderTarget> Drop for StickerPlayer<R> {
    fn drop(&mut self) {
        self.session.end();
        self.load.cancel();
    }
}
