//! Visibility-gated playback of animated stickers.
//!
//! A [`StickerPlayer`] loads an asset through the collaborators of its
//! [`PlayerContext`], decodes frames on the shared [`Executor`] at the
//! asset's frame rate and presents them to a [`RenderTarget`], but only while
//! its view is both visible and attached to a display.

pub mod clock;
pub mod executor;
pub mod loader;
pub mod player;
pub mod render;
mod session;
pub mod visibility;

pub use clock::{Clock, ManualClock, ThreadClock, Tick, TimerHandle};
pub use executor::{DecodeQueue, Executor, InlineExecutor, Job};
pub use loader::{
    FsResourceStore, LoadSlot, LoadTicket, LocalTranscoder, MemoryStore, ResourceData, ResourceKey,
    ResourceSink, ResourceStore, Transcoder,
};
pub use player::{PlaybackMode, PlayerConfig, PlayerContext, StickerPlayer};
pub use render::{RenderCompletion, RenderTarget, SoftwareRenderer};
pub use visibility::{PlaybackState, Transition, VisibilityGate};
