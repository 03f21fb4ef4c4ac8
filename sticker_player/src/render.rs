use std::sync::mpsc::Sender;

use sticker_core::color::{argb_to_rgba, yuva_to_rgba};
use sticker_core::{FrameBuffer, PixelLayout};

use crate::player::ControlEvent;

/// Signals that a presented frame has been committed for display.
///
/// May be completed from any thread; the player picks the signal up on its
/// control thread. Dropping it without completing means the frame never
/// counted as shown.
pub struct RenderCompletion {
    events: Sender<ControlEvent>,
    generation: u64,
}

impl RenderCompletion {
    pub(crate) fn new(events: Sender<ControlEvent>, generation: u64) -> Self {
        Self { events, generation }
    }

    pub fn complete(self) {
        let _ = self.events.send(ControlEvent::Rendered {
            generation: self.generation,
        });
    }
}

/// The display surface. Called on the control thread only.
pub trait RenderTarget {
    /// Present `frame`, then complete `done` once it is on screen.
    fn render(&mut self, frame: FrameBuffer, done: RenderCompletion);

    /// The hosting view changed size.
    fn resize(&mut self, _width: u32, _height: u32) {}
}

impl<R: RenderTarget + ?Sized> RenderTarget for Box<R> {
    fn render(&mut self, frame: FrameBuffer, done: RenderCompletion) {
        (**self).render(frame, done)
    }

    fn resize(&mut self, width: u32, height: u32) {
        (**self).resize(width, height)
    }
}

/// Converts every frame to RGBA8 in memory and completes immediately.
#[derive(Debug, Default)]
pub struct SoftwareRenderer {
    rgba: Vec<u8>,
    frame_size: (u32, u32),
    view_size: (u32, u32),
    presented: u64,
}

impl SoftwareRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last presented image as `(width, height, rgba)`.
    pub fn last_frame(&self) -> Option<(u32, u32, &[u8])> {
        (self.presented > 0).then_some((self.frame_size.0, self.frame_size.1, &self.rgba[..]))
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn view_size(&self) -> (u32, u32) {
        self.view_size
    }
}

impl RenderTarget for SoftwareRenderer {
    fn render(&mut self, frame: FrameBuffer, done: RenderCompletion) {
        self.rgba.resize(frame.pixels.len(), 0);
        match frame.layout {
            PixelLayout::Yuva => yuva_to_rgba(&frame.pixels, &mut self.rgba),
            PixelLayout::Argb => argb_to_rgba(&frame.pixels, &mut self.rgba),
        }
        self.frame_size = (frame.width, frame.height);
        self.presented += 1;
        done.complete();
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.view_size = (width, height);
    }
}
