use std::sync::Arc;

use crate::cache::FrameCache;
use crate::codec::Codec;
use crate::error::DecodeError;
use crate::format::{frame_size, FrameBuffer, PixelLayout};
use crate::source::FrameSource;

/// A parsed vector animation that can render any frame on demand.
///
/// Frames are independent: rendering index `n` must not depend on which
/// frames were rendered before.
pub trait VectorProgram: Send {
    /// Frames in one cycle; at least 1.
    fn frame_count(&self) -> u32;

    /// Native frame rate of the animation.
    fn frame_rate(&self) -> f32;

    /// Render `index` into `out` as straight ARGB, `width * 4 * height` bytes.
    /// `out` arrives zeroed.
    fn render(&mut self, index: u32, out: &mut [u8], width: u32, height: u32) -> anyhow::Result<()>;
}

/// The vector-animation library: builds programs from raw (already
/// decompressed) animation bytes.
pub trait VectorBackend: Send + Sync {
    /// `cache_key` identifies the asset (usually its local path) and may be
    /// used by the backend to share parsed documents.
    fn load(&self, data: &[u8], cache_key: &str) -> anyhow::Result<Box<dyn VectorProgram>>;
}

/// Direct-mode frame source: renders a vector program on a fixed canvas.
pub struct VectorDecoder {
    program: Box<dyn VectorProgram>,
    width: u32,
    height: u32,
    fps: u32,
    frame_count: u32,
    frame_index: u32,
    canvas: Vec<u8>,
    cache: Option<Arc<FrameCache>>,
}

impl VectorDecoder {
    /// Unwrap `payload` with `unzip`, then hand the raw bytes to `backend`.
    pub fn open(
        payload: &[u8],
        cache_key: &str,
        unzip: &dyn Codec,
        backend: &dyn VectorBackend,
        width: u32,
        height: u32,
    ) -> Result<Self, DecodeError> {
        let unavailable = |source: anyhow::Error| DecodeError::VectorUnavailable {
            cache_key: cache_key.to_string(),
            source,
        };
        let raw = unzip.decompress_block(payload, None).map_err(unavailable)?;
        let program = backend.load(&raw, cache_key).map_err(unavailable)?;
        Self::from_program(program, width, height).map_err(unavailable)
    }

    pub fn from_program(
        program: Box<dyn VectorProgram>,
        width: u32,
        height: u32,
    ) -> anyhow::Result<Self> {
        let frame_count = program.frame_count();
        if frame_count == 0 {
            anyhow::bail!("vector program reports zero frames");
        }
        let rate = program.frame_rate();
        if !rate.is_finite() || rate <= 0.0 {
            anyhow::bail!("vector program reports frame rate {rate}");
        }
        if width == 0 || height == 0 {
            anyhow::bail!("empty canvas {width}x{height}");
        }
        Ok(Self {
            program,
            width,
            height,
            fps: (rate.round() as u32).max(1),
            frame_count,
            frame_index: 0,
            canvas: vec![0u8; frame_size(width, height)],
            cache: None,
        })
    }

    /// Serve repeated indices from `cache` instead of re-rendering them.
    pub fn with_cache(mut self, cache: Arc<FrameCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Render an arbitrary frame without moving the playback position.
    pub fn render_frame(&mut self, index: u32) -> Result<&[u8], DecodeError> {
        let index = index % self.frame_count;
        self.canvas.fill(0);
        self.program
            .render(index, &mut self.canvas, self.width, self.height)
            .map_err(|source| DecodeError::VectorRender { index, source })?;
        Ok(&self.canvas)
    }
}

impl FrameSource for VectorDecoder {
    fn fps(&self) -> u32 {
        self.fps
    }

    fn frame_index(&self) -> u32 {
        self.frame_index
    }

    fn next_frame(&mut self) -> Result<FrameBuffer, DecodeError> {
        let index = self.frame_index;
        let cached = self.cache.as_ref().and_then(|cache| cache.get(index));
        let pixels = match cached {
            Some(pixels) => pixels,
            None => {
                let pixels = self.render_frame(index)?.to_vec();
                if let Some(cache) = &self.cache {
                    cache.set(index, &pixels);
                }
                pixels
            }
        };
        self.frame_index = (index + 1) % self.frame_count;
        Ok(FrameBuffer::new(self.width, self.height, PixelLayout::Argb, pixels))
    }
}
