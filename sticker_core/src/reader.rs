use std::sync::Arc;

use crate::codec::Codec;
use crate::delta::xor_in_place;
use crate::error::DecodeError;
use crate::format::{
    frame_at, frame_entries, ContainerHeader, FrameBuffer, PixelLayout, HEADER_SIZE,
};
use crate::source::FrameSource;

/// Sequential decoder for delta-frame containers.
///
/// # Open sequence
/// 1. Parse the 12-byte header (fps, width, height).
/// 2. Walk every length prefix so a truncated stream fails here, before any
///    frame is handed out.
/// 3. Remember where the frame stream begins (`base_offset`).
/// 4. Allocate a zeroed reconstruction buffer of `width * 4 * height` bytes.
///
/// # Access pattern
/// Frames are deltas against their predecessor, so they can only be produced
/// in order. [`decode_next`](Self::decode_next) reads the length prefix at the cursor, decompresses
/// the payload, XORs it into the reconstruction buffer and hands out a copy.
/// After the last frame the cursor, the frame index and the reconstruction
/// buffer all reset, so every cycle is reconstructed from scratch.
///
/// The container bytes are shared, never copied: a decoder is cheap to open
/// once the asset is resident.
pub struct ContainerDecoder {
    data: Arc<[u8]>,
    pub header: ContainerHeader,
    codec: Arc<dyn Codec>,
    base_offset: usize,
    cursor: usize,
    frame_index: u32,
    frame: Vec<u8>,
    /// Set at the wrap boundary; the accumulator is zeroed before the next
    /// frame so the last frame of the cycle stays readable until then.
    wrapped: bool,
}

impl ContainerDecoder {
    /// Open a container that is already fully resident in memory.
    ///
    /// `codec` must be the block codec the container was written with (LZ4
    /// for every container produced by the transcoder).
    pub fn open(data: Arc<[u8]>, codec: Arc<dyn Codec>) -> Result<Self, DecodeError> {
        let header = ContainerHeader::parse(&data)?;
        if data.len() == HEADER_SIZE {
            return Err(DecodeError::Empty);
        }
        let frames = frame_entries(&data)?;
        log::trace!(
            "opened {}x{} container: {} frames at {} fps",
            header.width,
            header.height,
            frames.len(),
            header.fps
        );
        let frame = vec![0u8; header.frame_size()];
        Ok(Self {
            data,
            header,
            codec,
            base_offset: HEADER_SIZE,
            cursor: HEADER_SIZE,
            frame_index: 0,
            frame,
            wrapped: false,
        })
    }

    /// Number of frames in one cycle. Walks the length prefixes.
    pub fn frame_count(&self) -> Result<u32, DecodeError> {
        Ok(frame_entries(&self.data)?.len() as u32)
    }

    /// Total size of the container in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.len() <= self.base_offset
    }

    /// Restart from the first frame with a zeroed accumulator.
    pub fn rewind(&mut self) {
        self.cursor = self.base_offset;
        self.frame_index = 0;
        self.frame.fill(0);
        self.wrapped = false;
    }

    /// Decode the frame at the cursor and advance.
    pub fn decode_next(&mut self) -> Result<&[u8], DecodeError> {
        if self.wrapped {
            self.frame.fill(0);
            self.wrapped = false;
        }
        let index = self.frame_index;
        let entry = frame_at(&self.data, self.cursor, index)?;
        let expected = self.header.frame_size();

        let delta = self
            .codec
            .decompress_block(&self.data[entry.payload()], Some(expected))
            .map_err(|source| DecodeError::Decompress { index, source })?;
        if delta.len() != expected {
            return Err(DecodeError::SizeMismatch {
                index,
                expected,
                actual: delta.len(),
            });
        }

        xor_in_place(&mut self.frame, &delta);

        self.cursor = entry.end();
        self.frame_index += 1;
        if self.cursor == self.data.len() {
            log::trace!("container wrapped after {} frames", self.frame_index);
            self.cursor = self.base_offset;
            self.frame_index = 0;
            self.wrapped = true;
        }
        Ok(&self.frame)
    }
}

impl FrameSource for ContainerDecoder {
    fn fps(&self) -> u32 {
        self.header.fps
    }

    fn frame_index(&self) -> u32 {
        self.frame_index
    }

    fn next_frame(&mut self) -> Result<FrameBuffer, DecodeError> {
        let pixels = self.decode_next()?.to_vec();
        Ok(FrameBuffer::new(
            self.header.width,
            self.header.height,
            PixelLayout::Yuva,
            pixels,
        ))
    }
}
