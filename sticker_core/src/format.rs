use crate::error::DecodeError;

/// Fixed size of the container header in bytes.
///   fps:i32 + width:i32 + height:i32 = 12
pub const HEADER_SIZE: usize = 12;

/// Size of the length prefix in front of every delta frame.
pub const FRAME_LENGTH_SIZE: usize = 4;

/// Every frame is stored as 4 bytes per pixel, whatever the layout.
pub const BYTES_PER_PIXEL: usize = 4;

/// Canvas edge used when rendering vector animations directly.
pub const DEFAULT_CANVAS_SIZE: u32 = 512;

/// Largest reconstructed frame a container may declare: 4096x4096 pixels.
pub const MAX_FRAME_BYTES: usize = 4096 * 4096 * BYTES_PER_PIXEL;

// ── Pixel layout ───────────────────────────────────────────────────────────

/// Colour layout tag attached to every frame handed to a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// Per-pixel interleaved luma, chroma-blue, chroma-red, alpha.
    /// Produced by the container decoder.
    Yuva,
    /// Straight (non-premultiplied) alpha, red, green, blue.
    /// Produced by the vector decoder.
    Argb,
}

impl PixelLayout {
    pub fn name(self) -> &'static str {
        match self {
            PixelLayout::Yuva => "yuva",
            PixelLayout::Argb => "argb",
        }
    }
}

/// One fully reconstructed frame, owned by whoever holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub pixels: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32, layout: PixelLayout, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), frame_size(width, height));
        Self {
            width,
            height,
            layout,
            pixels,
        }
    }
}

/// Byte length of one frame at the given dimensions.
#[inline]
pub fn frame_size(width: u32, height: u32) -> usize {
    width as usize * BYTES_PER_PIXEL * height as usize
}

// ── Header ─────────────────────────────────────────────────────────────────

/// Decoded representation of the 12-byte container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

impl ContainerHeader {
    /// Size of one reconstructed frame in bytes.
    pub fn frame_size(&self) -> usize {
        frame_size(self.width, self.height)
    }

    /// Serialize to exactly `HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&(self.fps as i32).to_le_bytes());
        buf[4..8].copy_from_slice(&(self.width as i32).to_le_bytes());
        buf[8..12].copy_from_slice(&(self.height as i32).to_le_bytes());
        buf
    }

    /// Parse the header at the start of `data`, rejecting non-positive fields
    /// and frames larger than [`MAX_FRAME_BYTES`].
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < HEADER_SIZE {
            return Err(DecodeError::TruncatedHeader { len: data.len() });
        }
        let fps = read_i32(data, 0);
        let width = read_i32(data, 4);
        let height = read_i32(data, 8);
        if fps <= 0 || width <= 0 || height <= 0 {
            return Err(DecodeError::InvalidHeader { fps, width, height });
        }
        let frame_bytes = (width as u64)
            .checked_mul(height as u64)
            .and_then(|px| px.checked_mul(BYTES_PER_PIXEL as u64));
        if !matches!(frame_bytes, Some(n) if n <= MAX_FRAME_BYTES as u64) {
            return Err(DecodeError::InvalidHeader { fps, width, height });
        }
        Ok(Self {
            fps: fps as u32,
            width: width as u32,
            height: height as u32,
        })
    }
}

// ── Frame stream ───────────────────────────────────────────────────────────

/// Location of one delta frame inside a container buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEntry {
    /// Byte offset of the frame's length prefix from the start of the buffer.
    pub offset: usize,
    /// Length of the compressed payload following the prefix.
    pub length: usize,
}

impl FrameEntry {
    /// Range of the compressed payload within the container buffer.
    pub fn payload(&self) -> std::ops::Range<usize> {
        let start = self.offset + FRAME_LENGTH_SIZE;
        start..start + self.length
    }

    /// Offset of the next frame's length prefix.
    pub fn end(&self) -> usize {
        self.offset + FRAME_LENGTH_SIZE + self.length
    }
}

/// Read and bounds-check the frame whose length prefix sits at `offset`.
///
/// `index` only feeds the error message.
pub fn frame_at(data: &[u8], offset: usize, index: u32) -> Result<FrameEntry, DecodeError> {
    let available = data.len().saturating_sub(offset);
    if available < FRAME_LENGTH_SIZE {
        return Err(DecodeError::FrameOverrun {
            index,
            offset,
            length: FRAME_LENGTH_SIZE as i64,
            available,
        });
    }
    let length = read_i32(data, offset);
    if length < 0 || length as usize > available - FRAME_LENGTH_SIZE {
        return Err(DecodeError::FrameOverrun {
            index,
            offset,
            length: length as i64,
            available: available - FRAME_LENGTH_SIZE,
        });
    }
    Ok(FrameEntry {
        offset,
        length: length as usize,
    })
}

/// Walk the whole frame stream without decompressing anything.
///
/// Fails on the first length prefix that overruns the buffer, so a successful
/// scan proves every frame is addressable.
pub fn frame_entries(data: &[u8]) -> Result<Vec<FrameEntry>, DecodeError> {
    ContainerHeader::parse(data)?;
    let mut entries = Vec::new();
    let mut offset = HEADER_SIZE;
    while offset < data.len() {
        let entry = frame_at(data, offset, entries.len() as u32)?;
        offset = entry.end();
        entries.push(entry);
    }
    if entries.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(entries)
}

#[inline]
fn read_i32(data: &[u8], offset: usize) -> i32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&data[offset..offset + 4]);
    i32::from_le_bytes(word)
}
