use std::io::Write;
use std::sync::Arc;

use anyhow::Context;

use crate::codec::Codec;
use crate::delta::xor_in_place;
use crate::format::{ContainerHeader, HEADER_SIZE};

/// Streaming writer for delta-frame containers.
///
/// # Write contract
/// Call [`write_frame`] once per frame, in playback order, with exactly
/// `width * 4 * height` bytes. Each frame is XORed against the previously
/// written frame (the first one against zeros), compressed as an independent
/// block and appended behind a 4-byte length prefix. Call [`finish`] to flush
/// the sink.
///
/// # Format layout written
/// ```text
/// [HEADER: fps:i32 width:i32 height:i32]
/// [len:i32][FRAME 0] [len:i32][FRAME 1] ... [len:i32][FRAME N-1]
/// ```
/// There is no index or footer: readers walk the length prefixes.
///
/// [`write_frame`]: ContainerWriter::write_frame
/// [`finish`]: ContainerWriter::finish
pub struct ContainerWriter<W: Write> {
    sink: W,
    codec: Arc<dyn Codec>,
    header: ContainerHeader,
    /// Last frame written, i.e. the decoder's accumulator after that frame.
    previous: Vec<u8>,
    frames: u64,
    bytes_written: u64,
}

impl<W: Write> ContainerWriter<W> {
    /// Start a container on `sink` by writing the header.
    pub fn create(
        mut sink: W,
        codec: Arc<dyn Codec>,
        header: ContainerHeader,
    ) -> anyhow::Result<Self> {
        if header.fps == 0 || header.width == 0 || header.height == 0 {
            anyhow::bail!(
                "refusing to write container with empty header {}x{} at {} fps",
                header.width,
                header.height,
                header.fps
            );
        }
        if header.width > i32::MAX as u32 || header.height > i32::MAX as u32 {
            anyhow::bail!("container dimensions {}x{} exceed i32", header.width, header.height);
        }
        sink.write_all(&header.to_bytes())
            .context("writing container header")?;
        Ok(Self {
            sink,
            codec,
            header,
            previous: vec![0u8; header.frame_size()],
            frames: 0,
            bytes_written: HEADER_SIZE as u64,
        })
    }

    /// Delta-encode, compress and append one full frame.
    pub fn write_frame(&mut self, frame: &[u8]) -> anyhow::Result<()> {
        if frame.len() != self.header.frame_size() {
            anyhow::bail!(
                "frame {} is {} bytes but {}x{} frames are {} bytes",
                self.frames,
                frame.len(),
                self.header.width,
                self.header.height,
                self.header.frame_size()
            );
        }

        // previous ^= frame turns the accumulator into the delta; compress
        // it, then restore the accumulator to `frame` for the next call.
        xor_in_place(&mut self.previous, frame);
        let compressed = self.codec.compress_block(&self.previous)?;
        self.previous.copy_from_slice(frame);

        let length = i32::try_from(compressed.len()).with_context(|| {
            format!("frame {} compressed to {} bytes", self.frames, compressed.len())
        })?;
        self.sink.write_all(&length.to_le_bytes())?;
        self.sink.write_all(&compressed)?;

        self.frames += 1;
        self.bytes_written += 4 + compressed.len() as u64;
        Ok(())
    }

    /// Number of frames written so far.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Bytes written so far, header included.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flush the sink and hand it back together with the frame count.
    pub fn finish(mut self) -> anyhow::Result<(W, u64)> {
        if self.frames == 0 {
            anyhow::bail!("container has no frames");
        }
        self.sink.flush()?;
        Ok((self.sink, self.frames))
    }
}
