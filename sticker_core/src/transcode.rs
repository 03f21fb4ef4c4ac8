use std::sync::Arc;

use anyhow::Context;

use crate::codec::Codec;
use crate::color::argb_to_yuva;
use crate::format::{frame_size, ContainerHeader};
use crate::source::FrameSource;
use crate::vector::{VectorBackend, VectorDecoder};
use crate::writer::ContainerWriter;

/// Render every frame of a gzip-wrapped vector animation at `width`x`height`
/// and pack the result into a delta-frame container.
///
/// `unzip` unwraps the payload, `frame_codec` compresses the deltas (LZ4 for
/// containers the player is expected to read).
pub fn transcode_vector(
    payload: &[u8],
    cache_key: &str,
    width: u32,
    height: u32,
    unzip: &dyn Codec,
    backend: &dyn VectorBackend,
    frame_codec: Arc<dyn Codec>,
) -> anyhow::Result<Vec<u8>> {
    let mut decoder = VectorDecoder::open(payload, cache_key, unzip, backend, width, height)
        .with_context(|| format!("opening {cache_key} for transcoding"))?;
    let fps = decoder.fps();
    let frame_count = decoder.frame_count();

    let header = ContainerHeader { fps, width, height };
    let mut writer = ContainerWriter::create(Vec::new(), frame_codec, header)?;
    let mut yuva = vec![0u8; frame_size(width, height)];
    for index in 0..frame_count {
        let argb = decoder.render_frame(index)?;
        argb_to_yuva(argb, &mut yuva);
        writer.write_frame(&yuva)?;
    }
    let (container, frames) = writer.finish()?;
    log::debug!(
        "transcoded {cache_key}: {frames} frames at {width}x{height}@{fps} into {} bytes",
        container.len()
    );
    Ok(container)
}
