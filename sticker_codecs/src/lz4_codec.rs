use sticker_core::codec::Codec;

/// Raw LZ4 block codec.
///
/// Blocks carry no size prefix and no frame header, which is the layout the
/// container format stores: the decoder already knows every frame is
/// `width * 4 * height` bytes and passes that as the raw length.
///
/// Fastest decompression of all bundled codecs, which matters when dozens of
/// stickers share one decode worker.
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(lz4_flex::block::compress(raw))
    }

    fn decompress_block(&self, compressed: &[u8], raw_len: Option<usize>) -> anyhow::Result<Vec<u8>> {
        let raw_len = raw_len
            .ok_or_else(|| anyhow::anyhow!("lz4 block decoding needs the raw length"))?;
        let raw = lz4_flex::block::decompress(compressed, raw_len)
            .map_err(|e| anyhow::anyhow!("lz4 decompress error: {}", e))?;
        Ok(raw)
    }
}
