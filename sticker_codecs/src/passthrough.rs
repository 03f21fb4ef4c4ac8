use sticker_core::codec::Codec;

/// No-op codec: stores blocks verbatim, with no compression.
///
/// Useful for:
/// - Hand-building containers in tests, where the stored bytes *are* the
///   delta.
/// - Vector assets that were saved without their gzip wrapper.
pub struct PassThroughCodec;

impl Codec for PassThroughCodec {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress_block(&self, compressed: &[u8], _raw_len: Option<usize>) -> anyhow::Result<Vec<u8>> {
        Ok(compressed.to_vec())
    }
}
