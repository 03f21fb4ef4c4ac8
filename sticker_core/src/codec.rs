/// Core compression abstraction.
///
/// Each `Codec` implementation:
/// - Compresses and decompresses a single self-contained block. Delta frames
///   are XORed against each other *after* decompression, so no state is
///   shared between blocks at this level.
/// - Accepts an optional raw length hint on decompress. Block formats that do
///   not record their own output size (raw LZ4 blocks) require it; stream
///   formats (gzip) treat it as a capacity hint.
pub trait Codec: Send + Sync {
    /// Human-readable codec name for CLI display and logs.
    fn name(&self) -> &'static str;

    /// Compress a single block.
    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Decompress a single block.
    ///
    /// Returns exactly the bytes the block decodes to; callers that need a
    /// specific size must check the length themselves.
    fn decompress_block(&self, compressed: &[u8], raw_len: Option<usize>)
        -> anyhow::Result<Vec<u8>>;
}
