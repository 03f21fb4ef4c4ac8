use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sticker_core::codec::Codec;

/// Gzip codec for the wrapper around vector animation files.
///
/// Unlike LZ4 blocks a gzip member records its own end, so `raw_len` is only
/// used to pre-size the output.
pub struct GzipCodec {
    /// Compression level (0 = store, 9 = smallest).
    pub level: u32,
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl GzipCodec {
    pub fn new(level: u32) -> Self {
        Self { level }
    }
}

impl Codec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level));
        encoder.write_all(raw)?;
        Ok(encoder.finish()?)
    }

    fn decompress_block(&self, compressed: &[u8], raw_len: Option<usize>) -> anyhow::Result<Vec<u8>> {
        let mut raw = Vec::with_capacity(raw_len.unwrap_or(compressed.len() * 4));
        GzDecoder::new(compressed)
            .read_to_end(&mut raw)
            .map_err(|e| anyhow::anyhow!("gzip decompress error: {}", e))?;
        Ok(raw)
    }
}
