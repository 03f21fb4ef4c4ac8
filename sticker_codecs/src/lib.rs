mod gzip_codec;
mod lottie;
mod lz4_codec;
mod passthrough;

pub use gzip_codec::GzipCodec;
pub use lottie::{LottieBackend, LottieDocument, LottieProgram};
pub use lz4_codec::Lz4Codec;
pub use passthrough::PassThroughCodec;

use std::sync::Arc;
use sticker_core::Codec;

/// Resolve a codec from its CLI name.
pub fn codec_by_name(name: &str) -> anyhow::Result<Arc<dyn Codec>> {
    match name {
        "lz4" | "l" => Ok(Arc::new(Lz4Codec)),
        "gzip" | "gz" => Ok(Arc::new(GzipCodec::default())),
        "passthrough" | "pass" | "none" => Ok(Arc::new(PassThroughCodec)),
        other => anyhow::bail!(
            "unknown codec '{}'. Valid options: lz4, gzip, passthrough",
            other
        ),
    }
}

/// Unwrap a vector asset: gzip when it carries the gzip magic, verbatim
/// otherwise (plain `.json` Lottie files).
pub fn unzip_codec_for(payload: &[u8]) -> Arc<dyn Codec> {
    if payload.starts_with(&[0x1f, 0x8b]) {
        Arc::new(GzipCodec::default())
    } else {
        Arc::new(PassThroughCodec)
    }
}
