use crate::format::HEADER_SIZE;

/// Broad failure classes of the decode path.
///
/// Both kinds are fatal for the playback session that hit them and neither is
/// retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The container bytes are malformed.
    Format,
    /// The vector program could not be built or rendered.
    DecodeUnavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("container header truncated: {len} bytes, need {}", HEADER_SIZE)]
    TruncatedHeader { len: usize },

    #[error("invalid container header: fps={fps} width={width} height={height}")]
    InvalidHeader { fps: i32, width: i32, height: i32 },

    #[error("container holds no frames")]
    Empty,

    #[error(
        "frame {index} at offset {offset}: length {length} overruns the {available} bytes left"
    )]
    FrameOverrun {
        index: u32,
        offset: usize,
        length: i64,
        available: usize,
    },

    #[error("frame {index} decompressed to {actual} bytes but the frame size is {expected}")]
    SizeMismatch {
        index: u32,
        expected: usize,
        actual: usize,
    },

    #[error("frame {index} failed to decompress: {source}")]
    Decompress {
        index: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("vector program unavailable for {cache_key}: {source}")]
    VectorUnavailable {
        cache_key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("vector frame {index} failed to render: {source}")]
    VectorRender {
        index: u32,
        #[source]
        source: anyhow::Error,
    },
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::VectorUnavailable { .. } | DecodeError::VectorRender { .. } => {
                ErrorKind::DecodeUnavailable
            }
            _ => ErrorKind::Format,
        }
    }
}
