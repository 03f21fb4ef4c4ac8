pub mod cache;
pub mod codec;
pub mod color;
pub mod delta;
pub mod error;
pub mod format;
pub mod reader;
pub mod source;
pub mod transcode;
pub mod vector;
pub mod writer;

pub use cache::{AccessGuard, FrameCache, PurgeableData};
pub use codec::Codec;
pub use error::{DecodeError, ErrorKind};
pub use format::{
    ContainerHeader, FrameBuffer, FrameEntry, PixelLayout, HEADER_SIZE, MAX_FRAME_BYTES,
};
pub use reader::ContainerDecoder;
pub use source::FrameSource;
pub use transcode::transcode_vector;
pub use vector::{VectorBackend, VectorDecoder, VectorProgram};
pub use writer::ContainerWriter;
