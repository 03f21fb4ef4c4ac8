use crate::error::DecodeError;
use crate::format::FrameBuffer;

/// An endless, cyclic producer of frames driven by the playback timer.
///
/// Implemented by [`ContainerDecoder`](crate::ContainerDecoder) and
/// [`VectorDecoder`](crate::VectorDecoder). Sources are moved to the decode
/// worker, hence `Send`.
pub trait FrameSource: Send {
    /// Frames per second the source wants to be ticked at. Never zero.
    fn fps(&self) -> u32;

    /// Index of the frame the next call to [`next_frame`](Self::next_frame)
    /// will produce.
    fn frame_index(&self) -> u32;

    /// Produce the current frame and advance, wrapping after the last one.
    ///
    /// An error leaves the source in an unspecified position; the session
    /// that owns it is expected to give up on it.
    fn next_frame(&mut self) -> Result<FrameBuffer, DecodeError>;
}
