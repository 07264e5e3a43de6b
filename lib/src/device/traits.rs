use crate::ioctl::{self, DqBuffer, QBuffer, QueryBuffer, RequestBuffers};
use crate::Format;

/// Error returned when querying a buffer through an [`OutputBackend`].
pub type QueryBufferError = ioctl::QueryBufError<ioctl::QueryBufferFromError>;

/// The operations an [`super::OutputDevice`] performs on the OUTPUT queue of a device.
///
/// [`super::V4l2Node`] implements them with the corresponding ioctls. Buffers are always
/// single-planar and backed by MMAP memory.
pub trait OutputBackend {
    /// A buffer of the device mapped into our address space. Dropping it unmaps the buffer.
    type Mapping: AsRef<[u8]> + AsMut<[u8]>;

    /// Request `format`, and return the format the driver actually applied.
    fn set_format(&mut self, format: Format) -> Result<Format, ioctl::SFmtError>;

    /// Read back the currently active format.
    fn get_format(&self) -> Result<Format, ioctl::GFmtError>;

    /// Allocate `count` buffers. The driver may grant a different number.
    fn request_buffers(&mut self, count: u32) -> Result<RequestBuffers, ioctl::ReqbufsError>;

    fn query_buffer(&self, index: usize) -> Result<QueryBuffer, QueryBufferError>;

    fn map_buffer(&self, buffer: &QueryBuffer) -> Result<Self::Mapping, ioctl::MmapError>;

    /// Hand buffer `index` to the driver, along with the amount of valid data it holds.
    fn queue_buffer(&mut self, index: usize, buffer: QBuffer) -> Result<(), ioctl::QBufError>;

    /// Obtain the next buffer the driver is done with.
    fn dequeue_buffer(&mut self) -> Result<DqBuffer, ioctl::DqBufError>;

    fn stream_on(&mut self) -> Result<(), ioctl::StreamOnError>;

    /// Stop streaming. All queued buffers are returned to user space.
    fn stream_off(&mut self) -> Result<(), ioctl::StreamOffError>;
}
