//! Safe wrapper for the `VIDIOC_QBUF` ioctl.
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use nix::errno::Errno;
use thiserror::Error;

use crate::bindings;
use crate::bindings::v4l2_buffer;
use crate::ioctl::{BufferField, BufferFlags};
use crate::memory::MemoryType;
use crate::QueueType;

#[doc(hidden)]
mod ioctl {
    use crate::bindings::v4l2_buffer;
    nix::ioctl_readwrite!(vidioc_qbuf, b'V', 15, v4l2_buffer);
}

#[derive(Debug, Error)]
pub enum QBufError {
    #[error("buffer {0} is invalid or already queued")]
    InvalidBuffer(usize),
    #[error("ioctl error: {0}")]
    IoctlError(Errno),
}

impl From<QBufError> for Errno {
    fn from(err: QBufError) -> Self {
        match err {
            QBufError::InvalidBuffer(_) => Errno::EINVAL,
            QBufError::IoctlError(e) => e,
        }
    }
}

/// Description of a single-planar MMAP buffer to queue, i.e. how much of it is filled with
/// valid data and the metadata that goes along with it.
#[derive(Debug, Clone, Copy)]
pub struct QBuffer {
    pub bytes_used: u32,
    pub field: BufferField,
    pub timestamp: bindings::timeval,
}

impl QBuffer {
    pub fn new(bytes_used: usize) -> Self {
        QBuffer {
            bytes_used: bytes_used as u32,
            field: BufferField::None,
            timestamp: Default::default(),
        }
    }

    /// Stamps the buffer with `time`, which drivers copying timestamps pass on to the reader.
    pub fn set_timestamp(mut self, time: Duration) -> Self {
        self.timestamp.tv_sec = time.as_secs() as bindings::__time_t;
        self.timestamp.tv_usec = time.subsec_micros() as bindings::__suseconds_t;
        self
    }

    fn to_v4l2_buffer(self, queue: QueueType, index: usize) -> v4l2_buffer {
        v4l2_buffer {
            index: index as u32,
            type_: queue as u32,
            memory: MemoryType::Mmap as u32,
            bytesused: self.bytes_used,
            field: self.field as u32,
            timestamp: self.timestamp,
            ..Default::default()
        }
    }
}

/// Safe wrapper around the `VIDIOC_QBUF` ioctl, for MMAP buffers.
///
/// Returns the flags of the buffer as updated by the driver.
pub fn qbuf(
    fd: &impl AsRawFd,
    queue: QueueType,
    index: usize,
    buffer: QBuffer,
) -> Result<BufferFlags, QBufError> {
    let mut v4l2_buf = buffer.to_v4l2_buffer(queue, index);

    match unsafe { ioctl::vidioc_qbuf(fd.as_raw_fd(), &mut v4l2_buf) } {
        Ok(_) => Ok(BufferFlags::from_bits_truncate(v4l2_buf.flags)),
        Err(Errno::EINVAL) => Err(QBufError::InvalidBuffer(index)),
        Err(e) => Err(QBufError::IoctlError(e)),
    }
}
