//! Safe wrapper for the `VIDIOC_DQBUF` ioctl.
use std::fmt::Debug;
use std::os::unix::io::AsRawFd;

use nix::errno::Errno;
use thiserror::Error;

use crate::bindings::v4l2_buffer;
use crate::ioctl::BufferFlags;
use crate::memory::MemoryType;
use crate::QueueType;

/// Information for a dequeued single-planar buffer. Safe variant of `struct v4l2_buffer`.
#[derive(Clone, Copy)]
pub struct DqBuffer {
    v4l2_buffer: v4l2_buffer,
}

impl From<v4l2_buffer> for DqBuffer {
    fn from(v4l2_buffer: v4l2_buffer) -> Self {
        DqBuffer { v4l2_buffer }
    }
}

impl Debug for DqBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DqBuffer")
            .field("index", &self.index())
            .field("flags", &self.flags())
            .field("sequence", &self.sequence())
            .field("bytesused", &self.bytesused())
            .finish()
    }
}

impl DqBuffer {
    pub fn index(&self) -> usize {
        self.v4l2_buffer.index as usize
    }

    pub fn flags(&self) -> BufferFlags {
        BufferFlags::from_bits_truncate(self.v4l2_buffer.flags)
    }

    pub fn is_error(&self) -> bool {
        self.flags().contains(BufferFlags::ERROR)
    }

    pub fn sequence(&self) -> u32 {
        self.v4l2_buffer.sequence
    }

    pub fn bytesused(&self) -> u32 {
        self.v4l2_buffer.bytesused
    }
}

#[doc(hidden)]
mod ioctl {
    use crate::bindings::v4l2_buffer;
    nix::ioctl_readwrite!(vidioc_dqbuf, b'V', 17, v4l2_buffer);
}

#[derive(Debug, Error)]
pub enum DqBufError {
    #[error("no buffer ready for dequeue")]
    NotReady,
    #[error("end-of-stream reached")]
    Eos,
    #[error("ioctl error: {0}")]
    IoctlError(Errno),
}

impl From<Errno> for DqBufError {
    fn from(error: Errno) -> Self {
        match error {
            Errno::EAGAIN => Self::NotReady,
            Errno::EPIPE => Self::Eos,
            error => Self::IoctlError(error),
        }
    }
}

impl From<DqBufError> for Errno {
    fn from(err: DqBufError) -> Self {
        match err {
            DqBufError::NotReady => Errno::EAGAIN,
            DqBufError::Eos => Errno::EPIPE,
            DqBufError::IoctlError(e) => e,
        }
    }
}

/// Safe wrapper around the `VIDIOC_DQBUF` ioctl, for MMAP buffers.
///
/// If the device has been opened in non-blocking mode and no buffer is done yet,
/// [`DqBufError::NotReady`] is returned.
pub fn dqbuf<O: From<v4l2_buffer>>(fd: &impl AsRawFd, queue: QueueType) -> Result<O, DqBufError> {
    let mut v4l2_buf = v4l2_buffer {
        type_: queue as u32,
        memory: MemoryType::Mmap as u32,
        ..Default::default()
    };

    unsafe { ioctl::vidioc_dqbuf(fd.as_raw_fd(), &mut v4l2_buf) }?;
    Ok(O::from(v4l2_buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings;

    #[test]
    fn test_dqbuffer_accessors() {
        let v4l2_buf = v4l2_buffer {
            index: 1,
            type_: bindings::v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_OUTPUT,
            flags: bindings::V4L2_BUF_FLAG_MAPPED | bindings::V4L2_BUF_FLAG_DONE,
            sequence: 27,
            bytesused: 1843200,
            length: 1843200,
            ..Default::default()
        };

        let dqbuf = DqBuffer::from(v4l2_buf);
        assert_eq!(dqbuf.index(), 1);
        assert_eq!(dqbuf.flags(), BufferFlags::MAPPED | BufferFlags::DONE);
        assert!(!dqbuf.is_error());
        assert_eq!(dqbuf.sequence(), 27);
        assert_eq!(dqbuf.bytesused(), 1843200);

        let failed = DqBuffer::from(v4l2_buffer {
            flags: bindings::V4L2_BUF_FLAG_ERROR,
            ..v4l2_buf
        });
        assert!(failed.is_error());
    }

    #[test]
    fn test_dqbuf_error_from_errno() {
        assert!(matches!(DqBufError::from(Errno::EAGAIN), DqBufError::NotReady));
        assert!(matches!(DqBufError::from(Errno::EPIPE), DqBufError::Eos));
        assert!(matches!(
            DqBufError::from(Errno::EIO),
            DqBufError::IoctlError(Errno::EIO)
        ));
        assert_eq!(Errno::from(DqBufError::NotReady), Errno::EAGAIN);
    }
}
