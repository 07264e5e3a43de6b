//! Safe wrapper for the `VIDIOC_REQBUFS` ioctl.
use std::os::unix::io::AsRawFd;

use bitflags::bitflags;
use nix::errno::Errno;
use thiserror::Error;

use crate::bindings;
use crate::bindings::v4l2_requestbuffers;
use crate::memory::MemoryType;
use crate::QueueType;

bitflags! {
    /// Memory models and features a queue supports, as reported in the `capabilities` field of
    /// `struct v4l2_requestbuffers`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BufferCapabilities: u32 {
        const SUPPORTS_MMAP = bindings::V4L2_BUF_CAP_SUPPORTS_MMAP;
        const SUPPORTS_USERPTR = bindings::V4L2_BUF_CAP_SUPPORTS_USERPTR;
        const SUPPORTS_DMABUF = bindings::V4L2_BUF_CAP_SUPPORTS_DMABUF;
        const SUPPORTS_REQUESTS = bindings::V4L2_BUF_CAP_SUPPORTS_REQUESTS;
        const SUPPORTS_ORPHANED_BUFS = bindings::V4L2_BUF_CAP_SUPPORTS_ORPHANED_BUFS;
    }
}

/// Outcome of a buffer allocation: how many buffers the driver actually created, and what the
/// queue supports.
///
/// Drivers predating buffer capabilities leave `capabilities` empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestBuffers {
    pub count: usize,
    pub capabilities: BufferCapabilities,
}

impl RequestBuffers {
    /// Whether the queue is known not to support MMAP buffers.
    pub fn lacks_mmap(&self) -> bool {
        !self.capabilities.is_empty()
            && !self
                .capabilities
                .contains(BufferCapabilities::SUPPORTS_MMAP)
    }
}

impl From<v4l2_requestbuffers> for RequestBuffers {
    fn from(reqbufs: v4l2_requestbuffers) -> Self {
        RequestBuffers {
            count: reqbufs.count as usize,
            capabilities: BufferCapabilities::from_bits_truncate(reqbufs.capabilities),
        }
    }
}

#[doc(hidden)]
mod ioctl {
    use crate::bindings::v4l2_requestbuffers;
    nix::ioctl_readwrite!(vidioc_reqbufs, b'V', 8, v4l2_requestbuffers);
}

#[derive(Debug, Error)]
pub enum ReqbufsError {
    #[error("queue {0} does not support {1:?} buffers")]
    InvalidBufferType(QueueType, MemoryType),
    #[error("buffers are still mapped or queued")]
    Busy,
    #[error("ioctl error: {0}")]
    IoctlError(Errno),
}

impl From<ReqbufsError> for Errno {
    fn from(err: ReqbufsError) -> Self {
        match err {
            ReqbufsError::InvalidBufferType(..) => Errno::EINVAL,
            ReqbufsError::Busy => Errno::EBUSY,
            ReqbufsError::IoctlError(e) => e,
        }
    }
}

/// Safe wrapper around the `VIDIOC_REQBUFS` ioctl.
///
/// The driver may allocate fewer (or more) buffers than `count`, so callers must look at the
/// returned count. A `count` of zero frees all the buffers of the queue.
pub fn reqbufs(
    fd: &impl AsRawFd,
    queue: QueueType,
    memory: MemoryType,
    count: u32,
) -> Result<RequestBuffers, ReqbufsError> {
    let mut reqbufs = v4l2_requestbuffers {
        count,
        type_: queue as u32,
        memory: memory as u32,
        ..Default::default()
    };

    match unsafe { ioctl::vidioc_reqbufs(fd.as_raw_fd(), &mut reqbufs) } {
        Ok(_) => Ok(RequestBuffers::from(reqbufs)),
        Err(Errno::EINVAL) => Err(ReqbufsError::InvalidBufferType(queue, memory)),
        Err(Errno::EBUSY) => Err(ReqbufsError::Busy),
        Err(e) => Err(ReqbufsError::IoctlError(e)),
    }
}
