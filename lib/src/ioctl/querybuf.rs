//! Safe wrapper for the `VIDIOC_QUERYBUF` ioctl.
use std::convert::TryFrom;
use std::os::unix::io::AsRawFd;

use nix::errno::Errno;
use thiserror::Error;

use crate::bindings::v4l2_buffer;
use crate::ioctl::BufferFlags;
use crate::memory::MemoryType;
use crate::QueueType;

/// Contains all the information that makes sense when using `querybuf` on a single-planar MMAP
/// buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryBuffer {
    pub index: usize,
    pub flags: BufferFlags,
    /// Offset to pass to `mmap()` in order to obtain a mapping for this buffer.
    pub mem_offset: u32,
    /// Length of the buffer.
    pub length: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryBufferFromError {
    #[error("unknown queue type {0}")]
    UnknownQueueType(u32),
    #[error("buffer uses memory type {0}, only MMAP buffers can be mapped")]
    NotMmap(u32),
}

impl TryFrom<v4l2_buffer> for QueryBuffer {
    type Error = QueryBufferFromError;

    fn try_from(v4l2_buf: v4l2_buffer) -> Result<Self, Self::Error> {
        QueueType::n(v4l2_buf.type_)
            .ok_or(QueryBufferFromError::UnknownQueueType(v4l2_buf.type_))?;
        if MemoryType::n(v4l2_buf.memory) != Some(MemoryType::Mmap) {
            return Err(QueryBufferFromError::NotMmap(v4l2_buf.memory));
        }

        Ok(QueryBuffer {
            index: v4l2_buf.index as usize,
            flags: BufferFlags::from_bits_truncate(v4l2_buf.flags),
            // Safe because we just checked that this is an MMAP buffer.
            mem_offset: unsafe { v4l2_buf.m.offset },
            length: v4l2_buf.length,
        })
    }
}

#[doc(hidden)]
mod ioctl {
    use crate::bindings::v4l2_buffer;
    nix::ioctl_readwrite!(vidioc_querybuf, b'V', 9, v4l2_buffer);
}

#[derive(Debug, Error)]
pub enum QueryBufError<CE: std::fmt::Debug> {
    #[error("error while converting from v4l2_buffer: {0:?}")]
    ConversionError(CE),
    #[error("ioctl error: {0}")]
    IoctlError(#[from] Errno),
}

impl<CE: std::fmt::Debug> From<QueryBufError<CE>> for Errno {
    fn from(err: QueryBufError<CE>) -> Self {
        match err {
            QueryBufError::ConversionError(_) => Errno::EINVAL,
            QueryBufError::IoctlError(e) => e,
        }
    }
}

/// Safe wrapper around the `VIDIOC_QUERYBUF` ioctl.
pub fn querybuf<T: TryFrom<v4l2_buffer>>(
    fd: &impl AsRawFd,
    queue: QueueType,
    memory: MemoryType,
    index: usize,
) -> Result<T, QueryBufError<T::Error>>
where
    T::Error: std::fmt::Debug,
{
    let mut v4l2_buf = v4l2_buffer {
        index: index as u32,
        type_: queue as u32,
        memory: memory as u32,
        ..Default::default()
    };

    unsafe { ioctl::vidioc_querybuf(fd.as_raw_fd(), &mut v4l2_buf) }?;
    T::try_from(v4l2_buf).map_err(QueryBufError::ConversionError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings;

    #[test]
    fn test_query_buffer_from_v4l2_buffer() {
        let mut v4l2_buf = v4l2_buffer {
            index: 3,
            type_: bindings::v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_OUTPUT,
            memory: bindings::v4l2_memory_V4L2_MEMORY_MMAP,
            flags: bindings::V4L2_BUF_FLAG_MAPPED,
            length: 1843200,
            ..Default::default()
        };
        v4l2_buf.m.offset = 0x1c2000;

        let query_buf = QueryBuffer::try_from(v4l2_buf).unwrap();
        assert_eq!(
            query_buf,
            QueryBuffer {
                index: 3,
                flags: BufferFlags::MAPPED,
                mem_offset: 0x1c2000,
                length: 1843200,
            }
        );
    }

    #[test]
    fn test_query_buffer_rejects_invalid_buffers() {
        let v4l2_buf = v4l2_buffer {
            type_: 42,
            memory: bindings::v4l2_memory_V4L2_MEMORY_MMAP,
            ..Default::default()
        };
        assert_eq!(
            QueryBuffer::try_from(v4l2_buf).err(),
            Some(QueryBufferFromError::UnknownQueueType(42))
        );

        let v4l2_buf = v4l2_buffer {
            type_: bindings::v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_OUTPUT,
            memory: bindings::v4l2_memory_V4L2_MEMORY_USERPTR,
            ..Default::default()
        };
        assert_eq!(
            QueryBuffer::try_from(v4l2_buf).err(),
            Some(QueryBufferFromError::NotMmap(
                bindings::v4l2_memory_V4L2_MEMORY_USERPTR
            ))
        );
    }
}
