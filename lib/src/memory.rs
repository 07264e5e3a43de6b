//! Backing memory types supported by V4L2.
//!
//! Loopback output only ever uses MMAP buffers: the kernel allocates them, and user space maps
//! them with [`crate::ioctl::mmap()`] in order to write frames. USERPTR and DMABUF memory are
//! rejected when querying buffers.
use enumn::N;

use crate::bindings;

/// All the supported V4L2 memory types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, N)]
#[repr(u32)]
pub enum MemoryType {
    Mmap = bindings::v4l2_memory_V4L2_MEMORY_MMAP,
}
