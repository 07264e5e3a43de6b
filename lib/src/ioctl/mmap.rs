//! Memory-mapping of MMAP buffers allocated by the driver.
use core::num::NonZeroUsize;
use std::ops::{Deref, DerefMut};
use std::os::unix::io::AsFd;
use std::ptr::NonNull;
use std::slice;

use log::error;
use nix::errno::Errno;
use nix::libc::{c_void, off_t};
use nix::sys::mman;
use thiserror::Error;

/// A buffer of the device mapped into our address space. The mapping is released when this
/// object is dropped, so it must not outlive the file descriptor it has been obtained from.
pub struct PlaneMapping {
    ptr: NonNull<c_void>,
    len: usize,
}

// The mapping is exclusively owned, like a `Box<[u8]>`.
unsafe impl Send for PlaneMapping {}

impl Deref for PlaneMapping {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        // Safe because `ptr` points to `len` bytes mapped for as long as we live.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr() as *const u8, self.len) }
    }
}

impl DerefMut for PlaneMapping {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // Safe because the mapping is writable and exclusively borrowed.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr() as *mut u8, self.len) }
    }
}

impl AsRef<[u8]> for PlaneMapping {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl AsMut<[u8]> for PlaneMapping {
    fn as_mut(&mut self) -> &mut [u8] {
        self
    }
}

impl Drop for PlaneMapping {
    fn drop(&mut self) {
        // Safe because the pointer and length were constructed in mmap() and
        // are always valid.
        unsafe { mman::munmap(self.ptr, self.len) }.unwrap_or_else(|e| {
            error!("Error while unmapping plane: {}", e);
        });
    }
}

#[derive(Debug, Error)]
pub enum MmapError {
    #[error("cannot map a buffer of length 0")]
    ZeroLength,
    #[error("ioctl error: {0}")]
    IoctlError(#[from] Errno),
}

impl From<MmapError> for Errno {
    fn from(err: MmapError) -> Self {
        match err {
            MmapError::ZeroLength => Errno::EINVAL,
            MmapError::IoctlError(e) => e,
        }
    }
}

/// Maps `length` bytes of the buffer found at `mem_offset` (as returned by `querybuf`) for
/// reading and writing.
pub fn mmap(fd: &impl AsFd, mem_offset: u32, length: u32) -> Result<PlaneMapping, MmapError> {
    let non_zero_length = NonZeroUsize::new(length as usize).ok_or(MmapError::ZeroLength)?;
    let ptr = unsafe {
        mman::mmap(
            None,
            non_zero_length,
            mman::ProtFlags::PROT_READ | mman::ProtFlags::PROT_WRITE,
            mman::MapFlags::MAP_SHARED,
            fd,
            mem_offset as off_t,
        )
    }?;

    Ok(PlaneMapping {
        ptr,
        len: length as usize,
    })
}
