//! Owning, higher-level abstractions over a V4L2 output node.
//!
//! [`V4l2Node`] is an opened device node whose capabilities have been checked, and
//! [`OutputDevice`] drives its OUTPUT queue: it negotiates the format, maps the buffers the driver
//! allocated and presents frames to the kernel. The ioctls the output device needs are reached
//! through the [`OutputBackend`] trait, so the streaming logic can also run against an in-memory
//! implementation.
mod output;
mod traits;

pub use output::*;
pub use traits::*;

use crate::ioctl::{self, Capabilities, Capability, QueryBuffer};
use crate::memory::MemoryType;
use crate::{Format, PixelFormat, QueueType};
use log::{info, warn};
use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use std::fs::File;
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, FromRawFd, RawFd};
use std::path::Path;
use thiserror::Error;

/// Options for opening a device node and setting up its output queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    width: u32,
    height: u32,
    pixelformat: PixelFormat,
    num_buffers: u32,
    non_blocking_dqbuf: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            width: 1280,
            height: 720,
            pixelformat: PixelFormat::YUYV,
            num_buffers: 4,
            non_blocking_dqbuf: false,
        }
    }
}

impl DeviceConfig {
    pub fn new() -> Self {
        Default::default()
    }

    /// Resolution of the frames that will be presented.
    pub fn size(self, width: u32, height: u32) -> Self {
        DeviceConfig {
            width,
            height,
            ..self
        }
    }

    /// Number of buffers to request. The driver may grant fewer, but at least 2 are required.
    pub fn num_buffers(self, num_buffers: u32) -> Self {
        DeviceConfig {
            num_buffers,
            ..self
        }
    }

    /// Open the node with `O_NONBLOCK`, so presenting a frame fails instead of waiting when
    /// no buffer has been released by the driver yet.
    pub fn non_blocking_dqbuf(self) -> Self {
        DeviceConfig {
            non_blocking_dqbuf: true,
            ..self
        }
    }

    /// The format that will be requested from the driver.
    pub fn format(&self) -> Format {
        Format::from((self.pixelformat, (self.width as usize, self.height as usize)))
    }

    pub fn requested_buffers(&self) -> u32 {
        self.num_buffers
    }

    pub fn is_non_blocking(&self) -> bool {
        self.non_blocking_dqbuf
    }
}

#[derive(Debug, Error)]
pub enum DeviceOpenError {
    #[error("error while opening device: {0}")]
    OpenError(#[from] nix::Error),
    #[error("error while querying device capabilities: {0}")]
    QueryCapError(#[from] ioctl::QueryCapError),
}

/// An opened V4L2 device node.
///
/// The file descriptor is closed when this object is dropped.
pub struct V4l2Node {
    fd: File,
}

impl V4l2Node {
    /// Opens the node at `path` for reading and writing, and queries its capabilities.
    pub fn open(path: &Path, config: &DeviceConfig) -> Result<Self, DeviceOpenError> {
        let flags = OFlag::O_RDWR
            | OFlag::O_CLOEXEC
            | if config.non_blocking_dqbuf {
                OFlag::O_NONBLOCK
            } else {
                OFlag::empty()
            };

        // Safe because `open` just returned a file descriptor that nobody else owns.
        let fd = unsafe { File::from_raw_fd(open(path, flags, Mode::empty())?) };
        let capability: Capability = ioctl::querycap(&fd)?;

        info!(
            "Opened {}: driver {}, card {}, bus {}",
            path.display(),
            capability.driver,
            capability.card,
            capability.bus_info
        );
        if !capability
            .device_caps()
            .contains(Capabilities::VIDEO_OUTPUT)
        {
            warn!(
                "{} does not advertise video output capability ({})",
                path.display(),
                capability.device_caps()
            );
        }

        Ok(V4l2Node { fd })
    }
}

impl AsRawFd for V4l2Node {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl AsFd for V4l2Node {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

const QUEUE: QueueType = QueueType::VideoOutput;

impl OutputBackend for V4l2Node {
    type Mapping = ioctl::PlaneMapping;

    fn set_format(&mut self, format: Format) -> Result<Format, ioctl::SFmtError> {
        ioctl::s_fmt(self, (QUEUE, &format))
    }

    fn get_format(&self) -> Result<Format, ioctl::GFmtError> {
        ioctl::g_fmt(self, QUEUE)
    }

    fn request_buffers(
        &mut self,
        count: u32,
    ) -> Result<ioctl::RequestBuffers, ioctl::ReqbufsError> {
        ioctl::reqbufs(&*self, QUEUE, MemoryType::Mmap, count)
    }

    fn query_buffer(&self, index: usize) -> Result<QueryBuffer, QueryBufferError> {
        ioctl::querybuf(self, QUEUE, MemoryType::Mmap, index)
    }

    fn map_buffer(&self, buffer: &QueryBuffer) -> Result<Self::Mapping, ioctl::MmapError> {
        ioctl::mmap(self, buffer.mem_offset, buffer.length)
    }

    fn queue_buffer(
        &mut self,
        index: usize,
        buffer: ioctl::QBuffer,
    ) -> Result<(), ioctl::QBufError> {
        ioctl::qbuf(&*self, QUEUE, index, buffer).map(|_| ())
    }

    fn dequeue_buffer(&mut self) -> Result<ioctl::DqBuffer, ioctl::DqBufError> {
        ioctl::dqbuf(&*self, QUEUE)
    }

    fn stream_on(&mut self) -> Result<(), ioctl::StreamOnError> {
        ioctl::streamon(&*self, QUEUE)
    }

    fn stream_off(&mut self) -> Result<(), ioctl::StreamOffError> {
        ioctl::streamoff(&*self, QUEUE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ioctl::BufferField;

    #[test]
    fn test_device_config_defaults() {
        let config = DeviceConfig::new();
        let format = config.format();

        assert_eq!(format.width, 1280);
        assert_eq!(format.height, 720);
        assert_eq!(format.pixelformat, PixelFormat::YUYV);
        assert_eq!(format.field, BufferField::None);
        assert_eq!(config.requested_buffers(), 4);
        assert!(!config.is_non_blocking());
    }

    #[test]
    fn test_device_config_builder() {
        let config = DeviceConfig::new()
            .size(640, 480)
            .num_buffers(2)
            .non_blocking_dqbuf();

        assert_eq!(config.format().width, 640);
        assert_eq!(config.format().height, 480);
        assert_eq!(config.requested_buffers(), 2);
        assert!(config.is_non_blocking());
    }

    #[test]
    fn test_open_missing_node() {
        let err = V4l2Node::open(
            Path::new("/nonexistent/loopcam/video42"),
            &DeviceConfig::new(),
        )
        .err()
        .unwrap();

        assert!(matches!(
            err,
            DeviceOpenError::OpenError(nix::errno::Errno::ENOENT)
        ));
    }
}
