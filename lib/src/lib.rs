//! This library turns a `v4l2loopback` node into a virtual camera fed from user space. It
//! provides the following layers:
//!
//! * The `ioctl` module provides direct, thin wrappers over the V4L2 ioctls used for output
//!   streaming, with added safety. Note that "safety" here is in terms of memory safety: this
//!   layer won't guard against passing invalid data that the ioctls will reject - it just makes
//!   sure that data passed from and to the kernel can be accessed safely.
//!
//! * The `device` module provides [`device::OutputDevice`], which owns an opened node, its
//!   negotiated format and its pool of memory-mapped buffers, and presents frames to the kernel
//!   using a strict dequeue/fill/queue rotation.
//!
//! * The `manager` module provides [`manager::DeviceManager`], which loads the kernel module,
//!   waits for the device node to appear and builds the output device on top of it, then
//!   reverses all of this on teardown.
//!
//! * [`frame::Frame`] and [`pacer::FramePacer`] are the small building blocks used by the
//!   application loop that produces frames.
//!
#[doc(hidden)]
pub mod bindings;
pub mod device;
pub mod frame;
pub mod ioctl;
pub mod manager;
pub mod memory;
pub mod pacer;

#[cfg(test)]
pub(crate) mod testing;

use std::convert::TryFrom;
use std::fmt;
use std::fmt::{Debug, Display};

use enumn::N;
use thiserror::Error;

use crate::ioctl::BufferField;

/// Types of queues known to this library. Only the single-planar video queues are needed to
/// feed a loopback device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, N)]
#[repr(u32)]
pub enum QueueType {
    VideoCapture = bindings::v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE,
    VideoOutput = bindings::v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_OUTPUT,
}

impl Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

/// A Fourcc pixel format, used to pass formats to V4L2. It can be converted
/// back and forth from a 32-bit integer, or a 4-bytes string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct PixelFormat(u32);

impl PixelFormat {
    /// Packed 4:2:2 YUV, the only encoding loopback frames are produced in.
    pub const YUYV: PixelFormat = PixelFormat(bindings::V4L2_PIX_FMT_YUYV as u32);

    pub const fn from_u32(v: u32) -> Self {
        Self(v)
    }

    pub const fn to_u32(self) -> u32 {
        self.0
    }

    pub const fn from_fourcc(n: &[u8; 4]) -> Self {
        Self(n[0] as u32 | (n[1] as u32) << 8 | (n[2] as u32) << 16 | (n[3] as u32) << 24)
    }

    pub const fn to_fourcc(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

/// Converts a Fourcc in 32-bit integer format (like the ones passed in V4L2
/// structures) into the matching pixel format.
///
/// # Examples
///
/// ```
/// # use loopcam::PixelFormat;
/// // Fourcc representation of YUYV.
/// let yuyv = u32::from_le(0x56595559);
/// let f = PixelFormat::from(yuyv);
/// assert_eq!(f, PixelFormat::YUYV);
/// assert_eq!(u32::from(f), yuyv);
/// ```
impl From<u32> for PixelFormat {
    fn from(i: u32) -> Self {
        Self::from_u32(i)
    }
}

impl From<PixelFormat> for u32 {
    fn from(format: PixelFormat) -> Self {
        format.to_u32()
    }
}

/// Simple way to convert a string litteral (e.g. b"YUYV") into a pixel
/// format that can be passed to V4L2.
///
/// # Examples
///
/// ```
/// # use loopcam::PixelFormat;
/// let yuyv = b"YUYV";
/// let f = PixelFormat::from(yuyv);
/// assert_eq!(&<[u8; 4]>::from(f), yuyv);
/// ```
impl From<&[u8; 4]> for PixelFormat {
    fn from(n: &[u8; 4]) -> Self {
        Self::from_fourcc(n)
    }
}

impl From<PixelFormat> for [u8; 4] {
    fn from(format: PixelFormat) -> Self {
        format.to_fourcc()
    }
}

/// Produces a debug string for this PixelFormat, including its hexadecimal
/// and string representation.
///
/// # Examples
///
/// ```
/// # use loopcam::PixelFormat;
/// assert_eq!(format!("{:?}", PixelFormat::YUYV), "0x56595559 (YUYV)");
/// ```
impl fmt::Debug for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_fmt(format_args!("0x{:08x} ({})", self.0, self))
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let fourcc = self
            .0
            .to_le_bytes()
            .iter()
            .map(|&x| x as char)
            .collect::<String>();
        f.write_str(fourcc.as_str())
    }
}

/// Single-planar V4L2 image format.
///
/// When passed to the kernel, `bytesperline` and `sizeimage` may be left to zero and will be
/// filled by the driver. The format returned by the kernel is the one that must be used
/// afterwards, since the driver is free to adjust any of the requested values.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Format {
    /// Width of the image in pixels.
    pub width: u32,
    /// Height of the image in pixels.
    pub height: u32,
    /// Format each pixel is encoded in.
    pub pixelformat: PixelFormat,
    /// Field order of the image.
    pub field: BufferField,
    /// Bytes per line of data.
    pub bytesperline: u32,
    /// Useful size of the image ; buffers must be at least that large.
    pub sizeimage: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatConversionError {
    #[error("invalid buffer type requested")]
    InvalidBufferType(u32),
    #[error("invalid field order {0}")]
    InvalidField(u32),
}

impl TryFrom<bindings::v4l2_format> for Format {
    type Error = FormatConversionError;

    fn try_from(fmt: bindings::v4l2_format) -> std::result::Result<Self, Self::Error> {
        match fmt.type_ {
            bindings::v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE
            | bindings::v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_OUTPUT => {
                // Safe because single-planar buffer types use the `pix` member.
                let pix = unsafe { &fmt.fmt.pix };
                Ok(Format {
                    width: pix.width,
                    height: pix.height,
                    pixelformat: PixelFormat::from(pix.pixelformat),
                    field: BufferField::n(pix.field)
                        .ok_or(FormatConversionError::InvalidField(pix.field))?,
                    bytesperline: pix.bytesperline,
                    sizeimage: pix.sizeimage,
                })
            }
            t => Err(Self::Error::InvalidBufferType(t)),
        }
    }
}

/// Quickly build a usable progressive `Format` from a pixel format and resolution.
///
/// # Examples
///
/// ```
/// # use loopcam::Format;
/// # use loopcam::ioctl::BufferField;
/// let f = Format::from((b"YUYV", (1280, 720)));
/// assert_eq!(f.width, 1280);
/// assert_eq!(f.height, 720);
/// assert_eq!(f.pixelformat.to_string(), "YUYV");
/// assert_eq!(f.field, BufferField::None);
/// assert_eq!(f.sizeimage, 0);
/// ```
impl<T: Into<PixelFormat>> From<(T, (usize, usize))> for Format {
    fn from((pixel_format, (width, height)): (T, (usize, usize))) -> Self {
        Format {
            width: width as u32,
            height: height as u32,
            pixelformat: pixel_format.into(),
            field: BufferField::None,
            ..Default::default()
        }
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} {} ({} bytes per line, {} bytes per image)",
            self.width, self.height, self.pixelformat, self.bytesperline, self.sizeimage
        )
    }
}
