//! Safe wrapper for the `VIDIOC_(G|S)_FMT` ioctls.
use nix::errno::Errno;
use std::convert::{TryFrom, TryInto};
use std::os::unix::io::AsRawFd;
use thiserror::Error;

use crate::bindings;
use crate::bindings::v4l2_format;
use crate::Format;
use crate::QueueType;

impl From<(QueueType, &Format)> for v4l2_format {
    fn from((queue, format): (QueueType, &Format)) -> Self {
        v4l2_format {
            type_: queue as u32,
            fmt: bindings::v4l2_format__bindgen_ty_1 {
                pix: bindings::v4l2_pix_format {
                    width: format.width,
                    height: format.height,
                    pixelformat: format.pixelformat.into(),
                    field: format.field as u32,
                    bytesperline: format.bytesperline,
                    sizeimage: format.sizeimage,
                    ..Default::default()
                },
            },
        }
    }
}

#[doc(hidden)]
mod ioctl {
    use crate::bindings::v4l2_format;
    nix::ioctl_readwrite!(vidioc_g_fmt, b'V', 4, v4l2_format);
    nix::ioctl_readwrite!(vidioc_s_fmt, b'V', 5, v4l2_format);
}

#[derive(Debug, Error)]
pub enum GFmtError {
    #[error("error while converting from V4L2 format")]
    FromV4L2FormatConversionError,
    #[error("invalid buffer type requested")]
    InvalidBufferType,
    #[error("unexpected ioctl error: {0}")]
    IoctlError(Errno),
}

impl From<GFmtError> for Errno {
    fn from(err: GFmtError) -> Self {
        match err {
            GFmtError::FromV4L2FormatConversionError => Errno::EINVAL,
            GFmtError::InvalidBufferType => Errno::EINVAL,
            GFmtError::IoctlError(e) => e,
        }
    }
}

/// Safe wrapper around the `VIDIOC_G_FMT` ioctl.
pub fn g_fmt<O: TryFrom<v4l2_format>>(fd: &impl AsRawFd, queue: QueueType) -> Result<O, GFmtError> {
    let mut fmt = v4l2_format {
        type_: queue as u32,
        ..Default::default()
    };

    match unsafe { ioctl::vidioc_g_fmt(fd.as_raw_fd(), &mut fmt) } {
        Ok(_) => Ok(fmt
            .try_into()
            .map_err(|_| GFmtError::FromV4L2FormatConversionError)?),
        Err(Errno::EINVAL) => Err(GFmtError::InvalidBufferType),
        Err(e) => Err(GFmtError::IoctlError(e)),
    }
}

#[derive(Debug, Error)]
pub enum SFmtError {
    #[error("error while converting from V4L2 format")]
    FromV4L2FormatConversionError,
    #[error("invalid buffer type requested")]
    InvalidBufferType,
    #[error("device currently busy")]
    DeviceBusy,
    #[error("ioctl error: {0}")]
    IoctlError(Errno),
}

impl From<SFmtError> for Errno {
    fn from(err: SFmtError) -> Self {
        match err {
            SFmtError::FromV4L2FormatConversionError => Errno::EINVAL,
            SFmtError::InvalidBufferType => Errno::EINVAL,
            SFmtError::DeviceBusy => Errno::EBUSY,
            SFmtError::IoctlError(e) => e,
        }
    }
}

/// Safe wrapper around the `VIDIOC_S_FMT` ioctl.
///
/// The driver may adjust the requested format: the returned value is the format that has
/// actually been applied.
pub fn s_fmt<I: Into<v4l2_format>, O: TryFrom<v4l2_format>>(
    fd: &mut impl AsRawFd,
    format: I,
) -> Result<O, SFmtError> {
    let mut fmt: v4l2_format = format.into();

    match unsafe { ioctl::vidioc_s_fmt(fd.as_raw_fd(), &mut fmt) } {
        Ok(_) => Ok(fmt
            .try_into()
            .map_err(|_| SFmtError::FromV4L2FormatConversionError)?),
        Err(Errno::EINVAL) => Err(SFmtError::InvalidBufferType),
        Err(Errno::EBUSY) => Err(SFmtError::DeviceBusy),
        Err(e) => Err(SFmtError::IoctlError(e)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ioctl::BufferField;
    use crate::FormatConversionError;
    use crate::PixelFormat;

    #[test]
    // Convert from Format to single-planar v4l2_format and back.
    fn splane_to_v4l2_format() {
        let splane = Format {
            width: 1280,
            height: 720,
            pixelformat: PixelFormat::YUYV,
            field: BufferField::None,
            bytesperline: 2560,
            sizeimage: 1843200,
        };
        let v4l2_format = v4l2_format::from((QueueType::VideoOutput, &splane));
        assert_eq!(v4l2_format.type_, bindings::v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_OUTPUT);
        assert_eq!(
            unsafe { v4l2_format.fmt.pix.pixelformat },
            PixelFormat::YUYV.to_u32()
        );

        let splane2: Format = v4l2_format.try_into().unwrap();
        assert_eq!(splane, splane2);
    }

    #[test]
    fn invalid_v4l2_format() {
        let mut v4l2_format = v4l2_format::from((
            QueueType::VideoOutput,
            &Format::from((b"YUYV", (640, 480))),
        ));

        unsafe { v4l2_format.fmt.pix.field = 42 };
        assert_eq!(
            Format::try_from(v4l2_format).err(),
            Some(FormatConversionError::InvalidField(42))
        );

        v4l2_format.type_ = 9;
        assert_eq!(
            Format::try_from(v4l2_format).err(),
            Some(FormatConversionError::InvalidBufferType(9))
        );
    }
}
