//! Safe wrapper for the `VIDIOC_QUERYCAP` ioctl.
use super::string_from_cstr;
use crate::bindings;
use crate::bindings::v4l2_capability;
use bitflags::bitflags;
use nix::errno::Errno;
use std::fmt;
use std::os::unix::io::AsRawFd;
use thiserror::Error;

bitflags! {
    /// Flags returned by the `VIDIOC_QUERYCAP` ioctl into the `capabilities`
    /// or `device_capabilities` field of `v4l2_capability`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        const VIDEO_CAPTURE = bindings::V4L2_CAP_VIDEO_CAPTURE;
        const VIDEO_OUTPUT = bindings::V4L2_CAP_VIDEO_OUTPUT;
        const VIDEO_OVERLAY = bindings::V4L2_CAP_VIDEO_OVERLAY;
        const VIDEO_CAPTURE_MPLANE = bindings::V4L2_CAP_VIDEO_CAPTURE_MPLANE;
        const VIDEO_OUTPUT_MPLANE = bindings::V4L2_CAP_VIDEO_OUTPUT_MPLANE;
        const VIDEO_M2M_MPLANE = bindings::V4L2_CAP_VIDEO_M2M_MPLANE;
        const VIDEO_M2M = bindings::V4L2_CAP_VIDEO_M2M;
        const READWRITE = bindings::V4L2_CAP_READWRITE;
        const STREAMING = bindings::V4L2_CAP_STREAMING;
        const DEVICE_CAPS = bindings::V4L2_CAP_DEVICE_CAPS;
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Used to get the capability flags from a `VIDIOC_QUERYCAP` ioctl.
impl From<v4l2_capability> for Capabilities {
    fn from(qcap: v4l2_capability) -> Self {
        Capabilities::from_bits_truncate(qcap.capabilities)
    }
}

/// Safe variant of the `v4l2_capability` struct.
#[derive(Debug, Clone)]
pub struct Capability {
    pub driver: String,
    pub card: String,
    pub bus_info: String,
    pub version: u32,
    pub capabilities: Capabilities,
    pub device_caps: Option<Capabilities>,
}

impl Capability {
    /// Returns the set of capabilities of the hardware as a whole.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Returns the capabilities that apply to the currently opened V4L2 node.
    ///
    /// Drivers that do not report per-node capabilities are assumed to expose all of them on
    /// every node.
    pub fn device_caps(&self) -> Capabilities {
        self.device_caps
            .unwrap_or_else(|| self.capabilities.difference(Capabilities::DEVICE_CAPS))
    }
}

impl From<v4l2_capability> for Capability {
    fn from(qcap: v4l2_capability) -> Self {
        Capability {
            driver: string_from_cstr(&qcap.driver).unwrap_or_else(|_| "".into()),
            card: string_from_cstr(&qcap.card).unwrap_or_else(|_| "".into()),
            bus_info: string_from_cstr(&qcap.bus_info).unwrap_or_else(|_| "".into()),
            version: qcap.version,
            capabilities: Capabilities::from_bits_truncate(qcap.capabilities),
            device_caps: if qcap.capabilities & bindings::V4L2_CAP_DEVICE_CAPS != 0 {
                Some(Capabilities::from_bits_truncate(qcap.device_caps))
            } else {
                None
            },
        }
    }
}

#[doc(hidden)]
mod ioctl {
    use crate::bindings::v4l2_capability;
    nix::ioctl_read!(vidioc_querycap, b'V', 0, v4l2_capability);
}

#[derive(Debug, Error)]
pub enum QueryCapError {
    #[error("ioctl error: {0}")]
    IoctlError(Errno),
}

impl From<QueryCapError> for Errno {
    fn from(err: QueryCapError) -> Self {
        match err {
            QueryCapError::IoctlError(e) => e,
        }
    }
}

/// Safe wrapper around the `VIDIOC_QUERYCAP` ioctl.
pub fn querycap<T: From<v4l2_capability>>(fd: &impl AsRawFd) -> Result<T, QueryCapError> {
    let mut qcap: v4l2_capability = Default::default();

    match unsafe { ioctl::vidioc_querycap(fd.as_raw_fd(), &mut qcap) } {
        Ok(_) => Ok(T::from(qcap)),
        Err(e) => Err(QueryCapError::IoctlError(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_capability(capabilities: u32, device_caps: u32) -> v4l2_capability {
        let mut qcap: v4l2_capability = Default::default();
        qcap.driver[..12].copy_from_slice(b"v4l2 loopbac");
        qcap.card[..11].copy_from_slice(b"Test Camera");
        qcap.bus_info[..17].copy_from_slice(b"platform:v4l2loop");
        qcap.capabilities = capabilities;
        qcap.device_caps = device_caps;
        qcap
    }

    #[test]
    fn test_capability_from_raw() {
        let caps: Capability = raw_capability(
            bindings::V4L2_CAP_VIDEO_OUTPUT
                | bindings::V4L2_CAP_STREAMING
                | bindings::V4L2_CAP_DEVICE_CAPS,
            bindings::V4L2_CAP_VIDEO_OUTPUT,
        )
        .into();

        assert_eq!(caps.driver, "v4l2 loopbac");
        assert_eq!(caps.card, "Test Camera");
        assert_eq!(caps.bus_info, "platform:v4l2loop");
        assert!(caps.capabilities().contains(Capabilities::STREAMING));
        assert_eq!(caps.device_caps(), Capabilities::VIDEO_OUTPUT);
    }

    #[test]
    fn test_capability_without_device_caps() {
        let caps: Capability = raw_capability(
            bindings::V4L2_CAP_VIDEO_OUTPUT | bindings::V4L2_CAP_VIDEO_CAPTURE,
            0,
        )
        .into();

        assert!(caps.device_caps.is_none());
        assert_eq!(
            caps.device_caps(),
            Capabilities::VIDEO_OUTPUT | Capabilities::VIDEO_CAPTURE
        );
    }

    #[test]
    fn test_device_caps_fallback_strips_device_caps_flag() {
        let caps = Capability {
            driver: "v4l2 loopback".into(),
            card: "Test Camera".into(),
            bus_info: String::new(),
            version: 0,
            capabilities: Capabilities::VIDEO_OUTPUT
                | Capabilities::STREAMING
                | Capabilities::DEVICE_CAPS,
            device_caps: None,
        };

        assert_eq!(
            caps.device_caps(),
            Capabilities::VIDEO_OUTPUT | Capabilities::STREAMING
        );
    }
}
