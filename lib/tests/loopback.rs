//! Tests against a real `v4l2loopback` module. They need root privileges (or password-less
//! `sudo`) and the module to be installed, so they only run when explicitly requested:
//!
//! ```text
//! cargo test -p loopcam --test loopback -- --ignored --test-threads=1
//! ```
use loopcam::device::OutputDeviceError;
use loopcam::frame::Frame;
use loopcam::manager::{DeviceManager, ManagerConfig, ManagerState};

const FRAME_SIZE: usize = 1280 * 720 * 2;

#[test]
#[ignore = "loads the v4l2loopback kernel module"]
fn test_camera_lifecycle() {
    let mut manager = DeviceManager::with_config(ManagerConfig::new("Test Camera"))
        .expect("failed to create virtual camera");
    assert!(manager.is_ready());
    assert_eq!(manager.state(), ManagerState::StreamingDeviceActive);
    assert!(manager.device_path().exists());

    let device = manager.get_device().unwrap();
    assert_eq!(device.format().width, 1280);
    assert_eq!(device.format().height, 720);
    assert!(device.num_buffers() >= 2);
    assert!(device.buffer_capacity() >= FRAME_SIZE);

    let frame = Frame::with_size(FRAME_SIZE);
    for _ in 0..(device.num_buffers() * 2) {
        device.display_frame(&frame).unwrap();
    }

    let oversized = Frame::with_size(device.buffer_capacity() + 1);
    assert!(matches!(
        device.display_frame(&oversized),
        Err(OutputDeviceError::BufferOverflow { .. })
    ));

    let path = manager.device_path();
    manager.teardown();
    manager.teardown();
    assert!(!path.exists());
}
