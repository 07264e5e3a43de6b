//! Creation and removal of the loopback device.
//!
//! [`DeviceManager`] brings a virtual camera up in three steps:
//!
//! 1. The `v4l2loopback` kernel module is loaded with the requested device index and label,
//! 2. the device node is polled for until it shows up,
//! 3. an [`OutputDevice`] is created on top of the node.
//!
//! Dropping the manager, or calling [`DeviceManager::teardown`], closes the device and then
//! unloads the module.
mod module;

pub use module::*;

use crate::device::{
    DeviceConfig, DeviceOpenError, OutputBackend, OutputDevice, OutputDeviceError, V4l2Node,
};
use crate::pacer::FramePacer;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration of a [`DeviceManager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    label: String,
    video_nr: u32,
    dev_dir: PathBuf,
    poll_interval: Duration,
    max_poll_attempts: u32,
    grace_period: Duration,
    module: String,
    use_sudo: bool,
    device: DeviceConfig,
}

impl ManagerConfig {
    /// Default configuration for a camera advertised as `label`.
    pub fn new<S: Into<String>>(label: S) -> Self {
        ManagerConfig {
            label: label.into(),
            video_nr: 42,
            dev_dir: PathBuf::from("/dev"),
            poll_interval: Duration::from_millis(100),
            max_poll_attempts: 50,
            grace_period: Duration::from_millis(50),
            module: String::from("v4l2loopback"),
            use_sudo: true,
            device: DeviceConfig::new(),
        }
    }

    pub fn video_nr(self, video_nr: u32) -> Self {
        ManagerConfig { video_nr, ..self }
    }

    /// Directory in which the device node appears.
    pub fn dev_dir<P: Into<PathBuf>>(self, dev_dir: P) -> Self {
        ManagerConfig {
            dev_dir: dev_dir.into(),
            ..self
        }
    }

    pub fn poll_interval(self, poll_interval: Duration) -> Self {
        ManagerConfig {
            poll_interval,
            ..self
        }
    }

    pub fn max_poll_attempts(self, max_poll_attempts: u32) -> Self {
        ManagerConfig {
            max_poll_attempts,
            ..self
        }
    }

    /// Delay observed after the node appears, before it is opened.
    pub fn grace_period(self, grace_period: Duration) -> Self {
        ManagerConfig {
            grace_period,
            ..self
        }
    }

    pub fn module<S: Into<String>>(self, module: S) -> Self {
        ManagerConfig {
            module: module.into(),
            ..self
        }
    }

    /// Whether `modprobe` is run through `sudo`.
    pub fn use_sudo(self, use_sudo: bool) -> Self {
        ManagerConfig { use_sudo, ..self }
    }

    pub fn device(self, device: DeviceConfig) -> Self {
        ManagerConfig { device, ..self }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn device_path(&self) -> PathBuf {
        self.dev_dir.join(format!("video{}", self.video_nr))
    }

    pub fn module_params(&self) -> ModuleParams {
        ModuleParams {
            video_nr: self.video_nr,
            card_label: self.label.clone(),
        }
    }
}

/// The steps a [`DeviceManager`] goes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Uninitialized,
    ModuleLoaded,
    DeviceNodeReady,
    StreamingDeviceActive,
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("cannot load kernel module")]
    ModuleLoad(#[source] ModuleError),
    #[error("timed out waiting for {} after {attempts} attempts", .path.display())]
    DeviceTimeout { path: PathBuf, attempts: u32 },
    #[error("device manager is not ready")]
    NotReady,
    #[error("cannot go from {from:?} to {to:?}")]
    InvalidTransition {
        from: ManagerState,
        to: ManagerState,
    },
    #[error("cannot set up output device")]
    Device(#[from] OutputDeviceError),
}

/// Owner of a loopback device, from loading the kernel module to streaming frames into it.
pub struct DeviceManager<B: OutputBackend = V4l2Node, L: ModuleLoader = Modprobe> {
    // Declared first so the device is released before the loader is.
    device: Option<OutputDevice<B>>,
    loader: L,
    config: ManagerConfig,
    state: ManagerState,
}

impl DeviceManager<V4l2Node, Modprobe> {
    /// Creates a camera advertised as `label`, with the default configuration.
    pub fn new<S: Into<String>>(label: S) -> Result<Self, ManagerError> {
        Self::with_config(ManagerConfig::new(label))
    }

    pub fn with_config(config: ManagerConfig) -> Result<Self, ManagerError> {
        let loader = Modprobe::new(config.module.clone()).sudo(config.use_sudo);
        Self::with_parts(config, loader, V4l2Node::open)
    }
}

impl<B: OutputBackend, L: ModuleLoader> DeviceManager<B, L> {
    /// Creates a manager that has not performed any step yet.
    pub fn with_loader(config: ManagerConfig, loader: L) -> Self {
        DeviceManager {
            device: None,
            loader,
            config,
            state: ManagerState::Uninitialized,
        }
    }

    /// Creates a manager and performs all the steps, opening the node with `opener`.
    pub fn with_parts<F>(config: ManagerConfig, loader: L, opener: F) -> Result<Self, ManagerError>
    where
        F: FnOnce(&Path, &DeviceConfig) -> Result<B, DeviceOpenError>,
    {
        let mut manager = Self::with_loader(config, loader);
        manager.initialize(opener)?;
        Ok(manager)
    }

    /// Performs all the remaining steps. On failure, everything done so far is undone.
    pub fn initialize<F>(&mut self, opener: F) -> Result<(), ManagerError>
    where
        F: FnOnce(&Path, &DeviceConfig) -> Result<B, DeviceOpenError>,
    {
        info!("Initializing device manager for \"{}\"", self.config.label);

        match self.run_steps(opener) {
            Ok(()) => {
                info!("Device manager initialization complete");
                Ok(())
            }
            Err(e) => {
                error!("Device manager initialization failed: {}", e);
                self.teardown();
                Err(e)
            }
        }
    }

    fn run_steps<F>(&mut self, opener: F) -> Result<(), ManagerError>
    where
        F: FnOnce(&Path, &DeviceConfig) -> Result<B, DeviceOpenError>,
    {
        self.load_module()?;
        self.wait_for_device()?;
        self.create_device(opener)
    }

    fn transition(&self, to: ManagerState) -> Result<(), ManagerError> {
        let from = match to {
            ManagerState::Uninitialized => None,
            ManagerState::ModuleLoaded => Some(ManagerState::Uninitialized),
            ManagerState::DeviceNodeReady => Some(ManagerState::ModuleLoaded),
            ManagerState::StreamingDeviceActive => Some(ManagerState::DeviceNodeReady),
        };

        if from == Some(self.state) {
            Ok(())
        } else {
            Err(ManagerError::InvalidTransition {
                from: self.state,
                to,
            })
        }
    }

    /// Loads the kernel module.
    pub fn load_module(&mut self) -> Result<(), ManagerError> {
        self.transition(ManagerState::ModuleLoaded)?;

        info!(
            "Loading {} as video{} (\"{}\")",
            self.config.module, self.config.video_nr, self.config.label
        );
        self.loader
            .load(&self.config.module_params())
            .map_err(ManagerError::ModuleLoad)?;
        self.state = ManagerState::ModuleLoaded;

        info!(
            "Module loaded, expecting {}",
            self.config.device_path().display()
        );
        Ok(())
    }

    /// Waits for the device node to appear.
    pub fn wait_for_device(&mut self) -> Result<(), ManagerError> {
        self.transition(ManagerState::DeviceNodeReady)?;

        let path = self.config.device_path();
        info!("Waiting for {}", path.display());

        for attempt in 0..self.config.max_poll_attempts {
            let mut pacer = FramePacer::from_period(self.config.poll_interval);
            if path.exists() {
                pacer.disable();
                drop(pacer);
                // The node can show up before the driver is done setting it up.
                let _grace = FramePacer::from_period(self.config.grace_period);

                info!("{} is now available", path.display());
                self.state = ManagerState::DeviceNodeReady;
                return Ok(());
            }
            debug!("{} not present yet (attempt {})", path.display(), attempt + 1);
        }

        Err(ManagerError::DeviceTimeout {
            path,
            attempts: self.config.max_poll_attempts,
        })
    }

    /// Opens the device node with `opener` and starts streaming on it.
    pub fn create_device<F>(&mut self, opener: F) -> Result<(), ManagerError>
    where
        F: FnOnce(&Path, &DeviceConfig) -> Result<B, DeviceOpenError>,
    {
        self.transition(ManagerState::StreamingDeviceActive)?;

        let path = self.config.device_path();
        info!("Creating output device on {}", path.display());

        let backend = opener(&path, &self.config.device).map_err(|source| {
            OutputDeviceError::DeviceOpen {
                path: path.clone(),
                source,
            }
        })?;
        let device = OutputDevice::with_backend(backend, &path, &self.config.device)?;

        self.device = Some(device);
        self.state = ManagerState::StreamingDeviceActive;
        Ok(())
    }

    /// Whether all the steps have been performed.
    pub fn is_ready(&self) -> bool {
        self.state == ManagerState::StreamingDeviceActive && self.device.is_some()
    }

    pub fn get_device(&mut self) -> Result<&mut OutputDevice<B>, ManagerError> {
        match self.state {
            ManagerState::StreamingDeviceActive => {
                self.device.as_mut().ok_or(ManagerError::NotReady)
            }
            _ => Err(ManagerError::NotReady),
        }
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }

    pub fn device_path(&self) -> PathBuf {
        self.config.device_path()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Closes the device, then unloads the kernel module. Errors are logged, and calling this
    /// more than once has no further effect.
    pub fn teardown(&mut self) {
        if self.state == ManagerState::Uninitialized {
            return;
        }

        info!("Shutting down device manager for \"{}\"", self.config.label);
        if let Some(device) = self.device.take() {
            drop(device);
        }

        if let Err(e) = self.loader.unload() {
            warn!("Failed to unload {}: {}", self.config.module, e);
        }
        self.state = ManagerState::Uninitialized;
    }
}

impl<B: OutputBackend, L: ModuleLoader> Drop for DeviceManager<B, L> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, FakeLoader};
    use tempfile::TempDir;

    const FRAME_SIZE: usize = 1280 * 720 * 2;

    fn test_config(dir: &TempDir) -> ManagerConfig {
        ManagerConfig::new("Test Camera")
            .dev_dir(dir.path())
            .poll_interval(Duration::from_millis(1))
            .grace_period(Duration::from_millis(1))
    }

    #[test]
    fn test_config_defaults() {
        let config = ManagerConfig::new("Test Camera");

        assert_eq!(config.label(), "Test Camera");
        assert_eq!(config.device_path(), Path::new("/dev/video42"));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.max_poll_attempts, 50);
        assert_eq!(config.grace_period, Duration::from_millis(50));
        assert_eq!(config.module, "v4l2loopback");
        assert!(config.use_sudo);
        assert_eq!(config.device, DeviceConfig::new());
        assert_eq!(
            config.module_params(),
            ModuleParams {
                video_nr: 42,
                card_label: "Test Camera".into()
            }
        );
    }

    #[test]
    fn test_end_to_end() {
        let dir = TempDir::new().unwrap();
        let loader = FakeLoader::new(dir.path());
        let loader_state = loader.state();
        let backend = FakeBackend::new();
        let expected_path = dir.path().join("video42");

        let mut manager = DeviceManager::with_parts(test_config(&dir), loader, |path, _| {
            assert_eq!(path, expected_path);
            Ok(backend)
        })
        .unwrap();

        assert!(manager.is_ready());
        assert_eq!(manager.state(), ManagerState::StreamingDeviceActive);
        assert_eq!(manager.label(), "Test Camera");
        assert_eq!(
            loader_state.borrow().loads,
            vec![ModuleParams {
                video_nr: 42,
                card_label: "Test Camera".into()
            }]
        );

        let device = manager.get_device().unwrap();
        assert_eq!(device.format().width, 1280);
        assert_eq!(device.format().height, 720);
        device.display_frame(vec![0x80u8; FRAME_SIZE]).unwrap();
        assert!(matches!(
            device.display_frame(vec![0x80u8; FRAME_SIZE + 2]),
            Err(OutputDeviceError::BufferOverflow { .. })
        ));

        drop(manager);
        assert_eq!(loader_state.borrow().unloads, 1);
        assert!(!expected_path.exists());
    }

    #[test]
    fn test_step_by_step() {
        let dir = TempDir::new().unwrap();
        let mut manager: DeviceManager<FakeBackend, _> =
            DeviceManager::with_loader(test_config(&dir), FakeLoader::new(dir.path()));

        assert!(!manager.is_ready());
        assert!(matches!(manager.get_device(), Err(ManagerError::NotReady)));

        manager.load_module().unwrap();
        assert_eq!(manager.state(), ManagerState::ModuleLoaded);
        assert!(matches!(manager.get_device(), Err(ManagerError::NotReady)));

        manager.wait_for_device().unwrap();
        assert_eq!(manager.state(), ManagerState::DeviceNodeReady);
        assert!(!manager.is_ready());
        assert!(matches!(manager.get_device(), Err(ManagerError::NotReady)));

        manager.create_device(|_, _| Ok(FakeBackend::new())).unwrap();
        assert!(manager.is_ready());
        assert!(manager.get_device().is_ok());
    }

    #[test]
    fn test_steps_out_of_order() {
        let dir = TempDir::new().unwrap();
        let loader = FakeLoader::new(dir.path());
        let loader_state = loader.state();
        let mut manager: DeviceManager<FakeBackend, _> =
            DeviceManager::with_loader(test_config(&dir), loader);

        assert!(matches!(
            manager.wait_for_device(),
            Err(ManagerError::InvalidTransition {
                from: ManagerState::Uninitialized,
                to: ManagerState::DeviceNodeReady
            })
        ));

        manager.load_module().unwrap();
        assert!(matches!(
            manager.load_module(),
            Err(ManagerError::InvalidTransition { .. })
        ));
        assert_eq!(loader_state.borrow().loads.len(), 1);
    }

    #[test]
    fn test_module_load_failure() {
        let dir = TempDir::new().unwrap();
        let loader = FakeLoader::new(dir.path());
        let loader_state = loader.state();
        loader_state.borrow_mut().fail_load = true;

        let res = DeviceManager::with_parts(test_config(&dir), loader, |_, _| {
            Ok(FakeBackend::new())
        });

        assert!(matches!(
            res.err(),
            Some(ManagerError::ModuleLoad(ModuleError::Failed(_)))
        ));
        // Nothing to unload.
        assert_eq!(loader_state.borrow().unloads, 0);
    }

    #[test]
    fn test_device_timeout_unloads_module() {
        let dir = TempDir::new().unwrap();
        let loader = FakeLoader::new(dir.path());
        let loader_state = loader.state();
        loader_state.borrow_mut().creates_node = false;

        let config = test_config(&dir).max_poll_attempts(3);
        let res = DeviceManager::with_parts(config, loader, |_, _| Ok(FakeBackend::new()));

        match res.err() {
            Some(ManagerError::DeviceTimeout { path, attempts }) => {
                assert_eq!(path, dir.path().join("video42"));
                assert_eq!(attempts, 3);
            }
            e => panic!("unexpected result {:?}", e),
        }
        assert_eq!(loader_state.borrow().unloads, 1);
    }

    #[test]
    fn test_device_failure_unloads_module() {
        let dir = TempDir::new().unwrap();
        let loader = FakeLoader::new(dir.path());
        let loader_state = loader.state();
        let backend = FakeBackend::new();
        let backend_state = backend.state();
        backend_state.borrow_mut().fail_stream_on = true;

        let res = DeviceManager::with_parts(test_config(&dir), loader, |_, _| Ok(backend));

        assert!(matches!(
            res.err(),
            Some(ManagerError::Device(OutputDeviceError::StreamEnable(_)))
        ));
        assert_eq!(loader_state.borrow().unloads, 1);
        assert!(backend_state.borrow().closed);
        assert_eq!(backend_state.borrow().live_mappings, 0);
    }

    #[test]
    fn test_open_failure() {
        let dir = TempDir::new().unwrap();
        let loader = FakeLoader::new(dir.path());
        let loader_state = loader.state();

        let res: Result<DeviceManager<FakeBackend, _>, _> =
            DeviceManager::with_parts(test_config(&dir), loader, |_, _| {
                Err(DeviceOpenError::OpenError(nix::errno::Errno::EACCES))
            });

        assert!(matches!(
            res.err(),
            Some(ManagerError::Device(OutputDeviceError::DeviceOpen { .. }))
        ));
        assert_eq!(loader_state.borrow().unloads, 1);
    }

    #[test]
    fn test_teardown_twice() {
        let dir = TempDir::new().unwrap();
        let loader = FakeLoader::new(dir.path());
        let loader_state = loader.state();
        let backend = FakeBackend::new();
        let backend_state = backend.state();

        let mut manager =
            DeviceManager::with_parts(test_config(&dir), loader, |_, _| Ok(backend)).unwrap();

        manager.teardown();
        assert!(!manager.is_ready());
        assert_eq!(manager.state(), ManagerState::Uninitialized);
        assert!(matches!(manager.get_device(), Err(ManagerError::NotReady)));

        manager.teardown();
        drop(manager);

        assert_eq!(loader_state.borrow().unloads, 1);
        let backend_state = backend_state.borrow();
        assert_eq!(backend_state.stream_off_calls, 1);
        assert_eq!(backend_state.unmapped, 4);
        assert!(backend_state.closed);
    }

    #[test]
    fn test_unload_failure_is_ignored() {
        let dir = TempDir::new().unwrap();
        let loader = FakeLoader::new(dir.path());
        let loader_state = loader.state();

        let mut manager =
            DeviceManager::with_parts(test_config(&dir), loader, |_, _| Ok(FakeBackend::new()))
                .unwrap();
        loader_state.borrow_mut().fail_unload = true;

        manager.teardown();
        assert_eq!(manager.state(), ManagerState::Uninitialized);
        assert_eq!(loader_state.borrow().unloads, 1);
    }
}
