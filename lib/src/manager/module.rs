use log::debug;
use std::io;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use thiserror::Error;

/// Parameters passed to the loopback kernel module when it is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleParams {
    /// Index of the device node to create, i.e. `/dev/video<video_nr>`.
    pub video_nr: u32,
    /// Name under which the camera is advertised to applications.
    pub card_label: String,
}

impl ModuleParams {
    /// Module options in `name=value` form. Each option is a single argument, so labels may
    /// contain spaces.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            format!("video_nr={}", self.video_nr),
            format!("card_label={}", self.card_label),
        ]
    }
}

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("cannot run module loader: {0}")]
    Spawn(#[source] io::Error),
    #[error("module loader failed: {0}")]
    Failed(ExitStatus),
}

/// Loads and unloads the kernel module that provides the loopback device.
pub trait ModuleLoader {
    fn load(&mut self, params: &ModuleParams) -> Result<(), ModuleError>;

    fn unload(&mut self) -> Result<(), ModuleError>;
}

/// Module loader running `modprobe`, optionally through `sudo`.
#[derive(Debug, Clone)]
pub struct Modprobe {
    program: PathBuf,
    module: String,
    sudo: bool,
}

impl Modprobe {
    pub fn new<S: Into<String>>(module: S) -> Self {
        Modprobe {
            program: PathBuf::from("modprobe"),
            module: module.into(),
            sudo: false,
        }
    }

    /// Whether to run the loader through `sudo`.
    pub fn sudo(self, sudo: bool) -> Self {
        Modprobe { sudo, ..self }
    }

    /// Use another program than `modprobe`, with the same command-line interface.
    pub fn program<P: Into<PathBuf>>(self, program: P) -> Self {
        Modprobe {
            program: program.into(),
            ..self
        }
    }

    fn command(&self) -> Command {
        if self.sudo {
            let mut command = Command::new("sudo");
            command.arg(&self.program);
            command
        } else {
            Command::new(&self.program)
        }
    }

    fn run(mut command: Command) -> Result<(), ModuleError> {
        debug!("Running {:?}", command);
        let status = command.status().map_err(ModuleError::Spawn)?;
        if status.success() {
            Ok(())
        } else {
            Err(ModuleError::Failed(status))
        }
    }
}

impl ModuleLoader for Modprobe {
    fn load(&mut self, params: &ModuleParams) -> Result<(), ModuleError> {
        let mut command = self.command();
        command.arg(&self.module).args(params.to_args());
        Self::run(command)
    }

    fn unload(&mut self) -> Result<(), ModuleError> {
        let mut command = self.command();
        command.arg("-r").arg(&self.module);
        Self::run(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ModuleParams {
        ModuleParams {
            video_nr: 42,
            card_label: "Test Camera".into(),
        }
    }

    #[test]
    fn test_module_args() {
        assert_eq!(
            params().to_args(),
            vec!["video_nr=42".to_string(), "card_label=Test Camera".to_string()]
        );
    }

    #[test]
    fn test_command_line() {
        let modprobe = Modprobe::new("v4l2loopback");
        let command = modprobe.command();
        assert_eq!(command.get_program(), "modprobe");
        assert_eq!(command.get_args().count(), 0);

        let command = modprobe.sudo(true).command();
        assert_eq!(command.get_program(), "sudo");
        assert_eq!(command.get_args().collect::<Vec<_>>(), vec!["modprobe"]);
    }

    #[test]
    fn test_loader_success() {
        let mut modprobe = Modprobe::new("v4l2loopback").program("true");
        assert!(modprobe.load(&params()).is_ok());
        assert!(modprobe.unload().is_ok());
    }

    #[test]
    fn test_loader_failure() {
        let mut modprobe = Modprobe::new("v4l2loopback").program("false");
        match modprobe.load(&params()) {
            Err(ModuleError::Failed(status)) => assert_eq!(status.code(), Some(1)),
            r => panic!("unexpected result {:?}", r),
        }
        assert!(matches!(modprobe.unload(), Err(ModuleError::Failed(_))));
    }

    #[test]
    fn test_loader_not_found() {
        let mut modprobe = Modprobe::new("v4l2loopback").program("/nonexistent/loopcam/modprobe");
        assert!(matches!(
            modprobe.load(&params()),
            Err(ModuleError::Spawn(_))
        ));
    }
}
