// SPDX-License-Identifier: MIT

//! Launch a command at a chosen execution level.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::capability::CapabilitySet;
use crate::command::{CommandDescriptor, CommandLine, VisibleMode};
use crate::container::{launch_in_container, open_profile};
use crate::error::{Diagnostic, Error, ErrorKind, Result};
use crate::level::{Acquisition, ExecutionLevel, Strategy};
use crate::platform::{LaunchContext, NativePlatform, Platform};

/// Container used when a `Process` is launched at [`ExecutionLevel::AppContainer`].
pub const DEFAULT_CONTAINER_NAME: &str = "Privexec.AppContainer.Launcher";

/// A launch request: what to run, plus the outcome of the last attempt.
///
/// ```no_run
/// use privexec::{ExecutionLevel, Process};
///
/// let mut p = Process::new("notepad.exe");
/// if p.exec(ExecutionLevel::LowIntegrity) {
///     println!("started {}", p.pid());
/// } else {
///     eprintln!("{}", p.message());
/// }
/// ```
pub struct Process<P = NativePlatform> {
    descriptor: CommandDescriptor,
    container_name: String,
    diagnostic: Diagnostic,
    pid: u32,
    platform: P,
}

impl Process<NativePlatform> {
    pub fn new(cmd: impl Into<CommandLine>) -> Self {
        Self::with_platform(cmd, NativePlatform::default())
    }

    /// Build the command line from the program and its arguments.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self::new(CommandLine::from_args(args)?))
    }
}

impl<P: Platform> Process<P> {
    pub fn with_platform(cmd: impl Into<CommandLine>, platform: P) -> Self {
        Self {
            descriptor: CommandDescriptor::new(cmd.into()),
            container_name: DEFAULT_CONTAINER_NAME.to_string(),
            diagnostic: Diagnostic::default(),
            pid: 0,
            platform,
        }
    }

    pub fn commandline(&self) -> &CommandLine {
        &self.descriptor.commandline
    }

    pub fn commandline_mut(&mut self) -> &mut CommandLine {
        &mut self.descriptor.commandline
    }

    /// Set the working directory for the child.
    pub fn chdir(&mut self, dir: impl Into<PathBuf>) -> &Path {
        self.descriptor.cwd.insert(dir.into())
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.descriptor.cwd()
    }

    pub fn change_visible_mode(&mut self, visible: VisibleMode) -> VisibleMode {
        self.descriptor.visible = visible;
        visible
    }

    pub fn visible_mode(&self) -> VisibleMode {
        self.descriptor.visible
    }

    /// Name of the profile used for [`ExecutionLevel::AppContainer`] launches.
    pub fn set_container_name(&mut self, name: impl Into<String>) -> &str {
        self.container_name = name.into();
        &self.container_name
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// Launch the command at `level`.
    ///
    /// Returns `true` when the child was created; its id is then in
    /// [`pid`](Self::pid).  On failure the reason is in
    /// [`message`](Self::message) and the previous pid is left alone.
    pub fn exec(&mut self, level: ExecutionLevel) -> bool {
        self.diagnostic.clear();
        info!("launching '{}' at level {level}", self.descriptor.commandline);
        match self.try_exec(level) {
            Ok(pid) => {
                info!("started pid {pid}");
                self.pid = pid;
                true
            }
            Err(e) => {
                warn!("launch at level {level} failed: {e}");
                self.diagnostic.record(&e);
                false
            }
        }
    }

    /// Message for the last failure; empty when the last `exec` succeeded.
    pub fn message(&self) -> &str {
        self.diagnostic.message()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.diagnostic.kind()
    }

    /// Process id of the last launched child; 0 until a launch succeeds.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    fn try_exec(&self, level: ExecutionLevel) -> Result<u32> {
        if self.descriptor.commandline.is_empty() {
            return Err(Error::Launch("empty command line".to_string()));
        }
        let acquisition = Strategy::for_level(level).acquire(&self.platform)?;
        let pid = match &acquisition {
            Acquisition::Caller => self.platform.launch(&self.descriptor, LaunchContext::Caller)?,
            Acquisition::ElevationPrompt => {
                self.platform.launch(&self.descriptor, LaunchContext::ElevationPrompt)?
            }
            Acquisition::Token { token, desktop } => self.platform.launch(
                &self.descriptor,
                LaunchContext::Token { token, desktop: *desktop },
            )?,
            Acquisition::Container => {
                let profile =
                    open_profile(&self.platform, &self.container_name, CapabilitySet::new())?;
                launch_in_container(&self.platform, &self.descriptor, &profile)?
            }
        };
        if pid == 0 {
            return Err(Error::Launch("the OS reported no process id".to_string()));
        }
        Ok(pid)
    }
}
