// SPDX-License-Identifier: MIT

//! # privexec
//!
//! Launch a child process at a chosen trust level.
//!
//! A [`Process`] runs its command line at an [`ExecutionLevel`]: unchanged,
//! at low integrity, de-elevated through the desktop shell's token, elevated
//! through the consent prompt, as System, or as TrustedInstaller.  An
//! [`AppContainer`] runs it inside a named AppContainer profile with a set
//! of capabilities and explicit directory and registry grants.
//!
//! Neither entity returns errors.  Operations report success as a `bool`,
//! and the reason for the last failure is kept in `message()` and
//! `error_kind()`.
//!
//! All OS access goes through the traits in [`platform`].  On Windows the
//! default platform talks to the system; elsewhere every operation fails
//! with [`ErrorKind::Unsupported`].

pub mod capability;
pub mod command;
pub mod container;
pub mod error;
pub mod level;
pub mod manifest;
pub mod platform;
pub mod process;
pub mod sid;
pub mod token;

#[cfg(target_os = "windows")]
pub mod win32;


pub use capability::{
    Capability, CapabilityCatalog, CapabilityResolver, CapabilitySet, WellKnownCapability,
};
pub use command::{CommandDescriptor, CommandLine, VisibleMode};
pub use container::{AppContainer, ContainerProfile};
pub use error::{Error, ErrorKind, Result};
pub use level::ExecutionLevel;
pub use manifest::{AppxManifest, ManifestSource};
pub use platform::{
    Access, NativePlatform, Platform, ProcessLauncher, ProfileStore, ResourceGrantor,
    ResourceTarget, TokenSource, UnsupportedPlatform,
};
pub use process::Process;
pub use sid::{IntegrityLevel, Sid};
