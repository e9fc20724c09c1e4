// SPDX-License-Identifier: MIT

//! The OS boundary.
//!
//! Everything that touches tokens, profiles, ACLs, or process creation goes
//! through these traits.  The acquisition logic (which level needs which
//! donor, in which order) is written against them, so it runs the same with
//! the Win32 implementation or with a fake in tests.

use std::{fmt, path::{Path, PathBuf}};

use crate::capability::CapabilitySet;
use crate::command::CommandDescriptor;
use crate::error::{Error, Result};
use crate::sid::{IntegrityLevel, Sid};
use crate::token::{AcquiredToken, Donor, Privilege};

/// Locates, duplicates, and adapts access tokens.
pub trait TokenSource {
    /// The owned OS token handle; closes itself on drop.
    type Token;

    /// Enable a privilege on the caller's own token.  Not reverted afterwards.
    fn enable_privilege(&self, privilege: Privilege) -> Result<()>;

    fn caller_elevated(&self) -> Result<bool>;

    /// Pid of the first running process that matches the donor description.
    fn find_donor(&self, donor: &Donor) -> Result<u32>;

    /// Duplicate the caller's own token as a primary token.
    fn duplicate_caller(&self) -> Result<AcquiredToken<Self::Token>>;

    /// Open a process and duplicate its token as a primary, impersonation-capable token.
    fn open_and_duplicate(&self, pid: u32) -> Result<AcquiredToken<Self::Token>>;

    /// Rewrite the mandatory integrity label of an owned token.
    fn adjust_integrity(
        &self,
        token: &mut AcquiredToken<Self::Token>,
        level: IntegrityLevel,
    ) -> Result<()>;

    /// Move a donor token into the caller's session.
    fn adopt_session(&self, token: &mut AcquiredToken<Self::Token>) -> Result<()>;

    /// Impersonate `token` on the calling thread while `f` runs.
    ///
    /// The token is consumed: it is closed as soon as the thread holds its
    /// own copy.  The thread reverts before this returns, on every path.
    fn impersonate<R>(
        &self,
        token: AcquiredToken<Self::Token>,
        f: impl FnOnce() -> Result<R>,
    ) -> Result<R>;

    /// Start a service and wait until it reports running.  Starting a
    /// running service is not an error.
    fn start_service(&self, name: &str) -> Result<()>;
}


/// Creates or opens AppContainer profiles.
pub trait ProfileStore {
    /// Create the profile, or open it if one with this name already exists.
    fn create_or_open(&self, name: &str, capabilities: &CapabilitySet) -> Result<Sid>;

    /// The profile's private storage folder.
    fn folder_path(&self, sid: &Sid) -> Result<PathBuf>;

    fn delete(&self, name: &str) -> Result<()>;
}


/// What a grant applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceTarget {
    Directory(PathBuf),
    /// Security-API object name, like `CURRENT_USER\Software\Vendor`.
    RegistryKey(String),
}

impl ResourceTarget {
    /// Registry key, normalising the `HKCU\` / `HKLM\` style roots.
    pub fn registry(key: &str) -> Self {
        const ROOTS: &[(&str, &str)] = &[
            ("HKEY_CURRENT_USER\\", "CURRENT_USER\\"),
            ("HKCU\\", "CURRENT_USER\\"),
            ("HKEY_LOCAL_MACHINE\\", "MACHINE\\"),
            ("HKLM\\", "MACHINE\\"),
            ("HKEY_USERS\\", "USERS\\"),
            ("HKU\\", "USERS\\"),
            ("HKEY_CLASSES_ROOT\\", "CLASSES_ROOT\\"),
            ("HKCR\\", "CLASSES_ROOT\\"),
        ];
        for (from, to) in ROOTS {
            if key.get(..from.len()).is_some_and(|root| root.eq_ignore_ascii_case(from)) {
                return Self::RegistryKey(format!("{to}{}", &key[from.len()..]));
            }
        }
        Self::RegistryKey(key.to_string())
    }

    pub fn directory(path: impl AsRef<Path>) -> Self {
        Self::Directory(path.as_ref().to_path_buf())
    }
}

impl fmt::Display for ResourceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(p) => write!(f, "directory {}", p.display()),
            Self::RegistryKey(k) => write!(f, "registry key {k}"),
        }
    }
}

/// Access granted to the container SID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    ReadExecute,
    ReadWrite,
}

/// Applies ACL grants for a container SID.  Granting the same access twice
/// leaves the same state as granting it once.
pub trait ResourceGrantor {
    fn grant(&self, sid: &Sid, target: &ResourceTarget, access: Access) -> Result<()>;
}


/// How the child is to be created.  Exactly one security context per launch.
#[derive(Debug)]
pub enum LaunchContext<'a, T> {
    /// The caller's own context, unchanged.
    Caller,
    /// An acquired token, optionally on an explicit desktop.
    Token {
        token: &'a AcquiredToken<T>,
        desktop: Option<&'a str>,
    },
    /// The OS elevation request (consent prompt).
    ElevationPrompt,
    /// An AppContainer security-capabilities descriptor instead of a token.
    Container {
        sid: &'a Sid,
        capabilities: &'a CapabilitySet,
    },
}

/// Creates the child process; returns its non-zero process id.
pub trait ProcessLauncher<T> {
    fn launch(&self, cmd: &CommandDescriptor, context: LaunchContext<'_, T>) -> Result<u32>;
}


/// Everything a launch needs from the OS.
pub trait Platform:
    TokenSource + ProfileStore + ResourceGrantor + ProcessLauncher<<Self as TokenSource>::Token>
{
}

impl<P> Platform for P where
    P: TokenSource + ProfileStore + ResourceGrantor + ProcessLauncher<<P as TokenSource>::Token>
{
}


#[cfg(target_os = "windows")]
pub type NativePlatform = crate::win32::Win32Platform;

#[cfg(not(target_os = "windows"))]
pub type NativePlatform = UnsupportedPlatform;

/// Stand-in for hosts without access tokens or AppContainers; every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedPlatform;

impl TokenSource for UnsupportedPlatform {
    type Token = ();

    fn enable_privilege(&self, _privilege: Privilege) -> Result<()> {
        Err(Error::Unsupported("privilege adjustment"))
    }

    fn caller_elevated(&self) -> Result<bool> {
        Err(Error::Unsupported("elevation query"))
    }

    fn find_donor(&self, _donor: &Donor) -> Result<u32> {
        Err(Error::Unsupported("donor lookup"))
    }

    fn duplicate_caller(&self) -> Result<AcquiredToken<()>> {
        Err(Error::Unsupported("token duplication"))
    }

    fn open_and_duplicate(&self, _pid: u32) -> Result<AcquiredToken<()>> {
        Err(Error::Unsupported("token duplication"))
    }

    fn adjust_integrity(
        &self,
        _token: &mut AcquiredToken<()>,
        _level: IntegrityLevel,
    ) -> Result<()> {
        Err(Error::Unsupported("integrity labels"))
    }

    fn adopt_session(&self, _token: &mut AcquiredToken<()>) -> Result<()> {
        Err(Error::Unsupported("token sessions"))
    }

    fn impersonate<R>(
        &self,
        _token: AcquiredToken<()>,
        _f: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        Err(Error::Unsupported("impersonation"))
    }

    fn start_service(&self, _name: &str) -> Result<()> {
        Err(Error::Unsupported("service control"))
    }
}

impl ProfileStore for UnsupportedPlatform {
    fn create_or_open(&self, _name: &str, _capabilities: &CapabilitySet) -> Result<Sid> {
        Err(Error::Unsupported("AppContainer profiles"))
    }

    fn folder_path(&self, _sid: &Sid) -> Result<PathBuf> {
        Err(Error::Unsupported("AppContainer profiles"))
    }

    fn delete(&self, _name: &str) -> Result<()> {
        Err(Error::Unsupported("AppContainer profiles"))
    }
}

impl ResourceGrantor for UnsupportedPlatform {
    fn grant(&self, _sid: &Sid, _target: &ResourceTarget, _access: Access) -> Result<()> {
        Err(Error::Unsupported("ACL grants"))
    }
}

impl ProcessLauncher<()> for UnsupportedPlatform {
    fn launch(&self, _cmd: &CommandDescriptor, _context: LaunchContext<'_, ()>) -> Result<u32> {
        Err(Error::Unsupported("process launch"))
    }
}
