// SPDX-License-Identifier: MIT

//! Access tokens acquired for a launch, the privileges needed to get them,
//! and the donor processes they are taken from.

use std::fmt;

use crate::sid::IntegrityLevel;

/// Process privileges the acquisition strategies enable on the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Privilege {
    Debug,
    Impersonate,
    AssignPrimaryToken,
    IncreaseQuota,
}

impl Privilege {
    pub fn name(self) -> &'static str {
        match self {
            Self::Debug => "SeDebugPrivilege",
            Self::Impersonate => "SeImpersonatePrivilege",
            Self::AssignPrimaryToken => "SeAssignPrimaryTokenPrivilege",
            Self::IncreaseQuota => "SeIncreaseQuotaPrivilege",
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}


/// A running process whose token carries the trust level a strategy needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Donor {
    /// A process with the given image name, owned by LocalSystem, in the caller's session.
    LocalSystem { image: &'static str },
    /// The desktop shell of the interactive user, which must not be elevated.
    Shell,
    /// The process hosting a running service.
    Service { name: &'static str },
}

impl Donor {
    pub const WINLOGON: Donor = Donor::LocalSystem { image: "winlogon.exe" };
    pub const TRUSTED_INSTALLER: Donor = Donor::Service { name: "TrustedInstaller" };
}

impl fmt::Display for Donor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalSystem { image } => write!(f, "system process {image}"),
            Self::Shell => f.write_str("unelevated desktop shell"),
            Self::Service { name } => write!(f, "service {name}"),
        }
    }
}


/// Where a token came from; decides which process-creation call may use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOrigin {
    /// Derived from the caller's own token.
    Caller,
    /// Duplicated from another process.
    Donor,
}

/// An exclusively owned token handle plus what is known about it.
///
/// The handle type closes itself when dropped, so an `AcquiredToken`
/// lives exactly as long as the launch that consumes it.
#[derive(Debug)]
pub struct AcquiredToken<T> {
    handle: T,
    origin: TokenOrigin,
    primary: bool,
    integrity: Option<IntegrityLevel>,
    owner: Option<String>,
}

impl<T> AcquiredToken<T> {
    pub fn new(handle: T, origin: TokenOrigin) -> Self {
        Self { handle, origin, primary: true, integrity: None, owner: None }
    }

    pub fn with_integrity(mut self, integrity: Option<IntegrityLevel>) -> Self {
        self.integrity = integrity;
        self
    }

    pub fn with_owner(mut self, owner: Option<String>) -> Self {
        self.owner = owner;
        self
    }

    pub fn with_primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }

    pub fn handle(&self) -> &T {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut T {
        &mut self.handle
    }

    pub fn origin(&self) -> TokenOrigin {
        self.origin
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn integrity(&self) -> Option<IntegrityLevel> {
        self.integrity
    }

    pub(crate) fn set_integrity(&mut self, integrity: IntegrityLevel) {
        self.integrity = Some(integrity);
    }

    /// Account name hint, such as `SYSTEM`.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn into_handle(self) -> T {
        self.handle
    }
}
