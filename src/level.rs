// SPDX-License-Identifier: MIT

//! Execution levels, and the strategy each one runs to get a security context.

use std::{fmt, str::FromStr};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::platform::TokenSource;
use crate::sid::IntegrityLevel;
use crate::token::{AcquiredToken, Donor, Privilege};

/// Interactive desktop for children running under another account's token.
pub const DEFAULT_DESKTOP: &str = "WinSta0\\Default";

/// The trust level requested for the child.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ExecutionLevel {
    /// No privilege change.
    #[default]
    None,
    AppContainer,
    /// Mandatory integrity control: the caller's token at low integrity.
    LowIntegrity,
    NoElevated,
    Elevated,
    System,
    TrustedInstaller,
}

impl FromStr for ExecutionLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "" | "none" => Ok(Self::None),
            "appcontainer" | "ac" => Ok(Self::AppContainer),
            "mic" | "low" | "lowintegrity" => Ok(Self::LowIntegrity),
            "noelevated" | "unelevated" | "deelevated" => Ok(Self::NoElevated),
            "elevated" | "admin" | "administrator" => Ok(Self::Elevated),
            "system" => Ok(Self::System),
            "trustedinstaller" | "ti" => Ok(Self::TrustedInstaller),
            _ => Err(format!("unknown execution level '{s}'")),
        }
    }
}

impl fmt::Display for ExecutionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::AppContainer => "appcontainer",
            Self::LowIntegrity => "mic",
            Self::NoElevated => "noelevated",
            Self::Elevated => "elevated",
            Self::System => "system",
            Self::TrustedInstaller => "trustedinstaller",
        })
    }
}


const DONOR_PRIVILEGES: &[Privilege] = &[Privilege::Debug, Privilege::Impersonate];
const SHELL_PRIVILEGES: &[Privilege] = &[Privilege::Impersonate];

/// One variant per execution level, holding just what that level needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    LowIntegrity { target: IntegrityLevel },
    Deelevate { donor: Donor, privileges: &'static [Privilege] },
    Elevate,
    Donor { donor: Donor, privileges: &'static [Privilege] },
    TrustedInstaller { broker: Donor, service: Donor, privileges: &'static [Privilege] },
    Container,
}

/// The security context a strategy produced.
#[derive(Debug)]
pub enum Acquisition<T> {
    Caller,
    Token { token: AcquiredToken<T>, desktop: Option<&'static str> },
    ElevationPrompt,
    Container,
}

impl Strategy {
    pub fn for_level(level: ExecutionLevel) -> Self {
        match level {
            ExecutionLevel::None => Self::Direct,
            ExecutionLevel::AppContainer => Self::Container,
            ExecutionLevel::LowIntegrity => Self::LowIntegrity { target: IntegrityLevel::Low },
            ExecutionLevel::NoElevated => Self::Deelevate {
                donor: Donor::Shell,
                privileges: SHELL_PRIVILEGES,
            },
            ExecutionLevel::Elevated => Self::Elevate,
            ExecutionLevel::System => Self::Donor {
                donor: Donor::WINLOGON,
                privileges: DONOR_PRIVILEGES,
            },
            ExecutionLevel::TrustedInstaller => Self::TrustedInstaller {
                broker: Donor::WINLOGON,
                service: Donor::TRUSTED_INSTALLER,
                privileges: DONOR_PRIVILEGES,
            },
        }
    }

    /// Run the strategy.  Any failure aborts it; tokens opened along the
    /// way are closed when they go out of scope.
    pub fn acquire<S: TokenSource>(&self, src: &S) -> Result<Acquisition<S::Token>> {
        match self {
            Self::Direct => Ok(Acquisition::Caller),
            Self::Container => Ok(Acquisition::Container),

            Self::LowIntegrity { target } => {
                let mut token = src.duplicate_caller()?;
                src.adjust_integrity(&mut token, *target)?;
                debug!("caller token lowered to {:?}", target);
                Ok(Acquisition::Token { token, desktop: None })
            }

            Self::Deelevate { donor, privileges } => {
                if !src.caller_elevated()? {
                    debug!("caller is not elevated; launching in its own context");
                    return Ok(Acquisition::Caller);
                }
                enable_all(src, privileges)?;
                let token = steal(src, donor)?;
                Ok(Acquisition::Token { token, desktop: None })
            }

            Self::Elevate => {
                if src.caller_elevated()? {
                    debug!("caller is already elevated; launching in its own context");
                    Ok(Acquisition::Caller)
                } else {
                    Ok(Acquisition::ElevationPrompt)
                }
            }

            Self::Donor { donor, privileges } => {
                enable_all(src, privileges)?;
                let token = steal(src, donor)?;
                Ok(Acquisition::Token { token, desktop: Some(DEFAULT_DESKTOP) })
            }

            Self::TrustedInstaller { broker, service, privileges } => {
                enable_all(src, privileges)?;
                let broker_token = steal(src, broker)?;
                let token = src.impersonate(broker_token, || {
                    let pid = service_pid(src, service)?;
                    let mut token = src.open_and_duplicate(pid)?;
                    if let Err(e) = src.adopt_session(&mut token) {
                        warn!("could not move the {service} token into this session: {e}");
                    }
                    Ok(token)
                })?;
                Ok(Acquisition::Token { token, desktop: Some(DEFAULT_DESKTOP) })
            }
        }
    }
}

fn enable_all<S: TokenSource>(src: &S, privileges: &[Privilege]) -> Result<()> {
    for privilege in privileges {
        src.enable_privilege(*privilege)?;
        debug!("enabled {privilege}");
    }
    Ok(())
}

fn steal<S: TokenSource>(src: &S, donor: &Donor) -> Result<AcquiredToken<S::Token>> {
    let pid = src.find_donor(donor)?;
    info!("using {donor} (pid {pid}) as token donor");
    src.open_and_duplicate(pid)
}

/// Pid of the service process, starting the service once if it is not running.
fn service_pid<S: TokenSource>(src: &S, service: &Donor) -> Result<u32> {
    match src.find_donor(service) {
        Ok(pid) => Ok(pid),
        Err(Error::NotFound(_)) => {
            let Donor::Service { name } = service else {
                return Err(Error::NotFound(service.to_string()));
            };
            info!("starting service {name}");
            src.start_service(name)?;
            src.find_donor(service)
        }
        Err(e) => Err(e),
    }
}
