// SPDX-License-Identifier: MIT

//! The Win32 implementation of the OS boundary.
//!
//! Every OS object opened here is held by a guard that releases it on drop,
//! so an early return through `?` never leaks a handle, SID, or ACL.

mod acl;
mod appcontainer;
mod attribute_list;
mod conv;
mod donor;
mod error;
mod handle;
mod launch;
mod privilege;
mod process_token;
mod service;

use std::path::PathBuf;

use tracing::{debug, warn};
use windows::Win32::Security::{self, ImpersonateLoggedOnUser, RevertToSelf};

use crate::capability::CapabilitySet;
use crate::command::CommandDescriptor;
use crate::error::Result;
use crate::platform::{
    Access, LaunchContext, ProcessLauncher, ProfileStore, ResourceGrantor, ResourceTarget,
    TokenSource,
};
use crate::sid::{IntegrityLevel, Sid};
use crate::token::{AcquiredToken, Donor, Privilege, TokenOrigin};

pub use process_token::ProcessToken;

/// Talks to the running Windows system.
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32Platform;

/// Reverts thread impersonation when dropped.
struct Impersonation;

impl Drop for Impersonation {
    fn drop(&mut self) {
        if let Err(e) = unsafe { RevertToSelf() } {
            warn!("RevertToSelf failed: {e}");
        }
    }
}

fn acquired(token: ProcessToken, origin: TokenOrigin) -> AcquiredToken<ProcessToken> {
    let integrity = token.integrity().ok();
    let owner = token.user().ok().map(|sid| sid.to_string());
    AcquiredToken::new(token, origin).with_integrity(integrity).with_owner(owner)
}

impl TokenSource for Win32Platform {
    type Token = ProcessToken;

    fn enable_privilege(&self, privilege: Privilege) -> Result<()> {
        privilege::enable(privilege)
    }

    fn caller_elevated(&self) -> Result<bool> {
        ProcessToken::current_process(Security::TOKEN_QUERY)?.elevated()
    }

    fn find_donor(&self, donor: &Donor) -> Result<u32> {
        donor::find(donor)
    }

    fn duplicate_caller(&self) -> Result<AcquiredToken<ProcessToken>> {
        let own = ProcessToken::current_process(Security::TOKEN_DUPLICATE | Security::TOKEN_QUERY)?;
        Ok(acquired(own.duplicate_primary()?, TokenOrigin::Caller))
    }

    fn open_and_duplicate(&self, pid: u32) -> Result<AcquiredToken<ProcessToken>> {
        let theirs =
            ProcessToken::open_process(pid, Security::TOKEN_DUPLICATE | Security::TOKEN_QUERY)?;
        let token = acquired(theirs.duplicate_primary()?, TokenOrigin::Donor);
        debug!("duplicated token of pid {pid} owned by {:?}", token.owner());
        Ok(token)
    }

    fn adjust_integrity(
        &self,
        token: &mut AcquiredToken<ProcessToken>,
        level: IntegrityLevel,
    ) -> Result<()> {
        token.handle_mut().set_integrity(level)?;
        token.set_integrity(level);
        Ok(())
    }

    fn adopt_session(&self, token: &mut AcquiredToken<ProcessToken>) -> Result<()> {
        let session = donor::current_session()?;
        if token.handle().session_id()? != session {
            token.handle_mut().set_session_id(session)?;
        }
        Ok(())
    }

    fn impersonate<R>(
        &self,
        token: AcquiredToken<ProcessToken>,
        f: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        let handle = token.handle().raw()?;
        unsafe { ImpersonateLoggedOnUser(handle) }
            .map_err(|e| error::adjust_error("impersonate", e))?;
        let _revert = Impersonation;
        // The thread holds its own reference now.
        drop(token);
        f()
    }

    fn start_service(&self, name: &str) -> Result<()> {
        service::start(name)
    }
}

impl ProfileStore for Win32Platform {
    fn create_or_open(&self, name: &str, capabilities: &CapabilitySet) -> Result<Sid> {
        appcontainer::create_or_open(name, capabilities)
    }

    fn folder_path(&self, sid: &Sid) -> Result<PathBuf> {
        appcontainer::folder_path(sid)
    }

    fn delete(&self, name: &str) -> Result<()> {
        appcontainer::delete(name)
    }
}

impl ResourceGrantor for Win32Platform {
    fn grant(&self, sid: &Sid, target: &ResourceTarget, access: Access) -> Result<()> {
        acl::grant(sid, target, access)
    }
}

impl ProcessLauncher<ProcessToken> for Win32Platform {
    fn launch(
        &self,
        cmd: &CommandDescriptor,
        context: LaunchContext<'_, ProcessToken>,
    ) -> Result<u32> {
        launch::launch(cmd, context)
    }
}
