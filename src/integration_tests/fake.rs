// SPDX-License-Identifier: MIT

//! An in-memory platform that records what the launch logic asks of the OS.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::capability::CapabilitySet;
use crate::command::CommandDescriptor;
use crate::error::{Error, Result};
use crate::platform::{
    Access, LaunchContext, ProcessLauncher, ProfileStore, ResourceGrantor, ResourceTarget,
    TokenSource,
};
use crate::sid::{IntegrityLevel, Sid};
use crate::token::{AcquiredToken, Donor, Privilege, TokenOrigin};

/// How the last launch was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchKind {
    Caller,
    Token {
        origin: TokenOrigin,
        integrity: Option<IntegrityLevel>,
        owner: Option<String>,
        desktop: Option<String>,
        /// The process the token was taken from, if any.
        donor_pid: Option<u32>,
        session_adopted: bool,
    },
    ElevationPrompt,
    Container {
        sid: Sid,
        capabilities: CapabilitySet,
    },
}

#[derive(Debug, Clone)]
pub struct Launch {
    pub commandline: String,
    pub cwd: Option<PathBuf>,
    pub kind: LaunchKind,
    pub pid: u32,
}

#[derive(Debug, Default)]
pub struct State {
    /// Privileges present (but not necessarily enabled) on the caller's token.
    pub held: HashSet<Privilege>,
    pub enabled: Vec<Privilege>,
    pub elevated: bool,
    /// Running donor processes, by display name of the donor, with their owner.
    pub donors: HashMap<String, (u32, String)>,
    /// Installed services and whether each is running.
    pub services: HashMap<String, bool>,
    pub service_starts: Vec<String>,
    pub profiles: HashMap<String, (Sid, CapabilitySet)>,
    pub profile_creates: usize,
    pub grant_calls: usize,
    /// The effective ACL entries; a grant merges into this set.
    pub acl: HashSet<(Sid, ResourceTarget, Access)>,
    pub launches: Vec<Launch>,
    pub next_pid: u32,
    pub open_tokens: usize,
    pub max_open_tokens: usize,
    pub impersonating: bool,
    pub adopted_sessions: usize,
    pub fail_launch: bool,
    pub fail_adopt_session: bool,
    /// Donors exit right after they are looked up.
    pub donors_exit_after_lookup: bool,
}

impl State {
    fn next_pid(&mut self) -> u32 {
        self.next_pid += 4;
        self.next_pid
    }
}


/// A token handle that counts itself while open.
#[derive(Debug)]
pub struct FakeToken {
    pub pid: Option<u32>,
    pub session_adopted: bool,
    state: Arc<Mutex<State>>,
}

impl FakeToken {
    fn open(state: &Arc<Mutex<State>>, pid: Option<u32>) -> Self {
        {
            let mut s = state.lock().unwrap();
            s.open_tokens += 1;
            s.max_open_tokens = s.max_open_tokens.max(s.open_tokens);
        }
        Self { pid, session_adopted: false, state: state.clone() }
    }
}

impl Drop for FakeToken {
    fn drop(&mut self) {
        if let Ok(mut s) = self.state.lock() {
            s.open_tokens -= 1;
        }
    }
}


/// Cheap to clone; clones share state, so a test keeps one to inspect.
#[derive(Debug, Clone, Default)]
pub struct FakePlatform {
    state: Arc<Mutex<State>>,
}

impl FakePlatform {
    /// An elevated administrator session: winlogon and the shell are
    /// running, TrustedInstaller is installed but stopped.
    pub fn admin() -> Self {
        let platform = Self::default();
        {
            let mut s = platform.state();
            s.elevated = true;
            s.held.extend([Privilege::Debug, Privilege::Impersonate]);
            s.donors.insert(Donor::WINLOGON.to_string(), (600, "S-1-5-18".to_string()));
            s.donors.insert(Donor::Shell.to_string(), (4200, "S-1-5-21-1-2-3-1001".to_string()));
            s.services.insert("TrustedInstaller".to_string(), false);
            s.next_pid = 1000;
        }
        platform
    }

    /// A standard, unelevated user session.
    pub fn user() -> Self {
        let platform = Self::admin();
        {
            let mut s = platform.state();
            s.elevated = false;
            s.held.clear();
            s.held.insert(Privilege::Impersonate);
        }
        platform
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn last_launch(&self) -> Option<Launch> {
        self.state().launches.last().cloned()
    }
}

impl TokenSource for FakePlatform {
    type Token = FakeToken;

    fn enable_privilege(&self, privilege: Privilege) -> Result<()> {
        let mut s = self.state();
        if !s.held.contains(&privilege) {
            return Err(Error::Privilege { privilege, reason: "not held".to_string() });
        }
        s.enabled.push(privilege);
        Ok(())
    }

    fn caller_elevated(&self) -> Result<bool> {
        Ok(self.state().elevated)
    }

    fn find_donor(&self, donor: &Donor) -> Result<u32> {
        let mut s = self.state();
        if let Donor::Service { name } = donor {
            if !s.services.get(*name).copied().unwrap_or(false) {
                return Err(Error::NotFound(donor.to_string()));
            }
        }
        let pid = s
            .donors
            .get(&donor.to_string())
            .map(|(pid, _)| *pid)
            .ok_or_else(|| Error::NotFound(donor.to_string()))?;
        if s.donors_exit_after_lookup {
            s.donors.remove(&donor.to_string());
        }
        Ok(pid)
    }

    fn duplicate_caller(&self) -> Result<AcquiredToken<FakeToken>> {
        let token = FakeToken::open(&self.state, None);
        let integrity =
            if self.state().elevated { IntegrityLevel::High } else { IntegrityLevel::Medium };
        Ok(AcquiredToken::new(token, TokenOrigin::Caller).with_integrity(Some(integrity)))
    }

    fn open_and_duplicate(&self, pid: u32) -> Result<AcquiredToken<FakeToken>> {
        let owner = {
            let s = self.state();
            if !s.enabled.contains(&Privilege::Debug) && !s.impersonating && pid != 4200 {
                return Err(Error::AccessDenied {
                    target: format!("process {pid}"),
                    reason: "debug privilege not enabled".to_string(),
                });
            }
            s.donors
                .values()
                .find(|(p, _)| *p == pid)
                .map(|(_, owner)| owner.clone())
                .ok_or(Error::ProcessOpen { pid, reason: "process no longer exists".to_string() })?
        };
        let integrity =
            if owner == "S-1-5-18" { IntegrityLevel::System } else { IntegrityLevel::Medium };
        Ok(AcquiredToken::new(FakeToken::open(&self.state, Some(pid)), TokenOrigin::Donor)
            .with_integrity(Some(integrity))
            .with_owner(Some(owner)))
    }

    fn adjust_integrity(
        &self,
        token: &mut AcquiredToken<FakeToken>,
        level: IntegrityLevel,
    ) -> Result<()> {
        token.set_integrity(level);
        Ok(())
    }

    fn adopt_session(&self, token: &mut AcquiredToken<FakeToken>) -> Result<()> {
        let mut s = self.state();
        if s.fail_adopt_session {
            return Err(Error::TokenAdjust("session id is read-only".to_string()));
        }
        s.adopted_sessions += 1;
        token.handle_mut().session_adopted = true;
        Ok(())
    }

    fn impersonate<R>(
        &self,
        token: AcquiredToken<FakeToken>,
        f: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        self.state().impersonating = true;
        drop(token);
        let result = f();
        self.state().impersonating = false;
        result
    }

    fn start_service(&self, name: &str) -> Result<()> {
        let mut s = self.state();
        s.service_starts.push(name.to_string());
        match s.services.get_mut(name) {
            None => Err(Error::Service {
                name: name.to_string(),
                reason: "not installed".to_string(),
            }),
            Some(running) => {
                *running = true;
                let pid = s.next_pid();
                s.donors.insert(format!("service {name}"), (pid, "S-1-5-80-956008885".to_string()));
                Ok(())
            }
        }
    }
}

impl ProfileStore for FakePlatform {
    fn create_or_open(&self, name: &str, capabilities: &CapabilitySet) -> Result<Sid> {
        let mut s = self.state();
        let key = name.to_lowercase();
        if let Some((sid, _)) = s.profiles.get(&key) {
            return Ok(sid.clone());
        }
        let sid = Sid::derive_container(name);
        s.profiles.insert(key, (sid.clone(), capabilities.clone()));
        s.profile_creates += 1;
        Ok(sid)
    }

    fn folder_path(&self, sid: &Sid) -> Result<PathBuf> {
        Ok(PathBuf::from(format!("C:\\Users\\test\\AppData\\Local\\Packages\\{sid}\\AC")))
    }

    fn delete(&self, name: &str) -> Result<()> {
        match self.state().profiles.remove(&name.to_lowercase()) {
            Some(_) => Ok(()),
            None => Err(Error::profile(name, "no such profile")),
        }
    }
}

impl ResourceGrantor for FakePlatform {
    fn grant(&self, sid: &Sid, target: &ResourceTarget, access: Access) -> Result<()> {
        let mut s = self.state();
        s.grant_calls += 1;
        s.acl.insert((sid.clone(), target.clone(), access));
        Ok(())
    }
}

impl ProcessLauncher<FakeToken> for FakePlatform {
    fn launch(
        &self,
        cmd: &CommandDescriptor,
        context: LaunchContext<'_, FakeToken>,
    ) -> Result<u32> {
        let kind = match context {
            LaunchContext::Caller => LaunchKind::Caller,
            LaunchContext::ElevationPrompt => LaunchKind::ElevationPrompt,
            LaunchContext::Token { token, desktop } => LaunchKind::Token {
                origin: token.origin(),
                integrity: token.integrity(),
                owner: token.owner().map(str::to_string),
                desktop: desktop.map(str::to_string),
                donor_pid: token.handle().pid,
                session_adopted: token.handle().session_adopted,
            },
            LaunchContext::Container { sid, capabilities } => LaunchKind::Container {
                sid: sid.clone(),
                capabilities: capabilities.clone(),
            },
        };
        let mut s = self.state();
        if s.fail_launch {
            return Err(Error::Launch("CreateProcessW failed: file not found".to_string()));
        }
        let pid = s.next_pid();
        s.launches.push(Launch {
            commandline: cmd.commandline.to_string(),
            cwd: cmd.cwd.clone(),
            kind,
            pid,
        });
        Ok(pid)
    }
}
