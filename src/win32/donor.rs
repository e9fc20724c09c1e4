// SPDX-License-Identifier: MIT

//! Finding donor processes.

use tracing::debug;
use windows::Win32::{
    Security,
    System::{
        Diagnostics::ToolHelp::{
            CreateToolhelp32Snapshot, PROCESSENTRY32W, Process32FirstW, Process32NextW,
            TH32CS_SNAPPROCESS,
        },
        RemoteDesktop::ProcessIdToSessionId,
        Threading::GetCurrentProcessId,
    },
    UI::WindowsAndMessaging::{GetShellWindow, GetWindowThreadProcessId},
};

use crate::error::{Error, Result};
use crate::sid::Sid;
use crate::token::Donor;

use super::conv::from_wide_buf;
use super::handle::OwnedHandle;
use super::process_token::ProcessToken;
use super::service;

const SHELL_IMAGE: &str = "explorer.exe";

pub fn find(donor: &Donor) -> Result<u32> {
    match donor {
        Donor::LocalSystem { image } => {
            let session = current_session()?;
            let system = Sid::local_system();
            processes_named(image)?
                .into_iter()
                .filter(|pid| session_of(*pid) == Some(session))
                .find(|pid| owner_of(*pid).is_some_and(|owner| owner == system))
                .ok_or_else(|| Error::NotFound(donor.to_string()))
        }
        Donor::Shell => shell_pid().ok_or_else(|| Error::NotFound(donor.to_string())),
        Donor::Service { name } => service::running_pid(name)?
            .ok_or_else(|| Error::NotFound(donor.to_string())),
    }
}

/// Session of the calling process.
pub fn current_session() -> Result<u32> {
    session_of(unsafe { GetCurrentProcessId() })
        .ok_or_else(|| Error::TokenAdjust("unable to read the caller's session".to_string()))
}

fn session_of(pid: u32) -> Option<u32> {
    let mut session = 0u32;
    unsafe { ProcessIdToSessionId(pid, &mut session) }.ok()?;
    Some(session)
}

fn owner_of(pid: u32) -> Option<Sid> {
    match ProcessToken::open_process(pid, Security::TOKEN_QUERY).and_then(|t| t.user()) {
        Ok(sid) => Some(sid),
        Err(e) => {
            debug!("skipping pid {pid}: {e}");
            None
        }
    }
}

fn elevated(pid: u32) -> Option<bool> {
    ProcessToken::open_process(pid, Security::TOKEN_QUERY)
        .and_then(|t| t.elevated())
        .ok()
}

/// The interactive shell if it is not elevated; otherwise any unelevated
/// explorer in the caller's session.
fn shell_pid() -> Option<u32> {
    let hwnd = unsafe { GetShellWindow() };
    let mut pid = 0u32;
    if !hwnd.is_invalid() {
        unsafe { GetWindowThreadProcessId(hwnd, Some(&mut pid)) };
    }
    if pid != 0 && elevated(pid) == Some(false) {
        return Some(pid);
    }
    debug!("shell window process {pid} is unusable; searching for {SHELL_IMAGE}");

    let session = current_session().ok()?;
    processes_named(SHELL_IMAGE)
        .ok()?
        .into_iter()
        .filter(|pid| session_of(*pid) == Some(session))
        .find(|pid| elevated(*pid) == Some(false))
}

/// Pids of every process whose image name matches, case-insensitively.
fn processes_named(image: &str) -> Result<Vec<u32>> {
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
        .map_err(|e| Error::NotFound(format!("process snapshot: {}", e.message())))?;
    let snapshot = OwnedHandle::new(snapshot);

    let mut entry = PROCESSENTRY32W {
        dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
        ..Default::default()
    };
    let mut pids = vec![];
    let mut more = unsafe { Process32FirstW(snapshot.raw(), &mut entry) }.is_ok();
    while more {
        if from_wide_buf(&entry.szExeFile).eq_ignore_ascii_case(image) {
            pids.push(entry.th32ProcessID);
        }
        more = unsafe { Process32NextW(snapshot.raw(), &mut entry) }.is_ok();
    }
    Ok(pids)
}
