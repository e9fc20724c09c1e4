// SPDX-License-Identifier: MIT

//! Process creation for each launch context.

use tracing::debug;
use windows::Win32::{
    System::Threading::{
        self, CREATE_NEW_CONSOLE, CREATE_NO_WINDOW, CREATE_UNICODE_ENVIRONMENT,
        EXTENDED_STARTUPINFO_PRESENT, GetProcessId, LOGON_WITH_PROFILE, PROCESS_CREATION_FLAGS,
        PROCESS_INFORMATION, STARTF_USESHOWWINDOW, STARTUPINFOEXW, STARTUPINFOW,
    },
    UI::{
        Shell::{SEE_MASK_NOASYNC, SEE_MASK_NOCLOSEPROCESS, SHELLEXECUTEINFOW, ShellExecuteExW},
        WindowsAndMessaging::{SW_HIDE, SW_SHOWNORMAL},
    },
};
use windows::core::{PCWSTR, w};

use crate::capability::CapabilitySet;
use crate::command::{CommandDescriptor, VisibleMode};
use crate::error::{Error, Result};
use crate::platform::LaunchContext;
use crate::sid::Sid;
use crate::token::{AcquiredToken, TokenOrigin};

use super::attribute_list::{SecurityCapabilities, ThreadAttribute, ThreadAttributeList};
use super::conv::{as_c_str_w, pwstr};
use super::error::launch_error;
use super::handle::OwnedHandle;
use super::process_token::ProcessToken;

/// Wide buffers that must live until the create call returns.
struct Prepared {
    cmdline: Vec<u16>,
    cwd: Vec<u16>,
    flags: PROCESS_CREATION_FLAGS,
    hide: bool,
}

impl Prepared {
    fn new(cmd: &CommandDescriptor) -> Result<Self> {
        let cwd = cmd.resolved_cwd()?;
        let mut flags = CREATE_UNICODE_ENVIRONMENT;
        match cmd.visible {
            VisibleMode::None => (),
            VisibleMode::NewConsole => flags |= CREATE_NEW_CONSOLE,
            VisibleMode::Hide => flags |= CREATE_NO_WINDOW,
        }
        Ok(Self {
            cmdline: as_c_str_w(cmd.commandline.as_str()),
            cwd: as_c_str_w(cwd),
            flags,
            hide: cmd.visible == VisibleMode::Hide,
        })
    }

    fn startup_info(&self, desktop: Option<&mut Vec<u16>>) -> STARTUPINFOW {
        let mut si = STARTUPINFOW {
            cb: std::mem::size_of::<STARTUPINFOW>() as u32,
            ..Default::default()
        };
        if self.hide {
            si.dwFlags |= STARTF_USESHOWWINDOW;
            si.wShowWindow = SW_HIDE.0 as u16;
        }
        if let Some(d) = desktop {
            si.lpDesktop = pwstr(d);
        }
        si
    }
}

pub fn launch(cmd: &CommandDescriptor, context: LaunchContext<'_, ProcessToken>) -> Result<u32> {
    let mut prepared = Prepared::new(cmd)?;
    let pi = match context {
        LaunchContext::Caller => create_plain(&mut prepared)?,
        LaunchContext::Token { token, desktop } => {
            create_with_token(&mut prepared, token, desktop)?
        }
        LaunchContext::ElevationPrompt => return shell_execute_elevated(cmd, &prepared),
        LaunchContext::Container { sid, capabilities } => {
            create_in_container(&mut prepared, sid, capabilities)?
        }
    };
    let _process = OwnedHandle::new(pi.hProcess);
    let _thread = OwnedHandle::new(pi.hThread);
    Ok(pi.dwProcessId)
}

fn create_plain(p: &mut Prepared) -> Result<PROCESS_INFORMATION> {
    let si = p.startup_info(None);
    let mut pi = PROCESS_INFORMATION::default();
    unsafe {
        Threading::CreateProcessW(
            PCWSTR::null(),
            Some(pwstr(&mut p.cmdline)),
            None,
            None,
            false,
            p.flags,
            None,
            PCWSTR(p.cwd.as_ptr()),
            &si,
            &mut pi,
        )
    }
    .map_err(|e| launch_error("CreateProcessW", e))?;
    Ok(pi)
}

fn create_with_token(
    p: &mut Prepared,
    token: &AcquiredToken<ProcessToken>,
    desktop: Option<&str>,
) -> Result<PROCESS_INFORMATION> {
    let handle = token.handle().raw()?;
    let mut desktop = desktop.map(as_c_str_w);
    let si = p.startup_info(desktop.as_mut());
    let mut pi = PROCESS_INFORMATION::default();

    match token.origin() {
        // Derived from our own token: no logon needed.
        TokenOrigin::Caller => unsafe {
            Threading::CreateProcessAsUserW(
                Some(handle),
                PCWSTR::null(),
                Some(pwstr(&mut p.cmdline)),
                None,
                None,
                false,
                p.flags,
                None,
                PCWSTR(p.cwd.as_ptr()),
                &si,
                &mut pi,
            )
        }
        .map_err(|e| launch_error("CreateProcessAsUserW", e))?,
        TokenOrigin::Donor => unsafe {
            Threading::CreateProcessWithTokenW(
                handle,
                LOGON_WITH_PROFILE,
                PCWSTR::null(),
                Some(pwstr(&mut p.cmdline)),
                p.flags,
                None,
                PCWSTR(p.cwd.as_ptr()),
                &si,
                &mut pi,
            )
        }
        .map_err(|e| launch_error("CreateProcessWithTokenW", e))?,
    }
    Ok(pi)
}

fn create_in_container(
    p: &mut Prepared,
    sid: &Sid,
    capabilities: &CapabilitySet,
) -> Result<PROCESS_INFORMATION> {
    let attrs: Vec<Box<dyn ThreadAttribute>> = vec![SecurityCapabilities::new(sid, capabilities)];
    let attr_list = ThreadAttributeList::new(attrs)?;

    let mut si = STARTUPINFOEXW {
        StartupInfo: p.startup_info(None),
        lpAttributeList: attr_list.list(),
    };
    si.StartupInfo.cb = std::mem::size_of::<STARTUPINFOEXW>() as u32;
    let mut pi = PROCESS_INFORMATION::default();
    unsafe {
        Threading::CreateProcessW(
            PCWSTR::null(),
            Some(pwstr(&mut p.cmdline)),
            None,
            None,
            false,
            p.flags | EXTENDED_STARTUPINFO_PRESENT,
            None,
            PCWSTR(p.cwd.as_ptr()),
            &si.StartupInfo,
            &mut pi,
        )
    }
    .map_err(|e| launch_error("CreateProcessW", e))?;
    Ok(pi)
}

/// Ask the OS to elevate through the consent prompt.
fn shell_execute_elevated(cmd: &CommandDescriptor, p: &Prepared) -> Result<u32> {
    let (program, params) = cmd.commandline.split_program();
    let program = as_c_str_w(program);
    let params = as_c_str_w(params);
    let mut info = SHELLEXECUTEINFOW {
        cbSize: std::mem::size_of::<SHELLEXECUTEINFOW>() as u32,
        fMask: SEE_MASK_NOCLOSEPROCESS | SEE_MASK_NOASYNC,
        lpVerb: w!("runas"),
        lpFile: PCWSTR(program.as_ptr()),
        lpParameters: PCWSTR(params.as_ptr()),
        lpDirectory: PCWSTR(p.cwd.as_ptr()),
        nShow: if p.hide { SW_HIDE.0 } else { SW_SHOWNORMAL.0 },
        ..Default::default()
    };
    unsafe { ShellExecuteExW(&mut info) }.map_err(|e| launch_error("ShellExecuteExW", e))?;

    let process = OwnedHandle::new(info.hProcess);
    if !process.is_open() {
        return Err(Error::Launch("the elevation request returned no process".to_string()));
    }
    let pid = unsafe { GetProcessId(process.raw()) };
    debug!("elevated launch returned pid {pid}");
    if pid == 0 {
        return Err(Error::Launch("the elevated process has no id".to_string()));
    }
    Ok(pid)
}
