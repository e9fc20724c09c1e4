// SPDX-License-Identifier: MIT

//! Service control manager queries for the service donor.

use std::time::{Duration, Instant};

use tracing::debug;
use windows::Win32::{
    Foundation::{ERROR_ACCESS_DENIED, ERROR_SERVICE_ALREADY_RUNNING},
    System::Services::{
        CloseServiceHandle, OpenSCManagerW, OpenServiceW, QueryServiceStatusEx, SC_HANDLE,
        SC_MANAGER_CONNECT, SC_STATUS_PROCESS_INFO, SERVICE_QUERY_STATUS, SERVICE_RUNNING,
        SERVICE_START, SERVICE_STATUS_PROCESS, SERVICE_STOPPED, StartServiceW,
    },
};
use windows::core::PCWSTR;

use crate::error::{Error, Result};

use super::conv::as_c_str_w;
use super::error::is_code;

const START_TIMEOUT: Duration = Duration::from_secs(30);
const MIN_POLL: Duration = Duration::from_millis(100);
const MAX_POLL: Duration = Duration::from_secs(1);

/// Closes the service handle on drop.
struct ServiceHandle {
    handle: Option<SC_HANDLE>,
}

impl ServiceHandle {
    fn raw(&self) -> SC_HANDLE {
        self.handle.unwrap_or_default()
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        if let Some(h) = self.handle.take() {
            let _ = unsafe { CloseServiceHandle(h) };
        }
    }
}

fn service_error(name: &str, e: windows::core::Error) -> Error {
    if is_code(&e, ERROR_ACCESS_DENIED) {
        Error::AccessDenied { target: format!("service {name}"), reason: e.message() }
    } else {
        Error::Service { name: name.to_string(), reason: e.message() }
    }
}

fn open(name: &str, access: u32) -> Result<ServiceHandle> {
    let manager = unsafe { OpenSCManagerW(PCWSTR::null(), PCWSTR::null(), SC_MANAGER_CONNECT) }
        .map_err(|e| service_error(name, e))?;
    let manager = ServiceHandle { handle: Some(manager) };

    let wide = as_c_str_w(name);
    let service = unsafe { OpenServiceW(manager.raw(), PCWSTR(wide.as_ptr()), access) }
        .map_err(|e| service_error(name, e))?;
    Ok(ServiceHandle { handle: Some(service) })
}

fn status(name: &str, service: &ServiceHandle) -> Result<SERVICE_STATUS_PROCESS> {
    let mut buf = [0u8; std::mem::size_of::<SERVICE_STATUS_PROCESS>()];
    let mut needed = 0u32;
    unsafe {
        QueryServiceStatusEx(service.raw(), SC_STATUS_PROCESS_INFO, Some(&mut buf), &mut needed)
    }
        .map_err(|e| service_error(name, e))?;
    Ok(unsafe { std::ptr::read_unaligned(buf.as_ptr().cast::<SERVICE_STATUS_PROCESS>()) })
}

/// Pid of the service process while it is running.
pub fn running_pid(name: &str) -> Result<Option<u32>> {
    let service = open(name, SERVICE_QUERY_STATUS)?;
    let st = status(name, &service)?;
    if st.dwCurrentState == SERVICE_RUNNING && st.dwProcessId != 0 {
        Ok(Some(st.dwProcessId))
    } else {
        Ok(None)
    }
}

/// Start the service and wait, bounded, until it reports running.
pub fn start(name: &str) -> Result<()> {
    let service = open(name, SERVICE_START | SERVICE_QUERY_STATUS)?;
    match unsafe { StartServiceW(service.raw(), None) } {
        Ok(()) => (),
        Err(e) if is_code(&e, ERROR_SERVICE_ALREADY_RUNNING) => {
            debug!("service {name} is already running");
        }
        Err(e) => return Err(service_error(name, e)),
    }

    let deadline = Instant::now() + START_TIMEOUT;
    loop {
        let st = status(name, &service)?;
        if st.dwCurrentState == SERVICE_RUNNING {
            return Ok(());
        }
        if st.dwCurrentState == SERVICE_STOPPED {
            return Err(Error::Service {
                name: name.to_string(),
                reason: format!("stopped while starting (exit code {})", st.dwWin32ExitCode),
            });
        }
        if Instant::now() >= deadline {
            return Err(Error::Service {
                name: name.to_string(),
                reason: format!("not running after {} seconds", START_TIMEOUT.as_secs()),
            });
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        std::thread::sleep(poll_interval(st.dwWaitHint).min(remaining));
    }
}

/// A tenth of the service's wait hint, kept between 100 ms and 1 s.
fn poll_interval(wait_hint_ms: u32) -> Duration {
    (Duration::from_millis(u64::from(wait_hint_ms)) / 10).clamp(MIN_POLL, MAX_POLL)
}
