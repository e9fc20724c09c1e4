// SPDX-License-Identifier: MIT

//! Mapping from Win32 failures into the crate error.

use windows::Win32::Foundation::{
    ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER, ERROR_NOT_FOUND, WIN32_ERROR,
};
use windows_result::HRESULT;

use crate::error::Error;

/// True when the Win32 error carries the given code.
pub fn is_code(e: &windows::core::Error, code: WIN32_ERROR) -> bool {
    e.code() == HRESULT::from_win32(code.0)
}

/// Failure to open a process or its token.
pub fn open_error(pid: u32, e: windows::core::Error) -> Error {
    if is_code(&e, ERROR_ACCESS_DENIED) {
        Error::AccessDenied { target: format!("process {pid}"), reason: e.message() }
    } else if is_code(&e, ERROR_INVALID_PARAMETER) || is_code(&e, ERROR_NOT_FOUND) {
        Error::ProcessOpen { pid, reason: "process no longer exists".to_string() }
    } else {
        Error::ProcessOpen { pid, reason: e.message() }
    }
}

pub fn adjust_error(what: &str, e: windows::core::Error) -> Error {
    Error::TokenAdjust(format!("{what}: {}", e.message()))
}

pub fn launch_error(api: &str, e: windows::core::Error) -> Error {
    Error::Launch(format!("{api} failed: {}", e.message()))
}

pub fn profile_error(name: &str, e: windows::core::Error) -> Error {
    Error::profile(name, e.message())
}

/// Calls that report a bare `WIN32_ERROR` instead of a `Result`.
pub fn win32_result(code: WIN32_ERROR) -> windows::core::Result<()> {
    if code.is_ok() {
        Ok(())
    } else {
        Err(windows::core::Error::from_hresult(HRESULT::from_win32(code.0)))
    }
}
