// SPDX-License-Identifier: MIT

//! String conversions for wide-character Win32 calls.

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;

use windows::core::{PCWSTR, PWSTR};

/// Convert the OS string into a null-terminated wide (16-bit) C string.
pub fn as_c_str_w(s: impl AsRef<OsStr>) -> Vec<u16> {
    s.as_ref().encode_wide().chain(std::iter::once(0)).collect()
}

/// Pointer to an owned wide string, or null when there is none.
pub fn pcwstr(buf: Option<&Vec<u16>>) -> PCWSTR {
    match buf {
        Some(b) => PCWSTR(b.as_ptr()),
        None => PCWSTR::null(),
    }
}

pub fn pwstr(buf: &mut [u16]) -> PWSTR {
    PWSTR(buf.as_mut_ptr())
}

/// Read a null-terminated buffer, such as `szExeFile`, into a `String`.
pub fn from_wide_buf(buf: &[u16]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}
