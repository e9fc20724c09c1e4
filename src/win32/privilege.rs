// SPDX-License-Identifier: MIT

//! Enabling privileges on the caller's own token.

use windows::Win32::{
    Foundation::{ERROR_NOT_ALL_ASSIGNED, GetLastError, LUID},
    Security::{self, LUID_AND_ATTRIBUTES, TOKEN_PRIVILEGES},
};
use windows::core::PCWSTR;

use crate::error::{Error, Result};
use crate::token::Privilege;

use super::conv::as_c_str_w;
use super::process_token::ProcessToken;

/// Enable `privilege` on the current process token.
///
/// `AdjustTokenPrivileges` succeeds even when the token does not hold the
/// privilege at all; that case is reported through the last error.
pub fn enable(privilege: Privilege) -> Result<()> {
    let fail = |reason: String| Error::Privilege { privilege, reason };

    let access = Security::TOKEN_ADJUST_PRIVILEGES | Security::TOKEN_QUERY;
    let token = ProcessToken::current_process(access).map_err(|e| fail(e.to_string()))?;

    let name = as_c_str_w(privilege.name());
    let mut luid = LUID::default();
    unsafe { Security::LookupPrivilegeValueW(PCWSTR::null(), PCWSTR(name.as_ptr()), &mut luid) }
        .map_err(|e| fail(e.message()))?;

    let state = TOKEN_PRIVILEGES {
        PrivilegeCount: 1,
        Privileges: [LUID_AND_ATTRIBUTES {
            Luid: luid,
            Attributes: Security::SE_PRIVILEGE_ENABLED,
        }],
    };
    let handle = token.raw().map_err(|e| fail(e.to_string()))?;
    unsafe { Security::AdjustTokenPrivileges(handle, false, Some(&state), 0, None, None) }
        .map_err(|e| fail(e.message()))?;

    if unsafe { GetLastError() } == ERROR_NOT_ALL_ASSIGNED {
        return Err(fail("the caller's token does not hold it".to_string()));
    }
    Ok(())
}
