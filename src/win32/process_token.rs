// SPDX-License-Identifier: MIT

//! Access tokens for the current process and for donor processes.
//! Because much of windows requires explicit add/remove actions,
//! wrapping it in a single struct that implements Drop will make code maintenance easier.

use std::ffi::c_void;

use windows::Win32::{
    Foundation::{CloseHandle, HANDLE},
    Security::{self, PSID, SID_AND_ATTRIBUTES, TOKEN_ACCESS_MASK, TOKEN_INFORMATION_CLASS},
    System::Threading,
};

use crate::error::{Error, Result};
use crate::sid::{IntegrityLevel, Sid};

use super::error::{adjust_error, open_error};

/// `SE_GROUP_INTEGRITY` from winnt.h.
const SE_GROUP_INTEGRITY: u32 = 0x0000_0020;

#[derive(Debug)]
pub struct ProcessToken {
    token: Option<HANDLE>,
}

impl ProcessToken {
    /// Open the token of the current process.
    pub fn current_process(access: TOKEN_ACCESS_MASK) -> Result<Self> {
        let mut h_token = HANDLE::default();
        unsafe { Threading::OpenProcessToken(Threading::GetCurrentProcess(), access, &mut h_token) }
            .map_err(|e| adjust_error("open the current process token", e))?;
        Ok(Self { token: Some(h_token) })
    }

    /// Open the token of another process.  The process handle is only held
    /// for as long as it takes to open the token.
    pub fn open_process(pid: u32, access: TOKEN_ACCESS_MASK) -> Result<Self> {
        let h_process = unsafe {
            Threading::OpenProcess(Threading::PROCESS_QUERY_LIMITED_INFORMATION, false, pid)
        }
        .map_err(|e| open_error(pid, e))?;
        let process = super::handle::OwnedHandle::new(h_process);

        let mut h_token = HANDLE::default();
        unsafe { Threading::OpenProcessToken(process.raw(), access, &mut h_token) }
            .map_err(|e| open_error(pid, e))?;
        Ok(Self { token: Some(h_token) })
    }

    /// Duplicate into a primary token that can also be used for impersonation.
    pub fn duplicate_primary(&self) -> Result<Self> {
        let mut h_new = HANDLE::default();
        unsafe {
            Security::DuplicateTokenEx(
                self.raw()?,
                Security::TOKEN_ALL_ACCESS,
                None,
                Security::SecurityImpersonation,
                Security::TokenPrimary,
                &mut h_new,
            )
        }
        .map_err(|e| adjust_error("duplicate token", e))?;
        Ok(Self { token: Some(h_new) })
    }

    pub fn handle(&self) -> Option<HANDLE> {
        self.token
    }

    pub fn raw(&self) -> Result<HANDLE> {
        self.token.ok_or_else(|| Error::TokenAdjust("token handle already closed".to_string()))
    }

    pub fn elevated(&self) -> Result<bool> {
        let mut elevation = Security::TOKEN_ELEVATION::default();
        let mut len = 0u32;
        unsafe {
            Security::GetTokenInformation(
                self.raw()?,
                Security::TokenElevation,
                Some((&mut elevation as *mut Security::TOKEN_ELEVATION).cast::<c_void>()),
                std::mem::size_of::<Security::TOKEN_ELEVATION>() as u32,
                &mut len,
            )
        }
        .map_err(|e| adjust_error("query token elevation", e))?;
        Ok(elevation.TokenIsElevated != 0)
    }

    pub fn session_id(&self) -> Result<u32> {
        let mut session = 0u32;
        let mut len = 0u32;
        unsafe {
            Security::GetTokenInformation(
                self.raw()?,
                Security::TokenSessionId,
                Some((&mut session as *mut u32).cast::<c_void>()),
                std::mem::size_of::<u32>() as u32,
                &mut len,
            )
        }
        .map_err(|e| adjust_error("query token session", e))?;
        Ok(session)
    }

    pub fn set_session_id(&mut self, session: u32) -> Result<()> {
        unsafe {
            Security::SetTokenInformation(
                self.raw()?,
                Security::TokenSessionId,
                (&session as *const u32).cast::<c_void>(),
                std::mem::size_of::<u32>() as u32,
            )
        }
        .map_err(|e| adjust_error("set token session", e))
    }

    /// The account SID the token runs as.
    pub fn user(&self) -> Result<Sid> {
        let buf = self.query(Security::TokenUser)?;
        let user = unsafe { &*(buf.as_ptr().cast::<Security::TOKEN_USER>()) };
        sid_from_psid(user.User.Sid)
    }

    /// The mandatory integrity level of the token.
    pub fn integrity(&self) -> Result<IntegrityLevel> {
        let buf = self.query(Security::TokenIntegrityLevel)?;
        let label = unsafe { &*(buf.as_ptr().cast::<Security::TOKEN_MANDATORY_LABEL>()) };
        let sid = sid_from_psid(label.Label.Sid)?;
        sid.rid()
            .map(IntegrityLevel::from_rid)
            .ok_or_else(|| Error::TokenAdjust("integrity label has no rid".to_string()))
    }

    /// Replace the mandatory integrity label.
    pub fn set_integrity(&mut self, level: IntegrityLevel) -> Result<()> {
        let label_sid = level.label_sid();
        let mut sid_bytes = label_sid.as_bytes().to_vec();
        let label = Security::TOKEN_MANDATORY_LABEL {
            Label: SID_AND_ATTRIBUTES {
                Sid: PSID(sid_bytes.as_mut_ptr().cast::<c_void>()),
                Attributes: SE_GROUP_INTEGRITY,
            },
        };
        unsafe {
            Security::SetTokenInformation(
                self.raw()?,
                Security::TokenIntegrityLevel,
                (&label as *const Security::TOKEN_MANDATORY_LABEL).cast::<c_void>(),
                (std::mem::size_of::<Security::TOKEN_MANDATORY_LABEL>() + sid_bytes.len()) as u32,
            )
        }
        .map_err(|e| adjust_error("set integrity level", e))
    }

    /// Variable-length token information, sized by a first probing call.
    /// The buffer is `u64` so the returned structures are aligned; SIDs
    /// inside point back into it.
    fn query(&self, class: TOKEN_INFORMATION_CLASS) -> Result<Vec<u64>> {
        let token = self.raw()?;
        let mut needed = 0u32;
        // The size probe always fails with ERROR_INSUFFICIENT_BUFFER.
        let _ = unsafe { Security::GetTokenInformation(token, class, None, 0, &mut needed) };
        if needed == 0 {
            return Err(Error::TokenAdjust(format!("token information class {} is empty", class.0)));
        }
        let mut buf = vec![0u64; (needed as usize).div_ceil(8)];
        unsafe {
            Security::GetTokenInformation(
                token,
                class,
                Some(buf.as_mut_ptr().cast::<c_void>()),
                needed,
                &mut needed,
            )
        }
        .map_err(|e| adjust_error("query token information", e))?;
        Ok(buf)
    }

    pub fn close(&mut self) -> windows::core::Result<()> {
        match self.token.take() {
            None => Ok(()),
            Some(h) => unsafe { CloseHandle(h) },
        }
    }
}

impl Drop for ProcessToken {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Copy an OS-owned SID into an owned [`Sid`].
pub fn sid_from_psid(psid: PSID) -> Result<Sid> {
    if psid.0.is_null() {
        return Err(Error::TokenAdjust("null SID".to_string()));
    }
    let len = unsafe { Security::GetLengthSid(psid) } as usize;
    let raw = unsafe { std::slice::from_raw_parts(psid.0.cast::<u8>(), len) };
    Sid::from_bytes(raw).map_err(|e| Error::TokenAdjust(e.to_string()))
}
