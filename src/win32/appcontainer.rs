// SPDX-License-Identifier: MIT

//! AppContainer profiles.
//! Because much of windows requires explicit add/remove actions,
//! the OS-allocated SID is wrapped in a struct that implements Drop.

use std::ffi::c_void;
use std::path::PathBuf;

use tracing::debug;
use windows::Win32::{
    Foundation::ERROR_ALREADY_EXISTS,
    Security::{self, Isolation, PSID, SID_AND_ATTRIBUTES},
    System::Com::CoTaskMemFree,
};
use windows::core::PCWSTR;

use crate::capability::CapabilitySet;
use crate::error::{Error, Result};
use crate::sid::Sid;

use super::conv::as_c_str_w;
use super::error::{is_code, profile_error};
use super::process_token::sid_from_psid;

/// A SID allocated by the AppContainer API; released with `FreeSid`.
struct ProfileSid {
    sid: Option<PSID>,
}

impl ProfileSid {
    fn to_sid(&self) -> Result<Sid> {
        match self.sid {
            None => Err(Error::TokenAdjust("AppContainer SID already freed".to_string())),
            Some(psid) => sid_from_psid(psid),
        }
    }
}

impl Drop for ProfileSid {
    fn drop(&mut self) {
        if let Some(sid) = self.sid.take() {
            let _ = unsafe { Security::FreeSid(sid) };
        }
    }
}


/// Capability SIDs laid out as `SID_AND_ATTRIBUTES`.
///
/// The entries point into `_bufs`, so the whole struct must outlive any
/// call that reads `entries`.
pub struct CapabilityBuffers {
    _bufs: Vec<Vec<u8>>,
    pub entries: Vec<SID_AND_ATTRIBUTES>,
}

impl CapabilityBuffers {
    pub fn new(capabilities: &CapabilitySet) -> Self {
        let mut bufs: Vec<Vec<u8>> =
            capabilities.iter().map(|c| c.sid.as_bytes().to_vec()).collect();
        let entries = bufs
            .iter_mut()
            .zip(capabilities.iter())
            .map(|(buf, cap)| SID_AND_ATTRIBUTES {
                Sid: PSID(buf.as_mut_ptr().cast::<c_void>()),
                Attributes: cap.attributes,
            })
            .collect();
        Self { _bufs: bufs, entries }
    }

    /// The entries, or `None` when there are no capabilities.
    pub fn as_slice(&self) -> Option<&[SID_AND_ATTRIBUTES]> {
        if self.entries.is_empty() { None } else { Some(&self.entries) }
    }
}


/// Create the profile, or derive the SID of the existing profile with this name.
pub fn create_or_open(name: &str, capabilities: &CapabilitySet) -> Result<Sid> {
    let wide_name = as_c_str_w(name);
    let caps = CapabilityBuffers::new(capabilities);

    let created = unsafe {
        Isolation::CreateAppContainerProfile(
            PCWSTR(wide_name.as_ptr()), // pszAppContainerName: identifies the profile
            PCWSTR(wide_name.as_ptr()), // pszDisplayName
            PCWSTR(wide_name.as_ptr()), // pszDescription
            caps.as_slice(),
        )
    };
    let psid = match created {
        Ok(psid) => psid,
        Err(e) if is_code(&e, ERROR_ALREADY_EXISTS) => {
            debug!("AppContainer profile {name} exists; deriving its SID");
            let wide = PCWSTR(wide_name.as_ptr());
            unsafe { Isolation::DeriveAppContainerSidFromAppContainerName(wide) }
                .map_err(|e| profile_error(name, e))?
        }
        Err(e) => return Err(profile_error(name, e)),
    };
    ProfileSid { sid: Some(psid) }.to_sid()
}

/// The profile's storage folder, under the user's local app data.
pub fn folder_path(sid: &Sid) -> Result<PathBuf> {
    let sid_str = as_c_str_w(sid.to_string());
    let folder = unsafe { Isolation::GetAppContainerFolderPath(PCWSTR(sid_str.as_ptr())) }
        .map_err(|e| Error::profile(&sid.to_string(), e.message()))?;
    let path = unsafe { folder.to_string() };
    unsafe { CoTaskMemFree(Some(folder.0 as *const c_void)) };
    path.map(PathBuf::from)
        .map_err(|e| Error::profile(&sid.to_string(), e.to_string()))
}

pub fn delete(name: &str) -> Result<()> {
    let wide_name = as_c_str_w(name);
    unsafe { Isolation::DeleteAppContainerProfile(PCWSTR(wide_name.as_ptr())) }
        .map_err(|e| profile_error(name, e))
}
