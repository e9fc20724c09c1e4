// SPDX-License-Identifier: MIT

//! Granting a container SID access to files and registry keys by merging an
//! allow entry into the object's DACL.

use std::ffi::c_void;

use windows::Win32::{
    Foundation::{HLOCAL, LocalFree},
    Security::{
        ACL, DACL_SECURITY_INFORMATION, PSECURITY_DESCRIPTOR,
        SUB_CONTAINERS_AND_OBJECTS_INHERIT,
        Authorization::{
            EXPLICIT_ACCESS_W, GRANT_ACCESS, GetNamedSecurityInfoW, NO_MULTIPLE_TRUSTEE,
            SE_FILE_OBJECT, SE_OBJECT_TYPE, SE_REGISTRY_KEY, SetEntriesInAclW,
            SetNamedSecurityInfoW, TRUSTEE_IS_SID, TRUSTEE_IS_UNKNOWN, TRUSTEE_W,
        },
    },
};
use windows::core::{PCWSTR, PWSTR};

use crate::error::{Error, Result};
use crate::platform::{Access, ResourceTarget};
use crate::sid::Sid;

use super::conv::as_c_str_w;
use super::error::win32_result;

// FILE_GENERIC_READ | FILE_GENERIC_EXECUTE
const FILE_READ_EXECUTE: u32 = 0x0012_00a9;
// FILE_ALL_ACCESS
const FILE_READ_WRITE: u32 = 0x001f_01ff;
// KEY_READ
const KEY_READ: u32 = 0x0002_0019;
// KEY_ALL_ACCESS
const KEY_READ_WRITE: u32 = 0x000f_003f;

fn access_mask(target: &ResourceTarget, access: Access) -> u32 {
    match (target, access) {
        (ResourceTarget::Directory(_), Access::ReadExecute) => FILE_READ_EXECUTE,
        (ResourceTarget::Directory(_), Access::ReadWrite) => FILE_READ_WRITE,
        (ResourceTarget::RegistryKey(_), Access::ReadExecute) => KEY_READ,
        (ResourceTarget::RegistryKey(_), Access::ReadWrite) => KEY_READ_WRITE,
    }
}

/// Frees a `LocalAlloc`ed block on drop.
struct LocalBlock(*mut c_void);

impl Drop for LocalBlock {
    fn drop(&mut self) {
        if !self.0.is_null() {
            let _ = unsafe { LocalFree(Some(HLOCAL(self.0))) };
        }
    }
}

pub fn grant(sid: &Sid, target: &ResourceTarget, access: Access) -> Result<()> {
    let (name, object_type): (Vec<u16>, SE_OBJECT_TYPE) = match target {
        ResourceTarget::Directory(path) => {
            if !path.is_dir() {
                return Err(Error::Grant {
                    target: target.to_string(),
                    reason: "no such directory".to_string(),
                });
            }
            (as_c_str_w(path), SE_FILE_OBJECT)
        }
        ResourceTarget::RegistryKey(key) => (as_c_str_w(key), SE_REGISTRY_KEY),
    };
    let fail = |e: windows::core::Error| Error::Grant {
        target: target.to_string(),
        reason: e.message(),
    };
    let mut sid_bytes = sid.as_bytes().to_vec();

    unsafe {
        let mut old_acl: *mut ACL = std::ptr::null_mut();
        let mut sd = PSECURITY_DESCRIPTOR::default();
        win32_result(GetNamedSecurityInfoW(
            PCWSTR(name.as_ptr()),
            object_type,
            DACL_SECURITY_INFORMATION,
            None,
            None,
            Some(&mut old_acl),
            None,
            &mut sd,
        ))
        .map_err(fail)?;
        // old_acl points into the descriptor.
        let _sd = LocalBlock(sd.0);

        let explicit = EXPLICIT_ACCESS_W {
            grfAccessPermissions: access_mask(target, access),
            grfAccessMode: GRANT_ACCESS,
            grfInheritance: SUB_CONTAINERS_AND_OBJECTS_INHERIT,
            Trustee: TRUSTEE_W {
                pMultipleTrustee: std::ptr::null_mut(),
                MultipleTrusteeOperation: NO_MULTIPLE_TRUSTEE,
                TrusteeForm: TRUSTEE_IS_SID,
                TrusteeType: TRUSTEE_IS_UNKNOWN,
                ptstrName: PWSTR(sid_bytes.as_mut_ptr().cast::<u16>()),
            },
        };

        let mut new_acl: *mut ACL = std::ptr::null_mut();
        win32_result(SetEntriesInAclW(Some(&[explicit]), Some(old_acl), &mut new_acl))
            .map_err(fail)?;
        let _new_acl = LocalBlock(new_acl.cast::<c_void>());

        win32_result(SetNamedSecurityInfoW(
            PCWSTR(name.as_ptr()),
            object_type,
            DACL_SECURITY_INFORMATION,
            None,
            None,
            Some(new_acl),
            None,
        ))
        .map_err(fail)
    }
}
