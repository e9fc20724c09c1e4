// SPDX-License-Identifier: MIT

//! Process/Thread Attribute List.
//! Because much of windows requires explicit add/remove actions,
//! wrapping it in a single struct that implements Drop will make code maintenance easier.

use std::ffi::c_void;

use windows::Win32::{
    Foundation::{ERROR_INSUFFICIENT_BUFFER, GetLastError},
    Security::{PSID, SECURITY_CAPABILITIES},
    System::Threading,
};

use crate::capability::CapabilitySet;
use crate::error::{Error, Result};
use crate::sid::Sid;

use super::appcontainer::CapabilityBuffers;

pub trait ThreadAttribute {
    fn lp_value(&self) -> *const c_void;
    fn attribute(&self) -> usize;
    fn cb_size(&self) -> usize;
}

/// The AppContainer SID plus capabilities, as `SECURITY_CAPABILITIES`.
///
/// Owns every buffer the structure points into.
pub struct SecurityCapabilities {
    _container: Vec<u8>,
    _capabilities: CapabilityBuffers,
    value: SECURITY_CAPABILITIES,
}

impl SecurityCapabilities {
    pub fn new(container: &Sid, capabilities: &CapabilitySet) -> Box<Self> {
        let mut container = container.as_bytes().to_vec();
        let mut capabilities = CapabilityBuffers::new(capabilities);
        let value = SECURITY_CAPABILITIES {
            AppContainerSid: PSID(container.as_mut_ptr().cast::<c_void>()),
            Capabilities: if capabilities.entries.is_empty() {
                std::ptr::null_mut()
            } else {
                capabilities.entries.as_mut_ptr()
            },
            CapabilityCount: capabilities.entries.len() as u32,
            Reserved: 0,
        };
        Box::new(Self { _container: container, _capabilities: capabilities, value })
    }
}

impl ThreadAttribute for SecurityCapabilities {
    fn lp_value(&self) -> *const c_void {
        (&self.value as *const SECURITY_CAPABILITIES).cast()
    }

    fn attribute(&self) -> usize {
        Threading::PROC_THREAD_ATTRIBUTE_SECURITY_CAPABILITIES as usize
    }

    fn cb_size(&self) -> usize {
        std::mem::size_of::<SECURITY_CAPABILITIES>()
    }
}


pub struct ThreadAttributeList {
    // The attribute values must stay put while the list refers to them.
    _attributes: Vec<Box<dyn ThreadAttribute>>,
    // Backing storage for the list itself.
    _attr_buf: Vec<u8>,
    attr_list: Option<Threading::LPPROC_THREAD_ATTRIBUTE_LIST>,
}

impl ThreadAttributeList {
    pub fn new(attributes: Vec<Box<dyn ThreadAttribute>>) -> Result<Self> {
        let setup = |e: windows::core::Error| {
            Error::Launch(format!("unable to build the process attribute list: {}", e.message()))
        };
        unsafe {
            // The sizing call always reports ERROR_INSUFFICIENT_BUFFER.
            let mut attr_size: usize = 0;
            if let Err(e) = Threading::InitializeProcThreadAttributeList(
                None,
                attributes.len() as u32,
                Some(0),
                &mut attr_size,
            ) {
                if GetLastError() != ERROR_INSUFFICIENT_BUFFER {
                    return Err(setup(e));
                }
            }

            let mut attr_buf = vec![0u8; attr_size];
            let attr_list =
                Threading::LPPROC_THREAD_ATTRIBUTE_LIST(attr_buf.as_mut_ptr().cast::<_>());
            Threading::InitializeProcThreadAttributeList(
                Some(attr_list),
                attributes.len() as u32,
                Some(0),
                &mut attr_size,
            )
            .map_err(setup)?;
            let mut list = Self {
                _attributes: vec![],
                _attr_buf: attr_buf,
                attr_list: Some(attr_list),
            };

            for attr in &attributes {
                Threading::UpdateProcThreadAttribute(
                    attr_list,
                    0, // dwFlags must be 0
                    attr.attribute(),
                    Some(attr.lp_value()),
                    attr.cb_size(),
                    None,
                    None,
                )
                .map_err(setup)?;
            }
            list._attributes = attributes;
            Ok(list)
        }
    }

    pub fn list(&self) -> Threading::LPPROC_THREAD_ATTRIBUTE_LIST {
        self.attr_list
            .unwrap_or(Threading::LPPROC_THREAD_ATTRIBUTE_LIST(std::ptr::null_mut()))
    }
}

impl Drop for ThreadAttributeList {
    fn drop(&mut self) {
        if let Some(list) = self.attr_list.take() {
            let _ = unsafe { Threading::DeleteProcThreadAttributeList(list) };
        }
    }
}
