// SPDX-License-Identifier: MIT

//! Owned kernel handles.
//! Because much of windows requires explicit add/remove actions,
//! wrapping the handle in a struct that implements Drop keeps every
//! early return from leaking it.

use windows::Win32::Foundation::{CloseHandle, HANDLE};

#[derive(Debug)]
pub struct OwnedHandle {
    handle: Option<HANDLE>,
}

impl OwnedHandle {
    /// Take ownership of a handle returned by the OS.  Null and invalid
    /// handles are held as closed.
    pub fn new(handle: HANDLE) -> Self {
        if handle.is_invalid() {
            Self { handle: None }
        } else {
            Self { handle: Some(handle) }
        }
    }

    pub fn raw(&self) -> HANDLE {
        self.handle.unwrap_or_default()
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn close(&mut self) -> windows::core::Result<()> {
        match self.handle.take() {
            None => Ok(()),
            Some(h) => unsafe { CloseHandle(h) },
        }
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
