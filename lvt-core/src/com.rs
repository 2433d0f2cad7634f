//! COM apartment guard for worker threads inside the target.
//!
//! Instrumentation workers make COM calls (diagnostics service, CLR
//! hosting interfaces) from threads they create themselves, so each worker
//! joins the multithreaded apartment for its lifetime.
//!
//! The guard is `!Send`: it must be dropped on the thread that created it.

use std::marker::PhantomData;

use windows::Win32::Foundation::{RPC_E_CHANGED_MODE, S_FALSE, S_OK};
use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED};

use crate::errors::LvtError;

#[must_use = "the apartment is left when the guard is dropped"]
pub struct ComApartment {
    should_uninit: bool,
    _not_send: PhantomData<*const ()>,
}

impl ComApartment {
    /// Join the MTA on the current thread.
    ///
    /// A thread that already lives in an STA keeps it; COM stays usable and
    /// the guard does not uninitialize on drop.
    pub fn enter() -> Result<Self, LvtError> {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        let should_uninit = if hr == S_OK || hr == S_FALSE {
            true
        } else if hr == RPC_E_CHANGED_MODE {
            log::debug!("thread already in an STA; keeping it");
            false
        } else {
            return Err(LvtError::Com(format!("CoInitializeEx failed: HRESULT 0x{:08X}", hr.0 as u32)));
        };
        Ok(Self {
            should_uninit,
            _not_send: PhantomData,
        })
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        if self.should_uninit {
            unsafe { CoUninitialize() };
        }
    }
}
