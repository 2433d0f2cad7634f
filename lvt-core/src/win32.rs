//! Small Win32 helpers shared by the native backends.

use std::ffi::{c_void, OsString};
use std::os::windows::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE, HMODULE, HWND};
use windows::Win32::System::LibraryLoader::{
    GetModuleFileNameW, GetModuleHandleExW, GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS,
    GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
};
use windows::Win32::UI::WindowsAndMessaging::{
    GetClassNameW, GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId,
};

use crate::errors::LvtError;

/// Kernel handle closed on drop.
#[derive(Debug)]
pub struct OwnedHandle(pub HANDLE);

impl OwnedHandle {
    pub fn raw(&self) -> HANDLE {
        self.0
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            let _ = unsafe { CloseHandle(self.0) };
        }
    }
}

// OwnedHandle wraps a kernel object handle, which is process-global.
unsafe impl Send for OwnedHandle {}

/// NUL-terminated UTF-16 copy of `text`.
pub fn wide(text: &str) -> Vec<u16> {
    std::ffi::OsStr::new(text)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

pub fn wide_path(path: &Path) -> Vec<u16> {
    path.as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

/// Lossy UTF-8 from a UTF-16 buffer, stopping at the first NUL.
pub fn from_wide(buf: &[u16]) -> String {
    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    OsString::from_wide(&buf[..end])
        .to_string_lossy()
        .into_owned()
}

pub fn pcwstr(buf: &[u16]) -> PCWSTR {
    PCWSTR(buf.as_ptr())
}

pub fn hwnd(handle: usize) -> HWND {
    HWND(handle as *mut c_void)
}

pub fn hwnd_value(hwnd: HWND) -> usize {
    hwnd.0 as usize
}

/// Read the window class name (up to 256 chars).
pub fn class_name(window: HWND) -> String {
    let mut buf = [0u16; 256];
    let len = unsafe { GetClassNameW(window, &mut buf) };
    if len <= 0 {
        return String::new();
    }
    from_wide(&buf[..len as usize])
}

/// Read the window title.
pub fn window_text(window: HWND) -> String {
    let len = unsafe { GetWindowTextLengthW(window) };
    if len <= 0 {
        return String::new();
    }
    let mut buf = vec![0u16; (len + 1) as usize];
    let copied = unsafe { GetWindowTextW(window, &mut buf) };
    if copied <= 0 {
        return String::new();
    }
    from_wide(&buf[..copied as usize])
}

/// Process owning `window`, if the window still exists.
pub fn window_pid(window: HWND) -> Option<u32> {
    let mut pid = 0u32;
    unsafe { GetWindowThreadProcessId(window, Some(&mut pid)) };
    (pid != 0).then_some(pid)
}

fn module_file_name(module: HMODULE) -> Result<PathBuf, LvtError> {
    let mut buf = vec![0u16; 1024];
    let len = unsafe { GetModuleFileNameW(module, &mut buf) } as usize;
    if len == 0 || len >= buf.len() {
        return Err(LvtError::Io(std::io::Error::last_os_error()));
    }
    Ok(PathBuf::from(OsString::from_wide(&buf[..len])))
}

/// Path of the module containing `address` (used by DLLs to find themselves).
pub fn module_path_from_address(address: *const c_void) -> Result<PathBuf, LvtError> {
    let mut module = HMODULE::default();
    unsafe {
        GetModuleHandleExW(
            GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS | GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
            PCWSTR(address as *const u16),
            &mut module,
        )?;
    }
    module_file_name(module)
}

/// Directory holding the running executable; instrumentation artifacts are
/// deployed beside it.
pub fn exe_dir() -> Result<PathBuf, LvtError> {
    let exe = std::env::current_exe()?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| LvtError::CapabilityMismatch(format!("{} has no parent", exe.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_roundtrip_stops_at_nul() {
        let w = wide("lvt_tap.dll");
        assert_eq!(*w.last().unwrap(), 0);
        assert_eq!(from_wide(&w), "lvt_tap.dll");
    }
}
