//! Remote process memory and code-loading injection.

use std::ffi::c_void;
use std::path::Path;
use std::time::Duration;

use windows::core::{s, w};
use windows::Win32::Foundation::{BOOL, WAIT_OBJECT_0};
use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress};
use windows::Win32::System::Memory::{
    VirtualAllocEx, VirtualFreeEx, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE,
};
use windows::Win32::System::Threading::{
    CreateRemoteThread, GetCurrentProcess, GetExitCodeThread, IsWow64Process, OpenProcess,
    WaitForSingleObject, PROCESS_ACCESS_RIGHTS, PROCESS_CREATE_THREAD,
    PROCESS_QUERY_INFORMATION, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_VM_OPERATION,
    PROCESS_VM_READ, PROCESS_VM_WRITE,
};

use crate::errors::LvtError;
use crate::win32::{self, OwnedHandle};

type ThreadStart = unsafe extern "system" fn(*mut c_void) -> u32;

/// An opened target process.
pub struct ProcessHandle {
    pid: u32,
    handle: OwnedHandle,
}

impl ProcessHandle {
    pub fn open(pid: u32, access: PROCESS_ACCESS_RIGHTS) -> Result<Self, LvtError> {
        let handle = unsafe { OpenProcess(access, false, pid) }
            .map_err(|e| LvtError::TargetUnreachable(format!("OpenProcess({pid}): {e}")))?;
        Ok(Self {
            pid,
            handle: OwnedHandle(handle),
        })
    }

    /// Rights needed to allocate, write, read and start threads.
    pub fn open_for_injection(pid: u32) -> Result<Self, LvtError> {
        Self::open(
            pid,
            PROCESS_CREATE_THREAD
                | PROCESS_VM_OPERATION
                | PROCESS_VM_WRITE
                | PROCESS_VM_READ
                | PROCESS_QUERY_INFORMATION,
        )
    }

    /// Rights needed for remote buffers only.
    pub fn open_for_memory(pid: u32) -> Result<Self, LvtError> {
        Self::open(pid, PROCESS_VM_OPERATION | PROCESS_VM_WRITE | PROCESS_VM_READ)
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_wow64(&self) -> Result<bool, LvtError> {
        let mut wow64 = BOOL::default();
        unsafe { IsWow64Process(self.handle.raw(), &mut wow64) }?;
        Ok(wow64.as_bool())
    }
}

/// Whether `pid` runs with a different pointer width than this process.
pub fn is_foreign_bitness(pid: u32) -> Result<bool, LvtError> {
    let target = ProcessHandle::open(pid, PROCESS_QUERY_LIMITED_INFORMATION)?.is_wow64()?;
    if cfg!(target_pointer_width = "64") {
        return Ok(target);
    }
    let mut host = BOOL::default();
    unsafe { IsWow64Process(GetCurrentProcess(), &mut host) }?;
    Ok(host.as_bool() != target)
}

/// Scoped allocation in another process, released on drop unless leaked.
pub struct RemoteBuffer<'p> {
    process: &'p ProcessHandle,
    address: *mut c_void,
    size: usize,
    leaked: bool,
}

impl<'p> RemoteBuffer<'p> {
    pub fn alloc(process: &'p ProcessHandle, size: usize) -> Result<Self, LvtError> {
        let address = unsafe {
            VirtualAllocEx(
                process.handle.raw(),
                None,
                size,
                MEM_COMMIT | MEM_RESERVE,
                PAGE_READWRITE,
            )
        };
        if address.is_null() {
            return Err(LvtError::TargetUnreachable(format!(
                "VirtualAllocEx({}, {size}) failed: {}",
                process.pid,
                std::io::Error::last_os_error()
            )));
        }
        Ok(Self {
            process,
            address,
            size,
            leaked: false,
        })
    }

    pub fn address(&self) -> usize {
        self.address as usize
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn check(&self, offset: usize, len: usize) -> Result<(), LvtError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(LvtError::Transport(format!(
                "remote access {offset}+{len} outside buffer of {}",
                self.size
            ))),
        }
    }

    pub fn write(&self, offset: usize, bytes: &[u8]) -> Result<(), LvtError> {
        self.check(offset, bytes.len())?;
        unsafe {
            WriteProcessMemory(
                self.process.handle.raw(),
                self.address.add(offset),
                bytes.as_ptr() as *const c_void,
                bytes.len(),
                None,
            )
        }
        .map_err(|e| LvtError::Transport(format!("WriteProcessMemory: {e}")))
    }

    pub fn read(&self, offset: usize, out: &mut [u8]) -> Result<(), LvtError> {
        self.check(offset, out.len())?;
        unsafe {
            ReadProcessMemory(
                self.process.handle.raw(),
                self.address.add(offset),
                out.as_mut_ptr() as *mut c_void,
                out.len(),
                None,
            )
        }
        .map_err(|e| LvtError::Transport(format!("ReadProcessMemory: {e}")))
    }

    /// Keep the allocation alive past drop; used when a remote thread may
    /// still be reading it.
    pub fn leak(mut self) {
        self.leaked = true;
    }
}

impl Drop for RemoteBuffer<'_> {
    fn drop(&mut self) {
        if self.leaked {
            return;
        }
        unsafe {
            let _ = VirtualFreeEx(self.process.handle.raw(), self.address, 0, MEM_RELEASE);
        }
    }
}

fn load_library_address() -> Result<ThreadStart, LvtError> {
    let kernel32 = unsafe { GetModuleHandleW(w!("kernel32.dll")) }?;
    let proc = unsafe { GetProcAddress(kernel32, s!("LoadLibraryW")) }
        .ok_or_else(|| LvtError::Injection("LoadLibraryW not found in kernel32".into()))?;
    Ok(unsafe { std::mem::transmute::<unsafe extern "system" fn() -> isize, ThreadStart>(proc) })
}

/// Load `module` into `pid` with a remote `LoadLibraryW` thread.
///
/// Waits at most `wait` for the thread; its exit code is the low half of
/// the loaded module handle, so zero means the load failed.
pub fn inject_library(pid: u32, module: &Path, wait: Duration) -> Result<(), LvtError> {
    let process = ProcessHandle::open_for_injection(pid)?;
    let path = win32::wide_path(module);
    let bytes: Vec<u8> = path.iter().flat_map(|c| c.to_le_bytes()).collect();

    let buffer = RemoteBuffer::alloc(&process, bytes.len())?;
    buffer.write(0, &bytes)?;

    let start = load_library_address()?;
    let thread = unsafe {
        CreateRemoteThread(
            process.handle.raw(),
            None,
            0,
            Some(start),
            Some(buffer.address as *const c_void),
            0,
            None,
        )
    }
    .map_err(|e| LvtError::Injection(format!("CreateRemoteThread({pid}): {e}")))?;
    let thread = OwnedHandle(thread);

    let millis = wait.as_millis().min(u128::from(u32::MAX - 1)) as u32;
    if unsafe { WaitForSingleObject(thread.raw(), millis) } != WAIT_OBJECT_0 {
        buffer.leak();
        return Err(LvtError::Timeout(format!(
            "LoadLibraryW thread in {pid} did not finish within {}s",
            wait.as_secs()
        )));
    }

    let mut exit_code = 0u32;
    unsafe { GetExitCodeThread(thread.raw(), &mut exit_code) }?;
    drop(buffer);
    if exit_code == 0 {
        return Err(LvtError::Injection(format!(
            "LoadLibraryW({}) failed in target {pid}",
            module.display()
        )));
    }
    log::debug!("{} loaded into {pid}", module.display());
    Ok(())
}
