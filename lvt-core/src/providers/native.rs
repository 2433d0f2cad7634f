//! Live [`Acquirer`] backed by Win32.

use std::path::{Path, PathBuf};
use std::time::Duration;

use windows::Win32::Foundation::{LPARAM, WPARAM};
use windows::Win32::UI::WindowsAndMessaging::{SendMessageTimeoutW, SMTO_ABORTIFHUNG, SMTO_ERRORONEXIT};

use super::comctl::{ControlHost, RemoteMemory};
use super::Acquirer;
use crate::detect::{self, native::NativeInspector};
use crate::errors::LvtError;
use crate::inject::{diagnostics, remote};
use crate::inject::remote::{ProcessHandle, RemoteBuffer};
use crate::transport::pipe::NamedPipeListener;
use crate::transport::{EndpointName, PayloadListener};
use crate::win32;

/// Per-message timeout for cross-process control queries.
pub const SEND_TIMEOUT_MS: u32 = 1000;

impl RemoteMemory for RemoteBuffer<'_> {
    fn address(&self) -> usize {
        RemoteBuffer::address(self)
    }

    fn write(&self, offset: usize, bytes: &[u8]) -> Result<(), LvtError> {
        RemoteBuffer::write(self, offset, bytes)
    }

    fn read(&self, offset: usize, out: &mut [u8]) -> Result<(), LvtError> {
        RemoteBuffer::read(self, offset, out)
    }
}

/// Common controls reached through `SendMessageTimeoutW`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeControls;

impl ControlHost for NativeControls {
    fn send(&self, hwnd: usize, msg: u32, wparam: usize, lparam: isize) -> isize {
        let mut result = 0usize;
        let sent = unsafe {
            SendMessageTimeoutW(
                win32::hwnd(hwnd),
                msg,
                WPARAM(wparam),
                LPARAM(lparam),
                SMTO_ABORTIFHUNG | SMTO_ERRORONEXIT,
                SEND_TIMEOUT_MS,
                Some(&mut result as *mut usize),
            )
        };
        if sent.0 == 0 {
            return 0;
        }
        result as isize
    }

    fn with_remote(&self, hwnd: usize, size: usize, visit: &mut dyn FnMut(&dyn RemoteMemory)) -> bool {
        let Some(pid) = win32::window_pid(win32::hwnd(hwnd)) else {
            return false;
        };
        // Records are laid out for this process's pointer width.
        match remote::is_foreign_bitness(pid) {
            Ok(false) => {}
            Ok(true) => {
                log::debug!("process {pid} has a different bitness, reading counts only");
                return false;
            }
            Err(err) => {
                log::debug!("{err}");
                return false;
            }
        }
        let process = match ProcessHandle::open_for_memory(pid) {
            Ok(process) => process,
            Err(err) => {
                log::debug!("{err}");
                return false;
            }
        };
        match RemoteBuffer::alloc(&process, size) {
            Ok(buffer) => {
                visit(&buffer);
                true
            }
            Err(err) => {
                log::debug!("{err}");
                false
            }
        }
    }
}

/// The production acquisition backend.
#[derive(Debug, Default)]
pub struct NativeAcquirer {
    artifact_dir: Option<PathBuf>,
    controls: NativeControls,
    inspector: NativeInspector,
}

impl NativeAcquirer {
    /// Instrumentation artifacts next to the running executable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Instrumentation artifacts in `dir` (used by plugins, which ship their
    /// artifacts beside themselves).
    pub fn with_artifact_dir(dir: PathBuf) -> Self {
        Self {
            artifact_dir: Some(dir),
            ..Self::default()
        }
    }
}

impl Acquirer for NativeAcquirer {
    fn controls(&self) -> &dyn ControlHost {
        &self.controls
    }

    fn window_pid(&self, hwnd: usize) -> Option<u32> {
        win32::window_pid(win32::hwnd(hwnd))
    }

    fn module_path(&self, pid: u32, module: &str) -> Option<String> {
        detect::module_path(&self.inspector, pid, module)
    }

    fn artifact_dir(&self) -> Result<PathBuf, LvtError> {
        match &self.artifact_dir {
            Some(dir) => Ok(dir.clone()),
            None => win32::exe_dir(),
        }
    }

    fn is_foreign_bitness(&self, pid: u32) -> Result<bool, LvtError> {
        remote::is_foreign_bitness(pid)
    }

    fn open_listener(&self, kind: &str) -> Result<Box<dyn PayloadListener>, LvtError> {
        Ok(Box::new(NamedPipeListener::create(EndpointName::fresh(kind))?))
    }

    fn load_module(&self, pid: u32, module: &Path, wait: Duration) -> Result<(), LvtError> {
        remote::inject_library(pid, module, wait)
    }

    fn attach_diagnostics(&self, pid: u32, init_module: &Path, tap: &Path, init_data: &str) -> Result<String, LvtError> {
        diagnostics::attach_tap(pid, init_module, tap, init_data)
    }
}
