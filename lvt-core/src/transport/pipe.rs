//! Overlapped named-pipe endpoint.

use std::ffi::c_void;
use std::time::Duration;

use windows::Win32::Foundation::{
    LocalFree, ERROR_BROKEN_PIPE, ERROR_IO_PENDING, ERROR_PIPE_CONNECTED, HLOCAL, WAIT_OBJECT_0,
};
use windows::Win32::Security::Authorization::{
    ConvertStringSecurityDescriptorToSecurityDescriptorW, SDDL_REVISION_1,
};
use windows::Win32::Security::{PSECURITY_DESCRIPTOR, SECURITY_ATTRIBUTES};
use windows::Win32::Storage::FileSystem::{ReadFile, FILE_FLAG_OVERLAPPED, PIPE_ACCESS_INBOUND};
use windows::Win32::System::Pipes::{
    ConnectNamedPipe, CreateNamedPipeW, PIPE_READMODE_BYTE, PIPE_TYPE_BYTE, PIPE_WAIT,
};
use windows::Win32::System::Threading::{CreateEventW, ResetEvent, WaitForSingleObject};
use windows::Win32::System::IO::{CancelIo, GetOverlappedResult, OVERLAPPED};

use super::{EndpointName, PayloadListener, ReadBurst};
use crate::errors::LvtError;
use crate::win32::{self, OwnedHandle};

/// Read/write for Everyone and for AppContainer processes.
const PIPE_SDDL: &str = "D:(A;;GRGW;;;WD)(A;;GRGW;;;AC)";
const IN_BUFFER: u32 = 1024 * 1024;
const DEFAULT_TIMEOUT_MS: u32 = 10_000;

fn millis(timeout: Duration) -> u32 {
    timeout.as_millis().min(u128::from(u32::MAX - 1)) as u32
}

fn is(err: &windows::core::Error, code: windows::Win32::Foundation::WIN32_ERROR) -> bool {
    err.code() == code.to_hresult()
}

/// Security descriptor built from [`PIPE_SDDL`], released on drop.
struct Descriptor(PSECURITY_DESCRIPTOR);

impl Descriptor {
    fn from_sddl(sddl: &str) -> Result<Self, LvtError> {
        let wide = win32::wide(sddl);
        let mut descriptor = PSECURITY_DESCRIPTOR::default();
        unsafe {
            ConvertStringSecurityDescriptorToSecurityDescriptorW(
                win32::pcwstr(&wide),
                SDDL_REVISION_1,
                &mut descriptor,
                None,
            )
        }
        .map_err(|e| LvtError::Transport(format!("invalid pipe security descriptor: {e}")))?;
        Ok(Self(descriptor))
    }
}

impl Drop for Descriptor {
    fn drop(&mut self) {
        if !self.0 .0.is_null() {
            unsafe {
                let _ = LocalFree(HLOCAL(self.0 .0));
            }
        }
    }
}

/// Single-instance inbound pipe opened for overlapped I/O.
pub struct NamedPipeListener {
    endpoint: EndpointName,
    pipe: OwnedHandle,
    event: OwnedHandle,
    // Boxed so the address stays fixed while an operation is pending.
    overlapped: Box<OVERLAPPED>,
    pending: bool,
    connected: bool,
}

impl NamedPipeListener {
    pub fn create(endpoint: EndpointName) -> Result<Self, LvtError> {
        let descriptor = Descriptor::from_sddl(PIPE_SDDL)?;
        let attributes = SECURITY_ATTRIBUTES {
            nLength: std::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
            lpSecurityDescriptor: descriptor.0 .0 as *mut c_void,
            bInheritHandle: false.into(),
        };
        let name = win32::wide(endpoint.as_str());
        let pipe = unsafe {
            CreateNamedPipeW(
                win32::pcwstr(&name),
                PIPE_ACCESS_INBOUND | FILE_FLAG_OVERLAPPED,
                PIPE_TYPE_BYTE | PIPE_READMODE_BYTE | PIPE_WAIT,
                1,
                0,
                IN_BUFFER,
                DEFAULT_TIMEOUT_MS,
                Some(&attributes as *const SECURITY_ATTRIBUTES),
            )
        };
        if pipe.is_invalid() {
            return Err(LvtError::Transport(format!(
                "CreateNamedPipeW({endpoint}) failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        let pipe = OwnedHandle(pipe);
        let event = unsafe { CreateEventW(None, true, false, None) }
            .map_err(|e| LvtError::Transport(format!("CreateEventW: {e}")))?;

        Ok(Self {
            endpoint,
            pipe,
            event: OwnedHandle(event),
            overlapped: Box::default(),
            pending: false,
            connected: false,
        })
    }

    fn arm(&mut self) {
        *self.overlapped = OVERLAPPED::default();
        self.overlapped.hEvent = self.event.raw();
        unsafe {
            let _ = ResetEvent(self.event.raw());
        }
    }

    /// Wait for the pending operation. `Ok(None)` on timeout, after the
    /// operation has been cancelled and drained.
    fn complete(&mut self, timeout: Duration) -> Result<Option<u32>, windows::core::Error> {
        let signalled = unsafe { WaitForSingleObject(self.event.raw(), millis(timeout)) } == WAIT_OBJECT_0;
        let mut transferred = 0u32;
        if !signalled {
            self.cancel();
            return Ok(None);
        }
        self.pending = false;
        unsafe { GetOverlappedResult(self.pipe.raw(), &*self.overlapped, &mut transferred, false) }?;
        Ok(Some(transferred))
    }

    fn cancel(&mut self) {
        if !self.pending {
            return;
        }
        let mut ignored = 0u32;
        unsafe {
            let _ = CancelIo(self.pipe.raw());
            let _ = GetOverlappedResult(self.pipe.raw(), &*self.overlapped, &mut ignored, true);
        }
        self.pending = false;
    }
}

impl PayloadListener for NamedPipeListener {
    fn endpoint(&self) -> &EndpointName {
        &self.endpoint
    }

    fn begin_accept(&mut self) -> Result<(), LvtError> {
        self.arm();
        match unsafe { ConnectNamedPipe(self.pipe.raw(), Some(&mut *self.overlapped as *mut OVERLAPPED)) } {
            Ok(()) => self.connected = true,
            Err(e) if is(&e, ERROR_IO_PENDING) => self.pending = true,
            Err(e) if is(&e, ERROR_PIPE_CONNECTED) => self.connected = true,
            Err(e) => {
                return Err(LvtError::Transport(format!(
                    "ConnectNamedPipe({}) failed: {e}",
                    self.endpoint
                )))
            }
        }
        Ok(())
    }

    fn wait_connected(&mut self, timeout: Duration) -> Result<(), LvtError> {
        if self.connected {
            return Ok(());
        }
        if !self.pending {
            return Err(LvtError::Transport("no pending accept".into()));
        }
        match self.complete(timeout) {
            Ok(Some(_)) => {
                self.connected = true;
                Ok(())
            }
            Ok(None) => Err(LvtError::Timeout(format!(
                "instrumentation did not connect to {} within {}s",
                self.endpoint,
                timeout.as_secs()
            ))),
            Err(e) if is(&e, ERROR_PIPE_CONNECTED) => {
                self.connected = true;
                Ok(())
            }
            Err(e) => Err(LvtError::Transport(format!("connect failed: {e}"))),
        }
    }

    fn read_burst(&mut self, buf: &mut [u8], timeout: Duration) -> Result<ReadBurst, LvtError> {
        self.arm();
        let started = unsafe { ReadFile(self.pipe.raw(), Some(buf), None, Some(&mut *self.overlapped as *mut OVERLAPPED)) };
        match started {
            Ok(()) => {}
            Err(e) if is(&e, ERROR_BROKEN_PIPE) => return Ok(ReadBurst::Closed),
            Err(e) if is(&e, ERROR_IO_PENDING) => {}
            Err(e) => return Err(LvtError::Transport(format!("ReadFile failed: {e}"))),
        }
        self.pending = true;
        match self.complete(timeout) {
            Ok(Some(0)) => Ok(ReadBurst::Closed),
            Ok(Some(n)) => Ok(ReadBurst::Data(n as usize)),
            Ok(None) => Ok(ReadBurst::TimedOut),
            Err(e) if is(&e, ERROR_BROKEN_PIPE) => Ok(ReadBurst::Closed),
            Err(e) => Err(LvtError::Transport(format!("read failed: {e}"))),
        }
    }
}

impl Drop for NamedPipeListener {
    fn drop(&mut self) {
        self.cancel();
    }
}
