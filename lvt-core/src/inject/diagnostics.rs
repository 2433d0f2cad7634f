//! XAML diagnostics attachment through `InitializeXamlDiagnosticsEx`.

use std::path::Path;

use windows::core::{GUID, HRESULT, PCWSTR};
use windows::Win32::Foundation::{FreeLibrary, HMODULE};
use windows::Win32::System::LibraryLoader::{
    GetProcAddress, LoadLibraryExW, LoadLibraryW, LOAD_LIBRARY_SEARCH_DEFAULT_DIRS,
    LOAD_LIBRARY_SEARCH_SYSTEM32,
};

use super::{probe_diagnostic_endpoints, TAP_CLSID};
use crate::errors::LvtError;
use crate::win32;

type InitializeXamlDiagnosticsEx = unsafe extern "system" fn(
    endpoint: PCWSTR,
    pid: u32,
    xaml_diagnostics_dll: PCWSTR,
    tap_dll: PCWSTR,
    tap_clsid: GUID,
    initialization_data: PCWSTR,
) -> HRESULT;

/// Module loaded into this process for the duration of the attachment.
struct Library(HMODULE);

impl Library {
    fn load(path: &Path) -> Result<Self, LvtError> {
        let wide = win32::wide_path(path);
        let module = unsafe {
            LoadLibraryExW(
                win32::pcwstr(&wide),
                None,
                LOAD_LIBRARY_SEARCH_SYSTEM32 | LOAD_LIBRARY_SEARCH_DEFAULT_DIRS,
            )
        }
        .or_else(|_| unsafe { LoadLibraryW(win32::pcwstr(&wide)) })
        .map_err(|e| LvtError::CapabilityMismatch(format!("cannot load {}: {e}", path.display())))?;
        Ok(Self(module))
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        let _ = unsafe { FreeLibrary(self.0) };
    }
}

/// Ask the framework's diagnostics subsystem to load `tap` into `pid`.
///
/// `init_module` is the module exporting `InitializeXamlDiagnosticsEx`
/// (a bare file name resolves through the system directories).
/// `init_data` reaches the tap through `IXamlDiagnostics::GetInitializationData`.
pub fn attach_tap(pid: u32, init_module: &Path, tap: &Path, init_data: &str) -> Result<String, LvtError> {
    let library = Library::load(init_module)?;
    let init = unsafe { GetProcAddress(library.0, windows::core::s!("InitializeXamlDiagnosticsEx")) }
        .ok_or_else(|| {
            LvtError::CapabilityMismatch(format!(
                "InitializeXamlDiagnosticsEx not exported by {}",
                init_module.display()
            ))
        })?;
    let init: InitializeXamlDiagnosticsEx = unsafe { std::mem::transmute(init) };

    let tap_wide = win32::wide_path(tap);
    let data_wide = win32::wide(init_data);
    let no_diagnostics_dll = win32::wide("");
    let clsid = GUID::from_u128(TAP_CLSID);

    probe_diagnostic_endpoints(|endpoint| {
        let endpoint_wide = win32::wide(endpoint);
        let hr = unsafe {
            init(
                win32::pcwstr(&endpoint_wide),
                pid,
                win32::pcwstr(&no_diagnostics_dll),
                win32::pcwstr(&tap_wide),
                clsid,
                win32::pcwstr(&data_wide),
            )
        };
        hr.0
    })
}
