//! Runtime hosting inside the target process.
//!
//! Two strategies, tried in order:
//!
//! 1. .NET Framework: find a CLR already loaded in this process through
//!    `ICLRMetaHost` and run the entry point with
//!    `ExecuteInDefaultAppDomain`.
//! 2. .NET (Core): initialize a `hostfxr` context from the assembly's
//!    runtime configuration (joining the running runtime), obtain the entry
//!    point through `load_assembly_and_get_function_pointer` and call it.

use std::ffi::{c_void, CString};
use std::path::{Path, PathBuf};

use windows::core::{s, w, Interface, GUID, HRESULT, PCSTR, PCWSTR, PWSTR};
use windows::Win32::Foundation::HMODULE;
use windows::Win32::System::ClrHosting::{
    ICLRMetaHost, ICLRRuntimeHost, ICLRRuntimeInfo, CLSID_CLRMetaHost, CLSID_CLRRuntimeHost,
};
use windows::Win32::System::Com::IEnumUnknown;
use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress, LoadLibraryW};
use windows::Win32::System::Threading::GetCurrentProcess;

use super::{ensure_runtime_config, latest_fxr, ManagedTarget};
use crate::errors::LvtError;
use crate::win32;

type ClrCreateInstance =
    unsafe extern "system" fn(clsid: *const GUID, iid: *const GUID, out: *mut *mut c_void) -> HRESULT;

type HostfxrInitialize =
    unsafe extern "C" fn(config_path: PCWSTR, parameters: *const c_void, context: *mut *mut c_void) -> i32;
type HostfxrGetDelegate =
    unsafe extern "C" fn(context: *mut c_void, delegate_type: i32, delegate: *mut *mut c_void) -> i32;
type HostfxrClose = unsafe extern "C" fn(context: *mut c_void) -> i32;

type LoadAssemblyAndGetFunctionPointer = unsafe extern "system" fn(
    assembly_path: PCWSTR,
    type_name: PCWSTR,
    method_name: PCWSTR,
    delegate_type_name: PCWSTR,
    reserved: *const c_void,
    delegate: *mut *mut c_void,
) -> i32;

/// `int CollectTree(string pipeName, int byteLength)`.
type CollectTree = unsafe extern "system" fn(pipe: PCWSTR, byte_len: i32) -> i32;

/// `hdt_load_assembly_and_get_function_pointer`.
const HDT_LOAD_ASSEMBLY_AND_GET_FUNCTION_POINTER: i32 = 5;

// ---------------------------------------------------------------------------
// .NET Framework
// ---------------------------------------------------------------------------

fn loaded_runtime(meta: &ICLRMetaHost) -> Result<ICLRRuntimeInfo, LvtError> {
    let runtimes: IEnumUnknown = unsafe { meta.EnumerateLoadedRuntimes(GetCurrentProcess()) }?;
    loop {
        let mut slot = [None];
        let mut fetched = 0u32;
        let hr = unsafe { runtimes.Next(&mut slot, Some(&mut fetched)) };
        if hr.is_err() || fetched == 0 {
            return Err(LvtError::CapabilityMismatch("no CLR loaded in process".into()));
        }
        if let Some(info) = slot[0].take().and_then(|unk| unk.cast::<ICLRRuntimeInfo>().ok()) {
            return Ok(info);
        }
    }
}

fn run_framework_host(target: &ManagedTarget, assembly: &Path, endpoint: &str) -> Result<(), LvtError> {
    let mscoree = unsafe { LoadLibraryW(w!("mscoree.dll")) }
        .map_err(|e| LvtError::CapabilityMismatch(format!("mscoree.dll: {e}")))?;
    let create = unsafe { GetProcAddress(mscoree, s!("CLRCreateInstance")) }
        .ok_or_else(|| LvtError::CapabilityMismatch("CLRCreateInstance not exported".into()))?;
    let create: ClrCreateInstance = unsafe { std::mem::transmute(create) };

    let mut raw = std::ptr::null_mut();
    unsafe { create(&CLSID_CLRMetaHost, &ICLRMetaHost::IID, &mut raw) }.ok()?;
    let meta = unsafe { ICLRMetaHost::from_raw(raw) };

    let info = loaded_runtime(&meta)?;
    let mut version = [0u16; 64];
    let mut len = version.len() as u32;
    if unsafe { info.GetVersionString(PWSTR(version.as_mut_ptr()), &mut len) }.is_ok() {
        log::info!("found CLR {}", win32::from_wide(&version));
    }

    let host: ICLRRuntimeHost = unsafe { info.GetInterface(&CLSID_CLRRuntimeHost) }?;
    let assembly_w = win32::wide_path(assembly);
    let type_w = win32::wide(target.type_name);
    let method_w = win32::wide(target.method);
    let endpoint_w = win32::wide(endpoint);
    let ret = unsafe {
        host.ExecuteInDefaultAppDomain(
            win32::pcwstr(&assembly_w),
            win32::pcwstr(&type_w),
            win32::pcwstr(&method_w),
            win32::pcwstr(&endpoint_w),
        )
    }?;
    log::info!("ExecuteInDefaultAppDomain returned {ret}");
    Ok(())
}

// ---------------------------------------------------------------------------
// hostfxr
// ---------------------------------------------------------------------------

fn fxr_root() -> Option<PathBuf> {
    let program_files = std::env::var_os("ProgramFiles")?;
    Some(PathBuf::from(program_files).join("dotnet").join("host").join("fxr"))
}

fn find_hostfxr() -> Result<HMODULE, LvtError> {
    if let Ok(module) = unsafe { GetModuleHandleW(w!("hostfxr.dll")) } {
        return Ok(module);
    }
    let path = fxr_root()
        .and_then(|root| latest_fxr(&root))
        .ok_or_else(|| LvtError::CapabilityMismatch("hostfxr.dll not found".into()))?;
    log::info!("loading {}", path.display());
    let wide = win32::wide_path(&path);
    unsafe { LoadLibraryW(win32::pcwstr(&wide)) }
        .map_err(|e| LvtError::CapabilityMismatch(format!("{}: {e}", path.display())))
}

fn export<T>(module: HMODULE, name: &str) -> Result<T, LvtError> {
    let symbol = CString::new(name).map_err(|e| LvtError::CapabilityMismatch(e.to_string()))?;
    let address = unsafe { GetProcAddress(module, PCSTR(symbol.as_ptr() as *const u8)) }
        .ok_or_else(|| LvtError::CapabilityMismatch(format!("hostfxr export {name} missing")))?;
    Ok(unsafe { std::mem::transmute_copy(&address) })
}

/// Host context closed on drop.
struct HostContext {
    handle: *mut c_void,
    close: HostfxrClose,
}

impl Drop for HostContext {
    fn drop(&mut self) {
        unsafe { (self.close)(self.handle) };
    }
}

fn run_hostfxr(target: &ManagedTarget, assembly: &Path, endpoint: &str) -> Result<(), LvtError> {
    let hostfxr = find_hostfxr()?;
    let initialize: HostfxrInitialize = export(hostfxr, "hostfxr_initialize_for_runtime_config")?;
    let get_delegate: HostfxrGetDelegate = export(hostfxr, "hostfxr_get_runtime_delegate")?;
    let close: HostfxrClose = export(hostfxr, "hostfxr_close")?;

    let config = ensure_runtime_config(assembly)?;
    let config_w = win32::wide_path(&config);
    let mut handle = std::ptr::null_mut();
    let rc = unsafe { initialize(win32::pcwstr(&config_w), std::ptr::null(), &mut handle) };
    log::info!("hostfxr_initialize_for_runtime_config returned 0x{:08X}", rc as u32);
    if handle.is_null() {
        return Err(LvtError::Com(format!("hostfxr init failed: 0x{:08X}", rc as u32)));
    }
    let context = HostContext { handle, close };
    // 0 = initialized, 1 = joined an already running runtime.
    if rc < 0 {
        return Err(LvtError::Com(format!("hostfxr init failed: 0x{:08X}", rc as u32)));
    }

    let mut loader = std::ptr::null_mut();
    let rc = unsafe { get_delegate(context.handle, HDT_LOAD_ASSEMBLY_AND_GET_FUNCTION_POINTER, &mut loader) };
    if rc < 0 || loader.is_null() {
        return Err(LvtError::Com(format!("hostfxr_get_runtime_delegate: 0x{:08X}", rc as u32)));
    }
    let loader: LoadAssemblyAndGetFunctionPointer = unsafe { std::mem::transmute(loader) };

    let assembly_w = win32::wide_path(assembly);
    let type_w = win32::wide(&target.qualified_type());
    let method_w = win32::wide(target.method);
    let delegate_w = win32::wide(&target.qualified_delegate());
    let mut entry = std::ptr::null_mut();
    let rc = unsafe {
        loader(
            win32::pcwstr(&assembly_w),
            win32::pcwstr(&type_w),
            win32::pcwstr(&method_w),
            win32::pcwstr(&delegate_w),
            std::ptr::null(),
            &mut entry,
        )
    };
    if rc < 0 || entry.is_null() {
        return Err(LvtError::Com(format!(
            "load_assembly_and_get_function_pointer({}): 0x{:08X}",
            target.qualified_type(),
            rc as u32
        )));
    }
    let collect: CollectTree = unsafe { std::mem::transmute(entry) };

    let endpoint_w = win32::wide(endpoint);
    let byte_len = ((endpoint_w.len() - 1) * std::mem::size_of::<u16>()) as i32;
    let ret = unsafe { collect(win32::pcwstr(&endpoint_w), byte_len) };
    log::info!("{}.{} returned {ret}", target.type_name, target.method);
    drop(context);
    if ret != 0 {
        return Err(LvtError::Payload(format!("managed walker returned {ret}")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run the managed walker for `target` with `endpoint`, trying the
/// .NET Framework host first when the walker supports it.
pub fn run_managed_walker(target: &ManagedTarget, assembly: &Path, endpoint: &str) -> Result<(), LvtError> {
    if !assembly.is_file() {
        return Err(LvtError::CapabilityMismatch(format!(
            "managed assembly not found: {}",
            assembly.display()
        )));
    }
    if target.legacy_host {
        match run_framework_host(target, assembly, endpoint) {
            Ok(()) => return Ok(()),
            Err(err) => log::info!(".NET Framework hosting unavailable: {err}"),
        }
    }
    run_hostfxr(target, assembly, endpoint)
}
