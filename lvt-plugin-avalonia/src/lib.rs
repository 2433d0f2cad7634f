//! Avalonia plugin for lvt.
//!
//! Exports the four plugin entry points:
//! - `lvt_plugin_info`: static metadata
//! - `lvt_detect_framework`: looks for `Avalonia.Base.dll` (or `Avalonia.dll`)
//!   in the target and reports its product version
//! - `lvt_enrich_tree`: loads the managed tap with the Avalonia walker into
//!   the target and returns the payload it sends back
//! - `lvt_plugin_free`: releases strings returned by `lvt_enrich_tree`
//!
//! The tap, its managed assembly and the sidecar live in an `avalonia`
//! directory next to this module. Set `LVT_DEBUG` to log to
//! `<temp>/lvt_avalonia_plugin.log`.

use std::ffi::{c_char, c_void, CString};

use parking_lot::Mutex;

use lvt_core::detect::{module_path, ProcessInspector};
use lvt_core::plugin::abi::{LvtFrameworkDetection, LvtPluginInfo, LVT_PLUGIN_API_VERSION};

const NAME: &[u8] = b"avalonia\0";
const DESCRIPTION: &[u8] = b"Avalonia UI framework visual tree support\0";
/// Checked in order; older releases ship a single `Avalonia.dll`.
const MODULES: [&str; 2] = ["Avalonia.Base.dll", "Avalonia.dll"];
/// Subdirectory holding the tap artifacts.
const ARTIFACT_DIR: &str = "avalonia";
const DEBUG_ENV: &str = "LVT_DEBUG";

struct StaticInfo(LvtPluginInfo);

// Only points at static byte strings.
unsafe impl Sync for StaticInfo {}

static INFO: StaticInfo = StaticInfo(LvtPluginInfo {
    struct_size: std::mem::size_of::<LvtPluginInfo>() as u32,
    api_version: LVT_PLUGIN_API_VERSION,
    name: NAME.as_ptr() as *const c_char,
    description: DESCRIPTION.as_ptr() as *const c_char,
});

/// Version strings handed out by `detect`; they live as long as the module.
static VERSIONS: Mutex<Vec<CString>> = Mutex::new(Vec::new());

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Product version of the first Avalonia module loaded in `pid`, or `None`
/// when Avalonia is not present. An unreadable version resource yields an
/// empty string.
fn avalonia_version(inspector: &dyn ProcessInspector, pid: u32) -> Option<String> {
    let path = MODULES.iter().find_map(|m| module_path(inspector, pid, m))?;
    Some(
        inspector
            .version_info(&path)
            .map(|v| v.product_string())
            .unwrap_or_default(),
    )
}

fn intern(version: &str) -> *const c_char {
    let mut versions = VERSIONS.lock();
    if let Some(existing) = versions.iter().find(|v| v.to_bytes() == version.as_bytes()) {
        return existing.as_ptr();
    }
    let Ok(owned) = CString::new(version) else {
        return std::ptr::null();
    };
    let ptr = owned.as_ptr();
    versions.push(owned);
    ptr
}

/// Hand `payload` to the caller as a NUL-terminated string.
fn into_c_string(payload: Vec<u8>) -> Option<*mut c_char> {
    CString::new(payload).ok().map(CString::into_raw)
}

#[cfg(windows)]
fn enrich(hwnd: usize, pid: u32) -> Result<Vec<u8>, lvt_core::LvtError> {
    use lvt_core::bridge::ManagedTarget;
    use lvt_core::payload::encode_payload;
    use lvt_core::pipeline::Stage;
    use lvt_core::providers::native::NativeAcquirer;
    use lvt_core::providers::{collect, managed_plan};
    use lvt_core::win32::module_path_from_address;
    use lvt_core::{AcquireOptions, LvtError};

    let module = module_path_from_address(&INFO as *const StaticInfo as *const c_void)?;
    let dir = module
        .parent()
        .ok_or_else(|| LvtError::Plugin(format!("{} has no parent", module.display())))?
        .join(ARTIFACT_DIR);
    log::debug!("enriching 0x{hwnd:X} (pid {pid}) from {}", dir.display());

    let acquirer = NativeAcquirer::with_artifact_dir(dir);
    let plan = managed_plan(&acquirer, &ManagedTarget::AVALONIA, pid)?;
    let mut stage = Stage::Idle;
    let nodes = collect(&acquirer, "avl", &plan, &AcquireOptions::default(), &mut stage)
        .inspect_err(|err| log::debug!("failed while {stage}: {err}"))?;
    log::debug!("{} root(s) collected", nodes.len());
    encode_payload(&nodes)
}

#[cfg(not(windows))]
fn enrich(_hwnd: usize, pid: u32) -> Result<Vec<u8>, lvt_core::LvtError> {
    Err(lvt_core::LvtError::CapabilityMismatch(format!(
        "cannot reach process {pid} on this platform"
    )))
}

#[cfg(windows)]
fn live_version(pid: u32) -> Option<String> {
    avalonia_version(&lvt_core::detect::native::NativeInspector, pid)
}

#[cfg(not(windows))]
fn live_version(_pid: u32) -> Option<String> {
    None
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn lvt_plugin_info() -> *const LvtPluginInfo {
    if std::env::var_os(DEBUG_ENV).is_some() {
        let _ = lvt_core::logging::init_file_logger("lvt_avalonia_plugin.log", log::LevelFilter::Debug);
    }
    &INFO.0
}

/// # Safety
///
/// `out` must be null or point to a writable `LvtFrameworkDetection`.
#[no_mangle]
pub unsafe extern "C" fn lvt_detect_framework(pid: u32, _hwnd: *mut c_void, out: *mut LvtFrameworkDetection) -> i32 {
    if out.is_null() {
        return 0;
    }
    let Some(version) = live_version(pid) else {
        return 0;
    };
    log::debug!("Avalonia {version} in pid {pid}");
    let out = &mut *out;
    out.struct_size = std::mem::size_of::<LvtFrameworkDetection>() as u32;
    out.name = NAME.as_ptr() as *const c_char;
    out.version = if version.is_empty() {
        std::ptr::null()
    } else {
        intern(&version)
    };
    1
}

/// # Safety
///
/// `json_out` must be null or writable. A string stored there must be
/// released with [`lvt_plugin_free`].
#[no_mangle]
pub unsafe extern "C" fn lvt_enrich_tree(
    hwnd: *mut c_void,
    pid: u32,
    _element_class_filter: *const c_char,
    json_out: *mut *mut c_char,
) -> i32 {
    if json_out.is_null() {
        return 0;
    }
    *json_out = std::ptr::null_mut();
    let payload = match enrich(hwnd as usize, pid) {
        Ok(payload) => payload,
        Err(err) => {
            log::debug!("enrich failed: {err}");
            return 0;
        }
    };
    match into_c_string(payload) {
        Some(text) => {
            *json_out = text;
            1
        }
        None => 0,
    }
}

/// # Safety
///
/// `ptr` must be null or a string returned by [`lvt_enrich_tree`] that has
/// not been freed yet.
#[no_mangle]
pub unsafe extern "C" fn lvt_plugin_free(ptr: *mut c_void) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr as *mut c_char));
    }
}
