//! C-linkage contract shared by the host and every plugin module.
//!
//! A plugin exports four functions under fixed names. All strings are
//! NUL-terminated UTF-8. Memory returned through `enrich` belongs to the
//! plugin and must be released with the plugin's own `free`.

use std::ffi::{c_char, c_void};

/// Bumped on any incompatible change to the structs or signatures below.
pub const LVT_PLUGIN_API_VERSION: u32 = 1;

pub const EXPORT_INFO: &[u8] = b"lvt_plugin_info\0";
pub const EXPORT_DETECT: &[u8] = b"lvt_detect_framework\0";
pub const EXPORT_ENRICH: &[u8] = b"lvt_enrich_tree\0";
pub const EXPORT_FREE: &[u8] = b"lvt_plugin_free\0";

/// Static plugin metadata. `struct_size` must equal `size_of::<LvtPluginInfo>()`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LvtPluginInfo {
    pub struct_size: u32,
    pub api_version: u32,
    pub name: *const c_char,
    pub description: *const c_char,
}

/// Filled in by `detect` on success. The strings must stay valid for the
/// plugin's lifetime.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LvtFrameworkDetection {
    pub struct_size: u32,
    pub name: *const c_char,
    pub version: *const c_char,
}

impl LvtFrameworkDetection {
    pub fn empty() -> Self {
        Self {
            struct_size: std::mem::size_of::<Self>() as u32,
            name: std::ptr::null(),
            version: std::ptr::null(),
        }
    }
}

/// Returns a pointer to static metadata.
pub type PluginInfoFn = unsafe extern "C" fn() -> *const LvtPluginInfo;

/// Non-zero when the plugin's framework is present in the target.
pub type DetectFrameworkFn =
    unsafe extern "C" fn(pid: u32, hwnd: *mut c_void, out: *mut LvtFrameworkDetection) -> i32;

/// Non-zero on success; `*json_out` then owns a NUL-terminated payload.
pub type EnrichTreeFn = unsafe extern "C" fn(
    hwnd: *mut c_void,
    pid: u32,
    element_class_filter: *const c_char,
    json_out: *mut *mut c_char,
) -> i32;

pub type PluginFreeFn = unsafe extern "C" fn(ptr: *mut c_void);
