//! [`ProcessInspector`] backed by PSAPI, the version API and window
//! enumeration.

use std::ffi::c_void;

use windows::Win32::Foundation::{BOOL, HMODULE, HWND, LPARAM, TRUE};
use windows::Win32::Storage::FileSystem::{
    GetFileVersionInfoSizeW, GetFileVersionInfoW, VerQueryValueW, VS_FIXEDFILEINFO,
};
use windows::Win32::System::ProcessStatus::{
    EnumProcessModulesEx, GetModuleBaseNameW, GetModuleFileNameExW, LIST_MODULES_ALL,
};
use windows::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ};
use windows::Win32::UI::WindowsAndMessaging::EnumChildWindows;

use super::{ModuleEntry, ProcessInspector, VersionInfo};
use crate::errors::LvtError;
use crate::win32::{self, from_wide, OwnedHandle};

const MAX_MODULES: usize = 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct NativeInspector;

unsafe extern "system" fn collect_class(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let classes = unsafe { &mut *(lparam.0 as *mut Vec<String>) };
    classes.push(win32::class_name(hwnd));
    TRUE
}

impl ProcessInspector for NativeInspector {
    fn loaded_modules(&self, pid: u32) -> Result<Vec<ModuleEntry>, LvtError> {
        let process = unsafe { OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, false, pid) }
            .map_err(|e| LvtError::TargetUnreachable(format!("OpenProcess({pid}): {e}")))?;
        let process = OwnedHandle(process);

        let mut modules = vec![HMODULE::default(); MAX_MODULES];
        let mut needed = 0u32;
        unsafe {
            EnumProcessModulesEx(
                process.raw(),
                modules.as_mut_ptr(),
                (modules.len() * std::mem::size_of::<HMODULE>()) as u32,
                &mut needed,
                LIST_MODULES_ALL,
            )
        }
        .map_err(|e| LvtError::TargetUnreachable(format!("EnumProcessModulesEx({pid}): {e}")))?;

        let count = (needed as usize / std::mem::size_of::<HMODULE>()).min(MAX_MODULES);
        let mut entries = Vec::with_capacity(count);
        for &module in &modules[..count] {
            let mut name = [0u16; 260];
            let len = unsafe { GetModuleBaseNameW(process.raw(), module, &mut name) } as usize;
            if len == 0 {
                continue;
            }
            let mut path = [0u16; 1024];
            let path_len = unsafe { GetModuleFileNameExW(process.raw(), module, &mut path) } as usize;
            entries.push(ModuleEntry {
                name: from_wide(&name[..len]),
                path: from_wide(&path[..path_len]),
            });
        }
        Ok(entries)
    }

    fn version_info(&self, path: &str) -> Option<VersionInfo> {
        if path.is_empty() {
            return None;
        }
        let wide_path = win32::wide(path);
        let size = unsafe { GetFileVersionInfoSizeW(win32::pcwstr(&wide_path), None) };
        if size == 0 {
            return None;
        }
        let mut block = vec![0u8; size as usize];
        unsafe {
            GetFileVersionInfoW(
                win32::pcwstr(&wide_path),
                0,
                size,
                block.as_mut_ptr() as *mut c_void,
            )
        }
        .ok()?;

        let root = win32::wide("\\");
        let mut info: *mut c_void = std::ptr::null_mut();
        let mut len = 0u32;
        let found = unsafe {
            VerQueryValueW(
                block.as_ptr() as *const c_void,
                win32::pcwstr(&root),
                &mut info,
                &mut len,
            )
        };
        if !found.as_bool() || info.is_null() || (len as usize) < std::mem::size_of::<VS_FIXEDFILEINFO>() {
            return None;
        }
        let fixed = unsafe { &*(info as *const VS_FIXEDFILEINFO) };
        Some(VersionInfo::from_dwords(
            fixed.dwFileVersionMS,
            fixed.dwFileVersionLS,
            fixed.dwProductVersionMS,
            fixed.dwProductVersionLS,
        ))
    }

    fn class_name(&self, hwnd: usize) -> String {
        win32::class_name(win32::hwnd(hwnd))
    }

    fn descendant_classes(&self, hwnd: usize) -> Vec<String> {
        let mut classes: Vec<String> = Vec::new();
        unsafe {
            let _ = EnumChildWindows(
                win32::hwnd(hwnd),
                Some(collect_class),
                LPARAM(&mut classes as *mut Vec<String> as isize),
            );
        }
        classes
    }
}
