//! `LoadLibraryW`-backed [`PluginModule`].

use std::ffi::{c_void, CStr};
use std::path::{Path, PathBuf};

use windows::core::PCSTR;
use windows::Win32::Foundation::{FreeLibrary, HMODULE};
use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};

use super::{default_plugin_dir, PluginModule, PluginRegistry};
use crate::errors::LvtError;
use crate::win32;

pub struct LibraryModule {
    path: PathBuf,
    module: HMODULE,
}

// HMODULE values are process-wide.
unsafe impl Send for LibraryModule {}

impl LibraryModule {
    pub fn load(path: &Path) -> Result<Self, LvtError> {
        let wide = win32::wide_path(path);
        let module = unsafe { LoadLibraryW(win32::pcwstr(&wide)) }
            .map_err(|e| LvtError::Plugin(format!("LoadLibraryW({}): {e}", path.display())))?;
        Ok(Self {
            path: path.to_path_buf(),
            module,
        })
    }
}

impl PluginModule for LibraryModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn symbol(&self, name: &CStr) -> Option<*const c_void> {
        let address = unsafe { GetProcAddress(self.module, PCSTR(name.as_ptr() as *const u8)) }?;
        Some(address as *const c_void)
    }
}

impl Drop for LibraryModule {
    fn drop(&mut self) {
        let _ = unsafe { FreeLibrary(self.module) };
    }
}

impl PluginRegistry {
    /// Load every plugin in `dir` with `LoadLibraryW`.
    pub fn load(dir: &Path) -> Self {
        Self::load_with(dir, |path| {
            LibraryModule::load(path).map(|m| Box::new(m) as Box<dyn PluginModule>)
        })
    }

    /// Load from `~/.lvt/plugins`.
    pub fn load_default() -> Self {
        match default_plugin_dir() {
            Some(dir) => Self::load(&dir),
            None => Self::new(),
        }
    }
}
