use std::ffi::{c_char, c_void, CStr, CString};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::LvtError;
use crate::framework::{FrameworkInfo, PluginId};

use super::abi::{
    DetectFrameworkFn, EnrichTreeFn, LvtFrameworkDetection, LvtPluginInfo, PluginFreeFn,
    PluginInfoFn, EXPORT_DETECT, EXPORT_ENRICH, EXPORT_FREE, EXPORT_INFO, LVT_PLUGIN_API_VERSION,
};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A loaded dynamic module. Dropping it unloads the module.
pub trait PluginModule: Send {
    fn path(&self) -> &Path;

    /// Address of an exported symbol; `name` includes the trailing NUL.
    fn symbol(&self, name: &CStr) -> Option<*const c_void>;
}

/// A plugin that passed validation. Function pointers stay valid for as
/// long as `module` is alive.
pub struct LoadedPlugin {
    pub name: String,
    pub description: String,
    detect: DetectFrameworkFn,
    enrich: EnrichTreeFn,
    free: PluginFreeFn,
    // Declared last so the pointers above never outlive the module.
    module: Box<dyn PluginModule>,
}

impl fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("path", &self.module.path())
            .finish()
    }
}

/// Payload owned by a plugin, released through the plugin's own `free`.
struct PluginBuffer {
    ptr: *mut c_char,
    free: PluginFreeFn,
}

impl PluginBuffer {
    fn bytes(&self) -> &[u8] {
        unsafe { CStr::from_ptr(self.ptr) }.to_bytes()
    }
}

impl Drop for PluginBuffer {
    fn drop(&mut self) {
        unsafe { (self.free)(self.ptr as *mut c_void) };
    }
}

/// Explicit set of accepted plugins.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: Vec<LoadedPlugin>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn export_name(bytes: &'static [u8]) -> &'static CStr {
    // Export names are NUL-terminated literals with no interior NUL.
    CStr::from_bytes_with_nul(bytes).unwrap_or(c"")
}

fn c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let text = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
    Some(text)
}

fn resolve(module: &dyn PluginModule, name: &'static [u8]) -> Result<*const c_void, LvtError> {
    let export = export_name(name);
    module.symbol(export).filter(|p| !p.is_null()).ok_or_else(|| {
        LvtError::Plugin(format!(
            "{} has no {} export",
            module.path().display(),
            export.to_string_lossy()
        ))
    })
}

/// `~/.lvt/plugins`, if a home directory is known.
pub fn default_plugin_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".lvt").join("plugins"))
}

fn is_module_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("dll"))
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl LoadedPlugin {
    /// Validate a freshly loaded module. On error the module is dropped,
    /// which unloads it, before any entry point other than `info` runs.
    pub fn admit(module: Box<dyn PluginModule>) -> Result<Self, LvtError> {
        let path = module.path().display().to_string();
        let info_fn: PluginInfoFn = unsafe { std::mem::transmute(resolve(module.as_ref(), EXPORT_INFO)?) };

        let info = unsafe { info_fn() };
        if info.is_null() {
            return Err(LvtError::Plugin(format!("{path}: plugin info is null")));
        }
        let info: LvtPluginInfo = unsafe { *info };
        if (info.struct_size as usize) < std::mem::size_of::<LvtPluginInfo>() {
            return Err(LvtError::CapabilityMismatch(format!(
                "{path}: plugin info struct_size {} is too small",
                info.struct_size
            )));
        }
        if info.api_version != LVT_PLUGIN_API_VERSION {
            return Err(LvtError::CapabilityMismatch(format!(
                "{path}: plugin API version {} (expected {LVT_PLUGIN_API_VERSION})",
                info.api_version
            )));
        }

        let detect: DetectFrameworkFn =
            unsafe { std::mem::transmute(resolve(module.as_ref(), EXPORT_DETECT)?) };
        let enrich: EnrichTreeFn =
            unsafe { std::mem::transmute(resolve(module.as_ref(), EXPORT_ENRICH)?) };
        let free: PluginFreeFn =
            unsafe { std::mem::transmute(resolve(module.as_ref(), EXPORT_FREE)?) };

        let name = c_string(info.name)
            .filter(|n| !n.is_empty())
            .or_else(|| {
                module
                    .path()
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "plugin".to_string());

        Ok(Self {
            name,
            description: c_string(info.description).unwrap_or_default(),
            detect,
            enrich,
            free,
            module,
        })
    }

    pub fn path(&self) -> &Path {
        self.module.path()
    }

    /// Ask the plugin whether its framework is present.
    ///
    /// Returns `(name, version)`; the name defaults to the plugin name and
    /// the version to empty.
    pub fn detect(&self, pid: u32, hwnd: usize) -> Option<(String, String)> {
        let mut out = LvtFrameworkDetection::empty();
        let rc = unsafe { (self.detect)(pid, hwnd as *mut c_void, &mut out) };
        if rc == 0 {
            return None;
        }
        let name = c_string(out.name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.name.clone());
        Some((name, c_string(out.version).unwrap_or_default()))
    }

    /// Run the plugin's enrichment and take ownership of its payload.
    pub fn enrich(&self, hwnd: usize, pid: u32, filter: Option<&str>) -> Result<Vec<u8>, LvtError> {
        let filter = filter
            .map(CString::new)
            .transpose()
            .map_err(|e| LvtError::Plugin(format!("invalid filter: {e}")))?;
        let filter_ptr = filter.as_ref().map_or(std::ptr::null(), |f| f.as_ptr());

        let mut out: *mut c_char = std::ptr::null_mut();
        let rc = unsafe { (self.enrich)(hwnd as *mut c_void, pid, filter_ptr, &mut out) };
        let buffer = (!out.is_null()).then(|| PluginBuffer {
            ptr: out,
            free: self.free,
        });

        if rc == 0 {
            return Err(LvtError::Plugin(format!("{}: enrich reported failure", self.name)));
        }
        match buffer {
            Some(buffer) => Ok(buffer.bytes().to_vec()),
            None => Err(LvtError::Payload(format!("{}: enrich returned no payload", self.name))),
        }
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `dir` for `*.dll` modules in name order, loading each through
    /// `load` and keeping those that pass validation. A missing directory
    /// yields an empty registry.
    pub fn load_with<F>(dir: &Path, mut load: F) -> Self
    where
        F: FnMut(&Path) -> Result<Box<dyn PluginModule>, LvtError>,
    {
        let mut registry = Self::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                log::debug!("plugin directory {} unavailable: {err}", dir.display());
                return registry;
            }
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| is_module_file(p))
            .collect();
        paths.sort();

        for path in paths {
            let module = match load(&path) {
                Ok(module) => module,
                Err(err) => {
                    log::debug!("failed to load plugin {}: {err}", path.display());
                    continue;
                }
            };
            if let Err(err) = registry.admit(module) {
                log::debug!("rejected plugin {}: {err}", path.display());
            }
        }
        registry
    }

    /// Validate and retain one module.
    pub fn admit(&mut self, module: Box<dyn PluginModule>) -> Result<PluginId, LvtError> {
        let plugin = LoadedPlugin::admit(module)?;
        log::debug!("loaded plugin '{}' ({})", plugin.name, plugin.description);
        self.plugins.push(plugin);
        Ok(PluginId(self.plugins.len() - 1))
    }

    pub fn get(&self, id: PluginId) -> Option<&LoadedPlugin> {
        self.plugins.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PluginId, &LoadedPlugin)> {
        self.plugins
            .iter()
            .enumerate()
            .map(|(i, p)| (PluginId(i), p))
    }

    /// Call every plugin's `detect` once.
    pub fn detect_all(&self, pid: u32, hwnd: usize) -> Vec<FrameworkInfo> {
        self.iter()
            .filter_map(|(id, plugin)| {
                let (name, version) = plugin.detect(pid, hwnd)?;
                log::debug!("plugin '{}' detected '{name}' {version}", plugin.name);
                Some(FrameworkInfo::plugin(name, id, version))
            })
            .collect()
    }

    pub fn enrich(&self, id: PluginId, hwnd: usize, pid: u32, filter: Option<&str>) -> Result<Vec<u8>, LvtError> {
        let plugin = self
            .get(id)
            .ok_or_else(|| LvtError::Plugin(format!("no plugin with id {}", id.0)))?;
        plugin.enrich(hwnd, pid, filter)
    }

    /// Release every plugin at once. Previously issued ids become invalid.
    pub fn unload_all(&mut self) {
        if !self.plugins.is_empty() {
            log::debug!("unloading {} plugin(s)", self.plugins.len());
        }
        self.plugins.clear();
    }
}
