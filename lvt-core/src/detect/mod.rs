//! Framework detection.
//!
//! Two independent signals feed the result: modules loaded in the target
//! process (authoritative, yields a version) and native class names of the
//! target window and its descendants (fallback, no version). Module
//! enumeration routinely fails for cross-bitness or elevated targets, so the
//! class-name scan always runs.
//!
//! All OS access goes through [`ProcessInspector`]; the native implementation
//! lives in [`native`] on Windows.

#[cfg(windows)]
pub mod native;

use crate::errors::LvtError;
use crate::framework::{Framework, FrameworkInfo};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A module loaded in the target process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry {
    /// Base name, e.g. `Windows.UI.Xaml.dll`.
    pub name: String,
    /// Full path as seen by the target.
    pub path: String,
}

/// The fixed-size part of a module's version resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionInfo {
    pub file: [u16; 4],
    pub product: [u16; 4],
}

impl VersionInfo {
    /// `a.b.c.d` from the product version.
    pub fn product_string(&self) -> String {
        let [a, b, c, d] = self.product;
        format!("{a}.{b}.{c}.{d}")
    }

    /// `major.minor` from the file version.
    pub fn file_major_minor(&self) -> String {
        format!("{}.{}", self.file[0], self.file[1])
    }

    /// Split the packed `MS`/`LS` dwords of a fixed file info block.
    pub fn from_dwords(file_ms: u32, file_ls: u32, product_ms: u32, product_ls: u32) -> Self {
        let split = |ms: u32, ls: u32| {
            [
                (ms >> 16) as u16,
                (ms & 0xFFFF) as u16,
                (ls >> 16) as u16,
                (ls & 0xFFFF) as u16,
            ]
        };
        Self {
            file: split(file_ms, file_ls),
            product: split(product_ms, product_ls),
        }
    }
}

/// OS seam for detection.
pub trait ProcessInspector {
    /// Modules loaded in `pid`. Fails when the process cannot be opened or
    /// enumerated.
    fn loaded_modules(&self, pid: u32) -> Result<Vec<ModuleEntry>, LvtError>;

    /// Version resource of a module file, if it has one.
    fn version_info(&self, path: &str) -> Option<VersionInfo>;

    /// Class name of a single window.
    fn class_name(&self, hwnd: usize) -> String;

    /// Class names of every descendant window of `hwnd`.
    fn descendant_classes(&self, hwnd: usize) -> Vec<String>;
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

/// Common-control window classes (matched case-insensitively).
pub const COMCTL_CLASSES: [&str; 15] = [
    "SysListView32",
    "SysTreeView32",
    "SysTabControl32",
    "msctls_statusbar32",
    "ToolbarWindow32",
    "msctls_trackbar32",
    "SysHeader32",
    "msctls_progress32",
    "SysAnimate32",
    "SysDateTimePick32",
    "SysMonthCal32",
    "ReBarWindow32",
    "tooltips_class32",
    "SysPager",
    "SysLink",
];

pub const COMCTL_MODULE: &str = "comctl32.dll";
pub const WINUI3_MODULE: &str = "Microsoft.UI.Xaml.dll";
pub const XAML_MODULE: &str = "Windows.UI.Xaml.dll";
/// Checked in order; the first hit wins.
pub const WPF_MODULES: [&str; 3] = [
    "PresentationFramework.dll",
    "wpfgfx_cor3.dll",
    "wpfgfx_v0400.dll",
];

pub const CORE_WINDOW_CLASS: &str = "Windows.UI.Core.CoreWindow";
pub const WPF_CLASS_MARKER: &str = "HwndWrapper[";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ClassSignals {
    comctl: bool,
    winui3: bool,
    xaml: bool,
    wpf: bool,
}

impl ClassSignals {
    fn observe(&mut self, class: &str) {
        if COMCTL_CLASSES.iter().any(|c| c.eq_ignore_ascii_case(class)) {
            self.comctl = true;
        }
        if class.contains("Microsoft.UI.")
            || class.eq_ignore_ascii_case("WinUIDesktopWin32WindowClass")
            || class.eq_ignore_ascii_case("InputNonClientPointerSource")
        {
            self.winui3 = true;
        }
        if class.eq_ignore_ascii_case(CORE_WINDOW_CLASS) {
            self.xaml = true;
        }
        if class.contains(WPF_CLASS_MARKER) {
            self.wpf = true;
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn find_module<'a>(modules: &'a [ModuleEntry], name: &str) -> Option<&'a ModuleEntry> {
    modules.iter().find(|m| m.name.eq_ignore_ascii_case(name))
}

fn module_version(inspector: &dyn ProcessInspector, module: &ModuleEntry) -> String {
    inspector
        .version_info(&module.path)
        .map(|v| v.product_string())
        .unwrap_or_default()
}

fn enumerate(inspector: &dyn ProcessInspector, pid: Option<u32>) -> Vec<ModuleEntry> {
    let Some(pid) = pid.filter(|&p| p != 0) else {
        return Vec::new();
    };
    match inspector.loaded_modules(pid) {
        Ok(modules) => modules,
        Err(err) => {
            log::debug!("module enumeration for pid {pid} failed, using class names only: {err}");
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Full path of `module` as loaded in `pid`, if it is loaded.
pub fn module_path(inspector: &dyn ProcessInspector, pid: u32, module: &str) -> Option<String> {
    let modules = inspector.loaded_modules(pid).ok()?;
    find_module(&modules, module).map(|m| m.path.clone())
}

/// Detect the built-in frameworks present in a target.
///
/// The result always starts with `win32` and follows the fixed order
/// win32, comctl, winui3, xaml, wpf. Never fails: an unreachable process
/// degrades to class-name signals only.
pub fn detect_frameworks(
    inspector: &dyn ProcessInspector,
    hwnd: Option<usize>,
    pid: Option<u32>,
) -> Vec<FrameworkInfo> {
    let mut signals = ClassSignals::default();
    if let Some(hwnd) = hwnd.filter(|&h| h != 0) {
        // Top-level WPF windows are HwndWrappers themselves.
        if inspector.class_name(hwnd).contains(WPF_CLASS_MARKER) {
            signals.wpf = true;
        }
        for class in inspector.descendant_classes(hwnd) {
            signals.observe(&class);
        }
    }

    let modules = enumerate(inspector, pid);
    let mut result = vec![FrameworkInfo::builtin(Framework::Win32, "")];

    if signals.comctl {
        let version = find_module(&modules, COMCTL_MODULE)
            .and_then(|m| inspector.version_info(&m.path))
            .map(|v| v.file_major_minor())
            .unwrap_or_default();
        result.push(FrameworkInfo::builtin(Framework::ComCtl, version));
    }

    let single = |name: &str, class_hit: bool, fw: Framework| -> Option<FrameworkInfo> {
        match find_module(&modules, name) {
            Some(module) => Some(FrameworkInfo::builtin(fw, module_version(inspector, module))),
            None if class_hit => Some(FrameworkInfo::builtin(fw, "")),
            None => None,
        }
    };
    result.extend(single(WINUI3_MODULE, signals.winui3, Framework::WinUI3));
    result.extend(single(XAML_MODULE, signals.xaml, Framework::Xaml));

    let wpf_module = WPF_MODULES
        .iter()
        .find_map(|name| find_module(&modules, name));
    match wpf_module {
        Some(module) => result.push(FrameworkInfo::builtin(
            Framework::Wpf,
            module_version(inspector, module),
        )),
        None if signals.wpf => result.push(FrameworkInfo::builtin(Framework::Wpf, "")),
        None => {}
    }

    log::debug!(
        "detected: {}",
        result
            .iter()
            .map(FrameworkInfo::display)
            .collect::<Vec<_>>()
            .join(", ")
    );
    result
}
