//! Managed-runtime bridge.
//!
//! The managed tap, once loaded into a target, hosts (or joins) the .NET
//! runtime and calls one static method of a companion assembly with the
//! transport endpoint name. The method performs the walk and writes the
//! payload itself.
//!
//! This module holds the portable parts: entry descriptors, sidecar naming,
//! runtime-configuration handling and `hostfxr` discovery. The hosting calls
//! live in [`host`].

#[cfg(windows)]
pub mod host;

use std::path::{Path, PathBuf};

use crate::errors::LvtError;
use crate::inject::Architecture;

/// Describes one managed walker and the native tap that hosts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagedTarget {
    /// Short label used in logs and endpoint names.
    pub label: &'static str,
    /// Prefix of the native tap file name (`<prefix>_<arch>.dll`).
    pub native_prefix: &'static str,
    /// Prefix of the sidecar file name (`<prefix>_pipe_<pid>.txt`).
    pub sidecar_prefix: &'static str,
    /// Managed assembly file, deployed next to the native tap.
    pub assembly_file: &'static str,
    /// Simple assembly name used in assembly-qualified type names.
    pub assembly_name: &'static str,
    pub type_name: &'static str,
    pub method: &'static str,
    /// Nested delegate type describing `int (string, int)`.
    pub delegate_type: &'static str,
    /// Whether the .NET Framework host (`ICLRMetaHost`) is tried first.
    pub legacy_host: bool,
}

impl ManagedTarget {
    pub const WPF: ManagedTarget = ManagedTarget {
        label: "wpf",
        native_prefix: "lvt_wpf_tap",
        sidecar_prefix: "lvt_wpf",
        assembly_file: "LvtWpfTap.dll",
        assembly_name: "LvtWpfTap",
        type_name: "LvtWpfTap.WpfTreeWalker",
        method: "CollectTree",
        delegate_type: "LvtWpfTap.WpfTreeWalker+CollectTreeDelegate",
        legacy_host: true,
    };

    pub const AVALONIA: ManagedTarget = ManagedTarget {
        label: "avalonia",
        native_prefix: "lvt_avalonia_tap",
        sidecar_prefix: "lvt_avalonia",
        assembly_file: "LvtAvaloniaTreeWalker.dll",
        assembly_name: "LvtAvaloniaTreeWalker",
        type_name: "LvtAvaloniaTreeWalker.AvaloniaTreeWalker",
        method: "CollectTree",
        delegate_type: "LvtAvaloniaTreeWalker.AvaloniaTreeWalker+CollectTreeDelegate",
        legacy_host: false,
    };

    const ALL: [ManagedTarget; 2] = [Self::WPF, Self::AVALONIA];

    /// `Namespace.Type, Assembly`.
    pub fn qualified_type(&self) -> String {
        format!("{}, {}", self.type_name, self.assembly_name)
    }

    pub fn qualified_delegate(&self) -> String {
        format!("{}, {}", self.delegate_type, self.assembly_name)
    }

    /// Native tap file name for `arch`.
    pub fn native_module_name(&self, arch: Architecture) -> String {
        format!("{}_{}.dll", self.native_prefix, arch.suffix())
    }

    pub fn sidecar_name(&self, pid: u32) -> String {
        format!("{}_pipe_{pid}.txt", self.sidecar_prefix)
    }

    /// Identify the walker from the native tap's own file stem.
    pub fn from_module_stem(stem: &str) -> Option<ManagedTarget> {
        let stem = stem.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| stem.starts_with(t.native_prefix))
    }
}

/// Framework reference written when the assembly ships without a
/// runtime configuration.
pub const DEFAULT_RUNTIME_CONFIG: &str = r#"{
  "runtimeOptions": {
    "framework": {
      "name": "Microsoft.WindowsDesktop.App",
      "version": "8.0.0"
    }
  }
}
"#;

/// `<dir>/<stem>.runtimeconfig.json` for `assembly`.
pub fn runtime_config_path(assembly: &Path) -> PathBuf {
    let stem = assembly
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    assembly.with_file_name(format!("{stem}.runtimeconfig.json"))
}

/// Return the runtime configuration for `assembly`, writing
/// [`DEFAULT_RUNTIME_CONFIG`] if none exists.
pub fn ensure_runtime_config(assembly: &Path) -> Result<PathBuf, LvtError> {
    let path = runtime_config_path(assembly);
    if !path.exists() {
        std::fs::write(&path, DEFAULT_RUNTIME_CONFIG)?;
        log::info!("created {}", path.display());
    }
    Ok(path)
}

/// Read the endpoint name from a sidecar file, trimming trailing
/// whitespace.
pub fn read_sidecar(path: &Path) -> Result<String, LvtError> {
    let text = std::fs::read_to_string(path)?;
    let name = text.trim_end_matches(['\r', '\n', ' ']).to_string();
    if name.is_empty() {
        return Err(LvtError::Transport(format!("{} is empty", path.display())));
    }
    Ok(name)
}

fn version_key(name: &str) -> Vec<u64> {
    name.split(['.', '-'])
        .map(|part| part.parse::<u64>().unwrap_or(0))
        .collect()
}

/// Newest `hostfxr.dll` under `<fxr_root>/<version>/`.
pub fn latest_fxr(fxr_root: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(fxr_root).ok()?;
    entries
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            let dll = e.path().join("hostfxr.dll");
            (!name.starts_with('.') && dll.is_file()).then(|| (version_key(&name), dll))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, dll)| dll)
}
