//! `lvt_managed_tap` -- native module that runs a managed tree walker.
//!
//! The same binary is deployed once per walker. After it is loaded into the
//! target, its own file name decides which walker to run; the endpoint comes
//! from the sidecar file written next to it for this process id. The module
//! unloads itself once the walker returns.

use std::path::{Path, PathBuf};

use lvt_core::bridge::{read_sidecar, ManagedTarget};
use lvt_core::LvtError;

#[cfg(windows)]
mod entry;

/// Everything the worker needs, derived from the module path and pid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkerPlan {
    pub target: ManagedTarget,
    pub sidecar: PathBuf,
    pub assembly: PathBuf,
}

impl WalkerPlan {
    pub fn for_module(module: &Path, pid: u32) -> Result<Self, LvtError> {
        let stem = module
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = ManagedTarget::from_module_stem(&stem).ok_or_else(|| {
            LvtError::CapabilityMismatch(format!("no managed walker for module '{stem}'"))
        })?;
        let dir = module.parent().unwrap_or_else(|| Path::new("."));
        Ok(Self {
            target,
            sidecar: dir.join(target.sidecar_name(pid)),
            assembly: dir.join(target.assembly_file),
        })
    }

    pub fn log_file(&self) -> String {
        format!("lvt_{}_tap.log", self.target.label)
    }

    /// Endpoint name left by the inspector.
    pub fn endpoint(&self) -> Result<String, LvtError> {
        read_sidecar(&self.sidecar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_from_module_name() {
        let dir = tempfile::tempdir().unwrap();
        let plan = WalkerPlan::for_module(&dir.path().join("LVT_WPF_TAP_x64.dll"), 4242).unwrap();
        assert_eq!(plan.target, ManagedTarget::WPF);
        assert_eq!(plan.sidecar, dir.path().join("lvt_wpf_pipe_4242.txt"));
        assert_eq!(plan.assembly, dir.path().join("LvtWpfTap.dll"));
        assert_eq!(plan.log_file(), "lvt_wpf_tap.log");

        let plan = WalkerPlan::for_module(&dir.path().join("lvt_avalonia_tap_arm64.dll"), 1).unwrap();
        assert_eq!(plan.target, ManagedTarget::AVALONIA);
    }

    #[test]
    fn test_unknown_module_is_capability_error() {
        let err = WalkerPlan::for_module(Path::new("C:/x/other.dll"), 1).unwrap_err();
        assert!(err.is_capability());
    }

    #[test]
    fn test_endpoint_from_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let plan = WalkerPlan::for_module(&dir.path().join("lvt_wpf_tap_x64.dll"), 77).unwrap();
        assert!(plan.endpoint().is_err());
        std::fs::write(&plan.sidecar, "\\\\.\\pipe\\lvt_wpf_abc\r\n").unwrap();
        assert_eq!(plan.endpoint().unwrap(), "\\\\.\\pipe\\lvt_wpf_abc");
    }
}
