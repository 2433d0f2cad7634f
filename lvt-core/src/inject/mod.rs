//! Injection strategies.
//!
//! * Code loading: write a module path into the target and start a remote
//!   thread at the target's own `LoadLibraryW` ([`remote`]).
//! * Diagnostics attachment: call `InitializeXamlDiagnosticsEx` in this
//!   process and let the framework load the tap into the target
//!   ([`diagnostics`]).
//!
//! Both hand the instrumentation exactly one piece of data: the transport
//! endpoint name (directly as initialization data, or through a sidecar
//! file).

#[cfg(windows)]
pub mod diagnostics;
#[cfg(windows)]
pub mod remote;

use std::path::PathBuf;

use crate::errors::LvtError;

/// Class identifier of the XAML diagnostics tap, as a string for
/// `InitializeXamlDiagnosticsEx` consumers and logs.
pub const TAP_CLSID_STR: &str = "{B8F3E2D1-9A4C-4F5E-B6D7-8C1A3E5F7D9B}";
pub const TAP_CLSID: u128 = 0xB8F3E2D1_9A4C_4F5E_B6D7_8C1A3E5F7D9B;

/// Endpoint name families, probed in this order.
pub const DIAGNOSTIC_ENDPOINT_FAMILIES: [&str; 2] = ["VisualDiagConnection", "WinUIVisualDiagConnection"];
pub const MAX_ENDPOINT_INDEX: u32 = 100;

/// `HRESULT_FROM_WIN32(ERROR_NOT_FOUND)`: the probed endpoint does not exist.
pub const E_ENDPOINT_NOT_FOUND: i32 = 0x8007_0490_u32 as i32;

/// File name of the XAML diagnostics tap next to the executable.
pub const XAML_TAP_MODULE: &str = "lvt_tap.dll";

/// Appended to the endpoint in the tap's initialization data to request
/// per-element property collection.
pub const PROPS_FLAG: &str = "PROPS";

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// Processor architecture of a process image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    X86,
    X64,
    Arm64,
}

impl Architecture {
    /// Architecture this binary was compiled for.
    pub fn host() -> Self {
        if cfg!(target_arch = "aarch64") {
            Architecture::Arm64
        } else if cfg!(target_pointer_width = "32") {
            Architecture::X86
        } else {
            Architecture::X64
        }
    }

    /// Suffix used in per-architecture artifact names.
    pub fn suffix(self) -> &'static str {
        match self {
            Architecture::X86 => "x86",
            Architecture::X64 => "x64",
            Architecture::Arm64 => "arm64",
        }
    }
}

/// What a provider wants injected, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionPlan {
    /// `LoadLibraryW` remote thread. The endpoint name is written to
    /// `sidecar` before the thread starts.
    CodeLoading {
        pid: u32,
        module: PathBuf,
        sidecar: PathBuf,
    },
    /// Framework diagnostics attachment.
    Diagnostics {
        pid: u32,
        tap: PathBuf,
        /// Module exporting `InitializeXamlDiagnosticsEx`.
        init_module: PathBuf,
        collect_properties: bool,
    },
}

impl InjectionPlan {
    pub fn pid(&self) -> u32 {
        match self {
            InjectionPlan::CodeLoading { pid, .. } | InjectionPlan::Diagnostics { pid, .. } => *pid,
        }
    }
}

/// Initialization data received by the XAML tap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapInit {
    pub endpoint: String,
    pub collect_properties: bool,
}

impl TapInit {
    /// `"<pipe>"` or `"<pipe>|PROPS"`.
    pub fn parse(data: &str) -> Self {
        match data.split_once('|') {
            Some((endpoint, flags)) => Self {
                endpoint: endpoint.to_string(),
                collect_properties: flags.split('|').any(|f| f == PROPS_FLAG),
            },
            None => Self {
                endpoint: data.to_string(),
                collect_properties: false,
            },
        }
    }

    pub fn encode(&self) -> String {
        if self.collect_properties {
            format!("{}|{PROPS_FLAG}", self.endpoint)
        } else {
            self.endpoint.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Candidate endpoint names in probe order.
pub fn diagnostic_endpoints() -> impl Iterator<Item = String> {
    DIAGNOSTIC_ENDPOINT_FAMILIES
        .iter()
        .flat_map(|family| (1..=MAX_ENDPOINT_INDEX).map(move |i| format!("{family}{i}")))
}

/// Try each candidate endpoint with `attempt` (which returns an HRESULT)
/// and stop at the first that is not "not found".
///
/// Returns the endpoint that accepted the attachment.
pub fn probe_diagnostic_endpoints<F>(mut attempt: F) -> Result<String, LvtError>
where
    F: FnMut(&str) -> i32,
{
    for endpoint in diagnostic_endpoints() {
        let hr = attempt(&endpoint);
        if hr == E_ENDPOINT_NOT_FOUND {
            continue;
        }
        if hr < 0 {
            return Err(LvtError::Injection(format!(
                "InitializeXamlDiagnosticsEx({endpoint}) failed: 0x{:08X}",
                hr as u32
            )));
        }
        log::debug!("attached through diagnostics endpoint {endpoint}");
        return Ok(endpoint);
    }
    Err(LvtError::TargetUnreachable(
        "no XAML diagnostics endpoint found in target".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_order_and_bound() {
        let all: Vec<_> = diagnostic_endpoints().collect();
        assert_eq!(all.len(), 200);
        assert_eq!(all[0], "VisualDiagConnection1");
        assert_eq!(all[99], "VisualDiagConnection100");
        assert_eq!(all[100], "WinUIVisualDiagConnection1");
    }

    #[test]
    fn test_probe_stops_at_first_found() {
        let mut tried = Vec::new();
        let endpoint = probe_diagnostic_endpoints(|name| {
            tried.push(name.to_string());
            if name == "WinUIVisualDiagConnection2" {
                0
            } else {
                E_ENDPOINT_NOT_FOUND
            }
        })
        .unwrap();
        assert_eq!(endpoint, "WinUIVisualDiagConnection2");
        assert_eq!(tried.len(), 102);
    }

    #[test]
    fn test_probe_stops_at_other_failure() {
        let mut calls = 0;
        let err = probe_diagnostic_endpoints(|_| {
            calls += 1;
            if calls == 3 {
                0x8000_4005_u32 as i32
            } else {
                E_ENDPOINT_NOT_FOUND
            }
        })
        .unwrap_err();
        assert_eq!(calls, 3);
        assert!(matches!(err, LvtError::Injection(_)));
        assert!(err.to_string().contains("0x80004005"));
    }

    #[test]
    fn test_probe_exhaustion_is_unreachable() {
        let err = probe_diagnostic_endpoints(|_| E_ENDPOINT_NOT_FOUND).unwrap_err();
        assert!(matches!(err, LvtError::TargetUnreachable(_)));
    }

    #[test]
    fn test_tap_init_data() {
        let init = TapInit::parse(r"\\.\pipe\lvt_xaml_ab|PROPS");
        assert_eq!(init.endpoint, r"\\.\pipe\lvt_xaml_ab");
        assert!(init.collect_properties);
        assert_eq!(TapInit::parse(&init.encode()), init);
        assert!(!TapInit::parse(r"\\.\pipe\x").collect_properties);
    }

    #[test]
    fn test_clsid_string_matches_value() {
        let hex: String = TAP_CLSID_STR.chars().filter(char::is_ascii_hexdigit).collect();
        assert_eq!(u128::from_str_radix(&hex, 16).unwrap(), TAP_CLSID);
    }
}
