//! Framework identifiers and detection results.

use std::fmt;

use serde::Serialize;

/// Built-in framework vocabulary, declared in canonical dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    /// Native window tree; always present.
    Win32,
    /// Common controls (list views, tree views, toolbars, ...).
    ComCtl,
    /// WinUI 3 / Windows App SDK.
    WinUI3,
    /// System XAML (UWP CoreWindow hosting).
    Xaml,
    /// WPF, hosted in the .NET runtime.
    Wpf,
}

impl Framework {
    pub const fn as_str(self) -> &'static str {
        match self {
            Framework::Win32 => "win32",
            Framework::ComCtl => "comctl",
            Framework::Xaml => "xaml",
            Framework::WinUI3 => "winui3",
            Framework::Wpf => "wpf",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index of a plugin inside its owning [`PluginRegistry`](crate::plugin::PluginRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginId(pub usize);

/// Which provider a detection belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameworkId {
    Builtin(Framework),
    /// Reported by a plugin; `plugin` routes enrichment back to it.
    Plugin { name: String, plugin: PluginId },
}

/// A detected framework plus an optional version string.
///
/// An empty `version` means "unknown"; class-name fallback detections always
/// carry an empty version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkInfo {
    pub id: FrameworkId,
    pub version: String,
}

impl FrameworkInfo {
    pub fn builtin(framework: Framework, version: impl Into<String>) -> Self {
        Self {
            id: FrameworkId::Builtin(framework),
            version: version.into(),
        }
    }

    pub fn plugin(name: impl Into<String>, plugin: PluginId, version: impl Into<String>) -> Self {
        Self {
            id: FrameworkId::Plugin {
                name: name.into(),
                plugin,
            },
            version: version.into(),
        }
    }

    /// The framework tag used in element `framework` fields.
    pub fn name(&self) -> &str {
        match &self.id {
            FrameworkId::Builtin(fw) => fw.as_str(),
            FrameworkId::Plugin { name, .. } => name,
        }
    }

    pub fn builtin_kind(&self) -> Option<Framework> {
        match self.id {
            FrameworkId::Builtin(fw) => Some(fw),
            FrameworkId::Plugin { .. } => None,
        }
    }

    /// `name` or `name version`.
    pub fn display(&self) -> String {
        if self.version.is_empty() {
            self.name().to_string()
        } else {
            format!("{} {}", self.name(), self.version)
        }
    }
}

impl fmt::Display for FrameworkInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}
