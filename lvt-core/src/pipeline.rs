//! Acquisition pipeline.
//!
//! `acquire` runs detection, builds the base tree, then drives each
//! detected framework's provider to completion before starting the next.
//! A failing framework is recorded in its [`FrameworkReport`] and never
//! affects the others. Element identifiers are assigned once, over the
//! complete tree, before any depth trimming.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::detect::{detect_frameworks, ProcessInspector};
use crate::element::{assign_element_ids, trim_to_depth, Element};
use crate::errors::LvtError;
use crate::framework::{FrameworkId, FrameworkInfo, PluginId};
use crate::plugin::PluginRegistry;
use crate::providers::{Acquirer, Dispatcher, Provider};
use crate::transport::TransportTimeouts;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// Per-framework acquisition state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Detecting,
    Dispatching,
    Enriching,
    Injecting,
    AwaitingTransport,
    Grafting,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Detecting => "detecting",
            Stage::Dispatching => "dispatching",
            Stage::Enriching => "enriching",
            Stage::Injecting => "injecting",
            Stage::AwaitingTransport => "awaiting transport",
            Stage::Grafting => "grafting",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Outcome of one framework's enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkReport {
    pub framework: String,
    /// Last stage reached; `Done` on success.
    pub stage: Stage,
    pub error: Option<String>,
}

impl FrameworkReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for FrameworkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(f, "{}: done", self.framework),
            Some(err) => write!(f, "{}: failed while {}: {err}", self.framework, self.stage),
        }
    }
}

/// Result of one acquisition.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub root: Element,
    pub frameworks: Vec<FrameworkInfo>,
    pub reports: Vec<FrameworkReport>,
}

impl Snapshot {
    /// `name` or `name version` per framework, in detection order.
    pub fn framework_names(&self) -> Vec<String> {
        self.frameworks.iter().map(FrameworkInfo::display).collect()
    }
}

/// Acquisition settings.
#[derive(Debug, Clone)]
pub struct AcquireOptions {
    /// Trim the returned tree below this depth (`None` keeps everything).
    pub max_depth: Option<usize>,
    pub timeouts: TransportTimeouts,
    /// Bound on the remote module-load thread.
    pub injection_wait: Duration,
    /// Overrides the default plugin directory.
    pub plugin_dir: Option<PathBuf>,
    /// Ask the XAML tap for per-element properties.
    pub collect_properties: bool,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            max_depth: None,
            timeouts: TransportTimeouts::default(),
            injection_wait: Duration::from_secs(5),
            plugin_dir: None,
            collect_properties: false,
        }
    }
}

/// The window or process being inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub hwnd: usize,
    pub pid: u32,
}

/// Producer of the base tree.
pub trait TreeSource {
    fn build(&self, hwnd: usize) -> Result<Element, LvtError>;
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Wires the detector, base provider, acquisition backend and plugins
/// together for one or more acquisitions.
pub struct Pipeline<'a> {
    inspector: &'a dyn ProcessInspector,
    source: &'a dyn TreeSource,
    acquirer: &'a dyn Acquirer,
    plugins: &'a PluginRegistry,
    options: AcquireOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        inspector: &'a dyn ProcessInspector,
        source: &'a dyn TreeSource,
        acquirer: &'a dyn Acquirer,
        plugins: &'a PluginRegistry,
    ) -> Self {
        Self {
            inspector,
            source,
            acquirer,
            plugins,
            options: AcquireOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AcquireOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &AcquireOptions {
        &self.options
    }

    /// Built-in detections followed by plugin detections.
    pub fn detect(&self, target: Target) -> Vec<FrameworkInfo> {
        let mut frameworks = detect_frameworks(self.inspector, Some(target.hwnd), Some(target.pid));
        frameworks.extend(self.plugins.detect_all(target.pid, target.hwnd));
        frameworks
    }

    /// Detect, build and enrich. Fails only when the base tree cannot be
    /// built.
    pub fn acquire(&self, target: Target) -> Result<Snapshot, LvtError> {
        log::info!("acquiring hwnd=0x{:X} pid={}", target.hwnd, target.pid);
        let frameworks = self.detect(target);
        let mut root = self.source.build(target.hwnd)?;
        log::debug!("base tree has {} elements", root.count());

        let dispatcher = Dispatcher {
            acquirer: self.acquirer,
            plugins: self.plugins,
            options: &self.options,
            hwnd: target.hwnd,
            pid: target.pid,
        };
        let mut excluded: HashSet<PluginId> = HashSet::new();
        let reports = frameworks
            .iter()
            .map(|info| run_provider(&dispatcher, info, &mut root, &mut excluded))
            .collect();

        assign_element_ids(&mut root);
        if let Some(depth) = self.options.max_depth {
            trim_to_depth(&mut root, depth);
        }
        Ok(Snapshot {
            root,
            frameworks,
            reports,
        })
    }
}

fn run_provider(
    dispatcher: &Dispatcher<'_>,
    info: &FrameworkInfo,
    root: &mut Element,
    excluded: &mut HashSet<PluginId>,
) -> FrameworkReport {
    let framework = info.name().to_string();
    let mut stage = Stage::Dispatching;
    let Some(provider) = Provider::for_framework(info) else {
        return FrameworkReport {
            framework,
            stage: Stage::Done,
            error: None,
        };
    };
    if let FrameworkId::Plugin { plugin, .. } = &info.id {
        if excluded.contains(plugin) {
            return FrameworkReport {
                framework,
                stage,
                error: Some("plugin excluded after an earlier contract violation".into()),
            };
        }
    }

    log::info!("enriching {framework}");
    match dispatcher.enrich(provider, root, &mut stage) {
        Ok(grafted) => {
            log::debug!("{framework}: {grafted} nodes added or relabelled");
            FrameworkReport {
                framework,
                stage: Stage::Done,
                error: None,
            }
        }
        Err(err) => {
            if err.is_capability() {
                log::debug!("{framework} skipped: {err}");
            } else {
                log::warn!("{framework} failed while {stage}: {err}");
            }
            if let (LvtError::Plugin(_), Provider::Plugin(id)) = (&err, provider) {
                excluded.insert(id);
            }
            FrameworkReport {
                framework,
                stage,
                error: Some(err.to_string()),
            }
        }
    }
}
