//! Framework providers.
//!
//! Built-in frameworks form a closed set dispatched by [`Framework`] tag;
//! plugin frameworks route back to their owning plugin through
//! [`PluginId`]. Both go through [`Dispatcher::enrich`], so the pipeline
//! drives every detected framework with one loop.
//!
//! Everything that touches another process sits behind [`Acquirer`]. The
//! orchestration here (which windows to relabel, what to inject where, how
//! to graft the result) is portable.

pub mod comctl;
#[cfg(windows)]
pub mod native;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bridge::ManagedTarget;
use crate::detect::{CORE_WINDOW_CLASS, WPF_CLASS_MARKER, XAML_MODULE};
use crate::element::Element;
use crate::errors::LvtError;
use crate::framework::{Framework, FrameworkId, FrameworkInfo, PluginId};
use crate::graft::{graft, GraftAnchor, GraftOptions};
use crate::inject::{Architecture, InjectionPlan, TapInit, XAML_TAP_MODULE};
use crate::payload::{parse_payload, PayloadNode};
use crate::pipeline::{AcquireOptions, Stage};
use crate::plugin::PluginRegistry;
use crate::transport::{collect_payload, EndpointName, PayloadListener, SidecarFile};

use self::comctl::ControlHost;

/// WinUI 3 island host window class.
pub const BRIDGE_CLASS: &str = "Microsoft.UI.Content.DesktopChildSiteBridge";
/// Payload roots of this type pair with bridge windows.
pub const XAML_SOURCE_MARKER: &str = "DesktopWindowXamlSource";
/// Windows App SDK module exporting `InitializeXamlDiagnosticsEx`.
pub const FRAMEWORK_UDK_MODULE: &str = "Microsoft.Internal.FrameworkUdk.dll";

const WINUI3_LABELS: [(&str, &str); 3] = [
    (BRIDGE_CLASS, "DesktopChildSiteBridge"),
    ("InputNonClientPointerSource", "InputNonClientPointerSource"),
    ("InputSiteWindowClass", "InputSite"),
];

// ---------------------------------------------------------------------------
// OS seam
// ---------------------------------------------------------------------------

/// Cross-process operations used by the built-in providers.
pub trait Acquirer {
    /// Message and remote-memory access for common controls.
    fn controls(&self) -> &dyn ControlHost;

    /// Process owning a window.
    fn window_pid(&self, hwnd: usize) -> Option<u32>;

    /// Full path of `module` as loaded in `pid`.
    fn module_path(&self, pid: u32, module: &str) -> Option<String>;

    /// Directory holding the instrumentation artifacts.
    fn artifact_dir(&self) -> Result<PathBuf, LvtError>;

    fn is_foreign_bitness(&self, pid: u32) -> Result<bool, LvtError>;

    /// A fresh, uniquely named endpoint. `kind` becomes part of its name.
    fn open_listener(&self, kind: &str) -> Result<Box<dyn PayloadListener>, LvtError>;

    /// Code-loading injection of `module` into `pid`, waiting at most `wait`.
    fn load_module(&self, pid: u32, module: &Path, wait: Duration) -> Result<(), LvtError>;

    /// Diagnostics attachment. Returns the endpoint that accepted.
    fn attach_diagnostics(&self, pid: u32, init_module: &Path, tap: &Path, init_data: &str) -> Result<String, LvtError>;
}

// ---------------------------------------------------------------------------
// Injection and transport
// ---------------------------------------------------------------------------

/// Carry out `plan`, handing `endpoint` to the instrumentation. The returned
/// sidecar guard, if any, must outlive the transport exchange.
pub fn run_injection(
    acquirer: &dyn Acquirer,
    plan: &InjectionPlan,
    endpoint: &EndpointName,
    wait: Duration,
) -> Result<Option<SidecarFile>, LvtError> {
    match plan {
        InjectionPlan::CodeLoading { pid, module, sidecar } => {
            let guard = SidecarFile::create(sidecar.clone(), endpoint)?;
            acquirer.load_module(*pid, module, wait)?;
            log::info!("{} loaded into {pid}", module.display());
            Ok(Some(guard))
        }
        InjectionPlan::Diagnostics {
            pid,
            tap,
            init_module,
            collect_properties,
        } => {
            let init = TapInit {
                endpoint: endpoint.to_string(),
                collect_properties: *collect_properties,
            };
            let used = acquirer.attach_diagnostics(*pid, init_module, tap, &init.encode())?;
            log::info!("tap attached to {pid} through {used}");
            Ok(None)
        }
    }
}

/// Open an endpoint, inject, wait for the payload and parse it.
///
/// `stage` tracks how far the exchange got.
pub fn collect(
    acquirer: &dyn Acquirer,
    kind: &str,
    plan: &InjectionPlan,
    options: &AcquireOptions,
    stage: &mut Stage,
) -> Result<Vec<PayloadNode>, LvtError> {
    *stage = Stage::Injecting;
    let mut listener = acquirer.open_listener(kind)?;
    let bytes = collect_payload(listener.as_mut(), options.timeouts, |endpoint| {
        let guard = run_injection(acquirer, plan, endpoint, options.injection_wait)?;
        *stage = Stage::AwaitingTransport;
        Ok(guard)
    })?;
    *stage = Stage::Grafting;
    parse_payload(&bytes)
}

fn require_artifact(path: PathBuf) -> Result<PathBuf, LvtError> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(LvtError::CapabilityMismatch(format!(
            "instrumentation artifact not found: {}",
            path.display()
        )))
    }
}

/// Plan a code-loading injection of the managed tap for `target`.
///
/// Fails with a capability mismatch when `pid` has a different bitness or
/// when the native tap or the managed assembly is missing.
pub fn managed_plan(acquirer: &dyn Acquirer, target: &ManagedTarget, pid: u32) -> Result<InjectionPlan, LvtError> {
    if acquirer.is_foreign_bitness(pid)? {
        return Err(LvtError::CapabilityMismatch(format!(
            "process {pid} has a different bitness; {} walker unavailable",
            target.label
        )));
    }
    let dir = acquirer.artifact_dir()?;
    let module = require_artifact(dir.join(target.native_module_name(Architecture::host())))?;
    require_artifact(dir.join(target.assembly_file))?;
    Ok(InjectionPlan::CodeLoading {
        pid,
        module,
        sidecar: dir.join(target.sidecar_name(pid)),
    })
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// One enrichment pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Builtin(Framework),
    Plugin(PluginId),
}

impl Provider {
    /// The provider for a detection; `None` for the base framework.
    pub fn for_framework(info: &FrameworkInfo) -> Option<Provider> {
        match &info.id {
            FrameworkId::Builtin(Framework::Win32) => None,
            FrameworkId::Builtin(framework) => Some(Provider::Builtin(*framework)),
            FrameworkId::Plugin { plugin, .. } => Some(Provider::Plugin(*plugin)),
        }
    }
}

/// Everything an enrichment pass may use.
pub struct Dispatcher<'a> {
    pub acquirer: &'a dyn Acquirer,
    pub plugins: &'a PluginRegistry,
    pub options: &'a AcquireOptions,
    pub hwnd: usize,
    pub pid: u32,
}

impl Dispatcher<'_> {
    /// Run one provider against the canonical tree. Returns the number of
    /// nodes added or relabelled at the top level of the pass.
    pub fn enrich(&self, provider: Provider, root: &mut Element, stage: &mut Stage) -> Result<usize, LvtError> {
        *stage = Stage::Enriching;
        match provider {
            Provider::Builtin(Framework::Win32) => Ok(0),
            Provider::Builtin(Framework::ComCtl) => Ok(comctl::enrich(root, self.acquirer.controls())),
            Provider::Builtin(Framework::Xaml) => self.xaml(root, stage),
            Provider::Builtin(Framework::WinUI3) => self.winui3(root, stage),
            Provider::Builtin(Framework::Wpf) => self.wpf(root, stage),
            Provider::Plugin(id) => self.plugin(id, root, stage),
        }
    }

    fn tap_path(&self) -> Result<PathBuf, LvtError> {
        require_artifact(self.acquirer.artifact_dir()?.join(XAML_TAP_MODULE))
    }

    fn xaml(&self, root: &mut Element, stage: &mut Stage) -> Result<usize, LvtError> {
        let mut core_window = None;
        root.walk_mut(&mut |el| {
            if el.class_name == CORE_WINDOW_CLASS {
                el.relabel("CoreWindow", Framework::Xaml.as_str());
                core_window.get_or_insert(el.native_handle);
            }
        });
        let Some(core_window) = core_window else {
            return Err(LvtError::CapabilityMismatch("no CoreWindow in tree".into()));
        };

        // A UWP CoreWindow may belong to a different process than the frame.
        let pid = core_window
            .and_then(|hwnd| self.acquirer.window_pid(hwnd))
            .unwrap_or(self.pid);
        let plan = InjectionPlan::Diagnostics {
            pid,
            tap: self.tap_path()?,
            init_module: PathBuf::from(XAML_MODULE),
            collect_properties: self.options.collect_properties,
        };
        let nodes = collect(self.acquirer, "xaml", &plan, self.options, stage)?;
        let anchor = core_window.map_or(GraftAnchor::Root, GraftAnchor::Handle);
        Ok(graft(root, &nodes, anchor, &GraftOptions::relative(Framework::Xaml.as_str())))
    }

    fn winui3(&self, root: &mut Element, stage: &mut Stage) -> Result<usize, LvtError> {
        root.walk_mut(&mut |el| {
            if let Some((_, label)) = WINUI3_LABELS.iter().find(|(class, _)| el.class_name == *class) {
                el.relabel(label, Framework::WinUI3.as_str());
            }
        });

        let init_module = self
            .acquirer
            .module_path(self.pid, FRAMEWORK_UDK_MODULE)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(XAML_MODULE));
        log::debug!("winui3 diagnostics entry point from {}", init_module.display());
        let plan = InjectionPlan::Diagnostics {
            pid: self.pid,
            tap: self.tap_path()?,
            init_module,
            collect_properties: self.options.collect_properties,
        };
        let nodes = collect(self.acquirer, "winui3", &plan, self.options, stage)?;
        let anchor = GraftAnchor::Bridges {
            class: BRIDGE_CLASS,
            marker: XAML_SOURCE_MARKER,
        };
        Ok(graft(root, &nodes, anchor, &GraftOptions::relative(Framework::WinUI3.as_str())))
    }

    fn wpf(&self, root: &mut Element, stage: &mut Stage) -> Result<usize, LvtError> {
        root.walk_mut(&mut |el| {
            if el.class_name.starts_with(WPF_CLASS_MARKER) {
                el.relabel("WpfWindow", Framework::Wpf.as_str());
            }
        });

        *stage = Stage::Injecting;
        let plan = managed_plan(self.acquirer, &ManagedTarget::WPF, self.pid)?;
        let nodes = collect(self.acquirer, "wpf", &plan, self.options, stage)?;
        Ok(graft(root, &nodes, GraftAnchor::Root, &GraftOptions::screen(Framework::Wpf.as_str())))
    }

    fn plugin(&self, id: PluginId, root: &mut Element, stage: &mut Stage) -> Result<usize, LvtError> {
        let name = self
            .plugins
            .get(id)
            .map(|p| p.name.clone())
            .ok_or_else(|| LvtError::Plugin(format!("no plugin with id {}", id.0)))?;
        let bytes = self.plugins.enrich(id, self.hwnd, self.pid, None)?;
        log::debug!("plugin '{name}' returned {} bytes", bytes.len());
        *stage = Stage::Grafting;
        let nodes = parse_payload(&bytes)?;
        Ok(graft(root, &nodes, GraftAnchor::Root, &GraftOptions::relative(&name)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::element::Bounds;
    use crate::providers::comctl::RemoteMemory;
    use crate::transport::tests::ScriptedListener;
    use std::cell::RefCell;
    use std::collections::HashMap;

    pub struct NoControls;

    impl ControlHost for NoControls {
        fn send(&self, _hwnd: usize, _msg: u32, _wparam: usize, _lparam: isize) -> isize {
            0
        }

        fn with_remote(&self, _hwnd: usize, _size: usize, _visit: &mut dyn FnMut(&dyn RemoteMemory)) -> bool {
            false
        }
    }

    /// Records injections and serves one scripted payload per listener.
    pub struct FakeAcquirer {
        pub dir: PathBuf,
        pub foreign: bool,
        pub connects: bool,
        pub payload: Vec<u8>,
        pub window_pids: HashMap<usize, u32>,
        pub modules: HashMap<String, String>,
        pub fail_load: bool,
        pub log: RefCell<Vec<String>>,
        pub sidecar_seen: RefCell<Option<String>>,
        controls: NoControls,
    }

    impl FakeAcquirer {
        pub fn new(dir: &Path, payload: &str) -> Self {
            Self {
                dir: dir.to_path_buf(),
                foreign: false,
                connects: true,
                payload: payload.as_bytes().to_vec(),
                window_pids: HashMap::new(),
                modules: HashMap::new(),
                fail_load: false,
                log: RefCell::new(Vec::new()),
                sidecar_seen: RefCell::new(None),
                controls: NoControls,
            }
        }

        /// Create every instrumentation artifact in `dir`.
        pub fn deploy_all(dir: &Path) {
            for name in [
                XAML_TAP_MODULE.to_string(),
                ManagedTarget::WPF.native_module_name(Architecture::host()),
                ManagedTarget::WPF.assembly_file.to_string(),
            ] {
                std::fs::write(dir.join(name), b"MZ").unwrap();
            }
        }
    }

    impl Acquirer for FakeAcquirer {
        fn controls(&self) -> &dyn ControlHost {
            &self.controls
        }

        fn window_pid(&self, hwnd: usize) -> Option<u32> {
            self.window_pids.get(&hwnd).copied()
        }

        fn module_path(&self, _pid: u32, module: &str) -> Option<String> {
            self.modules.get(module).cloned()
        }

        fn artifact_dir(&self) -> Result<PathBuf, LvtError> {
            Ok(self.dir.clone())
        }

        fn is_foreign_bitness(&self, _pid: u32) -> Result<bool, LvtError> {
            Ok(self.foreign)
        }

        fn open_listener(&self, kind: &str) -> Result<Box<dyn PayloadListener>, LvtError> {
            self.log.borrow_mut().push(format!("listen {kind}"));
            let mut listener = ScriptedListener::new(self.connects, &[self.payload.as_slice()]);
            if !self.connects {
                listener.bursts.clear();
            }
            Ok(Box::new(listener))
        }

        fn load_module(&self, pid: u32, module: &Path, _wait: Duration) -> Result<(), LvtError> {
            let sidecar = std::fs::read_dir(&self.dir)
                .unwrap()
                .filter_map(Result::ok)
                .find(|e| e.file_name().to_string_lossy().ends_with(".txt"))
                .map(|e| std::fs::read_to_string(e.path()).unwrap());
            *self.sidecar_seen.borrow_mut() = sidecar;
            let name = module.file_name().unwrap().to_string_lossy().into_owned();
            self.log.borrow_mut().push(format!("load {pid} {name}"));
            if self.fail_load {
                return Err(LvtError::Injection("exit code 0".into()));
            }
            Ok(())
        }

        fn attach_diagnostics(&self, pid: u32, init_module: &Path, _tap: &Path, init_data: &str) -> Result<String, LvtError> {
            self.log.borrow_mut().push(format!(
                "attach {pid} {} {}",
                init_module.display(),
                TapInit::parse(init_data).collect_properties
            ));
            Ok("VisualDiagConnection1".into())
        }
    }

    fn window(class: &str, hwnd: usize, bounds: Bounds) -> Element {
        Element::new("Window", "win32")
            .with_class(class)
            .with_handle(hwnd)
            .with_bounds(bounds)
            .with_property("hwnd", crate::element::format_handle(hwnd))
    }

    fn run(acq: &FakeAcquirer, provider: Provider, root: &mut Element) -> (Result<usize, LvtError>, Stage) {
        let plugins = PluginRegistry::new();
        let options = AcquireOptions::default();
        let dispatcher = Dispatcher {
            acquirer: acq,
            plugins: &plugins,
            options: &options,
            hwnd: 1,
            pid: 500,
        };
        let mut stage = Stage::Dispatching;
        let result = dispatcher.enrich(provider, root, &mut stage);
        (result, stage)
    }

    #[test]
    fn test_provider_for_framework() {
        assert_eq!(Provider::for_framework(&FrameworkInfo::builtin(Framework::Win32, "")), None);
        assert_eq!(
            Provider::for_framework(&FrameworkInfo::builtin(Framework::Wpf, "8.0")),
            Some(Provider::Builtin(Framework::Wpf))
        );
        assert_eq!(
            Provider::for_framework(&FrameworkInfo::plugin("avalonia", PluginId(2), "11.0")),
            Some(Provider::Plugin(PluginId(2)))
        );
    }

    #[test]
    fn test_xaml_injects_into_core_window_owner() {
        let dir = tempfile::tempdir().unwrap();
        FakeAcquirer::deploy_all(dir.path());
        let mut acq = FakeAcquirer::new(
            dir.path(),
            r#"[{"type":"Windows.UI.Xaml.Controls.Grid","width":100,"height":50,"offsetX":5,"offsetY":6}]"#,
        );
        acq.window_pids.insert(0x30, 777);

        let mut root = window("ApplicationFrameWindow", 0x10, Bounds::new(0, 0, 800, 600))
            .with_child(window(CORE_WINDOW_CLASS, 0x30, Bounds::new(10, 20, 780, 560)));
        let (result, stage) = run(&acq, Provider::Builtin(Framework::Xaml), &mut root);
        assert_eq!(result.unwrap(), 1);
        assert_eq!(stage, Stage::Grafting);

        let core = &root.children[0];
        assert_eq!(core.element_type, "CoreWindow");
        assert_eq!(core.framework, "xaml");
        let grid = &core.children[0];
        assert_eq!(grid.element_type, "Grid");
        assert_eq!(grid.bounds, Bounds::new(15, 26, 100, 50));
        assert_eq!(
            *acq.log.borrow(),
            ["listen xaml", "attach 777 Windows.UI.Xaml.dll false"]
        );
    }

    #[test]
    fn test_xaml_without_core_window_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        FakeAcquirer::deploy_all(dir.path());
        let acq = FakeAcquirer::new(dir.path(), "[]");
        let mut root = window("Notepad", 0x10, Bounds::default());
        let (result, _) = run(&acq, Provider::Builtin(Framework::Xaml), &mut root);
        assert!(result.unwrap_err().is_capability());
        assert!(acq.log.borrow().is_empty());
    }

    #[test]
    fn test_winui3_uses_framework_udk_and_bridges() {
        let dir = tempfile::tempdir().unwrap();
        FakeAcquirer::deploy_all(dir.path());
        let mut acq = FakeAcquirer::new(
            dir.path(),
            r#"[{"type":"Microsoft.UI.Xaml.Hosting.DesktopWindowXamlSource","width":10,"height":10,"children":[]},
                {"type":"Microsoft.UI.Xaml.Controls.Primitives.Popup","width":5,"height":5}]"#,
        );
        acq.modules.insert(FRAMEWORK_UDK_MODULE.into(), r"C:\app\Microsoft.Internal.FrameworkUdk.dll".into());

        let mut root = window("WinUIDesktopWin32WindowClass", 0x10, Bounds::new(0, 0, 800, 600))
            .with_child(window(BRIDGE_CLASS, 0x11, Bounds::new(100, 200, 600, 400)))
            .with_child(window("InputSiteWindowClass", 0x12, Bounds::default()));
        let (result, _) = run(&acq, Provider::Builtin(Framework::WinUI3), &mut root);
        assert_eq!(result.unwrap(), 2);

        let bridge = &root.children[0];
        assert_eq!(bridge.element_type, "DesktopChildSiteBridge");
        assert_eq!(bridge.children[0].element_type, "DesktopWindowXamlSource");
        assert_eq!(bridge.children[0].bounds, Bounds::new(100, 200, 10, 10));
        assert_eq!(root.children[1].element_type, "InputSite");
        assert_eq!(root.children[2].element_type, "Popup");
        assert!(acq.log.borrow()[1].starts_with(r"attach 500 C:\app\Microsoft.Internal.FrameworkUdk.dll"));
    }

    #[test]
    fn test_missing_tap_is_capability_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let acq = FakeAcquirer::new(dir.path(), "[]");
        let mut root = window("WinUIDesktopWin32WindowClass", 0x10, Bounds::default());
        let (result, _) = run(&acq, Provider::Builtin(Framework::WinUI3), &mut root);
        let err = result.unwrap_err();
        assert!(err.is_capability());
        assert!(err.to_string().contains(XAML_TAP_MODULE));
    }

    #[test]
    fn test_wpf_writes_sidecar_and_grafts_in_screen_space() {
        let dir = tempfile::tempdir().unwrap();
        FakeAcquirer::deploy_all(dir.path());
        let acq = FakeAcquirer::new(
            dir.path(),
            r#"[{"type":"System.Windows.Window","name":"Main","width":400,"height":300,"offsetX":50,"offsetY":60,"visible":false}]"#,
        );
        let mut root = window("HwndWrapper[App;;abc]", 0x10, Bounds::new(50, 60, 400, 300));
        let (result, stage) = run(&acq, Provider::Builtin(Framework::Wpf), &mut root);
        assert_eq!(result.unwrap(), 1);
        assert_eq!(stage, Stage::Grafting);

        assert_eq!(root.element_type, "WpfWindow");
        let main = &root.children[0];
        assert_eq!(main.text, "Main");
        assert_eq!(main.bounds, Bounds::new(50, 60, 400, 300));
        assert_eq!(main.properties["visible"], "false");

        let seen = acq.sidecar_seen.borrow().clone().unwrap();
        assert!(seen.starts_with(r"\\.\pipe\lvt_test_"));
        assert!(!dir.path().join(ManagedTarget::WPF.sidecar_name(500)).exists());
    }

    #[test]
    fn test_wpf_foreign_bitness_is_skipped_before_injection() {
        let dir = tempfile::tempdir().unwrap();
        FakeAcquirer::deploy_all(dir.path());
        let mut acq = FakeAcquirer::new(dir.path(), "[]");
        acq.foreign = true;
        let mut root = window("HwndWrapper[App;;abc]", 0x10, Bounds::default());
        let (result, stage) = run(&acq, Provider::Builtin(Framework::Wpf), &mut root);
        assert!(result.unwrap_err().is_capability());
        assert_eq!(stage, Stage::Injecting);
        assert!(acq.log.borrow().is_empty());
    }

    #[test]
    fn test_failed_load_removes_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        FakeAcquirer::deploy_all(dir.path());
        let mut acq = FakeAcquirer::new(dir.path(), "[]");
        acq.fail_load = true;
        let mut root = window("HwndWrapper[App;;abc]", 0x10, Bounds::default());
        let (result, stage) = run(&acq, Provider::Builtin(Framework::Wpf), &mut root);
        assert!(matches!(result.unwrap_err(), LvtError::Injection(_)));
        assert_eq!(stage, Stage::Injecting);
        assert!(acq.sidecar_seen.borrow().is_some());
        assert!(!dir.path().join(ManagedTarget::WPF.sidecar_name(500)).exists());
        assert!(root.children.is_empty());
    }

    #[test]
    fn test_malformed_payload_leaves_tree() {
        let dir = tempfile::tempdir().unwrap();
        FakeAcquirer::deploy_all(dir.path());
        let acq = FakeAcquirer::new(dir.path(), "[{\"type\":");
        let mut root = window("HwndWrapper[App;;abc]", 0x10, Bounds::default());
        let (result, stage) = run(&acq, Provider::Builtin(Framework::Wpf), &mut root);
        assert!(matches!(result.unwrap_err(), LvtError::Payload(_)));
        assert_eq!(stage, Stage::Grafting);
        assert!(root.children.is_empty());
    }

    #[test]
    fn test_collect_properties_flag_reaches_tap() {
        let dir = tempfile::tempdir().unwrap();
        FakeAcquirer::deploy_all(dir.path());
        let acq = FakeAcquirer::new(dir.path(), "[]");
        let plan = InjectionPlan::Diagnostics {
            pid: 9,
            tap: dir.path().join(XAML_TAP_MODULE),
            init_module: PathBuf::from(XAML_MODULE),
            collect_properties: true,
        };
        let endpoint = EndpointName::from_string(r"\\.\pipe\lvt_xaml_x");
        let guard = run_injection(&acq, &plan, &endpoint, Duration::from_secs(5)).unwrap();
        assert!(guard.is_none());
        assert_eq!(acq.log.borrow()[0], "attach 9 Windows.UI.Xaml.dll true");
    }
}
