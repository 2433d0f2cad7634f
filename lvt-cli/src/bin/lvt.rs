//! Dump the live visual tree of a window as JSON or XML.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgGroup, Parser, ValueEnum};

use lvt_core::element::find_by_id;
use lvt_core::logging::{console_level, init_console_logger};
use lvt_core::output::TreeDocument;
use lvt_core::pipeline::Snapshot;
use lvt_core::target::{parse_handle, TargetInfo, WindowQuery};
use lvt_core::{AcquireOptions, Element, LvtError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Xml,
}

#[derive(Debug, Parser)]
#[command(name = "lvt", about = "Dump the live visual tree of a window")]
#[command(group(ArgGroup::new("target").required(true).args(["hwnd", "pid", "name", "title"])))]
struct Args {
    /// Target window handle (decimal or 0x hex)
    #[arg(long, value_parser = parse_hwnd)]
    hwnd: Option<usize>,

    /// Target process id; its largest visible window is used
    #[arg(long)]
    pid: Option<u32>,

    /// Executable name (case-insensitive substring)
    #[arg(long)]
    name: Option<String>,

    /// Window title (case-insensitive substring)
    #[arg(long)]
    title: Option<String>,

    /// Write to a file instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Only output the subtree rooted at this element id (e.g. e12)
    #[arg(long)]
    element: Option<String>,

    /// Print the detected frameworks and exit
    #[arg(long)]
    frameworks: bool,

    /// Maximum tree depth
    #[arg(long)]
    depth: Option<usize>,

    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,

    /// Compact JSON output (no pretty-printing)
    #[arg(long)]
    compact: bool,

    /// Ask XAML instrumentation for every element's property values
    #[arg(long)]
    properties: bool,

    /// Load plugins from this directory instead of ~/.lvt/plugins
    #[arg(long)]
    plugin_dir: Option<PathBuf>,

    /// Diagnostic logging to stderr
    #[arg(long, short)]
    verbose: bool,
}

fn parse_hwnd(text: &str) -> Result<usize, String> {
    parse_handle(text).map_err(|e| e.to_string())
}

impl Args {
    fn query(&self) -> Option<WindowQuery> {
        self.name
            .clone()
            .map(WindowQuery::ProcessName)
            .or_else(|| self.title.clone().map(WindowQuery::Title))
    }

    fn options(&self) -> AcquireOptions {
        AcquireOptions {
            max_depth: self.depth,
            plugin_dir: self.plugin_dir.clone(),
            collect_properties: self.properties,
            ..AcquireOptions::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// The subtree to print: the whole tree or the one rooted at `element`.
fn scope<'a>(root: &'a Element, element: Option<&str>) -> Result<&'a Element, LvtError> {
    match element {
        None => Ok(root),
        Some(id) => find_by_id(root, id)
            .ok_or_else(|| LvtError::TargetUnreachable(format!("element '{id}' not found"))),
    }
}

fn render(args: &Args, target: &TargetInfo, snapshot: &Snapshot) -> Result<String, LvtError> {
    let root = scope(&snapshot.root, args.element.as_deref())?;
    let doc = TreeDocument::new(target, snapshot.framework_names(), root);
    match args.format {
        Format::Json => doc.to_json(args.compact).map(|mut text| {
            text.push('\n');
            text
        }),
        Format::Xml => Ok(doc.to_xml()),
    }
}

fn emit(args: &Args, text: &str) -> Result<(), LvtError> {
    match &args.output {
        Some(path) => {
            std::fs::write(path, text)?;
            log::info!("wrote {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Acquisition
// ---------------------------------------------------------------------------

#[cfg(windows)]
fn run(args: &Args) -> Result<(), LvtError> {
    use lvt_core::detect::native::NativeInspector;
    use lvt_core::pipeline::Target;
    use lvt_core::plugin::PluginRegistry;
    use lvt_core::providers::native::NativeAcquirer;
    use lvt_core::target::resolve_target;
    use lvt_core::window::NativeTreeSource;
    use lvt_core::Pipeline;

    let target = resolve_target(args.hwnd, args.pid, args.query().as_ref())?;
    let options = args.options();
    let mut plugins = match &options.plugin_dir {
        Some(dir) => PluginRegistry::load(dir),
        None => PluginRegistry::load_default(),
    };
    log::debug!("{} plugin(s) loaded", plugins.len());

    let inspector = NativeInspector;
    let source = NativeTreeSource;
    let acquirer = NativeAcquirer::new();
    let pipeline = Pipeline::new(&inspector, &source, &acquirer, &plugins).with_options(options);
    let pipeline_target = Target {
        hwnd: target.hwnd,
        pid: target.pid,
    };

    if args.frameworks {
        for framework in pipeline.detect(pipeline_target) {
            println!("{framework}");
        }
        drop(pipeline);
        plugins.unload_all();
        return Ok(());
    }

    let snapshot = pipeline.acquire(pipeline_target)?;
    for report in &snapshot.reports {
        log::debug!("{report}");
    }
    let text = render(args, &target, &snapshot)?;
    drop(pipeline);
    plugins.unload_all();
    emit(args, &text)
}

#[cfg(not(windows))]
fn run(args: &Args) -> Result<(), LvtError> {
    Err(LvtError::TargetUnreachable(format!(
        "cannot inspect {:?}: live targets require Windows",
        args.query().map(|q| q.to_string()).or_else(|| args.hwnd.map(|h| format!("0x{h:X}")))
    )))
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_console_logger(console_level(args.verbose));

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("lvt: {err}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lvt_core::element::assign_element_ids;
    use lvt_core::FrameworkInfo;

    fn snapshot() -> Snapshot {
        let mut root = Element::new("Window", "win32").with_child(Element::new("Button", "win32").with_text("OK"));
        assign_element_ids(&mut root);
        Snapshot {
            root,
            frameworks: vec![FrameworkInfo::builtin(lvt_core::Framework::Win32, "")],
            reports: Vec::new(),
        }
    }

    fn target() -> TargetInfo {
        TargetInfo {
            hwnd: 0x10,
            pid: 7,
            process_name: "app.exe".into(),
        }
    }

    #[test]
    fn test_exactly_one_target_is_required() {
        assert!(Args::try_parse_from(["lvt"]).is_err());
        assert!(Args::try_parse_from(["lvt", "--pid", "1", "--name", "x"]).is_err());
        let args = Args::try_parse_from(["lvt", "--hwnd", "0x1A0B3C", "--depth", "3"]).unwrap();
        assert_eq!(args.hwnd, Some(0x1A0B3C));
        assert_eq!(args.options().max_depth, Some(3));
        assert!(!args.options().collect_properties);
        assert!(Args::try_parse_from(["lvt", "--hwnd", "nope"]).is_err());
    }

    #[test]
    fn test_query_from_name_or_title() {
        let args = Args::try_parse_from(["lvt", "--title", "Notepad"]).unwrap();
        assert_eq!(args.query(), Some(WindowQuery::Title("Notepad".into())));
        let args = Args::try_parse_from(["lvt", "--name", "calc", "--properties"]).unwrap();
        assert_eq!(args.query(), Some(WindowQuery::ProcessName("calc".into())));
        assert!(args.options().collect_properties);
    }

    #[test]
    fn test_element_scoping() {
        let snapshot = snapshot();
        assert_eq!(scope(&snapshot.root, Some("e1")).unwrap().text, "OK");
        assert!(scope(&snapshot.root, Some("e9")).is_err());

        let args = Args::try_parse_from(["lvt", "--pid", "7", "--element", "e1", "--compact"]).unwrap();
        let text = render(&args, &target(), &snapshot).unwrap();
        assert!(text.starts_with(r#"{"target":{"hwnd":"0x00000010","pid":7,"processName":"app.exe"}"#));
        assert!(text.contains(r#""root":{"id":"e1","type":"Button""#));
    }

    #[test]
    fn test_xml_format() {
        let args = Args::try_parse_from(["lvt", "--pid", "7", "--format", "xml"]).unwrap();
        let text = render(&args, &target(), &snapshot()).unwrap();
        assert!(text.starts_with("<LiveVisualTree "));
        assert!(text.contains(r#"<Button id="e1" framework="win32" text="OK" />"#));
    }
}
