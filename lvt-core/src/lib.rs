//! `lvt_core` -- live visual tree acquisition for Windows processes.
//!
//! Given a target window, this crate detects which UI frameworks the owning
//! process uses, builds the native window tree, and enriches it with each
//! framework's own element tree: read cross-process for common controls,
//! collected by instrumentation loaded into the target for XAML, WinUI 3
//! and WPF, or delegated to plugins for everything else.
//!
//! It is consumed by:
//! - `lvt-cli` (the `lvt` command)
//! - `lvt-tap` and `lvt-managed-tap` (instrumentation running in the target)
//! - `lvt-plugin-avalonia` (reference plugin)
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`errors`] | `LvtError` enum via `thiserror` |
//! | [`element`] | Canonical element tree, ids, depth trimming |
//! | [`framework`] | Framework tags and detection results |
//! | [`detect`] | Module and class-name framework detection |
//! | [`plugin`] | Plugin ABI, loader and registry |
//! | [`payload`] | Foreign-tree payload format |
//! | [`transport`] | Named-pipe endpoints, sidecar files, payload exchange |
//! | [`inject`] | Code-loading and diagnostics-API injection |
//! | [`bridge`] | Managed-runtime bridge (.NET hosting) |
//! | [`graft`] | Grafting foreign trees into the canonical tree |
//! | [`providers`] | Built-in framework providers and dispatch |
//! | [`pipeline`] | Detection, base walk and enrichment orchestration |
//! | [`window`] | Base window walk |
//! | [`target`] | Target resolution by handle, pid, name or title |
//! | [`output`] | JSON and XML documents |
//! | [`logging`] | Console and file logger setup |

pub mod bridge;
#[cfg(windows)]
pub mod com;
pub mod detect;
pub mod element;
pub mod errors;
pub mod framework;
pub mod graft;
pub mod inject;
pub mod logging;
pub mod output;
pub mod payload;
pub mod pipeline;
pub mod plugin;
pub mod providers;
pub mod target;
pub mod transport;
#[cfg(windows)]
pub mod win32;
pub mod window;

pub use element::{Bounds, Element};
pub use errors::LvtError;
pub use framework::{Framework, FrameworkInfo};
pub use pipeline::{AcquireOptions, Pipeline, Snapshot, Target, TreeSource};
