//! Plugin ABI and loader.
//!
//! Plugins are dynamically loaded modules found in a user-scoped directory
//! (`~/.lvt/plugins`). The [`PluginRegistry`] is an explicit object owned by
//! the caller; nothing here is process-global.

pub mod abi;
#[cfg(windows)]
pub mod native;
mod registry;

pub use registry::{default_plugin_dir, LoadedPlugin, PluginModule, PluginRegistry};
