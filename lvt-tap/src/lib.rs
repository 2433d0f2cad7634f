//! `lvt_tap` -- XAML diagnostics tap.
//!
//! Loaded into a target process by the XAML diagnostics runtime. It
//! collects the live visual tree (types, names, layout and optionally every
//! property value) and writes it as a JSON payload to the named pipe passed
//! in its initialization data.

pub mod tree;

#[cfg(windows)]
mod com;

#[cfg(windows)]
pub use com::{DllCanUnloadNow, DllGetClassObject};
