//! Target resolution.
//!
//! Turns a window handle, process id, executable name or title fragment into
//! the single window the pipeline walks. Name and title searches consider
//! visible top-level windows only and must match exactly one of them.

use std::fmt;

use crate::element::Bounds;
use crate::errors::LvtError;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// The resolved target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    pub hwnd: usize,
    pub pid: u32,
    /// Executable base name, empty when the process cannot be queried.
    pub process_name: String,
}

/// A visible top-level window considered during a name or title search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowMatch {
    pub hwnd: usize,
    pub pid: u32,
    pub process_name: String,
    pub title: String,
}

impl fmt::Display for WindowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "--hwnd 0x{:X}  pid={}  {}  \"{}\"",
            self.hwnd, self.pid, self.process_name, self.title
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowQuery {
    ProcessName(String),
    Title(String),
}

impl WindowQuery {
    pub fn matches(&self, window: &WindowMatch) -> bool {
        match self {
            WindowQuery::ProcessName(name) => contains_ignore_case(&window.process_name, name),
            WindowQuery::Title(title) => contains_ignore_case(&window.title, title),
        }
    }
}

impl fmt::Display for WindowQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowQuery::ProcessName(name) => write!(f, "process name '{name}'"),
            WindowQuery::Title(title) => write!(f, "title '{title}'"),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Case-insensitive substring test; an empty needle matches everything.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Parse a window handle written in decimal or `0x` hexadecimal.
pub fn parse_handle(text: &str) -> Result<usize, LvtError> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => text.parse::<usize>(),
    };
    match parsed {
        Ok(0) | Err(_) => Err(LvtError::TargetUnreachable(format!("invalid window handle '{text}'"))),
        Ok(value) => Ok(value),
    }
}

/// Handle of the window with the largest non-empty area. Ties keep the
/// first candidate.
pub fn largest_window(candidates: &[(usize, Bounds)]) -> Option<usize> {
    let mut best: Option<(usize, i64)> = None;
    for &(hwnd, bounds) in candidates {
        let area = bounds.area();
        if area > best.map_or(0, |(_, a)| a) {
            best = Some((hwnd, area));
        }
    }
    best.map(|(hwnd, _)| hwnd)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Keep the windows matching `query`, in enumeration order.
pub fn filter_matches(windows: Vec<WindowMatch>, query: &WindowQuery) -> Vec<WindowMatch> {
    windows.into_iter().filter(|w| query.matches(w)).collect()
}

/// Exactly one match, or an error listing the candidates.
pub fn single_match(matches: Vec<WindowMatch>, query: &WindowQuery) -> Result<WindowMatch, LvtError> {
    let count = matches.len();
    let mut iter = matches.into_iter();
    match (iter.next(), count) {
        (Some(only), 1) => Ok(only),
        (None, _) => Err(LvtError::TargetUnreachable(format!("no visible window matches {query}"))),
        (Some(first), _) => {
            let listing: Vec<String> = std::iter::once(first)
                .chain(iter)
                .map(|m| format!("  {m}"))
                .collect();
            Err(LvtError::TargetUnreachable(format!(
                "{count} windows match {query}; pick one with --hwnd:\n{}",
                listing.join("\n")
            )))
        }
    }
}

#[cfg(windows)]
pub use self::native::{find_windows, resolve_target};

#[cfg(windows)]
mod native {
    use std::collections::HashMap;

    use sysinfo::{Pid, ProcessesToUpdate, System};
    use windows::Win32::Foundation::{BOOL, HWND, LPARAM, RECT, TRUE};
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetWindowRect, IsWindow, IsWindowVisible,
    };

    use super::{filter_matches, largest_window, single_match, TargetInfo, WindowMatch, WindowQuery};
    use crate::element::Bounds;
    use crate::errors::LvtError;
    use crate::win32;

    /// Callback for EnumWindows that collects visible window handles.
    unsafe extern "system" fn visible_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let handles = unsafe { &mut *(lparam.0 as *mut Vec<HWND>) };
        if unsafe { IsWindowVisible(hwnd) }.as_bool() {
            handles.push(hwnd);
        }
        TRUE
    }

    fn visible_top_level() -> Result<Vec<HWND>, LvtError> {
        let mut handles: Vec<HWND> = Vec::with_capacity(64);
        unsafe { EnumWindows(Some(visible_callback), LPARAM(&mut handles as *mut Vec<HWND> as isize)) }
            .map_err(|e| LvtError::Com(format!("EnumWindows failed: {e}")))?;
        Ok(handles)
    }

    fn process_names(pids: &[u32]) -> HashMap<u32, String> {
        let pids: Vec<Pid> = pids.iter().map(|&p| Pid::from_u32(p)).collect();
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&pids), true);
        pids.iter()
            .filter_map(|pid| {
                let name = system.process(*pid)?.name().to_string_lossy().into_owned();
                Some((pid.as_u32(), name))
            })
            .collect()
    }

    fn bounds_of(hwnd: HWND) -> Bounds {
        let mut rect = RECT::default();
        let _ = unsafe { GetWindowRect(hwnd, &mut rect) };
        Bounds::new(rect.left, rect.top, rect.right - rect.left, rect.bottom - rect.top)
    }

    /// Visible top-level windows matching `query`.
    pub fn find_windows(query: &WindowQuery) -> Result<Vec<WindowMatch>, LvtError> {
        let handles = visible_top_level()?;
        let pids: Vec<u32> = handles.iter().map(|&h| win32::window_pid(h).unwrap_or(0)).collect();
        let names = process_names(&pids);
        let windows = handles
            .iter()
            .zip(&pids)
            .map(|(&hwnd, &pid)| WindowMatch {
                hwnd: win32::hwnd_value(hwnd),
                pid,
                process_name: names.get(&pid).cloned().unwrap_or_default(),
                title: win32::window_text(hwnd),
            })
            .collect();
        Ok(filter_matches(windows, query))
    }

    /// Resolve from an explicit handle, a process id, or a search.
    ///
    /// A process id selects that process's largest visible top-level window.
    pub fn resolve_target(
        hwnd: Option<usize>,
        pid: Option<u32>,
        query: Option<&WindowQuery>,
    ) -> Result<TargetInfo, LvtError> {
        let (hwnd, pid) = match (hwnd, pid, query) {
            (Some(hwnd), _, _) => {
                if !unsafe { IsWindow(win32::hwnd(hwnd)) }.as_bool() {
                    return Err(LvtError::TargetUnreachable(format!("0x{hwnd:X} is not a window")));
                }
                let pid = win32::window_pid(win32::hwnd(hwnd))
                    .ok_or_else(|| LvtError::TargetUnreachable(format!("no process owns 0x{hwnd:X}")))?;
                (hwnd, pid)
            }
            (None, Some(pid), _) => {
                let candidates: Vec<(usize, Bounds)> = visible_top_level()?
                    .into_iter()
                    .filter(|&h| win32::window_pid(h) == Some(pid))
                    .map(|h| (win32::hwnd_value(h), bounds_of(h)))
                    .collect();
                let hwnd = largest_window(&candidates).ok_or_else(|| {
                    LvtError::TargetUnreachable(format!("process {pid} has no visible window"))
                })?;
                (hwnd, pid)
            }
            (None, None, Some(query)) => {
                let found = single_match(find_windows(query)?, query)?;
                (found.hwnd, found.pid)
            }
            (None, None, None) => {
                return Err(LvtError::TargetUnreachable("no target given".into()));
            }
        };
        let process_name = process_names(&[pid]).remove(&pid).unwrap_or_default();
        log::info!("target hwnd=0x{hwnd:X} pid={pid} ({process_name})");
        Ok(TargetInfo {
            hwnd,
            pid,
            process_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(hwnd: usize, pid: u32, name: &str, title: &str) -> WindowMatch {
        WindowMatch {
            hwnd,
            pid,
            process_name: name.into(),
            title: title.into(),
        }
    }

    fn desktop() -> Vec<WindowMatch> {
        vec![
            window(0x100, 1, "notepad.exe", "Untitled - Notepad"),
            window(0x200, 2, "Calculator.exe", "Calculator"),
            window(0x300, 3, "explorer.exe", "Program Manager"),
            window(0x400, 4, "notepad.exe", "todo.txt - Notepad"),
        ]
    }

    #[test]
    fn test_parse_handle() {
        assert_eq!(parse_handle("0x1A0B3C").unwrap(), 0x1A0B3C);
        assert_eq!(parse_handle("0X1a").unwrap(), 0x1A);
        assert_eq!(parse_handle("1706812").unwrap(), 1_706_812);
        assert!(parse_handle("0").is_err());
        assert!(parse_handle("0xZZ").is_err());
        assert!(parse_handle("").is_err());
    }

    #[test]
    fn test_filter_is_case_insensitive_substring() {
        let query = WindowQuery::ProcessName("CALC".into());
        let found = filter_matches(desktop(), &query);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].hwnd, 0x200);

        let query = WindowQuery::Title("notepad".into());
        assert_eq!(filter_matches(desktop(), &query).len(), 2);
    }

    #[test]
    fn test_single_match_lists_candidates() {
        let query = WindowQuery::ProcessName("notepad".into());
        let err = single_match(filter_matches(desktop(), &query), &query).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("2 windows match process name 'notepad'"));
        assert!(text.contains("--hwnd 0x100  pid=1  notepad.exe  \"Untitled - Notepad\""));
        assert!(text.contains("--hwnd 0x400  pid=4"));

        let query = WindowQuery::Title("missing".into());
        let err = single_match(filter_matches(desktop(), &query), &query).unwrap_err();
        assert!(err.to_string().contains("no visible window matches title 'missing'"));

        let query = WindowQuery::Title("Calc".into());
        assert_eq!(single_match(filter_matches(desktop(), &query), &query).unwrap().pid, 2);
    }

    #[test]
    fn test_largest_window_wins() {
        let candidates = [
            (1, Bounds::new(0, 0, 10, 10)),
            (2, Bounds::new(0, 0, 800, 600)),
            (3, Bounds::new(0, 0, 600, 800)),
            (4, Bounds::new(0, 0, -5, 100)),
        ];
        assert_eq!(largest_window(&candidates), Some(2));
        assert_eq!(largest_window(&[(9, Bounds::default())]), None);
        assert_eq!(largest_window(&[]), None);
    }
}
