//! Base window walk.
//!
//! Every target gets a `win32` tree first: one element per window, direct
//! children only, with class-derived types and a few style properties.
//! Enrichment passes relabel and extend this tree in place.

use crate::element::Element;

#[cfg(windows)]
pub use self::native::NativeTreeSource;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const STYLE_NAMES: [(u32, &str); 9] = [
    (0x00CF_0000, "WS_OVERLAPPEDWINDOW"),
    (0x8000_0000, "WS_POPUP"),
    (0x4000_0000, "WS_CHILD"),
    (0x1000_0000, "WS_VISIBLE"),
    (0x0800_0000, "WS_DISABLED"),
    (0x2000_0000, "WS_MINIMIZE"),
    (0x0100_0000, "WS_MAXIMIZE"),
    (0x0010_0000, "WS_HSCROLL"),
    (0x0020_0000, "WS_VSCROLL"),
];

/// Element type for a window class. Unknown classes are plain `Window`s.
pub fn classify_window(class_name: &str) -> &'static str {
    match class_name {
        "Button" => "Button",
        "Edit" => "Edit",
        "Static" => "Static",
        "ComboBox" => "ComboBox",
        "ListBox" => "ListBox",
        "ScrollBar" => "ScrollBar",
        "#32770" => "Dialog",
        _ => "Window",
    }
}

/// Space-separated `WS_*` names for a style word.
///
/// `WS_OVERLAPPEDWINDOW` is reported when any of its component bits is set.
pub fn style_names(style: u32) -> String {
    STYLE_NAMES
        .iter()
        .filter(|(mask, _)| style & mask != 0)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Window attributes read by the walk, before conversion to an [`Element`].
#[derive(Debug, Clone, Default)]
pub struct WindowFacts {
    pub handle: usize,
    pub class_name: String,
    pub text: String,
    pub rect: (i32, i32, i32, i32),
    pub style: u32,
    pub visible: bool,
    pub enabled: bool,
}

impl WindowFacts {
    pub fn into_element(self) -> Element {
        let (left, top, right, bottom) = self.rect;
        Element::new(classify_window(&self.class_name), "win32")
            .with_handle(self.handle)
            .with_text(self.text)
            .with_bounds(crate::element::Bounds::new(left, top, right - left, bottom - top))
            .with_property("style", style_names(self.style))
            .with_property("visible", self.visible.to_string())
            .with_property("enabled", self.enabled.to_string())
            .with_property("hwnd", crate::element::format_handle(self.handle))
            .with_class(self.class_name)
    }
}

// ---------------------------------------------------------------------------
// Native walk
// ---------------------------------------------------------------------------

#[cfg(windows)]
mod native {
    use windows::Win32::Foundation::{BOOL, HWND, LPARAM, RECT, TRUE};
    use windows::Win32::UI::Input::KeyboardAndMouse::IsWindowEnabled;
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumChildWindows, GetParent, GetWindowLongW, GetWindowRect, IsWindow, IsWindowVisible,
        GWL_STYLE,
    };

    use super::WindowFacts;
    use crate::element::Element;
    use crate::errors::LvtError;
    use crate::pipeline::TreeSource;
    use crate::win32;

    struct ChildScan {
        parent: HWND,
        children: Vec<HWND>,
    }

    /// Callback for EnumChildWindows that keeps direct children only.
    unsafe extern "system" fn direct_child_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let scan = unsafe { &mut *(lparam.0 as *mut ChildScan) };
        if unsafe { GetParent(hwnd) }.ok() == Some(scan.parent) {
            scan.children.push(hwnd);
        }
        TRUE
    }

    fn direct_children(parent: HWND) -> Vec<HWND> {
        let mut scan = ChildScan {
            parent,
            children: Vec::new(),
        };
        let _ = unsafe {
            EnumChildWindows(
                parent,
                Some(direct_child_callback),
                LPARAM(&mut scan as *mut ChildScan as isize),
            )
        };
        scan.children
    }

    fn read_facts(hwnd: HWND) -> WindowFacts {
        let mut rect = RECT::default();
        let _ = unsafe { GetWindowRect(hwnd, &mut rect) };
        WindowFacts {
            handle: win32::hwnd_value(hwnd),
            class_name: win32::class_name(hwnd),
            text: win32::window_text(hwnd),
            rect: (rect.left, rect.top, rect.right, rect.bottom),
            style: unsafe { GetWindowLongW(hwnd, GWL_STYLE) } as u32,
            visible: unsafe { IsWindowVisible(hwnd) }.as_bool(),
            enabled: unsafe { IsWindowEnabled(hwnd) }.as_bool(),
        }
    }

    fn build_element(hwnd: HWND) -> Element {
        let mut el = read_facts(hwnd).into_element();
        el.children = direct_children(hwnd).into_iter().map(build_element).collect();
        el
    }

    /// Live window tree of the acquiring desktop.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct NativeTreeSource;

    impl TreeSource for NativeTreeSource {
        fn build(&self, hwnd: usize) -> Result<Element, LvtError> {
            let window = win32::hwnd(hwnd);
            if !unsafe { IsWindow(window) }.as_bool() {
                return Err(LvtError::TargetUnreachable(format!("0x{hwnd:X} is not a window")));
            }
            Ok(build_element(window))
        }
    }
}
