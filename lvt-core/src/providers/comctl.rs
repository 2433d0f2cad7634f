//! Common-controls enrichment.
//!
//! List views, tree views, toolbars, status bars and tab controls keep their
//! items inside the owning process. Counts come from plain messages; item
//! text and state come from pointer-carrying messages whose structures must
//! live in the target, so each read goes through a scoped remote allocation
//! holding one fixed-layout record followed by a text buffer.
//!
//! The OS side is behind [`ControlHost`] so the marshaling can be exercised
//! without a live target.

use std::mem::size_of;

use crate::element::{sanitize, Element};
use crate::errors::LvtError;
use crate::framework::Framework;

const COMCTL: &str = Framework::ComCtl.as_str();

/// Items read from a list view before it is marked `truncated`.
pub const MAX_LIST_ITEMS: usize = 50;
/// Top-level items read from a tree view.
pub const MAX_TREE_ITEMS: usize = 100;
pub const MAX_TOOLBAR_BUTTONS: usize = 50;

const ITEM_TEXT_CHARS: usize = 512;
const SHORT_TEXT_CHARS: usize = 256;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

const WM_USER: u32 = 0x0400;

const LVM_GETITEMCOUNT: u32 = 0x1004;
const LVM_GETHEADER: u32 = 0x101F;
const LVM_GETITEMW: u32 = 0x104B;
const LVM_GETVIEW: u32 = 0x108F;
const HDM_GETITEMCOUNT: u32 = 0x1200;
const LVIF_TEXT: u32 = 0x0001;
const LVIF_STATE: u32 = 0x0008;
const LVIS_SELECTED: u32 = 0x0002;

const TVM_GETCOUNT: u32 = 0x1105;
const TVM_GETNEXTITEM: u32 = 0x110A;
const TVM_GETITEMW: u32 = 0x113E;
const TVGN_ROOT: usize = 0x0000;
const TVGN_NEXT: usize = 0x0001;
const TVIF_TEXT: u32 = 0x0001;
const TVIF_STATE: u32 = 0x0008;
const TVIF_CHILDREN: u32 = 0x0040;
const TVIS_SELECTED: u32 = 0x0002;
const TVIS_EXPANDED: u32 = 0x0020;

const TB_GETBUTTON: u32 = WM_USER + 23;
const TB_BUTTONCOUNT: u32 = WM_USER + 24;
const TB_GETBUTTONTEXTW: u32 = WM_USER + 75;
const BTNS_SEP: u8 = 0x01;
const TBSTATE_CHECKED: u8 = 0x01;
const TBSTATE_ENABLED: u8 = 0x04;

const SB_GETPARTS: u32 = WM_USER + 6;
const SB_GETTEXTW: u32 = WM_USER + 13;

const TCM_GETITEMCOUNT: u32 = 0x1304;
const TCM_GETCURSEL: u32 = 0x130B;
const TCM_GETITEMW: u32 = 0x133C;
const TCIF_TEXT: u32 = 0x0001;

// ---------------------------------------------------------------------------
// Remote records
// ---------------------------------------------------------------------------

/// A plain structure copied byte-for-byte into and out of the target.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]`, contain only integer fields and be
/// valid for every bit pattern.
pub unsafe trait Record: Copy + Sized {
    fn zeroed() -> Self {
        // SAFETY: every implementor is valid when all-zero.
        unsafe { std::mem::zeroed() }
    }

    fn to_bytes(&self) -> Vec<u8> {
        // SAFETY: `self` is a live, fully initialized value of `Self`.
        unsafe { std::slice::from_raw_parts(self as *const Self as *const u8, size_of::<Self>()) }.to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < size_of::<Self>() {
            return None;
        }
        // SAFETY: length checked; every bit pattern is a valid `Self`.
        Some(unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const Self) })
    }
}

/// `LVITEMW`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ListViewItem {
    pub mask: u32,
    pub item: i32,
    pub sub_item: i32,
    pub state: u32,
    pub state_mask: u32,
    pub text: usize,
    pub text_max: i32,
    pub image: i32,
    pub param: isize,
    pub indent: i32,
    pub group_id: i32,
    pub columns: u32,
    pub column_list: usize,
    pub column_formats: usize,
    pub group: i32,
}

/// `TVITEMW`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TreeViewItem {
    pub mask: u32,
    pub item: usize,
    pub state: u32,
    pub state_mask: u32,
    pub text: usize,
    pub text_max: i32,
    pub image: i32,
    pub selected_image: i32,
    pub children: i32,
    pub param: isize,
}

/// `TCITEMW`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TabItem {
    pub mask: u32,
    pub state: u32,
    pub state_mask: u32,
    pub text: usize,
    pub text_max: i32,
    pub image: i32,
    pub param: isize,
}

/// `TBBUTTON`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ToolbarButton {
    pub bitmap: i32,
    pub command: i32,
    pub state: u8,
    pub style: u8,
    pub reserved: [u8; size_of::<usize>() - 2],
    pub data: usize,
    pub string: isize,
}

unsafe impl Record for ListViewItem {}
unsafe impl Record for TreeViewItem {}
unsafe impl Record for TabItem {}
unsafe impl Record for ToolbarButton {}

// ---------------------------------------------------------------------------
// OS seam
// ---------------------------------------------------------------------------

/// A scoped allocation inside the process that owns a control.
pub trait RemoteMemory {
    /// Address of the allocation in the target.
    fn address(&self) -> usize;
    fn write(&self, offset: usize, bytes: &[u8]) -> Result<(), LvtError>;
    fn read(&self, offset: usize, out: &mut [u8]) -> Result<(), LvtError>;
}

/// Message delivery and remote memory for common controls.
pub trait ControlHost {
    /// Send with an abort-if-hung timeout. Returns 0 on failure or timeout.
    fn send(&self, hwnd: usize, msg: u32, wparam: usize, lparam: isize) -> isize;

    /// Run `visit` with `size` bytes allocated in the process owning `hwnd`;
    /// the allocation is released when `visit` returns. Returns `false` when
    /// no allocation could be made (process not openable, foreign bitness).
    fn with_remote(&self, hwnd: usize, size: usize, visit: &mut dyn FnMut(&dyn RemoteMemory)) -> bool;
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_record<R: Record>(mem: &dyn RemoteMemory, offset: usize) -> Option<R> {
    let mut raw = vec![0u8; size_of::<R>()];
    mem.read(offset, &mut raw).ok()?;
    R::from_bytes(&raw)
}

fn clear_text(mem: &dyn RemoteMemory, offset: usize, chars: usize) {
    let _ = mem.write(offset, &vec![0u8; chars * 2]);
}

fn read_text(mem: &dyn RemoteMemory, offset: usize, chars: usize) -> String {
    let mut raw = vec![0u8; chars * 2];
    if mem.read(offset, &mut raw).is_err() {
        return String::new();
    }
    let wide: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let end = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    sanitize(&String::from_utf16_lossy(&wide[..end]))
}

fn count(host: &dyn ControlHost, hwnd: usize, msg: u32) -> usize {
    host.send(hwnd, msg, 0, 0).max(0) as usize
}

fn view_mode(mode: isize) -> Option<&'static str> {
    match mode {
        0 => Some("icon"),
        1 => Some("details"),
        2 => Some("smallicon"),
        3 => Some("list"),
        4 => Some("tile"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Controls
// ---------------------------------------------------------------------------

fn list_view(el: &mut Element, hwnd: usize, host: &dyn ControlHost) {
    el.relabel("ListView", COMCTL);
    let total = count(host, hwnd, LVM_GETITEMCOUNT);
    el.set_property("itemCount", total.to_string());
    if let Some(mode) = view_mode(host.send(hwnd, LVM_GETVIEW, 0, 0)) {
        el.set_property("viewMode", mode);
    }
    let header = host.send(hwnd, LVM_GETHEADER, 0, 0);
    if header != 0 {
        let columns = count(host, header as usize, HDM_GETITEMCOUNT);
        el.set_property("columnCount", columns.to_string());
    }

    let text_at = size_of::<ListViewItem>();
    let mut items = Vec::new();
    let allocated = host.with_remote(hwnd, text_at + ITEM_TEXT_CHARS * 2, &mut |mem| {
        for index in 0..total.min(MAX_LIST_ITEMS) {
            let mut item = Element::new("ListViewItem", COMCTL).with_property("index", index.to_string());
            let mut record = ListViewItem::zeroed();
            record.mask = LVIF_TEXT | LVIF_STATE;
            record.item = index as i32;
            record.state_mask = LVIS_SELECTED;
            record.text = mem.address() + text_at;
            record.text_max = ITEM_TEXT_CHARS as i32;

            clear_text(mem, text_at, ITEM_TEXT_CHARS);
            if mem.write(0, &record.to_bytes()).is_ok() {
                host.send(hwnd, LVM_GETITEMW, 0, mem.address() as isize);
                item.text = read_text(mem, text_at, ITEM_TEXT_CHARS);
                let result: Option<ListViewItem> = read_record(mem, 0);
                if result.is_some_and(|r| r.state & LVIS_SELECTED != 0) {
                    item.set_property("selected", "true");
                }
            }
            items.push(item);
        }
    });
    el.children.extend(items);
    if allocated && total > MAX_LIST_ITEMS {
        el.set_property("truncated", "true");
    }
}

fn tree_view(el: &mut Element, hwnd: usize, host: &dyn ControlHost) {
    el.relabel("TreeView", COMCTL);
    el.set_property("itemCount", count(host, hwnd, TVM_GETCOUNT).to_string());

    let first = host.send(hwnd, TVM_GETNEXTITEM, TVGN_ROOT, 0);
    if first == 0 {
        return;
    }
    let text_at = size_of::<TreeViewItem>();
    let mut items = Vec::new();
    host.with_remote(hwnd, text_at + ITEM_TEXT_CHARS * 2, &mut |mem| {
        let mut handle = first;
        while handle != 0 && items.len() < MAX_TREE_ITEMS {
            let mut item = Element::new("TreeViewItem", COMCTL);
            let mut record = TreeViewItem::zeroed();
            record.mask = TVIF_TEXT | TVIF_STATE | TVIF_CHILDREN;
            record.item = handle as usize;
            record.state_mask = TVIS_SELECTED | TVIS_EXPANDED;
            record.text = mem.address() + text_at;
            record.text_max = ITEM_TEXT_CHARS as i32;

            clear_text(mem, text_at, ITEM_TEXT_CHARS);
            if mem.write(0, &record.to_bytes()).is_ok() {
                host.send(hwnd, TVM_GETITEMW, 0, mem.address() as isize);
                item.text = read_text(mem, text_at, ITEM_TEXT_CHARS);
                if let Some(result) = read_record::<TreeViewItem>(mem, 0) {
                    if result.state & TVIS_SELECTED != 0 {
                        item.set_property("selected", "true");
                    }
                    if result.state & TVIS_EXPANDED != 0 {
                        item.set_property("expanded", "true");
                    }
                    if result.children > 0 {
                        item.set_property("hasChildren", "true");
                    }
                }
            }
            items.push(item);
            handle = host.send(hwnd, TVM_GETNEXTITEM, TVGN_NEXT, handle);
        }
    });
    el.children.extend(items);
}

fn toolbar(el: &mut Element, hwnd: usize, host: &dyn ControlHost) {
    el.relabel("Toolbar", COMCTL);
    let total = count(host, hwnd, TB_BUTTONCOUNT);
    el.set_property("buttonCount", total.to_string());

    let text_at = size_of::<ToolbarButton>();
    let mut items = Vec::new();
    host.with_remote(hwnd, text_at + SHORT_TEXT_CHARS * 2, &mut |mem| {
        for index in 0..total.min(MAX_TOOLBAR_BUTTONS) {
            let _ = mem.write(0, &ToolbarButton::zeroed().to_bytes());
            host.send(hwnd, TB_GETBUTTON, index, mem.address() as isize);
            let button = read_record::<ToolbarButton>(mem, 0).unwrap_or_else(ToolbarButton::zeroed);

            let mut item = Element::new("ToolbarButton", COMCTL)
                .with_property("index", index.to_string())
                .with_property("commandId", button.command.to_string());
            if button.style & BTNS_SEP != 0 {
                item.element_type = "ToolbarSeparator".to_string();
            } else {
                clear_text(mem, text_at, SHORT_TEXT_CHARS);
                host.send(
                    hwnd,
                    TB_GETBUTTONTEXTW,
                    button.command as usize,
                    (mem.address() + text_at) as isize,
                );
                item.text = read_text(mem, text_at, SHORT_TEXT_CHARS);
            }
            if button.state & TBSTATE_CHECKED != 0 {
                item.set_property("checked", "true");
            }
            if button.state & TBSTATE_ENABLED == 0 {
                item.set_property("enabled", "false");
            }
            items.push(item);
        }
    });
    el.children.extend(items);
}

fn status_bar(el: &mut Element, hwnd: usize, host: &dyn ControlHost) {
    el.relabel("StatusBar", COMCTL);
    let parts = count(host, hwnd, SB_GETPARTS);
    el.set_property("partCount", parts.to_string());

    let mut items = Vec::new();
    host.with_remote(hwnd, ITEM_TEXT_CHARS * 2, &mut |mem| {
        for index in 0..parts {
            clear_text(mem, 0, ITEM_TEXT_CHARS);
            host.send(hwnd, SB_GETTEXTW, index, mem.address() as isize);
            items.push(
                Element::new("StatusBarPart", COMCTL)
                    .with_property("index", index.to_string())
                    .with_text(read_text(mem, 0, ITEM_TEXT_CHARS)),
            );
        }
    });
    el.children.extend(items);
}

fn tab_control(el: &mut Element, hwnd: usize, host: &dyn ControlHost) {
    el.relabel("TabControl", COMCTL);
    let total = count(host, hwnd, TCM_GETITEMCOUNT);
    let selected = host.send(hwnd, TCM_GETCURSEL, 0, 0);
    el.set_property("tabCount", total.to_string());
    el.set_property("selectedIndex", selected.to_string());

    let text_at = size_of::<TabItem>();
    let mut items = Vec::new();
    host.with_remote(hwnd, text_at + SHORT_TEXT_CHARS * 2, &mut |mem| {
        for index in 0..total {
            let mut item = Element::new("Tab", COMCTL).with_property("index", index.to_string());
            if index as isize == selected {
                item.set_property("selected", "true");
            }
            let mut record = TabItem::zeroed();
            record.mask = TCIF_TEXT;
            record.text = mem.address() + text_at;
            record.text_max = SHORT_TEXT_CHARS as i32;

            clear_text(mem, text_at, SHORT_TEXT_CHARS);
            if mem.write(0, &record.to_bytes()).is_ok() {
                host.send(hwnd, TCM_GETITEMW, index, mem.address() as isize);
                item.text = read_text(mem, text_at, SHORT_TEXT_CHARS);
            }
            items.push(item);
        }
    });
    el.children.extend(items);
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Relabel and expand every common control in the tree. Returns the number
/// of controls enriched.
pub fn enrich(root: &mut Element, host: &dyn ControlHost) -> usize {
    let mut enriched = 0;
    for child in &mut root.children {
        enriched += enrich(child, host);
    }
    let Some(hwnd) = root.native_handle.filter(|&h| h != 0) else {
        return enriched;
    };
    let reader: fn(&mut Element, usize, &dyn ControlHost) = match root.class_name.as_str() {
        "SysListView32" => list_view,
        "SysTreeView32" => tree_view,
        "ToolbarWindow32" => toolbar,
        "msctls_statusbar32" => status_bar,
        "SysTabControl32" => tab_control,
        _ => return enriched,
    };
    reader(root, hwnd, host);
    enriched + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};

    const BASE: usize = 0x7FF0_0000;

    struct FakeMemory<'a>(&'a RefCell<Vec<u8>>);

    impl RemoteMemory for FakeMemory<'_> {
        fn address(&self) -> usize {
            BASE
        }

        fn write(&self, offset: usize, bytes: &[u8]) -> Result<(), LvtError> {
            let mut mem = self.0.borrow_mut();
            let end = offset + bytes.len();
            if end > mem.len() {
                return Err(LvtError::Transport("out of range".into()));
            }
            mem[offset..end].copy_from_slice(bytes);
            Ok(())
        }

        fn read(&self, offset: usize, out: &mut [u8]) -> Result<(), LvtError> {
            let mem = self.0.borrow();
            let end = offset + out.len();
            if end > mem.len() {
                return Err(LvtError::Transport("out of range".into()));
            }
            out.copy_from_slice(&mem[offset..end]);
            Ok(())
        }
    }

    /// Simulates a control owner: answers counting messages from a table
    /// and fills records and text in the simulated remote allocation.
    #[derive(Default)]
    struct FakeControls {
        replies: HashMap<(usize, u32, usize), isize>,
        texts: HashMap<(u32, usize), String>,
        flagged: HashSet<(u32, usize)>,
        buttons: Vec<ToolbarButton>,
        memory: RefCell<Vec<u8>>,
        no_remote: bool,
        allocations: RefCell<usize>,
    }

    impl FakeControls {
        fn reply(mut self, hwnd: usize, msg: u32, wparam: usize, value: isize) -> Self {
            self.replies.insert((hwnd, msg, wparam), value);
            self
        }

        fn text(mut self, msg: u32, key: usize, text: &str) -> Self {
            self.texts.insert((msg, key), text.to_string());
            self
        }

        fn flag(mut self, msg: u32, key: usize) -> Self {
            self.flagged.insert((msg, key));
            self
        }

        fn put_text(&self, address: usize, text: &str) {
            let mut bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
            bytes.extend([0, 0]);
            let offset = address - BASE;
            self.memory.borrow_mut()[offset..offset + bytes.len()].copy_from_slice(&bytes);
        }

        fn record<R: Record>(&self, address: usize) -> R {
            let offset = address - BASE;
            R::from_bytes(&self.memory.borrow()[offset..]).unwrap()
        }

        fn store<R: Record>(&self, address: usize, record: &R) {
            let bytes = record.to_bytes();
            let offset = address - BASE;
            self.memory.borrow_mut()[offset..offset + bytes.len()].copy_from_slice(&bytes);
        }
    }

    impl ControlHost for FakeControls {
        fn send(&self, hwnd: usize, msg: u32, wparam: usize, lparam: isize) -> isize {
            let address = lparam as usize;
            match msg {
                LVM_GETITEMW => {
                    let mut rec: ListViewItem = self.record(address);
                    let key = rec.item as usize;
                    if let Some(text) = self.texts.get(&(msg, key)) {
                        self.put_text(rec.text, text);
                    }
                    if self.flagged.contains(&(msg, key)) {
                        rec.state = LVIS_SELECTED;
                    }
                    self.store(address, &rec);
                    1
                }
                TVM_GETITEMW => {
                    let mut rec: TreeViewItem = self.record(address);
                    if let Some(text) = self.texts.get(&(msg, rec.item)) {
                        self.put_text(rec.text, text);
                    }
                    if self.flagged.contains(&(msg, rec.item)) {
                        rec.state = TVIS_EXPANDED;
                        rec.children = 1;
                    }
                    self.store(address, &rec);
                    1
                }
                TCM_GETITEMW => {
                    let rec: TabItem = self.record(address);
                    if let Some(text) = self.texts.get(&(msg, wparam)) {
                        self.put_text(rec.text, text);
                    }
                    1
                }
                SB_GETTEXTW | TB_GETBUTTONTEXTW => {
                    if let Some(text) = self.texts.get(&(msg, wparam)) {
                        self.put_text(address, text);
                    }
                    1
                }
                TB_GETBUTTON => {
                    if let Some(button) = self.buttons.get(wparam) {
                        self.store(address, button);
                    }
                    1
                }
                _ => self.replies.get(&(hwnd, msg, wparam)).copied().unwrap_or(0),
            }
        }

        fn with_remote(&self, _hwnd: usize, size: usize, visit: &mut dyn FnMut(&dyn RemoteMemory)) -> bool {
            if self.no_remote {
                return false;
            }
            *self.allocations.borrow_mut() += 1;
            *self.memory.borrow_mut() = vec![0u8; size];
            visit(&FakeMemory(&self.memory));
            true
        }
    }

    fn control(class: &str, hwnd: usize) -> Element {
        Element::new("Window", "win32").with_class(class).with_handle(hwnd)
    }

    fn button(command: i32, state: u8, style: u8) -> ToolbarButton {
        let mut b = ToolbarButton::zeroed();
        b.command = command;
        b.state = state;
        b.style = style;
        b
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_record_layouts_match_win64() {
        assert_eq!(size_of::<ListViewItem>(), 88);
        assert_eq!(size_of::<TreeViewItem>(), 56);
        assert_eq!(size_of::<TabItem>(), 40);
        assert_eq!(size_of::<ToolbarButton>(), 32);
    }

    #[test]
    fn test_record_bytes_survive_copy() {
        let mut rec = TreeViewItem::zeroed();
        rec.item = 0xABCD;
        rec.text_max = 512;
        let bytes = rec.to_bytes();
        let back = TreeViewItem::from_bytes(&bytes).unwrap();
        assert_eq!(back.item, 0xABCD);
        assert_eq!(back.text_max, 512);
        assert!(TreeViewItem::from_bytes(&bytes[..4]).is_none());
    }

    #[test]
    fn test_list_view_items_and_properties() {
        let host = FakeControls::default()
            .reply(10, LVM_GETITEMCOUNT, 0, 3)
            .reply(10, LVM_GETVIEW, 0, 1)
            .reply(10, LVM_GETHEADER, 0, 11)
            .reply(11, HDM_GETITEMCOUNT, 0, 4)
            .text(LVM_GETITEMW, 0, "alpha")
            .text(LVM_GETITEMW, 1, "beta")
            .text(LVM_GETITEMW, 2, "gamma")
            .flag(LVM_GETITEMW, 1);
        let mut root = control("#32770", 1).with_child(control("SysListView32", 10));

        assert_eq!(enrich(&mut root, &host), 1);
        let list = &root.children[0];
        assert_eq!(list.element_type, "ListView");
        assert_eq!(list.framework, "comctl");
        assert_eq!(list.properties["itemCount"], "3");
        assert_eq!(list.properties["viewMode"], "details");
        assert_eq!(list.properties["columnCount"], "4");
        assert!(!list.properties.contains_key("truncated"));

        let texts: Vec<_> = list.children.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["alpha", "beta", "gamma"]);
        assert_eq!(list.children[1].properties["selected"], "true");
        assert!(!list.children[0].properties.contains_key("selected"));
        assert_eq!(list.children[2].properties["index"], "2");
        assert_eq!(*host.allocations.borrow(), 1);
    }

    #[test]
    fn test_list_view_is_capped() {
        let host = FakeControls::default().reply(10, LVM_GETITEMCOUNT, 0, 60);
        let mut root = control("SysListView32", 10);
        enrich(&mut root, &host);
        assert_eq!(root.children.len(), MAX_LIST_ITEMS);
        assert_eq!(root.properties["truncated"], "true");
        assert_eq!(root.properties["itemCount"], "60");
    }

    #[test]
    fn test_unreadable_process_keeps_counts_only() {
        let host = FakeControls {
            no_remote: true,
            ..FakeControls::default()
        }
        .reply(10, LVM_GETITEMCOUNT, 0, 60);
        let mut root = control("SysListView32", 10);
        enrich(&mut root, &host);
        assert_eq!(root.element_type, "ListView");
        assert_eq!(root.properties["itemCount"], "60");
        assert!(root.children.is_empty());
        assert!(!root.properties.contains_key("truncated"));
    }

    #[test]
    fn test_tree_view_walks_siblings() {
        let host = FakeControls::default()
            .reply(20, TVM_GETCOUNT, 0, 5)
            .reply(20, TVM_GETNEXTITEM, TVGN_ROOT, 0x100)
            .text(TVM_GETITEMW, 0x100, "Root A")
            .text(TVM_GETITEMW, 0x200, "Root B")
            .flag(TVM_GETITEMW, 0x200);
        // Sibling chain 0x100 -> 0x200.
        struct Chained(FakeControls);
        impl ControlHost for Chained {
            fn send(&self, hwnd: usize, msg: u32, wparam: usize, lparam: isize) -> isize {
                if msg == TVM_GETNEXTITEM && wparam == TVGN_NEXT {
                    return if lparam == 0x100 { 0x200 } else { 0 };
                }
                self.0.send(hwnd, msg, wparam, lparam)
            }
            fn with_remote(&self, hwnd: usize, size: usize, visit: &mut dyn FnMut(&dyn RemoteMemory)) -> bool {
                self.0.with_remote(hwnd, size, visit)
            }
        }

        let mut root = control("SysTreeView32", 20);
        enrich(&mut root, &Chained(host));
        assert_eq!(root.element_type, "TreeView");
        assert_eq!(root.properties["itemCount"], "5");
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].text, "Root A");
        assert!(root.children[0].properties.is_empty());
        assert_eq!(root.children[1].text, "Root B");
        assert_eq!(root.children[1].properties["expanded"], "true");
        assert_eq!(root.children[1].properties["hasChildren"], "true");
    }

    #[test]
    fn test_toolbar_buttons_and_separators() {
        let mut host = FakeControls::default()
            .reply(30, TB_BUTTONCOUNT, 0, 3)
            .text(TB_GETBUTTONTEXTW, 101, "Open")
            .text(TB_GETBUTTONTEXTW, 102, "Bold");
        host.buttons = vec![
            button(101, TBSTATE_ENABLED, 0),
            button(0, TBSTATE_ENABLED, BTNS_SEP),
            button(102, TBSTATE_CHECKED, 0),
        ];
        let mut root = control("ToolbarWindow32", 30);
        enrich(&mut root, &host);

        assert_eq!(root.element_type, "Toolbar");
        assert_eq!(root.properties["buttonCount"], "3");
        let types: Vec<_> = root.children.iter().map(|c| c.element_type.as_str()).collect();
        assert_eq!(types, ["ToolbarButton", "ToolbarSeparator", "ToolbarButton"]);
        assert_eq!(root.children[0].text, "Open");
        assert_eq!(root.children[0].properties["commandId"], "101");
        assert!(root.children[1].text.is_empty());
        assert_eq!(root.children[2].text, "Bold");
        assert_eq!(root.children[2].properties["checked"], "true");
        assert_eq!(root.children[2].properties["enabled"], "false");
    }

    #[test]
    fn test_status_bar_and_tabs() {
        let host = FakeControls::default()
            .reply(40, SB_GETPARTS, 0, 2)
            .text(SB_GETTEXTW, 0, "Ready")
            .text(SB_GETTEXTW, 1, "Ln 1\u{7}")
            .reply(50, TCM_GETITEMCOUNT, 0, 2)
            .reply(50, TCM_GETCURSEL, 0, 1)
            .text(TCM_GETITEMW, 0, "General")
            .text(TCM_GETITEMW, 1, "Advanced");
        let mut root = control("#32770", 1)
            .with_child(control("msctls_statusbar32", 40))
            .with_child(control("SysTabControl32", 50));
        assert_eq!(enrich(&mut root, &host), 2);

        let status = &root.children[0];
        assert_eq!(status.properties["partCount"], "2");
        assert_eq!(status.children[0].text, "Ready");
        assert_eq!(status.children[1].text, "Ln 1");

        let tabs = &root.children[1];
        assert_eq!(tabs.element_type, "TabControl");
        assert_eq!(tabs.properties["tabCount"], "2");
        assert_eq!(tabs.properties["selectedIndex"], "1");
        assert_eq!(tabs.children[1].text, "Advanced");
        assert_eq!(tabs.children[1].properties["selected"], "true");
        assert!(!tabs.children[0].properties.contains_key("selected"));
    }

    #[test]
    fn test_other_classes_untouched() {
        let host = FakeControls::default();
        let mut root = control("Button", 5).with_child(Element::new("Window", "win32").with_class("SysListView32"));
        let before = serde_json::to_string(&root).unwrap();
        assert_eq!(enrich(&mut root, &host), 0);
        assert_eq!(serde_json::to_string(&root).unwrap(), before);
    }
}
