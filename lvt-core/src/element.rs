//! The canonical element tree.
//!
//! [`Element`] is an owned, fully `Send` node populated by the base window
//! walk and mutated in place by enrichment passes. Only the native handle is
//! process-local; it is used as a correlation key while grafting and is never
//! serialized.

use std::collections::BTreeMap;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// Rectangle in target-process screen coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Bounds {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from floating-point measurements, clamping every component.
    pub fn from_f64(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x: clamp_to_i32(x),
            y: clamp_to_i32(y),
            width: clamp_to_i32(width),
            height: clamp_to_i32(height),
        }
    }

    pub fn area(&self) -> i64 {
        i64::from(self.width.max(0)) * i64::from(self.height.max(0))
    }
}

/// One node of the canonical tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Element {
    pub id: String,
    #[serde(rename = "type")]
    pub element_type: String,
    pub framework: String,
    #[serde(rename = "className", skip_serializing_if = "String::is_empty")]
    pub class_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    pub bounds: Bounds,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,
    /// Window handle (or other opaque handle) in the acquiring process.
    #[serde(skip)]
    pub native_handle: Option<usize>,
}

impl Element {
    pub fn new(element_type: impl Into<String>, framework: impl Into<String>) -> Self {
        Self {
            element_type: element_type.into(),
            framework: framework.into(),
            ..Self::default()
        }
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_handle(mut self, handle: usize) -> Self {
        self.native_handle = Some(handle);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn set_property(&mut self, key: &str, value: impl Into<String>) {
        self.properties.insert(key.to_string(), value.into());
    }

    /// Relabel this node as belonging to `framework` with a friendlier type.
    pub fn relabel(&mut self, element_type: &str, framework: &str) {
        self.element_type = element_type.to_string();
        self.framework = framework.to_string();
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Element::count).sum::<usize>()
    }

    /// Pre-order visit of every node.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Element)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Pre-order mutable visit of every node.
    pub fn walk_mut(&mut self, visit: &mut impl FnMut(&mut Element)) {
        visit(self);
        for child in &mut self.children {
            child.walk_mut(visit);
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Convert a floating-point measurement to a screen coordinate.
///
/// Non-finite input maps to `0`; values at or beyond the `i32` range
/// saturate; everything else truncates toward zero.
pub fn clamp_to_i32(value: f64) -> i32 {
    if !value.is_finite() {
        return 0;
    }
    if value >= f64::from(i32::MAX) {
        return i32::MAX;
    }
    if value <= f64::from(i32::MIN) {
        return i32::MIN;
    }
    value as i32
}

/// Strip control characters below U+0020, keeping TAB.
pub fn sanitize(text: &str) -> String {
    text.chars().filter(|&c| c >= ' ' || c == '\t').collect()
}

/// Format a window handle the way the base walk records it.
pub fn format_handle(handle: usize) -> String {
    format!("0x{handle:016X}")
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Assign `e0`, `e1`, ... in depth-first pre-order over the complete tree.
pub fn assign_element_ids(root: &mut Element) {
    let mut counter = 0usize;
    root.walk_mut(&mut |el| {
        el.id = format!("e{counter}");
        counter += 1;
    });
}

/// Drop every node deeper than `max_depth`. Depth 0 keeps only the root.
///
/// Identifiers are left untouched, so call [`assign_element_ids`] first.
pub fn trim_to_depth(root: &mut Element, max_depth: usize) {
    fn trim(el: &mut Element, depth: usize, max_depth: usize) {
        if depth >= max_depth {
            el.children.clear();
            return;
        }
        for child in &mut el.children {
            trim(child, depth + 1, max_depth);
        }
    }
    trim(root, 0, max_depth);
}

pub fn find_by_id<'a>(root: &'a Element, id: &str) -> Option<&'a Element> {
    if root.id == id {
        return Some(root);
    }
    root.children.iter().find_map(|child| find_by_id(child, id))
}

/// First node in pre-order whose native handle equals `handle`.
pub fn find_by_handle_mut(root: &mut Element, handle: usize) -> Option<&mut Element> {
    if root.native_handle == Some(handle) {
        return Some(root);
    }
    root.children
        .iter_mut()
        .find_map(|child| find_by_handle_mut(child, handle))
}

/// First node in pre-order for which `matches` holds.
pub fn find_first_mut<'a>(
    root: &'a mut Element,
    matches: &impl Fn(&Element) -> bool,
) -> Option<&'a mut Element> {
    if matches(root) {
        return Some(root);
    }
    root.children
        .iter_mut()
        .find_map(|child| find_first_mut(child, matches))
}

/// Child-index paths of every node whose class name equals `class_name`,
/// in pre-order.
pub fn paths_with_class(root: &Element, class_name: &str) -> Vec<Vec<usize>> {
    fn collect(el: &Element, class_name: &str, path: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if el.class_name == class_name {
            out.push(path.clone());
        }
        for (index, child) in el.children.iter().enumerate() {
            path.push(index);
            collect(child, class_name, path, out);
            path.pop();
        }
    }
    let mut out = Vec::new();
    collect(root, class_name, &mut Vec::new(), &mut out);
    out
}

pub fn node_at_path_mut<'a>(root: &'a mut Element, path: &[usize]) -> Option<&'a mut Element> {
    let mut current = root;
    for &index in path {
        current = current.children.get_mut(index)?;
    }
    Some(current)
}
