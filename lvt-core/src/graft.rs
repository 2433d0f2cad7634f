//! Grafting foreign payload trees onto the canonical tree.
//!
//! Grafting only ever appends children. Hosts are located by value on every
//! root (never by a cached reference), so earlier grafts that grew a child
//! vector cannot invalidate later lookups.

use crate::element::{
    clamp_to_i32, find_by_handle_mut, node_at_path_mut, paths_with_class, sanitize, Bounds,
    Element,
};
use crate::payload::{parse_handle_text, HandleRef, PayloadNode};

/// How payload offsets relate to screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSpace {
    /// Offsets are relative to the parent node; the grafted root accumulates
    /// from its host's origin.
    Relative,
    /// Offsets are already absolute screen coordinates.
    Screen,
}

#[derive(Debug, Clone, Copy)]
pub struct GraftOptions<'a> {
    /// Tag written into every grafted node's `framework` field.
    pub framework: &'a str,
    /// Property consulted for display text when neither `text` nor `name`
    /// is present.
    pub text_property: Option<&'a str>,
    pub coordinates: CoordinateSpace,
}

impl<'a> GraftOptions<'a> {
    pub fn relative(framework: &'a str) -> Self {
        Self {
            framework,
            text_property: None,
            coordinates: CoordinateSpace::Relative,
        }
    }

    pub fn screen(framework: &'a str) -> Self {
        Self {
            framework,
            text_property: None,
            coordinates: CoordinateSpace::Screen,
        }
    }

    pub fn with_text_property(mut self, property: &'a str) -> Self {
        self.text_property = Some(property);
        self
    }
}

/// Where payload roots without a resolvable back-reference are attached.
#[derive(Debug, Clone, Copy)]
pub enum GraftAnchor<'a> {
    /// Under the canonical root.
    Root,
    /// Under the element carrying this native handle, else the root.
    Handle(usize),
    /// Roots whose type contains `marker` are paired in order with the
    /// elements of class `class`; the rest go under the root.
    Bridges { class: &'a str, marker: &'a str },
}

/// Property name under which the base walk records each window handle.
pub const HANDLE_PROPERTY: &str = "hwnd";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn simplify_type(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn node_text(node: &PayloadNode, opts: &GraftOptions<'_>) -> String {
    let explicit = node
        .text
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| node.name.as_deref().filter(|t| !t.is_empty()));
    if let Some(text) = explicit {
        return sanitize(text);
    }
    let Some(property) = opts.text_property else {
        return String::new();
    };
    node.string_properties()
        .into_iter()
        .find(|(key, _)| key == property)
        .map(|(_, value)| sanitize(&value))
        .unwrap_or_default()
}

/// Convert one payload node (recursively) into an [`Element`].
///
/// `parent_x`/`parent_y` are the parent's absolute origin; they are ignored
/// in [`CoordinateSpace::Screen`].
pub fn build_element(node: &PayloadNode, opts: &GraftOptions<'_>, parent_x: f64, parent_y: f64) -> Element {
    let class_name = sanitize(&node.node_type);
    let mut el = Element::new(simplify_type(&class_name), opts.framework);
    el.text = node_text(node, opts);

    let (abs_x, abs_y) = match opts.coordinates {
        CoordinateSpace::Relative => (
            finite(node.offset_x).map_or(parent_x, |dx| parent_x + dx),
            finite(node.offset_y).map_or(parent_y, |dy| parent_y + dy),
        ),
        CoordinateSpace::Screen => (
            finite(node.offset_x).unwrap_or(0.0),
            finite(node.offset_y).unwrap_or(0.0),
        ),
    };
    if let (Some(w), Some(h)) = (finite(node.width), finite(node.height)) {
        if w > 0.0 && h > 0.0 && abs_x.is_finite() && abs_y.is_finite() {
            el.bounds = Bounds::from_f64(abs_x, abs_y, w, h);
        }
    }

    for (key, value) in node.string_properties() {
        el.properties.insert(sanitize(&key), sanitize(&value));
    }
    if node.visible == Some(false) {
        el.set_property("visible", "false");
    }
    if node.enabled == Some(false) {
        el.set_property("enabled", "false");
    }

    el.class_name = class_name;
    el.children = node
        .child_nodes()
        .iter()
        .map(|child| build_element(child, opts, abs_x, abs_y))
        .collect();
    el
}

fn origin(el: &Element) -> (f64, f64) {
    (f64::from(el.bounds.x), f64::from(el.bounds.y))
}

fn handle_matches(el: &Element, target: &HandleRef) -> bool {
    let Some(recorded) = el.properties.get(HANDLE_PROPERTY) else {
        return false;
    };
    match (parse_handle_text(recorded), target.value()) {
        (Some(a), Some(b)) => a == b,
        _ => *recorded == target.as_text(),
    }
}

fn find_host_mut<'a>(el: &'a mut Element, target: &HandleRef) -> Option<&'a mut Element> {
    if handle_matches(el, target) {
        return Some(el);
    }
    el.children
        .iter_mut()
        .find_map(|child| find_host_mut(child, target))
}

/// Attach `node` under `host`, starting coordinates at the host's origin.
fn attach(host: &mut Element, node: &PayloadNode, opts: &GraftOptions<'_>) {
    let (x, y) = origin(host);
    host.children.push(build_element(node, opts, x, y));
}

/// Graft a back-referenced root. Its children land directly under the host;
/// a root without a `children` key is grafted itself.
fn attach_hosted(host: &mut Element, node: &PayloadNode, opts: &GraftOptions<'_>) {
    match &node.children {
        Some(children) => {
            let (x, y) = origin(host);
            for child in children {
                host.children.push(build_element(child, opts, x, y));
            }
        }
        None => attach(host, node, opts),
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Merge every payload root into `root`. Returns the number of roots grafted.
pub fn graft(root: &mut Element, nodes: &[PayloadNode], anchor: GraftAnchor<'_>, opts: &GraftOptions<'_>) -> usize {
    let bridges = match anchor {
        GraftAnchor::Bridges { class, .. } => paths_with_class(root, class),
        _ => Vec::new(),
    };
    let mut next_bridge = 0usize;

    for node in nodes {
        if let Some(target) = node.target_hwnd.as_ref().filter(|t| !t.is_empty()) {
            if let Some(host) = find_host_mut(root, target) {
                attach_hosted(host, node, opts);
                continue;
            }
            log::debug!(
                "no element with {HANDLE_PROPERTY}={} for {}, grafting under root",
                target.as_text(),
                node.node_type
            );
            attach(root, node, opts);
            continue;
        }

        match anchor {
            GraftAnchor::Root => attach(root, node, opts),
            GraftAnchor::Handle(handle) => match find_by_handle_mut(root, handle) {
                Some(host) => attach(host, node, opts),
                None => attach(root, node, opts),
            },
            GraftAnchor::Bridges { marker, .. } => {
                let is_bridged = node.node_type.contains(marker) && next_bridge < bridges.len();
                let host = if is_bridged {
                    next_bridge += 1;
                    node_at_path_mut(root, &bridges[next_bridge - 1])
                } else {
                    None
                };
                match host {
                    Some(host) => attach(host, node, opts),
                    None => attach(root, node, opts),
                }
            }
        }
    }
    nodes.len()
}

/// Clamp a pair of coordinates exactly the way grafting does.
pub fn compose(parent: (f64, f64), offset: (f64, f64)) -> (i32, i32) {
    (clamp_to_i32(parent.0 + offset.0), clamp_to_i32(parent.1 + offset.1))
}
