//! Visual tree state accumulated from diagnostics notifications.
//!
//! Nodes arrive as `Add` mutations (the service replays the current tree
//! when a callback is advised). Layout values are filled in later from each
//! node's property chain, then the roots are serialized as the payload.

use std::collections::{BTreeMap, HashMap, HashSet};

use lvt_core::payload::{encode_payload, PayloadNode};
use lvt_core::LvtError;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub width: f64,
    pub height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

#[derive(Debug, Clone, Default)]
pub struct TapNode {
    pub handle: u64,
    pub node_type: String,
    pub name: String,
    pub children: Vec<u64>,
    pub layout: Option<Layout>,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct TapTree {
    nodes: HashMap<u64, TapNode>,
    roots: Vec<u64>,
}

/// Parse `"x,y,z"` or `"<x, y, z>"`, returning the first two components.
pub fn parse_offset(text: &str) -> Option<(f64, f64)> {
    let inner = text.trim().trim_start_matches('<').trim_end_matches('>');
    let mut parts = inner.split(',').map(|p| p.trim().parse::<f64>());
    let x = parts.next()?.ok()?;
    let y = parts.next()?.ok()?;
    (x.is_finite() && y.is_finite()).then_some((x, y))
}

fn finite(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

impl TapTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    pub fn handles(&self) -> Vec<u64> {
        self.nodes.keys().copied().collect()
    }

    /// Record an added element. `parent == 0` marks a root; a child whose
    /// parent was never seen is kept but unreachable.
    pub fn add(&mut self, parent: u64, handle: u64, node_type: &str, name: &str) {
        let previous = self.nodes.insert(
            handle,
            TapNode {
                handle,
                node_type: node_type.to_string(),
                name: name.to_string(),
                ..TapNode::default()
            },
        );
        if let (Some(previous), Some(node)) = (previous, self.nodes.get_mut(&handle)) {
            node.children = previous.children;
        }
        if parent == 0 {
            if !self.roots.contains(&handle) {
                self.roots.push(handle);
            }
        } else if let Some(parent) = self.nodes.get_mut(&parent) {
            if !parent.children.contains(&handle) {
                parent.children.push(handle);
            }
        }
    }

    /// Apply one element's property chain (`name`, `value` pairs, most
    /// specific first). Layout needs both `ActualWidth` and `ActualHeight`.
    pub fn apply_chain(&mut self, handle: u64, chain: &[(String, String)], collect_properties: bool) {
        let Some(node) = self.nodes.get_mut(&handle) else {
            return;
        };
        let (mut width, mut height, mut offset) = (None, None, None);
        for (name, value) in chain {
            match name.as_str() {
                "ActualWidth" if width.is_none() => width = finite(value),
                "ActualHeight" if height.is_none() => height = finite(value),
                "ActualOffset" if offset.is_none() => offset = parse_offset(value),
                _ => {}
            }
            if collect_properties && !name.is_empty() && !value.is_empty() {
                node.properties.entry(name.clone()).or_insert_with(|| value.clone());
            }
        }
        if let (Some(width), Some(height)) = (width, height) {
            let (offset_x, offset_y) = offset.unwrap_or((0.0, 0.0));
            node.layout = Some(Layout {
                width,
                height,
                offset_x,
                offset_y,
            });
        }
    }

    fn to_node(&self, handle: u64, visited: &mut HashSet<u64>) -> Option<PayloadNode> {
        if !visited.insert(handle) {
            return None;
        }
        let node = self.nodes.get(&handle)?;
        let mut out = PayloadNode::new(node.node_type.clone());
        out.name = (!node.name.is_empty()).then(|| node.name.clone());
        out.handle = Some(node.handle);
        if let Some(layout) = node.layout {
            out.width = Some(layout.width);
            out.height = Some(layout.height);
            out.offset_x = Some(layout.offset_x);
            out.offset_y = Some(layout.offset_y);
        }
        if !node.properties.is_empty() {
            let map: Map<String, Value> = node
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            out.properties = Some(map);
        }
        for child in &node.children {
            if let Some(child) = self.to_node(*child, visited) {
                out.push_child(child);
            }
        }
        Some(out)
    }

    /// Roots in arrival order, each with its reachable subtree.
    pub fn to_payload(&self) -> Vec<PayloadNode> {
        let mut visited = HashSet::new();
        self.roots
            .iter()
            .filter_map(|root| self.to_node(*root, &mut visited))
            .collect()
    }

    pub fn encode(&self) -> Result<Vec<u8>, LvtError> {
        encode_payload(&self.to_payload())
    }
}
