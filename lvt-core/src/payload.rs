//! Wire format of enrichment payloads.
//!
//! Instrumentation modules and plugins both emit UTF-8 JSON: an array of
//! root nodes (a single object is accepted as a one-element array). The same
//! type is used on the producing side inside the target process, so every
//! optional field is omitted when absent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::LvtError;

/// Back-reference from a payload root to a canonical host element.
///
/// Producers write the handle either as a `"0x..."`/decimal string or as a
/// bare JSON number; both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HandleRef {
    Number(u64),
    Text(String),
}

impl HandleRef {
    /// Numeric value of the handle, if it parses as decimal or `0x` hex.
    pub fn value(&self) -> Option<u64> {
        match self {
            HandleRef::Number(n) => Some(*n),
            HandleRef::Text(s) => parse_handle_text(s),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            HandleRef::Number(n) => n.to_string(),
            HandleRef::Text(s) => s.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, HandleRef::Text(s) if s.trim().is_empty())
    }
}

/// Parse `"0x1A2B"`, `"0X1a2b"` or `"6699"`.
pub fn parse_handle_text(text: &str) -> Option<u64> {
    let text = text.trim();
    if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok()
    } else {
        text.parse::<u64>().ok()
    }
}

/// One node of a foreign tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadNode {
    /// Fully qualified foreign type name.
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(rename = "offsetX", default, skip_serializing_if = "Option::is_none")]
    pub offset_x: Option<f64>,
    #[serde(rename = "offsetY", default, skip_serializing_if = "Option::is_none")]
    pub offset_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Diagnostics-service handle of the node inside the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<PayloadNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_hwnd: Option<HandleRef>,
}

impl PayloadNode {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            ..Self::default()
        }
    }

    pub fn child_nodes(&self) -> &[PayloadNode] {
        self.children.as_deref().unwrap_or(&[])
    }

    pub fn push_child(&mut self, child: PayloadNode) {
        self.children.get_or_insert_with(Vec::new).push(child);
    }

    /// Properties flattened to strings: strings as-is, everything else as
    /// compact JSON.
    pub fn string_properties(&self) -> Vec<(String, String)> {
        let Some(props) = &self.properties else {
            return Vec::new();
        };
        props
            .iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), text)
            })
            .collect()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PayloadDocument {
    Many(Vec<PayloadNode>),
    One(Box<PayloadNode>),
}

/// Parse a complete payload buffer.
pub fn parse_payload(bytes: &[u8]) -> Result<Vec<PayloadNode>, LvtError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(LvtError::Payload("empty payload".into()));
    }
    let doc: PayloadDocument = serde_json::from_slice(bytes)?;
    Ok(match doc {
        PayloadDocument::Many(nodes) => nodes,
        PayloadDocument::One(node) => vec![*node],
    })
}

/// Serialize payload roots the way instrumentation modules send them.
pub fn encode_payload(nodes: &[PayloadNode]) -> Result<Vec<u8>, LvtError> {
    Ok(serde_json::to_vec(nodes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_array_with_all_fields() {
        let json = br#"[{"type":"Microsoft.UI.Xaml.Controls.Button","name":"OK",
            "width":80,"height":24.5,"offsetX":10,"offsetY":-2,
            "properties":{"IsDefault":true,"Content":"OK"},
            "children":[{"type":"TextBlock"}],"target_hwnd":"0x1A2B"}]"#;
        let nodes = parse_payload(json).unwrap();
        assert_eq!(nodes.len(), 1);
        let node = &nodes[0];
        assert_eq!(node.node_type, "Microsoft.UI.Xaml.Controls.Button");
        assert_eq!(node.height, Some(24.5));
        assert_eq!(node.child_nodes().len(), 1);
        assert_eq!(node.target_hwnd.as_ref().and_then(HandleRef::value), Some(0x1A2B));
        let props = node.string_properties();
        assert!(props.contains(&("IsDefault".to_string(), "true".to_string())));
        assert!(props.contains(&("Content".to_string(), "OK".to_string())));
    }

    #[test]
    fn test_parse_single_object() {
        let nodes = parse_payload(br#"{"type":"Window"}"#).unwrap();
        assert_eq!(nodes[0].node_type, "Window");
    }

    #[test]
    fn test_missing_type_defaults_to_empty() {
        let nodes = parse_payload(br#"[{"name":"x"}]"#).unwrap();
        assert_eq!(nodes[0].node_type, "");
    }

    #[test]
    fn test_empty_and_malformed_are_payload_errors() {
        assert!(matches!(parse_payload(b""), Err(LvtError::Payload(_))));
        assert!(matches!(parse_payload(b"  \n"), Err(LvtError::Payload(_))));
        assert!(matches!(parse_payload(b"[{\"type\":"), Err(LvtError::Payload(_))));
        assert!(matches!(parse_payload(b"42"), Err(LvtError::Payload(_))));
    }

    #[test]
    fn test_numeric_target_hwnd() {
        let nodes = parse_payload(br#"[{"type":"A","target_hwnd":200}]"#).unwrap();
        assert_eq!(nodes[0].target_hwnd, Some(HandleRef::Number(200)));
    }

    #[test]
    fn test_parse_handle_text() {
        assert_eq!(parse_handle_text("0x00000000000000C8"), Some(200));
        assert_eq!(parse_handle_text("200"), Some(200));
        assert_eq!(parse_handle_text(" 0XfF "), Some(255));
        assert_eq!(parse_handle_text("zz"), None);
        assert_eq!(parse_handle_text(""), None);
    }

    #[test]
    fn test_encode_omits_absent_fields() {
        let mut root = PayloadNode::new("Grid");
        root.width = Some(10.0);
        root.push_child(PayloadNode::new("Button"));
        let bytes = encode_payload(&[root]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"width\":10.0"));
        assert!(!text.contains("offsetX"));
        assert!(!text.contains("target_hwnd"));
        assert_eq!(parse_payload(text.as_bytes()).unwrap()[0].child_nodes().len(), 1);
    }
}
