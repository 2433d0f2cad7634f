//! Output documents.
//!
//! The same document is written as JSON (default) or XML.

use std::fmt::Write as _;

use serde::Serialize;

use crate::element::{sanitize, Element};
use crate::errors::LvtError;
use crate::target::TargetInfo;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
struct TargetRecord {
    hwnd: String,
    pid: u32,
    #[serde(rename = "processName")]
    process_name: String,
}

/// Target, detected frameworks and the (possibly scoped) tree.
#[derive(Debug, Clone, Serialize)]
pub struct TreeDocument<'a> {
    target: TargetRecord,
    frameworks: Vec<String>,
    root: &'a Element,
}

impl<'a> TreeDocument<'a> {
    pub fn new(target: &TargetInfo, frameworks: Vec<String>, root: &'a Element) -> Self {
        Self {
            target: TargetRecord {
                hwnd: format!("0x{:08X}", target.hwnd),
                pid: target.pid,
                process_name: target.process_name.clone(),
            },
            frameworks,
            root,
        }
    }

    /// Pretty-printed (two-space indent) unless `compact`.
    pub fn to_json(&self, compact: bool) -> Result<String, LvtError> {
        let text = if compact {
            serde_json::to_string(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        Ok(text)
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "<LiveVisualTree hwnd=\"{}\" pid=\"{}\" process=\"{}\" frameworks=\"{}\">",
            self.target.hwnd,
            self.target.pid,
            xml_escape(&self.target.process_name),
            xml_escape(&self.frameworks.join(","))
        );
        element_to_xml(self.root, &mut out, 1);
        out.push_str("</LiveVisualTree>\n");
        out
    }
}

// ---------------------------------------------------------------------------
// XML helpers
// ---------------------------------------------------------------------------

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in sanitize(text).chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' => out.push_str("&#9;"),
            c => out.push(c),
        }
    }
    out
}

/// `element_type` when it is a usable XML name, else `Element`.
fn xml_tag(element_type: &str) -> &str {
    let mut chars = element_type.chars();
    let valid_start = chars.next().is_some_and(|c| c.is_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid_start && valid_rest {
        element_type
    } else {
        "Element"
    }
}

fn element_to_xml(el: &Element, out: &mut String, indent: usize) {
    let pad = "  ".repeat(indent);
    let tag = xml_tag(&el.element_type);

    let _ = write!(out, "{pad}<{tag} id=\"{}\" framework=\"{}\"", xml_escape(&el.id), xml_escape(&el.framework));
    if !el.class_name.is_empty() && el.class_name != el.element_type {
        let _ = write!(out, " className=\"{}\"", xml_escape(&el.class_name));
    }
    if !el.text.is_empty() {
        let _ = write!(out, " text=\"{}\"", xml_escape(&el.text));
    }
    let b = el.bounds;
    if b.width > 0 || b.height > 0 {
        let _ = write!(out, " bounds=\"{},{},{},{}\"", b.x, b.y, b.width, b.height);
    }

    if el.properties.is_empty() && el.children.is_empty() {
        out.push_str(" />\n");
        return;
    }
    out.push_str(">\n");
    for (name, value) in &el.properties {
        let _ = writeln!(
            out,
            "{pad}  <Property name=\"{}\" value=\"{}\" />",
            xml_escape(name),
            xml_escape(value)
        );
    }
    for child in &el.children {
        element_to_xml(child, out, indent + 1);
    }
    let _ = writeln!(out, "{pad}</{tag}>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{assign_element_ids, Bounds};

    fn target() -> TargetInfo {
        TargetInfo {
            hwnd: 0x1A0B3C,
            pid: 4242,
            process_name: "App.exe".into(),
        }
    }

    fn tree() -> Element {
        let mut root = Element::new("Window", "win32")
            .with_class("Main<1>")
            .with_text("Tom & \"Jerry\"")
            .with_bounds(Bounds::new(0, 0, 800, 600))
            .with_property("visible", "true")
            .with_child(Element::new("List`1", "avalonia"))
            .with_child(Element::new("Button", "win32").with_class("Button"));
        assign_element_ids(&mut root);
        root
    }

    #[test]
    fn test_json_document_shape() {
        let root = tree();
        let doc = TreeDocument::new(&target(), vec!["win32".into(), "comctl 6.10".into()], &root);
        let json: serde_json::Value = serde_json::from_str(&doc.to_json(false).unwrap()).unwrap();
        assert_eq!(json["target"]["hwnd"], "0x001A0B3C");
        assert_eq!(json["target"]["pid"], 4242);
        assert_eq!(json["target"]["processName"], "App.exe");
        assert_eq!(json["frameworks"][1], "comctl 6.10");
        assert_eq!(json["root"]["id"], "e0");
        assert_eq!(json["root"]["children"][1]["className"], "Button");
        assert!(json["root"]["children"][0].get("className").is_none());

        let compact = doc.to_json(true).unwrap();
        assert!(!compact.contains('\n'));
    }

    #[test]
    fn test_xml_document() {
        let root = tree();
        let doc = TreeDocument::new(&target(), vec!["win32".into(), "avalonia 11.0".into()], &root);
        let xml = doc.to_xml();
        let lines: Vec<&str> = xml.lines().collect();
        assert_eq!(
            lines[0],
            r#"<LiveVisualTree hwnd="0x001A0B3C" pid="4242" process="App.exe" frameworks="win32,avalonia 11.0">"#
        );
        assert_eq!(
            lines[1],
            r#"  <Window id="e0" framework="win32" className="Main&lt;1&gt;" text="Tom &amp; &quot;Jerry&quot;" bounds="0,0,800,600">"#
        );
        assert_eq!(lines[2], r#"    <Property name="visible" value="true" />"#);
        assert_eq!(lines[3], r#"    <Element id="e1" framework="avalonia" />"#);
        assert_eq!(lines[4], r#"    <Button id="e2" framework="win32" />"#);
        assert_eq!(lines[5], "  </Window>");
        assert_eq!(lines[6], "</LiveVisualTree>");
    }

    #[test]
    fn test_xml_tag_validity() {
        assert_eq!(xml_tag("Grid"), "Grid");
        assert_eq!(xml_tag("_Private.Type-2"), "_Private.Type-2");
        assert_eq!(xml_tag("2D"), "Element");
        assert_eq!(xml_tag(""), "Element");
        assert_eq!(xml_tag("a b"), "Element");
    }
}
