//! Metadata block codec.
//!
//! DESIGN
//! ======
//! Each record is one small XML document in its own container. The root
//! element's namespace and local name mark the block type; anything else in
//! the document (other add-ins, hand edits) is reported as `Foreign` before
//! any field is read.
//!
//! ```text
//! <MermaidDiagram xmlns="urn:mermaid-embed:diagram:v1">
//!   <Id>mermaid-...</Id>
//!   <Code>graph TD&#10;A--&gt;B</Code>
//!   <CreatedAt>2026-10-16T09:00:00Z</CreatedAt>
//!   <UpdatedAt>2026-10-16T09:00:00Z</UpdatedAt>
//!   <ShapeTagged>true</ShapeTagged>
//!   <ShapeInfo left="50" top="50" width="300" height="200"/>
//! </MermaidDiagram>
//! ```
//!
//! `Code` is entity-escaped, with carriage returns written as character
//! references so XML end-of-line handling cannot rewrite them. Source text
//! holding characters XML 1.0 cannot carry at all is stored base64-encoded
//! with `encoding="base64"`.

use std::fmt::Write as _;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::geometry::Geometry;
use crate::record::DiagramRecord;
use crate::settings::{COLOR_KEYS, MAX_FONT_SIZE, MIN_FONT_SIZE, Settings, Theme};

pub const DIAGRAM_NAMESPACE: &str = "urn:mermaid-embed:diagram:v1";
pub const SETTINGS_NAMESPACE: &str = "urn:mermaid-embed:settings:v1";
const DIAGRAM_ROOT: &str = "MermaidDiagram";
const SETTINGS_ROOT: &str = "MermaidSettings";

/// A decoded metadata block.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    Diagram(DiagramRecord),
    Settings(Settings),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Well-formed XML that is not one of our block types.
    #[error("not a diagram or settings block")]
    Foreign,
    /// Not XML, or one of our blocks with missing or invalid fields.
    #[error("malformed metadata block: {0}")]
    Malformed(String),
}

// =============================================================================
// ENCODE
// =============================================================================

#[must_use]
pub fn encode_record(record: &DiagramRecord) -> String {
    let mut xml = String::with_capacity(record.source_code.len() + 256);
    let _ = write!(xml, "<{DIAGRAM_ROOT} xmlns=\"{DIAGRAM_NAMESPACE}\">");
    write_element(&mut xml, "Id", &record.id);

    if record.source_code.chars().all(is_xml_char) {
        write_element(&mut xml, "Code", &record.source_code);
    } else {
        let _ = write!(xml, "<Code encoding=\"base64\">{}</Code>", BASE64.encode(&record.source_code));
    }

    write_element(&mut xml, "CreatedAt", &format_timestamp(record.created_at));
    write_element(&mut xml, "UpdatedAt", &format_timestamp(record.updated_at));
    write_element(&mut xml, "ShapeTagged", if record.shape_tagged { "true" } else { "false" });
    if let Some(hint) = record.geometry_hint {
        let _ = write!(
            xml,
            "<ShapeInfo left=\"{}\" top=\"{}\" width=\"{}\" height=\"{}\"/>",
            hint.left, hint.top, hint.width, hint.height
        );
    }
    let _ = write!(xml, "</{DIAGRAM_ROOT}>");
    xml
}

#[must_use]
pub fn encode_settings(settings: &Settings) -> String {
    let mut xml = String::with_capacity(512);
    let _ = write!(xml, "<{SETTINGS_ROOT} xmlns=\"{SETTINGS_NAMESPACE}\">");
    write_element(&mut xml, "theme", settings.theme.as_str());
    write_element(&mut xml, "fontFamily", &settings.font_family);
    write_element(&mut xml, "fontSize", &settings.font_size.to_string());
    for (key, value) in settings.colors.entries() {
        write_element(&mut xml, key, value);
    }
    let _ = write!(xml, "</{SETTINGS_ROOT}>");
    xml
}

fn write_element(xml: &mut String, name: &str, text: &str) {
    let _ = write!(xml, "<{name}>");
    escape_text(xml, text);
    let _ = write!(xml, "</{name}>");
}

fn escape_text(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
}

/// Characters allowed in an XML 1.0 document.
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}

fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

// =============================================================================
// DECODE
// =============================================================================

/// Decode one container's text.
///
/// # Errors
///
/// `Foreign` for well-formed XML with another root marker, `Malformed` for
/// non-XML text or one of our blocks with missing or invalid fields.
pub fn decode_block(xml: &str) -> Result<Block, DecodeError> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let root = doc.root_element();
    match (root.tag_name().namespace(), root.tag_name().name()) {
        (Some(DIAGRAM_NAMESPACE), DIAGRAM_ROOT) => decode_record(root).map(Block::Diagram),
        (Some(SETTINGS_NAMESPACE), SETTINGS_ROOT) => Ok(Block::Settings(decode_settings(root))),
        _ => Err(DecodeError::Foreign),
    }
}

fn decode_record(root: roxmltree::Node<'_, '_>) -> Result<DiagramRecord, DecodeError> {
    let id = child(root, "Id").map(text_of).unwrap_or_default().trim().to_string();
    if id.is_empty() {
        return Err(DecodeError::Malformed("missing Id".into()));
    }

    let code_node = child(root, "Code").ok_or_else(|| DecodeError::Malformed("missing Code".into()))?;
    let source_code = match code_node.attribute("encoding") {
        None => text_of(code_node),
        Some("base64") => {
            let bytes = BASE64
                .decode(text_of(code_node).trim())
                .map_err(|e| DecodeError::Malformed(format!("Code: {e}")))?;
            String::from_utf8(bytes).map_err(|e| DecodeError::Malformed(format!("Code: {e}")))?
        }
        Some(other) => return Err(DecodeError::Malformed(format!("unknown Code encoding {other}"))),
    };

    let created_at = timestamp(root, "CreatedAt")?.ok_or_else(|| DecodeError::Malformed("missing CreatedAt".into()))?;
    let updated_at = timestamp(root, "UpdatedAt")?.unwrap_or(created_at);

    let shape_tagged = match child(root, "ShapeTagged").map(text_of) {
        None => false,
        Some(raw) => match raw.trim() {
            "true" => true,
            "false" => false,
            other => return Err(DecodeError::Malformed(format!("ShapeTagged: {other}"))),
        },
    };

    let geometry_hint = child(root, "ShapeInfo").and_then(|node| {
        let attr = |name: &str| node.attribute(name).and_then(|v| v.trim().parse::<f64>().ok());
        Some(Geometry::new(attr("left")?, attr("top")?, attr("width")?, attr("height")?))
    });

    Ok(DiagramRecord { id, source_code, created_at, updated_at, shape_tagged, geometry_hint })
}

/// Settings decode leniently: every missing or invalid field keeps its default.
fn decode_settings(root: roxmltree::Node<'_, '_>) -> Settings {
    let mut settings = Settings::default();
    if let Some(theme) = child(root, "theme").and_then(|n| text_of(n).parse::<Theme>().ok()) {
        settings.theme = theme;
    }
    if let Some(family) = child(root, "fontFamily").map(text_of) {
        if !family.trim().is_empty() {
            settings.font_family = family;
        }
    }
    if let Some(size) = child(root, "fontSize").and_then(|n| text_of(n).trim().parse::<u32>().ok()) {
        settings.font_size = size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
    }
    for key in COLOR_KEYS {
        if let Some(value) = child(root, key).map(text_of) {
            let value = value.trim();
            if !value.is_empty() {
                settings.colors.set(key, value);
            }
        }
    }
    settings
}

fn child<'a, 'input>(node: roxmltree::Node<'a, 'input>, name: &str) -> Option<roxmltree::Node<'a, 'input>> {
    node.children().find(|n| n.is_element() && n.tag_name().name() == name)
}

fn text_of(node: roxmltree::Node<'_, '_>) -> String {
    node.children().filter(roxmltree::Node::is_text).filter_map(|n| n.text()).collect()
}

fn timestamp(root: roxmltree::Node<'_, '_>, name: &str) -> Result<Option<OffsetDateTime>, DecodeError> {
    let Some(raw) = child(root, name).map(text_of) else {
        return Ok(None);
    };
    OffsetDateTime::parse(raw.trim(), &Rfc3339)
        .map(Some)
        .map_err(|e| DecodeError::Malformed(format!("{name}: {e}")))
}

#[cfg(test)]
#[path = "codec_test.rs"]
mod tests;
