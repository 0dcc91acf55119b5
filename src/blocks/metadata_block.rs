//! MDBLOCK: XML metadata attached to header, groups, channels and events.
//!
//! The XML body is treated as opaque text. The property accessors below do a
//! plain tag scan for the `<common_properties>` entries the standard tools
//! write (`<e name="...">value</e>`), which is what the original viewer does
//! as well; full schema validation is out of scope.

use crate::blocks::common::{
    padding_to_align_8, validate_buffer_size, BlockHeader, BlockParse,
};
use crate::error::MdfError;

/// Value type of a common-properties entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
}

impl PropertyType {
    fn as_xml(&self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Integer => "integer",
            PropertyType::Float => "float",
            PropertyType::Boolean => "boolean",
            PropertyType::DateTime => "datetime",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetadataBlock {
    pub header: BlockHeader,
    pub xml: String,
}

impl BlockParse<'_> for MetadataBlock {
    const ID: &'static str = "##MD";

    fn from_bytes(bytes: &[u8]) -> Result<Self, MdfError> {
        let header = Self::parse_header(bytes)?;

        let data_len = (header.block_len as usize).saturating_sub(24);
        validate_buffer_size(bytes, 24 + data_len)?;
        let data = &bytes[24..24 + data_len];

        let xml = String::from_utf8_lossy(data).trim_matches('\0').to_string();
        Ok(Self { header, xml })
    }
}

impl MetadataBlock {
    /// Wrap an XML body in an MDBLOCK sized to the next 8-byte boundary.
    pub fn new(xml: &str) -> Self {
        let unpadded = 24 + xml.len() + 1;
        let block_len = (unpadded + padding_to_align_8(unpadded)) as u64;
        MetadataBlock {
            header: BlockHeader::new("##MD", block_len, 0),
            xml: String::from(xml),
        }
    }

    /// Build a comment body with a `<common_properties>` section, e.g. for
    /// the HD block: root tag "HDcomment", entries author/department/….
    pub fn with_common_properties(
        root_tag: &str,
        comment: &str,
        entries: &[(&str, &str, PropertyType)],
    ) -> Self {
        let mut xml = String::new();
        xml.push_str(&format!("<{}>", root_tag));
        xml.push_str(&format!("<TX>{}</TX>", escape_xml(comment)));
        if !entries.is_empty() {
            xml.push_str("<common_properties>");
            for (name, value, ty) in entries {
                xml.push_str(&format!(
                    r#"<e name="{}" type="{}">{}</e>"#,
                    escape_xml(name),
                    ty.as_xml(),
                    escape_xml(value)
                ));
            }
            xml.push_str("</common_properties>");
        }
        xml.push_str(&format!("</{}>", root_tag));
        Self::new(&xml)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MdfError> {
        let unpadded = 24 + self.xml.len() + 1;
        let total_size = unpadded + padding_to_align_8(unpadded);
        if self.header.block_len as usize != total_size {
            return Err(MdfError::BlockSerializationError(format!(
                "MetadataBlock header length {} does not match computed size {}",
                self.header.block_len, total_size
            )));
        }

        let mut buffer = Vec::with_capacity(total_size);
        buffer.extend_from_slice(&self.header.to_bytes()?);
        buffer.extend_from_slice(self.xml.as_bytes());
        buffer.resize(total_size, 0);
        Ok(buffer)
    }

    /// The `<TX>` comment text, if present.
    pub fn comment_text(&self) -> Option<String> {
        extract_tag_body(&self.xml, "TX").map(unescape_xml)
    }

    /// Look up a `<common_properties>` entry by name.
    pub fn get_string_property(&self, key: &str) -> Option<String> {
        let needle = format!(r#"name="{}""#, escape_xml(key));
        let start = self.xml.find(&needle)?;
        let rest = &self.xml[start..];
        let open_end = rest.find('>')?;
        let after = &rest[open_end + 1..];
        // Self-closing entry carries no value.
        if rest[..open_end].ends_with('/') {
            return Some(String::new());
        }
        let close = after.find("</e>")?;
        Some(unescape_xml(&after[..close]))
    }

    pub fn get_float_property(&self, key: &str) -> Option<f64> {
        self.get_string_property(key)?.trim().parse::<f64>().ok()
    }

    /// Insert or replace a `<common_properties>` entry.
    pub fn set_string_property(&mut self, key: &str, value: &str) {
        let entry = format!(
            r#"<e name="{}" type="string">{}</e>"#,
            escape_xml(key),
            escape_xml(value)
        );
        let needle = format!(r#"name="{}""#, escape_xml(key));
        if let Some(start) = self.xml.find(&needle) {
            // Replace the whole existing <e ...>...</e> element.
            if let Some(open) = self.xml[..start].rfind("<e ") {
                if let Some(rel_close) = self.xml[open..].find("</e>") {
                    self.xml.replace_range(open..open + rel_close + 4, &entry);
                    self.resize_header();
                    return;
                }
            }
        }
        if let Some(pos) = self.xml.find("</common_properties>") {
            self.xml.insert_str(pos, &entry);
        } else if let Some(pos) = self.xml.rfind("</") {
            self.xml
                .insert_str(pos, &format!("<common_properties>{}</common_properties>", entry));
        } else {
            self.xml
                .push_str(&format!("<common_properties>{}</common_properties>", entry));
        }
        self.resize_header();
    }

    fn resize_header(&mut self) {
        let unpadded = 24 + self.xml.len() + 1;
        self.header.block_len = (unpadded + padding_to_align_8(unpadded)) as u64;
    }
}

fn extract_tag_body<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(&xml[start..end])
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_properties_roundtrip() {
        let md = MetadataBlock::with_common_properties(
            "HDcomment",
            "bench run",
            &[
                ("author", "lab", PropertyType::String),
                ("recorder.index", "3", PropertyType::Integer),
            ],
        );
        assert_eq!(md.comment_text().as_deref(), Some("bench run"));
        assert_eq!(md.get_string_property("author").as_deref(), Some("lab"));
        assert_eq!(md.get_float_property("recorder.index"), Some(3.0));
        assert_eq!(md.get_string_property("missing"), None);
    }

    #[test]
    fn set_property_replaces_existing() {
        let mut md = MetadataBlock::with_common_properties(
            "HDcomment",
            "",
            &[("author", "a", PropertyType::String)],
        );
        md.set_string_property("author", "b");
        assert_eq!(md.get_string_property("author").as_deref(), Some("b"));
        md.set_string_property("project", "p1");
        assert_eq!(md.get_string_property("project").as_deref(), Some("p1"));
        assert_eq!(md.header.block_len % 8, 0);
    }
}
