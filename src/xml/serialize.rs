//! XML request body serialization for Azure Blob Storage API.

use crate::models::{BlockType, SignedIdentifier};
use crate::request::format_iso8601;

/// Escapes special XML characters.
pub fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Serializes a Put Block List request body.
pub fn serialize_block_list(blocks: &[(BlockType, String)]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push_str("<BlockList>");
    for (block_type, id) in blocks {
        let tag = block_type.as_str();
        xml.push_str(&format!("<{}>{}</{}>", tag, xml_escape(id), tag));
    }
    xml.push_str("</BlockList>");
    xml
}

/// Serializes signed identifiers (access policy) to XML.
pub fn serialize_signed_identifiers(identifiers: &[SignedIdentifier]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push_str("<SignedIdentifiers>");
    for id in identifiers {
        xml.push_str("<SignedIdentifier>");
        xml.push_str(&format!("<Id>{}</Id>", xml_escape(&id.id)));
        xml.push_str("<AccessPolicy>");
        if let Some(ref start) = id.access_policy.start {
            xml.push_str(&format!("<Start>{}</Start>", format_iso8601(start)));
        }
        if let Some(ref expiry) = id.access_policy.expiry {
            xml.push_str(&format!("<Expiry>{}</Expiry>", format_iso8601(expiry)));
        }
        xml.push_str(&format!(
            "<Permission>{}</Permission>",
            xml_escape(&id.access_policy.permission)
        ));
        xml.push_str("</AccessPolicy>");
        xml.push_str("</SignedIdentifier>");
    }
    xml.push_str("</SignedIdentifiers>");
    xml
}
