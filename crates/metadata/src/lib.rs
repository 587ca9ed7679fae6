#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `metadata` converts between metadata text and the content-item shape
//! used across the treeflow workspace. Two concrete surface formats are
//! supported, both expressing exactly: a content type, an optional name
//! override, a flat field map, and an optional permission block.
//!
//! - The **object format**: a JSON object with `ContentType`,
//!   `ContentName`, `Fields`, and `Permissions` members.
//! - The **tag format**: a minimal tag-based document rooted at
//!   `<ContentMetadata>` with the same four members as child elements.
//!
//! # Design
//!
//! The format is detected from the first non-whitespace character: `{`
//! selects the object format, `<` selects the tag format. Parsing empty
//! or whitespace-only input yields `None` rather than an error; malformed
//! non-empty input of a recognized format raises a parse error naming the
//! detected format.
//!
//! # Examples
//!
//! ```
//! use metadata::parse;
//!
//! let text = r#"{ "ContentType": "Folder", "Fields": { "Index": 4 } }"#;
//! let parsed = parse(text, "Root/F1.Content").unwrap().unwrap();
//! assert_eq!(parsed.type_name, "Folder");
//! assert!(parsed.name.is_none());
//!
//! assert!(parse("   \n", "empty.Content").unwrap().is_none());
//! ```

mod object;
mod tag;

use indexmap::IndexMap;
use model::{FieldValue, PermissionInfo, Result, TransferError};

pub use object::render_object;
pub use tag::render_tag;

/// Which surface format a metadata document uses.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MetadataFormat {
    /// JSON object document.
    #[default]
    Object,
    /// Minimal tag-based document.
    Tag,
}

impl MetadataFormat {
    /// Short format name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Tag => "tag",
        }
    }

    /// File content rendered in this format for `metadata`.
    #[must_use]
    pub fn render(self, metadata: &Metadata) -> String {
        match self {
            Self::Object => render_object(metadata),
            Self::Tag => render_tag(metadata),
        }
    }
}

/// The content-item shape expressed by a metadata document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    /// Content type name.
    pub type_name: String,
    /// Optional name override; the file or directory name applies when absent.
    pub name: Option<String>,
    /// Flat, insertion-ordered field map.
    pub fields: IndexMap<String, FieldValue>,
    /// Optional permission block.
    pub permissions: Option<PermissionInfo>,
}

impl Metadata {
    /// Iterates the field-name → attachment-file-name pairs declared in
    /// the field map, used to resolve attachment streams lazily.
    pub fn attachment_table(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().filter_map(|(field, value)| {
            value.attachment_name().map(|file| (field.as_str(), file))
        })
    }
}

/// Parses metadata text into its content-item shape.
///
/// Returns `Ok(None)` for empty or whitespace-only input. `path` is used
/// only for diagnostics.
pub fn parse(text: &str, path: &str) -> Result<Option<Metadata>> {
    let trimmed = text.trim_start();
    match trimmed.chars().next() {
        None => Ok(None),
        Some('{') => object::parse_object(text, path).map(Some),
        Some('<') => tag::parse_tag(text, path).map(Some),
        Some(other) => Err(TransferError::MetadataParse {
            format: "unknown",
            path: path.to_string(),
            message: format!("unrecognized leading character '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_whitespace_input_parse_to_none() {
        assert!(parse("", "x").unwrap().is_none());
        assert!(parse(" \t\r\n", "x").unwrap().is_none());
    }

    #[test]
    fn unrecognized_leading_character_is_an_error() {
        let error = parse("hello", "x").unwrap_err();
        assert!(error.to_string().contains("unknown"));
    }

    #[test]
    fn format_is_detected_from_first_character() {
        let object = parse("{ \"ContentType\": \"File\" }", "x").unwrap().unwrap();
        assert_eq!(object.type_name, "File");

        let tag = parse(
            "<ContentMetadata><ContentType>File</ContentType></ContentMetadata>",
            "x",
        )
        .unwrap()
        .unwrap();
        assert_eq!(tag.type_name, "File");
    }

    #[test]
    fn attachment_table_lists_declared_attachments() {
        let text = r#"{
            "ContentType": "File",
            "Fields": { "Binary": { "Attachment": "logo.png" }, "Index": 1 }
        }"#;
        let parsed = parse(text, "x").unwrap().unwrap();
        let table: Vec<_> = parsed.attachment_table().collect();
        assert_eq!(table, vec![("Binary", "logo.png")]);
    }

    #[test]
    fn both_formats_round_trip() {
        let text = r#"{
            "ContentType": "Workspace",
            "ContentName": "Renamed",
            "Fields": {
                "Description": "hello",
                "Index": 2,
                "Active": true,
                "Nothing": null,
                "ValidFrom": "2024-03-01T10:00:00Z",
                "Binary": { "Attachment": "data.bin" }
            },
            "Permissions": {
                "IsInherited": false,
                "Entries": [
                    { "Identity": "/IMS/Editors", "LocalOnly": true,
                      "Permissions": { "Open": "allow", "Save": "deny" } }
                ]
            }
        }"#;
        let parsed = parse(text, "x").unwrap().unwrap();

        let object = MetadataFormat::Object.render(&parsed);
        let reparsed = parse(&object, "x").unwrap().unwrap();
        assert_eq!(reparsed, parsed);

        let tag = MetadataFormat::Tag.render(&parsed);
        let reparsed = parse(&tag, "x").unwrap().unwrap();
        assert_eq!(reparsed, parsed);
    }
}
