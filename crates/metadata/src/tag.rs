//! Minimal tag-based surface format.
//!
//! The document is rooted at `<ContentMetadata>` and carries the same
//! four members as the object format. Field elements may declare an
//! explicit value type (`type="bool|number|timestamp|null"`) or an
//! attachment reference (`attachment="file"`); untyped text falls back to
//! the same string/timestamp coercion the object format applies.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use model::{FieldValue, PermissionEntry, PermissionInfo, Result, TransferError};

use crate::Metadata;

fn parse_error(path: &str, message: impl Into<String>) -> TransferError {
    TransferError::MetadataParse {
        format: "tag",
        path: path.to_string(),
        message: message.into(),
    }
}

/// Parses a tag-format document.
pub(crate) fn parse_tag(text: &str, path: &str) -> Result<Metadata> {
    let mut scanner = Scanner::new(text, path);
    let root = scanner.expect_open_tag()?;
    if root.name != "ContentMetadata" {
        return Err(parse_error(
            path,
            format!("expected <ContentMetadata> root, found <{}>", root.name),
        ));
    }
    if root.self_closing {
        return Err(parse_error(path, "missing ContentType element"));
    }

    let mut metadata = Metadata::default();
    let mut saw_type = false;

    loop {
        match scanner.next_event()? {
            Event::Close(name) if name == "ContentMetadata" => break,
            Event::Close(name) => {
                return Err(parse_error(path, format!("unexpected </{name}>")));
            }
            Event::Open(tag) => match tag.name.as_str() {
                "ContentType" => {
                    metadata.type_name = scanner.element_text(&tag)?;
                    saw_type = true;
                }
                "ContentName" => {
                    metadata.name = Some(scanner.element_text(&tag)?);
                }
                "Fields" => {
                    metadata.fields = parse_fields(&mut scanner, &tag)?;
                }
                "Permissions" => {
                    metadata.permissions = Some(parse_permissions(&mut scanner, &tag)?);
                }
                other => {
                    return Err(parse_error(path, format!("unexpected element <{other}>")));
                }
            },
            Event::End => {
                return Err(parse_error(path, "unterminated <ContentMetadata>"));
            }
        }
    }

    if !saw_type {
        return Err(parse_error(path, "missing ContentType element"));
    }
    Ok(metadata)
}

fn parse_fields(scanner: &mut Scanner<'_>, fields_tag: &Tag) -> Result<IndexMap<String, FieldValue>> {
    let mut fields = IndexMap::new();
    if fields_tag.self_closing {
        return Ok(fields);
    }
    loop {
        match scanner.next_event()? {
            Event::Close(name) if name == "Fields" => return Ok(fields),
            Event::Open(tag) => {
                let value = parse_field(scanner, &tag)?;
                fields.insert(tag.name.clone(), value);
            }
            Event::Close(name) => {
                return Err(parse_error(scanner.path, format!("unexpected </{name}> in Fields")));
            }
            Event::End => {
                return Err(parse_error(scanner.path, "unterminated <Fields>"));
            }
        }
    }
}

fn parse_field(scanner: &mut Scanner<'_>, tag: &Tag) -> Result<FieldValue> {
    if let Some(file) = tag.attr("attachment") {
        if !tag.self_closing {
            scanner.element_text(tag)?;
        }
        return Ok(FieldValue::Attachment(file.to_string()));
    }

    let declared = tag.attr("type").map(str::to_string);
    if tag.self_closing {
        return match declared.as_deref() {
            None | Some("null") => Ok(FieldValue::Null),
            Some(other) => Err(parse_error(
                scanner.path,
                format!("self-closing field '{}' cannot carry type '{other}'", tag.name),
            )),
        };
    }

    let text = scanner.element_text(tag)?;
    match declared.as_deref() {
        None => Ok(coerce_text(&text)),
        Some("null") => Ok(FieldValue::Null),
        Some("bool") => text.parse::<bool>().map(FieldValue::Bool).map_err(|_| {
            parse_error(scanner.path, format!("field '{}' is not a boolean", tag.name))
        }),
        Some("number") => text.parse::<f64>().map(FieldValue::Number).map_err(|_| {
            parse_error(scanner.path, format!("field '{}' is not a number", tag.name))
        }),
        Some("timestamp") => DateTime::parse_from_rfc3339(&text)
            .map(|instant| FieldValue::Timestamp(instant.with_timezone(&Utc)))
            .map_err(|_| {
                parse_error(scanner.path, format!("field '{}' is not a timestamp", tag.name))
            }),
        Some(other) => Err(parse_error(
            scanner.path,
            format!("field '{}' declares unknown type '{other}'", tag.name),
        )),
    }
}

fn coerce_text(text: &str) -> FieldValue {
    match DateTime::parse_from_rfc3339(text) {
        Ok(instant) => FieldValue::Timestamp(instant.with_timezone(&Utc)),
        Err(_) => FieldValue::String(text.to_string()),
    }
}

fn parse_permissions(scanner: &mut Scanner<'_>, tag: &Tag) -> Result<PermissionInfo> {
    let is_inherited = match tag.attr("inherited") {
        Some(raw) => raw.parse::<bool>().map_err(|_| {
            parse_error(scanner.path, "inherited attribute must be a boolean")
        })?,
        None => true,
    };
    let mut entries = Vec::new();
    if tag.self_closing {
        return Ok(PermissionInfo { is_inherited, entries });
    }

    loop {
        match scanner.next_event()? {
            Event::Close(name) if name == "Permissions" => {
                return Ok(PermissionInfo { is_inherited, entries });
            }
            Event::Open(entry_tag) if entry_tag.name == "Entry" => {
                entries.push(parse_entry(scanner, &entry_tag)?);
            }
            Event::Open(tag) => {
                return Err(parse_error(
                    scanner.path,
                    format!("unexpected element <{}> in Permissions", tag.name),
                ));
            }
            Event::Close(name) => {
                return Err(parse_error(
                    scanner.path,
                    format!("unexpected </{name}> in Permissions"),
                ));
            }
            Event::End => {
                return Err(parse_error(scanner.path, "unterminated <Permissions>"));
            }
        }
    }
}

fn parse_entry(scanner: &mut Scanner<'_>, tag: &Tag) -> Result<PermissionEntry> {
    let identity = tag
        .attr("identity")
        .ok_or_else(|| parse_error(scanner.path, "Entry is missing identity attribute"))?
        .to_string();
    let local_only = match tag.attr("localOnly") {
        Some(raw) => raw
            .parse::<bool>()
            .map_err(|_| parse_error(scanner.path, "localOnly attribute must be a boolean"))?,
        None => false,
    };

    let mut permissions = BTreeMap::new();
    if !tag.self_closing {
        loop {
            match scanner.next_event()? {
                Event::Close(name) if name == "Entry" => break,
                Event::Open(permission) => {
                    let setting = scanner.element_text(&permission)?;
                    permissions.insert(permission.name.clone(), setting);
                }
                Event::Close(name) => {
                    return Err(parse_error(
                        scanner.path,
                        format!("unexpected </{name}> in Entry"),
                    ));
                }
                Event::End => {
                    return Err(parse_error(scanner.path, "unterminated <Entry>"));
                }
            }
        }
    }

    Ok(PermissionEntry {
        identity,
        local_only,
        permissions,
    })
}

/// Renders `metadata` as a tag-format document.
#[must_use]
pub fn render_tag(metadata: &Metadata) -> String {
    let mut out = String::from("<ContentMetadata>\n");
    let _ = writeln!(out, "  <ContentType>{}</ContentType>", escape(&metadata.type_name));
    if let Some(name) = &metadata.name {
        let _ = writeln!(out, "  <ContentName>{}</ContentName>", escape(name));
    }

    if !metadata.fields.is_empty() {
        out.push_str("  <Fields>\n");
        for (field, value) in &metadata.fields {
            render_field(&mut out, field, value);
        }
        out.push_str("  </Fields>\n");
    }

    if let Some(permissions) = &metadata.permissions {
        let _ = writeln!(
            out,
            "  <Permissions inherited=\"{}\">",
            permissions.is_inherited
        );
        for entry in &permissions.entries {
            let _ = writeln!(
                out,
                "    <Entry identity=\"{}\" localOnly=\"{}\">",
                escape(&entry.identity),
                entry.local_only
            );
            for (permission, setting) in &entry.permissions {
                let _ = writeln!(
                    out,
                    "      <{permission}>{}</{permission}>",
                    escape(setting)
                );
            }
            out.push_str("    </Entry>\n");
        }
        out.push_str("  </Permissions>\n");
    }

    out.push_str("</ContentMetadata>\n");
    out
}

fn render_field(out: &mut String, field: &str, value: &FieldValue) {
    let line = match value {
        FieldValue::Null => format!("    <{field} type=\"null\"/>"),
        FieldValue::Bool(flag) => format!("    <{field} type=\"bool\">{flag}</{field}>"),
        FieldValue::Number(number) => format!("    <{field} type=\"number\">{number}</{field}>"),
        FieldValue::String(text) => format!("    <{field}>{}</{field}>", escape(text)),
        FieldValue::Timestamp(instant) => format!(
            "    <{field} type=\"timestamp\">{}</{field}>",
            instant.to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
        FieldValue::Attachment(file) => {
            format!("    <{field} attachment=\"{}\"/>", escape(file))
        }
    };
    out.push_str(&line);
    out.push('\n');
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

/// One structural step through the document.
enum Event {
    Open(Tag),
    Close(String),
    End,
}

struct Tag {
    name: String,
    attrs: Vec<(String, String)>,
    self_closing: bool,
}

impl Tag {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.as_str())
    }
}

struct Scanner<'a> {
    text: &'a str,
    pos: usize,
    path: &'a str,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str, path: &'a str) -> Self {
        Self { text, pos: 0, path }
    }

    fn error(&self, message: impl Into<String>) -> TransferError {
        parse_error(self.path, message)
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.text[self.pos..];
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
    }

    fn next_event(&mut self) -> Result<Event> {
        self.skip_whitespace();
        if self.pos >= self.text.len() {
            return Ok(Event::End);
        }
        if !self.text[self.pos..].starts_with('<') {
            return Err(self.error("expected a tag"));
        }
        if self.text[self.pos..].starts_with("</") {
            let end = self.text[self.pos..]
                .find('>')
                .ok_or_else(|| self.error("unterminated closing tag"))?;
            let name = self.text[self.pos + 2..self.pos + end].trim().to_string();
            self.pos += end + 1;
            return Ok(Event::Close(name));
        }
        self.expect_open_tag().map(Event::Open)
    }

    fn expect_open_tag(&mut self) -> Result<Tag> {
        self.skip_whitespace();
        if !self.text[self.pos..].starts_with('<') {
            return Err(self.error("expected an opening tag"));
        }
        let end = self.text[self.pos..]
            .find('>')
            .ok_or_else(|| self.error("unterminated tag"))?;
        let raw = &self.text[self.pos + 1..self.pos + end];
        self.pos += end + 1;

        let (raw, self_closing) = match raw.strip_suffix('/') {
            Some(stripped) => (stripped, true),
            None => (raw, false),
        };

        let mut parts = raw.trim().splitn(2, char::is_whitespace);
        let name = parts
            .next()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| self.error("tag is missing a name"))?
            .to_string();
        let attrs = match parts.next() {
            Some(rest) => parse_attrs(rest).map_err(|message| self.error(message))?,
            None => Vec::new(),
        };

        Ok(Tag {
            name,
            attrs,
            self_closing,
        })
    }

    /// Reads the text content of `tag` and its matching closing tag.
    fn element_text(&mut self, tag: &Tag) -> Result<String> {
        if tag.self_closing {
            return Ok(String::new());
        }
        let rest = &self.text[self.pos..];
        let end = rest
            .find('<')
            .ok_or_else(|| self.error(format!("unterminated <{}>", tag.name)))?;
        let text = unescape(&rest[..end]);
        self.pos += end;
        match self.next_event()? {
            Event::Close(name) if name == tag.name => Ok(text),
            _ => Err(self.error(format!("expected </{}>", tag.name))),
        }
    }
}

fn parse_attrs(raw: &str) -> std::result::Result<Vec<(String, String)>, String> {
    let mut attrs = Vec::new();
    let mut rest = raw.trim();
    while !rest.is_empty() {
        let eq = rest
            .find('=')
            .ok_or_else(|| format!("attribute without value in '{raw}'"))?;
        let name = rest[..eq].trim().to_string();
        let after = rest[eq + 1..].trim_start();
        let Some(stripped) = after.strip_prefix('"') else {
            return Err(format!("attribute '{name}' value must be quoted"));
        };
        let close = stripped
            .find('"')
            .ok_or_else(|| format!("unterminated value for attribute '{name}'"))?;
        attrs.push((name, unescape(&stripped[..close])));
        rest = stripped[close + 1..].trim_start();
    }
    Ok(attrs)
}
