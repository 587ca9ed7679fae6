//! JSON object surface format.

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use model::{FieldValue, PermissionEntry, PermissionInfo, Result, TransferError};
use serde_json::{Map, Value, json};

use crate::Metadata;

fn parse_error(path: &str, message: impl Into<String>) -> TransferError {
    TransferError::MetadataParse {
        format: "object",
        path: path.to_string(),
        message: message.into(),
    }
}

/// Parses an object-format document.
pub(crate) fn parse_object(text: &str, path: &str) -> Result<Metadata> {
    let value: Value = serde_json::from_str(text)
        .map_err(|error| parse_error(path, error.to_string()))?;
    let Value::Object(root) = value else {
        return Err(parse_error(path, "expected a JSON object at the document root"));
    };

    let type_name = match root.get("ContentType") {
        Some(Value::String(name)) => name.clone(),
        Some(_) => return Err(parse_error(path, "ContentType must be a string")),
        None => return Err(parse_error(path, "missing ContentType member")),
    };

    let name = match root.get("ContentName") {
        Some(Value::String(name)) => Some(name.clone()),
        Some(Value::Null) | None => None,
        Some(_) => return Err(parse_error(path, "ContentName must be a string")),
    };

    let mut fields = IndexMap::new();
    if let Some(raw) = root.get("Fields") {
        let Value::Object(members) = raw else {
            return Err(parse_error(path, "Fields must be an object"));
        };
        for (field, value) in members {
            fields.insert(field.clone(), parse_field_value(value, field, path)?);
        }
    }

    let permissions = match root.get("Permissions") {
        Some(Value::Null) | None => None,
        Some(raw) => Some(parse_permissions(raw, path)?),
    };

    Ok(Metadata {
        type_name,
        name,
        fields,
        permissions,
    })
}

fn parse_field_value(value: &Value, field: &str, path: &str) -> Result<FieldValue> {
    match value {
        Value::Null => Ok(FieldValue::Null),
        Value::Bool(flag) => Ok(FieldValue::Bool(*flag)),
        Value::Number(number) => number
            .as_f64()
            .map(FieldValue::Number)
            .ok_or_else(|| parse_error(path, format!("field '{field}' has a non-finite number"))),
        Value::String(text) => Ok(coerce_string(text)),
        Value::Object(members) => match members.get("Attachment") {
            Some(Value::String(file)) => Ok(FieldValue::Attachment(file.clone())),
            _ => Err(parse_error(
                path,
                format!("field '{field}' object must be an attachment reference"),
            )),
        },
        Value::Array(_) => Err(parse_error(
            path,
            format!("field '{field}' must be a scalar or attachment reference"),
        )),
    }
}

/// Strings that parse fully as RFC 3339 become timestamps; everything
/// else stays text.
fn coerce_string(text: &str) -> FieldValue {
    match DateTime::parse_from_rfc3339(text) {
        Ok(instant) => FieldValue::Timestamp(instant.with_timezone(&Utc)),
        Err(_) => FieldValue::String(text.to_string()),
    }
}

fn parse_permissions(raw: &Value, path: &str) -> Result<PermissionInfo> {
    let Value::Object(members) = raw else {
        return Err(parse_error(path, "Permissions must be an object"));
    };

    let is_inherited = match members.get("IsInherited") {
        Some(Value::Bool(flag)) => *flag,
        None => true,
        Some(_) => return Err(parse_error(path, "IsInherited must be a boolean")),
    };

    let mut entries = Vec::new();
    if let Some(raw_entries) = members.get("Entries") {
        let Value::Array(items) = raw_entries else {
            return Err(parse_error(path, "Entries must be an array"));
        };
        for item in items {
            entries.push(parse_permission_entry(item, path)?);
        }
    }

    Ok(PermissionInfo {
        is_inherited,
        entries,
    })
}

fn parse_permission_entry(raw: &Value, path: &str) -> Result<PermissionEntry> {
    let Value::Object(members) = raw else {
        return Err(parse_error(path, "permission entry must be an object"));
    };

    let identity = match members.get("Identity") {
        Some(Value::String(identity)) => identity.clone(),
        _ => return Err(parse_error(path, "permission entry is missing Identity")),
    };
    let local_only = match members.get("LocalOnly") {
        Some(Value::Bool(flag)) => *flag,
        None => false,
        Some(_) => return Err(parse_error(path, "LocalOnly must be a boolean")),
    };

    let mut permissions = std::collections::BTreeMap::new();
    if let Some(raw_map) = members.get("Permissions") {
        let Value::Object(map) = raw_map else {
            return Err(parse_error(path, "entry Permissions must be an object"));
        };
        for (permission, value) in map {
            let Value::String(setting) = value else {
                return Err(parse_error(
                    path,
                    format!("permission '{permission}' must map to a string"),
                ));
            };
            permissions.insert(permission.clone(), setting.clone());
        }
    }

    Ok(PermissionEntry {
        identity,
        local_only,
        permissions,
    })
}

/// Renders `metadata` as an object-format document.
#[must_use]
pub fn render_object(metadata: &Metadata) -> String {
    let mut root = Map::new();
    root.insert("ContentType".into(), Value::String(metadata.type_name.clone()));
    if let Some(name) = &metadata.name {
        root.insert("ContentName".into(), Value::String(name.clone()));
    }

    if !metadata.fields.is_empty() {
        let mut fields = Map::new();
        for (field, value) in &metadata.fields {
            fields.insert(field.clone(), render_field_value(value));
        }
        root.insert("Fields".into(), Value::Object(fields));
    }

    if let Some(permissions) = &metadata.permissions {
        root.insert("Permissions".into(), render_permissions(permissions));
    }

    // Pretty output keeps the files reviewable in version control.
    serde_json::to_string_pretty(&Value::Object(root)).unwrap_or_default()
}

fn render_field_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Bool(flag) => Value::Bool(*flag),
        FieldValue::Number(number) => serde_json::Number::from_f64(*number)
            .map_or(Value::Null, Value::Number),
        FieldValue::String(text) => Value::String(text.clone()),
        FieldValue::Timestamp(instant) => {
            Value::String(instant.to_rfc3339_opts(SecondsFormat::Secs, true))
        }
        FieldValue::Attachment(file) => json!({ "Attachment": file }),
    }
}

fn render_permissions(permissions: &PermissionInfo) -> Value {
    let entries: Vec<Value> = permissions
        .entries
        .iter()
        .map(|entry| {
            json!({
                "Identity": entry.identity,
                "LocalOnly": entry.local_only,
                "Permissions": entry.permissions,
            })
        })
        .collect();
    json!({
        "IsInherited": permissions.is_inherited,
        "Entries": entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_content_type_is_rejected() {
        let error = parse_object("{ \"Fields\": {} }", "a.Content").unwrap_err();
        assert!(error.to_string().contains("ContentType"));
    }

    #[test]
    fn malformed_json_names_the_object_format() {
        let error = parse_object("{ not json", "a.Content").unwrap_err();
        assert!(error.to_string().contains("object"));
        assert!(error.to_string().contains("a.Content"));
    }

    #[test]
    fn rfc3339_strings_become_timestamps() {
        let parsed = parse_object(
            r#"{ "ContentType": "File", "Fields": { "ValidFrom": "2024-03-01T10:00:00Z", "Plain": "text" } }"#,
            "x",
        )
        .unwrap();
        assert!(matches!(
            parsed.fields.get("ValidFrom"),
            Some(FieldValue::Timestamp(_))
        ));
        assert!(matches!(
            parsed.fields.get("Plain"),
            Some(FieldValue::String(_))
        ));
    }

    #[test]
    fn field_order_is_preserved() {
        let parsed = parse_object(
            r#"{ "ContentType": "File", "Fields": { "Zeta": 1, "Alpha": 2, "Mid": 3 } }"#,
            "x",
        )
        .unwrap();
        let names: Vec<_> = parsed.fields.keys().cloned().collect();
        assert_eq!(names, vec!["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn arrays_are_rejected_with_field_name() {
        let error = parse_object(
            r#"{ "ContentType": "File", "Fields": { "Broken": [1, 2] } }"#,
            "x",
        )
        .unwrap_err();
        assert!(error.to_string().contains("Broken"));
    }
}
