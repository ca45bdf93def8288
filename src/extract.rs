//! Field extraction: resolves a dotted field locator against a decoded JSON
//! document and yields the scalar values found there, in document order.
//!
//! A locator segment prefixed with `[]` asserts the current value is a list
//! and applies the rest of the locator to every element, so `Users.[]Name`
//! collects the `Name` of each entry of the `Users` list, and `[]Users.Name`
//! does the same when the document root itself is the list.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// The scalar kind of an extracted value. An index discovers its kind from
/// the first value it sees and rejects documents that produce another kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
}

impl Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FieldType::String => write!(f, "string"),
            FieldType::Integer => write!(f, "integer"),
            FieldType::Float => write!(f, "float"),
        }
    }
}

/// Resolves `field_locator` against `doc` and returns the located scalars as
/// canonical strings with their kinds, possibly none. Absent or null fields
/// yield nothing; applying `[]` to a non-list or locating a list, map, or
/// boolean at a leaf is a type error.
pub fn extract(doc: &Value, field_locator: &str) -> Result<Vec<(String, FieldType)>> {
    let segments: Vec<&str> = field_locator.split('.').collect();
    let mut out = Vec::new();
    walk(doc, &segments, field_locator, &mut out)?;
    Ok(out)
}

fn walk(
    value: &Value,
    segments: &[&str],
    locator: &str,
    out: &mut Vec<(String, FieldType)>,
) -> Result<()> {
    let Some((segment, rest)) = segments.split_first() else {
        return leaf(value, locator, out);
    };

    if let Some(name) = segment.strip_prefix("[]") {
        let Value::Array(elements) = value else {
            return Err(Error::Type(format!(
                "segment []{name} of locator {locator} expects a list, got {}",
                kind_name(value)
            )));
        };
        let mut remainder = Vec::with_capacity(rest.len() + 1);
        if !name.is_empty() {
            remainder.push(name);
        }
        remainder.extend_from_slice(rest);
        for element in elements {
            walk(element, &remainder, locator, out)?;
        }
        return Ok(());
    }

    match value {
        Value::Object(map) => match map.get(*segment) {
            // Documents are schemaless, so a missing or null field is not an
            // error, it just contributes nothing.
            None | Some(Value::Null) => Ok(()),
            Some(child) => walk(child, rest, locator, out),
        },
        _ => Ok(()),
    }
}

fn leaf(value: &Value, locator: &str, out: &mut Vec<(String, FieldType)>) -> Result<()> {
    match value {
        Value::Null => Ok(()),
        Value::String(s) => {
            out.push((s.clone(), FieldType::String));
            Ok(())
        }
        Value::Number(n) => {
            // Canonical strings are frozen: decimal integers, one fractional
            // digit for floats. Persisted indexes depend on them.
            if let Some(i) = n.as_i64() {
                out.push((i.to_string(), FieldType::Integer));
            } else if let Some(u) = n.as_u64() {
                out.push((u.to_string(), FieldType::Integer));
            } else {
                let f = n.as_f64().unwrap_or_default();
                out.push((format!("{f:.1}"), FieldType::Float));
            }
            Ok(())
        }
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => Err(Error::Type(format!(
            "locator {locator} resolves to a {} value, which is not an indexable scalar",
            kind_name(value)
        ))),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_top_level_scalars() -> Result<()> {
        let doc = json!({"Name": "Jane", "Age": 25, "Score": 3.14});
        assert_eq!(
            extract(&doc, "Name")?,
            vec![("Jane".to_string(), FieldType::String)]
        );
        assert_eq!(
            extract(&doc, "Age")?,
            vec![("25".to_string(), FieldType::Integer)]
        );
        assert_eq!(
            extract(&doc, "Score")?,
            vec![("3.1".to_string(), FieldType::Float)]
        );
        Ok(())
    }

    #[test]
    fn test_float_rendering_keeps_one_fractional_digit() -> Result<()> {
        let doc = json!({"Whole": 25.0, "Negative": -1.24});
        assert_eq!(extract(&doc, "Whole")?[0].0, "25.0");
        assert_eq!(extract(&doc, "Negative")?[0].0, "-1.2");
        Ok(())
    }

    #[test]
    fn test_nested_path() -> Result<()> {
        let doc = json!({"Org": {"OrgId": 261}});
        assert_eq!(
            extract(&doc, "Org.OrgId")?,
            vec![("261".to_string(), FieldType::Integer)]
        );
        Ok(())
    }

    #[test]
    fn test_missing_and_null_fields_yield_nothing() -> Result<()> {
        let doc = json!({"Age": 25, "Gone": null, "Org": {"OrgId": 1}});
        assert!(extract(&doc, "Name")?.is_empty());
        assert!(extract(&doc, "Gone")?.is_empty());
        assert!(extract(&doc, "Org.Missing")?.is_empty());
        // Descending through a missing intermediate field.
        assert!(extract(&doc, "Missing.OrgId")?.is_empty());
        // Descending into a scalar behaves like a missing field.
        assert!(extract(&doc, "Age.OrgId")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_list_expansion() -> Result<()> {
        let doc = json!({"Users": [{"Name": "a"}, {"Name": "b"}, {"Other": 1}]});
        assert_eq!(
            extract(&doc, "Users.[]Name")?,
            vec![
                ("a".to_string(), FieldType::String),
                ("b".to_string(), FieldType::String),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_list_expansion_at_root() -> Result<()> {
        let doc = json!([{"Org": {"OrgId": 1}}, {"Org": {"OrgId": 2}}]);
        assert_eq!(
            extract(&doc, "[]Org.OrgId")?,
            vec![
                ("1".to_string(), FieldType::Integer),
                ("2".to_string(), FieldType::Integer),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_duplicates_are_preserved_in_order() -> Result<()> {
        let doc = json!({"Tags": [{"V": 7}, {"V": 7}, {"V": 3}]});
        let values: Vec<String> = extract(&doc, "Tags.[]V")?
            .into_iter()
            .map(|(v, _)| v)
            .collect();
        assert_eq!(values, vec!["7", "7", "3"]);
        Ok(())
    }

    #[test]
    fn test_list_marker_on_non_list_is_a_type_error() {
        let doc = json!({"Users": {"Name": "a"}});
        let err = extract(&doc, "Users.[]Name").unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }

    #[test]
    fn test_non_scalar_leaf_is_a_type_error() {
        let doc = json!({"Org": {"OrgId": 1}, "Flags": [1, 2], "Active": true});
        assert!(matches!(extract(&doc, "Org").unwrap_err(), Error::Type(_)));
        assert!(matches!(extract(&doc, "Flags").unwrap_err(), Error::Type(_)));
        assert!(matches!(extract(&doc, "Active").unwrap_err(), Error::Type(_)));
    }
}
