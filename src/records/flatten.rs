use anyhow::{anyhow, bail, Result};
use serde_json::Value;
use std::collections::HashSet;

use super::{CellValue, Record};

/// Where the records live inside a fetched JSON document and what to leave out of them.
#[derive(Debug, Clone, Default)]
pub struct FlattenOptions {
    /// The document is an object holding the record array under this field.
    /// Without it, the document itself must be the array.
    pub records_field: Option<String>,
    /// Each array element wraps the actual record in this field, e.g. `user_asset_act`.
    pub unwrap_field: Option<String>,
    /// Object keys to drop at any nesting level.
    pub skip: HashSet<String>,
}

/// Turn a fetched JSON document into flat records.
pub fn flatten_document(document: &Value, options: &FlattenOptions) -> Result<Vec<Record>> {
    let elements = match &options.records_field {
        Some(field) => document
            .get(field)
            .ok_or_else(|| anyhow!("Field '{field}' not found in the input document"))?,
        None => document,
    };
    let Value::Array(elements) = elements else {
        bail!("Expected an array of records");
    };

    elements
        .iter()
        .enumerate()
        .map(|(index, element)| {
            let element = match &options.unwrap_field {
                Some(field) => element
                    .get(field)
                    .ok_or_else(|| anyhow!("Record {index} has no field '{field}'"))?,
                None => element,
            };
            if !element.is_object() {
                bail!("Record {index} is not a JSON object");
            }
            Ok(flatten(element, &options.skip))
        })
        .collect()
}

/// Flatten nested objects into dotted column names and arrays into indexed ones:
/// `{"a": {"b": 1}, "c": [2]}` becomes `a.b = 1, c[0] = 2`.
pub fn flatten(node: &Value, skip: &HashSet<String>) -> Record {
    let mut record = Record::new();
    traverse(&mut record, String::new(), node, skip);
    record
}

fn traverse(output: &mut Record, base: String, node: &Value, skip: &HashSet<String>) {
    match node {
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                traverse(output, format!("{base}[{index}]"), item, skip);
            }
        }
        Value::Object(fields) => {
            let prefix = if base.is_empty() {
                base
            } else {
                format!("{base}.")
            };
            for (key, value) in fields {
                if skip.contains(key) {
                    continue;
                }
                traverse(output, format!("{prefix}{key}"), value, skip);
            }
        }
        scalar => output.insert(base, scalar_value(scalar)),
    }
}

fn scalar_value(value: &Value) -> CellValue {
    match value {
        Value::Null => CellValue::Empty,
        Value::Bool(flag) => CellValue::Bool(*flag),
        Value::Number(number) => number
            .as_f64()
            .map(CellValue::Number)
            .unwrap_or_else(|| CellValue::String(number.to_string())),
        Value::String(text) => CellValue::String(text.clone()),
        Value::Array(_) | Value::Object(_) => CellValue::String(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use common_macros::hash_set;
    use serde_json::json;

    use super::*;

    #[test]
    fn nested_objects_and_arrays() {
        let record = flatten(
            &json!({
                "id": 1,
                "account": {"service": {"name": "Bank"}, "id": "a1"},
                "tags": ["x", "y"],
                "memo": null,
                "is_transfer": false,
            }),
            &HashSet::new(),
        );
        assert_eq!(
            record.columns().collect::<Vec<_>>(),
            [
                "id",
                "account.service.name",
                "account.id",
                "tags[0]",
                "tags[1]",
                "memo",
                "is_transfer"
            ]
        );
        assert_eq!(&CellValue::from(1), record.value("id"));
        assert_eq!(&CellValue::from("Bank"), record.value("account.service.name"));
        assert_eq!(&CellValue::from("y"), record.value("tags[1]"));
        assert_eq!(Some(&CellValue::Empty), record.get("memo"));
        assert_eq!(&CellValue::from(false), record.value("is_transfer"));
    }

    #[test]
    fn skipped_keys() {
        let record = flatten(
            &json!({"id": 1, "sub_accounts": [{"id": 2}], "nested": {"sub_accounts": 3, "x": 4}}),
            &hash_set!["sub_accounts".to_string()],
        );
        assert_eq!(record.columns().collect::<Vec<_>>(), ["id", "nested.x"]);
    }

    #[test]
    fn document_with_records_field_and_wrapper() {
        let document = json!({
            "user_asset_acts": [
                {"user_asset_act": {"id": 1, "amount": -500}},
                {"user_asset_act": {"id": 2, "amount": 1200}},
            ]
        });
        let options = FlattenOptions {
            records_field: Some("user_asset_acts".to_string()),
            unwrap_field: Some("user_asset_act".to_string()),
            skip: HashSet::new(),
        };
        let records = flatten_document(&document, &options).unwrap();
        assert_eq!(2, records.len());
        assert_eq!(&CellValue::from(-500), records[0].value("amount"));
        assert_eq!(&CellValue::from(2), records[1].value("id"));
    }

    #[test]
    fn top_level_array() {
        let records =
            flatten_document(&json!([{"id": 1}, {"id": 2}]), &FlattenOptions::default()).unwrap();
        assert_eq!(2, records.len());
    }

    #[test]
    fn missing_records_field() {
        let options = FlattenOptions {
            records_field: Some("accounts".to_string()),
            ..FlattenOptions::default()
        };
        let err = flatten_document(&json!({"other": []}), &options).unwrap_err();
        assert_eq!(
            "Field 'accounts' not found in the input document",
            err.to_string()
        );
    }

    #[test]
    fn non_object_records() {
        assert!(flatten_document(&json!([1, 2]), &FlattenOptions::default()).is_err());
        assert!(flatten_document(&json!({"id": 1}), &FlattenOptions::default()).is_err());
    }
}
