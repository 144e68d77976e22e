//! Ordered records for stage inputs and outputs.
//!
//! A [`Record`] is the structured value exchanged with the metadata store:
//! an insertion-ordered mapping from field name to JSON value. Args records
//! are parsed from the store at invocation start; outs records begin empty
//! and are populated by stage logic, then flattened back into storable form.

use serde::de::{self, MapAccess, Visitor};
use serde_json::{Map, Value};
use std::fmt;

use crate::errors::MalformedRecordError;

/// An ordered mapping from field name to JSON value.
///
/// Field names are unique. Newly added fields keep their insertion order
/// through serialization; overwriting an existing field keeps its position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Creates a new empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a record from its stored serialized form.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRecordError` if the stored value is not valid JSON,
    /// is not a JSON object, or repeats a field name.
    pub fn from_stored(raw: &str) -> Result<Self, MalformedRecordError> {
        // Two passes: shape first, then field uniqueness. Parsing straight
        // into a `Value` would silently collapse duplicate field names.
        let probe: Value =
            serde_json::from_str(raw).map_err(|err| MalformedRecordError::Syntax {
                message: err.to_string(),
            })?;
        if !probe.is_object() {
            return Err(MalformedRecordError::NotAnObject {
                found: json_type_name(&probe).to_string(),
            });
        }

        let entries = parse_entries(raw).map_err(|err| MalformedRecordError::Syntax {
            message: err.to_string(),
        })?;

        let mut fields = Map::with_capacity(entries.len());
        for (name, value) in entries {
            if fields.contains_key(&name) {
                return Err(MalformedRecordError::DuplicateField { name });
            }
            fields.insert(name, value);
        }
        Ok(Self { fields })
    }

    /// Builds a record from an already-parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRecordError::NotAnObject` if the value is not an
    /// object.
    pub fn from_value(value: Value) -> Result<Self, MalformedRecordError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(MalformedRecordError::NotAnObject {
                found: json_type_name(&other).to_string(),
            }),
        }
    }

    /// Inserts or overwrites a field.
    ///
    /// New fields append at the end; existing fields keep their position.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// Gets a field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Checks if a field exists.
    #[must_use]
    pub fn contains_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns all field names in insertion order.
    #[must_use]
    pub fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    /// Iterates over fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Returns the record as a JSON object value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Produces the canonical serialized form consumed by the store.
    ///
    /// Flattening an unmodified record twice yields identical bytes.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRecordError::Syntax` if the record cannot be
    /// serialized.
    pub fn flatten(&self) -> Result<String, MalformedRecordError> {
        serde_json::to_string(&self.fields).map_err(|err| MalformedRecordError::Syntax {
            message: err.to_string(),
        })
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.fields.clone()))
    }
}

/// Returns the JSON type name of a value, for diagnostics.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parses a JSON object into its entries without collapsing duplicates.
fn parse_entries(raw: &str) -> Result<Vec<(String, Value)>, serde_json::Error> {
    struct EntriesVisitor;

    impl<'de> Visitor<'de> for EntriesVisitor {
        type Value = Vec<(String, Value)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a JSON object")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some(entry) = access.next_entry::<String, Value>()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let entries = de::Deserializer::deserialize_map(&mut deserializer, EntriesVisitor)?;
    deserializer.end()?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_from_stored_round_trip() {
        let raw = r#"{"b":1,"a":{"nested":[1,2,3]},"c":"text"}"#;
        let record = Record::from_stored(raw).unwrap();

        assert_eq!(record.flatten().unwrap(), raw);
    }

    #[test]
    fn test_from_stored_preserves_field_order() {
        let record = Record::from_stored(r#"{"z":1,"a":2,"m":3}"#).unwrap();

        assert_eq!(
            record.field_names(),
            vec!["z".to_string(), "a".to_string(), "m".to_string()]
        );
    }

    #[test]
    fn test_from_stored_rejects_duplicate_fields() {
        let result = Record::from_stored(r#"{"a":1,"a":2}"#);

        assert!(matches!(
            result,
            Err(MalformedRecordError::DuplicateField { name }) if name == "a"
        ));
    }

    #[test]
    fn test_from_stored_rejects_non_object() {
        let result = Record::from_stored("[1,2,3]");

        assert!(matches!(
            result,
            Err(MalformedRecordError::NotAnObject { found }) if found == "array"
        ));
    }

    #[test]
    fn test_from_stored_rejects_invalid_syntax() {
        let result = Record::from_stored(r#"{"a":"#);

        assert!(matches!(result, Err(MalformedRecordError::Syntax { .. })));
    }

    #[test]
    fn test_set_appends_new_fields_in_order() {
        let mut record = Record::new();
        record.set("first", json!(1));
        record.set("second", json!(2));
        record.set("third", json!(3));

        assert_eq!(
            record.field_names(),
            vec![
                "first".to_string(),
                "second".to_string(),
                "third".to_string()
            ]
        );
    }

    #[test]
    fn test_set_overwrite_keeps_position() {
        let mut record = Record::new();
        record.set("a", json!(1));
        record.set("b", json!(2));
        record.set("a", json!(10));

        assert_eq!(record.field_names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(record.get("a"), Some(&json!(10)));
    }

    #[test]
    fn test_flatten_is_idempotent() {
        let mut record = Record::new();
        record.set("n", json!(3));
        record.set("nested", json!({"x": [true, null]}));

        let first = record.flatten().unwrap();
        let second = record.flatten().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_flatten_then_from_stored_is_lossless() {
        let mut record = Record::new();
        record.set("scalar", json!(9));
        record.set("seq", json!([1, "two", 3.5]));
        record.set("map", json!({"inner": {"deep": true}}));

        let stored = record.flatten().unwrap();
        let reparsed = Record::from_stored(&stored).unwrap();
        assert_eq!(reparsed, record);
    }

    #[test]
    fn test_from_value() {
        let record = Record::from_value(json!({"n": 3})).unwrap();
        assert_eq!(record.get("n"), Some(&json!(3)));

        assert!(matches!(
            Record::from_value(json!("scalar")),
            Err(MalformedRecordError::NotAnObject { found }) if found == "string"
        ));
    }

    #[test]
    fn test_empty_record() {
        let record = Record::new();
        assert!(record.is_empty());
        assert_eq!(record.len(), 0);
        assert_eq!(record.flatten().unwrap(), "{}");
    }
}
