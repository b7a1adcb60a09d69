use crate::core::{Record, Result, TxError, Value};
use serde::de::DeserializeOwned;

/// Build a value from one result row
///
/// Scalar impls expect a single-column row. Entities usually implement this
/// through [`Record::into_entity`].
pub trait FromRecord: Sized {
    fn from_record(record: Record) -> Result<Self>;
}

impl FromRecord for Record {
    fn from_record(record: Record) -> Result<Self> {
        Ok(record)
    }
}

impl FromRecord for Value {
    fn from_record(record: Record) -> Result<Self> {
        single(record)
    }
}

impl FromRecord for i64 {
    fn from_record(record: Record) -> Result<Self> {
        let value = single(record)?;
        value
            .as_i64()
            .ok_or_else(|| mismatch("INTEGER", &value))
    }
}

impl FromRecord for f64 {
    fn from_record(record: Record) -> Result<Self> {
        let value = single(record)?;
        value.as_f64().ok_or_else(|| mismatch("FLOAT", &value))
    }
}

impl FromRecord for String {
    fn from_record(record: Record) -> Result<Self> {
        match single(record)? {
            Value::Text(s) => Ok(s),
            other => Err(mismatch("TEXT", &other)),
        }
    }
}

impl FromRecord for bool {
    fn from_record(record: Record) -> Result<Self> {
        match single(record)? {
            Value::Boolean(b) => Ok(b),
            other => Err(mismatch("BOOLEAN", &other)),
        }
    }
}

impl<T: FromRecord> FromRecord for Option<T> {
    fn from_record(record: Record) -> Result<Self> {
        if record.len() == 1 && record.values().all(Value::is_null) {
            return Ok(None);
        }
        T::from_record(record).map(Some)
    }
}

fn single(record: Record) -> Result<Value> {
    if record.len() != 1 {
        return Err(TxError::Mapping(format!(
            "expected a single column, got {}",
            record.len()
        )));
    }
    record
        .values()
        .next()
        .cloned()
        .ok_or_else(|| TxError::Mapping("empty record".into()))
}

fn mismatch(expected: &str, got: &Value) -> TxError {
    TxError::Mapping(format!("expected {}, got {}", expected, got.type_name()))
}

impl Record {
    /// Deserialize the record's fields into an entity type.
    pub fn into_entity<T: DeserializeOwned>(self) -> Result<T> {
        serde_json::from_value(self.to_json()).map_err(|e| TxError::Mapping(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn record(fields: &[(&str, Value)]) -> Record {
        let columns: Vec<String> = fields.iter().map(|(n, _)| n.to_string()).collect();
        Record::new(&columns, fields.iter().map(|(_, v)| v.clone()).collect())
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: i64,
        username: String,
    }

    #[test]
    fn test_scalars() {
        assert_eq!(i64::from_record(record(&[("n", Value::Integer(7))])).unwrap(), 7);
        assert_eq!(
            String::from_record(record(&[("s", Value::from("a"))])).unwrap(),
            "a"
        );
        assert!(matches!(
            i64::from_record(record(&[("a", Value::Integer(1)), ("b", Value::Integer(2))])),
            Err(TxError::Mapping(_))
        ));
        assert!(bool::from_record(record(&[("n", Value::Integer(1))])).is_err());
    }

    #[test]
    fn test_optional_null() {
        let v: Option<i64> = FromRecord::from_record(record(&[("n", Value::Null)])).unwrap();
        assert_eq!(v, None);
    }

    #[test]
    fn test_into_entity() {
        let user: User = record(&[("id", Value::Integer(1)), ("username", Value::from("ann"))])
            .into_entity()
            .unwrap();
        assert_eq!(
            user,
            User {
                id: 1,
                username: "ann".into()
            }
        );
    }
}
