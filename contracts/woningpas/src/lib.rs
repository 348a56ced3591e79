use serde_json::{Map, Number, Value};
use thiserror::Error;

#[cfg(feature = "client")]
pub mod client;

/// Name of the contract. Also the stem of its `.sol`, `.bin` and `.address` files.
pub const CONTRACT_NAME: &str = "Woningpas";

/// Positional layout of a house as returned by `getHouse` and `getHouseWithId`.
pub const HOUSE_FIELDS: [&str; 5] = ["houseId", "street", "zipCode", "city", "country"];

/// Positional layout of a document as returned by `getDocument` and `getDocumentWithId`.
pub const DOCUMENT_FIELDS: [&str; 4] = ["id", "isVerified", "hash", "addedAt"];

/// The only field that is not passed through as-is.
const TIMESTAMP_FIELD: &str = "addedAt";

/// Contract methods, as named in the ABI.
pub mod methods {
    pub const IS_VERIFIED: &str = "isVerified";
    pub const SET_VERIFICATION: &str = "setVerification";
    pub const ADD_HOUSE: &str = "addHouse";
    pub const ADD_DOCUMENT: &str = "addDocument";
    pub const GET_HOUSE: &str = "getHouse";
    pub const GET_HOUSE_NUMBER: &str = "getHouseNumber";
    pub const GET_DOCUMENT_NUMBER: &str = "getDocumentNumber";
    pub const GET_DOCUMENT: &str = "getDocument";
    pub const GET_HOUSE_WITH_ID: &str = "getHouseWithId";
    pub const GET_DOCUMENT_WITH_ID: &str = "getDocumentWithId";
    pub const TRANSFER_OWNERSHIP: &str = "transferOwnership";
}

/// A record reassembled from the positional values of a contract call.
pub type Record = Map<String, Value>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MapperError {
    #[error("expected {expected} values, got {got}")]
    Arity { expected: usize, got: usize },

    #[error("field {field} is not an integer: {value}")]
    NotAnInteger { field: String, value: Value },
}

/// Zips positional call results with their field names.
///
/// `addedAt` is coerced to an integer, every other value is kept untouched.
/// The number of values must match the number of fields.
pub fn parse_result(values: &[Value], fields: &[&str]) -> Result<Record, MapperError> {
    if values.len() != fields.len() {
        return Err(MapperError::Arity {
            expected: fields.len(),
            got: values.len(),
        });
    }

    let mut record = Record::new();
    for (field, value) in fields.iter().zip(values) {
        let value = if *field == TIMESTAMP_FIELD {
            coerce_integer(value).ok_or_else(|| MapperError::NotAnInteger {
                field: field.to_string(),
                value: value.clone(),
            })?
        } else {
            value.clone()
        };
        record.insert(field.to_string(), value);
    }
    Ok(record)
}

/// The contract answers lookups of unknown ids with a zeroed record, whose
/// first field is the empty string.
pub fn is_missing_record(values: &[Value]) -> bool {
    matches!(values.first(), Some(Value::String(s)) if s.is_empty())
}

/// Reads the leading integer of a value, like a lenient `parseInt`.
fn coerce_integer(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
        Value::Number(n) => n.as_f64().map(|f| Value::Number(Number::from(f.trunc() as i64))),
        Value::String(s) => {
            let s = s.trim();
            let (negative, digits) = match s.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, s.strip_prefix('+').unwrap_or(s)),
            };
            let end = digits
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(digits.len());
            let digits = &digits[..end];
            if digits.is_empty() {
                return None;
            }
            if negative {
                format!("-{digits}").parse::<i64>().ok().map(Value::from)
            } else {
                digits.parse::<u64>().ok().map(Value::from)
            }
        }
        _ => None,
    }
}
