//! Strict-then-loose input decoding.
//!
//! # Responsibilities
//! - Decode a request payload into the method's input record
//! - Fall back to a loose pass when the strict decode fails: drop empty
//!   strings, fix key casing, coerce string-typed numbers and timestamps
//! - Report both failures when neither pass succeeds
//!
//! # Design Decisions
//! - Coercion is driven by the record descriptor's `FieldType`s
//! - Numeric strings are normalised (sign, leading zeros) before parsing, so
//!   `"007"` is seven and never an octal literal
//! - Keys that match no field are ignored, as the strict pass would have
//!   rejected them anyway

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::codec::casing::{camel_case, starts_lowercase};
use crate::pool::Pools;
use crate::rpc::record::{FieldDescriptor, FieldKind, FieldType, Record, RecordDescriptor};

/// Which pass produced the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    Strict,
    Weak,
}

impl DecodeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecodeMode::Strict => "strict",
            DecodeMode::Weak => "weak",
        }
    }
}

/// Failure of the loose pass.
#[derive(Debug, Error)]
pub enum WeakError {
    #[error("payload is not a JSON object: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("field {field}: cannot use {found} as {expected}")]
    Coerce {
        field: String,
        expected: &'static str,
        found: String,
    },

    #[error("field {field}: {message}")]
    Text { field: String, message: String },

    #[error("populate record: {0}")]
    Populate(#[source] serde_json::Error),
}

/// Both passes failed.
#[derive(Debug, Error)]
#[error("strict decode: {strict}; weak decode: {weak}")]
pub struct DecodeError {
    #[source]
    pub strict: serde_json::Error,
    pub weak: WeakError,
}

/// Decode a JSON body into `record`.
pub fn decode_body(
    record: &mut dyn Record,
    body: &[u8],
    pools: &Pools,
) -> Result<DecodeMode, DecodeError> {
    let strict = match record.decode_strict(body) {
        Ok(()) => return Ok(DecodeMode::Strict),
        Err(e) => e,
    };
    tracing::debug!(record = record.descriptor().name, error = %strict, "Strict decode failed, trying weak decode");

    let input = match serde_json::from_slice::<Map<String, Value>>(body) {
        Ok(map) => map,
        Err(e) => {
            return Err(DecodeError {
                strict,
                weak: WeakError::Parse(e),
            })
        }
    };
    weak_populate(record, input, pools)
        .map(|()| DecodeMode::Weak)
        .map_err(|weak| DecodeError { strict, weak })
}

/// Decode an already-parsed map (an XML-RPC struct parameter) into `record`.
pub fn decode_map(
    record: &mut dyn Record,
    input: Map<String, Value>,
    pools: &Pools,
) -> Result<DecodeMode, DecodeError> {
    let strict = {
        let mut buf = pools.buffers.acquire();
        match serde_json::to_writer(&mut *buf, &input) {
            Ok(()) => record.decode_strict(&buf),
            Err(e) => Err(e),
        }
    };
    match strict {
        Ok(()) => Ok(DecodeMode::Strict),
        Err(strict) => weak_populate(record, input, pools)
            .map(|()| DecodeMode::Weak)
            .map_err(|weak| DecodeError { strict, weak }),
    }
}

fn weak_populate(
    record: &mut dyn Record,
    input: Map<String, Value>,
    pools: &Pools,
) -> Result<(), WeakError> {
    let desc = record.descriptor();
    let mut scratch = pools.maps.acquire();
    normalize_keys(input, &mut scratch);
    let coerced = coerce_record(desc, &scratch, "")?;
    record.populate(coerced).map_err(WeakError::Populate)
}

/// Drop "not provided" entries and fix the casing of lower-case keys.
fn normalize_keys(input: Map<String, Value>, into: &mut Map<String, Value>) {
    for (key, value) in input {
        if matches!(&value, Value::String(s) if s.is_empty()) {
            continue;
        }
        if starts_lowercase(&key) {
            into.insert(camel_case(&key), value);
        } else {
            into.insert(key, value);
        }
    }
}

fn lookup<'m>(
    map: &'m Map<String, Value>,
    field: &FieldDescriptor,
    wire: &str,
) -> Option<(&'m String, &'m Value)> {
    if let Some(entry) = map.get_key_value(wire) {
        return Some(entry);
    }
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(wire) || k.eq_ignore_ascii_case(field.name))
}

fn coerce_record(
    desc: &RecordDescriptor,
    map: &Map<String, Value>,
    path: &str,
) -> Result<Map<String, Value>, WeakError> {
    let mut out = Map::new();
    let mut used = 0usize;
    for (wire, field) in desc.visible_fields() {
        let Some((_, value)) = lookup(map, field, wire) else {
            continue;
        };
        used += 1;
        if value.is_null() {
            continue;
        }
        let field_path = if path.is_empty() {
            wire.to_string()
        } else {
            format!("{}.{}", path, wire)
        };
        let coerced = match field.kind {
            FieldKind::Scalar => coerce_value(field.ty, value, &field_path)?,
            FieldKind::Sequence => match value {
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .map(|item| coerce_value(field.ty, item, &field_path))
                        .collect::<Result<_, _>>()?,
                ),
                single => Value::Array(vec![coerce_value(field.ty, single, &field_path)?]),
            },
        };
        out.insert(wire.to_string(), coerced);
    }
    if used < map.len() {
        tracing::debug!(
            record = desc.name,
            ignored = map.len() - used,
            "Weak decode ignored input keys matching no field"
        );
    }
    Ok(out)
}

fn coerce_value(ty: FieldType, value: &Value, path: &str) -> Result<Value, WeakError> {
    let fail = |expected: &'static str| WeakError::Coerce {
        field: path.to_string(),
        expected,
        found: describe(value),
    };
    match ty {
        FieldType::Any => Ok(value.clone()),
        FieldType::Bool => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
            Value::String(s) => parse_bool(s).map(Value::Bool).ok_or_else(|| fail("bool")),
            _ => Err(fail("bool")),
        },
        FieldType::Int => match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
                .map(Value::from)
                .ok_or_else(|| fail("integer")),
            Value::Bool(b) => Ok(Value::from(*b as i64)),
            Value::String(s) => parse_int(s).map(Value::from).ok_or_else(|| fail("integer")),
            _ => Err(fail("integer")),
        },
        FieldType::UInt => match value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| f.is_finite() && *f >= 0.0)
                        .map(|f| f.trunc() as u64)
                })
                .map(Value::from)
                .ok_or_else(|| fail("unsigned integer")),
            Value::Bool(b) => Ok(Value::from(*b as u64)),
            Value::String(s) => parse_uint(s)
                .map(Value::from)
                .ok_or_else(|| fail("unsigned integer")),
            _ => Err(fail("unsigned integer")),
        },
        FieldType::Float => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::Bool(b) => Ok(Value::from(if *b { 1.0 } else { 0.0 })),
            Value::String(s) => parse_float(s)
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| fail("float")),
            _ => Err(fail("float")),
        },
        FieldType::String => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(if *b { "1" } else { "0" }.to_string())),
            _ => Err(fail("string")),
        },
        FieldType::Timestamp => match value {
            Value::String(s) => parse_timestamp(s)
                .map(|t| Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
                .ok_or_else(|| fail("timestamp")),
            _ => Err(fail("timestamp")),
        },
        FieldType::Text(decode) => match value {
            Value::String(s) => decode(s).map_err(|message| WeakError::Text {
                field: path.to_string(),
                message,
            }),
            other => Ok(other.clone()),
        },
        FieldType::Record(desc) => match value {
            Value::Object(obj) => {
                let mut nested = Map::new();
                normalize_keys(obj.clone(), &mut nested);
                coerce_record(desc, &nested, path).map(Value::Object)
            }
            _ => Err(fail(desc.name)),
        },
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("bool {}", b),
        Value::Number(n) => format!("number {}", n),
        Value::String(s) => format!("string {:?}", s),
        Value::Array(a) => format!("array of {}", a.len()),
        Value::Object(_) => "object".to_string(),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Trim, drop a leading `+` and leading zeros, keep a `-` sign.
fn normalize_numeric(s: &str) -> String {
    let s = s.trim();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => ("-", &s[1..]),
        Some(b'+') => ("", &s[1..]),
        _ => ("", s),
    };
    let zeros = digits.len() - digits.trim_start_matches('0').len();
    // keep one zero for "000" and "00.5"
    let keep = if zeros > 0 && matches!(digits[zeros..].chars().next(), None | Some('.')) {
        zeros - 1
    } else {
        zeros
    };
    format!("{}{}", sign, &digits[keep..])
}

fn parse_int(s: &str) -> Option<i64> {
    let n = normalize_numeric(s);
    n.parse::<i64>()
        .ok()
        .or_else(|| n.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
}

fn parse_uint(s: &str) -> Option<u64> {
    let n = normalize_numeric(s);
    n.parse::<u64>().ok().or_else(|| {
        n.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f.trunc() as u64)
    })
}

fn parse_float(s: &str) -> Option<f64> {
    normalize_numeric(s).parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Parse the timestamp layouts clients commonly send.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for layout in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y%m%dT%H:%M:%S",
    ] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, layout) {
            return Some(ndt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::record::Schema;
    use chrono::TimeZone;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    #[serde(default)]
    struct Inner {
        #[serde(rename = "Code")]
        code: u32,
    }

    static INNER_FIELDS: [FieldDescriptor; 1] =
        [FieldDescriptor::scalar("code", FieldType::UInt).wire("Code")];
    static INNER: RecordDescriptor = RecordDescriptor {
        name: "Inner",
        fields: &INNER_FIELDS,
    };

    impl Schema for Inner {
        fn descriptor() -> &'static RecordDescriptor {
            &INNER
        }
    }

    fn upper(s: &str) -> Result<Value, String> {
        if s.is_ascii() {
            Ok(Value::String(s.to_ascii_uppercase()))
        } else {
            Err("not ascii".to_string())
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    #[serde(default)]
    struct Query {
        #[serde(rename = "AccountNo")]
        account_no: i64,
        #[serde(rename = "Name")]
        name: String,
        #[serde(rename = "Active")]
        active: bool,
        #[serde(rename = "Ratio")]
        ratio: f64,
        #[serde(rename = "Since")]
        since: Option<DateTime<Utc>>,
        #[serde(rename = "Tags")]
        tags: Vec<String>,
        #[serde(rename = "Country")]
        country: String,
        #[serde(rename = "Inner")]
        inner: Inner,
    }

    static QUERY_FIELDS: [FieldDescriptor; 8] = [
        FieldDescriptor::scalar("account_no", FieldType::Int).wire("AccountNo"),
        FieldDescriptor::scalar("name", FieldType::String).wire("Name"),
        FieldDescriptor::scalar("active", FieldType::Bool).wire("Active"),
        FieldDescriptor::scalar("ratio", FieldType::Float).wire("Ratio"),
        FieldDescriptor::scalar("since", FieldType::Timestamp).wire("Since"),
        FieldDescriptor::sequence("tags", FieldType::String).wire("Tags"),
        FieldDescriptor::scalar("country", FieldType::Text(upper)).wire("Country"),
        FieldDescriptor::scalar("inner", FieldType::Record(&INNER)).wire("Inner"),
    ];
    static QUERY: RecordDescriptor = RecordDescriptor {
        name: "Query",
        fields: &QUERY_FIELDS,
    };

    impl Schema for Query {
        fn descriptor() -> &'static RecordDescriptor {
            &QUERY
        }
    }

    #[test]
    fn test_strict_path_first() {
        let pools = Pools::default();
        let mut q = Query::default();
        let mode = decode_body(&mut q, br#"{"AccountNo":12,"Name":"x"}"#, &pools).unwrap();
        assert_eq!(mode, DecodeMode::Strict);
        assert_eq!(q.account_no, 12);
    }

    #[test]
    fn test_weak_path_coerces() {
        let pools = Pools::default();
        let mut q = Query::default();
        let body = br#"{
            "account_no": "007",
            "name": 42,
            "active": "t",
            "ratio": "+0.25",
            "since": "2006-01-02 16:04",
            "tags": "solo",
            "country": "hu",
            "inner": {"code": "3"},
            "unused": "value"
        }"#;
        let mode = decode_body(&mut q, body, &pools).unwrap();
        assert_eq!(mode, DecodeMode::Weak);
        assert_eq!(q.account_no, 7);
        assert_eq!(q.name, "42");
        assert!(q.active);
        assert_eq!(q.ratio, 0.25);
        assert_eq!(q.since, Some(Utc.with_ymd_and_hms(2006, 1, 2, 16, 4, 0).unwrap()));
        assert_eq!(q.tags, vec!["solo".to_string()]);
        assert_eq!(q.country, "HU");
        assert_eq!(q.inner, Inner { code: 3 });
        assert_eq!(pools.maps.idle(), 1);
    }

    #[test]
    fn test_empty_strings_are_dropped() {
        let pools = Pools::default();
        let mut q = Query::default();
        decode_body(&mut q, br#"{"account_no":"", "name":"n", "ratio":""}"#, &pools).unwrap();
        assert_eq!(q.account_no, 0);
        assert_eq!(q.ratio, 0.0);
        assert_eq!(q.name, "n");
    }

    #[test]
    fn test_combined_error() {
        let pools = Pools::default();
        let mut q = Query::default();
        let err = decode_body(&mut q, br#"{"account_no":"abc"}"#, &pools).unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("strict decode: "), "{}", text);
        assert!(text.contains("weak decode: field AccountNo"), "{}", text);

        let err = decode_body(&mut q, b"[1,2]", &pools).unwrap_err();
        assert!(matches!(err.weak, WeakError::Parse(_)));
    }

    #[test]
    fn test_text_decoder_failure() {
        let pools = Pools::default();
        let mut q = Query::default();
        let err = decode_body(&mut q, r#"{"country":"ű"}"#.as_bytes(), &pools).unwrap_err();
        assert!(matches!(err.weak, WeakError::Text { .. }));
    }

    #[test]
    fn test_decode_map() {
        let pools = Pools::default();
        let mut q = Query::default();
        let mut map = Map::new();
        map.insert("AccountNo".into(), Value::from(5));
        assert_eq!(decode_map(&mut q, map, &pools).unwrap(), DecodeMode::Strict);

        let mut map = Map::new();
        map.insert("accountNo".into(), Value::from("6"));
        assert_eq!(decode_map(&mut q, map, &pools).unwrap(), DecodeMode::Weak);
        assert_eq!(q.account_no, 6);
    }

    #[test]
    fn test_normalize_numeric() {
        assert_eq!(normalize_numeric("007"), "7");
        assert_eq!(normalize_numeric("-007"), "-7");
        assert_eq!(normalize_numeric("+12"), "12");
        assert_eq!(normalize_numeric("000"), "0");
        assert_eq!(normalize_numeric("00.5"), "0.5");
        assert_eq!(normalize_numeric(" 10 "), "10");
        assert_eq!(parse_int("1.9"), Some(1));
        assert_eq!(parse_uint("-1"), None);
    }

    #[test]
    fn test_parse_timestamp_layouts() {
        let want = Utc.with_ymd_and_hms(1998, 7, 17, 14, 8, 55).unwrap();
        assert_eq!(parse_timestamp("1998-07-17T14:08:55Z"), Some(want));
        assert_eq!(parse_timestamp("1998-07-17 14:08:55"), Some(want));
        assert_eq!(parse_timestamp("19980717T14:08:55"), Some(want));
        assert!(parse_timestamp("1998-07-17").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
