//! XML-RPC envelope codec.
//!
//! # Responsibilities
//! - Parse `<methodCall>` documents into a method name and JSON parameters
//! - Marshal collected records as a `<methodResponse>` (single value or array)
//! - Marshal and parse `<fault>` responses
//!
//! # Design Decisions
//! - Values map onto `serde_json::Value` so the weak decoder handles both transports
//! - `dateTime.iso8601` travels as RFC 3339 text inside the gateway; record
//!   descriptors decide which strings go back out as `dateTime.iso8601`
//! - `<nil/>` is accepted and emitted for null

use base64::Engine;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::codec::weak::parse_timestamp;
use crate::rpc::record::{FieldType, Record};

/// Fault code sent when a stream fails after records were received.
pub const STREAM_FAULT_CODE: i64 = 111;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const DATETIME_LAYOUT: &str = "%Y%m%dT%H:%M:%S";

#[derive(Debug, Error)]
pub enum XmlRpcError {
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed XML-RPC: {0}")]
    Envelope(String),

    #[error("invalid <{kind}> value {text:?}")]
    Value { kind: String, text: String },

    #[error("wanted 1 struct param, got {0}")]
    ParamCount(usize),

    #[error("wanted struct param, got {0}")]
    ParamType(&'static str),

    #[error("encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A decoded `<methodCall>`.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub name: String,
    pub params: Vec<Value>,
}

impl MethodCall {
    /// The single struct parameter the gateway accepts.
    pub fn into_struct_param(self) -> Result<Map<String, Value>, XmlRpcError> {
        if self.params.len() != 1 {
            return Err(XmlRpcError::ParamCount(self.params.len()));
        }
        match self.params.into_iter().next() {
            Some(Value::Object(map)) => Ok(map),
            Some(other) => Err(XmlRpcError::ParamType(kind_of(&other))),
            None => Err(XmlRpcError::ParamCount(0)),
        }
    }
}

/// An XML-RPC fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: i64,
    pub message: String,
}

impl Fault {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn from_value(value: Value) -> Result<Self, XmlRpcError> {
        let Value::Object(map) = value else {
            return Err(XmlRpcError::Envelope("fault is not a struct".into()));
        };
        let code = map
            .get("faultCode")
            .and_then(Value::as_i64)
            .ok_or_else(|| XmlRpcError::Envelope("fault without faultCode".into()))?;
        let message = map
            .get("faultString")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(Self { code, message })
    }
}

/// A decoded `<methodResponse>`.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResponse {
    Value(Value),
    Fault(Fault),
}

pub fn parse_call(body: &[u8]) -> Result<MethodCall, XmlRpcError> {
    let mut p = Parser::new(body);
    p.open("methodCall")?;
    p.open("methodName")?;
    let name = p.text_until("methodName")?.trim().to_string();
    if name.is_empty() {
        return Err(XmlRpcError::Envelope("empty methodName".into()));
    }

    let mut params = Vec::new();
    match p.next()? {
        Event::Start(s) if is(&s, "params") => {
            loop {
                match p.next()? {
                    Event::Start(s) if is(&s, "param") => {
                        p.open("value")?;
                        params.push(p.value()?);
                        p.close("param")?;
                    }
                    Event::End(e) if e.name().as_ref() == b"params" => break,
                    other => return Err(unexpected("<param>", &other)),
                }
            }
            p.close("methodCall")?;
        }
        Event::Empty(s) if is(&s, "params") => p.close("methodCall")?,
        Event::End(e) if e.name().as_ref() == b"methodCall" => {}
        other => return Err(unexpected("<params>", &other)),
    }
    Ok(MethodCall { name, params })
}

pub fn parse_response(body: &[u8]) -> Result<MethodResponse, XmlRpcError> {
    let mut p = Parser::new(body);
    p.open("methodResponse")?;
    let response = match p.next()? {
        Event::Start(s) if is(&s, "params") => {
            p.open("param")?;
            p.open("value")?;
            let value = p.value()?;
            p.close("param")?;
            p.close("params")?;
            MethodResponse::Value(value)
        }
        Event::Start(s) if is(&s, "fault") => {
            p.open("value")?;
            let value = p.value()?;
            p.close("fault")?;
            MethodResponse::Fault(Fault::from_value(value)?)
        }
        other => return Err(unexpected("<params> or <fault>", &other)),
    };
    p.close("methodResponse")?;
    Ok(response)
}

/// Marshal the records of one call: a single value for one record, an array otherwise.
pub fn marshal_records(records: &[Box<dyn Record>]) -> Result<String, XmlRpcError> {
    let mut out = String::with_capacity(256);
    out.push_str(XML_HEADER);
    out.push_str("<methodResponse><params><param>");
    if let [record] = records {
        write_value(&mut out, &record.to_value()?, Some(FieldType::Record(record.descriptor())));
    } else {
        out.push_str("<value><array><data>");
        for record in records {
            write_value(&mut out, &record.to_value()?, Some(FieldType::Record(record.descriptor())));
        }
        out.push_str("</data></array></value>");
    }
    out.push_str("</param></params></methodResponse>");
    Ok(out)
}

pub fn marshal_fault(fault: &Fault) -> String {
    let mut members = Map::new();
    members.insert("faultCode".into(), Value::from(fault.code));
    members.insert("faultString".into(), Value::String(fault.message.clone()));

    let mut out = String::with_capacity(256);
    out.push_str(XML_HEADER);
    out.push_str("<methodResponse><fault>");
    write_value(&mut out, &Value::Object(members), None);
    out.push_str("</fault></methodResponse>");
    out
}

pub fn marshal_call(name: &str, params: &[Value]) -> String {
    let mut out = String::with_capacity(256);
    out.push_str(XML_HEADER);
    out.push_str("<methodCall><methodName>");
    out.push_str(&quick_xml::escape::escape(name));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        write_value(&mut out, param, None);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

fn write_value(out: &mut String, value: &Value, ty: Option<FieldType>) {
    out.push_str("<value>");
    match value {
        Value::Null => out.push_str("<nil/>"),
        Value::Bool(b) => {
            out.push_str(if *b { "<boolean>1</boolean>" } else { "<boolean>0</boolean>" })
        }
        Value::Number(n) if n.is_f64() => {
            out.push_str("<double>");
            out.push_str(&n.to_string());
            out.push_str("</double>");
        }
        Value::Number(n) => {
            out.push_str("<int>");
            out.push_str(&n.to_string());
            out.push_str("</int>");
        }
        Value::String(s) => match ty.and_then(|ty| match ty {
            FieldType::Timestamp => parse_timestamp(s),
            _ => None,
        }) {
            Some(ts) => {
                out.push_str("<dateTime.iso8601>");
                out.push_str(&ts.format(DATETIME_LAYOUT).to_string());
                out.push_str("</dateTime.iso8601>");
            }
            None => {
                out.push_str("<string>");
                out.push_str(&quick_xml::escape::escape(s.as_str()));
                out.push_str("</string>");
            }
        },
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item, ty);
            }
            out.push_str("</data></array>");
        }
        Value::Object(map) => {
            out.push_str("<struct>");
            for (key, item) in map {
                let field_ty = match ty {
                    Some(FieldType::Record(desc)) => desc.field_by_wire_name(key).map(|f| f.ty),
                    _ => None,
                };
                out.push_str("<member><name>");
                out.push_str(&quick_xml::escape::escape(key.as_str()));
                out.push_str("</name>");
                write_value(out, item, field_ty);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "struct",
    }
}

fn is(start: &BytesStart<'_>, tag: &str) -> bool {
    start.name().as_ref() == tag.as_bytes()
}

fn tag_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn unexpected(wanted: &str, found: &Event<'_>) -> XmlRpcError {
    let found = match found {
        Event::Start(s) => format!("<{}>", tag_name(s)),
        Event::Empty(s) => format!("<{}/>", tag_name(s)),
        Event::End(e) => format!("</{}>", String::from_utf8_lossy(e.name().as_ref())),
        Event::Text(_) | Event::CData(_) => "text".to_string(),
        Event::Eof => "end of document".to_string(),
        _ => "markup".to_string(),
    };
    XmlRpcError::Envelope(format!("wanted {}, found {}", wanted, found))
}

struct Parser<'a> {
    reader: Reader<&'a [u8]>,
}

impl<'a> Parser<'a> {
    fn new(body: &'a [u8]) -> Self {
        Self {
            reader: Reader::from_reader(body),
        }
    }

    /// Next structural event; skips prolog, comments and whitespace.
    fn next(&mut self) -> Result<Event<'a>, XmlRpcError> {
        loop {
            match self.reader.read_event()? {
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => continue,
                Event::Text(t) if t.iter().all(u8::is_ascii_whitespace) => continue,
                event => return Ok(event),
            }
        }
    }

    fn open(&mut self, tag: &str) -> Result<(), XmlRpcError> {
        match self.next()? {
            Event::Start(s) if is(&s, tag) => Ok(()),
            other => Err(unexpected(&format!("<{}>", tag), &other)),
        }
    }

    fn close(&mut self, tag: &str) -> Result<(), XmlRpcError> {
        match self.next()? {
            Event::End(e) if e.name().as_ref() == tag.as_bytes() => Ok(()),
            other => Err(unexpected(&format!("</{}>", tag), &other)),
        }
    }

    /// Character data up to the closing `tag`.
    fn text_until(&mut self, tag: &str) -> Result<String, XmlRpcError> {
        let mut text = String::new();
        loop {
            match self.reader.read_event()? {
                Event::Text(t) => text.push_str(
                    &t.unescape()
                        .map_err(|e| XmlRpcError::Envelope(e.to_string()))?,
                ),
                Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
                Event::Comment(_) | Event::PI(_) => continue,
                Event::End(e) if e.name().as_ref() == tag.as_bytes() => return Ok(text),
                other => return Err(unexpected(&format!("</{}>", tag), &other)),
            }
        }
    }

    /// Content of a `<value>` whose start tag was consumed.
    fn value(&mut self) -> Result<Value, XmlRpcError> {
        let mut text = String::new();
        loop {
            match self.reader.read_event()? {
                Event::Text(t) => text.push_str(
                    &t.unescape()
                        .map_err(|e| XmlRpcError::Envelope(e.to_string()))?,
                ),
                Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
                Event::Comment(_) | Event::PI(_) => continue,
                // untyped content is a string
                Event::End(e) if e.name().as_ref() == b"value" => return Ok(Value::String(text)),
                Event::Start(s) => {
                    if !text.trim().is_empty() {
                        return Err(XmlRpcError::Envelope("mixed content in <value>".into()));
                    }
                    let value = self.typed(&tag_name(&s))?;
                    self.close("value")?;
                    return Ok(value);
                }
                Event::Empty(s) => {
                    let value = empty_typed(&tag_name(&s))?;
                    self.close("value")?;
                    return Ok(value);
                }
                other => return Err(unexpected("</value>", &other)),
            }
        }
    }

    fn typed(&mut self, tag: &str) -> Result<Value, XmlRpcError> {
        match tag {
            "struct" => self.structure(),
            "array" => self.array(),
            "nil" => {
                self.close("nil")?;
                Ok(Value::Null)
            }
            scalar => {
                let text = self.text_until(scalar)?;
                scalar_value(scalar, &text)
            }
        }
    }

    fn structure(&mut self) -> Result<Value, XmlRpcError> {
        let mut map = Map::new();
        loop {
            match self.next()? {
                Event::Start(s) if is(&s, "member") => {
                    self.open("name")?;
                    let key = self.text_until("name")?;
                    self.open("value")?;
                    let value = self.value()?;
                    self.close("member")?;
                    map.insert(key, value);
                }
                Event::End(e) if e.name().as_ref() == b"struct" => return Ok(Value::Object(map)),
                other => return Err(unexpected("<member>", &other)),
            }
        }
    }

    fn array(&mut self) -> Result<Value, XmlRpcError> {
        let mut items = Vec::new();
        match self.next()? {
            Event::Start(s) if is(&s, "data") => loop {
                match self.next()? {
                    Event::Start(s) if is(&s, "value") => items.push(self.value()?),
                    Event::End(e) if e.name().as_ref() == b"data" => break,
                    other => return Err(unexpected("<value>", &other)),
                }
            },
            Event::Empty(s) if is(&s, "data") => {}
            Event::End(e) if e.name().as_ref() == b"array" => return Ok(Value::Array(items)),
            other => return Err(unexpected("<data>", &other)),
        }
        self.close("array")?;
        Ok(Value::Array(items))
    }
}

fn scalar_value(kind: &str, text: &str) -> Result<Value, XmlRpcError> {
    let invalid = || XmlRpcError::Value {
        kind: kind.to_string(),
        text: text.to_string(),
    };
    match kind {
        "int" | "i4" | "i8" => text.trim().parse::<i64>().map(Value::from).map_err(|_| invalid()),
        "boolean" => match text.trim() {
            "1" | "true" => Ok(Value::Bool(true)),
            "0" | "false" => Ok(Value::Bool(false)),
            _ => Err(invalid()),
        },
        "double" => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(invalid),
        "string" => Ok(Value::String(text.to_string())),
        "dateTime.iso8601" => parse_timestamp(text)
            .map(|ts| Value::String(ts.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true)))
            .ok_or_else(invalid),
        "base64" => {
            let cleaned: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            base64::engine::general_purpose::STANDARD
                .decode(&cleaned)
                .map(|_| Value::String(cleaned))
                .map_err(|_| invalid())
        }
        other => Err(XmlRpcError::Envelope(format!("unknown value type <{}>", other))),
    }
}

fn empty_typed(kind: &str) -> Result<Value, XmlRpcError> {
    match kind {
        "nil" => Ok(Value::Null),
        "string" | "base64" => Ok(Value::String(String::new())),
        "struct" => Ok(Value::Object(Map::new())),
        "array" => Ok(Value::Array(Vec::new())),
        other => Err(XmlRpcError::Value {
            kind: other.to_string(),
            text: String::new(),
        }),
    }
}
