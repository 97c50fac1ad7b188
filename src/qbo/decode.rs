//! Response body normalization.
//!
//! QuickBooks answers with JSON or with an XML `IntuitResponse` envelope
//! depending on the endpoint and headers. Both are turned into the same
//! [`serde_json::Value`] shape before any typed decoding happens:
//!
//! * attributes become string members (`xmlns*` attributes are dropped),
//! * element text becomes a string, or a `value` member when the element
//!   also carries attributes or children (`<CustomerRef name="A">5</CustomerRef>`
//!   becomes `{"name":"A","value":"5"}`),
//! * repeated sibling elements become arrays,
//! * the `IntuitResponse` root is unwrapped.
//!
//! XML carries no scalar types, so numbers and booleans arrive as strings;
//! the typed records accept both.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde_json::{Map, Value};

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    Json,
    Xml,
}

/// Classifies a body by its first non-whitespace character.
pub fn sniff(body: &str) -> Option<BodyFormat> {
    match body.trim_start().chars().next()? {
        '{' | '[' => Some(BodyFormat::Json),
        '<' => Some(BodyFormat::Xml),
        _ => None,
    }
}

/// Parses a response body of either format into a JSON value.
pub fn normalize(body: &str) -> Result<Value, SyncError> {
    match sniff(body) {
        Some(BodyFormat::Json) => serde_json::from_str(body)
            .map_err(|e| SyncError::decode(format!("invalid JSON body: {}", e))),
        Some(BodyFormat::Xml) => xml_to_value(body),
        None => Err(SyncError::decode(format!(
            "body is neither JSON nor XML: {}",
            body.chars().take(80).collect::<String>()
        ))),
    }
}

struct Frame {
    name: String,
    members: Map<String, Value>,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> Result<Self, SyncError> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut members = Map::new();
        for attr in start.attributes() {
            let attr = attr.map_err(xml_error)?;
            let key = attr.key.as_ref();
            if key == b"xmlns" || key.starts_with(b"xmlns:") {
                continue;
            }
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value().map_err(xml_error)?.into_owned();
            members.insert(key, Value::String(value));
        }
        Ok(Self {
            name,
            members,
            text: String::new(),
        })
    }

    fn close(self) -> (String, Value) {
        let text = self.text.trim();
        let value = if self.members.is_empty() {
            if text.is_empty() {
                Value::Null
            } else {
                Value::String(text.to_string())
            }
        } else {
            let mut members = self.members;
            if !text.is_empty() {
                members.insert("value".to_string(), Value::String(text.to_string()));
            }
            Value::Object(members)
        };
        (self.name, value)
    }
}

fn insert_member(members: &mut Map<String, Value>, key: String, value: Value) {
    match members.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            members.insert(key, value);
        }
    }
}

fn xml_error(err: impl std::fmt::Display) -> SyncError {
    SyncError::decode(format!("invalid XML body: {}", err))
}

fn xml_to_value(xml: &str) -> Result<Value, SyncError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => stack.push(Frame::open(&start)?),
            Event::Empty(start) => {
                let (name, value) = Frame::open(&start)?.close();
                match stack.last_mut() {
                    Some(parent) => insert_member(&mut parent.members, name, value),
                    None => root = Some((name, value)),
                }
            }
            Event::Text(text) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&text.unescape().map_err(xml_error)?);
                }
            }
            Event::CData(data) => {
                if let Some(frame) = stack.last_mut() {
                    frame
                        .text
                        .push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| SyncError::decode("unbalanced XML end tag"))?;
                let (name, value) = frame.close();
                match stack.last_mut() {
                    Some(parent) => insert_member(&mut parent.members, name, value),
                    None => root = Some((name, value)),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(SyncError::decode("truncated XML body"));
    }

    match root {
        Some((name, value)) if name == "IntuitResponse" => match value {
            Value::Object(_) => Ok(value),
            _ => Ok(Value::Object(Map::new())),
        },
        Some((name, value)) => {
            let mut wrapper = Map::new();
            wrapper.insert(name, value);
            Ok(Value::Object(wrapper))
        }
        None => Err(SyncError::decode("empty XML body")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sniff_by_leading_character() {
        assert_eq!(sniff("  {\"a\":1}"), Some(BodyFormat::Json));
        assert_eq!(sniff("[1]"), Some(BodyFormat::Json));
        assert_eq!(sniff("\n<?xml version=\"1.0\"?><a/>"), Some(BodyFormat::Xml));
        assert_eq!(sniff("Unauthorized"), None);
        assert_eq!(sniff(""), None);
    }

    #[test]
    fn xml_invoice_envelope_normalizes_like_json() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<IntuitResponse xmlns="http://schema.intuit.com/finance/v3" time="2024-03-01T10:00:00.000-08:00">
  <Invoice domain="QBO" sparse="false">
    <Id>130</Id>
    <SyncToken>0</SyncToken>
    <DocNumber>INV/2024/0001</DocNumber>
    <CustomerRef name="Acme">5</CustomerRef>
    <Line><Id>1</Id><Amount>10.00</Amount></Line>
    <Line><Id>2</Id><Amount>5.50</Amount></Line>
  </Invoice>
</IntuitResponse>"#;

        let value = normalize(xml).unwrap();
        assert_eq!(value["time"], "2024-03-01T10:00:00.000-08:00");
        let invoice = &value["Invoice"];
        assert_eq!(invoice["Id"], "130");
        assert_eq!(invoice["domain"], "QBO");
        assert_eq!(invoice["CustomerRef"], json!({"name": "Acme", "value": "5"}));
        assert_eq!(invoice["Line"].as_array().unwrap().len(), 2);
        assert_eq!(invoice["Line"][1]["Amount"], "5.50");
        assert!(value.get("xmlns").is_none());
    }

    #[test]
    fn xml_entities_are_unescaped() {
        let xml = "<IntuitResponse><Customer><DisplayName>Smith &amp; Sons</DisplayName></Customer></IntuitResponse>";
        let value = normalize(xml).unwrap();
        assert_eq!(value["Customer"]["DisplayName"], "Smith & Sons");
    }

    #[test]
    fn non_envelope_root_is_kept_as_key() {
        let value = normalize("<Fault><Error code=\"6240\"><Message>Duplicate</Message></Error></Fault>")
            .unwrap();
        assert_eq!(value["Fault"]["Error"]["code"], "6240");
        assert_eq!(value["Fault"]["Error"]["Message"], "Duplicate");
    }

    #[test]
    fn json_passes_through() {
        let value = normalize(r#"{"QueryResponse":{"Customer":[{"Id":"5"}]}}"#).unwrap();
        assert_eq!(value["QueryResponse"]["Customer"][0]["Id"], "5");
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(normalize("oops"), Err(SyncError::Decode { .. })));
        assert!(matches!(normalize("<a><b></a>"), Err(SyncError::Decode { .. })));
    }
}
