//! Wire format strategy for request/response bodies
//!
//! Every service speaks the same envelope convention: a create request for a
//! network is `{"network": {...}}`, a listing response is
//! `{"networks": [...]}`. The XML rendition nests the same structure in
//! elements (`<network><name>n</name></network>`,
//! `<networks><network>...</network></networks>`).
//!
//! Clients hold a `WireFormat` value chosen by the `interface` config option
//! and route every body through it, so each behavioral test runs identically
//! under both formats. Attribute maps are untyped (`serde_json::Map`) because
//! the service owns the schema; the harness only observes it.
//!
//! XML scalars have no type markers, so decoded text is coerced to
//! bool/integer/float when it parses as one. That keeps assertions like
//! `attrs["gigabytes"] == 50` format-independent.

use crate::error::{HarnessError, Result};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attribute mapping returned by the service for a single resource.
pub type Attributes = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    Json,
    Xml,
}

impl WireFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            WireFormat::Json => "application/json",
            WireFormat::Xml => "application/xml",
        }
    }

    /// Serialize a single-resource envelope: `{"<root>": {attrs}}`.
    pub fn encode(&self, root: &str, attrs: &Attributes) -> Result<String> {
        match self {
            WireFormat::Json => {
                let mut envelope = Map::new();
                envelope.insert(root.to_string(), Value::Object(attrs.clone()));
                Ok(serde_json::to_string(&Value::Object(envelope))?)
            }
            WireFormat::Xml => Ok(format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>{}",
                xml_element(root, &Value::Object(attrs.clone()))
            )),
        }
    }

    /// Parse a single-resource envelope back into its attribute map.
    pub fn decode(&self, root: &str, body: &str) -> Result<Attributes> {
        let value = self.parse_envelope(root, body)?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(HarnessError::BadBody(format!(
                "expected object under '{}', got {}",
                root, other
            ))),
        }
    }

    /// Parse a listing envelope: `{"<root>": [ {...}, ... ]}` in JSON,
    /// repeated `<item>` children of `<root>` in XML.
    ///
    /// Non-item children (e.g. pagination links in XML listings) are
    /// silently skipped; callers that care about result-set size count
    /// entries with an `id` attribute.
    pub fn decode_list(&self, root: &str, item: &str, body: &str) -> Result<Vec<Attributes>> {
        match self {
            WireFormat::Json => {
                let value: Value = serde_json::from_str(body)?;
                let list = value.get(root).cloned().ok_or_else(|| {
                    HarnessError::BadBody(format!("missing '{}' envelope", root))
                })?;
                match list {
                    Value::Array(items) => items
                        .into_iter()
                        .map(|v| match v {
                            Value::Object(map) => Ok(map),
                            other => Err(HarnessError::BadBody(format!(
                                "non-object entry in '{}': {}",
                                root, other
                            ))),
                        })
                        .collect(),
                    other => Err(HarnessError::BadBody(format!(
                        "expected array under '{}', got {}",
                        root, other
                    ))),
                }
            }
            WireFormat::Xml => {
                let doc = parse_xml_document(body)?;
                let inner = doc.get(root).cloned().ok_or_else(|| {
                    HarnessError::BadBody(format!("missing '{}' element", root))
                })?;
                let entries = match inner {
                    Value::Object(map) => match map.get(item).cloned() {
                        Some(Value::Array(items)) => items,
                        Some(single) => vec![single],
                        None => vec![],
                    },
                    // <servers/> with no children decodes as an empty scalar
                    _ => vec![],
                };
                entries
                    .into_iter()
                    .map(|v| match v {
                        Value::Object(map) => Ok(map),
                        other => Err(HarnessError::BadBody(format!(
                            "non-object '{}' entry: {}",
                            item, other
                        ))),
                    })
                    .collect()
            }
        }
    }

    fn parse_envelope(&self, root: &str, body: &str) -> Result<Value> {
        match self {
            WireFormat::Json => {
                let value: Value = serde_json::from_str(body)?;
                value
                    .get(root)
                    .cloned()
                    .ok_or_else(|| HarnessError::BadBody(format!("missing '{}' envelope", root)))
            }
            WireFormat::Xml => {
                let doc = parse_xml_document(body)?;
                doc.get(root)
                    .cloned()
                    .ok_or_else(|| HarnessError::BadBody(format!("missing '{}' element", root)))
            }
        }
    }
}

fn xml_element(name: &str, value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut out = format!("<{}>", name);
            for (key, child) in map {
                match child {
                    // arrays render as repeated sibling elements
                    Value::Array(items) => {
                        for item in items {
                            out.push_str(&xml_element(key, item));
                        }
                    }
                    other => out.push_str(&xml_element(key, other)),
                }
            }
            out.push_str(&format!("</{}>", name));
            out
        }
        Value::Null => format!("<{}/>", name),
        Value::String(s) => format!("<{}>{}</{}>", name, escape(s.as_str()), name),
        other => format!("<{}>{}</{}>", name, other, name),
    }
}

/// Parse an XML document into `{root_name: value}`.
///
/// Element attributes and child elements both land in the map (the service's
/// XML dialect uses attributes for scalar fields on list items). Leaf text is
/// coerced to bool/number when it parses as one.
fn parse_xml_document(body: &str) -> Result<Attributes> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut doc = Map::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                let mut map = Map::new();
                collect_attributes(&e, &mut map)?;
                let value = parse_element(&mut reader, map)?;
                insert_multi(&mut doc, name, value);
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                let mut map = Map::new();
                collect_attributes(&e, &mut map)?;
                insert_multi(&mut doc, name, Value::Object(map));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(HarnessError::BadBody(format!("XML parse error: {}", e))),
        }
    }
    Ok(doc)
}

fn parse_element(reader: &mut Reader<&[u8]>, mut map: Attributes) -> Result<Value> {
    let mut text = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                let mut child_map = Map::new();
                collect_attributes(&e, &mut child_map)?;
                let child = parse_element(reader, child_map)?;
                insert_multi(&mut map, name, child);
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                let mut child_map = Map::new();
                collect_attributes(&e, &mut child_map)?;
                insert_multi(&mut map, name, Value::Object(child_map));
            }
            Ok(Event::Text(t)) => {
                let unescaped = t
                    .unescape()
                    .map_err(|e| HarnessError::BadBody(format!("XML text error: {}", e)))?;
                text.push_str(&unescaped);
            }
            Ok(Event::End(_)) | Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(HarnessError::BadBody(format!("XML parse error: {}", e))),
        }
    }

    if map.is_empty() {
        Ok(coerce_scalar(text.trim()))
    } else {
        Ok(Value::Object(map))
    }
}

fn collect_attributes(e: &quick_xml::events::BytesStart<'_>, map: &mut Attributes) -> Result<()> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| HarnessError::BadBody(format!("XML attribute error: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
        // namespace declarations are wire noise, not resource attributes
        if key == "xmlns" {
            continue;
        }
        let value = attr
            .unescape_value()
            .map_err(|e| HarnessError::BadBody(format!("XML attribute error: {}", e)))?;
        map.insert(key, coerce_scalar(&value));
    }
    Ok(())
}

/// Repeated sibling elements accumulate into an array under one key.
fn insert_multi(map: &mut Attributes, key: String, value: Value) {
    match map.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let prior = existing.take();
            *existing = Value::Array(vec![prior, value]);
        }
        None => {
            map.insert(key, value);
        }
    }
}

fn coerce_scalar(text: &str) -> Value {
    if text.is_empty() {
        return Value::String(String::new());
    }
    if text == "true" {
        return Value::Bool(true);
    }
    if text == "false" {
        return Value::Bool(false);
    }
    if let Ok(n) = text.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(f) = text.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn json_envelope_encode() {
        let body = WireFormat::Json
            .encode("network", &attrs(json!({"name": "net-1"})))
            .unwrap();
        let parsed: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["network"]["name"], "net-1");
    }

    #[test]
    fn json_list_decode() {
        let body = r#"{"servers": [{"id": "a"}, {"id": "b"}]}"#;
        let servers = WireFormat::Json.decode_list("servers", "server", body).unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[1]["id"], "b");
    }

    #[test]
    fn xml_envelope_roundtrip() {
        let format = WireFormat::Xml;
        let body = format
            .encode("subnet", &attrs(json!({"cidr": "10.0.0.0/24", "ip_version": 4})))
            .unwrap();
        let decoded = format.decode("subnet", &body).unwrap();
        assert_eq!(decoded["cidr"], "10.0.0.0/24");
        // numeric text coerces back to a number
        assert_eq!(decoded["ip_version"], json!(4));
    }

    #[test]
    fn xml_list_skips_non_item_elements() {
        // listings can carry link elements alongside the items
        let body = r#"<servers>
            <server id="s1" name="one"/>
            <server id="s2" name="two"/>
            <servers_links href="next"/>
        </servers>"#;
        let servers = WireFormat::Xml.decode_list("servers", "server", body).unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0]["id"], "s1");
        assert_eq!(servers[1]["name"], "two");
    }

    #[test]
    fn xml_single_item_list() {
        let body = r#"<networks><network><id>n1</id></network></networks>"#;
        let networks = WireFormat::Xml
            .decode_list("networks", "network", body)
            .unwrap();
        assert_eq!(networks.len(), 1);
        assert_eq!(networks[0]["id"], "n1");
    }

    #[test]
    fn xml_empty_list() {
        let body = r#"<volumes></volumes>"#;
        let volumes = WireFormat::Xml.decode_list("volumes", "volume", body).unwrap();
        assert!(volumes.is_empty());
    }

    #[test]
    fn missing_envelope_is_bad_body() {
        let err = WireFormat::Json
            .decode("volume", r#"{"snapshot": {}}"#)
            .unwrap_err();
        assert!(matches!(err, HarnessError::BadBody(_)));
    }

    #[test]
    fn xml_escapes_text() {
        let body = WireFormat::Xml
            .encode("network", &attrs(json!({"name": "a<b&c"})))
            .unwrap();
        assert!(body.contains("a&lt;b&amp;c"));
        let decoded = WireFormat::Xml.decode("network", &body).unwrap();
        assert_eq!(decoded["name"], "a<b&c");
    }
}
