//! Apple XML property-list adapter.
//!
//! The wire format expresses dictionaries as alternating `<key>`/value
//! siblings. That convention is normalized into an ordered `(key, value)`
//! pair representation here, on parse, and reproduced on serialize — no
//! other module touches the positional layout. The serializer emits the
//! canonical iTunes convention (tab indentation, one node per line) so that
//! repeated runs over unchanged input produce byte-identical output.

use std::fmt::Write;

use quick_xml::events::Event;
use quick_xml::Reader;

#[derive(Debug, thiserror::Error)]
#[error("plist parse error: {0}")]
pub struct PlistError(pub String);

/// One node of the property-list tree. `Dict` keeps insertion order;
/// `Date` and `Data` carry their wire text verbatim so untouched nodes
/// round-trip exactly.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Date(String),
    Data(String),
    Array(Vec<Value>),
    Dict(Vec<(String, Value)>),
}

impl Value {
    pub fn as_dict(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Dict(pairs) => Some(pairs),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Vec<(String, Value)>> {
        match self {
            Value::Dict(pairs) => Some(pairs),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// First value for `key` in a dict node.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_dict()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.as_dict_mut()?
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

struct Parser<'a> {
    reader: Reader<&'a [u8]>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            reader: Reader::from_reader(input.as_bytes()),
        }
    }

    fn err(&self, msg: impl Into<String>) -> PlistError {
        PlistError(msg.into())
    }

    /// Next structural event, skipping whitespace-only text, comments,
    /// the XML declaration and the DOCTYPE.
    fn next(&mut self) -> Result<Event<'a>, PlistError> {
        loop {
            let event = self
                .reader
                .read_event()
                .map_err(|e| PlistError(e.to_string()))?;
            match event {
                Event::Text(ref t) => {
                    let text = t.unescape().map_err(|e| PlistError(e.to_string()))?;
                    if !text.trim().is_empty() {
                        return Ok(event);
                    }
                }
                Event::Decl(_) | Event::DocType(_) | Event::Comment(_) | Event::PI(_) => {}
                _ => return Ok(event),
            }
        }
    }

    fn parse_document(&mut self) -> Result<Value, PlistError> {
        loop {
            match self.next()? {
                Event::Start(e) if e.name().as_ref() == b"plist" => break,
                Event::Eof => return Err(self.err("missing <plist> root element")),
                _ => {}
            }
        }
        let root = match self.next()? {
            Event::Start(e) => self.parse_value_from_start(&e)?,
            Event::Empty(e) => empty_value(e.name().as_ref())
                .ok_or_else(|| self.err("unexpected empty root element"))?,
            other => return Err(self.err(format!("unexpected content in <plist>: {other:?}"))),
        };
        Ok(root)
    }

    /// Parse the value whose Start event was just consumed.
    fn parse_value_from_start(
        &mut self,
        start: &quick_xml::events::BytesStart<'a>,
    ) -> Result<Value, PlistError> {
        let name = start.name().as_ref().to_vec();
        match name.as_slice() {
            b"dict" => self.parse_dict(),
            b"array" => self.parse_array(),
            b"string" => Ok(Value::String(self.read_text(b"string")?)),
            b"integer" => {
                let text = self.read_text(b"integer")?;
                let n = text
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| self.err(format!("invalid integer '{text}'")))?;
                Ok(Value::Integer(n))
            }
            b"real" => {
                let text = self.read_text(b"real")?;
                let x = text
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| self.err(format!("invalid real '{text}'")))?;
                Ok(Value::Real(x))
            }
            b"date" => Ok(Value::Date(self.read_text(b"date")?.trim().to_string())),
            b"data" => Ok(Value::Data(self.read_text(b"data")?.trim().to_string())),
            b"true" => {
                self.expect_end(b"true")?;
                Ok(Value::Boolean(true))
            }
            b"false" => {
                self.expect_end(b"false")?;
                Ok(Value::Boolean(false))
            }
            other => Err(self.err(format!(
                "unexpected element <{}>",
                String::from_utf8_lossy(other)
            ))),
        }
    }

    fn parse_dict(&mut self) -> Result<Value, PlistError> {
        let mut pairs: Vec<(String, Value)> = Vec::new();
        loop {
            match self.next()? {
                Event::End(e) if e.name().as_ref() == b"dict" => return Ok(Value::Dict(pairs)),
                Event::Start(e) if e.name().as_ref() == b"key" => {
                    let key = self.read_text(b"key")?;
                    let value = match self.next()? {
                        Event::Start(e) => self.parse_value_from_start(&e)?,
                        Event::Empty(e) => empty_value(e.name().as_ref()).ok_or_else(|| {
                            self.err(format!("key '{key}' has no value element"))
                        })?,
                        _ => return Err(self.err(format!("key '{key}' has no value element"))),
                    };
                    pairs.push((key, value));
                }
                Event::Empty(e) if e.name().as_ref() == b"key" => {
                    return Err(self.err("empty <key/> element in dict"));
                }
                Event::Eof => return Err(self.err("unterminated <dict>")),
                other => return Err(self.err(format!("unexpected content in <dict>: {other:?}"))),
            }
        }
    }

    fn parse_array(&mut self) -> Result<Value, PlistError> {
        let mut items = Vec::new();
        loop {
            match self.next()? {
                Event::End(e) if e.name().as_ref() == b"array" => return Ok(Value::Array(items)),
                Event::Start(e) => items.push(self.parse_value_from_start(&e)?),
                Event::Empty(e) => {
                    let item = empty_value(e.name().as_ref())
                        .ok_or_else(|| self.err("unexpected empty element in <array>"))?;
                    items.push(item);
                }
                Event::Eof => return Err(self.err("unterminated <array>")),
                other => return Err(self.err(format!("unexpected content in <array>: {other:?}"))),
            }
        }
    }

    /// Accumulate the text content of a scalar element up to its end tag.
    fn read_text(&mut self, tag: &[u8]) -> Result<String, PlistError> {
        let mut out = String::new();
        loop {
            let event = self
                .reader
                .read_event()
                .map_err(|e| PlistError(e.to_string()))?;
            match event {
                Event::Text(t) => {
                    out.push_str(&t.unescape().map_err(|e| PlistError(e.to_string()))?);
                }
                Event::End(e) if e.name().as_ref() == tag => return Ok(out),
                Event::Eof => {
                    return Err(self.err(format!(
                        "unterminated <{}>",
                        String::from_utf8_lossy(tag)
                    )))
                }
                other => {
                    return Err(self.err(format!(
                        "unexpected content in <{}>: {other:?}",
                        String::from_utf8_lossy(tag)
                    )))
                }
            }
        }
    }

    fn expect_end(&mut self, tag: &[u8]) -> Result<(), PlistError> {
        match self.next()? {
            Event::End(e) if e.name().as_ref() == tag => Ok(()),
            other => Err(self.err(format!(
                "expected </{}>, got {other:?}",
                String::from_utf8_lossy(tag)
            ))),
        }
    }
}

/// Values that may appear as self-closing tags.
fn empty_value(name: &[u8]) -> Option<Value> {
    match name {
        b"true" => Some(Value::Boolean(true)),
        b"false" => Some(Value::Boolean(false)),
        b"dict" => Some(Value::Dict(Vec::new())),
        b"array" => Some(Value::Array(Vec::new())),
        b"string" => Some(Value::String(String::new())),
        b"data" => Some(Value::Data(String::new())),
        _ => None,
    }
}

/// Parse an XML property list into a `Value` tree.
pub fn parse(input: &str) -> Result<Value, PlistError> {
    Parser::new(input).parse_document()
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

const DOCTYPE: &str = "<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \
\"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">";

/// Escape text content for element bodies.
fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn write_value(out: &mut String, value: &Value, level: usize) {
    let indent = "\t".repeat(level);
    match value {
        Value::String(s) => {
            writeln!(out, "{indent}<string>{}</string>", xml_escape(s)).unwrap();
        }
        Value::Integer(n) => writeln!(out, "{indent}<integer>{n}</integer>").unwrap(),
        Value::Real(x) => writeln!(out, "{indent}<real>{x}</real>").unwrap(),
        Value::Boolean(true) => writeln!(out, "{indent}<true/>").unwrap(),
        Value::Boolean(false) => writeln!(out, "{indent}<false/>").unwrap(),
        Value::Date(d) => writeln!(out, "{indent}<date>{}</date>", xml_escape(d)).unwrap(),
        Value::Data(d) => writeln!(out, "{indent}<data>{}</data>", xml_escape(d)).unwrap(),
        Value::Array(items) => {
            if items.is_empty() {
                writeln!(out, "{indent}<array/>").unwrap();
                return;
            }
            writeln!(out, "{indent}<array>").unwrap();
            for item in items {
                write_value(out, item, level + 1);
            }
            writeln!(out, "{indent}</array>").unwrap();
        }
        Value::Dict(pairs) => {
            if pairs.is_empty() {
                writeln!(out, "{indent}<dict/>").unwrap();
                return;
            }
            writeln!(out, "{indent}<dict>").unwrap();
            for (key, val) in pairs {
                writeln!(out, "{indent}\t<key>{}</key>", xml_escape(key)).unwrap();
                write_value(out, val, level + 1);
            }
            writeln!(out, "{indent}</dict>").unwrap();
        }
    }
}

/// Serialize a `Value` tree in the canonical iTunes plist form.
pub fn serialize(root: &Value) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(DOCTYPE);
    out.push('\n');
    out.push_str("<plist version=\"1.0\">\n");
    write_value(&mut out, root, 0);
    out.push_str("</plist>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc() -> String {
        let root = Value::Dict(vec![
            ("Major Version".to_string(), Value::Integer(1)),
            (
                "Application Version".to_string(),
                Value::String("12.9.0.167".to_string()),
            ),
            ("Show Content Ratings".to_string(), Value::Boolean(true)),
            (
                "Tracks".to_string(),
                Value::Dict(vec![(
                    "1001".to_string(),
                    Value::Dict(vec![
                        ("Track ID".to_string(), Value::Integer(1001)),
                        ("Name".to_string(), Value::String("A & B <test>".to_string())),
                        (
                            "Date Added".to_string(),
                            Value::Date("2021-04-03T10:11:12Z".to_string()),
                        ),
                    ]),
                )]),
            ),
            (
                "Playlists".to_string(),
                Value::Array(vec![Value::Dict(vec![
                    ("Name".to_string(), Value::String("Mix".to_string())),
                    (
                        "Playlist Items".to_string(),
                        Value::Array(vec![Value::Dict(vec![(
                            "Track ID".to_string(),
                            Value::Integer(1001),
                        )])]),
                    ),
                ])]),
            ),
        ]);
        serialize(&root)
    }

    #[test]
    fn round_trip_is_byte_identical() {
        let doc = sample_doc();
        let parsed = parse(&doc).expect("canonical document should parse");
        assert_eq!(serialize(&parsed), doc);
    }

    #[test]
    fn dict_preserves_key_order() {
        let doc = sample_doc();
        let parsed = parse(&doc).unwrap();
        let keys: Vec<&str> = parsed
            .as_dict()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(
            keys,
            [
                "Major Version",
                "Application Version",
                "Show Content Ratings",
                "Tracks",
                "Playlists"
            ]
        );
    }

    #[test]
    fn escaped_text_round_trips() {
        let parsed = parse(&sample_doc()).unwrap();
        let name = parsed
            .get("Tracks")
            .and_then(|t| t.get("1001"))
            .and_then(|t| t.get("Name"))
            .and_then(Value::as_str)
            .unwrap();
        assert_eq!(name, "A & B <test>");
    }

    #[test]
    fn parses_self_closing_scalars_and_composites() {
        let doc = "<?xml version=\"1.0\"?>\n<plist version=\"1.0\">\n<dict>\n\
                   <key>a</key><true/>\n<key>b</key><false/>\n\
                   <key>c</key><array/>\n<key>d</key><dict/>\n</dict>\n</plist>";
        let parsed = parse(doc).expect("self-closing forms should parse");
        assert_eq!(parsed.get("a"), Some(&Value::Boolean(true)));
        assert_eq!(parsed.get("b"), Some(&Value::Boolean(false)));
        assert_eq!(parsed.get("c"), Some(&Value::Array(Vec::new())));
        assert_eq!(parsed.get("d"), Some(&Value::Dict(Vec::new())));
    }

    #[test]
    fn accepts_doctype_and_whitespace() {
        let doc = sample_doc();
        assert!(doc.contains("DOCTYPE plist"));
        parse(&doc).expect("document with DOCTYPE should parse");
    }

    #[test]
    fn rejects_missing_plist_root() {
        let err = parse("<?xml version=\"1.0\"?><dict></dict>").unwrap_err();
        assert!(err.to_string().contains("plist"), "got: {err}");
    }

    #[test]
    fn rejects_unterminated_dict() {
        let doc = "<plist version=\"1.0\"><dict><key>a</key><integer>1</integer>";
        assert!(parse(doc).is_err());
    }

    #[test]
    fn rejects_key_without_value() {
        let doc = "<plist version=\"1.0\"><dict><key>a</key></dict></plist>";
        let err = parse(doc).unwrap_err();
        assert!(err.to_string().contains("no value"), "got: {err}");
    }

    #[test]
    fn unrecognized_subtrees_are_carried_through() {
        let doc = sample_doc();
        let mut parsed = parse(&doc).unwrap();
        // An untouched document serializes back identically even when other
        // nodes were read or navigated in between.
        let _ = parsed.get_mut("Tracks");
        assert_eq!(serialize(&parsed), doc);
    }
}
