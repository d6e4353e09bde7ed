//! Ordered, repeatable-key metadata trees and their document serializers.

use serde_json::{Map, Value};

/// One metadata value: text, or a nested group.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Text(String),
    List(MetadataTree),
}

/// Ordered key/value tree. Keys may repeat; insertion order is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataTree {
    entries: Vec<(String, MetadataValue)>,
}

impl MetadataTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: MetadataValue) {
        self.entries.push((key.into(), value));
    }

    pub fn push_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.push(key, MetadataValue::Text(value.into()));
    }

    pub fn push_group(&mut self, key: impl Into<String>, group: MetadataTree) {
        self.push(key, MetadataValue::List(group));
    }

    pub fn entries(&self) -> &[(String, MetadataValue)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// First text value stored under `key`.
    pub fn get_text(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            MetadataValue::Text(text) => Some(text),
            MetadataValue::List(_) => None,
        }
    }

    /// Every value stored under `key`, in order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a MetadataValue> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

/// Serializes a metadata tree into one structured document.
pub trait MetadataSerializer {
    /// File extension of produced documents, without the dot.
    fn extension(&self) -> &'static str;

    /// Render `tree` as a document whose root element is `root`.
    fn serialize(&self, root: &str, tree: &MetadataTree) -> String;
}

/// Selectable document format of metadata files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataFormat {
    #[default]
    Json,
    Xml,
}

impl MetadataFormat {
    pub fn serializer(&self) -> &'static dyn MetadataSerializer {
        match self {
            Self::Json => &JsonSerializer,
            Self::Xml => &XmlSerializer,
        }
    }

    pub fn extension(&self) -> &'static str {
        self.serializer().extension()
    }

    pub fn serialize(&self, root: &str, tree: &MetadataTree) -> String {
        self.serializer().serialize(root, tree)
    }
}

/// JSON documents: `{ "<root>": { ... } }`; repeated keys become arrays.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl MetadataSerializer for JsonSerializer {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn serialize(&self, root: &str, tree: &MetadataTree) -> String {
        let mut document = Map::new();
        document.insert(root.to_string(), tree_to_json(tree));
        let mut out = serde_json::to_string_pretty(&Value::Object(document))
            .unwrap_or_else(|_| String::from("{}"));
        out.push('\n');
        out
    }
}

fn tree_to_json(tree: &MetadataTree) -> Value {
    let mut map = Map::new();
    for (key, value) in tree.entries() {
        let value = match value {
            MetadataValue::Text(text) => Value::String(text.clone()),
            MetadataValue::List(group) => tree_to_json(group),
        };
        match map.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key.clone(), value);
            }
        }
    }
    Value::Object(map)
}

/// XML documents with one element per entry, indented by two spaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlSerializer;

impl MetadataSerializer for XmlSerializer {
    fn extension(&self) -> &'static str {
        "xml"
    }

    fn serialize(&self, root: &str, tree: &MetadataTree) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        let root = element_name(root);
        out.push_str(&format!("<{root}>\n"));
        write_xml_entries(&mut out, tree, 1);
        out.push_str(&format!("</{root}>\n"));
        out
    }
}

fn write_xml_entries(out: &mut String, tree: &MetadataTree, depth: usize) {
    let indent = "  ".repeat(depth);
    for (key, value) in tree.entries() {
        let name = element_name(key);
        match value {
            MetadataValue::Text(text) => {
                let clean: String = text.chars().filter(|c| is_xml_char(*c)).collect();
                out.push_str(&format!(
                    "{indent}<{name}>{}</{name}>\n",
                    quick_xml::escape::escape(clean.as_str())
                ));
            }
            MetadataValue::List(group) if group.is_empty() => {
                out.push_str(&format!("{indent}<{name}/>\n"));
            }
            MetadataValue::List(group) => {
                out.push_str(&format!("{indent}<{name}>\n"));
                write_xml_entries(out, group, depth + 1);
                out.push_str(&format!("{indent}</{name}>\n"));
            }
        }
    }
}

/// Characters allowed in XML 1.0 documents.
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}')
}

fn element_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !name.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        name.insert(0, '_');
    }
    name
}
