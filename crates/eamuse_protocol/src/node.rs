//! The tagged tree exchanged with cabinets.
//!
//! Every request and response is a tree of [`Node`]s. A node has a name, an
//! ordered list of string attributes, an ordered list of children and a typed
//! leaf [`Value`]. Terminal nodes carry a value and no children; structural
//! nodes carry children and a [`Value::Void`] value. The in-memory type does
//! not forbid holding both, it is up to the handler code to keep them apart.

use base64::{engine::general_purpose, Engine as _};
use std::fmt;
use std::net::Ipv4Addr;

/// A typed leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Str(String),
    S8(i8),
    U8(u8),
    S16(i16),
    U16(u16),
    S32(i32),
    U32(u32),
    S64(i64),
    U64(u64),
    Bool(bool),
    Float(f32),
    Bin(Vec<u8>),
    Ip4(Ipv4Addr),
}

impl Value {
    /// Short type name used in diagnostic rendering.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Str(_) => "str",
            Value::S8(_) => "s8",
            Value::U8(_) => "u8",
            Value::S16(_) => "s16",
            Value::U16(_) => "u16",
            Value::S32(_) => "s32",
            Value::U32(_) => "u32",
            Value::S64(_) => "s64",
            Value::U64(_) => "u64",
            Value::Bool(_) => "bool",
            Value::Float(_) => "float",
            Value::Bin(_) => "bin",
            Value::Ip4(_) => "ip4",
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Widens any integer variant to `i64`.
    ///
    /// Returns `None` for non-integer values and for `u64` values that do
    /// not fit.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::S8(v) => Some(v.into()),
            Value::U8(v) => Some(v.into()),
            Value::S16(v) => Some(v.into()),
            Value::U16(v) => Some(v.into()),
            Value::S32(v) => Some(v.into()),
            Value::U32(v) => Some(v.into()),
            Value::S64(v) => Some(v),
            Value::U64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bin(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => Ok(()),
            Value::Str(s) => write!(f, "{s}"),
            Value::S8(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v}"),
            Value::S16(v) => write!(f, "{v}"),
            Value::U16(v) => write!(f, "{v}"),
            Value::S32(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}"),
            Value::S64(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{}", u8::from(*b)),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bin(b) => write!(f, "{}", general_purpose::STANDARD.encode(b)),
            Value::Ip4(ip) => write!(f, "{ip}"),
        }
    }
}

/// One node of a request or response tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
    value: Value,
}

macro_rules! leaf_constructors {
    ($($fn_name:ident => $variant:ident($ty:ty)),* $(,)?) => {
        $(
            pub fn $fn_name(name: impl Into<String>, value: $ty) -> Self {
                Self::with_value(name, Value::$variant(value))
            }
        )*
    };
}

impl Node {
    /// Creates a node with the given value and no attributes or children.
    pub fn with_value(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            value,
        }
    }

    /// Creates a structural node with no value.
    pub fn void(name: impl Into<String>) -> Self {
        Self::with_value(name, Value::Void)
    }

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_value(name, Value::Str(value.into()))
    }

    leaf_constructors! {
        s8 => S8(i8),
        u8 => U8(u8),
        s16 => S16(i16),
        u16 => U16(u16),
        s32 => S32(i32),
        u32 => U32(u32),
        s64 => S64(i64),
        u64 => U64(u64),
        bool => Bool(bool),
        float => Float(f32),
        binary => Bin(Vec<u8>),
        ipv4 => Ip4(Ipv4Addr),
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    /// A node is terminal when it has no children.
    pub fn is_terminal(&self) -> bool {
        self.children.is_empty()
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.iter().any(|(k, _)| k == key)
    }

    /// Sets an attribute. An existing key keeps its position and takes the
    /// new value.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<String> {
        let index = self.attributes.iter().position(|(k, _)| k == key)?;
        Some(self.attributes.remove(index).1)
    }

    /// Attributes in insertion order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<Node> {
        &mut self.children
    }

    pub fn add_child(&mut self, child: Node) {
        self.children.push(child);
    }

    /// Builder form of [`Node::add_child`].
    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// First child with the given name.
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Value of the first child with the given name.
    pub fn child_value(&self, name: &str) -> Option<&Value> {
        self.child(name).map(|c| &c.value)
    }

    pub fn child_str(&self, name: &str) -> Option<&str> {
        self.child_value(name).and_then(Value::as_str)
    }

    pub fn child_int(&self, name: &str) -> Option<i64> {
        self.child_value(name).and_then(Value::as_i64)
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        write!(f, "{indent}<{}", self.name)?;
        if !self.value.is_void() {
            write!(f, " __type=\"{}\"", self.value.type_name())?;
        }
        for (key, value) in &self.attributes {
            write!(f, " {key}=\"{value}\"")?;
        }

        if self.children.is_empty() {
            if self.value.is_void() {
                return writeln!(f, "/>");
            }
            return writeln!(f, ">{}</{}>", self.value, self.name);
        }

        writeln!(f, ">")?;
        if !self.value.is_void() {
            writeln!(f, "{indent}  {}", self.value)?;
        }
        for child in &self.children {
            child.render(f, depth + 1)?;
        }
        writeln!(f, "{indent}</{}>", self.name)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_overwrite_in_place() {
        let mut node = Node::void("call");
        node.set_attribute("model", "ABC:J:A:A:2020010100");
        node.set_attribute("srcid", "0101");
        node.set_attribute("model", "XYZ");

        let attrs: Vec<_> = node.attributes().collect();
        assert_eq!(attrs, vec![("model", "XYZ"), ("srcid", "0101")]);
        assert_eq!(node.attribute_count(), 2);
    }

    #[test]
    fn child_lookup_and_values() {
        let node = Node::void("item")
            .with_child(Node::string("name", "boot"))
            .with_child(Node::s32("value", -4))
            .with_child(Node::u64("time", 1_600_000_000));

        assert_eq!(node.child_str("name"), Some("boot"));
        assert_eq!(node.child_int("value"), Some(-4));
        assert_eq!(node.child_int("time"), Some(1_600_000_000));
        assert!(node.child("missing").is_none());
        assert!(!node.is_terminal());
    }

    #[test]
    fn rendering_is_depth_first() {
        let mut root = Node::void("response");
        root.set_attribute("dstid", "0101");
        root.add_child(Node::u8("flag", 1));
        root.add_child(Node::void("empty"));

        let text = root.to_string();
        assert_eq!(
            text,
            "<response dstid=\"0101\">\n  <flag __type=\"u8\">1</flag>\n  <empty/>\n</response>\n"
        );
    }

    #[test]
    fn binary_values_render_as_base64() {
        let node = Node::binary("blob", vec![1, 2, 3]);
        assert_eq!(node.to_string(), "<blob __type=\"bin\">AQID</blob>\n");
    }
}
