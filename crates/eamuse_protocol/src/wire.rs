//! Binary wire format for [`Node`] trees.
//!
//! Layout (all multi-byte fields big-endian, fixed once cabinets ship):
//!
//! ```text
//! packet := 0xA0 0x42 version:u8 node
//! node   := name:str16 type:u8 value attr_count:u16 (key:str16 val:str16)* child_count:u16 node*
//! str16  := len:u16 utf8
//! ```
//!
//! Strings and blobs used as leaf values carry a `u32` length instead.

use crate::node::{Node, Value};
use std::net::Ipv4Addr;
use thiserror::Error;

/// Leading bytes of every packet.
pub const WIRE_MAGIC: [u8; 2] = [0xA0, 0x42];
/// Current packet format version.
pub const WIRE_VERSION: u8 = 0x01;
/// Maximum nesting accepted when decoding.
pub const MAX_DEPTH: usize = 64;

mod tag {
    pub const VOID: u8 = 0;
    pub const S8: u8 = 1;
    pub const U8: u8 = 2;
    pub const S16: u8 = 3;
    pub const U16: u8 = 4;
    pub const S32: u8 = 5;
    pub const U32: u8 = 6;
    pub const S64: u8 = 7;
    pub const U64: u8 = 8;
    pub const BOOL: u8 = 9;
    pub const FLOAT: u8 = 10;
    pub const STR: u8 = 11;
    pub const BIN: u8 = 12;
    pub const IP4: u8 = 13;
}

/// Errors raised while reading or writing the wire format.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("packet truncated at offset {0}")]
    Truncated(usize),
    #[error("bad packet header")]
    BadHeader,
    #[error("unsupported wire version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown value type tag {0}")]
    UnknownType(u8),
    #[error("invalid UTF-8 in packet")]
    InvalidUtf8,
    #[error("invalid boolean byte {0}")]
    InvalidBool(u8),
    #[error("tree nested deeper than {MAX_DEPTH} levels")]
    TooDeep,
    #[error("{0} trailing bytes after root node")]
    TrailingBytes(usize),
    #[error("{what} too long to encode ({len} items)")]
    TooLong { what: &'static str, len: usize },
}

/// Encodes a tree into a packet.
pub fn to_bytes(root: &Node) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(&WIRE_MAGIC);
    out.push(WIRE_VERSION);
    write_node(&mut out, root)?;
    Ok(out)
}

/// Decodes a packet into a tree.
pub fn from_bytes(data: &[u8]) -> Result<Node, WireError> {
    let mut reader = Reader::new(data);
    if reader.take(2)? != WIRE_MAGIC {
        return Err(WireError::BadHeader);
    }
    let version = reader.u8()?;
    if version != WIRE_VERSION {
        return Err(WireError::UnsupportedVersion(version));
    }

    let root = read_node(&mut reader, 0)?;
    match reader.remaining() {
        0 => Ok(root),
        n => Err(WireError::TrailingBytes(n)),
    }
}

fn write_str16(out: &mut Vec<u8>, s: &str, what: &'static str) -> Result<(), WireError> {
    let len = u16::try_from(s.len()).map_err(|_| WireError::TooLong { what, len: s.len() })?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn write_blob32(out: &mut Vec<u8>, bytes: &[u8], what: &'static str) -> Result<(), WireError> {
    let len =
        u32::try_from(bytes.len()).map_err(|_| WireError::TooLong { what, len: bytes.len() })?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

fn count16(len: usize, what: &'static str) -> Result<[u8; 2], WireError> {
    u16::try_from(len)
        .map(u16::to_be_bytes)
        .map_err(|_| WireError::TooLong { what, len })
}

fn write_value(out: &mut Vec<u8>, value: &Value) -> Result<(), WireError> {
    match value {
        Value::Void => out.push(tag::VOID),
        Value::S8(v) => {
            out.push(tag::S8);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::U8(v) => {
            out.push(tag::U8);
            out.push(*v);
        }
        Value::S16(v) => {
            out.push(tag::S16);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::U16(v) => {
            out.push(tag::U16);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::S32(v) => {
            out.push(tag::S32);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::U32(v) => {
            out.push(tag::U32);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::S64(v) => {
            out.push(tag::S64);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::U64(v) => {
            out.push(tag::U64);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::Bool(b) => {
            out.push(tag::BOOL);
            out.push(u8::from(*b));
        }
        Value::Float(v) => {
            out.push(tag::FLOAT);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::Str(s) => {
            out.push(tag::STR);
            write_blob32(out, s.as_bytes(), "string value")?;
        }
        Value::Bin(b) => {
            out.push(tag::BIN);
            write_blob32(out, b, "binary value")?;
        }
        Value::Ip4(ip) => {
            out.push(tag::IP4);
            out.extend_from_slice(&ip.octets());
        }
    }
    Ok(())
}

fn write_node(out: &mut Vec<u8>, node: &Node) -> Result<(), WireError> {
    write_str16(out, node.name(), "node name")?;
    write_value(out, node.value())?;

    out.extend_from_slice(&count16(node.attribute_count(), "attribute list")?);
    for (key, value) in node.attributes() {
        write_str16(out, key, "attribute key")?;
        write_str16(out, value, "attribute value")?;
    }

    out.extend_from_slice(&count16(node.children().len(), "child list")?);
    for child in node.children() {
        write_node(out, child)?;
    }
    Ok(())
}

/// Bounds-checked cursor over a packet.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::Truncated(self.pos));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn str16(&mut self) -> Result<String, WireError> {
        let len = usize::from(self.u16()?);
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }

    fn blob32(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.u32()? as usize;
        self.take(len)
    }
}

fn read_value(reader: &mut Reader<'_>) -> Result<Value, WireError> {
    let value = match reader.u8()? {
        tag::VOID => Value::Void,
        tag::S8 => Value::S8(i8::from_be_bytes(reader.array()?)),
        tag::U8 => Value::U8(reader.u8()?),
        tag::S16 => Value::S16(i16::from_be_bytes(reader.array()?)),
        tag::U16 => Value::U16(reader.u16()?),
        tag::S32 => Value::S32(i32::from_be_bytes(reader.array()?)),
        tag::U32 => Value::U32(reader.u32()?),
        tag::S64 => Value::S64(i64::from_be_bytes(reader.array()?)),
        tag::U64 => Value::U64(u64::from_be_bytes(reader.array()?)),
        tag::BOOL => match reader.u8()? {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            other => return Err(WireError::InvalidBool(other)),
        },
        tag::FLOAT => Value::Float(f32::from_be_bytes(reader.array()?)),
        tag::STR => {
            let bytes = reader.blob32()?;
            Value::Str(String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8)?)
        }
        tag::BIN => Value::Bin(reader.blob32()?.to_vec()),
        tag::IP4 => Value::Ip4(Ipv4Addr::from(reader.array::<4>()?)),
        other => return Err(WireError::UnknownType(other)),
    };
    Ok(value)
}

fn read_node(reader: &mut Reader<'_>, depth: usize) -> Result<Node, WireError> {
    if depth >= MAX_DEPTH {
        return Err(WireError::TooDeep);
    }

    let name = reader.str16()?;
    let value = read_value(reader)?;
    let mut node = Node::with_value(name, value);

    let attr_count = reader.u16()?;
    for _ in 0..attr_count {
        let key = reader.str16()?;
        let value = reader.str16()?;
        node.set_attribute(key, value);
    }

    let child_count = reader.u16()?;
    for _ in 0..child_count {
        node.add_child(read_node(reader, depth + 1)?);
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Node {
        let mut call = Node::void("call");
        call.set_attribute("model", "ABC:J:A:A:2020010100");
        call.set_attribute("srcid", "012010000000DEADBEEF");

        let mut event = Node::void("pcbevent");
        event.set_attribute("method", "put");
        event.add_child(Node::string("name", "boot · 起動"));
        event.add_child(Node::s8("s8", -8));
        event.add_child(Node::u16("u16", 65535));
        event.add_child(Node::s64("s64", i64::MIN));
        event.add_child(Node::bool("flag", true));
        event.add_child(Node::float("ratio", 0.25));
        event.add_child(Node::binary("blob", vec![0, 1, 2, 255]));
        event.add_child(Node::ipv4("ip", Ipv4Addr::new(10, 0, 0, 1)));
        call.add_child(event);
        call
    }

    #[test]
    fn tree_survives_encoding() {
        let tree = sample_tree();
        let bytes = to_bytes(&tree).unwrap();
        assert_eq!(&bytes[..3], &[0xA0, 0x42, 0x01]);
        assert_eq!(from_bytes(&bytes).unwrap(), tree);
    }

    #[test]
    fn integers_are_big_endian() {
        let bytes = to_bytes(&Node::u32("n", 0x0102_0304)).unwrap();
        // header(3) + name len(2) + "n"(1) + tag(1) + value(4)
        assert_eq!(&bytes[6..11], &[tag::U32, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn truncated_packets_are_rejected() {
        let bytes = to_bytes(&sample_tree()).unwrap();
        for cut in [0, 2, 3, 10, bytes.len() - 1] {
            assert!(from_bytes(&bytes[..cut]).is_err(), "cut at {cut} decoded");
        }
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let mut bytes = to_bytes(&Node::void("call")).unwrap();
        bytes.push(0);
        assert_eq!(from_bytes(&bytes), Err(WireError::TrailingBytes(1)));
    }

    #[test]
    fn unknown_tag_and_bad_header() {
        assert_eq!(from_bytes(b"<xml>"), Err(WireError::BadHeader));

        let mut bytes = to_bytes(&Node::void("x")).unwrap();
        // value tag sits right after the one-byte name
        bytes[6] = 99;
        assert_eq!(from_bytes(&bytes), Err(WireError::UnknownType(99)));
    }

    #[test]
    fn excessive_nesting_is_rejected() {
        let mut node = Node::void("leaf");
        for _ in 0..MAX_DEPTH {
            node = Node::void("wrap").with_child(node);
        }
        let bytes = to_bytes(&node).unwrap();
        assert_eq!(from_bytes(&bytes), Err(WireError::TooDeep));
    }
}
