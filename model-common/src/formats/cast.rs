//! Cast binary scene-graph format (.cast)
//!
//! A hierarchical node tree with typed, named properties. Every node records
//! its own byte size so readers can skip whole subtrees without decoding them.
//!
//! # Layout
//! ```text
//! File header (16 bytes)
//! 0x00: magic u32 (0x74736163, "cast")
//! 0x04: version u32 (1)
//! 0x08: root_node_count u32
//! 0x0C: flags u32 (0)
//!
//! Node header (24 bytes)
//! 0x00: identifier u32 (CastNodeId)
//! 0x04: node_size u32 (header + properties + children)
//! 0x08: hash u64
//! 0x10: property_count u32
//! 0x14: child_count u32
//!
//! Property header (8 bytes)
//! 0x00: identifier u16 (CastPropertyId)
//! 0x02: name_size u16
//! 0x04: element_count u32
//! 0x08: name (name_size bytes, no terminator)
//! var:  payload
//! ```
//!
//! Properties are always written in lexicographic order of their names, which
//! makes the encoded bytes a pure function of the node tree.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail, ensure};
use glam::{Vec2, Vec3, Vec4};

use super::ByteReader;

/// Node kind, stored as a 4-byte little-endian tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CastNodeId {
    Root = 0x746F_6F72,
    Model = 0x6C64_6F6D,
    Mesh = 0x6873_656D,
    BlendShape = 0x6873_6C62,
    Skeleton = 0x6C65_6B73,
    Bone = 0x656E_6F62,
    Material = 0x6C74_616D,
}

impl CastNodeId {
    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0x746F_6F72 => Some(Self::Root),
            0x6C64_6F6D => Some(Self::Model),
            0x6873_656D => Some(Self::Mesh),
            0x6873_6C62 => Some(Self::BlendShape),
            0x6C65_6B73 => Some(Self::Skeleton),
            0x656E_6F62 => Some(Self::Bone),
            0x6C74_616D => Some(Self::Material),
            _ => None,
        }
    }
}

/// Property value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CastPropertyId {
    Byte = b'b' as u16,
    Short = b'h' as u16,
    Integer32 = b'i' as u16,
    Integer64 = b'l' as u16,
    Float = b'f' as u16,
    Double = b'd' as u16,
    String = b's' as u16,
    Vector2 = 0x7632,
    Vector3 = 0x7633,
    Vector4 = 0x7634,
}

impl CastPropertyId {
    pub fn tag(self) -> u16 {
        self as u16
    }

    pub fn from_tag(tag: u16) -> Option<Self> {
        const BYTE: u16 = b'b' as u16;
        const SHORT: u16 = b'h' as u16;
        const INTEGER32: u16 = b'i' as u16;
        const INTEGER64: u16 = b'l' as u16;
        const FLOAT: u16 = b'f' as u16;
        const DOUBLE: u16 = b'd' as u16;
        const STRING: u16 = b's' as u16;

        match tag {
            BYTE => Some(Self::Byte),
            SHORT => Some(Self::Short),
            INTEGER32 => Some(Self::Integer32),
            INTEGER64 => Some(Self::Integer64),
            FLOAT => Some(Self::Float),
            DOUBLE => Some(Self::Double),
            STRING => Some(Self::String),
            0x7632 => Some(Self::Vector2),
            0x7633 => Some(Self::Vector3),
            0x7634 => Some(Self::Vector4),
            _ => None,
        }
    }

    /// Size of one element in bytes, `None` for variable-length strings
    pub fn element_size(self) -> Option<usize> {
        match self {
            Self::Byte => Some(1),
            Self::Short => Some(2),
            Self::Integer32 | Self::Float => Some(4),
            Self::Integer64 | Self::Double | Self::Vector2 => Some(8),
            Self::Vector3 => Some(12),
            Self::Vector4 => Some(16),
            Self::String => None,
        }
    }
}

/// A typed property: identifier, element count and raw little-endian payload.
///
/// Properties are only built through the typed constructors below, one per
/// value type, so the payload always matches the identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct CastProperty {
    id: CastPropertyId,
    elements: u32,
    buffer: Vec<u8>,
}

impl CastProperty {
    fn with_capacity(id: CastPropertyId, elements: usize, bytes: usize) -> Self {
        Self {
            id,
            elements: elements as u32,
            buffer: Vec::with_capacity(bytes),
        }
    }

    pub fn bytes(values: &[u8]) -> Self {
        Self {
            id: CastPropertyId::Byte,
            elements: values.len() as u32,
            buffer: values.to_vec(),
        }
    }

    pub fn shorts(values: &[u16]) -> Self {
        let mut prop = Self::with_capacity(CastPropertyId::Short, values.len(), values.len() * 2);
        for v in values {
            prop.buffer.extend_from_slice(&v.to_le_bytes());
        }
        prop
    }

    pub fn ints(values: &[i32]) -> Self {
        let mut prop =
            Self::with_capacity(CastPropertyId::Integer32, values.len(), values.len() * 4);
        for v in values {
            prop.buffer.extend_from_slice(&v.to_le_bytes());
        }
        prop
    }

    pub fn int(value: i32) -> Self {
        Self::ints(&[value])
    }

    pub fn longs(values: &[u64]) -> Self {
        let mut prop =
            Self::with_capacity(CastPropertyId::Integer64, values.len(), values.len() * 8);
        for v in values {
            prop.buffer.extend_from_slice(&v.to_le_bytes());
        }
        prop
    }

    pub fn long(value: u64) -> Self {
        Self::longs(&[value])
    }

    pub fn floats(values: &[f32]) -> Self {
        let mut prop = Self::with_capacity(CastPropertyId::Float, values.len(), values.len() * 4);
        for v in values {
            prop.buffer.extend_from_slice(&v.to_le_bytes());
        }
        prop
    }

    pub fn float(value: f32) -> Self {
        Self::floats(&[value])
    }

    pub fn doubles(values: &[f64]) -> Self {
        let mut prop = Self::with_capacity(CastPropertyId::Double, values.len(), values.len() * 8);
        for v in values {
            prop.buffer.extend_from_slice(&v.to_le_bytes());
        }
        prop
    }

    /// Single null-terminated string (one element)
    pub fn string(value: &str) -> Self {
        let mut prop = Self::with_capacity(CastPropertyId::String, 1, value.len() + 1);
        prop.buffer.extend_from_slice(value.as_bytes());
        prop.buffer.push(0);
        prop
    }

    pub fn vector2s(values: &[Vec2]) -> Self {
        let mut prop = Self::with_capacity(CastPropertyId::Vector2, values.len(), values.len() * 8);
        for v in values {
            for c in v.to_array() {
                prop.buffer.extend_from_slice(&c.to_le_bytes());
            }
        }
        prop
    }

    pub fn vector3s(values: &[Vec3]) -> Self {
        let mut prop =
            Self::with_capacity(CastPropertyId::Vector3, values.len(), values.len() * 12);
        for v in values {
            for c in v.to_array() {
                prop.buffer.extend_from_slice(&c.to_le_bytes());
            }
        }
        prop
    }

    pub fn vector3(value: Vec3) -> Self {
        Self::vector3s(&[value])
    }

    pub fn vector4s(values: &[Vec4]) -> Self {
        let mut prop =
            Self::with_capacity(CastPropertyId::Vector4, values.len(), values.len() * 16);
        for v in values {
            for c in v.to_array() {
                prop.buffer.extend_from_slice(&c.to_le_bytes());
            }
        }
        prop
    }

    pub fn vector4(value: Vec4) -> Self {
        Self::vector4s(&[value])
    }

    /// Unsigned indices stored with the narrowest of byte/short/int32 that
    /// holds the largest value
    pub fn indices(values: &[u32]) -> Self {
        let max = values.iter().copied().max().unwrap_or(0);
        if max <= u32::from(u8::MAX) {
            Self::bytes(&values.iter().map(|&v| v as u8).collect::<Vec<_>>())
        } else if max <= u32::from(u16::MAX) {
            Self::shorts(&values.iter().map(|&v| v as u16).collect::<Vec<_>>())
        } else {
            Self::ints(&values.iter().map(|&v| v as i32).collect::<Vec<_>>())
        }
    }

    pub fn id(&self) -> CastPropertyId {
        self.id
    }

    pub fn elements(&self) -> u32 {
        self.elements
    }

    /// Raw little-endian payload
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// First string of a string property
    pub fn as_str(&self) -> Option<&str> {
        if self.id != CastPropertyId::String {
            return None;
        }
        let end = self.buffer.iter().position(|&b| b == 0)?;
        std::str::from_utf8(&self.buffer[..end]).ok()
    }

    /// Values of any integer property. Byte and short payloads are unsigned,
    /// int32 is signed, int64 is reinterpreted from its unsigned bits.
    pub fn integers(&self) -> Option<Vec<i64>> {
        let chunks = self.buffer.chunks_exact(self.id.element_size()?);
        let values = match self.id {
            CastPropertyId::Byte => chunks.map(|c| i64::from(c[0])).collect(),
            CastPropertyId::Short => chunks
                .map(|c| i64::from(u16::from_le_bytes([c[0], c[1]])))
                .collect(),
            CastPropertyId::Integer32 => chunks
                .map(|c| i64::from(i32::from_le_bytes([c[0], c[1], c[2], c[3]])))
                .collect(),
            CastPropertyId::Integer64 => chunks
                .map(|c| u64::from_le_bytes(le_array(c)) as i64)
                .collect(),
            _ => return None,
        };
        Some(values)
    }

    /// Integer values as unsigned indices; `None` if any value is negative
    pub fn indices_u32(&self) -> Option<Vec<u32>> {
        self.integers()?
            .into_iter()
            .map(|v| u32::try_from(v).ok())
            .collect()
    }

    pub fn first_integer(&self) -> Option<i64> {
        self.integers()?.first().copied()
    }

    /// First value of an int64 property as unsigned bits (hashes)
    pub fn first_u64(&self) -> Option<u64> {
        if self.id != CastPropertyId::Integer64 {
            return None;
        }
        self.buffer.get(..8).map(|c| u64::from_le_bytes(le_array(c)))
    }

    /// Values of a float or double property
    pub fn floats_f32(&self) -> Option<Vec<f32>> {
        match self.id {
            CastPropertyId::Float => Some(self.f32_values()),
            CastPropertyId::Double => Some(
                self.buffer
                    .chunks_exact(8)
                    .map(|c| f64::from_le_bytes(le_array(c)) as f32)
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn vector2s_values(&self) -> Option<Vec<Vec2>> {
        (self.id == CastPropertyId::Vector2).then(|| {
            self.f32_values()
                .chunks_exact(2)
                .map(Vec2::from_slice)
                .collect()
        })
    }

    pub fn vector3s_values(&self) -> Option<Vec<Vec3>> {
        (self.id == CastPropertyId::Vector3).then(|| {
            self.f32_values()
                .chunks_exact(3)
                .map(Vec3::from_slice)
                .collect()
        })
    }

    pub fn vector4s_values(&self) -> Option<Vec<Vec4>> {
        (self.id == CastPropertyId::Vector4).then(|| {
            self.f32_values()
                .chunks_exact(4)
                .map(Vec4::from_slice)
                .collect()
        })
    }

    fn f32_values(&self) -> Vec<f32> {
        self.buffer
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// Header + name + payload, in bytes
    fn encoded_size(&self, name: &str) -> usize {
        CastNode::PROPERTY_HEADER_SIZE + name.len() + self.buffer.len()
    }

    fn read(reader: &mut ByteReader) -> Result<(String, Self)> {
        let offset = reader.position();
        let tag = reader.read_u16()?;
        let name_size = reader.read_u16()? as usize;
        let elements = reader.read_u32()?;

        let id = CastPropertyId::from_tag(tag)
            .with_context(|| format!("Unknown property type 0x{:04X} at offset {}", tag, offset))?;

        let name = std::str::from_utf8(reader.take(name_size)?)
            .with_context(|| format!("Invalid property name at offset {}", offset))?
            .to_owned();

        let buffer = match id.element_size() {
            Some(size) => reader.take(size * elements as usize)?.to_vec(),
            None => {
                let mut bytes = Vec::new();
                for _ in 0..elements {
                    bytes.extend_from_slice(reader.read_cstr()?.as_bytes());
                    bytes.push(0);
                }
                bytes
            }
        };

        Ok((
            name,
            Self {
                id,
                elements,
                buffer,
            },
        ))
    }
}

fn le_array(chunk: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(chunk);
    out
}

/// A node of the scene graph
#[derive(Debug, Clone, PartialEq)]
pub struct CastNode {
    pub id: CastNodeId,
    /// Identity used for cross references (e.g. mesh -> material)
    pub hash: u64,
    /// Ordered by name; iteration order is the write order
    pub properties: BTreeMap<String, CastProperty>,
    pub children: Vec<CastNode>,
}

impl CastNode {
    pub const HEADER_SIZE: usize = 24;
    pub const PROPERTY_HEADER_SIZE: usize = 8;
    /// Deepest nesting accepted when decoding (root -> model -> skeleton -> bone
    /// needs 4)
    pub const MAX_DEPTH: usize = 64;

    pub fn new(id: CastNodeId) -> Self {
        Self::with_hash(id, 0)
    }

    pub fn with_hash(id: CastNodeId, hash: u64) -> Self {
        Self {
            id,
            hash,
            properties: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Set (or replace) a property
    pub fn set_property(&mut self, name: impl Into<String>, property: CastProperty) {
        self.properties.insert(name.into(), property);
    }

    pub fn property(&self, name: &str) -> Option<&CastProperty> {
        self.properties.get(name)
    }

    /// String value of a property, if present and a string
    pub fn string_property(&self, name: &str) -> Option<&str> {
        self.property(name).and_then(CastProperty::as_str)
    }

    /// Append a child and return it for further population
    pub fn add_node(&mut self, node: CastNode) -> &mut CastNode {
        self.children.push(node);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    pub fn children_of(&self, id: CastNodeId) -> impl Iterator<Item = &CastNode> {
        self.children.iter().filter(move |c| c.id == id)
    }

    /// Encoded size in bytes: header, every property (header + name +
    /// payload) and every child, recursively
    pub fn size(&self) -> usize {
        Self::HEADER_SIZE
            + self
                .properties
                .iter()
                .map(|(name, prop)| prop.encoded_size(name))
                .sum::<usize>()
            + self.children.iter().map(CastNode::size).sum::<usize>()
    }

    fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        let start = out.len();
        let size = u32::try_from(self.size())
            .with_context(|| format!("{:?} node exceeds the 4 GiB node size limit", self.id))?;

        out.extend_from_slice(&self.id.tag().to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&self.hash.to_le_bytes());
        out.extend_from_slice(&(self.properties.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.children.len() as u32).to_le_bytes());

        for (name, prop) in &self.properties {
            let name_size = u16::try_from(name.len())
                .with_context(|| format!("Property name too long: {}", name))?;
            out.extend_from_slice(&prop.id.tag().to_le_bytes());
            out.extend_from_slice(&name_size.to_le_bytes());
            out.extend_from_slice(&prop.elements.to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(&prop.buffer);
        }

        for child in &self.children {
            child.write_to(out)?;
        }

        debug_assert_eq!(out.len() - start, size as usize);
        Ok(())
    }

    /// Read one node at nesting level `depth`. Nodes of unknown kinds are
    /// skipped whole and yield `None`.
    fn read(reader: &mut ByteReader, depth: usize) -> Result<Option<Self>> {
        let start = reader.position();
        ensure!(
            depth < Self::MAX_DEPTH,
            "Node at offset {} is nested deeper than {} levels",
            start,
            Self::MAX_DEPTH
        );
        let tag = reader.read_u32()?;
        let size = reader.read_u32()? as usize;
        let hash = reader.read_u64()?;
        let property_count = reader.read_u32()?;
        let child_count = reader.read_u32()?;

        ensure!(
            size >= Self::HEADER_SIZE,
            "Node at offset {} declares size {}, smaller than its header",
            start,
            size
        );

        let Some(id) = CastNodeId::from_tag(tag) else {
            reader.skip(size - Self::HEADER_SIZE)?;
            return Ok(None);
        };

        let mut node = Self::with_hash(id, hash);
        for _ in 0..property_count {
            let (name, prop) = CastProperty::read(reader)?;
            node.properties.insert(name, prop);
        }
        for _ in 0..child_count {
            if let Some(child) = Self::read(reader, depth + 1)? {
                node.children.push(child);
            }
        }

        let consumed = reader.position() - start;
        if consumed != size {
            bail!(
                "{:?} node at offset {} declares size {} but spans {} bytes",
                id,
                start,
                size,
                consumed
            );
        }

        Ok(Some(node))
    }
}

/// A complete Cast file: header plus root nodes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CastFile {
    pub roots: Vec<CastNode>,
}

impl CastFile {
    pub const MAGIC: u32 = 0x7473_6163;
    pub const VERSION: u32 = 1;
    pub const HEADER_SIZE: usize = 16;

    pub fn with_root(root: CastNode) -> Self {
        Self { roots: vec![root] }
    }

    /// Encode the whole file into memory
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let total = Self::HEADER_SIZE + self.roots.iter().map(CastNode::size).sum::<usize>();
        let mut out = Vec::with_capacity(total);

        out.extend_from_slice(&Self::MAGIC.to_le_bytes());
        out.extend_from_slice(&Self::VERSION.to_le_bytes());
        out.extend_from_slice(&(self.roots.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());

        for root in &self.roots {
            root.write_to(&mut out)?;
        }

        Ok(out)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);

        let magic = reader.read_u32().context("Cast file too small for header")?;
        ensure!(
            magic == Self::MAGIC,
            "Invalid Cast magic: 0x{:08X} (expected 0x{:08X})",
            magic,
            Self::MAGIC
        );
        let version = reader.read_u32()?;
        ensure!(
            version == Self::VERSION,
            "Unsupported Cast version: {}",
            version
        );
        let root_count = reader.read_u32()?;
        let _flags = reader.read_u32()?;

        // Every node needs at least a header, so the count is capped by the data
        let capacity = (root_count as usize).min(reader.remaining() / CastNode::HEADER_SIZE);
        let mut roots = Vec::with_capacity(capacity);
        for _ in 0..root_count {
            if let Some(root) = CastNode::read(&mut reader, 0)? {
                roots.push(root);
            }
        }

        Ok(Self { roots })
    }
}
