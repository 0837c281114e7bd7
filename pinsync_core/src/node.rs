//! Directory node encoding.
//!
//! A directory node is an ordered list of named links. Links are kept in
//! strict reverse-lexicographic order of their names (bytewise UTF-8), which
//! makes the encoding canonical and puts `latest-*` pointers ahead of the
//! version directories they point at.

use crate::cid::{CID_V1_SIZE, Cid};
use crate::error::{Error, Result};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io::Read;

/// Maximum link name length in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// A named reference from a directory to a child object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    /// Name of the entry (UTF-8).
    pub name: String,
    /// Child object, always V1.
    pub target: Cid,
    /// Cumulative size of the child in bytes.
    pub size: u64,
}

impl Link {
    /// Create a new link. The target is normalized to V1.
    pub fn new(name: impl Into<String>, target: Cid, size: u64) -> Result<Self> {
        let name = name.into();

        if name.is_empty() {
            return Err(Error::invalid_link("Name cannot be empty"));
        }

        if name.len() > MAX_NAME_LEN {
            return Err(Error::invalid_link(format!(
                "Name too long: {} bytes (max {})",
                name.len(),
                MAX_NAME_LEN
            )));
        }

        if name.contains('\0') || name.contains('/') {
            return Err(Error::invalid_link(format!(
                "Name cannot contain null bytes or '/': {:?}",
                name
            )));
        }

        Ok(Self {
            name,
            target: target.to_v1(),
            size,
        })
    }

    /// Encode the link.
    ///
    /// Format:
    /// - 1 byte: name_len
    /// - N bytes: name (UTF-8)
    /// - 36 bytes: target CID (binary V1)
    /// - 8 bytes: cumulative size (u64 LE)
    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.name.len() as u8);
        buf.extend_from_slice(self.name.as_bytes());
        buf.extend_from_slice(&self.target.to_bytes());
        buf.extend_from_slice(&self.size.to_le_bytes());
    }

    fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let mut name_len_buf = [0u8; 1];
        reader.read_exact(&mut name_len_buf)?;
        let name_len = name_len_buf[0] as usize;

        if name_len == 0 {
            return Err(Error::invalid_link("Name length is zero"));
        }

        let mut name_buf = vec![0u8; name_len];
        reader.read_exact(&mut name_buf)?;
        let name = String::from_utf8(name_buf)
            .map_err(|e| Error::invalid_link(format!("Invalid UTF-8 in name: {}", e)))?;

        let mut cid_buf = [0u8; CID_V1_SIZE];
        reader.read_exact(&mut cid_buf)?;
        let target = Cid::from_bytes(&cid_buf)?;

        let mut size_buf = [0u8; 8];
        reader.read_exact(&mut size_buf)?;

        Self::new(name, target, u64::from_le_bytes(size_buf))
    }
}

/// Canonical link order: descending bytewise by name.
pub fn link_order(a: &Link, b: &Link) -> Ordering {
    b.name.as_bytes().cmp(a.name.as_bytes())
}

/// An immutable, canonically ordered directory node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryNode {
    links: Vec<Link>,
}

impl DirectoryNode {
    /// Build a node from links in any order. Duplicate names are rejected.
    pub fn new(mut links: Vec<Link>) -> Result<Self> {
        links.sort_by(link_order);

        if let Some(pair) = links.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(Error::duplicate_link(&pair[0].name));
        }

        Ok(Self { links })
    }

    /// Links in canonical order.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Look up a link by name.
    pub fn get(&self, name: &str) -> Option<&Link> {
        self.links.iter().find(|link| link.name == name)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Encode the node payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for link in &self.links {
            link.encode_into(&mut buf);
        }
        buf
    }

    /// Decode a node payload, rejecting anything not in canonical order.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = std::io::Cursor::new(data);
        let mut links: Vec<Link> = Vec::new();

        while reader.position() < data.len() as u64 {
            let link = Link::decode(&mut reader)?;
            if let Some(prev) = links.last()
                && link_order(prev, &link) != Ordering::Less
            {
                return Err(Error::invalid_link(format!(
                    "Links out of order: {:?} before {:?}",
                    prev.name, link.name
                )));
            }
            links.push(link);
        }

        Ok(Self { links })
    }

    /// Size of the encoded node plus the cumulative sizes of its children.
    pub fn cumulative_size(&self) -> u64 {
        self.encode().len() as u64 + self.links.iter().map(|l| l.size).sum::<u64>()
    }
}

/// Accumulates the links of one directory level while it is being rebuilt.
///
/// Inserting a name that is already present replaces the earlier link, so
/// synthetic pointers can be layered over real children.
#[derive(Debug, Default)]
pub struct LinkSet {
    links: BTreeMap<String, Link>,
}

impl LinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a link, returning the one it replaced.
    pub fn insert(&mut self, link: Link) -> Option<Link> {
        self.links.insert(link.name.clone(), link)
    }

    pub fn get(&self, name: &str) -> Option<&Link> {
        self.links.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Finish the level.
    pub fn into_node(self) -> DirectoryNode {
        // BTreeMap iterates ascending and keys are unique.
        DirectoryNode {
            links: self.links.into_values().rev().collect(),
        }
    }
}
