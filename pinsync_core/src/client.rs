//! The object store seam.
//!
//! Synchronizers only talk to [`ObjectStore`]. Every call carries a time
//! budget: [`Timeouts::short`] for metadata-sized requests (stat, name
//! resolution) and [`Timeouts::long`] for fetching or submitting nodes and blobs.

use crate::cid::Cid;
use crate::error::{Error, Result};
use crate::node::DirectoryNode;
use crate::object::NodeKind;
use crate::pins::PinMode;
use std::time::Duration;

/// Ratio between the bulk and metadata time budgets.
pub const LONG_TIMEOUT_FACTOR: u32 = 30;

/// A fetched object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Directory(DirectoryNode),
    Blob(Vec<u8>),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Directory(_) => NodeKind::Directory,
            Node::Blob(_) => NodeKind::Blob,
        }
    }

    /// Unwrap a directory, or fail with `InvalidObjectType`.
    pub fn into_directory(self) -> Result<DirectoryNode> {
        match self {
            Node::Directory(node) => Ok(node),
            Node::Blob(_) => Err(Error::invalid_object_type(
                NodeKind::Directory.as_str(),
                NodeKind::Blob.as_str(),
            )),
        }
    }

    /// Unwrap a blob, or fail with `InvalidObjectType`.
    pub fn into_blob(self) -> Result<Vec<u8>> {
        match self {
            Node::Blob(bytes) => Ok(bytes),
            Node::Directory(_) => Err(Error::invalid_object_type(
                NodeKind::Blob.as_str(),
                NodeKind::Directory.as_str(),
            )),
        }
    }
}

/// Metadata returned by [`ObjectStore::stat_node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Data marker of the stored object.
    pub kind: NodeKind,
    /// Object size including everything it links to.
    pub cumulative_size: u64,
}

/// Result of submitting content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Added {
    pub cid: Cid,
    pub size: u64,
}

/// Time budgets for store calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Lookup, resolve, stat.
    pub short: Duration,
    /// Fetch and submit.
    pub long: Duration,
}

impl Timeouts {
    /// Derive both budgets from the short one.
    pub fn from_short(short: Duration) -> Self {
        Self {
            short,
            long: short * LONG_TIMEOUT_FACTOR,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from_short(Duration::from_millis(2000))
    }
}

/// A content-addressed object store.
///
/// All CIDs returned by implementations are V1.
pub trait ObjectStore {
    /// Fetch a directory node or blob.
    fn get_node(&self, cid: &Cid, timeout: Duration) -> Result<Node>;

    /// Read an object's kind and cumulative size without fetching its payload.
    fn stat_node(&self, cid: &Cid, timeout: Duration) -> Result<Stat>;

    /// Dereference a mutable name to its current CID.
    fn resolve_name(&self, name: &str, timeout: Duration) -> Result<Cid>;

    /// Point a mutable name at a CID.
    fn publish_name(&self, name: &str, cid: &Cid, timeout: Duration) -> Result<()>;

    /// Submit a directory node.
    fn put_node(&self, node: &DirectoryNode, timeout: Duration) -> Result<Added>;

    /// Submit a blob. Identical bytes always yield the same CID.
    fn add_blob(&self, bytes: &[u8], timeout: Duration) -> Result<Added>;

    /// Protect a CID from garbage collection.
    fn pin(&self, cid: &Cid, mode: PinMode) -> Result<()>;

    /// Remove a pin.
    fn unpin(&self, cid: &Cid) -> Result<()>;
}

/// Submit a directory node with the bulk budget.
///
/// With `verify` set the node is fetched back and compared, which also warms
/// any cache sitting in front of the store.
pub fn submit_node<S: ObjectStore + ?Sized>(
    store: &S,
    node: &DirectoryNode,
    timeouts: &Timeouts,
    verify: bool,
) -> Result<Added> {
    let added = store.put_node(node, timeouts.long)?;

    if verify {
        let fetched = store.get_node(&added.cid, timeouts.long)?.into_directory()?;
        if fetched != *node {
            return Err(Error::corrupted_object(
                added.cid.to_string(),
                "Fetched node differs from submitted node",
            ));
        }
    }

    Ok(added)
}
