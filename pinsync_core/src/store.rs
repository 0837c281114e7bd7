//! Local on-disk object store.

use crate::cid::{Cid, Codec};
use crate::client::{Added, Node, ObjectStore, Stat};
use crate::error::{Error, Result};
use crate::hash::{Algorithm, Hash};
use crate::names::NameManager;
use crate::node::DirectoryNode;
use crate::object::{CompressionType, HEADER_SIZE, NodeKind, ObjectHeader};
use crate::pins::{PinManager, PinMode};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// Compression threshold: blobs >= 4KB are compressed.
const COMPRESSION_THRESHOLD: usize = 4096;

/// A content-addressed store rooted in a local directory.
#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
    algorithm: Algorithm,
}

impl LocalStore {
    /// Initialize a new store at the given path.
    ///
    /// Creates the directory structure:
    /// - `objects/blake3-256/` for storing objects
    /// - `names/` for mutable names
    /// - `pins/` for the pin set
    /// - `config` file with version and algorithm
    pub fn init<P: AsRef<Path>>(root: P, algorithm: Algorithm) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("objects").join(algorithm.as_str()))?;
        fs::create_dir_all(root.join("names"))?;
        fs::create_dir_all(root.join("pins"))?;

        let config_content = format!("version=1\nalgo={}\n", algorithm.as_str());
        fs::write(root.join("config"), config_content)?;

        Ok(Self { root, algorithm })
    }

    /// Open an existing store at the given path.
    ///
    /// Validates the store structure and reads the configuration.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            return Err(Error::invalid_store(&root, "directory does not exist"));
        }

        let config_path = root.join("config");
        if !config_path.exists() {
            return Err(Error::invalid_store(&root, "config file not found"));
        }

        let config_content = fs::read_to_string(&config_path)?;
        let algorithm = Self::parse_config(&config_content)?;

        if !root.join("objects").join(algorithm.as_str()).exists() {
            return Err(Error::invalid_store(
                &root,
                "objects directory structure missing",
            ));
        }

        for dir in ["names", "pins"] {
            if !root.join(dir).exists() {
                return Err(Error::invalid_store(&root, format!("{} directory missing", dir)));
            }
        }

        Ok(Self { root, algorithm })
    }

    /// Parse the config file to extract the algorithm.
    fn parse_config(content: &str) -> Result<Algorithm> {
        let mut version = None;
        let mut algo = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                match key.trim() {
                    "version" => version = Some(value.trim()),
                    "algo" => algo = Some(value.trim()),
                    _ => {}
                }
            }
        }

        if version != Some("1") {
            return Err(Error::invalid_hash(format!(
                "Unsupported config version: {:?}",
                version
            )));
        }

        let algo_str = algo.ok_or_else(|| Error::invalid_hash("Missing algo in config"))?;
        Algorithm::parse(algo_str)
    }

    /// Get the path to an object file given its hash.
    ///
    /// Returns: `objects/{algorithm}/{prefix}/{suffix}`
    pub fn object_path(&self, hash: &Hash) -> PathBuf {
        self.root
            .join("objects")
            .join(self.algorithm.as_str())
            .join(hash.prefix())
            .join(hash.suffix())
    }

    /// Get the root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the algorithm used by this store.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Mutable names published in this store.
    pub fn names(&self) -> NameManager<'_> {
        NameManager::new(self)
    }

    /// The pin set of this store.
    pub fn pins(&self) -> PinManager<'_> {
        PinManager::new(self)
    }

    /// Whether an object exists, regardless of its kind.
    pub fn contains(&self, cid: &Cid) -> bool {
        self.object_path(cid.hash()).exists()
    }

    /// Read an object header from a file.
    pub(crate) fn read_object_header(&self, path: &Path) -> Result<ObjectHeader> {
        let mut file = fs::File::open(path)?;
        let mut header_buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut header_buf)?;
        ObjectHeader::decode(&header_buf)
    }

    /// Read the full payload of an object.
    pub(crate) fn read_object_payload(&self, path: &Path, expected_len: u64) -> Result<Vec<u8>> {
        let mut file = fs::File::open(path)?;

        let mut header_buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut header_buf)?;

        let mut payload = Vec::new();
        file.read_to_end(&mut payload)?;

        if payload.len() != expected_len as usize {
            return Err(Error::corrupted_object(
                path,
                format!(
                    "Payload length mismatch: expected {}, got {}",
                    expected_len,
                    payload.len()
                ),
            ));
        }

        Ok(payload)
    }

    /// Write an object atomically using tempfile.
    fn write_object_atomic(
        &self,
        hash: &Hash,
        header: &ObjectHeader,
        payload: &[u8],
    ) -> Result<()> {
        let obj_path = self.object_path(hash);
        let shard = obj_path
            .parent()
            .ok_or_else(|| Error::corrupted_object(&obj_path, "object path has no parent"))?;
        fs::create_dir_all(shard)?;

        let mut temp_file = tempfile::NamedTempFile::new_in(shard)?;
        temp_file.write_all(&header.encode())?;
        temp_file.write_all(payload)?;
        temp_file.flush()?;
        temp_file.persist(&obj_path)?;

        Ok(())
    }

    /// Store an object unless it already exists, returning its CID.
    fn put_object(&self, kind: NodeKind, payload: &[u8]) -> Result<Cid> {
        let hash = Hash::hash_tagged(kind.to_u8(), payload);
        let cid = Cid::new_v1(Codec::DagPb, hash);

        // Deduplication
        if self.object_path(&hash).exists() {
            return Ok(cid);
        }

        let (stored, compression) =
            if kind == NodeKind::Blob && payload.len() >= COMPRESSION_THRESHOLD {
                (compress_zstd(payload)?, CompressionType::Zstd)
            } else {
                (payload.to_vec(), CompressionType::None)
            };

        let header = ObjectHeader::new(kind, self.algorithm, compression, stored.len() as u64);
        self.write_object_atomic(&hash, &header, &stored)?;
        debug!(cid = %cid, kind = kind.as_str(), bytes = payload.len(), "stored object");

        Ok(cid)
    }

    /// Read, decompress and verify an object.
    fn read_object(&self, cid: &Cid) -> Result<(NodeKind, Vec<u8>)> {
        let hash = cid.hash();
        let obj_path = self.object_path(hash);

        if !obj_path.exists() {
            return Err(Error::object_not_found(cid.to_v1().to_string()));
        }

        let header = self.read_object_header(&obj_path)?;
        let stored = self.read_object_payload(&obj_path, header.payload_len)?;
        let payload = match header.compression {
            CompressionType::None => stored,
            CompressionType::Zstd => decompress_zstd(&stored)?,
        };

        // Corruption detection
        let computed = Hash::hash_tagged(header.kind.to_u8(), &payload);
        if computed != *hash {
            return Err(Error::corrupted_object(
                &obj_path,
                format!(
                    "Hash mismatch: expected {}, got {}",
                    hash.to_hex(),
                    computed.to_hex()
                ),
            ));
        }

        Ok((header.kind, payload))
    }

    /// Store a blob from a reader.
    pub fn put_blob<R: Read>(&self, mut reader: R) -> Result<Added> {
        let mut payload = Vec::new();
        reader.read_to_end(&mut payload)?;
        let cid = self.put_object(NodeKind::Blob, &payload)?;
        Ok(Added {
            cid,
            size: payload.len() as u64,
        })
    }

    /// Retrieve a blob.
    pub fn get_blob(&self, cid: &Cid) -> Result<Vec<u8>> {
        match self.read_object(cid)? {
            (NodeKind::Blob, payload) => Ok(payload),
            (kind, _) => Err(Error::invalid_object_type(
                NodeKind::Blob.as_str(),
                kind.as_str(),
            )),
        }
    }

    /// Store a directory node.
    pub fn put_directory(&self, node: &DirectoryNode) -> Result<Added> {
        let cid = self.put_object(NodeKind::Directory, &node.encode())?;
        Ok(Added {
            cid,
            size: node.cumulative_size(),
        })
    }

    /// Retrieve a directory node.
    pub fn get_directory(&self, cid: &Cid) -> Result<DirectoryNode> {
        match self.read_object(cid)? {
            (NodeKind::Directory, payload) => DirectoryNode::decode(&payload),
            (kind, _) => Err(Error::invalid_object_type(
                NodeKind::Directory.as_str(),
                kind.as_str(),
            )),
        }
    }

    /// Retrieve any object.
    pub fn load(&self, cid: &Cid) -> Result<Node> {
        match self.read_object(cid)? {
            (NodeKind::Blob, payload) => Ok(Node::Blob(payload)),
            (NodeKind::Directory, payload) => Ok(Node::Directory(DirectoryNode::decode(&payload)?)),
        }
    }

    /// Kind and cumulative size of an object.
    pub fn stat(&self, cid: &Cid) -> Result<Stat> {
        let obj_path = self.object_path(cid.hash());
        if !obj_path.exists() {
            return Err(Error::object_not_found(cid.to_v1().to_string()));
        }

        let header = self.read_object_header(&obj_path)?;
        let cumulative_size = match (header.kind, header.compression) {
            (NodeKind::Blob, CompressionType::None) => header.payload_len,
            (NodeKind::Blob, CompressionType::Zstd) => self.get_blob(cid)?.len() as u64,
            (NodeKind::Directory, _) => self.get_directory(cid)?.cumulative_size(),
        };

        Ok(Stat {
            kind: header.kind,
            cumulative_size,
        })
    }

    /// Write a blob to a writer (for cat command).
    pub fn cat_blob<W: Write>(&self, cid: &Cid, mut writer: W) -> Result<()> {
        writer.write_all(&self.get_blob(cid)?)?;
        Ok(())
    }
}

/// Fails an operation that finished after its budget ran out.
struct Deadline {
    operation: &'static str,
    started: Instant,
    budget: Duration,
}

impl Deadline {
    fn start(operation: &'static str, budget: Duration) -> Self {
        Self {
            operation,
            started: Instant::now(),
            budget,
        }
    }

    fn finish<T>(self, value: Result<T>) -> Result<T> {
        let value = value?;
        if self.started.elapsed() > self.budget {
            return Err(Error::timeout(self.operation, self.budget));
        }
        Ok(value)
    }
}

impl ObjectStore for LocalStore {
    fn get_node(&self, cid: &Cid, timeout: Duration) -> Result<Node> {
        let deadline = Deadline::start("get_node", timeout);
        deadline.finish(self.load(cid))
    }

    fn stat_node(&self, cid: &Cid, timeout: Duration) -> Result<Stat> {
        let deadline = Deadline::start("stat_node", timeout);
        deadline.finish(self.stat(cid))
    }

    fn resolve_name(&self, name: &str, timeout: Duration) -> Result<Cid> {
        let deadline = Deadline::start("resolve_name", timeout);
        let resolved = self
            .names()
            .get(name)
            .and_then(|cid| cid.ok_or_else(|| Error::name_not_found(name)));
        deadline.finish(resolved)
    }

    fn publish_name(&self, name: &str, cid: &Cid, timeout: Duration) -> Result<()> {
        let deadline = Deadline::start("publish_name", timeout);
        deadline.finish(self.names().publish(name, cid))
    }

    fn put_node(&self, node: &DirectoryNode, timeout: Duration) -> Result<Added> {
        let deadline = Deadline::start("put_node", timeout);
        deadline.finish(self.put_directory(node))
    }

    fn add_blob(&self, bytes: &[u8], timeout: Duration) -> Result<Added> {
        let deadline = Deadline::start("add_blob", timeout);
        deadline.finish(self.put_blob(bytes))
    }

    fn pin(&self, cid: &Cid, mode: PinMode) -> Result<()> {
        if !self.contains(cid) {
            return Err(Error::object_not_found(cid.to_v1().to_string()));
        }
        self.pins().add(cid, mode)
    }

    fn unpin(&self, cid: &Cid) -> Result<()> {
        self.pins().remove(cid)
    }
}

/// Compress data using zstd.
fn compress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::encode_all(data, 3) // Level 3 = fast compression
        .map_err(|e| Error::compression_error(format!("zstd compression failed: {}", e)))
}

/// Decompress data using zstd.
fn decompress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(data)
        .map_err(|e| Error::compression_error(format!("zstd decompression failed: {}", e)))
}
