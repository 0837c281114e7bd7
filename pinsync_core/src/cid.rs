//! Content identifiers.
//!
//! A CID names an immutable object by its digest. Two text encodings exist:
//!
//! ```text
//! V0  <64 hex chars>                       digest only, codec is always dag-pb
//! V1  b<base32 lower, unpadded>            of the binary form below
//!
//! 0x00  1   version = 0x01
//! 0x01  1   codec: 0x70=dag-pb, 0x55=raw
//! 0x02  1   multihash code: 0x1e=blake3
//! 0x03  1   digest length = 0x20
//! 0x04  32  digest
//! ```
//!
//! Every CID that leaves the store is V1; [`Cid::to_v1`] normalizes the rest so
//! comparisons never depend on which encoding a caller happened to supply.

use crate::error::{Error, Result};
use crate::hash::{Algorithm, HASH_SIZE, Hash};
use base32::Alphabet;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Size of the binary V1 form.
pub const CID_V1_SIZE: usize = 4 + HASH_SIZE;

/// Multibase prefix for lowercase base32.
const MULTIBASE_BASE32: char = 'b';

const BASE32: Alphabet = Alphabet::Rfc4648 { padding: false };

/// CID encoding version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Version {
    /// Legacy bare-digest encoding.
    V0,
    /// Self-describing encoding.
    V1,
}

/// Content codec carried by a V1 CID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Codec {
    /// Structured node (directory or file object).
    DagPb,
    /// Raw bytes.
    Raw,
}

impl Codec {
    /// Multicodec code.
    pub fn code(self) -> u8 {
        match self {
            Codec::DagPb => 0x70,
            Codec::Raw => 0x55,
        }
    }

    /// Parse from a multicodec code.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0x70 => Ok(Codec::DagPb),
            0x55 => Ok(Codec::Raw),
            _ => Err(Error::invalid_cid(format!("Unknown codec 0x{:02x}", code))),
        }
    }
}

/// A content identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cid {
    version: Version,
    codec: Codec,
    hash: Hash,
}

impl Cid {
    /// Create a V1 CID.
    pub fn new_v1(codec: Codec, hash: Hash) -> Self {
        Self {
            version: Version::V1,
            codec,
            hash,
        }
    }

    /// Create a V0 CID. V0 can only express dag-pb content.
    pub fn new_v0(hash: Hash) -> Self {
        Self {
            version: Version::V0,
            codec: Codec::DagPb,
            hash,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// The digest this CID addresses.
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// Normalize to the V1 encoding.
    pub fn to_v1(&self) -> Self {
        Self::new_v1(self.codec, self.hash)
    }

    /// Binary V1 form.
    pub fn to_bytes(&self) -> [u8; CID_V1_SIZE] {
        let mut buf = [0u8; CID_V1_SIZE];
        buf[0] = 0x01;
        buf[1] = self.codec.code();
        buf[2] = Algorithm::Blake3.multihash_code();
        buf[3] = HASH_SIZE as u8;
        buf[4..].copy_from_slice(self.hash.as_bytes());
        buf
    }

    /// Parse the binary V1 form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != CID_V1_SIZE {
            return Err(Error::invalid_cid(format!(
                "Expected {} bytes, got {}",
                CID_V1_SIZE,
                bytes.len()
            )));
        }
        if bytes[0] != 0x01 {
            return Err(Error::invalid_cid(format!(
                "Unsupported CID version byte {}",
                bytes[0]
            )));
        }
        let codec = Codec::from_code(bytes[1])?;
        Algorithm::from_multihash_code(bytes[2])?;
        if bytes[3] as usize != HASH_SIZE {
            return Err(Error::invalid_cid(format!(
                "Digest length {} (expected {})",
                bytes[3], HASH_SIZE
            )));
        }

        let mut digest = [0u8; HASH_SIZE];
        digest.copy_from_slice(&bytes[4..]);
        Ok(Self::new_v1(codec, Hash::from_bytes(digest)))
    }

    /// Parse either text encoding. The result keeps the version it was written in.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if s.len() == HASH_SIZE * 2 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Ok(Self::new_v0(Hash::from_hex(&s.to_ascii_lowercase())?));
        }

        match s.strip_prefix(MULTIBASE_BASE32) {
            Some(body) if !body.is_empty() => {
                let bytes = base32::decode(BASE32, &body.to_ascii_uppercase())
                    .ok_or_else(|| Error::invalid_cid(format!("Invalid base32 in {}", s)))?;
                Self::from_bytes(&bytes)
            }
            _ => Err(Error::invalid_cid(format!("Unrecognized CID: {:?}", s))),
        }
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Version::V0 => write!(f, "{}", self.hash.to_hex()),
            Version::V1 => write!(
                f,
                "{}{}",
                MULTIBASE_BASE32,
                base32::encode(BASE32, &self.to_bytes()).to_ascii_lowercase()
            ),
        }
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", self)
    }
}

impl FromStr for Cid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Cid::parse(s)
    }
}

impl Serialize for Cid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Cid::parse(&s).map_err(serde::de::Error::custom)
    }
}
