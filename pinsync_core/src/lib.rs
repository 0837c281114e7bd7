//! # pinsync core
//!
//! Build mirroring over a content-addressed object store.
//!
//! A source tree of build directories is mirrored into a *raw* tree, which
//! keeps each directory's `current.json` manifest and records rollback
//! pointers when children change. A *production* tree is then derived from
//! the raw tree: each manifest is resolved to the build it names, and every
//! level gets `latest-build`, `latest-pre-release` and `release` pointers
//! elected from the versions of its children.
//!
//! ## Features
//!
//! - BLAKE3 content addressing with V0/V1 CID normalization
//! - Directory nodes with canonical reverse-lexicographic link order
//! - Mutable names, pins and garbage collection
//! - Idempotent rebuilds: unchanged input yields unchanged CIDs
//! - A persisted build record for rollback and resumption
//!
//! ## Example
//!
//! ```no_run
//! use pinsync_core::{Algorithm, JsonFileRepository, LocalStore, Locator, RecordRepository, Updater};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = LocalStore::init("./pinsync-store", Algorithm::Blake3)?;
//!
//! // Import a local build tree and name it
//! let source = store.add_path(Path::new("./builds"))?;
//! store.names().publish("source", &source.cid)?;
//!
//! // Create the build record once, then update
//! let records = JsonFileRepository::new("./current/build.json");
//! records.create()?;
//!
//! let report = Updater::new(&store, &records, Locator::name("source")).run()?;
//! println!("raw        {}", report.raw.locator);
//! println!("production {}", report.production.locator);
//! # Ok(())
//! # }
//! ```

mod cid;
mod client;
mod config;
mod elect;
mod error;
mod gc;
mod hash;
mod import;
mod locator;
mod manifest;
mod names;
mod node;
mod object;
mod pins;
mod production;
mod raw;
mod record;
mod store;
mod updater;

pub use cid::{Cid, Codec, Version};
pub use client::{Added, LONG_TIMEOUT_FACTOR, Node, ObjectStore, Stat, Timeouts, submit_node};
pub use config::Config;
pub use elect::{Candidate, Category, collate, elect};
pub use error::{Error, Result};
pub use gc::GcStats;
pub use hash::{Algorithm, Hash};
pub use locator::{Locator, Root, gateway_url, non_blank};
pub use manifest::{DEFAULT_BUILD_NAME, MANIFEST_NAME, Manifest};
pub use names::NameManager;
pub use node::{DirectoryNode, Link, LinkSet, MAX_NAME_LEN, link_order};
pub use object::{NodeKind, ObjectHeader};
pub use pins::{PinManager, PinMode};
pub use production::{ProductionOutcome, ProductionSynchronizer};
pub use raw::{ROLLBACK_NAME, RawOutcome, RawSynchronizer, parse_rollback};
pub use record::{
    BuildRecord, DEFAULT_RECORD_PATH, JsonFileRepository, MemoryRepository, RecordRepository,
};
pub use store::LocalStore;
pub use updater::{Stage, TreeReport, UpdateReport, Updater};
