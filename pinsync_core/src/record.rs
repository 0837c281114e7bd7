//! Build record persistence (`build.json`).
//!
//! The record remembers the current and previous roots of both trees. It is
//! only rewritten after a stage completes, so an interrupted run leaves it
//! pointing at the last fully synchronized roots.

use crate::cid::Cid;
use crate::error::{Error, Result};
use crate::locator::{Locator, Root, non_blank};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Where the record lives unless configured otherwise.
pub const DEFAULT_RECORD_PATH: &str = "./current/build.json";

/// Current and previous roots of the raw and production trees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
    #[serde(default, deserialize_with = "optional_cid")]
    pub current_raw_build: Option<Cid>,
    #[serde(default, deserialize_with = "optional_cid")]
    pub previous_raw_build: Option<Cid>,
    #[serde(default, deserialize_with = "optional_cid")]
    pub current_build: Option<Cid>,
    #[serde(default, deserialize_with = "optional_cid")]
    pub previous_build: Option<Cid>,
}

impl BuildRecord {
    /// Record a new raw root. Returns the root that dropped out of the record.
    pub fn advance_raw(&mut self, cid: &Cid) -> Option<Cid> {
        advance(&mut self.current_raw_build, &mut self.previous_raw_build, cid)
    }

    /// Record a new production root. Returns the root that dropped out of the record.
    pub fn advance_production(&mut self, cid: &Cid) -> Option<Cid> {
        advance(&mut self.current_build, &mut self.previous_build, cid)
    }
}

/// `previous` only moves when `current` changes, and never ends up equal to it.
fn advance(current: &mut Option<Cid>, previous: &mut Option<Cid>, cid: &Cid) -> Option<Cid> {
    let cid = cid.to_v1();
    if *current == Some(cid) {
        return None;
    }

    let old_previous = previous.take();
    *previous = current.replace(cid);

    // A rollback (A -> B -> A) brings the old previous back as current.
    old_previous.filter(|old| Some(*old) != *current && Some(*old) != *previous)
}

/// Accepts null, blank strings, bare CIDs and `/ipfs/<cid>` locators.
fn optional_cid<'de, D>(deserializer: D) -> std::result::Result<Option<Cid>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(text) = non_blank(Option::<String>::deserialize(deserializer)?) else {
        return Ok(None);
    };

    let locator = Locator::parse(&text).map_err(serde::de::Error::custom)?;
    match locator.root() {
        Root::Cid(cid) if locator.path().is_empty() => Ok(Some(*cid)),
        _ => Err(serde::de::Error::custom(format!(
            "expected a CID or /ipfs/<cid>, got {}",
            text
        ))),
    }
}

/// Load/save seam for the build record.
pub trait RecordRepository {
    /// Read the record. A missing record is an error, never an empty default.
    fn load(&self) -> Result<BuildRecord>;

    /// Replace the stored record.
    fn save(&self, record: &BuildRecord) -> Result<()>;
}

/// Record stored as pretty-printed JSON on disk.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write an empty record unless one already exists, then return the stored record.
    pub fn create(&self) -> Result<BuildRecord> {
        if self.path.exists() {
            return self.load();
        }
        let record = BuildRecord::default();
        self.save(&record)?;
        Ok(record)
    }
}

impl RecordRepository for JsonFileRepository {
    fn load(&self) -> Result<BuildRecord> {
        if !self.path.exists() {
            return Err(Error::record_missing(&self.path));
        }
        let content = fs::read(&self.path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    fn save(&self, record: &BuildRecord) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut json = serde_json::to_vec_pretty(record)?;
        json.push(b'\n');

        let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
        temp_file.write_all(&json)?;
        temp_file.flush()?;
        temp_file.persist(&self.path)?;

        debug!(path = %self.path.display(), "saved build record");
        Ok(())
    }
}

/// In-memory record, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    record: Mutex<Option<BuildRecord>>,
}

impl MemoryRepository {
    /// A repository holding `record`.
    pub fn new(record: BuildRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }

    /// A repository with no record; `load` fails like a missing file.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Current contents, if any.
    pub fn snapshot(&self) -> Option<BuildRecord> {
        self.record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl RecordRepository for MemoryRepository {
    fn load(&self) -> Result<BuildRecord> {
        self.snapshot()
            .ok_or_else(|| Error::record_missing("<memory>"))
    }

    fn save(&self, record: &BuildRecord) -> Result<()> {
        *self
            .record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid::Codec;
    use crate::hash::Hash;
    use tempfile::TempDir;

    fn cid(data: &[u8]) -> Cid {
        Cid::new_v1(Codec::DagPb, Hash::hash_bytes(data))
    }

    #[test]
    fn test_advance_sets_previous_only_on_change() {
        let mut record = BuildRecord::default();

        assert_eq!(record.advance_raw(&cid(b"a")), None);
        assert_eq!(record.current_raw_build, Some(cid(b"a")));
        assert_eq!(record.previous_raw_build, None);

        // Same value again, V0 spelling: nothing moves.
        assert_eq!(record.advance_raw(&Cid::new_v0(*cid(b"a").hash())), None);
        assert_eq!(record.previous_raw_build, None);

        assert_eq!(record.advance_raw(&cid(b"b")), None);
        assert_eq!(record.current_raw_build, Some(cid(b"b")));
        assert_eq!(record.previous_raw_build, Some(cid(b"a")));

        assert_eq!(record.advance_raw(&cid(b"c")), Some(cid(b"a")));
        assert_eq!(record.previous_raw_build, Some(cid(b"b")));

        // The production fields are independent.
        assert_eq!(record.current_build, None);
    }

    #[test]
    fn test_rollback_does_not_displace_current() {
        let mut record = BuildRecord::default();
        record.advance_production(&cid(b"a"));
        record.advance_production(&cid(b"b"));

        assert_eq!(record.advance_production(&cid(b"a")), None);
        assert_eq!(record.current_build, Some(cid(b"a")));
        assert_eq!(record.previous_build, Some(cid(b"b")));
    }

    #[test]
    fn test_json_shape() {
        let mut record = BuildRecord::default();
        record.advance_raw(&cid(b"raw"));

        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["currentRawBuild"], cid(b"raw").to_string());
        assert!(json["previousRawBuild"].is_null());
        assert!(json["currentBuild"].is_null());
        assert!(json["previousBuild"].is_null());
    }

    #[test]
    fn test_lenient_field_forms() {
        let hash = Hash::hash_bytes(b"x");
        let json = format!(
            r#"{{"currentRawBuild": "/ipfs/{}", "previousRawBuild": "  ", "currentBuild": "{}"}}"#,
            hash.to_hex(),
            cid(b"x")
        );
        let record: BuildRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(record.current_raw_build, Some(Cid::new_v1(Codec::DagPb, hash)));
        assert_eq!(record.previous_raw_build, None);
        assert_eq!(record.current_build, Some(cid(b"x")));
        assert_eq!(record.previous_build, None);

        assert!(serde_json::from_str::<BuildRecord>(r#"{"currentBuild": "/ipns/prod"}"#).is_err());
        assert!(serde_json::from_str::<BuildRecord>(r#"{"currentBuild": "bogus"}"#).is_err());
    }

    #[test]
    fn test_file_repository_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let repo = JsonFileRepository::new(temp_dir.path().join("current/build.json"));

        assert!(matches!(repo.load(), Err(Error::RecordMissing { .. })));

        assert_eq!(repo.create().unwrap(), BuildRecord::default());

        let mut record = repo.load().unwrap();
        record.advance_raw(&cid(b"r"));
        record.advance_production(&cid(b"p"));
        repo.save(&record).unwrap();

        assert_eq!(repo.load().unwrap(), record);
        // create never clobbers an existing record.
        assert_eq!(repo.create().unwrap(), record);

        let text = fs::read_to_string(repo.path()).unwrap();
        assert!(text.contains("\n  \"currentRawBuild\": "));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_memory_repository() {
        let repo = MemoryRepository::empty();
        assert!(matches!(repo.load(), Err(Error::RecordMissing { .. })));

        let mut record = BuildRecord::default();
        record.advance_raw(&cid(b"r"));
        repo.save(&record).unwrap();
        assert_eq!(repo.load().unwrap(), record);
        assert_eq!(repo.snapshot(), Some(record));
    }
}
