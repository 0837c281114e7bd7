//! Build manifests (`current.json`).

use crate::cid::Cid;
use crate::client::{Added, ObjectStore, Timeouts};
use crate::error::{Error, Result};
use crate::locator::{Locator, non_blank};
use serde::{Deserialize, Serialize};

/// File name a manifest is stored under inside a build directory.
pub const MANIFEST_NAME: &str = "current.json";

/// Child name used for the manifest target when `build` is blank.
pub const DEFAULT_BUILD_NAME: &str = "build";

/// A manifest document. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub build: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub build_uri: Option<String>,
    #[serde(default)]
    pub source_uri: Option<String>,
}

impl Manifest {
    /// Parse a manifest from JSON bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::invalid_manifest(e.to_string()))
    }

    /// Fetch and parse the manifest blob at `cid`.
    pub fn load<S: ObjectStore + ?Sized>(store: &S, cid: &Cid, timeouts: &Timeouts) -> Result<Self> {
        let bytes = store.get_node(cid, timeouts.long)?.into_blob()?;
        Self::parse(&bytes)
    }

    /// Version tag, trimmed. Blank counts as absent.
    pub fn version(&self) -> Option<String> {
        non_blank(self.version.as_deref())
    }

    /// Name the manifest target is linked under.
    pub fn canonical_name(&self) -> String {
        non_blank(self.build.as_deref()).unwrap_or_else(|| DEFAULT_BUILD_NAME.to_string())
    }

    /// Where the build lives: `buildUri`, falling back to `sourceUri`.
    pub fn locator(&self) -> Result<Locator> {
        let raw = non_blank(self.build_uri.as_deref())
            .or_else(|| non_blank(self.source_uri.as_deref()))
            .ok_or_else(|| Error::invalid_manifest("neither buildUri nor sourceUri is set"))?;
        Locator::parse(&raw)
    }

    /// Resolve the build locator to a CID and stat it for its cumulative size.
    pub fn resolve_target<S: ObjectStore + ?Sized>(
        &self,
        store: &S,
        timeouts: &Timeouts,
    ) -> Result<Added> {
        let cid = self.locator()?.resolve(store, timeouts)?;
        let stat = store.stat_node(&cid, timeouts.short)?;
        Ok(Added {
            cid,
            size: stat.cumulative_size,
        })
    }
}
