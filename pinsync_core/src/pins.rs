//! Pin set: CIDs protected from garbage collection.

use crate::cid::Cid;
use crate::error::{Error, Result};
use crate::store::LocalStore;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

/// How much of a pinned object is protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PinMode {
    /// The object and everything reachable from it.
    Recursive,
    /// The object alone.
    Direct,
}

impl PinMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PinMode::Recursive => "recursive",
            PinMode::Direct => "direct",
        }
    }

    /// Parse a pin mode. Unknown strings are rejected, never coerced.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "recursive" => Ok(PinMode::Recursive),
            "direct" => Ok(PinMode::Direct),
            other => Err(Error::invalid_pin_mode(other)),
        }
    }
}

impl fmt::Display for PinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PinMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PinMode::parse(s)
    }
}

/// Manages the pin set of a local store.
///
/// Each pin is a file under `pins/` named by the V1 CID and containing the mode.
pub struct PinManager<'a> {
    store: &'a LocalStore,
}

impl<'a> PinManager<'a> {
    pub(crate) fn new(store: &'a LocalStore) -> Self {
        Self { store }
    }

    fn pin_path(&self, cid: &Cid) -> PathBuf {
        self.store.root().join("pins").join(cid.to_v1().to_string())
    }

    /// Pin a CID, replacing any existing mode.
    pub fn add(&self, cid: &Cid, mode: PinMode) -> Result<()> {
        fs::write(self.pin_path(cid), format!("{}\n", mode))?;
        Ok(())
    }

    /// Mode a CID is pinned with, if any.
    pub fn get(&self, cid: &Cid) -> Result<Option<PinMode>> {
        let path = self.pin_path(cid);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(PinMode::parse(&fs::read_to_string(&path)?)?))
    }

    /// List all pins, sorted by CID text.
    pub fn list(&self) -> Result<Vec<(Cid, PinMode)>> {
        let pins_dir = self.store.root().join("pins");
        let mut pins = Vec::new();

        if !pins_dir.exists() {
            return Ok(pins);
        }

        for entry in fs::read_dir(&pins_dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            // Stray temp files and the like are not pins.
            let Ok(cid) = Cid::parse(file_name) else {
                continue;
            };
            let mode = PinMode::parse(&fs::read_to_string(&path)?)?;
            pins.push((cid.to_v1(), mode));
        }

        pins.sort_by_key(|(cid, _)| cid.to_string());
        Ok(pins)
    }

    /// Remove a pin.
    pub fn remove(&self, cid: &Cid) -> Result<()> {
        let path = self.pin_path(cid);

        if !path.exists() {
            return Err(Error::pin_not_found(cid.to_v1().to_string()));
        }

        fs::remove_file(&path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Algorithm;
    use tempfile::TempDir;

    #[test]
    fn test_pin_mode_parse() {
        assert_eq!(PinMode::parse("recursive").unwrap(), PinMode::Recursive);
        assert_eq!(PinMode::parse("direct\n").unwrap(), PinMode::Direct);
        assert_eq!("direct".parse::<PinMode>().unwrap(), PinMode::Direct);

        for bad in ["", "Recursive", "indirect", "all"] {
            assert!(matches!(
                PinMode::parse(bad),
                Err(Error::InvalidPinMode { .. })
            ));
        }
    }

    #[test]
    fn test_pin_add_list_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::init(temp_dir.path(), Algorithm::Blake3).unwrap();

        let a = store.put_blob(&b"a"[..]).unwrap().cid;
        let b = store.put_blob(&b"b"[..]).unwrap().cid;

        store.pins().add(&a, PinMode::Recursive).unwrap();
        store.pins().add(&b, PinMode::Direct).unwrap();
        // Re-pinning replaces the mode.
        store.pins().add(&b, PinMode::Recursive).unwrap();

        let pins = store.pins().list().unwrap();
        assert_eq!(pins.len(), 2);
        assert!(pins.iter().all(|(_, mode)| *mode == PinMode::Recursive));
        assert_eq!(store.pins().get(&a).unwrap(), Some(PinMode::Recursive));

        store.pins().remove(&a).unwrap();
        assert_eq!(store.pins().get(&a).unwrap(), None);
        assert!(matches!(
            store.pins().remove(&a),
            Err(Error::PinNotFound { .. })
        ));
    }

    #[test]
    fn test_corrupt_pin_mode_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::init(temp_dir.path(), Algorithm::Blake3).unwrap();
        let a = store.put_blob(&b"a"[..]).unwrap().cid;

        fs::write(temp_dir.path().join("pins").join(a.to_string()), "sometimes\n").unwrap();
        assert!(store.pins().list().is_err());
    }
}
