//! Mutable names.

use crate::cid::Cid;
use crate::error::{Error, Result};
use crate::store::LocalStore;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Manages the mutable names of a local store.
pub struct NameManager<'a> {
    store: &'a LocalStore,
}

impl<'a> NameManager<'a> {
    pub(crate) fn new(store: &'a LocalStore) -> Self {
        Self { store }
    }

    /// Get the path to a name file.
    fn name_path(&self, name: &str) -> Result<PathBuf> {
        // Validate name - no path traversal
        if name.contains("..") || name.contains('/') || name.contains('\\') {
            return Err(Error::invalid_name(format!(
                "Invalid name: {} (must not contain .. or path separators)",
                name
            )));
        }

        if name.trim().is_empty() {
            return Err(Error::invalid_name("Name cannot be empty"));
        }

        Ok(self.store.root().join("names").join(name))
    }

    /// Point a name at a CID.
    ///
    /// Appends the CID to the name file (one per line). The last valid line
    /// is the current value; earlier lines are the history.
    pub fn publish(&self, name: &str, cid: &Cid) -> Result<()> {
        let path = self.name_path(name)?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        writeln!(file, "{}", cid.to_v1())?;

        Ok(())
    }

    /// Every value the name has held, oldest first.
    pub fn history(&self, name: &str) -> Result<Vec<Cid>> {
        let path = self.name_path(name)?;

        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path)?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            // Ignore invalid lines
            .filter_map(|line| Cid::parse(line).ok())
            .map(|cid| cid.to_v1())
            .collect())
    }

    /// Current value of a name.
    pub fn get(&self, name: &str) -> Result<Option<Cid>> {
        Ok(self.history(name)?.pop())
    }

    /// List all names with their current values, sorted by name.
    pub fn list(&self) -> Result<Vec<(String, Cid)>> {
        let names_dir = self.store.root().join("names");
        let mut names = Vec::new();

        if !names_dir.exists() {
            return Ok(names);
        }

        for entry in fs::read_dir(&names_dir)? {
            let path = entry?.path();

            if path.is_file()
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
                && let Some(cid) = self.get(name)?
            {
                names.push((name.to_string(), cid));
            }
        }

        names.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(names)
    }

    /// Remove a name and its history.
    pub fn remove(&self, name: &str) -> Result<()> {
        let path = self.name_path(name)?;

        if !path.exists() {
            return Err(Error::name_not_found(name));
        }

        fs::remove_file(&path)?;
        Ok(())
    }
}
