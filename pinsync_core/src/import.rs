//! Importing local files and directories into the store.

use crate::client::Added;
use crate::error::{Error, Result};
use crate::node::{DirectoryNode, Link};
use crate::store::LocalStore;
use std::fs;
use std::path::Path;
use tracing::info;

impl LocalStore {
    /// Add a file or directory to the store.
    ///
    /// A file becomes a blob; a directory becomes a tree of directory nodes.
    /// `.gitignore` rules are honoured.
    pub fn add_path(&self, path: &Path) -> Result<Added> {
        if !path.exists() {
            return Err(Error::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("Path does not exist: {}", path.display()),
                ),
            });
        }

        let metadata = fs::metadata(path)?;

        let added = if metadata.is_file() {
            self.add_file(path)?
        } else if metadata.is_dir() {
            self.add_directory(path)?
        } else {
            return Err(Error::invalid_link(format!(
                "Unsupported file type: {}",
                path.display()
            )));
        };

        info!(path = %path.display(), cid = %added.cid, size = added.size, "imported");
        Ok(added)
    }

    fn add_file(&self, path: &Path) -> Result<Added> {
        self.put_blob(fs::File::open(path)?)
    }

    fn add_directory(&self, path: &Path) -> Result<Added> {
        let mut links = Vec::new();

        let walker = ignore::WalkBuilder::new(path)
            .max_depth(Some(1)) // Only immediate children
            .hidden(false) // Include hidden files
            .git_ignore(true) // Respect .gitignore
            .build();

        for entry in walker {
            let entry = entry?;
            let entry_path = entry.path();

            // Skip the directory itself
            if entry_path == path {
                continue;
            }

            let file_name = entry_path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    Error::invalid_link(format!("Invalid filename: {}", entry_path.display()))
                })?
                .to_string();

            let file_type = entry.file_type();
            let child = if file_type.is_some_and(|t| t.is_symlink()) {
                return Err(Error::invalid_link(format!(
                    "Symlinks not supported: {}",
                    entry_path.display()
                )));
            } else if entry_path.is_dir() {
                self.add_directory(entry_path)?
            } else {
                self.add_file(entry_path)?
            };

            links.push(Link::new(file_name, child.cid, child.size)?);
        }

        self.put_directory(&DirectoryNode::new(links)?)
    }
}
