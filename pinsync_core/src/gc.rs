//! Garbage collection.

use crate::cid::Cid;
use crate::error::Result;
use crate::hash::Hash;
use crate::object::NodeKind;
use crate::pins::PinMode;
use crate::store::LocalStore;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use tracing::{debug, info};

/// Statistics from a garbage collection run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GcStats {
    /// Number of objects deleted.
    pub objects_deleted: usize,
    /// Bytes freed.
    pub bytes_freed: u64,
}

impl LocalStore {
    /// Run garbage collection.
    ///
    /// Roots are recursive pins, direct pins and the current value of every
    /// mutable name. If `dry_run` is true, reports what would be deleted
    /// without actually deleting.
    pub fn gc(&self, dry_run: bool) -> Result<GcStats> {
        let reachable = self.mark_reachable()?;
        let stats = self.sweep(&reachable, dry_run)?;
        info!(
            dry_run,
            deleted = stats.objects_deleted,
            bytes = stats.bytes_freed,
            "garbage collection finished"
        );
        Ok(stats)
    }

    /// Mark phase: collect every object reachable from a root.
    fn mark_reachable(&self) -> Result<HashSet<Hash>> {
        let mut reachable = HashSet::new();

        for (cid, mode) in self.pins().list()? {
            match mode {
                PinMode::Recursive => self.mark_object(&cid, &mut reachable)?,
                PinMode::Direct => {
                    if self.contains(&cid) {
                        reachable.insert(*cid.hash());
                    }
                }
            }
        }

        for (_name, cid) in self.names().list()? {
            self.mark_object(&cid, &mut reachable)?;
        }

        Ok(reachable)
    }

    /// Recursively mark an object and its children as reachable.
    fn mark_object(&self, cid: &Cid, reachable: &mut HashSet<Hash>) -> Result<()> {
        if reachable.contains(cid.hash()) {
            return Ok(());
        }

        let obj_path = self.object_path(cid.hash());
        if !obj_path.exists() {
            // Roots may point outside this store.
            debug!(cid = %cid, "root or link target missing, skipping");
            return Ok(());
        }

        reachable.insert(*cid.hash());

        let header = self.read_object_header(&obj_path)?;
        if header.kind == NodeKind::Directory {
            for link in self.get_directory(cid)?.links() {
                self.mark_object(&link.target, reachable)?;
            }
        }

        Ok(())
    }

    /// Sweep phase: delete unreachable objects.
    fn sweep(&self, reachable: &HashSet<Hash>, dry_run: bool) -> Result<GcStats> {
        let mut stats = GcStats {
            objects_deleted: 0,
            bytes_freed: 0,
        };

        let objects_dir = self.root().join("objects").join(self.algorithm().as_str());
        if !objects_dir.exists() {
            return Ok(stats);
        }

        for shard_entry in fs::read_dir(&objects_dir)? {
            let shard_path = shard_entry?.path();

            if !shard_path.is_dir() {
                continue;
            }

            for obj_entry in fs::read_dir(&shard_path)? {
                let obj_path = obj_entry?.path();

                if !obj_path.is_file() {
                    continue;
                }

                let prefix = shard_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("");
                let suffix = obj_path.file_name().and_then(|n| n.to_str()).unwrap_or("");

                if let Ok(hash) = Hash::from_hex(&format!("{}{}", prefix, suffix))
                    && !reachable.contains(&hash)
                {
                    stats.bytes_freed += fs::metadata(&obj_path)?.len();
                    stats.objects_deleted += 1;

                    if !dry_run {
                        fs::remove_file(&obj_path)?;
                    }
                }
            }

            // Remove empty shard directories (only if not dry run)
            if !dry_run
                && let Ok(mut entries) = fs::read_dir(&shard_path)
                && entries.next().is_none()
            {
                let _ = fs::remove_dir(&shard_path);
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Algorithm;
    use crate::node::{DirectoryNode, Link};
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::init(temp_dir.path(), Algorithm::Blake3).unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_gc_empty_store() {
        let (_temp, store) = store();
        let stats = store.gc(false).unwrap();
        assert_eq!(stats.objects_deleted, 0);
        assert_eq!(stats.bytes_freed, 0);
    }

    #[test]
    fn test_gc_unreferenced_blob_and_dry_run() {
        let (_temp, store) = store();
        let orphan = store.put_blob(&b"orphan data"[..]).unwrap().cid;

        let stats = store.gc(true).unwrap();
        assert_eq!(stats.objects_deleted, 1);
        assert!(stats.bytes_freed > 0);
        assert!(store.contains(&orphan));

        let stats = store.gc(false).unwrap();
        assert_eq!(stats.objects_deleted, 1);
        assert!(!store.contains(&orphan));
    }

    #[test]
    fn test_gc_recursive_vs_direct_pins() {
        let (_temp, store) = store();

        let leaf = store.put_blob(&b"leaf"[..]).unwrap();
        let dir = store
            .put_directory(&DirectoryNode::new(vec![Link::new("leaf", leaf.cid, leaf.size).unwrap()]).unwrap())
            .unwrap();

        store.pins().add(&dir.cid, PinMode::Direct).unwrap();
        let stats = store.gc(false).unwrap();
        assert_eq!(stats.objects_deleted, 1);
        assert!(store.contains(&dir.cid));
        assert!(!store.contains(&leaf.cid));

        let leaf = store.put_blob(&b"leaf"[..]).unwrap();
        store.pins().add(&dir.cid, PinMode::Recursive).unwrap();
        let stats = store.gc(false).unwrap();
        assert_eq!(stats.objects_deleted, 0);
        assert!(store.contains(&leaf.cid));
    }

    #[test]
    fn test_gc_names_are_roots() {
        let (_temp, store) = store();

        let old = store.put_blob(&b"old"[..]).unwrap().cid;
        let new = store.put_blob(&b"new"[..]).unwrap().cid;
        store.names().publish("production", &old).unwrap();
        store.names().publish("production", &new).unwrap();

        // Only the current value of a name is a root.
        let stats = store.gc(false).unwrap();
        assert_eq!(stats.objects_deleted, 1);
        assert!(store.contains(&new));
        assert!(!store.contains(&old));
    }

    #[test]
    fn test_gc_after_unpin() {
        let (_temp, store) = store();
        let cid = store.put_blob(&b"data"[..]).unwrap().cid;
        store.pins().add(&cid, PinMode::Recursive).unwrap();

        assert_eq!(store.gc(false).unwrap().objects_deleted, 0);

        store.pins().remove(&cid).unwrap();
        assert_eq!(store.gc(false).unwrap().objects_deleted, 1);
        assert!(!store.contains(&cid));
    }
}
