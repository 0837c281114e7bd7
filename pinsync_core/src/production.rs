//! Production tree synchronization.
//!
//! Walks the raw tree bottom-up and builds the publishable tree. At each level:
//! child directories are rebuilt first, the level's `current.json` (if any) is
//! resolved to the build it describes and linked under the manifest's `build`
//! name, and the elector adds `latest-*` pointers over the children.
//!
//! A manifest that cannot be parsed or resolved only costs its own level the
//! alias link and version. Submitting a node is structural and aborts the pass.

use crate::cid::Cid;
use crate::client::{Node, ObjectStore, Timeouts, submit_node};
use crate::elect::{Candidate, Category, elect};
use crate::error::Result;
use crate::locator::gateway_url;
use crate::manifest::{MANIFEST_NAME, Manifest};
use crate::node::{DirectoryNode, Link, LinkSet};
use crate::object::NodeKind;
use crate::raw::ROLLBACK_NAME;
use tracing::{debug, info, warn};

/// Result of synchronizing one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionOutcome {
    /// New node, or `None` when the level had nothing to publish.
    pub cid: Option<Cid>,
    /// Cumulative size of the new node.
    pub size: u64,
    /// Version from this level's manifest.
    pub version: Option<String>,
}

/// Builds the production tree from a raw tree.
pub struct ProductionSynchronizer<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    timeouts: Timeouts,
    verify: bool,
    gateway: String,
}

impl<'a, S: ObjectStore + ?Sized> ProductionSynchronizer<'a, S> {
    pub fn new(store: &'a S, timeouts: Timeouts) -> Self {
        Self {
            store,
            timeouts,
            verify: false,
            gateway: "gateway".to_string(),
        }
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = gateway.into();
        self
    }

    /// Rebuild the production tree for the raw root `raw`.
    ///
    /// `path` is only used to label log lines.
    pub fn sync(&self, raw: &Cid, path: &str) -> Result<ProductionOutcome> {
        let raw_node = self.store.get_node(raw, self.timeouts.long)?.into_directory()?;
        let outcome = self.sync_level(raw_node, path.trim_end_matches('/'))?;

        match &outcome.cid {
            Some(cid) => info!(
                raw = %gateway_url(&self.gateway, raw),
                production = %gateway_url(&self.gateway, cid),
                "production tree synchronized"
            ),
            None => warn!(raw = %gateway_url(&self.gateway, raw), "production tree is empty"),
        }

        Ok(outcome)
    }

    fn sync_level(&self, raw: DirectoryNode, path: &str) -> Result<ProductionOutcome> {
        let mut links = LinkSet::new();
        let mut candidates = Vec::new();
        let mut manifest_link = None;

        for link in raw.links() {
            if link.name == ROLLBACK_NAME {
                continue;
            }
            if link.name == MANIFEST_NAME {
                manifest_link = Some(link);
                continue;
            }
            let child_path = format!("{}/{}", path, link.name);

            let child = match self.fetch_directory(&link.target) {
                Ok(Some(node)) => node,
                Ok(None) => continue,
                Err(e) => {
                    warn!(path = %child_path, locator = %gateway_url(&self.gateway, &link.target), error = %e, "skipping unreachable raw child");
                    continue;
                }
            };

            let outcome = self.sync_level(child, &child_path)?;
            if let Some(cid) = outcome.cid {
                links.insert(Link {
                    name: link.name.clone(),
                    target: cid,
                    size: outcome.size,
                });
                candidates.push(Candidate {
                    name: link.name.clone(),
                    cid,
                    size: outcome.size,
                    version: outcome.version,
                });
            }
        }

        let mut version = None;
        if let Some(manifest_link) = manifest_link {
            match self.resolve_manifest(&manifest_link.target) {
                Ok((alias, manifest_version)) => {
                    if links.get(&alias.name).is_some() || is_reserved(&alias.name) {
                        warn!(
                            path = %display_path(path),
                            alias = %alias.name,
                            target = %gateway_url(&self.gateway, &alias.target),
                            manifest = %gateway_url(&self.gateway, &manifest_link.target),
                            "build name is already taken at this level, dropping the alias"
                        );
                    } else {
                        debug!(
                            path = %display_path(path),
                            alias = %alias.name,
                            target = %gateway_url(&self.gateway, &alias.target),
                            version = manifest_version.as_deref().unwrap_or("-"),
                            "manifest resolved"
                        );
                        links.insert(alias);
                    }
                    version = manifest_version;
                }
                Err(e) => {
                    warn!(
                        path = %display_path(path),
                        manifest = %gateway_url(&self.gateway, &manifest_link.target),
                        error = %e,
                        "discarding manifest"
                    );
                }
            }
            links.insert(manifest_link.clone());
        }

        // Pointers go in last so they win over same-named children.
        for pointer in elect(&candidates) {
            links.insert(pointer);
        }

        if links.is_empty() {
            debug!(path = %display_path(path), "level is empty, omitting");
            return Ok(ProductionOutcome {
                cid: None,
                size: 0,
                version,
            });
        }

        let added = submit_node(self.store, &links.into_node(), &self.timeouts, self.verify)?;
        debug!(
            path = %display_path(path),
            locator = %gateway_url(&self.gateway, &added.cid),
            "level rebuilt"
        );

        Ok(ProductionOutcome {
            cid: Some(added.cid),
            size: added.size,
            version,
        })
    }

    /// `Ok(None)` for children that are not directories.
    fn fetch_directory(&self, cid: &Cid) -> Result<Option<DirectoryNode>> {
        let stat = self.store.stat_node(cid, self.timeouts.short)?;
        if stat.kind != NodeKind::Directory {
            return Ok(None);
        }
        self.store
            .get_node(cid, self.timeouts.long)
            .and_then(Node::into_directory)
            .map(Some)
    }

    /// Load a manifest and turn it into the alias link plus its version.
    fn resolve_manifest(&self, cid: &Cid) -> Result<(Link, Option<String>)> {
        let manifest = Manifest::load(self.store, cid, &self.timeouts)?;
        let target = manifest.resolve_target(self.store, &self.timeouts)?;
        let alias = Link::new(manifest.canonical_name(), target.cid, target.size)?;
        Ok((alias, manifest.version()))
    }
}

/// Names the synchronizer writes itself at every level.
fn is_reserved(name: &str) -> bool {
    name == MANIFEST_NAME
        || name == ROLLBACK_NAME
        || Category::ALL.iter().any(|c| c.pointer_name() == name)
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "/" } else { path }
}
