//! Raw mirror synchronization.
//!
//! The raw tree mirrors the directory skeleton of the source tree together
//! with each directory's `current.json`. Every level is rebuilt bottom-up
//! from its children and compared against the previous raw tree:
//!
//! - a child whose CID moved or vanished gets a `previous.json` rollback entry
//! - a level whose children all kept their CIDs reuses the previous node
//! - a level with no children left is omitted from its parent
//!
//! Source children that cannot be fetched are skipped with a warning.
//! Submitting a node is structural: any failure aborts the whole pass.

use crate::cid::Cid;
use crate::client::{Node, ObjectStore, Timeouts, submit_node};
use crate::error::Result;
use crate::locator::gateway_url;
use crate::manifest::MANIFEST_NAME;
use crate::node::{DirectoryNode, Link, LinkSet};
use crate::object::NodeKind;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Name of the rollback blob written next to changed children.
pub const ROLLBACK_NAME: &str = "previous.json";

/// Result of synchronizing one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawOutcome {
    /// New node, or `None` when nothing survived pruning.
    pub cid: Option<Cid>,
    /// Cumulative size of the new node.
    pub size: u64,
    /// Whether `cid` differs from the previous CID at this position.
    pub changed: bool,
}

/// Rebuilds the raw tree from a source tree.
pub struct RawSynchronizer<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    timeouts: Timeouts,
    verify: bool,
    gateway: String,
}

impl<'a, S: ObjectStore + ?Sized> RawSynchronizer<'a, S> {
    pub fn new(store: &'a S, timeouts: Timeouts) -> Self {
        Self {
            store,
            timeouts,
            verify: false,
            gateway: "gateway".to_string(),
        }
    }

    /// Fetch every submitted node back after writing it.
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Gateway prefix used in log locators.
    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = gateway.into();
        self
    }

    /// Synchronize the tree at `source` against the previous raw root.
    ///
    /// Failing to fetch `source` itself is fatal. An unreachable `previous`
    /// only means there is nothing to diff against.
    pub fn sync(&self, source: &Cid, previous: Option<&Cid>) -> Result<RawOutcome> {
        let source_node = self
            .store
            .get_node(source, self.timeouts.long)?
            .into_directory()?;
        let previous_cid = previous.map(Cid::to_v1);
        let previous_node = previous.and_then(|cid| self.fetch_previous(cid, "/"));

        let outcome = self.sync_level(source_node, previous_cid, previous_node, "")?;

        match outcome.cid {
            Some(cid) => info!(
                source = %gateway_url(&self.gateway, source),
                raw = %gateway_url(&self.gateway, &cid),
                changed = outcome.changed,
                "raw tree synchronized"
            ),
            None => warn!(
                source = %gateway_url(&self.gateway, source),
                "raw tree is empty after pruning"
            ),
        }

        Ok(outcome)
    }

    /// `previous_cid` is the link recorded in the parent's previous node and
    /// drives change detection even when `previous` could not be fetched.
    fn sync_level(
        &self,
        source: DirectoryNode,
        previous_cid: Option<Cid>,
        previous: Option<DirectoryNode>,
        path: &str,
    ) -> Result<RawOutcome> {
        let previous_links = previous.as_ref();

        let mut links = LinkSet::new();
        let mut rollback: BTreeMap<String, Cid> = BTreeMap::new();

        for link in source.links() {
            if link.name == ROLLBACK_NAME {
                continue;
            }
            let child_path = format!("{}/{}", path, link.name);

            let kind = match self.store.stat_node(&link.target, self.timeouts.short) {
                Ok(stat) => stat.kind,
                Err(e) => {
                    warn!(path = %child_path, locator = %gateway_url(&self.gateway, &link.target), error = %e, "skipping unreachable source child");
                    continue;
                }
            };

            match kind {
                NodeKind::Directory => {
                    let child = match self
                        .store
                        .get_node(&link.target, self.timeouts.long)
                        .and_then(Node::into_directory)
                    {
                        Ok(node) => node,
                        Err(e) => {
                            warn!(path = %child_path, locator = %gateway_url(&self.gateway, &link.target), error = %e, "skipping unreachable source directory");
                            continue;
                        }
                    };

                    let previous_link = previous_links.and_then(|node| node.get(&link.name));
                    let previous_child = previous_link
                        .and_then(|prev| self.fetch_previous(&prev.target, &child_path));

                    let outcome = self.sync_level(
                        child,
                        previous_link.map(|prev| prev.target),
                        previous_child,
                        &child_path,
                    )?;

                    if let Some(prev) = previous_link
                        && Some(prev.target) != outcome.cid
                    {
                        rollback.insert(link.name.clone(), prev.target);
                    }
                    if let Some(cid) = outcome.cid {
                        links.insert(Link {
                            name: link.name.clone(),
                            target: cid,
                            size: outcome.size,
                        });
                    }
                }
                NodeKind::Blob if link.name == MANIFEST_NAME => {
                    let bytes = match self
                        .store
                        .get_node(&link.target, self.timeouts.long)
                        .and_then(Node::into_blob)
                    {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            warn!(path = %child_path, error = %e, "skipping unreadable manifest");
                            continue;
                        }
                    };
                    let added = self.store.add_blob(&bytes, self.timeouts.long)?;
                    if let Some(prev) = previous_links.and_then(|node| node.get(&link.name))
                        && prev.target != added.cid
                    {
                        rollback.insert(link.name.clone(), prev.target);
                    }
                    links.insert(Link {
                        name: link.name.clone(),
                        target: added.cid,
                        size: added.size,
                    });
                }
                NodeKind::Blob => {
                    debug!(path = %child_path, "pruning leaf blob");
                }
            }
        }

        // Children that disappeared upstream can be rolled back too.
        for prev in previous_links.iter().flat_map(|node| node.links()) {
            if prev.name != ROLLBACK_NAME && links.get(&prev.name).is_none() {
                rollback.entry(prev.name.clone()).or_insert(prev.target);
            }
        }

        if links.is_empty() {
            debug!(path = %display_path(path), "level is empty, omitting");
            return Ok(RawOutcome {
                cid: None,
                size: 0,
                changed: previous_cid.is_some(),
            });
        }

        let node = links.into_node();

        // Nothing moved underneath: keep the previous node and its rollback entries.
        if let (Some(cid), Some(prev)) = (previous_cid, &previous) {
            let prev_children = prev.links().iter().filter(|l| l.name != ROLLBACK_NAME);
            if node.links().iter().eq(prev_children) {
                debug!(path = %display_path(path), locator = %gateway_url(&self.gateway, &cid), "unchanged");
                return Ok(RawOutcome {
                    cid: Some(cid),
                    size: prev.cumulative_size(),
                    changed: false,
                });
            }
        }

        let node = if rollback.is_empty() {
            node
        } else {
            let entries = serde_json::to_vec_pretty(&rollback)?;
            let added = self.store.add_blob(&entries, self.timeouts.long)?;
            let mut all = node.links().to_vec();
            all.push(Link {
                name: ROLLBACK_NAME.to_string(),
                target: added.cid,
                size: added.size,
            });
            DirectoryNode::new(all)?
        };

        let added = submit_node(self.store, &node, &self.timeouts, self.verify)?;
        let changed = previous_cid != Some(added.cid);
        debug!(
            path = %display_path(path),
            locator = %gateway_url(&self.gateway, &added.cid),
            changed,
            rollback = rollback.len(),
            "level rebuilt"
        );

        Ok(RawOutcome {
            cid: Some(added.cid),
            size: added.size,
            changed,
        })
    }

    fn fetch_previous(&self, cid: &Cid, path: &str) -> Option<DirectoryNode> {
        match self
            .store
            .get_node(cid, self.timeouts.long)
            .and_then(Node::into_directory)
        {
            Ok(node) => Some(node),
            Err(e) => {
                warn!(path = %display_path(path), locator = %gateway_url(&self.gateway, cid), error = %e, "previous snapshot unavailable");
                None
            }
        }
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "/" } else { path }
}

/// Parse a `previous.json` rollback blob.
pub fn parse_rollback(bytes: &[u8]) -> Result<BTreeMap<String, Cid>> {
    Ok(serde_json::from_slice(bytes)?)
}
