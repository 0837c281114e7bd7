//! End-to-end properties of the raw and production passes.

use pinsync_core::{
    Added, Algorithm, BuildRecord, Cid, DirectoryNode, Error, Link, LocalStore, Locator,
    MANIFEST_NAME, MemoryRepository, Node, NodeKind, ObjectStore, PinMode,
    ProductionSynchronizer, ROLLBACK_NAME, RawSynchronizer, RecordRepository, Result, Stage, Stat,
    Timeouts, Updater, parse_rollback,
};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Wraps a store and fails selected calls.
struct FlakyStore<'a> {
    inner: &'a LocalStore,
    unreachable: HashSet<Cid>,
    fail_put: Box<dyn Fn(&DirectoryNode) -> bool + 'a>,
}

impl<'a> FlakyStore<'a> {
    fn new(inner: &'a LocalStore) -> Self {
        Self {
            inner,
            unreachable: HashSet::new(),
            fail_put: Box::new(|_: &DirectoryNode| false),
        }
    }

    fn unreachable(mut self, cid: Cid) -> Self {
        self.unreachable.insert(cid);
        self
    }

    fn fail_put_when(mut self, predicate: impl Fn(&DirectoryNode) -> bool + 'a) -> Self {
        self.fail_put = Box::new(predicate);
        self
    }

    fn check(&self, operation: &str, cid: &Cid, timeout: Duration) -> Result<()> {
        if self.unreachable.contains(cid) {
            return Err(Error::timeout(operation, timeout));
        }
        Ok(())
    }
}

impl ObjectStore for FlakyStore<'_> {
    fn get_node(&self, cid: &Cid, timeout: Duration) -> Result<Node> {
        self.check("get_node", cid, timeout)?;
        self.inner.get_node(cid, timeout)
    }

    fn stat_node(&self, cid: &Cid, timeout: Duration) -> Result<Stat> {
        self.check("stat_node", cid, timeout)?;
        self.inner.stat_node(cid, timeout)
    }

    fn resolve_name(&self, name: &str, timeout: Duration) -> Result<Cid> {
        self.inner.resolve_name(name, timeout)
    }

    fn publish_name(&self, name: &str, cid: &Cid, timeout: Duration) -> Result<()> {
        self.inner.publish_name(name, cid, timeout)
    }

    fn put_node(&self, node: &DirectoryNode, timeout: Duration) -> Result<Added> {
        if (self.fail_put)(node) {
            return Err(Error::timeout("put_node", timeout));
        }
        self.inner.put_node(node, timeout)
    }

    fn add_blob(&self, bytes: &[u8], timeout: Duration) -> Result<Added> {
        self.inner.add_blob(bytes, timeout)
    }

    fn pin(&self, cid: &Cid, mode: PinMode) -> Result<()> {
        self.inner.pin(cid, mode)
    }

    fn unpin(&self, cid: &Cid) -> Result<()> {
        self.inner.unpin(cid)
    }
}

struct Workspace {
    temp: TempDir,
    store: LocalStore,
}

impl Workspace {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let store = LocalStore::init(temp.path().join("store"), Algorithm::Blake3).unwrap();
        Self { temp, store }
    }

    fn source_dir(&self) -> PathBuf {
        self.temp.path().join("source")
    }

    /// Write a build directory: a published artifact plus a manifest naming it.
    fn write_build(&self, rel: &str, version: &str, artifact: &[u8]) {
        let build = self.store.put_blob(artifact).unwrap();
        let dir = self
            .store
            .put_directory(&DirectoryNode::new(vec![Link::new("app.bin", build.cid, build.size).unwrap()]).unwrap())
            .unwrap();

        let path = self.source_dir().join(rel);
        fs::create_dir_all(&path).unwrap();
        fs::write(
            path.join(MANIFEST_NAME),
            format!(
                r#"{{"build":"app","version":"{}","buildUri":"/ipfs/{}"}}"#,
                version, dir.cid
            ),
        )
        .unwrap();
    }

    fn write_file(&self, rel: &str, contents: &[u8]) {
        let path = self.source_dir().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn import(&self) -> Cid {
        self.store.add_path(&self.source_dir()).unwrap().cid
    }

    fn dir(&self, cid: &Cid) -> DirectoryNode {
        self.store.get_directory(cid).unwrap()
    }

    fn child(&self, cid: &Cid, path: &str) -> Cid {
        let locator = Locator::parse(&format!("/ipfs/{}/{}", cid, path)).unwrap();
        locator.resolve(&self.store, &Timeouts::default()).unwrap()
    }
}

fn sample(ws: &Workspace) {
    ws.write_build("app/1.0.0", "1.0.0-build", b"app 1.0.0");
    ws.write_build("app/1.0.1", "1.0.1-build", b"app 1.0.1");
    ws.write_build("app/1.0.0-r", "1.0.0-release", b"app 1.0.0 release");
    ws.write_build("tool/0.3.0", "0.3.0-pre-release", b"tool 0.3.0");
    ws.write_file("app/1.0.0/notes.txt", b"release notes");
}

/// Assert strict reverse-lexicographic order at every directory below `cid`.
fn assert_sorted(store: &LocalStore, cid: &Cid) {
    let node = store.get_directory(cid).unwrap();
    for pair in node.links().windows(2) {
        assert!(
            pair[0].name.as_bytes() > pair[1].name.as_bytes(),
            "{:?} before {:?}",
            pair[0].name,
            pair[1].name
        );
    }
    for link in node.links() {
        if store.stat(&link.target).unwrap().kind == NodeKind::Directory {
            assert_sorted(store, &link.target);
        }
    }
}

#[test]
fn idempotent_raw_and_production() {
    let ws = Workspace::new();
    sample(&ws);
    let source = ws.import();
    let timeouts = Timeouts::default();

    let raw = RawSynchronizer::new(&ws.store, timeouts);
    let first = raw.sync(&source, None).unwrap();
    let second = raw.sync(&source, first.cid.as_ref()).unwrap();
    assert_eq!(first.cid, second.cid);
    assert!(!second.changed);

    let raw_root = first.cid.unwrap();
    let production = ProductionSynchronizer::new(&ws.store, timeouts);
    assert_eq!(
        production.sync(&raw_root, "/").unwrap(),
        production.sync(&raw_root, "/").unwrap()
    );
}

#[test]
fn identical_link_sets_share_a_cid() {
    let a = Workspace::new();
    let b = Workspace::new();

    let make = |ws: &Workspace, order: &[&str]| {
        let links = order
            .iter()
            .map(|name| {
                let added = ws.store.put_blob(name.as_bytes()).unwrap();
                Link::new(*name, added.cid, added.size).unwrap()
            })
            .collect();
        ws.store.put_directory(&DirectoryNode::new(links).unwrap()).unwrap()
    };

    let first = make(&a, &["latest-build", "1.0.0", "release"]);
    let second = make(&b, &["release", "latest-build", "1.0.0"]);
    assert_eq!(first, second);
}

#[test]
fn election_on_the_published_tree() {
    let ws = Workspace::new();
    ws.write_build("app/a", "1.0.0-build", b"a");
    ws.write_build("app/b", "1.0.1-build", b"b");
    ws.write_build("app/c", "1.0.0-release", b"c");
    let source = ws.import();

    let raw = RawSynchronizer::new(&ws.store, Timeouts::default())
        .sync(&source, None)
        .unwrap()
        .cid
        .unwrap();
    let production = ProductionSynchronizer::new(&ws.store, Timeouts::default())
        .sync(&raw, "/")
        .unwrap()
        .cid
        .unwrap();

    let app = ws.child(&production, "app");
    let node = ws.dir(&app);
    assert_eq!(node.get("latest-build").unwrap().target, ws.child(&app, "b"));
    assert_eq!(node.get("release").unwrap().target, ws.child(&app, "c"));
    assert!(node.get("latest-pre-release").is_none());
}

#[test]
fn one_changed_leaf_rewrites_one_path() {
    let ws = Workspace::new();
    sample(&ws);
    let raw = RawSynchronizer::new(&ws.store, Timeouts::default());
    let before = raw.sync(&ws.import(), None).unwrap().cid.unwrap();

    ws.write_build("app/1.0.1", "1.0.1-build", b"app 1.0.1 rebuilt");
    let after = raw.sync(&ws.import(), Some(&before)).unwrap();
    assert!(after.changed);
    let after = after.cid.unwrap();

    assert_ne!(ws.child(&before, "app"), ws.child(&after, "app"));
    assert_ne!(ws.child(&before, "app/1.0.1"), ws.child(&after, "app/1.0.1"));

    assert_eq!(ws.child(&before, "tool"), ws.child(&after, "tool"));
    assert_eq!(ws.child(&before, "app/1.0.0"), ws.child(&after, "app/1.0.0"));
    assert_eq!(ws.child(&before, "app/1.0.0-r"), ws.child(&after, "app/1.0.0-r"));
}

#[test]
fn rollback_entries_track_changed_children_only() {
    let ws = Workspace::new();
    sample(&ws);
    let raw = RawSynchronizer::new(&ws.store, Timeouts::default());
    let before = raw.sync(&ws.import(), None).unwrap().cid.unwrap();
    let old_app = ws.child(&before, "app");

    ws.write_build("app/1.0.1", "1.0.1-build", b"app 1.0.1 rebuilt");
    let after = raw.sync(&ws.import(), Some(&before)).unwrap().cid.unwrap();

    let rollback_cid = ws.dir(&after).get(ROLLBACK_NAME).unwrap().target;
    let rollback = parse_rollback(&ws.store.get_blob(&rollback_cid).unwrap()).unwrap();
    assert_eq!(rollback.get("app"), Some(&old_app));
    assert!(!rollback.contains_key("tool"));

    // Unchanged subtree keeps no rollback entry.
    assert!(ws.dir(&ws.child(&after, "tool")).get(ROLLBACK_NAME).is_none());
}

#[test]
fn malformed_manifest_does_not_stop_the_run() {
    let ws = Workspace::new();
    sample(&ws);
    ws.write_file("app/1.0.2/current.json", b"{ this is not json");
    let raw = RawSynchronizer::new(&ws.store, Timeouts::default())
        .sync(&ws.import(), None)
        .unwrap()
        .cid
        .unwrap();

    let production = ProductionSynchronizer::new(&ws.store, Timeouts::default())
        .sync(&raw, "/")
        .unwrap();
    let root = production.cid.unwrap();
    let app = ws.child(&root, "app");

    // 1.0.2 is present but has no version, so 1.0.1 stays the latest build.
    assert!(ws.dir(&app).get("1.0.2").is_some());
    assert!(ws.dir(&ws.child(&app, "1.0.2")).get("app").is_none());
    assert_eq!(ws.dir(&app).get("latest-build").unwrap().target, ws.child(&app, "1.0.1"));
}

#[test]
fn unreachable_build_target_is_recovered() {
    let ws = Workspace::new();
    sample(&ws);
    let raw = RawSynchronizer::new(&ws.store, Timeouts::default())
        .sync(&ws.import(), None)
        .unwrap()
        .cid
        .unwrap();

    let healthy = ProductionSynchronizer::new(&ws.store, Timeouts::default())
        .sync(&raw, "/")
        .unwrap()
        .cid
        .unwrap();
    let target = ws.child(&healthy, "app/1.0.1/app");

    let flaky = FlakyStore::new(&ws.store).unreachable(target);
    let degraded = ProductionSynchronizer::new(&flaky, Timeouts::default())
        .sync(&raw, "/")
        .unwrap()
        .cid
        .unwrap();

    let app = ws.child(&degraded, "app");
    assert!(ws.dir(&ws.child(&app, "1.0.1")).get("app").is_none());
    assert_eq!(ws.dir(&app).get("latest-build").unwrap().target, ws.child(&app, "1.0.0"));
}

#[test]
fn produced_trees_are_sorted() {
    let ws = Workspace::new();
    sample(&ws);
    let raw = RawSynchronizer::new(&ws.store, Timeouts::default())
        .sync(&ws.import(), None)
        .unwrap()
        .cid
        .unwrap();
    let production = ProductionSynchronizer::new(&ws.store, Timeouts::default())
        .sync(&raw, "/")
        .unwrap()
        .cid
        .unwrap();

    assert_sorted(&ws.store, &raw);
    assert_sorted(&ws.store, &production);
}

#[test]
fn failed_submission_aborts_before_saving() {
    let ws = Workspace::new();
    sample(&ws);
    let source = ws.import();
    ws.store.names().publish("source", &source).unwrap();

    let flaky = FlakyStore::new(&ws.store).fail_put_when(|_| true);
    let records = MemoryRepository::new(BuildRecord::default());
    let updater = Updater::new(&flaky, &records, Locator::name("source"));

    assert!(matches!(updater.run(), Err(Error::Timeout { .. })));
    assert_eq!(updater.stage(), Stage::RawFailed);
    assert_eq!(records.load().unwrap(), BuildRecord::default());
    assert!(ws.store.names().get("raw").unwrap().is_none());
}

#[test]
fn production_failure_keeps_the_raw_stage() {
    let ws = Workspace::new();
    sample(&ws);
    let source = ws.import();
    ws.store.names().publish("source", &source).unwrap();

    // Only production levels carry election pointers.
    let flaky = FlakyStore::new(&ws.store)
        .fail_put_when(|node| node.get("latest-build").is_some());
    let records = MemoryRepository::new(BuildRecord::default());
    let updater = Updater::new(&flaky, &records, Locator::name("source"));

    assert!(updater.run().is_err());
    assert_eq!(updater.stage(), Stage::ProductionFailed);

    let record = records.load().unwrap();
    let raw = record.current_raw_build.unwrap();
    assert_eq!(record.current_build, None);
    assert_eq!(ws.store.names().get("raw").unwrap(), Some(raw));
    assert_eq!(ws.store.pins().get(&raw).unwrap(), Some(PinMode::Recursive));
}

#[test]
fn pinned_trees_survive_gc() {
    let ws = Workspace::new();
    sample(&ws);
    let source = ws.import();
    ws.store.names().publish("source", &source).unwrap();

    let records = MemoryRepository::new(BuildRecord::default());
    let report = Updater::new(&ws.store, &records, Locator::name("source"))
        .run()
        .unwrap();

    ws.store.gc(false).unwrap();
    assert_sorted(&ws.store, &report.raw.cid);
    assert_sorted(&ws.store, &report.production.cid);
    assert!(ws.store.contains(&ws.child(&report.production.cid, "app/latest-build/app/app.bin")));
}
