//! Locators: direct (`/ipfs/<cid>/path`) or indirect (`/ipns/<name>/path`)
//! references to content.

use crate::cid::Cid;
use crate::client::{ObjectStore, Timeouts};
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Where resolution of a locator starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Root {
    /// An immutable CID.
    Cid(Cid),
    /// A mutable name, dereferenced at resolution time.
    Name(String),
}

/// A parsed locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    root: Root,
    path: Vec<String>,
}

impl Locator {
    /// A locator for a CID with no sub-path.
    pub fn direct(cid: Cid) -> Self {
        Self {
            root: Root::Cid(cid.to_v1()),
            path: Vec::new(),
        }
    }

    /// A locator for a mutable name with no sub-path.
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            root: Root::Name(name.into()),
            path: Vec::new(),
        }
    }

    /// Parse any of the accepted spellings:
    ///
    /// - `/ipfs/<cid>/a/b`, `/ipns/<name>/a/b`
    /// - `ipfs://<cid>/a/b`, `ipns://<name>/a/b`
    /// - gateway URLs containing an `/ipfs/` or `/ipns/` segment
    /// - a bare CID
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_locator(input, "empty locator"));
        }

        // Query strings and fragments never address content.
        let body = trimmed
            .split(['?', '#'])
            .next()
            .unwrap_or_default();

        let (namespace, rest) = if let Some(rest) = body.strip_prefix("ipfs://") {
            ("ipfs", rest.split('/').collect::<Vec<_>>())
        } else if let Some(rest) = body.strip_prefix("ipns://") {
            ("ipns", rest.split('/').collect::<Vec<_>>())
        } else {
            let segments: Vec<&str> = body.split('/').collect();
            match segments
                .iter()
                .position(|s| *s == "ipfs" || *s == "ipns")
            {
                Some(i) => (segments[i], segments[i + 1..].to_vec()),
                None if !body.contains('/') => {
                    let cid = Cid::parse(body)
                        .map_err(|e| Error::invalid_locator(input, e.to_string()))?;
                    return Ok(Self::direct(cid));
                }
                None => {
                    return Err(Error::invalid_locator(
                        input,
                        "expected an /ipfs/ or /ipns/ segment",
                    ));
                }
            }
        };

        let mut parts = rest.into_iter().filter(|s| !s.is_empty());
        let head = parts
            .next()
            .ok_or_else(|| Error::invalid_locator(input, format!("missing {} root", namespace)))?;
        let path = parts.map(str::to_string).collect();

        let root = match namespace {
            "ipfs" => Root::Cid(
                Cid::parse(head)
                    .map_err(|e| Error::invalid_locator(input, e.to_string()))?
                    .to_v1(),
            ),
            _ => Root::Name(head.to_string()),
        };

        Ok(Self { root, path })
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Whether resolution needs a name lookup.
    pub fn is_indirect(&self) -> bool {
        matches!(self.root, Root::Name(_))
    }

    /// Dereference the name (if any), then walk the sub-path link by link.
    pub fn resolve<S: ObjectStore + ?Sized>(&self, store: &S, timeouts: &Timeouts) -> Result<Cid> {
        let mut cid = match &self.root {
            Root::Cid(cid) => *cid,
            Root::Name(name) => store.resolve_name(name, timeouts.short)?,
        };

        for segment in &self.path {
            let node = store.get_node(&cid, timeouts.long)?.into_directory()?;
            let link = node
                .get(segment)
                .ok_or_else(|| Error::link_not_found(cid.to_string(), segment))?;
            cid = link.target;
        }

        Ok(cid.to_v1())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            Root::Cid(cid) => write!(f, "/ipfs/{}", cid)?,
            Root::Name(name) => write!(f, "/ipns/{}", name)?,
        }
        for segment in &self.path {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for Locator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Locator::parse(s)
    }
}

/// Human-readable public locator, `<gateway>/ipfs/<cid>`.
pub fn gateway_url(gateway: &str, cid: &Cid) -> String {
    format!("{}/ipfs/{}", gateway.trim_end_matches('/'), cid.to_v1())
}

/// Trim a string field and treat blank as absent.
pub fn non_blank<S: AsRef<str>>(value: Option<S>) -> Option<String> {
    value
        .as_ref()
        .map(|v| v.as_ref().trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid::Codec;
    use crate::hash::{Algorithm, Hash};
    use crate::node::{DirectoryNode, Link};
    use crate::store::LocalStore;
    use tempfile::TempDir;

    fn cid(data: &[u8]) -> Cid {
        Cid::new_v1(Codec::DagPb, Hash::hash_bytes(data))
    }

    #[test]
    fn test_parse_direct_forms() {
        let c = cid(b"root");
        let expected = Locator {
            root: Root::Cid(c),
            path: vec!["builds".to_string(), "1.0.0".to_string()],
        };

        for input in [
            format!("/ipfs/{}/builds/1.0.0", c),
            format!("ipfs://{}/builds/1.0.0", c),
            format!("https://gw.example.org/ipfs/{}/builds/1.0.0/?download=1", c),
            format!("gateway/ipfs/{}/builds//1.0.0", c),
        ] {
            assert_eq!(Locator::parse(&input).unwrap(), expected, "{}", input);
        }

        assert_eq!(Locator::parse(&c.to_string()).unwrap(), Locator::direct(c));
    }

    #[test]
    fn test_v0_root_normalized() {
        let hash = Hash::hash_bytes(b"v0");
        let locator = Locator::parse(&format!("/ipfs/{}", hash.to_hex())).unwrap();
        assert_eq!(locator.root(), &Root::Cid(Cid::new_v1(Codec::DagPb, hash)));
    }

    #[test]
    fn test_parse_indirect_forms() {
        let locator = Locator::parse("/ipns/builds.example.org/app/latest-build").unwrap();
        assert!(locator.is_indirect());
        assert_eq!(locator.root(), &Root::Name("builds.example.org".to_string()));
        assert_eq!(locator.path(), ["app", "latest-build"]);
        assert_eq!(
            locator.to_string(),
            "/ipns/builds.example.org/app/latest-build"
        );

        let short = Locator::parse("ipns://builds").unwrap();
        assert_eq!(short, Locator::name("builds"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "   ", "/ipfs/", "/ipfs/not-a-cid/x", "some/relative/path", "ipns://"] {
            assert!(
                matches!(Locator::parse(bad), Err(Error::InvalidLocator { .. })),
                "{:?}",
                bad
            );
        }
    }

    #[test]
    fn test_resolve_walks_path() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::init(temp_dir.path(), Algorithm::Blake3).unwrap();
        let timeouts = Timeouts::default();

        let artifact = store.put_blob(&b"binary"[..]).unwrap();
        let inner = store
            .put_directory(&DirectoryNode::new(vec![Link::new("app.bin", artifact.cid, artifact.size).unwrap()]).unwrap())
            .unwrap();
        let root = store
            .put_directory(&DirectoryNode::new(vec![Link::new("1.0.0", inner.cid, inner.size).unwrap()]).unwrap())
            .unwrap();
        store.names().publish("builds", &root.cid).unwrap();

        let direct = Locator::parse(&format!("/ipfs/{}/1.0.0/app.bin", root.cid)).unwrap();
        assert_eq!(direct.resolve(&store, &timeouts).unwrap(), artifact.cid);

        let indirect = Locator::parse("/ipns/builds/1.0.0").unwrap();
        assert_eq!(indirect.resolve(&store, &timeouts).unwrap(), inner.cid);

        let dangling = Locator::parse("/ipns/builds/2.0.0").unwrap();
        assert!(matches!(
            dangling.resolve(&store, &timeouts),
            Err(Error::LinkNotFound { .. })
        ));

        let unknown = Locator::parse("/ipns/nobody").unwrap();
        assert!(matches!(
            unknown.resolve(&store, &timeouts),
            Err(Error::NameNotFound { .. })
        ));
    }

    #[test]
    fn test_gateway_url() {
        let c = cid(b"x");
        assert_eq!(gateway_url("gateway", &c), format!("gateway/ipfs/{}", c));
        assert_eq!(
            gateway_url("https://gw.example.org/", &Cid::new_v0(*c.hash())),
            format!("https://gw.example.org/ipfs/{}", c)
        );
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  abc ")), Some("abc".to_string()));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(Some(String::new())), None);
        assert_eq!(non_blank::<&str>(None), None);
    }
}
