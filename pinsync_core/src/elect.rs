//! Version pointer election.
//!
//! Sibling builds are grouped by substring matches on their version tag and the
//! greatest tag in each group gets a named pointer. Membership is not exclusive:
//! `1.0.0-pre-release` contains `release`, so it competes for `release` too.

use crate::cid::Cid;
use crate::node::Link;
use std::cmp::Ordering;
use tracing::debug;

/// A sibling eligible for election.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub cid: Cid,
    pub size: u64,
    pub version: Option<String>,
}

/// Pointer categories, in the order they are elected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Build,
    PreRelease,
    Release,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Build, Category::PreRelease, Category::Release];

    /// Substring a version must contain to belong to the category.
    pub fn token(self) -> &'static str {
        match self {
            Category::Build => "build",
            Category::PreRelease => "pre-release",
            Category::Release => "release",
        }
    }

    /// Name of the pointer link. Consumers look these up by name.
    pub fn pointer_name(self) -> &'static str {
        match self {
            Category::Build => "latest-build",
            Category::PreRelease => "latest-pre-release",
            Category::Release => "release",
        }
    }

    pub fn matches(self, version: &str) -> bool {
        version.contains(self.token())
    }
}

/// Elect one pointer link per non-empty category.
///
/// Within a category the candidate with the greatest version under [`collate`]
/// wins; on ties the earliest candidate is kept. Candidates without a version
/// never win anything.
pub fn elect(candidates: &[Candidate]) -> Vec<Link> {
    let mut pointers = Vec::new();

    for category in Category::ALL {
        let mut best: Option<(&Candidate, &str)> = None;

        for candidate in candidates {
            let Some(version) = candidate.version.as_deref() else {
                continue;
            };
            if !category.matches(version) {
                continue;
            }
            match best {
                Some((_, best_version)) if collate(version, best_version) != Ordering::Greater => {}
                _ => best = Some((candidate, version)),
            }
        }

        if let Some((winner, version)) = best {
            debug!(
                pointer = category.pointer_name(),
                name = %winner.name,
                version,
                cid = %winner.cid,
                "elected"
            );
            pointers.push(Link {
                name: category.pointer_name().to_string(),
                target: winner.cid.to_v1(),
                size: winner.size,
            });
        }
    }

    pointers
}

/// Root-locale collation order of ASCII whitespace, punctuation and symbols.
/// Everything listed sorts before digits.
const PUNCTUATION_ORDER: &str = "\t\n\u{b}\u{c}\r _-,;:!?.'\"()[]{}@*/\\&#%`^+<=>|~$";

/// Locale-style string ordering for version tags, following CLDR root
/// collation at tertiary strength.
///
/// Compared character by character: punctuation and symbols sort first in
/// root collation order (`_` < `-` < `.` < `+`), then digits, then letters
/// ignoring case. Remaining ties put lowercase before uppercase, then fall
/// back to code points so the order is total.
pub fn collate(a: &str, b: &str) -> Ordering {
    a.chars()
        .map(primary_key)
        .cmp(b.chars().map(primary_key))
        .then_with(|| a.chars().map(char::is_uppercase).cmp(b.chars().map(char::is_uppercase)))
        .then_with(|| a.cmp(b))
}

fn primary_key(c: char) -> (u8, u32) {
    if c.is_alphabetic() {
        (2, c.to_lowercase().next().unwrap_or(c) as u32)
    } else if c.is_numeric() {
        (1, c as u32)
    } else {
        // Unlisted symbols go after the listed ones, by code point.
        let rank = PUNCTUATION_ORDER
            .chars()
            .position(|p| p == c)
            .map_or(PUNCTUATION_ORDER.len() as u32 + c as u32, |i| i as u32);
        (0, rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid::Codec;
    use crate::hash::Hash;

    fn candidate(name: &str, version: Option<&str>) -> Candidate {
        Candidate {
            name: name.to_string(),
            cid: Cid::new_v1(Codec::DagPb, Hash::hash_bytes(name.as_bytes())),
            size: name.len() as u64,
            version: version.map(str::to_string),
        }
    }

    fn pointer<'a>(links: &'a [Link], name: &str) -> Option<&'a Link> {
        links.iter().find(|l| l.name == name)
    }

    #[test]
    fn test_elect_build_and_release() {
        let candidates = vec![
            candidate("a", Some("1.0.0-build")),
            candidate("b", Some("1.0.1-build")),
            candidate("c", Some("1.0.0-release")),
        ];
        let links = elect(&candidates);

        assert_eq!(links.len(), 2);
        assert_eq!(pointer(&links, "latest-build").unwrap().target, candidates[1].cid);
        assert_eq!(pointer(&links, "release").unwrap().target, candidates[2].cid);
        assert_eq!(pointer(&links, "release").unwrap().size, candidates[2].size);
        assert!(pointer(&links, "latest-pre-release").is_none());
    }

    #[test]
    fn test_pre_release_also_counts_as_release() {
        // "pre-release" contains "release".
        let candidates = vec![
            candidate("a", Some("2.0.0-pre-release")),
            candidate("b", Some("1.0.0-release")),
        ];
        let links = elect(&candidates);

        assert_eq!(pointer(&links, "latest-pre-release").unwrap().target, candidates[0].cid);
        assert_eq!(pointer(&links, "release").unwrap().target, candidates[0].cid);
        assert!(pointer(&links, "latest-build").is_none());
    }

    #[test]
    fn test_ties_keep_first_seen() {
        let candidates = vec![
            candidate("first", Some("1.0.0-build")),
            candidate("second", Some("1.0.0-build")),
        ];
        let links = elect(&candidates);
        assert_eq!(pointer(&links, "latest-build").unwrap().target, candidates[0].cid);
    }

    #[test]
    fn test_unversioned_and_unmatched_candidates() {
        let candidates = vec![
            candidate("a", None),
            candidate("b", Some("1.0.0")),
            candidate("c", Some("nightly")),
        ];
        assert!(elect(&candidates).is_empty());
        assert!(elect(&[]).is_empty());
    }

    #[test]
    fn test_collate_is_not_semver() {
        assert_eq!(collate("1.0.1-build", "1.0.0-build"), Ordering::Greater);
        assert_eq!(collate("1.0.10-build", "1.0.9-build"), Ordering::Less);
        assert_eq!(collate("1.0.0-release", "1.0.0-pre-release"), Ordering::Greater);
    }

    #[test]
    fn test_collate_classes_and_case() {
        assert_eq!(collate("-", "0"), Ordering::Less);
        assert_eq!(collate("9", "a"), Ordering::Less);
        assert_eq!(collate("B", "a"), Ordering::Greater);
        assert_eq!(collate("a", "A"), Ordering::Less);
        assert_eq!(collate("1.0.0-Build", "1.0.0-build"), Ordering::Greater);
        assert_eq!(collate("abc", "abc"), Ordering::Equal);
        assert_eq!(collate("ab", "abc"), Ordering::Less);
    }

    #[test]
    fn test_collate_punctuation_follows_root_order() {
        // Expected values from a CLDR root collator.
        assert_eq!(collate("1.0.0+build", "1.0.0-build"), Ordering::Greater);
        assert_eq!(collate("1.0.0_build", "1.0.0-build"), Ordering::Less);
        assert_eq!(collate("1.0.0-build", "1.0.0.build"), Ordering::Less);
        assert_eq!(collate("1.0.0+build", "1.0.00build"), Ordering::Less);
        assert_eq!(collate("1 0", "1_0"), Ordering::Less);
    }

    #[test]
    fn test_build_metadata_wins_election() {
        let candidates = vec![
            candidate("a", Some("1.0.0-build")),
            candidate("b", Some("1.0.0+build")),
        ];
        let links = elect(&candidates);
        assert_eq!(pointer(&links, "latest-build").unwrap().target, candidates[1].cid);
    }

    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            max_shrink_iters: 1000,
            ..ProptestConfig::default()
        })]

        /// Swapping arguments reverses the ordering
        #[test]
        fn prop_collate_antisymmetric(a in "[a-zA-Z0-9._+-]{0,12}", b in "[a-zA-Z0-9._+-]{0,12}") {
            prop_assert_eq!(collate(&a, &b), collate(&b, &a).reverse());
            prop_assert_eq!(collate(&a, &b) == Ordering::Equal, a == b);
        }

        /// The elected build pointer is never below any build candidate
        #[test]
        fn prop_elected_is_maximal(versions in prop::collection::vec("[0-9]\\.[0-9]\\.[0-9]-(build|release)", 1..8)) {
            let candidates: Vec<Candidate> = versions
                .iter()
                .enumerate()
                .map(|(i, v)| candidate(&format!("c{}", i), Some(v)))
                .collect();
            let links = elect(&candidates);

            if let Some(link) = pointer(&links, "latest-build") {
                let winner = candidates.iter().find(|c| c.cid == link.target).unwrap();
                let winner_version = winner.version.as_deref().unwrap();
                for c in candidates.iter().filter(|c| Category::Build.matches(c.version.as_deref().unwrap())) {
                    prop_assert_ne!(collate(c.version.as_deref().unwrap(), winner_version), Ordering::Greater);
                }
            } else {
                prop_assert!(versions.iter().all(|v| !v.contains("build")));
            }
        }
    }
}
