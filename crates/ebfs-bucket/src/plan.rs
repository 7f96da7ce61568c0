//! Batch planning: which entries a request selects and where each one lands
//!
//! A request is classified once per batch into a [`Selector`] and a
//! [`Placement`]; per-entry work then only asks the placement for a target.
//!
//! Placement precedence:
//! 1. literal source, destination without trailing `/` -> [`Placement::SingleRename`]
//! 2. source and destination both end in `/`           -> [`Placement::SubtreeRename`]
//! 3. source carries a wildcard                        -> [`Placement::GlobScoped`]
//! 4. anything else                                    -> [`Placement::LiteralReroot`]

use ebfs_crypto::normalize_path;

use crate::error::BucketResult;
use crate::matcher::{has_wildcard, GlobMatcher};

/// Which plaintext paths a request selects
#[derive(Debug, Clone)]
pub enum Selector {
    /// Empty source or `/`: the whole namespace
    All,
    /// One literal path
    Exact(String),
    /// Source ending in `/`: everything below that directory
    Directory(String),
    Glob(GlobMatcher),
}

impl Selector {
    pub fn parse(source: &str) -> BucketResult<Self> {
        if has_wildcard(source) {
            return Ok(Selector::Glob(GlobMatcher::new(source)?));
        }
        let normalized = normalize_path(source)?;
        Ok(if normalized.is_empty() {
            Selector::All
        } else if source.ends_with('/') {
            Selector::Directory(normalized)
        } else {
            Selector::Exact(normalized)
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Selector::All => true,
            Selector::Exact(p) => path == p,
            Selector::Directory(dir) => path
                .strip_prefix(dir.as_str())
                .is_some_and(|rest| rest.starts_with('/')),
            Selector::Glob(m) => m.matches(path),
        }
    }

    /// True when at most one object can match.
    pub fn is_single_object(&self) -> bool {
        matches!(self, Selector::Exact(_))
    }

    /// Matching paths from `candidates`, in their original order.
    pub fn select<'a, I>(&self, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .filter(|p| self.matches(p))
            .map(str::to_string)
            .collect()
    }
}

/// Where a matched entry lands at the destination
#[derive(Debug, Clone)]
pub enum Placement {
    /// The destination path is used literally
    SingleRename { destination: String },
    /// Directory rename: root + matched path
    SubtreeRename { root: String },
    /// root + the match's remainder after the pattern's literal prefix
    GlobScoped { root: String, matcher: GlobMatcher },
    /// root + matched path
    LiteralReroot { root: String },
}

/// Join two virtual paths and normalize the result. `..` segments are refused.
pub fn join_virtual(root: &str, rel: &str) -> BucketResult<String> {
    Ok(normalize_path(&format!("{root}/{rel}"))?)
}

impl Placement {
    pub fn resolve(selector: &Selector, source: &str, destination: &str) -> BucketResult<Self> {
        let root = normalize_path(destination)?;
        // the bucket root can only be a directory
        let dest_is_dir = destination.ends_with('/') || root.is_empty();
        Ok(Self::classify(selector, source.ends_with('/'), dest_is_dir, root))
    }

    /// Apply the precedence rules to an already-classified destination.
    pub fn classify(
        selector: &Selector,
        source_is_dir: bool,
        dest_is_dir: bool,
        root: String,
    ) -> Self {
        match selector {
            Selector::Exact(_) if !dest_is_dir => Placement::SingleRename { destination: root },
            Selector::Directory(_) | Selector::All if source_is_dir && dest_is_dir => {
                Placement::SubtreeRename { root }
            }
            Selector::Glob(matcher) => Placement::GlobScoped {
                root,
                matcher: matcher.clone(),
            },
            _ => Placement::LiteralReroot { root },
        }
    }

    /// Destination path for `matched`; fails if `matched` carries `..` segments.
    pub fn target(&self, matched: &str) -> BucketResult<String> {
        match self {
            Placement::SingleRename { destination } => Ok(destination.clone()),
            Placement::SubtreeRename { root } | Placement::LiteralReroot { root } => {
                join_virtual(root, matched)
            }
            Placement::GlobScoped { root, matcher } => {
                join_virtual(root, matcher.remainder(matched))
            }
        }
    }
}

/// A request resolved for one batch
#[derive(Debug, Clone)]
pub struct Plan {
    selector: Selector,
    placement: Placement,
}

impl Plan {
    pub fn new(source: &str, destination: &str) -> BucketResult<Self> {
        let selector = Selector::parse(source)?;
        let placement = Placement::resolve(&selector, source, destination)?;
        Ok(Self {
            selector,
            placement,
        })
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    pub fn target(&self, matched: &str) -> BucketResult<String> {
        self.placement.target(matched)
    }
}
