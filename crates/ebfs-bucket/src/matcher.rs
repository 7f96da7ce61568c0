//! Shell-style matching over whole virtual paths
//!
//! `*` is the only wildcard. It matches any run of characters including `/`,
//! so `dest/*` selects the entire subtree under `dest`. Every other character
//! is literal, `?` and `[` included.

use ::glob::{MatchOptions, Pattern};

use crate::error::{BucketError, BucketResult};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// True if `s` contains a wildcard.
pub fn has_wildcard(s: &str) -> bool {
    s.contains('*')
}

/// Rewrite a `*`-only pattern into `glob` syntax: runs of `*` collapse to
/// one and the text between them is escaped.
pub(crate) fn to_glob_syntax(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for (i, literal) in pattern.split('*').enumerate() {
        if i > 0 && !out.ends_with('*') {
            out.push('*');
        }
        out.push_str(&Pattern::escape(literal));
    }
    out
}

/// A pattern compiled once per batch
#[derive(Debug, Clone)]
pub struct GlobMatcher {
    raw: String,
    pattern: Pattern,
}

impl GlobMatcher {
    pub fn new(pattern: &str) -> BucketResult<Self> {
        let raw = pattern.trim_start_matches('/').to_string();
        let syntax = to_glob_syntax(&raw);
        let compiled = Pattern::new(&syntax).map_err(|e| BucketError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            raw,
            pattern: compiled,
        })
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.pattern.matches_with(candidate, MATCH_OPTIONS)
    }

    /// See [`relative_remainder`].
    pub fn remainder<'a>(&self, matched: &'a str) -> &'a str {
        relative_remainder(&self.raw, matched)
    }
}

/// One-shot match of `candidate` against `pattern`.
pub fn matches(pattern: &str, candidate: &str) -> BucketResult<bool> {
    Ok(GlobMatcher::new(pattern)?.matches(candidate))
}

/// Strip the literal prefix `pattern` shares with `matched`.
///
/// Segments are compared left to right and comparison stops at the first
/// segment that differs or that carries a wildcard. If nothing is left, the
/// basename of `matched` is returned.
pub fn relative_remainder<'a>(pattern: &str, matched: &'a str) -> &'a str {
    let pattern = pattern.trim_start_matches('/');

    let mut offset = 0usize;
    let mut rest = matched;
    for segment in pattern.split('/') {
        if has_wildcard(segment) {
            break;
        }
        match rest.split_once('/') {
            Some((head, tail)) if head == segment => {
                offset += head.len() + 1;
                rest = tail;
            }
            None if rest == segment => {
                offset = matched.len();
                rest = "";
                break;
            }
            _ => break,
        }
    }

    if rest.is_empty() {
        return basename(matched);
    }
    &matched[offset..]
}

pub(crate) fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
