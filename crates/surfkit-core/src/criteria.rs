//! Fluent selection rules for surfaces.
//!
//! [`MatchCriteria`] says which window or context a description should be
//! bound to. Exactly one rule is active per resolution:
//!
//! - [`MatchCriteria::ByIndex`] - the surface first observed at that position
//! - [`MatchCriteria::ByName`] - a mobile context with exactly this name
//! - [`MatchCriteria::ByTitleRegex`] - a window whose live title matches
//! - [`MatchCriteria::ByUrlRegexSet`] - a window whose navigation history
//!   satisfies every pattern
//!
//! # Example
//!
//! ```
//! use surfkit_core::criteria::MatchCriteria;
//! use surfkit_core::driver::SurfaceKind;
//!
//! let home = MatchCriteria::by_title("^Home$").unwrap();
//! assert!(home.supports(SurfaceKind::Window));
//! assert!(!home.supports(SurfaceKind::Context));
//! ```

use std::fmt;

use regex::Regex;

use crate::driver::SurfaceKind;
use crate::error::{CoreError, Result};

/// Tagged selection rule used by the handle registry.
#[derive(Debug, Clone)]
pub enum MatchCriteria {
    /// The handle with this discovery index. Valid for every surface kind.
    ByIndex(usize),
    /// Exact match on the live context name. Contexts only.
    ByName(String),
    /// Live title matches the pattern. Windows only.
    ByTitleRegex(Regex),
    /// Every pattern matches some URL of the navigation history. Windows only.
    ByUrlRegexSet(Vec<Regex>),
}

impl MatchCriteria {
    pub fn by_index(index: usize) -> Self {
        MatchCriteria::ByIndex(index)
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        MatchCriteria::ByName(name.into())
    }

    /// Builds a title rule, compiling the pattern.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCriteria`] if the pattern is not a valid regex.
    pub fn by_title(pattern: &str) -> Result<Self> {
        Ok(MatchCriteria::ByTitleRegex(compile(pattern)?))
    }

    /// Builds a URL rule from a set of patterns, compiling each one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCriteria`] if the set is empty or any
    /// pattern is not a valid regex.
    pub fn by_urls<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let compiled = patterns
            .into_iter()
            .map(|p| compile(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        if compiled.is_empty() {
            return Err(CoreError::InvalidCriteria(
                "URL pattern set must not be empty".to_string(),
            ));
        }
        Ok(MatchCriteria::ByUrlRegexSet(compiled))
    }

    /// Short static name of the active rule, for logs and error messages.
    pub fn variant_name(&self) -> &'static str {
        match self {
            MatchCriteria::ByIndex(_) => "by_index",
            MatchCriteria::ByName(_) => "by_name",
            MatchCriteria::ByTitleRegex(_) => "by_title_regex",
            MatchCriteria::ByUrlRegexSet(_) => "by_url_regex_set",
        }
    }

    /// Whether this rule can select a surface of the given kind.
    pub fn supports(&self, kind: SurfaceKind) -> bool {
        match self {
            MatchCriteria::ByIndex(_) => true,
            MatchCriteria::ByName(_) => kind == SurfaceKind::Context,
            MatchCriteria::ByTitleRegex(_) | MatchCriteria::ByUrlRegexSet(_) => {
                kind == SurfaceKind::Window
            }
        }
    }

    /// True when every pattern of a URL rule matches at least one history entry.
    pub(crate) fn urls_match(patterns: &[Regex], history: &[String]) -> bool {
        patterns
            .iter()
            .all(|pattern| history.iter().any(|url| pattern.is_match(url)))
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| CoreError::InvalidCriteria(format!("invalid pattern '{}': {}", pattern, e)))
}

impl fmt::Display for MatchCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchCriteria::ByIndex(index) => write!(f, "index is {}", index),
            MatchCriteria::ByName(name) => write!(f, "context name is '{}'", name),
            MatchCriteria::ByTitleRegex(re) => write!(f, "title matches '{}'", re.as_str()),
            MatchCriteria::ByUrlRegexSet(set) => {
                let patterns: Vec<&str> = set.iter().map(|r| r.as_str()).collect();
                write!(f, "URLs match [{}]", patterns.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_compatibility() {
        assert!(MatchCriteria::by_index(0).supports(SurfaceKind::Window));
        assert!(MatchCriteria::by_index(0).supports(SurfaceKind::Context));
        assert!(MatchCriteria::by_name("NATIVE_APP").supports(SurfaceKind::Context));
        assert!(!MatchCriteria::by_name("NATIVE_APP").supports(SurfaceKind::Window));

        let urls = MatchCriteria::by_urls(["example\\.com"]).unwrap();
        assert!(urls.supports(SurfaceKind::Window));
        assert!(!urls.supports(SurfaceKind::Context));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = MatchCriteria::by_title("(unclosed").unwrap_err();
        assert!(matches!(err, CoreError::InvalidCriteria(_)));
    }

    #[test]
    fn empty_url_set_is_rejected() {
        let err = MatchCriteria::by_urls(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCriteria(_)));
    }

    #[test]
    fn url_set_requires_every_pattern() {
        let history = vec![
            "https://shop.example.com/".to_string(),
            "https://shop.example.com/cart".to_string(),
        ];
        let both = [Regex::new("example\\.com/$").unwrap(), Regex::new("/cart$").unwrap()];
        assert!(MatchCriteria::urls_match(&both, &history));

        let missing = [Regex::new("/cart$").unwrap(), Regex::new("/checkout$").unwrap()];
        assert!(!MatchCriteria::urls_match(&missing, &history));
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(MatchCriteria::by_index(2).to_string(), "index is 2");
        assert_eq!(
            MatchCriteria::by_title("^Home$").unwrap().to_string(),
            "title matches '^Home$'"
        );
        assert_eq!(
            MatchCriteria::by_urls(["a", "b"]).unwrap().to_string(),
            "URLs match [a, b]"
        );
    }
}
