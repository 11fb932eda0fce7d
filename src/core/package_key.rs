//! Package identity within one resolution run.

use std::fmt;

/// A `(name, version)` pair.
///
/// Resolvers key their output by this pair, so two lockfile entries that
/// pin the same package collapse to one source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageKey {
    pub name: String,
    pub version: String,
}

impl PackageKey {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        PackageKey {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Whether the name carries an npm scope (`@scope/name`).
    pub fn is_scoped(&self) -> bool {
        self.name.starts_with('@')
    }
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_order() {
        let a = PackageKey::new("@babel/core", "7.0.0");
        let b = PackageKey::new("left-pad", "1.3.0");
        assert_eq!(b.to_string(), "left-pad@1.3.0");
        assert!(a < b);
        assert!(a.is_scoped());
        assert!(!b.is_scoped());
    }
}
