// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian machine architecture names. */

use {
    crate::error::{RepositoryError, Result},
    once_cell::sync::Lazy,
    regex::Regex,
    std::{
        fmt::{Display, Formatter},
        str::FromStr,
    },
};

/// Architecture tokens are lowercase alphanumeric words joined by hyphens.
///
/// e.g. `amd64`, `all`, `musl-linux-arm64`.
static ARCHITECTURE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-z0-9]+(-[a-z0-9]+)*$").expect("static regex should compile"));

/// A validated Debian architecture name.
///
/// Architecture names end up in paths (`binary-<arch>`, `Contents-<arch>.gz`) and in
/// the space-delimited `Architectures` field of `Release` files, so anything containing
/// whitespace or path separators is rejected.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Architecture(String);

impl Architecture {
    /// Construct an instance after validating the name.
    pub fn new(name: &str) -> Result<Self> {
        if ARCHITECTURE_RE.is_match(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(RepositoryError::ArchitectureInvalid(name.to_string()))
        }
    }

    /// The architecture name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the `all` pseudo-architecture.
    pub fn is_all(&self) -> bool {
        self.0 == "all"
    }
}

impl FromStr for Architecture {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for Architecture {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Architecture {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() -> Result<()> {
        for name in ["amd64", "arm64", "all", "i386", "musl-linux-arm64", "ppc64el"] {
            assert_eq!(Architecture::new(name)?.as_str(), name);
        }

        assert!(Architecture::new("all")?.is_all());

        Ok(())
    }

    #[test]
    fn invalid_names() {
        for name in ["", "AMD64", "amd 64", "amd64/", "-amd64", "amd64-", "a\nb"] {
            assert!(
                matches!(
                    Architecture::new(name),
                    Err(RepositoryError::ArchitectureInvalid(_))
                ),
                "{:?} should be rejected",
                name
            );
        }
    }
}
