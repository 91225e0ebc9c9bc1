// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian package version string handling. */

use {
    std::{
        cmp::Ordering,
        fmt::{Display, Formatter},
        num::ParseIntError,
        str::FromStr,
    },
    thiserror::Error,
};

#[derive(Clone, Debug, Error)]
pub enum VersionError {
    #[error("error parsing string to integer: {0}")]
    ParseInt(#[from] ParseIntError),

    #[error("the epoch component has non-digit characters: {0}")]
    EpochNonNumeric(String),

    #[error("upstream_version component is empty: {0}")]
    UpstreamVersionEmpty(String),

    #[error("upstream_version component has illegal character: {0}")]
    UpstreamVersionIllegalChar(String),

    #[error("debian_revision component has illegal character: {0}")]
    DebianRevisionIllegalChar(String),
}

pub type Result<T> = std::result::Result<T, VersionError>;

/// A Debian package version.
///
/// Debian package versions consist of multiple sub-components and have rules about
/// sorting. The semantics are defined at
/// <https://www.debian.org/doc/debian-policy/ch-controlfields.html#version>.
///
/// The concise version is the format is `[epoch:]upstream_version[-debian_revision]`
/// and each component has rules about what characters are allowed.
///
/// Equality follows ordering: `1.0` and `0:1.0-0` are equal versions even though
/// their string forms differ.
#[derive(Clone, Debug)]
pub struct PackageVersion {
    epoch: Option<u32>,
    upstream_version: String,
    debian_revision: Option<String>,
}

impl PackageVersion {
    /// Construct an instance by parsing a version string.
    pub fn parse(s: &str) -> Result<Self> {
        // Epoch is the part before a colon, if present.
        // upstream_version and debian_revision are discovered by splitting on last hyphen.
        let (epoch, remainder) = match s.split_once(':') {
            Some((epoch, remainder)) => (Some(epoch), remainder),
            None => (None, s),
        };

        let (upstream, debian) = match remainder.rsplit_once('-') {
            Some((upstream, debian)) => (upstream, Some(debian)),
            None => (remainder, None),
        };

        let epoch = if let Some(epoch) = epoch {
            if !epoch.chars().all(|c| c.is_ascii_digit()) {
                return Err(VersionError::EpochNonNumeric(s.to_string()));
            }

            Some(u32::from_str(epoch)?)
        } else {
            None
        };

        if upstream.is_empty() {
            return Err(VersionError::UpstreamVersionEmpty(s.to_string()));
        }

        // The upstream_version must contain only alphanumerics and the characters . + - ~ (full stop,
        // plus, hyphen, tilde). If there is no debian_revision then hyphens are not allowed.
        if !upstream.chars().all(|c| match c {
            c if c.is_ascii_alphanumeric() => true,
            '.' | '+' | '~' => true,
            '-' => debian.is_some(),
            _ => false,
        }) {
            return Err(VersionError::UpstreamVersionIllegalChar(s.to_string()));
        }

        let debian_revision = if let Some(debian) = debian {
            if debian.is_empty()
                || !debian
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '~'))
            {
                return Err(VersionError::DebianRevisionIllegalChar(s.to_string()));
            }

            Some(debian.to_string())
        } else {
            None
        };

        Ok(Self {
            epoch,
            upstream_version: upstream.to_string(),
            debian_revision,
        })
    }

    /// The `epoch` component of the version string.
    ///
    /// Only `Some` if present or defined explicitly.
    pub fn epoch(&self) -> Option<u32> {
        self.epoch
    }

    /// Assumed value of `epoch` component.
    ///
    /// If the component isn't explicitly defined, a default of `0` will be assumed.
    pub fn epoch_assumed(&self) -> u32 {
        self.epoch.unwrap_or(0)
    }

    /// `upstream` component of the version string.
    pub fn upstream_version(&self) -> &str {
        &self.upstream_version
    }

    /// `debian_revision` component of the version string.
    pub fn debian_revision(&self) -> Option<&str> {
        self.debian_revision.as_deref()
    }

    /// The version string without its epoch.
    pub fn without_epoch(&self) -> String {
        match &self.debian_revision {
            Some(revision) => format!("{}-{}", self.upstream_version, revision),
            None => self.upstream_version.clone(),
        }
    }
}

impl FromStr for PackageVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Display for PackageVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // [epoch:]upstream_version[-debian_revision]
        if let Some(epoch) = self.epoch {
            write!(f, "{}:", epoch)?;
        }

        write!(f, "{}", self.without_epoch())
    }
}

/// Weight of a character in the non-digit part of a version component.
///
/// A tilde sorts before anything, even the end of a part. Letters sort before
/// everything else.
fn lexical_weight(c: Option<char>) -> i32 {
    match c {
        None => 0,
        Some('~') => -1,
        Some(c) if c.is_ascii_alphabetic() => c as i32,
        Some(c) => c as i32 + 256,
    }
}

fn lexical_compare(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars();
    let mut b_chars = b.chars();

    loop {
        match (a_chars.next(), b_chars.next()) {
            (None, None) => return Ordering::Equal,
            (a_char, b_char) => match lexical_weight(a_char).cmp(&lexical_weight(b_char)) {
                Ordering::Equal => {}
                res => return res,
            },
        }
    }
}

/// Compare two runs of ASCII digits numerically, without overflow.
fn numeric_compare(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');

    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn split_leading(s: &str, digits: bool) -> (&str, &str) {
    let pos = s
        .find(|c: char| c.is_ascii_digit() != digits)
        .unwrap_or(s.len());

    s.split_at(pos)
}

/// Compare a version component string using Debian rules.
fn compare_component(a: &str, b: &str) -> Ordering {
    // Alternately compare the leading non-digit run lexically and the leading digit
    // run numerically, until both inputs are exhausted. An empty digit run counts as zero.
    let mut a_remaining = a;
    let mut b_remaining = b;

    while !a_remaining.is_empty() || !b_remaining.is_empty() {
        let (a_text, a_rest) = split_leading(a_remaining, false);
        let (b_text, b_rest) = split_leading(b_remaining, false);

        match lexical_compare(a_text, b_text) {
            Ordering::Equal => {}
            res => return res,
        }

        let (a_digits, a_rest) = split_leading(a_rest, true);
        let (b_digits, b_rest) = split_leading(b_rest, true);

        match numeric_compare(a_digits, b_digits) {
            Ordering::Equal => {}
            res => return res,
        }

        a_remaining = a_rest;
        b_remaining = b_rest;
    }

    Ordering::Equal
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        // Epoch is compared numerically. Then upstream and debian components are compared
        // using a custom algorithm. The absence of a debian revision is equivalent to `0`.
        self.epoch_assumed()
            .cmp(&other.epoch_assumed())
            .then_with(|| compare_component(&self.upstream_version, &other.upstream_version))
            .then_with(|| {
                compare_component(
                    self.debian_revision.as_deref().unwrap_or("0"),
                    other.debian_revision.as_deref().unwrap_or("0"),
                )
            })
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PackageVersion {}

#[cfg(test)]
mod test {
    use super::*;

    fn v(s: &str) -> PackageVersion {
        PackageVersion::parse(s).unwrap()
    }

    #[test]
    fn parse() -> Result<()> {
        let version = PackageVersion::parse("1:4.7.0+dfsg1-2")?;
        assert_eq!(version.epoch(), Some(1));
        assert_eq!(version.upstream_version(), "4.7.0+dfsg1");
        assert_eq!(version.debian_revision(), Some("2"));

        let version = PackageVersion::parse("3.3.2.final~github")?;
        assert_eq!(version.epoch(), None);
        assert_eq!(version.upstream_version(), "3.3.2.final~github");
        assert_eq!(version.debian_revision(), None);

        let version = PackageVersion::parse("0.18.0+dfsg-2+b1")?;
        assert_eq!(version.upstream_version(), "0.18.0+dfsg");
        assert_eq!(version.debian_revision(), Some("2+b1"));

        let version = PackageVersion::parse("1.2-3-4")?;
        assert_eq!(version.upstream_version(), "1.2-3");
        assert_eq!(version.debian_revision(), Some("4"));

        Ok(())
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            PackageVersion::parse("a:1.0"),
            Err(VersionError::EpochNonNumeric(_))
        ));
        assert!(matches!(
            PackageVersion::parse(""),
            Err(VersionError::UpstreamVersionEmpty(_))
        ));
        assert!(matches!(
            PackageVersion::parse("1.0_beta"),
            Err(VersionError::UpstreamVersionIllegalChar(_))
        ));
        assert!(matches!(
            PackageVersion::parse("1.0-"),
            Err(VersionError::DebianRevisionIllegalChar(_))
        ));
    }

    #[test]
    fn format() -> Result<()> {
        for s in ["1:4.7.0+dfsg1-2", "3.3.2.final~github", "0.18.0+dfsg-2+b1"] {
            let v = PackageVersion::parse(s)?;
            assert_eq!(format!("{}", v), s);
        }

        assert_eq!(v("2:1.0-1").without_epoch(), "1.0-1");

        Ok(())
    }

    #[test]
    fn test_lexical_compare() {
        assert_eq!(lexical_compare("~~", "~~a"), Ordering::Less);
        assert_eq!(lexical_compare("~~a", "~~"), Ordering::Greater);
        assert_eq!(lexical_compare("~~a", "~"), Ordering::Less);
        assert_eq!(lexical_compare("~", "~~a"), Ordering::Greater);
        assert_eq!(lexical_compare("~", ""), Ordering::Less);
        assert_eq!(lexical_compare("", "~"), Ordering::Greater);
        assert_eq!(lexical_compare("", "a"), Ordering::Less);
        assert_eq!(lexical_compare("a", ""), Ordering::Greater);
        assert_eq!(lexical_compare("a", "+"), Ordering::Less);
        assert_eq!(lexical_compare("ab", "ba"), Ordering::Less);
    }

    #[test]
    fn test_compare_component() {
        assert_eq!(
            compare_component("1.0~beta1~svn1245", "1.0~beta1"),
            Ordering::Less
        );
        assert_eq!(compare_component("1.0~beta1", "1.0"), Ordering::Less);
        assert_eq!(compare_component("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_component("1.01", "1.1"), Ordering::Equal);
        assert_eq!(
            compare_component("123456789012345678901234567890", "9"),
            Ordering::Greater
        );
    }

    #[test]
    fn compare_version() {
        assert!(v("1:0.1") > v("9.9"));
        assert!(v("1.0-1") < v("1.0-2"));
        assert!(v("1.0-2") < v("1.1-1"));
        assert!(v("1.1-1") < v("2:1.0-1"));
        assert!(v("1.0~rc1-1") < v("1.0-1"));
        assert!(v("1.0") < v("1.0-1"));
        assert!(v("1.0+b1") > v("1.0"));
        assert_eq!(v("1.0"), v("0:1.0-0"));

        let mut versions = vec![v("2:1.0-1"), v("1.1-1"), v("1.0-2"), v("1.0-1")];
        versions.sort();
        assert_eq!(
            versions.iter().map(|x| x.to_string()).collect::<Vec<_>>(),
            vec!["1.0-1", "1.0-2", "1.1-1", "2:1.0-1"]
        );
    }
}
