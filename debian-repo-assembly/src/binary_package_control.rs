// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian binary package control files. */

use {
    crate::{
        architecture::Architecture,
        control::ControlParagraph,
        error::{RepositoryError, Result},
        package_version::PackageVersion,
    },
    once_cell::sync::Lazy,
    regex::Regex,
    std::ops::{Deref, DerefMut},
};

/// Package names are at least 2 characters of lowercase letters, digits and `+-.`,
/// starting with an alphanumeric.
static PACKAGE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-z0-9][a-z0-9+.-]+$").expect("static regex should compile"));

/// Whether a string is a valid binary or source package name.
///
/// Package names become pool path components, so this also rules out path
/// separators and `.`/`..`.
pub fn is_valid_package_name(name: &str) -> bool {
    PACKAGE_NAME_RE.is_match(name)
}

/// A Debian binary package control file/paragraph.
///
/// See <https://www.debian.org/doc/debian-policy/ch-controlfields.html#binary-package-control-files-debian-control>.
///
/// Binary package control files are defined by a single paragraph with well-defined
/// fields. This type is a low-level wrapper around an inner [ControlParagraph].
/// [Deref] and [DerefMut] can be used to operate on the inner [ControlParagraph].
///
/// Binary package control paragraphs are seen in `DEBIAN/control` files and, extended
/// with pool location and checksum fields, in `Packages` indices.
///
/// Fields the repository pipeline cannot work without have getters that return
/// [Result] and will error if a field is not present. Everything else returns [Option].
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BinaryPackageControlFile<'a> {
    paragraph: ControlParagraph<'a>,
}

impl<'a> Deref for BinaryPackageControlFile<'a> {
    type Target = ControlParagraph<'a>;

    fn deref(&self) -> &Self::Target {
        &self.paragraph
    }
}

impl<'a> DerefMut for BinaryPackageControlFile<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.paragraph
    }
}

impl<'a> From<ControlParagraph<'a>> for BinaryPackageControlFile<'a> {
    fn from(paragraph: ControlParagraph<'a>) -> Self {
        Self { paragraph }
    }
}

impl<'a> From<BinaryPackageControlFile<'a>> for ControlParagraph<'a> {
    fn from(cf: BinaryPackageControlFile<'a>) -> Self {
        cf.paragraph
    }
}

impl<'a> BinaryPackageControlFile<'a> {
    /// The `Package` field value, validated.
    pub fn package(&self) -> Result<&str> {
        let name = self.required_field_str("Package")?;

        if is_valid_package_name(name) {
            Ok(name)
        } else {
            Err(RepositoryError::PackageNameInvalid(name.to_string()))
        }
    }

    /// The `Version` field as its original string.
    pub fn version_str(&self) -> Result<&str> {
        self.required_field_str("Version")
    }

    /// The `Version` field parsed into a [PackageVersion].
    pub fn version(&self) -> Result<PackageVersion> {
        Ok(PackageVersion::parse(self.version_str()?)?)
    }

    /// The `Architecture` field.
    pub fn architecture_str(&self) -> Result<&str> {
        self.required_field_str("Architecture")
    }

    /// The `Architecture` field, validated.
    pub fn architecture(&self) -> Result<Architecture> {
        Architecture::new(self.architecture_str()?)
    }

    /// The `Source` field.
    ///
    /// May carry a version annotation, e.g. `foo (1.2-1)`. See [Self::source_name()].
    pub fn source(&self) -> Option<&str> {
        self.field_str("Source")
    }

    /// The name of the source package that produced this binary package.
    ///
    /// Falls back to the `Package` field when `Source` is absent. A trailing `(version)`
    /// annotation is removed. The name must be a valid package name.
    pub fn source_name(&self) -> Result<&str> {
        let source = match self.source() {
            Some(source) => match source.split_once('(') {
                Some((name, _)) => name.trim(),
                None => source.trim(),
            },
            None => self.package()?,
        };

        if !is_valid_package_name(source) {
            Err(RepositoryError::PoolInvalidSourceName(
                self.source().unwrap_or_default().to_string(),
            ))
        } else {
            Ok(source)
        }
    }

    /// The `Section` field.
    pub fn section(&self) -> Option<&str> {
        self.field_str("Section")
    }

    /// The `Priority` field.
    pub fn priority(&self) -> Option<&str> {
        self.field_str("Priority")
    }

    /// The `Installed-Size` field, parsed to a [u64].
    pub fn installed_size(&self) -> Option<Result<u64>> {
        self.field_u64("Installed-Size")
    }

    /// The `Size` field, parsed to a [u64].
    pub fn size(&self) -> Option<Result<u64>> {
        self.field_u64("Size")
    }

    /// The `Filename` field.
    pub fn filename(&self) -> Option<&str> {
        self.field_str("Filename")
    }

    /// The `SHA256` field.
    pub fn sha256(&self) -> Option<&str> {
        self.field_str("SHA256")
    }
}
