// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Packages as tracked within a repository. */

use {
    crate::{
        architecture::Architecture,
        binary_package_control::BinaryPackageControlFile,
        control::{ControlField, ControlParagraph},
        error::Result,
        package_version::PackageVersion,
        repository::pool::PoolEntry,
    },
    std::cmp::Ordering,
};

/// Control fields describing a file rather than a package.
///
/// These are replaced by values of the pool file when writing `Packages` indices.
const FILE_FIELDS: &[&str] = &["Filename", "Size", "MD5sum", "SHA1", "SHA256"];

/// A binary package placed in a repository's pool.
///
/// Instances order by name, then Debian version, then architecture, then pool
/// filename. This is the order of entries in `Packages` indices.
#[derive(Clone, Debug)]
pub struct RepositoryPackage {
    control: BinaryPackageControlFile<'static>,
    name: String,
    version: PackageVersion,
    architecture: Architecture,
    pool: PoolEntry,
}

impl RepositoryPackage {
    /// Construct an instance from a package's control file and its pool entry.
    pub fn new(control: BinaryPackageControlFile<'static>, pool: PoolEntry) -> Result<Self> {
        let name = control.package()?.to_string();
        let version = control.version()?;
        let architecture = control.architecture()?;

        Ok(Self {
            control,
            name,
            version,
            architecture,
            pool,
        })
    }

    /// The package name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &PackageVersion {
        &self.version
    }

    pub fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    pub fn section(&self) -> Option<&str> {
        self.control.section()
    }

    /// The pool entry holding this package's `.deb`.
    pub fn pool_entry(&self) -> &PoolEntry {
        &self.pool
    }

    /// The control file extracted from the `.deb`.
    pub fn control_file(&self) -> &BinaryPackageControlFile<'static> {
        &self.control
    }

    /// Name of this package as it appears in `Contents` indices.
    ///
    /// This is `<section>/<name>` if the package has a section, else just `<name>`.
    pub fn qualified_name(&self) -> String {
        match self.section() {
            Some(section) if !section.is_empty() => format!("{}/{}", section, self.name),
            _ => self.name.clone(),
        }
    }

    /// Produce the paragraph describing this package in a `Packages` index.
    ///
    /// All control fields are retained, minus those describing a file. `Filename`,
    /// `Size` and `SHA256` of the pool file are appended.
    pub fn to_packages_paragraph(&self) -> ControlParagraph<'static> {
        let mut para = ControlParagraph::default();

        for field in self.control.iter_fields() {
            if !FILE_FIELDS
                .iter()
                .any(|name| name.eq_ignore_ascii_case(field.name()))
            {
                para.set_field(field.clone());
            }
        }

        para.set_field(ControlField::new(
            "Filename".into(),
            self.pool.filename.clone().into(),
        ));
        para.set_field(ControlField::new(
            "Size".into(),
            self.pool.size.to_string().into(),
        ));
        para.set_field(ControlField::new(
            "SHA256".into(),
            self.pool.sha256.digest_hex().into(),
        ));

        para
    }
}

impl PartialEq for RepositoryPackage {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RepositoryPackage {}

impl PartialOrd for RepositoryPackage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RepositoryPackage {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.version.cmp(&other.version))
            .then_with(|| self.architecture.cmp(&other.architecture))
            .then_with(|| self.pool.filename.cmp(&other.pool.filename))
    }
}
