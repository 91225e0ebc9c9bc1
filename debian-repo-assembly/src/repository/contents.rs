// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `Contents` index files.

See <https://wiki.debian.org/DebianRepository/Format#A.22Contents.22_indices>.
`Contents` files map installed paths to the packages providing them.
*/

use {
    crate::{
        error::{RepositoryError, Result},
        io::Compression,
    },
    std::{
        collections::BTreeMap,
        io::Write,
        path::Path,
    },
};

/// Represents a `Contents` file.
///
/// Paths are emitted in sorted order. The packages of a path are emitted in the order
/// they were added.
#[derive(Clone, Debug, Default)]
pub struct ContentsIndex {
    paths: BTreeMap<String, Vec<String>>,
}

impl ContentsIndex {
    /// Register a path as belonging to a package.
    ///
    /// `package` is the package name, optionally qualified by its section.
    pub fn add_package_path(&mut self, path: &str, package: &str) {
        let packages = self.paths.entry(path.to_string()).or_default();

        if !packages.iter().any(|p| p == package) {
            packages.push(package.to_string());
        }
    }

    /// Number of distinct paths.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Emit lines constituting this file.
    pub fn as_lines(&self) -> impl Iterator<Item = String> + '_ {
        self.paths
            .iter()
            .map(|(path, packages)| format!("{} {}\n", path, packages.join(",")))
    }

    /// Write the content of this file to a writer.
    ///
    /// Returns the total number of bytes written.
    pub fn write_to(&self, writer: &mut impl Write) -> Result<usize> {
        let mut bytes_count = 0;

        for line in self.as_lines() {
            writer.write_all(line.as_bytes())?;
            bytes_count += line.as_bytes().len();
        }

        Ok(bytes_count)
    }

    /// Write the gzip compressed file to a path.
    pub fn write_gzip(&self, path: &Path) -> Result<()> {
        let mut data = vec![];
        self.write_to(&mut data)?;

        log::info!("writing {} ({} paths)", path.display(), self.len());
        std::fs::write(path, Compression::Gzip.compress(&data)?)
            .map_err(|e| RepositoryError::io_path(path, e))
    }
}
