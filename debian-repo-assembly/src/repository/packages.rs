// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `Packages` index files. */

use {
    crate::{
        architecture::Architecture,
        control::ControlFile,
        error::{RepositoryError, Result},
        io::Compression,
        repository::package::RepositoryPackage,
    },
    std::path::{Path, PathBuf},
};

/// Base filename of `Packages` indices.
pub const PACKAGES_FILENAME: &str = "Packages";

/// A `Packages` index for a single architecture of a component.
///
/// The index holds one paragraph per package, in [RepositoryPackage] order.
#[derive(Clone, Debug, Default)]
pub struct PackagesIndex {
    control: ControlFile<'static>,
}

impl PackagesIndex {
    /// Construct an index from packages targeting exactly `architecture`.
    ///
    /// Packages of other architectures are ignored. This includes `all` packages when
    /// indexing a concrete architecture.
    pub fn from_packages<'a>(
        packages: impl Iterator<Item = &'a RepositoryPackage>,
        architecture: &Architecture,
    ) -> Self {
        let mut packages = packages
            .filter(|p| p.architecture() == architecture)
            .collect::<Vec<_>>();
        packages.sort();

        let mut control = ControlFile::default();
        for package in packages {
            control.add_paragraph(package.to_packages_paragraph());
        }

        Self { control }
    }

    /// Number of packages in this index.
    pub fn len(&self) -> usize {
        self.control.paragraphs().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize the uncompressed index.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = vec![];
        self.control.write(&mut buffer)?;

        Ok(buffer)
    }

    /// Write the index into a directory.
    ///
    /// `Packages` is always written. A compressed variant is written for every entry in
    /// `compressions`. All variants carry the same content. Returns the written paths.
    pub fn write_to_dir(&self, dir: &Path, compressions: &[Compression]) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir).map_err(|e| RepositoryError::io_path(dir, e))?;

        let data = self.to_bytes()?;
        let mut paths = vec![];

        for compression in std::iter::once(&Compression::None).chain(
            compressions
                .iter()
                .filter(|c| !matches!(c, Compression::None)),
        ) {
            let path = dir.join(format!("{}{}", PACKAGES_FILENAME, compression.extension()));

            if paths.contains(&path) {
                continue;
            }

            log::info!("writing {}", path.display());
            std::fs::write(&path, compression.compress(&data)?)
                .map_err(|e| RepositoryError::io_path(&path, e))?;
            paths.push(path);
        }

        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{io::ContentDigest, repository::pool::PoolEntry, testutil::simple_control_file},
        std::io::Read,
    };

    fn package(name: &str, version: &str, arch: &str) -> Result<RepositoryPackage> {
        RepositoryPackage::new(
            simple_control_file(name, version, arch).into(),
            PoolEntry {
                filename: format!("pool/main/{}_{}_{}.deb", name, version, arch),
                size: 10,
                sha256: ContentDigest::sha256_data(name.as_bytes()),
            },
        )
    }

    #[test]
    fn exact_architecture_filter() -> Result<()> {
        let packages = vec![
            package("foo", "1.0-2", "amd64")?,
            package("foo", "1.0-1", "amd64")?,
            package("docs", "1.0", "all")?,
            package("foo", "1.0-1", "arm64")?,
        ];

        let amd64 = PackagesIndex::from_packages(packages.iter(), &Architecture::new("amd64")?);
        assert_eq!(amd64.len(), 2);

        let parsed = ControlFile::parse_reader(std::io::Cursor::new(amd64.to_bytes()?))?;
        assert_eq!(
            parsed
                .paragraphs()
                .map(|p| p.field_str("Version").unwrap_or_default().to_string())
                .collect::<Vec<_>>(),
            vec!["1.0-1", "1.0-2"]
        );

        let all = PackagesIndex::from_packages(packages.iter(), &Architecture::new("all")?);
        assert_eq!(all.len(), 1);

        let riscv64 = PackagesIndex::from_packages(packages.iter(), &Architecture::new("riscv64")?);
        assert!(riscv64.is_empty());
        assert!(riscv64.to_bytes()?.is_empty());

        Ok(())
    }

    #[test]
    fn variants_decode_identically() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let packages = vec![package("foo", "1.0", "amd64")?, package("bar", "1.0", "amd64")?];
        let index = PackagesIndex::from_packages(packages.iter(), &Architecture::new("amd64")?);

        let paths = index.write_to_dir(
            td.path(),
            &[Compression::Xz, Compression::Gzip, Compression::Xz],
        )?;
        assert_eq!(
            paths,
            vec![
                td.path().join("Packages"),
                td.path().join("Packages.xz"),
                td.path().join("Packages.gz"),
            ]
        );

        let plain = std::fs::read(td.path().join("Packages"))?;
        assert!(String::from_utf8_lossy(&plain).starts_with("Package: bar\n"));

        for compression in [Compression::Xz, Compression::Gzip] {
            let fh = std::fs::File::open(
                td.path()
                    .join(format!("Packages{}", compression.extension())),
            )?;
            let mut decoded = vec![];
            compression.read_decompressed(fh)?.read_to_end(&mut decoded)?;
            assert_eq!(decoded, plain);
        }

        Ok(())
    }
}
