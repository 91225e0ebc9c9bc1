// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Placement of `.deb` files into a repository's `pool/` tree. */

use {
    crate::{
        binary_package_control::{is_valid_package_name, BinaryPackageControlFile},
        error::{RepositoryError, Result},
        io::{ContentDigest, DigestingReader},
    },
    std::{
        collections::HashMap,
        path::{Path, PathBuf},
    },
};

/// Describes the layout of `.deb` files in the `pool/` tree.
#[derive(Clone, Copy, Debug)]
pub enum PoolLayout {
    /// File paths are `pool/<component>/<prefix>/<source>/<filename>`.
    ///
    /// This is the layout used by the Debian distribution.
    ///
    /// The source package name is used to derive the directory prefix. For sources
    /// beginning with `lib`, the prefix is the first 4 characters. For everything else,
    /// it is the first character.
    ///
    /// For example, `libfoo_1.2_amd64.deb` in the `main` component is mapped to
    /// `pool/main/libf/libfoo/libfoo_1.2_amd64.deb` and `bar_1.0_amd64.deb` to
    /// `pool/main/b/bar/bar_1.0_amd64.deb`.
    ComponentThenSourcePrefix,
}

impl Default for PoolLayout {
    fn default() -> Self {
        Self::ComponentThenSourcePrefix
    }
}

impl PoolLayout {
    /// Compute the repository relative path of a file given its source package name.
    pub fn path(&self, component: &str, source: &str, filename: &str) -> Result<String> {
        match self {
            Self::ComponentThenSourcePrefix => {
                if !is_valid_package_name(source) {
                    return Err(RepositoryError::PoolInvalidSourceName(source.to_string()));
                }

                let prefix_len = if source.starts_with("lib") && source.chars().count() >= 4 {
                    4
                } else {
                    1
                };
                let prefix = source.chars().take(prefix_len).collect::<String>();

                Ok(format!("pool/{}/{}/{}/{}", component, prefix, source, filename))
            }
        }
    }
}

/// Compute the pool filename of a binary package.
///
/// Has the form `<name>_<version>_<arch>.deb`. The version keeps its epoch, so
/// versions differing only in epoch get distinct pool files.
pub fn deb_filename(control: &BinaryPackageControlFile) -> Result<String> {
    Ok(format!(
        "{}_{}_{}.deb",
        control.package()?,
        control.version()?,
        control.architecture()?
    ))
}

/// A file placed in the pool.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PoolEntry {
    /// Path relative to the repository root. Becomes `Filename` in `Packages` files.
    pub filename: String,

    /// Size in bytes of the pool file.
    pub size: u64,

    /// SHA-256 of the pool file.
    pub sha256: ContentDigest,
}

/// Copies `.deb` files into the pool, once per distinct source file.
///
/// Instances remember the pool entry of every source file they placed. Seeing the same
/// source file again (under any release or component) yields the existing entry
/// without copying.
#[derive(Debug)]
pub struct PoolManager {
    root: PathBuf,
    layout: PoolLayout,

    /// Canonical source path to its pool entry.
    entries: HashMap<PathBuf, PoolEntry>,

    /// Pool path to the canonical source path that claimed it.
    claims: HashMap<String, PathBuf>,
}

impl PoolManager {
    /// Construct an instance writing into the repository at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            layout: PoolLayout::default(),
            entries: HashMap::new(),
            claims: HashMap::new(),
        }
    }

    /// The repository root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of distinct files placed in the pool.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no file has been placed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the absolute path of a pool entry.
    pub fn entry_path(&self, entry: &PoolEntry) -> PathBuf {
        self.root.join(&entry.filename)
    }

    /// Place a `.deb` file into the pool.
    ///
    /// `component` is only used when the source file is seen for the first time.
    pub fn place(
        &mut self,
        source_path: &Path,
        component: &str,
        control: &BinaryPackageControlFile,
    ) -> Result<PoolEntry> {
        let canonical = std::fs::canonicalize(source_path)
            .map_err(|e| RepositoryError::io_path(source_path, e))?;

        if let Some(entry) = self.entries.get(&canonical) {
            log::debug!(
                "{} already in pool as {}",
                source_path.display(),
                entry.filename
            );
            return Ok(entry.clone());
        }

        let filename = self.layout.path(
            component,
            control.source_name()?,
            &deb_filename(control)?,
        )?;

        if let Some(existing) = self.claims.get(&filename) {
            return Err(RepositoryError::PoolPathConflict {
                path: filename,
                existing: format!("{}", existing.display()),
                incoming: format!("{}", canonical.display()),
            });
        }

        let dest_path = self.root.join(&filename);
        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RepositoryError::io_path(parent, e))?;
        }

        log::info!("copying {} to {}", source_path.display(), filename);

        let fh = std::fs::File::open(&canonical)
            .map_err(|e| RepositoryError::io_path(&canonical, e))?;
        let mut reader = DigestingReader::new(fh);
        let mut dest = std::fs::File::create(&dest_path)
            .map_err(|e| RepositoryError::io_path(&dest_path, e))?;
        std::io::copy(&mut reader, &mut dest).map_err(|e| RepositoryError::io_path(&dest_path, e))?;
        let (_, _, sha256) = reader.finish();

        let size = std::fs::metadata(&dest_path)
            .map_err(|e| RepositoryError::io_path(&dest_path, e))?
            .len();

        let entry = PoolEntry {
            filename: filename.clone(),
            size,
            sha256,
        };

        self.claims.insert(filename, canonical.clone());
        self.entries.insert(canonical, entry.clone());

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            deb::reader::read_control_file,
            testutil::{simple_control_file, write_simple_deb},
        },
    };

    #[test]
    fn layout_paths() -> Result<()> {
        let layout = PoolLayout::default();

        assert_eq!(
            layout.path("main", "libfoo", "libfoo_1.2_amd64.deb")?,
            "pool/main/libf/libfoo/libfoo_1.2_amd64.deb"
        );
        assert_eq!(
            layout.path("main", "bar", "bar_1.0_amd64.deb")?,
            "pool/main/b/bar/bar_1.0_amd64.deb"
        );
        assert_eq!(
            layout.path("contrib", "lib", "lib_1_all.deb")?,
            "pool/contrib/l/lib/lib_1_all.deb"
        );
        for source in ["", ".", "..", "../foo", "foo/bar"] {
            assert!(matches!(
                layout.path("main", source, "x.deb"),
                Err(RepositoryError::PoolInvalidSourceName(_))
            ));
        }

        Ok(())
    }

    #[test]
    fn filename_keeps_epoch() -> Result<()> {
        let control: BinaryPackageControlFile =
            simple_control_file("bar", "2:1.0-1", "arm64").into();
        assert_eq!(deb_filename(&control)?, "bar_2:1.0-1_arm64.deb");

        let control: BinaryPackageControlFile =
            simple_control_file("bar", "1.0-1", "arm64").into();
        assert_eq!(deb_filename(&control)?, "bar_1.0-1_arm64.deb");

        Ok(())
    }

    #[test]
    fn place_once() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let source = td.path().join("in").join("libfoo.deb");
        write_simple_deb(
            &source,
            simple_control_file("libfoo", "1.2", "amd64"),
            &["usr/lib/libfoo.so"],
        )?;
        let control = read_control_file(&source)?;

        let mut pool = PoolManager::new(td.path().join("repo"));
        let entry = pool.place(&source, "main", &control)?;

        assert_eq!(entry.filename, "pool/main/libf/libfoo/libfoo_1.2_amd64.deb");
        let data = std::fs::read(pool.entry_path(&entry))?;
        assert_eq!(data, std::fs::read(&source)?);
        assert_eq!(entry.size, data.len() as u64);
        assert_eq!(entry.sha256, ContentDigest::sha256_data(&data));

        // Seen again under another component: same entry, no second copy.
        let again = pool.place(&source, "contrib", &control)?;
        assert_eq!(again, entry);
        assert_eq!(pool.len(), 1);
        assert!(!td.path().join("repo/pool/contrib").exists());

        Ok(())
    }

    #[test]
    fn package_name_cannot_escape_pool() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let source = td.path().join("in").join("escaped.deb");
        let mut control = simple_control_file("escaped", "1.0", "amd64");
        control.set_field_from_string("Package".into(), "../../../../escaped".into());
        control.set_field_from_string("Source".into(), "foo".into());
        write_simple_deb(&source, control, &["usr/bin/escaped"])?;

        let mut pool = PoolManager::new(td.path().join("repo"));
        assert!(matches!(
            pool.place(&source, "main", &read_control_file(&source)?),
            Err(RepositoryError::PackageNameInvalid(_))
        ));
        assert!(pool.is_empty());
        assert!(!td.path().join("escaped_1.0_amd64.deb").exists());
        assert!(!td.path().join("repo").exists());

        Ok(())
    }

    #[test]
    fn conflicting_sources() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let first = td.path().join("a").join("bar.deb");
        let second = td.path().join("b").join("bar.deb");
        for (path, file) in [(&first, "usr/bin/a"), (&second, "usr/bin/b")] {
            write_simple_deb(path, simple_control_file("bar", "1.0", "amd64"), &[file])?;
        }

        let mut pool = PoolManager::new(td.path().join("repo"));
        pool.place(&first, "main", &read_control_file(&first)?)?;

        assert!(matches!(
            pool.place(&second, "main", &read_control_file(&second)?),
            Err(RepositoryError::PoolPathConflict { .. })
        ));

        Ok(())
    }
}
