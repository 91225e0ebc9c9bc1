// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Reading of `.deb` package files.

[read_control_file()] and [read_installed_files()] are the entry points used
by repository assembly. Both open the package from scratch and attach the
package path to any error.
*/

use {
    crate::{
        binary_package_control::BinaryPackageControlFile,
        control::ControlParagraphReader,
        deb::DebCompression,
        error::{RepositoryError, Result},
    },
    std::{
        fs::File,
        io::{BufRead, BufReader, Read, Seek, SeekFrom},
        path::Path,
    },
};

/// Content of the `debian-binary` member for the only supported format.
const DEBIAN_BINARY_VERSION: &[u8] = b"2.0\n";

fn member_name(identifier: &[u8]) -> String {
    // GNU ar terminates names with a slash.
    String::from_utf8_lossy(identifier)
        .trim_end_matches('/')
        .to_string()
}

/// Normalize a path as stored in a `.deb` tar archive.
///
/// Paths are stored like `./usr/bin/foo`. We want `usr/bin/foo`.
fn normalize_archive_path(path: &str) -> &str {
    path.trim_start_matches("./").trim_start_matches('/')
}

/// A forward-only reader of `.deb` archive members.
///
/// Construction validates the leading `debian-binary` member. Members must then be
/// consumed in archive order: `control.tar` before `data.tar`.
pub struct DebReader<R: Read> {
    archive: ar::Archive<R>,
}

impl<R: Read> DebReader<R> {
    /// Construct an instance from a reader, validating the `debian-binary` member.
    pub fn new(reader: R) -> Result<Self> {
        let mut archive = ar::Archive::new(reader);

        {
            let mut entry = archive
                .next_entry()
                .ok_or(RepositoryError::DebEmptyArchive)??;

            let name = member_name(entry.header().identifier());
            if name != "debian-binary" {
                return Err(RepositoryError::DebFirstMemberNotDebianBinary(name));
            }

            let mut version = vec![];
            entry.read_to_end(&mut version)?;

            if version != DEBIAN_BINARY_VERSION {
                return Err(RepositoryError::DebUnsupportedFormatVersion(
                    String::from_utf8_lossy(&version).to_string(),
                ));
            }
        }

        Ok(Self { archive })
    }

    /// Advance to the next member whose name begins with `prefix` and process its
    /// decompressed content.
    fn with_member<T>(
        &mut self,
        prefix: &'static str,
        f: impl FnOnce(&mut dyn Read) -> Result<T>,
    ) -> Result<T> {
        while let Some(entry) = self.archive.next_entry() {
            let entry = entry?;
            let name = member_name(entry.header().identifier());

            if !name.starts_with(prefix) {
                continue;
            }

            let mut reader = BufReader::new(entry);

            let compression = match DebCompression::from_member_name(prefix, &name)? {
                DebCompression::Uncompressed => DebCompression::from_magic(reader.fill_buf()?)
                    .unwrap_or(DebCompression::Uncompressed),
                compression => compression,
            };

            let mut decoder = compression.decompress(reader)?;

            return f(&mut decoder);
        }

        Err(RepositoryError::DebMissingMember(prefix))
    }

    /// Read the `control` file from the `control.tar` member.
    ///
    /// The member is decompressed into memory and the first paragraph of its `control`
    /// file is returned.
    pub fn control_file(&mut self) -> Result<BinaryPackageControlFile<'static>> {
        let data = self.with_member("control.tar", |reader| {
            let mut data = vec![];
            reader.read_to_end(&mut data)?;
            Ok(data)
        })?;

        let mut archive = tar::Archive::new(std::io::Cursor::new(data));

        for entry in archive.entries()? {
            let mut entry = entry?;

            let is_control = normalize_archive_path(&String::from_utf8_lossy(&entry.path_bytes()))
                == "control";

            if is_control && entry.header().entry_type().is_file() {
                let mut content = vec![];
                entry.read_to_end(&mut content)?;

                let paragraph = ControlParagraphReader::new(std::io::Cursor::new(content))
                    .next()
                    .ok_or(RepositoryError::ControlFileNoParagraph)??;

                return Ok(paragraph.into());
            }
        }

        Err(RepositoryError::DebControlFileNotFound)
    }

    /// Obtain the paths installed by the `data.tar` member.
    ///
    /// The member is decompressed into an anonymous temporary file, which is then
    /// walked. Directories are not reported. Paths are relative to the filesystem
    /// root, without a leading `./` or `/`.
    pub fn installed_files(&mut self) -> Result<Vec<String>> {
        let mut spool = self.with_member("data.tar", |reader| {
            let mut spool = tempfile::tempfile()?;
            std::io::copy(reader, &mut spool)?;
            Ok(spool)
        })?;
        spool.seek(SeekFrom::Start(0))?;

        let mut archive = tar::Archive::new(BufReader::new(spool));
        let mut paths = vec![];

        for entry in archive.entries()? {
            let entry = entry?;

            let retain = matches!(
                entry.header().entry_type(),
                tar::EntryType::Regular
                    | tar::EntryType::Continuous
                    | tar::EntryType::GNUSparse
                    | tar::EntryType::Link
                    | tar::EntryType::Symlink
            );

            if !retain {
                continue;
            }

            let path = String::from_utf8_lossy(&entry.path_bytes()).to_string();
            let path = normalize_archive_path(&path);

            if !path.is_empty() {
                paths.push(path.to_string());
            }
        }

        Ok(paths)
    }
}

fn with_package_context<T>(path: &Path, res: Result<T>) -> Result<T> {
    res.map_err(|e| RepositoryError::PackageRead(format!("{}", path.display()), Box::new(e)))
}

fn open_deb(path: &Path) -> Result<DebReader<BufReader<File>>> {
    let fh = File::open(path).map_err(|e| RepositoryError::io_path(path, e))?;

    DebReader::new(BufReader::new(fh))
}

/// Read the binary package control file of the `.deb` at the given path.
pub fn read_control_file(path: &Path) -> Result<BinaryPackageControlFile<'static>> {
    with_package_context(path, open_deb(path).and_then(|mut reader| reader.control_file()))
}

/// Read the list of paths installed by the `.deb` at the given path.
pub fn read_installed_files(path: &Path) -> Result<Vec<String>> {
    with_package_context(
        path,
        open_deb(path).and_then(|mut reader| reader.installed_files()),
    )
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            deb::builder::DebBuilder,
            testutil::{simple_control_file, write_deb},
        },
    };

    fn write_ar(members: &[(&str, &[u8])]) -> Result<Vec<u8>> {
        let mut buffer = vec![];
        {
            let mut builder = ar::Builder::new(&mut buffer);
            for (name, data) in members {
                let header = ar::Header::new(name.as_bytes().to_vec(), data.len() as _);
                builder.append(&header, *data)?;
            }
        }

        Ok(buffer)
    }

    #[test]
    fn read_built_package() -> Result<()> {
        let td = tempfile::TempDir::new()?;

        for compression in [
            DebCompression::Uncompressed,
            DebCompression::Gzip,
            DebCompression::Xz(6),
            DebCompression::Zstandard(3),
        ] {
            let path = td.path().join(format!("pkg{}.deb", compression.extension()));
            let builder = DebBuilder::new(simple_control_file("libfoo", "1.2", "amd64"))
                .set_compression(compression)
                .install_file("usr/lib/libfoo.so.1", b"elf".to_vec())
                .install_file("usr/share/doc/libfoo/copyright", b"text".to_vec());
            write_deb(&builder, &path)?;

            let cf = read_control_file(&path)?;
            assert_eq!(cf.package()?, "libfoo");
            assert_eq!(cf.version_str()?, "1.2");

            assert_eq!(
                read_installed_files(&path)?,
                vec!["usr/lib/libfoo.so.1", "usr/share/doc/libfoo/copyright"]
            );
        }

        Ok(())
    }

    #[test]
    fn rejects_bad_archives() -> Result<()> {
        // Just the ar global header.
        assert!(matches!(
            DebReader::new(std::io::Cursor::new(b"!<arch>\n".to_vec())),
            Err(RepositoryError::DebEmptyArchive)
        ));

        let wrong_first = write_ar(&[("control.tar", b"")])?;
        assert!(matches!(
            DebReader::new(std::io::Cursor::new(wrong_first)),
            Err(RepositoryError::DebFirstMemberNotDebianBinary(_))
        ));

        let wrong_version = write_ar(&[("debian-binary", b"3.0\n")])?;
        assert!(matches!(
            DebReader::new(std::io::Cursor::new(wrong_version)),
            Err(RepositoryError::DebUnsupportedFormatVersion(_))
        ));

        let no_control = write_ar(&[("debian-binary", b"2.0\n")])?;
        let mut reader = DebReader::new(std::io::Cursor::new(no_control))?;
        assert!(matches!(
            reader.control_file(),
            Err(RepositoryError::DebMissingMember("control.tar"))
        ));

        Ok(())
    }

    #[test]
    fn errors_name_the_package() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let path = td.path().join("broken.deb");
        std::fs::write(&path, write_ar(&[("debian-binary", b"2.0\n")])?)?;

        match read_control_file(&path) {
            Err(RepositoryError::PackageRead(p, inner)) => {
                assert!(p.ends_with("broken.deb"));
                assert!(matches!(*inner, RepositoryError::DebMissingMember(_)));
            }
            res => panic!("unexpected result: {:?}", res.map(|_| ())),
        }

        Ok(())
    }

    #[test]
    fn data_member_required() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let path = td.path().join("nodata.deb");

        let builder = DebBuilder::new(simple_control_file("foo", "1.0", "all"));
        let mut control_tar = vec![];
        builder.write_control_tar(&mut control_tar)?;
        std::fs::write(
            &path,
            write_ar(&[("debian-binary", b"2.0\n"), ("control.tar", &control_tar)])?,
        )?;

        assert_eq!(read_control_file(&path)?.package()?, "foo");

        match read_installed_files(&path) {
            Err(RepositoryError::PackageRead(_, inner)) => {
                assert!(matches!(*inner, RepositoryError::DebMissingMember("data.tar")));
            }
            res => panic!("unexpected result: {:?}", res),
        }

        Ok(())
    }
}
