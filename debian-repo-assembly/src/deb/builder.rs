// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Create .deb package files and their components. */

use {
    crate::{control::ControlParagraph, deb::DebCompression, error::Result},
    md5::Digest,
    std::{
        collections::{BTreeMap, BTreeSet},
        io::{Read, Write},
        time::SystemTime,
    },
};

/// A file to be stored in a `.deb` tar archive.
#[derive(Clone, Debug)]
pub struct DebFile {
    data: Vec<u8>,
    executable: bool,
}

impl DebFile {
    /// Construct an instance from data and an executable bit.
    pub fn new(data: Vec<u8>, executable: bool) -> Self {
        Self { data, executable }
    }
}

impl From<Vec<u8>> for DebFile {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data, false)
    }
}

impl From<&[u8]> for DebFile {
    fn from(data: &[u8]) -> Self {
        Self::new(data.to_vec(), false)
    }
}

/// A builder for a `.deb` package file.
///
/// Builders are mostly used to produce packages for exercising repository
/// assembly. The archives they produce follow the layout `dpkg-deb` emits.
pub struct DebBuilder<'control> {
    control: ControlParagraph<'control>,

    compression: DebCompression,

    /// Files to install as part of the package, keyed by relative path.
    install_files: BTreeMap<String, DebFile>,

    /// Extra files (maintainer scripts) for the `control.tar` archive.
    extra_control_files: BTreeMap<String, DebFile>,

    mtime: Option<SystemTime>,
}

impl<'control> DebBuilder<'control> {
    /// Construct a new instance using a control paragraph.
    pub fn new(control: ControlParagraph<'control>) -> Self {
        Self {
            control,
            compression: DebCompression::Gzip,
            install_files: BTreeMap::new(),
            extra_control_files: BTreeMap::new(),
            mtime: None,
        }
    }

    /// Set the compression format to use.
    ///
    /// Not all compression formats are supported by all Linux distributions.
    pub fn set_compression(mut self, compression: DebCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Set the modified time to use on archive members.
    ///
    /// If this is called, all archive members will use the specified time, helping
    /// to make archive content deterministic.
    ///
    /// If not called, the current time will be used.
    pub fn set_mtime(mut self, time: Option<SystemTime>) -> Self {
        self.mtime = time;
        self
    }

    fn mtime(&self) -> u64 {
        self.mtime
            .unwrap_or_else(SystemTime::now)
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Add an extra file to the `control.tar` archive.
    pub fn extra_control_tar_file(
        mut self,
        path: impl ToString,
        entry: impl Into<DebFile>,
    ) -> Self {
        self.extra_control_files
            .insert(path.to_string(), entry.into());
        self
    }

    /// Register a file as to be installed by this package.
    ///
    /// Filenames should be relative to the filesystem root. e.g.
    /// `usr/bin/myapp`.
    ///
    /// The file content will be added to the `data.tar` archive and registered in the
    /// `md5sums` file of the `control.tar` archive.
    pub fn install_file(mut self, path: impl ToString, entry: impl Into<DebFile>) -> Self {
        self.install_files.insert(
            path.to_string().trim_start_matches('/').to_string(),
            entry.into(),
        );
        self
    }

    fn md5sums(&self) -> Vec<u8> {
        self.install_files
            .iter()
            .map(|(path, file)| format!("{:x}  {}\n", md5::Md5::digest(&file.data), path))
            .collect::<String>()
            .into_bytes()
    }

    /// Write the uncompressed `control.tar` archive to a writer.
    ///
    /// The archive holds the `control` file, an `md5sums` file covering installed
    /// files, and any extra control files.
    pub fn write_control_tar<W: Write>(&self, writer: W) -> Result<()> {
        let mut control_data = vec![];
        self.control.write(&mut control_data)?;

        let mut files = self.extra_control_files.clone();
        files.insert("control".to_string(), DebFile::from(control_data));
        files.insert("md5sums".to_string(), DebFile::from(self.md5sums()));

        write_deb_tar(writer, &files, self.mtime())
    }

    /// Write the uncompressed `data.tar` archive to a writer.
    pub fn write_data_tar<W: Write>(&self, writer: W) -> Result<()> {
        write_deb_tar(writer, &self.install_files, self.mtime())
    }

    fn append_ar_member<W: Write>(
        &self,
        builder: &mut ar::Builder<W>,
        name: String,
        data: &[u8],
    ) -> Result<()> {
        let mut header = ar::Header::new(name.into_bytes(), data.len() as _);
        header.set_mode(0o644);
        header.set_mtime(self.mtime());
        header.set_uid(0);
        header.set_gid(0);
        builder.append(&header, data)?;

        Ok(())
    }

    /// Write `.deb` file content to a writer.
    ///
    /// This effectively materializes the `.deb` package somewhere.
    pub fn write<W: Write>(&self, writer: W) -> Result<()> {
        let mut ar_builder = ar::Builder::new(writer);

        // First entry is a debian-binary file with static content.
        self.append_ar_member(&mut ar_builder, "debian-binary".to_string(), b"2.0\n")?;

        // Second entry is a control.tar with metadata.
        let mut control_tar = vec![];
        self.write_control_tar(&mut control_tar)?;
        let control_tar = self
            .compression
            .compress(&mut std::io::Cursor::new(control_tar))?;
        self.append_ar_member(
            &mut ar_builder,
            format!("control.tar{}", self.compression.extension()),
            &control_tar,
        )?;

        // Third entry is a data.tar with file content.
        let mut data_tar = vec![];
        self.write_data_tar(&mut data_tar)?;
        let data_tar = self
            .compression
            .compress(&mut std::io::Cursor::new(data_tar))?;
        self.append_ar_member(
            &mut ar_builder,
            format!("data.tar{}", self.compression.extension()),
            &data_tar,
        )?;

        Ok(())
    }
}

fn new_tar_header(mtime: u64) -> Result<tar::Header> {
    let mut header = tar::Header::new_gnu();
    header.set_uid(0);
    header.set_gid(0);
    header.set_username("root")?;
    header.set_groupname("root")?;
    header.set_mtime(mtime);

    Ok(header)
}

fn set_header_path(
    builder: &mut tar::Builder<impl Write>,
    header: &mut tar::Header,
    path: &str,
    is_directory: bool,
) -> Result<()> {
    // Debian archives in the wild have filenames beginning with `./` and directories
    // ending with `/`. `header.set_path()` would normalize away the `./`, so the name
    // field is written directly.
    let value = match (path, is_directory) {
        ("", _) => "./".to_string(),
        (path, true) => format!("./{}/", path),
        (path, false) => format!("./{}", path),
    };
    let value_bytes = value.as_bytes();

    let name_buffer = &mut header.as_old_mut().name;

    if value_bytes.len() <= name_buffer.len() {
        name_buffer[0..value_bytes.len()].copy_from_slice(value_bytes);
    } else {
        // Names that don't fit are carried by a preceding GNU long name entry.
        let mut long_name = tar::Header::new_gnu();
        let name = b"././@LongLink";
        long_name.as_old_mut().name[..name.len()].clone_from_slice(&name[..]);
        long_name.set_mode(0o644);
        long_name.set_uid(0);
        long_name.set_gid(0);
        long_name.set_mtime(0);
        long_name.set_size(value_bytes.len() as u64 + 1);
        long_name.set_entry_type(tar::EntryType::GNULongName);
        long_name.set_cksum();
        let mut data = value_bytes.chain(std::io::repeat(0).take(1));
        builder.append(&long_name, &mut data)?;

        let truncated_bytes = &value_bytes[0..name_buffer.len()];
        name_buffer.copy_from_slice(truncated_bytes);
    }

    Ok(())
}

/// Write a tar archive suitable for inclusion in a `.deb` archive.
///
/// Entries are the root directory, every parent directory of a file, then the
/// files, all in sorted order.
pub fn write_deb_tar<W: Write>(
    writer: W,
    files: &BTreeMap<String, DebFile>,
    mtime: u64,
) -> Result<()> {
    let mut builder = tar::Builder::new(writer);

    let mut header = new_tar_header(mtime)?;
    set_header_path(&mut builder, &mut header, "", true)?;
    header.set_entry_type(tar::EntryType::Directory);
    header.set_mode(0o755);
    header.set_size(0);
    header.set_cksum();
    builder.append(&header, std::io::empty())?;

    let directories = files
        .keys()
        .flat_map(|path| {
            path.match_indices('/')
                .map(move |(index, _)| path[0..index].to_string())
        })
        .collect::<BTreeSet<_>>();

    for directory in directories {
        let mut header = new_tar_header(mtime)?;
        set_header_path(&mut builder, &mut header, &directory, true)?;
        header.set_entry_type(tar::EntryType::Directory);
        header.set_mode(0o755);
        header.set_size(0);
        header.set_cksum();
        builder.append(&header, std::io::empty())?;
    }

    for (path, file) in files {
        let mut header = new_tar_header(mtime)?;
        set_header_path(&mut builder, &mut header, path, false)?;
        header.set_mode(if file.executable { 0o755 } else { 0o644 });
        header.set_size(file.data.len() as _);
        header.set_cksum();
        builder.append(&header, &*file.data)?;
    }

    builder.finish()?;

    Ok(())
}
