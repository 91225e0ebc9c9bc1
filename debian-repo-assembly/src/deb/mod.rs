// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Interfacing with .deb package files.

A `.deb` is an `ar` archive with three members, in order:

1. `debian-binary`, holding the format version (`2.0\n`).
2. `control.tar[.<ext>]`, holding the `control` file and maintainer scripts.
3. `data.tar[.<ext>]`, holding the files installed by the package.

The tar members may be compressed. The compression is identified by the
member's filename extension.
*/

pub mod builder;
pub mod reader;

use {
    crate::error::{RepositoryError, Result},
    std::io::{Read, Write},
};

/// Compression format to apply to `.deb` files.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DebCompression {
    /// Do not compress contents of `.deb` files.
    Uncompressed,
    /// Compress as `.gz` files.
    Gzip,
    /// Compress as `.xz` files using a specified compression level.
    Xz(u32),
    /// Compress as `.lzma` files. Only meaningful for reading old packages.
    Lzma,
    /// Compress as `.zst` files using a specified compression level.
    Zstandard(i32),
}

impl DebCompression {
    /// Resolve the compression of an archive member from its name.
    ///
    /// `prefix` is the uncompressed member name, e.g. `data.tar`.
    pub fn from_member_name(prefix: &str, name: &str) -> Result<Self> {
        match name.strip_prefix(prefix) {
            Some("") => Ok(Self::Uncompressed),
            Some(".gz") => Ok(Self::Gzip),
            Some(".xz") => Ok(Self::Xz(6)),
            Some(".lzma") => Ok(Self::Lzma),
            Some(".zst") => Ok(Self::Zstandard(3)),
            _ => Err(RepositoryError::DebUnknownCompression(name.to_string())),
        }
    }

    /// Sniff the compression format from the leading bytes of a stream.
    ///
    /// Returns [None] if no known compression magic is present.
    pub fn from_magic(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0x1f, 0x8b]) {
            Some(Self::Gzip)
        } else if data.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            Some(Self::Xz(6))
        } else if data.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Some(Self::Zstandard(3))
        } else if data.starts_with(&[0x5d, 0x00, 0x00]) {
            Some(Self::Lzma)
        } else {
            None
        }
    }

    /// Obtain the filename extension for this compression format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Uncompressed => "",
            Self::Gzip => ".gz",
            Self::Xz(_) => ".xz",
            Self::Lzma => ".lzma",
            Self::Zstandard(_) => ".zst",
        }
    }

    /// Compress input data from a reader.
    pub fn compress(&self, reader: &mut impl Read) -> Result<Vec<u8>> {
        let mut buffer = vec![];

        match self {
            Self::Uncompressed => {
                std::io::copy(reader, &mut buffer)?;
            }
            Self::Gzip => {
                let mut encoder = libflate::gzip::Encoder::new(buffer)?;
                std::io::copy(reader, &mut encoder)?;
                buffer = encoder.finish().into_result()?;
            }
            Self::Xz(level) => {
                let mut encoder = xz2::write::XzEncoder::new(buffer, *level);
                std::io::copy(reader, &mut encoder)?;
                buffer = encoder.finish()?;
            }
            Self::Lzma => {
                let options = xz2::stream::LzmaOptions::new_preset(6)
                    .map_err(std::io::Error::from)?;
                let stream =
                    xz2::stream::Stream::new_lzma_encoder(&options).map_err(std::io::Error::from)?;
                let mut encoder = xz2::write::XzEncoder::new_stream(buffer, stream);
                std::io::copy(reader, &mut encoder)?;
                buffer = encoder.finish()?;
            }
            Self::Zstandard(level) => {
                let mut encoder = zstd::Encoder::new(buffer, *level)?;
                std::io::copy(reader, &mut encoder)?;
                buffer = encoder.finish()?;
            }
        }

        buffer.flush()?;

        Ok(buffer)
    }

    /// Wrap a reader with transparent decompression.
    pub fn decompress<'a>(&self, reader: impl Read + 'a) -> Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Self::Uncompressed => Box::new(reader),
            Self::Gzip => Box::new(libflate::gzip::Decoder::new(reader)?),
            Self::Xz(_) => Box::new(xz2::read::XzDecoder::new(reader)),
            Self::Lzma => Box::new(xz2::read::XzDecoder::new_stream(
                reader,
                xz2::stream::Stream::new_lzma_decoder(u64::MAX).map_err(std::io::Error::from)?,
            )),
            Self::Zstandard(_) => Box::new(zstd::Decoder::new(reader)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_names() -> Result<()> {
        assert_eq!(
            DebCompression::from_member_name("data.tar", "data.tar")?,
            DebCompression::Uncompressed
        );
        assert_eq!(
            DebCompression::from_member_name("data.tar", "data.tar.xz")?,
            DebCompression::Xz(6)
        );
        assert_eq!(
            DebCompression::from_member_name("control.tar", "control.tar.zst")?,
            DebCompression::Zstandard(3)
        );
        assert!(matches!(
            DebCompression::from_member_name("data.tar", "data.tar.bz2"),
            Err(RepositoryError::DebUnknownCompression(_))
        ));

        Ok(())
    }

    #[test]
    fn codecs() -> Result<()> {
        let data = b"hello world".repeat(64);

        for compression in [
            DebCompression::Uncompressed,
            DebCompression::Gzip,
            DebCompression::Xz(6),
            DebCompression::Lzma,
            DebCompression::Zstandard(3),
        ] {
            let compressed = compression.compress(&mut std::io::Cursor::new(&data))?;

            if compression != DebCompression::Uncompressed {
                assert_eq!(
                    DebCompression::from_magic(&compressed).map(|c| c.extension()),
                    Some(compression.extension())
                );
            }

            let mut decompressed = vec![];
            compression
                .decompress(std::io::Cursor::new(compressed))?
                .read_to_end(&mut decompressed)?;
            assert_eq!(decompressed, data);
        }

        Ok(())
    }
}
