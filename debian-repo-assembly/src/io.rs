// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! I/O helpers. */

use {
    crate::error::{RepositoryError, Result},
    serde::Deserialize,
    sha2::{Digest, Sha256},
    std::{
        fmt::Formatter,
        io::{Read, Write},
        path::Path,
    },
};

/// A SHA-256 content digest.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ContentDigest(Vec<u8>);

impl std::fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sha256({})", hex::encode(&self.0))
    }
}

impl ContentDigest {
    /// Create a new instance by parsing a hex digest.
    pub fn sha256_hex(digest: &str) -> Result<Self> {
        Ok(Self(hex::decode(digest)?))
    }

    /// Compute the digest of in-memory data.
    pub fn sha256_data(data: &[u8]) -> Self {
        Self(Sha256::digest(data).to_vec())
    }

    /// Obtain the digest bytes for this content digest.
    pub fn digest_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Obtain the hex encoded content digest.
    pub fn digest_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

/// A [Read] adapter that computes the size and SHA-256 of data as it is read.
pub struct DigestingReader<R> {
    hasher: Sha256,
    size: u64,
    source: R,
}

impl<R> DigestingReader<R> {
    /// Construct a new instance from a source reader.
    pub fn new(source: R) -> Self {
        Self {
            hasher: Sha256::new(),
            size: 0,
            source,
        }
    }

    /// Finish the stream.
    ///
    /// Returns the source reader, the number of bytes read and the digest of those bytes.
    pub fn finish(self) -> (R, u64, ContentDigest) {
        (
            self.source,
            self.size,
            ContentDigest(self.hasher.finalize().to_vec()),
        )
    }
}

impl<R: Read> Read for DigestingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let size = self.source.read(buf)?;

        if size > 0 {
            self.hasher.update(&buf[0..size]);
            self.size += size as u64;
        }

        Ok(size)
    }
}

/// Compute the size and SHA-256 of a file.
pub fn digest_path(path: &Path) -> Result<(u64, ContentDigest)> {
    let fh = std::fs::File::open(path).map_err(|e| RepositoryError::io_path(path, e))?;

    let mut reader = DigestingReader::new(fh);
    std::io::copy(&mut reader, &mut std::io::sink())
        .map_err(|e| RepositoryError::io_path(path, e))?;
    let (_, size, digest) = reader.finish();

    Ok((size, digest))
}

/// Compression format used for repository index files.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No compression (no extension).
    #[serde(rename = "none")]
    None,

    /// Gzip compression (.gz extension).
    #[serde(rename = "gz")]
    Gzip,

    /// XZ compression (.xz extension).
    Xz,
}

impl Compression {
    /// Filename extension for files compressed in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Gzip => ".gz",
            Self::Xz => ".xz",
        }
    }

    /// Compress data in memory.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut buffer = vec![];
        self.write_compressed(data, &mut buffer)?;

        Ok(buffer)
    }

    /// Write compressed data to a writer.
    pub fn write_compressed<W: Write>(&self, data: &[u8], writer: W) -> Result<W> {
        Ok(match self {
            Self::None => {
                let mut writer = writer;
                writer.write_all(data)?;
                writer
            }
            Self::Gzip => {
                let mut encoder = libflate::gzip::Encoder::new(writer)?;
                encoder.write_all(data)?;
                encoder.finish().into_result()?
            }
            Self::Xz => {
                let mut encoder = xz2::write::XzEncoder::new(writer, 6);
                encoder.write_all(data)?;
                encoder.finish()?
            }
        })
    }

    /// Wrap a reader with transparent decompression.
    pub fn read_decompressed<'a>(&self, reader: impl Read + 'a) -> Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Self::None => Box::new(reader),
            Self::Gzip => Box::new(libflate::gzip::Decoder::new(reader)?),
            Self::Xz => Box::new(xz2::read::XzDecoder::new(reader)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_known_values() -> Result<()> {
        assert_eq!(
            ContentDigest::sha256_data(b"").digest_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );

        let mut reader = DigestingReader::new(std::io::Cursor::new(b"abc".to_vec()));
        let mut out = vec![];
        reader.read_to_end(&mut out)?;
        let (_, size, digest) = reader.finish();
        assert_eq!(size, 3);
        assert_eq!(
            digest,
            ContentDigest::sha256_hex(
                "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
            )?
        );

        Ok(())
    }

    #[test]
    fn digest_file() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let path = td.path().join("file");
        std::fs::write(&path, b"abc")?;

        let (size, digest) = digest_path(&path)?;
        assert_eq!(size, 3);
        assert_eq!(digest, ContentDigest::sha256_data(b"abc"));

        assert!(matches!(
            digest_path(&td.path().join("missing")),
            Err(RepositoryError::IoPath(_, _))
        ));

        Ok(())
    }

    #[test]
    fn compression_variants_decode_identically() -> Result<()> {
        let data = b"Package: foo\nVersion: 1.0\n".repeat(100);

        for compression in [Compression::None, Compression::Gzip, Compression::Xz] {
            let compressed = compression.compress(&data)?;

            let mut decompressed = vec![];
            compression
                .read_decompressed(std::io::Cursor::new(compressed))?
                .read_to_end(&mut decompressed)?;

            assert_eq!(decompressed, data, "{:?} round trips", compression);
        }

        Ok(())
    }
}
