// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `Release` file primitives.

`Release` files (or `InRelease` if they contain a PGP cleartext signature) are
the entrypoint of a Debian repository release. They are a single control
paragraph holding release-level metadata and a `SHA256` manifest listing the
digest, size and path of every index file under the release's `dists/`
directory.

[ReleaseFile] represents a parsed or constructed `Release` file.
[hash_release_directory()] computes the manifest entries of a release directory.
*/

use {
    crate::{
        architecture::Architecture,
        config::ReleaseConfig,
        control::{ControlField, ControlParagraph, ControlParagraphReader},
        error::{RepositoryError, Result},
        io::{digest_path, ContentDigest},
        signing::{
            cleartext::{parse_cleartext, CleartextSignatures},
            SigningKey,
        },
    },
    chrono::{DateTime, Utc},
    std::{
        io::{BufRead, BufReader, Read},
        ops::{Deref, DerefMut},
        path::Path,
    },
};

/// Formatter string for dates in release files.
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Filename of the signed release file.
pub const INRELEASE_FILENAME: &str = "InRelease";

/// An entry of the `SHA256` manifest of a release file.
#[derive(Clone, Debug, PartialEq)]
pub struct ReleaseFileEntry<'a> {
    /// The path to this file, relative to the release directory.
    pub path: &'a str,

    /// The content digest of this file.
    pub digest: ContentDigest,

    /// The size of the file in bytes.
    pub size: u64,
}

/// A file under a release directory with its size and digest.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DigestedFile {
    /// `/` delimited path relative to the release directory.
    pub path: String,
    pub size: u64,
    pub digest: ContentDigest,
}

/// Compute manifest entries for every regular file under a release directory.
///
/// Entries are sorted by path. The `InRelease` file at the root of the directory is
/// excluded.
pub fn hash_release_directory(dir: &Path) -> Result<Vec<DigestedFile>> {
    let mut files = vec![];

    for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;

        if !entry.file_type().is_file() {
            continue;
        }

        let rel_path = entry
            .path()
            .strip_prefix(dir)?
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if rel_path == INRELEASE_FILENAME {
            continue;
        }

        let (size, digest) = digest_path(entry.path())?;
        log::debug!("{} {} {}", digest.digest_hex(), size, rel_path);

        files.push(DigestedFile {
            path: rel_path,
            size,
            digest,
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(files)
}

/// A Debian repository `Release` file.
///
/// Instances are wrappers around a [ControlParagraph]. [Deref] and [DerefMut] are
/// implemented to allow obtaining the inner [ControlParagraph].
pub struct ReleaseFile<'a> {
    paragraph: ControlParagraph<'a>,

    /// Parsed PGP signatures for this file.
    signatures: Option<CleartextSignatures>,
}

impl<'a> From<ControlParagraph<'a>> for ReleaseFile<'a> {
    fn from(paragraph: ControlParagraph<'a>) -> Self {
        Self {
            paragraph,
            signatures: None,
        }
    }
}

impl<'a> From<ReleaseFile<'a>> for ControlParagraph<'a> {
    fn from(release: ReleaseFile<'a>) -> Self {
        release.paragraph
    }
}

impl<'a> Deref for ReleaseFile<'a> {
    type Target = ControlParagraph<'a>;

    fn deref(&self) -> &Self::Target {
        &self.paragraph
    }
}

impl<'a> DerefMut for ReleaseFile<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.paragraph
    }
}

fn set_optional(para: &mut ControlParagraph<'static>, name: &'static str, value: Option<&str>) {
    if let Some(value) = value.map(|v| v.trim()).filter(|v| !v.is_empty()) {
        para.set_field_from_string(name.into(), value.to_string().into());
    }
}

/// Join values with spaces, dropping duplicates and keeping first occurrences.
fn join_unique<'v>(values: impl Iterator<Item = &'v str>) -> String {
    let mut seen: Vec<&str> = vec![];

    for value in values {
        if !seen.contains(&value) {
            seen.push(value);
        }
    }

    seen.join(" ")
}

impl ReleaseFile<'static> {
    /// Construct the release file of a release.
    ///
    /// `architectures` become the `Architectures` field after de-duplication; each must
    /// be a valid architecture name. `files` become the `SHA256` manifest.
    pub fn from_release_config<'v>(
        config: &ReleaseConfig,
        architectures: impl Iterator<Item = &'v str>,
        date: DateTime<Utc>,
        files: &[DigestedFile],
    ) -> Result<Self> {
        let architectures = architectures.collect::<Vec<_>>();
        for arch in &architectures {
            Architecture::new(arch)?;
        }

        let mut para = ControlParagraph::default();

        set_optional(&mut para, "Origin", config.origin.as_deref());
        set_optional(&mut para, "Label", config.label.as_deref());
        set_optional(&mut para, "Suite", config.suite.as_deref());
        set_optional(&mut para, "Version", config.version.as_deref());
        para.set_field_from_string("Codename".into(), config.name.clone().into());
        para.set_field_from_string("Changelogs".into(), "no".into());
        para.set_field_from_string(
            "Date".into(),
            date.format(DATE_FORMAT).to_string().into(),
        );
        set_optional(
            &mut para,
            "Architectures",
            Some(join_unique(architectures.into_iter()).as_str()),
        );
        set_optional(
            &mut para,
            "Components",
            Some(join_unique(config.components.iter().map(|c| c.name.as_str())).as_str()),
        );
        set_optional(&mut para, "Description", config.description.as_deref());

        // Sizes are right aligned so the manifest reads as a table.
        let size_width = files
            .iter()
            .map(|f| f.size.to_string().len())
            .max()
            .unwrap_or_default();

        para.set_field(ControlField::multiline_from_lines(
            "SHA256".into(),
            files.iter().map(|f| {
                format!(
                    "{} {:>width$} {}",
                    f.digest.digest_hex(),
                    f.size,
                    f.path,
                    width = size_width
                )
            }),
        ));

        Ok(para.into())
    }
}

impl<'a> ReleaseFile<'a> {
    /// Construct an instance by reading data from a reader.
    ///
    /// The source must be a Debian control file with exactly 1 paragraph. It must not
    /// be PGP armored.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut paragraphs = ControlParagraphReader::new(reader).collect::<Result<Vec<_>>>()?;

        // A Release control file should have a single paragraph.
        if paragraphs.len() != 1 {
            return Err(RepositoryError::ReleaseControlParagraphMismatch(
                paragraphs.len(),
            ));
        }

        Ok(Self {
            paragraph: paragraphs.remove(0),
            signatures: None,
        })
    }

    /// Construct an instance from an `InRelease` file holding a PGP cleartext signature.
    ///
    /// The PGP signature is NOT validated. Use [Self::signatures()] for that.
    pub fn from_armored_reader<R: Read>(reader: R) -> Result<Self> {
        let message = parse_cleartext(BufReader::new(reader))?;

        let mut slf = Self::from_reader(std::io::Cursor::new(message.cleartext.into_bytes()))?;
        slf.signatures = Some(message.signatures);

        Ok(slf)
    }

    /// Obtain PGP signatures from this `InRelease` file.
    pub fn signatures(&self) -> Option<&CleartextSignatures> {
        self.signatures.as_ref()
    }

    /// Description of this repository.
    pub fn description(&self) -> Option<&str> {
        self.field_str("Description")
    }

    pub fn origin(&self) -> Option<&str> {
        self.field_str("Origin")
    }

    pub fn label(&self) -> Option<&str> {
        self.field_str("Label")
    }

    /// Version of this release.
    ///
    /// Typically a sequence of `.` delimited integers.
    pub fn version(&self) -> Option<&str> {
        self.field_str("Version")
    }

    /// Suite of this release.
    ///
    /// e.g. `stable`, `unstable`, `experimental`.
    pub fn suite(&self) -> Option<&str> {
        self.field_str("Suite")
    }

    /// Codename of this release. This is the name of its `dists/` directory.
    pub fn codename(&self) -> Option<&str> {
        self.field_str("Codename")
    }

    /// Names of components within this release.
    pub fn components(&self) -> Option<impl Iterator<Item = &str>> {
        self.iter_field_words("Components")
    }

    /// Debian machine architectures indexed by this release.
    pub fn architectures(&self) -> Option<impl Iterator<Item = &str>> {
        self.iter_field_words("Architectures")
    }

    /// Time the release file was created, as its raw string value.
    pub fn date_str(&self) -> Option<&str> {
        self.field_str("Date")
    }

    /// Time the release file was created.
    pub fn date(&self) -> Option<Result<DateTime<Utc>>> {
        self.date_str().map(|s| -> Result<DateTime<Utc>> {
            Ok(DateTime::parse_from_str(s, DATE_FORMAT)?.with_timezone(&Utc))
        })
    }

    /// Iterate over entries of the `SHA256` manifest.
    ///
    /// Entries are lazily parsed as they are consumed. Parse errors result in an [Err].
    pub fn iter_sha256_entries(
        &self,
    ) -> Option<impl Iterator<Item = Result<ReleaseFileEntry<'_>>> + '_> {
        self.iter_field_lines("SHA256").map(|iter| {
            iter.map(|v| {
                // Values are of form: <digest> <size> <path>
                let mut parts = v.split_ascii_whitespace();

                let digest = parts.next().ok_or(RepositoryError::ReleaseMissingDigest)?;
                let size = parts.next().ok_or(RepositoryError::ReleaseMissingSize)?;
                let path = parts.next().ok_or(RepositoryError::ReleaseMissingPath)?;

                if parts.next().is_some() {
                    return Err(RepositoryError::ReleasePathWithSpaces(v.to_string()));
                }

                Ok(ReleaseFileEntry {
                    path,
                    digest: ContentDigest::sha256_hex(digest)?,
                    size: size.parse()?,
                })
            })
        })
    }

    /// Produce the `InRelease` content of this release file.
    ///
    /// `created` is recorded as the signature creation time.
    pub fn to_inrelease(&self, key: &SigningKey, created: DateTime<Utc>) -> Result<String> {
        key.cleartext_sign(&self.paragraph.to_string(), created)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{config::ComponentConfig, io::Compression, testutil::TEST_KEY},
    };

    fn fixed_date() -> Result<DateTime<Utc>> {
        Ok(DateTime::parse_from_rfc3339("2024-03-01T12:30:00Z")?.with_timezone(&Utc))
    }

    fn release_config() -> ReleaseConfig {
        ReleaseConfig {
            name: "bookworm".into(),
            version: Some("12".into()),
            origin: Some("Example".into()),
            label: None,
            suite: Some(" ".into()),
            description: Some("Example packages".into()),
            architectures: vec![],
            index_compressions: vec![Compression::Xz],
            components: ["main", "contrib", "main"]
                .iter()
                .map(|name| ComponentConfig {
                    name: name.to_string(),
                    packages: vec![],
                })
                .collect(),
        }
    }

    #[test]
    fn hash_directory() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let dir = td.path();
        std::fs::create_dir_all(dir.join("main/binary-amd64"))?;
        std::fs::write(dir.join("main/binary-amd64/Packages"), b"abc")?;
        std::fs::write(dir.join("main/Contents-amd64.gz"), b"")?;
        std::fs::write(dir.join(INRELEASE_FILENAME), b"stale")?;

        let files = hash_release_directory(dir)?;
        assert_eq!(
            files,
            vec![
                DigestedFile {
                    path: "main/Contents-amd64.gz".into(),
                    size: 0,
                    digest: ContentDigest::sha256_data(b""),
                },
                DigestedFile {
                    path: "main/binary-amd64/Packages".into(),
                    size: 3,
                    digest: ContentDigest::sha256_data(b"abc"),
                },
            ]
        );

        Ok(())
    }

    #[test]
    fn build_release_paragraph() -> Result<()> {
        let date = fixed_date()?;
        let files = vec![
            DigestedFile {
                path: "main/Contents-amd64.gz".into(),
                size: 20,
                digest: ContentDigest::sha256_data(b"x"),
            },
            DigestedFile {
                path: "main/binary-amd64/Packages".into(),
                size: 1024,
                digest: ContentDigest::sha256_data(b"y"),
            },
        ];

        let release = ReleaseFile::from_release_config(
            &release_config(),
            ["amd64", "all", "amd64"].into_iter(),
            date,
            &files,
        )?;

        let text = release.to_string();
        assert!(text.starts_with(
            "Origin: Example\nVersion: 12\nCodename: bookworm\nChangelogs: no\n\
             Date: Fri, 01 Mar 2024 12:30:00 +0000\nArchitectures: amd64 all\n\
             Components: main contrib\nDescription: Example packages\nSHA256:\n"
        ));
        assert!(text.contains(&format!(
            "\n {}   20 main/Contents-amd64.gz\n",
            ContentDigest::sha256_data(b"x").digest_hex()
        )));

        assert_eq!(release.label(), None);
        assert_eq!(release.suite(), None);
        assert_eq!(release.date().transpose()?, Some(date));
        assert_eq!(
            release.architectures().map(|x| x.collect::<Vec<_>>()),
            Some(vec!["amd64", "all"])
        );

        let entries = release
            .iter_sha256_entries()
            .ok_or(RepositoryError::ReleaseMissingDigest)?
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].path, "main/binary-amd64/Packages");
        assert_eq!(entries[1].size, 1024);
        assert_eq!(entries[1].digest, ContentDigest::sha256_data(b"y"));

        assert!(matches!(
            ReleaseFile::from_release_config(
                &release_config(),
                ["amd 64"].into_iter(),
                date,
                &files
            ),
            Err(RepositoryError::ArchitectureInvalid(_))
        ));

        Ok(())
    }

    #[test]
    fn signed_round_trip() -> Result<()> {
        let date = fixed_date()?;
        let files = vec![DigestedFile {
            path: "main/binary-all/Packages".into(),
            size: 0,
            digest: ContentDigest::sha256_data(b""),
        }];
        let release =
            ReleaseFile::from_release_config(&release_config(), ["all"].into_iter(), date, &files)?;

        let inrelease = release.to_inrelease(&TEST_KEY, date)?;
        let parsed = ReleaseFile::from_armored_reader(std::io::Cursor::new(inrelease))?;

        assert_eq!(parsed.codename(), Some("bookworm"));
        assert_eq!(parsed.to_string(), release.to_string());
        assert_eq!(
            parsed
                .signatures()
                .ok_or(RepositoryError::ReleaseNotSigned)?
                .verify(TEST_KEY.public_key())?,
            1
        );

        Ok(())
    }
}
