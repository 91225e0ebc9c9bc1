// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {crate::package_version::VersionError, thiserror::Error};

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on path {0}: {1}")]
    IoPath(String, std::io::Error),

    #[error("PGP error: {0:?}")]
    Pgp(#[from] pgp::errors::Error),

    #[error("version error: {0}")]
    Version(#[from] VersionError),

    #[error("hex parsing error: {0:?}")]
    Hex(#[from] hex::FromHexError),

    #[error("integer parsing error: {0:?}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("YAML error: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("glob pattern error: {0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("glob iteration error: {0}")]
    Glob(#[from] glob::GlobError),

    #[error("directory walk error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("date parsing error: {0}")]
    DateParse(#[from] chrono::ParseError),

    #[error("path prefix error: {0}")]
    StripPrefix(#[from] std::path::StripPrefixError),

    #[error("control file parse error: {0}")]
    ControlParseError(String),

    #[error("control file lacks a paragraph")]
    ControlFileNoParagraph,

    #[error("required field missing in control paragraph: {0}")]
    ControlRequiredFieldMissing(String),

    #[error("deb archive is empty")]
    DebEmptyArchive,

    #[error("first member of deb archive is not debian-binary: {0}")]
    DebFirstMemberNotDebianBinary(String),

    #[error("unsupported deb format version: {0:?}")]
    DebUnsupportedFormatVersion(String),

    #[error("deb archive lacks a {0} member")]
    DebMissingMember(&'static str),

    #[error("control.tar does not contain a control file")]
    DebControlFileNotFound,

    #[error("unknown compression in deb archive member: {0}")]
    DebUnknownCompression(String),

    #[error("failed to read package {0}: {1}")]
    PackageRead(String, Box<RepositoryError>),

    #[error("invalid package name: {0:?}")]
    PackageNameInvalid(String),

    #[error("invalid architecture: {0:?}")]
    ArchitectureInvalid(String),

    #[error("cannot derive pool path from source package name {0:?}")]
    PoolInvalidSourceName(String),

    #[error("pool path {path} is claimed by both {existing} and {incoming}")]
    PoolPathConflict {
        path: String,
        existing: String,
        incoming: String,
    },

    #[error("expected 1 paragraph in release file; got {0}")]
    ReleaseControlParagraphMismatch(usize),

    #[error("digest missing from release index entry")]
    ReleaseMissingDigest,

    #[error("size missing from release index entry")]
    ReleaseMissingSize,

    #[error("path missing from release index entry")]
    ReleaseMissingPath,

    #[error("release index entry path unexpectedly has spaces: {0}")]
    ReleasePathWithSpaces(String),

    #[error("release file does not carry PGP signatures")]
    ReleaseNotSigned,

    #[error("PGP cleartext parse error: {0}")]
    CleartextParse(String),

    #[error("size mismatch for {path}: expected {expected}; got {actual}")]
    VerifySizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    #[error("SHA256 mismatch for {path}: expected {expected}; got {actual}")]
    VerifyDigestMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("signing key not found at {0}")]
    SigningKeyNotFound(String),

    #[error("signing key already exists at {0}")]
    SigningKeyExists(String),

    #[error("public key {public} does not belong to private key {secret}")]
    SigningKeyMismatch { secret: String, public: String },

    #[error("unsupported configuration apiVersion: {0}")]
    ConfigUnsupportedVersion(String),

    #[error("unsupported configuration kind: {0}")]
    ConfigUnsupportedKind(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

impl RepositoryError {
    /// Attach a filesystem path to an I/O error.
    pub fn io_path(path: impl AsRef<std::path::Path>, e: std::io::Error) -> Self {
        Self::IoPath(format!("{}", path.as_ref().display()), e)
    }
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, RepositoryError>;
