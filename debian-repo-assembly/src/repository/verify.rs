// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Verification of built repositories.

Verification follows the trust chain of an APT client. The `InRelease` signature
is checked against a public key. Files listed in the `SHA256` manifest are checked
against their recorded size and digest. Finally, pool files referenced from
uncompressed `Packages` indices are checked against their index entries.
*/

use {
    crate::{
        control::ControlFile,
        error::{RepositoryError, Result},
        io::{digest_path, ContentDigest},
        repository::{
            packages::PACKAGES_FILENAME,
            release::{ReleaseFile, INRELEASE_FILENAME},
        },
    },
    pgp::types::PublicKeyTrait,
    std::{io::BufReader, path::Path},
};

/// Outcome of verifying a single release.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VerifiedRelease {
    /// Name of the release directory under `dists/`.
    pub name: String,

    /// Number of manifest entries checked.
    pub files: usize,

    /// Number of `Packages` entries whose pool file was checked.
    pub packages: usize,
}

fn check_file(path: &Path, display: &str, size: u64, digest: &ContentDigest) -> Result<()> {
    let (actual_size, actual_digest) = digest_path(path)?;

    if actual_size != size {
        return Err(RepositoryError::VerifySizeMismatch {
            path: display.to_string(),
            expected: size,
            actual: actual_size,
        });
    }

    if &actual_digest != digest {
        return Err(RepositoryError::VerifyDigestMismatch {
            path: display.to_string(),
            expected: digest.digest_hex(),
            actual: actual_digest.digest_hex(),
        });
    }

    Ok(())
}

/// Verify pool files referenced by a `Packages` file.
///
/// Returns the number of checked entries.
fn verify_packages_file(root: &Path, path: &Path) -> Result<usize> {
    let fh = std::fs::File::open(path).map_err(|e| RepositoryError::io_path(path, e))?;
    let index = ControlFile::parse_reader(BufReader::new(fh))?;

    let mut count = 0;

    for para in index.paragraphs() {
        let filename = para.required_field_str("Filename")?;
        let size = para
            .field_u64("Size")
            .ok_or_else(|| RepositoryError::ControlRequiredFieldMissing("Size".into()))??;
        let digest = ContentDigest::sha256_hex(para.required_field_str("SHA256")?)?;

        check_file(&root.join(filename), filename, size, &digest)?;
        count += 1;
    }

    Ok(count)
}

/// Verify a single release of a repository.
pub fn verify_release(
    root: &Path,
    name: &str,
    key: &impl PublicKeyTrait,
) -> Result<VerifiedRelease> {
    let release_dir = root.join("dists").join(name);
    let path = release_dir.join(INRELEASE_FILENAME);

    log::info!("verifying {}", path.display());
    let fh = std::fs::File::open(&path).map_err(|e| RepositoryError::io_path(&path, e))?;
    let release = ReleaseFile::from_armored_reader(fh)?;

    let signatures = release
        .signatures()
        .ok_or(RepositoryError::ReleaseNotSigned)?
        .verify(key)?;
    log::debug!("{} valid signatures", signatures);

    let mut verified = VerifiedRelease {
        name: name.to_string(),
        files: 0,
        packages: 0,
    };

    for entry in release
        .iter_sha256_entries()
        .ok_or(RepositoryError::ReleaseMissingDigest)?
    {
        let entry = entry?;
        let file_path = release_dir.join(entry.path);

        check_file(&file_path, entry.path, entry.size, &entry.digest)?;
        verified.files += 1;

        if entry.path.rsplit('/').next() == Some(PACKAGES_FILENAME) {
            verified.packages += verify_packages_file(root, &file_path)?;
        }
    }

    log::info!(
        "release {} OK ({} files, {} packages)",
        name,
        verified.files,
        verified.packages
    );

    Ok(verified)
}

/// Verify every release of a repository.
///
/// Releases are discovered from the directories under `dists/` and verified in name
/// order. Verification stops at the first failure.
pub fn verify_repository(root: &Path, key: &impl PublicKeyTrait) -> Result<Vec<VerifiedRelease>> {
    let dists = root.join("dists");

    let mut names = vec![];
    for entry in std::fs::read_dir(&dists).map_err(|e| RepositoryError::io_path(&dists, e))? {
        let entry = entry?;

        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();

    names
        .iter()
        .map(|name| verify_release(root, name, key))
        .collect()
}
