// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Assembly of complete repositories. */

use {
    crate::{
        architecture::Architecture,
        config::{ReleaseConfig, RepositoryConfig},
        deb::reader::{read_control_file, read_installed_files},
        error::{RepositoryError, Result},
        repository::{
            contents::ContentsIndex,
            package::RepositoryPackage,
            packages::PackagesIndex,
            pool::PoolManager,
            release::{hash_release_directory, ReleaseFile, INRELEASE_FILENAME},
            PUBLIC_KEY_FILENAME,
        },
        signing::SigningKey,
    },
    chrono::{DateTime, SubsecRound, Utc},
    std::{
        collections::BTreeSet,
        path::{Path, PathBuf},
    },
};

/// Packages routed to a component of a release.
#[derive(Clone, Debug)]
pub struct ComponentBucket {
    /// Name of the component.
    pub name: String,

    /// Packages of the component, in the order they were collected.
    pub packages: Vec<RepositoryPackage>,

    /// Architectures of the collected packages.
    pub architectures: BTreeSet<Architecture>,
}

impl ComponentBucket {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            packages: vec![],
            architectures: BTreeSet::new(),
        }
    }
}

/// Counts describing a completed build.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BuildSummary {
    /// Number of releases written.
    pub releases: usize,

    /// Number of package entries across all release components.
    pub packages: usize,

    /// Number of distinct files in the pool.
    pub pool_files: usize,
}

/// Builds a signed repository from a configuration.
///
/// Every build is a full rebuild. Pool files are (re)written and the `dists/`
/// directory of every configured release is replaced.
pub struct RepositoryBuilder<'key> {
    config: RepositoryConfig,
    base_dir: PathBuf,
    root: PathBuf,
    signing_key: &'key SigningKey,
    date: DateTime<Utc>,
}

impl<'key> RepositoryBuilder<'key> {
    /// Construct a new instance.
    ///
    /// `base_dir` is the directory relative package patterns are resolved against.
    /// `root` is the directory the repository is written to.
    pub fn new(
        config: RepositoryConfig,
        base_dir: impl Into<PathBuf>,
        root: impl Into<PathBuf>,
        signing_key: &'key SigningKey,
    ) -> Self {
        Self {
            config,
            base_dir: base_dir.into(),
            root: root.into(),
            signing_key,
            date: Utc::now().trunc_subsecs(0),
        }
    }

    /// Set the time recorded in `Release` files and their signatures.
    ///
    /// Defaults to the time the builder was constructed.
    pub fn set_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date.trunc_subsecs(0);
        self
    }

    /// The repository root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build the repository.
    pub fn build(&self) -> Result<BuildSummary> {
        self.config.validate()?;

        std::fs::create_dir_all(&self.root).map_err(|e| RepositoryError::io_path(&self.root, e))?;

        let mut pool = PoolManager::new(&self.root);
        let mut summary = BuildSummary::default();

        for release in &self.config.releases {
            log::info!("collecting packages of release {}", release.name);
            let buckets = self.collect_release(release, &mut pool)?;
            summary.packages += buckets.iter().map(|b| b.packages.len()).sum::<usize>();

            self.write_release(release, &buckets, &pool)?;
            summary.releases += 1;
        }

        self.write_public_key()?;
        summary.pool_files = pool.len();

        log::info!(
            "wrote {} releases with {} packages ({} pool files) to {}",
            summary.releases,
            summary.packages,
            summary.pool_files,
            self.root.display()
        );

        Ok(summary)
    }

    /// Read and place every package of a release into the pool.
    fn collect_release(
        &self,
        release: &ReleaseConfig,
        pool: &mut PoolManager,
    ) -> Result<Vec<ComponentBucket>> {
        let mut buckets = vec![];

        for component in &release.components {
            let mut bucket = ComponentBucket::new(&component.name);

            for path in component.expand_packages(&self.base_dir)? {
                log::debug!("reading {}", path.display());
                let control = read_control_file(&path)?;
                let entry = pool.place(&path, &component.name, &control)?;
                let package = RepositoryPackage::new(control, entry)?;

                bucket.architectures.insert(package.architecture().clone());
                bucket.packages.push(package);
            }

            buckets.push(bucket);
        }

        Ok(buckets)
    }

    /// Resolve the architectures indexed by a release.
    ///
    /// This is the union of configured architectures and architectures of collected
    /// packages. Releases with neither index `all`.
    fn release_architectures(
        release: &ReleaseConfig,
        buckets: &[ComponentBucket],
    ) -> Result<BTreeSet<Architecture>> {
        let mut architectures = release
            .architectures
            .iter()
            .map(|a| Architecture::new(a))
            .collect::<Result<BTreeSet<_>>>()?;

        for bucket in buckets {
            architectures.extend(bucket.architectures.iter().cloned());
        }

        if architectures.is_empty() {
            architectures.insert(Architecture::new("all")?);
        }

        Ok(architectures)
    }

    /// Write the indices and the signed `InRelease` file of a release.
    fn write_release(
        &self,
        release: &ReleaseConfig,
        buckets: &[ComponentBucket],
        pool: &PoolManager,
    ) -> Result<()> {
        let release_dir = self.root.join("dists").join(&release.name);

        if release_dir.exists() {
            log::debug!("removing {}", release_dir.display());
            std::fs::remove_dir_all(&release_dir)
                .map_err(|e| RepositoryError::io_path(&release_dir, e))?;
        }

        let architectures = Self::release_architectures(release, buckets)?;

        for bucket in buckets {
            let component_dir = release_dir.join(&bucket.name);

            for arch in &architectures {
                let packages = PackagesIndex::from_packages(bucket.packages.iter(), arch);
                log::info!(
                    "writing Packages index for {}/{}/{} ({} packages)",
                    release.name,
                    bucket.name,
                    arch,
                    packages.len()
                );
                packages.write_to_dir(
                    &component_dir.join(format!("binary-{}", arch)),
                    &release.index_compressions,
                )?;

                let contents = self.build_contents(bucket, arch, pool)?;
                contents.write_gzip(&component_dir.join(format!("Contents-{}.gz", arch)))?;
            }
        }

        let files = hash_release_directory(&release_dir)?;
        let release_file = ReleaseFile::from_release_config(
            release,
            architectures.iter().map(|a| a.as_str()),
            self.date,
            &files,
        )?;

        let path = release_dir.join(INRELEASE_FILENAME);
        log::info!("signing {} ({} files)", path.display(), files.len());
        let inrelease = release_file.to_inrelease(self.signing_key, self.date)?;
        std::fs::write(&path, inrelease).map_err(|e| RepositoryError::io_path(&path, e))?;

        Ok(())
    }

    /// Build the `Contents` index of a component for an architecture.
    ///
    /// Installed files are read from the pool copies of packages.
    fn build_contents(
        &self,
        bucket: &ComponentBucket,
        arch: &Architecture,
        pool: &PoolManager,
    ) -> Result<ContentsIndex> {
        let mut packages = bucket
            .packages
            .iter()
            .filter(|p| p.architecture() == arch)
            .collect::<Vec<_>>();
        packages.sort();

        let mut contents = ContentsIndex::default();

        for package in packages {
            let name = package.qualified_name();

            for path in read_installed_files(&pool.entry_path(package.pool_entry()))? {
                contents.add_package_path(&path, &name);
            }
        }

        Ok(contents)
    }

    fn write_public_key(&self) -> Result<()> {
        let path = self.root.join(PUBLIC_KEY_FILENAME);
        log::info!("writing {}", path.display());

        std::fs::write(&path, self.signing_key.public_key_armored()?)
            .map_err(|e| RepositoryError::io_path(&path, e))
    }
}
