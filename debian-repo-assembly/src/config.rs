// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Repository configuration documents.

Configuration is a YAML document with a Kubernetes style type header:

```yaml
apiVersion: debian-repo-builder/v1alpha2
kind: Repository
releases:
  - name: bookworm
    components:
      - name: main
        packages:
          - debs/hello_2.10-3_amd64.deb
          - debs/lib*.deb
```

Package entries are glob patterns resolved relative to a base directory.

Every supported `apiVersion` has its own schema. Documents are decoded into
[VersionedConfig] and then converted into the latest schema,
[RepositoryConfig], via [VersionedConfig::migrate_to_latest()].
*/

use {
    crate::{
        architecture::Architecture,
        error::{RepositoryError, Result},
        io::Compression,
    },
    serde::Deserialize,
    std::{
        collections::BTreeSet,
        path::{Path, PathBuf},
    },
};

/// `apiVersion` of the schema whose package entries are literal paths.
pub const API_VERSION_V1ALPHA1: &str = "debian-repo-builder/v1alpha1";

/// `apiVersion` of the schema whose package entries are glob patterns.
pub const API_VERSION_V1ALPHA2: &str = "debian-repo-builder/v1alpha2";

/// The only supported `kind`.
pub const KIND_REPOSITORY: &str = "Repository";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypeMeta {
    api_version: String,
    kind: String,
}

/// The `v1alpha1` schema.
pub mod v1alpha1 {
    use serde::Deserialize;

    #[derive(Clone, Debug, Deserialize, PartialEq)]
    pub struct RepositoryConfig {
        pub releases: Vec<ReleaseConfig>,
    }

    #[derive(Clone, Debug, Deserialize, PartialEq)]
    pub struct ReleaseConfig {
        pub name: String,
        pub version: Option<String>,
        pub origin: Option<String>,
        pub label: Option<String>,
        pub suite: Option<String>,
        pub description: Option<String>,
        #[serde(default)]
        pub components: Vec<ComponentConfig>,
    }

    #[derive(Clone, Debug, Deserialize, PartialEq)]
    pub struct ComponentConfig {
        pub name: String,
        /// Literal paths to `.deb` files.
        #[serde(default)]
        pub packages: Vec<String>,
    }
}

fn default_index_compressions() -> Vec<Compression> {
    vec![Compression::Xz]
}

/// Configuration of a repository. This is the latest schema.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RepositoryConfig {
    pub releases: Vec<ReleaseConfig>,
}

/// Configuration of a single release (distribution).
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseConfig {
    /// Name of the release. Becomes `Codename` and the `dists/` directory name.
    pub name: String,
    pub version: Option<String>,
    pub origin: Option<String>,
    pub label: Option<String>,
    pub suite: Option<String>,
    pub description: Option<String>,

    /// Architectures to always index, even if no package targets them.
    #[serde(default)]
    pub architectures: Vec<String>,

    /// Compressed variants of `Packages` files to write.
    #[serde(default = "default_index_compressions")]
    pub index_compressions: Vec<Compression>,

    #[serde(default)]
    pub components: Vec<ComponentConfig>,
}

/// Configuration of a component within a release.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ComponentConfig {
    pub name: String,

    /// Glob patterns matching `.deb` files.
    ///
    /// Relative patterns are resolved against the directory holding the configuration
    /// file.
    #[serde(default)]
    pub packages: Vec<String>,
}

/// A configuration document of any supported schema version.
#[derive(Clone, Debug, PartialEq)]
pub enum VersionedConfig {
    V1Alpha1(v1alpha1::RepositoryConfig),
    V1Alpha2(RepositoryConfig),
}

impl VersionedConfig {
    /// Parse a YAML document.
    pub fn from_yaml(s: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(s)?;
        let meta: TypeMeta = serde_yaml::from_value(value.clone())?;

        if meta.kind != KIND_REPOSITORY {
            return Err(RepositoryError::ConfigUnsupportedKind(meta.kind));
        }

        match meta.api_version.as_str() {
            API_VERSION_V1ALPHA1 => Ok(Self::V1Alpha1(serde_yaml::from_value(value)?)),
            API_VERSION_V1ALPHA2 => Ok(Self::V1Alpha2(serde_yaml::from_value(value)?)),
            _ => Err(RepositoryError::ConfigUnsupportedVersion(meta.api_version)),
        }
    }

    /// Convert to the latest schema version.
    pub fn migrate_to_latest(self) -> RepositoryConfig {
        match self {
            Self::V1Alpha1(config) => RepositoryConfig {
                releases: config
                    .releases
                    .into_iter()
                    .map(|release| ReleaseConfig {
                        name: release.name,
                        version: release.version,
                        origin: release.origin,
                        label: release.label,
                        suite: release.suite,
                        description: release.description,
                        architectures: vec![],
                        index_compressions: default_index_compressions(),
                        components: release
                            .components
                            .into_iter()
                            .map(|component| ComponentConfig {
                                name: component.name,
                                packages: component
                                    .packages
                                    .iter()
                                    .map(|p| glob::Pattern::escape(p))
                                    .collect(),
                            })
                            .collect(),
                    })
                    .collect(),
            },
            Self::V1Alpha2(config) => config,
        }
    }
}

/// Whether a release or component name can be used as a path component.
fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c: char| c == '/' || c == '\\' || c.is_whitespace())
}

impl RepositoryConfig {
    /// Parse a YAML document of any supported schema, migrate and validate it.
    pub fn from_yaml(s: &str) -> Result<Self> {
        let config = VersionedConfig::from_yaml(s)?.migrate_to_latest();
        config.validate()?;

        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load_path(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| RepositoryError::io_path(path, e))?;

        Self::from_yaml(&data)
    }

    /// Validate semantic constraints the schema cannot express.
    pub fn validate(&self) -> Result<()> {
        let mut release_names = BTreeSet::new();

        for release in &self.releases {
            if !valid_name(&release.name) {
                return Err(RepositoryError::ConfigInvalid(format!(
                    "invalid release name: {:?}",
                    release.name
                )));
            }
            if !release_names.insert(release.name.as_str()) {
                return Err(RepositoryError::ConfigInvalid(format!(
                    "duplicate release name: {}",
                    release.name
                )));
            }

            for arch in &release.architectures {
                Architecture::new(arch)?;
            }

            let mut component_names = BTreeSet::new();
            for component in &release.components {
                if !valid_name(&component.name) {
                    return Err(RepositoryError::ConfigInvalid(format!(
                        "invalid component name in release {}: {:?}",
                        release.name, component.name
                    )));
                }
                if !component_names.insert(component.name.as_str()) {
                    return Err(RepositoryError::ConfigInvalid(format!(
                        "duplicate component {} in release {}",
                        component.name, release.name
                    )));
                }

                for pattern in &component.packages {
                    glob::Pattern::new(pattern)?;
                }
            }
        }

        Ok(())
    }
}

/// Obtain the path matched by a pattern without wildcards.
///
/// Returns [None] if the pattern contains wildcards. Characters escaped by
/// [glob::Pattern::escape()] are unescaped.
fn literal_path(pattern: &str) -> Option<String> {
    let mut literal = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        match c {
            '*' | '?' => return None,
            '[' => {
                let escaped = chars.next()?;
                if chars.next()? != ']' {
                    return None;
                }
                literal.push(escaped);
            }
            c => literal.push(c),
        }
    }

    Some(literal)
}

impl ComponentConfig {
    /// Resolve package patterns to `.deb` file paths.
    ///
    /// Matches of each pattern are sorted. Patterns are expanded in order and a path
    /// matched by several patterns is only returned once.
    ///
    /// A pattern without wildcards names a single file, which must exist. Patterns with
    /// wildcards may match nothing.
    pub fn expand_packages(&self, base_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut seen = BTreeSet::new();
        let mut paths = vec![];

        for pattern in &self.packages {
            let full_pattern = if Path::new(pattern).is_absolute()
                || base_dir.as_os_str().is_empty()
            {
                pattern.clone()
            } else {
                format!(
                    "{}/{}",
                    glob::Pattern::escape(&base_dir.display().to_string()),
                    pattern
                )
            };

            let mut matches = glob::glob(&full_pattern)?
                .map(|entry| entry.map_err(RepositoryError::from))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .filter(|path| path.is_file())
                .collect::<Vec<_>>();
            matches.sort();

            if matches.is_empty() {
                if let Some(path) = literal_path(&full_pattern) {
                    return Err(RepositoryError::io_path(
                        &path,
                        std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "package file does not exist",
                        ),
                    ));
                }

                log::warn!(
                    "package pattern {} in component {} matches no files",
                    pattern,
                    self.name
                );
            }

            for path in matches {
                if seen.insert(path.clone()) {
                    paths.push(path);
                }
            }
        }

        Ok(paths)
    }
}
