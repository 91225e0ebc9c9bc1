// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    chrono::{DateTime, TimeZone, Utc},
    clap::{Arg, ArgMatches, Command},
    debian_repo_assembly::{
        config::RepositoryConfig,
        error::RepositoryError,
        repository::{builder::RepositoryBuilder, verify::verify_repository, PUBLIC_KEY_FILENAME},
        signing::{load_public_key, primary_user_id, SigningKey},
    },
    log::LevelFilter,
    std::path::{Path, PathBuf},
    thiserror::Error,
};

const BUILD_ABOUT: &str = "\
Build a signed Debian repository.

The repository is described by a YAML configuration file. Every build is a
full rebuild: packages are copied into `pool/` and the `dists/` directory of
every configured release is replaced.

The configuration looks like:

    apiVersion: debian-repo-builder/v1alpha2
    kind: Repository
    releases:
      - name: bookworm
        origin: Example
        description: Example packages
        architectures: [amd64]
        indexCompressions: [xz, gz]
        components:
          - name: main
            packages:
              - debs/*.deb

Package patterns are resolved relative to the directory holding the
configuration file.

The signing key is read from the configuration directory. Run `drb init-keys`
to create one.

If the SOURCE_DATE_EPOCH environment variable is set, it defines the date
recorded in release files and signatures. This makes builds reproducible.
";

const INIT_KEYS_ABOUT: &str = "\
Generate a signing key.

An RSA key pair is generated and written to `signing_key_private.asc` and
`signing_key_public.asc` in the configuration directory. The private key is
not protected by a passphrase.

Existing keys are not overwritten unless --force is given.
";

const VERIFY_ABOUT: &str = "\
Verify a built repository.

For every release under `dists/`, the `InRelease` signature is verified and
the size and SHA-256 digest of every listed file is checked. Package files
referenced by `Packages` indices are checked as well.

By default, the `signing_key.asc` file in the repository is used to verify
signatures.
";

#[derive(Debug, Error)]
pub enum DrbError {
    #[error("argument parsing error: {0}")]
    Clap(#[from] clap::Error),

    #[error("{0}")]
    Repository(#[from] RepositoryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no signing key in {0}; run `drb init-keys` to create one")]
    SigningKeyMissing(String),

    #[error("unable to resolve configuration directory; specify --config-dir")]
    NoConfigDir,

    #[error("invalid SOURCE_DATE_EPOCH value: {0}")]
    SourceDateEpoch(String),

    #[error("invalid sub-command: {0}")]
    InvalidSubCommand(String),
}

pub type Result<T> = std::result::Result<T, DrbError>;

pub fn run_cli() -> Result<()> {
    let app = Command::new("Debian Repository Builder")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Gregory Szorc <gregory.szorc@gmail.com>")
        .about("Build signed Debian repositories from .deb files")
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .multiple_occurrences(true)
                .help("Increase logging verbosity. Can be specified multiple times."),
        )
        .arg(
            Arg::new("config-dir")
                .long("config-dir")
                .takes_value(true)
                .global(true)
                .allow_invalid_utf8(true)
                .help("Directory holding signing keys"),
        );

    let app = app.subcommand(
        Command::new("init-keys")
            .about("Generate a repository signing key")
            .long_about(INIT_KEYS_ABOUT)
            .arg(
                Arg::new("name")
                    .long("name")
                    .takes_value(true)
                    .required(true)
                    .help("Name recorded in the key's user ID"),
            )
            .arg(
                Arg::new("comment")
                    .long("comment")
                    .takes_value(true)
                    .help("Comment recorded in the key's user ID"),
            )
            .arg(
                Arg::new("email")
                    .long("email")
                    .takes_value(true)
                    .help("Email address recorded in the key's user ID"),
            )
            .arg(
                Arg::new("key-bits")
                    .long("key-bits")
                    .takes_value(true)
                    .default_value("4096")
                    .help("Size of the RSA key in bits"),
            )
            .arg(
                Arg::new("force")
                    .long("force")
                    .help("Overwrite an existing key"),
            ),
    );

    let app = app.subcommand(
        Command::new("build")
            .about("Build a repository from a configuration file")
            .long_about(BUILD_ABOUT)
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .takes_value(true)
                    .required(true)
                    .allow_invalid_utf8(true)
                    .help("Path to the YAML repository configuration"),
            )
            .arg(
                Arg::new("repository-dir")
                    .short('d')
                    .long("repository-dir")
                    .takes_value(true)
                    .default_value("repository")
                    .allow_invalid_utf8(true)
                    .help("Directory to write the repository to"),
            ),
    );

    let mut app = app.subcommand(
        Command::new("verify")
            .about("Verify signatures and digests of a built repository")
            .long_about(VERIFY_ABOUT)
            .arg(
                Arg::new("repository-dir")
                    .short('d')
                    .long("repository-dir")
                    .takes_value(true)
                    .default_value("repository")
                    .allow_invalid_utf8(true)
                    .help("Directory holding the repository"),
            )
            .arg(
                Arg::new("key")
                    .long("key")
                    .takes_value(true)
                    .allow_invalid_utf8(true)
                    .help("Armored public key to verify signatures with"),
            ),
    );

    let matches = app.clone().get_matches();

    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();

    match matches.subcommand() {
        Some(("init-keys", args)) => command_init_keys(args),
        Some(("build", args)) => command_build(args),
        Some(("verify", args)) => command_verify(args),
        Some((command, _)) => Err(DrbError::InvalidSubCommand(command.to_string())),
        None => {
            app.print_help()?;
            Ok(())
        }
    }
}

fn config_dir(args: &ArgMatches) -> Result<PathBuf> {
    if let Some(dir) = args.value_of_os("config-dir") {
        Ok(PathBuf::from(dir))
    } else {
        Ok(dirs::config_dir()
            .ok_or(DrbError::NoConfigDir)?
            .join("debian-repo-builder"))
    }
}

fn parse_source_date_epoch(value: &str) -> Result<DateTime<Utc>> {
    let seconds = value
        .trim()
        .parse::<i64>()
        .map_err(|_| DrbError::SourceDateEpoch(value.to_string()))?;

    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| DrbError::SourceDateEpoch(value.to_string()))
}

/// Resolve the date recorded by a build.
fn build_date() -> Result<Option<DateTime<Utc>>> {
    match std::env::var("SOURCE_DATE_EPOCH") {
        Ok(value) => {
            let date = parse_source_date_epoch(&value)?;
            log::info!("using SOURCE_DATE_EPOCH date {}", date.to_rfc2822());

            Ok(Some(date))
        }
        Err(_) => Ok(None),
    }
}

fn load_signing_key(dir: &Path) -> Result<SigningKey> {
    SigningKey::load_from_dir(dir).map_err(|e| match e {
        RepositoryError::SigningKeyNotFound(_) => {
            DrbError::SigningKeyMissing(format!("{}", dir.display()))
        }
        e => e.into(),
    })
}

fn command_init_keys(args: &ArgMatches) -> Result<()> {
    let config_dir = config_dir(args)?;
    let name = args.value_of("name").expect("name argument is required");
    let key_bits = args.value_of_t::<u32>("key-bits")?;

    let uid = primary_user_id(name, args.value_of("comment"), args.value_of("email"));

    log::warn!("generating {} bit key for {}; this may take a while", key_bits, uid);
    let key = SigningKey::generate(&uid, key_bits)?;

    std::fs::create_dir_all(&config_dir)?;
    key.write_to_dir(&config_dir, args.is_present("force"))?;

    println!("key fingerprint: {}", key.fingerprint_hex());
    println!("keys written to {}", config_dir.display());

    Ok(())
}

fn command_build(args: &ArgMatches) -> Result<()> {
    let config_path = PathBuf::from(
        args.value_of_os("config")
            .expect("config argument is required"),
    );
    let root = PathBuf::from(
        args.value_of_os("repository-dir")
            .expect("repository-dir argument has default"),
    );

    let config = RepositoryConfig::load_path(&config_path)?;
    let base_dir = config_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_default();

    let key = load_signing_key(&config_dir(args)?)?;
    log::info!("signing with key {}", key.fingerprint_hex());

    let mut builder = RepositoryBuilder::new(config, base_dir, &root, &key);
    if let Some(date) = build_date()? {
        builder = builder.set_date(date);
    }

    let summary = builder.build()?;
    println!(
        "built {} releases ({} packages) in {}",
        summary.releases,
        summary.packages,
        root.display()
    );

    Ok(())
}

fn command_verify(args: &ArgMatches) -> Result<()> {
    let root = PathBuf::from(
        args.value_of_os("repository-dir")
            .expect("repository-dir argument has default"),
    );
    let key_path = match args.value_of_os("key") {
        Some(path) => PathBuf::from(path),
        None => root.join(PUBLIC_KEY_FILENAME),
    };

    let key = load_public_key(&key_path)?;

    for release in verify_repository(&root, &key)? {
        println!(
            "{}: OK ({} files, {} packages)",
            release.name, release.files, release.packages
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_date_epoch() -> Result<()> {
        assert_eq!(
            parse_source_date_epoch("1709296200\n")?.to_rfc3339(),
            "2024-03-01T12:30:00+00:00"
        );
        assert!(matches!(
            parse_source_date_epoch("yesterday"),
            Err(DrbError::SourceDateEpoch(_))
        ));

        Ok(())
    }

    #[test]
    fn missing_key_names_init_command() -> Result<()> {
        let td = tempfile::TempDir::new()?;

        let err = load_signing_key(td.path()).err().map(|e| e.to_string());
        assert!(err.unwrap_or_default().contains("drb init-keys"));

        Ok(())
    }
}
