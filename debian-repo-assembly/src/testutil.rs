// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::{
        control::{ControlField, ControlParagraph},
        deb::builder::DebBuilder,
        error::Result,
        signing::SigningKey,
    },
    once_cell::sync::Lazy,
    std::{path::Path, time::SystemTime},
};

/// A signing key shared by tests. Key generation is slow.
pub static TEST_KEY: Lazy<SigningKey> = Lazy::new(|| {
    SigningKey::generate("Test Repository <test@example.com>", 2048)
        .expect("test key generation should succeed")
});

/// A second key, distinct from [TEST_KEY].
pub static OTHER_TEST_KEY: Lazy<SigningKey> = Lazy::new(|| {
    SigningKey::generate("Other Repository <other@example.com>", 2048)
        .expect("test key generation should succeed")
});

/// Build a minimal binary package control paragraph.
pub fn simple_control_file(name: &str, version: &str, arch: &str) -> ControlParagraph<'static> {
    let mut para = ControlParagraph::default();
    para.set_field_from_string("Package".into(), name.to_string().into());
    para.set_field_from_string("Version".into(), version.to_string().into());
    para.set_field_from_string("Architecture".into(), arch.to_string().into());
    para.set_field_from_string(
        "Maintainer".into(),
        "Test Maintainer <test@example.com>".into(),
    );
    para.set_field(ControlField::new(
        "Description".into(),
        "test package\n A package used in tests.".into(),
    ));

    para
}

/// Write a `.deb` to a path, creating parent directories.
pub fn write_deb(builder: &DebBuilder, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut fh = std::fs::File::create(path)?;
    builder.write(&mut fh)?;

    Ok(())
}

/// Write a simple package with a fixed mtime and one installed file per entry.
pub fn write_simple_deb(
    path: &Path,
    control: ControlParagraph<'static>,
    files: &[&str],
) -> Result<()> {
    let builder = files.iter().fold(
        DebBuilder::new(control).set_mtime(Some(SystemTime::UNIX_EPOCH)),
        |builder, file| builder.install_file(file, format!("content of {}", file).into_bytes()),
    );

    write_deb(&builder, path)
}
