// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Assemble signed Debian repositories.

This crate turns a set of `.deb` binary package files plus a declarative
configuration into a Debian repository that APT clients can consume.

A built repository looks like:

```text
<root>/
  pool/<component>/<prefix>/<source>/<name>_<version>_<arch>.deb
  dists/<release>/<component>/binary-<arch>/Packages
  dists/<release>/<component>/binary-<arch>/Packages.xz
  dists/<release>/<component>/Contents-<arch>.gz
  dists/<release>/InRelease
  signing_key.asc
```

# Pipeline

Assembly is a strictly ordered, single-threaded pipeline:

1. Every `.deb` named by the configuration is opened and its `control` file
   parsed ([deb::reader]).
2. Each distinct source file is copied once into the `pool/` tree
   ([repository::pool::PoolManager]). The same file referenced by several
   releases or components resolves to a single pool path.
3. For every release, `Packages` and `Contents` indices are written per
   component and architecture ([repository::packages],
   [repository::contents]).
4. Every file under `dists/<release>/` is hashed into a `Release` paragraph,
   which is then PGP cleartext signed into `InRelease`
   ([repository::release], [signing]).
5. The public half of the signing key is exported to `signing_key.asc`.

[repository::builder::RepositoryBuilder] drives the whole thing.

# Primitives

The pipeline is built from lower-level primitives that are usable on their
own:

* [control] implements the deb822 control file format.
* [package_version] implements Debian version parsing and ordering.
* [binary_package_control] gives typed access to binary package control
  paragraphs.
* [deb] reads and writes `.deb` files.
* [signing] creates, persists and uses OpenPGP signing keys, including the
  cleartext signature framework used by `InRelease` files.
* [config] defines the versioned YAML configuration document.

# Determinism

With identical inputs, an identical signing key and a fixed `Date`, rebuilding
a repository produces byte identical indices and an identical set of
`SHA256` entries in `InRelease`. The signature creation time is the `Date`
value too.
*/

pub mod architecture;
pub mod binary_package_control;
pub mod config;
pub mod control;
pub mod deb;
pub mod error;
pub mod io;
pub mod package_version;
pub mod repository;
pub mod signing;
#[cfg(test)]
pub(crate) mod testutil;
