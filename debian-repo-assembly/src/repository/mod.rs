// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian repository primitives.

A Debian repository is a filesystem tree with a `pool/` directory holding
package files and a `dists/` directory holding, for every release (a.k.a.
distribution), signed metadata describing those packages.

* [pool] relocates `.deb` files into the `pool/` tree.
* [package] is the model of a package entry within a repository.
* [packages] and [contents] produce the `Packages` and `Contents` indices.
* [release] produces and parses `Release`/`InRelease` files.
* [builder] drives assembly of an entire repository.
* [verify] checks a built repository the way an APT client would.
*/

pub mod builder;
pub mod contents;
pub mod package;
pub mod packages;
pub mod pool;
pub mod release;
pub mod verify;

/// Name of the file under the repository root holding the armored public key.
pub const PUBLIC_KEY_FILENAME: &str = "signing_key.asc";
