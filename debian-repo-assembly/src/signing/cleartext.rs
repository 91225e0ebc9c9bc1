// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! PGP cleartext signatures.

The cleartext framework is defined by
[RFC 4880 Section 7](https://datatracker.ietf.org/doc/html/rfc4880.html#section-7).
`InRelease` files use it. Documents have the form:

```text
-----BEGIN PGP SIGNED MESSAGE-----
Hash: <digest>

<dash-escaped signed content>
-----BEGIN PGP SIGNATURE-----
<headers>

<signature data>
-----END PGP SIGNATURE-----
```
*/

use {
    crate::error::{RepositoryError, Result},
    chrono::{DateTime, SubsecRound, Utc},
    digest::Digest,
    pgp::{
        crypto::{HashAlgorithm, Hasher},
        packet::{Packet, SignatureConfig, SignatureType, Subpacket},
        types::{KeyVersion, PublicKeyTrait, SecretKeyTrait},
        Signature,
    },
    smallvec::SmallVec,
    std::{
        collections::HashMap,
        io::{self, BufRead, Cursor},
    },
};

const HEADER: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
const SIGNATURE_ARMOR: &str = "-----BEGIN PGP SIGNATURE-----";

/// Holds the digester for a cleartext signature.
#[derive(Clone)]
pub enum CleartextHasher {
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
}

impl CleartextHasher {
    /// Resolve a hasher from its name in a `Hash:` armor header.
    pub fn from_header_name(name: &str) -> Option<Self> {
        match name {
            "SHA256" => Some(Self::Sha256(sha2::Sha256::new())),
            "SHA384" => Some(Self::Sha384(sha2::Sha384::new())),
            "SHA512" => Some(Self::Sha512(sha2::Sha512::new())),
            _ => None,
        }
    }

    /// The name of this hasher in a `Hash:` armor header.
    pub fn header_name(algorithm: HashAlgorithm) -> Option<&'static str> {
        match algorithm {
            HashAlgorithm::SHA2_256 => Some("SHA256"),
            HashAlgorithm::SHA2_384 => Some("SHA384"),
            HashAlgorithm::SHA2_512 => Some("SHA512"),
            _ => None,
        }
    }

    /// The PGP hash algorithm of this hasher.
    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Sha256(_) => HashAlgorithm::SHA2_256,
            Self::Sha384(_) => HashAlgorithm::SHA2_384,
            Self::Sha512(_) => HashAlgorithm::SHA2_512,
        }
    }
}

impl std::io::Write for CleartextHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Hasher for CleartextHasher {
    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(digest) => digest.update(data),
            Self::Sha384(digest) => digest.update(data),
            Self::Sha512(digest) => digest.update(data),
        }
    }

    fn finish(self: Box<Self>) -> Vec<u8> {
        match *self {
            Self::Sha256(digest) => digest.finalize().to_vec(),
            Self::Sha384(digest) => digest.finalize().to_vec(),
            Self::Sha512(digest) => digest.finalize().to_vec(),
        }
    }
}

/// Signatures parsed from a cleartext signed document.
///
/// Holds hashers fed with the signed content so signatures can be verified without
/// access to the content.
pub struct CleartextSignatures {
    hashers: HashMap<u8, CleartextHasher>,
    signatures: Vec<Signature>,
}

impl CleartextSignatures {
    /// Iterate over all signatures.
    pub fn iter_signatures(&self) -> impl Iterator<Item = &Signature> {
        self.signatures.iter()
    }

    /// Iterate over signatures whose issuer is the given key.
    pub fn iter_signatures_from_key<'slf, 'key: 'slf>(
        &'slf self,
        key: &'key impl PublicKeyTrait,
    ) -> impl Iterator<Item = &'slf Signature> {
        self.signatures
            .iter()
            .filter(move |sig| sig.issuer() == Some(&key.key_id()))
    }

    /// Verify signatures made by a key.
    ///
    /// Returns the number of verified signatures. Errors if no signature was made by
    /// the key or if any signature made by the key fails verification.
    pub fn verify(&self, key: &impl PublicKeyTrait) -> Result<usize> {
        if self.signatures.is_empty() {
            return Err(RepositoryError::ReleaseNotSigned);
        }

        let mut valid_signatures = 0;

        for sig in self.iter_signatures_from_key(key) {
            // Signature state is fed into a copy of the hasher that saw the cleartext.
            let mut hasher = Box::new(
                self.hashers
                    .get(&(sig.config.hash_alg as u8))
                    .ok_or_else(|| {
                        pgp::errors::Error::Message(format!(
                            "no hasher matching signature hash algorithm ({:?})",
                            sig.config.hash_alg
                        ))
                    })?
                    .clone(),
            );

            let len = sig.config.hash_signature_data(&mut *hasher)?;
            hasher.update(&sig.config.trailer(len));

            let digest = hasher.finish();

            if digest[0..2] != sig.signed_hash_value {
                return Err(pgp::errors::Error::Message("invalid signed hash value".into()).into());
            }

            key.verify_signature(sig.config.hash_alg, &digest, &sig.signature)?;
            valid_signatures += 1;
        }

        match valid_signatures {
            0 => Err(
                pgp::errors::Error::Message("no signatures signed by provided key".into()).into(),
            ),
            _ => Ok(valid_signatures),
        }
    }
}

/// A parsed cleartext signed document.
pub struct CleartextSignedMessage {
    /// The signed text with dash escaping reversed and LF line endings.
    pub cleartext: String,

    /// Signatures over the text.
    pub signatures: CleartextSignatures,
}

fn parse_error(message: impl ToString) -> RepositoryError {
    RepositoryError::CleartextParse(message.to_string())
}

/// Parse a cleartext signed document.
pub fn parse_cleartext(reader: impl BufRead) -> Result<CleartextSignedMessage> {
    let mut lines = reader.lines();

    let mut next_line = move || -> Result<Option<String>> {
        Ok(lines
            .next()
            .transpose()?
            .map(|line| line.trim_end_matches('\r').to_string()))
    };

    match next_line()? {
        Some(line) if line == HEADER => {}
        Some(line) => return Err(parse_error(format!("bad header; got `{}`", line))),
        None => return Err(parse_error("empty document")),
    }

    // One or more `Hash:` armor headers, terminated by an empty line.
    let mut hashers = HashMap::new();
    loop {
        let line = next_line()?.ok_or_else(|| parse_error("unexpected end of armor headers"))?;

        if let Some(names) = line.strip_prefix("Hash: ") {
            for name in names.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
                let hasher = CleartextHasher::from_header_name(name)
                    .ok_or_else(|| parse_error(format!("unsupported hash type: {}", name)))?;
                hashers.entry(hasher.algorithm() as u8).or_insert(hasher);
            }
        } else if line.trim().is_empty() {
            if hashers.is_empty() {
                return Err(parse_error("no Hash headers"));
            }
            break;
        } else {
            return Err(parse_error(format!("expected Hash: header; got {}", line)));
        }
    }

    // The line ending before the signature armor is not part of the signed text. So
    // separators are fed to hashers before every line but the first.
    let mut cleartext = String::new();
    let mut first = true;
    loop {
        let line = next_line()?.ok_or_else(|| parse_error("signature armor not found"))?;

        if line == SIGNATURE_ARMOR {
            break;
        }

        let line = line.strip_prefix("- ").unwrap_or(&line);

        for hasher in hashers.values_mut() {
            if !first {
                hasher.update(b"\r\n");
            }
            hasher.update(line.as_bytes());
        }

        cleartext.push_str(line);
        cleartext.push('\n');
        first = false;
    }

    let mut armor = format!("{}\n", SIGNATURE_ARMOR);
    while let Some(line) = next_line()? {
        armor.push_str(&line);
        armor.push('\n');
    }

    let mut dearmor = pgp::armor::Dearmor::new(Cursor::new(armor.into_bytes()));
    dearmor.read_header()?;

    if !matches!(dearmor.typ, Some(pgp::armor::BlockType::Signature)) {
        return Err(parse_error("failed to parse PGP signature armor"));
    }

    let mut signatures = vec![];
    for packet in pgp::packet::PacketParser::new(dearmor) {
        match packet? {
            Packet::Signature(signature) => signatures.push(signature),
            packet => {
                return Err(parse_error(format!(
                    "expected Signature packet; got {:?}",
                    packet.tag()
                )))
            }
        }
    }

    Ok(CleartextSignedMessage {
        cleartext,
        signatures: CleartextSignatures {
            hashers,
            signatures,
        },
    })
}

/// Produce a cleartext signature over data.
///
/// Trailing whitespace is removed from every line. Lines beginning with `-` or
/// `From ` are dash-escaped. The signature is computed over the lines joined by
/// CRLF and records `created` as its creation time.
pub fn cleartext_sign<PW, R>(
    key: &impl SecretKeyTrait,
    key_pw: PW,
    hash_algorithm: HashAlgorithm,
    data: R,
    created: DateTime<Utc>,
) -> Result<String>
where
    PW: FnOnce() -> String,
    R: BufRead,
{
    let hash_name = CleartextHasher::header_name(hash_algorithm).ok_or_else(|| {
        pgp::errors::Error::Unsupported(
            "hash algorithm unsupported for cleartext signatures".to_string(),
        )
    })?;

    let mut dashed_lines = vec![];
    let mut source_lines = vec![];

    for line in data.lines() {
        let line = line?;
        let line = line.trim_end();

        dashed_lines.push(if line.starts_with('-') || line.starts_with("From ") {
            format!("- {}", line)
        } else {
            line.to_string()
        });

        source_lines.push(line.to_string());
    }

    let cleartext = source_lines.join("\r\n").into_bytes();

    let hashed_subpackets = vec![
        Subpacket::IssuerFingerprint(KeyVersion::V4, SmallVec::from_slice(&key.fingerprint())),
        Subpacket::SignatureCreationTime(created.trunc_subsecs(0)),
    ];
    let unhashed_subpackets = vec![Subpacket::Issuer(key.key_id())];

    let config = SignatureConfig::new_v4(
        Default::default(),
        SignatureType::Text,
        key.algorithm(),
        hash_algorithm,
        hashed_subpackets,
        unhashed_subpackets,
    );

    let signature = config.sign(key, key_pw, Cursor::new(cleartext))?;

    let packet = Packet::Signature(signature);
    let mut writer = Cursor::new(Vec::<u8>::new());
    pgp::armor::write(&packet, pgp::armor::BlockType::Signature, &mut writer, None)?;

    let signature_string = String::from_utf8(writer.into_inner())
        .map_err(|e| pgp::errors::Error::Utf8Error(e.utf8_error()))?;

    let lines = vec![
        HEADER.to_string(),
        format!("Hash: {}", hash_name),
        "".to_string(),
    ]
    .into_iter()
    .chain(dashed_lines.into_iter())
    .chain(std::iter::once(signature_string))
    .collect::<Vec<_>>();

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use {super::*, crate::testutil::TEST_KEY, indoc::indoc};

    const TEXT: &str = indoc! {"
        Origin: Example
        -dash line
        From the start
        SHA256:
         abc 12 main/binary-amd64/Packages
    "};

    fn sign(text: &str) -> Result<String> {
        cleartext_sign(
            TEST_KEY.secret_key(),
            String::new,
            HashAlgorithm::SHA2_256,
            Cursor::new(text.as_bytes()),
            Utc::now(),
        )
    }

    #[test]
    fn sign_and_verify() -> Result<()> {
        let signed = sign(TEXT)?;

        assert!(signed.starts_with("-----BEGIN PGP SIGNED MESSAGE-----\nHash: SHA256\n\n"));
        assert!(signed.contains("\n- -dash line\n"));
        assert!(signed.contains("\n- From the start\n"));

        let message = parse_cleartext(Cursor::new(signed.as_bytes()))?;
        assert_eq!(message.cleartext, TEXT);
        assert_eq!(message.signatures.iter_signatures().count(), 1);
        assert_eq!(message.signatures.verify(TEST_KEY.public_key())?, 1);

        Ok(())
    }

    #[test]
    fn crlf_documents_verify() -> Result<()> {
        let signed = sign(TEXT)?.replace('\n', "\r\n");

        let message = parse_cleartext(Cursor::new(signed.as_bytes()))?;
        assert_eq!(message.cleartext, TEXT);
        assert_eq!(message.signatures.verify(TEST_KEY.public_key())?, 1);

        Ok(())
    }

    #[test]
    fn tampered_content_fails() -> Result<()> {
        let signed = sign(TEXT)?.replace("Origin: Example", "Origin: Tampered");

        let message = parse_cleartext(Cursor::new(signed.as_bytes()))?;
        assert!(message.signatures.verify(TEST_KEY.public_key()).is_err());

        Ok(())
    }

    #[test]
    fn malformed_documents() {
        assert!(matches!(
            parse_cleartext(Cursor::new(b"Origin: Example\n".to_vec())),
            Err(RepositoryError::CleartextParse(_))
        ));
        assert!(matches!(
            parse_cleartext(Cursor::new(
                b"-----BEGIN PGP SIGNED MESSAGE-----\nHash: MD2\n\nfoo\n".to_vec()
            )),
            Err(RepositoryError::CleartextParse(_))
        ));
        assert!(matches!(
            parse_cleartext(Cursor::new(
                b"-----BEGIN PGP SIGNED MESSAGE-----\nHash: SHA256\n\nfoo\n".to_vec()
            )),
            Err(RepositoryError::CleartextParse(_))
        ));
    }
}
