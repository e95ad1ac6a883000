//! Content digests in their textual `algorithm:hex` form.
//!
//! Only the algorithms that show up in attestations are recognised. Hex is
//! always lowercase so that one artifact has exactly one textual digest.

use std::collections::BTreeMap;

use sha2::{Digest as _, Sha256};

use crate::{Error, Result};

/// Recognised algorithms in preference order, with their hex lengths.
const ALGORITHMS: [(&str, usize); 3] = [("sha256", 64), ("sha512", 128), ("sha1", 40)];

fn hex_len(algorithm: &str) -> Option<usize> {
  ALGORITHMS
    .iter()
    .find(|(name, _)| *name == algorithm)
    .map(|(_, len)| *len)
}

fn check_hex(algorithm: &str, hex: &str) -> Result<()> {
  let expected = hex_len(algorithm).ok_or_else(|| {
    Error::InvalidIdentifier(format!("unsupported digest algorithm {algorithm:?}"))
  })?;
  let well_formed = hex.len() == expected
    && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
  if !well_formed {
    return Err(Error::InvalidIdentifier(format!(
      "malformed {algorithm} digest {hex:?}"
    )));
  }
  Ok(())
}

/// Validate a caller-supplied `algorithm:hex` digest and return it trimmed.
pub fn parse(input: &str) -> Result<String> {
  let input = input.trim();
  let (algorithm, hex) = input.split_once(':').ok_or_else(|| {
    Error::InvalidIdentifier(format!("digest {input:?} is not of the form algorithm:hex"))
  })?;
  check_hex(algorithm, hex)?;
  Ok(input.to_owned())
}

/// Pick the preferred recognised digest out of an in-toto digest map.
///
/// Returns `Ok(None)` for an empty map. A non-empty map without any recognised
/// algorithm, or with a malformed value for the chosen one, is an error.
pub fn from_map(digests: &BTreeMap<String, String>) -> Result<Option<String>> {
  if digests.is_empty() {
    return Ok(None);
  }
  for (algorithm, _) in ALGORITHMS {
    if let Some(hex) = digests.get(algorithm) {
      let hex = hex.to_ascii_lowercase();
      check_hex(algorithm, &hex)?;
      return Ok(Some(format!("{algorithm}:{hex}")));
    }
  }
  let found = digests.keys().cloned().collect::<Vec<_>>().join(", ");
  Err(Error::MissingDigest(format!(
    "no recognised digest algorithm among [{found}]"
  )))
}

/// SHA-256 of `bytes` in `sha256:hex` form.
pub fn sha256(bytes: &[u8]) -> String {
  format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}
