//! Session identifier codec: generation, signing, and verification.
//!
//! Identifiers handed to untrusted clients travel as `"{id}.{signature}"`,
//! where the signature is an HMAC-SHA256 over the bare id keyed by the
//! configured secret. Verification recomputes the MAC and compares in
//! constant time, so a forged identifier is rejected without leaking
//! which bytes were wrong.

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::error::SessionError;

type HmacSha256 = Hmac<Sha256>;

/// Raw entropy per identifier: 128 bits, enough that collisions are
/// negligible without coordination between stores.
const ID_BYTES: usize = 16;

/// Hex length of an HMAC-SHA256 signature.
const SIGNATURE_LEN: usize = 64;

/// Separates the bare id from its signature in the signed form.
const SEPARATOR: char = '.';

/// Upper bound accepted by [`is_safe_id`]; generated ids are 32 chars.
const MAX_ID_LEN: usize = 128;

/// Generate a new session identifier: 16 CSPRNG bytes, hex-encoded.
///
/// Hex keeps the id printable and trivially safe to embed in filenames.
pub fn generate() -> String {
    let mut bytes = [0u8; ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Produce the signed form of `id`: `"{id}.{hex(hmac_sha256(secret, id))}"`.
pub fn sign(id: &str, secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(id.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    format!("{id}{SEPARATOR}{signature}")
}

/// Verify a signed identifier and return the bare id.
///
/// Structural problems (missing separator, empty id, signature of the
/// wrong length or charset) fail with [`SessionError::MalformedIdentifier`]
/// before any MAC work. A structurally valid value whose signature does
/// not match fails with [`SessionError::InvalidSignature`]; the signature
/// comparison itself is constant-time.
pub fn verify(signed: &str, secret: &str) -> Result<String, SessionError> {
    let (id, signature) = signed
        .rsplit_once(SEPARATOR)
        .ok_or(SessionError::MalformedIdentifier)?;
    if id.is_empty()
        || signature.len() != SIGNATURE_LEN
        || !signature.bytes().all(|b| b.is_ascii_hexdigit())
    {
        return Err(SessionError::MalformedIdentifier);
    }
    let signature = hex::decode(signature).map_err(|_| SessionError::MalformedIdentifier)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(id.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| SessionError::InvalidSignature)?;
    Ok(id.to_string())
}

/// Whether `id` is safe to map onto a filename: non-empty, bounded, and
/// ASCII alphanumeric plus `-`/`_` only. Everything [`generate`] produces
/// passes; anything that could traverse paths does not.
pub fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
