use crate::error::{AuthError, Result};
use hmac::Hmac;
use hmac::digest::KeyInit;
use hmac::Mac;
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use totp_rs::Secret;
use zeroize::Zeroizing;

pub const DEFAULT_DIGITS: u32 = 6;
pub const DEFAULT_PERIOD: u64 = 30;

/// Widest code the engine will render. 10^10 already exceeds the 31-bit
/// truncated value, so anything wider would only add leading zeros.
pub const MAX_DIGITS: u32 = 10;

/// HMAC hash used for code generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    #[default]
    Sha1,
    Sha256,
    Sha512,
}

impl FromStr for Algorithm {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "SHA1" => Ok(Algorithm::Sha1),
            "SHA256" => Ok(Algorithm::Sha256),
            "SHA512" => Ok(Algorithm::Sha512),
            _ => Err(AuthError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::Sha1 => "SHA1",
            Algorithm::Sha256 => "SHA256",
            Algorithm::Sha512 => "SHA512",
        };
        f.write_str(name)
    }
}

/// Decode a Base32 secret as found in provisioning URIs.
///
/// Case, whitespace, hyphens and `=` padding are ignored, since secrets are
/// often typed in grouped or lowercase form. Lengths no Base32 encoding can
/// produce (1, 3 or 6 characters past a full 8-character block) and inputs
/// that decode to zero bytes are rejected.
pub fn decode_secret(encoded: &str) -> Result<Zeroizing<Vec<u8>>> {
    let cleaned: String = encoded
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if matches!(cleaned.len() % 8, 1 | 3 | 6) {
        return Err(AuthError::InvalidSecret(format!(
            "{} base32 characters cannot encode whole bytes",
            cleaned.len()
        )));
    }

    let bytes = Secret::Encoded(cleaned)
        .to_bytes()
        .map_err(|e| AuthError::InvalidSecret(format!("{e:?}")))?;

    if bytes.is_empty() {
        return Err(AuthError::InvalidSecret(
            "secret decoded to empty byte string".to_string(),
        ));
    }

    Ok(Zeroizing::new(bytes))
}

/// Compute the TOTP code (RFC 6238) for `unix_time`.
pub fn compute_code(
    secret: &[u8],
    algorithm: Algorithm,
    digits: u32,
    period: u64,
    unix_time: u64,
) -> Result<String> {
    if secret.is_empty() {
        return Err(AuthError::InvalidSecret("secret is empty".to_string()));
    }
    if digits == 0 || digits > MAX_DIGITS {
        return Err(AuthError::InvalidParameters(format!(
            "digits must be between 1 and {MAX_DIGITS}, got {digits}"
        )));
    }
    if period == 0 {
        return Err(AuthError::InvalidParameters(
            "period must be a positive number of seconds".to_string(),
        ));
    }

    let counter = (unix_time / period).to_be_bytes();
    let digest = match algorithm {
        Algorithm::Sha1 => hmac_digest::<Hmac<Sha1>>(secret, &counter)?,
        Algorithm::Sha256 => hmac_digest::<Hmac<Sha256>>(secret, &counter)?,
        Algorithm::Sha512 => hmac_digest::<Hmac<Sha512>>(secret, &counter)?,
    };

    // dynamic truncation (RFC 4226 5.3)
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset],
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]) & 0x7fff_ffff;

    let code = u64::from(binary) % 10u64.pow(digits);
    Ok(format!("{code:0width$}", width = digits as usize))
}

fn hmac_digest<M: Mac + KeyInit>(key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    let mut mac = <M as KeyInit>::new_from_slice(key)
        .map_err(|e| AuthError::InvalidSecret(format!("unusable HMAC key: {e}")))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Current Unix time in whole seconds. Clocks set before 1970 read as 0.
pub fn now_unix() -> u64 {
    u64::try_from(OffsetDateTime::now_utc().unix_timestamp()).unwrap_or(0)
}

/// Seconds until the code for `unix_time` rolls over.
pub fn seconds_remaining(period: u64, unix_time: u64) -> u64 {
    if period == 0 {
        return 0;
    }
    period - unix_time % period
}
