use crate::error::{AuthError, Result};
use crate::totp::{self, Algorithm, DEFAULT_DIGITS, DEFAULT_PERIOD};
use tracing::{debug, warn};
use url::Url;
use zeroize::Zeroizing;

/// One 2FA enrollment, as described by an `otpauth://totp/...` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub name: String,
    pub label: String,
    pub issuer: Option<String>,
    /// Base32 text exactly as it appeared in the URI.
    pub secret: String,
    pub algorithm: Algorithm,
    pub digits: u32,
    pub period: u64,
}

impl Enrollment {
    pub fn secret_bytes(&self) -> Result<Zeroizing<Vec<u8>>> {
        totp::decode_secret(&self.secret)
    }

    pub fn code_at(&self, unix_time: u64) -> Result<String> {
        let secret = self.secret_bytes()?;
        debug!(service = %self.name, algorithm = %self.algorithm, "computing code");
        totp::compute_code(&secret, self.algorithm, self.digits, self.period, unix_time)
    }
}

/// Parse an `otpauth://totp/<label>?secret=...` provisioning URI.
///
/// `secret` is required and must be valid Base32. `algorithm`, `digits` and
/// `period` are optional; values that are missing, malformed or out of range
/// fall back to SHA1 / 6 / 30.
pub fn parse_provisioning_uri(uri: &str) -> Result<Enrollment> {
    let url = Url::parse(uri.trim()).map_err(|e| AuthError::InvalidUri(e.to_string()))?;

    if url.scheme() != "otpauth" {
        return Err(AuthError::InvalidUri(format!(
            "unexpected scheme '{}', expected 'otpauth'",
            url.scheme()
        )));
    }

    let kind = url
        .host_str()
        .ok_or_else(|| {
            AuthError::InvalidUri("missing OTP type, expected otpauth://totp/".to_string())
        })?
        .to_lowercase();
    if kind != "totp" {
        return Err(AuthError::UnsupportedType(kind));
    }

    let mut secret: Option<String> = None;
    let mut issuer: Option<String> = None;
    let mut digits: Option<String> = None;
    let mut period: Option<String> = None;
    let mut algo: Option<String> = None;

    for (k, v) in url.query_pairs() {
        match k.as_ref() {
            "secret" => secret = Some(v.to_string()),
            "issuer" => issuer = Some(v.to_string()),
            "digits" => digits = Some(v.to_string()),
            "period" => period = Some(v.to_string()),
            "algorithm" => algo = Some(v.to_string()),
            _ => {}
        }
    }

    let secret = secret
        .filter(|s| !s.trim().is_empty())
        .ok_or(AuthError::MissingSecret)?;
    totp::decode_secret(&secret)?;

    let algorithm = match algo {
        None => Algorithm::default(),
        Some(a) => a.parse::<Algorithm>().unwrap_or_else(|_| {
            warn!(algorithm = %a, "unrecognized OTP algorithm, using SHA1");
            Algorithm::default()
        }),
    };

    let digits = match digits {
        None => DEFAULT_DIGITS,
        Some(d) => match d.trim().parse::<u32>() {
            Ok(n) if (6..=8).contains(&n) => n,
            _ => {
                warn!(digits = %d, "unusable OTP digits, using {DEFAULT_DIGITS}");
                DEFAULT_DIGITS
            }
        },
    };

    let period = match period {
        None => DEFAULT_PERIOD,
        Some(p) => match p.trim().parse::<u64>() {
            Ok(n) if n > 0 => n,
            _ => {
                warn!(period = %p, "unusable OTP period, using {DEFAULT_PERIOD}");
                DEFAULT_PERIOD
            }
        },
    };

    let raw_label = url.path().trim_start_matches('/');
    let label = urlencoding::decode(raw_label)
        .map(|l| l.into_owned())
        .unwrap_or_else(|_| raw_label.to_string());

    // "Issuer:account" labels carry the issuer when the query does not
    let issuer = issuer.filter(|i| !i.is_empty()).or_else(|| {
        label
            .split_once(':')
            .map(|(i, _)| i.trim().to_string())
            .filter(|i| !i.is_empty())
    });

    Ok(Enrollment {
        name: label.clone(),
        label,
        issuer,
        secret,
        algorithm,
        digits,
        period,
    })
}

/// Build a minimal provisioning URI around a bare Base32 secret.
pub fn uri_from_secret(name: &str, secret: &str) -> Result<String> {
    totp::decode_secret(secret)?;

    let secret: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    Ok(format!(
        "otpauth://totp/{}?secret={}",
        urlencoding::encode(name),
        secret
    ))
}

/// Accept what a user pastes: either an `otpauth://` URI (returned as is) or a
/// bare Base32 secret, which gets wrapped into a URI labelled `name`.
pub fn normalize_input(name: &str, input: &str) -> Result<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AuthError::MissingSecret);
    }

    if input.to_lowercase().starts_with("otpauth://") {
        Ok(input.to_string())
    } else {
        uri_from_secret(name, input)
    }
}
