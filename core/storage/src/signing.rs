//! HMAC-SHA256 signed URLs for drivers without native presigning.
//!
//! A signed URL carries two query parameters:
//! - `t`: expiry as a Unix timestamp (seconds)
//! - `s`: hex HMAC-SHA256 over `"{resolved_path}:{t}"`
//!
//! The signature binds the URL to the resolved path it was issued for, so a
//! token cannot be replayed against another file.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use url::form_urlencoded;
use zeroize::{Zeroize, ZeroizeOnDrop};

use depot_common::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Environment variable holding the signing secret.
pub const SECRET_ENV_VAR: &str = "APP_SECRET";

/// Query parameter carrying the expiry timestamp.
pub const EXPIRES_PARAM: &str = "t";

/// Query parameter carrying the signature.
pub const SIGNATURE_PARAM: &str = "s";

/// Well-known placeholder secret that must never sign production URLs.
const INSECURE_DEFAULT_SECRET: &[u8] = b"default_secret";

/// Secrets shorter than this are accepted but logged.
const RECOMMENDED_SECRET_LEN: usize = 32;

/// Process secret used to sign URLs.
///
/// Zeroized on drop; never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningKey {
    secret: Vec<u8>,
}

impl SigningKey {
    /// Create a signing key from a secret.
    ///
    /// # Errors
    /// - `Configuration` if the secret is empty or the placeholder default
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(Error::Configuration(
                "Signing secret must not be empty".to_string(),
            ));
        }
        if secret.as_slice() == INSECURE_DEFAULT_SECRET {
            return Err(Error::Configuration(
                "Signing secret is the insecure placeholder default".to_string(),
            ));
        }
        if secret.len() < RECOMMENDED_SECRET_LEN {
            warn!(
                "Signing secret is {} bytes; at least {} are recommended",
                secret.len(),
                RECOMMENDED_SECRET_LEN
            );
        }
        Ok(Self { secret })
    }

    /// Load the signing key from `APP_SECRET`.
    ///
    /// # Errors
    /// - `Configuration` if the variable is unset, not unicode, or unusable
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var(SECRET_ENV_VAR).map_err(|e| {
            Error::Configuration(format!("{} is required: {}", SECRET_ENV_VAR, e))
        })?;
        Self::new(secret)
    }

    fn as_bytes(&self) -> &[u8] {
        &self.secret
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey([REDACTED])")
    }
}

/// Expiry and signature extracted from a signed URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken {
    /// Unix timestamp after which the URL is rejected.
    pub expires_at: i64,
    /// Hex HMAC-SHA256 signature.
    pub signature: String,
}

/// Issues and checks signed URLs.
#[derive(Debug, Clone)]
pub struct UrlSigner {
    key: SigningKey,
}

impl UrlSigner {
    /// Create a signer with the given key.
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Compute the hex signature for a resolved path and expiry.
    pub fn signature(&self, resolved_path: &str, expires_at: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(format!("{}:{}", resolved_path, expires_at).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Build `resolved_path?t=..&s=..`.
    pub fn sign_url(&self, resolved_path: &str, expires_at: i64) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair(EXPIRES_PARAM, &expires_at.to_string())
            .append_pair(SIGNATURE_PARAM, &self.signature(resolved_path, expires_at))
            .finish();
        format!("{}?{}", resolved_path, query)
    }

    /// Extract the token from a signed URL.
    ///
    /// # Errors
    /// - `Validation` if the query is missing, or `t`/`s` are absent, empty,
    ///   or malformed
    pub fn parse_token(url: &str) -> Result<SignedToken> {
        // Resolved paths are not encoded and may contain `?` or `#` themselves.
        let query = url
            .rsplit_once('?')
            .map(|(_, query)| query.split_once('#').map_or(query, |(before, _)| before))
            .filter(|query| !query.is_empty())
            .ok_or_else(|| Error::Validation("Signed URL has no query".to_string()))?;

        let mut expires = None;
        let mut signature = None;
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                EXPIRES_PARAM => expires = Some(value.into_owned()),
                SIGNATURE_PARAM => signature = Some(value.into_owned()),
                _ => {}
            }
        }

        let expires = expires
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Validation("Missing expiry parameter".to_string()))?;
        let signature = signature
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Validation("Missing signature parameter".to_string()))?;

        let expires_at: i64 = expires
            .parse()
            .map_err(|_| Error::Validation(format!("Malformed expiry: {}", expires)))?;
        if expires_at <= 0 {
            return Err(Error::Validation(format!("Malformed expiry: {}", expires)));
        }

        Ok(SignedToken {
            expires_at,
            signature,
        })
    }

    /// Check a signed URL against the path of the current request.
    ///
    /// Fails closed: any parse error, expiry at or before `now`, or signature
    /// mismatch yields `false`. The signature is compared in constant time.
    pub fn verify(&self, url: &str, resolved_path: &str, now: i64) -> bool {
        let token = match Self::parse_token(url) {
            Ok(token) => token,
            Err(e) => {
                debug!("Rejecting signed URL: {}", e);
                return false;
            }
        };

        if now >= token.expires_at {
            debug!("Rejecting expired signed URL for {}", resolved_path);
            return false;
        }

        let expected = self.signature(resolved_path, token.expires_at);
        expected.as_bytes().ct_eq(token.signature.as_bytes()).into()
    }
}
