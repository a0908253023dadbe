use jwt_simple::prelude::ES256KeyPair;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use reqwest::Url;
use serde::Serialize;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::base64url;
use crate::config;
use crate::types::push::VapidConfig;

use std::sync::{PoisonError, RwLock};

/// Lifetime of a signed token, as recommended by RFC 8292.
pub const TOKEN_TTL: time::Duration = time::Duration::hours(12);

#[derive(Debug, Clone)]
pub struct VapidCredentials {
    pub private_key: String,
    pub public_key: String,
}

#[derive(Debug, Clone)]
pub enum VapidConfigStatus {
    Missing,
    Incomplete,
    Ready(VapidConfig),
}

#[derive(Debug, thiserror::Error)]
pub enum VapidError {
    #[error("VAPID {field} is not valid base64: {source}")]
    Encoding {
        field: &'static str,
        #[source]
        source: base64url::DecodeError,
    },
    #[error("VAPID private key must be a 32-byte P-256 scalar")]
    InvalidPrivateKey,
    #[error("VAPID public key must be a 65-byte uncompressed P-256 point")]
    InvalidPublicKey,
    #[error("VAPID public key does not belong to the private key")]
    KeyMismatch,
    #[error("push endpoint '{0}' has no usable origin")]
    InvalidAudience(String),
    #[error("failed to encode VAPID claims: {0}")]
    Claims(#[from] serde_json::Error),
}

pub fn load_vapid_config(config: &config::AppConfig) -> VapidConfigStatus {
    let private_key = config.vapid_private_key.as_ref();
    let public_key = config.vapid_public_key.as_ref();
    let subject = config.vapid_subject.as_ref();
    let has_any = private_key.is_some() || public_key.is_some() || subject.is_some();

    match (private_key, public_key, subject) {
        (Some(private_key), Some(public_key), Some(subject)) => {
            VapidConfigStatus::Ready(VapidConfig {
                private_key: private_key.clone(),
                public_key: public_key.clone(),
                subject: subject.clone(),
            })
        }
        _ if has_any => VapidConfigStatus::Incomplete,
        _ => VapidConfigStatus::Missing,
    }
}

/// Checks that the configured key pair can be imported and belongs together.
pub fn check_key_pair(vapid: &VapidConfig) -> Result<(), VapidError> {
    import_signing_key(&vapid.private_key, &vapid.public_key).map(|_| ())
}

pub fn generate_vapid_credentials() -> Result<VapidCredentials, VapidError> {
    let mut rng = OsRng;
    generate_vapid_credentials_with_rng(&mut rng)
}

pub(crate) fn generate_vapid_credentials_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> Result<VapidCredentials, VapidError> {
    let key_pair = generate_es256_keypair_with_rng(rng);
    let private_bytes = key_pair.to_bytes();
    let signing_key =
        SigningKey::from_slice(&private_bytes).map_err(|_| VapidError::InvalidPrivateKey)?;
    let public_point = signing_key.verifying_key().to_encoded_point(false);

    Ok(VapidCredentials {
        private_key: base64url::encode(&private_bytes),
        public_key: base64url::encode(public_point.as_bytes()),
    })
}

fn generate_es256_keypair_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> ES256KeyPair {
    let mut key_bytes = [0u8; 32];
    loop {
        rng.fill_bytes(&mut key_bytes);
        if let Ok(key_pair) = ES256KeyPair::from_bytes(&key_bytes) {
            return key_pair;
        }
    }
}

/// The `aud` claim for an endpoint: its origin, `scheme://host[:port]`.
pub fn audience(endpoint: &str) -> Result<String, VapidError> {
    let invalid = || VapidError::InvalidAudience(endpoint.to_string());
    let url = Url::parse(endpoint).map_err(|_| invalid())?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(invalid());
    }
    Ok(origin.ascii_serialization())
}

#[derive(Serialize)]
struct Header {
    alg: &'static str,
    typ: &'static str,
}

#[derive(Serialize)]
struct Claims<'a> {
    aud: &'a str,
    exp: i64,
    sub: &'a str,
}

struct CachedKey {
    fingerprint: [u8; 32],
    key: SigningKey,
}

/// Signs VAPID tokens, memoizing the imported signing key.
///
/// The cache holds a single key, looked up by the SHA-256 fingerprint of the
/// encoded private key. Signing with different key material replaces it.
#[derive(Default)]
pub struct VapidSigner {
    cache: RwLock<Option<CachedKey>>,
}

impl std::fmt::Debug for VapidSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidSigner").finish_non_exhaustive()
    }
}

impl VapidSigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign(
        &self,
        audience: &str,
        subject: &str,
        private_key: &str,
        public_key: &str,
        now: OffsetDateTime,
    ) -> Result<String, VapidError> {
        let header = serde_json::to_vec(&Header {
            alg: "ES256",
            typ: "JWT",
        })?;
        let claims = serde_json::to_vec(&Claims {
            aud: audience,
            exp: (now + TOKEN_TTL).unix_timestamp(),
            sub: subject,
        })?;
        let signing_input = format!(
            "{}.{}",
            base64url::encode(header),
            base64url::encode(claims)
        );

        let key = self.signing_key(private_key, public_key)?;
        let signature: Signature = key.sign(signing_input.as_bytes());
        Ok(format!(
            "{signing_input}.{}",
            base64url::encode(signature.to_bytes())
        ))
    }

    fn signing_key(&self, private_key: &str, public_key: &str) -> Result<SigningKey, VapidError> {
        let wanted = fingerprint(private_key);
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = cache.as_ref()
                && cached.fingerprint == wanted
            {
                return Ok(cached.key.clone());
            }
        }

        let key = import_signing_key(private_key, public_key)?;
        tracing::debug!("imported VAPID signing key");
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        *cache = Some(CachedKey {
            fingerprint: wanted,
            key: key.clone(),
        });
        Ok(key)
    }

    #[cfg(test)]
    fn cached_fingerprint(&self) -> Option<[u8; 32]> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|cached| cached.fingerprint)
    }
}

fn fingerprint(private_key: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(private_key.as_bytes()));
    out
}

/// Rebuilds the signing key from `d` and checks it against the `x`/`y`
/// coordinates carried in the public key.
fn import_signing_key(private_key: &str, public_key: &str) -> Result<SigningKey, VapidError> {
    let d = base64url::decode(private_key).map_err(|source| VapidError::Encoding {
        field: "private key",
        source,
    })?;
    let public = base64url::decode(public_key).map_err(|source| VapidError::Encoding {
        field: "public key",
        source,
    })?;
    if d.len() != 32 {
        return Err(VapidError::InvalidPrivateKey);
    }
    if public.len() != 65 || public[0] != 0x04 {
        return Err(VapidError::InvalidPublicKey);
    }

    let key = SigningKey::from_slice(&d).map_err(|_| VapidError::InvalidPrivateKey)?;
    let derived = key.verifying_key().to_encoded_point(false);
    let derived = derived.as_bytes();
    let (x, y) = (&public[1..33], &public[33..65]);
    if &derived[1..33] != x || &derived[33..65] != y {
        return Err(VapidError::KeyMismatch);
    }
    Ok(key)
}
