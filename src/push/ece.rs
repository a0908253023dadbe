//! `aes128gcm` content encoding for Web Push messages (RFC 8188, RFC 8291).
//!
//! Every call generates a fresh ephemeral ECDH key and salt, so two
//! encryptions of the same payload never produce the same body.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes128Gcm, KeyInit, Nonce};
use hmac::{Hmac, Mac};
use p256::PublicKey;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use sha2::Sha256;

use crate::base64url;
use crate::types::push::{Subscription, SubscriptionKeys};

type HmacSha256 = Hmac<Sha256>;

pub const RECORD_SIZE: u32 = 4096;
pub const SALT_LEN: usize = 16;
pub const PUBLIC_KEY_LEN: usize = 65;
pub const AUTH_SECRET_LEN: usize = 16;
/// salt ‖ record size ‖ key id length ‖ key id
pub const HEADER_LEN: usize = SALT_LEN + 4 + 1 + PUBLIC_KEY_LEN;

const TAG_LEN: usize = 16;
const HASH_LEN: usize = 32;
const PADDING_DELIMITER: u8 = 0x02;
const KEY_INFO_PREFIX: &[u8] = b"WebPush: info\0";
const CEK_INFO: &[u8] = b"Content-Encoding: aes128gcm\0";
const NONCE_INFO: &[u8] = b"Content-Encoding: nonce\0";

#[derive(Debug, thiserror::Error)]
pub enum EceError {
    #[error("p256dh key must be 65 bytes, got {0}")]
    InvalidPublicKeyLength(usize),
    #[error("auth secret must be 16 bytes, got {0}")]
    InvalidAuthSecretLength(usize),
    #[error("p256dh key is not a valid P-256 point")]
    InvalidPublicKey,
    #[error("{field} is not valid base64: {source}")]
    Encoding {
        field: &'static str,
        #[source]
        source: base64url::DecodeError,
    },
    #[error("payload of {0} bytes does not fit in a single 4096-byte record")]
    PayloadTooLarge(usize),
    #[error("cannot expand {0} bytes from a single HKDF block")]
    ExpandLength(usize),
    #[error("HMAC key rejected")]
    HmacKey,
    #[error("AES-128-GCM encryption failed")]
    Aead,
}

/// Decoded subscription key material.
#[derive(Debug, Clone)]
pub struct ClientKeys {
    pub p256dh: Vec<u8>,
    pub auth: Vec<u8>,
}

impl ClientKeys {
    pub fn decode(keys: &SubscriptionKeys) -> Result<Self, EceError> {
        let p256dh = base64url::decode(&keys.p256dh).map_err(|source| EceError::Encoding {
            field: "p256dh",
            source,
        })?;
        let auth = base64url::decode(&keys.auth).map_err(|source| EceError::Encoding {
            field: "auth",
            source,
        })?;
        Ok(Self { p256dh, auth })
    }
}

pub fn encrypt(subscription: &Subscription, plaintext: &[u8]) -> Result<Vec<u8>, EceError> {
    let keys = ClientKeys::decode(&subscription.keys)?;
    let mut rng = OsRng;
    encrypt_with_rng(&keys.p256dh, &keys.auth, plaintext, &mut rng)
}

pub fn encrypt_with_rng<R: RngCore + CryptoRng>(
    client_public: &[u8],
    auth_secret: &[u8],
    plaintext: &[u8],
    rng: &mut R,
) -> Result<Vec<u8>, EceError> {
    if client_public.len() != PUBLIC_KEY_LEN {
        return Err(EceError::InvalidPublicKeyLength(client_public.len()));
    }
    if auth_secret.len() != AUTH_SECRET_LEN {
        return Err(EceError::InvalidAuthSecretLength(auth_secret.len()));
    }
    if plaintext.len() + 1 + TAG_LEN > RECORD_SIZE as usize {
        return Err(EceError::PayloadTooLarge(plaintext.len()));
    }

    let client_key =
        PublicKey::from_sec1_bytes(client_public).map_err(|_| EceError::InvalidPublicKey)?;
    let server_secret = EphemeralSecret::random(rng);
    let server_public = server_secret.public_key().to_encoded_point(false);
    let shared_secret = server_secret.diffie_hellman(&client_key);

    let mut salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);

    let keys = derive_content_keys(
        shared_secret.raw_secret_bytes(),
        auth_secret,
        client_public,
        server_public.as_bytes(),
        &salt,
    )?;

    let mut record = Vec::with_capacity(plaintext.len() + 1);
    record.extend_from_slice(plaintext);
    record.push(PADDING_DELIMITER);

    let cipher = Aes128Gcm::new_from_slice(&keys.cek).map_err(|_| EceError::Aead)?;
    let sealed = cipher
        .encrypt(Nonce::from_slice(&keys.nonce), record.as_slice())
        .map_err(|_| EceError::Aead)?;

    let mut body = Vec::with_capacity(HEADER_LEN + sealed.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    body.push(PUBLIC_KEY_LEN as u8);
    body.extend_from_slice(server_public.as_bytes());
    body.extend_from_slice(&sealed);
    Ok(body)
}

pub(crate) struct ContentKeys {
    pub(crate) cek: Vec<u8>,
    pub(crate) nonce: Vec<u8>,
}

pub(crate) fn derive_content_keys(
    shared_secret: &[u8],
    auth_secret: &[u8],
    client_public: &[u8],
    server_public: &[u8],
    salt: &[u8],
) -> Result<ContentKeys, EceError> {
    let prk = hmac_sha256(auth_secret, shared_secret)?;

    let mut key_info =
        Vec::with_capacity(KEY_INFO_PREFIX.len() + client_public.len() + server_public.len());
    key_info.extend_from_slice(KEY_INFO_PREFIX);
    key_info.extend_from_slice(client_public);
    key_info.extend_from_slice(server_public);
    let ikm = hkdf_expand(&prk, &key_info, HASH_LEN)?;

    let content_prk = hmac_sha256(salt, &ikm)?;
    Ok(ContentKeys {
        cek: hkdf_expand(&content_prk, CEK_INFO, 16)?,
        nonce: hkdf_expand(&content_prk, NONCE_INFO, 12)?,
    })
}

/// HKDF-Expand limited to one block: `HMAC(prk, info ‖ 0x01)[..length]`.
pub fn hkdf_expand(prk: &[u8], info: &[u8], length: usize) -> Result<Vec<u8>, EceError> {
    if length > HASH_LEN {
        return Err(EceError::ExpandLength(length));
    }
    let mut mac = <HmacSha256 as Mac>::new_from_slice(prk).map_err(|_| EceError::HmacKey)?;
    mac.update(info);
    mac.update(&[0x01]);
    let block = mac.finalize().into_bytes();
    Ok(block[..length].to_vec())
}

/// Also HKDF-Extract when `key` is the salt.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<[u8; HASH_LEN], EceError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| EceError::HmacKey)?;
    mac.update(message);
    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}
