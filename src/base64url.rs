use base64::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD, decode_config, encode_config};

pub use base64::DecodeError;

/// Unpadded URL-safe base64, the encoding used by every Web Push field.
pub fn encode<T: AsRef<[u8]>>(bytes: T) -> String {
    encode_config(bytes, URL_SAFE_NO_PAD)
}

/// Accepts URL-safe or standard alphabets, padded or not. Browsers hand out
/// unpadded URL-safe keys but hand-copied keys often arrive padded.
pub fn decode(text: &str) -> Result<Vec<u8>, DecodeError> {
    let trimmed = text.trim();
    decode_config(trimmed, URL_SAFE_NO_PAD)
        .or_else(|_| decode_config(trimmed, URL_SAFE))
        .or_else(|_| decode_config(trimmed, STANDARD))
        .or_else(|_| decode_config(trimmed, STANDARD_NO_PAD))
}
