//! AES-GCM for bulk data (documents).
//!
//! Each document gets a fresh key and 96-bit nonce. The authentication tag is
//! kept apart from the ciphertext so the key, nonce and tag can be sealed
//! together as one short secret.

use std::fmt;

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;

use super::error::{CryptoError, CryptoResult};

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Key, nonce and (after encryption) tag of one AES-GCM message
#[derive(Clone, PartialEq, Eq)]
pub struct AesCipherOptions {
    pub key: Vec<u8>,
    pub iv: Vec<u8>,
    pub tag: Vec<u8>,
}

impl fmt::Debug for AesCipherOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesCipherOptions")
            .field("key_bits", &(self.key.len() * 8))
            .field("iv_len", &self.iv.len())
            .field("tag_len", &self.tag.len())
            .finish()
    }
}

/// Fresh random key of `key_bits` (128 or 256) and a random nonce. The tag is empty.
pub fn aes_cipher_options(key_bits: usize) -> CryptoResult<AesCipherOptions> {
    if key_bits != 128 && key_bits != 256 {
        return Err(CryptoError::UnsupportedKeySize(key_bits));
    }

    let mut key = vec![0u8; key_bits / 8];
    OsRng.fill_bytes(&mut key);
    let mut iv = vec![0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut iv);

    Ok(AesCipherOptions {
        key,
        iv,
        tag: Vec::new(),
    })
}

/// Encrypt `plaintext`, returning `(tag, ciphertext)`. The tag is also stored in `options`.
pub fn aes_encrypt(options: &mut AesCipherOptions, plaintext: &[u8]) -> CryptoResult<(Vec<u8>, Vec<u8>)> {
    if options.iv.len() != NONCE_LEN {
        return Err(CryptoError::Encryption(format!("nonce must be {} bytes", NONCE_LEN)));
    }

    let mut buffer = plaintext.to_vec();
    let tag = match options.key.len() {
        16 => encrypt_detached::<Aes128Gcm>(&options.key, &options.iv, &mut buffer),
        32 => encrypt_detached::<Aes256Gcm>(&options.key, &options.iv, &mut buffer),
        other => return Err(CryptoError::UnsupportedKeySize(other * 8)),
    }
    .map_err(|_| CryptoError::Encryption("AES-GCM encryption failed".to_string()))?;

    options.tag = tag.clone();
    Ok((tag, buffer))
}

/// Decrypt and authenticate. Any modification of the ciphertext or tag fails.
pub fn aes_decrypt(secret: &[u8], iv: &[u8], tag: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    if iv.len() != NONCE_LEN || tag.len() != TAG_LEN {
        return Err(CryptoError::Decryption("malformed AES-GCM parameters".to_string()));
    }

    let mut buffer = ciphertext.to_vec();
    match secret.len() {
        16 => decrypt_detached::<Aes128Gcm>(secret, iv, tag, &mut buffer),
        32 => decrypt_detached::<Aes256Gcm>(secret, iv, tag, &mut buffer),
        _ => return Err(CryptoError::Decryption("malformed AES key".to_string())),
    }
    .map_err(|_| CryptoError::Decryption("authentication tag mismatch".to_string()))?;

    Ok(buffer)
}

fn encrypt_detached<C: AeadInPlace + KeyInit>(
    key: &[u8],
    iv: &[u8],
    buffer: &mut [u8],
) -> Result<Vec<u8>, aes_gcm::Error> {
    let cipher = C::new_from_slice(key).map_err(|_| aes_gcm::Error)?;
    let tag = cipher.encrypt_in_place_detached(GenericArray::from_slice(iv), b"", buffer)?;
    Ok(tag.to_vec())
}

fn decrypt_detached<C: AeadInPlace + KeyInit>(
    key: &[u8],
    iv: &[u8],
    tag: &[u8],
    buffer: &mut [u8],
) -> Result<(), aes_gcm::Error> {
    let cipher = C::new_from_slice(key).map_err(|_| aes_gcm::Error)?;
    cipher.decrypt_in_place_detached(GenericArray::from_slice(iv), b"", buffer, GenericArray::from_slice(tag))
}

/// `base64(key):base64(iv):base64(tag)`
pub fn format_aes_secrets(options: &AesCipherOptions) -> String {
    format!(
        "{}:{}:{}",
        STANDARD.encode(&options.key),
        STANDARD.encode(&options.iv),
        STANDARD.encode(&options.tag)
    )
}

pub fn parse_aes_secrets(value: &str) -> CryptoResult<AesCipherOptions> {
    let malformed = || CryptoError::Decryption("malformed AES secrets".to_string());

    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() != 3 {
        return Err(malformed());
    }

    let decode = |part: &str| STANDARD.decode(part).map_err(|_| malformed());
    Ok(AesCipherOptions {
        key: decode(parts[0])?,
        iv: decode(parts[1])?,
        tag: decode(parts[2])?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        for bits in [128, 256] {
            let mut options = aes_cipher_options(bits).unwrap();
            assert!(options.tag.is_empty());

            let (tag, ciphertext) = aes_encrypt(&mut options, b"case notes for family 42").unwrap();
            assert_eq!(tag.len(), TAG_LEN);
            assert_eq!(options.tag, tag);
            assert_ne!(ciphertext, b"case notes for family 42");

            let plaintext = aes_decrypt(&options.key, &options.iv, &tag, &ciphertext).unwrap();
            assert_eq!(plaintext, b"case notes for family 42");
        }
    }

    #[test]
    fn empty_plaintext() {
        let mut options = aes_cipher_options(256).unwrap();
        let (tag, ciphertext) = aes_encrypt(&mut options, b"").unwrap();
        assert!(ciphertext.is_empty());
        assert!(aes_decrypt(&options.key, &options.iv, &tag, &ciphertext).unwrap().is_empty());
    }

    #[test]
    fn every_flipped_bit_is_detected() {
        let mut options = aes_cipher_options(256).unwrap();
        let (tag, ciphertext) = aes_encrypt(&mut options, b"0123456789").unwrap();

        for i in 0..ciphertext.len() * 8 {
            let mut tampered = ciphertext.clone();
            tampered[i / 8] ^= 1 << (i % 8);
            let result = aes_decrypt(&options.key, &options.iv, &tag, &tampered);
            assert!(matches!(result, Err(CryptoError::Decryption(_))), "bit {} undetected", i);
        }

        for i in 0..tag.len() * 8 {
            let mut tampered = tag.clone();
            tampered[i / 8] ^= 1 << (i % 8);
            let result = aes_decrypt(&options.key, &options.iv, &tampered, &ciphertext);
            assert!(matches!(result, Err(CryptoError::Decryption(_))), "tag bit {} undetected", i);
        }
    }

    #[test]
    fn wrong_key_fails() {
        let mut options = aes_cipher_options(256).unwrap();
        let other = aes_cipher_options(256).unwrap();
        let (tag, ciphertext) = aes_encrypt(&mut options, b"secret").unwrap();
        assert!(aes_decrypt(&other.key, &options.iv, &tag, &ciphertext).is_err());
    }

    #[test]
    fn malformed_parameters_fail_cleanly() {
        let options = aes_cipher_options(256).unwrap();
        assert!(aes_decrypt(&options.key, &options.iv[..8], &[0u8; TAG_LEN], b"x").is_err());
        assert!(aes_decrypt(&options.key, &options.iv, &[0u8; 4], b"x").is_err());
        assert!(aes_decrypt(&options.key[..20], &options.iv, &[0u8; TAG_LEN], b"x").is_err());
    }

    #[test]
    fn rejects_unsupported_key_sizes() {
        assert!(matches!(aes_cipher_options(192), Err(CryptoError::UnsupportedKeySize(192))));
        assert!(matches!(aes_cipher_options(512), Err(CryptoError::UnsupportedKeySize(512))));
    }

    #[test]
    fn secrets_string_roundtrip() {
        let mut options = aes_cipher_options(256).unwrap();
        aes_encrypt(&mut options, b"data").unwrap();

        let formatted = format_aes_secrets(&options);
        assert_eq!(formatted.split(':').count(), 3);
        assert_eq!(parse_aes_secrets(&formatted).unwrap(), options);
    }

    #[test]
    fn rejects_malformed_secrets() {
        assert!(parse_aes_secrets("only:two").is_err());
        assert!(parse_aes_secrets("a:b:c:d").is_err());
        assert!(parse_aes_secrets("!!:AAAA:AAAA").is_err());
    }
}
