//! Encrypted document storage.
//!
//! Upload: allow-list check, size check, AES-GCM with a fresh key, base64
//! body written through [`Storage`], AES secrets sealed with the current RSA
//! key. Download reverses this and yields the plaintext in fixed-size chunks.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::stream::{self, Stream};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::crypto::{
    aes_cipher_options, aes_decrypt, aes_encrypt, format_aes_secrets, parse_aes_secrets, CryptoError, CryptoService,
};
use crate::storage::{self, Storage, StorageError};

/// Accepted content types and the extension used for the stored file
pub const ALLOWED_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/heic", "heic"),
    ("application/pdf", "pdf"),
    ("application/msword", "doc"),
    ("application/vnd.openxmlformats-officedocument.wordprocessingml.document", "docx"),
    ("application/vnd.ms-excel", "xls"),
    ("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", "xlsx"),
    ("application/vnd.oasis.opendocument.text", "odt"),
    ("application/vnd.oasis.opendocument.spreadsheet", "ods"),
    ("text/plain", "txt"),
    ("text/csv", "csv"),
    ("audio/mpeg", "mp3"),
    ("audio/wav", "wav"),
    ("video/mp4", "mp4"),
    ("video/quicktime", "mov"),
];

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type UploadResult<T> = Result<T, UploadError>;

/// Where an encrypted body was written and how to open it again
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedFile {
    pub path: String,
    /// Sealed `key:iv:tag`, stored with the document metadata
    pub encryption_key: String,
    /// Size of the stored (base64) body
    pub encrypted_bytes: usize,
}

/// Strip parameters and case from a Content-Type header value
pub fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Extension for an allowed content type
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let normalized = normalize_content_type(content_type);
    ALLOWED_TYPES
        .iter()
        .find(|(mime, _)| *mime == normalized)
        .map(|(_, ext)| *ext)
}

pub struct UploadHandler {
    crypto: Arc<CryptoService>,
    storage: Arc<dyn Storage>,
    max_bytes: usize,
    key_bits: usize,
    chunk_size: usize,
}

impl UploadHandler {
    pub fn new(crypto: Arc<CryptoService>, storage: Arc<dyn Storage>, config: &UploadConfig) -> Self {
        Self {
            crypto,
            storage,
            max_bytes: config.max_upload_bytes,
            key_bits: config.aes_key_bits,
            chunk_size: config.chunk_size.max(1),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Encrypt and store `data`, returning the plaintext size and where it went
    pub async fn process_upload(
        &self,
        filename: &str,
        content_type: &str,
        data: &[u8],
        destination_dir: &str,
    ) -> UploadResult<(usize, SealedFile)> {
        let extension = extension_for(content_type)
            .ok_or_else(|| UploadError::UnsupportedMediaType(normalize_content_type(content_type)))?;

        if data.len() > self.max_bytes {
            return Err(UploadError::PayloadTooLarge {
                size: data.len(),
                limit: self.max_bytes,
            });
        }

        let mut options = aes_cipher_options(self.key_bits)?;
        let (_tag, ciphertext) = aes_encrypt(&mut options, data)?;
        let body = STANDARD.encode(ciphertext);

        let path = storage::join(destination_dir, &stored_name(filename, extension));
        self.storage.save(&path, body.as_bytes()).await?;

        let encryption_key = match self.crypto.seal(format_aes_secrets(&options).as_bytes()) {
            Ok(sealed) => sealed,
            Err(err) => {
                // Without the sealed key the body is unreadable
                self.storage.delete(&path).await?;
                return Err(err.into());
            }
        };

        info!("Stored encrypted upload {} ({} bytes)", path, data.len());
        Ok((
            data.len(),
            SealedFile {
                path,
                encryption_key,
                encrypted_bytes: body.len(),
            },
        ))
    }

    /// Decrypt the stored body at `path` into a chunked sequence
    pub async fn stream(&self, path: &str, encryption_key: &str) -> UploadResult<DocumentStream> {
        let body = self.storage.open(path).await?;
        let options = parse_aes_secrets(&self.crypto.unseal_string(encryption_key)?)?;
        let ciphertext = STANDARD
            .decode(&body)
            .map_err(|_| CryptoError::Decryption(format!("stored body of {} is not base64", path)))?;
        let plaintext = aes_decrypt(&options.key, &options.iv, &options.tag, &ciphertext)?;

        debug!("Decrypted {} ({} bytes)", path, plaintext.len());
        Ok(DocumentStream::new(plaintext, self.chunk_size))
    }

    pub async fn delete(&self, path: &str) -> UploadResult<()> {
        self.storage.delete(path).await?;
        Ok(())
    }
}

/// Collision-resistant stored name: hash of a fresh id and the original name
fn stored_name(original: &str, extension: &str) -> String {
    let digest = Sha256::digest(format!("{}:{}", Uuid::new_v4(), original).as_bytes());
    format!("{}.{}", hex::encode(digest), extension)
}

/// Single-pass sequence of plaintext chunks. The last chunk may be short.
#[derive(Debug)]
pub struct DocumentStream {
    data: Vec<u8>,
    offset: usize,
    chunk_size: usize,
}

impl DocumentStream {
    fn new(data: Vec<u8>, chunk_size: usize) -> Self {
        Self {
            data,
            offset: 0,
            chunk_size,
        }
    }

    /// Total plaintext length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_stream(self) -> impl Stream<Item = Vec<u8>> + Send {
        stream::iter(self)
    }
}

impl Iterator for DocumentStream {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }
        let end = (self.offset + self.chunk_size).min(self.data.len());
        let chunk = self.data[self.offset..end].to_vec();
        self.offset = end;
        Some(chunk)
    }
}
