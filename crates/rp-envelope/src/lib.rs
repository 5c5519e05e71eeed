//! Sealed envelopes for short-lived relying party state.
//!
//! An envelope is a transportable string of the form
//! `<label>.<ciphertext>.<nonce>`, each field base64url encoded without
//! padding. The payload is encrypted with AES-GCM; the label stays readable
//! but is authenticated as associated data, so it can serve as a domain
//! separation tag between different envelope uses.
//!
//! Keys live for the lifetime of the [`Sealer`] that holds them. An envelope
//! sealed by one process can only be opened by a sealer built from the same
//! key.

use aes_gcm::{
    Aes128Gcm, Aes256Gcm, AesGcm, KeyInit, Nonce,
    aead::{Aead, Payload, consts::U12},
    aes::Aes192,
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};
use thiserror::Error;

/// AES-GCM nonce length in bytes.
pub const NONCE_SIZE: usize = 12;

/// Key length used by [`Sealer::generate`].
pub const DEFAULT_KEY_SIZE: usize = 32;

const SEPARATOR: char = '.';

type Aes192Gcm = AesGcm<Aes192, U12>;

/// Reasons an envelope could not be sealed or opened.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Wrong number of fields; carries the count found.
    #[error("envelope must have exactly 3 '.'-separated fields, found {0}")]
    Format(usize),
    /// A field is not base64url, or the label is not UTF-8.
    #[error("envelope {0} field is not valid base64url")]
    Encoding(&'static str),
    /// Tag check failed; the envelope was altered or sealed under another key.
    #[error("envelope failed authentication")]
    Authentication,
    /// Key is not 16, 24 or 32 bytes.
    #[error("AES-GCM key must be 16, 24 or 32 bytes, got {0}")]
    KeyLength(usize),
    /// The OS random source failed.
    #[error("secure random source unavailable: {0}")]
    Entropy(String),
    /// The cipher refused to encrypt the payload.
    #[error("envelope encryption failed")]
    Encryption,
}

/// Label and payload recovered from an authenticated envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opened {
    /// Authenticated cleartext label.
    pub label: String,
    /// Decrypted payload.
    pub payload: Vec<u8>,
}

enum Cipher {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

impl Cipher {
    fn encrypt(&self, nonce: &Nonce<U12>, payload: Payload<'_, '_>) -> Result<Vec<u8>, aes_gcm::Error> {
        match self {
            Self::Aes128(c) => c.encrypt(nonce, payload),
            Self::Aes192(c) => c.encrypt(nonce, payload),
            Self::Aes256(c) => c.encrypt(nonce, payload),
        }
    }

    fn decrypt(&self, nonce: &Nonce<U12>, payload: Payload<'_, '_>) -> Result<Vec<u8>, aes_gcm::Error> {
        match self {
            Self::Aes128(c) => c.decrypt(nonce, payload),
            Self::Aes192(c) => c.decrypt(nonce, payload),
            Self::Aes256(c) => c.decrypt(nonce, payload),
        }
    }
}

/// Seals and opens envelopes under a single AES-GCM key.
///
/// A `Sealer` is immutable once built and safe to share between concurrent
/// requests.
pub struct Sealer {
    cipher: Cipher,
}

impl Sealer {
    /// Build a sealer around a fresh random 256-bit key.
    ///
    /// Envelopes produced by this sealer stop opening once it is dropped,
    /// which is the intended scope for state that only bridges a single
    /// redirect round trip.
    pub fn generate() -> Result<Self, EnvelopeError> {
        let mut key = [0u8; DEFAULT_KEY_SIZE];
        fill_random(&mut key)?;
        Self::from_key(&key)
    }

    /// Build a sealer from an existing AES key.
    ///
    /// The key length selects the cipher: 16 bytes for AES-128, 24 for
    /// AES-192 and 32 for AES-256.
    pub fn from_key(key: &[u8]) -> Result<Self, EnvelopeError> {
        let invalid = |_| EnvelopeError::KeyLength(key.len());
        let cipher = match key.len() {
            16 => Cipher::Aes128(Aes128Gcm::new_from_slice(key).map_err(invalid)?),
            24 => Cipher::Aes192(Aes192Gcm::new_from_slice(key).map_err(invalid)?),
            32 => Cipher::Aes256(Aes256Gcm::new_from_slice(key).map_err(invalid)?),
            other => return Err(EnvelopeError::KeyLength(other)),
        };
        Ok(Self { cipher })
    }

    /// Encrypt `payload` and bind `label` to it as associated data.
    ///
    /// Every call draws a new random nonce, so sealing the same input twice
    /// yields two different envelopes.
    pub fn seal(&self, label: &str, payload: &[u8]) -> Result<String, EnvelopeError> {
        let mut nonce = [0u8; NONCE_SIZE];
        fill_random(&mut nonce)?;

        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: payload,
                    aad: label.as_bytes(),
                },
            )
            .map_err(|_| EnvelopeError::Encryption)?;

        Ok(format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            URL_SAFE_NO_PAD.encode(label.as_bytes()),
            URL_SAFE_NO_PAD.encode(&ciphertext),
            URL_SAFE_NO_PAD.encode(nonce),
        ))
    }

    /// Authenticate and decrypt an envelope produced by [`Sealer::seal`].
    ///
    /// Nothing from the envelope is returned unless the AEAD tag verifies
    /// over both the ciphertext and the label.
    pub fn open(&self, envelope: &str) -> Result<Opened, EnvelopeError> {
        let fields: Vec<&str> = envelope.split(SEPARATOR).collect();
        let [label, ciphertext, nonce] = fields.as_slice() else {
            return Err(EnvelopeError::Format(fields.len()));
        };

        let label = decode_field(label, "label")?;
        let ciphertext = decode_field(ciphertext, "ciphertext")?;
        let nonce = decode_field(nonce, "nonce")?;

        // A truncated or padded nonce can never have been produced by `seal`.
        if nonce.len() != NONCE_SIZE {
            return Err(EnvelopeError::Authentication);
        }

        let payload = self
            .cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &ciphertext,
                    aad: &label,
                },
            )
            .map_err(|_| EnvelopeError::Authentication)?;

        // The label was authenticated above, so it is one `seal` accepted as &str.
        let label = String::from_utf8(label).map_err(|_| EnvelopeError::Encoding("label"))?;

        Ok(Opened { label, payload })
    }
}

impl std::fmt::Debug for Sealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cipher = match self.cipher {
            Cipher::Aes128(_) => "AES-128-GCM",
            Cipher::Aes192(_) => "AES-192-GCM",
            Cipher::Aes256(_) => "AES-256-GCM",
        };
        f.debug_struct("Sealer").field("cipher", &cipher).finish_non_exhaustive()
    }
}

fn decode_field(field: &str, name: &'static str) -> Result<Vec<u8>, EnvelopeError> {
    URL_SAFE_NO_PAD
        .decode(field)
        .map_err(|_| EnvelopeError::Encoding(name))
}

fn fill_random(buf: &mut [u8]) -> Result<(), EnvelopeError> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| EnvelopeError::Entropy(e.to_string()))
}
