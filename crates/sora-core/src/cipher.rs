//! Obfuscation cipher for the credentials file.
//!
//! The payload is XORed with a repeating 32-byte key and wrapped in standard
//! base64. The key is derived with PBKDF2-HMAC-SHA256 from a passphrase and
//! salt that are compiled into the binary.
//!
//! This is obfuscation, not encryption. Anyone holding the binary or the
//! source can derive the same key and read the file. It keeps the bot token
//! out of casual view and nothing more; do not treat it as a security
//! boundary.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Passphrase shared with the installer.
pub const MASTER_PASSPHRASE: &str = "sora_client_master_key";

/// Salt shared with the installer.
pub const KEY_SALT: &[u8] = b"sora_client_salt";

/// PBKDF2 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Derived key length (SHA-256 output size).
pub const KEY_LEN: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("invalid base64 payload: {0}")]
    InvalidEncoding(String),
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Key material for the XOR stream.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ObfuscationKey {
    bytes: [u8; KEY_LEN],
}

impl ObfuscationKey {
    /// Derive a key from an arbitrary passphrase and salt.
    pub fn derive(passphrase: &str, salt: &[u8]) -> Self {
        let mut bytes = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ITERATIONS, &mut bytes);
        Self { bytes }
    }

    /// Derive the key the installer uses.
    ///
    /// 100k PBKDF2 rounds are not free; derive once and keep the key.
    pub fn installer_default() -> Self {
        Self::derive(MASTER_PASSPHRASE, KEY_SALT)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for ObfuscationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ObfuscationKey(..)")
    }
}

/// Apply the repeating-key XOR stream. The operation is its own inverse.
pub fn xor_stream(data: &[u8], key: &ObfuscationKey) -> Vec<u8> {
    data.iter()
        .zip(key.bytes.iter().cycle())
        .map(|(byte, k)| byte ^ k)
        .collect()
}

/// XOR `plaintext` and encode the result as base64 text.
pub fn seal(plaintext: &[u8], key: &ObfuscationKey) -> String {
    BASE64.encode(xor_stream(plaintext, key))
}

/// Decode base64 text and reverse the XOR stream.
pub fn open(encoded: &str, key: &ObfuscationKey) -> Result<Vec<u8>, CipherError> {
    let raw = BASE64
        .decode(encoded.trim().as_bytes())
        .map_err(|e| CipherError::InvalidEncoding(e.to_string()))?;
    Ok(xor_stream(&raw, key))
}

/// Like [`open`], but also requires the plaintext to be UTF-8.
pub fn open_utf8(encoded: &str, key: &ObfuscationKey) -> Result<String, CipherError> {
    let bytes = open(encoded, key)?;
    String::from_utf8(bytes).map_err(|_| CipherError::InvalidUtf8)
}
