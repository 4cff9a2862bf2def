//!
//! Field level encryption for patient identifying data.
//!
//! Values are encrypted with AES-256-CBC (PKCS#7 padding) under a single key from
//! configuration. Every call uses a fresh random 16 byte IV, so equal plaintexts
//! never produce equal tokens. The stored token is `hex(iv) ":" hex(ciphertext)`.
//!
//! Decryption never fails a read. Values that are not tokens, or that cannot be
//! decrypted, are returned unchanged as a [`DecryptResult::FallbackRaw`].
//!
use crate::config::{EncryptConfig, ENCRYPTION_KEY_LENGTH};
use crate::error::EncryptError;
use crate::log::{DECRYPT, ENCRYPT};
use crate::prometheus::{
    DECRYPTED_VALUES_TOTAL, DECRYPTION_FALLBACK_TOTAL, ENCRYPTED_VALUES_TOTAL,
    ENCRYPTION_ERROR_TOTAL,
};
use aws_lc_rs::cipher::{
    DecryptionContext, EncryptionContext, PaddedBlockDecryptingKey, PaddedBlockEncryptingKey,
    UnboundCipherKey, AES_256,
};
use aws_lc_rs::iv::FixedLength;
use metrics::counter;
use std::fmt::{self, Debug, Display};
use tracing::{debug, warn};

pub const IV_LENGTH: usize = 16;
pub const TOKEN_SEPARATOR: char = ':';

///
/// Why a value was returned as stored instead of decrypted
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackReason {
    /// Not shaped like a token: plaintext written before encryption was enabled
    Unencrypted,
    /// Shaped like a token but the ciphertext, key or padding is wrong
    Undecryptable,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::Unencrypted => "unencrypted",
            FallbackReason::Undecryptable => "undecryptable",
        }
    }
}

impl Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecryptResult {
    Decrypted(String),
    FallbackRaw {
        value: String,
        reason: FallbackReason,
    },
}

impl DecryptResult {
    pub fn is_fallback(&self) -> bool {
        matches!(self, DecryptResult::FallbackRaw { .. })
    }

    pub fn value(&self) -> &str {
        match self {
            DecryptResult::Decrypted(value) => value,
            DecryptResult::FallbackRaw { value, .. } => value,
        }
    }

    pub fn into_value(self) -> String {
        match self {
            DecryptResult::Decrypted(value) => value,
            DecryptResult::FallbackRaw { value, .. } => value,
        }
    }

    ///
    /// The stored value is legacy plaintext and a candidate for `encrypt-legacy`
    ///
    pub fn is_unencrypted(&self) -> bool {
        matches!(
            self,
            DecryptResult::FallbackRaw {
                reason: FallbackReason::Unencrypted,
                ..
            }
        )
    }
}

#[derive(Clone)]
pub struct FieldCipher {
    key: [u8; ENCRYPTION_KEY_LENGTH],
}

impl FieldCipher {
    pub fn new(config: &EncryptConfig) -> Result<FieldCipher, EncryptError> {
        if !config.is_normalised() {
            warn!(
                target: ENCRYPT,
                msg = "Encryption key is not 32 bytes and has been padded or truncated"
            );
        }

        let key = config.key_bytes();

        // Fail on startup rather than on the first write
        UnboundCipherKey::new(&AES_256, &key).map_err(|_| EncryptError::InvalidKey)?;

        Ok(FieldCipher { key })
    }

    ///
    /// Encrypt a field value.
    /// Empty values are optional fields and pass through unchanged.
    ///
    pub fn encrypt(&self, plaintext: &str) -> Result<String, EncryptError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let iv: [u8; IV_LENGTH] = rand::random();

        let ciphertext = self.seal(plaintext, iv).inspect_err(|_| {
            counter!(ENCRYPTION_ERROR_TOTAL).increment(1);
        })?;

        counter!(ENCRYPTED_VALUES_TOTAL).increment(1);

        Ok(format!(
            "{}{TOKEN_SEPARATOR}{}",
            hex::encode(iv),
            hex::encode(ciphertext)
        ))
    }

    ///
    /// Decrypt a stored token.
    /// Never fails, undecryptable values are returned as stored.
    ///
    pub fn decrypt(&self, token: &str) -> DecryptResult {
        if token.is_empty() {
            return DecryptResult::Decrypted(String::new());
        }

        let Some((iv_hex, ciphertext_hex)) = token_parts(token) else {
            return fallback(token, FallbackReason::Unencrypted);
        };

        match self.open(iv_hex, ciphertext_hex) {
            Ok(plaintext) => {
                counter!(DECRYPTED_VALUES_TOTAL).increment(1);
                DecryptResult::Decrypted(plaintext)
            }
            Err(err) => {
                warn!(target: DECRYPT, msg = "Decryption failed, returning stored value", error = err);
                fallback(token, FallbackReason::Undecryptable)
            }
        }
    }

    fn seal(&self, plaintext: &str, iv: [u8; IV_LENGTH]) -> Result<Vec<u8>, EncryptError> {
        let key = UnboundCipherKey::new(&AES_256, &self.key)?;
        let key = PaddedBlockEncryptingKey::cbc_pkcs7(key)?;

        let mut in_out = plaintext.as_bytes().to_vec();
        key.less_safe_encrypt(&mut in_out, EncryptionContext::Iv128(FixedLength::from(iv)))?;

        Ok(in_out)
    }

    fn open(&self, iv_hex: &str, ciphertext_hex: &str) -> Result<String, &'static str> {
        let iv = hex::decode(iv_hex).map_err(|_| "IV is not hex encoded")?;
        let iv: [u8; IV_LENGTH] = iv.try_into().map_err(|_| "IV is not 16 bytes")?;

        let mut in_out = hex::decode(ciphertext_hex).map_err(|_| "Ciphertext is not hex encoded")?;

        let key = UnboundCipherKey::new(&AES_256, &self.key).map_err(|_| "Invalid key")?;
        let key = PaddedBlockDecryptingKey::cbc_pkcs7(key).map_err(|_| "Invalid key")?;

        let plaintext = key
            .decrypt(&mut in_out, DecryptionContext::Iv128(FixedLength::from(iv)))
            .map_err(|_| "Bad decrypt")?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| "Plaintext is not UTF-8")
    }
}

///
/// Split a value shaped like `hex(iv):hex(ciphertext)`.
/// The IV half must be exactly one block of hex, the ciphertext half non-empty hex.
///
fn token_parts(token: &str) -> Option<(&str, &str)> {
    let (iv, ciphertext) = token.split_once(TOKEN_SEPARATOR)?;
    let is_hex = |s: &str| s.bytes().all(|b| b.is_ascii_hexdigit());

    let shaped = iv.len() == IV_LENGTH * 2
        && is_hex(iv)
        && !ciphertext.is_empty()
        && is_hex(ciphertext);

    shaped.then_some((iv, ciphertext))
}

fn fallback(token: &str, reason: FallbackReason) -> DecryptResult {
    debug!(target: DECRYPT, msg = "Returning stored value", %reason);
    counter!(DECRYPTION_FALLBACK_TOTAL, "reason" => reason.as_str()).increment(1);

    DecryptResult::FallbackRaw {
        value: token.to_string(),
        reason,
    }
}

// Key material is never printed
impl Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}
