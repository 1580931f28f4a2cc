//! Symmetric encryption of serialized table envelopes.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const IV_LEN: usize = 16;

/// Supported block ciphers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "aes-128-cbc")]
    Aes128Cbc,
    #[serde(rename = "aes-192-cbc")]
    Aes192Cbc,
    #[default]
    #[serde(rename = "aes-256-cbc")]
    Aes256Cbc,
}

impl Algorithm {
    /// Key size in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Algorithm::Aes128Cbc => 16,
            Algorithm::Aes192Cbc => 24,
            Algorithm::Aes256Cbc => 32,
        }
    }
}

/// Cipher bound to a key and IV derived from configuration strings.
#[derive(Clone)]
pub struct Cipher {
    algorithm: Algorithm,
    key: Vec<u8>,
    iv: Vec<u8>,
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl Cipher {
    pub fn new(algorithm: Algorithm, key: &str, iv: &str) -> Result<Self> {
        Ok(Self {
            algorithm,
            key: stretch(key, algorithm.key_len())?,
            iv: stretch(iv, IV_LEN)?,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Encrypt `text` and return the ciphertext as lowercase hex.
    pub fn encrypt(&self, text: &str) -> Result<String> {
        let data = text.as_bytes();
        let bytes = match self.algorithm {
            Algorithm::Aes128Cbc => cbc::Encryptor::<aes::Aes128>::new_from_slices(&self.key, &self.iv)
                .map_err(cipher_err)?
                .encrypt_padded_vec_mut::<Pkcs7>(data),
            Algorithm::Aes192Cbc => cbc::Encryptor::<aes::Aes192>::new_from_slices(&self.key, &self.iv)
                .map_err(cipher_err)?
                .encrypt_padded_vec_mut::<Pkcs7>(data),
            Algorithm::Aes256Cbc => cbc::Encryptor::<aes::Aes256>::new_from_slices(&self.key, &self.iv)
                .map_err(cipher_err)?
                .encrypt_padded_vec_mut::<Pkcs7>(data),
        };
        Ok(hex::encode(bytes))
    }

    /// Reverse of [`Cipher::encrypt`].
    pub fn decrypt(&self, hex_text: &str) -> Result<String> {
        let data = hex::decode(hex_text.trim()).map_err(cipher_err)?;
        let bytes = match self.algorithm {
            Algorithm::Aes128Cbc => cbc::Decryptor::<aes::Aes128>::new_from_slices(&self.key, &self.iv)
                .map_err(cipher_err)?
                .decrypt_padded_vec_mut::<Pkcs7>(&data),
            Algorithm::Aes192Cbc => cbc::Decryptor::<aes::Aes192>::new_from_slices(&self.key, &self.iv)
                .map_err(cipher_err)?
                .decrypt_padded_vec_mut::<Pkcs7>(&data),
            Algorithm::Aes256Cbc => cbc::Decryptor::<aes::Aes256>::new_from_slices(&self.key, &self.iv)
                .map_err(cipher_err)?
                .decrypt_padded_vec_mut::<Pkcs7>(&data),
        }
        .map_err(cipher_err)?;
        String::from_utf8(bytes).map_err(cipher_err)
    }
}

/// Repeat `secret` until it covers `len` bytes, then truncate.
fn stretch(secret: &str, len: usize) -> Result<Vec<u8>> {
    if secret.is_empty() {
        return Err(Error::Cipher("key material must not be empty".to_string()));
    }
    Ok(secret.bytes().cycle().take(len).collect())
}

fn cipher_err(e: impl std::fmt::Display) -> Error {
    Error::Cipher(e.to_string())
}
