//! Encryption-at-rest capability: AES-256 with a per-user key derived from
//! the service master secret and the owning user's id. Display names and
//! contact addresses are stored as ciphertext and only decrypted at the
//! moment of use.

use aes::Aes256;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit, generic_array::GenericArray};
use sha2::{Digest, Sha256};

use crate::error::{LifesignError, Result};
use crate::traits::Crypto;

const BLOCK_SIZE: usize = 16;

/// AES-based implementation of the [`Crypto`] capability.
pub struct AesCrypto {
    master_key: String,
}

impl AesCrypto {
    pub fn new(master_key: &str) -> Self {
        Self { master_key: master_key.to_string() }
    }

    /// Per-owner key: SHA-256 over master secret and owner id. A key
    /// mismatch surfaces as a padding or UTF-8 failure on decrypt.
    fn derive_key(&self, owner_id: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.master_key.as_bytes());
        hasher.update(b":");
        hasher.update(owner_id.as_bytes());
        hasher.finalize().into()
    }
}

impl Crypto for AesCrypto {
    fn encrypt(&self, plaintext: &str, owner_id: &str) -> Vec<u8> {
        let key = self.derive_key(owner_id);
        let cipher = Aes256::new(GenericArray::from_slice(&key));

        // PKCS7 padding
        let data = plaintext.as_bytes();
        let padding_len = BLOCK_SIZE - (data.len() % BLOCK_SIZE);
        let mut padded = data.to_vec();
        padded.extend(std::iter::repeat_n(padding_len as u8, padding_len));

        let mut encrypted = Vec::with_capacity(padded.len());
        for chunk in padded.chunks(BLOCK_SIZE) {
            let mut block = GenericArray::clone_from_slice(chunk);
            cipher.encrypt_block(&mut block);
            encrypted.extend_from_slice(&block);
        }
        encrypted
    }

    fn decrypt(&self, ciphertext: &[u8], owner_id: &str) -> Result<String> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(LifesignError::Decryption(
                "ciphertext is not block-aligned".into(),
            ));
        }

        let key = self.derive_key(owner_id);
        let cipher = Aes256::new(GenericArray::from_slice(&key));

        let mut decrypted = Vec::with_capacity(ciphertext.len());
        for chunk in ciphertext.chunks(BLOCK_SIZE) {
            let mut block = GenericArray::clone_from_slice(chunk);
            cipher.decrypt_block(&mut block);
            decrypted.extend_from_slice(&block);
        }

        let pad_len = *decrypted
            .last()
            .ok_or_else(|| LifesignError::Decryption("empty plaintext".into()))?
            as usize;
        let valid_padding = pad_len >= 1
            && pad_len <= BLOCK_SIZE
            && pad_len <= decrypted.len()
            && decrypted[decrypted.len() - pad_len..]
                .iter()
                .all(|&b| b == pad_len as u8);
        if !valid_padding {
            return Err(LifesignError::Decryption("invalid padding".into()));
        }
        decrypted.truncate(decrypted.len() - pad_len);

        String::from_utf8(decrypted)
            .map_err(|_| LifesignError::Decryption("plaintext is not valid UTF-8".into()))
    }
}
