//! Encryption of staged draft artifacts.
//!
//! Every draft gets its own cipher password. Objects are stored as
//! `nonce (12 bytes) || AES-256-GCM ciphertext+tag`, with the key derived
//! from the password through HMAC-SHA256.

use crate::{Error, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_CONTEXT: &[u8] = b"updraft/draft-encryption/aes-256-gcm/v1";

/// Random hex string with `bytes` bytes of entropy.
pub fn random_secret(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

fn derive_key(password: &str) -> Result<[u8; 32]> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(password.as_bytes())
        .map_err(|e| Error::Crypto(e.to_string()))?;
    mac.update(KEY_CONTEXT);
    Ok(mac.finalize().into_bytes().into())
}

pub struct DraftCipher {
    cipher: Aes256Gcm,
}

impl DraftCipher {
    pub fn from_password(password: &str) -> Result<Self> {
        let key = derive_key(password)?;
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| Error::Crypto(e.to_string()))?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| Error::Crypto(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::Crypto("ciphertext too short".to_string()));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Crypto("draft could not be decrypted".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_decrypts_what_it_encrypts() {
        let cipher = DraftCipher::from_password("hunter2").unwrap();
        let sealed = cipher.encrypt(b"installer bytes").unwrap();
        assert_eq!(sealed.len(), NONCE_LEN + b"installer bytes".len() + TAG_LEN);
        assert_eq!(cipher.decrypt(&sealed).unwrap(), b"installer bytes");
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let cipher = DraftCipher::from_password("hunter2").unwrap();
        assert_ne!(cipher.encrypt(b"same").unwrap(), cipher.encrypt(b"same").unwrap());
    }

    #[test]
    fn test_wrong_password_fails() {
        let sealed = DraftCipher::from_password("right")
            .unwrap()
            .encrypt(b"payload")
            .unwrap();
        let other = DraftCipher::from_password("wrong").unwrap();
        assert_matches!(other.decrypt(&sealed), Err(Error::Crypto(_)));
    }

    #[test]
    fn test_truncated_input_fails() {
        let cipher = DraftCipher::from_password("pw").unwrap();
        assert_matches!(cipher.decrypt(&[0u8; 10]), Err(Error::Crypto(_)));
    }

    #[test]
    fn test_random_secret_is_hex() {
        let secret = random_secret(16);
        assert_eq!(secret.len(), 32);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, random_secret(16));
    }
}
