//! AES-256-CFB stream encryption and identity-based key derivation.
//!
//! Key derivation: SHA-256(package id) → 32-byte key.  There is no salt and
//! no passphrase: whoever knows the id can derive the key, and the id is
//! stored in clear inside the container metadata.  The scheme gives
//! tamper evidence through the stored hashes, not secrecy.
//!
//! Encryption: AES-256 in CFB128 mode with a fresh random 16-byte IV per
//! call.  Ciphertext is exactly as long as the plaintext (no padding) and
//! carries no authentication tag, so decrypting with the wrong key or IV
//! "succeeds" with garbage output.  Integrity is the verifier's job.

use aes::cipher::{AsyncStreamCipher, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Byte length of the derived AES-256 key.
pub const KEY_LEN: usize = 32;
/// Byte length of the CFB initialization vector.
pub const IV_LEN: usize = 16;

pub type Key = [u8; KEY_LEN];
pub type Iv = [u8; IV_LEN];

type Aes256CfbEnc = cfb_mode::Encryptor<aes::Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<aes::Aes256>;

/// Derive the payload key from a package id.  Pure and deterministic.
pub fn derive_key(id: &str) -> Key {
    Sha256::digest(id.as_bytes()).into()
}

/// Draw a fresh IV from the OS CSPRNG.
pub fn generate_iv() -> Iv {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Encrypt `plaintext` under a freshly generated IV.
///
/// Returns `(ciphertext, iv)`; the ciphertext has the same length as the
/// plaintext.
pub fn encrypt(key: &Key, plaintext: &[u8]) -> (Vec<u8>, Iv) {
    let iv = generate_iv();
    (encrypt_with_iv(key, &iv, plaintext), iv)
}

/// Encrypt with a caller-chosen IV.  Never reuse an IV under the same key.
pub fn encrypt_with_iv(key: &Key, iv: &Iv, plaintext: &[u8]) -> Vec<u8> {
    let mut buf = plaintext.to_vec();
    Aes256CfbEnc::new(key.into(), iv.into()).encrypt(&mut buf);
    buf
}

/// Decrypt a payload produced by [`encrypt`].
pub fn decrypt(key: &Key, iv: &Iv, ciphertext: &[u8]) -> Vec<u8> {
    let mut buf = ciphertext.to_vec();
    Aes256CfbDec::new(key.into(), iv.into()).decrypt(&mut buf);
    buf
}
