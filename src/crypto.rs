//! RSA confidentiality/authenticity primitives and the (unused-by-the-core)
//! symmetric helpers, implementing the contracts of spec §6.

use std::path::Path;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key as AeadKey, Nonce,
};
use rand::{CryptoRng, RngCore};
use rsa::{
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding},
    pss::{Signature, SigningKey, VerifyingKey},
    signature::{RandomizedSigner, SignatureEncoding, Verifier},
    Oaep, RsaPrivateKey, RsaPublicKey,
};
use sha2::Sha256;

use crate::error::{OramError, OramResult};

const RSA_KEY_BITS: usize = 4096;
const SYMMETRIC_KEY_LEN: usize = 32;
const SYMMETRIC_NONCE_LEN: usize = 12;

/// An RSA key pair used both for OAEP confidentiality and PSS signatures, as
/// spec §6 prescribes.
#[derive(Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generates a fresh RSA-4096 key pair (public exponent 65537, the `rsa`
    /// crate's default).
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> OramResult<Self> {
        let private = RsaPrivateKey::new(rng, RSA_KEY_BITS)?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Returns this pair's public half.
    pub fn public_key(&self) -> RsaPublicKey {
        self.public.clone()
    }

    /// Returns this pair's private half.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    fn key_path(dir: &Path, name: &str) -> std::path::PathBuf {
        dir.join(format!("{name}.pem"))
    }

    /// Loads a key pair from `dir/{priv_name,pub_name}.pem` if both files
    /// exist, otherwise generates a fresh pair and persists it there.
    /// Mirrors `generate_key_pair` in the original Python implementation.
    pub fn generate_or_load<R: RngCore + CryptoRng>(
        dir: &Path,
        priv_name: &str,
        pub_name: &str,
        rng: &mut R,
    ) -> OramResult<Self> {
        let priv_path = Self::key_path(dir, priv_name);
        let pub_path = Self::key_path(dir, pub_name);

        if priv_path.exists() && pub_path.exists() {
            let private = RsaPrivateKey::read_pkcs8_pem_file(&priv_path)?;
            let public = RsaPublicKey::read_public_key_pem_file(&pub_path)?;
            return Ok(Self { private, public });
        }

        std::fs::create_dir_all(dir)?;
        let pair = Self::generate(rng)?;
        pair.private.write_pkcs8_pem_file(&priv_path, LineEnding::LF)?;
        pair.public
            .write_public_key_pem_file(&pub_path, LineEnding::LF)?;
        Ok(pair)
    }
}

/// RSA-OAEP(SHA-256) encrypt under `pub_key`, as spec §4.4's encryption
/// discipline requires.
pub fn encrypt<R: RngCore + CryptoRng>(
    rng: &mut R,
    pub_key: &RsaPublicKey,
    message: &[u8],
) -> OramResult<Vec<u8>> {
    let padding = Oaep::new::<Sha256>();
    Ok(pub_key.encrypt(rng, padding, message)?)
}

/// RSA-OAEP(SHA-256) decrypt under `priv_key`.
pub fn decrypt(priv_key: &RsaPrivateKey, message: &[u8]) -> OramResult<Vec<u8>> {
    let padding = Oaep::new::<Sha256>();
    Ok(priv_key.decrypt(padding, message)?)
}

/// RSASSA-PSS(SHA-256) signature over `message`, produced with `priv_key`.
pub fn sign<R: RngCore + CryptoRng>(
    rng: &mut R,
    priv_key: &RsaPrivateKey,
    message: &[u8],
) -> Vec<u8> {
    let signing_key = SigningKey::<Sha256>::new(priv_key.clone());
    let signature = signing_key.sign_with_rng(rng, message);
    signature.to_bytes().to_vec()
}

/// Verifies `signature` over `message` under `pub_key`. Returns `false`
/// (never an error) on any verification failure, matching spec §4.4's
/// boolean `verify` contract.
pub fn verify(pub_key: &RsaPublicKey, message: &[u8], signature: &[u8]) -> bool {
    let verifying_key = VerifyingKey::<Sha256>::new(pub_key.clone());
    let Ok(signature) = Signature::try_from(signature) else {
        return false;
    };
    verifying_key.verify(message, &signature).is_ok()
}

/// A symmetric key, exposed for callers who want it but not consulted by the
/// ORAM protocol itself (spec §6: "Symmetric ... unused by the core but
/// exposed").
#[derive(Clone)]
pub struct SymmetricKey([u8; SYMMETRIC_KEY_LEN]);

impl SymmetricKey {
    /// Generates a fresh random symmetric key.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; SYMMETRIC_KEY_LEN];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Loads the key at `path` if present, else generates and persists one.
    pub fn load_or_generate<R: RngCore + CryptoRng>(path: &Path, rng: &mut R) -> OramResult<Self> {
        if path.exists() {
            let bytes = std::fs::read(path)?;
            let mut key = [0u8; SYMMETRIC_KEY_LEN];
            if bytes.len() != SYMMETRIC_KEY_LEN {
                return Err(OramError::InvalidArgument {
                    reason: format!("symmetric key file {path:?} has the wrong length"),
                });
            }
            key.copy_from_slice(&bytes);
            return Ok(Self(key));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let key = Self::generate(rng);
        std::fs::write(path, key.0)?;
        Ok(key)
    }
}

/// Encrypts `message` under `key`, returning `nonce || ciphertext`.
pub fn encrypt_symmetric<R: RngCore + CryptoRng>(
    rng: &mut R,
    key: &SymmetricKey,
    message: &[u8],
) -> OramResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(AeadKey::from_slice(&key.0));
    let mut nonce_bytes = [0u8; SYMMETRIC_NONCE_LEN];
    rng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let mut ciphertext = cipher.encrypt(nonce, message).map_err(|_| OramError::InvalidArgument {
        reason: "symmetric encryption failed".to_string(),
    })?;
    let mut out = nonce_bytes.to_vec();
    out.append(&mut ciphertext);
    Ok(out)
}

/// Decrypts a `nonce || ciphertext` blob produced by [`encrypt_symmetric`].
pub fn decrypt_symmetric(key: &SymmetricKey, message: &[u8]) -> OramResult<Vec<u8>> {
    if message.len() < SYMMETRIC_NONCE_LEN {
        return Err(OramError::InvalidArgument {
            reason: "symmetric ciphertext shorter than a nonce".to_string(),
        });
    }
    let (nonce_bytes, ciphertext) = message.split_at(SYMMETRIC_NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(AeadKey::from_slice(&key.0));
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| OramError::InvalidArgument {
            reason: "symmetric decryption failed".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let mut rng = StdRng::seed_from_u64(0);
        let pair = KeyPair::generate(&mut rng).unwrap();
        let message = b"hello;world";
        let ciphertext = encrypt(&mut rng, &pair.public_key(), message).unwrap();
        assert_ne!(ciphertext, message);
        let plaintext = decrypt(pair.private_key(), &ciphertext).unwrap();
        assert_eq!(plaintext, message);
    }

    #[test]
    fn sign_verify_roundtrip() {
        let mut rng = StdRng::seed_from_u64(1);
        let pair = KeyPair::generate(&mut rng).unwrap();
        let message = b"name;data";
        let signature = sign(&mut rng, pair.private_key(), message);
        assert!(verify(&pair.public_key(), message, &signature));
        assert!(!verify(&pair.public_key(), b"name;tampered", &signature));
    }

    #[test]
    fn generate_or_load_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(2);
        let dir = tempfile::tempdir().unwrap();
        let first = KeyPair::generate_or_load(dir.path(), "pr", "pb", &mut rng).unwrap();
        let second = KeyPair::generate_or_load(dir.path(), "pr", "pb", &mut rng).unwrap();
        let message = b"a;b";
        let ciphertext = encrypt(&mut rng, &first.public_key(), message).unwrap();
        let plaintext = decrypt(second.private_key(), &ciphertext).unwrap();
        assert_eq!(plaintext, message);
    }

    #[test]
    fn symmetric_roundtrip() {
        let mut rng = StdRng::seed_from_u64(3);
        let key = SymmetricKey::generate(&mut rng);
        let ciphertext = encrypt_symmetric(&mut rng, &key, b"payload").unwrap();
        let plaintext = decrypt_symmetric(&key, &ciphertext).unwrap();
        assert_eq!(plaintext, b"payload");
    }
}
