use crate::config::{Config, EncConfig, KdfParams, TokenDefaults};
use anyhow::anyhow;
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{Engine as _, engine::general_purpose};
use chacha20poly1305::{
    KeyInit, XChaCha20Poly1305, XNonce,
    aead::{Aead, AeadCore, OsRng},
};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

pub type MasterKey = Zeroizing<[u8; 32]>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid master password")]
    InvalidMasterPassword,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Generate a random master key, wrap it with a key derived from the
/// master password and return the resulting config.
pub fn generate_new_config(master_password: &str) -> anyhow::Result<Config> {
    let mut mk = Zeroizing::new([0u8; 32]);
    rand::thread_rng().fill_bytes(&mut mk[..]);

    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);

    let kdf = KdfParams {
        algo: "argon2id".to_string(),
        memory_mib: 32,
        iterations: 3,
        parallelism: 1,
        salt: general_purpose::STANDARD.encode(salt_bytes),
    };

    let kek = derive_kek(master_password, &kdf)?;
    let (nonce_b64, ct_b64) = seal(&kek, &mk[..])?;

    Ok(Config {
        version: 1,
        kdf,
        enc: EncConfig {
            algo: "xchacha20-poly1305".to_string(),
            master_key_nonce: nonce_b64,
            encrypted_master_key: ct_b64,
        },
        defaults: TokenDefaults::default(),
    })
}

pub fn unlock_master_key(master_password: &str, cfg: &Config) -> Result<MasterKey, CryptoError> {
    let kek = derive_kek(master_password, &cfg.kdf)?;
    let plaintext = open(&kek, &cfg.enc.master_key_nonce, &cfg.enc.encrypted_master_key)
        .map_err(|_| CryptoError::InvalidMasterPassword)?;
    master_key_from_slice(&plaintext).map_err(CryptoError::Other)
}

pub fn master_key_from_slice(bytes: &[u8]) -> anyhow::Result<MasterKey> {
    if bytes.len() != 32 {
        return Err(anyhow!("invalid master key length"));
    }
    let mut mk = Zeroizing::new([0u8; 32]);
    mk.copy_from_slice(bytes);
    Ok(mk)
}

/// Argon2id key-encryption key.
fn derive_kek(master_password: &str, kdf: &KdfParams) -> anyhow::Result<MasterKey> {
    let salt_bytes = general_purpose::STANDARD.decode(&kdf.salt)?;

    let params = Params::new(kdf.memory_mib * 1024, kdf.iterations, kdf.parallelism, Some(32))
        .map_err(|e| anyhow!("argon2 params error: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut out = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(master_password.as_bytes(), &salt_bytes, &mut out[..])
        .map_err(|e| anyhow!("argon2 error: {e}"))?;
    Ok(out)
}

/// Encrypt with a fresh 24-byte nonce. Returns (nonce_b64, ciphertext_b64).
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> anyhow::Result<(String, String)> {
    let cipher = XChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| anyhow!("encrypt error: {e}"))?;

    Ok((
        general_purpose::STANDARD.encode(nonce),
        general_purpose::STANDARD.encode(ciphertext),
    ))
}

pub fn open(key: &[u8; 32], nonce_b64: &str, ct_b64: &str) -> anyhow::Result<Zeroizing<Vec<u8>>> {
    let cipher = XChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key));

    let nonce_bytes = general_purpose::STANDARD.decode(nonce_b64)?;
    if nonce_bytes.len() != 24 {
        return Err(anyhow!("invalid nonce length"));
    }
    let ciphertext = general_purpose::STANDARD.decode(ct_b64)?;

    let plaintext = cipher
        .decrypt(XNonce::from_slice(&nonce_bytes), ciphertext.as_ref())
        .map_err(|e| anyhow!("decrypt error: {e}"))?;
    Ok(Zeroizing::new(plaintext))
}
