//! Persistent Ed25519 identity used to sign ephemeral session keys.
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ed25519_dalek::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    /// Load `<data_dir>/id_ed25519.pem`, or generate and persist a fresh
    /// keypair if it does not exist. A malformed file is fatal: it is never
    /// silently overwritten.
    pub fn load_or_create(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let key_path = key_path(data_dir);
        if key_path.exists() {
            let pem = std::fs::read_to_string(&key_path)
                .with_context(|| format!("reading {}", key_path.display()))?;
            let signing_key = SigningKey::from_pkcs8_pem(&pem).with_context(|| {
                format!(
                    "{} is not a valid PKCS8 Ed25519 key; refusing to overwrite it",
                    key_path.display()
                )
            })?;
            Ok(Self { signing_key })
        } else {
            let signing_key = SigningKey::generate(&mut OsRng);
            let pem = signing_key
                .to_pkcs8_pem(Default::default())
                .context("encoding identity key as PKCS8 PEM")?;
            std::fs::write(&key_path, pem.as_bytes())
                .with_context(|| format!("writing {}", key_path.display()))?;
            Ok(Self { signing_key })
        }
    }

    pub fn sign(&self, data: &[u8]) -> [u8; 64] {
        self.signing_key.sign(data).to_bytes()
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }
}

/// Verify a signature over `data` against a raw 32-byte public key, used
/// only when a pinned peer identity key is configured (see `secure_channel`).
pub fn verify(pinned_public_key: &[u8; 32], data: &[u8], signature: &[u8; 64]) -> Result<()> {
    let verifying_key = VerifyingKey::from_bytes(pinned_public_key)
        .context("invalid pinned public key bytes")?;
    let sig = Signature::from_bytes(signature);
    if verifying_key.verify_strict(data, &sig).is_err() {
        bail!("ephemeral key signature verification failed");
    }
    Ok(())
}

fn key_path(data_dir: &Path) -> PathBuf {
    data_dir.join("id_ed25519.pem")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_reload_yields_same_key() {
        let dir = tempdir();
        let id1 = Identity::load_or_create(&dir).unwrap();
        let id2 = Identity::load_or_create(&dir).unwrap();
        assert_eq!(id1.public_bytes(), id2.public_bytes());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let dir = tempdir();
        let id = Identity::load_or_create(&dir).unwrap();
        let msg = b"ephemeral-public-key-bytes";
        let sig = id.sign(msg);
        let pub_bytes = id.public_bytes();
        assert!(verify(&pub_bytes, msg, &sig).is_ok());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn malformed_key_file_is_fatal() {
        let dir = tempdir();
        std::fs::write(key_path(&dir), b"not a pem file").unwrap();
        assert!(Identity::load_or_create(&dir).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "fishare-identity-test-{:?}-{}",
            std::thread::current().id(),
            rand::random::<u64>()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
