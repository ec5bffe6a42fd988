//! Ephemeral X25519 key agreement, Ed25519-signed, HKDF-derived session
//! key, and the resulting ChaCha20-Poly1305 AEAD stream.
//!
//! Grounded in the same shape as a Noise/secret-connection handshake: both
//! peers run the identical steps (no initiator distinction at this layer),
//! then hand the caller a symmetric seal/open primitive.
use std::io::{Read, Write};

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::Zeroizing;

use crate::error::{Result, TransferError};
use crate::identity::{self, Identity};

const HKDF_INFO: &[u8] = b"FIshare-key-v1";
const AAD: &[u8] = b"FIshare";

/// A ChaCha20-Poly1305 stream with independent monotonic send/receive
/// nonce counters. Any AEAD failure terminates the session; callers must
/// drop the channel (and close the connection) rather than continue.
pub struct SecureChannel {
    cipher: ChaCha20Poly1305,
    send_nonce: u64,
    recv_nonce: u64,
}

impl SecureChannel {
    /// Run the session key derivation protocol over an already-connected
    /// stream, then build the AEAD stream. `pinned_peer_key`, when present,
    /// requires the peer's ephemeral key signature to verify against it
    /// (see the conditional-verification open question in DESIGN.md).
    pub fn handshake<S: Read + Write>(
        stream: &mut S,
        identity: &Identity,
        pinned_peer_key: Option<&[u8; 32]>,
    ) -> Result<Self> {
        let my_secret = EphemeralSecret::random_from_rng(rand::rngs::OsRng);
        let my_public = PublicKey::from(&my_secret);
        let sig = identity.sign(my_public.as_bytes());

        write_framed(stream, my_public.as_bytes())?;
        write_framed(stream, &sig)?;

        let peer_pub_bytes = read_framed(stream, 32)?;
        let peer_sig_bytes = read_framed(stream, 64)?;

        let mut peer_pub_arr = [0u8; 32];
        peer_pub_arr.copy_from_slice(&peer_pub_bytes);
        let mut peer_sig_arr = [0u8; 64];
        peer_sig_arr.copy_from_slice(&peer_sig_bytes);

        if let Some(pinned) = pinned_peer_key {
            identity::verify(pinned, &peer_pub_arr, &peer_sig_arr)
                .map_err(|e| TransferError::crypto(e.to_string()))?;
        }

        let peer_public = PublicKey::from(peer_pub_arr);
        let shared = my_secret.diffie_hellman(&peer_public);

        let key = derive_key(shared.as_bytes())?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));

        Ok(Self {
            cipher,
            send_nonce: 0,
            recv_nonce: 0,
        })
    }

    /// Seal one message. The send counter increments only on success.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = nonce_from_counter(self.send_nonce);
        let out = self
            .cipher
            .encrypt(&nonce, Payload { msg: plaintext, aad: AAD })
            .map_err(|_| TransferError::crypto("AEAD encrypt failed"))?;
        self.send_nonce += 1;
        Ok(out)
    }

    /// Open one message. The receive counter increments only on success;
    /// a failure here means the session must be torn down.
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let nonce = nonce_from_counter(self.recv_nonce);
        let out = self
            .cipher
            .decrypt(&nonce, Payload { msg: ciphertext, aad: AAD })
            .map_err(|_| TransferError::crypto("AEAD decrypt failed (tamper or desync)"))?;
        self.recv_nonce += 1;
        Ok(out)
    }
}

fn nonce_from_counter(counter: u64) -> Nonce {
    let mut bytes = [0u8; 12];
    bytes[4..12].copy_from_slice(&counter.to_be_bytes());
    *Nonce::from_slice(&bytes)
}

fn derive_key(shared_secret: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    let hk = Hkdf::<Sha256>::new(None, shared_secret);
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(HKDF_INFO, &mut *okm)
        .map_err(|_| TransferError::crypto("HKDF expand failed"))?;
    Ok(okm)
}

fn write_framed<S: Write>(stream: &mut S, bytes: &[u8]) -> Result<()> {
    stream.write_all(&(bytes.len() as u16).to_be_bytes())?;
    stream.write_all(bytes)?;
    Ok(())
}

fn read_framed<S: Read>(stream: &mut S, expected_len: usize) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf)?;
    let len = u16::from_be_bytes(len_buf) as usize;
    if len != expected_len {
        return Err(TransferError::protocol(format!(
            "expected {expected_len}-byte frame, peer sent {len}"
        )));
    }
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn tempdir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "fishare-secure-channel-{label}-{}",
            rand::random::<u64>()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn handshake_over_loopback_then_encrypt_decrypt_round_trip() {
        let dir_a = tempdir("a");
        let dir_b = tempdir("b");
        let id_a = Identity::load_or_create(&dir_a).unwrap();
        let id_b = Identity::load_or_create(&dir_b).unwrap();

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = std::thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            SecureChannel::handshake(&mut sock, &id_b, None).unwrap()
        });

        let mut client_sock = std::net::TcpStream::connect(addr).unwrap();
        let mut channel_a = SecureChannel::handshake(&mut client_sock, &id_a, None).unwrap();
        let mut channel_b = handle.join().unwrap();

        let msg = b"hello across the wire";
        let sealed = channel_a.encrypt(msg).unwrap();
        let opened = channel_b.decrypt(&sealed).unwrap();
        assert_eq!(opened, msg);

        std::fs::remove_dir_all(&dir_a).ok();
        std::fs::remove_dir_all(&dir_b).ok();
    }

    #[test]
    fn nonce_counter_starts_at_zero_and_increments() {
        let dir = tempdir("nonce");
        let identity = Identity::load_or_create(&dir).unwrap();
        let key = derive_key(b"some shared secret bytes........").unwrap();
        let mut channel = SecureChannel {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&*key)),
            send_nonce: 0,
            recv_nonce: 0,
        };
        let _ = identity.public_bytes();
        assert_eq!(channel.send_nonce, 0);
        let c1 = channel.encrypt(b"one").unwrap();
        assert_eq!(channel.send_nonce, 1);
        let c2 = channel.encrypt(b"two").unwrap();
        assert_eq!(channel.send_nonce, 2);
        assert_ne!(c1, c2);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let key = derive_key(b"some shared secret bytes........").unwrap();
        let mut channel = SecureChannel {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&*key)),
            send_nonce: 0,
            recv_nonce: 0,
        };
        let mut sealed = channel.encrypt(b"message").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(channel.decrypt(&sealed).is_err());
    }

    #[test]
    fn read_framed_rejects_unexpected_length() {
        let mut cursor = Cursor::new(vec![0u8, 5, 1, 2, 3, 4, 5]);
        let result = read_framed(&mut cursor, 32);
        assert!(result.is_err());
    }
}
