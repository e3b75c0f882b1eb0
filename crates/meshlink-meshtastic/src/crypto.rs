//! Channel PSK decryption
//!
//! Gateways publish packets to MQTT with the channel payload still encrypted.
//! Meshtastic encrypts with AES-CTR; the 16-byte IV is the packet id
//! (little-endian) followed by the sender node id (little-endian) and eight
//! zero bytes. The PSK is distributed base64-encoded and is either a 16-byte
//! (AES-128) or 32-byte (AES-256) key.

use aes::{Aes128, Aes256};
use base64::Engine;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;

use crate::error::{MeshtasticError, Result};

type Aes128Ctr = Ctr128BE<Aes128>;
type Aes256Ctr = Ctr128BE<Aes256>;

/// A parsed channel pre-shared key
#[derive(Clone)]
pub struct ChannelKey {
    key: Vec<u8>,
}

impl ChannelKey {
    /// Parse a base64-encoded PSK as distributed in channel URLs
    pub fn from_base64(psk: &str) -> Result<Self> {
        let key = base64::engine::general_purpose::STANDARD
            .decode(psk.trim())
            .map_err(|e| MeshtasticError::InvalidPsk(e.to_string()))?;
        match key.len() {
            16 | 32 => Ok(Self { key }),
            other => Err(MeshtasticError::InvalidPsk(format!(
                "expected a 16 or 32 byte key, got {} bytes",
                other
            ))),
        }
    }

    /// Decrypt an encrypted packet payload in place of the mesh cipher
    pub fn decrypt(&self, packet_id: u32, from_node: u32, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let mut iv = [0u8; 16];
        iv[0..4].copy_from_slice(&packet_id.to_le_bytes());
        iv[4..8].copy_from_slice(&from_node.to_le_bytes());

        let mut buf = ciphertext.to_vec();
        match self.key.len() {
            16 => {
                let mut cipher = Aes128Ctr::new_from_slices(&self.key, &iv)
                    .map_err(|e| MeshtasticError::InvalidPsk(e.to_string()))?;
                cipher.apply_keystream(&mut buf);
            }
            32 => {
                let mut cipher = Aes256Ctr::new_from_slices(&self.key, &iv)
                    .map_err(|e| MeshtasticError::InvalidPsk(e.to_string()))?;
                cipher.apply_keystream(&mut buf);
            }
            _ => unreachable!("key length validated at construction"),
        }
        Ok(buf)
    }
}

impl std::fmt::Debug for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log key material
        write!(f, "ChannelKey({} bytes)", self.key.len())
    }
}
