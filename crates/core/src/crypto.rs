//! AES-256-GCM master key for secrets at rest.
//!
//! Client secrets and encrypted config values are sealed with a long-lived
//! process key loaded from a protected file (32 raw bytes or 64 hex chars)
//! or generated on first run. Key material is zeroized on drop and never
//! appears in `Debug` output.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use std::io;
use std::path::Path;
use zeroize::Zeroize;

/// AES-256-GCM nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// AES-256-GCM authentication tag size in bytes.
const TAG_SIZE: usize = 16;

/// Minimum ciphertext size: nonce + tag (no plaintext).
const MIN_ENCRYPTED_LEN: usize = NONCE_SIZE + TAG_SIZE;

/// A 256-bit AES-GCM master key.
///
/// The inner key material is zeroized on drop.
pub struct MasterKey {
    cipher: Aes256Gcm,
    /// Kept for zeroize-on-drop; the cipher holds a copy internally,
    /// but we ensure the raw bytes are scrubbed from memory.
    raw: ZeroizeKey,
}

struct ZeroizeKey([u8; 32]);

impl Drop for ZeroizeKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

fn hex_decode(hex: &str) -> Result<Vec<u8>, String> {
    if hex.len() % 2 != 0 {
        return Err("odd-length hex string".to_string());
    }
    (0..hex.len() / 2)
        .map(|i| {
            u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|e| format!("invalid hex at position {}: {}", i * 2, e))
        })
        .collect()
}

impl MasterKey {
    fn from_bytes(bytes: [u8; 32]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(&bytes);
        let cipher = Aes256Gcm::new(key);
        Self {
            cipher,
            raw: ZeroizeKey(bytes),
        }
    }

    /// Create a master key from a 64-character hex string.
    pub fn from_hex(hex: &str) -> Result<Self, String> {
        let hex = hex.trim();
        if hex.len() != 64 {
            return Err(format!(
                "master key must be 64 hex characters (32 bytes), got {}",
                hex.len()
            ));
        }
        let decoded = hex_decode(hex)?;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&decoded);
        Ok(Self::from_bytes(bytes))
    }

    /// Load a master key from a file containing either 32 raw bytes or
    /// 64 hex characters (with optional trailing newline).
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let data = std::fs::read(path)?;

        if data.len() == 32 {
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(&data);
            return Ok(Self::from_bytes(bytes));
        }

        let hex = String::from_utf8(data).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "key file is not valid UTF-8 or raw 32 bytes",
            )
        })?;
        Self::from_hex(&hex).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Load the key from `path`, generating and persisting a fresh one when
    /// the file does not exist. The file is written owner-read-only.
    pub fn load_or_generate(path: &Path) -> io::Result<Self> {
        if path.exists() {
            return Self::from_file(path);
        }
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        std::fs::write(path, hex_encode(&bytes))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        tracing::info!("generated new master key at {}", path.display());
        Ok(Self::from_bytes(bytes))
    }

    /// Encrypt plaintext with a random nonce.
    ///
    /// Returns `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .expect("AES-GCM encryption should not fail");

        let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        output
    }

    /// Decrypt data produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        if data.len() < MIN_ENCRYPTED_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "encrypted data too short: {} bytes (minimum {})",
                    data.len(),
                    MIN_ENCRYPTED_LEN
                ),
            ));
        }
        let nonce = Nonce::from_slice(&data[..NONCE_SIZE]);
        let ciphertext = &data[NONCE_SIZE..];

        self.cipher.decrypt(nonce, ciphertext).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "decryption failed: wrong key or corrupted data",
            )
        })
    }

    /// Encrypt a string to hex for storage in a text column.
    pub fn encrypt_str(&self, plaintext: &str) -> String {
        hex_encode(&self.encrypt(plaintext.as_bytes()))
    }

    /// Decrypt a hex string produced by [`encrypt_str`](Self::encrypt_str).
    pub fn decrypt_str(&self, encoded: &str) -> io::Result<String> {
        let data = hex_decode(encoded)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let plaintext = self.decrypt(&data)?;
        String::from_utf8(plaintext)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "plaintext is not UTF-8"))
    }
}

// Prevent accidental debug-printing of key material
impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("algorithm", &"AES-256-GCM")
            .finish()
    }
}

#[allow(dead_code)]
fn _assert_raw_field_used(k: &MasterKey) {
    let _ = &k.raw;
}
