use base64::{Engine, engine::general_purpose::STANDARD};
use blowfish::{
    Blowfish,
    cipher::{BlockDecrypt, KeyInit, generic_array::GenericArray},
};
use keysweep_tcp_core::keysweep::KeyTester;

/// Plaintext searched for when none is configured.
pub const DEFAULT_PLAINTEXT: &str = "May good flourish; Kia hua ko te pai";

const BLOCK_SIZE: usize = 8;

/// Decodes the ciphertext of a grant, which travels as standard base64.
///
/// # Errors
///
/// Fails if `text` is not valid base64.
pub fn decode_ciphertext(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(text.trim())
}

/// Tests keys by Blowfish-ECB decryption with PKCS#5 padding.
///
/// A key matches when the ciphertext decrypts, unpads cleanly, and equals the
/// expected plaintext byte for byte.
#[derive(Debug, Clone)]
pub struct BlowfishTester {
    expected: Vec<u8>,
}

impl BlowfishTester {
    pub fn new(expected_plaintext: impl Into<String>) -> Self {
        Self {
            expected: expected_plaintext.into().into_bytes(),
        }
    }

    pub fn expected_plaintext(&self) -> &[u8] {
        &self.expected
    }

    /// Decrypts `ciphertext` under `key` and strips the padding.
    ///
    /// Returns `None` if the key length is not accepted by Blowfish (4 to 56
    /// bytes), the ciphertext is not a whole number of blocks, or the padding
    /// is invalid.
    pub fn decrypt(key: &[u8], ciphertext: &[u8]) -> Option<Vec<u8>> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return None;
        }

        let cipher: Blowfish = Blowfish::new_from_slice(key).ok()?;
        let mut plaintext = ciphertext.to_vec();
        for block in plaintext.chunks_exact_mut(BLOCK_SIZE) {
            cipher.decrypt_block(GenericArray::from_mut_slice(block));
        }

        let pad = usize::from(*plaintext.last()?);
        if pad == 0 || pad > BLOCK_SIZE || pad > plaintext.len() {
            return None;
        }
        let len = plaintext.len() - pad;
        if plaintext[len..].iter().any(|&b| usize::from(b) != pad) {
            return None;
        }

        plaintext.truncate(len);
        Some(plaintext)
    }
}

impl Default for BlowfishTester {
    fn default() -> Self {
        Self::new(DEFAULT_PLAINTEXT)
    }
}

impl KeyTester for BlowfishTester {
    fn is_match(&self, key: &[u8], ciphertext: &[u8]) -> bool {
        // Padding always adds one to eight bytes, so a ciphertext of any
        // other length cannot decrypt to the expected plaintext.
        let padded = (self.expected.len() / BLOCK_SIZE + 1) * BLOCK_SIZE;
        if ciphertext.len() != padded {
            return false;
        }

        Self::decrypt(key, ciphertext).is_some_and(|plaintext| plaintext == self.expected)
    }
}
