use crate::{Error, Result};

/// Smallest supported key width in bytes (32-bit keys).
pub const MIN_KEY_WIDTH: usize = 4;

/// Largest supported key width in bytes (448-bit keys, the Blowfish maximum).
pub const MAX_KEY_WIDTH: usize = 56;

/// The set of candidate keys for a run.
///
/// A key-space of `key_width` bytes holds `2^(8 * key_width)` keys. Keys are
/// indexed as `u128`, so for widths of 16 bytes and more the total saturates
/// at [`u128::MAX`]; such a space can never be exhausted in practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeySpace {
    key_width: usize,
    total_keys: u128,
}

impl KeySpace {
    /// Creates the key-space for keys of `key_width` bytes.
    ///
    /// Widths below [`MIN_KEY_WIDTH`] are raised to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyWidthTooLarge`] if `key_width` exceeds
    /// [`MAX_KEY_WIDTH`].
    pub fn new(key_width: usize) -> Result<Self> {
        if key_width > MAX_KEY_WIDTH {
            return Err(Error::KeyWidthTooLarge {
                width: key_width,
                max: MAX_KEY_WIDTH,
            });
        }

        let key_width = key_width.max(MIN_KEY_WIDTH);
        let bits = 8 * key_width as u32;
        let total_keys = if bits >= u128::BITS {
            u128::MAX
        } else {
            1 << bits
        };

        Ok(Self {
            key_width,
            total_keys,
        })
    }

    /// Restricts the space to its first `total_keys` keys.
    ///
    /// Useful for searching a known-small prefix of a wide key-space. A limit
    /// larger than the current total has no effect.
    #[must_use]
    pub const fn truncated(self, total_keys: u128) -> Self {
        Self {
            key_width: self.key_width,
            total_keys: if total_keys < self.total_keys {
                total_keys
            } else {
                self.total_keys
            },
        }
    }

    /// Width of a single key in bytes.
    pub const fn key_width(&self) -> usize {
        self.key_width
    }

    /// Number of keys in the space.
    pub const fn total_keys(&self) -> u128 {
        self.total_keys
    }

    /// Writes `key` as a big-endian, `key_width`-byte string into `buf`.
    ///
    /// # Panics
    ///
    /// Panics if `buf.len() != self.key_width()`.
    pub fn encode_key(&self, key: u128, buf: &mut [u8]) {
        assert_eq!(buf.len(), self.key_width, "key buffer has the wrong width");

        let bytes = key.to_be_bytes();
        if self.key_width >= bytes.len() {
            let pad = self.key_width - bytes.len();
            buf[..pad].fill(0);
            buf[pad..].copy_from_slice(&bytes);
        } else {
            buf.copy_from_slice(&bytes[bytes.len() - self.key_width..]);
        }
    }

    /// Returns the `key_width`-byte big-endian encoding of `key`.
    pub fn key_bytes(&self, key: u128) -> Vec<u8> {
        let mut buf = vec![0; self.key_width];
        self.encode_key(key, &mut buf);
        buf
    }

    /// Lowercase hexadecimal rendering of [`Self::key_bytes`].
    pub fn key_hex(&self, key: u128) -> String {
        hex::encode(self.key_bytes(key))
    }
}

/// What a run is searching for: an opaque ciphertext and the key-space its
/// key belongs to.
///
/// Set once when the allocator starts and handed to every worker with each
/// chunk grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    key_space: KeySpace,
    ciphertext: String,
}

impl Target {
    pub fn new(key_space: KeySpace, ciphertext: impl Into<String>) -> Self {
        Self {
            key_space,
            ciphertext: ciphertext.into(),
        }
    }

    pub const fn key_space(&self) -> KeySpace {
        self.key_space
    }

    pub const fn key_width(&self) -> usize {
        self.key_space.key_width
    }

    /// The ciphertext exactly as supplied to the allocator.
    pub fn ciphertext(&self) -> &str {
        &self.ciphertext
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_byte_keys_span_two_to_the_thirty_two() {
        let space = KeySpace::new(4).unwrap();
        assert_eq!(space.key_width(), 4);
        assert_eq!(space.total_keys(), 1 << 32);
    }

    #[test]
    fn narrow_widths_are_raised_to_the_minimum() {
        let space = KeySpace::new(1).unwrap();
        assert_eq!(space.key_width(), MIN_KEY_WIDTH);
        assert_eq!(space, KeySpace::new(0).unwrap());
    }

    #[test]
    fn wide_key_spaces_saturate() {
        assert_eq!(KeySpace::new(15).unwrap().total_keys(), 1 << 120);
        assert_eq!(KeySpace::new(16).unwrap().total_keys(), u128::MAX);
        assert_eq!(KeySpace::new(56).unwrap().total_keys(), u128::MAX);
    }

    #[test]
    fn rejects_widths_beyond_blowfish() {
        assert_eq!(
            KeySpace::new(57),
            Err(Error::KeyWidthTooLarge { width: 57, max: 56 })
        );
    }

    #[test]
    fn truncation_only_shrinks() {
        let space = KeySpace::new(4).unwrap();
        assert_eq!(space.truncated(16).total_keys(), 16);
        assert_eq!(space.truncated(u128::MAX).total_keys(), 1 << 32);
        assert_eq!(space.truncated(16).key_width(), 4);
    }

    #[test]
    fn keys_encode_big_endian_at_full_width() {
        let space = KeySpace::new(4).unwrap();
        assert_eq!(space.key_bytes(0x0102_0304), vec![1, 2, 3, 4]);
        assert_eq!(space.key_hex(123_456), "0001e240");

        let wide = KeySpace::new(20).unwrap();
        let bytes = wide.key_bytes(0xff);
        assert_eq!(bytes.len(), 20);
        assert!(bytes[..19].iter().all(|&b| b == 0));
        assert_eq!(bytes[19], 0xff);
    }
}
