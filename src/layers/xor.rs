//! Repeating key XOR.

use super::{LayerError, Result};
use crate::memory::Byte;

/// Xors `data` with `key`, repeating the key as often as needed. Applying
/// the same key twice restores the input.
pub fn apply(data: &[Byte], key: &[Byte]) -> Result<Vec<Byte>> {
    if key.is_empty() {
        return Err(LayerError::EmptyKey);
    }

    Ok(data
        .iter()
        .zip(key.iter().cycle())
        .map(|(byte, key)| byte ^ key)
        .collect())
}

/// Recovers the key bytes covered by a known plaintext. `plaintext` is
/// compared with the start of `ciphertext`; the result is as long as the
/// shorter of both and the caller has to cut it to the key length.
pub fn recover_key(ciphertext: &[Byte], plaintext: &[Byte]) -> Vec<Byte> {
    ciphertext
        .iter()
        .zip(plaintext)
        .map(|(cipher, plain)| cipher ^ plain)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::Result;

    #[test]
    fn test_apply_repeats_key() -> Result<()> {
        assert_eq!(
            apply(&[0x00, 0x00, 0x00, 0xFF, 0x0F], &[0x01, 0x02])?,
            vec![0x01, 0x02, 0x01, 0xFD, 0x0E]
        );

        Ok(())
    }

    #[test]
    fn test_apply_twice_restores() -> Result<()> {
        let key = b"secret key";
        let cipher = apply(b"==[ Layer 3/6: Symmetric Encryption ]==", key)?;
        assert_eq!(
            apply(&cipher, key)?,
            b"==[ Layer 3/6: Symmetric Encryption ]==".to_vec()
        );

        Ok(())
    }

    #[test]
    fn test_empty_key() {
        assert_eq!(apply(b"data", &[]), Err(LayerError::EmptyKey));
    }

    #[test]
    fn test_recover_key() -> Result<()> {
        let key = [0x6C, 0x24, 0x84, 0x8E];
        let cipher = apply(b"==[ Layer", &key)?;

        let recovered = recover_key(&cipher, b"==[ ");
        assert_eq!(recovered, key.to_vec());
        assert_eq!(apply(&cipher, &recovered)?, b"==[ Layer".to_vec());

        Ok(())
    }
}
