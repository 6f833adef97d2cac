//! Adobe flavoured ASCII85.
//!
//! Four bytes are read as a big endian number and written as five base 85
//! digits in `!`..`u`. A group of four zero bytes is written as `z`. A final
//! partial group is padded with zeros when encoding (with `u` when decoding)
//! and the padding is cut off again. A final group needs at least two
//! characters to carry a byte.

use super::{LayerError, Result};
use crate::memory::Byte;

const FIRST_DIGIT: u8 = b'!';
const LAST_DIGIT: u8 = b'u';

/// Encodes `data`, delimited by `<~` and `~>`
pub fn encode(data: &[Byte]) -> String {
    let mut text = String::with_capacity(4 + data.len() / 4 * 5 + 5);
    text.push_str("<~");

    for chunk in data.chunks(4) {
        let mut block = [0; 4];
        block[..chunk.len()].copy_from_slice(chunk);
        let mut value = u32::from_be_bytes(block);

        if value == 0 && chunk.len() == 4 {
            text.push('z');
            continue;
        }

        let mut digits = [0; 5];
        for digit in digits.iter_mut().rev() {
            *digit = (value % 85) as u8 + FIRST_DIGIT;
            value /= 85;
        }

        text.extend(digits[..chunk.len() + 1].iter().map(|digit| *digit as char));
    }

    text.push_str("~>");
    text
}

/// Decodes ASCII85 text. The `<~` and `~>` delimiters are optional and
/// whitespace is ignored. Positions in errors are byte offsets into the text
/// between the delimiters.
pub fn decode(text: &str) -> Result<Vec<Byte>> {
    let text = text.trim();
    let text = text.strip_prefix("<~").unwrap_or(text);
    let text = text.strip_suffix("~>").unwrap_or(text);

    let mut data = Vec::with_capacity(text.len() / 5 * 4 + 4);
    let mut value: u64 = 0;
    let mut count = 0;
    let mut group_start = 0;

    for (position, character) in text.char_indices() {
        if character.is_whitespace() {
            continue;
        }

        match character {
            'z' if count == 0 => data.extend_from_slice(&[0; 4]),
            '!'..='u' => {
                if count == 0 {
                    group_start = position;
                }
                value = value * 85 + u64::from(character as u8 - FIRST_DIGIT);
                count += 1;

                if count == 5 {
                    data.extend_from_slice(&block(value, position)?);
                    value = 0;
                    count = 0;
                }
            }
            _ => {
                return Err(LayerError::InvalidCharacter {
                    character,
                    position,
                })
            }
        }
    }

    if count == 1 {
        return Err(LayerError::TruncatedGroup {
            position: group_start,
        });
    }

    if count > 0 {
        let padding = 5 - count;
        for _ in 0..padding {
            value = value * 85 + u64::from(LAST_DIGIT - FIRST_DIGIT);
        }

        let bytes = block(value, text.len())?;
        data.extend_from_slice(&bytes[..4 - padding]);
    }

    Ok(data)
}

fn block(value: u64, position: usize) -> Result<[Byte; 4]> {
    if value > u64::from(u32::MAX) {
        return Err(LayerError::GroupOverflow { position });
    }

    Ok((value as u32).to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::Result;

    const PHRASES: &[(&str, &str)] = &[
        ("Hello", "<~87cURDZ~>"),
        ("How are you?", r"<~88i\p@<,p%H#Igi~>"),
        ("I'm fine", "<~8LJ?tAnc-o~>"),
    ];

    #[test]
    fn test_encode() {
        for (plain, encoded) in PHRASES {
            assert_eq!(encode(plain.as_bytes()), *encoded);
        }
    }

    #[test]
    fn test_decode() -> Result<()> {
        for (plain, encoded) in PHRASES {
            assert_eq!(decode(encoded)?, plain.as_bytes());
        }

        Ok(())
    }

    #[test]
    fn test_zero_groups() -> Result<()> {
        assert_eq!(encode(&[0, 0, 0, 0, b'a', b'b']), "<~z@:B~>");
        assert_eq!(decode("<~z@:B~>")?, vec![0, 0, 0, 0, b'a', b'b']);
        // a partial zero group is not abbreviated
        assert_eq!(encode(&[0, 0]), "<~!!!~>");

        Ok(())
    }

    #[test]
    fn test_decode_ignores_whitespace_and_delimiters() -> Result<()> {
        assert_eq!(decode("  87c\nURD \r\n Z ")?, b"Hello".to_vec());

        Ok(())
    }

    #[test]
    fn test_decode_rejects_invalid_characters() {
        assert_eq!(
            decode("<~87cvRDZ~>"),
            Err(LayerError::InvalidCharacter {
                character: 'v',
                position: 3
            })
        );
        // `z` is only allowed at the start of a group
        assert_eq!(
            decode("87zRD"),
            Err(LayerError::InvalidCharacter {
                character: 'z',
                position: 2
            })
        );
    }

    #[test]
    fn test_decode_rejects_overflow() -> Result<()> {
        assert_eq!(decode("s8W-!")?, vec![0xFF; 4]);
        assert_eq!(
            decode("s8W-\""),
            Err(LayerError::GroupOverflow { position: 4 })
        );

        Ok(())
    }

    #[test]
    fn test_decode_rejects_single_character_group() -> Result<()> {
        assert_eq!(
            decode("<~87cURD~>"),
            Err(LayerError::TruncatedGroup { position: 5 })
        );
        assert_eq!(decode("D"), Err(LayerError::TruncatedGroup { position: 0 }));
        // two characters still carry one byte
        assert_eq!(decode("<~87cURD]~>")?, b"Hello".to_vec());

        Ok(())
    }

    #[test]
    fn test_binary_data() -> Result<()> {
        let data: Vec<Byte> = (0..=255).rev().collect();
        assert_eq!(decode(&encode(&data))?, data);

        Ok(())
    }
}
