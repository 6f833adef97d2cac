//! Decoders for the layers wrapped around the program image.
//!
//! Every layer is a text document whose payload sits between `<~` and `~>`
//! as ASCII85. Peeling a layer decodes the ASCII85 payload and then applies
//! the layer's own transform to it.

use std::error;
use std::fmt;

use crate::memory::Byte;

use self::packet::PacketFilter;

pub mod ascii85;
pub mod bitwise;
pub mod packet;
pub mod parity;
pub mod xor;

/// Errors of the layer transforms
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerError {
    /// The document has no `<~ ... ~>` payload
    MissingPayload,
    /// A character that is not part of the ASCII85 alphabet
    InvalidCharacter { character: char, position: usize },
    /// A five character group that encodes more than 32 bits
    GroupOverflow { position: usize },
    /// A final ASCII85 group of a single character, which holds no whole byte
    TruncatedGroup { position: usize },
    /// An XOR key without bytes
    EmptyKey,
    /// A packet that ends before its headers or payload do
    TruncatedPacket { offset: usize, needed: usize, available: usize },
    /// A packet header with a length field that cannot be right
    InvalidLength { offset: usize, field: &'static str, value: u16 },
}

impl fmt::Display for LayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerError::MissingPayload => f.write_str("no `<~ ... ~>` payload found"),
            LayerError::InvalidCharacter {
                character,
                position,
            } => write!(f, "invalid ASCII85 character {:?} at {}", character, position),
            LayerError::GroupOverflow { position } => {
                write!(f, "ASCII85 group ending at {} exceeds 32 bits", position)
            }
            LayerError::TruncatedGroup { position } => {
                write!(f, "ASCII85 group at {} has a single character", position)
            }
            LayerError::EmptyKey => f.write_str("the XOR key is empty"),
            LayerError::TruncatedPacket {
                offset,
                needed,
                available,
            } => write!(
                f,
                "packet at {} needs {} bytes, only {} available",
                offset, needed, available
            ),
            LayerError::InvalidLength {
                offset,
                field,
                value,
            } => write!(f, "packet at {} has invalid {} {}", offset, field, value),
        }
    }
}

impl error::Error for LayerError {}

pub type Result<T, E = LayerError> = std::result::Result<T, E>;

/// The transform applied to a layer after its ASCII85 payload is decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    /// The payload is used as is
    Ascii85,
    /// Every byte is xored with `0x55` and rotated right by one bit
    Bitwise,
    /// Bytes with a wrong parity bit are dropped, the rest carry 7 bits each
    Parity,
    /// The payload is xored with a repeating key
    Xor(Vec<Byte>),
    /// The payload is a stream of IPv4/UDP packets; valid ones are kept
    Packet(PacketFilter),
}

impl Layer {
    pub fn name(&self) -> &'static str {
        match self {
            Layer::Ascii85 => "ascii85",
            Layer::Bitwise => "bitwise",
            Layer::Parity => "parity",
            Layer::Xor(_) => "xor",
            Layer::Packet(_) => "packet",
        }
    }

    /// Applies the layer transform to an already ASCII85 decoded payload
    pub fn decode(&self, payload: &[Byte]) -> Result<Vec<Byte>> {
        match self {
            Layer::Ascii85 => Ok(payload.to_vec()),
            Layer::Bitwise => Ok(bitwise::decode(payload)),
            Layer::Parity => Ok(parity::decode(payload)),
            Layer::Xor(key) => xor::apply(payload, key),
            Layer::Packet(filter) => packet::decode(payload, filter),
        }
    }
}

/// Returns the payload of a layer document, from the first `<~` to the last
/// `~>`, delimiters included
pub fn extract_payload(text: &str) -> Result<&str> {
    let start = text.find("<~").ok_or(LayerError::MissingPayload)?;
    let end = text.rfind("~>").ok_or(LayerError::MissingPayload)?;

    if end < start + 2 {
        return Err(LayerError::MissingPayload);
    }

    Ok(&text[start..end + 2])
}

/// Decodes the payload of a layer document
pub fn peel(text: &str, layer: &Layer) -> Result<Vec<Byte>> {
    let payload = ascii85::decode(extract_payload(text)?)?;
    let decoded = layer.decode(&payload)?;

    log::info!(
        "Peeled {} layer: {} payload bytes -> {} bytes",
        layer.name(),
        payload.len(),
        decoded.len()
    );

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::Result;

    #[test]
    fn test_extract_payload() -> Result<()> {
        let text = "==[ Layer ]==\n\nSome text with ~> in it\n<~87cU\nRDZ~>\n";
        assert_eq!(extract_payload(text)?, "<~87cU\nRDZ~>");

        Ok(())
    }

    #[test]
    fn test_missing_payload() {
        assert_eq!(extract_payload("no payload"), Err(LayerError::MissingPayload));
        assert_eq!(extract_payload("~> <~"), Err(LayerError::MissingPayload));
        assert_eq!(extract_payload("<~>"), Err(LayerError::MissingPayload));
    }

    #[test]
    fn test_peel_ascii85() -> Result<()> {
        let text = "Layer 0\n\n<~87cURDZ~>";
        assert_eq!(peel(text, &Layer::Ascii85)?, b"Hello".to_vec());

        Ok(())
    }

    #[test]
    fn test_peel_bitwise() -> Result<()> {
        let encoded = bitwise::encode(b"onion");
        let text = format!("header\n{}\n", ascii85::encode(&encoded));

        assert_eq!(peel(&text, &Layer::Bitwise)?, b"onion".to_vec());

        Ok(())
    }

    #[test]
    fn test_peel_xor() -> Result<()> {
        let key = vec![0x13, 0x37];
        let encoded = xor::apply(b"layer", &key)?;
        let text = ascii85::encode(&encoded);

        assert_eq!(peel(&text, &Layer::Xor(key))?, b"layer".to_vec());

        Ok(())
    }
}
