//! Parity protected 7 bit groups.
//!
//! The upper seven bits of every byte carry data, the lowest bit makes the
//! number of set data bits even or odd: it is 1 exactly when an odd number
//! of data bits is set. Bytes failing that check are dropped. The data bits
//! of the remaining bytes form one bit stream, MSB first, that is cut into
//! bytes again.

use log::*;

use crate::memory::Byte;

fn parity_ok(byte: Byte) -> bool {
    (byte >> 1).count_ones() % 2 == u32::from(byte & 1)
}

pub fn decode(data: &[Byte]) -> Vec<Byte> {
    let mut decoded = Vec::with_capacity(data.len() * 7 / 8);
    let mut bits: u16 = 0;
    let mut pending = 0;
    let mut dropped = 0usize;

    for &byte in data {
        if !parity_ok(byte) {
            dropped += 1;
            continue;
        }

        bits = (bits << 7) | u16::from(byte >> 1);
        pending += 7;

        if pending >= 8 {
            pending -= 8;
            decoded.push((bits >> pending) as Byte);
            bits &= (1 << pending) - 1;
        }
    }

    if dropped > 0 {
        warn!("Dropped {} of {} bytes with a wrong parity bit", dropped, data.len());
    }
    if pending > 0 {
        trace!("Discarding {} trailing bits", pending);
    }

    decoded
}

fn push_group(group: u16, encoded: &mut Vec<Byte>) {
    let group = (group as Byte) & 0x7F;
    let parity = (group.count_ones() % 2) as Byte;
    encoded.push(group << 1 | parity);
}

/// Splits `data` into 7 bit groups and adds a parity bit to each. The last
/// group is padded with zero bits.
pub fn encode(data: &[Byte]) -> Vec<Byte> {
    let mut encoded = Vec::with_capacity(data.len() * 8 / 7 + 1);
    let mut bits: u16 = 0;
    let mut pending = 0;

    for &byte in data {
        bits = (bits << 8) | u16::from(byte);
        pending += 8;

        while pending >= 7 {
            pending -= 7;
            push_group(bits >> pending, &mut encoded);
            bits &= (1 << pending) - 1;
        }
    }

    if pending > 0 {
        push_group(bits << (7 - pending), &mut encoded);
    }

    encoded
}
