//! Every second bit flipped, then the whole byte rotated by one.

use crate::memory::Byte;

const FLIP_MASK: Byte = 0b0101_0101;

pub fn decode(data: &[Byte]) -> Vec<Byte> {
    data.iter()
        .map(|byte| (byte ^ FLIP_MASK).rotate_right(1))
        .collect()
}

pub fn encode(data: &[Byte]) -> Vec<Byte> {
    data.iter()
        .map(|byte| byte.rotate_left(1) ^ FLIP_MASK)
        .collect()
}
