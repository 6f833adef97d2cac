//! A small register machine and the decoders for the layers that hide its
//! program.

pub mod layers;
pub mod memory;
pub mod processor;
