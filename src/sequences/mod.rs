//! Sequence windowing module.
//!
//! Slices a token stream into fixed-length input windows and next-token targets.

pub mod windower;

pub use windower::create_sequences;
