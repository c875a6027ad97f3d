//! Binary formats the engine loads directly: `armpack`, a MessagePack dialect with little-endian fields,
//! 32-bit floats and packed numeric arrays, and raw LZ4 blocks.

pub mod armpack;
pub mod lz4;
pub mod ser;

pub use armpack::{pack, packb, PackError, TypedArray, Value};
pub use lz4::{decode, encode, encode_bound, Lz4, Lz4Error};
pub use ser::{to_value, to_vec};
