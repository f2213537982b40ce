#![doc = include_str!("../README.md")]

pub mod accessor;
pub mod conversions;
mod error;
mod item;
mod packet;
mod value;

pub use accessor::{Accessor, BinaryAccessor, JsonAccessor, Representation};
pub use error::{Error, Result};
pub use item::{canonical_name, DataType, Endianness, ItemDefinition, Overflow};
pub use packet::{Packet, PacketDefinition, Processor};
pub use value::Value;
