//! Wire protocol
//!
//! Fixed-size text slots for commands and length-prefixed binary frames for
//! images, see [`codec`] for the exact layout.

pub mod codec;
pub mod command;
pub mod constants;

pub use codec::{decode_snapshot, encode_binary, encode_snapshot, encode_text, FrameReader, Framing, Message};
pub use command::{parse_motion_flag, Command, Dimensions};
