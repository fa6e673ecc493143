// src/core/protocol/mod.rs

//! The client-facing wire protocol: newline-delimited text in, one reply line out.

pub mod command;
pub mod line_codec;

pub use command::{Inbound, META_PREFIX, MetaCommand, Reply};
pub use line_codec::{ClientLine, LineCodec};
