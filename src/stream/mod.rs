//! Incremental decoding and demultiplexing of streamed chat responses.
//!
//! The upstream API multiplexes sideband control tokens (`[RUN_ID]:`,
//! `[USAGE]:`, `[DONE]`) into the same byte stream as the generated text.
//! This module splits them back apart, chunk by chunk.

mod decoder;
mod demux;

pub use decoder::Utf8Decoder;
pub use demux::{ChunkDemux, ChunkUpdate};
