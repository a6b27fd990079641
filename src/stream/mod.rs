//! Token Streaming
//!
//! Turns generated token ids into text fragments as they arrive and hands
//! them to a sink.

mod streamer;
mod token_output;

pub use streamer::{TextStreamer, TokenSink};
pub use token_output::TokenOutputStream;

#[cfg(test)]
pub(crate) use token_output::tests as token_output_tests;
