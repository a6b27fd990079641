//! Local Provider Module
//!
//! Runs Llama safetensors checkpoints on the local machine with candle.

mod client;

pub use client::{LoadOptions, LocalLlamaProvider};
