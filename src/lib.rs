//! llama-stream
//!
//! Downloads an instruction-tuned Llama model and its tokenizer from the
//! Hugging Face Hub, saves them locally, and streams a chat completion for a
//! prompt wrapped in the Llama-2 instruction template.

pub mod commands;
pub mod config;
pub mod error;
pub mod hardware;
pub mod prompts;
pub mod providers;
pub mod setup;
pub mod stream;

pub use config::Config;
pub use error::{HubError, HubErrorCode, LlamaError, LlamaResult, ModelError, ModelErrorKind};
pub use prompts::{format_prompt, PromptTemplate};
