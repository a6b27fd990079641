//! Setup Module
//!
//! Handles downloading the model and tokenizer from the hub and saving them
//! to local directories.

pub mod downloader;
pub mod paths;
