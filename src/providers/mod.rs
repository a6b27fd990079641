//! Provider Abstraction Layer
//!
//! Defines the TextGenerator trait implemented by inference backends.

pub mod local;
pub mod params;

use std::time::Duration;

use crate::error::LlamaResult;
use crate::stream::TokenSink;

pub use params::{GenerationConfig, GenerationParams};

/// Counters for one generation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationStats {
    pub prompt_tokens: usize,
    pub tokens_generated: usize,
    pub total_time: Duration,
    pub tokens_per_second: f64,
    /// Whether an end-of-sequence token ended the run
    pub hit_eos: bool,
}

impl GenerationStats {
    pub fn new(prompt_tokens: usize, tokens_generated: usize, total_time: Duration, hit_eos: bool) -> Self {
        let secs = total_time.as_secs_f64();
        let tokens_per_second = if secs > 0.0 { tokens_generated as f64 / secs } else { 0.0 };
        Self {
            prompt_tokens,
            tokens_generated,
            total_time,
            tokens_per_second,
            hit_eos,
        }
    }
}

/// A backend that turns a fully formatted prompt into streamed text
pub trait TextGenerator {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Generate from `prompt`, pushing text into `sink` as it is produced.
    /// Blocks until EOS or `params.max_new_tokens`.
    fn generate(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
        sink: &mut dyn TokenSink,
    ) -> LlamaResult<GenerationStats>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_rate() {
        let stats = GenerationStats::new(12, 50, Duration::from_secs(2), true);
        assert_eq!(stats.tokens_per_second, 25.0);

        let instant = GenerationStats::new(12, 0, Duration::ZERO, false);
        assert_eq!(instant.tokens_per_second, 0.0);
    }
}
