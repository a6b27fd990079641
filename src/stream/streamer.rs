//! Output sinks for streamed text

use std::io::Write;

use crate::error::LlamaResult;

/// Receives text as generation progresses
pub trait TokenSink {
    /// Called once with the full prompt before any generated text
    fn on_prompt(&mut self, _prompt: &str) -> LlamaResult<()> {
        Ok(())
    }

    /// Called with each newly finalized fragment
    fn on_text(&mut self, text: &str) -> LlamaResult<()>;

    /// Called once when generation stops
    fn on_end(&mut self) -> LlamaResult<()> {
        Ok(())
    }
}

/// Writes fragments to a writer as soon as they arrive, flushing each one.
///
/// The prompt is echoed first unless `skip_prompt` is set.
pub struct TextStreamer<W: Write> {
    out: W,
    skip_prompt: bool,
    fragments: usize,
}

impl<W: Write> TextStreamer<W> {
    pub fn new(out: W, skip_prompt: bool) -> Self {
        Self {
            out,
            skip_prompt,
            fragments: 0,
        }
    }

    /// Number of generated fragments written so far
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl TextStreamer<std::io::Stdout> {
    pub fn stdout(skip_prompt: bool) -> Self {
        Self::new(std::io::stdout(), skip_prompt)
    }
}

impl<W: Write> TokenSink for TextStreamer<W> {
    fn on_prompt(&mut self, prompt: &str) -> LlamaResult<()> {
        if !self.skip_prompt {
            self.out.write_all(prompt.as_bytes())?;
            self.out.flush()?;
        }
        Ok(())
    }

    fn on_text(&mut self, text: &str) -> LlamaResult<()> {
        self.out.write_all(text.as_bytes())?;
        self.out.flush()?;
        self.fragments += 1;
        Ok(())
    }

    fn on_end(&mut self) -> LlamaResult<()> {
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}
