//! Incremental detokenization
//!
//! Decoding one id at a time breaks multi-byte characters and drops the
//! leading spaces that SentencePiece folds into the next token. Instead the
//! pending window is re-decoded and the new suffix is released once it ends
//! on an alphanumeric character.

use tokenizers::Tokenizer;

use crate::error::{LlamaError, LlamaResult};

pub struct TokenOutputStream {
    tokenizer: Tokenizer,
    tokens: Vec<u32>,
    prev_index: usize,
    current_index: usize,
}

impl TokenOutputStream {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self {
            tokenizer,
            tokens: Vec::new(),
            prev_index: 0,
            current_index: 0,
        }
    }

    fn decode(&self, tokens: &[u32]) -> LlamaResult<String> {
        self.tokenizer
            .decode(tokens, true)
            .map_err(|e| LlamaError::Tokenizer(format!("decode failed: {}", e)))
    }

    /// Push a token; returns the text that became final, if any
    pub fn next_token(&mut self, token: u32) -> LlamaResult<Option<String>> {
        let prev_text = if self.tokens.is_empty() {
            String::new()
        } else {
            self.decode(&self.tokens[self.prev_index..self.current_index])?
        };
        self.tokens.push(token);
        let text = self.decode(&self.tokens[self.prev_index..])?;

        let ends_on_word = text.chars().last().is_some_and(char::is_alphanumeric);
        if text.len() > prev_text.len() && ends_on_word {
            match text.get(prev_text.len()..) {
                Some(fresh) => {
                    let fresh = fresh.to_string();
                    self.prev_index = self.current_index;
                    self.current_index = self.tokens.len();
                    Ok(Some(fresh))
                }
                None => Ok(None),
            }
        } else {
            Ok(None)
        }
    }

    /// Text still held back after the last token
    pub fn decode_rest(&self) -> LlamaResult<Option<String>> {
        let prev_text = if self.tokens.is_empty() {
            String::new()
        } else {
            self.decode(&self.tokens[self.prev_index..self.current_index])?
        };
        let text = self.decode(&self.tokens[self.prev_index..])?;
        if text.len() > prev_text.len() {
            Ok(text.get(prev_text.len()..).map(str::to_string))
        } else {
            Ok(None)
        }
    }

    /// All tokens pushed so far, decoded in one go
    pub fn decode_all(&self) -> LlamaResult<String> {
        self.decode(&self.tokens)
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
        self.prev_index = 0;
        self.current_index = 0;
    }
}
